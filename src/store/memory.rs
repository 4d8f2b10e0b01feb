use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{Store, StoreError};
use crate::models::email_queue::{EmailQueueEntry, RetryPolicy};
use crate::models::notification::Notification;
use crate::models::outbox::OutboxEvent;
use crate::models::proposal::{Proposal, ProposalStatus};
use crate::models::user::{Role, User};

#[derive(Default)]
struct Collections {
    users: BTreeMap<String, User>,
    proposals: BTreeMap<String, Proposal>,
    notifications: Vec<Notification>,
    email_queue: Vec<EmailQueueEntry>,
    events: Vec<OutboxEvent>,
    deliveries: HashSet<(String, String)>,
    writes: u64,
}

/// In-process store. One lock guards every collection, so each trait call
/// is atomic the way a single-document write is.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Collections>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Put a proposal as-is, bypassing the lifecycle. Fixture helper.
    pub async fn put_proposal(&self, proposal: Proposal) {
        let mut inner = self.inner.write().await;
        inner.proposals.insert(proposal.id.clone(), proposal);
    }

    pub async fn notifications_for(&self, user_id: &str) -> Vec<Notification> {
        let inner = self.inner.read().await;
        inner
            .notifications
            .iter()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect()
    }

    pub async fn all_notifications(&self) -> Vec<Notification> {
        self.inner.read().await.notifications.clone()
    }

    pub async fn emails(&self) -> Vec<EmailQueueEntry> {
        self.inner.read().await.email_queue.clone()
    }

    pub async fn events(&self) -> Vec<OutboxEvent> {
        self.inner.read().await.events.clone()
    }

    /// Number of mutating calls served so far.
    pub async fn write_count(&self) -> u64 {
        self.inner.read().await.writes
    }
}

fn newest_first<T, F>(items: &mut [T], key: F)
where
    F: Fn(&T) -> DateTime<Utc>,
{
    items.sort_by(|a, b| key(b).cmp(&key(a)));
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_proposal(&self, proposal: &Proposal, event: &OutboxEvent) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        inner.writes += 1;
        inner.proposals.insert(proposal.id.clone(), proposal.clone());
        inner.events.push(event.clone());
        Ok(())
    }

    async fn get_proposal(&self, id: &str) -> Result<Option<Proposal>, StoreError> {
        Ok(self.inner.read().await.proposals.get(id).cloned())
    }

    async fn list_proposals(&self, status: Option<ProposalStatus>) -> Result<Vec<Proposal>, StoreError> {
        let inner = self.inner.read().await;
        let mut items: Vec<Proposal> = inner
            .proposals
            .values()
            .filter(|p| status.is_none_or(|s| p.status == s))
            .cloned()
            .collect();
        newest_first(&mut items, |p| p.created_at);
        Ok(items)
    }

    async fn update_proposal(
        &self,
        proposal: &Proposal,
        expected_revision: i64,
        event: Option<&OutboxEvent>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let stored_revision = inner.proposals.get(&proposal.id).map(|p| p.revision);
        if stored_revision != Some(expected_revision) {
            return Err(StoreError::Conflict {
                collection: "proposals",
                id: proposal.id.clone(),
            });
        }
        inner.writes += 1;
        inner.proposals.insert(proposal.id.clone(), proposal.clone());
        if let Some(event) = event {
            inner.events.push(event.clone());
        }
        Ok(())
    }

    async fn mark_notified(&self, id: &str, status_revision: i64) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().await;
        let Some(proposal) = inner.proposals.get_mut(id) else {
            return Ok(false);
        };
        if proposal.status_revision != status_revision {
            return Ok(false);
        }
        proposal.notified = true;
        proposal.revision += 1;
        inner.writes += 1;
        Ok(true)
    }

    async fn get_user(&self, id: &str) -> Result<Option<User>, StoreError> {
        Ok(self.inner.read().await.users.get(id).cloned())
    }

    async fn list_users_by_roles(&self, roles: &[Role]) -> Result<Vec<User>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .users
            .values()
            .filter(|u| !u.disabled && roles.contains(&u.role))
            .cloned()
            .collect())
    }

    async fn upsert_user(&self, user: &User) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        inner.writes += 1;
        inner.users.insert(user.id.clone(), user.clone());
        Ok(())
    }

    async fn insert_notification(&self, notification: &Notification) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        inner.writes += 1;
        inner.notifications.push(notification.clone());
        Ok(())
    }

    async fn list_notifications(&self, user_id: &str, now: DateTime<Utc>) -> Result<Vec<Notification>, StoreError> {
        let inner = self.inner.read().await;
        let mut items: Vec<Notification> = inner
            .notifications
            .iter()
            .filter(|n| n.user_id == user_id && n.is_visible(now))
            .cloned()
            .collect();
        newest_first(&mut items, |n| n.created_at);
        Ok(items)
    }

    async fn update_notification_flags(
        &self,
        user_id: &str,
        id: &str,
        read: Option<bool>,
        deleted: Option<bool>,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().await;
        let Some(notification) = inner
            .notifications
            .iter_mut()
            .find(|n| n.id == id && n.user_id == user_id)
        else {
            return Ok(false);
        };
        if let Some(read) = read {
            notification.read = read;
        }
        if let Some(deleted) = deleted {
            notification.deleted = deleted;
        }
        inner.writes += 1;
        Ok(true)
    }

    async fn count_unread(&self, user_id: &str, now: DateTime<Utc>) -> Result<i64, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .notifications
            .iter()
            .filter(|n| n.user_id == user_id && !n.read && n.is_visible(now))
            .count() as i64)
    }

    async fn enqueue_email(&self, entry: &EmailQueueEntry) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        inner.writes += 1;
        inner.email_queue.push(entry.clone());
        Ok(())
    }

    async fn claim_emails(
        &self,
        policy: &RetryPolicy,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<EmailQueueEntry>, StoreError> {
        let mut inner = self.inner.write().await;
        let mut due: Vec<&mut EmailQueueEntry> = inner
            .email_queue
            .iter_mut()
            .filter(|e| policy.is_due(e, now))
            .collect();
        due.sort_by_key(|e| e.created_at);
        due.truncate(limit);
        let claimed: Vec<EmailQueueEntry> = due
            .into_iter()
            .map(|e| {
                e.claim(now);
                e.clone()
            })
            .collect();
        if !claimed.is_empty() {
            inner.writes += 1;
        }
        Ok(claimed)
    }

    async fn update_email(&self, entry: &EmailQueueEntry) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let Some(slot) = inner.email_queue.iter_mut().find(|e| e.id == entry.id) else {
            return Err(StoreError::Corrupt {
                id: entry.id.clone(),
                reason: "email queue entry vanished".to_string(),
            });
        };
        *slot = entry.clone();
        inner.writes += 1;
        Ok(())
    }

    async fn unprocessed_events(&self, limit: usize) -> Result<Vec<OutboxEvent>, StoreError> {
        let inner = self.inner.read().await;
        let mut items: Vec<OutboxEvent> = inner
            .events
            .iter()
            .filter(|e| e.processed_at.is_none())
            .cloned()
            .collect();
        items.sort_by_key(|e| e.created_at);
        items.truncate(limit);
        Ok(items)
    }

    async fn mark_event_processed(&self, id: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if let Some(event) = inner.events.iter_mut().find(|e| e.id == id) {
            event.processed_at = Some(at);
        }
        inner.writes += 1;
        Ok(())
    }

    async fn record_delivery(&self, scope: &str, recipient: &str, _at: DateTime<Utc>) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().await;
        inner.writes += 1;
        Ok(inner
            .deliveries
            .insert((scope.to_string(), recipient.to_string())))
    }

    async fn release_delivery(&self, scope: &str, recipient: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        inner.writes += 1;
        inner.deliveries.remove(&(scope.to_string(), recipient.to_string()));
        Ok(())
    }
}

