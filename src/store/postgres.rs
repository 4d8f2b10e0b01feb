use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::{Store, StoreError};
use crate::models::email_queue::{self, EmailQueueEntry, RetryPolicy};
use crate::models::notification::{self, Notification};
use crate::models::outbox::{self, OutboxEvent};
use crate::models::proposal::{self, Proposal, ProposalStatus};
use crate::models::user::{self, Role, User};

/// Postgres-backed store. Proposal updates and their outbox events share a
/// transaction.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        PgStore { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Store for PgStore {
    async fn insert_proposal(&self, p: &Proposal, event: &OutboxEvent) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        proposal::queries::insert(&mut tx, p).await?;
        outbox::queries::insert(&mut tx, event).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn get_proposal(&self, id: &str) -> Result<Option<Proposal>, StoreError> {
        proposal::queries::find_by_id(&self.pool, id).await
    }

    async fn list_proposals(&self, status: Option<ProposalStatus>) -> Result<Vec<Proposal>, StoreError> {
        proposal::queries::find_all(&self.pool, status).await
    }

    async fn update_proposal(
        &self,
        p: &Proposal,
        expected_revision: i64,
        event: Option<&OutboxEvent>,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        if !proposal::queries::update_if_revision(&mut tx, p, expected_revision).await? {
            tx.rollback().await?;
            return Err(StoreError::Conflict {
                collection: "proposals",
                id: p.id.clone(),
            });
        }
        if let Some(event) = event {
            outbox::queries::insert(&mut tx, event).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn mark_notified(&self, id: &str, status_revision: i64) -> Result<bool, StoreError> {
        proposal::queries::mark_notified(&self.pool, id, status_revision).await
    }

    async fn get_user(&self, id: &str) -> Result<Option<User>, StoreError> {
        user::queries::find_by_id(&self.pool, id).await
    }

    async fn list_users_by_roles(&self, roles: &[Role]) -> Result<Vec<User>, StoreError> {
        user::queries::find_by_roles(&self.pool, roles).await
    }

    async fn upsert_user(&self, u: &User) -> Result<(), StoreError> {
        user::queries::upsert(&self.pool, u).await
    }

    async fn insert_notification(&self, n: &Notification) -> Result<(), StoreError> {
        notification::queries::insert(&self.pool, n).await
    }

    async fn list_notifications(&self, user_id: &str, now: DateTime<Utc>) -> Result<Vec<Notification>, StoreError> {
        notification::queries::find_visible_for_user(&self.pool, user_id, now).await
    }

    async fn update_notification_flags(
        &self,
        user_id: &str,
        id: &str,
        read: Option<bool>,
        deleted: Option<bool>,
    ) -> Result<bool, StoreError> {
        notification::queries::update_flags(&self.pool, user_id, id, read, deleted).await
    }

    async fn count_unread(&self, user_id: &str, now: DateTime<Utc>) -> Result<i64, StoreError> {
        notification::queries::count_unread(&self.pool, user_id, now).await
    }

    async fn enqueue_email(&self, entry: &EmailQueueEntry) -> Result<(), StoreError> {
        email_queue::queries::insert(&self.pool, entry).await
    }

    async fn claim_emails(
        &self,
        policy: &RetryPolicy,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<EmailQueueEntry>, StoreError> {
        email_queue::queries::claim_due(&self.pool, policy, now, limit).await
    }

    async fn update_email(&self, entry: &EmailQueueEntry) -> Result<(), StoreError> {
        email_queue::queries::update_delivery(&self.pool, entry).await
    }

    async fn unprocessed_events(&self, limit: usize) -> Result<Vec<OutboxEvent>, StoreError> {
        outbox::queries::find_unprocessed(&self.pool, limit).await
    }

    async fn mark_event_processed(&self, id: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        outbox::queries::mark_processed(&self.pool, id, at).await
    }


    async fn record_delivery(&self, scope: &str, recipient: &str, at: DateTime<Utc>) -> Result<bool, StoreError> {
        outbox::queries::record_delivery(&self.pool, scope, recipient, at).await
    }

    async fn release_delivery(&self, scope: &str, recipient: &str) -> Result<(), StoreError> {
        outbox::queries::release_delivery(&self.pool, scope, recipient).await
    }
}
