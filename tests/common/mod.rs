//! Shared test infrastructure.
//!
//! `setup()` builds an in-memory store seeded with one admin, two staff
//! members (`u1`, `u2`) and two officials (`o1`, `o2`), and wires the
//! lifecycle manager, dispatcher and outbox relay on top of it.
//! `setup_faulty()` does the same over a store that fails selected calls.
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, Utc};

use brgy_events::lifecycle::{deadline, LifecycleManager};
use brgy_events::models::email_queue::{EmailQueueEntry, RetryPolicy};
use brgy_events::models::notification::Notification;
use brgy_events::models::outbox::OutboxEvent;
use brgy_events::models::proposal::{Proposal, ProposalDraft, ProposalStatus, Schedule};
use brgy_events::models::user::{Actor, Role, User};
use brgy_events::notifications::live::LiveAlerts;
use brgy_events::notifications::relay::OutboxRelay;
use brgy_events::notifications::Dispatcher;
use brgy_events::store::memory::MemoryStore;
use brgy_events::store::{Store, StoreError};

// ============================================================================
// TEST CONSTANTS
// ============================================================================

pub const ADMIN: &str = "admin";
pub const STAFF_1: &str = "u1";
pub const STAFF_2: &str = "u2";
pub const OFFICIAL_1: &str = "o1";
pub const OFFICIAL_2: &str = "o2";

pub fn offset() -> FixedOffset {
    FixedOffset::east_opt(8 * 3600).unwrap()
}

// ============================================================================
// SETUP
// ============================================================================

pub struct TestApp {
    pub store: Arc<MemoryStore>,
    pub manager: LifecycleManager,
    pub relay: OutboxRelay,
    pub dispatcher: Dispatcher,
}

impl TestApp {
    pub fn actor(&self, uid: &str) -> Actor {
        let role = match uid {
            ADMIN => Role::Admin,
            OFFICIAL_1 | OFFICIAL_2 => Role::Official,
            _ => Role::Staff,
        };
        Actor::new(uid, role)
    }

    pub async fn proposal(&self, id: &str) -> Proposal {
        self.store.get_proposal(id).await.unwrap().unwrap()
    }
}

fn user(id: &str, role: Role, email: &str) -> User {
    User {
        id: id.to_string(),
        email: email.to_string(),
        role,
        full_name: format!("User {}", id.to_uppercase()),
        dob: None,
        phone: String::new(),
        verified: true,
        disabled: false,
    }
}

fn seed_users() -> [User; 5] {
    [
        user(ADMIN, Role::Admin, "admin@brgy.test"),
        user(STAFF_1, Role::Staff, "u1@brgy.test"),
        user(STAFF_2, Role::Staff, "u2@brgy.test"),
        user(OFFICIAL_1, Role::Official, "o1@brgy.test"),
        user(OFFICIAL_2, Role::Official, "o2@brgy.test"),
    ]
}

pub async fn setup() -> TestApp {
    let store = Arc::new(MemoryStore::new());
    for u in seed_users() {
        store.upsert_user(&u).await.unwrap();
    }

    let shared: Arc<dyn Store> = store.clone();
    let dispatcher = Dispatcher::new(shared.clone(), LiveAlerts::new(), Duration::days(30), offset());
    let relay = OutboxRelay::new(shared.clone(), dispatcher.clone());
    let manager = LifecycleManager::new(shared, relay.clone(), offset());

    TestApp {
        store,
        manager,
        relay,
        dispatcher,
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub fn local_today(now: DateTime<Utc>) -> NaiveDate {
    deadline::local_date(now, offset())
}

/// A valid draft for an event `days_ahead` local days from now, 9am to 5pm.
pub fn draft(days_ahead: i64) -> ProposalDraft {
    let day = local_today(Utc::now()) + Duration::days(days_ahead);
    ProposalDraft {
        title: "Barangay Clean-up Drive".to_string(),
        description: "Community clean-up along the creek".to_string(),
        location: "Purok 5 covered court".to_string(),
        note: None,
        schedule: Schedule {
            start_date: day,
            start_time: NaiveTime::from_hms_opt(9, 0, 0),
            finish_date: day,
            finish_time: NaiveTime::from_hms_opt(17, 0, 0),
        },
        file_url: None,
        attachments: vec![],
    }
}

/// A stored proposal in `status`, owned by `owner`, on a date-only schedule
/// starting on `start`.
pub fn stored_proposal(id: &str, owner: &str, status: ProposalStatus, start: NaiveDate) -> Proposal {
    let mut d = draft(3);
    d.schedule = Schedule {
        start_date: start,
        start_time: None,
        finish_date: start,
        finish_time: None,
    };
    let mut p = Proposal::from_draft(id.to_string(), owner, d, Utc::now() - Duration::days(7));
    p.status = status;
    p.notified = true;
    p
}

// ============================================================================
// FAULTY STORE
// ============================================================================

/// Wraps a `MemoryStore` and fails selected calls on demand.
#[derive(Default)]
pub struct FaultyStore {
    pub inner: MemoryStore,
    /// `get_user` fails for this id.
    pub broken_user: Mutex<Option<String>>,
    pub fail_enqueue: AtomicBool,
    pub fail_email_update: AtomicBool,
}

impl FaultyStore {
    fn fault(what: &str) -> StoreError {
        StoreError::Corrupt {
            id: "faulty".to_string(),
            reason: format!("injected {what} failure"),
        }
    }
}

#[async_trait]
impl Store for FaultyStore {
    async fn insert_proposal(&self, proposal: &Proposal, event: &OutboxEvent) -> Result<(), StoreError> {
        self.inner.insert_proposal(proposal, event).await
    }

    async fn get_proposal(&self, id: &str) -> Result<Option<Proposal>, StoreError> {
        self.inner.get_proposal(id).await
    }

    async fn list_proposals(&self, status: Option<ProposalStatus>) -> Result<Vec<Proposal>, StoreError> {
        self.inner.list_proposals(status).await
    }

    async fn update_proposal(
        &self,
        proposal: &Proposal,
        expected_revision: i64,
        event: Option<&OutboxEvent>,
    ) -> Result<(), StoreError> {
        self.inner.update_proposal(proposal, expected_revision, event).await
    }

    async fn mark_notified(&self, id: &str, status_revision: i64) -> Result<bool, StoreError> {
        self.inner.mark_notified(id, status_revision).await
    }

    async fn get_user(&self, id: &str) -> Result<Option<User>, StoreError> {
        if self.broken_user.lock().unwrap().as_deref() == Some(id) {
            return Err(Self::fault("user lookup"));
        }
        self.inner.get_user(id).await
    }

    async fn list_users_by_roles(&self, roles: &[Role]) -> Result<Vec<User>, StoreError> {
        self.inner.list_users_by_roles(roles).await
    }

    async fn upsert_user(&self, user: &User) -> Result<(), StoreError> {
        self.inner.upsert_user(user).await
    }

    async fn insert_notification(&self, notification: &Notification) -> Result<(), StoreError> {
        self.inner.insert_notification(notification).await
    }

    async fn list_notifications(&self, user_id: &str, now: DateTime<Utc>) -> Result<Vec<Notification>, StoreError> {
        self.inner.list_notifications(user_id, now).await
    }

    async fn update_notification_flags(
        &self,
        user_id: &str,
        id: &str,
        read: Option<bool>,
        deleted: Option<bool>,
    ) -> Result<bool, StoreError> {
        self.inner.update_notification_flags(user_id, id, read, deleted).await
    }

    async fn count_unread(&self, user_id: &str, now: DateTime<Utc>) -> Result<i64, StoreError> {
        self.inner.count_unread(user_id, now).await
    }

    async fn enqueue_email(&self, entry: &EmailQueueEntry) -> Result<(), StoreError> {
        if self.fail_enqueue.load(Ordering::SeqCst) {
            return Err(Self::fault("enqueue"));
        }
        self.inner.enqueue_email(entry).await
    }

    async fn claim_emails(
        &self,
        policy: &RetryPolicy,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<EmailQueueEntry>, StoreError> {
        self.inner.claim_emails(policy, now, limit).await
    }

    async fn update_email(&self, entry: &EmailQueueEntry) -> Result<(), StoreError> {
        if self.fail_email_update.load(Ordering::SeqCst) {
            return Err(Self::fault("email update"));
        }
        self.inner.update_email(entry).await
    }

    async fn unprocessed_events(&self, limit: usize) -> Result<Vec<OutboxEvent>, StoreError> {
        self.inner.unprocessed_events(limit).await
    }

    async fn mark_event_processed(&self, id: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        self.inner.mark_event_processed(id, at).await
    }

    async fn record_delivery(&self, scope: &str, recipient: &str, at: DateTime<Utc>) -> Result<bool, StoreError> {
        self.inner.record_delivery(scope, recipient, at).await
    }

    async fn release_delivery(&self, scope: &str, recipient: &str) -> Result<(), StoreError> {
        self.inner.release_delivery(scope, recipient).await
    }
}

/// Same wiring as `setup()`, over a `FaultyStore` seeded with the same users.
pub struct FaultyApp {
    pub store: Arc<FaultyStore>,
    pub manager: LifecycleManager,
    pub relay: OutboxRelay,
    pub dispatcher: Dispatcher,
}

pub async fn setup_faulty() -> FaultyApp {
    let store = Arc::new(FaultyStore::default());
    for u in seed_users() {
        store.upsert_user(&u).await.unwrap();
    }

    let shared: Arc<dyn Store> = store.clone();
    let dispatcher = Dispatcher::new(shared.clone(), LiveAlerts::new(), Duration::days(30), offset());
    let relay = OutboxRelay::new(shared.clone(), dispatcher.clone());
    let manager = LifecycleManager::new(shared, relay.clone(), offset());

    FaultyApp {
        store,
        manager,
        relay,
        dispatcher,
    }
}
