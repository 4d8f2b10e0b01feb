//! Persistent store seam.
//!
//! Everything the lifecycle, notification and email components need from the
//! document database goes through [`Store`]. [`postgres::PgStore`] is the
//! production implementation; [`memory::MemoryStore`] keeps everything in
//! process and backs the test-suite.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::email_queue::{EmailQueueEntry, RetryPolicy};
use crate::models::notification::Notification;
use crate::models::outbox::OutboxEvent;
use crate::models::proposal::{Proposal, ProposalStatus};
use crate::models::user::{Role, User};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("revision conflict on {collection}/{id}")]
    Conflict { collection: &'static str, id: String },

    #[error("corrupt record {id}: {reason}")]
    Corrupt { id: String, reason: String },
}

/// Generate an opaque 20-hex-character document id.
pub fn new_id() -> String {
    hex::encode(rand::random::<[u8; 10]>())
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Insert a new proposal together with its outbox event.
    async fn insert_proposal(&self, proposal: &Proposal, event: &OutboxEvent) -> Result<(), StoreError>;

    async fn get_proposal(&self, id: &str) -> Result<Option<Proposal>, StoreError>;

    /// All proposals, or only those with the given status. Newest first.
    async fn list_proposals(&self, status: Option<ProposalStatus>) -> Result<Vec<Proposal>, StoreError>;

    /// Replace a proposal iff its stored revision equals `expected_revision`,
    /// appending `event` in the same write. Fails with `Conflict` otherwise.
    async fn update_proposal(
        &self,
        proposal: &Proposal,
        expected_revision: i64,
        event: Option<&OutboxEvent>,
    ) -> Result<(), StoreError>;

    /// Set `notified=true` iff no status change happened after the write at
    /// `status_revision`. Bumps the revision. Returns whether the flag was written.
    async fn mark_notified(&self, id: &str, status_revision: i64) -> Result<bool, StoreError>;

    async fn get_user(&self, id: &str) -> Result<Option<User>, StoreError>;

    /// Enabled users holding any of `roles`.
    async fn list_users_by_roles(&self, roles: &[Role]) -> Result<Vec<User>, StoreError>;

    async fn upsert_user(&self, user: &User) -> Result<(), StoreError>;

    async fn insert_notification(&self, notification: &Notification) -> Result<(), StoreError>;

    /// Visible (not deleted, not expired) notifications of a user, newest first.
    async fn list_notifications(&self, user_id: &str, now: DateTime<Utc>) -> Result<Vec<Notification>, StoreError>;

    /// Set read/deleted flags on a notification owned by `user_id`.
    /// Returns false when no such notification exists.
    async fn update_notification_flags(
        &self,
        user_id: &str,
        id: &str,
        read: Option<bool>,
        deleted: Option<bool>,
    ) -> Result<bool, StoreError>;

    async fn count_unread(&self, user_id: &str, now: DateTime<Utc>) -> Result<i64, StoreError>;

    async fn enqueue_email(&self, entry: &EmailQueueEntry) -> Result<(), StoreError>;

    /// Claim up to `limit` entries the drainer may attempt now, oldest first.
    /// Claimed entries are invisible to other callers until their lease ends
    /// or the result is recorded with `update_email`.
    async fn claim_emails(
        &self,
        policy: &RetryPolicy,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<EmailQueueEntry>, StoreError>;

    async fn update_email(&self, entry: &EmailQueueEntry) -> Result<(), StoreError>;

    /// Unprocessed outbox events, oldest first.
    async fn unprocessed_events(&self, limit: usize) -> Result<Vec<OutboxEvent>, StoreError>;

    async fn mark_event_processed(&self, id: &str, at: DateTime<Utc>) -> Result<(), StoreError>;

    /// Claim a delivery, insert-if-absent. Returns false if someone else
    /// already holds the claim.
    async fn record_delivery(&self, scope: &str, recipient: &str, at: DateTime<Utc>) -> Result<bool, StoreError>;

    /// Drop a claim whose delivery could not be written.
    async fn release_delivery(&self, scope: &str, recipient: &str) -> Result<(), StoreError>;
}
