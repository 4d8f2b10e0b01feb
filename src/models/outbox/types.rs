use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::notification::NoticeKind;

/// A status change waiting to be fanned out as notifications.
///
/// Written in the same store update as the proposal change it describes, so a
/// crash after the status write still leaves the fan-out on record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboxEvent {
    pub id: String,
    pub proposal_id: String,
    pub kind: NoticeKind,
    /// Proposal revision produced by the change.
    pub revision: i64,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl OutboxEvent {
    pub fn new(id: String, proposal_id: &str, kind: NoticeKind, revision: i64, now: DateTime<Utc>) -> Self {
        OutboxEvent {
            id,
            proposal_id: proposal_id.to_string(),
            kind,
            revision,
            created_at: now,
            processed_at: None,
        }
    }

    /// Delivery-log scope shared by every recipient of this event.
    pub fn delivery_scope(&self) -> String {
        format!("event:{}", self.id)
    }
}
