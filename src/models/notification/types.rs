use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What a notification is about. The tag is stored in `data.type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    NewPending,
    Approved,
    Declined,
    MissedDeadline,
    Cancelled,
    Rescheduled,
    Upcoming,
}

impl NoticeKind {
    pub const ALL: [NoticeKind; 7] = [
        NoticeKind::NewPending,
        NoticeKind::Approved,
        NoticeKind::Declined,
        NoticeKind::MissedDeadline,
        NoticeKind::Cancelled,
        NoticeKind::Rescheduled,
        NoticeKind::Upcoming,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NoticeKind::NewPending => "new_pending",
            NoticeKind::Approved => "approved",
            NoticeKind::Declined => "declined",
            NoticeKind::MissedDeadline => "missed_deadline",
            NoticeKind::Cancelled => "cancelled",
            NoticeKind::Rescheduled => "rescheduled",
            NoticeKind::Upcoming => "upcoming",
        }
    }

    /// Kinds that are also delivered by email.
    pub fn requires_email(&self) -> bool {
        matches!(
            self,
            NoticeKind::Approved
                | NoticeKind::Declined
                | NoticeKind::MissedDeadline
                | NoticeKind::Cancelled
                | NoticeKind::Upcoming
        )
    }
}

impl fmt::Display for NoticeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NoticeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NoticeKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown notice kind '{s}'"))
    }
}

/// Payload carried by a notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationData {
    pub proposal_id: String,
    #[serde(rename = "type")]
    pub kind: NoticeKind,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A per-user notification under `users/{uid}/notifications/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub body: String,
    pub icon: String,
    pub data: NotificationData,
    pub read: bool,
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Notification {
    pub fn is_visible(&self, now: DateTime<Utc>) -> bool {
        !self.deleted && self.expires_at > now
    }
}
