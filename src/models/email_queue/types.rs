use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmailStatus {
    Pending,
    Sent,
    Failed,
}

impl EmailStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmailStatus::Pending => "pending",
            EmailStatus::Sent => "sent",
            EmailStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for EmailStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EmailStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(EmailStatus::Pending),
            "sent" => Ok(EmailStatus::Sent),
            "failed" => Ok(EmailStatus::Failed),
            other => Err(format!("unknown email status '{other}'")),
        }
    }
}

/// A queued outbound email under `email_queue/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailQueueEntry {
    pub id: String,
    pub to: String,
    pub subject: String,
    pub html_content: String,
    pub status: EmailStatus,
    pub error: Option<String>,
    pub retries: i32,
    pub sent_at: Option<DateTime<Utc>>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    /// Set while a drainer holds the entry; other drainers skip it until then.
    #[serde(default)]
    pub claimed_until: Option<DateTime<Utc>>,
}

/// How long a drainer may hold a claimed entry before another run may retake it.
pub const CLAIM_LEASE_SECS: i64 = 900;

/// Cap on the backoff doubling.
pub const MAX_BACKOFF_EXPONENT: i32 = 16;

impl EmailQueueEntry {
    pub fn pending(id: String, to: &str, subject: &str, html_content: String, now: DateTime<Utc>) -> Self {
        EmailQueueEntry {
            id,
            to: to.to_string(),
            subject: subject.to_string(),
            html_content,
            status: EmailStatus::Pending,
            error: None,
            retries: 0,
            sent_at: None,
            last_attempt_at: None,
            created_at: now,
            claimed_until: None,
        }
    }

    pub fn mark_sent(&mut self, now: DateTime<Utc>) {
        self.status = EmailStatus::Sent;
        self.sent_at = Some(now);
        self.error = None;
        self.last_attempt_at = Some(now);
        self.claimed_until = None;
    }

    pub fn mark_failed(&mut self, error: &str, now: DateTime<Utc>) {
        self.status = EmailStatus::Failed;
        self.error = Some(error.to_string());
        self.retries += 1;
        self.last_attempt_at = Some(now);
        self.claimed_until = None;
    }

    /// Hold the entry for one delivery attempt starting at `now`.
    pub fn claim(&mut self, now: DateTime<Utc>) {
        self.claimed_until = Some(now + Duration::seconds(CLAIM_LEASE_SECS));
    }
}

/// Bounded retry with exponential backoff for failed entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: i32,
    pub base_delay_secs: i64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_retries: 3,
            base_delay_secs: 300,
        }
    }
}

impl RetryPolicy {
    /// Delay after the n-th failure: base, 2*base, 4*base, ...
    pub fn backoff(&self, retries: i32) -> Duration {
        let exponent = (retries - 1).clamp(0, MAX_BACKOFF_EXPONENT) as u32;
        Duration::seconds(self.base_delay_secs.saturating_mul(1_i64 << exponent))
    }

    /// Whether the drainer may pick this entry up at `now`.
    pub fn is_due(&self, entry: &EmailQueueEntry, now: DateTime<Utc>) -> bool {
        if entry.claimed_until.is_some_and(|until| until > now) {
            return false;
        }
        match entry.status {
            EmailStatus::Pending => true,
            EmailStatus::Sent => false,
            EmailStatus::Failed => {
                if entry.retries >= self.max_retries {
                    return false;
                }
                let last = entry.last_attempt_at.unwrap_or(entry.created_at);
                last + self.backoff(entry.retries) <= now
            }
        }
    }
}
