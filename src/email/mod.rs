//! Email queue drainer: one bounded delivery pass per invocation.

pub mod relay;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::errors::AppError;
use crate::models::email_queue::RetryPolicy;
use crate::store::Store;

use relay::{MailRelay, OutgoingMail};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    pub sent: usize,
    pub failed: usize,
    /// Attempts whose outcome could not be written back. The entry is
    /// retried once its claim lease runs out.
    pub unrecorded: usize,
}

pub struct Drainer {
    store: Arc<dyn Store>,
    relay: Arc<dyn MailRelay>,
    from: String,
    policy: RetryPolicy,
    batch_size: usize,
}

impl Drainer {
    pub fn new(
        store: Arc<dyn Store>,
        relay: Arc<dyn MailRelay>,
        from: impl Into<String>,
        policy: RetryPolicy,
        batch_size: usize,
    ) -> Self {
        Drainer {
            store,
            relay,
            from: from.into(),
            policy,
            batch_size,
        }
    }

    /// Claim a batch of due entries and attempt delivery of each.
    ///
    /// A failed send is recorded on its entry and the batch moves on. Errors
    /// are returned only when the queue itself cannot be read. Claims keep
    /// overlapping runs from sending the same entry twice.
    pub async fn drain_once(&self, now: DateTime<Utc>) -> Result<DrainReport, AppError> {
        let batch = self
            .store
            .claim_emails(&self.policy, now, self.batch_size)
            .await?;
        if batch.is_empty() {
            log::info!("no pending emails");
            return Ok(DrainReport::default());
        }

        let mut report = DrainReport::default();
        for mut entry in batch {
            let mail = OutgoingMail {
                from: self.from.clone(),
                to: entry.to.clone(),
                subject: entry.subject.clone(),
                html: entry.html_content.clone(),
            };
            let sent = match self.relay.send(&mail).await {
                Ok(()) => {
                    entry.mark_sent(now);
                    true
                }
                Err(e) => {
                    log::warn!("Email {} to {} failed: {}", entry.id, entry.to, e);
                    entry.mark_failed(&e.to_string(), now);
                    false
                }
            };
            match self.store.update_email(&entry).await {
                Ok(()) if sent => report.sent += 1,
                Ok(()) => report.failed += 1,
                Err(e) => {
                    log::error!("Email {}: could not record delivery result: {}", entry.id, e);
                    report.unrecorded += 1;
                }
            }
        }

        if report.unrecorded > 0 {
            log::info!(
                "sent={} failed={} unrecorded={}",
                report.sent,
                report.failed,
                report.unrecorded
            );
        } else {
            log::info!("sent={} failed={}", report.sent, report.failed);
        }
        Ok(report)
    }
}
