//! Notification fan-out.
//!
//! A dispatch resolves recipients and, per recipient, persists an in-app
//! notification, pushes a live alert to any open session and enqueues an
//! email when the kind calls for one. With a delivery guard the per-recipient
//! work is skipped for recipients already recorded under that guard, which is
//! what makes the outbox relay safe to re-run.

pub mod live;
pub mod relay;
pub mod scheduler;
pub mod templates;

use std::sync::Arc;

use chrono::{DateTime, Duration, FixedOffset, Utc};
use serde::Serialize;

use crate::errors::AppError;
use crate::lifecycle::deadline;
use crate::models::email_queue::EmailQueueEntry;
use crate::models::notification::{NoticeKind, Notification, NotificationData};
use crate::models::proposal::{Proposal, ProposalStatus};
use crate::models::user::{Role, User};
use crate::store::{new_id, Store};

use live::LiveAlerts;
use templates::{notice_content, render_email};

pub const DEFAULT_ICON: &str = "/assets/icons/notification-192.png";

/// Who receives a dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecipientSelector {
    Explicit(Vec<String>),
    Officials,
    StaffAndOfficials,
    Submitter,
}

impl RecipientSelector {
    /// Default audience per kind: officials vote on new proposals, everyone
    /// involved hears about a move, the submitter hears about the rest.
    pub fn for_kind(kind: NoticeKind) -> Self {
        match kind {
            NoticeKind::NewPending => RecipientSelector::Officials,
            NoticeKind::Rescheduled => RecipientSelector::StaffAndOfficials,
            NoticeKind::Approved
            | NoticeKind::Declined
            | NoticeKind::MissedDeadline
            | NoticeKind::Cancelled
            | NoticeKind::Upcoming => RecipientSelector::Submitter,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    pub recipients: usize,
    pub persisted: usize,
    pub alerted: usize,
    pub emailed: usize,
    /// Recipients already served under the delivery guard.
    pub skipped: usize,
    pub failures: Vec<String>,
}

struct Recipient {
    uid: String,
    email: Option<String>,
    name: String,
}

impl From<User> for Recipient {
    fn from(user: User) -> Self {
        let email = user.has_email().then(|| user.email.clone());
        Recipient {
            uid: user.id,
            email,
            name: user.full_name,
        }
    }
}

#[derive(Clone)]
pub struct Dispatcher {
    store: Arc<dyn Store>,
    live: LiveAlerts,
    ttl: Duration,
    offset: FixedOffset,
}

impl Dispatcher {
    pub fn new(store: Arc<dyn Store>, live: LiveAlerts, ttl: Duration, offset: FixedOffset) -> Self {
        Dispatcher {
            store,
            live,
            ttl,
            offset,
        }
    }

    pub fn live(&self) -> &LiveAlerts {
        &self.live
    }

    async fn resolve(&self, proposal: &Proposal, selector: &RecipientSelector) -> Result<Vec<Recipient>, AppError> {
        let users = match selector {
            RecipientSelector::Officials => self.store.list_users_by_roles(&[Role::Official]).await?,
            RecipientSelector::StaffAndOfficials => {
                self.store
                    .list_users_by_roles(&[Role::Staff, Role::Official])
                    .await?
            }
            RecipientSelector::Submitter => {
                return Ok(vec![self.lookup(&proposal.user_id).await?]);
            }
            RecipientSelector::Explicit(ids) => {
                let mut recipients = Vec::with_capacity(ids.len());
                for id in ids {
                    if recipients.iter().any(|r: &Recipient| &r.uid == id) {
                        continue;
                    }
                    recipients.push(self.lookup(id).await?);
                }
                return Ok(recipients);
            }
        };
        Ok(users.into_iter().map(Recipient::from).collect())
    }

    /// A user id with whatever contact details the store has for it.
    async fn lookup(&self, uid: &str) -> Result<Recipient, AppError> {
        Ok(match self.store.get_user(uid).await? {
            Some(user) => user.into(),
            None => Recipient {
                uid: uid.to_string(),
                email: None,
                name: String::new(),
            },
        })
    }

    /// Fan out one notice. Fails only when recipients cannot be resolved;
    /// per-recipient failures are collected in the report.
    ///
    /// With a `guard` scope each recipient's in-app notice and email are
    /// claimed in the delivery log before they are written, so concurrent or
    /// repeated passes over the same scope write each channel at most once.
    /// A claim whose write fails is released for the next pass.
    pub async fn dispatch(
        &self,
        kind: NoticeKind,
        proposal: &Proposal,
        selector: &RecipientSelector,
        guard: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<DispatchReport, AppError> {
        let recipients = self.resolve(proposal, selector).await?;
        let content = notice_content(kind, proposal);
        let mut report = DispatchReport {
            recipients: recipients.len(),
            ..Default::default()
        };

        let email_guard = guard.map(|scope| format!("{scope}:email"));
        for recipient in &recipients {
            match self.claim(guard, &recipient.uid, now).await {
                Ok(true) => {
                    let notification = Notification {
                        id: new_id(),
                        user_id: recipient.uid.clone(),
                        title: content.title.clone(),
                        body: content.body.clone(),
                        icon: DEFAULT_ICON.to_string(),
                        data: NotificationData {
                            proposal_id: proposal.id.clone(),
                            kind,
                            timestamp: now,
                            extra: content.extra.clone(),
                        },
                        read: false,
                        deleted: false,
                        created_at: now,
                        expires_at: now + self.ttl,
                    };
                    match self.store.insert_notification(&notification).await {
                        Ok(()) => {
                            report.persisted += 1;
                            if self.live.is_connected(&recipient.uid) {
                                let unread = self.store.count_unread(&recipient.uid, now).await.unwrap_or(0);
                                if self.live.alert(&notification, unread) {
                                    report.alerted += 1;
                                }
                            }
                        }
                        Err(e) => {
                            log::warn!("Failed to store {} notification for {}: {}", kind, recipient.uid, e);
                            self.release(guard, &recipient.uid).await;
                            report.failures.push(format!("{}: {}", recipient.uid, e));
                        }
                    }
                }
                Ok(false) => report.skipped += 1,
                Err(e) => report.failures.push(format!("{}: {}", recipient.uid, e)),
            }

            if !kind.requires_email() {
                continue;
            }
            let Some(address) = &recipient.email else {
                continue;
            };
            match self.claim(email_guard.as_deref(), &recipient.uid, now).await {
                Ok(true) => match self.enqueue_email(&content, proposal, recipient, address, now).await {
                    Ok(()) => report.emailed += 1,
                    Err(e) => {
                        log::warn!("Failed to queue {} email for {}: {}", kind, recipient.uid, e);
                        self.release(email_guard.as_deref(), &recipient.uid).await;
                        report.failures.push(format!("{}: {}", recipient.uid, e));
                    }
                },
                Ok(false) => {}
                Err(e) => report.failures.push(format!("{}: {}", recipient.uid, e)),
            }
        }

        log::debug!(
            "Dispatched {} for proposal {}: {} recipients, {} stored, {} skipped, {} failed",
            kind,
            proposal.id,
            report.recipients,
            report.persisted,
            report.skipped,
            report.failures.len()
        );
        Ok(report)
    }

    /// Claim one channel of a guarded delivery. Unguarded dispatches always proceed.
    async fn claim(&self, scope: Option<&str>, uid: &str, now: DateTime<Utc>) -> Result<bool, AppError> {
        match scope {
            Some(scope) => Ok(self.store.record_delivery(scope, uid, now).await?),
            None => Ok(true),
        }
    }

    async fn release(&self, scope: Option<&str>, uid: &str) {
        if let Some(scope) = scope {
            if let Err(e) = self.store.release_delivery(scope, uid).await {
                log::error!("Could not release delivery claim {} for {}: {}", scope, uid, e);
            }
        }
    }

    async fn enqueue_email(
        &self,
        content: &templates::NoticeContent,
        proposal: &Proposal,
        recipient: &Recipient,
        address: &str,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let (subject, html) = render_email(content, proposal, &recipient.name)?;
        let entry = EmailQueueEntry::pending(new_id(), address, &subject, html, now);
        self.store.enqueue_email(&entry).await?;
        Ok(())
    }

    /// Remind submitters of approved events that start tomorrow.
    /// Each proposal is reminded once per start date. Returns how many
    /// proposals got a reminder on this pass.
    pub async fn notify_upcoming(&self, now: DateTime<Utc>) -> Result<usize, AppError> {
        let approved = self.store.list_proposals(Some(ProposalStatus::Approved)).await?;
        let mut notified = 0;
        for proposal in approved
            .iter()
            .filter(|p| deadline::starts_tomorrow(p, now, self.offset))
        {
            let Some(schedule) = proposal.schedule() else {
                continue;
            };
            let guard = format!("upcoming:{}:{}", proposal.id, schedule.start_date);
            let result = self
                .dispatch(
                    NoticeKind::Upcoming,
                    proposal,
                    &RecipientSelector::for_kind(NoticeKind::Upcoming),
                    Some(&guard),
                    now,
                )
                .await;
            match result {
                Ok(report) => {
                    if !report.failures.is_empty() {
                        log::warn!(
                            "Reminder for proposal {}: {} deliveries failed",
                            proposal.id,
                            report.failures.len()
                        );
                    }
                    if report.persisted > 0 {
                        notified += 1;
                    }
                }
                Err(e) => log::warn!("Reminder for proposal {} failed: {}", proposal.id, e),
            }
        }
        if notified > 0 {
            log::info!("Sent upcoming-event reminders for {} proposals", notified);
        }
        Ok(notified)
    }
}
