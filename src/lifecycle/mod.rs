//! Proposal lifecycle manager: the only writer of a proposal's status and
//! votes.

pub mod deadline;
pub mod transitions;

use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Utc};
use serde::Serialize;

use crate::errors::AppError;
use crate::models::notification::NoticeKind;
use crate::models::outbox::OutboxEvent;
use crate::models::proposal::validate::validate_draft;
use crate::models::proposal::{Proposal, ProposalDraft, ProposalEdits, ProposalStatus};
use crate::models::user::{Actor, Role};
use crate::notifications::relay::OutboxRelay;
use crate::notifications::DispatchReport;
use crate::store::{new_id, Store, StoreError};

pub use deadline::Expiry;
pub use transitions::{EventKind, Plan, TransitionContext, TransitionEvent};

/// Attempts per transition before a revision conflict is surfaced.
const MAX_CONFLICT_RETRIES: usize = 3;

/// Result of a transition request.
#[derive(Debug, Clone)]
pub struct TransitionOutcome {
    pub proposal: Proposal,
    /// False when the proposal was already in the requested state.
    pub changed: bool,
    /// Fan-out of the immediate notification pass, if one ran.
    pub notification: Option<DispatchReport>,
}

/// Counts from one sweep pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub declined: usize,
    pub completed: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct LifecycleManager {
    store: Arc<dyn Store>,
    relay: OutboxRelay,
    offset: FixedOffset,
}

impl LifecycleManager {
    pub fn new(store: Arc<dyn Store>, relay: OutboxRelay, offset: FixedOffset) -> Self {
        LifecycleManager { store, relay, offset }
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    pub async fn get(&self, id: &str) -> Result<Proposal, AppError> {
        self.store
            .get_proposal(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("proposal {id}")))
    }

    /// Create a pending proposal and announce it to the officials.
    pub async fn submit(
        &self,
        actor: &Actor,
        draft: ProposalDraft,
        now: DateTime<Utc>,
    ) -> Result<TransitionOutcome, AppError> {
        let errors = validate_draft(&draft, now, self.offset);
        if !errors.is_empty() {
            return Err(AppError::Validation(errors));
        }

        let proposal = Proposal::from_draft(new_id(), &actor.uid, draft, now);
        let event = OutboxEvent::new(new_id(), &proposal.id, NoticeKind::NewPending, proposal.revision, now);
        self.store.insert_proposal(&proposal, &event).await?;
        log::info!("Proposal {} submitted by {}", proposal.id, actor.uid);

        let notification = self.announce(&event, now).await;
        let proposal = self.get(&proposal.id).await.unwrap_or(proposal);
        Ok(TransitionOutcome {
            proposal,
            changed: true,
            notification,
        })
    }

    /// Create a new pending proposal from a declined or cancelled one.
    /// The original record is left untouched.
    pub async fn resubmit(
        &self,
        actor: &Actor,
        original_id: &str,
        edits: ProposalEdits,
        now: DateTime<Utc>,
    ) -> Result<TransitionOutcome, AppError> {
        let original = self.get(original_id).await?;
        if !original.status.allows_resubmission() {
            return Err(AppError::invalid(
                original.status,
                "resubmit",
                "only declined or cancelled proposals can be resubmitted",
            ));
        }
        let draft = ProposalDraft::from_proposal(&original)
            .ok_or_else(|| AppError::validation("Original proposal has no event date"))?
            .with_edits(edits);
        let outcome = self.submit(actor, draft, now).await?;
        log::info!("Proposal {} resubmitted as {}", original_id, outcome.proposal.id);
        Ok(outcome)
    }

    /// Apply an operator event, then run the notification pass for it.
    /// Notification failures are reported in the outcome, never rolled back.
    pub async fn apply_transition(
        &self,
        id: &str,
        event: TransitionEvent,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<TransitionOutcome, AppError> {
        let (proposal, outbox) = self.commit(id, &event, &actor.uid, now).await?;
        let Some(proposal) = proposal else {
            return Ok(TransitionOutcome {
                proposal: self.get(id).await?,
                changed: false,
                notification: None,
            });
        };
        log::info!(
            "Proposal {} {} by {} -> {}",
            id,
            event.kind().as_str(),
            actor.uid,
            proposal.status
        );

        let notification = match &outbox {
            Some(event) => self.announce(event, now).await,
            None => None,
        };
        let proposal = if notification.is_some() {
            self.get(id).await.unwrap_or(proposal)
        } else {
            proposal
        };
        Ok(TransitionOutcome {
            proposal,
            changed: true,
            notification,
        })
    }

    /// Apply the time-based transitions to every qualifying proposal.
    ///
    /// Safe to run repeatedly and from concurrent callers: each proposal is
    /// updated on its own and a second pass finds nothing left to do. The
    /// owners are alerted later by the outbox relay.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<SweepReport, AppError> {
        let mut report = SweepReport::default();

        let pending = self.store.list_proposals(Some(ProposalStatus::Pending)).await?;
        let rescheduled = self.store.list_proposals(Some(ProposalStatus::Rescheduled)).await?;
        for proposal in pending.iter().chain(rescheduled.iter()) {
            if deadline::evaluate(proposal, now, self.offset) != Some(Expiry::MissedDeadline) {
                continue;
            }
            match self.commit(&proposal.id, &TransitionEvent::MissDeadline, "system", now).await {
                Ok((Some(_), _)) => report.declined += 1,
                Ok((None, _)) => {}
                Err(AppError::InvalidTransition { .. }) => {
                    // Someone voted or decided in between.
                }
                Err(e) => {
                    log::warn!("Sweep: failed to expire proposal {}: {}", proposal.id, e);
                    report.failed += 1;
                }
            }
        }

        for proposal in self.store.list_proposals(Some(ProposalStatus::Approved)).await? {
            if deadline::evaluate(&proposal, now, self.offset) != Some(Expiry::Completed) {
                continue;
            }
            match self.commit(&proposal.id, &TransitionEvent::Complete, "system", now).await {
                Ok((Some(_), _)) => report.completed += 1,
                Ok((None, _)) => {}
                Err(AppError::InvalidTransition { .. }) => {}
                Err(e) => {
                    log::warn!("Sweep: failed to complete proposal {}: {}", proposal.id, e);
                    report.failed += 1;
                }
            }
        }

        if report.declined + report.completed + report.failed > 0 {
            log::info!(
                "Sweep: declined={} completed={} failed={}",
                report.declined,
                report.completed,
                report.failed
            );
        }
        Ok(report)
    }

    /// Read, plan and conditionally write, retrying on revision conflicts.
    /// Returns the written proposal (None for a no-op) and its outbox event.
    async fn commit(
        &self,
        id: &str,
        event: &TransitionEvent,
        actor_uid: &str,
        now: DateTime<Utc>,
    ) -> Result<(Option<Proposal>, Option<OutboxEvent>), AppError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let current = self.get(id).await?;
            let electorate = match event {
                TransitionEvent::Vote { .. } => self.store.list_users_by_roles(&[Role::Official]).await?.len(),
                _ => 0,
            };
            let ctx = TransitionContext {
                actor_uid,
                now,
                offset: self.offset,
                electorate,
            };

            let (next, notice) = match transitions::plan(&current, event, &ctx)? {
                Plan::NoOp => return Ok((None, None)),
                Plan::Write { next, notice } => (next, notice),
            };
            let outbox = notice.map(|kind| OutboxEvent::new(new_id(), id, kind, next.revision, now));

            match self.store.update_proposal(&next, current.revision, outbox.as_ref()).await {
                Ok(()) => return Ok((Some(next), outbox)),
                Err(StoreError::Conflict { .. }) if attempt < MAX_CONFLICT_RETRIES => {
                    log::debug!("Proposal {} changed underneath, retrying (attempt {})", id, attempt);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Immediate notification pass for a freshly written event.
    async fn announce(&self, event: &OutboxEvent, now: DateTime<Utc>) -> Option<DispatchReport> {
        match self.relay.process(event, now).await {
            Ok(report) => {
                if !report.failures.is_empty() {
                    log::warn!(
                        "Notification for proposal {} incomplete ({} failures); left for the relay",
                        event.proposal_id,
                        report.failures.len()
                    );
                }
                Some(report)
            }
            Err(e) => {
                log::error!("Notification for proposal {} failed: {}", event.proposal_id, e);
                None
            }
        }
    }
}
