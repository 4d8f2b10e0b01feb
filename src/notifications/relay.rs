use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::{DispatchReport, Dispatcher, RecipientSelector};
use crate::errors::AppError;
use crate::models::outbox::OutboxEvent;
use crate::store::Store;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayReport {
    pub processed: usize,
    pub pending: usize,
}

/// Turns outbox events into dispatches. An event is marked processed only
/// after every recipient was served, so an interrupted fan-out is picked up
/// again on the next drain.
#[derive(Clone)]
pub struct OutboxRelay {
    store: Arc<dyn Store>,
    dispatcher: Dispatcher,
}

impl OutboxRelay {
    pub fn new(store: Arc<dyn Store>, dispatcher: Dispatcher) -> Self {
        OutboxRelay { store, dispatcher }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub async fn process(&self, event: &OutboxEvent, now: DateTime<Utc>) -> Result<DispatchReport, AppError> {
        let Some(proposal) = self.store.get_proposal(&event.proposal_id).await? else {
            log::warn!("Outbox event {} refers to missing proposal {}", event.id, event.proposal_id);
            self.store.mark_event_processed(&event.id, now).await?;
            return Ok(DispatchReport::default());
        };

        let scope = event.delivery_scope();
        let report = self
            .dispatcher
            .dispatch(
                event.kind,
                &proposal,
                &RecipientSelector::for_kind(event.kind),
                Some(&scope),
                now,
            )
            .await?;
        if !report.failures.is_empty() {
            return Ok(report);
        }

        self.store.mark_event_processed(&event.id, now).await?;
        if !self.store.mark_notified(&proposal.id, event.revision).await? {
            log::debug!(
                "Proposal {} changed status after revision {}; notified flag left to the newer event",
                proposal.id,
                event.revision
            );
        }
        Ok(report)
    }

    /// Process up to `limit` unprocessed events, oldest first.
    pub async fn drain(&self, now: DateTime<Utc>, limit: usize) -> Result<RelayReport, AppError> {
        let events = self.store.unprocessed_events(limit).await?;
        let mut report = RelayReport::default();
        for event in &events {
            match self.process(event, now).await {
                Ok(r) if r.failures.is_empty() => report.processed += 1,
                Ok(r) => {
                    log::warn!("Outbox event {}: {} deliveries failed", event.id, r.failures.len());
                    report.pending += 1;
                }
                Err(e) => {
                    log::error!("Outbox event {} failed: {}", event.id, e);
                    report.pending += 1;
                }
            }
        }
        if report.processed + report.pending > 0 {
            log::info!("Outbox relay: processed={} pending={}", report.processed, report.pending);
        }
        Ok(report)
    }
}
