//! The proposal state machine: which events apply to which statuses, and the
//! field changes each one makes.

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

use super::deadline;
use crate::errors::AppError;
use crate::models::notification::NoticeKind;
use crate::models::proposal::validate;
use crate::models::proposal::{Proposal, ProposalStatus, Schedule, VoteChoice};

/// An operator or system action on an existing proposal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TransitionEvent {
    Vote { choice: VoteChoice },
    Approve,
    Decline,
    Cancel { reason: String },
    Reschedule { schedule: Schedule },
    Complete,
    MissDeadline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Vote,
    Approve,
    Decline,
    Cancel,
    Reschedule,
    Complete,
    MissDeadline,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Vote => "vote on",
            EventKind::Approve => "approve",
            EventKind::Decline => "decline",
            EventKind::Cancel => "cancel",
            EventKind::Reschedule => "reschedule",
            EventKind::Complete => "complete",
            EventKind::MissDeadline => "expire",
        }
    }

    /// Status that makes a repeated event a no-op.
    fn settled_status(&self) -> Option<ProposalStatus> {
        match self {
            EventKind::Approve => Some(ProposalStatus::Approved),
            EventKind::Decline => Some(ProposalStatus::Rejected),
            EventKind::Cancel => Some(ProposalStatus::Cancelled),
            EventKind::Complete => Some(ProposalStatus::Done),
            EventKind::MissDeadline => Some(ProposalStatus::DeclinedMissedDeadline),
            EventKind::Vote | EventKind::Reschedule => None,
        }
    }
}

impl TransitionEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            TransitionEvent::Vote { .. } => EventKind::Vote,
            TransitionEvent::Approve => EventKind::Approve,
            TransitionEvent::Decline => EventKind::Decline,
            TransitionEvent::Cancel { .. } => EventKind::Cancel,
            TransitionEvent::Reschedule { .. } => EventKind::Reschedule,
            TransitionEvent::Complete => EventKind::Complete,
            TransitionEvent::MissDeadline => EventKind::MissDeadline,
        }
    }
}

/// The transition table. Returns the status an event leads to from `from`,
/// or None when the edge does not exist. A vote may additionally resolve the
/// proposal, see [`resolve_votes`].
pub fn target(from: ProposalStatus, kind: EventKind) -> Option<ProposalStatus> {
    use EventKind as E;
    use ProposalStatus as S;

    match (from.effective(), kind) {
        (S::Pending, E::Vote) => Some(S::Pending),
        (S::Pending, E::Approve) => Some(S::Approved),
        (S::Pending, E::Decline) => Some(S::Rejected),
        (S::Pending, E::MissDeadline) => Some(S::DeclinedMissedDeadline),
        // Passes through Rescheduled and lands back in Pending for a re-vote.
        (S::Approved, E::Reschedule) => Some(S::Pending),
        (S::Approved, E::Cancel) => Some(S::Cancelled),
        (S::Approved, E::Complete) => Some(S::Done),
        _ => None,
    }
}

/// Outcome of the majority rule over `electorate` officials.
pub fn resolve_votes(approve: usize, reject: usize, electorate: usize) -> Option<ProposalStatus> {
    if electorate == 0 {
        return None;
    }
    let majority = electorate / 2 + 1;
    if approve >= majority {
        Some(ProposalStatus::Approved)
    } else if reject >= majority || approve + reject >= electorate {
        // Everyone voted and nobody reached a majority.
        Some(ProposalStatus::Rejected)
    } else {
        None
    }
}

/// Inputs a transition needs beyond the proposal itself.
#[derive(Debug, Clone)]
pub struct TransitionContext<'a> {
    pub actor_uid: &'a str,
    pub now: DateTime<Utc>,
    pub offset: FixedOffset,
    /// Enabled officials eligible to vote.
    pub electorate: usize,
}

/// What applying an event amounts to.
#[derive(Debug, Clone, PartialEq)]
pub enum Plan {
    /// Already in the requested state. Nothing to write.
    NoOp,
    Write {
        next: Proposal,
        notice: Option<NoticeKind>,
    },
}

/// Validate `event` against `current` and compute the updated record.
/// Pure: the caller persists the result.
pub fn plan(current: &Proposal, event: &TransitionEvent, ctx: &TransitionContext<'_>) -> Result<Plan, AppError> {
    let kind = event.kind();
    let from = current.status;

    if let Some(settled) = kind.settled_status() {
        if from == settled {
            return Ok(Plan::NoOp);
        }
    }

    let Some(to) = target(from, kind) else {
        return Err(AppError::invalid(from, kind.as_str(), "no such transition"));
    };

    let mut next = current.clone();
    next.revision = current.revision + 1;
    next.status = to;

    let notice = match event {
        TransitionEvent::Vote { choice } => {
            match current.votes.choice_of(ctx.actor_uid) {
                Some(existing) if existing == *choice => return Ok(Plan::NoOp),
                Some(_) => {
                    return Err(AppError::invalid(from, kind.as_str(), "this official already voted"));
                }
                None => {}
            }
            next.votes.cast(ctx.actor_uid, *choice);
            match resolve_votes(next.votes.approve.len(), next.votes.reject.len(), ctx.electorate) {
                Some(ProposalStatus::Approved) => {
                    next.status = ProposalStatus::Approved;
                    Some(NoticeKind::Approved)
                }
                Some(_) => {
                    next.status = ProposalStatus::Rejected;
                    Some(NoticeKind::Declined)
                }
                None => {
                    // A status-neutral vote keeps the status; normalise a stale Rescheduled.
                    next.status = ProposalStatus::Pending;
                    None
                }
            }
        }
        TransitionEvent::Approve => Some(NoticeKind::Approved),
        TransitionEvent::Decline => Some(NoticeKind::Declined),
        TransitionEvent::MissDeadline => {
            if !current.votes.is_empty() {
                return Err(AppError::invalid(from, kind.as_str(), "votes have already been cast"));
            }
            if !deadline::is_deadline_missed(current, ctx.now, ctx.offset) {
                return Err(AppError::invalid(from, kind.as_str(), "the deadline has not passed"));
            }
            Some(NoticeKind::MissedDeadline)
        }
        TransitionEvent::Cancel { reason } => {
            if let Some(error) = validate::validate_reason(reason) {
                return Err(AppError::validation(error));
            }
            next.cancellation_reason = Some(reason.trim().to_string());
            Some(NoticeKind::Cancelled)
        }
        TransitionEvent::Reschedule { schedule } => {
            let errors = validate::validate_schedule(schedule, ctx.now, ctx.offset);
            if !errors.is_empty() {
                return Err(AppError::Validation(errors));
            }
            next.set_schedule(*schedule);
            next.votes.clear();
            Some(NoticeKind::Rescheduled)
        }
        TransitionEvent::Complete => {
            next.completed_date = Some(ctx.now);
            None
        }
    };

    if notice.is_some() || next.status.effective() != current.status.effective() {
        next.status_revision = next.revision;
    }
    if notice.is_some() {
        next.notified = false;
    } else if next.status != current.status {
        // Silent transitions have nothing left to announce.
        next.notified = true;
    }

    Ok(Plan::Write { next, notice })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveTime};

    use crate::models::proposal::ProposalDraft;

    fn offset() -> FixedOffset {
        FixedOffset::east_opt(8 * 3600).unwrap()
    }

    fn proposal(status: ProposalStatus, start_in_days: i64) -> Proposal {
        let day = (Utc::now() + Duration::days(start_in_days)).date_naive();
        let mut p = Proposal::from_draft(
            "p1".into(),
            "staff1",
            ProposalDraft {
                title: "Blood letting".into(),
                description: "Red Cross partnership".into(),
                location: "Barangay hall".into(),
                note: None,
                schedule: Schedule {
                    start_date: day,
                    start_time: NaiveTime::from_hms_opt(8, 0, 0),
                    finish_date: day,
                    finish_time: NaiveTime::from_hms_opt(12, 0, 0),
                },
                file_url: None,
                attachments: vec![],
            },
            Utc::now(),
        );
        p.status = status;
        p.revision = 4;
        p
    }

    fn ctx(actor: &str, electorate: usize) -> TransitionContext<'_> {
        TransitionContext {
            actor_uid: actor,
            now: Utc::now(),
            offset: offset(),
            electorate,
        }
    }

    #[test]
    fn test_table_rejects_edges_out_of_terminal_states() {
        for from in [ProposalStatus::Done, ProposalStatus::Cancelled, ProposalStatus::Rejected] {
            assert_eq!(target(from, EventKind::Vote), None);
            assert_eq!(target(from, EventKind::Reschedule), None);
        }
        assert_eq!(target(ProposalStatus::Approved, EventKind::Reschedule), Some(ProposalStatus::Pending));
        assert_eq!(target(ProposalStatus::Rescheduled, EventKind::Vote), Some(ProposalStatus::Pending));
    }

    #[test]
    fn test_majority_rule() {
        assert_eq!(resolve_votes(1, 0, 3), None);
        assert_eq!(resolve_votes(2, 0, 3), Some(ProposalStatus::Approved));
        assert_eq!(resolve_votes(0, 2, 3), Some(ProposalStatus::Rejected));
        assert_eq!(resolve_votes(1, 1, 2), Some(ProposalStatus::Rejected));
        assert_eq!(resolve_votes(1, 0, 0), None);
    }

    #[test]
    fn test_repeated_event_is_a_no_op() {
        let p = proposal(ProposalStatus::Approved, 3);
        assert_eq!(plan(&p, &TransitionEvent::Approve, &ctx("admin", 2)).unwrap(), Plan::NoOp);
    }

    #[test]
    fn test_vote_twice_same_way_is_a_no_op_other_way_fails() {
        let mut p = proposal(ProposalStatus::Pending, 3);
        p.votes.cast("o1", VoteChoice::Approve);
        let same = TransitionEvent::Vote { choice: VoteChoice::Approve };
        let flip = TransitionEvent::Vote { choice: VoteChoice::Reject };
        assert_eq!(plan(&p, &same, &ctx("o1", 3)).unwrap(), Plan::NoOp);
        assert!(matches!(
            plan(&p, &flip, &ctx("o1", 3)),
            Err(AppError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_deciding_vote_approves_and_resets_notified() {
        let mut p = proposal(ProposalStatus::Pending, 3);
        p.notified = true;
        p.votes.cast("o1", VoteChoice::Approve);
        let event = TransitionEvent::Vote { choice: VoteChoice::Approve };
        let Plan::Write { next, notice } = plan(&p, &event, &ctx("o2", 3)).unwrap() else {
            panic!("expected a write");
        };
        assert_eq!(next.status, ProposalStatus::Approved);
        assert_eq!(notice, Some(NoticeKind::Approved));
        assert!(!next.notified);
        assert_eq!(next.revision, 5);
        assert_eq!(next.status_revision, 5);
    }

    #[test]
    fn test_neutral_vote_keeps_status_revision() {
        let mut p = proposal(ProposalStatus::Pending, 3);
        p.status_revision = 2;
        let event = TransitionEvent::Vote { choice: VoteChoice::Approve };
        let Plan::Write { next, notice } = plan(&p, &event, &ctx("o1", 3)).unwrap() else {
            panic!("expected a write");
        };
        assert_eq!(notice, None);
        assert_eq!(next.revision, 5);
        assert_eq!(next.status_revision, 2);
    }

    #[test]
    fn test_reschedule_clears_votes_and_returns_to_pending() {
        let mut p = proposal(ProposalStatus::Approved, 3);
        p.votes.cast("o1", VoteChoice::Approve);
        p.votes.cast("o2", VoteChoice::Approve);
        let mut schedule = p.schedule().unwrap();
        schedule.start_date += Duration::days(7);
        schedule.finish_date += Duration::days(7);
        let event = TransitionEvent::Reschedule { schedule };
        let Plan::Write { next, notice } = plan(&p, &event, &ctx("staff1", 2)).unwrap() else {
            panic!("expected a write");
        };
        assert_eq!(next.status, ProposalStatus::Pending);
        assert!(next.votes.is_empty());
        assert_eq!(next.start_date, Some(schedule.start_date));
        assert_eq!(notice, Some(NoticeKind::Rescheduled));
    }

    #[test]
    fn test_reschedule_rejects_finish_before_start() {
        let p = proposal(ProposalStatus::Approved, 3);
        let mut schedule = p.schedule().unwrap();
        schedule.finish_date = schedule.start_date - Duration::days(1);
        let result = plan(&p, &TransitionEvent::Reschedule { schedule }, &ctx("staff1", 2));
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn test_cancel_requires_a_reason() {
        let p = proposal(ProposalStatus::Approved, 3);
        let blank = TransitionEvent::Cancel { reason: " ".into() };
        assert!(matches!(plan(&p, &blank, &ctx("admin", 2)), Err(AppError::Validation(_))));
        let pending = proposal(ProposalStatus::Pending, 3);
        let real = TransitionEvent::Cancel { reason: "Typhoon".into() };
        assert!(matches!(
            plan(&pending, &real, &ctx("admin", 2)),
            Err(AppError::InvalidTransition { from: ProposalStatus::Pending, .. })
        ));
    }

    #[test]
    fn test_missed_deadline_requires_elapsed_deadline_and_no_votes() {
        let future = proposal(ProposalStatus::Pending, 3);
        assert!(plan(&future, &TransitionEvent::MissDeadline, &ctx("system", 2)).is_err());

        let past = proposal(ProposalStatus::Pending, -1);
        let Plan::Write { next, notice } = plan(&past, &TransitionEvent::MissDeadline, &ctx("system", 2)).unwrap()
        else {
            panic!("expected a write");
        };
        assert_eq!(next.status, ProposalStatus::DeclinedMissedDeadline);
        assert_eq!(notice, Some(NoticeKind::MissedDeadline));
        assert!(!next.notified);
    }

    #[test]
    fn test_manual_completion_is_silent() {
        let p = proposal(ProposalStatus::Approved, 3);
        let Plan::Write { next, notice } = plan(&p, &TransitionEvent::Complete, &ctx("admin", 2)).unwrap() else {
            panic!("expected a write");
        };
        assert_eq!(next.status, ProposalStatus::Done);
        assert!(next.completed_date.is_some());
        assert_eq!(notice, None);
        assert!(next.notified);
    }
}
