//! Time-based decisions for proposals. Pure functions of "now" and the
//! proposal's recorded dates; the store-local calendar is a fixed UTC offset.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};

use crate::models::proposal::types::end_of_day;
use crate::models::proposal::{Proposal, ProposalStatus, Schedule};

/// What the sweep must do with a proposal, if anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    MissedDeadline,
    Completed,
}

fn to_utc(local: NaiveDateTime, offset: FixedOffset) -> Option<DateTime<Utc>> {
    offset
        .from_local_datetime(&local)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Event start. A date without a time starts at local midnight.
pub fn start_instant(schedule: &Schedule, offset: FixedOffset) -> Option<DateTime<Utc>> {
    let time = schedule.start_time.unwrap_or(NaiveTime::MIN);
    to_utc(schedule.start_date.and_time(time), offset)
}

/// Event end. A finish date without a time ends at the end of that local day.
pub fn finish_instant(schedule: &Schedule, offset: FixedOffset) -> Option<DateTime<Utc>> {
    let time = schedule.finish_time.unwrap_or_else(end_of_day);
    to_utc(schedule.finish_date.and_time(time), offset)
}

/// Voting deadline of a pending proposal: the start of the event.
pub fn voting_deadline(proposal: &Proposal, offset: FixedOffset) -> Option<DateTime<Utc>> {
    proposal.schedule().and_then(|s| start_instant(&s, offset))
}

pub fn is_deadline_missed(proposal: &Proposal, now: DateTime<Utc>, offset: FixedOffset) -> bool {
    proposal.status.effective() == ProposalStatus::Pending
        && proposal.votes.is_empty()
        && voting_deadline(proposal, offset).is_some_and(|deadline| now > deadline)
}

pub fn is_event_finished(proposal: &Proposal, now: DateTime<Utc>, offset: FixedOffset) -> bool {
    proposal.status == ProposalStatus::Approved
        && proposal
            .schedule()
            .and_then(|s| finish_instant(&s, offset))
            .is_some_and(|end| now > end)
}

/// Decide whether a proposal must be auto-transitioned at `now`.
pub fn evaluate(proposal: &Proposal, now: DateTime<Utc>, offset: FixedOffset) -> Option<Expiry> {
    if is_deadline_missed(proposal, now, offset) {
        Some(Expiry::MissedDeadline)
    } else if is_event_finished(proposal, now, offset) {
        Some(Expiry::Completed)
    } else {
        None
    }
}

/// Calendar date in the store-local zone.
pub fn local_date(now: DateTime<Utc>, offset: FixedOffset) -> NaiveDate {
    now.with_timezone(&offset).date_naive()
}

/// "Tomorrow" in the store-local zone.
pub fn local_tomorrow(now: DateTime<Utc>, offset: FixedOffset) -> NaiveDate {
    local_date(now, offset) + Duration::days(1)
}

/// Whether an approved proposal's event starts on the local day after `now`.
pub fn starts_tomorrow(proposal: &Proposal, now: DateTime<Utc>, offset: FixedOffset) -> bool {
    proposal.status == ProposalStatus::Approved
        && proposal
            .schedule()
            .is_some_and(|s| s.start_date == local_tomorrow(now, offset))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::proposal::{ProposalDraft, VoteChoice};

    fn manila() -> FixedOffset {
        FixedOffset::east_opt(8 * 3600).unwrap()
    }

    fn proposal_on(start: NaiveDate, start_time: Option<NaiveTime>, status: ProposalStatus) -> Proposal {
        let mut p = Proposal::from_draft(
            "p1".into(),
            "u1",
            ProposalDraft {
                title: "Feeding program".into(),
                description: "Monthly feeding".into(),
                location: "Day care center".into(),
                note: None,
                schedule: Schedule {
                    start_date: start,
                    start_time,
                    finish_date: start,
                    finish_time: None,
                },
                file_url: None,
                attachments: vec![],
            },
            Utc::now(),
        );
        p.status = status;
        p
    }

    fn utc(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    #[test]
    fn test_pending_without_votes_misses_deadline_after_start() {
        let start = NaiveDate::from_ymd_opt(2026, 5, 10).unwrap();
        let p = proposal_on(start, NaiveTime::from_hms_opt(9, 0, 0), ProposalStatus::Pending);
        // 09:00 +08:00 is 01:00 UTC.
        assert_eq!(evaluate(&p, utc(2026, 5, 10, 0), manila()), None);
        assert_eq!(evaluate(&p, utc(2026, 5, 10, 2), manila()), Some(Expiry::MissedDeadline));
    }

    #[test]
    fn test_votes_keep_a_pending_proposal_alive() {
        let start = NaiveDate::from_ymd_opt(2026, 5, 10).unwrap();
        let mut p = proposal_on(start, None, ProposalStatus::Pending);
        p.votes.cast("o1", VoteChoice::Reject);
        assert_eq!(evaluate(&p, utc(2026, 6, 1, 0), manila()), None);
    }

    #[test]
    fn test_approved_completes_after_the_event_day_ends() {
        let start = NaiveDate::from_ymd_opt(2026, 5, 10).unwrap();
        let p = proposal_on(start, None, ProposalStatus::Approved);
        // End of 10 May local is 15:59:59 UTC.
        assert_eq!(evaluate(&p, utc(2026, 5, 10, 15), manila()), None);
        assert_eq!(evaluate(&p, utc(2026, 5, 10, 16), manila()), Some(Expiry::Completed));
    }

    #[test]
    fn test_terminal_statuses_are_never_swept() {
        let start = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        for status in [
            ProposalStatus::Rejected,
            ProposalStatus::Cancelled,
            ProposalStatus::DeclinedMissedDeadline,
            ProposalStatus::Done,
        ] {
            let p = proposal_on(start, None, status);
            assert_eq!(evaluate(&p, utc(2026, 1, 1, 0), manila()), None);
        }
    }

    #[test]
    fn test_tomorrow_uses_local_calendar() {
        // 20:00 UTC on 9 May is already 10 May in Manila.
        let now = utc(2026, 5, 9, 20);
        assert_eq!(local_tomorrow(now, manila()), NaiveDate::from_ymd_opt(2026, 5, 11).unwrap());
        let p = proposal_on(NaiveDate::from_ymd_opt(2026, 5, 11).unwrap(), None, ProposalStatus::Approved);
        assert!(starts_tomorrow(&p, now, manila()));
    }
}
