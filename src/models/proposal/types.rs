use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// Stored status of a proposal.
///
/// The serialized form is the value persisted in the `status` field. The
/// human-facing label is kept separately in [`ProposalStatus::label`] because
/// `Rejected` is shown as "Declined".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProposalStatus {
    Pending,
    Approved,
    Rejected,
    #[serde(rename = "Declined (Missed Deadline)")]
    DeclinedMissedDeadline,
    Cancelled,
    Rescheduled,
    Done,
}

impl ProposalStatus {
    pub const ALL: [ProposalStatus; 7] = [
        ProposalStatus::Pending,
        ProposalStatus::Approved,
        ProposalStatus::Rejected,
        ProposalStatus::DeclinedMissedDeadline,
        ProposalStatus::Cancelled,
        ProposalStatus::Rescheduled,
        ProposalStatus::Done,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProposalStatus::Pending => "Pending",
            ProposalStatus::Approved => "Approved",
            ProposalStatus::Rejected => "Rejected",
            ProposalStatus::DeclinedMissedDeadline => "Declined (Missed Deadline)",
            ProposalStatus::Cancelled => "Cancelled",
            ProposalStatus::Rescheduled => "Rescheduled",
            ProposalStatus::Done => "Done",
        }
    }

    /// Label shown to users.
    pub fn label(&self) -> &'static str {
        match self {
            ProposalStatus::Rejected => "Declined",
            other => other.as_str(),
        }
    }

    /// Terminal statuses freeze the vote sets.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProposalStatus::Done
                | ProposalStatus::Cancelled
                | ProposalStatus::Rejected
                | ProposalStatus::DeclinedMissedDeadline
        )
    }

    /// Statuses a proposal can be resubmitted from.
    pub fn allows_resubmission(&self) -> bool {
        matches!(
            self,
            ProposalStatus::Rejected | ProposalStatus::Cancelled | ProposalStatus::DeclinedMissedDeadline
        )
    }

    /// `Rescheduled` is transient: a record still carrying it is treated as pending.
    pub fn effective(self) -> ProposalStatus {
        match self {
            ProposalStatus::Rescheduled => ProposalStatus::Pending,
            other => other,
        }
    }
}

impl fmt::Display for ProposalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStatus(pub String);

impl fmt::Display for UnknownStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown proposal status '{}'", self.0)
    }
}

impl std::error::Error for UnknownStatus {}

impl FromStr for ProposalStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProposalStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteChoice {
    Approve,
    Reject,
}

/// Approving and rejecting user ids. A user id lives in at most one set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Votes {
    #[serde(default)]
    pub approve: BTreeSet<String>,
    #[serde(default)]
    pub reject: BTreeSet<String>,
}

impl Votes {
    pub fn is_empty(&self) -> bool {
        self.approve.is_empty() && self.reject.is_empty()
    }

    pub fn choice_of(&self, user_id: &str) -> Option<VoteChoice> {
        if self.approve.contains(user_id) {
            Some(VoteChoice::Approve)
        } else if self.reject.contains(user_id) {
            Some(VoteChoice::Reject)
        } else {
            None
        }
    }

    /// Record a vote for a user that holds no membership yet.
    /// Returns false when the user already voted (either way).
    pub fn cast(&mut self, user_id: &str, choice: VoteChoice) -> bool {
        if self.choice_of(user_id).is_some() {
            return false;
        }
        match choice {
            VoteChoice::Approve => self.approve.insert(user_id.to_string()),
            VoteChoice::Reject => self.reject.insert(user_id.to_string()),
        }
    }

    pub fn clear(&mut self) {
        self.approve.clear();
        self.reject.clear();
    }

    pub fn total(&self) -> usize {
        self.approve.len() + self.reject.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub name: String,
    pub url: String,
    pub uploaded_by: String,
    pub content_type: String,
    pub size: i64,
}

/// Event dates as entered on the proposal form. Times are optional; a
/// date-only value covers the whole local day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    pub start_date: NaiveDate,
    #[serde(default)]
    pub start_time: Option<NaiveTime>,
    pub finish_date: NaiveDate,
    #[serde(default)]
    pub finish_time: Option<NaiveTime>,
}

impl Schedule {
    /// Finish must not come before start. Missing times compare as
    /// start-of-day for the start and end-of-day for the finish.
    pub fn is_ordered(&self) -> bool {
        let start = self.start_date.and_time(self.start_time.unwrap_or(NaiveTime::MIN));
        let finish = self
            .finish_date
            .and_time(self.finish_time.unwrap_or(end_of_day()));
        finish >= start
    }
}

pub(crate) fn end_of_day() -> NaiveTime {
    NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN)
}

/// A proposal document as persisted under `proposals/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Proposal {
    pub id: String,
    pub title: String,
    pub description: String,
    pub location: String,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub start_time: Option<NaiveTime>,
    #[serde(default)]
    pub finish_date: Option<NaiveDate>,
    #[serde(default)]
    pub finish_time: Option<NaiveTime>,
    /// Legacy single-day records.
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub time: Option<NaiveTime>,
    pub status: ProposalStatus,
    pub user_id: String,
    #[serde(default, rename = "fileURL")]
    pub file_url: Option<String>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub votes: Votes,
    #[serde(default)]
    pub notified: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancellation_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub revision: i64,
    /// Revision of the last write that changed the status or raised a notice.
    /// Status-neutral writes such as a non-deciding vote leave it alone.
    #[serde(default)]
    pub status_revision: i64,
}

impl Proposal {
    /// Build a fresh pending proposal owned by `user_id`.
    pub fn from_draft(id: String, user_id: &str, draft: ProposalDraft, now: DateTime<Utc>) -> Self {
        Proposal {
            id,
            title: draft.title.trim().to_string(),
            description: draft.description.trim().to_string(),
            location: draft.location.trim().to_string(),
            note: draft
                .note
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty()),
            start_date: Some(draft.schedule.start_date),
            start_time: draft.schedule.start_time,
            finish_date: Some(draft.schedule.finish_date),
            finish_time: draft.schedule.finish_time,
            date: None,
            time: None,
            status: ProposalStatus::Pending,
            user_id: user_id.to_string(),
            file_url: draft.file_url,
            attachments: draft.attachments,
            votes: Votes::default(),
            notified: false,
            created_at: now,
            cancellation_reason: None,
            completed_date: None,
            revision: 0,
            status_revision: 0,
        }
    }

    /// The event dates, preferring start/finish over the legacy single date.
    pub fn schedule(&self) -> Option<Schedule> {
        match (self.start_date, self.date) {
            (Some(start_date), _) => Some(Schedule {
                start_date,
                start_time: self.start_time,
                finish_date: self.finish_date.unwrap_or(start_date),
                finish_time: if self.finish_date.is_some() {
                    self.finish_time
                } else {
                    None
                },
            }),
            (None, Some(date)) => Some(Schedule {
                start_date: date,
                start_time: self.time,
                finish_date: date,
                finish_time: None,
            }),
            (None, None) => None,
        }
    }

    pub fn set_schedule(&mut self, schedule: Schedule) {
        self.start_date = Some(schedule.start_date);
        self.start_time = schedule.start_time;
        self.finish_date = Some(schedule.finish_date);
        self.finish_time = schedule.finish_time;
        self.date = None;
        self.time = None;
    }
}

/// Editable fields of a proposal, as submitted by staff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposalDraft {
    pub title: String,
    pub description: String,
    pub location: String,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(flatten)]
    pub schedule: Schedule,
    #[serde(default, rename = "fileURL")]
    pub file_url: Option<String>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

impl ProposalDraft {
    /// Copy the editable fields of an existing proposal.
    /// Returns None for records without any event date.
    pub fn from_proposal(proposal: &Proposal) -> Option<Self> {
        Some(ProposalDraft {
            title: proposal.title.clone(),
            description: proposal.description.clone(),
            location: proposal.location.clone(),
            note: proposal.note.clone(),
            schedule: proposal.schedule()?,
            file_url: proposal.file_url.clone(),
            attachments: proposal.attachments.clone(),
        })
    }

    pub fn with_edits(mut self, edits: ProposalEdits) -> Self {
        if let Some(title) = edits.title {
            self.title = title;
        }
        if let Some(description) = edits.description {
            self.description = description;
        }
        if let Some(location) = edits.location {
            self.location = location;
        }
        if let Some(note) = edits.note {
            self.note = Some(note);
        }
        if let Some(schedule) = edits.schedule {
            self.schedule = schedule;
        }
        if let Some(file_url) = edits.file_url {
            self.file_url = Some(file_url);
        }
        if let Some(attachments) = edits.attachments {
            self.attachments = attachments;
        }
        self
    }
}

/// Field overrides applied when resubmitting a declined or cancelled proposal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposalEdits {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub schedule: Option<Schedule>,
    #[serde(default, rename = "fileURL")]
    pub file_url: Option<String>,
    #[serde(default)]
    pub attachments: Option<Vec<Attachment>>,
}
