use askama::Template;
use serde_json::{Map, Value};

use crate::models::notification::NoticeKind;
use crate::models::proposal::Proposal;
use crate::templates_structs::EmailNoticeTemplate;

/// Title, body and kind-specific payload fields of one notification.
#[derive(Debug, Clone, PartialEq)]
pub struct NoticeContent {
    pub title: String,
    pub body: String,
    pub extra: Map<String, Value>,
}

fn start_label(proposal: &Proposal) -> String {
    match proposal.schedule() {
        Some(s) => match s.start_time {
            Some(t) => format!("{} {}", s.start_date.format("%B %-d, %Y"), t.format("%-I:%M %p")),
            None => s.start_date.format("%B %-d, %Y").to_string(),
        },
        None => "an unscheduled date".to_string(),
    }
}

/// Fixed wording per notice kind.
pub fn notice_content(kind: NoticeKind, proposal: &Proposal) -> NoticeContent {
    let name = &proposal.title;
    let (title, body) = match kind {
        NoticeKind::NewPending => (
            "New Event Proposal".to_string(),
            format!("\"{name}\" was submitted and is awaiting your vote."),
        ),
        NoticeKind::Approved => (
            "Proposal Approved".to_string(),
            format!("Your proposal \"{name}\" has been approved."),
        ),
        NoticeKind::Declined => (
            "Proposal Declined".to_string(),
            format!("Your proposal \"{name}\" has been declined."),
        ),
        NoticeKind::MissedDeadline => (
            "Proposal Declined".to_string(),
            format!("Your proposal \"{name}\" was declined because no votes were cast before the deadline."),
        ),
        NoticeKind::Cancelled => {
            let reason = proposal.cancellation_reason.as_deref().unwrap_or("no reason given");
            (
                "Event Cancelled".to_string(),
                format!("\"{name}\" has been cancelled. Reason: {reason}"),
            )
        }
        NoticeKind::Rescheduled => (
            "Event Rescheduled".to_string(),
            format!("\"{name}\" was moved to {} and needs a new vote.", start_label(proposal)),
        ),
        NoticeKind::Upcoming => (
            "Upcoming Event Tomorrow".to_string(),
            format!("\"{name}\" starts {} at {}.", start_label(proposal), proposal.location),
        ),
    };

    let mut extra = Map::new();
    extra.insert("title".into(), Value::String(proposal.title.clone()));
    extra.insert("status".into(), Value::String(proposal.status.label().to_string()));
    match kind {
        NoticeKind::Cancelled => {
            if let Some(reason) = &proposal.cancellation_reason {
                extra.insert("reason".into(), Value::String(reason.clone()));
            }
        }
        NoticeKind::Rescheduled | NoticeKind::Upcoming => {
            if let Some(s) = proposal.schedule() {
                extra.insert("startDate".into(), Value::String(s.start_date.to_string()));
            }
        }
        _ => {}
    }

    NoticeContent { title, body, extra }
}

/// Subject and HTML body of the email that accompanies a notice.
pub fn render_email(
    content: &NoticeContent,
    proposal: &Proposal,
    recipient_name: &str,
) -> Result<(String, String), askama::Error> {
    let tmpl = EmailNoticeTemplate {
        heading: &content.title,
        recipient_name,
        body: &content.body,
        proposal_title: &proposal.title,
        location: &proposal.location,
        starts: start_label(proposal),
        status_label: proposal.status.label(),
    };
    let subject = format!("{}: {}", content.title, proposal.title);
    Ok((subject, tmpl.render()?))
}
