use chrono::{DateTime, FixedOffset, Utc};

use super::types::{ProposalDraft, Schedule};
use crate::lifecycle::deadline;

pub const TITLE_MAX: usize = 200;
pub const DESCRIPTION_MAX: usize = 5000;
pub const LOCATION_MAX: usize = 200;
pub const NOTE_MAX: usize = 1000;
pub const REASON_MAX: usize = 1000;

/// Validate a required text field with a max length.
pub fn validate_required(value: &str, field_name: &str, max_len: usize) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Some(format!("{field_name} is required"));
    }
    if trimmed.chars().count() > max_len {
        return Some(format!("{field_name} must be at most {max_len} characters"));
    }
    validate_characters(trimmed, field_name)
}

/// Validate an optional text field with a max length (empty is OK).
pub fn validate_optional(value: &str, field_name: &str, max_len: usize) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.chars().count() > max_len {
        return Some(format!("{field_name} must be at most {max_len} characters"));
    }
    validate_characters(trimmed, field_name)
}

/// Markup characters are rejected in free text.
fn validate_characters(value: &str, field_name: &str) -> Option<String> {
    if value.chars().any(|c| c == '<' || c == '>') {
        return Some(format!("{field_name} may not contain '<' or '>'"));
    }
    None
}

/// Validate event dates: start in the future, finish not before start.
pub fn validate_schedule(schedule: &Schedule, now: DateTime<Utc>, offset: FixedOffset) -> Vec<String> {
    let mut errors = Vec::new();
    if !schedule.is_ordered() {
        errors.push("Finish date must not be before the start date".to_string());
    }
    match deadline::start_instant(schedule, offset) {
        Some(start) if start > now => {}
        Some(_) => errors.push("Start date must be in the future".to_string()),
        None => errors.push("Start date is not a valid local time".to_string()),
    }
    errors
}

/// Validate a full submission. Returns every problem found, empty when valid.
pub fn validate_draft(draft: &ProposalDraft, now: DateTime<Utc>, offset: FixedOffset) -> Vec<String> {
    let mut errors: Vec<String> = [
        validate_required(&draft.title, "Title", TITLE_MAX),
        validate_required(&draft.description, "Description", DESCRIPTION_MAX),
        validate_required(&draft.location, "Location", LOCATION_MAX),
        draft
            .note
            .as_deref()
            .and_then(|note| validate_optional(note, "Note", NOTE_MAX)),
    ]
    .into_iter()
    .flatten()
    .collect();

    for attachment in &draft.attachments {
        if attachment.url.trim().is_empty() || attachment.name.trim().is_empty() {
            errors.push("Attachments need a name and a URL".to_string());
            break;
        }
    }

    errors.extend(validate_schedule(&draft.schedule, now, offset));
    errors
}

/// Validate a cancellation reason.
pub fn validate_reason(reason: &str) -> Option<String> {
    validate_required(reason, "Cancellation reason", REASON_MAX)
}
