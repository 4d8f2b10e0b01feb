use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::lifecycle::{SweepReport, TransitionOutcome};
use crate::models::proposal::Proposal;
use crate::notifications::DispatchReport;

/// Generic paginated response wrapper for API endpoints.
#[derive(Serialize, Debug, Clone)]
pub struct PaginatedResponse<T: Serialize> {
    pub items: Vec<T>,
    pub page: i64,
    pub per_page: i64,
    pub total: i64,
}

impl<T: Serialize> PaginatedResponse<T> {
    /// Slice one page out of a full result list.
    pub fn paginate(all: Vec<T>, page: i64, per_page: i64) -> Self {
        let total = all.len() as i64;
        let offset = ((page - 1) * per_page) as usize;
        let items = all.into_iter().skip(offset).take(per_page as usize).collect();
        PaginatedResponse {
            items,
            page,
            per_page,
            total,
        }
    }
}

/// Page query parameters: page (default 1), per_page (default 25, max 100).
#[derive(Deserialize, Debug, Default)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
    pub status: Option<String>,
}

impl PageQuery {
    pub fn page(&self) -> i64 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn per_page(&self) -> i64 {
        self.per_page.unwrap_or(25).clamp(1, 100)
    }
}

/// Proposal as returned by the API: the stored document plus its display label.
#[derive(Serialize, Debug, Clone)]
pub struct ApiProposalResponse {
    #[serde(flatten)]
    pub proposal: Proposal,
    pub status_label: &'static str,
}

impl From<Proposal> for ApiProposalResponse {
    fn from(proposal: Proposal) -> Self {
        let status_label = proposal.status.label();
        ApiProposalResponse { proposal, status_label }
    }
}

#[derive(Serialize, Debug, Clone)]
pub struct ApiTransitionResponse {
    pub proposal: ApiProposalResponse,
    pub changed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification: Option<DispatchReport>,
}

impl From<TransitionOutcome> for ApiTransitionResponse {
    fn from(outcome: TransitionOutcome) -> Self {
        ApiTransitionResponse {
            proposal: outcome.proposal.into(),
            changed: outcome.changed,
            notification: outcome.notification,
        }
    }
}

#[derive(Serialize, Debug, Clone)]
pub struct ApiDashboardResponse {
    /// Proposal count per stored status value.
    pub counts: BTreeMap<String, usize>,
    pub total: usize,
    pub sweep: SweepReport,
    pub unread_notifications: i64,
}

#[derive(Serialize, Debug, Clone)]
pub struct ApiUpcomingResponse {
    pub notified: usize,
}

/// API error response.
#[derive(Serialize, Debug)]
pub struct ApiErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paginate_slices_and_counts() {
        let page = PaginatedResponse::paginate((1..=30).collect::<Vec<i32>>(), 2, 25);
        assert_eq!(page.items, vec![26, 27, 28, 29, 30]);
        assert_eq!(page.total, 30);
    }

    #[test]
    fn test_page_query_clamps() {
        let q = PageQuery {
            page: Some(0),
            per_page: Some(500),
            status: None,
        };
        assert_eq!(q.page(), 1);
        assert_eq!(q.per_page(), 100);
    }
}
