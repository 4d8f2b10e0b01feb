use std::collections::BTreeMap;

use actix_web::{web, HttpResponse};
use chrono::Utc;

use super::identity::require_role;
use super::AppState;
use crate::errors::AppError;
use crate::models::proposal::ProposalStatus;
use crate::models::user::{Actor, Role};
use crate::templates_structs::{ApiDashboardResponse, ApiUpcomingResponse};

/// GET /api/dashboard - Applies due deadline transitions, then reports
/// proposal counts per status.
pub async fn index(state: web::Data<AppState>, actor: Actor) -> Result<HttpResponse, AppError> {
    let now = Utc::now();
    let sweep = state.manager.sweep_expired(now).await?;

    let proposals = state.store.list_proposals(None).await?;
    let mut counts: BTreeMap<String, usize> = ProposalStatus::ALL
        .iter()
        .map(|s| (s.as_str().to_string(), 0))
        .collect();
    for p in &proposals {
        *counts.entry(p.status.as_str().to_string()).or_default() += 1;
    }
    let unread_notifications = state.store.count_unread(&actor.uid, now).await?;

    Ok(HttpResponse::Ok().json(ApiDashboardResponse {
        counts,
        total: proposals.len(),
        sweep,
        unread_notifications,
    }))
}

/// POST /api/reminders/upcoming - Send tomorrow's event reminders now.
pub async fn remind_upcoming(state: web::Data<AppState>, actor: Actor) -> Result<HttpResponse, AppError> {
    require_role(&actor, &[Role::Admin])?;
    let notified = state.dispatcher.notify_upcoming(Utc::now()).await?;
    Ok(HttpResponse::Ok().json(ApiUpcomingResponse { notified }))
}
