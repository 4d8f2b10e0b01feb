use actix_web::{web, HttpResponse};
use chrono::Utc;

use super::identity::{require_owner_or_admin, require_role};
use super::AppState;
use crate::errors::AppError;
use crate::lifecycle::TransitionEvent;
use crate::models::proposal::{ProposalDraft, ProposalEdits, ProposalStatus};
use crate::models::user::{Actor, Role};
use crate::templates_structs::{ApiProposalResponse, ApiTransitionResponse, PageQuery, PaginatedResponse};

/// GET /api/proposals - List proposals, newest first.
/// Query params: status (stored value, e.g. "Pending"), page, per_page.
pub async fn list(
    state: web::Data<AppState>,
    _actor: Actor,
    query: web::Query<PageQuery>,
) -> Result<HttpResponse, AppError> {
    let status = match query.status.as_deref() {
        Some(s) => Some(
            s.parse::<ProposalStatus>()
                .map_err(|e| AppError::validation(e.to_string()))?,
        ),
        None => None,
    };
    let all: Vec<ApiProposalResponse> = state
        .store
        .list_proposals(status)
        .await?
        .into_iter()
        .map(ApiProposalResponse::from)
        .collect();
    Ok(HttpResponse::Ok().json(PaginatedResponse::paginate(all, query.page(), query.per_page())))
}

/// GET /api/proposals/{id}
pub async fn read(
    state: web::Data<AppState>,
    _actor: Actor,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let proposal = state.manager.get(&path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ApiProposalResponse::from(proposal)))
}

/// POST /api/proposals
pub async fn create(
    state: web::Data<AppState>,
    actor: Actor,
    body: web::Json<ProposalDraft>,
) -> Result<HttpResponse, AppError> {
    require_role(&actor, &[Role::Admin, Role::Staff, Role::Official])?;
    let outcome = state.manager.submit(&actor, body.into_inner(), Utc::now()).await?;
    Ok(HttpResponse::Created().json(ApiTransitionResponse::from(outcome)))
}

/// POST /api/proposals/{id}/transitions
/// Body: `{"event": "vote", "choice": "approve"}`, `{"event": "cancel", "reason": ...}`, ...
pub async fn transition(
    state: web::Data<AppState>,
    actor: Actor,
    path: web::Path<String>,
    body: web::Json<TransitionEvent>,
) -> Result<HttpResponse, AppError> {
    let id = path.into_inner();
    let event = body.into_inner();

    match &event {
        TransitionEvent::Vote { .. } => require_role(&actor, &[Role::Official])?,
        TransitionEvent::Approve | TransitionEvent::Decline => require_role(&actor, &[Role::Admin])?,
        TransitionEvent::Cancel { .. } | TransitionEvent::Reschedule { .. } | TransitionEvent::Complete => {
            let proposal = state.manager.get(&id).await?;
            require_owner_or_admin(&actor, &proposal.user_id)?;
        }
        TransitionEvent::MissDeadline => {
            return Err(AppError::PermissionDenied(
                "missed deadlines are applied by the sweep".to_string(),
            ));
        }
    }

    let outcome = state.manager.apply_transition(&id, event, &actor, Utc::now()).await?;
    Ok(HttpResponse::Ok().json(ApiTransitionResponse::from(outcome)))
}

/// POST /api/proposals/{id}/resubmit
pub async fn resubmit(
    state: web::Data<AppState>,
    actor: Actor,
    path: web::Path<String>,
    body: web::Json<ProposalEdits>,
) -> Result<HttpResponse, AppError> {
    let id = path.into_inner();
    let original = state.manager.get(&id).await?;
    require_owner_or_admin(&actor, &original.user_id)?;
    let outcome = state
        .manager
        .resubmit(&actor, &id, body.into_inner(), Utc::now())
        .await?;
    Ok(HttpResponse::Created().json(ApiTransitionResponse::from(outcome)))
}
