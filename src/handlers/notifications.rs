use actix_web::{web, HttpResponse};
use chrono::Utc;

use super::AppState;
use crate::errors::AppError;
use crate::models::user::Actor;
use crate::templates_structs::{PageQuery, PaginatedResponse};

/// GET /api/notifications - The caller's visible notifications, newest first.
pub async fn list(
    state: web::Data<AppState>,
    actor: Actor,
    query: web::Query<PageQuery>,
) -> Result<HttpResponse, AppError> {
    let all = state.store.list_notifications(&actor.uid, Utc::now()).await?;
    Ok(HttpResponse::Ok().json(PaginatedResponse::paginate(all, query.page(), query.per_page())))
}

/// POST /api/notifications/{id}/read
pub async fn mark_read(
    state: web::Data<AppState>,
    actor: Actor,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    update_flags(&state, &actor, &path.into_inner(), Some(true), None).await
}

/// DELETE /api/notifications/{id} - Soft delete.
pub async fn delete(
    state: web::Data<AppState>,
    actor: Actor,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    update_flags(&state, &actor, &path.into_inner(), None, Some(true)).await
}

async fn update_flags(
    state: &AppState,
    actor: &Actor,
    id: &str,
    read: Option<bool>,
    deleted: Option<bool>,
) -> Result<HttpResponse, AppError> {
    if !state
        .store
        .update_notification_flags(&actor.uid, id, read, deleted)
        .await?
    {
        return Err(AppError::NotFound(format!("notification {id}")));
    }
    let unread = state.store.count_unread(&actor.uid, Utc::now()).await?;
    state.dispatcher.live().send_count_update(&actor.uid, unread);
    Ok(HttpResponse::Ok().json(serde_json::json!({ "unread_count": unread })))
}
