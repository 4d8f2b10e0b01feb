pub mod dashboard;
pub mod identity;
pub mod notifications;
pub mod proposals;
pub mod ws;

use std::sync::Arc;

use actix_web::{
    web, Error, HttpResponse,
    body::MessageBody,
    dev::{ServiceRequest, ServiceResponse},
    middleware::Next,
};

use crate::lifecycle::LifecycleManager;
use crate::notifications::Dispatcher;
use crate::store::Store;

/// Shared handles every handler works through.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub manager: LifecycleManager,
    pub dispatcher: Dispatcher,
}

/// Rejects POST/PUT/DELETE requests without `Content-Type: application/json`.
/// GET requests are exempt.
async fn require_json_content_type(
    req: ServiceRequest,
    next: Next<impl MessageBody + 'static>,
) -> Result<ServiceResponse<impl MessageBody>, Error> {
    let method = req.method().clone();

    if method == actix_web::http::Method::POST
        || method == actix_web::http::Method::PUT
        || method == actix_web::http::Method::DELETE
    {
        let content_type = req
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");

        if !content_type.starts_with("application/json") {
            let body = serde_json::json!({
                "error": "Content-Type must be application/json for mutation requests"
            });
            let response = HttpResponse::BadRequest().json(body);
            return Ok(req.into_response(response).map_into_right_body());
        }
    }

    next.call(req).await.map(|res| res.map_into_left_body())
}

/// Configure `/api` routes and the live alert socket.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .wrap(actix_web::middleware::from_fn(require_json_content_type))
            .route("/proposals", web::get().to(proposals::list))
            .route("/proposals", web::post().to(proposals::create))
            .route("/proposals/{id}", web::get().to(proposals::read))
            .route("/proposals/{id}/transitions", web::post().to(proposals::transition))
            .route("/proposals/{id}/resubmit", web::post().to(proposals::resubmit))
            .route("/dashboard", web::get().to(dashboard::index))
            .route("/reminders/upcoming", web::post().to(dashboard::remind_upcoming))
            .route("/notifications", web::get().to(notifications::list))
            .route("/notifications/{id}/read", web::post().to(notifications::mark_read))
            .route("/notifications/{id}", web::delete().to(notifications::delete)),
    );
    cfg.route("/ws", web::get().to(ws::ws_connect));
}
