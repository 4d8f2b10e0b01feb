use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use thiserror::Error;

use crate::models::proposal::ProposalStatus;
use crate::store::StoreError;
use crate::templates_structs::ApiErrorResponse;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Cannot {event} a {from} proposal: {reason}")]
    InvalidTransition {
        from: ProposalStatus,
        event: &'static str,
        reason: String,
    },

    #[error("Validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("Delivery failed: {0}")]
    Delivery(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Template error: {0}")]
    Template(#[from] askama::Error),

    #[error("Missing or unknown identity")]
    Unauthenticated,

    #[error("Permission denied: {0}")]
    PermissionDenied(String),
}

impl AppError {
    pub fn invalid(from: ProposalStatus, event: &'static str, reason: impl Into<String>) -> Self {
        AppError::InvalidTransition {
            from,
            event,
            reason: reason.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        AppError::Validation(vec![message.into()])
    }

    /// Whether retrying the same call later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, AppError::Store(_) | AppError::Delivery(_))
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InvalidTransition { .. } => StatusCode::CONFLICT,
            AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Delivery(_) => StatusCode::BAD_GATEWAY,
            AppError::Store(StoreError::Conflict { .. }) => StatusCode::CONFLICT,
            AppError::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Template(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Unauthenticated => StatusCode::UNAUTHORIZED,
            AppError::PermissionDenied(_) => StatusCode::FORBIDDEN,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let details = match self {
            AppError::Validation(errors) => Some(errors.join("\n")),
            AppError::Store(_) | AppError::Template(_) => {
                log::error!("{self}");
                None
            }
            _ => None,
        };
        let error = match self {
            AppError::Store(_) | AppError::Template(_) => "Internal error".to_string(),
            other => other.to_string(),
        };
        HttpResponse::build(self.status_code()).json(ApiErrorResponse { error, details })
    }
}
