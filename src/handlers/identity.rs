use std::future::Future;
use std::pin::Pin;

use actix_web::{dev::Payload, web, FromRequest, HttpRequest};

use super::AppState;
use crate::errors::AppError;
use crate::models::user::{Actor, Role};

/// Header set by the upstream identity provider.
pub const USER_ID_HEADER: &str = "X-User-Id";

impl FromRequest for Actor {
    type Error = AppError;
    type Future = Pin<Box<dyn Future<Output = Result<Self, Self::Error>>>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let uid = req
            .headers()
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());
        let state = req.app_data::<web::Data<AppState>>().cloned();

        Box::pin(async move {
            let (Some(uid), Some(state)) = (uid, state) else {
                return Err(AppError::Unauthenticated);
            };
            match state.store.get_user(&uid).await? {
                Some(user) if !user.disabled => Ok(Actor::from(&user)),
                Some(_) => {
                    log::warn!("Rejected request from disabled user {}", uid);
                    Err(AppError::Unauthenticated)
                }
                None => Err(AppError::Unauthenticated),
            }
        })
    }
}

pub fn require_role(actor: &Actor, roles: &[Role]) -> Result<(), AppError> {
    if roles.contains(&actor.role) {
        Ok(())
    } else {
        Err(AppError::PermissionDenied(format!(
            "{} may not do this",
            actor.role
        )))
    }
}

/// The proposal's submitter, or an admin.
pub fn require_owner_or_admin(actor: &Actor, owner_uid: &str) -> Result<(), AppError> {
    if actor.is_admin() || actor.uid == owner_uid {
        Ok(())
    } else {
        Err(AppError::PermissionDenied(
            "only the submitter or an admin may do this".to_string(),
        ))
    }
}
