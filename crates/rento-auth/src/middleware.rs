//! Request extractors resolving the calling [`Actor`]
//!
//! Protected handlers take one of these and hand the actor to the service
//! layer, which does the per-resource capability check. The role-gated
//! variants only short-circuit callers that could never pass it.

use crate::jwt::JwtService;
use crate::Claims;
use actix_web::{dev::Payload, http::header, web, FromRequest, HttpRequest};
use futures::future::{ready, Ready};
use rento_core::error::AppError;
use rento_core::models::{Actor, UserRole};
use std::sync::Arc;
use tracing::{debug, warn};

const TOKEN_COOKIE: &str = "token";

fn bearer_token(req: &HttpRequest) -> Option<String> {
    let from_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::to_string);

    from_header.or_else(|| req.cookie(TOKEN_COOKIE).map(|c| c.value().to_string()))
}

fn authenticate(req: &HttpRequest) -> Result<AuthenticatedUser, AppError> {
    let jwt = req.app_data::<web::Data<Arc<JwtService>>>().ok_or_else(|| {
        warn!("JwtService missing from app data");
        AppError::Unauthorized("authentication is not configured".to_string())
    })?;

    let token = bearer_token(req).ok_or_else(|| {
        debug!(path = req.path(), "Request without credentials");
        AppError::Unauthorized("missing bearer token".to_string())
    })?;

    let claims = jwt.validate_token(&token)?;
    Ok(AuthenticatedUser {
        actor: claims.actor(),
        claims,
    })
}

/// Authenticate, then require `allowed(role)`
fn authenticate_with_role(
    req: &HttpRequest,
    allowed: fn(&UserRole) -> bool,
    denial: &'static str,
) -> Result<AuthenticatedUser, AppError> {
    let user = authenticate(req)?;
    if allowed(&user.actor.role) {
        return Ok(user);
    }
    warn!(
        user_id = user.actor.user_id,
        role = %user.actor.role,
        path = req.path(),
        "{}", denial
    );
    Err(AppError::Forbidden(denial.to_string()))
}

/// Any caller holding a valid token
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub actor: Actor,
    pub claims: Claims,
}

impl FromRequest for AuthenticatedUser {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(authenticate(req).map_err(Into::into))
    }
}

macro_rules! role_gated {
    ($(#[$doc:meta])* $name:ident, $check:expr, $denial:literal) => {
        $(#[$doc])*
        #[derive(Debug, Clone)]
        pub struct $name(pub AuthenticatedUser);

        impl std::ops::Deref for $name {
            type Target = AuthenticatedUser;

            fn deref(&self) -> &Self::Target {
                &self.0
            }
        }

        impl FromRequest for $name {
            type Error = actix_web::Error;
            type Future = Ready<Result<Self, Self::Error>>;

            fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
                ready(
                    authenticate_with_role(req, $check, $denial)
                        .map($name)
                        .map_err(Into::into),
                )
            }
        }
    };
}

role_gated!(
    /// Moderator or admin
    StaffUser,
    UserRole::is_staff,
    "staff only"
);

role_gated!(
    /// Admin only
    AdminUser,
    UserRole::is_admin,
    "admin only"
);
