//! Authentication and authorization for Rento
//!
//! - JWT token creation and validation
//! - Request extractors that resolve the calling [`Actor`](rento_core::models::Actor)
//! - The capability check used at every service entry point
//! - HMAC verification of vendor webhooks
//!
//! ## Using extractors in Actix-web
//!
//! ```no_run
//! use actix_web::HttpResponse;
//! use rento_auth::AuthenticatedUser;
//!
//! async fn protected_route(user: AuthenticatedUser) -> HttpResponse {
//!     HttpResponse::Ok().json(serde_json::json!({
//!         "user_id": user.actor.user_id,
//!         "role": user.actor.role
//!     }))
//! }
//! ```

pub mod claims;
pub mod jwt;
pub mod middleware;
pub mod permissions;
pub mod webhook;

pub use claims::Claims;
pub use jwt::JwtService;
pub use middleware::{AdminUser, AuthenticatedUser, StaffUser};
pub use permissions::{check, permitted, Permission, Resource};
pub use webhook::{WebhookVerifier, SIGNATURE_HEADER};
