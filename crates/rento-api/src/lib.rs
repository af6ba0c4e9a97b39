//! API layer for Rento
//!
//! HTTP handlers for bookings, extensions, availability, payments and locks.
//! Handlers resolve the caller, validate input and delegate to the services
//! in `rento-services`; every business rule lives there.

#![forbid(unsafe_code)]

pub mod dto;
pub mod handlers;

use actix_web::{error::InternalError, web, HttpResponse};
use std::sync::Arc;

use rento_auth::WebhookVerifier;
use rento_core::Clock;
use rento_services::{AvailabilityEngine, BookingService, LockAccessService, PricingEngine};

pub use dto::{ApiResponse, PaginationParams};
pub use handlers::{
    configure_apartments, configure_bookings, configure_health, configure_locks,
    configure_payments,
};

/// Services shared by every worker
#[derive(Clone)]
pub struct AppState {
    pub bookings: Arc<BookingService>,
    pub availability: Arc<AvailabilityEngine>,
    pub pricing: Arc<PricingEngine>,
    pub lock_access: Arc<LockAccessService>,
    pub clock: Arc<dyn Clock>,
    pub webhooks: WebhookVerifier,
}

fn bad_request(kind: &'static str, err: impl std::fmt::Display) -> HttpResponse {
    HttpResponse::BadRequest().json(serde_json::json!({
        "error": kind,
        "message": err.to_string(),
    }))
}

/// Extractor error handlers and the `/api/v1` scope
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::QueryConfig::default().error_handler(|err, _req| {
        let response = bad_request("invalid_query", &err);
        InternalError::from_response(err, response).into()
    }))
    .app_data(web::JsonConfig::default().error_handler(|err, _req| {
        let response = bad_request("invalid_body", &err);
        InternalError::from_response(err, response).into()
    }))
    .service(
        web::scope("/api/v1")
            .configure(configure_health)
            .configure(configure_bookings)
            .configure(configure_apartments)
            .configure(configure_payments)
            .configure(configure_locks),
    );
}
