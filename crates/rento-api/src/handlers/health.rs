//! Health check

use actix_web::{web, HttpResponse};
use rento_core::Clock;

use crate::AppState;

/// GET /api/v1/health
pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": "rento",
        "version": env!("CARGO_PKG_VERSION"),
        "time": state.clock.now(),
    }))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health_check));
}
