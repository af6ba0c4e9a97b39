//! Payment provider callback
//!
//! The provider retries until it sees a 2xx, so replays of a settled
//! reference are acknowledged instead of surfaced as conflicts.

use actix_web::{web, HttpResponse};
use rento_core::AppError;
use serde_json::json;
use tracing::{info, instrument, warn};

use crate::dto::{validated, PaymentCallback};
use crate::AppState;

/// POST /api/v1/payments/callback
#[instrument(skip(state))]
pub async fn payment_callback(
    state: web::Data<AppState>,
    req: web::Json<PaymentCallback>,
) -> Result<HttpResponse, AppError> {
    let req = validated(req.into_inner(), "Payment callback")?;

    match state.bookings.process_payment(&req.reference).await {
        Ok(outcome) => {
            info!(reference = %req.reference, "Payment processed");
            Ok(HttpResponse::Ok().json(json!({
                "status": "processed",
                "outcome": outcome,
            })))
        }
        Err(e @ (AppError::AlreadyProcessed(_) | AppError::DuplicatePayment(_))) => {
            warn!(reference = %req.reference, error = %e, "Payment callback ignored");
            Ok(HttpResponse::Ok().json(json!({
                "status": "ignored",
                "reason": e.to_string(),
            })))
        }
        Err(e) => Err(e),
    }
}

/// Configure payment routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::scope("/payments").route("/callback", web::post().to(payment_callback)));
}
