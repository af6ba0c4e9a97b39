//! Lock handlers
//!
//! Door control for password holders, lock administration, and the vendor
//! telemetry webhook.

use actix_web::{web, HttpRequest, HttpResponse};
use rento_auth::{AuthenticatedUser, StaffUser, SIGNATURE_HEADER};
use rento_core::AppError;
use serde_json::{json, Value};
use tracing::{debug, info, instrument, warn};

use crate::dto::{
    validated, ApiResponse, CanControlResponse, EmergencyResetResponse, LockBindRequest,
    LockRegisterRequest, LockStatusRequest, UserPasswordRequest,
};
use crate::AppState;

/// POST /api/v1/locks
#[instrument(skip(state, staff))]
pub async fn register_lock(
    state: web::Data<AppState>,
    staff: StaffUser,
    req: web::Json<LockRegisterRequest>,
) -> Result<HttpResponse, AppError> {
    let req = validated(req.into_inner(), "Lock registration")?;
    let lock = state
        .lock_access
        .register_lock(staff.actor, &req.unique_id, req.name)
        .await?;
    Ok(HttpResponse::Created().json(ApiResponse::success(lock)))
}

/// GET /api/v1/locks/{unique_id}
#[instrument(skip(state, user))]
pub async fn get_lock(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let unique_id = path.into_inner();
    if !state
        .lock_access
        .can_user_control_lock(user.actor, &unique_id)
        .await?
    {
        return Err(AppError::Forbidden(format!("No access to lock {}", unique_id)));
    }
    let lock = state.lock_access.get_lock(&unique_id).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(lock)))
}

/// PUT /api/v1/locks/{unique_id}/apartment
#[instrument(skip(state, user))]
pub async fn bind_lock(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    path: web::Path<String>,
    req: web::Json<LockBindRequest>,
) -> Result<HttpResponse, AppError> {
    let lock = state
        .lock_access
        .bind_lock(user.actor, &path.into_inner(), req.apartment_id)
        .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(lock)))
}

/// POST /api/v1/locks/{unique_id}/passwords
#[instrument(skip(state, user))]
pub async fn generate_user_password(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    path: web::Path<String>,
    req: web::Json<UserPasswordRequest>,
) -> Result<HttpResponse, AppError> {
    let req = validated(req.into_inner(), "User password")?;
    let password = state
        .lock_access
        .generate_user_password(
            user.actor,
            &path.into_inner(),
            req.user_id,
            req.valid_from,
            req.valid_until,
        )
        .await?;
    Ok(HttpResponse::Created().json(ApiResponse::success(password)))
}

/// GET /api/v1/locks/{unique_id}/can-control
#[instrument(skip(state, user))]
pub async fn can_control(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let unique_id = path.into_inner();
    let allowed = state
        .lock_access
        .can_user_control_lock(user.actor, &unique_id)
        .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(CanControlResponse { unique_id, allowed })))
}

/// PUT /api/v1/locks/{unique_id}/status
#[instrument(skip(state, user))]
pub async fn update_status(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    path: web::Path<String>,
    req: web::Json<LockStatusRequest>,
) -> Result<HttpResponse, AppError> {
    let lock = state
        .lock_access
        .update_lock_status(user.actor, &path.into_inner(), req.status)
        .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(lock)))
}

/// POST /api/v1/locks/{unique_id}/emergency-reset
#[instrument(skip(state, staff))]
pub async fn emergency_reset(
    state: web::Data<AppState>,
    staff: StaffUser,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let unique_id = path.into_inner();
    let revoked_passwords = state
        .lock_access
        .emergency_reset_lock(staff.actor, &unique_id)
        .await?;

    warn!(unique_id = %unique_id, revoked_passwords, user_id = staff.actor.user_id, "Emergency lock reset");
    Ok(HttpResponse::Ok().json(ApiResponse::success(EmergencyResetResponse {
        unique_id,
        revoked_passwords,
    })))
}

/// Vendor telemetry push, signed with the shared webhook secret
///
/// POST /api/v1/locks/webhook
#[instrument(skip(state, req, body))]
pub async fn webhook(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Bytes,
) -> Result<HttpResponse, AppError> {
    let signature = req
        .headers()
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());
    state.webhooks.verify(&body, signature)?;

    let payload: Value = serde_json::from_slice(&body)
        .map_err(|e| AppError::Validation(format!("Invalid webhook body: {}", e)))?;
    debug!("Lock webhook: {}", payload);

    let states = state.lock_access.process_webhook(&payload).await?;
    info!(events = states.len(), "Lock webhook processed");
    Ok(HttpResponse::Ok().json(json!({ "processed": states.len() })))
}

/// Configure lock routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/locks")
            .route("", web::post().to(register_lock))
            .route("/webhook", web::post().to(webhook))
            .route("/{unique_id}", web::get().to(get_lock))
            .route("/{unique_id}/apartment", web::put().to(bind_lock))
            .route("/{unique_id}/passwords", web::post().to(generate_user_password))
            .route("/{unique_id}/can-control", web::get().to(can_control))
            .route("/{unique_id}/status", web::put().to(update_status))
            .route("/{unique_id}/emergency-reset", web::post().to(emergency_reset)),
    );
}
