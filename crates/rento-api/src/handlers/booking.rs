//! Booking handlers
//!
//! Create, confirm, pay, decide, cancel and finish bookings, plus the
//! extension sub-flow.

use actix_web::{web, HttpResponse};
use rento_auth::{AdminUser, AuthenticatedUser};
use rento_core::AppError;
use serde::Deserialize;
use tracing::{debug, info, instrument};

use crate::dto::{
    validated, ApiResponse, BookingCreateRequest, ExtensionCreateRequest, PaginationParams,
    ReasonRequest,
};
use crate::AppState;

/// Staff may list another renter's bookings
#[derive(Debug, Deserialize)]
pub struct RenterFilter {
    pub renter_id: Option<i64>,
}

fn reason_of(body: Option<web::Json<ReasonRequest>>) -> Result<Option<String>, AppError> {
    match body {
        Some(body) => Ok(validated(body.into_inner(), "Reason")?.reason),
        None => Ok(None),
    }
}

/// POST /api/v1/bookings
#[instrument(skip(state, user, req))]
pub async fn create_booking(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    req: web::Json<BookingCreateRequest>,
) -> Result<HttpResponse, AppError> {
    let req = validated(req.into_inner(), "Booking creation")?;
    debug!(apartment_id = req.apartment_id, duration = req.duration, "Creating booking");

    let booking = state.bookings.create_booking(user.actor, req.into()).await?;

    info!(booking_id = booking.id, number = %booking.booking_number, "Booking created");
    Ok(HttpResponse::Created().json(ApiResponse::success(booking)))
}

/// GET /api/v1/bookings
#[instrument(skip(state, user))]
pub async fn list_bookings(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    query: web::Query<PaginationParams>,
    filter: web::Query<RenterFilter>,
) -> Result<HttpResponse, AppError> {
    let pagination = validated(query.into_inner(), "Pagination")?.to_pagination();
    let renter_id = filter.renter_id.unwrap_or(user.actor.user_id);

    let page = state
        .bookings
        .list_for_renter(user.actor, renter_id, pagination)
        .await?;
    Ok(HttpResponse::Ok().json(page))
}

/// GET /api/v1/bookings/{id}
#[instrument(skip(state, user))]
pub async fn get_booking(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    path: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
    let booking = state.bookings.get_booking(user.actor, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(booking)))
}

/// POST /api/v1/bookings/{id}/confirm
#[instrument(skip(state, user))]
pub async fn confirm_booking(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    path: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
    let booking = state
        .bookings
        .confirm_booking(user.actor, path.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::with_message(
        booking,
        "Booking confirmed, awaiting payment",
    )))
}

/// Manual approval for payments settled outside the gateway
///
/// POST /api/v1/bookings/{id}/approve
#[instrument(skip(state, admin))]
pub async fn approve_booking(
    state: web::Data<AppState>,
    admin: AdminUser,
    path: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
    let booking = state
        .bookings
        .approve_booking(admin.actor, path.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(booking)))
}

/// POST /api/v1/bookings/{id}/reject
#[instrument(skip(state, user, body))]
pub async fn reject_booking(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    path: web::Path<i64>,
    body: Option<web::Json<ReasonRequest>>,
) -> Result<HttpResponse, AppError> {
    let reason = reason_of(body)?;
    let booking = state
        .bookings
        .reject_booking(user.actor, path.into_inner(), reason)
        .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(booking)))
}

/// GET /api/v1/bookings/{id}/cancellation
#[instrument(skip(state, user))]
pub async fn cancellation_preview(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    path: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
    let preview = state
        .bookings
        .cancellation_preview(user.actor, path.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(preview)))
}

/// POST /api/v1/bookings/{id}/cancel
#[instrument(skip(state, user, body))]
pub async fn cancel_booking(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    path: web::Path<i64>,
    body: Option<web::Json<ReasonRequest>>,
) -> Result<HttpResponse, AppError> {
    let reason = reason_of(body)?;
    let booking = state
        .bookings
        .cancel_booking(user.actor, path.into_inner(), reason)
        .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(booking)))
}

/// POST /api/v1/bookings/{id}/finish
#[instrument(skip(state, user))]
pub async fn finish_session(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    path: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
    let booking = state
        .bookings
        .finish_session(user.actor, path.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(booking)))
}

// ==================== Extensions ====================

/// GET /api/v1/bookings/{id}/extensions
#[instrument(skip(state, user))]
pub async fn list_extensions(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    path: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
    let extensions = state
        .bookings
        .list_extensions(user.actor, path.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(extensions)))
}

/// POST /api/v1/bookings/{id}/extensions
#[instrument(skip(state, user, req))]
pub async fn request_extension(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    path: web::Path<i64>,
    req: web::Json<ExtensionCreateRequest>,
) -> Result<HttpResponse, AppError> {
    let req = validated(req.into_inner(), "Extension")?;
    let extension = state
        .bookings
        .request_extension(user.actor, path.into_inner(), req.additional_hours)
        .await?;
    Ok(HttpResponse::Created().json(ApiResponse::success(extension)))
}

/// POST /api/v1/extensions/{id}/approve
#[instrument(skip(state, user))]
pub async fn approve_extension(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    path: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
    let (booking, extension) = state
        .bookings
        .approve_extension(user.actor, path.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(serde_json::json!({
        "booking": booking,
        "extension": extension,
    }))))
}

/// POST /api/v1/extensions/{id}/reject
#[instrument(skip(state, user, body))]
pub async fn reject_extension(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    path: web::Path<i64>,
    body: Option<web::Json<ReasonRequest>>,
) -> Result<HttpResponse, AppError> {
    let reason = reason_of(body)?;
    let extension = state
        .bookings
        .reject_extension(user.actor, path.into_inner(), reason)
        .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(extension)))
}

// ==================== Door access ====================

/// GET /api/v1/bookings/{id}/lock-access
#[instrument(skip(state, user))]
pub async fn get_lock_access(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    path: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
    let access = state
        .lock_access
        .get_booking_lock_access(user.actor, path.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(access)))
}

/// Reissue the door code after an earlier vendor failure
///
/// POST /api/v1/bookings/{id}/lock-password
#[instrument(skip(state, user))]
pub async fn generate_lock_password(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    path: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
    let password = state
        .lock_access
        .generate_password_for_booking(user.actor, path.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(password)))
}

/// Configure booking routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/bookings")
            .route("", web::post().to(create_booking))
            .route("", web::get().to(list_bookings))
            .route("/{id}", web::get().to(get_booking))
            .route("/{id}/confirm", web::post().to(confirm_booking))
            .route("/{id}/approve", web::post().to(approve_booking))
            .route("/{id}/reject", web::post().to(reject_booking))
            .route("/{id}/cancellation", web::get().to(cancellation_preview))
            .route("/{id}/cancel", web::post().to(cancel_booking))
            .route("/{id}/finish", web::post().to(finish_session))
            .route("/{id}/extensions", web::get().to(list_extensions))
            .route("/{id}/extensions", web::post().to(request_extension))
            .route("/{id}/lock-access", web::get().to(get_lock_access))
            .route("/{id}/lock-password", web::post().to(generate_lock_password)),
    )
    .service(
        web::scope("/extensions")
            .route("/{id}/approve", web::post().to(approve_extension))
            .route("/{id}/reject", web::post().to(reject_extension)),
    );
}
