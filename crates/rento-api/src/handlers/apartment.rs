//! Apartment availability handlers
//!
//! Read-only views of what can be booked and at what price. These are
//! public except the owner's booking list.

use actix_web::{web, HttpResponse};
use rento_auth::AuthenticatedUser;
use rento_core::{AppError, Clock};
use tracing::{debug, instrument};

use crate::dto::{
    validated, ApiResponse, BookedDatesQuery, DurationsQuery, PaginationParams, SlotsQuery,
    WindowQuery,
};
use crate::AppState;

/// GET /api/v1/apartments/{id}/durations
#[instrument(skip(state))]
pub async fn available_durations(
    state: web::Data<AppState>,
    path: web::Path<i64>,
    query: web::Query<DurationsQuery>,
) -> Result<HttpResponse, AppError> {
    let apartment_id = path.into_inner();
    let start = query.start_time.unwrap_or_else(|| state.clock.now());

    let durations = state
        .availability
        .enumerate_durations(apartment_id, start)
        .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(durations)))
}

/// GET /api/v1/apartments/{id}/slots?date=&duration=
#[instrument(skip(state))]
pub async fn available_slots(
    state: web::Data<AppState>,
    path: web::Path<i64>,
    query: web::Query<SlotsQuery>,
) -> Result<HttpResponse, AppError> {
    let query = validated(query.into_inner(), "Slots query")?;
    let slots = state
        .availability
        .available_time_slots(path.into_inner(), query.date, query.duration)
        .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(slots)))
}

/// GET /api/v1/apartments/{id}/availability?start=&duration=
#[instrument(skip(state))]
pub async fn check_availability(
    state: web::Data<AppState>,
    path: web::Path<i64>,
    query: web::Query<WindowQuery>,
) -> Result<HttpResponse, AppError> {
    let query = validated(query.into_inner(), "Availability query")?;
    let apartment_id = path.into_inner();
    let available = state
        .availability
        .check_availability(apartment_id, query.start, query.duration)
        .await?;

    debug!(apartment_id, available, "Availability checked");
    Ok(HttpResponse::Ok().json(ApiResponse::success(serde_json::json!({
        "apartment_id": apartment_id,
        "available": available,
    }))))
}

/// GET /api/v1/apartments/{id}/price?start=&duration=
#[instrument(skip(state))]
pub async fn price_quote(
    state: web::Data<AppState>,
    path: web::Path<i64>,
    query: web::Query<WindowQuery>,
) -> Result<HttpResponse, AppError> {
    let query = validated(query.into_inner(), "Price query")?;
    let apartment = state.availability.load_bookable(path.into_inner()).await?;
    let quote = state
        .pricing
        .calculate(&apartment, query.duration, query.start)
        .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(quote)))
}

/// GET /api/v1/apartments/{id}/booked-dates?from=&to=
#[instrument(skip(state))]
pub async fn booked_dates(
    state: web::Data<AppState>,
    path: web::Path<i64>,
    query: web::Query<BookedDatesQuery>,
) -> Result<HttpResponse, AppError> {
    let dates = state
        .availability
        .booked_dates(path.into_inner(), query.from, query.to)
        .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(dates)))
}

/// GET /api/v1/apartments/{id}/bookings
#[instrument(skip(state, user))]
pub async fn list_apartment_bookings(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    path: web::Path<i64>,
    query: web::Query<PaginationParams>,
) -> Result<HttpResponse, AppError> {
    let pagination = validated(query.into_inner(), "Pagination")?.to_pagination();
    let page = state
        .bookings
        .list_for_apartment(user.actor, path.into_inner(), pagination)
        .await?;
    Ok(HttpResponse::Ok().json(page))
}

/// Configure apartment routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/apartments/{id}")
            .route("/durations", web::get().to(available_durations))
            .route("/slots", web::get().to(available_slots))
            .route("/availability", web::get().to(check_availability))
            .route("/price", web::get().to(price_quote))
            .route("/booked-dates", web::get().to(booked_dates))
            .route("/bookings", web::get().to(list_apartment_bookings)),
    );
}
