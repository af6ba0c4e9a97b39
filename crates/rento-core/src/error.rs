//! Unified error handling for Rento
//!
//! A single error type covers every failure in the system. Each variant maps
//! to an HTTP status and to an [`ErrorKind`], which tells callers whether a
//! failure is a business rejection, a conflict, or a dependency outage.

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

/// Coarse classification of an [`AppError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad input; never retried
    Validation,
    /// Slot taken, duplicate reference, state already moved; terminal
    Conflict,
    /// External collaborator failed or timed out; retryable
    Dependency,
    NotFound,
    Forbidden,
    Internal,
}

/// Main application error type
#[derive(Error, Debug)]
pub enum AppError {
    // ==================== Database Errors ====================
    #[error("Database error: {0}")]
    Database(String),

    #[error("Database pool error: {0}")]
    Pool(String),

    #[error("Transaction failed: {0}")]
    Transaction(String),

    // ==================== Authentication Errors ====================
    #[error("Token expired")]
    TokenExpired,

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    // ==================== Validation Errors ====================
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unsupported rental mode: {0}")]
    UnsupportedRentalMode(String),

    #[error("Tariff not configured: {0}")]
    TariffNotConfigured(String),

    #[error("Outside operating hours: {0}")]
    OutsideOperatingHours(String),

    #[error("Apartment {0} is not bookable")]
    ApartmentNotBookable(String),

    #[error("Payment amount mismatch: expected {expected}, paid {paid}")]
    PaymentMismatch { expected: String, paid: String },

    #[error("Payment not confirmed: {0}")]
    PaymentNotConfirmed(String),

    // ==================== Conflict Errors ====================
    #[error("Slot unavailable: {0}")]
    SlotUnavailable(String),

    #[error("Duplicate payment reference: {0}")]
    DuplicatePayment(String),

    #[error("Already processed: {0}")]
    AlreadyProcessed(String),

    #[error("Cannot {action} a booking in status {from}")]
    InvalidTransition { from: String, action: String },

    #[error("Conflict: {0}")]
    Conflict(String),

    // ==================== Resource Errors ====================
    #[error("Booking not found: {0}")]
    BookingNotFound(String),

    #[error("Apartment not found: {0}")]
    ApartmentNotFound(String),

    #[error("Lock not found: {0}")]
    LockNotFound(String),

    #[error("Extension not found: {0}")]
    ExtensionNotFound(String),

    #[error("Not found: {0}")]
    NotFound(String),

    // ==================== External Service Errors ====================
    #[error("Dependency timeout: {0}")]
    DependencyTimeout(String),

    #[error("Dependency failed: {0}")]
    Dependency(String),

    // ==================== Internal Errors ====================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl AppError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Validation(_)
            | AppError::UnsupportedRentalMode(_)
            | AppError::TariffNotConfigured(_)
            | AppError::OutsideOperatingHours(_)
            | AppError::ApartmentNotBookable(_)
            | AppError::PaymentMismatch { .. }
            | AppError::PaymentNotConfirmed(_) => ErrorKind::Validation,

            AppError::SlotUnavailable(_)
            | AppError::DuplicatePayment(_)
            | AppError::AlreadyProcessed(_)
            | AppError::InvalidTransition { .. }
            | AppError::Conflict(_) => ErrorKind::Conflict,

            AppError::DependencyTimeout(_) | AppError::Dependency(_) => ErrorKind::Dependency,

            AppError::BookingNotFound(_)
            | AppError::ApartmentNotFound(_)
            | AppError::LockNotFound(_)
            | AppError::ExtensionNotFound(_)
            | AppError::NotFound(_) => ErrorKind::NotFound,

            AppError::TokenExpired
            | AppError::InvalidToken(_)
            | AppError::Unauthorized(_)
            | AppError::Forbidden(_) => ErrorKind::Forbidden,

            AppError::Database(_)
            | AppError::Pool(_)
            | AppError::Transaction(_)
            | AppError::Internal(_)
            | AppError::Config(_)
            | AppError::Serialization(_) => ErrorKind::Internal,
        }
    }

    /// True when retrying later may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Dependency)
    }

    /// Returns the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::TokenExpired | AppError::InvalidToken(_) | AppError::Unauthorized(_) => {
                StatusCode::UNAUTHORIZED
            }
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,

            // "not bookable" must render differently from "fully booked"
            AppError::ApartmentNotBookable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::PaymentMismatch { .. } | AppError::PaymentNotConfirmed(_) => {
                StatusCode::PAYMENT_REQUIRED
            }

            _ => match self.kind() {
                ErrorKind::Validation => StatusCode::BAD_REQUEST,
                ErrorKind::Conflict => StatusCode::CONFLICT,
                ErrorKind::NotFound => StatusCode::NOT_FOUND,
                ErrorKind::Dependency => StatusCode::SERVICE_UNAVAILABLE,
                ErrorKind::Forbidden => StatusCode::FORBIDDEN,
                ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    /// Returns the error code for API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Database(_) => "database_error",
            AppError::Pool(_) => "pool_error",
            AppError::Transaction(_) => "transaction_error",
            AppError::TokenExpired => "token_expired",
            AppError::InvalidToken(_) => "invalid_token",
            AppError::Unauthorized(_) => "unauthorized",
            AppError::Forbidden(_) => "forbidden",
            AppError::Validation(_) => "validation_error",
            AppError::UnsupportedRentalMode(_) => "unsupported_rental_mode",
            AppError::TariffNotConfigured(_) => "tariff_not_configured",
            AppError::OutsideOperatingHours(_) => "outside_operating_hours",
            AppError::ApartmentNotBookable(_) => "apartment_not_bookable",
            AppError::PaymentMismatch { .. } => "payment_mismatch",
            AppError::PaymentNotConfirmed(_) => "payment_not_confirmed",
            AppError::SlotUnavailable(_) => "slot_unavailable",
            AppError::DuplicatePayment(_) => "duplicate_payment",
            AppError::AlreadyProcessed(_) => "already_processed",
            AppError::InvalidTransition { .. } => "invalid_transition",
            AppError::Conflict(_) => "conflict",
            AppError::BookingNotFound(_) => "booking_not_found",
            AppError::ApartmentNotFound(_) => "apartment_not_found",
            AppError::LockNotFound(_) => "lock_not_found",
            AppError::ExtensionNotFound(_) => "extension_not_found",
            AppError::NotFound(_) => "not_found",
            AppError::DependencyTimeout(_) => "dependency_timeout",
            AppError::Dependency(_) => "dependency_error",
            AppError::Internal(_) => "internal_error",
            AppError::Config(_) => "config_error",
            AppError::Serialization(_) => "serialization_error",
        }
    }

    /// Shorthand for an invalid state transition
    pub fn transition(from: impl ToString, action: &str) -> Self {
        AppError::InvalidTransition {
            from: from.to_string(),
            action: action.to_string(),
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        AppError::status_code(self)
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let body = json!({
            "error": self.error_code(),
            "kind": self.kind(),
            "message": self.to_string(),
            "status": status.as_u16(),
        });

        HttpResponse::build(status).json(body)
    }
}

// ==================== From implementations ====================

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(err.to_string())
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => AppError::NotFound("row not found".to_string()),
            sqlx::Error::PoolTimedOut => AppError::Pool(err.to_string()),
            other => AppError::Database(other.to_string()),
        }
    }
}
