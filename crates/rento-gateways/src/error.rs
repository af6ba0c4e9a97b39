//! Adapter errors and their mapping onto `AppError`
//!
//! Everything an outbound call can fail with is a dependency problem from
//! the booking core's point of view, except a definitive "no such payment".

use rento_core::AppError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("{service} returned HTTP {status}")]
    HttpStatus { service: &'static str, status: u16 },

    #[error("{service} response could not be decoded: {message}")]
    Decode {
        service: &'static str,
        message: String,
    },

    #[error("{0} is not configured")]
    NotConfigured(&'static str),
}

impl GatewayError {
    pub fn decode(service: &'static str, message: impl ToString) -> Self {
        Self::Decode {
            service,
            message: message.to_string(),
        }
    }
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        match &err {
            GatewayError::Request(e) if e.is_timeout() => AppError::DependencyTimeout(err.to_string()),
            GatewayError::HttpStatus { status: 404, .. } => AppError::NotFound(err.to_string()),
            _ => AppError::Dependency(err.to_string()),
        }
    }
}
