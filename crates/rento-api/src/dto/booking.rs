//! Booking DTOs
//!
//! Request bodies for the booking and extension endpoints. Responses reuse
//! the domain models directly.

use chrono::{DateTime, Utc};
use rento_services::CreateBooking;
use serde::Deserialize;
use validator::Validate;

/// New booking request
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct BookingCreateRequest {
    #[validate(range(min = 1))]
    pub apartment_id: i64,

    /// Requested start; daily bookings are normalized to the local day
    pub start_date: DateTime<Utc>,

    /// Hours; 24 books a whole day
    #[validate(range(min = 1, max = 24, message = "Duration must be 1 to 24 hours"))]
    pub duration: i32,
}

impl From<BookingCreateRequest> for CreateBooking {
    fn from(req: BookingCreateRequest) -> Self {
        CreateBooking {
            apartment_id: req.apartment_id,
            start: req.start_date,
            duration: req.duration,
        }
    }
}

/// Extension request for an active booking
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ExtensionCreateRequest {
    #[validate(range(min = 1, max = 23, message = "Extensions are 1 to 23 hours"))]
    pub additional_hours: i32,
}

/// Payment provider callback; either reference form is accepted
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct PaymentCallback {
    #[validate(length(min = 1, max = 128))]
    #[serde(alias = "payment_id", alias = "order_id")]
    pub reference: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_request_validation() {
        let req: BookingCreateRequest = serde_json::from_str(
            r#"{"apartment_id": 3, "start_date": "2026-05-04T05:00:00Z", "duration": 25}"#,
        )
        .unwrap();
        assert!(req.validate().is_err());

        let ok = BookingCreateRequest { duration: 24, ..req };
        assert!(ok.validate().is_ok());
        let booking: CreateBooking = ok.into();
        assert_eq!(booking.apartment_id, 3);
    }

    #[test]
    fn test_payment_callback_aliases() {
        let cb: PaymentCallback = serde_json::from_str(r#"{"order_id":"RB-20260504-000001"}"#).unwrap();
        assert_eq!(cb.reference, "RB-20260504-000001");
        let cb: PaymentCallback = serde_json::from_str(r#"{"payment_id":"p-9"}"#).unwrap();
        assert_eq!(cb.reference, "p-9");
    }
}
