//! Booking extension model
//!
//! A secondary state machine attached to an active booking:
//! `created → awaiting_payment → approved | rejected`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExtensionStatus {
    #[default]
    Created,
    AwaitingPayment,
    Approved,
    Rejected,
}

impl fmt::Display for ExtensionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtensionStatus::Created => write!(f, "created"),
            ExtensionStatus::AwaitingPayment => write!(f, "awaiting_payment"),
            ExtensionStatus::Approved => write!(f, "approved"),
            ExtensionStatus::Rejected => write!(f, "rejected"),
        }
    }
}

impl ExtensionStatus {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "created" => Some(ExtensionStatus::Created),
            "awaiting_payment" => Some(ExtensionStatus::AwaitingPayment),
            "approved" => Some(ExtensionStatus::Approved),
            "rejected" => Some(ExtensionStatus::Rejected),
            _ => None,
        }
    }

    /// At most one open extension may exist per booking
    pub fn is_open(&self) -> bool {
        matches!(
            self,
            ExtensionStatus::Created | ExtensionStatus::AwaitingPayment
        )
    }
}

/// Extension entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingExtension {
    pub id: i64,
    pub booking_id: i64,

    /// Additional hours requested
    pub requested_duration: i32,

    pub status: ExtensionStatus,

    pub base_price: Decimal,
    pub service_fee: Decimal,
    /// Amount the renter pays for this extension alone
    pub price: Decimal,

    /// Payment order id, distinct from the booking number
    pub order_id: String,
    pub payment_id: Option<String>,

    pub reject_reason: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
}

/// Input to extension creation
#[derive(Debug, Clone)]
pub struct NewExtension {
    pub booking_id: i64,
    pub requested_duration: i32,
    pub base_price: Decimal,
    pub service_fee: Decimal,
    pub price: Decimal,
    pub order_id: String,
}

impl NewExtension {
    /// Materialize as an extension awaiting payment
    pub fn into_extension(self, id: i64, now: DateTime<Utc>) -> BookingExtension {
        BookingExtension {
            id,
            booking_id: self.booking_id,
            requested_duration: self.requested_duration,
            status: ExtensionStatus::AwaitingPayment,
            base_price: self.base_price,
            service_fee: self.service_fee,
            price: self.price,
            order_id: self.order_id,
            payment_id: None,
            reject_reason: None,
            created_at: now,
            updated_at: now,
            decided_at: None,
        }
    }
}

impl BookingExtension {
    pub fn matches_reference(&self, reference: &str) -> bool {
        self.order_id == reference || self.payment_id.as_deref() == Some(reference)
    }
}
