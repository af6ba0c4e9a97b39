//! Booking model
//!
//! A booking moves through
//! `created → pending → awaiting_payment → approved → active → completed`,
//! with `rejected` and `canceled` as the other terminal states. Prices are
//! frozen at creation and never recomputed.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Booking lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    /// Priced and stored, not yet confirmed by the renter
    #[default]
    Created,
    /// Confirmed by the renter
    Pending,
    /// Waiting for the payment gateway
    AwaitingPayment,
    /// Paid; the window is held and the door password issued
    Approved,
    /// The stay is in progress
    Active,
    Completed,
    Canceled,
    Rejected,
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BookingStatus::Created => write!(f, "created"),
            BookingStatus::Pending => write!(f, "pending"),
            BookingStatus::AwaitingPayment => write!(f, "awaiting_payment"),
            BookingStatus::Approved => write!(f, "approved"),
            BookingStatus::Active => write!(f, "active"),
            BookingStatus::Completed => write!(f, "completed"),
            BookingStatus::Canceled => write!(f, "canceled"),
            BookingStatus::Rejected => write!(f, "rejected"),
        }
    }
}

impl BookingStatus {
    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "created" => Some(BookingStatus::Created),
            "pending" => Some(BookingStatus::Pending),
            "awaiting_payment" => Some(BookingStatus::AwaitingPayment),
            "approved" => Some(BookingStatus::Approved),
            "active" => Some(BookingStatus::Active),
            "completed" => Some(BookingStatus::Completed),
            "canceled" | "cancelled" => Some(BookingStatus::Canceled),
            "rejected" => Some(BookingStatus::Rejected),
            _ => None,
        }
    }

    /// Statuses that hold their window against new bookings
    pub const OCCUPYING: [BookingStatus; 4] = [
        BookingStatus::Pending,
        BookingStatus::AwaitingPayment,
        BookingStatus::Approved,
        BookingStatus::Active,
    ];

    /// Check if the booking blocks its window
    pub fn is_occupying(&self) -> bool {
        Self::OCCUPYING.contains(self)
    }

    /// Check if no further transition is possible
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BookingStatus::Completed | BookingStatus::Canceled | BookingStatus::Rejected
        )
    }

    /// Money has been taken for this booking
    pub fn is_paid(&self) -> bool {
        matches!(self, BookingStatus::Approved | BookingStatus::Active)
    }
}

/// Door state as last reported for the booking's lock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DoorStatus {
    #[default]
    Closed,
    Open,
    /// The lock was reset and all access revoked
    EmergencyLocked,
}

impl fmt::Display for DoorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DoorStatus::Closed => write!(f, "closed"),
            DoorStatus::Open => write!(f, "open"),
            DoorStatus::EmergencyLocked => write!(f, "emergency_locked"),
        }
    }
}

impl DoorStatus {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "closed" => Some(DoorStatus::Closed),
            "open" => Some(DoorStatus::Open),
            "emergency_locked" => Some(DoorStatus::EmergencyLocked),
            _ => None,
        }
    }
}

/// Refund outcome of a cancellation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefundPolicy {
    FullRefund,
    NonRefundable,
    /// The stay already started; early finish is not a cancellation
    NotApplicable,
}

impl fmt::Display for RefundPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefundPolicy::FullRefund => write!(f, "full_refund"),
            RefundPolicy::NonRefundable => write!(f, "non_refundable"),
            RefundPolicy::NotApplicable => write!(f, "not_applicable"),
        }
    }
}

impl RefundPolicy {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "full_refund" => Some(RefundPolicy::FullRefund),
            "non_refundable" => Some(RefundPolicy::NonRefundable),
            "not_applicable" => Some(RefundPolicy::NotApplicable),
            _ => None,
        }
    }
}

/// What a cancellation would do right now
#[derive(Debug, Clone, Serialize)]
pub struct CancellationPreview {
    pub booking_id: i64,
    pub status: BookingStatus,
    pub refund_policy: RefundPolicy,
    pub refund_amount: Decimal,
    /// Negative once the start has passed
    pub seconds_until_start: i64,
}

/// Two stays conflict when they overlap after each is extended by `buffer`
pub fn windows_conflict(
    a_start: DateTime<Utc>,
    a_end: DateTime<Utc>,
    b_start: DateTime<Utc>,
    b_end: DateTime<Utc>,
    buffer: Duration,
) -> bool {
    a_start < b_end + buffer && b_start < a_end + buffer
}

/// Booking entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: i64,
    pub apartment_id: i64,
    pub renter_id: i64,

    /// Shown to users and used as the payment order id; never changes
    pub booking_number: String,

    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,

    /// Hours, 1 to 24
    pub duration: i32,

    /// Buffer after `end_date` during which nothing else is offered
    pub cleaning_minutes: i32,

    pub status: BookingStatus,

    pub total_price: Decimal,
    pub service_fee: Decimal,
    pub final_price: Decimal,

    /// Gateway payment id, set once paid
    pub payment_id: Option<String>,

    pub door_status: DoorStatus,

    /// Computed on read, never persisted
    #[serde(default)]
    pub can_extend: bool,

    pub extension_requested: bool,
    pub extension_duration: Option<i32>,
    pub extension_price: Option<Decimal>,

    pub cancellation_reason: Option<String>,
    pub owner_comment: Option<String>,
    pub refund_policy: Option<RefundPolicy>,
    pub refund_amount: Option<Decimal>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Booking {
    pub fn cleaning(&self) -> Duration {
        Duration::minutes(self.cleaning_minutes as i64)
    }

    /// End of the stay plus cleaning buffer
    pub fn occupied_until(&self) -> DateTime<Utc> {
        self.end_date + self.cleaning()
    }

    pub fn is_daily(&self) -> bool {
        self.duration == 24
    }

    /// Whether this booking blocks `[start, end)` for a new stay
    pub fn blocks(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.status.is_occupying()
            && windows_conflict(self.start_date, self.end_date, start, end, self.cleaning())
    }

    /// Whether `reference` identifies this booking's payment
    pub fn matches_reference(&self, reference: &str) -> bool {
        self.booking_number == reference || self.payment_id.as_deref() == Some(reference)
    }

    pub fn clear_pending_extension(&mut self) {
        self.extension_requested = false;
        self.extension_duration = None;
        self.extension_price = None;
    }
}

/// Input to booking creation, prices already computed
#[derive(Debug, Clone)]
pub struct NewBooking {
    pub apartment_id: i64,
    pub renter_id: i64,
    pub booking_number: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub duration: i32,
    pub cleaning_minutes: i32,
    pub total_price: Decimal,
    pub service_fee: Decimal,
    pub final_price: Decimal,
}

impl NewBooking {
    /// Materialize as a `created` booking with the given id
    pub fn into_booking(self, id: i64, now: DateTime<Utc>) -> Booking {
        Booking {
            id,
            apartment_id: self.apartment_id,
            renter_id: self.renter_id,
            booking_number: self.booking_number,
            start_date: self.start_date,
            end_date: self.end_date,
            duration: self.duration,
            cleaning_minutes: self.cleaning_minutes,
            status: BookingStatus::Created,
            total_price: self.total_price,
            service_fee: self.service_fee,
            final_price: self.final_price,
            payment_id: None,
            door_status: DoorStatus::Closed,
            can_extend: false,
            extension_requested: false,
            extension_duration: None,
            extension_price: None,
            cancellation_reason: None,
            owner_comment: None,
            refund_policy: None,
            refund_amount: None,
            created_at: now,
            updated_at: now,
            paid_at: None,
            finished_at: None,
        }
    }
}
