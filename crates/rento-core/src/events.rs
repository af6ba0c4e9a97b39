//! Domain events
//!
//! Emitted after a booking transition has been committed. Consumers perform
//! the best-effort side effects (door passwords, notifications) and may retry
//! them without touching booking state.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::RefundPolicy;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    BookingConfirmed {
        booking_id: i64,
        renter_id: i64,
        owner_id: i64,
    },
    BookingApproved {
        booking_id: i64,
        renter_id: i64,
        owner_id: i64,
    },
    BookingActivated {
        booking_id: i64,
        renter_id: i64,
    },
    BookingCompleted {
        booking_id: i64,
        renter_id: i64,
        owner_id: i64,
        early: bool,
    },
    BookingRejected {
        booking_id: i64,
        renter_id: i64,
        reason: Option<String>,
    },
    BookingCanceled {
        booking_id: i64,
        renter_id: i64,
        owner_id: i64,
        refund_policy: RefundPolicy,
        refund_amount: Decimal,
    },
    ExtensionRequested {
        booking_id: i64,
        extension_id: i64,
        owner_id: i64,
    },
    ExtensionApproved {
        booking_id: i64,
        extension_id: i64,
        renter_id: i64,
        previous_end: DateTime<Utc>,
        new_end: DateTime<Utc>,
    },
    ExtensionRejected {
        booking_id: i64,
        extension_id: i64,
        renter_id: i64,
    },
    /// Door access could not be provisioned; staff must follow up
    LockPasswordFailed {
        booking_id: i64,
        owner_id: i64,
        reason: String,
    },
}

impl DomainEvent {
    pub fn booking_id(&self) -> i64 {
        match self {
            DomainEvent::BookingConfirmed { booking_id, .. }
            | DomainEvent::BookingApproved { booking_id, .. }
            | DomainEvent::BookingActivated { booking_id, .. }
            | DomainEvent::BookingCompleted { booking_id, .. }
            | DomainEvent::BookingRejected { booking_id, .. }
            | DomainEvent::BookingCanceled { booking_id, .. }
            | DomainEvent::ExtensionRequested { booking_id, .. }
            | DomainEvent::ExtensionApproved { booking_id, .. }
            | DomainEvent::ExtensionRejected { booking_id, .. }
            | DomainEvent::LockPasswordFailed { booking_id, .. } => *booking_id,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DomainEvent::BookingConfirmed { .. } => "booking.confirmed",
            DomainEvent::BookingApproved { .. } => "booking.approved",
            DomainEvent::BookingActivated { .. } => "booking.activated",
            DomainEvent::BookingCompleted { .. } => "booking.completed",
            DomainEvent::BookingRejected { .. } => "booking.rejected",
            DomainEvent::BookingCanceled { .. } => "booking.canceled",
            DomainEvent::ExtensionRequested { .. } => "extension.requested",
            DomainEvent::ExtensionApproved { .. } => "extension.approved",
            DomainEvent::ExtensionRejected { .. } => "extension.rejected",
            DomainEvent::LockPasswordFailed { .. } => "lock.password_failed",
        }
    }
}

impl fmt::Display for DomainEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.name(), self.booking_id())
    }
}

/// Notification categories understood by the delivery side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    BookingConfirmed,
    BookingApproved,
    BookingStarted,
    BookingCompleted,
    BookingRejected,
    BookingCanceled,
    ExtensionRequested,
    ExtensionApproved,
    ExtensionRejected,
    LockAccessIssued,
    LockAccessFailed,
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = serde_json::to_value(self)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        f.write_str(&s)
    }
}
