//! Booking lifecycle services for Rento
//!
//! The engines and orchestrators that carry the business rules:
//!
//! - `PricingEngine` - tariff, package discounts and service fee
//! - `AvailabilityEngine` - overlap checks and slot enumeration in local time
//! - `BookingService` - the booking state machine and its extension sub-flow
//! - `LockAccessService` - door passwords and lock telemetry
//! - `EventDispatcher` - runs best-effort side effects after commits
//!
//! Services hold their collaborators behind `Arc<dyn Trait>` so the binary
//! can pick PostgreSQL or the in-memory store at startup. Every state change
//! is committed first; door access and notifications follow as events.

pub mod availability;
pub mod booking;
pub mod dispatcher;
pub mod extension;
pub mod guard;
pub mod lock_access;
pub mod pricing;
pub mod refund;

pub use availability::AvailabilityEngine;
pub use booking::{BookingService, CreateBooking, PaymentOutcome};
pub use dispatcher::{ChannelPublisher, EventDispatcher, EventPublisher, InlinePublisher};
pub use guard::KeyedLocks;
pub use lock_access::{BookingLockAccess, LockAccessService, LockState};
pub use pricing::PricingEngine;
pub use refund::RefundDecision;

/// Business logic constants
pub mod constants {
    /// Hours of the short package
    pub const SHORT_PACKAGE_HOURS: i32 = 6;

    /// Percent off the short package
    pub const SHORT_PACKAGE_DISCOUNT_PERCENT: u32 = 10;

    /// Hours of the long package
    pub const LONG_PACKAGE_HOURS: i32 = 12;

    /// Percent off the long package
    pub const LONG_PACKAGE_DISCOUNT_PERCENT: u32 = 15;

    pub const MIN_DURATION_HOURS: i32 = 1;

    /// A 24 hour request is a daily booking
    pub const DAILY_DURATION_HOURS: i32 = 24;

    pub const BOOKING_NUMBER_PREFIX: &str = "RB-";

    /// Random digits after the date in a booking number
    pub const BOOKING_NUMBER_DIGITS: usize = 6;

    /// Door codes are numeric
    pub const PASSWORD_LENGTH: usize = 7;

    /// Longest range `booked_dates` accepts, in days
    pub const MAX_BOOKED_DATES_SPAN_DAYS: i64 = 93;

    /// Attempts per side effect in the dispatcher
    pub const DISPATCH_MAX_ATTEMPTS: u32 = 3;

    /// First retry delay in the dispatcher; doubles per attempt
    pub const DISPATCH_RETRY_DELAY_MS: u64 = 200;
}
