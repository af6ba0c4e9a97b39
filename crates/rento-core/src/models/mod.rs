//! Domain models for Rento
//!
//! Apartments are read-mostly inputs; bookings, extensions and temporary
//! passwords are owned by the booking and lock services.

pub mod apartment;
pub mod availability;
pub mod booking;
pub mod extension;
pub mod lock;
pub mod pricing;
pub mod user;

pub use apartment::{Apartment, ApartmentStatus, RentalMode};
pub use availability::{AvailableDurations, BookedDate, TimeSlot};
pub use booking::{
    windows_conflict, Booking, BookingStatus, CancellationPreview, DoorStatus, NewBooking,
    RefundPolicy,
};
pub use extension::{BookingExtension, ExtensionStatus, NewExtension};
pub use lock::{
    Lock, LockStatus, NewTempPassword, PasswordOwner, TelemetryEvent, TelemetryKind, TempPassword,
};
pub use pricing::PriceQuote;
pub use user::{Actor, UserRole};
