//! Rento Core Library
//!
//! Foundational types shared by every Rento crate:
//!
//! - Domain models (Apartment, Booking, BookingExtension, Lock, TempPassword)
//! - Clock and operating-hours arithmetic in the platform time zone
//! - Repository and collaborator traits (payment gateway, lock vendor, notifications)
//! - Domain events emitted after committed booking transitions
//! - Unified error handling with HTTP response mapping
//! - Application configuration

pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod models;
pub mod traits;

pub use clock::{Clock, FixedClock, OperatingHours, SystemClock};
pub use config::AppConfig;
pub use error::{AppError, ErrorKind};
pub use events::DomainEvent;

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;
