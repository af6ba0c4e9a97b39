//! HTTP request handlers

pub mod apartment;
pub mod booking;
pub mod health;
pub mod lock;
pub mod payment;

pub use apartment::configure as configure_apartments;
pub use booking::configure as configure_bookings;
pub use health::configure as configure_health;
pub use lock::configure as configure_locks;
pub use payment::configure as configure_payments;
