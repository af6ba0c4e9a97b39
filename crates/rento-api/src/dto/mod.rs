//! Data Transfer Objects for API requests and responses

pub mod apartment;
pub mod booking;
pub mod common;
pub mod lock;

pub use apartment::*;
pub use booking::*;
pub use common::*;
pub use lock::*;
