//! Apartment model
//!
//! Read-mostly input to booking. Only `is_free` is written by the booking
//! lifecycle.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Moderation status of a listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ApartmentStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
    Blocked,
}

impl fmt::Display for ApartmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApartmentStatus::Pending => write!(f, "pending"),
            ApartmentStatus::Approved => write!(f, "approved"),
            ApartmentStatus::Rejected => write!(f, "rejected"),
            ApartmentStatus::Blocked => write!(f, "blocked"),
        }
    }
}

impl ApartmentStatus {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(ApartmentStatus::Pending),
            "approved" => Some(ApartmentStatus::Approved),
            "rejected" => Some(ApartmentStatus::Rejected),
            "blocked" => Some(ApartmentStatus::Blocked),
            _ => None,
        }
    }
}

/// How a duration is rented
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RentalMode {
    Hourly,
    Daily,
}

impl RentalMode {
    /// 24 hours is a daily stay, anything shorter is hourly
    pub fn for_duration(duration_hours: i32) -> Self {
        if duration_hours == 24 {
            RentalMode::Daily
        } else {
            RentalMode::Hourly
        }
    }
}

impl fmt::Display for RentalMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RentalMode::Hourly => write!(f, "hourly"),
            RentalMode::Daily => write!(f, "daily"),
        }
    }
}

/// Apartment entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Apartment {
    pub id: i64,
    pub owner_id: i64,
    pub title: String,
    pub rental_type_hourly: bool,
    pub rental_type_daily: bool,
    pub hourly_price: Decimal,
    pub daily_price: Decimal,
    /// False while an approved or active booking holds the apartment
    pub is_free: bool,
    pub status: ApartmentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Apartment {
    /// Only approved listings can be booked
    pub fn is_bookable(&self) -> bool {
        self.status == ApartmentStatus::Approved
    }

    pub fn supports(&self, mode: RentalMode) -> bool {
        match mode {
            RentalMode::Hourly => self.rental_type_hourly,
            RentalMode::Daily => self.rental_type_daily,
        }
    }

    /// Hourly only: no daily stays are offered
    pub fn is_hourly_only(&self) -> bool {
        self.rental_type_hourly && !self.rental_type_daily
    }
}
