//! Availability query results

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Durations bookable on a day
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailableDurations {
    pub durations: Vec<i32>,
    /// Today can no longer be booked at all
    pub unavailable_today: bool,
}

/// A free window of a fixed duration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSlot {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// A calendar day that cannot take a daily stay
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookedDate {
    pub date: NaiveDate,
    /// No stored booking; the day's window has already closed
    pub synthesized: bool,
}
