//! Query parameters for the apartment availability endpoints

use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use validator::Validate;

#[derive(Debug, Clone, Deserialize)]
pub struct DurationsQuery {
    /// Defaults to now
    pub start_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SlotsQuery {
    /// Local calendar date
    pub date: NaiveDate,

    #[validate(range(min = 1, max = 24))]
    pub duration: i32,
}

/// Shared by the availability check and the price quote
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct WindowQuery {
    pub start: DateTime<Utc>,

    #[validate(range(min = 1, max = 24))]
    pub duration: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BookedDatesQuery {
    pub from: NaiveDate,
    pub to: NaiveDate,
}
