//! Clock and operating-hours arithmetic
//!
//! Storage is always UTC. Every "what hour is it locally" and "what is today"
//! question goes through [`OperatingHours`] so the business day is defined in
//! one place, and every "now" comes from an injected [`Clock`].

use crate::config::BookingConfig;
use crate::error::AppError;
use crate::AppResult;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use parking_lot::Mutex;

/// Source of the current instant
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock for tests and replays
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock() = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// The business day in the operating time zone
///
/// Hourly slots start at or after `open_hour` and finish by `close_hour` on
/// the same local day. Daily stays own the whole local calendar day: the stay
/// runs from local midnight until the cleaning buffer, which closes the day.
#[derive(Debug, Clone)]
pub struct OperatingHours {
    tz: Tz,
    pub open_hour: u32,
    pub close_hour: u32,
    pub daily_cutoff_hour: u32,
    cleaning: Duration,
}

impl OperatingHours {
    pub fn new(tz: Tz, open_hour: u32, close_hour: u32, daily_cutoff_hour: u32) -> Self {
        Self {
            tz,
            open_hour,
            close_hour,
            daily_cutoff_hour,
            cleaning: Duration::hours(1),
        }
    }

    /// Build from configuration, validating the time zone name and hours
    pub fn from_config(config: &BookingConfig) -> AppResult<Self> {
        let tz: Tz = config
            .timezone
            .parse()
            .map_err(|e| AppError::Config(format!("Unknown timezone {}: {}", config.timezone, e)))?;

        if config.open_hour >= config.close_hour || config.close_hour > 24 {
            return Err(AppError::Config(format!(
                "Invalid operating window {}:00-{}:00",
                config.open_hour, config.close_hour
            )));
        }

        Ok(Self {
            tz,
            open_hour: config.open_hour,
            close_hour: config.close_hour,
            daily_cutoff_hour: config.daily_cutoff_hour,
            cleaning: Duration::minutes(config.cleaning_minutes),
        })
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    /// Trailing buffer after every stay
    pub fn cleaning(&self) -> Duration {
        self.cleaning
    }

    pub fn local(&self, instant: DateTime<Utc>) -> DateTime<Tz> {
        instant.with_timezone(&self.tz)
    }

    /// Local calendar date of an instant
    pub fn local_date(&self, instant: DateTime<Utc>) -> NaiveDate {
        self.local(instant).date_naive()
    }

    /// Local hour of an instant
    pub fn local_hour(&self, instant: DateTime<Utc>) -> u32 {
        self.local(instant).hour()
    }

    /// UTC instant of `date` at `hour`:00 local. Hour 24 is the next midnight.
    pub fn at(&self, date: NaiveDate, hour: u32) -> AppResult<DateTime<Utc>> {
        if hour == 24 {
            let next = date
                .succ_opt()
                .ok_or_else(|| AppError::Validation(format!("Date out of range: {}", date)))?;
            return self.at(next, 0);
        }

        let naive = date
            .and_hms_opt(hour, 0, 0)
            .ok_or_else(|| AppError::Validation(format!("Invalid hour {}", hour)))?;

        self.tz
            .from_local_datetime(&naive)
            .earliest()
            .map(|local| local.with_timezone(&Utc))
            .ok_or_else(|| AppError::Validation(format!("Nonexistent local time {}", naive)))
    }

    /// Local midnight of `date`
    pub fn day_start(&self, date: NaiveDate) -> AppResult<DateTime<Utc>> {
        self.at(date, 0)
    }

    /// Stay window of a daily booking on `date`
    pub fn daily_window(&self, date: NaiveDate) -> AppResult<(DateTime<Utc>, DateTime<Utc>)> {
        let start = self.day_start(date)?;
        let end = self.at(date, 24)? - self.cleaning;
        Ok((start, end))
    }

    /// Rounds up to the next whole local hour; whole hours are kept
    pub fn round_up_to_hour(&self, instant: DateTime<Utc>) -> DateTime<Utc> {
        let local = self.local(instant);
        if local.minute() == 0 && local.second() == 0 && local.nanosecond() == 0 {
            return instant;
        }
        let truncated = instant
            - Duration::minutes(local.minute() as i64)
            - Duration::seconds(local.second() as i64)
            - Duration::nanoseconds(local.nanosecond() as i64);
        truncated + Duration::hours(1)
    }

    /// Earliest hourly start on `date` given the current instant
    ///
    /// Opening time on future days. On today, `now` rounded up to the next
    /// whole hour once the window has opened. `None` for past days.
    pub fn earliest_hourly_start(
        &self,
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> AppResult<Option<DateTime<Utc>>> {
        let today = self.local_date(now);
        if date < today {
            return Ok(None);
        }

        let open = self.at(date, self.open_hour)?;
        if date > today || now <= open {
            return Ok(Some(open));
        }

        Ok(Some(self.round_up_to_hour(now)))
    }

    /// Ensures an hourly slot starts and completes inside the operating window
    pub fn validate_hourly(&self, start: DateTime<Utc>, duration_hours: i32) -> AppResult<()> {
        let date = self.local_date(start);
        let open = self.at(date, self.open_hour)?;
        let close = self.at(date, self.close_hour)?;
        let end = start + Duration::hours(duration_hours as i64);

        if start < open || end > close {
            return Err(AppError::OutsideOperatingHours(format!(
                "hourly stays must fit within {:02}:00-{:02}:00 local, got {} for {}h",
                self.open_hour,
                self.close_hour,
                self.local(start).format("%Y-%m-%d %H:%M"),
                duration_hours
            )));
        }

        Ok(())
    }

    /// True when `date` is today and the hourly window can no longer fit anything
    pub fn hourly_day_closed(&self, date: NaiveDate, now: DateTime<Utc>) -> bool {
        self.local_date(now) == date && self.local_hour(now) >= self.close_hour
    }

    /// True when `date` is today and even a daily stay is no longer offered
    pub fn daily_day_closed(&self, date: NaiveDate, now: DateTime<Utc>) -> bool {
        self.local_date(now) == date && self.local_hour(now) >= self.daily_cutoff_hour
    }
}

impl Default for OperatingHours {
    fn default() -> Self {
        Self::new(chrono_tz::Asia::Almaty, 10, 22, 23)
    }
}
