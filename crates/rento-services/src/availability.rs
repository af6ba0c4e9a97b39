//! Availability engine
//!
//! Decides whether a window is free and enumerates what can still be booked
//! on a local day. Two stays conflict when they overlap after each is
//! extended by its cleaning buffer; only occupying statuses block.
//!
//! Enumeration loads the day's occupying bookings once and probes candidate
//! starts in memory, bounded by `max_probes` per duration.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rento_core::{
    config::BookingConfig,
    models::{Apartment, AvailableDurations, BookedDate, Booking, RentalMode, TimeSlot},
    traits::{ApartmentRepository, BookingRepository},
    AppError, AppResult, Clock, OperatingHours,
};
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::constants::{DAILY_DURATION_HOURS, MAX_BOOKED_DATES_SPAN_DAYS};
use crate::pricing::PricingEngine;

pub struct AvailabilityEngine {
    apartments: Arc<dyn ApartmentRepository>,
    bookings: Arc<dyn BookingRepository>,
    clock: Arc<dyn Clock>,
    hours: OperatingHours,
    max_probes: u32,
}

/// True when none of `occupying` (other than `exclude`) blocks `[start, end)`
fn window_free(
    occupying: &[Booking],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    exclude: Option<i64>,
) -> bool {
    !occupying
        .iter()
        .any(|b| Some(b.id) != exclude && b.blocks(start, end))
}

impl AvailabilityEngine {
    pub fn new(
        apartments: Arc<dyn ApartmentRepository>,
        bookings: Arc<dyn BookingRepository>,
        clock: Arc<dyn Clock>,
        hours: OperatingHours,
        config: &BookingConfig,
    ) -> Self {
        Self {
            apartments,
            bookings,
            clock,
            hours,
            max_probes: config.max_probes,
        }
    }

    pub fn hours(&self) -> &OperatingHours {
        &self.hours
    }

    /// Load an apartment, failing distinctly when it exists but is not approved
    pub async fn load_bookable(&self, apartment_id: i64) -> AppResult<Apartment> {
        let apartment = self
            .apartments
            .find_by_id(apartment_id)
            .await?
            .ok_or_else(|| AppError::ApartmentNotFound(apartment_id.to_string()))?;

        if !apartment.is_bookable() {
            return Err(AppError::ApartmentNotBookable(format!(
                "{} (status {})",
                apartment_id, apartment.status
            )));
        }

        Ok(apartment)
    }

    pub async fn is_available(
        &self,
        apartment_id: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> AppResult<bool> {
        self.is_available_excluding(apartment_id, start, end, None)
            .await
    }

    /// Like [`AvailabilityEngine::is_available`], ignoring one booking
    pub async fn is_available_excluding(
        &self,
        apartment_id: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        exclude: Option<i64>,
    ) -> AppResult<bool> {
        if end <= start {
            return Err(AppError::Validation(format!(
                "window end {} is not after start {}",
                end, start
            )));
        }

        let occupying = self
            .bookings
            .list_occupying(apartment_id, start, end + self.hours.cleaning())
            .await?;

        Ok(window_free(&occupying, start, end, exclude))
    }

    /// The concrete stay window for a request, validated against local time
    ///
    /// Daily requests are normalized to the local calendar day of `start`.
    /// Hourly requests must fit the operating window and may not start
    /// before the current hour rounded up.
    pub fn resolve_window(
        &self,
        apartment: &Apartment,
        start: DateTime<Utc>,
        duration: i32,
    ) -> AppResult<(DateTime<Utc>, DateTime<Utc>)> {
        PricingEngine::validate_duration(duration)?;

        let mode = RentalMode::for_duration(duration);
        if !apartment.supports(mode) {
            return Err(AppError::UnsupportedRentalMode(format!(
                "apartment {} does not offer {} stays",
                apartment.id, mode
            )));
        }

        let now = self.clock.now();
        let date = self.hours.local_date(start);
        let today = self.hours.local_date(now);
        if date < today {
            return Err(AppError::Validation(format!("{} is in the past", date)));
        }

        match mode {
            RentalMode::Daily => {
                if self.hours.daily_day_closed(date, now) {
                    return Err(AppError::OutsideOperatingHours(format!(
                        "daily stays for today close at {:02}:00",
                        self.hours.daily_cutoff_hour
                    )));
                }
                self.hours.daily_window(date)
            }
            RentalMode::Hourly => {
                self.hours.validate_hourly(start, duration)?;

                let end = start + Duration::hours(duration as i64);
                if end <= now {
                    return Err(AppError::Validation(format!(
                        "window ending {} is in the past",
                        end
                    )));
                }

                if let Some(earliest) = self.hours.earliest_hourly_start(date, now)? {
                    if start < earliest {
                        return Err(AppError::Validation(format!(
                            "earliest start is {}",
                            self.hours.local(earliest).format("%Y-%m-%d %H:%M")
                        )));
                    }
                }

                Ok((start, end))
            }
        }
    }

    /// Is the requested stay free right now
    #[instrument(skip(self))]
    pub async fn check_availability(
        &self,
        apartment_id: i64,
        start: DateTime<Utc>,
        duration: i32,
    ) -> AppResult<bool> {
        let apartment = self.load_bookable(apartment_id).await?;
        let (start, end) = self.resolve_window(&apartment, start, duration)?;
        self.is_available(apartment_id, start, end).await
    }

    async fn occupying_on(&self, apartment_id: i64, date: NaiveDate) -> AppResult<Vec<Booking>> {
        let from = self.hours.day_start(date)?;
        let to = self.hours.at(date, 24)? + self.hours.cleaning();
        self.bookings.list_occupying(apartment_id, from, to).await
    }

    /// Today is shut when its operating window can no longer fit anything
    fn today_closed(&self, apartment: &Apartment, date: NaiveDate, now: DateTime<Utc>) -> bool {
        (apartment.is_hourly_only() && self.hours.hourly_day_closed(date, now))
            || (apartment.rental_type_daily && self.hours.daily_day_closed(date, now))
    }

    /// Durations that still have at least one free start on the day of `start_time`
    #[instrument(skip(self))]
    pub async fn enumerate_durations(
        &self,
        apartment_id: i64,
        start_time: DateTime<Utc>,
    ) -> AppResult<AvailableDurations> {
        let apartment = self.load_bookable(apartment_id).await?;
        let now = self.clock.now();
        let date = self.hours.local_date(start_time);

        if date < self.hours.local_date(now) {
            return Err(AppError::Validation(format!("{} is in the past", date)));
        }

        if self.today_closed(&apartment, date, now) {
            debug!("Apartment {} closed for today {}", apartment_id, date);
            return Ok(AvailableDurations {
                durations: Vec::new(),
                unavailable_today: true,
            });
        }

        let occupying = self.occupying_on(apartment_id, date).await?;
        let mut durations = Vec::new();

        if apartment.rental_type_hourly && !self.hours.hourly_day_closed(date, now) {
            if let Some(earliest) = self.hours.earliest_hourly_start(date, now)? {
                let earliest = earliest.max(self.hours.round_up_to_hour(start_time));

                for duration in 1..DAILY_DURATION_HOURS {
                    let Some(latest_hour) = self.hours.close_hour.checked_sub(duration as u32)
                    else {
                        break;
                    };
                    if latest_hour < self.hours.open_hour {
                        break;
                    }
                    let latest = self.hours.at(date, latest_hour)?;
                    let length = Duration::hours(duration as i64);

                    let mut probe = earliest;
                    for _ in 0..self.max_probes {
                        if probe > latest {
                            break;
                        }
                        if window_free(&occupying, probe, probe + length, None) {
                            durations.push(duration);
                            break;
                        }
                        probe += Duration::hours(1);
                    }
                }
            }
        }

        if apartment.rental_type_daily && !self.hours.daily_day_closed(date, now) {
            let (start, end) = self.hours.daily_window(date)?;
            if window_free(&occupying, start, end, None) {
                durations.push(DAILY_DURATION_HOURS);
            }
        }

        Ok(AvailableDurations {
            durations,
            unavailable_today: false,
        })
    }

    /// Every free start for `duration` on `date`
    #[instrument(skip(self))]
    pub async fn available_time_slots(
        &self,
        apartment_id: i64,
        date: NaiveDate,
        duration: i32,
    ) -> AppResult<Vec<TimeSlot>> {
        let apartment = self.load_bookable(apartment_id).await?;
        PricingEngine::validate_duration(duration)?;

        let mode = RentalMode::for_duration(duration);
        if !apartment.supports(mode) {
            return Err(AppError::UnsupportedRentalMode(format!(
                "apartment {} does not offer {} stays",
                apartment.id, mode
            )));
        }

        let now = self.clock.now();
        if date < self.hours.local_date(now) {
            return Ok(Vec::new());
        }

        let occupying = self.occupying_on(apartment_id, date).await?;

        if mode == RentalMode::Daily {
            if self.hours.daily_day_closed(date, now) {
                return Ok(Vec::new());
            }
            let (start, end) = self.hours.daily_window(date)?;
            return Ok(if window_free(&occupying, start, end, None) {
                vec![TimeSlot { start, end }]
            } else {
                Vec::new()
            });
        }

        let Some(mut start) = self.hours.earliest_hourly_start(date, now)? else {
            return Ok(Vec::new());
        };
        let close = self.hours.at(date, self.hours.close_hour)?;
        let length = Duration::hours(duration as i64);

        let mut slots = Vec::new();
        while start + length <= close {
            if window_free(&occupying, start, start + length, None) {
                slots.push(TimeSlot {
                    start,
                    end: start + length,
                });
            }
            start += Duration::hours(1);
        }

        Ok(slots)
    }

    /// Local days in `[from, to]` on which nothing can be booked
    ///
    /// Today is also reported, flagged `synthesized`, once it is too late
    /// to offer anything even though no booking covers it.
    #[instrument(skip(self))]
    pub async fn booked_dates(
        &self,
        apartment_id: i64,
        from: NaiveDate,
        to: NaiveDate,
    ) -> AppResult<Vec<BookedDate>> {
        if to < from {
            return Err(AppError::Validation(format!("{} is before {}", to, from)));
        }
        if (to - from).num_days() > MAX_BOOKED_DATES_SPAN_DAYS {
            return Err(AppError::Validation(format!(
                "range may span at most {} days",
                MAX_BOOKED_DATES_SPAN_DAYS
            )));
        }

        let apartment = self
            .apartments
            .find_by_id(apartment_id)
            .await?
            .ok_or_else(|| AppError::ApartmentNotFound(apartment_id.to_string()))?;

        let range_start = self.hours.day_start(from)?;
        let range_end = self.hours.at(to, 24)? + self.hours.cleaning();
        let occupying = self
            .bookings
            .list_occupying(apartment_id, range_start, range_end)
            .await?;

        let now = self.clock.now();
        let today = self.hours.local_date(now);
        let hour = Duration::hours(1);
        let mut dates = Vec::new();

        for date in from.iter_days().take_while(|d| *d <= to) {
            let daily_free = if apartment.rental_type_daily {
                let (start, end) = self.hours.daily_window(date)?;
                window_free(&occupying, start, end, None)
            } else {
                false
            };

            let mut hourly_free = false;
            if apartment.rental_type_hourly && !daily_free {
                for h in self.hours.open_hour..self.hours.close_hour {
                    let start = self.hours.at(date, h)?;
                    if window_free(&occupying, start, start + hour, None) {
                        hourly_free = true;
                        break;
                    }
                }
            }

            if !daily_free && !hourly_free {
                dates.push(BookedDate {
                    date,
                    synthesized: false,
                });
            } else if date == today && self.today_closed(&apartment, date, now) {
                dates.push(BookedDate {
                    date,
                    synthesized: true,
                });
            }
        }

        Ok(dates)
    }
}
