//! Pricing engine
//!
//! Turns an apartment tariff, a duration and a start time into a frozen
//! price. Hourly stays pay `hourly_price × hours`, less a package discount
//! for exactly 6 or 12 hours, plus a percentage fee from the live platform
//! setting. Daily stays pay `daily_price` plus a flat fee.
//!
//! The engine validates the operating window itself, so a caller cannot
//! price a slot it would not be allowed to book.

use chrono::{DateTime, Utc};
use rento_core::{
    config::BookingConfig,
    models::{Apartment, PriceQuote, RentalMode},
    traits::PlatformSettings,
    AppError, AppResult, OperatingHours,
};
use rust_decimal::{Decimal, RoundingStrategy};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::constants::{
    DAILY_DURATION_HOURS, LONG_PACKAGE_DISCOUNT_PERCENT, LONG_PACKAGE_HOURS, MIN_DURATION_HOURS,
    SHORT_PACKAGE_DISCOUNT_PERCENT, SHORT_PACKAGE_HOURS,
};

pub struct PricingEngine {
    settings: Arc<dyn PlatformSettings>,
    hours: OperatingHours,
    default_fee_percent: u32,
    daily_fee: Decimal,
}

impl PricingEngine {
    pub fn new(
        settings: Arc<dyn PlatformSettings>,
        hours: OperatingHours,
        config: &BookingConfig,
    ) -> Self {
        Self {
            settings,
            hours,
            default_fee_percent: config.default_service_fee_percent,
            daily_fee: config.daily_service_fee,
        }
    }

    /// Package discount for a duration; zero outside the two packages
    pub fn discount_percent(duration: i32) -> u32 {
        match duration {
            SHORT_PACKAGE_HOURS => SHORT_PACKAGE_DISCOUNT_PERCENT,
            LONG_PACKAGE_HOURS => LONG_PACKAGE_DISCOUNT_PERCENT,
            _ => 0,
        }
    }

    pub fn validate_duration(duration: i32) -> AppResult<()> {
        if !(MIN_DURATION_HOURS..=DAILY_DURATION_HOURS).contains(&duration) {
            return Err(AppError::Validation(format!(
                "duration must be between {} and {} hours, got {}",
                MIN_DURATION_HOURS, DAILY_DURATION_HOURS, duration
            )));
        }
        Ok(())
    }

    /// Current fee percent, falling back to the configured default when the
    /// setting is missing or unreadable
    pub async fn fee_percent(&self) -> u32 {
        match self.settings.service_fee_percent().await {
            Ok(Some(percent)) => percent,
            Ok(None) => self.default_fee_percent,
            Err(e) => {
                warn!(
                    "Service fee setting unavailable, using default {}%: {}",
                    self.default_fee_percent, e
                );
                self.default_fee_percent
            }
        }
    }

    /// Price a stay with the live fee setting
    #[instrument(skip(self, apartment), fields(apartment_id = apartment.id))]
    pub async fn calculate(
        &self,
        apartment: &Apartment,
        duration: i32,
        start: DateTime<Utc>,
    ) -> AppResult<PriceQuote> {
        let fee_percent = self.fee_percent().await;
        self.quote(apartment, duration, start, fee_percent)
    }

    /// Price a stay with an explicit fee percent
    ///
    /// Pure: identical inputs give identical quotes, which is what receipts
    /// and audits re-derive.
    pub fn quote(
        &self,
        apartment: &Apartment,
        duration: i32,
        start: DateTime<Utc>,
        fee_percent: u32,
    ) -> AppResult<PriceQuote> {
        Self::validate_duration(duration)?;

        let mode = RentalMode::for_duration(duration);
        if !apartment.supports(mode) {
            return Err(AppError::UnsupportedRentalMode(format!(
                "apartment {} does not offer {} stays",
                apartment.id, mode
            )));
        }

        let quote = match mode {
            RentalMode::Daily => {
                if apartment.daily_price <= Decimal::ZERO {
                    return Err(AppError::TariffNotConfigured(format!(
                        "apartment {} has no daily price",
                        apartment.id
                    )));
                }

                PriceQuote {
                    mode,
                    duration,
                    gross_price: apartment.daily_price,
                    discount_percent: 0,
                    base_price: apartment.daily_price,
                    fee_percent: None,
                    service_fee: self.daily_fee,
                    final_price: apartment.daily_price + self.daily_fee,
                }
            }
            RentalMode::Hourly => {
                if apartment.hourly_price <= Decimal::ZERO {
                    return Err(AppError::TariffNotConfigured(format!(
                        "apartment {} has no hourly price",
                        apartment.id
                    )));
                }

                self.hours.validate_hourly(start, duration)?;

                let gross_price = apartment.hourly_price * Decimal::from(duration);
                let discount_percent = Self::discount_percent(duration);
                let base_price = money(
                    gross_price * Decimal::from(100 - discount_percent) / Decimal::from(100),
                );
                let service_fee =
                    money(base_price * Decimal::from(fee_percent) / Decimal::from(100));

                PriceQuote {
                    mode,
                    duration,
                    gross_price,
                    discount_percent,
                    base_price,
                    fee_percent: Some(fee_percent),
                    service_fee,
                    final_price: base_price + service_fee,
                }
            }
        };

        debug!(
            "Quoted apartment {} for {}h: {} + {} = {}",
            apartment.id, duration, quote.base_price, quote.service_fee, quote.final_price
        );

        Ok(quote)
    }
}

/// Two decimal places, halves away from zero
fn money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}
