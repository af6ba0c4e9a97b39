//! Shared fixtures: an in-memory store, a fixed clock at 08:00 local on
//! 2026-05-04 (UTC+5), and scripted collaborators.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use parking_lot::Mutex;
use rento_core::{
    config::{BookingConfig, GatewayConfig},
    events::NotificationKind,
    models::{Actor, Apartment, ApartmentStatus, Booking, Lock, LockStatus},
    traits::{
        ApartmentRepository, LockRepository, LockVendor, NotificationSink, PaymentGateway,
        PaymentStatus,
    },
    AppError, AppResult, FixedClock, OperatingHours,
};
use rento_db::{MemoryStore, Stores};
use rento_services::{
    AvailabilityEngine, BookingService, CreateBooking, EventDispatcher, InlinePublisher,
    LockAccessService, PaymentOutcome, PricingEngine,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

pub const ADMIN: i64 = 1;
pub const OWNER: i64 = 100;
pub const RENTER: i64 = 200;
pub const OTHER_RENTER: i64 = 201;

pub fn config() -> BookingConfig {
    BookingConfig {
        timezone: "Etc/GMT-5".to_string(),
        ..BookingConfig::default()
    }
}

pub fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 5, 4).unwrap()
}

// ==================== Payment gateway ====================

#[derive(Default)]
pub struct FakePayments {
    payments: Mutex<HashMap<String, PaymentStatus>>,
    delay: Mutex<Option<std::time::Duration>>,
    calls: AtomicU32,
}

impl FakePayments {
    fn record(&self, order_id: &str, payment_id: &str, amount: Decimal, confirmed: bool) {
        let status = PaymentStatus {
            payment_id: payment_id.to_string(),
            order_id: Some(order_id.to_string()),
            amount,
            confirmed,
        };
        let mut payments = self.payments.lock();
        payments.insert(order_id.to_string(), status.clone());
        payments.insert(payment_id.to_string(), status);
    }

    pub fn confirm(&self, order_id: &str, payment_id: &str, amount: Decimal) {
        self.record(order_id, payment_id, amount, true);
    }

    pub fn pending(&self, order_id: &str, payment_id: &str, amount: Decimal) {
        self.record(order_id, payment_id, amount, false);
    }

    pub fn hang_for(&self, delay: std::time::Duration) {
        *self.delay.lock() = Some(delay);
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentGateway for FakePayments {
    async fn check_status(&self, reference: &str) -> AppResult<PaymentStatus> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.payments
            .lock()
            .get(reference)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("payment {}", reference)))
    }
}

// ==================== Lock vendor ====================

#[derive(Debug, Clone)]
pub struct InstalledPassword {
    pub vendor_id: String,
    pub unique_id: String,
    pub password: String,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
}

#[derive(Default)]
pub struct FakeVendor {
    installed: Mutex<Vec<InstalledPassword>>,
    revoked: Mutex<Vec<String>>,
    statuses: Mutex<Vec<(String, LockStatus)>>,
    failures: AtomicU32,
    counter: AtomicU32,
}

impl FakeVendor {
    /// Fail the next `n` vendor calls with a dependency error
    pub fn fail_next(&self, n: u32) {
        self.failures.store(n, Ordering::SeqCst);
    }

    fn failing(&self) -> AppResult<()> {
        let failed = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            Err(AppError::Dependency("lock vendor unavailable".into()))
        } else {
            Ok(())
        }
    }

    pub fn installed(&self) -> Vec<InstalledPassword> {
        self.installed.lock().clone()
    }

    pub fn revoked(&self) -> Vec<String> {
        self.revoked.lock().clone()
    }

    pub fn statuses(&self) -> Vec<(String, LockStatus)> {
        self.statuses.lock().clone()
    }
}

#[async_trait]
impl LockVendor for FakeVendor {
    async fn set_password(
        &self,
        lock_unique_id: &str,
        password: &str,
        valid_from: DateTime<Utc>,
        valid_until: DateTime<Utc>,
    ) -> AppResult<String> {
        self.failing()?;
        let vendor_id = format!("vp-{}", self.counter.fetch_add(1, Ordering::SeqCst) + 1);
        self.installed.lock().push(InstalledPassword {
            vendor_id: vendor_id.clone(),
            unique_id: lock_unique_id.to_string(),
            password: password.to_string(),
            valid_from,
            valid_until,
        });
        Ok(vendor_id)
    }

    async fn revoke_password(&self, _lock_unique_id: &str, vendor_password_id: &str) -> AppResult<()> {
        self.failing()?;
        self.revoked.lock().push(vendor_password_id.to_string());
        Ok(())
    }

    async fn set_status(&self, lock_unique_id: &str, status: LockStatus) -> AppResult<()> {
        self.failing()?;
        self.statuses
            .lock()
            .push((lock_unique_id.to_string(), status));
        Ok(())
    }
}

// ==================== Notifications ====================

#[derive(Default)]
pub struct RecordingSink {
    sent: Mutex<Vec<(i64, NotificationKind)>>,
}

impl RecordingSink {
    /// Recipients of `kind`, in delivery order
    pub fn recipients(&self, kind: NotificationKind) -> Vec<i64> {
        self.sent
            .lock()
            .iter()
            .filter(|(_, k)| *k == kind)
            .map(|(user, _)| *user)
            .collect()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn notify(
        &self,
        user_id: i64,
        kind: NotificationKind,
        _payload: serde_json::Value,
    ) -> AppResult<()> {
        self.sent.lock().push((user_id, kind));
        Ok(())
    }
}

// ==================== Harness ====================

pub struct Harness {
    pub store: MemoryStore,
    pub stores: Stores,
    pub hours: OperatingHours,
    pub clock: Arc<FixedClock>,
    pub payments: Arc<FakePayments>,
    pub vendor: Arc<FakeVendor>,
    pub notifications: Arc<RecordingSink>,
    pub pricing: Arc<PricingEngine>,
    pub availability: Arc<AvailabilityEngine>,
    pub lock_access: Arc<LockAccessService>,
    pub bookings: Arc<BookingService>,
}

impl Harness {
    pub fn new() -> Self {
        Self::at(day(), 8, 0)
    }

    /// Clock set to `hour:minute` local on `date`
    pub fn at(date: NaiveDate, hour: u32, minute: i64) -> Self {
        let config = config();
        let hours = OperatingHours::from_config(&config).unwrap();
        let clock = Arc::new(FixedClock::new(
            hours.at(date, hour).unwrap() + Duration::minutes(minute),
        ));

        let gateways = GatewayConfig {
            timeout_ms: 200,
            retry_attempts: 2,
            ..GatewayConfig::default()
        };

        let store = MemoryStore::new();
        let stores = Stores::memory(&store);
        let payments = Arc::new(FakePayments::default());
        let vendor = Arc::new(FakeVendor::default());
        let notifications = Arc::new(RecordingSink::default());

        let lock_access = Arc::new(LockAccessService::new(
            &stores,
            vendor.clone(),
            clock.clone(),
            &config,
            &gateways,
        ));
        let dispatcher = Arc::new(
            EventDispatcher::new(lock_access.clone(), notifications.clone())
                .with_retry(2, std::time::Duration::from_millis(1)),
        );
        let pricing = Arc::new(PricingEngine::new(
            stores.settings.clone(),
            hours.clone(),
            &config,
        ));
        let availability = Arc::new(AvailabilityEngine::new(
            stores.apartments.clone(),
            stores.bookings.clone(),
            clock.clone(),
            hours.clone(),
            &config,
        ));
        let bookings = Arc::new(BookingService::new(
            &stores,
            pricing.clone(),
            availability.clone(),
            payments.clone(),
            Arc::new(InlinePublisher::new(dispatcher)),
            clock.clone(),
            &config,
            &gateways,
        ));

        Self {
            store,
            stores,
            hours,
            clock,
            payments,
            vendor,
            notifications,
            pricing,
            availability,
            lock_access,
            bookings,
        }
    }

    /// `hour`:00 local on the fixture day
    pub fn local(&self, hour: u32) -> DateTime<Utc> {
        self.hours.at(day(), hour).unwrap()
    }

    pub fn set_local(&self, hour: u32, minute: i64) {
        self.clock.set(self.local(hour) + Duration::minutes(minute));
    }

    pub async fn seed_apartment(&self, hourly: bool, daily: bool) -> Apartment {
        let now = self.local(0);
        self.store
            .apartments()
            .create(&Apartment {
                id: 0,
                owner_id: OWNER,
                title: "Studio on Abay".to_string(),
                rental_type_hourly: hourly,
                rental_type_daily: daily,
                hourly_price: dec!(5000),
                daily_price: dec!(20000),
                is_free: true,
                status: ApartmentStatus::Approved,
                created_at: now,
                updated_at: now,
            })
            .await
            .unwrap()
    }

    pub async fn seed_lock(&self, apartment_id: i64, unique_id: &str) -> Lock {
        let now = self.clock_now();
        self.store
            .locks()
            .create(&Lock {
                id: 0,
                unique_id: unique_id.to_string(),
                name: Some("Front door".to_string()),
                apartment_id: Some(apartment_id),
                current_status: LockStatus::Closed,
                is_online: true,
                last_heartbeat: Some(now),
                battery_level: Some(90),
                created_at: now,
                updated_at: now,
            })
            .await
            .unwrap()
    }

    pub fn clock_now(&self) -> DateTime<Utc> {
        rento_core::Clock::now(self.clock.as_ref())
    }

    /// Create and confirm as `renter`
    pub async fn book_as(
        &self,
        renter: i64,
        apartment_id: i64,
        start: DateTime<Utc>,
        duration: i32,
    ) -> AppResult<Booking> {
        let created = self
            .bookings
            .create_booking(
                Actor::renter(renter),
                CreateBooking {
                    apartment_id,
                    start,
                    duration,
                },
            )
            .await?;
        self.bookings
            .confirm_booking(Actor::renter(renter), created.id)
            .await
    }

    pub async fn book(&self, apartment_id: i64, start: DateTime<Utc>, duration: i32) -> Booking {
        self.book_as(RENTER, apartment_id, start, duration)
            .await
            .unwrap()
    }

    /// Script a confirmed payment of the full price and process it
    pub async fn pay(&self, booking: &Booking) -> Booking {
        let payment_id = format!("pay-{}", booking.id);
        self.payments
            .confirm(&booking.booking_number, &payment_id, booking.final_price);
        match self
            .bookings
            .process_payment(&booking.booking_number)
            .await
            .unwrap()
        {
            PaymentOutcome::Booking { booking } => booking,
            other => panic!("expected a booking payment, got {:?}", other),
        }
    }

    /// Booked, paid and started at `start_hour` for `duration` hours
    pub async fn active_booking(&self, apartment_id: i64, start_hour: u32, duration: i32) -> Booking {
        let booking = self.book(apartment_id, self.local(start_hour), duration).await;
        let booking = self.pay(&booking).await;
        self.set_local(start_hour, 5);
        self.bookings
            .get_booking(Actor::renter(RENTER), booking.id)
            .await
            .unwrap()
    }
}
