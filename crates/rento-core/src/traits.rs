//! Repository and collaborator traits
//!
//! The booking core is written against these interfaces only. PostgreSQL and
//! in-memory implementations live in `rento-db`; HTTP adapters for the payment
//! gateway, lock vendor and notification delivery live in `rento-gateways`.

use crate::error::AppError;
use crate::events::NotificationKind;
use crate::models::{
    Apartment, Booking, BookingExtension, BookingStatus, DoorStatus, Lock, LockStatus,
    NewBooking, NewExtension, NewTempPassword, TempPassword,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Read side shared by every repository
#[async_trait]
pub trait Repository<T, ID>: Send + Sync {
    /// Find entity by ID
    async fn find_by_id(&self, id: ID) -> Result<Option<T>, AppError>;

    /// Find all entities with pagination
    async fn find_all(&self, limit: i64, offset: i64) -> Result<Vec<T>, AppError>;

    /// Count total entities
    async fn count(&self) -> Result<i64, AppError>;
}

#[async_trait]
pub trait ApartmentRepository: Repository<Apartment, i64> {
    /// Insert a listing (admin tooling and seeding)
    async fn create(&self, apartment: &Apartment) -> Result<Apartment, AppError>;

    /// Flip the derived `is_free` flag
    async fn set_free(&self, id: i64, is_free: bool) -> Result<(), AppError>;
}

/// Booking persistence
///
/// Every write is conditional on the status the caller read, so two racing
/// transitions on the same booking cannot both succeed. Writes that occupy a
/// window re-check overlaps while holding the apartment exclusively.
#[async_trait]
pub trait BookingRepository: Repository<Booking, i64> {
    /// Insert a `created` booking unless an occupying booking overlaps it
    async fn create_if_available(&self, booking: NewBooking) -> Result<Booking, AppError>;

    /// Persist `booking` if its stored status is still `expected`
    ///
    /// `door_status` is left as stored; only [`BookingRepository::set_door_status`]
    /// writes it.
    async fn transition(
        &self,
        booking: &Booking,
        expected: BookingStatus,
    ) -> Result<Booking, AppError>;

    /// Like [`BookingRepository::transition`], but first verifies that no
    /// other occupying booking overlaps `booking`'s window
    async fn transition_if_available(
        &self,
        booking: &Booking,
        expected: BookingStatus,
    ) -> Result<Booking, AppError>;

    /// Approve an extension and lengthen its booking in one unit
    ///
    /// Fails with a conflict when the booking is no longer active, the
    /// extension is no longer open, or the extended window now overlaps.
    async fn apply_extension(
        &self,
        booking: &Booking,
        extension: &BookingExtension,
    ) -> Result<(Booking, BookingExtension), AppError>;

    /// Record the door state on a booking that is still `active`
    ///
    /// Touches no other column. Returns `false` when the booking has left
    /// `active` in the meantime.
    async fn set_door_status(&self, booking_id: i64, door: DoorStatus) -> Result<bool, AppError>;

    /// Occupying bookings whose window plus cleaning touches `[from, to)`
    async fn list_occupying(
        &self,
        apartment_id: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Booking>, AppError>;

    /// Lookup by booking number or payment id
    async fn find_by_reference(&self, reference: &str) -> Result<Option<Booking>, AppError>;

    async fn find_by_payment_id(&self, payment_id: &str) -> Result<Option<Booking>, AppError>;

    async fn list_by_renter(
        &self,
        renter_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Booking>, i64), AppError>;

    async fn list_by_apartment(
        &self,
        apartment_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Booking>, i64), AppError>;

    /// Approved bookings whose start has passed
    async fn list_due_activation(&self, now: DateTime<Utc>) -> Result<Vec<Booking>, AppError>;

    /// Active bookings whose end has passed
    async fn list_due_completion(&self, now: DateTime<Utc>) -> Result<Vec<Booking>, AppError>;
}

#[async_trait]
pub trait ExtensionRepository: Repository<BookingExtension, i64> {
    /// Insert unless the booking already has an open extension
    async fn create_open(&self, extension: NewExtension) -> Result<BookingExtension, AppError>;

    async fn find_open_for_booking(
        &self,
        booking_id: i64,
    ) -> Result<Option<BookingExtension>, AppError>;

    /// Lookup by order id or payment id
    async fn find_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<BookingExtension>, AppError>;

    async fn list_for_booking(&self, booking_id: i64) -> Result<Vec<BookingExtension>, AppError>;

    /// Persist `extension` if its stored status is still open
    async fn update_open(&self, extension: &BookingExtension)
        -> Result<BookingExtension, AppError>;
}

#[async_trait]
pub trait LockRepository: Repository<Lock, i64> {
    async fn create(&self, lock: &Lock) -> Result<Lock, AppError>;

    async fn find_by_unique_id(&self, unique_id: &str) -> Result<Option<Lock>, AppError>;

    async fn find_by_apartment(&self, apartment_id: i64) -> Result<Option<Lock>, AppError>;

    async fn update(&self, lock: &Lock) -> Result<Lock, AppError>;

    /// Bind to an apartment, or unbind with `None`
    async fn bind(&self, lock_id: i64, apartment_id: Option<i64>) -> Result<Lock, AppError>;
}

#[async_trait]
pub trait TempPasswordRepository: Repository<TempPassword, i64> {
    async fn create(&self, password: NewTempPassword) -> Result<TempPassword, AppError>;

    async fn find_active_for_booking(
        &self,
        booking_id: i64,
    ) -> Result<Option<TempPassword>, AppError>;

    async fn list_active_for_lock(&self, lock_id: i64) -> Result<Vec<TempPassword>, AppError>;

    async fn list_active_for_user(&self, user_id: i64) -> Result<Vec<TempPassword>, AppError>;

    async fn update(&self, password: &TempPassword) -> Result<TempPassword, AppError>;

    /// Deactivate every active password of a booking, returning them
    async fn deactivate_for_booking(
        &self,
        booking_id: i64,
        at: DateTime<Utc>,
    ) -> Result<Vec<TempPassword>, AppError>;

    /// Deactivate every active password on a lock, returning them
    async fn deactivate_for_lock(
        &self,
        lock_id: i64,
        at: DateTime<Utc>,
    ) -> Result<Vec<TempPassword>, AppError>;
}

/// Gateway answer for a payment reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentStatus {
    /// Gateway-side payment id
    pub payment_id: String,
    /// Our order id the payment was made for
    pub order_id: Option<String>,
    pub amount: Decimal,
    pub confirmed: bool,
}

/// Payment provider
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Look up a payment by payment id or order id
    async fn check_status(&self, reference: &str) -> Result<PaymentStatus, AppError>;
}

/// Physical lock vendor
#[async_trait]
pub trait LockVendor: Send + Sync {
    /// Install a time-bounded password, returning the vendor's id for it
    async fn set_password(
        &self,
        lock_unique_id: &str,
        password: &str,
        valid_from: DateTime<Utc>,
        valid_until: DateTime<Utc>,
    ) -> Result<String, AppError>;

    async fn revoke_password(
        &self,
        lock_unique_id: &str,
        vendor_password_id: &str,
    ) -> Result<(), AppError>;

    async fn set_status(&self, lock_unique_id: &str, status: LockStatus) -> Result<(), AppError>;
}

/// Fire-and-forget user notifications
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(
        &self,
        user_id: i64,
        kind: NotificationKind,
        payload: serde_json::Value,
    ) -> Result<(), AppError>;
}

/// Live platform settings
#[async_trait]
pub trait PlatformSettings: Send + Sync {
    /// `None` when the setting has never been configured
    async fn service_fee_percent(&self) -> Result<Option<u32>, AppError>;
}

/// Pagination parameters
#[derive(Debug, Clone, Default)]
pub struct Pagination {
    pub page: i64,
    pub per_page: i64,
}

impl Pagination {
    pub fn new(page: i64, per_page: i64) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.clamp(1, 200),
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.per_page
    }

    pub fn limit(&self) -> i64 {
        self.per_page
    }
}

/// Paginated response wrapper
#[derive(Debug, Clone, Serialize)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub pagination: PaginationMeta,
}

/// Pagination metadata
#[derive(Debug, Clone, Serialize)]
pub struct PaginationMeta {
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
    pub total_pages: i64,
}

impl PaginationMeta {
    pub fn new(total: i64, page: i64, per_page: i64) -> Self {
        let total_pages = if per_page > 0 {
            (total + per_page - 1) / per_page
        } else {
            0
        };

        Self {
            total,
            page,
            per_page,
            total_pages,
        }
    }
}
