//! In-process store
//!
//! Implements every repository trait over plain maps behind one
//! `parking_lot::Mutex`. Each trait call takes the lock once, so the overlap
//! check and the write of `create_if_available` are atomic, matching the row
//! lock taken by the PostgreSQL implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rento_core::{
    models::{
        windows_conflict, Apartment, Booking, BookingExtension, BookingStatus, DoorStatus,
        ExtensionStatus, Lock, NewBooking, NewExtension, NewTempPassword, TempPassword,
    },
    traits::{
        ApartmentRepository, BookingRepository, ExtensionRepository, LockRepository,
        PlatformSettings, Repository, TempPasswordRepository,
    },
    AppError, AppResult,
};
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Default)]
struct Tables {
    apartments: BTreeMap<i64, Apartment>,
    bookings: BTreeMap<i64, Booking>,
    extensions: BTreeMap<i64, BookingExtension>,
    locks: BTreeMap<i64, Lock>,
    passwords: BTreeMap<i64, TempPassword>,
    service_fee_percent: Option<u32>,
    next_id: i64,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn overlaps(&self, apartment_id: i64, candidate: &Booking, exclude: Option<i64>) -> bool {
        self.bookings.values().any(|b| {
            b.apartment_id == apartment_id
                && Some(b.id) != exclude
                && b.status.is_occupying()
                && windows_conflict(
                    b.start_date,
                    b.end_date,
                    candidate.start_date,
                    candidate.end_date,
                    b.cleaning(),
                )
        })
    }

    fn guarded_update(&mut self, booking: &Booking, expected: BookingStatus) -> AppResult<Booking> {
        if let Some(payment_id) = booking.payment_id.as_deref() {
            let taken = self
                .bookings
                .values()
                .any(|b| b.id != booking.id && b.payment_id.as_deref() == Some(payment_id));
            if taken {
                return Err(AppError::DuplicatePayment(payment_id.to_string()));
            }
        }

        let stored = self
            .bookings
            .get_mut(&booking.id)
            .ok_or_else(|| AppError::BookingNotFound(booking.id.to_string()))?;

        if stored.status != expected {
            return Err(AppError::Conflict(format!(
                "booking {} is no longer {}",
                booking.id, expected
            )));
        }

        let mut updated = booking.clone();
        updated.door_status = stored.door_status;
        updated.can_extend = false;
        updated.updated_at = Utc::now();
        *stored = updated.clone();
        Ok(updated)
    }
}

fn page<T: Clone>(items: Vec<&T>, limit: i64, offset: i64) -> Vec<T> {
    items
        .into_iter()
        .skip(offset.max(0) as usize)
        .take(limit.max(0) as usize)
        .cloned()
        .collect()
}

/// Shared in-memory tables; hand out typed repositories with the accessors
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apartments(&self) -> MemoryApartmentRepository {
        MemoryApartmentRepository(self.clone())
    }

    pub fn bookings(&self) -> MemoryBookingRepository {
        MemoryBookingRepository(self.clone())
    }

    pub fn extensions(&self) -> MemoryExtensionRepository {
        MemoryExtensionRepository(self.clone())
    }

    pub fn locks(&self) -> MemoryLockRepository {
        MemoryLockRepository(self.clone())
    }

    pub fn passwords(&self) -> MemoryTempPasswordRepository {
        MemoryTempPasswordRepository(self.clone())
    }

    pub fn settings(&self) -> MemorySettings {
        MemorySettings(self.clone())
    }

    pub fn set_service_fee_percent(&self, percent: Option<u32>) {
        self.tables.lock().service_fee_percent = percent;
    }
}

pub struct MemoryApartmentRepository(MemoryStore);
pub struct MemoryBookingRepository(MemoryStore);
pub struct MemoryExtensionRepository(MemoryStore);
pub struct MemoryLockRepository(MemoryStore);
pub struct MemoryTempPasswordRepository(MemoryStore);
pub struct MemorySettings(MemoryStore);

// ==================== Apartments ====================

#[async_trait]
impl Repository<Apartment, i64> for MemoryApartmentRepository {
    async fn find_by_id(&self, id: i64) -> AppResult<Option<Apartment>> {
        Ok(self.0.tables.lock().apartments.get(&id).cloned())
    }

    async fn find_all(&self, limit: i64, offset: i64) -> AppResult<Vec<Apartment>> {
        let tables = self.0.tables.lock();
        Ok(page(tables.apartments.values().collect(), limit, offset))
    }

    async fn count(&self) -> AppResult<i64> {
        Ok(self.0.tables.lock().apartments.len() as i64)
    }
}

#[async_trait]
impl ApartmentRepository for MemoryApartmentRepository {
    async fn create(&self, apartment: &Apartment) -> AppResult<Apartment> {
        let mut tables = self.0.tables.lock();
        let mut created = apartment.clone();
        created.id = tables.next_id();
        tables.apartments.insert(created.id, created.clone());
        Ok(created)
    }

    async fn set_free(&self, id: i64, is_free: bool) -> AppResult<()> {
        let mut tables = self.0.tables.lock();
        let apartment = tables
            .apartments
            .get_mut(&id)
            .ok_or_else(|| AppError::ApartmentNotFound(id.to_string()))?;
        apartment.is_free = is_free;
        apartment.updated_at = Utc::now();
        Ok(())
    }
}

// ==================== Bookings ====================

#[async_trait]
impl Repository<Booking, i64> for MemoryBookingRepository {
    async fn find_by_id(&self, id: i64) -> AppResult<Option<Booking>> {
        Ok(self.0.tables.lock().bookings.get(&id).cloned())
    }

    async fn find_all(&self, limit: i64, offset: i64) -> AppResult<Vec<Booking>> {
        let tables = self.0.tables.lock();
        Ok(page(tables.bookings.values().rev().collect(), limit, offset))
    }

    async fn count(&self) -> AppResult<i64> {
        Ok(self.0.tables.lock().bookings.len() as i64)
    }
}

#[async_trait]
impl BookingRepository for MemoryBookingRepository {
    async fn create_if_available(&self, booking: NewBooking) -> AppResult<Booking> {
        let mut tables = self.0.tables.lock();

        if !tables.apartments.contains_key(&booking.apartment_id) {
            return Err(AppError::ApartmentNotFound(booking.apartment_id.to_string()));
        }
        if tables
            .bookings
            .values()
            .any(|b| b.booking_number == booking.booking_number)
        {
            return Err(AppError::Conflict(format!(
                "booking number {} already exists",
                booking.booking_number
            )));
        }

        let id = tables.next_id();
        let apartment_id = booking.apartment_id;
        let created = booking.into_booking(id, Utc::now());

        if tables.overlaps(apartment_id, &created, None) {
            return Err(AppError::SlotUnavailable(format!(
                "apartment {} is occupied between {} and {}",
                apartment_id, created.start_date, created.end_date
            )));
        }

        tables.bookings.insert(id, created.clone());
        Ok(created)
    }

    async fn transition(&self, booking: &Booking, expected: BookingStatus) -> AppResult<Booking> {
        self.0.tables.lock().guarded_update(booking, expected)
    }

    async fn transition_if_available(
        &self,
        booking: &Booking,
        expected: BookingStatus,
    ) -> AppResult<Booking> {
        let mut tables = self.0.tables.lock();
        if tables.overlaps(booking.apartment_id, booking, Some(booking.id)) {
            return Err(AppError::SlotUnavailable(format!(
                "window of booking {} is no longer free",
                booking.booking_number
            )));
        }
        tables.guarded_update(booking, expected)
    }

    async fn apply_extension(
        &self,
        booking: &Booking,
        extension: &BookingExtension,
    ) -> AppResult<(Booking, BookingExtension)> {
        let mut tables = self.0.tables.lock();

        let open = tables
            .extensions
            .get(&extension.id)
            .map(|e| e.status.is_open())
            .ok_or_else(|| AppError::ExtensionNotFound(extension.id.to_string()))?;
        if !open {
            return Err(AppError::AlreadyProcessed(format!(
                "extension {}",
                extension.id
            )));
        }

        if tables.overlaps(booking.apartment_id, booking, Some(booking.id)) {
            return Err(AppError::SlotUnavailable(format!(
                "extension of booking {} no longer fits",
                booking.booking_number
            )));
        }

        let updated = tables.guarded_update(booking, BookingStatus::Active)?;

        let mut approved = extension.clone();
        approved.status = ExtensionStatus::Approved;
        approved.updated_at = Utc::now();
        tables.extensions.insert(approved.id, approved.clone());

        Ok((updated, approved))
    }

    async fn set_door_status(&self, booking_id: i64, door: DoorStatus) -> AppResult<bool> {
        let mut tables = self.0.tables.lock();
        let booking = tables
            .bookings
            .get_mut(&booking_id)
            .ok_or_else(|| AppError::BookingNotFound(booking_id.to_string()))?;
        if booking.status != BookingStatus::Active {
            return Ok(false);
        }
        booking.door_status = door;
        booking.updated_at = Utc::now();
        Ok(true)
    }

    async fn list_occupying(
        &self,
        apartment_id: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> AppResult<Vec<Booking>> {
        let tables = self.0.tables.lock();
        let mut found: Vec<Booking> = tables
            .bookings
            .values()
            .filter(|b| {
                b.apartment_id == apartment_id
                    && b.status.is_occupying()
                    && b.start_date < to
                    && b.occupied_until() > from
            })
            .cloned()
            .collect();
        found.sort_by_key(|b| b.start_date);
        Ok(found)
    }

    async fn find_by_reference(&self, reference: &str) -> AppResult<Option<Booking>> {
        let tables = self.0.tables.lock();
        Ok(tables
            .bookings
            .values()
            .find(|b| b.matches_reference(reference))
            .cloned())
    }

    async fn find_by_payment_id(&self, payment_id: &str) -> AppResult<Option<Booking>> {
        let tables = self.0.tables.lock();
        Ok(tables
            .bookings
            .values()
            .find(|b| b.payment_id.as_deref() == Some(payment_id))
            .cloned())
    }

    async fn list_by_renter(
        &self,
        renter_id: i64,
        limit: i64,
        offset: i64,
    ) -> AppResult<(Vec<Booking>, i64)> {
        let tables = self.0.tables.lock();
        let mut matching: Vec<&Booking> = tables
            .bookings
            .values()
            .filter(|b| b.renter_id == renter_id)
            .collect();
        matching.sort_by(|a, b| b.start_date.cmp(&a.start_date));
        let total = matching.len() as i64;
        Ok((page(matching, limit, offset), total))
    }

    async fn list_by_apartment(
        &self,
        apartment_id: i64,
        limit: i64,
        offset: i64,
    ) -> AppResult<(Vec<Booking>, i64)> {
        let tables = self.0.tables.lock();
        let mut matching: Vec<&Booking> = tables
            .bookings
            .values()
            .filter(|b| b.apartment_id == apartment_id)
            .collect();
        matching.sort_by(|a, b| b.start_date.cmp(&a.start_date));
        let total = matching.len() as i64;
        Ok((page(matching, limit, offset), total))
    }

    async fn list_due_activation(&self, now: DateTime<Utc>) -> AppResult<Vec<Booking>> {
        let tables = self.0.tables.lock();
        Ok(tables
            .bookings
            .values()
            .filter(|b| b.status == BookingStatus::Approved && b.start_date <= now)
            .cloned()
            .collect())
    }

    async fn list_due_completion(&self, now: DateTime<Utc>) -> AppResult<Vec<Booking>> {
        let tables = self.0.tables.lock();
        Ok(tables
            .bookings
            .values()
            .filter(|b| b.status == BookingStatus::Active && b.end_date <= now)
            .cloned()
            .collect())
    }
}

// ==================== Extensions ====================

#[async_trait]
impl Repository<BookingExtension, i64> for MemoryExtensionRepository {
    async fn find_by_id(&self, id: i64) -> AppResult<Option<BookingExtension>> {
        Ok(self.0.tables.lock().extensions.get(&id).cloned())
    }

    async fn find_all(&self, limit: i64, offset: i64) -> AppResult<Vec<BookingExtension>> {
        let tables = self.0.tables.lock();
        Ok(page(tables.extensions.values().collect(), limit, offset))
    }

    async fn count(&self) -> AppResult<i64> {
        Ok(self.0.tables.lock().extensions.len() as i64)
    }
}

#[async_trait]
impl ExtensionRepository for MemoryExtensionRepository {
    async fn create_open(&self, extension: NewExtension) -> AppResult<BookingExtension> {
        let mut tables = self.0.tables.lock();

        let has_open = tables
            .extensions
            .values()
            .any(|e| e.booking_id == extension.booking_id && e.status.is_open());
        if has_open {
            return Err(AppError::Conflict(format!(
                "booking {} already has a pending extension",
                extension.booking_id
            )));
        }

        let id = tables.next_id();
        let created = extension.into_extension(id, Utc::now());
        tables.extensions.insert(id, created.clone());
        Ok(created)
    }

    async fn find_open_for_booking(&self, booking_id: i64) -> AppResult<Option<BookingExtension>> {
        let tables = self.0.tables.lock();
        Ok(tables
            .extensions
            .values()
            .find(|e| e.booking_id == booking_id && e.status.is_open())
            .cloned())
    }

    async fn find_by_reference(&self, reference: &str) -> AppResult<Option<BookingExtension>> {
        let tables = self.0.tables.lock();
        Ok(tables
            .extensions
            .values()
            .find(|e| e.matches_reference(reference))
            .cloned())
    }

    async fn list_for_booking(&self, booking_id: i64) -> AppResult<Vec<BookingExtension>> {
        let tables = self.0.tables.lock();
        Ok(tables
            .extensions
            .values()
            .filter(|e| e.booking_id == booking_id)
            .cloned()
            .collect())
    }

    async fn update_open(&self, extension: &BookingExtension) -> AppResult<BookingExtension> {
        let mut tables = self.0.tables.lock();
        let stored = tables
            .extensions
            .get_mut(&extension.id)
            .ok_or_else(|| AppError::ExtensionNotFound(extension.id.to_string()))?;

        if !stored.status.is_open() {
            return Err(AppError::AlreadyProcessed(format!(
                "extension {}",
                extension.id
            )));
        }

        let mut updated = extension.clone();
        updated.updated_at = Utc::now();
        *stored = updated.clone();
        Ok(updated)
    }
}

// ==================== Locks ====================

#[async_trait]
impl Repository<Lock, i64> for MemoryLockRepository {
    async fn find_by_id(&self, id: i64) -> AppResult<Option<Lock>> {
        Ok(self.0.tables.lock().locks.get(&id).cloned())
    }

    async fn find_all(&self, limit: i64, offset: i64) -> AppResult<Vec<Lock>> {
        let tables = self.0.tables.lock();
        Ok(page(tables.locks.values().collect(), limit, offset))
    }

    async fn count(&self) -> AppResult<i64> {
        Ok(self.0.tables.lock().locks.len() as i64)
    }
}

#[async_trait]
impl LockRepository for MemoryLockRepository {
    async fn create(&self, lock: &Lock) -> AppResult<Lock> {
        let mut tables = self.0.tables.lock();
        if tables.locks.values().any(|l| l.unique_id == lock.unique_id) {
            return Err(AppError::Conflict(format!(
                "lock {} already registered",
                lock.unique_id
            )));
        }
        let mut created = lock.clone();
        created.id = tables.next_id();
        tables.locks.insert(created.id, created.clone());
        Ok(created)
    }

    async fn find_by_unique_id(&self, unique_id: &str) -> AppResult<Option<Lock>> {
        let tables = self.0.tables.lock();
        Ok(tables
            .locks
            .values()
            .find(|l| l.unique_id == unique_id)
            .cloned())
    }

    async fn find_by_apartment(&self, apartment_id: i64) -> AppResult<Option<Lock>> {
        let tables = self.0.tables.lock();
        Ok(tables
            .locks
            .values()
            .find(|l| l.apartment_id == Some(apartment_id))
            .cloned())
    }

    async fn update(&self, lock: &Lock) -> AppResult<Lock> {
        let mut tables = self.0.tables.lock();
        let stored = tables
            .locks
            .get_mut(&lock.id)
            .ok_or_else(|| AppError::LockNotFound(lock.unique_id.clone()))?;
        let mut updated = lock.clone();
        // binding only changes through `bind`
        updated.apartment_id = stored.apartment_id;
        updated.updated_at = Utc::now();
        *stored = updated.clone();
        Ok(updated)
    }

    async fn bind(&self, lock_id: i64, apartment_id: Option<i64>) -> AppResult<Lock> {
        let mut tables = self.0.tables.lock();
        if let Some(apartment_id) = apartment_id {
            let taken = tables
                .locks
                .values()
                .any(|l| l.id != lock_id && l.apartment_id == Some(apartment_id));
            if taken {
                return Err(AppError::Conflict(format!(
                    "apartment {} already has a lock",
                    apartment_id
                )));
            }
        }
        let lock = tables
            .locks
            .get_mut(&lock_id)
            .ok_or_else(|| AppError::LockNotFound(lock_id.to_string()))?;
        lock.apartment_id = apartment_id;
        lock.updated_at = Utc::now();
        Ok(lock.clone())
    }
}

// ==================== Temp passwords ====================

#[async_trait]
impl Repository<TempPassword, i64> for MemoryTempPasswordRepository {
    async fn find_by_id(&self, id: i64) -> AppResult<Option<TempPassword>> {
        Ok(self.0.tables.lock().passwords.get(&id).cloned())
    }

    async fn find_all(&self, limit: i64, offset: i64) -> AppResult<Vec<TempPassword>> {
        let tables = self.0.tables.lock();
        Ok(page(tables.passwords.values().collect(), limit, offset))
    }

    async fn count(&self) -> AppResult<i64> {
        Ok(self.0.tables.lock().passwords.len() as i64)
    }
}

#[async_trait]
impl TempPasswordRepository for MemoryTempPasswordRepository {
    async fn create(&self, password: NewTempPassword) -> AppResult<TempPassword> {
        let mut tables = self.0.tables.lock();
        let id = tables.next_id();
        let created = password.into_password(id, Utc::now());
        tables.passwords.insert(id, created.clone());
        Ok(created)
    }

    async fn find_active_for_booking(&self, booking_id: i64) -> AppResult<Option<TempPassword>> {
        let tables = self.0.tables.lock();
        Ok(tables
            .passwords
            .values()
            .rev()
            .find(|p| p.is_active && p.owner.booking_id() == Some(booking_id))
            .cloned())
    }

    async fn list_active_for_lock(&self, lock_id: i64) -> AppResult<Vec<TempPassword>> {
        let tables = self.0.tables.lock();
        Ok(tables
            .passwords
            .values()
            .filter(|p| p.is_active && p.lock_id == lock_id)
            .cloned()
            .collect())
    }

    async fn list_active_for_user(&self, user_id: i64) -> AppResult<Vec<TempPassword>> {
        let tables = self.0.tables.lock();
        Ok(tables
            .passwords
            .values()
            .filter(|p| p.is_active && p.owner.user_id() == Some(user_id))
            .cloned()
            .collect())
    }

    async fn update(&self, password: &TempPassword) -> AppResult<TempPassword> {
        let mut tables = self.0.tables.lock();
        let stored = tables
            .passwords
            .get_mut(&password.id)
            .ok_or_else(|| AppError::NotFound(format!("temp password {}", password.id)))?;
        *stored = password.clone();
        Ok(password.clone())
    }

    async fn deactivate_for_booking(
        &self,
        booking_id: i64,
        at: DateTime<Utc>,
    ) -> AppResult<Vec<TempPassword>> {
        let mut tables = self.0.tables.lock();
        Ok(tables
            .passwords
            .values_mut()
            .filter(|p| p.is_active && p.owner.booking_id() == Some(booking_id))
            .map(|p| {
                p.is_active = false;
                p.deactivated_at = Some(at);
                p.clone()
            })
            .collect())
    }

    async fn deactivate_for_lock(
        &self,
        lock_id: i64,
        at: DateTime<Utc>,
    ) -> AppResult<Vec<TempPassword>> {
        let mut tables = self.0.tables.lock();
        Ok(tables
            .passwords
            .values_mut()
            .filter(|p| p.is_active && p.lock_id == lock_id)
            .map(|p| {
                p.is_active = false;
                p.deactivated_at = Some(at);
                p.clone()
            })
            .collect())
    }
}

#[async_trait]
impl PlatformSettings for MemorySettings {
    async fn service_fee_percent(&self) -> AppResult<Option<u32>> {
        Ok(self.0.tables.lock().service_fee_percent)
    }
}
