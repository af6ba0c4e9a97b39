//! Lock access orchestration
//!
//! Keeps door passwords in step with bookings and folds device telemetry
//! into the lock records:
//! - Issue a password when a booking is paid, valid from its start until the
//!   end of its cleaning buffer
//! - Stretch that password when the booking is extended
//! - Revoke it when the booking leaves `active` or is canceled
//! - Track online state, battery and bolt position from vendor events
//!
//! Vendor calls run under a timeout with a bounded number of attempts.
//! Password issuance is idempotent per booking.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use rento_auth::{check, permitted, Permission, Resource};
use rento_core::{
    config::{BookingConfig, GatewayConfig},
    models::{
        Actor, Booking, BookingStatus, DoorStatus, Lock, LockStatus, NewTempPassword,
        PasswordOwner, TelemetryEvent, TelemetryKind, TempPassword,
    },
    traits::{
        ApartmentRepository, BookingRepository, LockRepository, LockVendor,
        TempPasswordRepository,
    },
    AppError, AppResult, Clock,
};
use rento_db::Stores;
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

use crate::constants::PASSWORD_LENGTH;
use crate::guard::KeyedLocks;

/// A lock together with its freshness-derived connectivity
#[derive(Debug, Clone, Serialize)]
pub struct LockState {
    #[serde(flatten)]
    pub lock: Lock,
    /// Reported online and heard from recently
    pub online: bool,
}

/// Door access for one booking
#[derive(Debug, Clone, Serialize)]
pub struct BookingLockAccess {
    pub booking_id: i64,
    pub lock_unique_id: String,
    pub lock_online: bool,
    pub password: Option<TempPassword>,
}

pub struct LockAccessService {
    apartments: Arc<dyn ApartmentRepository>,
    bookings: Arc<dyn BookingRepository>,
    locks: Arc<dyn LockRepository>,
    passwords: Arc<dyn TempPasswordRepository>,
    vendor: Arc<dyn LockVendor>,
    clock: Arc<dyn Clock>,
    freshness: Duration,
    vendor_timeout: std::time::Duration,
    vendor_attempts: u32,
    booking_guards: KeyedLocks,
    lock_guards: KeyedLocks,
}

fn generate_code() -> String {
    let mut rng = rand::thread_rng();
    (0..PASSWORD_LENGTH)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect()
}

impl LockAccessService {
    pub fn new(
        stores: &Stores,
        vendor: Arc<dyn LockVendor>,
        clock: Arc<dyn Clock>,
        booking: &BookingConfig,
        gateways: &GatewayConfig,
    ) -> Self {
        Self {
            apartments: stores.apartments.clone(),
            bookings: stores.bookings.clone(),
            locks: stores.locks.clone(),
            passwords: stores.passwords.clone(),
            vendor,
            clock,
            freshness: Duration::seconds(booking.lock_freshness_secs),
            vendor_timeout: std::time::Duration::from_millis(gateways.timeout_ms),
            vendor_attempts: gateways.retry_attempts.max(1),
            booking_guards: KeyedLocks::new(),
            lock_guards: KeyedLocks::new(),
        }
    }

    /// Run a vendor call under the timeout, retrying dependency failures
    async fn call_vendor<T, F, Fut>(&self, op: &str, unique_id: &str, mut call: F) -> AppResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = match tokio::time::timeout(self.vendor_timeout, call()).await {
                Ok(result) => result,
                Err(_) => Err(AppError::DependencyTimeout(format!(
                    "lock vendor {} on {}",
                    op, unique_id
                ))),
            };

            match result {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.vendor_attempts => {
                    warn!(
                        "Lock vendor {} on {} failed (attempt {}/{}): {}",
                        op, unique_id, attempt, self.vendor_attempts, e
                    );
                    tokio::time::sleep(std::time::Duration::from_millis(50 * attempt as u64))
                        .await;
                }
                Err(e) => {
                    error!("Lock vendor {} on {} failed: {}", op, unique_id, e);
                    return Err(e);
                }
            }
        }
    }

    fn state(&self, lock: Lock) -> LockState {
        let online = lock.is_online_at(self.clock.now(), self.freshness);
        LockState { lock, online }
    }

    async fn find_lock(&self, unique_id: &str) -> AppResult<Lock> {
        self.locks
            .find_by_unique_id(unique_id)
            .await?
            .ok_or_else(|| AppError::LockNotFound(unique_id.to_string()))
    }

    async fn find_booking(&self, booking_id: i64) -> AppResult<Booking> {
        self.bookings
            .find_by_id(booking_id)
            .await?
            .ok_or_else(|| AppError::BookingNotFound(booking_id.to_string()))
    }

    async fn lock_owner(&self, lock: &Lock) -> AppResult<Option<i64>> {
        match lock.apartment_id {
            Some(apartment_id) => Ok(self
                .apartments
                .find_by_id(apartment_id)
                .await?
                .map(|a| a.owner_id)),
            None => Ok(None),
        }
    }

    pub async fn get_lock(&self, unique_id: &str) -> AppResult<LockState> {
        Ok(self.state(self.find_lock(unique_id).await?))
    }

    // ==================== Booking passwords ====================

    /// Install the door password for a paid booking
    ///
    /// Returns the already active password when there is one, and `None`
    /// when the apartment has no lock bound.
    #[instrument(skip(self))]
    pub async fn issue_for_booking(&self, booking_id: i64) -> AppResult<Option<TempPassword>> {
        let _guard = self.booking_guards.lock(booking_id).await;
        let booking = self.find_booking(booking_id).await?;
        self.issue_locked(&booking).await
    }

    async fn issue_locked(&self, booking: &Booking) -> AppResult<Option<TempPassword>> {
        if !matches!(
            booking.status,
            BookingStatus::Approved | BookingStatus::Active
        ) {
            return Err(AppError::transition(booking.status, "issue door access for"));
        }

        if let Some(existing) = self.passwords.find_active_for_booking(booking.id).await? {
            debug!("Booking {} already has password {}", booking.id, existing.id);
            return Ok(Some(existing));
        }

        let Some(lock) = self.locks.find_by_apartment(booking.apartment_id).await? else {
            warn!(
                "Apartment {} has no lock bound; booking {} gets no door password",
                booking.apartment_id, booking.booking_number
            );
            return Ok(None);
        };

        let code = generate_code();
        let valid_from = booking.start_date;
        let valid_until = booking.occupied_until();

        let vendor_id = self
            .call_vendor("set_password", &lock.unique_id, || {
                self.vendor
                    .set_password(&lock.unique_id, &code, valid_from, valid_until)
            })
            .await?;

        let password = self
            .passwords
            .create(NewTempPassword {
                lock_id: lock.id,
                password: code,
                valid_from,
                valid_until,
                owner: PasswordOwner::Booking(booking.id),
                vendor_password_id: Some(vendor_id),
            })
            .await
            .map_err(|e| {
                error!(
                    "Password installed on lock {} but not recorded for booking {}: {}",
                    lock.unique_id, booking.id, e
                );
                e
            })?;

        info!(
            "Issued door password {} on lock {} for booking {} until {}",
            password.id, lock.unique_id, booking.booking_number, valid_until
        );

        Ok(Some(password))
    }

    /// Revoke and deactivate the booking's password; returns how many were deactivated
    #[instrument(skip(self))]
    pub async fn revoke_for_booking(&self, booking_id: i64) -> AppResult<usize> {
        let _guard = self.booking_guards.lock(booking_id).await;

        let Some(active) = self.passwords.find_active_for_booking(booking_id).await? else {
            return Ok(0);
        };

        if let Some(vendor_id) = active.vendor_password_id.as_deref() {
            if let Some(lock) = self.locks.find_by_id(active.lock_id).await? {
                self.call_vendor("revoke_password", &lock.unique_id, || {
                    self.vendor.revoke_password(&lock.unique_id, vendor_id)
                })
                .await?;
            }
        }

        let deactivated = self
            .passwords
            .deactivate_for_booking(booking_id, self.clock.now())
            .await?;

        info!(
            "Revoked {} door password(s) for booking {}",
            deactivated.len(),
            booking_id
        );

        Ok(deactivated.len())
    }

    /// Move the password's end to the booking's current end plus cleaning
    #[instrument(skip(self))]
    pub async fn extend_for_booking(&self, booking_id: i64) -> AppResult<Option<TempPassword>> {
        let _guard = self.booking_guards.lock(booking_id).await;
        let booking = self.find_booking(booking_id).await?;

        let Some(mut active) = self.passwords.find_active_for_booking(booking_id).await? else {
            return self.issue_locked(&booking).await;
        };

        let target = booking.occupied_until();
        if active.valid_until == target {
            return Ok(Some(active));
        }

        let lock = self
            .locks
            .find_by_id(active.lock_id)
            .await?
            .ok_or_else(|| AppError::LockNotFound(active.lock_id.to_string()))?;

        let valid_from = active.valid_from;
        let new_vendor_id = self
            .call_vendor("set_password", &lock.unique_id, || {
                self.vendor
                    .set_password(&lock.unique_id, &active.password, valid_from, target)
            })
            .await?;

        if let Some(old) = active.vendor_password_id.as_deref() {
            if let Err(e) = self
                .call_vendor("revoke_password", &lock.unique_id, || {
                    self.vendor.revoke_password(&lock.unique_id, old)
                })
                .await
            {
                warn!(
                    "Superseded password {} left on lock {}: {}",
                    old, lock.unique_id, e
                );
            }
        }

        let previous = active.valid_until;
        active.valid_until = target;
        active.vendor_password_id = Some(new_vendor_id);
        let updated = self.passwords.update(&active).await?;

        info!(
            "Extended password {} for booking {} from {} to {}",
            updated.id, booking_id, previous, target
        );

        Ok(Some(updated))
    }

    /// Door access as shown to the renter, owner or staff
    #[instrument(skip(self))]
    pub async fn get_booking_lock_access(
        &self,
        actor: Actor,
        booking_id: i64,
    ) -> AppResult<BookingLockAccess> {
        let booking = self.find_booking(booking_id).await?;
        let owner_id = self
            .apartments
            .find_by_id(booking.apartment_id)
            .await?
            .map(|a| a.owner_id)
            .ok_or_else(|| AppError::ApartmentNotFound(booking.apartment_id.to_string()))?;

        check(
            &actor,
            Permission::ViewBooking,
            Resource::Booking {
                renter_id: booking.renter_id,
                owner_id,
            },
        )?;

        let lock = self
            .locks
            .find_by_apartment(booking.apartment_id)
            .await?
            .ok_or_else(|| {
                AppError::LockNotFound(format!("apartment {}", booking.apartment_id))
            })?;

        let password = self.passwords.find_active_for_booking(booking_id).await?;
        let state = self.state(lock);

        Ok(BookingLockAccess {
            booking_id,
            lock_unique_id: state.lock.unique_id,
            lock_online: state.online,
            password,
        })
    }

    /// Renter-triggered issuance, e.g. after an earlier vendor failure
    #[instrument(skip(self))]
    pub async fn generate_password_for_booking(
        &self,
        actor: Actor,
        booking_id: i64,
    ) -> AppResult<TempPassword> {
        let booking = self.find_booking(booking_id).await?;
        let owner_id = self
            .apartments
            .find_by_id(booking.apartment_id)
            .await?
            .map(|a| a.owner_id)
            .unwrap_or_default();

        check(
            &actor,
            Permission::ManageBooking,
            Resource::Booking {
                renter_id: booking.renter_id,
                owner_id,
            },
        )?;

        self.issue_for_booking(booking_id)
            .await?
            .ok_or_else(|| AppError::LockNotFound(format!("apartment {}", booking.apartment_id)))
    }

    /// Password bound to a user rather than a booking (owners, cleaners, staff)
    #[instrument(skip(self))]
    pub async fn generate_user_password(
        &self,
        actor: Actor,
        unique_id: &str,
        user_id: i64,
        valid_from: DateTime<Utc>,
        valid_until: DateTime<Utc>,
    ) -> AppResult<TempPassword> {
        let lock = self.find_lock(unique_id).await?;
        let owner_id = self.lock_owner(&lock).await?;
        check(&actor, Permission::ControlLock, Resource::Lock { owner_id })?;

        if valid_until <= valid_from || valid_until <= self.clock.now() {
            return Err(AppError::Validation(format!(
                "password window {} - {} is empty or already over",
                valid_from, valid_until
            )));
        }

        let code = generate_code();
        let vendor_id = self
            .call_vendor("set_password", &lock.unique_id, || {
                self.vendor
                    .set_password(&lock.unique_id, &code, valid_from, valid_until)
            })
            .await?;

        let password = self
            .passwords
            .create(NewTempPassword {
                lock_id: lock.id,
                password: code,
                valid_from,
                valid_until,
                owner: PasswordOwner::User(user_id),
                vendor_password_id: Some(vendor_id),
            })
            .await?;

        info!(
            "Issued user password {} on lock {} for user {} by {}",
            password.id, unique_id, user_id, actor.user_id
        );

        Ok(password)
    }

    // ==================== Control ====================

    /// Owner, staff, or a renter holding a usable password on the lock
    pub async fn can_user_control_lock(&self, actor: Actor, unique_id: &str) -> AppResult<bool> {
        let lock = self.find_lock(unique_id).await?;
        let owner_id = self.lock_owner(&lock).await?;

        if permitted(&actor, Permission::ControlLock, Resource::Lock { owner_id }) {
            return Ok(true);
        }

        let now = self.clock.now();
        for password in self.passwords.list_active_for_lock(lock.id).await? {
            if !password.is_usable(now) {
                continue;
            }
            let holder = match password.owner {
                PasswordOwner::User(user_id) => Some(user_id),
                PasswordOwner::Booking(booking_id) => self
                    .bookings
                    .find_by_id(booking_id)
                    .await?
                    .map(|b| b.renter_id),
            };
            if holder == Some(actor.user_id) {
                return Ok(true);
            }
        }

        Ok(false)
    }

    /// Open or close the bolt on behalf of a user
    #[instrument(skip(self))]
    pub async fn update_lock_status(
        &self,
        actor: Actor,
        unique_id: &str,
        status: LockStatus,
    ) -> AppResult<LockState> {
        if !self.can_user_control_lock(actor, unique_id).await? {
            warn!(
                "User {} denied control of lock {}",
                actor.user_id, unique_id
            );
            return Err(AppError::Forbidden(format!(
                "user {} may not control lock {}",
                actor.user_id, unique_id
            )));
        }

        self.call_vendor("set_status", unique_id, || {
            self.vendor.set_status(unique_id, status)
        })
        .await?;

        let lock = self.find_lock(unique_id).await?;
        let _guard = self.lock_guards.lock(lock.id).await;
        let mut lock = self.find_lock(unique_id).await?;
        lock.current_status = status;
        let lock = self.locks.update(&lock).await?;

        info!("Lock {} set {} by user {}", unique_id, status, actor.user_id);

        self.mirror_door(&lock, door_for(status)).await;
        Ok(self.state(lock))
    }

    /// Revoke every password on the lock and force it closed
    #[instrument(skip(self))]
    pub async fn emergency_reset_lock(&self, actor: Actor, unique_id: &str) -> AppResult<usize> {
        check(&actor, Permission::ManageLocks, Resource::Platform)?;

        let lock = self.find_lock(unique_id).await?;
        let _guard = self.lock_guards.lock(lock.id).await;

        let deactivated = self
            .passwords
            .deactivate_for_lock(lock.id, self.clock.now())
            .await?;

        for password in &deactivated {
            if let Some(vendor_id) = password.vendor_password_id.as_deref() {
                if let Err(e) = self
                    .call_vendor("revoke_password", unique_id, || {
                        self.vendor.revoke_password(unique_id, vendor_id)
                    })
                    .await
                {
                    warn!(
                        "Emergency reset could not revoke {} on {}: {}",
                        vendor_id, unique_id, e
                    );
                }
            }
        }

        if let Err(e) = self
            .call_vendor("set_status", unique_id, || {
                self.vendor.set_status(unique_id, LockStatus::Closed)
            })
            .await
        {
            warn!("Emergency reset could not close {} remotely: {}", unique_id, e);
        }

        let mut lock = self.find_lock(unique_id).await?;
        lock.current_status = LockStatus::Closed;
        let lock = self.locks.update(&lock).await?;

        warn!(
            "Emergency reset of lock {} by user {}: {} password(s) revoked",
            unique_id,
            actor.user_id,
            deactivated.len()
        );

        self.mirror_door(&lock, DoorStatus::EmergencyLocked).await;
        Ok(deactivated.len())
    }

    /// Reflect the door state on the booking currently in progress, if any
    async fn mirror_door(&self, lock: &Lock, door: DoorStatus) {
        let Some(apartment_id) = lock.apartment_id else {
            return;
        };
        let now = self.clock.now();

        let current = match self
            .bookings
            .list_occupying(apartment_id, now, now + Duration::seconds(1))
            .await
        {
            Ok(bookings) => bookings
                .into_iter()
                .find(|b| b.status == BookingStatus::Active),
            Err(e) => {
                warn!("Could not load bookings for lock {}: {}", lock.unique_id, e);
                return;
            }
        };

        if let Some(booking) = current {
            if booking.door_status == door {
                return;
            }
            match self.bookings.set_door_status(booking.id, door).await {
                Ok(true) => debug!("Booking {} door {}", booking.booking_number, door),
                Ok(false) => debug!(
                    "Booking {} left active before door {} was recorded",
                    booking.booking_number, door
                ),
                Err(e) => warn!(
                    "Door status {} not recorded on booking {}: {}",
                    door, booking.id, e
                ),
            }
        }
    }

    // ==================== Telemetry ====================

    /// Apply one device event to its lock
    #[instrument(skip(self), fields(unique_id = %event.unique_id))]
    pub async fn ingest(&self, event: TelemetryEvent) -> AppResult<LockState> {
        let lock = self.find_lock(&event.unique_id).await?;
        let _guard = self.lock_guards.lock(lock.id).await;
        let mut lock = self.find_lock(&event.unique_id).await?;

        // out-of-order deliveries may not override newer connectivity
        let fresh = lock.last_heartbeat.map_or(true, |seen| event.at >= seen);
        let mut door = None;

        match &event.kind {
            TelemetryKind::Battery { level } => {
                lock.battery_level = Some(*level);
                if fresh {
                    lock.is_online = true;
                }
            }
            TelemetryKind::Status { status } if fresh => {
                lock.current_status = *status;
                lock.is_online = true;
                door = Some(door_for(*status));
            }
            TelemetryKind::Heartbeat | TelemetryKind::Online if fresh => lock.is_online = true,
            TelemetryKind::Offline if fresh => lock.is_online = false,
            _ => debug!("Ignoring stale {:?} for {}", event.kind, event.unique_id),
        }

        if fresh {
            lock.last_heartbeat = Some(event.at);
        }

        let lock = self.locks.update(&lock).await?;
        if let Some(door) = door {
            self.mirror_door(&lock, door).await;
        }

        Ok(self.state(lock))
    }

    /// Parse and apply a vendor webhook body
    pub async fn process_webhook(&self, body: &Value) -> AppResult<Vec<LockState>> {
        let events = TelemetryEvent::from_webhook(body, self.clock.now())?;
        let mut states = Vec::with_capacity(events.len());
        for event in events {
            states.push(self.ingest(event).await?);
        }
        Ok(states)
    }

    // ==================== Administration ====================

    pub async fn register_lock(
        &self,
        actor: Actor,
        unique_id: &str,
        name: Option<String>,
    ) -> AppResult<Lock> {
        check(&actor, Permission::ManageLocks, Resource::Platform)?;

        let now = self.clock.now();
        let lock = self
            .locks
            .create(&Lock {
                id: 0,
                unique_id: unique_id.to_string(),
                name,
                apartment_id: None,
                current_status: LockStatus::Closed,
                is_online: false,
                last_heartbeat: None,
                battery_level: None,
                created_at: now,
                updated_at: now,
            })
            .await?;

        info!("Registered lock {} as {}", unique_id, lock.id);
        Ok(lock)
    }

    /// Bind a lock to an apartment, or unbind with `None`
    ///
    /// Passwords issued under the previous binding are deactivated.
    #[instrument(skip(self))]
    pub async fn bind_lock(
        &self,
        actor: Actor,
        unique_id: &str,
        apartment_id: Option<i64>,
    ) -> AppResult<Lock> {
        check(&actor, Permission::AdminOverride, Resource::Platform)?;

        let lock = self.find_lock(unique_id).await?;
        if let Some(apartment_id) = apartment_id {
            if self.apartments.find_by_id(apartment_id).await?.is_none() {
                return Err(AppError::ApartmentNotFound(apartment_id.to_string()));
            }
        }

        let _guard = self.lock_guards.lock(lock.id).await;
        if lock.apartment_id.is_some() && lock.apartment_id != apartment_id {
            let dropped = self
                .passwords
                .deactivate_for_lock(lock.id, self.clock.now())
                .await?;
            if !dropped.is_empty() {
                warn!(
                    "Rebinding lock {} deactivated {} password(s)",
                    unique_id,
                    dropped.len()
                );
            }
        }

        let lock = self.locks.bind(lock.id, apartment_id).await?;
        info!("Lock {} bound to {:?}", unique_id, apartment_id);
        Ok(lock)
    }
}

fn door_for(status: LockStatus) -> DoorStatus {
    match status {
        LockStatus::Open => DoorStatus::Open,
        LockStatus::Closed => DoorStatus::Closed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_codes_are_numeric() {
        for _ in 0..50 {
            let code = generate_code();
            assert_eq!(code.len(), PASSWORD_LENGTH);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn test_door_mapping() {
        assert_eq!(door_for(LockStatus::Open), DoorStatus::Open);
        assert_eq!(door_for(LockStatus::Closed), DoorStatus::Closed);
    }
}
