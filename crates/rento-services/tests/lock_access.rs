mod common;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use common::*;
use rento_core::{
    config::GatewayConfig,
    events::NotificationKind,
    models::{
        Actor, Booking, BookingExtension, BookingStatus, DoorStatus, ExtensionStatus, LockStatus,
        NewBooking, TelemetryEvent, TelemetryKind, UserRole,
    },
    traits::{BookingRepository, Repository, TempPasswordRepository},
    AppError, AppResult,
};
use rento_db::Stores;
use rento_services::{LockAccessService, PaymentOutcome};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::Notify;
use tokio_test::assert_ok;

/// Booking store whose occupancy reads park until released, so a door
/// update can be held between its read and its write
struct ParkedOccupancy {
    inner: Arc<dyn BookingRepository>,
    fetched: Notify,
    release: Notify,
}

#[async_trait]
impl Repository<Booking, i64> for ParkedOccupancy {
    async fn find_by_id(&self, id: i64) -> AppResult<Option<Booking>> {
        self.inner.find_by_id(id).await
    }

    async fn find_all(&self, limit: i64, offset: i64) -> AppResult<Vec<Booking>> {
        self.inner.find_all(limit, offset).await
    }

    async fn count(&self) -> AppResult<i64> {
        self.inner.count().await
    }
}

#[async_trait]
impl BookingRepository for ParkedOccupancy {
    async fn create_if_available(&self, booking: NewBooking) -> AppResult<Booking> {
        self.inner.create_if_available(booking).await
    }

    async fn transition(&self, booking: &Booking, expected: BookingStatus) -> AppResult<Booking> {
        self.inner.transition(booking, expected).await
    }

    async fn transition_if_available(
        &self,
        booking: &Booking,
        expected: BookingStatus,
    ) -> AppResult<Booking> {
        self.inner.transition_if_available(booking, expected).await
    }

    async fn apply_extension(
        &self,
        booking: &Booking,
        extension: &BookingExtension,
    ) -> AppResult<(Booking, BookingExtension)> {
        self.inner.apply_extension(booking, extension).await
    }

    async fn set_door_status(&self, booking_id: i64, door: DoorStatus) -> AppResult<bool> {
        self.inner.set_door_status(booking_id, door).await
    }

    async fn list_occupying(
        &self,
        apartment_id: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> AppResult<Vec<Booking>> {
        let snapshot = self.inner.list_occupying(apartment_id, from, to).await;
        self.fetched.notify_one();
        self.release.notified().await;
        snapshot
    }

    async fn find_by_reference(&self, reference: &str) -> AppResult<Option<Booking>> {
        self.inner.find_by_reference(reference).await
    }

    async fn find_by_payment_id(&self, payment_id: &str) -> AppResult<Option<Booking>> {
        self.inner.find_by_payment_id(payment_id).await
    }

    async fn list_by_renter(
        &self,
        renter_id: i64,
        limit: i64,
        offset: i64,
    ) -> AppResult<(Vec<Booking>, i64)> {
        self.inner.list_by_renter(renter_id, limit, offset).await
    }

    async fn list_by_apartment(
        &self,
        apartment_id: i64,
        limit: i64,
        offset: i64,
    ) -> AppResult<(Vec<Booking>, i64)> {
        self.inner.list_by_apartment(apartment_id, limit, offset).await
    }

    async fn list_due_activation(&self, now: DateTime<Utc>) -> AppResult<Vec<Booking>> {
        self.inner.list_due_activation(now).await
    }

    async fn list_due_completion(&self, now: DateTime<Utc>) -> AppResult<Vec<Booking>> {
        self.inner.list_due_completion(now).await
    }
}

#[tokio::test]
async fn test_door_update_during_extension_payment_keeps_new_end() {
    let h = Harness::new();
    let apartment = h.seed_apartment(true, false).await;
    h.seed_lock(apartment.id, "lock-1").await;
    let active = h.active_booking(apartment.id, 10, 6).await;

    h.set_local(15, 0);
    let extension = h
        .bookings
        .request_extension(Actor::renter(RENTER), active.id, 2)
        .await
        .unwrap();
    h.payments
        .confirm(&extension.order_id, "pay-ext", extension.price);

    let parked = Arc::new(ParkedOccupancy {
        inner: h.stores.bookings.clone(),
        fetched: Notify::new(),
        release: Notify::new(),
    });
    let door_side = Arc::new(LockAccessService::new(
        &Stores {
            bookings: parked.clone(),
            ..h.stores.clone()
        },
        h.vendor.clone(),
        h.clock.clone(),
        &config(),
        &GatewayConfig::default(),
    ));

    let door_task = tokio::spawn({
        let door_side = door_side.clone();
        async move {
            door_side
                .update_lock_status(Actor::renter(RENTER), "lock-1", LockStatus::Open)
                .await
        }
    });

    // door side now holds a snapshot with the pre-extension end
    parked.fetched.notified().await;
    let outcome = h
        .bookings
        .process_payment(&extension.order_id)
        .await
        .unwrap();
    let PaymentOutcome::Extension { booking: extended, .. } = outcome else {
        panic!("expected an extension payment");
    };
    assert_eq!(extended.end_date, h.local(18));

    parked.release.notify_one();
    assert_ok!(door_task.await.unwrap());

    let stored = h.store.bookings().find_by_id(active.id).await.unwrap().unwrap();
    assert_eq!(stored.end_date, h.local(18));
    assert_eq!(stored.duration, 8);
    assert!(!stored.extension_requested);
    assert_eq!(stored.door_status, DoorStatus::Open);

    let extensions = h.bookings.list_extensions(Actor::renter(RENTER), active.id).await.unwrap();
    assert_eq!(extensions[0].status, ExtensionStatus::Approved);
    let password = h
        .store
        .passwords()
        .find_active_for_booking(active.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(password.valid_until, h.local(19));
}

#[tokio::test]
async fn test_door_update_does_not_resurrect_finished_booking() {
    let h = Harness::new();
    let apartment = h.seed_apartment(true, false).await;
    h.seed_lock(apartment.id, "lock-1").await;
    let active = h.active_booking(apartment.id, 10, 2).await;

    let parked = Arc::new(ParkedOccupancy {
        inner: h.stores.bookings.clone(),
        fetched: Notify::new(),
        release: Notify::new(),
    });
    let door_side = LockAccessService::new(
        &Stores {
            bookings: parked.clone(),
            ..h.stores.clone()
        },
        h.vendor.clone(),
        h.clock.clone(),
        &config(),
        &GatewayConfig::default(),
    );
    let door = door_side.ingest(TelemetryEvent::new(
        "lock-1",
        TelemetryKind::Status {
            status: LockStatus::Open,
        },
        h.clock_now(),
    ));
    let finish = async {
        parked.fetched.notified().await;
        let finished = h
            .bookings
            .finish_session(Actor::renter(RENTER), active.id)
            .await;
        parked.release.notify_one();
        finished
    };
    let (door, finished) = tokio::join!(door, finish);
    assert_ok!(door);
    assert_eq!(finished.unwrap().status, BookingStatus::Completed);

    let stored = h.store.bookings().find_by_id(active.id).await.unwrap().unwrap();
    assert_eq!(stored.status, BookingStatus::Completed);
    assert_eq!(stored.door_status, DoorStatus::Closed);
}

#[tokio::test]
async fn test_vendor_outage_does_not_undo_approval() {
    let h = Harness::new();
    let apartment = h.seed_apartment(true, false).await;
    h.seed_lock(apartment.id, "lock-1").await;

    h.vendor.fail_next(10);
    let booking = h.book(apartment.id, h.local(12), 2).await;
    let approved = h.pay(&booking).await;

    assert_eq!(approved.status, rento_core::models::BookingStatus::Approved);
    assert!(h.vendor.installed().is_empty());
    assert_eq!(h.notifications.recipients(NotificationKind::LockAccessFailed), vec![OWNER]);
    assert_eq!(h.notifications.recipients(NotificationKind::BookingApproved), vec![RENTER, OWNER]);

    h.vendor.fail_next(0);
    let password = h
        .lock_access
        .generate_password_for_booking(Actor::renter(RENTER), booking.id)
        .await
        .unwrap();
    assert_eq!(password.valid_until, h.local(15));

    let again = h
        .lock_access
        .generate_password_for_booking(Actor::renter(RENTER), booking.id)
        .await
        .unwrap();
    assert_eq!(again.id, password.id);
    assert_eq!(h.vendor.installed().len(), 1);
}

#[tokio::test]
async fn test_transient_vendor_failure_is_retried() {
    let h = Harness::new();
    let apartment = h.seed_apartment(true, false).await;
    h.seed_lock(apartment.id, "lock-1").await;

    h.vendor.fail_next(1);
    let booking = h.book(apartment.id, h.local(12), 2).await;
    h.pay(&booking).await;

    assert_eq!(h.vendor.installed().len(), 1);
    assert!(h
        .notifications
        .recipients(NotificationKind::LockAccessFailed)
        .is_empty());
}

#[tokio::test]
async fn test_no_lock_means_no_password() {
    let h = Harness::new();
    let apartment = h.seed_apartment(true, false).await;
    let booking = h.book(apartment.id, h.local(12), 2).await;
    h.pay(&booking).await;

    let result = h
        .lock_access
        .generate_password_for_booking(Actor::renter(RENTER), booking.id)
        .await;
    assert!(matches!(result, Err(AppError::LockNotFound(_))));
}

#[tokio::test]
async fn test_unpaid_booking_gets_no_password() {
    let h = Harness::new();
    let apartment = h.seed_apartment(true, false).await;
    h.seed_lock(apartment.id, "lock-1").await;
    let booking = h.book(apartment.id, h.local(12), 2).await;

    let result = h.lock_access.issue_for_booking(booking.id).await;
    assert!(matches!(result, Err(AppError::InvalidTransition { .. })));
}

#[tokio::test]
async fn test_lock_control_follows_password_holders() {
    let h = Harness::new();
    let apartment = h.seed_apartment(true, false).await;
    h.seed_lock(apartment.id, "lock-1").await;
    let active = h.active_booking(apartment.id, 10, 4).await;

    assert!(h
        .lock_access
        .can_user_control_lock(Actor::renter(RENTER), "lock-1")
        .await
        .unwrap());
    assert!(h
        .lock_access
        .can_user_control_lock(Actor::owner(OWNER), "lock-1")
        .await
        .unwrap());
    assert!(!h
        .lock_access
        .can_user_control_lock(Actor::renter(OTHER_RENTER), "lock-1")
        .await
        .unwrap());

    let state = h
        .lock_access
        .update_lock_status(Actor::renter(RENTER), "lock-1", LockStatus::Open)
        .await
        .unwrap();
    assert_eq!(state.lock.current_status, LockStatus::Open);
    assert_eq!(h.vendor.statuses(), vec![("lock-1".to_string(), LockStatus::Open)]);

    let booking = h
        .bookings
        .get_booking(Actor::renter(RENTER), active.id)
        .await
        .unwrap();
    assert_eq!(booking.door_status, DoorStatus::Open);

    let denied = h
        .lock_access
        .update_lock_status(Actor::renter(OTHER_RENTER), "lock-1", LockStatus::Closed)
        .await;
    assert!(matches!(denied, Err(AppError::Forbidden(_))));

    // the password stops working once the stay and its cleaning are over
    h.set_local(15, 1);
    assert!(!h
        .lock_access
        .can_user_control_lock(Actor::renter(RENTER), "lock-1")
        .await
        .unwrap());
}

#[tokio::test]
async fn test_emergency_reset() {
    let h = Harness::new();
    let apartment = h.seed_apartment(true, false).await;
    h.seed_lock(apartment.id, "lock-1").await;
    let active = h.active_booking(apartment.id, 10, 4).await;

    let renter = h
        .lock_access
        .emergency_reset_lock(Actor::renter(RENTER), "lock-1")
        .await;
    assert!(matches!(renter, Err(AppError::Forbidden(_))));

    let revoked = h
        .lock_access
        .emergency_reset_lock(Actor::admin(ADMIN), "lock-1")
        .await
        .unwrap();
    assert_eq!(revoked, 1);
    assert_eq!(h.vendor.revoked().len(), 1);
    assert!(h
        .vendor
        .statuses()
        .contains(&("lock-1".to_string(), LockStatus::Closed)));

    assert!(h
        .store
        .passwords()
        .find_active_for_booking(active.id)
        .await
        .unwrap()
        .is_none());

    let booking = h
        .bookings
        .get_booking(Actor::renter(RENTER), active.id)
        .await
        .unwrap();
    assert_eq!(booking.door_status, DoorStatus::EmergencyLocked);

    let lock = h.lock_access.get_lock("lock-1").await.unwrap();
    assert_eq!(lock.lock.current_status, LockStatus::Closed);
}

#[tokio::test]
async fn test_telemetry_freshness() {
    let h = Harness::new();
    let apartment = h.seed_apartment(true, false).await;
    h.seed_lock(apartment.id, "lock-1").await;
    let now = h.clock_now();

    let stale_offline = TelemetryEvent::new("lock-1", TelemetryKind::Offline, now - Duration::minutes(10));
    let state = h.lock_access.ingest(stale_offline).await.unwrap();
    assert!(state.online);

    let stale_battery = TelemetryEvent::new(
        "lock-1",
        TelemetryKind::Battery { level: 40 },
        now - Duration::minutes(10),
    );
    let state = h.lock_access.ingest(stale_battery).await.unwrap();
    assert_eq!(state.lock.battery_level, Some(40));
    assert_eq!(state.lock.last_heartbeat, Some(now));

    h.clock.advance(Duration::minutes(6));
    assert!(!h.lock_access.get_lock("lock-1").await.unwrap().online);

    let heartbeat = TelemetryEvent::new("lock-1", TelemetryKind::Heartbeat, h.clock_now());
    assert!(h.lock_access.ingest(heartbeat).await.unwrap().online);

    let offline = TelemetryEvent::new("lock-1", TelemetryKind::Offline, h.clock_now());
    assert!(!h.lock_access.ingest(offline).await.unwrap().online);
}

#[tokio::test]
async fn test_webhook_updates_lock() {
    let h = Harness::new();
    let apartment = h.seed_apartment(true, false).await;
    h.seed_lock(apartment.id, "lock-1").await;
    let at = h.clock_now() + Duration::seconds(30);

    let states = h
        .lock_access
        .process_webhook(&json!({
            "devId": "lock-1",
            "bizCode": "online",
            "t": at.timestamp_millis(),
            "status": [
                {"code": "battery_percentage", "value": 55},
                {"code": "lock_motor_state", "value": false},
                {"code": "unknown_code", "value": 1}
            ]
        }))
        .await
        .unwrap();

    assert_eq!(states.len(), 3);
    let last = states.last().unwrap();
    assert!(last.online);
    assert_eq!(last.lock.battery_level, Some(55));
    assert_eq!(last.lock.current_status, LockStatus::Open);
    assert_eq!(last.lock.last_heartbeat, Some(at));

    let unknown = h
        .lock_access
        .process_webhook(&json!({"devId": "lock-404", "bizCode": "online"}))
        .await;
    assert!(matches!(unknown, Err(AppError::LockNotFound(_))));

    let malformed = h.lock_access.process_webhook(&json!({"bizCode": "online"})).await;
    assert!(matches!(malformed, Err(AppError::Validation(_))));
}

#[tokio::test]
async fn test_user_passwords_and_administration() {
    let h = Harness::new();
    let apartment = h.seed_apartment(true, false).await;
    let moderator = Actor::new(2, UserRole::Moderator);

    let lock = h
        .lock_access
        .register_lock(moderator, "lock-new", Some("Back door".into()))
        .await
        .unwrap();
    assert_eq!(lock.apartment_id, None);

    let owner_bind = h
        .lock_access
        .bind_lock(Actor::owner(OWNER), "lock-new", Some(apartment.id))
        .await;
    assert!(matches!(owner_bind, Err(AppError::Forbidden(_))));

    let bound = h
        .lock_access
        .bind_lock(Actor::admin(ADMIN), "lock-new", Some(apartment.id))
        .await
        .unwrap();
    assert_eq!(bound.apartment_id, Some(apartment.id));

    let now = h.clock_now();
    let cleaner = h
        .lock_access
        .generate_user_password(Actor::owner(OWNER), "lock-new", 300, now, now + Duration::hours(2))
        .await
        .unwrap();
    assert!(cleaner.is_usable(now));
    assert_ok!(
        h.lock_access
            .can_user_control_lock(Actor::renter(300), "lock-new")
            .await
    );
    assert!(h
        .lock_access
        .can_user_control_lock(Actor::renter(300), "lock-new")
        .await
        .unwrap());

    let renter = h
        .lock_access
        .generate_user_password(Actor::renter(RENTER), "lock-new", RENTER, now, now + Duration::hours(1))
        .await;
    assert!(matches!(renter, Err(AppError::Forbidden(_))));

    let backwards = h
        .lock_access
        .generate_user_password(Actor::owner(OWNER), "lock-new", 300, now, now - Duration::hours(1))
        .await;
    assert!(matches!(backwards, Err(AppError::Validation(_))));

    h.lock_access
        .bind_lock(Actor::admin(ADMIN), "lock-new", None)
        .await
        .unwrap();
    assert!(h
        .store
        .passwords()
        .list_active_for_user(300)
        .await
        .unwrap()
        .is_empty());
}
