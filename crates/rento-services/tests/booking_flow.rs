mod common;

use chrono::Duration;
use common::*;
use rento_core::{
    events::NotificationKind,
    models::{Actor, BookingStatus, RefundPolicy},
    traits::{Pagination, Repository, TempPasswordRepository},
    AppError,
};
use rento_services::{CreateBooking, PaymentOutcome};
use rust_decimal_macros::dec;
use tokio_test::{assert_err, assert_ok};

#[tokio::test]
async fn test_hourly_booking_end_to_end() {
    let h = Harness::new();
    let apartment = h.seed_apartment(true, false).await;
    let lock = h.seed_lock(apartment.id, "lock-abay-1").await;

    let created = h
        .bookings
        .create_booking(
            Actor::renter(RENTER),
            CreateBooking {
                apartment_id: apartment.id,
                start: h.local(10),
                duration: 6,
            },
        )
        .await
        .unwrap();

    assert_eq!(created.status, BookingStatus::Created);
    assert_eq!(created.total_price, dec!(27000));
    assert_eq!(created.service_fee, dec!(2700));
    assert_eq!(created.final_price, dec!(29700));
    assert_eq!(created.end_date, h.local(16));
    assert!(created.booking_number.starts_with("RB-20260504-"));

    let confirmed = h
        .bookings
        .confirm_booking(Actor::renter(RENTER), created.id)
        .await
        .unwrap();
    assert_eq!(confirmed.status, BookingStatus::AwaitingPayment);
    assert_eq!(h.notifications.recipients(NotificationKind::BookingConfirmed), vec![OWNER]);

    let approved = h.pay(&confirmed).await;
    assert_eq!(approved.status, BookingStatus::Approved);
    assert_eq!(approved.payment_id, Some(format!("pay-{}", created.id)));
    assert!(approved.paid_at.is_some());

    let password = h
        .store
        .passwords()
        .find_active_for_booking(approved.id)
        .await
        .unwrap()
        .expect("password issued on approval");
    assert_eq!(password.lock_id, lock.id);
    assert_eq!(password.valid_from, h.local(10));
    assert_eq!(password.valid_until, h.local(17));
    assert_eq!(password.password.len(), 7);

    let installed = h.vendor.installed();
    assert_eq!(installed.len(), 1);
    assert_eq!(installed[0].unique_id, "lock-abay-1");

    let renter_view = h
        .lock_access
        .get_booking_lock_access(Actor::renter(RENTER), approved.id)
        .await
        .unwrap();
    assert!(renter_view.lock_online);
    assert_eq!(renter_view.password.map(|p| p.id), Some(password.id));

    let apartment = h
        .store
        .apartments()
        .find_by_id(apartment.id)
        .await
        .unwrap()
        .unwrap();
    assert!(!apartment.is_free);
}

#[tokio::test]
async fn test_payment_replay_is_already_processed() {
    let h = Harness::new();
    let apartment = h.seed_apartment(true, false).await;
    h.seed_lock(apartment.id, "lock-1").await;

    let booking = h.book(apartment.id, h.local(12), 2).await;
    let approved = h.pay(&booking).await;
    let calls = h.payments.calls();

    let by_number = h.bookings.process_payment(&booking.booking_number).await;
    assert!(matches!(by_number, Err(AppError::AlreadyProcessed(_))));

    let payment_id = approved.payment_id.clone().unwrap();
    let by_payment = h.bookings.process_payment(&payment_id).await;
    assert!(matches!(by_payment, Err(AppError::AlreadyProcessed(_))));

    assert_eq!(h.payments.calls(), calls);
    assert_eq!(h.vendor.installed().len(), 1);
    assert_eq!(h.notifications.recipients(NotificationKind::BookingApproved).len(), 2);
}

#[tokio::test]
async fn test_payment_checks() {
    let h = Harness::new();
    let apartment = h.seed_apartment(true, false).await;
    let booking = h.book(apartment.id, h.local(12), 2).await;

    h.payments
        .confirm(&booking.booking_number, "short", booking.final_price - dec!(1));
    let short = h.bookings.process_payment(&booking.booking_number).await;
    assert!(matches!(short, Err(AppError::PaymentMismatch { .. })));

    h.payments
        .pending(&booking.booking_number, "unconfirmed", booking.final_price);
    let pending = h.bookings.process_payment(&booking.booking_number).await;
    assert!(matches!(pending, Err(AppError::PaymentNotConfirmed(_))));

    let unknown = h.bookings.process_payment("RB-19990101-000000").await;
    assert!(matches!(unknown, Err(AppError::NotFound(_))));

    let still = h
        .bookings
        .get_booking(Actor::renter(RENTER), booking.id)
        .await
        .unwrap();
    assert_eq!(still.status, BookingStatus::AwaitingPayment);
}

#[tokio::test]
async fn test_one_payment_cannot_settle_two_bookings() {
    let h = Harness::new();
    let apartment = h.seed_apartment(true, false).await;
    let first = h.book(apartment.id, h.local(10), 2).await;
    let second = h.book_as(OTHER_RENTER, apartment.id, h.local(14), 2).await.unwrap();

    h.payments
        .confirm(&first.booking_number, "shared", first.final_price);
    assert_ok!(h.bookings.process_payment(&first.booking_number).await);

    h.payments
        .confirm(&second.booking_number, "shared", second.final_price);
    let reused = h.bookings.process_payment(&second.booking_number).await;
    assert!(matches!(reused, Err(AppError::DuplicatePayment(_))));
}

#[tokio::test]
async fn test_gateway_timeout_leaves_booking_untouched() {
    let h = Harness::new();
    let apartment = h.seed_apartment(true, false).await;
    let booking = h.book(apartment.id, h.local(12), 2).await;

    h.payments
        .confirm(&booking.booking_number, "slow", booking.final_price);
    h.payments.hang_for(std::time::Duration::from_secs(2));

    let result = h.bookings.process_payment(&booking.booking_number).await;
    let err = assert_err!(result);
    assert!(matches!(err, AppError::DependencyTimeout(_)));
    assert!(err.is_retryable());

    let still = h
        .bookings
        .get_booking(Actor::renter(RENTER), booking.id)
        .await
        .unwrap();
    assert_eq!(still.status, BookingStatus::AwaitingPayment);
}

#[tokio::test]
async fn test_illegal_transitions() {
    let h = Harness::new();
    let apartment = h.seed_apartment(true, false).await;
    let booking = h.book(apartment.id, h.local(12), 2).await;

    let again = h
        .bookings
        .confirm_booking(Actor::renter(RENTER), booking.id)
        .await;
    assert!(matches!(again, Err(AppError::InvalidTransition { .. })));

    let finish = h
        .bookings
        .finish_session(Actor::renter(RENTER), booking.id)
        .await;
    assert!(matches!(finish, Err(AppError::InvalidTransition { .. })));

    let canceled = h
        .bookings
        .cancel_booking(Actor::renter(RENTER), booking.id, None)
        .await
        .unwrap();
    assert_eq!(canceled.status, BookingStatus::Canceled);

    let twice = h
        .bookings
        .cancel_booking(Actor::renter(RENTER), booking.id, None)
        .await;
    assert!(matches!(twice, Err(AppError::InvalidTransition { .. })));

    let pay = h.bookings.process_payment(&booking.booking_number).await;
    assert!(matches!(pay, Err(AppError::AlreadyProcessed(_))));
}

#[tokio::test]
async fn test_access_is_limited_to_parties() {
    let h = Harness::new();
    let apartment = h.seed_apartment(true, false).await;
    let booking = h.book(apartment.id, h.local(12), 2).await;

    let stranger = h
        .bookings
        .get_booking(Actor::renter(OTHER_RENTER), booking.id)
        .await;
    assert!(matches!(stranger, Err(AppError::Forbidden(_))));

    assert_ok!(
        h.bookings
            .get_booking(Actor::owner(OWNER), booking.id)
            .await
    );

    let owner_cancel = h
        .bookings
        .cancel_booking(Actor::owner(OWNER), booking.id, None)
        .await;
    assert!(matches!(owner_cancel, Err(AppError::Forbidden(_))));

    let renter_approve = h
        .bookings
        .approve_booking(Actor::renter(RENTER), booking.id)
        .await;
    assert!(matches!(renter_approve, Err(AppError::Forbidden(_))));

    let listed = h
        .bookings
        .list_for_renter(Actor::renter(RENTER), RENTER, Pagination::new(1, 10))
        .await
        .unwrap();
    assert_eq!(listed.pagination.total, 1);

    let peek = h
        .bookings
        .list_for_renter(Actor::renter(OTHER_RENTER), RENTER, Pagination::new(1, 10))
        .await;
    assert!(matches!(peek, Err(AppError::Forbidden(_))));

    let owned = h
        .bookings
        .list_for_apartment(Actor::owner(OWNER), apartment.id, Pagination::new(1, 10))
        .await
        .unwrap();
    assert_eq!(owned.data.len(), 1);
}

#[tokio::test]
async fn test_refund_cutoff_boundary() {
    let h = Harness::new();
    let apartment = h.seed_apartment(true, false).await;
    let booking = h.book(apartment.id, h.local(16), 2).await;
    let booking = h.pay(&booking).await;

    h.set_local(10, 0);
    let at_cutoff = h
        .bookings
        .cancellation_preview(Actor::renter(RENTER), booking.id)
        .await
        .unwrap();
    assert_eq!(at_cutoff.refund_policy, RefundPolicy::FullRefund);
    assert_eq!(at_cutoff.refund_amount, booking.final_price);
    assert_eq!(at_cutoff.seconds_until_start, 6 * 3600);

    h.clock.advance(Duration::seconds(1));
    let past_cutoff = h
        .bookings
        .cancellation_preview(Actor::renter(RENTER), booking.id)
        .await
        .unwrap();
    assert_eq!(past_cutoff.refund_policy, RefundPolicy::NonRefundable);

    let canceled = h
        .bookings
        .cancel_booking(Actor::renter(RENTER), booking.id, Some("plans changed".into()))
        .await
        .unwrap();
    assert_eq!(canceled.refund_policy, Some(RefundPolicy::NonRefundable));
    assert_eq!(canceled.refund_amount, Some(dec!(0)));
    assert_eq!(canceled.cancellation_reason.as_deref(), Some("plans changed"));
    assert_eq!(h.notifications.recipients(NotificationKind::BookingCanceled), vec![RENTER, OWNER]);
}

#[tokio::test]
async fn test_early_cancellation_refunds_in_full_and_revokes_access() {
    let h = Harness::new();
    let apartment = h.seed_apartment(true, false).await;
    h.seed_lock(apartment.id, "lock-1").await;
    let booking = h.book(apartment.id, h.local(18), 2).await;
    let booking = h.pay(&booking).await;

    let canceled = h
        .bookings
        .cancel_booking(Actor::renter(RENTER), booking.id, None)
        .await
        .unwrap();
    assert_eq!(canceled.refund_policy, Some(RefundPolicy::FullRefund));
    assert_eq!(canceled.refund_amount, Some(booking.final_price));

    assert_eq!(h.vendor.revoked().len(), 1);
    assert!(h
        .store
        .passwords()
        .find_active_for_booking(booking.id)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_stay_lifecycle_through_sweeps() {
    let h = Harness::new();
    let apartment = h.seed_apartment(true, false).await;
    h.seed_lock(apartment.id, "lock-1").await;
    let booking = h.book(apartment.id, h.local(10), 3).await;
    h.pay(&booking).await;

    assert_eq!(h.bookings.activate_due().await.unwrap(), 0);

    h.set_local(10, 0);
    assert_eq!(h.bookings.activate_due().await.unwrap(), 1);
    assert_eq!(h.notifications.recipients(NotificationKind::BookingStarted), vec![RENTER]);
    assert_eq!(h.vendor.installed().len(), 1);

    let renter_cancel = h
        .bookings
        .cancel_booking(Actor::renter(RENTER), booking.id, None)
        .await;
    assert!(matches!(renter_cancel, Err(AppError::InvalidTransition { .. })));

    h.set_local(12, 59);
    assert_eq!(h.bookings.complete_expired().await.unwrap(), 0);

    h.set_local(13, 0);
    assert_eq!(h.bookings.complete_expired().await.unwrap(), 1);

    let done = h
        .bookings
        .get_booking(Actor::renter(RENTER), booking.id)
        .await
        .unwrap();
    assert_eq!(done.status, BookingStatus::Completed);
    assert!(done.finished_at.is_some());
    assert_eq!(h.vendor.revoked().len(), 1);

    let apartment = h
        .store
        .apartments()
        .find_by_id(apartment.id)
        .await
        .unwrap()
        .unwrap();
    assert!(apartment.is_free);
}

#[tokio::test]
async fn test_finish_session_early() {
    let h = Harness::new();
    let apartment = h.seed_apartment(true, false).await;
    let active = h.active_booking(apartment.id, 10, 4).await;
    assert_eq!(active.status, BookingStatus::Active);

    h.set_local(11, 30);
    let finished = h
        .bookings
        .finish_session(Actor::renter(RENTER), active.id)
        .await
        .unwrap();
    assert_eq!(finished.status, BookingStatus::Completed);
    assert_eq!(finished.refund_policy, None);
    assert_eq!(h.notifications.recipients(NotificationKind::BookingCompleted), vec![RENTER, OWNER]);

    // the rest of the day is bookable again
    assert!(h
        .availability
        .is_available(apartment.id, h.local(13), h.local(14))
        .await
        .unwrap());
}

#[tokio::test]
async fn test_owner_rejects_paid_booking() {
    let h = Harness::new();
    let apartment = h.seed_apartment(true, false).await;
    h.seed_lock(apartment.id, "lock-1").await;
    let booking = h.book(apartment.id, h.local(15), 2).await;
    let booking = h.pay(&booking).await;

    let rejected = h
        .bookings
        .reject_booking(Actor::owner(OWNER), booking.id, Some("maintenance".into()))
        .await
        .unwrap();
    assert_eq!(rejected.status, BookingStatus::Rejected);
    assert_eq!(rejected.owner_comment.as_deref(), Some("maintenance"));
    assert_eq!(rejected.refund_policy, Some(RefundPolicy::FullRefund));
    assert_eq!(h.vendor.revoked().len(), 1);
    assert_eq!(h.notifications.recipients(NotificationKind::BookingRejected), vec![RENTER]);

    let stranger = h
        .bookings
        .reject_booking(Actor::owner(OWNER + 1), booking.id, None)
        .await;
    assert!(matches!(stranger, Err(AppError::Forbidden(_))));
}

#[tokio::test]
async fn test_admin_approval_without_gateway() {
    let h = Harness::new();
    let apartment = h.seed_apartment(true, false).await;
    let booking = h.book(apartment.id, h.local(15), 2).await;

    let approved = h
        .bookings
        .approve_booking(Actor::admin(ADMIN), booking.id)
        .await
        .unwrap();
    assert_eq!(approved.status, BookingStatus::Approved);
    assert_eq!(approved.payment_id, None);
    assert_eq!(h.payments.calls(), 0);

    let again = h
        .bookings
        .approve_booking(Actor::admin(ADMIN), booking.id)
        .await;
    assert!(matches!(again, Err(AppError::InvalidTransition { .. })));
}

#[tokio::test]
async fn test_daily_booking_is_normalized_and_flat_fee() {
    let h = Harness::new();
    let apartment = h.seed_apartment(false, true).await;
    let tomorrow = day().succ_opt().unwrap();

    let created = h
        .bookings
        .create_booking(
            Actor::renter(RENTER),
            CreateBooking {
                apartment_id: apartment.id,
                start: h.hours.at(tomorrow, 14).unwrap() + Duration::minutes(37),
                duration: 24,
            },
        )
        .await
        .unwrap();

    assert_eq!(created.start_date, h.hours.day_start(tomorrow).unwrap());
    assert_eq!(created.end_date, h.hours.at(tomorrow, 23).unwrap());
    assert_eq!(created.occupied_until(), h.hours.at(tomorrow, 24).unwrap());
    assert_eq!(created.total_price, dec!(20000));
    assert_eq!(created.service_fee, dec!(3000));
    assert_eq!(created.final_price, dec!(23000));
    assert!(created.is_daily());

    let hourly = h
        .bookings
        .create_booking(
            Actor::renter(RENTER),
            CreateBooking {
                apartment_id: apartment.id,
                start: h.local(12),
                duration: 3,
            },
        )
        .await;
    assert!(matches!(hourly, Err(AppError::UnsupportedRentalMode(_))));
}

#[tokio::test]
async fn test_create_rejects_bad_windows() {
    let h = Harness::new();
    let apartment = h.seed_apartment(true, false).await;

    let request = |start, duration| CreateBooking {
        apartment_id: apartment.id,
        start,
        duration,
    };

    let late = h
        .bookings
        .create_booking(Actor::renter(RENTER), request(h.local(20), 3))
        .await;
    assert!(matches!(late, Err(AppError::OutsideOperatingHours(_))));

    let early = h
        .bookings
        .create_booking(Actor::renter(RENTER), request(h.local(9), 2))
        .await;
    assert!(matches!(early, Err(AppError::OutsideOperatingHours(_))));

    let zero = h
        .bookings
        .create_booking(Actor::renter(RENTER), request(h.local(12), 0))
        .await;
    assert!(matches!(zero, Err(AppError::Validation(_))));

    let missing = h
        .bookings
        .create_booking(
            Actor::renter(RENTER),
            CreateBooking {
                apartment_id: 9999,
                start: h.local(12),
                duration: 2,
            },
        )
        .await;
    assert!(matches!(missing, Err(AppError::ApartmentNotFound(_))));
}

#[tokio::test]
async fn test_settled_outcome_is_tagged() {
    let h = Harness::new();
    let apartment = h.seed_apartment(true, false).await;
    let booking = h.book(apartment.id, h.local(12), 1).await;
    h.payments
        .confirm(&booking.booking_number, "pay-x", booking.final_price);

    let outcome = h
        .bookings
        .process_payment("pay-x")
        .await
        .unwrap();
    let json = serde_json::to_value(&outcome).unwrap();
    assert_eq!(json["kind"], "booking");
    assert!(matches!(outcome, PaymentOutcome::Booking { .. }));
}
