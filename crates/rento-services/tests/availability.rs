mod common;

use chrono::Duration;
use common::*;
use futures::future::join_all;
use rento_core::{
    models::{Actor, BookingStatus},
    AppError,
};
use rento_services::CreateBooking;
use rust_decimal_macros::dec;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_confirmations_admit_one() {
    let h = Harness::new();
    let apartment = h.seed_apartment(true, false).await;

    let mut drafts = Vec::new();
    for renter in 0..8 {
        let draft = h
            .bookings
            .create_booking(
                Actor::renter(RENTER + renter),
                CreateBooking {
                    apartment_id: apartment.id,
                    start: h.local(12) + Duration::hours(renter % 2),
                    duration: 3,
                },
            )
            .await
            .unwrap();
        drafts.push(draft);
    }

    let results = join_all(
        drafts
            .iter()
            .map(|b| h.bookings.confirm_booking(Actor::renter(b.renter_id), b.id)),
    )
    .await;

    let confirmed: Vec<_> = results.iter().filter(|r| r.is_ok()).collect();
    assert_eq!(confirmed.len(), 1);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|e| matches!(e, AppError::SlotUnavailable(_))));
}

#[tokio::test]
async fn test_cleaning_buffer_blocks_adjacent_start() {
    let h = Harness::new();
    let apartment = h.seed_apartment(true, false).await;
    h.book(apartment.id, h.local(10), 2).await;

    let adjacent = h
        .book_as(OTHER_RENTER, apartment.id, h.local(12), 1)
        .await;
    assert!(matches!(adjacent, Err(AppError::SlotUnavailable(_))));

    let after_cleaning = h
        .book_as(OTHER_RENTER, apartment.id, h.local(13), 1)
        .await
        .unwrap();
    assert_eq!(after_cleaning.status, BookingStatus::AwaitingPayment);

    let back_to_back = h
        .book_as(OTHER_RENTER + 1, apartment.id, h.local(14), 1)
        .await;
    assert!(matches!(back_to_back, Err(AppError::SlotUnavailable(_))));
}

#[tokio::test]
async fn test_unconfirmed_bookings_do_not_block() {
    let h = Harness::new();
    let apartment = h.seed_apartment(true, false).await;
    h.bookings
        .create_booking(
            Actor::renter(RENTER),
            CreateBooking {
                apartment_id: apartment.id,
                start: h.local(10),
                duration: 2,
            },
        )
        .await
        .unwrap();

    assert!(h
        .availability
        .check_availability(apartment.id, h.local(10), 2)
        .await
        .unwrap());
}

#[tokio::test]
async fn test_canceled_booking_frees_its_window() {
    let h = Harness::new();
    let apartment = h.seed_apartment(true, false).await;
    let booking = h.book(apartment.id, h.local(10), 2).await;

    assert!(!h
        .availability
        .check_availability(apartment.id, h.local(11), 1)
        .await
        .unwrap());

    h.bookings
        .cancel_booking(Actor::renter(RENTER), booking.id, None)
        .await
        .unwrap();

    assert!(h
        .availability
        .check_availability(apartment.id, h.local(11), 1)
        .await
        .unwrap());
}

#[tokio::test]
async fn test_durations_respect_bookings_and_probe_cap() {
    let h = Harness::new();
    let apartment = h.seed_apartment(true, false).await;
    h.book(apartment.id, h.local(14), 2).await;

    let available = h
        .availability
        .enumerate_durations(apartment.id, h.clock_now())
        .await
        .unwrap();
    assert!(!available.unavailable_today);
    assert_eq!(available.durations, vec![1, 2, 3]);
}

#[tokio::test]
async fn test_late_evening_closes_hourly_only_apartment() {
    let h = Harness::at(day(), 23, 30);
    let apartment = h.seed_apartment(true, false).await;

    let available = h
        .availability
        .enumerate_durations(apartment.id, h.clock_now())
        .await
        .unwrap();
    assert!(available.durations.is_empty());
    assert!(available.unavailable_today);
}

#[tokio::test]
async fn test_daily_still_offered_before_cutoff() {
    let h = Harness::at(day(), 22, 30);
    let apartment = h.seed_apartment(true, true).await;

    let available = h
        .availability
        .enumerate_durations(apartment.id, h.clock_now())
        .await
        .unwrap();
    assert_eq!(available.durations, vec![24]);
    assert!(!available.unavailable_today);
}

#[tokio::test]
async fn test_time_slots_skip_taken_hours() {
    let h = Harness::new();
    let apartment = h.seed_apartment(true, false).await;
    h.book(apartment.id, h.local(14), 2).await;

    let starts: Vec<_> = h
        .availability
        .available_time_slots(apartment.id, day(), 2)
        .await
        .unwrap()
        .into_iter()
        .map(|slot| h.hours.local_hour(slot.start))
        .collect();
    assert_eq!(starts, vec![10, 11, 17, 18, 19, 20]);

    let past = h
        .availability
        .available_time_slots(apartment.id, day().pred_opt().unwrap(), 2)
        .await
        .unwrap();
    assert!(past.is_empty());
}

#[tokio::test]
async fn test_slots_start_at_next_whole_hour_today() {
    let h = Harness::at(day(), 17, 20);
    let apartment = h.seed_apartment(true, false).await;

    let slots = h
        .availability
        .available_time_slots(apartment.id, day(), 3)
        .await
        .unwrap();
    assert_eq!(slots.first().map(|s| s.start), Some(h.local(18)));
    assert_eq!(slots.last().map(|s| s.end), Some(h.local(22)));

    let too_soon = h
        .bookings
        .create_booking(
            Actor::renter(RENTER),
            CreateBooking {
                apartment_id: apartment.id,
                start: h.local(17),
                duration: 2,
            },
        )
        .await;
    assert!(matches!(too_soon, Err(AppError::Validation(_))));
}

#[tokio::test]
async fn test_booked_dates() {
    let h = Harness::at(day(), 23, 30);
    let apartment = h.seed_apartment(true, true).await;
    let tomorrow = day().succ_opt().unwrap();
    h.book(apartment.id, h.hours.day_start(tomorrow).unwrap(), 24)
        .await;

    let dates = h
        .availability
        .booked_dates(apartment.id, day(), day() + Duration::days(3))
        .await
        .unwrap();

    assert_eq!(dates.len(), 2);
    assert_eq!(dates[0].date, day());
    assert!(dates[0].synthesized);
    assert_eq!(dates[1].date, tomorrow);
    assert!(!dates[1].synthesized);

    let too_wide = h
        .availability
        .booked_dates(apartment.id, day(), day() + Duration::days(120))
        .await;
    assert!(matches!(too_wide, Err(AppError::Validation(_))));
}

#[tokio::test]
async fn test_unapproved_apartment_is_not_bookable() {
    let h = Harness::new();
    let mut apartment = h.seed_apartment(true, false).await;
    apartment.status = rento_core::models::ApartmentStatus::Pending;
    let apartment = {
        use rento_core::traits::ApartmentRepository;
        h.store.apartments().create(&apartment).await.unwrap()
    };

    let result = h
        .availability
        .check_availability(apartment.id, h.local(12), 2)
        .await;
    assert!(matches!(result, Err(AppError::ApartmentNotBookable(_))));
}

#[tokio::test]
async fn test_quotes_are_deterministic_and_follow_the_fee_setting() {
    let h = Harness::new();
    let apartment = h.seed_apartment(true, false).await;

    let first = h
        .pricing
        .calculate(&apartment, 12, h.local(10))
        .await
        .unwrap();
    let second = h
        .pricing
        .calculate(&apartment, 12, h.local(10))
        .await
        .unwrap();
    assert_eq!(first, second);
    assert_eq!(first.discount_percent, 15);
    assert_eq!(first.base_price, dec!(51000));
    assert_eq!(first.final_price, first.base_price + first.service_fee);

    h.store.set_service_fee_percent(Some(15));
    let live = h
        .pricing
        .calculate(&apartment, 2, h.local(10))
        .await
        .unwrap();
    assert_eq!(live.base_price, dec!(10000));
    assert_eq!(live.service_fee, dec!(1500));
    assert_eq!(live.final_price, dec!(11500));
}
