//! Cancellation refund policy
//!
//! A deterministic function of the booking's status and the time left until
//! its start. Used both for the preview and for the cancellation itself.

use chrono::{DateTime, Duration, Utc};
use rento_core::models::{Booking, BookingStatus, CancellationPreview, RefundPolicy};
use rust_decimal::Decimal;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefundDecision {
    pub policy: RefundPolicy,
    /// What goes back to the renter; zero when nothing was paid
    pub amount: Decimal,
}

impl RefundDecision {
    /// Evaluate the policy for canceling `booking` at `now`
    ///
    /// Less than `cutoff` before start is non-refundable; exactly `cutoff`
    /// still refunds. A stay already in progress is not a cancellation.
    pub fn evaluate(booking: &Booking, now: DateTime<Utc>, cutoff: Duration) -> Self {
        if booking.status == BookingStatus::Active {
            return Self {
                policy: RefundPolicy::NotApplicable,
                amount: Decimal::ZERO,
            };
        }

        let paid = if booking.status.is_paid() {
            booking.final_price
        } else {
            Decimal::ZERO
        };

        if booking.start_date - now < cutoff {
            Self {
                policy: RefundPolicy::NonRefundable,
                amount: Decimal::ZERO,
            }
        } else {
            Self {
                policy: RefundPolicy::FullRefund,
                amount: paid,
            }
        }
    }

    pub fn preview(booking: &Booking, now: DateTime<Utc>, cutoff: Duration) -> CancellationPreview {
        let decision = Self::evaluate(booking, now, cutoff);
        CancellationPreview {
            booking_id: booking.id,
            status: booking.status,
            refund_policy: decision.policy,
            refund_amount: decision.amount,
            seconds_until_start: (booking.start_date - now).num_seconds(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rento_core::models::NewBooking;
    use rust_decimal_macros::dec;

    fn booking(status: BookingStatus, start: DateTime<Utc>) -> Booking {
        let mut booking = NewBooking {
            apartment_id: 1,
            renter_id: 2,
            booking_number: "RB-20260504-000001".into(),
            start_date: start,
            end_date: start + Duration::hours(2),
            duration: 2,
            cleaning_minutes: 60,
            total_price: dec!(10000),
            service_fee: dec!(1000),
            final_price: dec!(11000),
        }
        .into_booking(1, start - Duration::days(1));
        booking.status = status;
        booking
    }

    #[test]
    fn test_cutoff_boundary() {
        let start = Utc::now() + Duration::days(2);
        let cutoff = Duration::hours(6);
        let b = booking(BookingStatus::Pending, start);

        let inside = start - cutoff + Duration::seconds(1);
        assert_eq!(
            RefundDecision::evaluate(&b, inside, cutoff).policy,
            RefundPolicy::NonRefundable
        );

        let outside = start - cutoff - Duration::seconds(1);
        assert_eq!(
            RefundDecision::evaluate(&b, outside, cutoff).policy,
            RefundPolicy::FullRefund
        );

        assert_eq!(
            RefundDecision::evaluate(&b, start - cutoff, cutoff).policy,
            RefundPolicy::FullRefund
        );
    }

    #[test]
    fn test_amount_follows_payment() {
        let start = Utc::now() + Duration::days(2);
        let cutoff = Duration::hours(6);
        let now = start - Duration::days(1);

        let unpaid = booking(BookingStatus::AwaitingPayment, start);
        assert_eq!(RefundDecision::evaluate(&unpaid, now, cutoff).amount, Decimal::ZERO);

        let paid = booking(BookingStatus::Approved, start);
        assert_eq!(RefundDecision::evaluate(&paid, now, cutoff).amount, dec!(11000));
    }

    #[test]
    fn test_active_is_not_applicable() {
        let start = Utc::now();
        let b = booking(BookingStatus::Active, start);
        let preview = RefundDecision::preview(&b, start + Duration::minutes(30), Duration::hours(6));
        assert_eq!(preview.refund_policy, RefundPolicy::NotApplicable);
        assert_eq!(preview.seconds_until_start, -1800);
    }
}
