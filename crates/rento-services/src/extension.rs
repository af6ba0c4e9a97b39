//! Extension sub-flow
//!
//! An active hourly booking may ask for more hours directly after its end.
//! The extension is priced like a fresh hourly stay starting at the current
//! end and must stay inside the operating window. It is applied, together
//! with the booking's new end, once paid or once the owner approves it.

use chrono::Duration;
use rento_auth::Permission;
use rento_core::{
    models::{Actor, Booking, BookingExtension, BookingStatus, ExtensionStatus, NewExtension},
    traits::PaymentStatus,
    AppError, AppResult, DomainEvent,
};
use tracing::{info, instrument, warn};

use crate::booking::{BookingService, PaymentOutcome};
use crate::constants::{DAILY_DURATION_HOURS, MIN_DURATION_HOURS};

impl BookingService {
    async fn find_extension(&self, extension_id: i64) -> AppResult<BookingExtension> {
        self.extensions
            .find_by_id(extension_id)
            .await?
            .ok_or_else(|| AppError::ExtensionNotFound(extension_id.to_string()))
    }

    fn ensure_open(extension: &BookingExtension) -> AppResult<()> {
        if extension.status.is_open() {
            Ok(())
        } else {
            Err(AppError::AlreadyProcessed(format!(
                "extension {} is {}",
                extension.order_id, extension.status
            )))
        }
    }

    /// Ask for `additional_hours` more after the current end
    #[instrument(skip(self))]
    pub async fn request_extension(
        &self,
        actor: Actor,
        booking_id: i64,
        additional_hours: i32,
    ) -> AppResult<BookingExtension> {
        if !(MIN_DURATION_HOURS..DAILY_DURATION_HOURS).contains(&additional_hours) {
            return Err(AppError::Validation(format!(
                "extension must be between {} and {} hours",
                MIN_DURATION_HOURS,
                DAILY_DURATION_HOURS - 1
            )));
        }

        let (extension, owner_id) = {
            let _guard = self.booking_guards.lock(booking_id).await;
            let booking = self.find(booking_id).await?;
            let owner_id = self
                .authorize(&actor, Permission::ManageBooking, &booking)
                .await?;

            let booking = self.activate_if_due(booking).await?;
            if booking.status != BookingStatus::Active {
                return Err(AppError::transition(booking.status, "extend"));
            }
            if booking.is_daily() {
                return Err(AppError::Validation(
                    "daily bookings cannot be extended".into(),
                ));
            }
            if booking.extension_requested
                || self
                    .extensions
                    .find_open_for_booking(booking.id)
                    .await?
                    .is_some()
            {
                return Err(AppError::Conflict(format!(
                    "booking {} already has a pending extension",
                    booking.booking_number
                )));
            }

            let new_end = booking.end_date + Duration::hours(additional_hours as i64);
            if !self
                .availability
                .is_available_excluding(
                    booking.apartment_id,
                    booking.end_date,
                    new_end,
                    Some(booking.id),
                )
                .await?
            {
                return Err(AppError::SlotUnavailable(format!(
                    "apartment {} is taken after {}",
                    booking.apartment_id, booking.end_date
                )));
            }

            let apartment = self
                .apartments
                .find_by_id(booking.apartment_id)
                .await?
                .ok_or_else(|| AppError::ApartmentNotFound(booking.apartment_id.to_string()))?;
            let quote = self
                .pricing
                .calculate(&apartment, additional_hours, booking.end_date)
                .await?;

            let sequence = self.extensions.list_for_booking(booking.id).await?.len() + 1;
            let extension = self
                .extensions
                .create_open(NewExtension {
                    booking_id: booking.id,
                    requested_duration: additional_hours,
                    base_price: quote.base_price,
                    service_fee: quote.service_fee,
                    price: quote.final_price,
                    order_id: format!("{}-X{}", booking.booking_number, sequence),
                })
                .await?;

            let mut pending = booking.clone();
            pending.extension_requested = true;
            pending.extension_duration = Some(additional_hours);
            pending.extension_price = Some(extension.price);
            if let Err(e) = self
                .bookings
                .transition(&pending, BookingStatus::Active)
                .await
            {
                let mut abandoned = extension.clone();
                abandoned.status = ExtensionStatus::Rejected;
                abandoned.reject_reason = Some("booking changed".into());
                abandoned.decided_at = Some(self.clock.now());
                if let Err(undo) = self.extensions.update_open(&abandoned).await {
                    warn!("Could not abandon extension {}: {}", extension.id, undo);
                }
                return Err(e);
            }

            info!(
                "Extension {} requested for booking {}: +{}h at {}",
                extension.order_id, booking.booking_number, additional_hours, extension.price
            );
            (extension, owner_id)
        };

        self.publish(DomainEvent::ExtensionRequested {
            booking_id,
            extension_id: extension.id,
            owner_id,
        })
        .await;

        Ok(extension)
    }

    /// Lengthen the booking by an open extension; the caller holds the guard
    async fn apply_extension(
        &self,
        extension: BookingExtension,
    ) -> AppResult<(Booking, BookingExtension, DomainEvent)> {
        let booking = self.find(extension.booking_id).await?;
        if booking.status != BookingStatus::Active {
            return Err(AppError::transition(booking.status, "extend"));
        }

        let previous_end = booking.end_date;
        let mut extended = booking.clone();
        extended.end_date = previous_end + Duration::hours(extension.requested_duration as i64);
        extended.duration += extension.requested_duration;
        extended.clear_pending_extension();

        let (booking, extension) = self.bookings.apply_extension(&extended, &extension).await?;

        info!(
            "Booking {} extended by {}h, now ends {}",
            booking.booking_number, extension.requested_duration, booking.end_date
        );

        let event = DomainEvent::ExtensionApproved {
            booking_id: booking.id,
            extension_id: extension.id,
            renter_id: booking.renter_id,
            previous_end,
            new_end: booking.end_date,
        };
        Ok((booking, extension, event))
    }

    /// Settle a gateway payment against an extension
    pub(crate) async fn settle_extension(
        &self,
        extension: BookingExtension,
        payment: PaymentStatus,
    ) -> AppResult<PaymentOutcome> {
        let (booking, extension, event) = {
            let _guard = self.booking_guards.lock(extension.booking_id).await;
            let mut extension = self.find_extension(extension.id).await?;
            Self::ensure_open(&extension)?;

            if !payment.confirmed {
                return Err(AppError::PaymentNotConfirmed(payment.payment_id));
            }
            if payment.amount != extension.price {
                warn!(
                    "Payment {} for extension {} has amount {}, expected {}",
                    payment.payment_id, extension.order_id, payment.amount, extension.price
                );
                return Err(AppError::PaymentMismatch {
                    expected: extension.price.to_string(),
                    paid: payment.amount.to_string(),
                });
            }
            self.ensure_payment_unused(&payment.payment_id, None, Some(extension.id))
                .await?;

            extension.payment_id = Some(payment.payment_id.clone());
            extension.decided_at = Some(self.clock.now());
            self.apply_extension(extension).await?
        };

        self.publish(event).await;
        Ok(PaymentOutcome::Extension { booking, extension })
    }

    /// Owner or staff applies an extension without a gateway payment
    #[instrument(skip(self))]
    pub async fn approve_extension(
        &self,
        actor: Actor,
        extension_id: i64,
    ) -> AppResult<(Booking, BookingExtension)> {
        let extension = self.find_extension(extension_id).await?;

        let (booking, extension, event) = {
            let _guard = self.booking_guards.lock(extension.booking_id).await;
            let booking = self.find(extension.booking_id).await?;
            self.authorize(&actor, Permission::DecideBooking, &booking)
                .await?;

            let mut extension = self.find_extension(extension_id).await?;
            Self::ensure_open(&extension)?;
            extension.decided_at = Some(self.clock.now());
            self.apply_extension(extension).await?
        };

        self.publish(event).await;
        Ok((booking, extension))
    }

    /// Owner or staff declines an open extension
    #[instrument(skip(self))]
    pub async fn reject_extension(
        &self,
        actor: Actor,
        extension_id: i64,
        reason: Option<String>,
    ) -> AppResult<BookingExtension> {
        let extension = self.find_extension(extension_id).await?;

        let (extension, renter_id) = {
            let _guard = self.booking_guards.lock(extension.booking_id).await;
            let booking = self.find(extension.booking_id).await?;
            self.authorize(&actor, Permission::DecideBooking, &booking)
                .await?;

            let mut extension = self.find_extension(extension_id).await?;
            Self::ensure_open(&extension)?;
            extension.status = ExtensionStatus::Rejected;
            extension.reject_reason = reason;
            extension.decided_at = Some(self.clock.now());
            let extension = self.extensions.update_open(&extension).await?;

            if booking.extension_requested {
                let mut cleared = booking.clone();
                cleared.clear_pending_extension();
                if let Err(e) = self.bookings.transition(&cleared, booking.status).await {
                    warn!(
                        "Could not clear pending extension on booking {}: {}",
                        booking.booking_number, e
                    );
                }
            }

            info!(
                "Extension {} of booking {} rejected by user {}",
                extension.order_id, booking.booking_number, actor.user_id
            );
            (extension, booking.renter_id)
        };

        self.publish(DomainEvent::ExtensionRejected {
            booking_id: extension.booking_id,
            extension_id: extension.id,
            renter_id,
        })
        .await;

        Ok(extension)
    }

    pub async fn list_extensions(
        &self,
        actor: Actor,
        booking_id: i64,
    ) -> AppResult<Vec<BookingExtension>> {
        let booking = self.find(booking_id).await?;
        self.authorize(&actor, Permission::ViewBooking, &booking)
            .await?;
        self.extensions.list_for_booking(booking_id).await
    }
}
