//! Booking state machine
//!
//! Owns every status change of a booking:
//!
//! ```text
//! created → pending → awaiting_payment → approved → active → completed
//!              ↘            ↘               ↘          ↘
//!            rejected / canceled        rejected    canceled (admin)
//! ```
//!
//! Each transition checks the actor's permission and the current status,
//! writes through a status-guarded repository update, and only then
//! publishes a domain event. Door passwords and notifications hang off
//! those events, so their failures never undo a committed transition.
//!
//! Operations on one booking are serialized in-process with a keyed lock;
//! the repositories reject stale writes from anywhere else.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use rento_auth::{check, Permission, Resource};
use rento_core::{
    config::{BookingConfig, GatewayConfig},
    models::{
        Actor, Booking, BookingExtension, BookingStatus, CancellationPreview, ExtensionStatus,
        NewBooking, RefundPolicy,
    },
    traits::{
        ApartmentRepository, BookingRepository, ExtensionRepository, PaginatedResponse,
        Pagination, PaginationMeta, PaymentGateway, PaymentStatus,
    },
    AppError, AppResult, Clock, DomainEvent, OperatingHours,
};
use rento_db::Stores;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::availability::AvailabilityEngine;
use crate::constants::{BOOKING_NUMBER_DIGITS, BOOKING_NUMBER_PREFIX};
use crate::dispatcher::EventPublisher;
use crate::guard::KeyedLocks;
use crate::pricing::PricingEngine;
use crate::refund::RefundDecision;

/// Attempts at drawing an unused booking number
const BOOKING_NUMBER_ATTEMPTS: usize = 3;

/// Renter request for a new booking
#[derive(Debug, Clone, Deserialize)]
pub struct CreateBooking {
    pub apartment_id: i64,
    pub start: DateTime<Utc>,
    /// Hours; 24 books the whole local day
    pub duration: i32,
}

/// What a payment reference settled
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PaymentOutcome {
    Booking {
        booking: Booking,
    },
    Extension {
        booking: Booking,
        extension: BookingExtension,
    },
}

pub struct BookingService {
    pub(crate) apartments: Arc<dyn ApartmentRepository>,
    pub(crate) bookings: Arc<dyn BookingRepository>,
    pub(crate) extensions: Arc<dyn ExtensionRepository>,
    pub(crate) pricing: Arc<PricingEngine>,
    pub(crate) availability: Arc<AvailabilityEngine>,
    payments: Arc<dyn PaymentGateway>,
    publisher: Arc<dyn EventPublisher>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) hours: OperatingHours,
    pub(crate) booking_guards: KeyedLocks,
    apartment_guards: KeyedLocks,
    refund_cutoff: Duration,
    payment_timeout: std::time::Duration,
}

impl BookingService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        stores: &Stores,
        pricing: Arc<PricingEngine>,
        availability: Arc<AvailabilityEngine>,
        payments: Arc<dyn PaymentGateway>,
        publisher: Arc<dyn EventPublisher>,
        clock: Arc<dyn Clock>,
        booking: &BookingConfig,
        gateways: &GatewayConfig,
    ) -> Self {
        let hours = availability.hours().clone();
        Self {
            apartments: stores.apartments.clone(),
            bookings: stores.bookings.clone(),
            extensions: stores.extensions.clone(),
            pricing,
            availability,
            payments,
            publisher,
            clock,
            hours,
            booking_guards: KeyedLocks::new(),
            apartment_guards: KeyedLocks::new(),
            refund_cutoff: Duration::hours(booking.refund_cutoff_hours),
            payment_timeout: std::time::Duration::from_millis(gateways.timeout_ms),
        }
    }

    // ==================== Helpers ====================

    pub(crate) async fn find(&self, booking_id: i64) -> AppResult<Booking> {
        self.bookings
            .find_by_id(booking_id)
            .await?
            .ok_or_else(|| AppError::BookingNotFound(booking_id.to_string()))
    }

    pub(crate) async fn owner_of(&self, booking: &Booking) -> AppResult<i64> {
        self.apartments
            .find_by_id(booking.apartment_id)
            .await?
            .map(|a| a.owner_id)
            .ok_or_else(|| AppError::ApartmentNotFound(booking.apartment_id.to_string()))
    }

    pub(crate) async fn authorize(
        &self,
        actor: &Actor,
        permission: Permission,
        booking: &Booking,
    ) -> AppResult<i64> {
        let owner_id = self.owner_of(booking).await?;
        check(
            actor,
            permission,
            Resource::Booking {
                renter_id: booking.renter_id,
                owner_id,
            },
        )?;
        Ok(owner_id)
    }

    pub(crate) async fn publish(&self, event: DomainEvent) {
        self.publisher.publish(event).await;
    }

    fn booking_number(&self, now: DateTime<Utc>) -> String {
        let mut rng = rand::thread_rng();
        let digits: String = (0..BOOKING_NUMBER_DIGITS)
            .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
            .collect();
        format!(
            "{}{}-{}",
            BOOKING_NUMBER_PREFIX,
            self.hours.local_date(now).format("%Y%m%d"),
            digits
        )
    }

    async fn mark_free(&self, apartment_id: i64, is_free: bool) {
        if let Err(e) = self.apartments.set_free(apartment_id, is_free).await {
            warn!(
                "Could not set apartment {} is_free={}: {}",
                apartment_id, is_free, e
            );
        }
    }

    /// Ask the gateway about a payment, bounded by the configured timeout
    pub(crate) async fn check_payment(&self, reference: &str) -> AppResult<PaymentStatus> {
        match tokio::time::timeout(self.payment_timeout, self.payments.check_status(reference))
            .await
        {
            Ok(result) => result,
            Err(_) => {
                warn!("Payment gateway timed out for {}", reference);
                Err(AppError::DependencyTimeout(format!(
                    "payment status for {}",
                    reference
                )))
            }
        }
    }

    /// Refuse a payment id already settled against something else
    pub(crate) async fn ensure_payment_unused(
        &self,
        payment_id: &str,
        booking_id: Option<i64>,
        extension_id: Option<i64>,
    ) -> AppResult<()> {
        if let Some(other) = self.bookings.find_by_payment_id(payment_id).await? {
            if Some(other.id) != booking_id {
                return Err(AppError::DuplicatePayment(format!(
                    "{} already settled booking {}",
                    payment_id, other.booking_number
                )));
            }
        }
        if let Some(other) = self.extensions.find_by_reference(payment_id).await? {
            if other.payment_id.as_deref() == Some(payment_id) && Some(other.id) != extension_id {
                return Err(AppError::DuplicatePayment(format!(
                    "{} already settled extension {}",
                    payment_id, other.order_id
                )));
            }
        }
        Ok(())
    }

    /// Flip an approved booking to active once its start has passed
    ///
    /// The caller holds the booking's guard.
    pub(crate) async fn activate_if_due(&self, booking: Booking) -> AppResult<Booking> {
        if booking.status != BookingStatus::Approved || self.clock.now() < booking.start_date {
            return Ok(booking);
        }

        let mut active = booking.clone();
        active.status = BookingStatus::Active;
        let active = self
            .bookings
            .transition(&active, BookingStatus::Approved)
            .await?;

        info!("Booking {} is now active", active.booking_number);

        self.publish(DomainEvent::BookingActivated {
            booking_id: active.id,
            renter_id: active.renter_id,
        })
        .await;

        Ok(active)
    }

    /// Whether the hour right after the stay is free and inside the window
    pub async fn can_extend(&self, booking: &Booking) -> AppResult<bool> {
        if booking.status != BookingStatus::Active
            || booking.is_daily()
            || booking.extension_requested
        {
            return Ok(false);
        }

        if self
            .hours
            .validate_hourly(booking.start_date, booking.duration + 1)
            .is_err()
        {
            return Ok(false);
        }

        self.availability
            .is_available_excluding(
                booking.apartment_id,
                booking.end_date,
                booking.end_date + Duration::hours(1),
                Some(booking.id),
            )
            .await
    }

    async fn with_can_extend(&self, mut booking: Booking) -> AppResult<Booking> {
        booking.can_extend = self.can_extend(&booking).await?;
        Ok(booking)
    }

    /// Close an open extension when its booking ends
    pub(crate) async fn close_open_extension(&self, booking_id: i64, reason: &str) {
        match self.extensions.find_open_for_booking(booking_id).await {
            Ok(Some(mut extension)) => {
                extension.status = ExtensionStatus::Rejected;
                extension.reject_reason = Some(reason.to_string());
                extension.decided_at = Some(self.clock.now());
                if let Err(e) = self.extensions.update_open(&extension).await {
                    warn!("Could not close extension {}: {}", extension.id, e);
                }
            }
            Ok(None) => {}
            Err(e) => warn!("Could not load extensions of booking {}: {}", booking_id, e),
        }
    }

    // ==================== Creation ====================

    /// Price and store a new booking in `created`
    ///
    /// Daily requests are normalized to the local day of `start`. Prices are
    /// frozen here.
    #[instrument(skip(self))]
    pub async fn create_booking(&self, actor: Actor, request: CreateBooking) -> AppResult<Booking> {
        let apartment = self
            .availability
            .load_bookable(request.apartment_id)
            .await?;

        let (start, end) =
            self.availability
                .resolve_window(&apartment, request.start, request.duration)?;
        let quote = self
            .pricing
            .calculate(&apartment, request.duration, start)
            .await?;

        let _guard = self.apartment_guards.lock(apartment.id).await;
        let now = self.clock.now();

        let mut attempt = 0;
        let booking = loop {
            attempt += 1;
            let new_booking = NewBooking {
                apartment_id: apartment.id,
                renter_id: actor.user_id,
                booking_number: self.booking_number(now),
                start_date: start,
                end_date: end,
                duration: request.duration,
                cleaning_minutes: self.hours.cleaning().num_minutes() as i32,
                total_price: quote.base_price,
                service_fee: quote.service_fee,
                final_price: quote.final_price,
            };

            match self.bookings.create_if_available(new_booking).await {
                Err(AppError::Conflict(msg)) if attempt < BOOKING_NUMBER_ATTEMPTS => {
                    debug!("Booking number collision, redrawing: {}", msg);
                }
                result => break result?,
            }
        };

        info!(
            "Created booking {} for apartment {} by user {}: {} - {} ({}h) at {}",
            booking.booking_number,
            apartment.id,
            actor.user_id,
            booking.start_date,
            booking.end_date,
            booking.duration,
            booking.final_price
        );

        Ok(booking)
    }

    // ==================== Confirmation and payment ====================

    /// `created → pending → awaiting_payment`
    ///
    /// The window starts blocking other bookings here, so the overlap check
    /// is repeated atomically with the write.
    #[instrument(skip(self))]
    pub async fn confirm_booking(&self, actor: Actor, booking_id: i64) -> AppResult<Booking> {
        let (booking, owner_id) = {
            let _guard = self.booking_guards.lock(booking_id).await;
            let booking = self.find(booking_id).await?;
            let owner_id = self
                .authorize(&actor, Permission::ManageBooking, &booking)
                .await?;

            if booking.status != BookingStatus::Created {
                warn!(
                    "Confirm rejected for booking {} in status {}",
                    booking.booking_number, booking.status
                );
                return Err(AppError::transition(booking.status, "confirm"));
            }

            if booking.end_date <= self.clock.now() {
                return Err(AppError::Validation(format!(
                    "booking {} window has already passed",
                    booking.booking_number
                )));
            }

            let mut pending = booking.clone();
            pending.status = BookingStatus::Pending;
            let pending = self
                .bookings
                .transition_if_available(&pending, BookingStatus::Created)
                .await?;

            let mut awaiting = pending;
            awaiting.status = BookingStatus::AwaitingPayment;
            let awaiting = self
                .bookings
                .transition(&awaiting, BookingStatus::Pending)
                .await?;

            info!(
                "Booking {} confirmed, awaiting payment of {}",
                awaiting.booking_number, awaiting.final_price
            );
            (awaiting, owner_id)
        };

        self.publish(DomainEvent::BookingConfirmed {
            booking_id: booking.id,
            renter_id: booking.renter_id,
            owner_id,
        })
        .await;

        Ok(booking)
    }

    /// Settle a payment reported by the gateway
    ///
    /// `reference` is a payment id or one of our order ids (booking number
    /// or extension order id). Replays against an already settled booking
    /// fail with `AlreadyProcessed` without contacting the gateway.
    #[instrument(skip(self))]
    pub async fn process_payment(&self, reference: &str) -> AppResult<PaymentOutcome> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(AppError::Validation("payment reference is empty".into()));
        }

        if let Some(extension) = self.extensions.find_by_reference(reference).await? {
            return self.settle_extension_reference(extension, reference).await;
        }

        let local = self.bookings.find_by_reference(reference).await?;
        if let Some(booking) = &local {
            if booking.status.is_paid() || booking.status.is_terminal() {
                warn!(
                    "Ignoring payment {} for booking {} already {}",
                    reference, booking.booking_number, booking.status
                );
                return Err(AppError::AlreadyProcessed(format!(
                    "booking {} is {}",
                    booking.booking_number, booking.status
                )));
            }
        }

        let payment = self.check_payment(reference).await?;

        let booking = match local {
            Some(booking) => booking,
            None => {
                let order_id = payment.order_id.as_deref().unwrap_or(reference);
                if let Some(extension) = self.extensions.find_by_reference(order_id).await? {
                    return self.settle_extension(extension, payment).await;
                }
                self.bookings
                    .find_by_reference(order_id)
                    .await?
                    .ok_or_else(|| AppError::BookingNotFound(reference.to_string()))?
            }
        };

        let (booking, owner_id) = {
            let _guard = self.booking_guards.lock(booking.id).await;
            let booking = self.find(booking.id).await?;

            match booking.status {
                BookingStatus::Pending | BookingStatus::AwaitingPayment => {}
                BookingStatus::Created => {
                    return Err(AppError::transition(booking.status, "pay for"));
                }
                _ => {
                    return Err(AppError::AlreadyProcessed(format!(
                        "booking {} is {}",
                        booking.booking_number, booking.status
                    )));
                }
            }

            if !payment.confirmed {
                return Err(AppError::PaymentNotConfirmed(payment.payment_id));
            }
            if payment.amount != booking.final_price {
                warn!(
                    "Payment {} for booking {} has amount {}, expected {}",
                    payment.payment_id, booking.booking_number, payment.amount, booking.final_price
                );
                return Err(AppError::PaymentMismatch {
                    expected: booking.final_price.to_string(),
                    paid: payment.amount.to_string(),
                });
            }
            self.ensure_payment_unused(&payment.payment_id, Some(booking.id), None)
                .await?;

            let mut approved = booking.clone();
            approved.status = BookingStatus::Approved;
            approved.payment_id = Some(payment.payment_id.clone());
            approved.paid_at = Some(self.clock.now());
            let approved = self.bookings.transition(&approved, booking.status).await?;

            info!(
                "Booking {} paid with {} ({}), approved",
                approved.booking_number, payment.payment_id, payment.amount
            );

            self.mark_free(approved.apartment_id, false).await;
            let owner_id = self.owner_of(&approved).await?;
            (approved, owner_id)
        };

        self.publish(DomainEvent::BookingApproved {
            booking_id: booking.id,
            renter_id: booking.renter_id,
            owner_id,
        })
        .await;

        Ok(PaymentOutcome::Booking { booking })
    }

    async fn settle_extension_reference(
        &self,
        extension: BookingExtension,
        reference: &str,
    ) -> AppResult<PaymentOutcome> {
        if !extension.status.is_open() {
            return Err(AppError::AlreadyProcessed(format!(
                "extension {} is {}",
                extension.order_id, extension.status
            )));
        }
        let payment = self.check_payment(reference).await?;
        self.settle_extension(extension, payment).await
    }

    /// Manual approval without a gateway confirmation (offline payment)
    #[instrument(skip(self))]
    pub async fn approve_booking(&self, actor: Actor, booking_id: i64) -> AppResult<Booking> {
        let (booking, owner_id) = {
            let _guard = self.booking_guards.lock(booking_id).await;
            let booking = self.find(booking_id).await?;
            let owner_id = self
                .authorize(&actor, Permission::AdminOverride, &booking)
                .await?;

            if !matches!(
                booking.status,
                BookingStatus::Pending | BookingStatus::AwaitingPayment
            ) {
                return Err(AppError::transition(booking.status, "approve"));
            }

            let mut approved = booking.clone();
            approved.status = BookingStatus::Approved;
            approved.paid_at = Some(self.clock.now());
            let approved = self.bookings.transition(&approved, booking.status).await?;

            info!(
                "Booking {} approved manually by user {}",
                approved.booking_number, actor.user_id
            );
            self.mark_free(approved.apartment_id, false).await;
            (approved, owner_id)
        };

        self.publish(DomainEvent::BookingApproved {
            booking_id: booking.id,
            renter_id: booking.renter_id,
            owner_id,
        })
        .await;

        Ok(booking)
    }

    // ==================== Decisions and cancellation ====================

    /// Owner or staff refuses a booking that has not started
    #[instrument(skip(self))]
    pub async fn reject_booking(
        &self,
        actor: Actor,
        booking_id: i64,
        reason: Option<String>,
    ) -> AppResult<Booking> {
        let booking = {
            let _guard = self.booking_guards.lock(booking_id).await;
            let booking = self.find(booking_id).await?;
            self.authorize(&actor, Permission::DecideBooking, &booking)
                .await?;

            if !matches!(
                booking.status,
                BookingStatus::Pending | BookingStatus::AwaitingPayment | BookingStatus::Approved
            ) {
                warn!(
                    "Reject refused for booking {} in status {}",
                    booking.booking_number, booking.status
                );
                return Err(AppError::transition(booking.status, "reject"));
            }

            let now = self.clock.now();
            let mut rejected = booking.clone();
            rejected.status = BookingStatus::Rejected;
            rejected.owner_comment = reason.clone();
            rejected.finished_at = Some(now);
            if booking.status.is_paid() {
                rejected.refund_policy = Some(RefundPolicy::FullRefund);
                rejected.refund_amount = Some(booking.final_price);
            }
            let rejected = self.bookings.transition(&rejected, booking.status).await?;

            info!(
                "Booking {} rejected by user {}: {}",
                rejected.booking_number,
                actor.user_id,
                reason.as_deref().unwrap_or("-")
            );

            if booking.status.is_paid() {
                self.mark_free(rejected.apartment_id, true).await;
            }
            rejected
        };

        self.publish(DomainEvent::BookingRejected {
            booking_id: booking.id,
            renter_id: booking.renter_id,
            reason,
        })
        .await;

        Ok(booking)
    }

    /// What canceling right now would refund
    pub async fn cancellation_preview(
        &self,
        actor: Actor,
        booking_id: i64,
    ) -> AppResult<CancellationPreview> {
        let booking = self.find(booking_id).await?;
        self.authorize(&actor, Permission::ViewBooking, &booking)
            .await?;

        if booking.status.is_terminal() {
            return Err(AppError::transition(booking.status, "cancel"));
        }

        Ok(RefundDecision::preview(
            &booking,
            self.clock.now(),
            self.refund_cutoff,
        ))
    }

    /// Cancel a booking that has not finished
    ///
    /// Renters cannot cancel a stay in progress; they finish it instead.
    /// Admins can, and get `not_applicable` as the refund policy.
    #[instrument(skip(self))]
    pub async fn cancel_booking(
        &self,
        actor: Actor,
        booking_id: i64,
        reason: Option<String>,
    ) -> AppResult<Booking> {
        let (booking, owner_id) = {
            let _guard = self.booking_guards.lock(booking_id).await;
            let booking = self.find(booking_id).await?;
            let owner_id = self
                .authorize(&actor, Permission::ManageBooking, &booking)
                .await?;

            if booking.status.is_terminal() {
                return Err(AppError::transition(booking.status, "cancel"));
            }
            if booking.status == BookingStatus::Active && !actor.role.is_admin() {
                warn!(
                    "User {} tried to cancel active booking {}",
                    actor.user_id, booking.booking_number
                );
                return Err(AppError::transition(booking.status, "cancel"));
            }

            let now = self.clock.now();
            let decision = RefundDecision::evaluate(&booking, now, self.refund_cutoff);

            let mut canceled = booking.clone();
            canceled.status = BookingStatus::Canceled;
            canceled.cancellation_reason = reason;
            canceled.refund_policy = Some(decision.policy);
            canceled.refund_amount = Some(decision.amount);
            canceled.finished_at = Some(now);
            canceled.clear_pending_extension();
            let canceled = self.bookings.transition(&canceled, booking.status).await?;

            info!(
                "Booking {} canceled by user {} ({}, refund {})",
                canceled.booking_number, actor.user_id, decision.policy, decision.amount
            );

            self.close_open_extension(canceled.id, "booking canceled")
                .await;
            if booking.status.is_paid() {
                self.mark_free(canceled.apartment_id, true).await;
            }
            (canceled, owner_id)
        };

        self.publish(DomainEvent::BookingCanceled {
            booking_id: booking.id,
            renter_id: booking.renter_id,
            owner_id,
            refund_policy: booking.refund_policy.unwrap_or(RefundPolicy::NotApplicable),
            refund_amount: booking.refund_amount.unwrap_or_default(),
        })
        .await;

        Ok(booking)
    }

    // ==================== Completion ====================

    /// `active → completed`; the caller holds the booking's guard
    async fn complete(&self, booking: Booking) -> AppResult<(Booking, DomainEvent)> {
        let owner_id = self.owner_of(&booking).await?;
        let now = self.clock.now();
        let early = now < booking.end_date;

        let mut completed = booking.clone();
        completed.status = BookingStatus::Completed;
        completed.finished_at = Some(now);
        completed.clear_pending_extension();
        let completed = self
            .bookings
            .transition(&completed, BookingStatus::Active)
            .await?;

        info!(
            "Booking {} completed{}",
            completed.booking_number,
            if early { " early" } else { "" }
        );

        self.close_open_extension(completed.id, "booking completed")
            .await;
        self.mark_free(completed.apartment_id, true).await;

        let event = DomainEvent::BookingCompleted {
            booking_id: completed.id,
            renter_id: completed.renter_id,
            owner_id,
            early,
        };
        Ok((completed, event))
    }

    /// Renter ends the stay, early or on time
    #[instrument(skip(self))]
    pub async fn finish_session(&self, actor: Actor, booking_id: i64) -> AppResult<Booking> {
        let (booking, event) = {
            let _guard = self.booking_guards.lock(booking_id).await;
            let booking = self.find(booking_id).await?;
            self.authorize(&actor, Permission::ManageBooking, &booking)
                .await?;

            let booking = self.activate_if_due(booking).await?;
            if booking.status != BookingStatus::Active {
                return Err(AppError::transition(booking.status, "finish"));
            }
            self.complete(booking).await?
        };

        self.publish(event).await;
        Ok(booking)
    }

    /// Activate every approved booking whose start has passed
    pub async fn activate_due(&self) -> AppResult<usize> {
        let now = self.clock.now();
        let mut activated = 0;

        for due in self.bookings.list_due_activation(now).await? {
            let _guard = self.booking_guards.lock(due.id).await;
            let result = match self.find(due.id).await {
                Ok(booking) => self.activate_if_due(booking).await,
                Err(e) => Err(e),
            };
            match result {
                Ok(booking) if booking.status == BookingStatus::Active => activated += 1,
                Ok(_) => {}
                Err(e) => warn!("Activation of booking {} skipped: {}", due.id, e),
            }
        }

        if activated > 0 {
            info!("Activated {} booking(s)", activated);
        }
        Ok(activated)
    }

    /// Complete every active booking whose end has passed
    pub async fn complete_expired(&self) -> AppResult<usize> {
        let now = self.clock.now();
        let mut completed = 0;

        for due in self.bookings.list_due_completion(now).await? {
            let outcome = {
                let _guard = self.booking_guards.lock(due.id).await;
                match self.find(due.id).await {
                    Ok(booking)
                        if booking.status == BookingStatus::Active && booking.end_date <= now =>
                    {
                        self.complete(booking).await.map(Some)
                    }
                    Ok(_) => Ok(None),
                    Err(e) => Err(e),
                }
            };

            match outcome {
                Ok(Some((_, event))) => {
                    completed += 1;
                    self.publish(event).await;
                }
                Ok(None) => {}
                Err(e) => warn!("Completion of booking {} skipped: {}", due.id, e),
            }
        }

        if completed > 0 {
            info!("Completed {} expired booking(s)", completed);
        }
        Ok(completed)
    }

    // ==================== Queries ====================

    /// Read a booking, activating it first if its start has passed
    #[instrument(skip(self))]
    pub async fn get_booking(&self, actor: Actor, booking_id: i64) -> AppResult<Booking> {
        let booking = self.find(booking_id).await?;
        self.authorize(&actor, Permission::ViewBooking, &booking)
            .await?;

        let booking = if booking.status == BookingStatus::Approved
            && self.clock.now() >= booking.start_date
        {
            let _guard = self.booking_guards.lock(booking_id).await;
            let current = self.find(booking_id).await?;
            self.activate_if_due(current).await?
        } else {
            booking
        };

        self.with_can_extend(booking).await
    }

    pub async fn list_for_renter(
        &self,
        actor: Actor,
        renter_id: i64,
        pagination: Pagination,
    ) -> AppResult<PaginatedResponse<Booking>> {
        if actor.user_id != renter_id {
            check(&actor, Permission::ViewBooking, Resource::Platform)?;
        }

        let (bookings, total) = self
            .bookings
            .list_by_renter(renter_id, pagination.limit(), pagination.offset())
            .await?;

        Ok(PaginatedResponse {
            data: bookings,
            pagination: PaginationMeta::new(total, pagination.page, pagination.per_page),
        })
    }

    pub async fn list_for_apartment(
        &self,
        actor: Actor,
        apartment_id: i64,
        pagination: Pagination,
    ) -> AppResult<PaginatedResponse<Booking>> {
        let apartment = self
            .apartments
            .find_by_id(apartment_id)
            .await?
            .ok_or_else(|| AppError::ApartmentNotFound(apartment_id.to_string()))?;
        check(
            &actor,
            Permission::ViewBooking,
            Resource::Apartment {
                owner_id: apartment.owner_id,
            },
        )?;

        let (bookings, total) = self
            .bookings
            .list_by_apartment(apartment_id, pagination.limit(), pagination.offset())
            .await?;

        Ok(PaginatedResponse {
            data: bookings,
            pagination: PaginationMeta::new(total, pagination.page, pagination.per_page),
        })
    }
}
