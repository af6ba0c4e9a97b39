//! Domain event publication and dispatch
//!
//! Booking transitions publish a [`DomainEvent`] only after they have been
//! committed. The [`EventDispatcher`] consumes them and performs the
//! best-effort side effects: door passwords and user notifications. Those may
//! fail and be retried without touching booking state.

use async_trait::async_trait;
use rento_core::{
    events::NotificationKind, traits::NotificationSink, AppError, AppResult, DomainEvent,
};
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::constants::{DISPATCH_MAX_ATTEMPTS, DISPATCH_RETRY_DELAY_MS};
use crate::lock_access::LockAccessService;

/// Sink for committed domain events
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Never fails the caller; delivery problems are logged
    async fn publish(&self, event: DomainEvent);
}

/// Queues events for a dispatcher task
#[derive(Clone)]
pub struct ChannelPublisher {
    tx: mpsc::UnboundedSender<DomainEvent>,
}

impl ChannelPublisher {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<DomainEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl EventPublisher for ChannelPublisher {
    async fn publish(&self, event: DomainEvent) {
        debug!("Publishing {}", event);
        if let Err(e) = self.tx.send(event) {
            error!("Event dispatcher is gone, dropped {}", e.0);
        }
    }
}

/// Runs the dispatcher in the publishing task
///
/// Useful where the caller wants side effects finished before it returns,
/// such as tests and one-shot tools.
pub struct InlinePublisher {
    dispatcher: Arc<EventDispatcher>,
}

impl InlinePublisher {
    pub fn new(dispatcher: Arc<EventDispatcher>) -> Self {
        Self { dispatcher }
    }
}

#[async_trait]
impl EventPublisher for InlinePublisher {
    async fn publish(&self, event: DomainEvent) {
        self.dispatcher.handle(event).await;
    }
}

pub struct EventDispatcher {
    lock_access: Arc<LockAccessService>,
    notifications: Arc<dyn NotificationSink>,
    max_attempts: u32,
    retry_delay: Duration,
}

impl EventDispatcher {
    pub fn new(
        lock_access: Arc<LockAccessService>,
        notifications: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            lock_access,
            notifications,
            max_attempts: DISPATCH_MAX_ATTEMPTS,
            retry_delay: Duration::from_millis(DISPATCH_RETRY_DELAY_MS),
        }
    }

    pub fn with_retry(mut self, max_attempts: u32, retry_delay: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.retry_delay = retry_delay;
        self
    }

    /// Consume events until every publisher is dropped
    pub async fn run(self: Arc<Self>, mut rx: mpsc::UnboundedReceiver<DomainEvent>) {
        info!("Event dispatcher started");
        while let Some(event) = rx.recv().await {
            self.handle(event).await;
        }
        info!("Event dispatcher stopped");
    }

    /// Retry `op` while it fails with a retryable error
    async fn retrying<T, F, Fut>(&self, what: &str, event: &DomainEvent, mut op: F) -> AppResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    let delay = self.retry_delay * 2u32.pow(attempt - 1);
                    warn!(
                        "{} for {} failed (attempt {}/{}), retrying in {:?}: {}",
                        what, event, attempt, self.max_attempts, delay, e
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn notify(&self, user_id: i64, kind: NotificationKind, event: &DomainEvent) {
        let payload = serde_json::to_value(event).unwrap_or_else(|_| json!({}));
        if let Err(e) = self.notifications.notify(user_id, kind, payload).await {
            warn!("Notification {} to user {} failed: {}", kind, user_id, e);
        }
    }

    async fn issue_password(&self, event: &DomainEvent, owner_id: Option<i64>) {
        let booking_id = event.booking_id();
        let result = self
            .retrying("door password", event, || {
                self.lock_access.issue_for_booking(booking_id)
            })
            .await;

        match result {
            Ok(Some(_)) => {}
            Ok(None) => debug!("No lock for booking {}", booking_id),
            Err(e) => self.password_failed(booking_id, owner_id, e).await,
        }
    }

    async fn password_failed(&self, booking_id: i64, owner_id: Option<i64>, e: AppError) {
        error!(
            "Door access for booking {} could not be provisioned: {}",
            booking_id, e
        );
        if let Some(owner_id) = owner_id {
            let failure = DomainEvent::LockPasswordFailed {
                booking_id,
                owner_id,
                reason: e.to_string(),
            };
            self.notify(owner_id, NotificationKind::LockAccessFailed, &failure)
                .await;
        }
    }

    async fn revoke_password(&self, event: &DomainEvent) {
        let booking_id = event.booking_id();
        if let Err(e) = self
            .retrying("password revocation", event, || {
                self.lock_access.revoke_for_booking(booking_id)
            })
            .await
        {
            error!(
                "Door password for booking {} is still active: {}",
                booking_id, e
            );
        }
    }

    /// Perform the side effects of one event
    pub async fn handle(&self, event: DomainEvent) {
        debug!("Dispatching {}", event);

        match &event {
            DomainEvent::BookingConfirmed { owner_id, .. } => {
                self.notify(*owner_id, NotificationKind::BookingConfirmed, &event)
                    .await;
            }
            DomainEvent::BookingApproved {
                renter_id,
                owner_id,
                ..
            } => {
                self.issue_password(&event, Some(*owner_id)).await;
                self.notify(*renter_id, NotificationKind::BookingApproved, &event)
                    .await;
                self.notify(*owner_id, NotificationKind::BookingApproved, &event)
                    .await;
            }
            DomainEvent::BookingActivated { renter_id, .. } => {
                // covers an approval whose issuance failed earlier
                self.issue_password(&event, None).await;
                self.notify(*renter_id, NotificationKind::BookingStarted, &event)
                    .await;
            }
            DomainEvent::BookingCompleted {
                renter_id,
                owner_id,
                ..
            } => {
                self.revoke_password(&event).await;
                self.notify(*renter_id, NotificationKind::BookingCompleted, &event)
                    .await;
                self.notify(*owner_id, NotificationKind::BookingCompleted, &event)
                    .await;
            }
            DomainEvent::BookingRejected { renter_id, .. } => {
                self.revoke_password(&event).await;
                self.notify(*renter_id, NotificationKind::BookingRejected, &event)
                    .await;
            }
            DomainEvent::BookingCanceled {
                renter_id,
                owner_id,
                ..
            } => {
                self.revoke_password(&event).await;
                self.notify(*renter_id, NotificationKind::BookingCanceled, &event)
                    .await;
                self.notify(*owner_id, NotificationKind::BookingCanceled, &event)
                    .await;
            }
            DomainEvent::ExtensionRequested { owner_id, .. } => {
                self.notify(*owner_id, NotificationKind::ExtensionRequested, &event)
                    .await;
            }
            DomainEvent::ExtensionApproved {
                booking_id,
                renter_id,
                ..
            } => {
                let booking_id = *booking_id;
                if let Err(e) = self
                    .retrying("password extension", &event, || {
                        self.lock_access.extend_for_booking(booking_id)
                    })
                    .await
                {
                    self.password_failed(booking_id, None, e).await;
                }
                self.notify(*renter_id, NotificationKind::ExtensionApproved, &event)
                    .await;
            }
            DomainEvent::ExtensionRejected { renter_id, .. } => {
                self.notify(*renter_id, NotificationKind::ExtensionRejected, &event)
                    .await;
            }
            DomainEvent::LockPasswordFailed { owner_id, .. } => {
                self.notify(*owner_id, NotificationKind::LockAccessFailed, &event)
                    .await;
            }
        }
    }
}
