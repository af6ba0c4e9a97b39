//! Rento Gateways
//!
//! HTTP adapters for the collaborators the booking core talks to:
//! payment provider, smart-lock vendor and notification delivery.
//! Each falls back to a local stand-in when its URL is not configured.

pub mod client;
pub mod error;
pub mod lock_vendor;
pub mod notification;
pub mod payment;

use std::sync::Arc;
use tracing::{info, warn};

use rento_core::{
    config::GatewayConfig,
    traits::{LockVendor, NotificationSink, PaymentGateway},
    AppError, AppResult,
};

pub use error::GatewayError;
pub use lock_vendor::{HttpLockVendor, SimulatedLockVendor};
pub use notification::{HttpNotificationSink, LogNotificationSink};
pub use payment::{HttpPaymentGateway, UnconfiguredPaymentGateway};

/// Wired collaborator set
#[derive(Clone)]
pub struct Gateways {
    pub payments: Arc<dyn PaymentGateway>,
    pub lock_vendor: Arc<dyn LockVendor>,
    pub notifications: Arc<dyn NotificationSink>,
}

fn build_error(err: GatewayError) -> AppError {
    AppError::Config(format!("Failed to build HTTP client: {}", err))
}

impl Gateways {
    pub fn from_config(config: &GatewayConfig) -> AppResult<Self> {
        let timeout = config.timeout_ms;

        let payments: Arc<dyn PaymentGateway> = match &config.payment_url {
            Some(url) => {
                info!("Payment gateway: {}", url);
                Arc::new(HttpPaymentGateway::new(url, timeout).map_err(build_error)?)
            }
            None => {
                warn!("No payment gateway configured; payments can only be approved manually");
                Arc::new(UnconfiguredPaymentGateway)
            }
        };

        let lock_vendor: Arc<dyn LockVendor> = match &config.lock_vendor_url {
            Some(url) => {
                info!("Lock vendor: {}", url);
                Arc::new(HttpLockVendor::new(url, timeout).map_err(build_error)?)
            }
            None => {
                warn!("No lock vendor configured; using simulated locks");
                Arc::new(SimulatedLockVendor::default())
            }
        };

        let notifications: Arc<dyn NotificationSink> = match &config.notification_url {
            Some(url) => Arc::new(HttpNotificationSink::new(url, timeout).map_err(build_error)?),
            None => Arc::new(LogNotificationSink),
        };

        Ok(Self {
            payments,
            lock_vendor,
            notifications,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rento_core::models::LockStatus;

    #[tokio::test]
    async fn test_unset_urls_fall_back_to_local_stand_ins() {
        let gateways = Gateways::from_config(&GatewayConfig::default()).unwrap();

        assert!(gateways.payments.check_status("x").await.is_err());
        assert!(gateways
            .lock_vendor
            .set_status("lock-1", LockStatus::Closed)
            .await
            .is_ok());
    }
}
