//! Payment provider adapter
//!
//! The provider exposes `GET {base}/payments/{reference}` which accepts either
//! its own payment id or our order id.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{info, warn};

use rento_core::{
    traits::{PaymentGateway, PaymentStatus},
    AppError, AppResult,
};

use crate::{client::JsonClient, error::GatewayError};

#[derive(Debug, Deserialize)]
struct PaymentResponse {
    payment_id: String,
    #[serde(default)]
    order_id: Option<String>,
    amount: Decimal,
    status: String,
}

impl PaymentResponse {
    fn into_status(self) -> PaymentStatus {
        let confirmed = matches!(
            self.status.to_ascii_lowercase().as_str(),
            "paid" | "confirmed" | "succeeded" | "success"
        );
        PaymentStatus {
            payment_id: self.payment_id,
            order_id: self.order_id,
            amount: self.amount,
            confirmed,
        }
    }
}

pub struct HttpPaymentGateway {
    client: JsonClient,
}

impl HttpPaymentGateway {
    pub fn new(base_url: &str, timeout_ms: u64) -> Result<Self, GatewayError> {
        Ok(Self {
            client: JsonClient::new("payment gateway", base_url, timeout_ms)?,
        })
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    async fn check_status(&self, reference: &str) -> AppResult<PaymentStatus> {
        if reference.trim().is_empty() || reference.contains('/') {
            return Err(AppError::Validation(format!("Invalid payment reference '{}'", reference)));
        }

        let response: PaymentResponse = self.client.get(&format!("payments/{}", reference)).await?;
        let status = response.into_status();
        info!(
            "Payment {} for order {:?}: confirmed={}",
            status.payment_id, status.order_id, status.confirmed
        );
        Ok(status)
    }
}

/// Stand-in used when no payment URL is configured; every lookup fails retryably
pub struct UnconfiguredPaymentGateway;

#[async_trait]
impl PaymentGateway for UnconfiguredPaymentGateway {
    async fn check_status(&self, reference: &str) -> AppResult<PaymentStatus> {
        warn!("Payment lookup for '{}' with no gateway configured", reference);
        Err(GatewayError::NotConfigured("payment gateway").into())
    }
}
