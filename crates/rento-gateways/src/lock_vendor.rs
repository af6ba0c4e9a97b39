//! Smart-lock vendor adapter
//!
//! Calls are single attempts; retry policy belongs to the lock access
//! orchestrator, which knows whether a failure may be retried.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{info, instrument};

use rento_core::{models::LockStatus, traits::LockVendor, AppError, AppResult};

use crate::{client::JsonClient, error::GatewayError};

#[derive(Debug, Serialize)]
struct PasswordRequest<'a> {
    password: &'a str,
    /// Unix seconds, the vendor's native unit
    effective_time: i64,
    invalid_time: i64,
}

#[derive(Debug, Deserialize)]
struct PasswordResponse {
    id: String,
}

#[derive(Debug, Serialize)]
struct CommandRequest {
    code: &'static str,
    value: bool,
}

fn command_for(status: LockStatus) -> CommandRequest {
    CommandRequest {
        code: "lock_motor_state",
        value: status == LockStatus::Closed,
    }
}

fn segment(lock_unique_id: &str) -> AppResult<&str> {
    if lock_unique_id.is_empty() || lock_unique_id.contains('/') {
        return Err(AppError::Validation(format!("Invalid lock id '{}'", lock_unique_id)));
    }
    Ok(lock_unique_id)
}

pub struct HttpLockVendor {
    client: JsonClient,
}

impl HttpLockVendor {
    pub fn new(base_url: &str, timeout_ms: u64) -> Result<Self, GatewayError> {
        Ok(Self {
            client: JsonClient::new("lock vendor", base_url, timeout_ms)?,
        })
    }
}

#[async_trait]
impl LockVendor for HttpLockVendor {
    #[instrument(skip(self, password))]
    async fn set_password(
        &self,
        lock_unique_id: &str,
        password: &str,
        valid_from: DateTime<Utc>,
        valid_until: DateTime<Utc>,
    ) -> AppResult<String> {
        let request = PasswordRequest {
            password,
            effective_time: valid_from.timestamp(),
            invalid_time: valid_until.timestamp(),
        };
        let response: PasswordResponse = self
            .client
            .post(&format!("locks/{}/passwords", segment(lock_unique_id)?), &request)
            .await?;
        info!("Vendor installed password {} on lock {}", response.id, lock_unique_id);
        Ok(response.id)
    }

    #[instrument(skip(self))]
    async fn revoke_password(&self, lock_unique_id: &str, vendor_password_id: &str) -> AppResult<()> {
        let path = format!(
            "locks/{}/passwords/{}",
            segment(lock_unique_id)?,
            segment(vendor_password_id)?
        );
        match self.client.delete(&path).await {
            // already gone on the vendor side
            Err(GatewayError::HttpStatus { status: 404, .. }) => Ok(()),
            other => other.map_err(AppError::from),
        }
    }

    #[instrument(skip(self))]
    async fn set_status(&self, lock_unique_id: &str, status: LockStatus) -> AppResult<()> {
        self.client
            .post_unit(
                &format!("locks/{}/commands", segment(lock_unique_id)?),
                &command_for(status),
            )
            .await?;
        Ok(())
    }
}

/// Local stand-in used when no vendor URL is configured
#[derive(Default)]
pub struct SimulatedLockVendor {
    next_id: AtomicU64,
}

#[async_trait]
impl LockVendor for SimulatedLockVendor {
    async fn set_password(
        &self,
        lock_unique_id: &str,
        _password: &str,
        valid_from: DateTime<Utc>,
        valid_until: DateTime<Utc>,
    ) -> AppResult<String> {
        let id = format!("sim-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        info!(
            "Simulated password {} on lock {} ({} .. {})",
            id, lock_unique_id, valid_from, valid_until
        );
        Ok(id)
    }

    async fn revoke_password(&self, lock_unique_id: &str, vendor_password_id: &str) -> AppResult<()> {
        info!("Simulated revoke of {} on lock {}", vendor_password_id, lock_unique_id);
        Ok(())
    }

    async fn set_status(&self, lock_unique_id: &str, status: LockStatus) -> AppResult<()> {
        info!("Simulated lock {} set {}", lock_unique_id, status);
        Ok(())
    }
}
