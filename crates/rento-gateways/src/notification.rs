//! Notification delivery
//!
//! Each notification is one POST to `{base}/notifications`. The event
//! dispatcher decides how often a failed delivery is retried.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use tracing::info;

use rento_core::{events::NotificationKind, traits::NotificationSink, AppResult};

use crate::{client::JsonClient, error::GatewayError};

fn envelope(user_id: i64, kind: NotificationKind, payload: Value) -> Value {
    json!({
        "user_id": user_id,
        "kind": kind,
        "payload": payload,
        "timestamp": Utc::now(),
    })
}

pub struct HttpNotificationSink {
    client: JsonClient,
}

impl HttpNotificationSink {
    pub fn new(base_url: &str, timeout_ms: u64) -> Result<Self, GatewayError> {
        Ok(Self {
            client: JsonClient::new("notification service", base_url, timeout_ms)?,
        })
    }
}

#[async_trait]
impl NotificationSink for HttpNotificationSink {
    async fn notify(&self, user_id: i64, kind: NotificationKind, payload: Value) -> AppResult<()> {
        self.client
            .post_unit("notifications", &envelope(user_id, kind, payload))
            .await?;
        Ok(())
    }
}

/// Writes notifications to the log; used when no delivery URL is configured
pub struct LogNotificationSink;

#[async_trait]
impl NotificationSink for LogNotificationSink {
    async fn notify(&self, user_id: i64, kind: NotificationKind, payload: Value) -> AppResult<()> {
        info!(user_id, kind = ?kind, %payload, "notification");
        Ok(())
    }
}
