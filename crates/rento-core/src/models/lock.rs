//! Smart lock and temporary password models

use crate::error::AppError;
use crate::AppResult;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Physical bolt state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LockStatus {
    Open,
    #[default]
    Closed,
}

impl fmt::Display for LockStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockStatus::Open => write!(f, "open"),
            LockStatus::Closed => write!(f, "closed"),
        }
    }
}

impl LockStatus {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "open" | "opened" | "unlocked" => Some(LockStatus::Open),
            "closed" | "close" | "locked" => Some(LockStatus::Closed),
            _ => None,
        }
    }
}

/// Lock entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lock {
    pub id: i64,
    /// Vendor device id
    pub unique_id: String,
    pub name: Option<String>,
    /// Unbound locks exist; rebinding is an admin action
    pub apartment_id: Option<i64>,
    pub current_status: LockStatus,
    /// Last reported connectivity; see [`Lock::is_online_at`]
    pub is_online: bool,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub battery_level: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Lock {
    /// Online iff the device said so and was heard from within `freshness`
    pub fn is_online_at(&self, now: DateTime<Utc>, freshness: Duration) -> bool {
        match self.last_heartbeat {
            Some(seen) => self.is_online && now - seen <= freshness,
            None => false,
        }
    }
}

/// Who a password was issued to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum PasswordOwner {
    Booking(i64),
    User(i64),
}

impl PasswordOwner {
    pub fn booking_id(&self) -> Option<i64> {
        match self {
            PasswordOwner::Booking(id) => Some(*id),
            PasswordOwner::User(_) => None,
        }
    }

    pub fn user_id(&self) -> Option<i64> {
        match self {
            PasswordOwner::User(id) => Some(*id),
            PasswordOwner::Booking(_) => None,
        }
    }

    /// Rebuild from the two nullable storage columns
    pub fn from_columns(booking_id: Option<i64>, user_id: Option<i64>) -> AppResult<Self> {
        match (booking_id, user_id) {
            (Some(b), None) => Ok(PasswordOwner::Booking(b)),
            (None, Some(u)) => Ok(PasswordOwner::User(u)),
            _ => Err(AppError::Internal(
                "temp password must be bound to exactly one of booking or user".to_string(),
            )),
        }
    }
}

/// Time-bounded door code
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TempPassword {
    pub id: i64,
    pub lock_id: i64,
    pub password: String,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    pub owner: PasswordOwner,
    pub is_active: bool,
    /// Id assigned by the lock vendor, needed to revoke
    pub vendor_password_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub deactivated_at: Option<DateTime<Utc>>,
}

impl TempPassword {
    /// Usable only while active and inside its validity window
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.valid_from <= now && now <= self.valid_until
    }
}

/// Input to password issuance
#[derive(Debug, Clone)]
pub struct NewTempPassword {
    pub lock_id: i64,
    pub password: String,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    pub owner: PasswordOwner,
    pub vendor_password_id: Option<String>,
}

impl NewTempPassword {
    pub fn into_password(self, id: i64, now: DateTime<Utc>) -> TempPassword {
        TempPassword {
            id,
            lock_id: self.lock_id,
            password: self.password,
            valid_from: self.valid_from,
            valid_until: self.valid_until,
            owner: self.owner,
            is_active: true,
            vendor_password_id: self.vendor_password_id,
            created_at: now,
            deactivated_at: None,
        }
    }
}

/// What a telemetry event reports
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TelemetryKind {
    Status { status: LockStatus },
    Heartbeat,
    Battery { level: i32 },
    Online,
    Offline,
}

/// Inbound device event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryEvent {
    pub unique_id: String,
    #[serde(flatten)]
    pub kind: TelemetryKind,
    pub at: DateTime<Utc>,
}

impl TelemetryEvent {
    pub fn new(unique_id: impl Into<String>, kind: TelemetryKind, at: DateTime<Utc>) -> Self {
        Self {
            unique_id: unique_id.into(),
            kind,
            at,
        }
    }

    /// Parse a vendor webhook body into zero or more events
    ///
    /// Expected shape:
    /// `{"devId": "...", "bizCode": "online", "t": 1714800000000,
    ///   "status": [{"code": "battery_percentage", "value": 80}]}`.
    /// Unknown codes are skipped.
    pub fn from_webhook(body: &Value, received_at: DateTime<Utc>) -> AppResult<Vec<Self>> {
        let unique_id = body
            .get("devId")
            .or_else(|| body.get("dev_id"))
            .and_then(Value::as_str)
            .ok_or_else(|| AppError::Validation("webhook is missing devId".to_string()))?;

        let at = body
            .get("t")
            .and_then(Value::as_i64)
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
            .unwrap_or(received_at);

        let mut events = Vec::new();

        match body.get("bizCode").and_then(Value::as_str) {
            Some("online") => events.push(Self::new(unique_id, TelemetryKind::Online, at)),
            Some("offline") => events.push(Self::new(unique_id, TelemetryKind::Offline, at)),
            Some("heartbeat") => events.push(Self::new(unique_id, TelemetryKind::Heartbeat, at)),
            _ => {}
        }

        if let Some(items) = body.get("status").and_then(Value::as_array) {
            for item in items {
                let code = item.get("code").and_then(Value::as_str).unwrap_or_default();
                let value = item.get("value");
                let kind = match code {
                    "battery_percentage" | "residual_electricity" => value
                        .and_then(Value::as_i64)
                        .map(|level| TelemetryKind::Battery {
                            level: level.clamp(0, 100) as i32,
                        }),
                    "lock_motor_state" => value.and_then(Value::as_bool).map(|locked| {
                        TelemetryKind::Status {
                            status: if locked {
                                LockStatus::Closed
                            } else {
                                LockStatus::Open
                            },
                        }
                    }),
                    "door_status" | "lock_status" => value
                        .and_then(Value::as_str)
                        .and_then(LockStatus::from_str)
                        .map(|status| TelemetryKind::Status { status }),
                    "heartbeat" => Some(TelemetryKind::Heartbeat),
                    _ => None,
                };
                if let Some(kind) = kind {
                    events.push(Self::new(unique_id, kind, at));
                }
            }
        }

        Ok(events)
    }
}
