//! Lock DTOs

use chrono::{DateTime, Utc};
use rento_core::models::LockStatus;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Manual password for a cleaner, guest or maintenance visit
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UserPasswordRequest {
    #[validate(range(min = 1))]
    pub user_id: i64,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LockStatusRequest {
    pub status: LockStatus,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LockRegisterRequest {
    #[validate(length(min = 1, max = 64, message = "Lock id is required"))]
    pub unique_id: String,

    #[validate(length(max = 100))]
    pub name: Option<String>,
}

/// `apartment_id: null` unbinds the lock
#[derive(Debug, Clone, Deserialize)]
pub struct LockBindRequest {
    pub apartment_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CanControlResponse {
    pub unique_id: String,
    pub allowed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmergencyResetResponse {
    pub unique_id: String,
    pub revoked_passwords: usize,
}
