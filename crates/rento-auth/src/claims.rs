//! Token payload

use chrono::{Duration, Utc};
use rento_core::models::{Actor, UserRole};
use serde::{Deserialize, Serialize};

/// Value of the `iss` claim on every token this service signs
pub const ISSUER: &str = "rento";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Claims {
    /// User id
    pub sub: i64,
    pub role: UserRole,
    pub iss: String,
    pub iat: i64,
    /// Unix seconds; zero means "use the signer's default lifetime"
    pub exp: i64,
}

impl Claims {
    pub fn new(user_id: i64, role: UserRole) -> Self {
        Self {
            sub: user_id,
            role,
            iss: ISSUER.to_string(),
            iat: Utc::now().timestamp(),
            exp: 0,
        }
    }

    /// Claims that lapse `expires_in_secs` from now (negative for already lapsed)
    pub fn with_expiration(user_id: i64, role: UserRole, expires_in_secs: i64) -> Self {
        let mut claims = Self::new(user_id, role);
        claims.exp = (Utc::now() + Duration::seconds(expires_in_secs)).timestamp();
        claims
    }

    pub fn expires_at(&self) -> Option<chrono::DateTime<Utc>> {
        chrono::DateTime::from_timestamp(self.exp, 0).filter(|_| self.exp > 0)
    }

    pub fn actor(&self) -> Actor {
        Actor::new(self.sub, self.role)
    }
}
