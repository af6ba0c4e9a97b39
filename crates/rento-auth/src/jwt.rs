//! HS256 token signing and verification

use crate::claims::{Claims, ISSUER};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation};
use rento_core::error::AppError;
use rento_core::models::{Actor, UserRole};
use tracing::{debug, error, warn};

/// Signs and verifies bearer tokens with a shared secret
#[derive(Clone)]
pub struct JwtService {
    expiration_secs: i64,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtService {
    pub fn new(secret: &str, expiration_secs: i64) -> Self {
        let mut validation = Validation::default();
        validation.leeway = 0;
        validation.set_issuer(&[ISSUER]);
        validation.set_required_spec_claims(&["exp", "sub", "iss"]);

        Self {
            expiration_secs,
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    /// Sign `claims`; an unset `exp` gets the configured lifetime
    pub fn create_token(&self, claims: &Claims) -> Result<String, AppError> {
        let mut claims = claims.clone();
        if claims.exp == 0 {
            claims.exp = (Utc::now() + Duration::seconds(self.expiration_secs)).timestamp();
        }

        encode(&Header::default(), &claims, &self.encoding_key)
            .map(|token| {
                debug!(user_id = claims.sub, role = %claims.role, exp = claims.exp, "Token issued");
                token
            })
            .map_err(|e| {
                error!(error = %e, "Token signing failed");
                AppError::InvalidToken(format!("cannot sign token: {}", e))
            })
    }

    pub fn create_token_for_user(&self, user_id: i64, role: UserRole) -> Result<String, AppError> {
        self.create_token(&Claims::new(user_id, role))
    }

    /// Verify signature, issuer and expiry
    ///
    /// Lapsed tokens yield `TokenExpired`; anything else malformed or
    /// foreign yields `InvalidToken`.
    pub fn validate_token(&self, token: &str) -> Result<Claims, AppError> {
        match decode::<Claims>(token, &self.decoding_key, &self.validation) {
            Ok(data) => Ok(data.claims),
            Err(e) if matches!(e.kind(), ErrorKind::ExpiredSignature) => {
                debug!("Rejected lapsed token");
                Err(AppError::TokenExpired)
            }
            Err(e) => {
                warn!(error = %e, "Rejected token");
                Err(AppError::InvalidToken(e.to_string()))
            }
        }
    }

    /// Resolve a bearer token straight to the calling actor
    pub fn authenticate(&self, token: &str) -> Result<Actor, AppError> {
        self.validate_token(token).map(|claims| claims.actor())
    }

    pub fn expiration_secs(&self) -> i64 {
        self.expiration_secs
    }
}

impl std::fmt::Debug for JwtService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtService")
            .field("expiration_secs", &self.expiration_secs)
            .finish_non_exhaustive()
    }
}
