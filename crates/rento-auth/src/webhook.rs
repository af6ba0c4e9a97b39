//! Signature check for vendor webhooks
//!
//! The lock vendor signs each telemetry push with HMAC-SHA256 over the raw
//! request body, hex encoded in [`SIGNATURE_HEADER`] (an optional `sha256=`
//! prefix is accepted). Without a configured secret every push is refused.

use hmac::{Hmac, Mac};
use rento_core::error::AppError;
use sha2::Sha256;
use std::sync::Arc;
use tracing::warn;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "X-Rento-Signature";

#[derive(Clone, Default)]
pub struct WebhookVerifier {
    secret: Option<Arc<[u8]>>,
}

impl WebhookVerifier {
    /// Empty secrets count as unset
    pub fn new(secret: Option<&str>) -> Self {
        Self {
            secret: secret
                .filter(|s| !s.is_empty())
                .map(|s| Arc::from(s.as_bytes())),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.secret.is_some()
    }

    /// Hex signature for `body`; what the vendor is expected to send
    pub fn sign(&self, body: &[u8]) -> Option<String> {
        let mut mac = self.mac()?;
        mac.update(body);
        Some(
            mac.finalize()
                .into_bytes()
                .iter()
                .map(|b| format!("{b:02x}"))
                .collect(),
        )
    }

    /// Accept `body` only with a matching signature (compared in constant time)
    pub fn verify(&self, body: &[u8], signature: Option<&str>) -> Result<(), AppError> {
        let Some(mut mac) = self.mac() else {
            warn!("Webhook refused: no signing secret configured");
            return Err(AppError::Unauthorized("webhook signing is not configured".to_string()));
        };
        let Some(signature) = signature else {
            return Err(AppError::Unauthorized("missing webhook signature".to_string()));
        };

        let hex = signature.trim();
        let hex = hex.strip_prefix("sha256=").unwrap_or(hex);
        let expected = decode_hex(hex)
            .ok_or_else(|| AppError::Unauthorized("malformed webhook signature".to_string()))?;

        mac.update(body);
        mac.verify_slice(&expected).map_err(|_| {
            warn!("Webhook refused: signature mismatch");
            AppError::Unauthorized("invalid webhook signature".to_string())
        })
    }

    fn mac(&self) -> Option<HmacSha256> {
        let secret = self.secret.as_deref()?;
        HmacSha256::new_from_slice(secret).ok()
    }
}

impl std::fmt::Debug for WebhookVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookVerifier")
            .field("configured", &self.is_configured())
            .finish()
    }
}

fn decode_hex(hex: &str) -> Option<Vec<u8>> {
    if hex.len() % 2 != 0 || !hex.is_ascii() {
        return None;
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).ok())
        .collect()
}
