//! Platform settings backed by the `platform_settings` table

use async_trait::async_trait;
use rento_core::{traits::PlatformSettings, AppResult};
use sqlx::PgPool;
use tracing::{instrument, warn};

use super::db_err;

/// Key of the service fee percentage
pub const SERVICE_FEE_PERCENT_KEY: &str = "service_fee_percent";

/// PostgreSQL implementation of PlatformSettings
pub struct PgPlatformSettings {
    pool: PgPool,
}

impl PgPlatformSettings {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Upsert the service fee percentage
    #[instrument(skip(self))]
    pub async fn set_service_fee_percent(&self, percent: u32) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO platform_settings (key, value)
            VALUES ($1, $2)
            ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, updated_at = NOW()
            "#,
        )
        .bind(SERVICE_FEE_PERCENT_KEY)
        .bind(percent.to_string())
        .execute(&self.pool)
        .await
        .map_err(db_err("store service fee setting"))?;

        Ok(())
    }
}

#[async_trait]
impl PlatformSettings for PgPlatformSettings {
    #[instrument(skip(self))]
    async fn service_fee_percent(&self) -> AppResult<Option<u32>> {
        let value: Option<(String,)> =
            sqlx::query_as("SELECT value FROM platform_settings WHERE key = $1")
                .bind(SERVICE_FEE_PERCENT_KEY)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err("read service fee setting"))?;

        Ok(value.and_then(|(raw,)| match raw.trim().parse::<u32>() {
            Ok(percent) => Some(percent),
            Err(_) => {
                warn!(value = %raw, "Ignoring malformed service fee setting");
                None
            }
        }))
    }
}
