//! Booking extension repository implementation

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rento_core::{
    models::{BookingExtension, ExtensionStatus, NewExtension},
    traits::{ExtensionRepository, Repository},
    AppError, AppResult,
};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres};
use tracing::{instrument, warn};

use super::db_err;

macro_rules! extension_columns {
    () => {
        "id, booking_id, requested_duration, status, base_price, service_fee, price, \
         order_id, payment_id, reject_reason, created_at, updated_at, decided_at"
    };
}

/// PostgreSQL implementation of ExtensionRepository
pub struct PgExtensionRepository {
    pool: PgPool,
}

impl PgExtensionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Repository<BookingExtension, i64> for PgExtensionRepository {
    #[instrument(skip(self))]
    async fn find_by_id(&self, id: i64) -> AppResult<Option<BookingExtension>> {
        let row = sqlx::query_as::<Postgres, ExtensionRow>(concat!(
            "SELECT ",
            extension_columns!(),
            " FROM booking_extensions WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err("find extension"))?;

        Ok(row.map(Into::into))
    }

    async fn find_all(&self, limit: i64, offset: i64) -> AppResult<Vec<BookingExtension>> {
        let rows = sqlx::query_as::<Postgres, ExtensionRow>(concat!(
            "SELECT ",
            extension_columns!(),
            " FROM booking_extensions ORDER BY created_at DESC LIMIT $1 OFFSET $2"
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err("list extensions"))?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn count(&self) -> AppResult<i64> {
        let result: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM booking_extensions")
            .fetch_one(&self.pool)
            .await
            .map_err(db_err("count extensions"))?;

        Ok(result.0)
    }
}

#[async_trait]
impl ExtensionRepository for PgExtensionRepository {
    #[instrument(skip(self, extension), fields(booking_id = extension.booking_id))]
    async fn create_open(&self, extension: NewExtension) -> AppResult<BookingExtension> {
        let row = sqlx::query_as::<Postgres, ExtensionRow>(concat!(
            r#"
            INSERT INTO booking_extensions (
                booking_id, requested_duration, status, base_price, service_fee, price, order_id
            )
            VALUES ($1, $2, 'awaiting_payment', $3, $4, $5, $6)
            RETURNING "#,
            extension_columns!()
        ))
        .bind(extension.booking_id)
        .bind(extension.requested_duration)
        .bind(extension.base_price)
        .bind(extension.service_fee)
        .bind(extension.price)
        .bind(&extension.order_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match &e {
            // partial unique index on open extensions
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                warn!("Booking already has an open extension");
                AppError::Conflict(format!(
                    "booking {} already has a pending extension",
                    extension.booking_id
                ))
            }
            _ => db_err("create extension")(e),
        })?;

        Ok(row.into())
    }

    #[instrument(skip(self))]
    async fn find_open_for_booking(&self, booking_id: i64) -> AppResult<Option<BookingExtension>> {
        let row = sqlx::query_as::<Postgres, ExtensionRow>(concat!(
            "SELECT ",
            extension_columns!(),
            r#"
            FROM booking_extensions
            WHERE booking_id = $1 AND status IN ('created', 'awaiting_payment')
            "#
        ))
        .bind(booking_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err("find open extension"))?;

        Ok(row.map(Into::into))
    }

    #[instrument(skip(self))]
    async fn find_by_reference(&self, reference: &str) -> AppResult<Option<BookingExtension>> {
        let row = sqlx::query_as::<Postgres, ExtensionRow>(concat!(
            "SELECT ",
            extension_columns!(),
            " FROM booking_extensions WHERE order_id = $1 OR payment_id = $1 LIMIT 1"
        ))
        .bind(reference)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err("find extension by reference"))?;

        Ok(row.map(Into::into))
    }

    #[instrument(skip(self))]
    async fn list_for_booking(&self, booking_id: i64) -> AppResult<Vec<BookingExtension>> {
        let rows = sqlx::query_as::<Postgres, ExtensionRow>(concat!(
            "SELECT ",
            extension_columns!(),
            " FROM booking_extensions WHERE booking_id = $1 ORDER BY created_at"
        ))
        .bind(booking_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err("list booking extensions"))?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self, extension), fields(extension_id = extension.id))]
    async fn update_open(&self, extension: &BookingExtension) -> AppResult<BookingExtension> {
        let row = sqlx::query_as::<Postgres, ExtensionRow>(concat!(
            r#"
            UPDATE booking_extensions
            SET status = $2,
                payment_id = $3,
                reject_reason = $4,
                decided_at = $5,
                updated_at = NOW()
            WHERE id = $1 AND status IN ('created', 'awaiting_payment')
            RETURNING "#,
            extension_columns!()
        ))
        .bind(extension.id)
        .bind(extension.status.to_string())
        .bind(&extension.payment_id)
        .bind(&extension.reject_reason)
        .bind(extension.decided_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err("update extension"))?
        .ok_or_else(|| AppError::AlreadyProcessed(format!("extension {}", extension.id)))?;

        Ok(row.into())
    }
}

/// Helper struct for mapping database rows
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ExtensionRow {
    id: i64,
    booking_id: i64,
    requested_duration: i32,
    status: String,
    base_price: Decimal,
    service_fee: Decimal,
    price: Decimal,
    order_id: String,
    payment_id: Option<String>,
    reject_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    decided_at: Option<DateTime<Utc>>,
}

impl From<ExtensionRow> for BookingExtension {
    fn from(row: ExtensionRow) -> Self {
        Self {
            id: row.id,
            booking_id: row.booking_id,
            requested_duration: row.requested_duration,
            status: ExtensionStatus::from_str(&row.status).unwrap_or(ExtensionStatus::Rejected),
            base_price: row.base_price,
            service_fee: row.service_fee,
            price: row.price,
            order_id: row.order_id,
            payment_id: row.payment_id,
            reject_reason: row.reject_reason,
            created_at: row.created_at,
            updated_at: row.updated_at,
            decided_at: row.decided_at,
        }
    }
}
