//! Apartment repository implementation

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rento_core::{
    models::{Apartment, ApartmentStatus},
    traits::{ApartmentRepository, Repository},
    AppResult,
};
use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::{debug, instrument};

use super::db_err;

/// PostgreSQL implementation of ApartmentRepository
pub struct PgApartmentRepository {
    pool: PgPool,
}

impl PgApartmentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Repository<Apartment, i64> for PgApartmentRepository {
    #[instrument(skip(self))]
    async fn find_by_id(&self, id: i64) -> AppResult<Option<Apartment>> {
        let row = sqlx::query_as::<sqlx::Postgres, ApartmentRow>(
            r#"
            SELECT id, owner_id, title, rental_type_hourly, rental_type_daily,
                   hourly_price, daily_price, is_free, status, created_at, updated_at
            FROM apartments
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err("find apartment"))?;

        Ok(row.map(Into::into))
    }

    #[instrument(skip(self))]
    async fn find_all(&self, limit: i64, offset: i64) -> AppResult<Vec<Apartment>> {
        let rows = sqlx::query_as::<sqlx::Postgres, ApartmentRow>(
            r#"
            SELECT id, owner_id, title, rental_type_hourly, rental_type_daily,
                   hourly_price, daily_price, is_free, status, created_at, updated_at
            FROM apartments
            ORDER BY id
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err("list apartments"))?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn count(&self) -> AppResult<i64> {
        let result: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM apartments")
            .fetch_one(&self.pool)
            .await
            .map_err(db_err("count apartments"))?;

        Ok(result.0)
    }
}

#[async_trait]
impl ApartmentRepository for PgApartmentRepository {
    #[instrument(skip(self, apartment))]
    async fn create(&self, apartment: &Apartment) -> AppResult<Apartment> {
        debug!(owner_id = apartment.owner_id, "Creating apartment");

        let row = sqlx::query_as::<sqlx::Postgres, ApartmentRow>(
            r#"
            INSERT INTO apartments (
                owner_id, title, rental_type_hourly, rental_type_daily,
                hourly_price, daily_price, is_free, status
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id, owner_id, title, rental_type_hourly, rental_type_daily,
                      hourly_price, daily_price, is_free, status, created_at, updated_at
            "#,
        )
        .bind(apartment.owner_id)
        .bind(&apartment.title)
        .bind(apartment.rental_type_hourly)
        .bind(apartment.rental_type_daily)
        .bind(apartment.hourly_price)
        .bind(apartment.daily_price)
        .bind(apartment.is_free)
        .bind(apartment.status.to_string())
        .fetch_one(&self.pool)
        .await
        .map_err(db_err("create apartment"))?;

        Ok(row.into())
    }

    #[instrument(skip(self))]
    async fn set_free(&self, id: i64, is_free: bool) -> AppResult<()> {
        sqlx::query("UPDATE apartments SET is_free = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(is_free)
            .execute(&self.pool)
            .await
            .map_err(db_err("update apartment availability"))?;

        Ok(())
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ApartmentRow {
    id: i64,
    owner_id: i64,
    title: String,
    rental_type_hourly: bool,
    rental_type_daily: bool,
    hourly_price: Decimal,
    daily_price: Decimal,
    is_free: bool,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ApartmentRow> for Apartment {
    fn from(row: ApartmentRow) -> Self {
        Self {
            id: row.id,
            owner_id: row.owner_id,
            title: row.title,
            rental_type_hourly: row.rental_type_hourly,
            rental_type_daily: row.rental_type_daily,
            hourly_price: row.hourly_price,
            daily_price: row.daily_price,
            is_free: row.is_free,
            // unknown statuses are treated as not bookable
            status: ApartmentStatus::from_str(&row.status).unwrap_or(ApartmentStatus::Blocked),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}
