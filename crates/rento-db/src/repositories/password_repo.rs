//! Temporary password repository implementation

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rento_core::{
    models::{NewTempPassword, PasswordOwner, TempPassword},
    traits::{Repository, TempPasswordRepository},
    AppError, AppResult,
};
use sqlx::{PgPool, Postgres};
use tracing::{error, instrument};

use super::db_err;

macro_rules! password_columns {
    () => {
        "id, lock_id, password, valid_from, valid_until, booking_id, user_id, is_active, \
         vendor_password_id, created_at, deactivated_at"
    };
}

/// PostgreSQL implementation of TempPasswordRepository
pub struct PgTempPasswordRepository {
    pool: PgPool,
}

impl PgTempPasswordRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn convert(rows: Vec<PasswordRow>) -> AppResult<Vec<TempPassword>> {
        rows.into_iter().map(TryInto::try_into).collect()
    }
}

#[async_trait]
impl Repository<TempPassword, i64> for PgTempPasswordRepository {
    #[instrument(skip(self))]
    async fn find_by_id(&self, id: i64) -> AppResult<Option<TempPassword>> {
        let row = sqlx::query_as::<Postgres, PasswordRow>(concat!(
            "SELECT ",
            password_columns!(),
            " FROM temp_passwords WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err("find temp password"))?;

        row.map(TryInto::try_into).transpose()
    }

    async fn find_all(&self, limit: i64, offset: i64) -> AppResult<Vec<TempPassword>> {
        let rows = sqlx::query_as::<Postgres, PasswordRow>(concat!(
            "SELECT ",
            password_columns!(),
            " FROM temp_passwords ORDER BY id DESC LIMIT $1 OFFSET $2"
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err("list temp passwords"))?;

        Self::convert(rows)
    }

    async fn count(&self) -> AppResult<i64> {
        let result: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM temp_passwords")
            .fetch_one(&self.pool)
            .await
            .map_err(db_err("count temp passwords"))?;

        Ok(result.0)
    }
}

#[async_trait]
impl TempPasswordRepository for PgTempPasswordRepository {
    #[instrument(skip(self, password), fields(lock_id = password.lock_id))]
    async fn create(&self, password: NewTempPassword) -> AppResult<TempPassword> {
        let row = sqlx::query_as::<Postgres, PasswordRow>(concat!(
            r#"
            INSERT INTO temp_passwords (
                lock_id, password, valid_from, valid_until, booking_id, user_id,
                is_active, vendor_password_id
            )
            VALUES ($1, $2, $3, $4, $5, $6, TRUE, $7)
            RETURNING "#,
            password_columns!()
        ))
        .bind(password.lock_id)
        .bind(&password.password)
        .bind(password.valid_from)
        .bind(password.valid_until)
        .bind(password.owner.booking_id())
        .bind(password.owner.user_id())
        .bind(&password.vendor_password_id)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err("create temp password"))?;

        row.try_into()
    }

    #[instrument(skip(self))]
    async fn find_active_for_booking(&self, booking_id: i64) -> AppResult<Option<TempPassword>> {
        let row = sqlx::query_as::<Postgres, PasswordRow>(concat!(
            "SELECT ",
            password_columns!(),
            " FROM temp_passwords WHERE booking_id = $1 AND is_active ORDER BY id DESC LIMIT 1"
        ))
        .bind(booking_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err("find booking password"))?;

        row.map(TryInto::try_into).transpose()
    }

    #[instrument(skip(self))]
    async fn list_active_for_lock(&self, lock_id: i64) -> AppResult<Vec<TempPassword>> {
        let rows = sqlx::query_as::<Postgres, PasswordRow>(concat!(
            "SELECT ",
            password_columns!(),
            " FROM temp_passwords WHERE lock_id = $1 AND is_active ORDER BY id"
        ))
        .bind(lock_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err("list lock passwords"))?;

        Self::convert(rows)
    }

    #[instrument(skip(self))]
    async fn list_active_for_user(&self, user_id: i64) -> AppResult<Vec<TempPassword>> {
        let rows = sqlx::query_as::<Postgres, PasswordRow>(concat!(
            "SELECT ",
            password_columns!(),
            " FROM temp_passwords WHERE user_id = $1 AND is_active ORDER BY id"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err("list user passwords"))?;

        Self::convert(rows)
    }

    #[instrument(skip(self, password), fields(password_id = password.id))]
    async fn update(&self, password: &TempPassword) -> AppResult<TempPassword> {
        let row = sqlx::query_as::<Postgres, PasswordRow>(concat!(
            r#"
            UPDATE temp_passwords
            SET valid_from = $2,
                valid_until = $3,
                is_active = $4,
                vendor_password_id = $5,
                deactivated_at = $6
            WHERE id = $1
            RETURNING "#,
            password_columns!()
        ))
        .bind(password.id)
        .bind(password.valid_from)
        .bind(password.valid_until)
        .bind(password.is_active)
        .bind(&password.vendor_password_id)
        .bind(password.deactivated_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err("update temp password"))?
        .ok_or_else(|| AppError::NotFound(format!("temp password {}", password.id)))?;

        row.try_into()
    }

    #[instrument(skip(self))]
    async fn deactivate_for_booking(
        &self,
        booking_id: i64,
        at: DateTime<Utc>,
    ) -> AppResult<Vec<TempPassword>> {
        let rows = sqlx::query_as::<Postgres, PasswordRow>(concat!(
            r#"
            UPDATE temp_passwords
            SET is_active = FALSE, deactivated_at = $2
            WHERE booking_id = $1 AND is_active
            RETURNING "#,
            password_columns!()
        ))
        .bind(booking_id)
        .bind(at)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err("deactivate booking passwords"))?;

        Self::convert(rows)
    }

    #[instrument(skip(self))]
    async fn deactivate_for_lock(
        &self,
        lock_id: i64,
        at: DateTime<Utc>,
    ) -> AppResult<Vec<TempPassword>> {
        let rows = sqlx::query_as::<Postgres, PasswordRow>(concat!(
            r#"
            UPDATE temp_passwords
            SET is_active = FALSE, deactivated_at = $2
            WHERE lock_id = $1 AND is_active
            RETURNING "#,
            password_columns!()
        ))
        .bind(lock_id)
        .bind(at)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err("deactivate lock passwords"))?;

        Self::convert(rows)
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PasswordRow {
    id: i64,
    lock_id: i64,
    password: String,
    valid_from: DateTime<Utc>,
    valid_until: DateTime<Utc>,
    booking_id: Option<i64>,
    user_id: Option<i64>,
    is_active: bool,
    vendor_password_id: Option<String>,
    created_at: DateTime<Utc>,
    deactivated_at: Option<DateTime<Utc>>,
}

impl TryFrom<PasswordRow> for TempPassword {
    type Error = AppError;

    fn try_from(row: PasswordRow) -> Result<Self, Self::Error> {
        let owner = PasswordOwner::from_columns(row.booking_id, row.user_id).map_err(|e| {
            error!(password_id = row.id, "Corrupt temp password binding");
            e
        })?;

        Ok(Self {
            id: row.id,
            lock_id: row.lock_id,
            password: row.password,
            valid_from: row.valid_from,
            valid_until: row.valid_until,
            owner,
            is_active: row.is_active,
            vendor_password_id: row.vendor_password_id,
            created_at: row.created_at,
            deactivated_at: row.deactivated_at,
        })
    }
}
