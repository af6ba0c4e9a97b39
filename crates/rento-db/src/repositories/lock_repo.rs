//! Lock repository implementation

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rento_core::{
    models::{Lock, LockStatus},
    traits::{LockRepository, Repository},
    AppError, AppResult,
};
use sqlx::{PgPool, Postgres};
use tracing::{debug, instrument};

use super::db_err;

/// PostgreSQL implementation of LockRepository
pub struct PgLockRepository {
    pool: PgPool,
}

impl PgLockRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Repository<Lock, i64> for PgLockRepository {
    #[instrument(skip(self))]
    async fn find_by_id(&self, id: i64) -> AppResult<Option<Lock>> {
        let row = sqlx::query_as::<Postgres, LockRow>(
            r#"
            SELECT id, unique_id, name, apartment_id, current_status, is_online,
                   last_heartbeat, battery_level, created_at, updated_at
            FROM locks
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err("find lock"))?;

        Ok(row.map(Into::into))
    }

    async fn find_all(&self, limit: i64, offset: i64) -> AppResult<Vec<Lock>> {
        let rows = sqlx::query_as::<Postgres, LockRow>(
            r#"
            SELECT id, unique_id, name, apartment_id, current_status, is_online,
                   last_heartbeat, battery_level, created_at, updated_at
            FROM locks
            ORDER BY id
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err("list locks"))?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn count(&self) -> AppResult<i64> {
        let result: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM locks")
            .fetch_one(&self.pool)
            .await
            .map_err(db_err("count locks"))?;

        Ok(result.0)
    }
}

#[async_trait]
impl LockRepository for PgLockRepository {
    #[instrument(skip(self, lock), fields(unique_id = %lock.unique_id))]
    async fn create(&self, lock: &Lock) -> AppResult<Lock> {
        let row = sqlx::query_as::<Postgres, LockRow>(
            r#"
            INSERT INTO locks (unique_id, name, apartment_id, current_status, is_online,
                               last_heartbeat, battery_level)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, unique_id, name, apartment_id, current_status, is_online,
                      last_heartbeat, battery_level, created_at, updated_at
            "#,
        )
        .bind(&lock.unique_id)
        .bind(&lock.name)
        .bind(lock.apartment_id)
        .bind(lock.current_status.to_string())
        .bind(lock.is_online)
        .bind(lock.last_heartbeat)
        .bind(lock.battery_level)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                AppError::Conflict(format!("lock {} already registered", lock.unique_id))
            }
            _ => db_err("create lock")(e),
        })?;

        Ok(row.into())
    }

    #[instrument(skip(self))]
    async fn find_by_unique_id(&self, unique_id: &str) -> AppResult<Option<Lock>> {
        let row = sqlx::query_as::<Postgres, LockRow>(
            r#"
            SELECT id, unique_id, name, apartment_id, current_status, is_online,
                   last_heartbeat, battery_level, created_at, updated_at
            FROM locks
            WHERE unique_id = $1
            "#,
        )
        .bind(unique_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err("find lock by unique id"))?;

        Ok(row.map(Into::into))
    }

    #[instrument(skip(self))]
    async fn find_by_apartment(&self, apartment_id: i64) -> AppResult<Option<Lock>> {
        let row = sqlx::query_as::<Postgres, LockRow>(
            r#"
            SELECT id, unique_id, name, apartment_id, current_status, is_online,
                   last_heartbeat, battery_level, created_at, updated_at
            FROM locks
            WHERE apartment_id = $1
            "#,
        )
        .bind(apartment_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err("find lock by apartment"))?;

        Ok(row.map(Into::into))
    }

    #[instrument(skip(self, lock), fields(lock_id = lock.id))]
    async fn update(&self, lock: &Lock) -> AppResult<Lock> {
        debug!(status = %lock.current_status, online = lock.is_online, "Updating lock state");

        let row = sqlx::query_as::<Postgres, LockRow>(
            r#"
            UPDATE locks
            SET current_status = $2,
                is_online = $3,
                last_heartbeat = $4,
                battery_level = $5,
                name = $6,
                updated_at = NOW()
            WHERE id = $1
            RETURNING id, unique_id, name, apartment_id, current_status, is_online,
                      last_heartbeat, battery_level, created_at, updated_at
            "#,
        )
        .bind(lock.id)
        .bind(lock.current_status.to_string())
        .bind(lock.is_online)
        .bind(lock.last_heartbeat)
        .bind(lock.battery_level)
        .bind(&lock.name)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err("update lock"))?
        .ok_or_else(|| AppError::LockNotFound(lock.unique_id.clone()))?;

        Ok(row.into())
    }

    #[instrument(skip(self))]
    async fn bind(&self, lock_id: i64, apartment_id: Option<i64>) -> AppResult<Lock> {
        let row = sqlx::query_as::<Postgres, LockRow>(
            r#"
            UPDATE locks
            SET apartment_id = $2,
                updated_at = NOW()
            WHERE id = $1
            RETURNING id, unique_id, name, apartment_id, current_status, is_online,
                      last_heartbeat, battery_level, created_at, updated_at
            "#,
        )
        .bind(lock_id)
        .bind(apartment_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => AppError::Conflict(
                format!("apartment {:?} already has a lock", apartment_id),
            ),
            _ => db_err("bind lock")(e),
        })?
        .ok_or_else(|| AppError::LockNotFound(lock_id.to_string()))?;

        Ok(row.into())
    }
}

#[derive(Debug, sqlx::FromRow)]
struct LockRow {
    id: i64,
    unique_id: String,
    name: Option<String>,
    apartment_id: Option<i64>,
    current_status: String,
    is_online: bool,
    last_heartbeat: Option<DateTime<Utc>>,
    battery_level: Option<i32>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<LockRow> for Lock {
    fn from(row: LockRow) -> Self {
        Self {
            id: row.id,
            unique_id: row.unique_id,
            name: row.name,
            apartment_id: row.apartment_id,
            current_status: LockStatus::from_str(&row.current_status).unwrap_or_default(),
            is_online: row.is_online,
            last_heartbeat: row.last_heartbeat,
            battery_level: row.battery_level,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}
