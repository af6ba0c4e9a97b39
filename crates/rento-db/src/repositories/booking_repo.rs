//! Booking repository implementation
//!
//! Window-occupying writes run in a transaction that first locks the
//! apartment row (`SELECT ... FOR UPDATE`), so the overlap check and the write
//! are serialized per apartment. Status changes are guarded by
//! `WHERE status = $expected`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rento_core::{
    models::{
        Booking, BookingExtension, BookingStatus, DoorStatus, ExtensionStatus, NewBooking,
        RefundPolicy,
    },
    traits::{BookingRepository, Repository},
    AppError, AppResult,
};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{debug, instrument, warn};

use super::db_err;
use super::extension_repo::ExtensionRow;

macro_rules! booking_columns {
    () => {
        "id, apartment_id, renter_id, booking_number, start_date, end_date, duration, \
         cleaning_minutes, status, total_price, service_fee, final_price, payment_id, \
         door_status, extension_requested, extension_duration, extension_price, \
         cancellation_reason, owner_comment, refund_policy, refund_amount, \
         created_at, updated_at, paid_at, finished_at"
    };
}

/// PostgreSQL implementation of BookingRepository
pub struct PgBookingRepository {
    pool: PgPool,
}

impl PgBookingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn occupying_statuses() -> Vec<String> {
        BookingStatus::OCCUPYING
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    /// Lock the apartment row for the rest of the transaction
    async fn lock_apartment(tx: &mut Transaction<'_, Postgres>, apartment_id: i64) -> AppResult<()> {
        let locked: Option<(i64,)> =
            sqlx::query_as("SELECT id FROM apartments WHERE id = $1 FOR UPDATE")
                .bind(apartment_id)
                .fetch_optional(&mut **tx)
                .await
                .map_err(db_err("lock apartment"))?;

        locked
            .map(|_| ())
            .ok_or_else(|| AppError::ApartmentNotFound(apartment_id.to_string()))
    }

    /// Count occupying bookings that collide with `[start, end)` plus cleaning
    async fn count_overlaps(
        tx: &mut Transaction<'_, Postgres>,
        apartment_id: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        cleaning_minutes: i32,
        exclude_id: Option<i64>,
    ) -> AppResult<i64> {
        let (count,): (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*)
            FROM bookings
            WHERE apartment_id = $1
              AND status = ANY($2)
              AND start_date < $4 + make_interval(mins => $5)
              AND end_date + make_interval(mins => cleaning_minutes) > $3
              AND ($6::BIGINT IS NULL OR id <> $6)
            "#,
        )
        .bind(apartment_id)
        .bind(Self::occupying_statuses())
        .bind(start)
        .bind(end)
        .bind(cleaning_minutes)
        .bind(exclude_id)
        .fetch_one(&mut **tx)
        .await
        .map_err(db_err("check booking overlap"))?;

        Ok(count)
    }

    /// Guarded update of every mutable column except `door_status`
    async fn update_guarded(
        tx: &mut Transaction<'_, Postgres>,
        booking: &Booking,
        expected: BookingStatus,
    ) -> AppResult<Option<BookingRow>> {
        sqlx::query_as::<Postgres, BookingRow>(concat!(
            r#"
            UPDATE bookings
            SET start_date = $3,
                end_date = $4,
                duration = $5,
                status = $6,
                payment_id = $7,
                extension_requested = $8,
                extension_duration = $9,
                extension_price = $10,
                cancellation_reason = $11,
                owner_comment = $12,
                refund_policy = $13,
                refund_amount = $14,
                paid_at = $15,
                finished_at = $16,
                updated_at = NOW()
            WHERE id = $1 AND status = $2
            RETURNING "#,
            booking_columns!()
        ))
        .bind(booking.id)
        .bind(expected.to_string())
        .bind(booking.start_date)
        .bind(booking.end_date)
        .bind(booking.duration)
        .bind(booking.status.to_string())
        .bind(&booking.payment_id)
        .bind(booking.extension_requested)
        .bind(booking.extension_duration)
        .bind(booking.extension_price)
        .bind(&booking.cancellation_reason)
        .bind(&booking.owner_comment)
        .bind(booking.refund_policy.map(|p| p.to_string()))
        .bind(booking.refund_amount)
        .bind(booking.paid_at)
        .bind(booking.finished_at)
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                warn!(booking_id = booking.id, "Payment id already used by another booking");
                AppError::DuplicatePayment(booking.payment_id.clone().unwrap_or_default())
            }
            _ => db_err("update booking")(e),
        })
    }

    fn stale(booking: &Booking, expected: BookingStatus) -> AppError {
        AppError::Conflict(format!(
            "booking {} is no longer {}",
            booking.id, expected
        ))
    }
}

#[async_trait]
impl Repository<Booking, i64> for PgBookingRepository {
    #[instrument(skip(self))]
    async fn find_by_id(&self, id: i64) -> AppResult<Option<Booking>> {
        let row = sqlx::query_as::<Postgres, BookingRow>(concat!(
            "SELECT ",
            booking_columns!(),
            " FROM bookings WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err("find booking"))?;

        Ok(row.map(Into::into))
    }

    #[instrument(skip(self))]
    async fn find_all(&self, limit: i64, offset: i64) -> AppResult<Vec<Booking>> {
        let rows = sqlx::query_as::<Postgres, BookingRow>(concat!(
            "SELECT ",
            booking_columns!(),
            " FROM bookings ORDER BY created_at DESC LIMIT $1 OFFSET $2"
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err("list bookings"))?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn count(&self) -> AppResult<i64> {
        let result: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM bookings")
            .fetch_one(&self.pool)
            .await
            .map_err(db_err("count bookings"))?;

        Ok(result.0)
    }
}

#[async_trait]
impl BookingRepository for PgBookingRepository {
    #[instrument(skip(self, booking), fields(apartment_id = booking.apartment_id))]
    async fn create_if_available(&self, booking: NewBooking) -> AppResult<Booking> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::Transaction(format!("Failed to start transaction: {}", e))
        })?;

        Self::lock_apartment(&mut tx, booking.apartment_id).await?;

        let overlaps = Self::count_overlaps(
            &mut tx,
            booking.apartment_id,
            booking.start_date,
            booking.end_date,
            booking.cleaning_minutes,
            None,
        )
        .await?;

        if overlaps > 0 {
            debug!(overlaps, "Requested window overlaps existing bookings");
            return Err(AppError::SlotUnavailable(format!(
                "apartment {} is occupied between {} and {}",
                booking.apartment_id, booking.start_date, booking.end_date
            )));
        }

        let row = sqlx::query_as::<Postgres, BookingRow>(concat!(
            r#"
            INSERT INTO bookings (
                apartment_id, renter_id, booking_number, start_date, end_date,
                duration, cleaning_minutes, status, total_price, service_fee, final_price
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, 'created', $8, $9, $10)
            RETURNING "#,
            booking_columns!()
        ))
        .bind(booking.apartment_id)
        .bind(booking.renter_id)
        .bind(&booking.booking_number)
        .bind(booking.start_date)
        .bind(booking.end_date)
        .bind(booking.duration)
        .bind(booking.cleaning_minutes)
        .bind(booking.total_price)
        .bind(booking.service_fee)
        .bind(booking.final_price)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err("create booking"))?;

        tx.commit()
            .await
            .map_err(|e| AppError::Transaction(format!("Failed to commit booking: {}", e)))?;

        Ok(row.into())
    }

    #[instrument(skip(self, booking), fields(booking_id = booking.id, to = %booking.status))]
    async fn transition(&self, booking: &Booking, expected: BookingStatus) -> AppResult<Booking> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::Transaction(format!("Failed to start transaction: {}", e))
        })?;

        let row = Self::update_guarded(&mut tx, booking, expected)
            .await?
            .ok_or_else(|| Self::stale(booking, expected))?;

        tx.commit()
            .await
            .map_err(|e| AppError::Transaction(format!("Failed to commit transition: {}", e)))?;

        Ok(row.into())
    }

    #[instrument(skip(self, booking), fields(booking_id = booking.id, to = %booking.status))]
    async fn transition_if_available(
        &self,
        booking: &Booking,
        expected: BookingStatus,
    ) -> AppResult<Booking> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::Transaction(format!("Failed to start transaction: {}", e))
        })?;

        Self::lock_apartment(&mut tx, booking.apartment_id).await?;

        let overlaps = Self::count_overlaps(
            &mut tx,
            booking.apartment_id,
            booking.start_date,
            booking.end_date,
            booking.cleaning_minutes,
            Some(booking.id),
        )
        .await?;

        if overlaps > 0 {
            return Err(AppError::SlotUnavailable(format!(
                "window of booking {} is no longer free",
                booking.booking_number
            )));
        }

        let row = Self::update_guarded(&mut tx, booking, expected)
            .await?
            .ok_or_else(|| Self::stale(booking, expected))?;

        tx.commit()
            .await
            .map_err(|e| AppError::Transaction(format!("Failed to commit transition: {}", e)))?;

        Ok(row.into())
    }

    #[instrument(skip(self, booking, extension), fields(booking_id = booking.id, extension_id = extension.id))]
    async fn apply_extension(
        &self,
        booking: &Booking,
        extension: &BookingExtension,
    ) -> AppResult<(Booking, BookingExtension)> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::Transaction(format!("Failed to start transaction: {}", e))
        })?;

        Self::lock_apartment(&mut tx, booking.apartment_id).await?;

        let overlaps = Self::count_overlaps(
            &mut tx,
            booking.apartment_id,
            booking.start_date,
            booking.end_date,
            booking.cleaning_minutes,
            Some(booking.id),
        )
        .await?;

        if overlaps > 0 {
            return Err(AppError::SlotUnavailable(format!(
                "extension of booking {} no longer fits",
                booking.booking_number
            )));
        }

        let updated = Self::update_guarded(&mut tx, booking, BookingStatus::Active)
            .await?
            .ok_or_else(|| Self::stale(booking, BookingStatus::Active))?;

        let ext_row = sqlx::query_as::<Postgres, ExtensionRow>(
            r#"
            UPDATE booking_extensions
            SET status = $2,
                payment_id = $3,
                decided_at = $4,
                updated_at = NOW()
            WHERE id = $1 AND status IN ('created', 'awaiting_payment')
            RETURNING id, booking_id, requested_duration, status, base_price, service_fee,
                      price, order_id, payment_id, reject_reason, created_at, updated_at,
                      decided_at
            "#,
        )
        .bind(extension.id)
        .bind(ExtensionStatus::Approved.to_string())
        .bind(&extension.payment_id)
        .bind(extension.decided_at)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err("approve extension"))?
        .ok_or_else(|| AppError::AlreadyProcessed(format!("extension {}", extension.id)))?;

        tx.commit()
            .await
            .map_err(|e| AppError::Transaction(format!("Failed to commit extension: {}", e)))?;

        Ok((updated.into(), ext_row.into()))
    }

    #[instrument(skip(self))]
    async fn set_door_status(&self, booking_id: i64, door: DoorStatus) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE bookings
            SET door_status = $2, updated_at = NOW()
            WHERE id = $1 AND status = $3
            "#,
        )
        .bind(booking_id)
        .bind(door.to_string())
        .bind(BookingStatus::Active.to_string())
        .execute(&self.pool)
        .await
        .map_err(db_err("record door status"))?;

        debug!(booking_id, door = %door, rows = result.rows_affected(), "Door status recorded");
        Ok(result.rows_affected() == 1)
    }

    #[instrument(skip(self))]
    async fn list_occupying(
        &self,
        apartment_id: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> AppResult<Vec<Booking>> {
        let rows = sqlx::query_as::<Postgres, BookingRow>(concat!(
            "SELECT ",
            booking_columns!(),
            r#"
            FROM bookings
            WHERE apartment_id = $1
              AND status = ANY($2)
              AND start_date < $4
              AND end_date + make_interval(mins => cleaning_minutes) > $3
            ORDER BY start_date
            "#
        ))
        .bind(apartment_id)
        .bind(Self::occupying_statuses())
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err("list occupying bookings"))?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self))]
    async fn find_by_reference(&self, reference: &str) -> AppResult<Option<Booking>> {
        let row = sqlx::query_as::<Postgres, BookingRow>(concat!(
            "SELECT ",
            booking_columns!(),
            " FROM bookings WHERE booking_number = $1 OR payment_id = $1 LIMIT 1"
        ))
        .bind(reference)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err("find booking by reference"))?;

        Ok(row.map(Into::into))
    }

    #[instrument(skip(self))]
    async fn find_by_payment_id(&self, payment_id: &str) -> AppResult<Option<Booking>> {
        let row = sqlx::query_as::<Postgres, BookingRow>(concat!(
            "SELECT ",
            booking_columns!(),
            " FROM bookings WHERE payment_id = $1"
        ))
        .bind(payment_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err("find booking by payment id"))?;

        Ok(row.map(Into::into))
    }

    #[instrument(skip(self))]
    async fn list_by_renter(
        &self,
        renter_id: i64,
        limit: i64,
        offset: i64,
    ) -> AppResult<(Vec<Booking>, i64)> {
        let rows = sqlx::query_as::<Postgres, BookingRow>(concat!(
            "SELECT ",
            booking_columns!(),
            " FROM bookings WHERE renter_id = $1 ORDER BY start_date DESC LIMIT $2 OFFSET $3"
        ))
        .bind(renter_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err("list renter bookings"))?;

        let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM bookings WHERE renter_id = $1")
            .bind(renter_id)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err("count renter bookings"))?;

        Ok((rows.into_iter().map(Into::into).collect(), total))
    }

    #[instrument(skip(self))]
    async fn list_by_apartment(
        &self,
        apartment_id: i64,
        limit: i64,
        offset: i64,
    ) -> AppResult<(Vec<Booking>, i64)> {
        let rows = sqlx::query_as::<Postgres, BookingRow>(concat!(
            "SELECT ",
            booking_columns!(),
            " FROM bookings WHERE apartment_id = $1 ORDER BY start_date DESC LIMIT $2 OFFSET $3"
        ))
        .bind(apartment_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err("list apartment bookings"))?;

        let (total,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM bookings WHERE apartment_id = $1")
                .bind(apartment_id)
                .fetch_one(&self.pool)
                .await
                .map_err(db_err("count apartment bookings"))?;

        Ok((rows.into_iter().map(Into::into).collect(), total))
    }

    #[instrument(skip(self))]
    async fn list_due_activation(&self, now: DateTime<Utc>) -> AppResult<Vec<Booking>> {
        let rows = sqlx::query_as::<Postgres, BookingRow>(concat!(
            "SELECT ",
            booking_columns!(),
            " FROM bookings WHERE status = 'approved' AND start_date <= $1 ORDER BY start_date"
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err("list bookings due activation"))?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self))]
    async fn list_due_completion(&self, now: DateTime<Utc>) -> AppResult<Vec<Booking>> {
        let rows = sqlx::query_as::<Postgres, BookingRow>(concat!(
            "SELECT ",
            booking_columns!(),
            " FROM bookings WHERE status = 'active' AND end_date <= $1 ORDER BY end_date"
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err("list bookings due completion"))?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}

/// Helper struct for mapping database rows
#[derive(Debug, sqlx::FromRow)]
struct BookingRow {
    id: i64,
    apartment_id: i64,
    renter_id: i64,
    booking_number: String,
    start_date: DateTime<Utc>,
    end_date: DateTime<Utc>,
    duration: i32,
    cleaning_minutes: i32,
    status: String,
    total_price: Decimal,
    service_fee: Decimal,
    final_price: Decimal,
    payment_id: Option<String>,
    door_status: String,
    extension_requested: bool,
    extension_duration: Option<i32>,
    extension_price: Option<Decimal>,
    cancellation_reason: Option<String>,
    owner_comment: Option<String>,
    refund_policy: Option<String>,
    refund_amount: Option<Decimal>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    paid_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
}

impl From<BookingRow> for Booking {
    fn from(row: BookingRow) -> Self {
        Self {
            id: row.id,
            apartment_id: row.apartment_id,
            renter_id: row.renter_id,
            booking_number: row.booking_number,
            start_date: row.start_date,
            end_date: row.end_date,
            duration: row.duration,
            cleaning_minutes: row.cleaning_minutes,
            status: BookingStatus::from_str(&row.status).unwrap_or(BookingStatus::Created),
            total_price: row.total_price,
            service_fee: row.service_fee,
            final_price: row.final_price,
            payment_id: row.payment_id,
            door_status: DoorStatus::from_str(&row.door_status).unwrap_or_default(),
            can_extend: false,
            extension_requested: row.extension_requested,
            extension_duration: row.extension_duration,
            extension_price: row.extension_price,
            cancellation_reason: row.cancellation_reason,
            owner_comment: row.owner_comment,
            refund_policy: row.refund_policy.as_deref().and_then(RefundPolicy::from_str),
            refund_amount: row.refund_amount,
            created_at: row.created_at,
            updated_at: row.updated_at,
            paid_at: row.paid_at,
            finished_at: row.finished_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_occupying_statuses() {
        let statuses = PgBookingRepository::occupying_statuses();
        assert_eq!(
            statuses,
            vec!["pending", "awaiting_payment", "approved", "active"]
        );
    }

    #[test]
    fn test_status_parsing_aliases() {
        assert_eq!(BookingStatus::from_str("bogus"), None);
        assert_eq!(
            BookingStatus::from_str("cancelled"),
            Some(BookingStatus::Canceled)
        );
    }
}
