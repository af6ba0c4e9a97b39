//! PostgreSQL repository implementations

pub mod apartment_repo;
pub mod booking_repo;
pub mod extension_repo;
pub mod lock_repo;
pub mod password_repo;
pub mod settings_repo;

pub use apartment_repo::PgApartmentRepository;
pub use booking_repo::PgBookingRepository;
pub use extension_repo::PgExtensionRepository;
pub use lock_repo::PgLockRepository;
pub use password_repo::PgTempPasswordRepository;
pub use settings_repo::PgPlatformSettings;

/// Map a sqlx error to a database error, logging it with context
pub(crate) fn db_err(context: &str) -> impl Fn(sqlx::Error) -> rento_core::AppError + '_ {
    move |e| {
        tracing::error!("Database error {}: {}", context, e);
        rento_core::AppError::Database(format!("Failed to {}: {}", context, e))
    }
}
