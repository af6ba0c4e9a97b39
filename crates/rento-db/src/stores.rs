//! Backend-agnostic bundle of repositories
//!
//! The binary chooses PostgreSQL or the in-memory store at startup, so the
//! services hold trait objects rather than concrete repository types.

use rento_core::traits::{
    ApartmentRepository, BookingRepository, ExtensionRepository, LockRepository,
    PlatformSettings, TempPasswordRepository,
};
use sqlx::PgPool;
use std::sync::Arc;

use crate::memory::MemoryStore;
use crate::repositories::{
    PgApartmentRepository, PgBookingRepository, PgExtensionRepository, PgLockRepository,
    PgPlatformSettings, PgTempPasswordRepository,
};

#[derive(Clone)]
pub struct Stores {
    pub apartments: Arc<dyn ApartmentRepository>,
    pub bookings: Arc<dyn BookingRepository>,
    pub extensions: Arc<dyn ExtensionRepository>,
    pub locks: Arc<dyn LockRepository>,
    pub passwords: Arc<dyn TempPasswordRepository>,
    pub settings: Arc<dyn PlatformSettings>,
}

impl Stores {
    pub fn postgres(pool: PgPool) -> Self {
        Self {
            apartments: Arc::new(PgApartmentRepository::new(pool.clone())),
            bookings: Arc::new(PgBookingRepository::new(pool.clone())),
            extensions: Arc::new(PgExtensionRepository::new(pool.clone())),
            locks: Arc::new(PgLockRepository::new(pool.clone())),
            passwords: Arc::new(PgTempPasswordRepository::new(pool.clone())),
            settings: Arc::new(PgPlatformSettings::new(pool)),
        }
    }

    pub fn memory(store: &MemoryStore) -> Self {
        Self {
            apartments: Arc::new(store.apartments()),
            bookings: Arc::new(store.bookings()),
            extensions: Arc::new(store.extensions()),
            locks: Arc::new(store.locks()),
            passwords: Arc::new(store.passwords()),
            settings: Arc::new(store.settings()),
        }
    }
}
