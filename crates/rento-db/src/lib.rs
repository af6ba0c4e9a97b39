//! Rento Database Layer
//!
//! PostgreSQL access and repository implementations for the booking core:
//!
//! - Connection pool management and embedded migrations
//! - `Pg*Repository` types built on sqlx
//! - Row-locked transactions for the per-apartment availability check
//! - An in-memory store with the same guarantees, used by tests and local runs

pub mod memory;
pub mod pool;
pub mod repositories;
pub mod stores;

pub use memory::MemoryStore;
pub use pool::{create_pool, run_migrations};
pub use repositories::*;
pub use stores::Stores;

pub use rento_core::{AppError, AppResult};
pub use sqlx::{PgPool, Postgres, Transaction};
