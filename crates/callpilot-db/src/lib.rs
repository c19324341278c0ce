//! Database layer for the callpilot service.
//!
//! Provides SQLite connection pooling (via `r2d2`), WAL-mode initialization,
//! and embedded SQL migrations. Every table in callpilot is created through
//! the versioned migrations managed here.
//!
//! SQLite was chosen over a hosted document store so the service runs as a
//! single self-contained process: WAL mode gives concurrent readers with a
//! single writer, which matches the access pattern (many read-heavy API
//! requests, occasional assignment/session writes). Migrations are compiled
//! into the binary with `include_str!` so the schema cannot drift from the
//! code that queries it.

mod migrations;
mod pool;

pub use migrations::{run_migrations, MigrationError};
pub use pool::{create_pool, DbPool, PoolError, SqliteSettings};
