//! SQLite backend for the ftmstore statement store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Replacing keys are table primary keys
//! written with `INSERT OR REPLACE`, so no deferred deduplication is needed.

mod backend;
mod dialect;
mod encode;
mod schema;

pub mod error;

pub use backend::SqliteBackend;
pub use dialect::SqliteDialect;
pub use error::{Error, Result};
