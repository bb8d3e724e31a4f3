//! Dataset-scoped access to a statement store.
//!
//! A [`Store`] binds a [`Backend`](ftmstore_core::backend::Backend) to a
//! [`Scope`]: one writable dataset, a read-only catalog of datasets, or every
//! dataset present. It owns write buffering ([`writer`]), entity lookup and
//! iteration, graph traversal ([`Traversal`]) and canonicalization.

mod canonize;
mod scope;
mod store;
mod traverse;

pub mod error;
pub mod writer;

pub use canonize::CanonizeReport;
pub use error::{Error, Result};
pub use scope::Scope;
pub use store::{DEFAULT_CHUNK_SIZE, EntityCursor, Store};
pub use traverse::Traversal;
pub use writer::{BulkUpdater, BulkWriter, EntityBulkWriter};

#[cfg(test)]
mod tests;
