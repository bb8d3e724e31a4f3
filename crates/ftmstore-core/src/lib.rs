//! Core types and trait definitions for the ftmstore statement store.
//!
//! Entities are persisted as flat statements (one row per property value) and
//! reassembled on read. This crate holds the statement model, the phonetic
//! fingerprinter, the SQL query compiler and the [`backend::Backend`] seam. It
//! is deliberately free of database and runtime dependencies.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod backend;
pub mod entity;
pub mod error;
pub mod phonetic;
pub mod query;
pub mod resolution;
pub mod schema;
pub mod statement;

pub use entity::Entity;
pub use error::{Error, Result};
pub use schema::{ModelRegistry, SchemaRegistry};
pub use statement::{FingerprintStatement, Statement, StatusFlag};
