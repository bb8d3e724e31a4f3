//! Error types for `ftmstore-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// A query could not be compiled (unknown property, bad slice, value of
  /// the wrong shape for its operator).
  #[error("invalid query: {0}")]
  InvalidQuery(String),

  #[error("invalid phonetic algorithm: {0:?}")]
  InvalidAlgorithm(String),

  #[error("unknown schema: {0:?}")]
  UnknownSchema(String),

  #[error("schemata {left:?} and {right:?} cannot be merged")]
  SchemaMismatch { left: String, right: String },

  /// A backend row did not have the expected shape.
  #[error("malformed row: {0}")]
  Decode(String),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("serialization error: {0}")]
  Json(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
