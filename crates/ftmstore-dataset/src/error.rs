//! Error type for `ftmstore-dataset`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error(transparent)]
  Core(#[from] ftmstore_core::Error),

  #[error("entity not found: {0}")]
  EntityNotFound(String),

  #[error("store is not writable: {0}")]
  NotWritable(String),

  #[error("backend error: {0}")]
  Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  pub(crate) fn backend(e: impl std::error::Error + Send + Sync + 'static) -> Self {
    Error::Backend(Box::new(e))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
