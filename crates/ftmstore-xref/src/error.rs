//! Error type for `ftmstore-xref`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error(transparent)]
  Store(#[from] ftmstore_dataset::Error),

  #[error(transparent)]
  Core(#[from] ftmstore_core::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
