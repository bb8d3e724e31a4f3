//! Runtime configuration.
//!
//! Values come from an optional TOML file, overridden by `FTMSTORE_*`
//! environment variables (`FTMSTORE_DATABASE_PATH`, `FTMSTORE_TABLE`, ...).

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use ftmstore_core::{backend::DEFAULT_TABLE, phonetic::DEFAULT_CACHE_SIZE};
use ftmstore_dataset::writer::DEFAULT_BULK_SIZE;
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
  pub database_path:       PathBuf,
  /// Statement table; fingerprints live in `<table>_fpx`.
  pub table:               String,
  pub bulk_write_size:     usize,
  pub phonetic_cache_size: usize,
  /// JSON schema model replacing the built-in one.
  pub model_path:          Option<PathBuf>,
  /// Provenance tag for writes and reads.
  pub origin:              Option<String>,
}

impl Default for Settings {
  fn default() -> Self {
    Self {
      database_path:       PathBuf::from("ftmstore.db"),
      table:               DEFAULT_TABLE.to_owned(),
      bulk_write_size:     DEFAULT_BULK_SIZE,
      phonetic_cache_size: DEFAULT_CACHE_SIZE,
      model_path:          None,
      origin:              None,
    }
  }
}

impl Settings {
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(config::Environment::with_prefix("FTMSTORE"))
      .build()
      .context("failed to read configuration")?
      .try_deserialize()
      .context("failed to deserialise settings")
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn missing_file_gives_defaults() {
    let path = std::env::temp_dir().join(format!("{}.toml", uuid::Uuid::new_v4()));
    let settings = Settings::load(&path).unwrap();
    assert_eq!(settings.table, "ftm");
    assert_eq!(settings.bulk_write_size, 100_000);
    assert_eq!(settings.phonetic_cache_size, 100_000);
    assert!(settings.model_path.is_none());
  }

  #[test]
  fn file_overrides_defaults() {
    let path = std::env::temp_dir().join(format!("{}.toml", uuid::Uuid::new_v4()));
    std::fs::write(
      &path,
      "database_path = \"/tmp/store.db\"\ntable = \"ftm_test\"\norigin = \"crawl\"\n",
    )
    .unwrap();
    let settings = Settings::load(&path).unwrap();
    std::fs::remove_file(&path).unwrap();

    assert_eq!(settings.database_path, PathBuf::from("/tmp/store.db"));
    assert_eq!(settings.table, "ftm_test");
    assert_eq!(settings.origin.as_deref(), Some("crawl"));
    assert_eq!(settings.bulk_write_size, 100_000);
  }
}
