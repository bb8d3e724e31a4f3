//! Which datasets a store reads and whether it may write.

use std::fmt;

use ftmstore_core::query::{Column, Filter};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
  /// A single dataset; the only writable scope.
  Dataset(String),
  /// Several datasets, read together.
  Catalog(Vec<String>),
  /// Every dataset in the backend.
  All,
}

impl Scope {
  /// `*` selects everything, a comma-separated list a catalog, anything
  /// else a single dataset.
  pub fn parse(names: &str) -> Self {
    let names = names.trim();
    if names == "*" {
      return Scope::All;
    }
    let mut parts: Vec<String> = names
      .split(',')
      .map(str::trim)
      .filter(|n| !n.is_empty())
      .map(str::to_owned)
      .collect();
    match parts.len() {
      1 => Scope::Dataset(parts.remove(0)),
      _ => Scope::catalog(parts),
    }
  }

  pub fn catalog<I, S>(names: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    let mut names: Vec<String> = names.into_iter().map(Into::into).collect();
    names.sort();
    names.dedup();
    Scope::Catalog(names)
  }

  pub fn is_writable(&self) -> bool { matches!(self, Scope::Dataset(_)) }

  /// The dataset restriction, if any.
  pub fn filter(&self) -> Option<Filter> {
    match self {
      Scope::Dataset(name) => Some(Column::Dataset.is(name)),
      Scope::Catalog(names) => Some(Column::Dataset.is_in(names.clone())),
      Scope::All => None,
    }
  }
}

impl fmt::Display for Scope {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Scope::Dataset(name) => f.write_str(name),
      Scope::Catalog(names) => f.write_str(&names.join(",")),
      Scope::All => f.write_str("*"),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parse_names() {
    assert_eq!(Scope::parse("a"), Scope::Dataset("a".into()));
    assert_eq!(
      Scope::parse("b, a"),
      Scope::Catalog(vec!["a".into(), "b".into()])
    );
    assert_eq!(Scope::parse("*"), Scope::All);
    assert_eq!(Scope::parse("b,a").to_string(), "a,b");
  }

  #[test]
  fn only_datasets_write() {
    assert!(Scope::parse("a").is_writable());
    assert!(!Scope::parse("a,b").is_writable());
    assert!(!Scope::All.is_writable());
    assert!(Scope::All.filter().is_none());
  }
}
