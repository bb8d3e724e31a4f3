//! The `Backend` trait: what the store needs from a SQL engine.
//!
//! The store compiles every read and mutation to SQL text in the backend's
//! [`Dialect`] and only relies on the engine to run it, to append batches of
//! rows, and to collapse rows sharing a replacing key on optimize.

use std::future::Future;

use serde_json::Value;

use crate::{
  Error, Result,
  query::Dialect,
  statement::{FingerprintStatement, Statement},
};

pub const DEFAULT_TABLE: &str = "ftm";

/// A result row; cells keep whatever JSON shape the engine produced.
pub type Row = Vec<Value>;

/// Names of the statement table and its fingerprint side table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tables {
  pub statements:   String,
  pub fingerprints: String,
}

impl Tables {
  /// `name` and `name_fpx`.
  pub fn new(name: &str) -> Self {
    Self {
      statements:   name.to_owned(),
      fingerprints: format!("{name}_fpx"),
    }
  }
}

impl Default for Tables {
  fn default() -> Self { Self::new(DEFAULT_TABLE) }
}

/// Rows to append to one of the two tables.
#[derive(Debug, Clone)]
pub enum Batch {
  Statements(Vec<Statement>),
  Fingerprints(Vec<FingerprintStatement>),
}

impl Batch {
  pub fn len(&self) -> usize {
    match self {
      Batch::Statements(rows) => rows.len(),
      Batch::Fingerprints(rows) => rows.len(),
    }
  }

  pub fn is_empty(&self) -> bool { self.len() == 0 }
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// A SQL-speaking engine holding the statement and fingerprint tables.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes.
pub trait Backend: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  fn dialect(&self) -> &dyn Dialect;

  fn tables(&self) -> &Tables;

  /// Create both tables. With `recreate` they are dropped first; with
  /// `exists_ok` an existing table is not an error.
  fn ensure(
    &self,
    recreate: bool,
    exists_ok: bool,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Run a read query.
  fn query(
    &self,
    sql: String,
  ) -> impl Future<Output = Result<Vec<Row>, Self::Error>> + Send + '_;

  /// Run a mutation and return the number of affected rows where known.
  fn execute(
    &self,
    sql: String,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  /// Append rows; an existing row with the same replacing key is replaced.
  fn insert(
    &self,
    batch: Batch,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  /// Compact storage. `full` forces deduplication of replaced rows on engines
  /// that defer it.
  fn optimize(
    &self,
    full: bool,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;
}

// ─── Cell decoding ───────────────────────────────────────────────────────────

fn cell(row: &Row, index: usize) -> Result<&Value> {
  row
    .get(index)
    .ok_or_else(|| Error::Decode(format!("missing column {index}")))
}

/// A text cell; NULL reads as the empty string and numbers are printed.
pub fn cell_text(row: &Row, index: usize) -> Result<String> {
  match cell(row, index)? {
    Value::String(s) => Ok(s.clone()),
    Value::Null => Ok(String::new()),
    Value::Number(n) => Ok(n.to_string()),
    other => Err(Error::Decode(format!(
      "column {index}: expected text, got {other}"
    ))),
  }
}

pub fn cell_f64(row: &Row, index: usize) -> Result<Option<f64>> {
  match cell(row, index)? {
    Value::Null => Ok(None),
    Value::Number(n) => Ok(n.as_f64()),
    Value::String(s) if s.is_empty() => Ok(None),
    Value::String(s) => s
      .parse()
      .map(Some)
      .map_err(|_| Error::Decode(format!("column {index}: not a number: {s:?}"))),
    other => Err(Error::Decode(format!(
      "column {index}: expected number, got {other}"
    ))),
  }
}

/// A non-negative whole number, such as a `count()` result.
pub fn cell_u64(row: &Row, index: usize) -> Result<u64> {
  if let Value::Number(n) = cell(row, index)?
    && let Some(n) = n.as_u64()
  {
    return Ok(n);
  }
  match cell_f64(row, index)? {
    Some(n) if n >= 0.0 && n.fract() == 0.0 && n <= u64::MAX as f64 => {
      Ok(n as u64)
    }
    other => Err(Error::Decode(format!(
      "column {index}: expected a count, got {other:?}"
    ))),
  }
}

/// A list-of-strings cell, decoded through the dialect and flattened.
pub fn cell_strings(
  dialect: &dyn Dialect,
  row: &Row,
  index: usize,
) -> Result<Vec<String>> {
  let mut out = Vec::new();
  flatten_strings(&dialect.decode_array(cell(row, index)?)?, &mut out);
  Ok(out)
}

/// A cell holding one list of strings per element (e.g. values per prop).
pub fn cell_nested_strings(
  dialect: &dyn Dialect,
  row: &Row,
  index: usize,
) -> Result<Vec<Vec<String>>> {
  dialect
    .decode_array(cell(row, index)?)?
    .iter()
    .map(|item| {
      let mut out = Vec::new();
      flatten_strings(&dialect.decode_array(item)?, &mut out);
      Ok(out)
    })
    .collect()
}

fn flatten_strings(values: &[Value], out: &mut Vec<String>) {
  for value in values {
    match value {
      Value::Array(items) => flatten_strings(items, out),
      Value::String(s) => out.push(s.clone()),
      Value::Null => {}
      other => out.push(other.to_string()),
    }
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;
  use crate::query::ClickHouse;

  #[test]
  fn text_cells() {
    let row = vec![json!("a"), Value::Null, json!(3)];
    assert_eq!(cell_text(&row, 0).unwrap(), "a");
    assert_eq!(cell_text(&row, 1).unwrap(), "");
    assert_eq!(cell_text(&row, 2).unwrap(), "3");
    assert!(cell_text(&row, 3).is_err());
    assert_eq!(cell_u64(&row, 2).unwrap(), 3);
  }

  #[test]
  fn count_cells_reject_negatives_and_fractions() {
    let row = vec![json!(-1), json!(2.5), json!("7"), json!(4.0), Value::Null];
    assert!(matches!(cell_u64(&row, 0), Err(Error::Decode(_))));
    assert!(matches!(cell_u64(&row, 1), Err(Error::Decode(_))));
    assert_eq!(cell_u64(&row, 2).unwrap(), 7);
    assert_eq!(cell_u64(&row, 3).unwrap(), 4);
    assert!(matches!(cell_u64(&row, 4), Err(Error::Decode(_))));
  }

  #[test]
  fn nested_cells_flatten() {
    let row = vec![json!([["a", "b"], ["b"]]), json!([["x"], ["y", "z"]])];
    assert_eq!(cell_strings(&ClickHouse, &row, 0).unwrap(), vec![
      "a", "b", "b"
    ]);
    assert_eq!(
      cell_nested_strings(&ClickHouse, &row, 1).unwrap(),
      vec![vec!["x".to_owned()], vec!["y".to_owned(), "z".to_owned()]]
    );
  }

  #[test]
  fn fingerprint_table_name() {
    let tables = Tables::new("ftm_test");
    assert_eq!(tables.fingerprints, "ftm_test_fpx");
    assert_eq!(Tables::default().statements, "ftm");
  }
}
