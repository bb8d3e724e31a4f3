//! SQL dialects.
//!
//! The compiler emits portable SQL except where engines disagree: literal
//! escaping, `LIMIT` syntax, array aggregates and mutations. Those go through
//! [`Dialect`]. [`ClickHouse`] is the reference dialect for the columnar
//! engine the store was designed for.

use serde_json::Value;

use super::{Column, Operator};
use crate::{Error, Result, backend::Tables};

pub trait Dialect: Send + Sync {
  fn name(&self) -> &'static str;

  /// A string literal, quotes included.
  fn quote(&self, value: &str) -> String;

  fn operator(&self, op: Operator) -> &'static str { op.as_sql() }

  /// The trailing `LIMIT`/`OFFSET` clause with a leading space, or nothing.
  fn limit(&self, limit: Option<usize>, offset: Option<usize>) -> String;

  /// Aggregate collecting the distinct values of `expr`.
  fn group_uniq_array(&self, expr: &str) -> String;

  /// Aggregate collecting every value of a scalar `expr`.
  fn group_array(&self, expr: &str) -> String;

  /// Aggregate collecting every value of an array-valued `expr`.
  fn group_nested_array(&self, expr: &str) -> String;

  /// Aggregate merging array-valued `expr` into one list. Engines without
  /// array functions may return the nested form; decoding flattens it.
  fn group_flat_array(&self, expr: &str) -> String;

  fn array_length(&self, expr: &str) -> String;

  fn update(
    &self,
    table: &str,
    assignments: &[(Column, &str)],
    where_clause: &str,
  ) -> String;

  fn delete(&self, table: &str, where_clause: &str) -> String;

  /// Turn an array cell as returned by the engine into JSON values.
  fn decode_array(&self, cell: &Value) -> Result<Vec<Value>> {
    match cell {
      Value::Array(items) => Ok(items.clone()),
      Value::Null => Ok(Vec::new()),
      other => Err(Error::Decode(format!("expected an array, got {other}"))),
    }
  }
}

/// `col = 'value', ...` for an UPDATE statement.
pub fn render_assignments(
  dialect: &dyn Dialect,
  assignments: &[(Column, &str)],
) -> String {
  assignments
    .iter()
    .map(|(column, value)| format!("{column} = {}", dialect.quote(value)))
    .collect::<Vec<_>>()
    .join(", ")
}

// ─── ClickHouse ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default)]
pub struct ClickHouse;

impl Dialect for ClickHouse {
  fn name(&self) -> &'static str { "clickhouse" }

  fn quote(&self, value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
  }

  fn limit(&self, limit: Option<usize>, offset: Option<usize>) -> String {
    match (limit, offset) {
      (Some(limit), offset) => format!(" LIMIT {}, {limit}", offset.unwrap_or(0)),
      (None, Some(offset)) => format!(" OFFSET {offset}"),
      (None, None) => String::new(),
    }
  }

  fn group_uniq_array(&self, expr: &str) -> String {
    format!("groupUniqArray({expr})")
  }

  fn group_array(&self, expr: &str) -> String { format!("groupArray({expr})") }

  fn group_nested_array(&self, expr: &str) -> String {
    format!("groupArray({expr})")
  }

  fn group_flat_array(&self, expr: &str) -> String {
    format!("arrayDistinct(arrayFlatten(groupArray({expr})))")
  }

  fn array_length(&self, expr: &str) -> String { format!("length({expr})") }

  fn update(
    &self,
    table: &str,
    assignments: &[(Column, &str)],
    where_clause: &str,
  ) -> String {
    format!(
      "ALTER TABLE {table} UPDATE {} WHERE {where_clause}",
      render_assignments(self, assignments)
    )
  }

  fn delete(&self, table: &str, where_clause: &str) -> String {
    format!("ALTER TABLE {table} DELETE WHERE {where_clause}")
  }
}

impl ClickHouse {
  /// DDL for both tables. The statement table replaces rows on
  /// `(canonical_id, entity_id, id)`, keeping the one with the latest
  /// timestamp; projections serve lookups by entity id and by value.
  pub fn create_statements(tables: &Tables) -> Vec<String> {
    let Tables {
      statements,
      fingerprints,
    } = tables;
    vec![
      format!(
        "CREATE TABLE {statements} (
    id FixedString(64) NOT NULL,
    dataset LowCardinality(String) NOT NULL,
    canonical_id String NOT NULL,
    entity_id String NOT NULL,
    schema LowCardinality(String) NOT NULL,
    origin LowCardinality(String) NOT NULL,
    prop LowCardinality(String) NOT NULL,
    prop_type LowCardinality(String) NOT NULL,
    value String NOT NULL,
    value_num Nullable(Float64),
    timestamp DateTime64 NOT NULL,
    status_flag LowCardinality(String) NOT NULL DEFAULT '',
    PROJECTION {statements}_entity_id (SELECT * ORDER BY entity_id),
    PROJECTION {statements}_value (SELECT * ORDER BY value)
) ENGINE = ReplacingMergeTree(timestamp)
PRIMARY KEY (canonical_id, entity_id, id)
ORDER BY (canonical_id, entity_id, id)"
      ),
      format!(
        "CREATE TABLE {fingerprints} (
    algorithm LowCardinality(String) NOT NULL,
    value String NOT NULL,
    dataset LowCardinality(String) NOT NULL,
    entity_id String NOT NULL,
    schema LowCardinality(String) NOT NULL,
    prop LowCardinality(String) NOT NULL,
    prop_type LowCardinality(String) NOT NULL
) ENGINE = ReplacingMergeTree
PRIMARY KEY (algorithm, value)
ORDER BY (algorithm, value, prop, schema, dataset, entity_id)"
      ),
    ]
  }

  pub fn drop_statements(tables: &Tables) -> Vec<String> {
    vec![
      format!("DROP TABLE IF EXISTS {}", tables.statements),
      format!("DROP TABLE IF EXISTS {}", tables.fingerprints),
    ]
  }

  pub fn optimize_statement(table: &str, full: bool) -> String {
    if full {
      format!("OPTIMIZE TABLE {table} FINAL DEDUPLICATE")
    } else {
      format!("OPTIMIZE TABLE {table}")
    }
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  #[test]
  fn clickhouse_quoting() {
    assert_eq!(ClickHouse.quote("O'Brien"), r"'O\'Brien'");
    assert_eq!(ClickHouse.quote(r"a\b"), r"'a\\b'");
  }

  #[test]
  fn clickhouse_limits() {
    assert_eq!(ClickHouse.limit(Some(1), Some(17)), " LIMIT 17, 1");
    assert_eq!(ClickHouse.limit(Some(100), None), " LIMIT 0, 100");
    assert_eq!(ClickHouse.limit(None, Some(10)), " OFFSET 10");
    assert_eq!(ClickHouse.limit(None, None), "");
  }

  #[test]
  fn clickhouse_mutations() {
    assert_eq!(
      ClickHouse.update(
        "ftm",
        &[(Column::StatusFlag, "canonized")],
        "canonical_id = '1'"
      ),
      "ALTER TABLE ftm UPDATE status_flag = 'canonized' WHERE canonical_id = '1'"
    );
    assert_eq!(
      ClickHouse.delete("ftm", "dataset = 'x'"),
      "ALTER TABLE ftm DELETE WHERE dataset = 'x'"
    );
  }

  #[test]
  fn clickhouse_ddl_uses_table_names() {
    let ddl = ClickHouse::create_statements(&Tables::new("ftm_test"));
    assert!(ddl[0].starts_with("CREATE TABLE ftm_test ("));
    assert!(ddl[0].contains("ORDER BY (canonical_id, entity_id, id)"));
    assert!(ddl[1].starts_with("CREATE TABLE ftm_test_fpx ("));
    assert_eq!(
      ClickHouse::optimize_statement("ftm", true),
      "OPTIMIZE TABLE ftm FINAL DEDUPLICATE"
    );
  }

  #[test]
  fn decode_arrays() {
    assert_eq!(ClickHouse.decode_array(&json!(["a"])).unwrap(), vec![json!(
      "a"
    )]);
    assert!(ClickHouse.decode_array(&json!("a")).is_err());
  }
}
