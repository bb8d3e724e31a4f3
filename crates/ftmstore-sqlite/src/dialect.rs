//! [`SqliteDialect`]: SQL spelling for SQLite with the JSON1 functions.
//!
//! Array aggregates are `json_group_array` results, i.e. JSON text, and are
//! parsed back on decode. Nested aggregates stay nested.

use ftmstore_core::{
  Error, Result,
  query::{Column, Dialect, Operator, render_assignments},
};
use serde_json::Value;

#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

impl Dialect for SqliteDialect {
  fn name(&self) -> &'static str { "sqlite" }

  fn quote(&self, value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
  }

  fn operator(&self, op: Operator) -> &'static str {
    match op {
      // LIKE is already case-insensitive for ASCII.
      Operator::ILike => "LIKE",
      op => op.as_sql(),
    }
  }

  fn limit(&self, limit: Option<usize>, offset: Option<usize>) -> String {
    match (limit, offset) {
      (Some(limit), Some(offset)) => format!(" LIMIT {limit} OFFSET {offset}"),
      (Some(limit), None) => format!(" LIMIT {limit}"),
      (None, Some(offset)) => format!(" LIMIT -1 OFFSET {offset}"),
      (None, None) => String::new(),
    }
  }

  fn group_uniq_array(&self, expr: &str) -> String {
    format!("json_group_array(DISTINCT {expr})")
  }

  fn group_array(&self, expr: &str) -> String {
    format!("json_group_array({expr})")
  }

  fn group_nested_array(&self, expr: &str) -> String {
    format!("json_group_array(json({expr}))")
  }

  fn group_flat_array(&self, expr: &str) -> String {
    self.group_nested_array(expr)
  }

  fn array_length(&self, expr: &str) -> String {
    format!("json_array_length({expr})")
  }

  fn update(
    &self,
    table: &str,
    assignments: &[(Column, &str)],
    where_clause: &str,
  ) -> String {
    format!(
      "UPDATE {table} SET {} WHERE {where_clause}",
      render_assignments(self, assignments)
    )
  }

  fn delete(&self, table: &str, where_clause: &str) -> String {
    format!("DELETE FROM {table} WHERE {where_clause}")
  }

  fn decode_array(&self, cell: &Value) -> Result<Vec<Value>> {
    let parsed;
    let value = match cell {
      Value::String(text) => {
        parsed = serde_json::from_str::<Value>(text)?;
        &parsed
      }
      other => other,
    };
    match value {
      Value::Array(items) => Ok(items.clone()),
      Value::Null => Ok(Vec::new()),
      other => Err(Error::Decode(format!("expected a JSON array, got {other}"))),
    }
  }
}
