//! SQL schema for the SQLite backend.
//!
//! Indexes stand in for the projections a columnar engine would use.

use ftmstore_core::backend::Tables;

/// Connection settings applied on open.
pub const PRAGMAS: &str = "
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
";

/// One batch per table: the table itself, then its indexes. Without
/// `exists_ok` creating a table that is already present fails.
pub fn create_tables(tables: &Tables, exists_ok: bool) -> Vec<String> {
  let Tables {
    statements: s,
    fingerprints: f,
  } = tables;
  let guard = if exists_ok { "IF NOT EXISTS " } else { "" };
  vec![
    format!(
      "
CREATE TABLE {guard}{s} (
    id           TEXT NOT NULL,   -- content hash, see stmt_key
    dataset      TEXT NOT NULL,
    canonical_id TEXT NOT NULL,
    entity_id    TEXT NOT NULL,
    schema       TEXT NOT NULL,
    prop         TEXT NOT NULL,
    prop_type    TEXT NOT NULL,
    value        TEXT NOT NULL,
    value_num    REAL,
    origin       TEXT NOT NULL,
    timestamp    TEXT NOT NULL,   -- RFC 3339 UTC
    status_flag  TEXT NOT NULL DEFAULT '',
    PRIMARY KEY (canonical_id, entity_id, id)
);
CREATE INDEX IF NOT EXISTS {s}_entity_id_idx ON {s}(entity_id);
CREATE INDEX IF NOT EXISTS {s}_value_idx     ON {s}(value);
CREATE INDEX IF NOT EXISTS {s}_dataset_idx   ON {s}(dataset);
"
    ),
    format!(
      "
CREATE TABLE {guard}{f} (
    algorithm TEXT NOT NULL,
    value     TEXT NOT NULL,
    dataset   TEXT NOT NULL,
    entity_id TEXT NOT NULL,
    schema    TEXT NOT NULL,
    prop      TEXT NOT NULL,
    prop_type TEXT NOT NULL,
    PRIMARY KEY (algorithm, value, prop, schema, dataset, entity_id)
);
CREATE INDEX IF NOT EXISTS {f}_entity_id_idx ON {f}(entity_id);
"
    ),
  ]
}

pub fn drop_tables(tables: &Tables) -> String {
  format!(
    "DROP TABLE IF EXISTS {};\nDROP TABLE IF EXISTS {};",
    tables.statements, tables.fingerprints
  )
}

/// `INSERT OR REPLACE` with one numbered placeholder per column.
pub fn insert_sql(table: &str, columns: &[&str]) -> String {
  let placeholders = (1..=columns.len())
    .map(|i| format!("?{i}"))
    .collect::<Vec<_>>()
    .join(", ");
  format!(
    "INSERT OR REPLACE INTO {table} ({}) VALUES ({placeholders})",
    columns.join(", ")
  )
}
