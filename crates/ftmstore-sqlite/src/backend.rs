//! [`SqliteBackend`]: the SQLite implementation of [`Backend`].

use std::path::Path;

use ftmstore_core::{
  backend::{Backend, Batch, Row, Tables},
  query::Dialect,
  statement::{FINGERPRINT_COLUMNS, STATEMENT_COLUMNS, encode_timestamp},
};

use crate::{
  Result,
  dialect::SqliteDialect,
  encode,
  schema::{PRAGMAS, create_tables, drop_tables, insert_sql},
};

/// A statement store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteBackend {
  conn:    tokio_rusqlite::Connection,
  tables:  Tables,
  dialect: SqliteDialect,
}

impl SqliteBackend {
  /// Open (or create) a database at `path` and make sure the tables exist.
  pub async fn open(path: impl AsRef<Path>, tables: Tables) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    Self::init(conn, tables).await
  }

  /// Open an in-memory database with the default table names.
  pub async fn open_in_memory() -> Result<Self> {
    Self::open_in_memory_with(Tables::default()).await
  }

  pub async fn open_in_memory_with(tables: Tables) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    Self::init(conn, tables).await
  }

  async fn init(conn: tokio_rusqlite::Connection, tables: Tables) -> Result<Self> {
    conn
      .call(|conn| {
        conn.execute_batch(PRAGMAS)?;
        Ok(())
      })
      .await?;
    let backend = Self {
      conn,
      tables,
      dialect: SqliteDialect,
    };
    backend.ensure(false, true).await?;
    Ok(backend)
  }
}

impl Backend for SqliteBackend {
  type Error = crate::Error;

  fn dialect(&self) -> &dyn Dialect { &self.dialect }

  fn tables(&self) -> &Tables { &self.tables }

  async fn ensure(&self, recreate: bool, exists_ok: bool) -> Result<()> {
    let drop_sql = recreate.then(|| drop_tables(&self.tables));
    let ddl = create_tables(&self.tables, exists_ok);
    self
      .conn
      .call(move |conn| {
        if let Some(drop_sql) = drop_sql {
          conn.execute_batch(&drop_sql)?;
        }
        for batch in ddl {
          conn.execute_batch(&batch)?;
        }
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn query(&self, sql: String) -> Result<Vec<Row>> {
    tracing::debug!(%sql, "query");
    let rows = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let width = stmt.column_count();
        let rows = stmt
          .query_map([], |row| {
            (0..width)
              .map(|i| row.get_ref(i).map(encode::cell))
              .collect::<rusqlite::Result<Row>>()
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    Ok(rows)
  }

  async fn execute(&self, sql: String) -> Result<usize> {
    tracing::debug!(%sql, "execute");
    let affected = self
      .conn
      .call(move |conn| Ok(conn.execute(&sql, [])?))
      .await?;
    Ok(affected)
  }

  async fn insert(&self, batch: Batch) -> Result<usize> {
    if batch.is_empty() {
      return Ok(0);
    }
    let statements = self.tables.statements.clone();
    let fingerprints = self.tables.fingerprints.clone();
    let written = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let count = batch.len();
        match batch {
          Batch::Statements(rows) => {
            let mut stmt =
              tx.prepare(&insert_sql(&statements, STATEMENT_COLUMNS))?;
            for s in rows {
              stmt.execute(rusqlite::params![
                s.id,
                s.dataset,
                s.canonical_id,
                s.entity_id,
                s.schema,
                s.prop,
                s.prop_type,
                s.value,
                s.value_num,
                s.origin,
                encode_timestamp(s.timestamp),
                s.status_flag.as_str(),
              ])?;
            }
          }
          Batch::Fingerprints(rows) => {
            let mut stmt =
              tx.prepare(&insert_sql(&fingerprints, FINGERPRINT_COLUMNS))?;
            for f in rows {
              stmt.execute(rusqlite::params![
                f.algorithm.to_string(),
                f.value,
                f.dataset,
                f.entity_id,
                f.schema,
                f.prop,
                f.prop_type,
              ])?;
            }
          }
        }
        tx.commit()?;
        Ok(count)
      })
      .await?;
    Ok(written)
  }

  async fn optimize(&self, full: bool) -> Result<()> {
    self
      .conn
      .call(move |conn| {
        conn.execute_batch("PRAGMA optimize;")?;
        if full {
          conn.execute_batch("VACUUM;")?;
        }
        Ok(())
      })
      .await?;
    Ok(())
  }
}
