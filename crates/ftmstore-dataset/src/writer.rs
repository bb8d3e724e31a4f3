//! Buffered writes.
//!
//! Writers collect rows in memory and hand them to the backend once the
//! buffer reaches its size, or on an explicit [`flush`](BulkWriter::flush).
//! A failed flush either propagates the backend error or, when the writer
//! was built with `ignore_errors`, logs it and drops the batch.

use std::{
  collections::{BTreeMap, BTreeSet},
  sync::Arc,
};

use ftmstore_core::{
  Entity, FingerprintStatement, SchemaRegistry, Statement, StatusFlag,
  backend::{Backend, Batch},
  phonetic::Fingerprinter,
  query::{Column, SqlCompiler},
  statement::{StatementOptions, fingerprints_from_entity, statements_from_entity},
};

use crate::{Error, Result};

pub const DEFAULT_BULK_SIZE: usize = 100_000;

/// Rows a [`BulkWriter`] can buffer.
pub trait Insertable: Sized + Send {
  /// Plural noun used in log lines.
  const KIND: &'static str;

  fn batch(rows: Vec<Self>) -> Batch;
}

impl Insertable for Statement {
  const KIND: &'static str = "statements";

  fn batch(rows: Vec<Self>) -> Batch { Batch::Statements(rows) }
}

impl Insertable for FingerprintStatement {
  const KIND: &'static str = "fingerprints";

  fn batch(rows: Vec<Self>) -> Batch { Batch::Fingerprints(rows) }
}

// ─── BulkWriter ──────────────────────────────────────────────────────────────

pub struct BulkWriter<B, T> {
  backend:       Arc<B>,
  label:         String,
  buffer:        Vec<T>,
  size:          usize,
  ignore_errors: bool,
}

impl<B: Backend, T: Insertable> BulkWriter<B, T> {
  /// `label` names the store in log lines.
  pub fn new(
    backend: Arc<B>,
    label: impl Into<String>,
    size: usize,
    ignore_errors: bool,
  ) -> Self {
    Self {
      backend,
      label: label.into(),
      buffer: Vec::new(),
      size: size.max(1),
      ignore_errors,
    }
  }

  pub fn len(&self) -> usize { self.buffer.len() }

  pub fn is_empty(&self) -> bool { self.buffer.is_empty() }

  /// Buffer a row, flushing when the buffer is full.
  pub async fn put(&mut self, row: T) -> Result<()> {
    self.buffer.push(row);
    if self.buffer.len() >= self.size {
      self.flush().await?;
    }
    Ok(())
  }

  /// Write out the buffer. Returns the number of rows written.
  pub async fn flush(&mut self) -> Result<usize> {
    if self.buffer.is_empty() {
      return Ok(0);
    }
    let rows = std::mem::take(&mut self.buffer);
    let count = rows.len();
    match self.backend.insert(T::batch(rows)).await {
      Ok(written) => {
        tracing::info!(store = %self.label, count, "write: {}", T::KIND);
        Ok(written)
      }
      Err(e) if self.ignore_errors => {
        tracing::error!(store = %self.label, count, error = %e, "write failed: {}", T::KIND);
        Ok(0)
      }
      Err(e) => Err(Error::backend(e)),
    }
  }
}

// ─── EntityBulkWriter ────────────────────────────────────────────────────────

/// Writes entities as statements plus fingerprints of their names.
pub struct EntityBulkWriter<B> {
  registry:      Arc<dyn SchemaRegistry>,
  fingerprinter: Fingerprinter,
  dataset:       String,
  options:       StatementOptions,
  statements:    BulkWriter<B, Statement>,
  fingerprints:  BulkWriter<B, FingerprintStatement>,
}

impl<B: Backend> EntityBulkWriter<B> {
  pub fn new(
    backend: Arc<B>,
    registry: Arc<dyn SchemaRegistry>,
    dataset: impl Into<String>,
    origin: impl Into<String>,
    size: usize,
    ignore_errors: bool,
  ) -> Self {
    let dataset = dataset.into();
    Self {
      registry,
      fingerprinter: Fingerprinter::default(),
      options: StatementOptions {
        origin: origin.into(),
        ..Default::default()
      },
      statements: BulkWriter::new(backend.clone(), &dataset, size, ignore_errors),
      fingerprints: BulkWriter::new(backend, &dataset, size, ignore_errors),
      dataset,
    }
  }

  pub fn with_fingerprinter(mut self, fingerprinter: Fingerprinter) -> Self {
    self.fingerprinter = fingerprinter;
    self
  }

  pub async fn put(&mut self, entity: &Entity) -> Result<()> {
    let statements = statements_from_entity(
      self.registry.as_ref(),
      entity,
      &self.dataset,
      &self.options,
    );
    for stmt in statements {
      self.statements.put(stmt).await?;
    }
    let fingerprints = fingerprints_from_entity(
      self.registry.as_ref(),
      &mut self.fingerprinter,
      entity,
      &self.dataset,
    );
    for fpx in fingerprints {
      self.fingerprints.put(fpx).await?;
    }
    Ok(())
  }

  /// Flush fingerprints, then statements. Returns the statement rows
  /// written.
  pub async fn flush(&mut self) -> Result<usize> {
    self.fingerprints.flush().await?;
    self.statements.flush().await
  }
}

// ─── BulkUpdater ─────────────────────────────────────────────────────────────

/// Sets the status flag of buffered statements, one mutation per canonical
/// id.
pub struct BulkUpdater<B> {
  backend:       Arc<B>,
  registry:      Arc<dyn SchemaRegistry>,
  label:         String,
  status:        StatusFlag,
  buffer:        BTreeMap<String, BTreeSet<String>>,
  pending:       usize,
  size:          usize,
  ignore_errors: bool,
}

impl<B: Backend> BulkUpdater<B> {
  pub fn new(
    backend: Arc<B>,
    registry: Arc<dyn SchemaRegistry>,
    label: impl Into<String>,
    status: StatusFlag,
    size: usize,
    ignore_errors: bool,
  ) -> Self {
    Self {
      backend,
      registry,
      label: label.into(),
      status,
      buffer: BTreeMap::new(),
      pending: 0,
      size: size.max(1),
      ignore_errors,
    }
  }

  pub fn len(&self) -> usize { self.pending }

  pub fn is_empty(&self) -> bool { self.pending == 0 }

  /// Queue the statement `id` stored under `canonical_id`.
  pub async fn put(&mut self, canonical_id: &str, id: &str) -> Result<()> {
    let ids = self.buffer.entry(canonical_id.to_owned()).or_default();
    if ids.insert(id.to_owned()) {
      self.pending += 1;
    }
    if self.pending >= self.size {
      self.flush().await?;
    }
    Ok(())
  }

  /// Returns the number of rows the backend reports as updated.
  pub async fn flush(&mut self) -> Result<usize> {
    if self.buffer.is_empty() {
      return Ok(0);
    }
    let buffer = std::mem::take(&mut self.buffer);
    let count = std::mem::take(&mut self.pending);
    let dialect = self.backend.dialect();
    let compiler = SqlCompiler::new(dialect, self.registry.as_ref());
    let table = &self.backend.tables().statements;

    let mut mutations = Vec::with_capacity(buffer.len());
    for (canonical_id, ids) in buffer {
      let condition = compiler.where_clause(&[
        Column::CanonicalId.is(canonical_id),
        Column::Id.is_in(ids),
      ])?;
      mutations.push(dialect.update(
        table,
        &[(Column::StatusFlag, self.status.as_str())],
        &condition,
      ));
    }

    let mut updated = 0;
    for sql in mutations {
      match self.backend.execute(sql).await {
        Ok(n) => updated += n,
        Err(e) if self.ignore_errors => {
          tracing::error!(store = %self.label, error = %e, "update failed");
        }
        Err(e) => return Err(Error::backend(e)),
      }
    }
    tracing::info!(store = %self.label, count, "update: statements");
    Ok(updated)
  }
}
