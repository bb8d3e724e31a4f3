//! [`Store`]: entity reads and writes within a [`Scope`].

use std::{collections::VecDeque, sync::Arc};

use ftmstore_core::{
  Entity, SchemaRegistry, Statement, StatusFlag,
  backend::{Backend, Row, cell_text, cell_u64},
  phonetic::{DEFAULT_CACHE_SIZE, Fingerprinter},
  query::{Column, EntityFolder, EntityQuery, Filter, Query, SqlCompiler},
  statement::{DEFAULT_ORIGIN, STATEMENT_COLUMNS},
};

use crate::{
  Error, Result, Scope,
  traverse::Traversal,
  writer::{BulkUpdater, BulkWriter, DEFAULT_BULK_SIZE, EntityBulkWriter},
};

/// Entities per page when iterating.
pub const DEFAULT_CHUNK_SIZE: usize = 1_000;

pub struct Store<B> {
  backend:       Arc<B>,
  registry:      Arc<dyn SchemaRegistry>,
  scope:         Scope,
  origin:        Option<String>,
  bulk_size:     usize,
  cache_size:    usize,
  ignore_errors: bool,
}

impl<B> Clone for Store<B> {
  fn clone(&self) -> Self {
    Self {
      backend:       self.backend.clone(),
      registry:      self.registry.clone(),
      scope:         self.scope.clone(),
      origin:        self.origin.clone(),
      bulk_size:     self.bulk_size,
      cache_size:    self.cache_size,
      ignore_errors: self.ignore_errors,
    }
  }
}

impl<B: Backend> Store<B> {
  pub fn new(
    backend: Arc<B>,
    registry: Arc<dyn SchemaRegistry>,
    scope: Scope,
  ) -> Self {
    Self {
      backend,
      registry,
      scope,
      origin: None,
      bulk_size: DEFAULT_BULK_SIZE,
      cache_size: DEFAULT_CACHE_SIZE,
      ignore_errors: false,
    }
  }

  /// Restrict reads to statements of one origin and tag writes with it.
  pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
    self.origin = Some(origin.into());
    self
  }

  pub fn with_bulk_size(mut self, size: usize) -> Self {
    self.bulk_size = size;
    self
  }

  pub fn with_cache_size(mut self, size: usize) -> Self {
    self.cache_size = size;
    self
  }

  /// Log and skip failed writes instead of returning the error.
  pub fn with_ignore_errors(mut self, ignore: bool) -> Self {
    self.ignore_errors = ignore;
    self
  }

  pub fn backend(&self) -> &Arc<B> { &self.backend }

  pub fn registry(&self) -> &dyn SchemaRegistry { self.registry.as_ref() }

  pub fn scope(&self) -> &Scope { &self.scope }

  pub fn origin(&self) -> Option<&str> { self.origin.as_deref() }

  pub(crate) fn compiler(&self) -> SqlCompiler<'_> {
    SqlCompiler::new(self.backend.dialect(), self.registry.as_ref())
  }

  fn write_origin(&self) -> &str { self.origin.as_deref().unwrap_or(DEFAULT_ORIGIN) }

  /// The dataset writes go to.
  pub fn writable(&self) -> Result<&str> {
    match &self.scope {
      Scope::Dataset(name) => Ok(name),
      other => Err(Error::NotWritable(other.to_string())),
    }
  }

  fn scope_filters(&self) -> Vec<Filter> {
    let mut filters: Vec<Filter> = self.scope.filter().into_iter().collect();
    if let Some(origin) = &self.origin {
      filters.push(Column::Origin.is(origin));
    }
    filters
  }

  // ── Queries ──────────────────────────────────────────────────────────

  /// Statement rows within scope.
  pub fn statements_query(&self) -> Query {
    Query::new(&self.backend.tables().statements).filters(self.scope_filters())
  }

  /// Entities within scope.
  pub fn entity_query(&self) -> EntityQuery {
    EntityQuery::new(&self.backend.tables().statements)
      .filters(self.scope_filters())
  }

  /// Fingerprint rows within scope. Fingerprints carry no origin.
  pub fn fingerprint_query(&self) -> Query {
    Query::new(&self.backend.tables().fingerprints).filters(self.scope.filter())
  }

  async fn rows(&self, sql: String) -> Result<Vec<Row>> {
    self.backend.query(sql).await.map_err(Error::backend)
  }

  pub async fn entities(&self, q: &EntityQuery) -> Result<Vec<Entity>> {
    let rows = self.rows(self.compiler().entity_query(q)?).await?;
    Ok(EntityFolder::fold(
      self.backend.dialect(),
      self.registry.as_ref(),
      &rows,
    )?)
  }

  /// Page through the entities of `q`, `chunksize` at a time.
  pub fn iterate(&self, q: EntityQuery, chunksize: usize) -> EntityCursor<'_, B> {
    EntityCursor::new(self, q, chunksize)
  }

  /// Statements matching `q`; all statement columns unless `q` selects
  /// them explicitly.
  pub async fn statements(&self, q: &Query) -> Result<Vec<Statement>> {
    let q = if q.fields().is_empty() {
      q.clone().select(STATEMENT_COLUMNS.iter().copied())
    } else {
      q.clone()
    };
    let rows = self.rows(self.compiler().query(&q)?).await?;
    Ok(rows.iter().map(Statement::from_row).collect::<Result<_, _>>()?)
  }

  pub async fn count(&self, q: &Query) -> Result<u64> {
    let rows = self.rows(self.compiler().count(q)?).await?;
    first_count(&rows)
  }

  pub async fn count_entities(&self, q: &EntityQuery) -> Result<u64> {
    let rows = self.rows(self.compiler().entity_count(q)?).await?;
    first_count(&rows)
  }

  pub async fn exists(&self, q: &Query) -> Result<bool> {
    let rows = self.rows(self.compiler().exists(q)?).await?;
    Ok(first_count(&rows)? > 0)
  }

  /// Raw rows of an arbitrary query.
  pub async fn query(&self, q: &Query) -> Result<Vec<Row>> {
    self.rows(self.compiler().query(q)?).await
  }

  /// Dataset names present in the backend.
  pub async fn datasets(&self) -> Result<Vec<String>> {
    let q = Query::new(&self.backend.tables().statements)
      .select(["DISTINCT dataset"])
      .order_by(["dataset"], true);
    let rows = self.rows(self.compiler().query(&q)?).await?;
    Ok(rows.iter().map(|row| cell_text(row, 0)).collect::<Result<_, _>>()?)
  }

  // ── Lookup ───────────────────────────────────────────────────────────

  /// The canonical id an entity id currently resolves to: the canonical id
  /// of its most recent live statement, or the id itself when it already is
  /// a canonical id.
  pub async fn get_canonical_id(&self, id: &str) -> Result<String> {
    let q = self
      .statements_query()
      .select(["canonical_id"])
      .filter(Column::EntityId.is(id))
      .filter(Column::StatusFlag.is(StatusFlag::Live.as_str()))
      .order_by(["timestamp"], false)
      .nth(0)?;
    let rows = self.rows(self.compiler().query(&q)?).await?;
    if let Some(row) = rows.first() {
      return Ok(cell_text(row, 0)?);
    }
    let q = self.statements_query().filter(Column::CanonicalId.is(id));
    if self.exists(&q).await? {
      return Ok(id.to_owned());
    }
    Err(Error::EntityNotFound(id.to_owned()))
  }

  /// With `canonical`, the merged entity `id` resolves to. Without, the
  /// statements stored under `id` itself, including superseded ones.
  pub async fn get(&self, id: &str, canonical: bool) -> Result<Option<Entity>> {
    let q = if canonical {
      let canonical_id = match self.get_canonical_id(id).await {
        Ok(canonical_id) => canonical_id,
        Err(Error::EntityNotFound(_)) => return Ok(None),
        Err(e) => return Err(e),
      };
      self.entity_query().filter(Column::CanonicalId.is(canonical_id))
    } else {
      self
        .entity_query()
        .filter(Column::CanonicalId.is(id))
        .any_status()
    };
    Ok(self.entities(&q.nth(0)?).await?.into_iter().next())
  }

  /// Entities referenced by `entity`, up to `levels` hops.
  pub fn resolve(&self, entity: &Entity, levels: usize) -> Traversal<'_, B> {
    Traversal::resolve(self, entity, levels)
  }

  /// Entities referenced by or referencing `entity`, up to `levels` hops.
  pub fn expand(&self, entity: &Entity, levels: usize) -> Traversal<'_, B> {
    Traversal::expand(self, entity, levels)
  }

  // ── Writes ───────────────────────────────────────────────────────────

  pub fn bulk(&self) -> Result<EntityBulkWriter<B>> {
    Ok(
      EntityBulkWriter::new(
        self.backend.clone(),
        self.registry.clone(),
        self.writable()?,
        self.write_origin(),
        self.bulk_size,
        self.ignore_errors,
      )
      .with_fingerprinter(Fingerprinter::new(self.cache_size)),
    )
  }

  pub fn bulk_statements(&self) -> Result<BulkWriter<B, Statement>> {
    Ok(BulkWriter::new(
      self.backend.clone(),
      self.writable()?,
      self.bulk_size,
      self.ignore_errors,
    ))
  }

  pub fn bulk_updater(&self, status: StatusFlag) -> Result<BulkUpdater<B>> {
    Ok(BulkUpdater::new(
      self.backend.clone(),
      self.registry.clone(),
      self.writable()?,
      status,
      self.bulk_size,
      self.ignore_errors,
    ))
  }

  /// Write one entity immediately.
  pub async fn put(&self, entity: &Entity) -> Result<usize> {
    let mut bulk = self.bulk()?;
    bulk.put(entity).await?;
    bulk.flush().await
  }

  /// Delete the statements matching `filters` within this dataset; without
  /// filters the whole dataset is dropped.
  pub async fn delete(&self, filters: Vec<Filter>, sync: bool) -> Result<usize> {
    self.writable()?;
    if filters.is_empty() {
      return self.drop(sync).await;
    }
    let mut all = self.scope_filters();
    all.extend(filters);
    let condition = self.compiler().where_clause(&all)?;
    let sql = self
      .backend
      .dialect()
      .delete(&self.backend.tables().statements, &condition);
    let deleted = self.execute(sql).await?;
    if sync {
      self.optimize(true).await?;
    }
    Ok(deleted)
  }

  /// Delete every statement and fingerprint of this dataset.
  pub async fn drop(&self, sync: bool) -> Result<usize> {
    let dataset = self.writable()?;
    tracing::info!(dataset, "dropping dataset");
    let compiler = self.compiler();
    let dialect = self.backend.dialect();
    let tables = self.backend.tables();

    let statements = compiler.where_clause(&self.scope_filters())?;
    let fingerprints = compiler.where_clause(&[Column::Dataset.is(dataset)])?;
    let sql = [
      dialect.delete(&tables.statements, &statements),
      dialect.delete(&tables.fingerprints, &fingerprints),
    ];
    let mut deleted = 0;
    for sql in sql {
      deleted += self.execute(sql).await?;
    }
    if sync {
      self.optimize(true).await?;
    }
    Ok(deleted)
  }

  pub async fn optimize(&self, full: bool) -> Result<()> {
    self.backend.optimize(full).await.map_err(Error::backend)
  }

  async fn execute(&self, sql: String) -> Result<usize> {
    match self.backend.execute(sql).await {
      Ok(n) => Ok(n),
      Err(e) if self.ignore_errors => {
        tracing::error!(store = %self.scope, error = %e, "mutation failed");
        Ok(0)
      }
      Err(e) => Err(Error::backend(e)),
    }
  }
}

fn first_count(rows: &[Row]) -> Result<u64> {
  let row = rows
    .first()
    .ok_or_else(|| ftmstore_core::Error::Decode("empty count result".into()))?;
  Ok(cell_u64(row, 0)?)
}

// ─── EntityCursor ────────────────────────────────────────────────────────────

/// Pages through an entity query, re-issuing it for each window of
/// canonical ids. An offset or limit already set on the query bounds the
/// whole iteration.
pub struct EntityCursor<'a, B> {
  store:     &'a Store<B>,
  query:     EntityQuery,
  chunksize: usize,
  next:      usize,
  remaining: Option<usize>,
  buffer:    VecDeque<Entity>,
  done:      bool,
}

impl<'a, B: Backend> EntityCursor<'a, B> {
  fn new(store: &'a Store<B>, query: EntityQuery, chunksize: usize) -> Self {
    let next = query.inner().get_offset().unwrap_or(0);
    let remaining = query.inner().get_limit();
    Self {
      store,
      query,
      next,
      remaining,
      chunksize: chunksize.max(1),
      buffer: VecDeque::new(),
      done: false,
    }
  }

  pub async fn next(&mut self) -> Result<Option<Entity>> {
    if self.buffer.is_empty() && !self.done {
      self.fetch().await?;
    }
    Ok(self.buffer.pop_front())
  }

  /// Drain the cursor.
  pub async fn collect(mut self) -> Result<Vec<Entity>> {
    let mut out = Vec::new();
    while let Some(entity) = self.next().await? {
      out.push(entity);
    }
    Ok(out)
  }

  async fn fetch(&mut self) -> Result<()> {
    let size = match self.remaining {
      Some(remaining) => remaining.min(self.chunksize),
      None => self.chunksize,
    };
    if size == 0 {
      self.done = true;
      return Ok(());
    }
    let window = self.query.clone().offset(self.next).limit(size);
    let entities = self.store.entities(&window).await?;
    self.next += size;
    if let Some(remaining) = self.remaining.as_mut() {
      *remaining -= size;
    }
    if entities.len() < size {
      self.done = true;
    }
    self.buffer.extend(entities);
    Ok(())
  }
}
