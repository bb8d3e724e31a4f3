//! Command implementations.

use std::{io::Write, path::Path, sync::Arc};

use anyhow::Context as _;
use ftmstore_core::{
  Entity, ModelRegistry, SchemaRegistry,
  backend::{Backend, Tables},
  phonetic::PhoneticAlgorithm,
  query::Column,
  resolution::Edge,
};
use ftmstore_dataset::{DEFAULT_CHUNK_SIZE, Scope, Store};
use ftmstore_sqlite::SqliteBackend;
use ftmstore_xref::{
  Blocker, CanonicalMode, NameScorer, Search, apply, apply_to_store,
  get_candidates, positive_pairs, xref,
};
use serde::de::DeserializeOwned;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

use crate::settings::Settings;

pub struct XrefArgs {
  pub datasets:       String,
  pub left:           Option<String>,
  pub algorithm:      String,
  pub schema:         Option<String>,
  pub threshold:      f64,
  pub min_datasets:   usize,
  pub auto_threshold: Option<f64>,
}

pub struct App {
  settings: Settings,
  backend:  Arc<SqliteBackend>,
  registry: Arc<dyn SchemaRegistry>,
}

impl App {
  pub async fn open(settings: Settings) -> anyhow::Result<Self> {
    let registry: Arc<dyn SchemaRegistry> = match &settings.model_path {
      Some(path) => {
        let raw = tokio::fs::read_to_string(path)
          .await
          .with_context(|| format!("reading model {}", path.display()))?;
        Arc::new(ModelRegistry::from_json(&raw).context("parsing model")?)
      }
      None => Arc::new(ModelRegistry::followthemoney()),
    };
    let path = &settings.database_path;
    let backend = SqliteBackend::open(path, Tables::new(&settings.table))
      .await
      .with_context(|| format!("failed to open database at {path:?}"))?;
    Ok(Self::new(settings, Arc::new(backend), registry))
  }

  pub fn new(
    settings: Settings,
    backend: Arc<SqliteBackend>,
    registry: Arc<dyn SchemaRegistry>,
  ) -> Self {
    Self {
      settings,
      backend,
      registry,
    }
  }

  pub(crate) fn store(&self, scope: &str) -> Store<SqliteBackend> {
    let store = Store::new(
      self.backend.clone(),
      self.registry.clone(),
      Scope::parse(scope),
    )
    .with_bulk_size(self.settings.bulk_write_size)
    .with_cache_size(self.settings.phonetic_cache_size);
    match &self.settings.origin {
      Some(origin) => store.with_origin(origin),
      None => store,
    }
  }

  pub async fn init(&self, recreate: bool) -> anyhow::Result<()> {
    self.backend.ensure(recreate, true).await?;
    tracing::info!(table = %self.settings.table, recreate, "initialized");
    Ok(())
  }

  pub async fn write(
    &self,
    dataset: &str,
    input: &Path,
    origin: Option<String>,
    ignore_errors: bool,
    optimize: bool,
  ) -> anyhow::Result<()> {
    let mut store = self.store(dataset).with_ignore_errors(ignore_errors);
    if let Some(origin) = origin {
      store = store.with_origin(origin);
    }
    let mut bulk = store.bulk()?;
    let mut count = 0;
    let mut line_no = 0;
    let mut lines = open(input).await?.lines();
    while let Some(line) = lines.next_line().await? {
      line_no += 1;
      let Some(entity) = parse_line::<Entity>(&line, line_no)? else {
        continue;
      };
      bulk.put(&entity).await?;
      count += 1;
    }
    bulk.flush().await?;
    if optimize {
      store.optimize(true).await?;
    }
    tracing::info!(dataset, entities = count, "write complete");
    Ok(())
  }

  pub async fn iterate(
    &self,
    datasets: &str,
    schema: Option<&str>,
    limit: Option<usize>,
    out: &mut impl Write,
  ) -> anyhow::Result<()> {
    let store = self.store(datasets);
    let mut q = store.entity_query();
    if let Some(schema) = schema {
      q = q.filter(Column::Schema.is(schema));
    }
    if let Some(limit) = limit {
      q = q.limit(limit);
    }
    let mut cursor = store.iterate(q, DEFAULT_CHUNK_SIZE);
    while let Some(entity) = cursor.next().await? {
      writeln!(out, "{}", serde_json::to_string(&entity)?)?;
    }
    Ok(())
  }

  pub async fn canonize(
    &self,
    dataset: &str,
    entity_id: &str,
    canonical_id: &str,
    sync: bool,
  ) -> anyhow::Result<()> {
    let report = self
      .store(dataset)
      .canonize(entity_id, canonical_id, sync)
      .await
      .with_context(|| format!("canonizing {entity_id}"))?;
    tracing::info!(
      written = report.written,
      superseded = report.superseded,
      "canonize complete"
    );
    Ok(())
  }

  pub async fn xref(
    &self,
    args: XrefArgs,
    out: &mut impl Write,
  ) -> anyhow::Result<()> {
    let store = self.store(&args.datasets);
    let mut blocker = Blocker::new(&store)
      .with_algorithm(PhoneticAlgorithm::parse(&args.algorithm)?);
    if let Some(left) = &args.left {
      blocker = blocker.with_left_dataset(left);
    }
    if let Some(schema) = &args.schema {
      blocker = blocker.with_schema(schema);
    }
    let scorer = match args.auto_threshold {
      Some(threshold) => NameScorer::new().with_auto_threshold(threshold),
      None => NameScorer::new(),
    };

    let result = xref(&blocker, &scorer).await?;
    let candidates = get_candidates(
      &result,
      args.threshold,
      args.min_datasets,
      args.left.as_deref(),
    );
    for candidate in &candidates {
      let edge = Edge {
        source_id: candidate.right.id.clone(),
        target_id: candidate.left.id.clone(),
        judgement: candidate.judgement,
        score:     Some(candidate.score),
      };
      writeln!(out, "{}", serde_json::to_string(&edge)?)?;
    }
    tracing::info!(candidates = candidates.len(), "xref complete");
    Ok(())
  }

  pub async fn search(
    &self,
    datasets: &str,
    q: &str,
    limit: usize,
    fuzzy: bool,
    out: &mut impl Write,
  ) -> anyhow::Result<()> {
    let store = self.store(datasets);
    let hits = Search::new(&store)
      .with_limit(limit)
      .with_fuzzy(fuzzy)
      .run(q)
      .await?;
    for hit in &hits {
      writeln!(out, "{}", serde_json::to_string(hit)?)?;
    }
    tracing::info!(q, hits = hits.len(), "search complete");
    Ok(())
  }

  /// Canonize in every dataset of the scope; entities absent from a dataset
  /// are skipped there.
  pub async fn apply(
    &self,
    datasets: &str,
    input: &Path,
    mint: bool,
    sync: bool,
  ) -> anyhow::Result<()> {
    let mut edges = Vec::new();
    let mut line_no = 0;
    let mut lines = open(input).await?.lines();
    while let Some(line) = lines.next_line().await? {
      line_no += 1;
      if let Some(edge) = parse_line::<Edge>(&line, line_no)? {
        edges.push(edge);
      }
    }
    let mode = if mint {
      CanonicalMode::Mint
    } else {
      CanonicalMode::Longest
    };
    let pairs = apply(positive_pairs(&edges), mode);

    let names = match Scope::parse(datasets) {
      Scope::Dataset(name) => vec![name],
      Scope::Catalog(names) => names,
      Scope::All => self.store(datasets).datasets().await?,
    };
    let mut moved = 0;
    for name in &names {
      moved += apply_to_store(&self.store(name), &pairs, false).await?;
    }
    if sync {
      self.backend.optimize(true).await?;
    }
    tracing::info!(
      edges = edges.len(),
      pairs = pairs.len(),
      moved,
      "apply complete"
    );
    Ok(())
  }
}

async fn open(path: &Path) -> anyhow::Result<Box<dyn AsyncBufRead + Unpin>> {
  if path == Path::new("-") {
    return Ok(Box::new(BufReader::new(tokio::io::stdin())));
  }
  let file = tokio::fs::File::open(path)
    .await
    .with_context(|| format!("failed to open {}", path.display()))?;
  Ok(Box::new(BufReader::new(file)))
}

/// Blank lines are skipped; `line_no` counts from one.
fn parse_line<T: DeserializeOwned>(
  line: &str,
  line_no: usize,
) -> anyhow::Result<Option<T>> {
  let line = line.trim();
  if line.is_empty() {
    return Ok(None);
  }
  serde_json::from_str(line)
    .map(Some)
    .with_context(|| format!("invalid JSON on line {line_no}"))
}
