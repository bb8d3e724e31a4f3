//! Name search and schema guessing over the fingerprint table.
//!
//! Both work on the `fingerprint` algorithm only: a query string is
//! normalized with [`fingerprint`] and matched as a substring of stored
//! fingerprints.

use std::collections::BTreeSet;

use ftmstore_core::{
  Entity,
  backend::{Backend, cell_text, cell_u64},
  phonetic::{PhoneticAlgorithm, fingerprint, tokenize},
  query::{Column, EntityQuery, Query},
  schema::types,
};
use ftmstore_dataset::Store;
use serde::Serialize;

use crate::Result;

pub const DEFAULT_SEARCH_LIMIT: usize = 10;

/// An entity found by [`Search`], with the score of the fingerprint that
/// matched it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Hit {
  pub entity: Entity,
  pub score:  f64,
}

pub struct Search<'a, B> {
  store: &'a Store<B>,
  query: Option<EntityQuery>,
  limit: usize,
  fuzzy: bool,
}

impl<'a, B: Backend> Search<'a, B> {
  pub fn new(store: &'a Store<B>) -> Self {
    Self {
      store,
      query: None,
      limit: DEFAULT_SEARCH_LIMIT,
      fuzzy: false,
    }
  }

  /// Only return entities matching `query` as well.
  pub fn with_query(mut self, query: EntityQuery) -> Self {
    self.query = Some(query);
    self
  }

  pub fn with_limit(mut self, limit: usize) -> Self {
    self.limit = limit.max(1);
    self
  }

  /// When the whole query finds fewer than `limit` entities, search again
  /// for each of its long tokens, longest first.
  pub fn with_fuzzy(mut self, fuzzy: bool) -> Self {
    self.fuzzy = fuzzy;
    self
  }

  /// Fingerprints in scope containing `needle`, with how often each occurs.
  pub fn fingerprint_query(&self, needle: &str) -> Query {
    self
      .store
      .fingerprint_query()
      .select([Column::Value.to_string(), "count(*) AS freq".to_owned()])
      .filter(Column::Algorithm.is(PhoneticAlgorithm::Fingerprint.as_ref()))
      .filter(Column::Value.ilike(format!("%{needle}%")))
      .group_by([Column::Value.to_string()])
  }

  /// Matching fingerprints, best first.
  ///
  /// Frequent fingerprints score higher, and so do fingerprints the needle
  /// covers more of.
  pub async fn fingerprint_scores(
    &self,
    needle: &str,
  ) -> Result<Vec<(String, f64)>> {
    let rows = self.store.query(&self.fingerprint_query(needle)).await?;
    let needle_len = needle.chars().count() as f64;
    let mut scored = Vec::with_capacity(rows.len());
    for row in &rows {
      let value = cell_text(row, 0)?;
      let len = value.chars().count().max(1) as f64;
      let freq = cell_u64(row, 1)? as f64;
      scored.push((value, freq / len * needle_len / len));
    }
    scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    Ok(scored)
  }

  pub async fn run(&self, q: &str) -> Result<Vec<Hit>> {
    let needle = fingerprint(q);
    if needle.is_empty() {
      return Ok(Vec::new());
    }
    let mut hits = Vec::new();
    let mut seen = BTreeSet::new();
    self.collect(&needle, 1.0, &mut hits, &mut seen).await?;

    if self.fuzzy && hits.len() < self.limit {
      let mut tokens: Vec<String> = tokenize(&needle).into_iter().collect();
      tokens.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
      for token in tokens {
        if hits.len() >= self.limit {
          break;
        }
        let weight = 1.0 / token.chars().count() as f64;
        self.collect(&token, weight, &mut hits, &mut seen).await?;
      }
    }
    tracing::debug!(q, hits = hits.len(), fuzzy = self.fuzzy, "search");
    Ok(hits)
  }

  /// Append unseen entities matching `needle` until the limit is reached.
  async fn collect(
    &self,
    needle: &str,
    weight: f64,
    hits: &mut Vec<Hit>,
    seen: &mut BTreeSet<String>,
  ) -> Result<()> {
    let base = self
      .query
      .clone()
      .unwrap_or_else(|| self.store.entity_query());
    for (value, score) in self.fingerprint_scores(needle).await? {
      let ids = self
        .store
        .fingerprint_query()
        .select([Column::EntityId.to_string()])
        .filter(Column::Algorithm.is(PhoneticAlgorithm::Fingerprint.as_ref()))
        .filter(Column::Value.is(&value));
      let q = base.clone().filter(Column::EntityId.is_in(ids));
      for entity in self.store.entities(&q).await? {
        if hits.len() >= self.limit {
          return Ok(());
        }
        if seen.insert(entity.id.clone()) {
          hits.push(Hit {
            entity,
            score: score * weight,
          });
        }
      }
    }
    Ok(())
  }
}

/// The most likely schema for an entity, judged by the schemata of stored
/// entities sharing one of its name fingerprints.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchemaGuess {
  pub schema: String,
  /// Share of the matching entities that have this schema.
  pub score:  f64,
}

pub async fn guess_schema<B: Backend>(
  store: &Store<B>,
  entity: &Entity,
) -> Result<Option<SchemaGuess>> {
  let fingerprints: BTreeSet<String> = entity
    .type_values(store.registry(), types::NAME)
    .map(|(_, name)| fingerprint(name))
    .filter(|fp| !fp.is_empty())
    .collect();
  if fingerprints.is_empty() {
    return Ok(None);
  }
  let q = store
    .fingerprint_query()
    .select([
      Column::Schema.to_string(),
      format!("count(DISTINCT {}) AS entities", Column::EntityId),
    ])
    .filter(Column::Algorithm.is(PhoneticAlgorithm::Fingerprint.as_ref()))
    .filter(Column::Value.is_in(fingerprints))
    .group_by([Column::Schema.to_string()]);

  let mut counts = Vec::new();
  for row in &store.query(&q).await? {
    counts.push((cell_text(row, 0)?, cell_u64(row, 1)?));
  }
  let total: u64 = counts.iter().map(|(_, n)| n).sum();
  let best = counts
    .into_iter()
    .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(&a.0)));
  Ok(best.filter(|_| total > 0).map(|(schema, n)| SchemaGuess {
    schema,
    score: n as f64 / total as f64,
  }))
}
