//! Scoring the members of each block and selecting candidates.

use std::collections::{BTreeMap, BTreeSet};

use ftmstore_core::{
  Entity,
  backend::Backend,
  resolution::{Edge, Judgement, pair_key},
};
use serde::Serialize;

use crate::{Blocker, Result, Scorer};

/// Scored edges plus every entity they mention.
#[derive(Debug, Clone, Default)]
pub struct XrefResult {
  pub entities: BTreeMap<String, Entity>,
  pub edges:    Vec<Edge>,
}

/// A pair of entities worth looking at, the left one first.
#[derive(Debug, Clone, Serialize)]
pub struct Candidate {
  pub left:      Entity,
  pub right:     Entity,
  pub judgement: Judgement,
  pub score:     f64,
}

/// Compare every pair of entities within each block.
///
/// Each unordered pair is scored once, however many blocks it shares. Pairs
/// of one entity with itself, and pairs whose schemata cannot describe the
/// same thing, are skipped. Only pairs scoring above zero become edges.
pub async fn xref<B, S>(blocker: &Blocker<'_, B>, scorer: &S) -> Result<XrefResult>
where
  B: Backend,
  S: Scorer + ?Sized,
{
  let registry = blocker.store().registry();
  let mut result = XrefResult::default();
  let mut scored: BTreeSet<(String, String)> = BTreeSet::new();

  for block in blocker.blocks().await? {
    let entities = blocker.load(&block).await?;
    tracing::debug!(
      value = %block.value,
      entities = entities.len(),
      "scoring block"
    );
    for (i, left) in entities.iter().enumerate() {
      for right in &entities[i + 1..] {
        if left.id == right.id {
          continue;
        }
        let (a, b) = pair_key(&left.id, &right.id);
        if !scored.insert((a.to_owned(), b.to_owned())) {
          continue;
        }
        if registry.common_schema(&left.schema, &right.schema).is_none() {
          continue;
        }
        let score = scorer.compare(registry, left, right);
        if score.score <= 0.0 {
          continue;
        }
        result.edges.push(Edge {
          source_id: right.id.clone(),
          target_id: left.id.clone(),
          judgement: score.judgement,
          score:     Some(score.score),
        });
        for e in [left, right] {
          result
            .entities
            .entry(e.id.clone())
            .or_insert_with(|| e.clone());
        }
      }
    }
  }
  tracing::info!(
    entities = result.entities.len(),
    edges = result.edges.len(),
    "xref"
  );
  Ok(result)
}

/// Edges scoring above `threshold` whose two entities together span at least
/// `min_datasets` datasets, best first.
///
/// When a left dataset is given, the entity from it comes first in each
/// pair.
pub fn get_candidates(
  result: &XrefResult,
  threshold: f64,
  min_datasets: usize,
  left_dataset: Option<&str>,
) -> Vec<Candidate> {
  let mut out = Vec::new();
  for edge in &result.edges {
    let score = edge.score.unwrap_or_default();
    if score <= threshold {
      continue;
    }
    let (Some(mut left), Some(mut right)) = (
      result.entities.get(&edge.target_id),
      result.entities.get(&edge.source_id),
    ) else {
      continue;
    };
    if left.datasets.union(&right.datasets).count() < min_datasets {
      continue;
    }
    if let Some(dataset) = left_dataset
      && right.datasets.contains(dataset)
      && !left.datasets.contains(dataset)
    {
      std::mem::swap(&mut left, &mut right);
    }
    out.push(Candidate {
      left: left.clone(),
      right: right.clone(),
      judgement: edge.judgement,
      score,
    });
  }
  out.sort_by(|a, b| b.score.total_cmp(&a.score));
  out
}
