//! Turning positive matches into canonical ids.

use std::collections::BTreeMap;

use ftmstore_core::{
  backend::Backend,
  resolution::{Edge, Judgement},
};
use ftmstore_dataset::{Error as StoreError, Store};
use petgraph::unionfind::UnionFind;
use uuid::Uuid;

use crate::Result;

/// Prefix of minted canonical ids.
pub const PLACEHOLDER_PREFIX: &str = "NK-";

/// How the canonical id of a connected group is chosen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CanonicalMode {
  /// The longest member id; ties go to the lexicographically smallest.
  ///
  /// This keeps the most specific id, where a shortest-id rule would keep
  /// bare ids over their namespaced forms. Use [`CanonicalMode::Mint`] for
  /// ids independent of the members.
  #[default]
  Longest,
  /// A placeholder id: one already in the group, or a freshly minted one.
  Mint,
}

pub fn is_placeholder(id: &str) -> bool { id.starts_with(PLACEHOLDER_PREFIX) }

/// The `(source, target)` pairs of positive edges.
pub fn positive_pairs(edges: &[Edge]) -> Vec<(String, String)> {
  edges
    .iter()
    .filter(|e| e.judgement == Judgement::Positive)
    .map(|e| (e.source_id.clone(), e.target_id.clone()))
    .collect()
}

/// Group matched ids into connected components and assign each component a
/// canonical id.
///
/// Returns `(canonical_id, entity_id)` for every member other than the
/// canonical id itself. Placeholder ids are never emitted as members.
pub fn apply<I>(pairs: I, mode: CanonicalMode) -> Vec<(String, String)>
where
  I: IntoIterator<Item = (String, String)>,
{
  let pairs: Vec<(String, String)> = pairs.into_iter().collect();
  let mut index: BTreeMap<&str, usize> = BTreeMap::new();
  for (a, b) in &pairs {
    for id in [a, b] {
      let next = index.len();
      index.entry(id.as_str()).or_insert(next);
    }
  }

  let mut uf = UnionFind::<usize>::new(index.len());
  for (a, b) in &pairs {
    uf.union(index[a.as_str()], index[b.as_str()]);
  }
  let labels = uf.into_labeling();

  let mut components: BTreeMap<usize, Vec<&str>> = BTreeMap::new();
  for (id, i) in &index {
    components.entry(labels[*i]).or_default().push(*id);
  }

  let mut out = Vec::new();
  for members in components.into_values() {
    let canonical = match mode {
      CanonicalMode::Longest => members
        .iter()
        .copied()
        .max_by(|a, b| a.len().cmp(&b.len()).then_with(|| b.cmp(a)))
        .map(str::to_owned),
      CanonicalMode::Mint => Some(
        members
          .iter()
          .find(|id| is_placeholder(id))
          .map_or_else(
            || format!("{PLACEHOLDER_PREFIX}{}", Uuid::new_v4()),
            |id| (*id).to_owned(),
          ),
      ),
    };
    let Some(canonical) = canonical else { continue };
    for member in members {
      if member != canonical && !is_placeholder(member) {
        out.push((canonical.clone(), member.to_owned()));
      }
    }
  }
  out
}

/// Canonize each `(canonical_id, entity_id)` pair in `store`.
///
/// Ids missing from the store are skipped. Returns the number of entities
/// moved.
pub async fn apply_to_store<B: Backend>(
  store: &Store<B>,
  pairs: &[(String, String)],
  sync: bool,
) -> Result<usize> {
  let mut moved = 0;
  for (canonical_id, entity_id) in pairs {
    match store.canonize(entity_id, canonical_id, false).await {
      Ok(report) if report.written > 0 => moved += 1,
      Ok(_) => {}
      Err(StoreError::EntityNotFound(id)) => {
        tracing::warn!(entity_id = %id, "skipping unknown entity");
      }
      Err(e) => return Err(e.into()),
    }
  }
  if sync {
    store.optimize(true).await?;
  }
  tracing::info!(pairs = pairs.len(), moved, "applied");
  Ok(moved)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
    items
      .iter()
      .map(|(a, b)| ((*a).to_owned(), (*b).to_owned()))
      .collect()
  }

  #[test]
  fn longest_id_wins() {
    let out = apply(
      pairs(&[("a", "bbb"), ("bbb", "cc"), ("x", "y")]),
      CanonicalMode::Longest,
    );
    assert_eq!(out, pairs(&[("bbb", "a"), ("bbb", "cc"), ("x", "y")]));
  }

  #[test]
  fn mint_reuses_placeholders() {
    let out = apply(pairs(&[("a", "NK-1"), ("b", "a")]), CanonicalMode::Mint);
    assert_eq!(out, pairs(&[("NK-1", "a"), ("NK-1", "b")]));

    let minted = apply(pairs(&[("a", "b")]), CanonicalMode::Mint);
    assert_eq!(minted.len(), 2);
    assert!(is_placeholder(&minted[0].0));
    assert_eq!(minted[0].0, minted[1].0);
  }

  #[test]
  fn placeholders_are_not_members() {
    let out = apply(
      pairs(&[("NK-short", "a-much-longer-id"), ("NK-2", "a-much-longer-id")]),
      CanonicalMode::Longest,
    );
    assert_eq!(out, Vec::<(String, String)>::new());
  }

  #[test]
  fn only_positive_edges_apply() {
    let edge = |a: &str, b: &str, judgement| Edge {
      source_id: a.to_owned(),
      target_id: b.to_owned(),
      judgement,
      score: None,
    };
    let edges = [
      edge("a", "b", Judgement::Positive),
      edge("b", "c", Judgement::Negative),
      edge("c", "d", Judgement::Unsure),
    ];
    assert_eq!(positive_pairs(&edges), pairs(&[("a", "b")]));
  }
}
