//! Pairwise comparison of entities.

use std::collections::BTreeSet;

use ftmstore_core::{
  Entity, SchemaRegistry, phonetic::fingerprint, resolution::Judgement,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Score {
  pub score:     f64,
  pub judgement: Judgement,
}

/// Compares two entities of compatible schemata.
pub trait Scorer: Send + Sync {
  fn compare(
    &self,
    registry: &dyn SchemaRegistry,
    left: &Entity,
    right: &Entity,
  ) -> Score;
}

/// Best token overlap between any name of one entity and any name of the
/// other, after fingerprinting.
#[derive(Debug, Clone, Copy, Default)]
pub struct NameScorer {
  auto_threshold: Option<f64>,
}

impl NameScorer {
  pub fn new() -> Self { Self::default() }

  /// Judge pairs scoring at least `threshold` as positive matches instead of
  /// leaving them unsure.
  pub fn with_auto_threshold(mut self, threshold: f64) -> Self {
    self.auto_threshold = Some(threshold);
    self
  }
}

impl Scorer for NameScorer {
  fn compare(
    &self,
    registry: &dyn SchemaRegistry,
    left: &Entity,
    right: &Entity,
  ) -> Score {
    let tokens = |e: &Entity| -> Vec<BTreeSet<String>> {
      e.names(registry)
        .iter()
        .map(|n| fingerprint(n).split(' ').map(str::to_owned).collect())
        .filter(|t: &BTreeSet<String>| !t.is_empty() && !t.contains(""))
        .collect()
    };
    let (left, right) = (tokens(left), tokens(right));

    let mut best = 0.0_f64;
    for l in &left {
      for r in &right {
        let shared = l.intersection(r).count();
        let total = l.union(r).count();
        best = best.max(shared as f64 / total as f64);
      }
    }
    let judgement = match self.auto_threshold {
      Some(threshold) if best >= threshold => Judgement::Positive,
      _ => Judgement::Unsure,
    };
    Score {
      score: best,
      judgement,
    }
  }
}

#[cfg(test)]
mod tests {
  use ftmstore_core::ModelRegistry;

  use super::*;

  fn company(id: &str, name: &str) -> Entity {
    Entity::new(id, "Company").with("name", name)
  }

  #[test]
  fn name_overlap() {
    let model = ModelRegistry::followthemoney();
    let scorer = NameScorer::new();
    let a = company("1", "Tchibo Holding AG");
    let b = company("2", "TCHIBO HOLDING");
    let score = scorer.compare(&model, &a, &b);
    assert!((score.score - 2.0 / 3.0).abs() < 1e-9);
    assert_eq!(score.judgement, Judgement::Unsure);

    let same = scorer.compare(&model, &a, &company("3", "Tchibo Holding AG"));
    assert_eq!(same.score, 1.0);
  }

  #[test]
  fn auto_threshold_judges() {
    let model = ModelRegistry::followthemoney();
    let scorer = NameScorer::new().with_auto_threshold(0.6);
    let a = company("1", "Tchibo Holding AG");
    let b = company("2", "Tchibo Holding");
    assert_eq!(scorer.compare(&model, &a, &b).judgement, Judgement::Positive);

    let c = company("3", "Something Else");
    let score = scorer.compare(&model, &a, &c);
    assert_eq!(score.score, 0.0);
    assert_eq!(score.judgement, Judgement::Unsure);
  }

  #[test]
  fn nameless_entities_score_zero() {
    let model = ModelRegistry::followthemoney();
    let a = Entity::new("1", "Company");
    let b = company("2", "Tchibo");
    assert_eq!(NameScorer::new().compare(&model, &a, &b).score, 0.0);
  }
}
