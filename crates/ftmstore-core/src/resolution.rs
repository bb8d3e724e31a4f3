//! Match decisions between pairs of entities.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Judgement {
  Positive,
  Negative,
  Unsure,
}

/// A scored, judged link between two entity ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
  pub source_id: String,
  pub target_id: String,
  pub judgement: Judgement,
  pub score:     Option<f64>,
}

impl Edge {
  /// Edges are undirected; the key orders the two ids.
  pub fn key(&self) -> (&str, &str) {
    pair_key(&self.source_id, &self.target_id)
  }
}

pub fn pair_key<'a>(a: &'a str, b: &'a str) -> (&'a str, &'a str) {
  if a <= b { (a, b) } else { (b, a) }
}
