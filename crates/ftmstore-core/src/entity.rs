//! Entity: the aggregate reassembled from statements.
//!
//! Serializes as FollowTheMoney-style JSON:
//! `{"id": .., "schema": .., "properties": {prop: [values]}, "datasets": [..]}`.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::{
  Error, Result,
  schema::{SchemaRegistry, types},
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
  #[serde(default)]
  pub id:         String,
  #[serde(default)]
  pub schema:     String,
  #[serde(default)]
  pub properties: BTreeMap<String, BTreeSet<String>>,
  #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
  pub datasets:   BTreeSet<String>,
}

impl Entity {
  pub fn new(id: impl Into<String>, schema: impl Into<String>) -> Self {
    Self {
      id: id.into(),
      schema: schema.into(),
      ..Default::default()
    }
  }

  /// Add a value; empty values are dropped.
  pub fn add(&mut self, prop: impl Into<String>, value: impl Into<String>) {
    let value = value.into();
    if value.is_empty() {
      return;
    }
    self.properties.entry(prop.into()).or_default().insert(value);
  }

  /// Builder-style [`add`](Self::add).
  pub fn with(mut self, prop: &str, value: &str) -> Self {
    self.add(prop, value);
    self
  }

  pub fn get(&self, prop: &str) -> Option<&BTreeSet<String>> {
    self.properties.get(prop)
  }

  pub fn first(&self, prop: &str) -> Option<&str> {
    self.get(prop)?.first().map(String::as_str)
  }

  /// Every `(prop, value)` pair in property order.
  pub fn values(&self) -> impl Iterator<Item = (&str, &str)> {
    self
      .properties
      .iter()
      .flat_map(|(p, vs)| vs.iter().map(move |v| (p.as_str(), v.as_str())))
  }

  /// Values of every property of the given type.
  pub fn type_values<'a>(
    &'a self,
    registry: &'a dyn SchemaRegistry,
    prop_type: &'a str,
  ) -> impl Iterator<Item = (&'a str, &'a str)> + 'a {
    self.values().filter(move |(prop, _)| {
      registry
        .property(&self.schema, prop)
        .is_some_and(|p| p.prop_type == prop_type)
    })
  }

  pub fn names(&self, registry: &dyn SchemaRegistry) -> BTreeSet<String> {
    self
      .type_values(registry, types::NAME)
      .map(|(_, v)| v.to_owned())
      .collect()
  }

  /// Ids of the entities this one points at.
  pub fn references(&self, registry: &dyn SchemaRegistry) -> BTreeSet<String> {
    self
      .type_values(registry, types::ENTITY)
      .map(|(_, v)| v.to_owned())
      .collect()
  }

  /// Fold another partial view of the same entity into this one.
  ///
  /// The schema becomes the common schema of both sides; properties and
  /// datasets are unioned.
  pub fn merge(
    &mut self,
    other: &Entity,
    registry: &dyn SchemaRegistry,
  ) -> Result<()> {
    if self.schema.is_empty() {
      self.schema = other.schema.clone();
    } else if !other.schema.is_empty() && other.schema != self.schema {
      self.schema = registry
        .common_schema(&self.schema, &other.schema)
        .ok_or_else(|| Error::SchemaMismatch {
          left:  self.schema.clone(),
          right: other.schema.clone(),
        })?;
    }
    for (prop, values) in &other.properties {
      self
        .properties
        .entry(prop.clone())
        .or_default()
        .extend(values.iter().cloned());
    }
    self.datasets.extend(other.datasets.iter().cloned());
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::ModelRegistry;

  #[test]
  fn add_skips_empty_values() {
    let mut e = Entity::new("a", "Person");
    e.add("name", "");
    e.add("name", "Ann");
    e.add("name", "Ann");
    assert_eq!(e.get("name").unwrap().len(), 1);
    assert_eq!(e.first("name"), Some("Ann"));
  }

  #[test]
  fn merge_unions_schema_and_values() {
    let model = ModelRegistry::followthemoney();
    let mut left = Entity::new("a", "LegalEntity").with("name", "ACME");
    let right = Entity::new("a", "Company").with("name", "ACME Inc");
    left.merge(&right, &model).unwrap();
    assert_eq!(left.schema, "Company");
    assert_eq!(left.get("name").unwrap().len(), 2);
  }

  #[test]
  fn merge_rejects_incompatible_schemata() {
    let model = ModelRegistry::followthemoney();
    let mut left = Entity::new("a", "Person");
    let err = left.merge(&Entity::new("a", "Company"), &model).unwrap_err();
    assert!(matches!(err, Error::SchemaMismatch { .. }));
  }

  #[test]
  fn references_and_names() {
    let model = ModelRegistry::followthemoney();
    let m = Entity::new("m", "Membership")
      .with("member", "1")
      .with("organization", "2")
      .with("role", "chair");
    let refs: Vec<_> = m.references(&model).into_iter().collect();
    assert_eq!(refs, vec!["1", "2"]);

    let p = Entity::new("p", "Person")
      .with("name", "Ann")
      .with("firstName", "Ann")
      .with("nationality", "de");
    assert_eq!(p.names(&model).len(), 1);
  }

  #[test]
  fn deserializes_ftm_json() {
    let e: Entity = serde_json::from_str(
      r#"{"id": "x", "schema": "Person", "properties": {"name": ["Ann"]}}"#,
    )
    .unwrap();
    assert_eq!(e.first("name"), Some("Ann"));
    assert!(e.datasets.is_empty());
  }
}
