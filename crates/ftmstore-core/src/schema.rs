//! Schema registry: the seam between the store and an entity model.
//!
//! The store never validates entities; it only needs to know the type of a
//! property, whether one schema extends another and how two schemata combine.
//! [`ModelRegistry`] is the in-memory implementation and ships a subset of the
//! FollowTheMoney model.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Well-known property type names.
pub mod types {
  pub const ADDRESS: &str = "address";
  pub const COUNTRY: &str = "country";
  pub const DATE: &str = "date";
  pub const EMAIL: &str = "email";
  pub const ENTITY: &str = "entity";
  pub const IDENTIFIER: &str = "identifier";
  pub const NAME: &str = "name";
  pub const NUMBER: &str = "number";
  pub const PHONE: &str = "phone";
  pub const STRING: &str = "string";
  pub const TEXT: &str = "text";
  pub const URL: &str = "url";
}

// ─── Resolved model types ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
  pub name:      String,
  #[serde(rename = "type")]
  pub prop_type: String,
  pub matchable: bool,
}

/// A schema with its inheritance flattened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
  pub name:       String,
  pub extends:    Vec<String>,
  pub matchable:  bool,
  /// Every schema this one is, including itself.
  pub ancestors:  BTreeSet<String>,
  /// Own and inherited properties.
  pub properties: BTreeMap<String, Property>,
}

impl Schema {
  pub fn is_a(&self, ancestor: &str) -> bool { self.ancestors.contains(ancestor) }
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Read-only access to an entity model.
///
/// Only [`schema`](Self::schema), [`schema_names`](Self::schema_names) and
/// [`property_type`](Self::property_type) are required; the graph queries
/// have default implementations on top of them.
pub trait SchemaRegistry: Send + Sync {
  fn schema(&self, name: &str) -> Option<&Schema>;

  fn schema_names(&self) -> Vec<&str>;

  /// The type of a property name in any schema.
  fn property_type(&self, prop: &str) -> Option<&str>;

  fn property(&self, schema: &str, prop: &str) -> Option<&Property> {
    self.schema(schema)?.properties.get(prop)
  }

  fn has_property(&self, prop: &str) -> bool { self.property_type(prop).is_some() }

  fn is_a(&self, schema: &str, ancestor: &str) -> bool {
    self.schema(schema).is_some_and(|s| s.is_a(ancestor))
  }

  /// The most specific schema an entity can take when it is known to be both
  /// `left` and `right`, or `None` if the two cannot describe one entity.
  fn common_schema(&self, left: &str, right: &str) -> Option<String> {
    self.schema(left)?;
    self.schema(right)?;
    if self.is_a(left, right) {
      return Some(left.to_owned());
    }
    if self.is_a(right, left) {
      return Some(right.to_owned());
    }
    let candidates: Vec<&str> = self
      .schema_names()
      .into_iter()
      .filter(|name| self.is_a(name, left) && self.is_a(name, right))
      .collect();
    let general: Vec<&str> = candidates
      .iter()
      .copied()
      .filter(|c| !candidates.iter().any(|d| d != c && self.is_a(c, d)))
      .collect();
    match general.as_slice() {
      [only] => Some((*only).to_owned()),
      _ => None,
    }
  }

  /// Schemata whose entities may be compared with entities of `name`.
  ///
  /// Matchable ancestors and descendants plus the schema itself; when the
  /// schema is not matchable, all of its descendants as well.
  fn matchable_schemata(&self, name: &str) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    let Some(schema) = self.schema(name) else {
      return out;
    };
    out.insert(schema.name.clone());
    for other in self.schema_names() {
      let related = self.is_a(name, other) || self.is_a(other, name);
      let Some(candidate) = self.schema(other) else { continue };
      if related && candidate.matchable {
        out.insert(other.to_owned());
      }
      if !schema.matchable && self.is_a(other, name) {
        out.insert(other.to_owned());
      }
    }
    out
  }
}

// ─── Model definition ────────────────────────────────────────────────────────

/// Serialized description of one schema, as found in a JSON model file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaDef {
  #[serde(default)]
  pub extends:    Vec<String>,
  #[serde(default)]
  pub matchable:  bool,
  #[serde(default)]
  pub properties: BTreeMap<String, PropertyDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertyDef {
  #[serde(rename = "type")]
  pub prop_type: String,
  #[serde(default = "default_matchable")]
  pub matchable: bool,
}

fn default_matchable() -> bool { true }

#[derive(Debug, Clone, Deserialize)]
struct ModelDef {
  schemata: BTreeMap<String, SchemaDef>,
}

// ─── ModelRegistry ───────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ModelRegistry {
  schemata: BTreeMap<String, Schema>,
  types:    BTreeMap<String, String>,
}

impl ModelRegistry {
  /// Build a registry from schema definitions.
  ///
  /// Fails with [`Error::UnknownSchema`] if a schema extends one that is not
  /// defined.
  pub fn new(defs: BTreeMap<String, SchemaDef>) -> Result<Self> {
    for def in defs.values() {
      if let Some(parent) = def.extends.iter().find(|p| !defs.contains_key(*p))
      {
        return Err(Error::UnknownSchema(parent.clone()));
      }
    }
    Ok(Self::resolve(&defs))
  }

  /// Parse a `{"schemata": {...}}` model description.
  pub fn from_json(data: &str) -> Result<Self> {
    let model: ModelDef = serde_json::from_str(data)?;
    Self::new(model.schemata)
  }

  /// The built-in FollowTheMoney subset.
  pub fn followthemoney() -> Self { Self::resolve(&builtin_defs()) }

  fn resolve(defs: &BTreeMap<String, SchemaDef>) -> Self {
    let mut schemata = BTreeMap::new();
    let mut types = BTreeMap::new();
    for name in defs.keys() {
      let mut ancestors = BTreeSet::new();
      collect_ancestors(defs, name, &mut ancestors);

      // Ancestors first so that own definitions win.
      let mut properties = BTreeMap::new();
      for ancestor in ancestors.iter().filter(|a| *a != name) {
        add_properties(&mut properties, &defs[ancestor]);
      }
      add_properties(&mut properties, &defs[name]);

      for prop in properties.values() {
        types
          .entry(prop.name.clone())
          .or_insert_with(|| prop.prop_type.clone());
      }

      schemata.insert(name.clone(), Schema {
        name: name.clone(),
        extends: defs[name].extends.clone(),
        matchable: defs[name].matchable,
        ancestors,
        properties,
      });
    }
    Self { schemata, types }
  }
}

impl Default for ModelRegistry {
  fn default() -> Self { Self::followthemoney() }
}

impl SchemaRegistry for ModelRegistry {
  fn schema(&self, name: &str) -> Option<&Schema> { self.schemata.get(name) }

  fn schema_names(&self) -> Vec<&str> {
    self.schemata.keys().map(String::as_str).collect()
  }

  fn property_type(&self, prop: &str) -> Option<&str> {
    self.types.get(prop).map(String::as_str)
  }
}

fn collect_ancestors(
  defs: &BTreeMap<String, SchemaDef>,
  name: &str,
  out: &mut BTreeSet<String>,
) {
  if !defs.contains_key(name) || !out.insert(name.to_owned()) {
    return;
  }
  for parent in &defs[name].extends {
    collect_ancestors(defs, parent, out);
  }
}

fn add_properties(into: &mut BTreeMap<String, Property>, def: &SchemaDef) {
  for (name, prop) in &def.properties {
    into.insert(name.clone(), Property {
      name:      name.clone(),
      prop_type: prop.prop_type.clone(),
      matchable: prop.matchable,
    });
  }
}

// ─── Built-in model ──────────────────────────────────────────────────────────

fn def(
  extends: &[&str],
  matchable: bool,
  properties: &[(&str, &str)],
) -> SchemaDef {
  SchemaDef {
    extends: extends.iter().map(|s| (*s).to_owned()).collect(),
    matchable,
    properties: properties
      .iter()
      .map(|(name, prop_type)| {
        let matchable = !matches!(*prop_type, types::TEXT | types::ENTITY);
        ((*name).to_owned(), PropertyDef {
          prop_type: (*prop_type).to_owned(),
          matchable,
        })
      })
      .collect(),
  }
}

fn builtin_defs() -> BTreeMap<String, SchemaDef> {
  use crate::schema::types::*;

  let interval = [
    ("startDate", DATE),
    ("endDate", DATE),
    ("date", DATE),
    ("summary", TEXT),
    ("description", TEXT),
    ("recordId", STRING),
    ("sourceUrl", URL),
  ];

  [
    ("Thing", def(&[], false, &[
      ("name", NAME),
      ("alias", NAME),
      ("previousName", NAME),
      ("weakAlias", NAME),
      ("country", COUNTRY),
      ("notes", TEXT),
      ("summary", TEXT),
      ("sourceUrl", URL),
      ("address", ADDRESS),
      ("addressEntity", ENTITY),
      ("topics", STRING),
    ])),
    ("LegalEntity", def(&["Thing"], true, &[
      ("email", EMAIL),
      ("phone", PHONE),
      ("website", URL),
      ("legalForm", STRING),
      ("incorporationDate", DATE),
      ("dissolutionDate", DATE),
      ("jurisdiction", COUNTRY),
      ("mainCountry", COUNTRY),
      ("registrationNumber", IDENTIFIER),
      ("taxNumber", IDENTIFIER),
      ("idNumber", IDENTIFIER),
    ])),
    ("Person", def(&["LegalEntity"], true, &[
      ("firstName", NAME),
      ("lastName", NAME),
      ("birthDate", DATE),
      ("birthPlace", STRING),
      ("deathDate", DATE),
      ("nationality", COUNTRY),
      ("position", STRING),
    ])),
    ("Organization", def(&["LegalEntity"], true, &[
      ("sector", STRING),
      ("classification", STRING),
    ])),
    ("Asset", def(&["Thing"], true, &[("amount", NUMBER), ("currency", STRING)])),
    ("Company", def(&["Organization", "Asset"], true, &[
      ("capital", NUMBER),
      ("ticker", IDENTIFIER),
    ])),
    ("PublicBody", def(&["Organization"], true, &[])),
    ("Address", def(&["Thing"], true, &[
      ("full", ADDRESS),
      ("street", STRING),
      ("city", STRING),
      ("postalCode", STRING),
    ])),
    ("Mention", def(&[], false, &[
      ("name", NAME),
      ("resolved", ENTITY),
      ("document", ENTITY),
      ("detectedSchema", STRING),
      ("contextCountry", COUNTRY),
    ])),
    ("Interval", def(&[], false, &interval)),
    ("Membership", def(&["Interval"], false, &[
      ("member", ENTITY),
      ("organization", ENTITY),
      ("role", STRING),
    ])),
    ("Directorship", def(&["Interval"], false, &[
      ("director", ENTITY),
      ("organization", ENTITY),
      ("role", STRING),
    ])),
    ("Ownership", def(&["Interval"], false, &[
      ("owner", ENTITY),
      ("asset", ENTITY),
      ("percentage", STRING),
      ("sharesValue", NUMBER),
    ])),
    ("Payment", def(&["Interval"], false, &[
      ("payer", ENTITY),
      ("beneficiary", ENTITY),
      ("amount", NUMBER),
      ("currency", STRING),
      ("purpose", TEXT),
      ("programme", STRING),
    ])),
    ("Family", def(&["Interval"], false, &[
      ("person", ENTITY),
      ("relative", ENTITY),
      ("relationship", STRING),
    ])),
  ]
  .into_iter()
  .map(|(name, def)| (name.to_owned(), def))
  .collect()
}
