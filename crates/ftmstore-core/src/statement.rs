//! Statements: the flat rows an entity is stored as.
//!
//! One [`Statement`] per property value plus a synthetic `id` row so that
//! entities without properties still exist. Name values additionally produce
//! [`FingerprintStatement`]s in a side table used for blocking.

use std::{collections::BTreeSet, sync::LazyLock};

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use strum::IntoEnumIterator as _;

use crate::{
  Entity, Error, Result,
  backend::{Row, cell_f64, cell_text},
  phonetic::{Fingerprinter, PhoneticAlgorithm},
  schema::{SchemaRegistry, types},
};

/// Property name of the synthetic identity statement.
pub const ID_PROP: &str = "id";

pub const DEFAULT_ORIGIN: &str = "default";

/// Schemata whose names are fingerprinted.
const FINGERPRINT_SCHEMATA: &[&str] = &["Thing", "LegalEntity", "Mention"];

// ─── Status ──────────────────────────────────────────────────────────────────

/// Whether a statement is current or has been replaced by a canonicalization.
#[derive(
  Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
pub enum StatusFlag {
  #[default]
  #[serde(rename = "")]
  Live,
  #[serde(rename = "canonized")]
  Canonized,
}

impl StatusFlag {
  pub fn as_str(self) -> &'static str {
    match self {
      StatusFlag::Live => "",
      StatusFlag::Canonized => "canonized",
    }
  }

  pub fn parse(s: &str) -> Result<Self> {
    match s {
      "" => Ok(StatusFlag::Live),
      "canonized" => Ok(StatusFlag::Canonized),
      other => Err(Error::Decode(format!("unknown status flag: {other:?}"))),
    }
  }
}

// ─── Statement ───────────────────────────────────────────────────────────────

/// Column order used when statements are selected or inserted.
pub const STATEMENT_COLUMNS: &[&str] = &[
  "id",
  "dataset",
  "canonical_id",
  "entity_id",
  "schema",
  "prop",
  "prop_type",
  "value",
  "value_num",
  "origin",
  "timestamp",
  "status_flag",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
  pub id:           String,
  pub dataset:      String,
  pub canonical_id: String,
  pub entity_id:    String,
  pub schema:       String,
  pub prop:         String,
  pub prop_type:    String,
  pub value:        String,
  pub value_num:    Option<f64>,
  pub origin:       String,
  pub timestamp:    DateTime<Utc>,
  pub status_flag:  StatusFlag,
}

impl Statement {
  /// Decode a row selected with [`STATEMENT_COLUMNS`].
  pub fn from_row(row: &Row) -> Result<Self> {
    if row.len() != STATEMENT_COLUMNS.len() {
      return Err(Error::Decode(format!(
        "expected {} statement columns, got {}",
        STATEMENT_COLUMNS.len(),
        row.len()
      )));
    }
    Ok(Self {
      id:           cell_text(row, 0)?,
      dataset:      cell_text(row, 1)?,
      canonical_id: cell_text(row, 2)?,
      entity_id:    cell_text(row, 3)?,
      schema:       cell_text(row, 4)?,
      prop:         cell_text(row, 5)?,
      prop_type:    cell_text(row, 6)?,
      value:        cell_text(row, 7)?,
      value_num:    cell_f64(row, 8)?,
      origin:       cell_text(row, 9)?,
      timestamp:    decode_timestamp(&cell_text(row, 10)?)?,
      status_flag:  StatusFlag::parse(&cell_text(row, 11)?)?,
    })
  }

  /// The same fact pointing at another entity: the value changes and with
  /// it the statement id.
  pub fn with_value(&self, value: &str, timestamp: DateTime<Utc>) -> Self {
    Self {
      id: stmt_key(&self.dataset, &self.entity_id, &self.prop, value, &self.origin),
      value: value.to_owned(),
      timestamp,
      status_flag: StatusFlag::Live,
      ..self.clone()
    }
  }
}

/// Content hash identifying a statement independently of its canonical id.
pub fn stmt_key(
  dataset: &str,
  entity_id: &str,
  prop: &str,
  value: &str,
  origin: &str,
) -> String {
  let mut hasher = Sha256::new();
  hasher.update(format!("{dataset}.{origin}.{entity_id}.{prop}.{value}"));
  hex::encode(hasher.finalize())
}

/// Remove a trailing `.<sha1 hex>` namespace signature from an id.
pub fn strip_namespace(id: &str) -> &str {
  match id.rsplit_once('.') {
    Some((base, signature))
      if !base.is_empty()
        && signature.len() == 40
        && signature.bytes().all(|b| b.is_ascii_hexdigit()) =>
    {
      base
    }
    _ => id,
  }
}

static NUMERIC_US: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"^-?\d+(?:,\d{3})*(?:\.\d+)?$").expect("static regex")
});
static NUMERIC_DE: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"^-?\d+(?:\.\d{3})*(?:,\d+)?$").expect("static regex")
});

/// Parse a number written in plain, US (`1,234.5`) or German (`1.234,5`)
/// notation.
pub fn to_numeric(value: &str) -> Option<f64> {
  let value = value.trim();
  if let Ok(n) = value.parse::<f64>() {
    return n.is_finite().then_some(n);
  }
  if NUMERIC_US.is_match(value) {
    return value.replace(',', "").parse().ok();
  }
  if NUMERIC_DE.is_match(value) {
    return value.replace('.', "").replace(',', ".").parse().ok();
  }
  None
}

/// Fixed-width RFC 3339 so that stored timestamps sort as text.
pub fn encode_timestamp(ts: DateTime<Utc>) -> String {
  ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Accepts RFC 3339 and the `YYYY-MM-DD HH:MM:SS[.f]` form columnar engines
/// print.
pub fn decode_timestamp(s: &str) -> Result<DateTime<Utc>> {
  if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
    return Ok(dt.with_timezone(&Utc));
  }
  NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
    .map(|dt| dt.and_utc())
    .map_err(|e| Error::DateParse(format!("{s:?}: {e}")))
}

// ─── Statement generation ────────────────────────────────────────────────────

/// Parameters shared by all statements generated for one entity.
#[derive(Debug, Clone)]
pub struct StatementOptions {
  pub origin:       String,
  /// Defaults to the entity id.
  pub canonical_id: Option<String>,
  pub status_flag:  StatusFlag,
  /// Defaults to now; fix it to get identical rows across calls.
  pub timestamp:    Option<DateTime<Utc>>,
}

impl Default for StatementOptions {
  fn default() -> Self {
    Self {
      origin:       DEFAULT_ORIGIN.to_owned(),
      canonical_id: None,
      status_flag:  StatusFlag::Live,
      timestamp:    None,
    }
  }
}

/// Flatten an entity into statements.
///
/// Returns nothing when the entity has no id, no schema, or a schema unknown
/// to the registry. Properties the schema does not define are skipped.
pub fn statements_from_entity(
  registry: &dyn SchemaRegistry,
  entity: &Entity,
  dataset: &str,
  opts: &StatementOptions,
) -> Vec<Statement> {
  if entity.id.is_empty() || entity.schema.is_empty() {
    return Vec::new();
  }
  let Some(schema) = registry.schema(&entity.schema) else {
    return Vec::new();
  };
  let entity_id = strip_namespace(&entity.id);
  let canonical_id = opts.canonical_id.as_deref().unwrap_or(entity_id);
  let timestamp = opts.timestamp.unwrap_or_else(Utc::now);

  let make = |prop: &str, prop_type: &str, value: &str| Statement {
    id:           stmt_key(dataset, entity_id, prop, value, &opts.origin),
    dataset:      dataset.to_owned(),
    canonical_id: canonical_id.to_owned(),
    entity_id:    entity_id.to_owned(),
    schema:       schema.name.clone(),
    prop:         prop.to_owned(),
    prop_type:    prop_type.to_owned(),
    value:        value.to_owned(),
    value_num:    (prop_type == types::NUMBER)
      .then(|| to_numeric(value))
      .flatten(),
    origin:       opts.origin.clone(),
    timestamp,
    status_flag:  opts.status_flag,
  };

  let mut out = vec![make(ID_PROP, ID_PROP, entity_id)];
  for (prop, value) in entity.values() {
    let Some(property) = schema.properties.get(prop) else { continue };
    if value.is_empty() {
      continue;
    }
    let value = if property.prop_type == types::ENTITY {
      strip_namespace(value)
    } else {
      value
    };
    out.push(make(prop, &property.prop_type, value));
  }
  out
}

// ─── Fingerprint statements ──────────────────────────────────────────────────

pub const FINGERPRINT_COLUMNS: &[&str] = &[
  "algorithm",
  "value",
  "dataset",
  "entity_id",
  "schema",
  "prop",
  "prop_type",
];

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FingerprintStatement {
  pub algorithm: PhoneticAlgorithm,
  pub value:     String,
  pub dataset:   String,
  pub entity_id: String,
  pub schema:    String,
  pub prop:      String,
  pub prop_type: String,
}

impl FingerprintStatement {
  pub fn from_row(row: &Row) -> Result<Self> {
    if row.len() != FINGERPRINT_COLUMNS.len() {
      return Err(Error::Decode(format!(
        "expected {} fingerprint columns, got {}",
        FINGERPRINT_COLUMNS.len(),
        row.len()
      )));
    }
    Ok(Self {
      algorithm: PhoneticAlgorithm::parse(&cell_text(row, 0)?)?,
      value:     cell_text(row, 1)?,
      dataset:   cell_text(row, 2)?,
      entity_id: cell_text(row, 3)?,
      schema:    cell_text(row, 4)?,
      prop:      cell_text(row, 5)?,
      prop_type: cell_text(row, 6)?,
    })
  }
}

/// Phonetic rows for every name of an entity, one per algorithm and
/// non-empty token.
pub fn fingerprints_from_entity(
  registry: &dyn SchemaRegistry,
  fingerprinter: &mut Fingerprinter,
  entity: &Entity,
  dataset: &str,
) -> Vec<FingerprintStatement> {
  if entity.id.is_empty()
    || !FINGERPRINT_SCHEMATA
      .iter()
      .any(|s| registry.is_a(&entity.schema, s))
  {
    return Vec::new();
  }
  let entity_id = strip_namespace(&entity.id);
  let mut seen = BTreeSet::new();
  let mut out = Vec::new();
  for (prop, value) in entity.type_values(registry, types::NAME) {
    for algorithm in PhoneticAlgorithm::iter() {
      for token in fingerprinter.phonetics(value, algorithm) {
        if token.is_empty() || !seen.insert((prop, algorithm, token.clone())) {
          continue;
        }
        out.push(FingerprintStatement {
          algorithm,
          value: token,
          dataset: dataset.to_owned(),
          entity_id: entity_id.to_owned(),
          schema: entity.schema.clone(),
          prop: prop.to_owned(),
          prop_type: types::NAME.to_owned(),
        });
      }
    }
  }
  out
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone as _;
  use serde_json::{Value, json};

  use super::*;
  use crate::ModelRegistry;

  fn opts() -> StatementOptions {
    StatementOptions {
      timestamp: Some(Utc.with_ymd_and_hms(2022, 1, 1, 0, 0, 0).unwrap()),
      ..Default::default()
    }
  }

  #[test]
  fn statements_include_id_row() {
    let model = ModelRegistry::followthemoney();
    let e = Entity::new("1", "Person").with("name", "Ann");
    let stmts = statements_from_entity(&model, &e, "test", &opts());
    assert_eq!(stmts.len(), 2);
    assert_eq!(stmts[0].prop, "id");
    assert_eq!(stmts[0].value, "1");
    assert_eq!(stmts[1].prop_type, "name");
    assert!(stmts.iter().all(|s| s.canonical_id == "1"));
    assert!(stmts.iter().all(|s| s.status_flag == StatusFlag::Live));
  }

  #[test]
  fn statements_are_deterministic() {
    let model = ModelRegistry::followthemoney();
    let e = Entity::new("1", "Payment")
      .with("amount", "1.200,50")
      .with("payer", "p1");
    let a = statements_from_entity(&model, &e, "test", &opts());
    let b = statements_from_entity(&model, &e, "test", &opts());
    assert_eq!(a, b);
    let amount = a.iter().find(|s| s.prop == "amount").unwrap();
    assert_eq!(amount.value_num, Some(1200.5));
  }

  #[test]
  fn statements_need_id_and_known_schema() {
    let model = ModelRegistry::followthemoney();
    let no_id = Entity::new("", "Person").with("name", "Ann");
    assert!(statements_from_entity(&model, &no_id, "t", &opts()).is_empty());
    let no_schema = Entity::new("1", "").with("name", "Ann");
    assert!(statements_from_entity(&model, &no_schema, "t", &opts()).is_empty());
    let unknown = Entity::new("1", "Spaceship");
    assert!(statements_from_entity(&model, &unknown, "t", &opts()).is_empty());
  }

  #[test]
  fn references_lose_namespace_signature() {
    let model = ModelRegistry::followthemoney();
    let signed = format!("abc.{}", "f".repeat(40));
    let e = Entity::new("m", "Membership").with("member", &signed);
    let stmts = statements_from_entity(&model, &e, "t", &opts());
    assert_eq!(stmts[1].value, "abc");
    assert_eq!(strip_namespace("eu.authorities"), "eu.authorities");
  }

  #[test]
  fn stmt_key_depends_on_every_component() {
    let base = stmt_key("d", "e", "p", "v", "o");
    assert_eq!(base.len(), 64);
    assert_ne!(base, stmt_key("d2", "e", "p", "v", "o"));
    assert_ne!(base, stmt_key("d", "e", "p", "v", "o2"));
    assert_eq!(base, stmt_key("d", "e", "p", "v", "o"));
  }

  #[test]
  fn numeric_notations() {
    assert_eq!(to_numeric("12"), Some(12.0));
    assert_eq!(to_numeric("1,234.5"), Some(1234.5));
    assert_eq!(to_numeric("1.234,5"), Some(1234.5));
    assert_eq!(to_numeric("twelve"), None);
  }

  #[test]
  fn statement_row_decoding() {
    let row = vec![
      json!("x"),
      json!("d"),
      json!("c"),
      json!("e"),
      json!("Person"),
      json!("name"),
      json!("name"),
      json!("Ann"),
      Value::Null,
      json!("bulk"),
      json!("2022-01-01 10:00:00"),
      json!("canonized"),
    ];
    let stmt = Statement::from_row(&row).unwrap();
    assert_eq!(stmt.status_flag, StatusFlag::Canonized);
    assert_eq!(stmt.value_num, None);
    assert!(Statement::from_row(&row[..3].to_vec()).is_err());
  }

  #[test]
  fn fingerprints_only_for_named_things() {
    let model = ModelRegistry::followthemoney();
    let mut fpx = Fingerprinter::new(64);
    let company = Entity::new("1", "Company").with("name", "Tchibo Holding AG");
    let rows = fingerprints_from_entity(&model, &mut fpx, &company, "d");
    assert!(rows.iter().any(|r| r.algorithm == PhoneticAlgorithm::Fingerprint
      && r.value == "ag holding tchibo"));
    assert!(rows.iter().all(|r| !r.value.is_empty()));

    let payment = Entity::new("2", "Payment").with("amount", "1");
    assert!(fingerprints_from_entity(&model, &mut fpx, &payment, "d").is_empty());

    let punct = Entity::new("3", "Person").with("name", "!!!");
    assert!(fingerprints_from_entity(&model, &mut fpx, &punct, "d").is_empty());
  }
}
