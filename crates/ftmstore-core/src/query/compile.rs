//! Rendering of [`Query`] and [`EntityQuery`] to SQL text.
//!
//! Output is deterministic: filter parts are sorted, group fields are sorted,
//! and select fields keep their insertion order.

use std::collections::BTreeSet;

use super::{
  Column, Dialect, EntityQuery, Field, Filter, FilterValue, Operator, Query,
  Source,
};
use crate::{
  Error, Result,
  schema::{SchemaRegistry, types},
  statement::StatusFlag,
};

/// Compiles queries for one dialect, validating property names against a
/// schema registry.
#[derive(Clone, Copy)]
pub struct SqlCompiler<'a> {
  dialect:  &'a dyn Dialect,
  registry: &'a dyn SchemaRegistry,
}

impl<'a> SqlCompiler<'a> {
  pub fn new(dialect: &'a dyn Dialect, registry: &'a dyn SchemaRegistry) -> Self {
    Self { dialect, registry }
  }

  pub fn dialect(&self) -> &'a dyn Dialect { self.dialect }

  pub fn query(&self, q: &Query) -> Result<String> {
    let fields = if q.fields().is_empty() {
      "*".to_owned()
    } else {
      q.fields().join(", ")
    };
    let source = match q.source() {
      Source::Table(table) => table.clone(),
      Source::Query(sub) => format!("({})", self.query(sub)?),
    };

    let mut sql = format!("SELECT {fields} FROM {source}");
    if let Some(part) = self.lookup_part(q.filter_list(), "OR")? {
      sql.push_str(&format!(" WHERE {part}"));
    }
    if !q.group_fields().is_empty() {
      let group = q
        .group_fields()
        .iter()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ");
      sql.push_str(&format!(" GROUP BY {group}"));
      if let Some(part) = self.lookup_part(q.having_list(), "AND")? {
        sql.push_str(&format!(" HAVING {part}"));
      }
    }
    let (order, ascending) = q.order_fields();
    if !order.is_empty() {
      let direction = if ascending { "ASC" } else { "DESC" };
      sql.push_str(&format!(" ORDER BY {} {direction}", order.join(", ")));
    }
    sql.push_str(&self.dialect.limit(q.get_limit(), q.get_offset()));
    Ok(sql)
  }

  /// `SELECT count(*)` over the rows `q` returns.
  pub fn count(&self, q: &Query) -> Result<String> {
    Ok(format!("SELECT count(*) FROM ({})", self.query(q)?))
  }

  pub fn exists(&self, q: &Query) -> Result<String> {
    Ok(format!("SELECT EXISTS ({})", self.query(q)?))
  }

  /// The condition of a mutation; fails on an empty filter list so that a
  /// mutation can never hit the whole table by accident.
  pub fn where_clause(&self, filters: &[Filter]) -> Result<String> {
    self
      .lookup_part(filters, "OR")?
      .ok_or_else(|| Error::InvalidQuery("mutation without filters".into()))
  }

  /// Three nested stages: canonical ids matching the filters, all live rows
  /// of those ids aggregated per property, and per-entity aggregation.
  ///
  /// Result columns: `datasets`, `canonical_id`, `schema`, `props`,
  /// `entity_values` (one list per prop).
  pub fn entity_query(&self, q: &EntityQuery) -> Result<String> {
    let d = self.dialect;
    let inner = entity_ids(q);

    let scope: Vec<Filter> = inner
      .filter_list()
      .iter()
      .filter(|f| {
        matches!(
          f.field,
          Field::Column(Column::Dataset | Column::Origin | Column::StatusFlag)
        )
      })
      .cloned()
      .collect();

    let middle = Query::new(q.table())
      .select([
        format!("{} AS prop_datasets", d.group_uniq_array("dataset")),
        "canonical_id".to_owned(),
        "schema".to_owned(),
        "prop".to_owned(),
        format!("{} AS prop_values", d.group_uniq_array("value")),
      ])
      .filter(Column::CanonicalId.is_in(inner))
      .filters(scope)
      .group_by(["canonical_id", "schema", "prop"]);

    let outer = Query::from_query(middle)
      .select([
        format!("{} AS datasets", d.group_flat_array("prop_datasets")),
        "canonical_id".to_owned(),
        "schema".to_owned(),
        format!("{} AS props", d.group_array("prop")),
        format!("{} AS entity_values", d.group_nested_array("prop_values")),
      ])
      .group_by(["canonical_id", "schema"])
      .order_by(["canonical_id", "schema"], true);

    self.query(&outer)
  }

  /// Number of entities `q` selects.
  pub fn entity_count(&self, q: &EntityQuery) -> Result<String> {
    self.count(&entity_ids(q))
  }

  // ── Filters ──────────────────────────────────────────────────────────

  fn lookup_part(&self, filters: &[Filter], how: &str) -> Result<Option<String>> {
    let mut meta = BTreeSet::new();
    let mut props = BTreeSet::new();
    for filter in filters {
      let part = self.render_filter(filter)?;
      match filter.field {
        Field::Property(_) => props.insert(part),
        _ => meta.insert(part),
      };
    }

    let mut parts = Vec::new();
    if !meta.is_empty() {
      parts.push(meta.into_iter().collect::<Vec<_>>().join(" AND "));
    }
    if !props.is_empty() {
      let grouped = !parts.is_empty() && props.len() > 1;
      let joined = props
        .into_iter()
        .collect::<Vec<_>>()
        .join(&format!(" {how} "));
      parts.push(if grouped { format!("({joined})") } else { joined });
    }
    Ok((!parts.is_empty()).then(|| parts.join(" AND ")))
  }

  fn render_filter(&self, filter: &Filter) -> Result<String> {
    match &filter.field {
      Field::Column(column) => {
        self.render_condition(column.as_ref(), filter, false)
      }
      Field::Expr(expr) => self.render_condition(expr, filter, true),
      Field::Property(prop) => {
        let Some(prop_type) = self.registry.property_type(prop) else {
          return Err(Error::InvalidQuery(format!("invalid property: {prop:?}")));
        };
        let column = if prop_type == types::NUMBER {
          Column::ValueNum
        } else {
          Column::Value
        };
        let condition = self.render_condition(column.as_ref(), filter, false)?;
        Ok(format!(
          "({} = {} AND {condition})",
          Column::Prop,
          self.dialect.quote(prop)
        ))
      }
    }
  }

  fn render_condition(
    &self,
    lhs: &str,
    filter: &Filter,
    bare_numbers: bool,
  ) -> Result<String> {
    match filter.op {
      Operator::Null => match filter.value {
        FilterValue::Bool(true) => Ok(format!("{lhs} IS NULL")),
        FilterValue::Bool(false) => Ok(format!("{lhs} IS NOT NULL")),
        _ => Err(Error::InvalidQuery(format!(
          "`{lhs}`: null lookups need a boolean"
        ))),
      },
      Operator::In => {
        let values = match &filter.value {
          FilterValue::List(items) if items.is_empty() => "(NULL)".to_owned(),
          FilterValue::List(items) => format!(
            "({})",
            items
              .iter()
              .map(|v| self.dialect.quote(v))
              .collect::<Vec<_>>()
              .join(", ")
          ),
          FilterValue::Query(sub) => format!("({})", self.query(sub)?),
          _ => {
            return Err(Error::InvalidQuery(format!(
              "`{lhs}`: IN needs a list or a subquery"
            )));
          }
        };
        Ok(format!("{lhs} IN {values}"))
      }
      op => {
        let literal = |s: String| {
          if bare_numbers { s } else { self.dialect.quote(&s) }
        };
        let value = match &filter.value {
          FilterValue::Text(s) => self.dialect.quote(s),
          FilterValue::Int(n) => literal(n.to_string()),
          FilterValue::Float(n) => literal(n.to_string()),
          FilterValue::Bool(b) => literal(u8::from(*b).to_string()),
          FilterValue::List(_) | FilterValue::Query(_) => {
            return Err(Error::InvalidQuery(format!(
              "`{lhs}`: {} needs a single value",
              self.dialect.operator(op)
            )));
          }
        };
        Ok(format!("{lhs} {} {value}", self.dialect.operator(op)))
      }
    }
  }
}

/// The canonical ids an entity query selects: live rows unless a status
/// filter was given, in a stable order when sliced.
fn entity_ids(q: &EntityQuery) -> Query {
  let status = Field::Column(Column::StatusFlag);
  let mut inner = q.inner().clone();
  if inner.filters_on(&status).next().is_none() {
    inner = inner.filter(Column::StatusFlag.is(StatusFlag::Live.as_str()));
  }
  let sliced = inner.get_limit().is_some() || inner.get_offset().is_some();
  if sliced && inner.order_fields().0.is_empty() {
    inner = inner.order_by(["canonical_id"], true);
  }
  inner
}
