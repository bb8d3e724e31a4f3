//! Immutable query builders compiled to SQL.
//!
//! Every chaining method returns a new value. Filters on columns are ANDed;
//! filters on entity properties match individual statement rows and are
//! therefore ORed (a row holds exactly one property).

mod compile;
mod dialect;
mod entities;
mod filter;

use std::{
  collections::BTreeSet,
  ops::{Bound, RangeBounds},
};

pub use compile::SqlCompiler;
pub use dialect::{ClickHouse, Dialect, render_assignments};
pub use entities::{EntityFolder, entity_from_row};
pub use filter::{Column, Field, Filter, FilterValue, Operator};

use crate::{Error, Result, statement::StatusFlag};

// ─── Query ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Source {
  Table(String),
  Query(Box<Query>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Query {
  source:    Source,
  fields:    Vec<String>,
  filters:   Vec<Filter>,
  having:    Vec<Filter>,
  group_by:  BTreeSet<String>,
  order_by:  Vec<String>,
  ascending: bool,
  limit:     Option<usize>,
  offset:    Option<usize>,
}

impl Query {
  pub fn new(table: impl Into<String>) -> Self {
    Self::with_source(Source::Table(table.into()))
  }

  /// Select from the result of another query.
  pub fn from_query(query: Query) -> Self {
    Self::with_source(Source::Query(Box::new(query)))
  }

  fn with_source(source: Source) -> Self {
    Self {
      source,
      fields: Vec::new(),
      filters: Vec::new(),
      having: Vec::new(),
      group_by: BTreeSet::new(),
      order_by: Vec::new(),
      ascending: true,
      limit: None,
      offset: None,
    }
  }

  // ── Chaining ─────────────────────────────────────────────────────────

  /// Add select expressions; repeated calls extend the list.
  pub fn select<I, S>(mut self, fields: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    for field in fields {
      let field = field.into();
      if !self.fields.contains(&field) {
        self.fields.push(field);
      }
    }
    self
  }

  pub fn filter(mut self, filter: Filter) -> Self {
    upsert(&mut self.filters, filter);
    self
  }

  pub fn filters(self, filters: impl IntoIterator<Item = Filter>) -> Self {
    filters.into_iter().fold(self, Query::filter)
  }

  /// A `HAVING` condition; only rendered when the query is grouped.
  pub fn having(mut self, filter: Filter) -> Self {
    upsert(&mut self.having, filter);
    self
  }

  pub fn group_by<I, S>(mut self, fields: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.group_by.extend(fields.into_iter().map(Into::into));
    self
  }

  /// Replace the ordering.
  pub fn order_by<I, S>(mut self, fields: I, ascending: bool) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.order_by = fields.into_iter().map(Into::into).collect();
    self.ascending = ascending;
    self
  }

  /// Only the row at `index`.
  pub fn nth(mut self, index: i64) -> Result<Self> {
    let index = non_negative(index)?;
    self.limit = Some(1);
    self.offset = Some(index);
    Ok(self)
  }

  /// Rows in `range`; an open end removes the limit.
  pub fn slice(mut self, range: impl RangeBounds<i64>) -> Result<Self> {
    let start = match range.start_bound() {
      Bound::Included(s) => non_negative(*s)?,
      Bound::Excluded(s) => non_negative(*s)? + 1,
      Bound::Unbounded => 0,
    };
    let end = match range.end_bound() {
      Bound::Included(e) => Some(non_negative(*e)? + 1),
      Bound::Excluded(e) => Some(non_negative(*e)?),
      Bound::Unbounded => None,
    };
    if let Some(end) = end
      && end < start
    {
      return Err(Error::InvalidQuery(format!(
        "slice end {end} precedes start {start}"
      )));
    }
    self.limit = end.map(|end| end - start);
    self.offset = Some(start);
    Ok(self)
  }

  pub fn limit(mut self, limit: usize) -> Self {
    self.limit = Some(limit);
    self
  }

  pub fn offset(mut self, offset: usize) -> Self {
    self.offset = Some(offset);
    self
  }

  // ── Accessors ────────────────────────────────────────────────────────

  pub fn source(&self) -> &Source { &self.source }

  pub fn fields(&self) -> &[String] { &self.fields }

  pub fn filter_list(&self) -> &[Filter] { &self.filters }

  pub fn having_list(&self) -> &[Filter] { &self.having }

  pub fn group_fields(&self) -> &BTreeSet<String> { &self.group_by }

  pub fn order_fields(&self) -> (&[String], bool) {
    (&self.order_by, self.ascending)
  }

  pub fn get_limit(&self) -> Option<usize> { self.limit }

  pub fn get_offset(&self) -> Option<usize> { self.offset }

  /// Filters on a given field, in insertion order.
  pub fn filters_on<'a>(
    &'a self,
    field: &'a Field,
  ) -> impl Iterator<Item = &'a Filter> + 'a {
    self.filters.iter().filter(move |f| &f.field == field)
  }

  /// The datasets this query is restricted to, if any.
  pub fn datasets(&self) -> Option<Vec<String>> {
    let field = Field::Column(Column::Dataset);
    self.filters_on(&field).find_map(|f| match (&f.op, &f.value) {
      (Operator::Eq, FilterValue::Text(name)) => Some(vec![name.clone()]),
      (Operator::In, FilterValue::List(names)) => Some(names.clone()),
      _ => None,
    })
  }
}

fn upsert(filters: &mut Vec<Filter>, filter: Filter) {
  match filters.iter_mut().find(|f| f.same_key(&filter)) {
    Some(existing) => *existing = filter,
    None => filters.push(filter),
  }
}

fn non_negative(n: i64) -> Result<usize> {
  usize::try_from(n).map_err(|_| {
    Error::InvalidQuery(format!("slicing with negative index {n}"))
  })
}

// ─── EntityQuery ─────────────────────────────────────────────────────────────

/// A query over whole entities.
///
/// Filters select canonical ids (any statement row matching selects the
/// entity); the compiled SQL then re-reads every row of the selected ids and
/// aggregates them per `(canonical_id, schema)`. Slicing applies to entities,
/// not rows.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityQuery {
  table: String,
  inner: Query,
}

impl EntityQuery {
  pub fn new(table: impl Into<String>) -> Self {
    let table = table.into();
    Self {
      inner: Query::new(table.clone()).select(["DISTINCT canonical_id"]),
      table,
    }
  }

  pub fn table(&self) -> &str { &self.table }

  /// The query selecting canonical ids.
  pub fn inner(&self) -> &Query { &self.inner }

  pub fn filter(mut self, filter: Filter) -> Self {
    self.inner = self.inner.filter(filter);
    self
  }

  pub fn filters(self, filters: impl IntoIterator<Item = Filter>) -> Self {
    filters.into_iter().fold(self, EntityQuery::filter)
  }

  pub fn nth(mut self, index: i64) -> Result<Self> {
    self.inner = self.inner.nth(index)?;
    Ok(self)
  }

  pub fn slice(mut self, range: impl RangeBounds<i64>) -> Result<Self> {
    self.inner = self.inner.slice(range)?;
    Ok(self)
  }

  pub fn limit(mut self, limit: usize) -> Self {
    self.inner = self.inner.limit(limit);
    self
  }

  pub fn offset(mut self, offset: usize) -> Self {
    self.inner = self.inner.offset(offset);
    self
  }

  /// Select entities regardless of canonicalization status.
  pub fn any_status(self) -> Self {
    self.filter(Column::StatusFlag.is_in(vec![
      StatusFlag::Live.as_str(),
      StatusFlag::Canonized.as_str(),
    ]))
  }

  pub fn datasets(&self) -> Option<Vec<String>> { self.inner.datasets() }
}
