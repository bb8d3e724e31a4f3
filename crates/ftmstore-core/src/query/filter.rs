//! Typed filter expressions: a field, an operator and a value.
//!
//! ```
//! use ftmstore_core::query::{Column, Field};
//!
//! let by_name = Field::prop("name").ilike("%nestle%");
//! let scoped = Column::Dataset.is_in(vec!["a", "b"]);
//! ```

use std::collections::BTreeSet;

use strum::{AsRefStr, Display};

use super::Query;

/// Physical columns of the statement and fingerprint tables.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  PartialOrd,
  Ord,
  Display,
  AsRefStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum Column {
  Id,
  Dataset,
  CanonicalId,
  EntityId,
  Schema,
  Prop,
  PropType,
  Value,
  ValueNum,
  Origin,
  Timestamp,
  StatusFlag,
  Algorithm,
}

/// What a filter compares.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Field {
  /// A column compared directly.
  Column(Column),
  /// An entity property: matches rows with `prop = name` and a matching
  /// value.
  Property(String),
  /// A raw SQL expression or select alias, used for aggregates in `HAVING`.
  Expr(String),
}

impl Field {
  pub fn prop(name: impl Into<String>) -> Self { Field::Property(name.into()) }

  pub fn expr(sql: impl Into<String>) -> Self { Field::Expr(sql.into()) }
}

impl From<Column> for Field {
  fn from(column: Column) -> Self { Field::Column(column) }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Operator {
  Eq,
  Not,
  Like,
  ILike,
  Gt,
  Gte,
  Lt,
  Lte,
  In,
  Null,
}

impl Operator {
  /// Standard SQL spelling; dialects override this through
  /// [`Dialect::operator`](super::Dialect::operator).
  pub fn as_sql(self) -> &'static str {
    match self {
      Operator::Eq => "=",
      Operator::Not => "<>",
      Operator::Like => "LIKE",
      Operator::ILike => "ILIKE",
      Operator::Gt => ">",
      Operator::Gte => ">=",
      Operator::Lt => "<",
      Operator::Lte => "<=",
      Operator::In => "IN",
      Operator::Null => "IS NULL",
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
  Text(String),
  Int(i64),
  Float(f64),
  Bool(bool),
  List(Vec<String>),
  Query(Box<Query>),
}

impl FilterValue {
  pub fn list<I, S>(items: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    FilterValue::List(items.into_iter().map(Into::into).collect())
  }
}

impl From<&str> for FilterValue {
  fn from(v: &str) -> Self { FilterValue::Text(v.to_owned()) }
}

impl From<String> for FilterValue {
  fn from(v: String) -> Self { FilterValue::Text(v) }
}

impl From<&String> for FilterValue {
  fn from(v: &String) -> Self { FilterValue::Text(v.clone()) }
}

impl From<i64> for FilterValue {
  fn from(v: i64) -> Self { FilterValue::Int(v) }
}

impl From<i32> for FilterValue {
  fn from(v: i32) -> Self { FilterValue::Int(v.into()) }
}

impl From<usize> for FilterValue {
  fn from(v: usize) -> Self { FilterValue::Int(v as i64) }
}

impl From<f64> for FilterValue {
  fn from(v: f64) -> Self { FilterValue::Float(v) }
}

impl From<bool> for FilterValue {
  fn from(v: bool) -> Self { FilterValue::Bool(v) }
}

impl From<Vec<String>> for FilterValue {
  fn from(v: Vec<String>) -> Self { FilterValue::List(v) }
}

impl From<Vec<&str>> for FilterValue {
  fn from(v: Vec<&str>) -> Self { FilterValue::list(v) }
}

impl From<&[String]> for FilterValue {
  fn from(v: &[String]) -> Self { FilterValue::List(v.to_vec()) }
}

impl From<BTreeSet<String>> for FilterValue {
  fn from(v: BTreeSet<String>) -> Self { FilterValue::list(v) }
}

impl From<Query> for FilterValue {
  fn from(q: Query) -> Self { FilterValue::Query(Box::new(q)) }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
  pub field: Field,
  pub op:    Operator,
  pub value: FilterValue,
}

impl Filter {
  pub fn new(
    field: impl Into<Field>,
    op: Operator,
    value: impl Into<FilterValue>,
  ) -> Self {
    Self {
      field: field.into(),
      op,
      value: value.into(),
    }
  }

  /// Filters are keyed by field and operator; the later of two wins.
  pub(crate) fn same_key(&self, other: &Filter) -> bool {
    self.field == other.field && self.op == other.op
  }
}

macro_rules! lookups {
  ($ty:ty) => {
    impl $ty {
      pub fn is(self, value: impl Into<FilterValue>) -> Filter {
        Filter::new(self, Operator::Eq, value)
      }

      pub fn is_not(self, value: impl Into<FilterValue>) -> Filter {
        Filter::new(self, Operator::Not, value)
      }

      pub fn like(self, pattern: impl Into<FilterValue>) -> Filter {
        Filter::new(self, Operator::Like, pattern)
      }

      pub fn ilike(self, pattern: impl Into<FilterValue>) -> Filter {
        Filter::new(self, Operator::ILike, pattern)
      }

      pub fn gt(self, value: impl Into<FilterValue>) -> Filter {
        Filter::new(self, Operator::Gt, value)
      }

      pub fn gte(self, value: impl Into<FilterValue>) -> Filter {
        Filter::new(self, Operator::Gte, value)
      }

      pub fn lt(self, value: impl Into<FilterValue>) -> Filter {
        Filter::new(self, Operator::Lt, value)
      }

      pub fn lte(self, value: impl Into<FilterValue>) -> Filter {
        Filter::new(self, Operator::Lte, value)
      }

      /// Membership in a list of values or in the result of a subquery.
      pub fn is_in(self, values: impl Into<FilterValue>) -> Filter {
        Filter::new(self, Operator::In, values)
      }

      /// `IS NULL` when `null` is true, `IS NOT NULL` otherwise.
      pub fn is_null(self, null: bool) -> Filter {
        Filter::new(self, Operator::Null, null)
      }
    }
  };
}

lookups!(Field);
lookups!(Column);
