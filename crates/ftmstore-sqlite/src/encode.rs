//! Conversion of SQLite cells to the JSON cells the store decodes.
//!
//! Integers and reals become JSON numbers, text stays text, and blobs are
//! read as UTF-8 text (the schema never stores binary data).

use rusqlite::types::ValueRef;
use serde_json::{Number, Value};

pub fn cell(value: ValueRef<'_>) -> Value {
  match value {
    ValueRef::Null => Value::Null,
    ValueRef::Integer(i) => Value::Number(i.into()),
    ValueRef::Real(f) => Number::from_f64(f).map_or(Value::Null, Value::Number),
    ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
      Value::String(String::from_utf8_lossy(bytes).into_owned())
    }
  }
}
