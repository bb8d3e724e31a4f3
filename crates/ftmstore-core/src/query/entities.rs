//! Folding [`EntityQuery`](super::EntityQuery) result rows into entities.

use super::Dialect;
use crate::{
  Entity, Error, Result,
  backend::{Row, cell_nested_strings, cell_strings, cell_text},
  schema::SchemaRegistry,
  statement::ID_PROP,
};

/// Decode one `(datasets, canonical_id, schema, props, entity_values)` row.
pub fn entity_from_row(dialect: &dyn Dialect, row: &Row) -> Result<Entity> {
  let mut entity = Entity::new(cell_text(row, 1)?, cell_text(row, 2)?);
  entity.datasets = cell_strings(dialect, row, 0)?.into_iter().collect();
  let props = cell_strings(dialect, row, 3)?;
  let values = cell_nested_strings(dialect, row, 4)?;
  if props.len() != values.len() {
    return Err(Error::Decode(format!(
      "entity {}: {} props but {} value lists",
      entity.id,
      props.len(),
      values.len()
    )));
  }
  for (prop, values) in props.into_iter().zip(values) {
    if prop == ID_PROP {
      continue;
    }
    for value in values {
      entity.add(prop.as_str(), value);
    }
  }
  Ok(entity)
}

/// Merges consecutive rows sharing a canonical id.
///
/// Entity query results are ordered by canonical id, and an id appears once
/// per schema it was stated with; those rows combine into one entity with
/// the common schema.
pub struct EntityFolder<'a> {
  registry: &'a dyn SchemaRegistry,
  current:  Option<Entity>,
}

impl<'a> EntityFolder<'a> {
  pub fn new(registry: &'a dyn SchemaRegistry) -> Self {
    Self {
      registry,
      current: None,
    }
  }

  /// Feed the next entity; returns the previous one once it is complete.
  pub fn push(&mut self, entity: Entity) -> Result<Option<Entity>> {
    if let Some(current) = self.current.as_mut()
      && current.id == entity.id
    {
      current.merge(&entity, self.registry)?;
      return Ok(None);
    }
    Ok(self.current.replace(entity))
  }

  pub fn finish(self) -> Option<Entity> { self.current }

  /// Fold a whole result set.
  pub fn fold(
    dialect: &dyn Dialect,
    registry: &dyn SchemaRegistry,
    rows: &[Row],
  ) -> Result<Vec<Entity>> {
    let mut folder = EntityFolder::new(registry);
    let mut out = Vec::new();
    for row in rows {
      if let Some(done) = folder.push(entity_from_row(dialect, row)?)? {
        out.push(done);
      }
    }
    out.extend(folder.finish());
    Ok(out)
  }
}
