//! Walking the entity graph.
//!
//! A [`Traversal`] keeps an explicit worklist instead of recursing. Each
//! entity is yielded at most once and the start entity never; `levels`
//! bounds the number of hops.

use std::collections::{BTreeSet, VecDeque};

use ftmstore_core::{Entity, backend::Backend, query::Column, schema::types};

use crate::{Error, Result, Store};

enum Task {
  /// Follow the entity-typed property values of an entity.
  Outgoing { entity: Entity, levels: usize },
  /// Find entities whose properties point at an entity.
  Incoming { entity: Entity, levels: usize },
}

pub struct Traversal<'a, B> {
  store:  &'a Store<B>,
  tasks:  Vec<Task>,
  ready:  VecDeque<Entity>,
  seen:   BTreeSet<String>,
  expand: bool,
}

impl<'a, B: Backend> Traversal<'a, B> {
  pub(crate) fn resolve(store: &'a Store<B>, entity: &Entity, levels: usize) -> Self {
    Self::start(store, entity, levels, false)
  }

  pub(crate) fn expand(store: &'a Store<B>, entity: &Entity, levels: usize) -> Self {
    Self::start(store, entity, levels, true)
  }

  fn start(store: &'a Store<B>, entity: &Entity, levels: usize, expand: bool) -> Self {
    let mut traversal = Self {
      store,
      tasks: Vec::new(),
      ready: VecDeque::new(),
      seen: BTreeSet::from([entity.id.clone()]),
      expand,
    };
    if levels > 0 {
      traversal.schedule(entity.clone(), levels);
    }
    traversal
  }

  fn schedule(&mut self, entity: Entity, levels: usize) {
    if self.expand {
      self.tasks.push(Task::Incoming {
        entity: entity.clone(),
        levels,
      });
    }
    self.tasks.push(Task::Outgoing { entity, levels });
  }

  pub async fn next(&mut self) -> Result<Option<Entity>> {
    loop {
      if let Some(entity) = self.ready.pop_front() {
        return Ok(Some(entity));
      }
      let Some(task) = self.tasks.pop() else {
        return Ok(None);
      };
      match task {
        Task::Outgoing { entity, levels } => self.outgoing(&entity, levels).await?,
        Task::Incoming { entity, levels } => self.incoming(&entity, levels).await?,
      }
    }
  }

  /// Drain the traversal.
  pub async fn collect(mut self) -> Result<Vec<Entity>> {
    let mut out = Vec::new();
    while let Some(entity) = self.next().await? {
      out.push(entity);
    }
    Ok(out)
  }

  async fn outgoing(&mut self, entity: &Entity, levels: usize) -> Result<()> {
    let references = entity.references(self.store.registry());
    for id in references {
      if self.seen.contains(&id) {
        continue;
      }
      // Dangling references are skipped.
      if let Some(found) = self.store.get(&id, true).await? {
        self.visit(found, levels);
      }
    }
    Ok(())
  }

  async fn incoming(&mut self, entity: &Entity, levels: usize) -> Result<()> {
    let canonical_id = match self.store.get_canonical_id(&entity.id).await {
      Ok(canonical_id) => canonical_id,
      Err(Error::EntityNotFound(_)) => entity.id.clone(),
      Err(e) => return Err(e),
    };
    let q = self
      .store
      .entity_query()
      .filter(Column::PropType.is(types::ENTITY))
      .filter(Column::Value.is(canonical_id));
    for referrer in self.store.entities(&q).await? {
      if self.seen.contains(&referrer.id) {
        continue;
      }
      if let Some(found) = self.store.get(&referrer.id, true).await? {
        self.visit(found, levels);
      }
    }
    Ok(())
  }

  fn visit(&mut self, entity: Entity, levels: usize) {
    if !self.seen.insert(entity.id.clone()) {
      return;
    }
    if levels > 1 {
      self.schedule(entity.clone(), levels - 1);
    }
    self.ready.push_back(entity);
  }
}
