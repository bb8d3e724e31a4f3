//! Blocking: grouping entities that share a phonetic token of a name.

use std::collections::{BTreeMap, BTreeSet};

use ftmstore_core::{
  Entity,
  backend::{Backend, cell_strings, cell_text},
  phonetic::PhoneticAlgorithm,
  query::{Column, Field, Query},
  schema::types,
};
use ftmstore_dataset::{Scope, Store};

use crate::Result;

/// Entity ids loaded per query when materializing a block.
pub const LOAD_CHUNK_SIZE: usize = 1_000;

/// Entities whose names share one phonetic token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
  pub value:    String,
  pub datasets: Vec<String>,
  pub ids:      Vec<String>,
}

pub struct Blocker<'a, B> {
  store:        &'a Store<B>,
  algorithm:    PhoneticAlgorithm,
  left:         Option<String>,
  schemata:     Option<BTreeSet<String>>,
  min_entities: usize,
}

impl<'a, B: Backend> Blocker<'a, B> {
  /// Blocks over the datasets in `store`'s scope.
  pub fn new(store: &'a Store<B>) -> Self {
    Self {
      store,
      algorithm: PhoneticAlgorithm::default(),
      left: None,
      schemata: None,
      min_entities: 2,
    }
  }

  pub fn store(&self) -> &'a Store<B> { self.store }

  pub fn with_algorithm(mut self, algorithm: PhoneticAlgorithm) -> Self {
    self.algorithm = algorithm;
    self
  }

  /// Only keep tokens that also occur in `dataset`.
  pub fn with_left_dataset(mut self, dataset: impl Into<String>) -> Self {
    self.left = Some(dataset.into());
    self
  }

  /// Restrict loading to schemata matchable with `schema`.
  pub fn with_schema(mut self, schema: &str) -> Self {
    self.schemata = Some(self.store.registry().matchable_schemata(schema));
    self
  }

  pub fn with_min_entities(mut self, min: usize) -> Self {
    self.min_entities = min.max(2);
    self
  }

  /// The datasets blocked over. A scope of everything is resolved against
  /// the backend.
  pub async fn datasets(&self) -> Result<Vec<String>> {
    Ok(match self.store.scope() {
      Scope::Dataset(name) => vec![name.clone()],
      Scope::Catalog(names) => names.clone(),
      Scope::All => self.store.datasets().await?,
    })
  }

  /// The grouping query over the fingerprint table.
  ///
  /// With several datasets a block has to span at least two of them, and a
  /// left dataset further narrows the tokens to those it contains.
  pub fn query(&self, datasets: &[String]) -> Query {
    let dialect = self.store.backend().dialect();
    let table = &self.store.backend().tables().fingerprints;
    let algorithm = self.algorithm.to_string();
    let in_datasets = dialect.group_uniq_array(Column::Dataset.as_ref());
    let ids = dialect.group_uniq_array(Column::EntityId.as_ref());
    let several = datasets.len() > 1;

    let mut q = Query::new(table)
      .select([
        Column::Value.to_string(),
        format!("{in_datasets} AS datasets"),
        format!("{ids} AS ids"),
      ])
      .filter(Column::PropType.is(types::NAME))
      .filter(Column::Dataset.is_in(datasets))
      .filter(Column::Algorithm.is(&algorithm))
      .filter(Column::Value.is_not(""))
      .group_by([Column::Value.to_string()])
      .having(Field::expr(dialect.array_length(&ids)).gte(self.min_entities))
      .order_by([Column::Value.to_string()], true);
    if several {
      q = q.having(Field::expr(dialect.array_length(&in_datasets)).gte(2));
      if let Some(left) = &self.left {
        let tokens = Query::new(table)
          .select([format!("DISTINCT {}", Column::Value)])
          .filter(Column::Dataset.is(left))
          .filter(Column::Algorithm.is(&algorithm));
        q = q.filter(Column::Value.is_in(tokens));
      }
    }
    q
  }

  pub async fn blocks(&self) -> Result<Vec<Block>> {
    let datasets = self.datasets().await?;
    let rows = self.store.query(&self.query(&datasets)).await?;

    let dialect = self.store.backend().dialect();
    let mut blocks = Vec::with_capacity(rows.len());
    for row in &rows {
      let mut spanned = cell_strings(dialect, row, 1)?;
      let mut ids = cell_strings(dialect, row, 2)?;
      spanned.sort();
      ids.sort();
      blocks.push(Block {
        value: cell_text(row, 0)?,
        datasets: spanned,
        ids,
      });
    }
    tracing::info!(
      algorithm = %self.algorithm,
      datasets = datasets.len(),
      blocks = blocks.len(),
      "blocking"
    );
    Ok(blocks)
  }

  /// The entities of a block, loaded through the store in chunks.
  pub async fn load(&self, block: &Block) -> Result<Vec<Entity>> {
    let mut entities = BTreeMap::new();
    for chunk in block.ids.chunks(LOAD_CHUNK_SIZE) {
      let mut q = self
        .store
        .entity_query()
        .filter(Column::EntityId.is_in(chunk));
      if let Some(schemata) = &self.schemata {
        q = q.filter(Column::Schema.is_in(schemata.clone()));
      }
      for entity in self.store.entities(&q).await? {
        entities.entry(entity.id.clone()).or_insert(entity);
      }
    }
    Ok(entities.into_values().collect())
  }
}
