//! Moving an entity under a new canonical id.
//!
//! Nothing is deleted: rows are rewritten under the new id and the rows they
//! replace are flagged [`StatusFlag::Canonized`], which hides them from
//! entity queries.

use std::collections::BTreeSet;

use chrono::Utc;
use ftmstore_core::{StatusFlag, backend::Backend, query::Column, schema::types};

use crate::{Error, Result, Store};

/// Rows touched by one canonicalization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CanonizeReport {
  /// New rows written.
  pub written:    usize,
  /// Rows flagged as superseded.
  pub superseded: usize,
}

impl<B: Backend> Store<B> {
  /// Put `entity_id`, together with everything already merged into its
  /// current canonical id, under `canonical_id`.
  ///
  /// References to any member of the group are rewritten to point at the
  /// new id first, so that some version of every reference stays live. With
  /// `sync` the backend is compacted afterwards.
  ///
  /// Writes here never honor `ignore_errors`: a failed insert aborts before
  /// the rows it would replace are flagged.
  pub async fn canonize(
    &self,
    entity_id: &str,
    canonical_id: &str,
    sync: bool,
  ) -> Result<CanonizeReport> {
    self.writable()?;
    let current = self.get_canonical_id(entity_id).await?;
    if current == canonical_id {
      tracing::debug!(entity_id, canonical_id, "already canonical");
      return Ok(CanonizeReport::default());
    }

    let live = Column::StatusFlag.is(StatusFlag::Live.as_str());
    let own = self
      .statements(
        &self
          .statements_query()
          .filter(Column::CanonicalId.is(&current))
          .filter(live.clone()),
      )
      .await?;
    if own.is_empty() {
      return Err(Error::EntityNotFound(entity_id.to_owned()));
    }

    let mut members: BTreeSet<String> =
      own.iter().map(|s| s.entity_id.clone()).collect();
    members.insert(current.clone());
    let referrers = self
      .statements(
        &self
          .statements_query()
          .filter(Column::PropType.is(types::ENTITY))
          .filter(Column::Value.is_in(members))
          .filter(live),
      )
      .await?;

    let now = Utc::now();
    let strict = self.clone().with_ignore_errors(false);
    let mut bulk = strict.bulk_statements()?;
    let mut updater = strict.bulk_updater(StatusFlag::Canonized)?;
    let mut report = CanonizeReport::default();

    for stmt in referrers.iter().filter(|s| s.canonical_id != current) {
      bulk.put(stmt.with_value(canonical_id, now)).await?;
      updater.put(&stmt.canonical_id, &stmt.id).await?;
      report.written += 1;
      report.superseded += 1;
    }
    tracing::debug!(
      entity_id,
      canonical_id,
      referrers = report.written,
      "rewrote references"
    );

    for stmt in &own {
      let mut moved = stmt.clone();
      moved.canonical_id = canonical_id.to_owned();
      moved.timestamp = now;
      bulk.put(moved).await?;
      updater.put(&current, &stmt.id).await?;
      report.written += 1;
      report.superseded += 1;
    }

    bulk.flush().await?;
    updater.flush().await?;
    if sync {
      self.optimize(true).await?;
    }
    tracing::info!(
      entity_id,
      from = %current,
      to = canonical_id,
      rows = own.len(),
      written = report.written,
      "canonized"
    );
    Ok(report)
  }
}
