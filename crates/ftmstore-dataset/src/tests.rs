//! Integration tests for `Store` against an in-memory SQLite backend.

use std::sync::Arc;

use ftmstore_core::{
  Entity, ModelRegistry, StatusFlag, backend::Backend, query::Column,
};
use ftmstore_sqlite::SqliteBackend;

use crate::{CanonizeReport, Error, Scope, Store};

async fn store(scope: &str) -> Store<SqliteBackend> {
  let backend = SqliteBackend::open_in_memory()
    .await
    .expect("in-memory backend");
  Store::new(
    Arc::new(backend),
    Arc::new(ModelRegistry::followthemoney()),
    Scope::parse(scope),
  )
}

fn rescope(store: &Store<SqliteBackend>, scope: &str) -> Store<SqliteBackend> {
  Store::new(
    store.backend().clone(),
    Arc::new(ModelRegistry::followthemoney()),
    Scope::parse(scope),
  )
}

fn ids(entities: &[Entity]) -> Vec<&str> {
  let mut ids: Vec<&str> = entities.iter().map(|e| e.id.as_str()).collect();
  ids.sort();
  ids
}

// ─── Reads and writes ────────────────────────────────────────────────────────

#[tokio::test]
async fn put_and_get() {
  let s = store("test").await;
  let written = s
    .put(&Entity::new("1", "Person").with("name", "Ann"))
    .await
    .unwrap();
  assert_eq!(written, 2);

  assert_eq!(s.get_canonical_id("1").await.unwrap(), "1");
  let entity = s.get("1", true).await.unwrap().unwrap();
  assert_eq!(entity.schema, "Person");
  assert_eq!(entity.first("name"), Some("Ann"));
  assert!(entity.datasets.contains("test"));

  assert_eq!(s.count(&s.statements_query()).await.unwrap(), 2);
  assert!(s.count(&s.fingerprint_query()).await.unwrap() > 0);
  assert_eq!(s.datasets().await.unwrap(), vec!["test"]);
}

#[tokio::test]
async fn put_indexes_non_latin_names() {
  let s = store("test").await;
  s.put(&Entity::new("ru", "Person").with("name", "Владимир Путин"))
    .await
    .unwrap();
  s.put(&Entity::new("cn", "Company").with("name", "北京"))
    .await
    .unwrap();

  let entity = s.get("ru", true).await.unwrap().unwrap();
  assert_eq!(entity.first("name"), Some("Владимир Путин"));
  let soundex = s
    .fingerprint_query()
    .filter(Column::Algorithm.is("soundex"))
    .filter(Column::Value.is("V435"));
  assert_eq!(s.count(&soundex).await.unwrap(), 1);
  let latin = s
    .fingerprint_query()
    .filter(Column::Algorithm.is("fingerprint"))
    .filter(Column::Value.is("bei jing"));
  assert_eq!(s.count(&latin).await.unwrap(), 1);
}

#[tokio::test]
async fn missing_entities() {
  let s = store("test").await;
  assert!(matches!(
    s.get_canonical_id("nope").await,
    Err(Error::EntityNotFound(id)) if id == "nope"
  ));
  assert!(s.get("nope", true).await.unwrap().is_none());
  assert!(s.get("nope", false).await.unwrap().is_none());
}

#[tokio::test]
async fn catalogs_are_read_only() {
  let s = store("a,b").await;
  let e = Entity::new("1", "Person");
  assert!(matches!(s.put(&e).await, Err(Error::NotWritable(_))));
  assert!(matches!(
    s.canonize("1", "2", false).await,
    Err(Error::NotWritable(_))
  ));
  assert!(matches!(
    store("*").await.drop(false).await,
    Err(Error::NotWritable(_))
  ));
}

#[tokio::test]
async fn catalog_reads_across_datasets() {
  let a = store("a").await;
  let b = rescope(&a, "b");
  a.put(&Entity::new("1", "Person").with("name", "Ann"))
    .await
    .unwrap();
  b.put(&Entity::new("2", "Person").with("name", "Bob"))
    .await
    .unwrap();

  let both = rescope(&a, "a,b");
  assert_eq!(both.count_entities(&both.entity_query()).await.unwrap(), 2);
  let all = rescope(&a, "*");
  assert_eq!(all.datasets().await.unwrap(), vec!["a", "b"]);
  assert_eq!(all.count_entities(&all.entity_query()).await.unwrap(), 2);
  assert_eq!(a.count_entities(&a.entity_query()).await.unwrap(), 1);
}

#[tokio::test]
async fn origin_scopes_reads() {
  let s = store("test").await;
  let bulk = s.clone().with_origin("bulk");
  bulk
    .put(&Entity::new("1", "Person").with("name", "Ann"))
    .await
    .unwrap();
  s.put(&Entity::new("2", "Person").with("name", "Bob"))
    .await
    .unwrap();

  assert_eq!(bulk.count_entities(&bulk.entity_query()).await.unwrap(), 1);
  assert_eq!(s.count_entities(&s.entity_query()).await.unwrap(), 2);
  let stmts = bulk.statements(&bulk.statements_query()).await.unwrap();
  assert!(stmts.iter().all(|s| s.origin == "bulk"));
}

#[tokio::test]
async fn bulk_writer_flushes_when_full() {
  let s = store("test").await.with_bulk_size(2);
  let mut bulk = s.bulk().unwrap();
  bulk
    .put(&Entity::new("1", "Person").with("name", "Ann"))
    .await
    .unwrap();
  assert_eq!(s.count(&s.statements_query()).await.unwrap(), 2);

  bulk.put(&Entity::new("2", "Person")).await.unwrap();
  assert_eq!(s.count(&s.statements_query()).await.unwrap(), 2);
  assert_eq!(bulk.flush().await.unwrap(), 1);
  assert_eq!(bulk.flush().await.unwrap(), 0);
  assert_eq!(s.count(&s.statements_query()).await.unwrap(), 3);
}

#[tokio::test]
async fn ignore_errors_skips_failed_batches() {
  let s = store("test").await;
  s.backend()
    .execute("DROP TABLE ftm".to_owned())
    .await
    .unwrap();
  let e = Entity::new("1", "Person").with("name", "Ann");
  assert!(matches!(s.put(&e).await, Err(Error::Backend(_))));
  let lenient = s.clone().with_ignore_errors(true);
  assert_eq!(lenient.put(&e).await.unwrap(), 0);
}

// ─── Iteration ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn iterate_in_chunks() {
  let s = store("test").await;
  let mut bulk = s.bulk().unwrap();
  for i in 1..=5 {
    let e = Entity::new(format!("e{i}"), "Person").with("name", &format!("P{i}"));
    bulk.put(&e).await.unwrap();
  }
  bulk.flush().await.unwrap();

  let all = s.iterate(s.entity_query(), 2).collect().await.unwrap();
  assert_eq!(ids(&all), vec!["e1", "e2", "e3", "e4", "e5"]);

  let first = s
    .iterate(s.entity_query().limit(3), 2)
    .collect()
    .await
    .unwrap();
  assert_eq!(ids(&first), vec!["e1", "e2", "e3"]);

  let rest = s
    .iterate(s.entity_query().slice(3..).unwrap(), 10)
    .collect()
    .await
    .unwrap();
  assert_eq!(ids(&rest), vec!["e4", "e5"]);
}

// ─── Traversal ───────────────────────────────────────────────────────────────

async fn membership_graph() -> Store<SqliteBackend> {
  let s = store("test").await;
  let mut bulk = s.bulk().unwrap();
  for e in [
    Entity::new("p", "Person").with("name", "Ann"),
    Entity::new("c", "Company").with("name", "ACME"),
    Entity::new("m", "Membership")
      .with("member", "p")
      .with("organization", "c"),
  ] {
    bulk.put(&e).await.unwrap();
  }
  bulk.flush().await.unwrap();
  s
}

#[tokio::test]
async fn resolve_follows_references() {
  let s = membership_graph().await;
  let m = s.get("m", true).await.unwrap().unwrap();
  let found = s.resolve(&m, 1).collect().await.unwrap();
  assert_eq!(ids(&found), vec!["c", "p"]);

  let p = s.get("p", true).await.unwrap().unwrap();
  assert!(s.resolve(&p, 3).collect().await.unwrap().is_empty());
}

#[tokio::test]
async fn expand_follows_both_directions() {
  let s = membership_graph().await;
  let p = s.get("p", true).await.unwrap().unwrap();
  assert_eq!(ids(&s.expand(&p, 1).collect().await.unwrap()), vec!["m"]);
  assert_eq!(ids(&s.expand(&p, 2).collect().await.unwrap()), vec!["c", "m"]);
  assert!(s.expand(&p, 0).collect().await.unwrap().is_empty());
}

// ─── Canonicalization ────────────────────────────────────────────────────────

#[tokio::test]
async fn canonize_merges_and_keeps_history() {
  let s = store("test").await;
  s.put(&Entity::new("1", "Person").with("name", "Ann"))
    .await
    .unwrap();
  let flagged = s
    .statements_query()
    .filter(Column::StatusFlag.is(StatusFlag::Canonized.as_str()));
  assert_eq!(s.count(&flagged).await.unwrap(), 0);

  let report = s.canonize("1", "C1", false).await.unwrap();
  assert_eq!(report, CanonizeReport {
    written:    2,
    superseded: 2,
  });

  assert_eq!(s.get_canonical_id("1").await.unwrap(), "C1");
  let merged = s.get("C1", true).await.unwrap().unwrap();
  assert_eq!(merged.id, "C1");
  assert_eq!(merged.first("name"), Some("Ann"));
  assert_eq!(s.get("1", true).await.unwrap().unwrap().id, "C1");

  let original = s.get("1", false).await.unwrap().unwrap();
  assert_eq!(original.id, "1");
  assert_eq!(original.first("name"), Some("Ann"));

  assert_eq!(s.count(&flagged).await.unwrap(), 2);
  assert_eq!(s.count_entities(&s.entity_query()).await.unwrap(), 1);
}

#[tokio::test]
async fn canonize_rewrites_references() {
  let s = store("test").await;
  let mut bulk = s.bulk().unwrap();
  bulk
    .put(&Entity::new("1", "Person").with("name", "Ann"))
    .await
    .unwrap();
  bulk
    .put(&Entity::new("m", "Membership").with("member", "1"))
    .await
    .unwrap();
  bulk.flush().await.unwrap();

  let live_flag = Column::StatusFlag.is(StatusFlag::Live.as_str());
  let live = s.statements_query().filter(live_flag.clone());
  let flagged = s
    .statements_query()
    .filter(Column::StatusFlag.is(StatusFlag::Canonized.as_str()));
  let member_rows = s
    .statements_query()
    .filter(Column::CanonicalId.is("m"))
    .filter(Column::Prop.is("member"));
  let before = s.statements(&member_rows).await.unwrap();
  assert_eq!(before.len(), 1);
  assert_eq!(s.count(&live).await.unwrap(), 4);
  assert_eq!(s.count(&flagged).await.unwrap(), 0);

  let report = s.canonize("1", "C1", true).await.unwrap();
  assert_eq!(report, CanonizeReport {
    written:    3,
    superseded: 3,
  });
  assert_eq!(s.count(&live).await.unwrap(), 4);
  assert_eq!(s.count(&flagged).await.unwrap(), 3);

  let live_member = s
    .statements(&member_rows.filter(live_flag))
    .await
    .unwrap();
  assert_eq!(live_member.len(), 1);
  let rewritten = &live_member[0];
  assert_eq!(rewritten.canonical_id, "m");
  assert_eq!(rewritten.value, "C1");
  assert_ne!(rewritten.id, before[0].id);

  let m = s.get("m", true).await.unwrap().unwrap();
  assert_eq!(m.first("member"), Some("C1"));
  let resolved = s.resolve(&m, 1).collect().await.unwrap();
  assert_eq!(ids(&resolved), vec!["C1"]);
}

#[tokio::test]
async fn canonize_keeps_rows_when_inserts_fail() {
  let s = store("test").await;
  s.put(&Entity::new("1", "Person").with("name", "Ann"))
    .await
    .unwrap();
  s.backend()
    .execute(
      "CREATE TRIGGER no_inserts BEFORE INSERT ON ftm \
       BEGIN SELECT RAISE(ABORT, 'inserts blocked'); END"
        .to_owned(),
    )
    .await
    .unwrap();

  let lenient = s.clone().with_ignore_errors(true);
  assert!(matches!(
    lenient.canonize("1", "NK-x", false).await,
    Err(Error::Backend(_))
  ));
  assert!(matches!(
    lenient.canonize("nope", "NK-x", false).await,
    Err(Error::EntityNotFound(id)) if id == "nope"
  ));

  assert_eq!(s.get_canonical_id("1").await.unwrap(), "1");
  let ann = s.get("1", true).await.unwrap().unwrap();
  assert_eq!(ann.first("name"), Some("Ann"));
  let flagged = s
    .statements_query()
    .filter(Column::StatusFlag.is(StatusFlag::Canonized.as_str()));
  assert_eq!(s.count(&flagged).await.unwrap(), 0);
}

#[tokio::test]
async fn canonize_moves_merged_groups() {
  let s = store("test").await;
  let mut bulk = s.bulk().unwrap();
  for id in ["1", "2"] {
    bulk
      .put(&Entity::new(id, "Person").with("name", id))
      .await
      .unwrap();
  }
  bulk.flush().await.unwrap();

  s.canonize("2", "1", false).await.unwrap();
  assert_eq!(s.get_canonical_id("2").await.unwrap(), "1");
  let one = s.get("1", true).await.unwrap().unwrap();
  assert_eq!(one.get("name").unwrap().len(), 2);

  s.canonize("1", "X", false).await.unwrap();
  assert_eq!(s.get_canonical_id("2").await.unwrap(), "X");
  assert_eq!(s.count_entities(&s.entity_query()).await.unwrap(), 1);

  assert_eq!(
    s.canonize("2", "X", false).await.unwrap(),
    CanonizeReport::default()
  );
}

// ─── Deletion ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn delete_and_drop() {
  let s = store("test").await;
  let other = rescope(&s, "other");
  for (target, id) in [(&s, "1"), (&s, "2"), (&other, "3")] {
    target
      .put(&Entity::new(id, "Person").with("name", "Ann"))
      .await
      .unwrap();
  }

  assert_eq!(
    s.delete(vec![Column::EntityId.is("1")], false).await.unwrap(),
    2
  );
  assert!(s.get("1", true).await.unwrap().is_none());
  assert!(s.get("2", true).await.unwrap().is_some());

  s.drop(true).await.unwrap();
  assert_eq!(s.count(&s.statements_query()).await.unwrap(), 0);
  assert_eq!(s.count(&s.fingerprint_query()).await.unwrap(), 0);
  assert_eq!(other.count(&other.statements_query()).await.unwrap(), 2);
}
