//! Commands driven against an in-memory store.

use std::{path::PathBuf, sync::Arc};

use ftmstore_core::{
  Entity, ModelRegistry,
  resolution::{Edge, Judgement},
};
use ftmstore_sqlite::SqliteBackend;
use ftmstore_xref::is_placeholder;
use uuid::Uuid;

use crate::{
  commands::{App, XrefArgs},
  settings::Settings,
};

async fn app() -> App {
  let backend = SqliteBackend::open_in_memory()
    .await
    .expect("in-memory backend");
  App::new(
    Settings::default(),
    Arc::new(backend),
    Arc::new(ModelRegistry::followthemoney()),
  )
}

/// Write `lines` to a fresh temp file.
fn input(lines: &[String]) -> PathBuf {
  let path = std::env::temp_dir().join(format!("{}.ijson", Uuid::new_v4()));
  std::fs::write(&path, lines.join("\n")).unwrap();
  path
}

fn entities(entities: &[Entity]) -> PathBuf {
  let lines: Vec<String> = entities
    .iter()
    .map(|e| serde_json::to_string(e).unwrap())
    .collect();
  input(&lines)
}

fn company(id: &str, name: &str) -> Entity {
  Entity::new(id, "Company").with("name", name)
}

async fn iterate(app: &App, datasets: &str) -> Vec<Entity> {
  let mut out = Vec::new();
  app.iterate(datasets, None, None, &mut out).await.unwrap();
  String::from_utf8(out)
    .unwrap()
    .lines()
    .map(|line| serde_json::from_str(line).unwrap())
    .collect()
}

fn xref_args(datasets: &str) -> XrefArgs {
  XrefArgs {
    datasets:       datasets.to_owned(),
    left:           None,
    algorithm:      "fingerprint".to_owned(),
    schema:         None,
    threshold:      0.0,
    min_datasets:   1,
    auto_threshold: Some(0.9),
  }
}

#[tokio::test]
async fn write_then_iterate() {
  let app = app().await;
  let path = entities(&[company("1", "ACME"), company("2", "Tchibo")]);
  app.write("a", &path, None, false, false).await.unwrap();
  std::fs::remove_file(&path).unwrap();

  let found = iterate(&app, "a").await;
  let ids: Vec<&str> = found.iter().map(|e| e.id.as_str()).collect();
  assert_eq!(ids, vec!["1", "2"]);
  assert_eq!(found[0].first("name"), Some("ACME"));
  assert!(iterate(&app, "b").await.is_empty());

  let mut out = Vec::new();
  app.iterate("a", Some("Person"), None, &mut out).await.unwrap();
  assert!(out.is_empty());
  app.iterate("*", None, Some(1), &mut out).await.unwrap();
  assert_eq!(String::from_utf8(out).unwrap().lines().count(), 1);
}

#[tokio::test]
async fn write_reports_the_failing_line() {
  let app = app().await;
  let good = serde_json::to_string(&company("1", "ACME")).unwrap();
  let path = input(&[good, String::new(), "{not json".to_owned()]);
  let err = app
    .write("a", &path, None, false, false)
    .await
    .unwrap_err();
  std::fs::remove_file(&path).unwrap();
  assert_eq!(err.to_string(), "invalid JSON on line 3");
}

#[tokio::test]
async fn init_recreate_clears_the_store() {
  let app = app().await;
  let path = entities(&[company("1", "ACME")]);
  app.write("a", &path, None, false, false).await.unwrap();
  std::fs::remove_file(&path).unwrap();

  app.init(false).await.unwrap();
  assert_eq!(iterate(&app, "a").await.len(), 1);
  app.init(true).await.unwrap();
  assert!(iterate(&app, "a").await.is_empty());
}

#[tokio::test]
async fn canonize_command_moves_the_entity() {
  let app = app().await;
  let path = entities(&[company("1", "ACME")]);
  app.write("a", &path, None, false, false).await.unwrap();
  std::fs::remove_file(&path).unwrap();

  app.canonize("a", "1", "C1", false).await.unwrap();
  let found = iterate(&app, "a").await;
  assert_eq!(found.len(), 1);
  assert_eq!(found[0].id, "C1");
  assert!(app.canonize("a", "nope", "C1", false).await.is_err());
}

#[tokio::test]
async fn xref_then_apply_in_each_dataset() {
  let app = app().await;
  let a = entities(&[
    company("1", "Tchibo Holding AG"),
    company("2", "Unrelated Things"),
  ]);
  let b = entities(&[company("4", "TCHIBO HOLDING AG")]);
  app.write("a", &a, None, false, false).await.unwrap();
  app.write("b", &b, None, false, false).await.unwrap();
  std::fs::remove_file(&a).unwrap();
  std::fs::remove_file(&b).unwrap();

  let mut out = Vec::new();
  app.xref(xref_args("a,b"), &mut out).await.unwrap();
  let lines: Vec<String> = String::from_utf8(out)
    .unwrap()
    .lines()
    .map(str::to_owned)
    .collect();
  let edges: Vec<Edge> = lines
    .iter()
    .map(|line| serde_json::from_str(line).unwrap())
    .collect();
  assert_eq!(edges.len(), 1);
  assert_eq!(edges[0].key(), ("1", "4"));
  assert_eq!(edges[0].judgement, Judgement::Positive);

  let path = input(&lines);
  app.apply("a,b", &path, true, false).await.unwrap();
  std::fs::remove_file(&path).unwrap();

  let in_a = app.store("a").get_canonical_id("1").await.unwrap();
  let in_b = app.store("b").get_canonical_id("4").await.unwrap();
  assert!(is_placeholder(&in_a));
  assert_eq!(in_a, in_b);
  assert_eq!(app.store("a").get_canonical_id("2").await.unwrap(), "2");

  let merged = iterate(&app, "a,b").await;
  let ids: Vec<&str> = merged.iter().map(|e| e.id.as_str()).collect();
  assert_eq!(ids.len(), 2);
  assert!(ids.contains(&in_a.as_str()));
  assert!(ids.contains(&"2"));
}

#[tokio::test]
async fn search_prints_scored_hits() {
  let app = app().await;
  let path = entities(&[
    company("1", "Tchibo Holding AG"),
    company("2", "Unrelated Things"),
  ]);
  app.write("a", &path, None, false, false).await.unwrap();
  std::fs::remove_file(&path).unwrap();

  let mut out = Vec::new();
  app.search("a", "tchibo", 10, false, &mut out).await.unwrap();
  let hits: Vec<serde_json::Value> = String::from_utf8(out)
    .unwrap()
    .lines()
    .map(|line| serde_json::from_str(line).unwrap())
    .collect();
  assert_eq!(hits.len(), 1);
  assert_eq!(hits[0]["entity"]["id"], "1");
  assert!(hits[0]["score"].as_f64().unwrap() > 0.0);
}
