//! Tests for `MemoryConnector`.

use serde_json::json;

use super::MemoryConnector;
use crate::connector::Connector;
use crate::error::ConnectorError;
use crate::graph::DatasetGraph;
use crate::query_config::update_value_map;
use crate::traversal::Traversal;
use crate::types::{
  ActionType, Collection, CollectionAddress, Dataset, Field, FieldPath, IdentitySeed, InputData,
  MaskingStrategy, Policy, PrivacyRequest, Row, Rule,
};

fn row(v: serde_json::Value) -> Row {
  v.as_object().unwrap().clone()
}

fn traversal() -> Traversal {
  let datasets = vec![Dataset::new(
    "db",
    "mem",
    vec![Collection::new(
      "customer",
      vec![
        Field::new("id").primary_key(),
        Field::new("email").identity("email"),
        Field::new("name").categories(["user.name"]),
      ],
    )],
  )];
  let graph = DatasetGraph::new(&datasets).unwrap();
  let mut seed = IdentitySeed::new();
  seed.insert("email".to_string(), json!("a@example.com"));
  Traversal::new(&graph, &seed).unwrap()
}

fn request() -> PrivacyRequest {
  PrivacyRequest::new(
    "pr-1",
    IdentitySeed::new(),
    Policy {
      key: "p".to_string(),
      rules: vec![Rule {
        key: "erase_name".to_string(),
        action_type: ActionType::Erasure,
        targets: vec!["user.name".to_string()],
        masking_strategy: Some(MaskingStrategy::NullRewrite),
      }],
    },
  )
}

async fn connector() -> MemoryConnector {
  let c = MemoryConnector::new();
  c.insert(
    "customer",
    vec![
      row(json!({"id": 1, "email": "a@example.com", "name": "Ann"})),
      row(json!({"id": 2, "email": "b@example.com", "name": "Bob"})),
    ],
  )
  .await;
  c
}

fn email_input() -> InputData {
  let mut input = InputData::new();
  input.insert(FieldPath::parse("email"), vec![json!("a@example.com")]);
  input
}

#[tokio::test]
async fn retrieve_returns_matching_rows_and_records_statement() {
  let t = traversal();
  let node = t.node(&CollectionAddress::new("db", "customer")).unwrap();
  let c = connector().await;
  let req = request();
  let rows = c
    .retrieve_data(node, &req.policy, &req, &email_input())
    .await
    .unwrap();
  assert_eq!(rows.len(), 1);
  assert_eq!(rows[0]["name"], json!("Ann"));
  assert_eq!(
    c.statements().await,
    vec!["SELECT id,email,name FROM customer WHERE email = :email".to_string()]
  );
}

#[tokio::test]
async fn empty_input_issues_no_query() {
  let t = traversal();
  let node = t.node(&CollectionAddress::new("db", "customer")).unwrap();
  let c = connector().await;
  let req = request();
  let rows = c
    .retrieve_data(node, &req.policy, &req, &InputData::new())
    .await
    .unwrap();
  assert!(rows.is_empty());
  assert!(c.statements().await.is_empty());
}

#[tokio::test]
async fn mask_updates_stored_rows_by_primary_key() {
  let t = traversal();
  let address = CollectionAddress::new("db", "customer");
  let node = t.node(&address).unwrap();
  let c = connector().await;
  let req = request();
  let plan = update_value_map(&address, node.collection(), &req.policy).unwrap();
  let retrieved = c
    .retrieve_data(node, &req.policy, &req, &email_input())
    .await
    .unwrap();
  let masked = c
    .mask_data(node, &req.policy, &req, &retrieved, &plan)
    .await
    .unwrap();
  assert_eq!(masked, 1);
  let stored = c.rows("customer").await;
  assert_eq!(stored[0]["name"], json!(null));
  assert_eq!(stored[1]["name"], json!("Bob"));
  assert_eq!(
    c.statements().await.last().map(String::as_str),
    Some("UPDATE customer SET name = :name WHERE id = :id")
  );
}

#[tokio::test]
async fn injected_failures_are_consumed_in_order() {
  let t = traversal();
  let node = t.node(&CollectionAddress::new("db", "customer")).unwrap();
  let c = connector().await;
  c.fail_next("customer", ConnectorError::Connection("down".to_string()), 2)
    .await;
  let req = request();
  for _ in 0..2 {
    let err = c
      .retrieve_data(node, &req.policy, &req, &email_input())
      .await
      .unwrap_err();
    assert!(err.is_retryable());
  }
  assert!(
    c.retrieve_data(node, &req.policy, &req, &email_input())
      .await
      .is_ok()
  );
  assert!(c.test_connection().await.is_ok());
}
