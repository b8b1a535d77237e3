//! Tests for `to_input_data`.

use serde_json::json;

use super::input_data::{UpstreamRows, to_input_data};
use crate::graph::DatasetGraph;
use crate::traversal::Traversal;
use crate::types::{
  Collection, CollectionAddress, DataType, Dataset, Field, FieldAddress, FieldPath, IdentitySeed,
  ReferenceDirection, Row, ScalarType,
};

fn row(v: serde_json::Value) -> Row {
  v.as_object().unwrap().clone()
}

fn from(c: &str, f: &str) -> (FieldAddress, Option<ReferenceDirection>) {
  (
    FieldAddress::new("mongo", c, FieldPath::parse(f)),
    Some(ReferenceDirection::From),
  )
}

/// flights(passenger email) -> pilots(id) and -> aircraft(id); customer -> contacts.
fn traversal() -> Traversal {
  let (p_ref, p_dir) = from("flights", "pilots");
  let (a_ref, a_dir) = from("flights", "plane");
  let (c_ref, c_dir) = from("customer", "emergency_contacts.phone");
  let datasets = vec![Dataset::new(
    "mongo",
    "mongo_conn",
    vec![
      Collection::new(
        "flights",
        vec![
          Field::new("passenger_email").identity("email"),
          Field::new("pilots").with_type(DataType::array(ScalarType::String)),
          Field::new("plane"),
        ],
      ),
      Collection::new(
        "pilots",
        vec![Field::new("id")
          .with_type(DataType::scalar(ScalarType::String))
          .reference(p_ref, p_dir)],
      ),
      Collection::new(
        "aircraft",
        vec![Field::new("id")
          .with_type(DataType::scalar(ScalarType::Integer))
          .reference(a_ref, a_dir)],
      ),
      Collection::new(
        "customer",
        vec![
          Field::new("email").identity("email"),
          Field::new("emergency_contacts").with_fields(vec![Field::new("phone")]),
        ],
      ),
      Collection::new(
        "phone_lookup",
        vec![Field::new("number")
          .with_type(DataType::scalar(ScalarType::String))
          .reference(c_ref, c_dir)],
      ),
    ],
  )];
  let graph = DatasetGraph::new(&datasets).unwrap();
  let mut seed = IdentitySeed::new();
  seed.insert("email".to_string(), json!("customer-1@example.com"));
  Traversal::new(&graph, &seed).unwrap()
}

fn ca(c: &str) -> CollectionAddress {
  CollectionAddress::new("mongo", c)
}

#[test]
fn pilots_are_flattened_coerced_and_deduplicated() {
  let t = traversal();
  let upstream = UpstreamRows::from([(
    ca("flights"),
    vec![
      row(json!({"passenger_email": "customer-1@example.com", "pilots": ["1", "2"]})),
      row(json!({"passenger_email": "customer-1@example.com", "pilots": ["3", "4"]})),
      row(json!({"passenger_email": "customer-1@example.com", "pilots": [1, "4", null]})),
    ],
  )]);
  let input = to_input_data(t.node(&ca("pilots")).unwrap(), &upstream);
  assert_eq!(
    input[&FieldPath::parse("id")],
    vec![json!("1"), json!("2"), json!("3"), json!("4")]
  );
}

#[test]
fn values_failing_coercion_are_dropped() {
  let t = traversal();
  let upstream = UpstreamRows::from([(
    ca("flights"),
    vec![
      row(json!({"plane": "10001"})),
      row(json!({"plane": "not-a-number"})),
      row(json!({"plane": 10002.0})),
      row(json!({"other": 1})),
    ],
  )]);
  let input = to_input_data(t.node(&ca("aircraft")).unwrap(), &upstream);
  assert_eq!(input[&FieldPath::parse("id")], vec![json!(10001), json!(10002)]);
}

#[test]
fn arrays_of_objects_are_descended() {
  let t = traversal();
  let upstream = UpstreamRows::from([(
    ca("customer"),
    vec![row(json!({
      "email": "customer-1@example.com",
      "emergency_contacts": [{"phone": "555-1"}, {"phone": "555-2"}, {"name": "no phone"}]
    }))],
  )]);
  let input = to_input_data(t.node(&ca("phone_lookup")).unwrap(), &upstream);
  assert_eq!(input[&FieldPath::parse("number")], vec![json!("555-1"), json!("555-2")]);
}

#[test]
fn identity_seed_row_feeds_identity_fields() {
  let t = traversal();
  let upstream = UpstreamRows::from([(
    CollectionAddress::root(),
    vec![row(json!({"email": "customer-1@example.com"}))],
  )]);
  let input = to_input_data(t.node(&ca("customer")).unwrap(), &upstream);
  assert_eq!(
    input[&FieldPath::parse("email")],
    vec![json!("customer-1@example.com")]
  );
}

#[test]
fn missing_upstream_gives_empty_key() {
  let t = traversal();
  let input = to_input_data(t.node(&ca("pilots")).unwrap(), &UpstreamRows::new());
  assert_eq!(input[&FieldPath::parse("id")], Vec::<serde_json::Value>::new());
}
