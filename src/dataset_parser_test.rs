//! Tests for `dataset_parser`.

use serde_json::json;

use crate::dataset_parser::{data_category_re, dataset_from_value, parse_dataset};
use crate::types::{
  CollectionAddress, DataType, FieldAddress, FieldPath, ReferenceDirection, ScalarType,
};

fn customer_dataset() -> serde_json::Value {
  json!({
    "fides_key": "postgres_example",
    "collections": [
      {
        "name": "customer",
        "fields": [
          {"name": "id", "data_categories": ["user.unique_id"],
           "fidesops_meta": {"primary_key": true, "data_type": "integer"}},
          {"name": "email", "data_categories": ["user.contact.email"],
           "fidesops_meta": {"identity": "email", "data_type": "string", "length": 40}},
          {"name": "workplace_info", "fields": [
            {"name": "employer", "data_categories": ["user.job_title"]},
            {"name": "position"}
          ]}
        ]
      },
      {
        "name": "address",
        "fidesops_meta": {"after": ["postgres_example.customer"]},
        "fields": [
          {"name": "id", "fidesops_meta": {"primary_key": true}},
          {"name": "customer_id", "fidesops_meta": {
            "references": [{"dataset": "postgres_example", "field": "customer.id", "direction": "from"}],
            "data_type": "integer[]"
          }}
        ]
      }
    ]
  })
}

#[test]
fn parses_fields_references_and_after() {
  let ds = dataset_from_value(customer_dataset(), "pg_conn").unwrap();
  assert_eq!(ds.name, "postgres_example");
  assert_eq!(ds.connection_key, "pg_conn");

  let customer = ds.collection("customer").unwrap();
  let email = customer.field(&FieldPath::parse("email")).unwrap();
  assert_eq!(email.identity.as_deref(), Some("email"));
  assert_eq!(email.length, Some(40));
  assert_eq!(email.data_type, DataType::scalar(ScalarType::String));
  assert_eq!(customer.primary_keys(), vec![FieldPath::parse("id")]);

  let workplace = customer.field(&FieldPath::parse("workplace_info")).unwrap();
  assert_eq!(workplace.data_type.scalar, ScalarType::Object);
  assert!(customer.field(&FieldPath::parse("workplace_info.employer")).is_some());

  let address = ds.collection("address").unwrap();
  assert_eq!(
    address.after,
    vec![CollectionAddress::new("postgres_example", "customer")]
  );
  let customer_id = address.field(&FieldPath::parse("customer_id")).unwrap();
  assert_eq!(customer_id.data_type, DataType::array(ScalarType::Integer));
  let r = &customer_id.references()[0];
  assert_eq!(
    r.address,
    FieldAddress::new("postgres_example", "customer", FieldPath::parse("id"))
  );
  assert_eq!(r.direction, Some(ReferenceDirection::From));
}

#[test]
fn collects_every_error_with_its_location() {
  let def = json!({
    "fides_key": "__hidden",
    "collections": [
      {"name": "c", "fields": [
        {"name": "a", "data_categories": ["User Contact"]},
        {"name": "a"},
        {"name": "b", "fidesops_meta": {
          "length": -1,
          "data_type": "uuid",
          "references": [{"dataset": "d", "field": "other.x", "direction": "sideways"}]
        }}
      ], "fidesops_meta": {"after": ["nodot"]}},
      {"name": "c"}
    ]
  });
  let err = dataset_from_value(def, "conn").unwrap_err();
  assert_eq!(err.dataset, "__hidden");
  let paths: Vec<&str> = err.errors.iter().map(|e| e.path.as_str()).collect();
  for expected in [
    "fides_key",
    "collections[0].fidesops_meta.after[0]",
    "collections[0].fields[0].data_categories[0]",
    "collections[0].fields[1].name",
    "collections[0].fields[2].fidesops_meta.data_type",
    "collections[0].fields[2].fidesops_meta.length",
    "collections[0].fields[2].fidesops_meta.references[0].direction",
    "collections[1].name",
  ] {
    assert!(paths.contains(&expected), "missing {expected} in {paths:?}");
  }
  assert!(err.to_string().contains("dataset '__hidden' is invalid"));
}

#[test]
fn nested_field_errors_carry_full_path() {
  let def = json!({
    "fides_key": "mongo",
    "collections": [{"name": "customer_details", "fields": [
      {"name": "emergency_contact", "fields": [
        {"name": "phone", "fidesops_meta": {"length": -5}}
      ]}
    ]}]
  });
  let err = dataset_from_value(def, "mongo_conn").unwrap_err();
  assert_eq!(err.errors.len(), 1);
  assert_eq!(
    err.errors[0].path,
    "collections[0].fields[0].fields[0].fidesops_meta.length"
  );
}

#[test]
fn malformed_reference_field_is_reported() {
  let def = json!({
    "fides_key": "ds",
    "collections": [{"name": "c", "fields": [
      {"name": "x", "fidesops_meta": {"references": [{"dataset": "ds", "field": "no_collection"}]}}
    ]}]
  });
  let err = dataset_from_value(def, "conn").unwrap_err();
  assert_eq!(
    err.errors[0].path,
    "collections[0].fields[0].fidesops_meta.references[0].field"
  );
}

#[test]
fn invalid_json_is_a_single_root_error() {
  let err = parse_dataset("{not json", "conn").unwrap_err();
  assert_eq!(err.errors.len(), 1);
  assert_eq!(err.errors[0].path, "$");
}

#[test]
fn parse_dataset_accepts_text() {
  let text = customer_dataset().to_string();
  let ds = parse_dataset(&text, "pg_conn").unwrap();
  assert_eq!(ds.collections.len(), 2);
}

#[test]
fn category_pattern_is_compiled_once_and_shared() {
  let first = data_category_re().unwrap();
  let second = data_category_re().unwrap();
  assert!(std::ptr::eq(first, second));
  assert!(first.is_match("user.contact.email"));
  assert!(!first.is_match("User Contact"));
  assert!(!first.is_match("user..email"));
}
