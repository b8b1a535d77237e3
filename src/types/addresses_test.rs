//! Tests for `CollectionAddress`, `FieldAddress` and `FieldPath`.

use std::collections::BTreeMap;

use super::{CollectionAddress, FieldAddress, FieldPath};

#[test]
fn collection_address_display_and_parse() {
  let addr = CollectionAddress::new("postgres_example", "customer");
  assert_eq!(addr.to_string(), "postgres_example:customer");
  let parsed: CollectionAddress = "postgres_example:customer".parse().unwrap();
  assert_eq!(parsed, addr);
}

#[test]
fn collection_address_rejects_malformed() {
  assert!("no_colon".parse::<CollectionAddress>().is_err());
  assert!("a:b:c".parse::<CollectionAddress>().is_err());
  assert!(":b".parse::<CollectionAddress>().is_err());
}

#[test]
fn root_address_is_reserved() {
  let root = CollectionAddress::root();
  assert!(root.is_root());
  assert!(root.is_reserved());
  assert_eq!(root.to_string(), "__ROOT__:__ROOT__");
  assert!(!CollectionAddress::new("ds", "c").is_reserved());
}

#[test]
fn field_address_keeps_dotted_path() {
  let addr: FieldAddress = "mongo:customer_details:workplace_info.employer"
    .parse()
    .unwrap();
  assert_eq!(addr.collection, CollectionAddress::new("mongo", "customer_details"));
  assert_eq!(addr.path.segments(), ["workplace_info", "employer"]);
  assert_eq!(addr.path.leaf(), Some("employer"));
  assert_eq!(addr.to_string(), "mongo:customer_details:workplace_info.employer");
}

#[test]
fn field_path_child_appends_segment() {
  let p = FieldPath::parse("comments").child("comment_id");
  assert_eq!(p.string_path(), "comments.comment_id");
  assert_eq!(p.len(), 2);
}

#[test]
fn addresses_serialize_as_map_keys() {
  let mut m = BTreeMap::new();
  m.insert(CollectionAddress::new("a", "b"), 1);
  let json = serde_json::to_string(&m).unwrap();
  assert_eq!(json, r#"{"a:b":1}"#);
  let back: BTreeMap<CollectionAddress, i32> = serde_json::from_str(&json).unwrap();
  assert_eq!(back, m);
}
