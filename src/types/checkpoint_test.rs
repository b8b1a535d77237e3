//! Tests for `Checkpoint`, `CachedResult` and `AwaitingInput`.

use serde_json::json;

use super::{ActionType, AwaitingInput, AwaitingInputKind, CachedResult, Checkpoint};
use crate::types::CollectionAddress;

#[test]
fn checkpoint_roundtrip_serde() {
  let cp = Checkpoint::new(
    ActionType::Access,
    CollectionAddress::new("manual_input", "storage_unit"),
  );
  let json = serde_json::to_value(&cp).unwrap();
  assert_eq!(json, json!({"step": "access", "collection": "manual_input:storage_unit"}));
  let back: Checkpoint = serde_json::from_value(json).unwrap();
  assert_eq!(back, cp);
}

#[test]
fn cached_result_accessors() {
  let rows = CachedResult::Rows(vec![json!({"id": 1}).as_object().unwrap().clone()]);
  assert_eq!(rows.rows().map(<[_]>::len), Some(1));
  assert_eq!(rows.masked_count(), None);
  assert_eq!(rows.step(), ActionType::Access);
  let count = CachedResult::MaskedCount(3);
  assert_eq!(count.masked_count(), Some(3));
  assert!(count.rows().is_none());
  assert_eq!(count.step(), ActionType::Erasure);
}

#[test]
fn cached_result_serializes_tagged() {
  let v = serde_json::to_value(CachedResult::MaskedCount(2)).unwrap();
  assert_eq!(v, json!({"masked_count": 2}));
}

#[test]
fn awaiting_input_exposes_checkpoint() {
  let a = AwaitingInput {
    step: ActionType::Erasure,
    collection: CollectionAddress::new("ds", "c"),
    kind: AwaitingInputKind::AsyncCallback {
      token: "t".to_string(),
    },
    message: "waiting".to_string(),
  };
  assert_eq!(
    a.checkpoint(),
    Checkpoint::new(ActionType::Erasure, CollectionAddress::new("ds", "c"))
  );
  let v = serde_json::to_value(&a.kind).unwrap();
  assert_eq!(v, json!({"kind": "async_callback", "token": "t"}));
}
