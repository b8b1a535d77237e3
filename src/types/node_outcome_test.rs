//! Tests for `NodeOutcome`.

use serde_json::json;

use super::{CachedResult, NodeOutcome};

#[test]
fn complete_rows_flow_downstream() {
  let row = json!({"id": 1}).as_object().unwrap().clone();
  let o = NodeOutcome::Complete(CachedResult::Rows(vec![row.clone()]));
  assert!(o.is_complete());
  assert_eq!(o.output_rows(), vec![row]);
}

#[test]
fn skipped_and_failed_yield_no_rows() {
  assert!(NodeOutcome::Skipped("disabled".to_string()).output_rows().is_empty());
  let failed = NodeOutcome::Failed("boom".to_string());
  assert!(!failed.is_complete());
  assert!(failed.output_rows().is_empty());
  assert!(
    NodeOutcome::Complete(CachedResult::MaskedCount(4))
      .output_rows()
      .is_empty()
  );
}
