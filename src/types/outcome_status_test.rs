//! Tests for `ExecutionStatus`.

use super::ExecutionStatus;

#[test]
fn display_matches_log_names() {
  assert_eq!(ExecutionStatus::InProcessing.to_string(), "in_processing");
  assert_eq!(ExecutionStatus::Complete.to_string(), "complete");
  assert_eq!(ExecutionStatus::Error.to_string(), "error");
  assert_eq!(ExecutionStatus::Retrying.to_string(), "retrying");
  assert_eq!(ExecutionStatus::Paused.to_string(), "paused");
  assert_eq!(ExecutionStatus::Skipped.to_string(), "skipped");
}

#[test]
fn serde_uses_snake_case() {
  let json = serde_json::to_string(&ExecutionStatus::InProcessing).unwrap();
  assert_eq!(json, "\"in_processing\"");
  let back: ExecutionStatus = serde_json::from_str("\"paused\"").unwrap();
  assert_eq!(back, ExecutionStatus::Paused);
}

#[test]
fn only_complete_and_skipped_release_downstream() {
  assert!(ExecutionStatus::Complete.releases_downstream());
  assert!(ExecutionStatus::Skipped.releases_downstream());
  assert!(!ExecutionStatus::Error.releases_downstream());
  assert!(!ExecutionStatus::Paused.releases_downstream());
}
