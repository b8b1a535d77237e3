//! Tests for `ExecutionConfig`.

use std::collections::HashMap;
use std::time::Duration;

use crate::config::{ENV_MAX_CONCURRENCY, ENV_TASK_RETRY_COUNT, ExecutionConfig};

fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
  let map: HashMap<String, String> = vars
    .iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
  move |key| map.get(key).cloned()
}

#[test]
fn defaults_when_nothing_is_set() {
  let config = ExecutionConfig::from_lookup(lookup(&[])).unwrap();
  assert_eq!(config, ExecutionConfig::default());
  assert_eq!(config.task_retry_count, 0);
  assert_eq!(config.max_concurrency, 4);
  assert_eq!(config.retry_delay(), Duration::from_secs(1));
  assert_eq!(config.run_timeout(), None);
}

#[test]
fn env_values_override_defaults() {
  let config = ExecutionConfig::from_lookup(lookup(&[
    ("DSR_TASK_RETRY_COUNT", "5"),
    ("DSR_TASK_RETRY_DELAY", "0.25"),
    ("DSR_TASK_RETRY_BACKOFF", "2"),
    ("DSR_RUN_TIMEOUT_SECS", "30"),
    ("DSR_MAX_CONCURRENCY", " 8 "),
  ]))
  .unwrap();
  assert_eq!(config.task_retry_count, 5);
  assert_eq!(config.retry_delay(), Duration::from_millis(250));
  assert_eq!(config.task_retry_backoff, 2.0);
  assert_eq!(config.run_timeout(), Some(Duration::from_secs(30)));
  assert_eq!(config.max_concurrency, 8);
}

#[test]
fn unparsable_values_are_rejected_with_key() {
  let err = ExecutionConfig::from_lookup(lookup(&[(ENV_TASK_RETRY_COUNT, "many")])).unwrap_err();
  assert_eq!(err.key, ENV_TASK_RETRY_COUNT);
  assert_eq!(err.value, "many");

  let err = ExecutionConfig::from_lookup(lookup(&[(ENV_MAX_CONCURRENCY, "0")])).unwrap_err();
  assert_eq!(err.key, ENV_MAX_CONCURRENCY);

  assert!(ExecutionConfig::from_lookup(lookup(&[("DSR_TASK_RETRY_DELAY", "-1")])).is_err());
}

#[test]
fn deserializes_partial_json() {
  let config: ExecutionConfig =
    serde_json::from_str(r#"{"task_retry_count": 2, "run_timeout_secs": 1.5}"#).unwrap();
  assert_eq!(config.task_retry_count, 2);
  assert_eq!(config.task_retry_delay_secs, 1.0);
  assert_eq!(config.run_timeout(), Some(Duration::from_millis(1500)));
}
