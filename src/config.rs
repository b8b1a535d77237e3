//! Execution settings: retry policy, run timeout and concurrency bound.
//!
//! Loaded once and handed to [crate::runner::RequestRunner]; nothing reads the environment
//! after construction.

use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// Env var for [ExecutionConfig::task_retry_count].
pub const ENV_TASK_RETRY_COUNT: &str = "DSR_TASK_RETRY_COUNT";
/// Env var for [ExecutionConfig::task_retry_delay_secs].
pub const ENV_TASK_RETRY_DELAY: &str = "DSR_TASK_RETRY_DELAY";
/// Env var for [ExecutionConfig::task_retry_backoff].
pub const ENV_TASK_RETRY_BACKOFF: &str = "DSR_TASK_RETRY_BACKOFF";
/// Env var for [ExecutionConfig::run_timeout_secs].
pub const ENV_RUN_TIMEOUT_SECS: &str = "DSR_RUN_TIMEOUT_SECS";
/// Env var for [ExecutionConfig::max_concurrency].
pub const ENV_MAX_CONCURRENCY: &str = "DSR_MAX_CONCURRENCY";

/// Settings threaded into one runner.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
  /// Retries after the first attempt of a node.
  pub task_retry_count: u32,
  /// Base retry delay, in seconds; the n-th retry waits `delay * backoff^n`.
  pub task_retry_delay_secs: f64,
  /// Multiplier applied to the delay after each further failure.
  pub task_retry_backoff: f64,
  /// Wall-clock limit for one run; `None` disables it.
  pub run_timeout_secs: Option<f64>,
  /// Upper bound on nodes executing at the same time.
  pub max_concurrency: usize,
}

impl Default for ExecutionConfig {
  fn default() -> Self {
    Self {
      task_retry_count: 0,
      task_retry_delay_secs: 1.0,
      task_retry_backoff: 1.0,
      run_timeout_secs: None,
      max_concurrency: 4,
    }
  }
}

impl ExecutionConfig {
  /// Defaults overridden by the `DSR_*` environment variables that are set.
  pub fn from_env() -> Result<Self, ConfigError> {
    Self::from_lookup(|key| std::env::var(key).ok())
  }

  /// Like [ExecutionConfig::from_env] with an explicit lookup function.
  pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
  where
    F: Fn(&str) -> Option<String>,
  {
    let mut config = Self::default();
    if let Some(v) = parse_var::<u32, _>(&lookup, ENV_TASK_RETRY_COUNT)? {
      config.task_retry_count = v;
    }
    if let Some(v) = parse_var::<f64, _>(&lookup, ENV_TASK_RETRY_DELAY)? {
      config.task_retry_delay_secs = non_negative(ENV_TASK_RETRY_DELAY, v)?;
    }
    if let Some(v) = parse_var::<f64, _>(&lookup, ENV_TASK_RETRY_BACKOFF)? {
      config.task_retry_backoff = non_negative(ENV_TASK_RETRY_BACKOFF, v)?;
    }
    if let Some(v) = parse_var::<f64, _>(&lookup, ENV_RUN_TIMEOUT_SECS)? {
      config.run_timeout_secs = Some(non_negative(ENV_RUN_TIMEOUT_SECS, v)?);
    }
    if let Some(v) = parse_var::<usize, _>(&lookup, ENV_MAX_CONCURRENCY)? {
      if v == 0 {
        return Err(ConfigError {
          key: ENV_MAX_CONCURRENCY.to_string(),
          value: v.to_string(),
          reason: "must be at least 1".to_string(),
        });
      }
      config.max_concurrency = v;
    }
    Ok(config)
  }

  pub fn retry_delay(&self) -> Duration {
    seconds(self.task_retry_delay_secs)
  }

  pub fn run_timeout(&self) -> Option<Duration> {
    self.run_timeout_secs.map(seconds)
  }
}

fn seconds(secs: f64) -> Duration {
  if secs.is_nan() || secs <= 0.0 {
    return Duration::ZERO;
  }
  Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>, ConfigError>
where
  T: FromStr,
  T::Err: std::fmt::Display,
  F: Fn(&str) -> Option<String>,
{
  let Some(raw) = lookup(key) else {
    return Ok(None);
  };
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    return Ok(None);
  }
  trimmed.parse::<T>().map(Some).map_err(|e| ConfigError {
    key: key.to_string(),
    value: raw.clone(),
    reason: e.to_string(),
  })
}

fn non_negative(key: &str, v: f64) -> Result<f64, ConfigError> {
  if v.is_finite() && v >= 0.0 {
    Ok(v)
  } else {
    Err(ConfigError {
      key: key.to_string(),
      value: v.to_string(),
      reason: "must be a non-negative number".to_string(),
    })
  }
}
