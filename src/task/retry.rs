//! Bounded retries around one connector call, with execution-log bookkeeping.

use std::future::Future;
use std::time::Duration;

use tracing::{info, warn};

use crate::config::ExecutionConfig;
use crate::error::{ConnectorError, StateError};
use crate::run_state::RunState;
use crate::types::{ActionType, CollectionAddress, ExecutionStatus};

/// How often and how patiently to retry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
  /// Retries after the first attempt.
  pub retries: u32,
  pub delay: Duration,
  pub backoff: f64,
}

impl RetryPolicy {
  pub fn from_config(config: &ExecutionConfig) -> Self {
    Self {
      retries: config.task_retry_count,
      delay: config.retry_delay(),
      backoff: config.task_retry_backoff,
    }
  }

  /// Sleep after the `failure`-th failed attempt (1-based): `delay * backoff^failure`.
  pub fn delay_after(&self, failure: u32) -> Duration {
    let factor = self.backoff.powi(i32::try_from(failure).unwrap_or(i32::MAX));
    let secs = self.delay.as_secs_f64() * factor;
    if secs.is_nan() || secs <= 0.0 {
      Duration::ZERO
    } else {
      Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }
  }
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self::from_config(&ExecutionConfig::default())
  }
}

/// Runs `op` up to `1 + policy.retries` times.
///
/// Logs `in_processing` before the first attempt and `retrying` before each further one.
/// Suspension signals stop immediately and are logged `paused`; non-retryable errors and
/// exhaustion are logged `error`. The inner result is the value or the last connector error;
/// a caller wanting a default on failure applies it to the inner result.
pub async fn run_with_retry<T, F, Fut>(
  state: &RunState,
  address: &CollectionAddress,
  action: ActionType,
  policy: &RetryPolicy,
  mut op: F,
) -> Result<Result<T, ConnectorError>, StateError>
where
  F: FnMut(u32) -> Fut,
  Fut: Future<Output = Result<T, ConnectorError>>,
{
  state
    .log(address, action, ExecutionStatus::InProcessing, None)
    .await?;
  let attempts = policy.retries.saturating_add(1);
  let mut attempt = 1;
  loop {
    let err = match op(attempt).await {
      Ok(value) => return Ok(Ok(value)),
      Err(err) => err,
    };
    if err.is_suspension() {
      info!(address = %address, %action, "paused: {}", err);
      state
        .log(address, action, ExecutionStatus::Paused, Some(err.to_string()))
        .await?;
      return Ok(Err(err));
    }
    if !err.is_retryable() || attempt >= attempts {
      warn!(address = %address, %action, attempt, "failed: {}", err);
      state
        .log(address, action, ExecutionStatus::Error, Some(err.to_string()))
        .await?;
      return Ok(Err(err));
    }
    let wait = policy.delay_after(attempt);
    warn!(address = %address, %action, attempt, ?wait, "retrying after: {}", err);
    tokio::time::sleep(wait).await;
    attempt += 1;
    state
      .log(address, action, ExecutionStatus::Retrying, Some(err.to_string()))
      .await?;
  }
}
