//! Resumable run state: per-request result cache, checkpoint, async tokens and execution log.
//!
//! - [RunStateStore]: storage seam, keyed by privacy request id.
//! - [RunState]: handle bound to one request; the engine and the input-supply paths go through it.
//! - [InMemoryRunStateStore] and [FileRunStateStore]: the two stores.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::error::StateError;
use crate::types::{
  ActionType, CachedResult, Checkpoint, CollectionAddress, ExecutionLog, ExecutionLogEntry,
  ExecutionStatus, Row,
};

mod file;
mod memory;

pub use file::{CACHE_DIRNAME, CHECKPOINT_FILENAME, EXECUTION_LOG_FILENAME, FileRunStateStore};
pub use memory::InMemoryRunStateStore;

/// Storage for run state. Implementations serialise their own writes.
#[async_trait]
pub trait RunStateStore: Send + Sync {
  /// Stores `result` unless an entry already exists; returns whether it was stored.
  async fn cache_result(
    &self,
    request_id: &str,
    step: ActionType,
    address: &CollectionAddress,
    result: &CachedResult,
  ) -> Result<bool, StateError>;

  async fn get_cached_result(
    &self,
    request_id: &str,
    step: ActionType,
    address: &CollectionAddress,
  ) -> Result<Option<CachedResult>, StateError>;

  async fn record_checkpoint(
    &self,
    request_id: &str,
    checkpoint: &Checkpoint,
  ) -> Result<(), StateError>;

  async fn get_checkpoint(&self, request_id: &str) -> Result<Option<Checkpoint>, StateError>;

  async fn clear_checkpoint(&self, request_id: &str) -> Result<(), StateError>;

  async fn append_log(&self, entry: &ExecutionLogEntry) -> Result<(), StateError>;

  async fn execution_log(&self, request_id: &str) -> Result<ExecutionLog, StateError>;

  /// Remembers which paused node a correlation token belongs to.
  async fn record_async_token(
    &self,
    request_id: &str,
    token: &str,
    checkpoint: &Checkpoint,
  ) -> Result<(), StateError>;

  /// Removes and returns the node a token belongs to.
  async fn take_async_token(
    &self,
    request_id: &str,
    token: &str,
  ) -> Result<Option<Checkpoint>, StateError>;

  /// Returns the outstanding token recorded for `checkpoint`, if any.
  async fn pending_async_token(
    &self,
    request_id: &str,
    checkpoint: &Checkpoint,
  ) -> Result<Option<String>, StateError>;
}

/// Result delivered by an asynchronous callback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AsyncCallbackPayload {
  AccessResults(Vec<Row>),
  RowsMasked(u64),
}

impl AsyncCallbackPayload {
  fn into_cached(self) -> CachedResult {
    match self {
      AsyncCallbackPayload::AccessResults(rows) => CachedResult::Rows(rows),
      AsyncCallbackPayload::RowsMasked(n) => CachedResult::MaskedCount(n),
    }
  }
}

/// Run state of one privacy request.
#[derive(Clone)]
pub struct RunState {
  store: Arc<dyn RunStateStore>,
  request_id: String,
}

impl RunState {
  pub fn new(store: Arc<dyn RunStateStore>, request_id: impl Into<String>) -> Self {
    Self {
      store,
      request_id: request_id.into(),
    }
  }

  pub fn request_id(&self) -> &str {
    &self.request_id
  }

  /// Writes a node result once; a second write for the same key is refused.
  pub async fn cache_result(
    &self,
    step: ActionType,
    address: &CollectionAddress,
    result: &CachedResult,
  ) -> Result<(), StateError> {
    let stored = self
      .store
      .cache_result(&self.request_id, step, address, result)
      .await?;
    if stored {
      Ok(())
    } else {
      Err(StateError::AlreadyCached {
        step,
        collection: address.clone(),
      })
    }
  }

  pub async fn get_cached_result(
    &self,
    step: ActionType,
    address: &CollectionAddress,
  ) -> Result<Option<CachedResult>, StateError> {
    self
      .store
      .get_cached_result(&self.request_id, step, address)
      .await
  }

  pub async fn record_checkpoint(
    &self,
    step: ActionType,
    address: &CollectionAddress,
  ) -> Result<(), StateError> {
    self
      .store
      .record_checkpoint(&self.request_id, &Checkpoint::new(step, address.clone()))
      .await
  }

  pub async fn get_checkpoint(&self) -> Result<Option<Checkpoint>, StateError> {
    self.store.get_checkpoint(&self.request_id).await
  }

  pub async fn clear_checkpoint(&self) -> Result<(), StateError> {
    self.store.clear_checkpoint(&self.request_id).await
  }

  /// Appends one status transition to the execution log.
  pub async fn log(
    &self,
    address: &CollectionAddress,
    action: ActionType,
    status: ExecutionStatus,
    message: Option<String>,
  ) -> Result<(), StateError> {
    let entry = ExecutionLogEntry::new(&self.request_id, address, action, status, message);
    self.store.append_log(&entry).await
  }

  pub async fn execution_log(&self) -> Result<ExecutionLog, StateError> {
    self.store.execution_log(&self.request_id).await
  }

  pub async fn record_async_token(
    &self,
    token: &str,
    step: ActionType,
    address: &CollectionAddress,
  ) -> Result<(), StateError> {
    self
      .store
      .record_async_token(&self.request_id, token, &Checkpoint::new(step, address.clone()))
      .await
  }

  /// Token of a callback still outstanding for this node. A rerun before the callback
  /// arrives re-suspends with it instead of calling the connector again.
  pub async fn pending_async_token(
    &self,
    step: ActionType,
    address: &CollectionAddress,
  ) -> Result<Option<String>, StateError> {
    self
      .store
      .pending_async_token(&self.request_id, &Checkpoint::new(step, address.clone()))
      .await
  }

  /// Supplies rows for a manual collection the request is paused at (access step). The node
  /// must be the checkpoint, or its latest log entry for the step must be `paused`; the
  /// latter covers a pause reported alongside a failure that took the checkpoint.
  #[instrument(level = "trace", skip(self, rows), fields(request_id = %self.request_id))]
  pub async fn supply_manual_input(
    &self,
    address: &CollectionAddress,
    rows: Vec<Row>,
  ) -> Result<(), StateError> {
    self.expect_paused_at(ActionType::Access, address).await?;
    info!(address = %address, rows = rows.len(), "manual access input supplied");
    self
      .cache_result(ActionType::Access, address, &CachedResult::Rows(rows))
      .await
  }

  /// Supplies the number of rows masked by hand for a manual collection (erasure step).
  #[instrument(level = "trace", skip(self), fields(request_id = %self.request_id))]
  pub async fn supply_manual_erasure_count(
    &self,
    address: &CollectionAddress,
    rows_masked: u64,
  ) -> Result<(), StateError> {
    self.expect_paused_at(ActionType::Erasure, address).await?;
    info!(address = %address, rows_masked, "manual erasure count supplied");
    self
      .cache_result(
        ActionType::Erasure,
        address,
        &CachedResult::MaskedCount(rows_masked),
      )
      .await
  }

  /// Delivers the result of a long-running connector call identified by `token`.
  #[instrument(level = "trace", skip(self, payload), fields(request_id = %self.request_id))]
  pub async fn supply_async_callback(
    &self,
    token: &str,
    payload: AsyncCallbackPayload,
  ) -> Result<(), StateError> {
    let result = payload.into_cached();
    let checkpoint = self
      .store
      .take_async_token(&self.request_id, token)
      .await?
      .ok_or_else(|| StateError::UnknownToken(token.to_string()))?;
    if result.step() != checkpoint.step {
      // keep the token usable for a correct payload
      self
        .store
        .record_async_token(&self.request_id, token, &checkpoint)
        .await?;
      return Err(StateError::PayloadMismatch(checkpoint.step));
    }
    info!(address = %checkpoint.collection, step = %checkpoint.step, "async callback received");
    self
      .cache_result(checkpoint.step, &checkpoint.collection, &result)
      .await
  }

  async fn expect_paused_at(
    &self,
    step: ActionType,
    address: &CollectionAddress,
  ) -> Result<(), StateError> {
    let expected = Checkpoint::new(step, address.clone());
    if self.get_checkpoint().await?.as_ref() == Some(&expected) {
      return Ok(());
    }
    // a failure in the same step takes the checkpoint; the node is still paused per the log
    let log = self.execution_log().await?;
    if log.last_status(address, step) == Some(ExecutionStatus::Paused) {
      return Ok(());
    }
    Err(StateError::NotAwaitingInput {
      request_id: self.request_id.clone(),
      step,
      collection: address.clone(),
    })
  }
}

impl std::fmt::Debug for RunState {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("RunState")
      .field("request_id", &self.request_id)
      .finish()
  }
}
