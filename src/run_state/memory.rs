//! Run state kept in process memory.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::RunStateStore;
use crate::error::StateError;
use crate::types::{
  ActionType, CachedResult, Checkpoint, CollectionAddress, ExecutionLog, ExecutionLogEntry,
};

#[derive(Debug, Default)]
struct RequestState {
  cache: BTreeMap<(ActionType, CollectionAddress), CachedResult>,
  checkpoint: Option<Checkpoint>,
  log: Vec<ExecutionLogEntry>,
  tokens: BTreeMap<String, Checkpoint>,
}

/// [RunStateStore] backed by a mutex-guarded map. Lost when the process exits.
#[derive(Debug, Default)]
pub struct InMemoryRunStateStore {
  requests: Mutex<BTreeMap<String, RequestState>>,
}

impl InMemoryRunStateStore {
  pub fn new() -> Self {
    Self::default()
  }
}

#[async_trait]
impl RunStateStore for InMemoryRunStateStore {
  async fn cache_result(
    &self,
    request_id: &str,
    step: ActionType,
    address: &CollectionAddress,
    result: &CachedResult,
  ) -> Result<bool, StateError> {
    let mut requests = self.requests.lock().await;
    let state = requests.entry(request_id.to_string()).or_default();
    let key = (step, address.clone());
    if state.cache.contains_key(&key) {
      return Ok(false);
    }
    state.cache.insert(key, result.clone());
    Ok(true)
  }

  async fn get_cached_result(
    &self,
    request_id: &str,
    step: ActionType,
    address: &CollectionAddress,
  ) -> Result<Option<CachedResult>, StateError> {
    let requests = self.requests.lock().await;
    Ok(
      requests
        .get(request_id)
        .and_then(|s| s.cache.get(&(step, address.clone())))
        .cloned(),
    )
  }

  async fn record_checkpoint(
    &self,
    request_id: &str,
    checkpoint: &Checkpoint,
  ) -> Result<(), StateError> {
    let mut requests = self.requests.lock().await;
    requests.entry(request_id.to_string()).or_default().checkpoint = Some(checkpoint.clone());
    Ok(())
  }

  async fn get_checkpoint(&self, request_id: &str) -> Result<Option<Checkpoint>, StateError> {
    let requests = self.requests.lock().await;
    Ok(requests.get(request_id).and_then(|s| s.checkpoint.clone()))
  }

  async fn clear_checkpoint(&self, request_id: &str) -> Result<(), StateError> {
    let mut requests = self.requests.lock().await;
    if let Some(state) = requests.get_mut(request_id) {
      state.checkpoint = None;
    }
    Ok(())
  }

  async fn append_log(&self, entry: &ExecutionLogEntry) -> Result<(), StateError> {
    let mut requests = self.requests.lock().await;
    requests
      .entry(entry.privacy_request_id.clone())
      .or_default()
      .log
      .push(entry.clone());
    Ok(())
  }

  async fn execution_log(&self, request_id: &str) -> Result<ExecutionLog, StateError> {
    let requests = self.requests.lock().await;
    let entries = requests
      .get(request_id)
      .map(|s| s.log.clone())
      .unwrap_or_default();
    Ok(ExecutionLog::new(request_id, entries))
  }

  async fn record_async_token(
    &self,
    request_id: &str,
    token: &str,
    checkpoint: &Checkpoint,
  ) -> Result<(), StateError> {
    let mut requests = self.requests.lock().await;
    requests
      .entry(request_id.to_string())
      .or_default()
      .tokens
      .insert(token.to_string(), checkpoint.clone());
    Ok(())
  }

  async fn take_async_token(
    &self,
    request_id: &str,
    token: &str,
  ) -> Result<Option<Checkpoint>, StateError> {
    let mut requests = self.requests.lock().await;
    Ok(
      requests
        .get_mut(request_id)
        .and_then(|s| s.tokens.remove(token)),
    )
  }

  async fn pending_async_token(
    &self,
    request_id: &str,
    checkpoint: &Checkpoint,
  ) -> Result<Option<String>, StateError> {
    let requests = self.requests.lock().await;
    Ok(requests.get(request_id).and_then(|s| {
      s.tokens
        .iter()
        .find(|(_, cp)| *cp == checkpoint)
        .map(|(token, _)| token.clone())
    }))
  }
}
