//! Run state persisted as JSON files, one directory per privacy request.
//!
//! Layout under the store root:
//!
//! ```text
//! <request>/checkpoint.json       current checkpoint (absent when none)
//! <request>/execution_log.jsonl   one ExecutionLogEntry per line, append-only
//! <request>/tokens.json           async correlation token -> checkpoint
//! <request>/cache/<key>.json      one cached node result per file
//! ```
//!
//! Every file except the log is written to a temporary sibling and renamed into place.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::instrument;

use super::RunStateStore;
use crate::error::StateError;
use crate::types::{
  ActionType, CachedResult, Checkpoint, CollectionAddress, ExecutionLog, ExecutionLogEntry,
};

/// Checkpoint filename under a request directory.
pub const CHECKPOINT_FILENAME: &str = "checkpoint.json";
/// Execution log filename under a request directory.
pub const EXECUTION_LOG_FILENAME: &str = "execution_log.jsonl";
/// Directory holding cached node results.
pub const CACHE_DIRNAME: &str = "cache";
const TOKENS_FILENAME: &str = "tokens.json";

/// [RunStateStore] writing JSON files under a root directory.
#[derive(Debug)]
pub struct FileRunStateStore {
  root: PathBuf,
  write_lock: Mutex<()>,
}

impl FileRunStateStore {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self {
      root: root.into(),
      write_lock: Mutex::new(()),
    }
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  /// Directory of one request. Ids that are not plain file names are hashed.
  pub fn request_dir(&self, request_id: &str) -> PathBuf {
    let plain = !request_id.is_empty()
      && request_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if plain {
      self.root.join(request_id)
    } else {
      self.root.join(digest(request_id))
    }
  }

  fn cache_path(&self, request_id: &str, step: ActionType, address: &CollectionAddress) -> PathBuf {
    self
      .request_dir(request_id)
      .join(CACHE_DIRNAME)
      .join(format!("{}-{}.json", step, digest(&address.to_string())))
  }

  async fn load_tokens(&self, request_id: &str) -> Result<BTreeMap<String, Checkpoint>, StateError> {
    let path = self.request_dir(request_id).join(TOKENS_FILENAME);
    Ok(load_json(&path).await?.unwrap_or_default())
  }
}

fn digest(s: &str) -> String {
  hex::encode(Sha256::digest(s.as_bytes()))
}

/// Writes `value` as pretty JSON to a temp file next to `path`, then renames it into place.
#[instrument(level = "trace", skip(value))]
async fn save_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StateError> {
  let json = serde_json::to_vec_pretty(value)?;
  if let Some(parent) = path.parent() {
    tokio::fs::create_dir_all(parent).await?;
  }
  let tmp = path.with_extension("json.tmp");
  tokio::fs::write(&tmp, json).await?;
  tokio::fs::rename(&tmp, path).await?;
  Ok(())
}

/// Loads JSON from `path`; a missing file is `None`.
#[instrument(level = "trace")]
async fn load_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StateError> {
  match tokio::fs::read(path).await {
    Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
    Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
    Err(e) => Err(e.into()),
  }
}

#[async_trait]
impl RunStateStore for FileRunStateStore {
  async fn cache_result(
    &self,
    request_id: &str,
    step: ActionType,
    address: &CollectionAddress,
    result: &CachedResult,
  ) -> Result<bool, StateError> {
    let _guard = self.write_lock.lock().await;
    let path = self.cache_path(request_id, step, address);
    if tokio::fs::try_exists(&path).await? {
      return Ok(false);
    }
    save_json(&path, result).await?;
    Ok(true)
  }

  async fn get_cached_result(
    &self,
    request_id: &str,
    step: ActionType,
    address: &CollectionAddress,
  ) -> Result<Option<CachedResult>, StateError> {
    load_json(&self.cache_path(request_id, step, address)).await
  }

  async fn record_checkpoint(
    &self,
    request_id: &str,
    checkpoint: &Checkpoint,
  ) -> Result<(), StateError> {
    let _guard = self.write_lock.lock().await;
    let path = self.request_dir(request_id).join(CHECKPOINT_FILENAME);
    save_json(&path, checkpoint).await
  }

  async fn get_checkpoint(&self, request_id: &str) -> Result<Option<Checkpoint>, StateError> {
    load_json(&self.request_dir(request_id).join(CHECKPOINT_FILENAME)).await
  }

  async fn clear_checkpoint(&self, request_id: &str) -> Result<(), StateError> {
    let _guard = self.write_lock.lock().await;
    let path = self.request_dir(request_id).join(CHECKPOINT_FILENAME);
    match tokio::fs::remove_file(&path).await {
      Ok(()) => Ok(()),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
      Err(e) => Err(e.into()),
    }
  }

  async fn append_log(&self, entry: &ExecutionLogEntry) -> Result<(), StateError> {
    let _guard = self.write_lock.lock().await;
    let dir = self.request_dir(&entry.privacy_request_id);
    tokio::fs::create_dir_all(&dir).await?;
    let mut line = serde_json::to_vec(entry)?;
    line.push(b'\n');
    let mut file = tokio::fs::OpenOptions::new()
      .create(true)
      .append(true)
      .open(dir.join(EXECUTION_LOG_FILENAME))
      .await?;
    file.write_all(&line).await?;
    file.flush().await?;
    Ok(())
  }

  async fn execution_log(&self, request_id: &str) -> Result<ExecutionLog, StateError> {
    let path = self.request_dir(request_id).join(EXECUTION_LOG_FILENAME);
    let text = match tokio::fs::read_to_string(&path).await {
      Ok(text) => text,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
      Err(e) => return Err(e.into()),
    };
    let entries = text
      .lines()
      .filter(|l| !l.trim().is_empty())
      .map(serde_json::from_str)
      .collect::<Result<Vec<ExecutionLogEntry>, _>>()?;
    Ok(ExecutionLog::new(request_id, entries))
  }

  async fn record_async_token(
    &self,
    request_id: &str,
    token: &str,
    checkpoint: &Checkpoint,
  ) -> Result<(), StateError> {
    let _guard = self.write_lock.lock().await;
    let mut tokens = self.load_tokens(request_id).await?;
    tokens.insert(token.to_string(), checkpoint.clone());
    save_json(&self.request_dir(request_id).join(TOKENS_FILENAME), &tokens).await
  }

  async fn take_async_token(
    &self,
    request_id: &str,
    token: &str,
  ) -> Result<Option<Checkpoint>, StateError> {
    let _guard = self.write_lock.lock().await;
    let mut tokens = self.load_tokens(request_id).await?;
    let taken = tokens.remove(token);
    if taken.is_some() {
      save_json(&self.request_dir(request_id).join(TOKENS_FILENAME), &tokens).await?;
    }
    Ok(taken)
  }

  async fn pending_async_token(
    &self,
    request_id: &str,
    checkpoint: &Checkpoint,
  ) -> Result<Option<String>, StateError> {
    let tokens = self.load_tokens(request_id).await?;
    Ok(
      tokens
        .into_iter()
        .find(|(_, cp)| cp == checkpoint)
        .map(|(token, _)| token),
    )
  }
}
