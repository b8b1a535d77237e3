//! Checkpoint and cached node results for resumable execution.

use serde::{Deserialize, Serialize};

use super::{ActionType, CollectionAddress, Row};

/// The node (and step) a privacy request last paused or failed at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
  pub step: ActionType,
  pub collection: CollectionAddress,
}

impl Checkpoint {
  pub fn new(step: ActionType, collection: CollectionAddress) -> Self {
    Self { step, collection }
  }
}

/// Output of a completed node: retrieved rows (access) or a masked-row count (erasure).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CachedResult {
  Rows(Vec<Row>),
  MaskedCount(u64),
}

impl CachedResult {
  pub fn rows(&self) -> Option<&[Row]> {
    match self {
      CachedResult::Rows(rows) => Some(rows),
      CachedResult::MaskedCount(_) => None,
    }
  }

  pub fn masked_count(&self) -> Option<u64> {
    match self {
      CachedResult::Rows(_) => None,
      CachedResult::MaskedCount(n) => Some(*n),
    }
  }

  /// The step this kind of result belongs to.
  pub fn step(&self) -> ActionType {
    match self {
      CachedResult::Rows(_) => ActionType::Access,
      CachedResult::MaskedCount(_) => ActionType::Erasure,
    }
  }
}

/// Input an external actor must supply before a paused request can continue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AwaitingInputKind {
  /// Rows for a manual collection; `fields` lists the expected keys.
  ManualRows { fields: Vec<String> },
  /// Number of rows masked by hand.
  ManualMaskedCount,
  /// Result of a long-running connector operation, delivered with `token`.
  AsyncCallback { token: String },
}

/// Full detail of which node needs which input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AwaitingInput {
  pub step: ActionType,
  pub collection: CollectionAddress,
  pub kind: AwaitingInputKind,
  pub message: String,
}

impl AwaitingInput {
  pub fn checkpoint(&self) -> Checkpoint {
    Checkpoint::new(self.step, self.collection.clone())
  }
}
