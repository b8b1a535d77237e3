//! Append-only execution log: one entry per node status transition.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ActionType, CollectionAddress, ExecutionStatus};

/// One recorded status transition for a (privacy request, collection, action).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionLogEntry {
  pub privacy_request_id: String,
  pub dataset_name: String,
  pub collection_name: String,
  pub action_type: ActionType,
  pub status: ExecutionStatus,
  pub message: Option<String>,
  pub created_at: DateTime<Utc>,
}

impl ExecutionLogEntry {
  pub fn new(
    privacy_request_id: impl Into<String>,
    address: &CollectionAddress,
    action_type: ActionType,
    status: ExecutionStatus,
    message: Option<String>,
  ) -> Self {
    Self {
      privacy_request_id: privacy_request_id.into(),
      dataset_name: address.dataset.clone(),
      collection_name: address.collection.clone(),
      action_type,
      status,
      message,
      created_at: Utc::now(),
    }
  }

  pub fn address(&self) -> CollectionAddress {
    CollectionAddress::new(&self.dataset_name, &self.collection_name)
  }
}

/// All entries recorded for one privacy request, in append order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionLog {
  pub privacy_request_id: String,
  pub entries: Vec<ExecutionLogEntry>,
}

impl ExecutionLog {
  pub fn new(privacy_request_id: impl Into<String>, entries: Vec<ExecutionLogEntry>) -> Self {
    Self {
      privacy_request_id: privacy_request_id.into(),
      entries,
    }
  }

  /// Entries for one collection and action, in append order.
  pub fn entries_for(
    &self,
    address: &CollectionAddress,
    action: ActionType,
  ) -> Vec<&ExecutionLogEntry> {
    self
      .entries
      .iter()
      .filter(|e| {
        e.action_type == action
          && e.dataset_name == address.dataset
          && e.collection_name == address.collection
      })
      .collect()
  }

  pub fn statuses_for(
    &self,
    address: &CollectionAddress,
    action: ActionType,
  ) -> Vec<ExecutionStatus> {
    self
      .entries_for(address, action)
      .into_iter()
      .map(|e| e.status)
      .collect()
  }

  /// Last recorded status for a collection and action.
  pub fn last_status(
    &self,
    address: &CollectionAddress,
    action: ActionType,
  ) -> Option<ExecutionStatus> {
    self.statuses_for(address, action).last().copied()
  }

  pub fn count(&self, action: ActionType, status: ExecutionStatus) -> usize {
    self
      .entries
      .iter()
      .filter(|e| e.action_type == action && e.status == status)
      .count()
  }
}
