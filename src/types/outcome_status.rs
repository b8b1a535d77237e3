//! Status of one node execution, as recorded in the execution log.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Status of one node execution step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
  InProcessing,
  Complete,
  Error,
  Retrying,
  Paused,
  Skipped,
}

impl ExecutionStatus {
  /// Statuses after which downstream nodes may start.
  pub fn releases_downstream(self) -> bool {
    matches!(self, ExecutionStatus::Complete | ExecutionStatus::Skipped)
  }
}

impl fmt::Display for ExecutionStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ExecutionStatus::InProcessing => write!(f, "in_processing"),
      ExecutionStatus::Complete => write!(f, "complete"),
      ExecutionStatus::Error => write!(f, "error"),
      ExecutionStatus::Retrying => write!(f, "retrying"),
      ExecutionStatus::Paused => write!(f, "paused"),
      ExecutionStatus::Skipped => write!(f, "skipped"),
    }
  }
}
