//! Result of executing one traversal node for one step.

use super::{AwaitingInput, CachedResult};

/// Result of executing one traversal node (access or erasure).
#[derive(Debug, Clone, PartialEq)]
pub enum NodeOutcome {
  /// Finished (or served from cache); downstream nodes may start.
  Complete(CachedResult),
  /// Connection disabled or action not enabled; downstream nodes see empty input.
  Skipped(String),
  /// Needs external input; the run stops here.
  Paused(AwaitingInput),
  /// Terminal failure after retries.
  Failed(String),
}

impl NodeOutcome {
  pub fn is_complete(&self) -> bool {
    matches!(self, NodeOutcome::Complete(_))
  }

  /// Rows to hand to downstream nodes (empty for skipped nodes and erasure results).
  pub fn output_rows(&self) -> Vec<super::Row> {
    match self {
      NodeOutcome::Complete(CachedResult::Rows(rows)) => rows.clone(),
      _ => Vec::new(),
    }
  }
}
