//! Error types for graph building, connectors, run state and request execution.

use thiserror::Error;

use crate::traversal::TraversalDetails;
use crate::types::{ActionType, CollectionAddress, FieldAddress, FieldPath};

/// One problem found in a dataset definition, qualified by its location
/// (`collections[0].fields[2].fidesops_meta.length`).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{path}: {message}")]
pub struct ValidationError {
  pub path: String,
  pub message: String,
}

impl ValidationError {
  pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
    Self {
      path: path.into(),
      message: message.into(),
    }
  }
}

/// Every problem found in one dataset definition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("dataset '{dataset}' is invalid: {}", render_errors(.errors))]
pub struct DatasetValidationErrors {
  pub dataset: String,
  pub errors: Vec<ValidationError>,
}

fn render_errors(errors: &[ValidationError]) -> String {
  errors
    .iter()
    .map(ToString::to_string)
    .collect::<Vec<_>>()
    .join("; ")
}

/// Configuration errors found while building or planning the graph.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
  #[error("collection {0} is defined more than once")]
  DuplicateCollection(CollectionAddress),
  #[error("collection {0} uses a reserved dataset name")]
  ReservedAddress(CollectionAddress),
  #[error("field path {path} in {collection} is declared both as a field name and as a nested path")]
  FieldPathCollision {
    collection: CollectionAddress,
    path: FieldPath,
  },
  #[error("field {0} references itself")]
  SelfReferentialField(FieldAddress),
  #[error(
    "conflicting masking strategies for {collection}:{field}: '{first}' (rule {first_rule}) and '{second}' (rule {second_rule})"
  )]
  MaskingConflict {
    collection: CollectionAddress,
    field: FieldPath,
    first: String,
    first_rule: String,
    second: String,
    second_rule: String,
  },
  #[error("erasure rule '{0}' has no masking strategy")]
  MissingMaskingStrategy(String),
}

/// Failure reported by a connector.
///
/// The two `Awaiting*` variants are suspension signals, not errors: the run stops cleanly
/// and resumes once the input is supplied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectorError {
  #[error("awaiting manual input: {0}")]
  AwaitingInput(String),
  #[error("awaiting asynchronous callback: {0}")]
  AwaitingCallback(String),
  #[error("connection error: {0}")]
  Connection(String),
  #[error("query error: {0}")]
  Query(String),
  /// Not worth retrying (bad credentials, malformed request).
  #[error("{0}")]
  Terminal(String),
}

impl ConnectorError {
  pub fn is_suspension(&self) -> bool {
    matches!(
      self,
      ConnectorError::AwaitingInput(_) | ConnectorError::AwaitingCallback(_)
    )
  }

  pub fn is_retryable(&self) -> bool {
    matches!(self, ConnectorError::Connection(_) | ConnectorError::Query(_))
  }
}

/// Failure of the resumable run state store.
#[derive(Debug, Error)]
pub enum StateError {
  #[error("result for {step} of {collection} is already cached")]
  AlreadyCached {
    step: ActionType,
    collection: CollectionAddress,
  },
  #[error("request '{request_id}' is not awaiting {step} input for {collection}")]
  NotAwaitingInput {
    request_id: String,
    step: ActionType,
    collection: CollectionAddress,
  },
  #[error("unknown async callback token '{0}'")]
  UnknownToken(String),
  #[error("callback payload does not match the awaited {0} step")]
  PayloadMismatch(ActionType),
  #[error("run state io error: {0}")]
  Io(#[from] std::io::Error),
  #[error("run state serialization error: {0}")]
  Serde(#[from] serde_json::Error),
}

/// Invalid execution configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid value '{value}' for {key}: {reason}")]
pub struct ConfigError {
  pub key: String,
  pub value: String,
  pub reason: String,
}

/// Errors that stop a request before (or outside of) node execution.
#[derive(Debug, Error)]
pub enum RunError {
  #[error("configuration error: {0}")]
  Configuration(#[from] GraphError),
  #[error("graph is not traversable: {}", .0.msg.as_deref().unwrap_or("unknown"))]
  NotTraversable(TraversalDetails),
  #[error("run state error: {0}")]
  State(#[from] StateError),
}
