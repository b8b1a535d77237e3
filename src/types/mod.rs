//! Reference model and run-state types.
//!
//! Rows flow through the engine as JSON objects ([Row]); query inputs are keyed by the
//! consuming field's path ([InputData]).

use std::collections::BTreeMap;

use serde_json::Value;

mod addresses;
#[cfg(test)]
mod addresses_test;
mod checkpoint;
#[cfg(test)]
mod checkpoint_test;
mod collection;
mod data_type;
mod dataset;
mod execution_log;
mod field;
mod masking_strategy;
mod node_outcome;
#[cfg(test)]
mod node_outcome_test;
mod outcome_status;
#[cfg(test)]
mod outcome_status_test;
mod policy;
mod privacy_request;

pub use addresses::{
  AddressParseError, CollectionAddress, FieldAddress, FieldPath, RESERVED_PREFIX,
  ROOT_COLLECTION, ROOT_DATASET,
};
pub use checkpoint::{AwaitingInput, AwaitingInputKind, CachedResult, Checkpoint};
pub use collection::Collection;
pub use data_type::{DataType, ScalarType};
pub use dataset::Dataset;
pub use execution_log::{ExecutionLog, ExecutionLogEntry};
pub use field::{Field, FieldReference, ReferenceDirection};
pub use masking_strategy::MaskingStrategy;
pub use node_outcome::NodeOutcome;
pub use outcome_status::ExecutionStatus;
pub use policy::{ActionType, Policy, PolicyRuleTarget, Rule, category_matches};
pub use privacy_request::{ConnectionConfig, ConnectionType, PrivacyRequest};

/// One record returned by a connector.
pub type Row = serde_json::Map<String, Value>;

/// Aggregated query input for one node: local field path -> coerced values.
pub type InputData = BTreeMap<FieldPath, Vec<Value>>;

/// Identity name -> value (e.g. `{"email": "x@example.com"}`).
pub type IdentitySeed = BTreeMap<String, Value>;
