//! # dsr-graph
//!
//! Dataset traversal and resumable graph execution for privacy access and erasure requests.
//!
//! ## Architecture
//!
//! - [types]: reference model (addresses, fields, collections, datasets, policies) and run-state
//!   records.
//! - [dataset_parser]: declarative dataset definitions to validated [types::Dataset]s.
//! - [graph] and [traversal]: the dependency graph and its visit plan for one identity seed.
//! - [query_config]: query and masking-update generation per node.
//! - [task]: per-node access/erasure tasks, retries and the concurrent step scheduler.
//! - [run_state]: result cache, checkpoint, async tokens and execution log.
//! - [runner]: [RequestRunner], which ties it together and can be re-run to resume.
//! - [filter]: reduce access results to the categories a policy targets.

pub mod config;
#[cfg(test)]
mod config_test;
pub mod connector;
pub mod connectors;
pub mod dataset_parser;
#[cfg(test)]
mod dataset_parser_test;
pub mod error;
pub mod filter;
pub mod graph;
pub mod query_config;
pub mod run_state;
pub mod runner;
pub mod task;
pub mod traversal;
pub mod types;

pub use config::ExecutionConfig;
pub use connector::{Connector, ConnectorRegistry};
pub use connectors::{ManualConnector, MemoryConnector};
pub use dataset_parser::{dataset_from_value, parse_dataset};
pub use error::{
  ConfigError, ConnectorError, DatasetValidationErrors, GraphError, RunError, StateError,
};
pub use filter::{AccessResults, filter_data_categories};
pub use graph::DatasetGraph;
pub use run_state::{AsyncCallbackPayload, FileRunStateStore, InMemoryRunStateStore, RunState};
pub use runner::{NodeFailure, RequestRunner, RunOutcome, RunResults};
pub use task::CancelFlag;
pub use traversal::{Traversal, TraversalDetails};
