//! Per-node execution: input aggregation, retries, the access/erasure node tasks and the
//! concurrent step scheduler.

pub mod execution_loop;
pub mod graph_task;
pub mod input_data;
#[cfg(test)]
mod input_data_test;
pub mod retry;

pub use execution_loop::{CancelFlag, StepReport, StepStop, run_step};
pub use graph_task::{TaskContext, run_access_node, run_erasure_node};
pub use input_data::{UpstreamRows, to_input_data};
pub use retry::{RetryPolicy, run_with_retry};
