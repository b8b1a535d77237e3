//! Built-in connectors.
//!
//! - [ManualConnector]: human-in-the-loop collection points; every call suspends.
//! - [MemoryConnector]: in-process tables queried through [crate::query_config::QueryConfig].

mod manual;
mod memory;
#[cfg(test)]
mod memory_test;

pub use manual::ManualConnector;
pub use memory::MemoryConnector;
