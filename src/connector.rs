//! Connector seam: how the engine reaches a data store, and the registry of configured
//! connections.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::connectors::ManualConnector;
use crate::error::ConnectorError;
use crate::query_config::MaskingPlan;
use crate::traversal::TraversalNode;
use crate::types::{ConnectionConfig, ConnectionType, InputData, Policy, PrivacyRequest, Row};

/// Access to one data store.
///
/// Implementations return [ConnectorError::AwaitingInput] or
/// [ConnectorError::AwaitingCallback] to suspend the run instead of failing it.
#[async_trait]
pub trait Connector: Send + Sync {
  /// Rows of `node` matching `input`.
  async fn retrieve_data(
    &self,
    node: &TraversalNode,
    policy: &Policy,
    request: &PrivacyRequest,
    input: &InputData,
  ) -> Result<Vec<Row>, ConnectorError>;

  /// Masks `rows` (as retrieved by the access step) and returns how many were updated.
  async fn mask_data(
    &self,
    node: &TraversalNode,
    policy: &Policy,
    request: &PrivacyRequest,
    rows: &[Row],
    plan: &MaskingPlan,
  ) -> Result<u64, ConnectorError>;

  async fn test_connection(&self) -> Result<(), ConnectorError>;
}

/// Configured connections by key.
#[derive(Clone, Default)]
pub struct ConnectorRegistry {
  entries: BTreeMap<String, (ConnectionConfig, Arc<dyn Connector>)>,
}

impl ConnectorRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn register(&mut self, config: ConnectionConfig, connector: Arc<dyn Connector>) {
    self.entries.insert(config.key.clone(), (config, connector));
  }

  /// Registers a manual connection: its nodes always wait for input.
  pub fn register_manual(&mut self, key: impl Into<String>) {
    let config = ConnectionConfig::new(key, ConnectionType::Manual);
    self.register(config, Arc::new(ManualConnector));
  }

  /// Drops a connection; datasets bound to it are left out of later runs.
  pub fn remove(&mut self, key: &str) -> Option<ConnectionConfig> {
    self.entries.remove(key).map(|(c, _)| c)
  }

  pub fn set_disabled(&mut self, key: &str, disabled: bool) {
    if let Some((config, _)) = self.entries.get_mut(key) {
      config.disabled = disabled;
    }
  }

  pub fn contains(&self, key: &str) -> bool {
    self.entries.contains_key(key)
  }

  pub fn config(&self, key: &str) -> Option<&ConnectionConfig> {
    self.entries.get(key).map(|(c, _)| c)
  }

  pub fn connector(&self, key: &str) -> Option<Arc<dyn Connector>> {
    self.entries.get(key).map(|(_, c)| Arc::clone(c))
  }

  /// Copy of every connection config, taken when a run starts.
  pub fn snapshot(&self) -> BTreeMap<String, ConnectionConfig> {
    self
      .entries
      .iter()
      .map(|(k, (c, _))| (k.clone(), c.clone()))
      .collect()
  }
}

impl std::fmt::Debug for ConnectorRegistry {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ConnectorRegistry")
      .field("connections", &self.entries.keys().collect::<Vec<_>>())
      .finish()
  }
}
