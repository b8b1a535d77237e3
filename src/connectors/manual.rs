//! Connector for manual collection points.

use async_trait::async_trait;

use crate::connector::Connector;
use crate::error::ConnectorError;
use crate::query_config::MaskingPlan;
use crate::traversal::TraversalNode;
use crate::types::{InputData, Policy, PrivacyRequest, Row};

/// Has no backing store: retrieval and masking wait for a person to supply the result.
#[derive(Debug, Clone, Copy, Default)]
pub struct ManualConnector;

#[async_trait]
impl Connector for ManualConnector {
  async fn retrieve_data(
    &self,
    node: &TraversalNode,
    _policy: &Policy,
    _request: &PrivacyRequest,
    _input: &InputData,
  ) -> Result<Vec<Row>, ConnectorError> {
    Err(ConnectorError::AwaitingInput(format!(
      "manual access input required for {}",
      node.address()
    )))
  }

  async fn mask_data(
    &self,
    node: &TraversalNode,
    _policy: &Policy,
    _request: &PrivacyRequest,
    _rows: &[Row],
    _plan: &MaskingPlan,
  ) -> Result<u64, ConnectorError> {
    Err(ConnectorError::AwaitingInput(format!(
      "manual erasure confirmation required for {}",
      node.address()
    )))
  }

  async fn test_connection(&self) -> Result<(), ConnectorError> {
    Ok(())
  }
}
