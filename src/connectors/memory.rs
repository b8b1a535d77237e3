//! In-process SQL-like connector backed by tables of JSON rows.

use std::collections::{BTreeMap, VecDeque};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, instrument};

use crate::connector::Connector;
use crate::error::ConnectorError;
use crate::query_config::{MaskingPlan, QueryConfig, set_row_value};
use crate::traversal::TraversalNode;
use crate::types::{InputData, Policy, PrivacyRequest, Row};

/// Tables keyed by collection name. Selects and updates go through [QueryConfig], and every
/// executed statement is recorded.
#[derive(Debug, Default)]
pub struct MemoryConnector {
  tables: Mutex<BTreeMap<String, Vec<Row>>>,
  statements: Mutex<Vec<String>>,
  injected: Mutex<BTreeMap<String, VecDeque<ConnectorError>>>,
}

impl MemoryConnector {
  pub fn new() -> Self {
    Self::default()
  }

  /// Appends rows to a table, creating it if needed.
  pub async fn insert(&self, table: impl Into<String>, rows: Vec<Row>) {
    self
      .tables
      .lock()
      .await
      .entry(table.into())
      .or_default()
      .extend(rows);
  }

  /// Current contents of a table.
  pub async fn rows(&self, table: &str) -> Vec<Row> {
    self
      .tables
      .lock()
      .await
      .get(table)
      .cloned()
      .unwrap_or_default()
  }

  /// Statements executed so far, in order.
  pub async fn statements(&self) -> Vec<String> {
    self.statements.lock().await.clone()
  }

  /// The next `times` calls touching `table` fail with `error`.
  pub async fn fail_next(&self, table: impl Into<String>, error: ConnectorError, times: usize) {
    let mut injected = self.injected.lock().await;
    let queue = injected.entry(table.into()).or_default();
    queue.extend(std::iter::repeat_n(error, times));
  }

  async fn take_injected(&self, table: &str) -> Result<(), ConnectorError> {
    let mut injected = self.injected.lock().await;
    match injected.get_mut(table).and_then(VecDeque::pop_front) {
      Some(err) => Err(err),
      None => Ok(()),
    }
  }
}

#[async_trait]
impl Connector for MemoryConnector {
  #[instrument(level = "trace", skip_all, fields(address = %node.address()))]
  async fn retrieve_data(
    &self,
    node: &TraversalNode,
    _policy: &Policy,
    _request: &PrivacyRequest,
    input: &InputData,
  ) -> Result<Vec<Row>, ConnectorError> {
    let table = &node.collection().name;
    self.take_injected(table).await?;
    let Some(query) = QueryConfig::new(node).generate_query(input) else {
      return Ok(Vec::new());
    };
    debug!(sql = %query.dry_run(), "select");
    self.statements.lock().await.push(query.to_sql());
    let tables = self.tables.lock().await;
    Ok(
      tables
        .get(table)
        .map(|rows| rows.iter().filter(|r| query.matches(r)).cloned().collect())
        .unwrap_or_default(),
    )
  }

  #[instrument(level = "trace", skip_all, fields(address = %node.address()))]
  async fn mask_data(
    &self,
    node: &TraversalNode,
    _policy: &Policy,
    _request: &PrivacyRequest,
    rows: &[Row],
    plan: &MaskingPlan,
  ) -> Result<u64, ConnectorError> {
    let table = &node.collection().name;
    self.take_injected(table).await?;
    let config = QueryConfig::new(node);
    let mut masked = 0;
    for row in rows {
      let Some(update) = config.generate_update(row, plan) else {
        continue;
      };
      debug!(sql = %update, "update");
      self.statements.lock().await.push(update.to_sql());
      let mut tables = self.tables.lock().await;
      let Some(stored) = tables.get_mut(table) else {
        continue;
      };
      for target in stored.iter_mut().filter(|r| update.matches(r)) {
        for (path, value) in &update.set {
          set_row_value(target, path, value.clone());
        }
      }
      masked += 1;
    }
    Ok(masked)
  }

  async fn test_connection(&self) -> Result<(), ConnectorError> {
    Ok(())
  }
}
