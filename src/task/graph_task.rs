//! Access and erasure execution of a single traversal node.
//!
//! Both tasks share one shape: serve from the result cache when possible, honour the
//! connection's skip rules, then call the connector inside [run_with_retry]. Suspension
//! signals become [NodeOutcome::Paused] with the input the node waits for.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info, instrument};
use uuid::Uuid;

use super::input_data::{UpstreamRows, to_input_data};
use super::retry::{RetryPolicy, run_with_retry};
use crate::connector::{Connector, ConnectorRegistry};
use crate::error::{ConnectorError, StateError};
use crate::query_config::MaskingPlan;
use crate::run_state::RunState;
use crate::traversal::TraversalNode;
use crate::types::{
  ActionType, AwaitingInput, AwaitingInputKind, CachedResult, ConnectionConfig, ExecutionStatus,
  NodeOutcome, PrivacyRequest, Row,
};

/// Message logged for erasure of a collection that defines no primary key.
pub const NO_PRIMARY_KEY_MESSAGE: &str =
  "No values were erased since no primary key was defined for this collection";

/// Everything a node task needs for one run. Connection configs are the snapshot taken when
/// the run started.
#[derive(Debug, Clone)]
pub struct TaskContext {
  pub request: PrivacyRequest,
  pub state: RunState,
  pub connections: BTreeMap<String, ConnectionConfig>,
  pub connectors: ConnectorRegistry,
  pub retry: RetryPolicy,
}

impl TaskContext {
  fn connection(&self, node: &TraversalNode) -> Option<&ConnectionConfig> {
    self.connections.get(&node.node.connection_key)
  }

  fn connector(&self, node: &TraversalNode) -> Option<Arc<dyn Connector>> {
    self.connectors.connector(&node.node.connection_key)
  }
}

/// Retrieves the rows of `node` matching the values its upstream nodes produced.
#[instrument(level = "trace", skip_all, fields(address = %node.address()))]
pub async fn run_access_node(
  ctx: &TaskContext,
  node: &TraversalNode,
  upstream: &UpstreamRows,
) -> Result<NodeOutcome, StateError> {
  let step = ActionType::Access;
  if let Some(outcome) = from_cache(ctx, node, step).await? {
    return Ok(outcome);
  }
  let (config, connector) = match prepare(ctx, node, step).await? {
    Prepared::Ready(config, connector) => (config, connector),
    Prepared::Done(outcome) => return Ok(outcome),
  };
  if let Some(outcome) = awaiting_callback(ctx, node, step).await? {
    return Ok(outcome);
  }

  let input = to_input_data(node, upstream);
  debug!(keys = input.len(), manual = config.is_manual(), "access input built");
  let connector: &dyn Connector = connector.as_ref();
  let policy = &ctx.request.policy;
  let result = run_with_retry(
    &ctx.state,
    node.address(),
    step,
    &ctx.retry,
    |_| connector.retrieve_data(node, policy, &ctx.request, &input),
  )
  .await?;

  match result {
    Ok(rows) => {
      let message = format!("{} rows retrieved", rows.len());
      complete(ctx, node, step, CachedResult::Rows(rows), Some(message)).await
    }
    Err(err) => suspended_or_failed(ctx, node, step, err).await,
  }
}

/// Masks the rows the access step retrieved for `node` according to `plan`.
#[instrument(level = "trace", skip_all, fields(address = %node.address()))]
pub async fn run_erasure_node(
  ctx: &TaskContext,
  node: &TraversalNode,
  access_rows: &[Row],
  plan: &MaskingPlan,
) -> Result<NodeOutcome, StateError> {
  let step = ActionType::Erasure;
  if let Some(outcome) = from_cache(ctx, node, step).await? {
    return Ok(outcome);
  }
  let (config, connector) = match prepare(ctx, node, step).await? {
    Prepared::Ready(config, connector) => (config, connector),
    Prepared::Done(outcome) => return Ok(outcome),
  };
  if let Some(outcome) = awaiting_callback(ctx, node, step).await? {
    return Ok(outcome);
  }

  if !config.is_manual() && node.collection().primary_keys().is_empty() {
    info!(address = %node.address(), "{}", NO_PRIMARY_KEY_MESSAGE);
    ctx
      .state
      .log(node.address(), step, ExecutionStatus::InProcessing, None)
      .await?;
    return complete(
      ctx,
      node,
      step,
      CachedResult::MaskedCount(0),
      Some(NO_PRIMARY_KEY_MESSAGE.to_string()),
    )
    .await;
  }
  if !config.is_manual() && plan.is_empty() {
    ctx
      .state
      .log(node.address(), step, ExecutionStatus::InProcessing, None)
      .await?;
    return complete(
      ctx,
      node,
      step,
      CachedResult::MaskedCount(0),
      Some("no fields matched the erasure rules".to_string()),
    )
    .await;
  }

  let connector: &dyn Connector = connector.as_ref();
  let policy = &ctx.request.policy;
  let result = run_with_retry(
    &ctx.state,
    node.address(),
    step,
    &ctx.retry,
    |_| connector.mask_data(node, policy, &ctx.request, access_rows, plan),
  )
  .await?;

  match result {
    Ok(masked) => {
      let message = format!("{} rows masked", masked);
      complete(ctx, node, step, CachedResult::MaskedCount(masked), Some(message)).await
    }
    Err(err) => suspended_or_failed(ctx, node, step, err).await,
  }
}

enum Prepared {
  Ready(ConnectionConfig, Arc<dyn Connector>),
  Done(NodeOutcome),
}

/// A cached result completes the node without touching the connector. The completion is
/// logged only when the log does not already end with it.
async fn from_cache(
  ctx: &TaskContext,
  node: &TraversalNode,
  step: ActionType,
) -> Result<Option<NodeOutcome>, StateError> {
  let Some(cached) = ctx.state.get_cached_result(step, node.address()).await? else {
    return Ok(None);
  };
  let log = ctx.state.execution_log().await?;
  if log.last_status(node.address(), step) != Some(ExecutionStatus::Complete) {
    ctx
      .state
      .log(
        node.address(),
        step,
        ExecutionStatus::Complete,
        Some("restored from cache".to_string()),
      )
      .await?;
  }
  debug!(address = %node.address(), %step, "served from cache");
  Ok(Some(NodeOutcome::Complete(cached)))
}

async fn prepare(
  ctx: &TaskContext,
  node: &TraversalNode,
  step: ActionType,
) -> Result<Prepared, StateError> {
  let Some(config) = ctx.connection(node).cloned() else {
    let message = format!("no connection '{}' for {}", node.node.connection_key, node.address());
    ctx
      .state
      .log(node.address(), step, ExecutionStatus::Error, Some(message.clone()))
      .await?;
    return Ok(Prepared::Done(NodeOutcome::Failed(message)));
  };
  if let Some(reason) = config.skip_reason(step) {
    info!(address = %node.address(), %step, reason = %reason, "skipped");
    ctx
      .state
      .log(node.address(), step, ExecutionStatus::Skipped, Some(reason.clone()))
      .await?;
    return Ok(Prepared::Done(NodeOutcome::Skipped(reason)));
  }
  let Some(connector) = ctx.connector(node) else {
    let message = format!("no connector registered for '{}'", config.key);
    ctx
      .state
      .log(node.address(), step, ExecutionStatus::Error, Some(message.clone()))
      .await?;
    return Ok(Prepared::Done(NodeOutcome::Failed(message)));
  };
  Ok(Prepared::Ready(config, connector))
}

/// A node whose callback is still outstanding stays paused on the same token. The connector
/// is not called again.
async fn awaiting_callback(
  ctx: &TaskContext,
  node: &TraversalNode,
  step: ActionType,
) -> Result<Option<NodeOutcome>, StateError> {
  let Some(token) = ctx.state.pending_async_token(step, node.address()).await? else {
    return Ok(None);
  };
  let message = "awaiting asynchronous callback".to_string();
  info!(address = %node.address(), %step, token = %token, "callback still outstanding");
  ctx
    .state
    .log(node.address(), step, ExecutionStatus::Paused, Some(message.clone()))
    .await?;
  Ok(Some(NodeOutcome::Paused(AwaitingInput {
    step,
    collection: node.address().clone(),
    kind: AwaitingInputKind::AsyncCallback { token },
    message,
  })))
}

async fn complete(
  ctx: &TaskContext,
  node: &TraversalNode,
  step: ActionType,
  result: CachedResult,
  message: Option<String>,
) -> Result<NodeOutcome, StateError> {
  ctx.state.cache_result(step, node.address(), &result).await?;
  ctx
    .state
    .log(node.address(), step, ExecutionStatus::Complete, message)
    .await?;
  info!(address = %node.address(), %step, "complete");
  Ok(NodeOutcome::Complete(result))
}

/// Turns a connector error that survived retries into the node's outcome. The retry wrapper
/// has already logged it.
async fn suspended_or_failed(
  ctx: &TaskContext,
  node: &TraversalNode,
  step: ActionType,
  err: ConnectorError,
) -> Result<NodeOutcome, StateError> {
  let kind = match &err {
    ConnectorError::AwaitingInput(_) => match step {
      ActionType::Access => AwaitingInputKind::ManualRows {
        fields: node
          .collection()
          .leaf_paths()
          .iter()
          .map(ToString::to_string)
          .collect(),
      },
      ActionType::Erasure => AwaitingInputKind::ManualMaskedCount,
    },
    ConnectorError::AwaitingCallback(_) => {
      let token = Uuid::new_v4().to_string();
      ctx
        .state
        .record_async_token(&token, step, node.address())
        .await?;
      AwaitingInputKind::AsyncCallback { token }
    }
    _ => return Ok(NodeOutcome::Failed(err.to_string())),
  };
  Ok(NodeOutcome::Paused(AwaitingInput {
    step,
    collection: node.address().clone(),
    kind,
    message: err.to_string(),
  }))
}
