//! Request runner: plan a privacy request over the configured datasets and execute it.
//!
//! - [RequestRunner::run]: access step, then erasure when the policy has erasure rules.
//! - [RunOutcome]: how a run ended; partial results are rebuilt from the result cache.
//!
//! A run may be repeated for the same request at any time. Completed nodes are served from
//! the cache, so a paused request picks up exactly where it stopped once its input arrives.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::config::ExecutionConfig;
use crate::connector::ConnectorRegistry;
use crate::error::{RunError, StateError};
use crate::filter::{AccessResults, filter_data_categories};
use crate::graph::DatasetGraph;
use crate::query_config::{MaskingPlan, update_value_map};
use crate::run_state::{RunState, RunStateStore};
use crate::task::{
  CancelFlag, RetryPolicy, StepStop, TaskContext, run_access_node, run_erasure_node, run_step,
};
use crate::traversal::Traversal;
use crate::types::{
  ActionType, AwaitingInput, CollectionAddress, Dataset, PrivacyRequest, Row,
};

/// Results of a request, as far as it got.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunResults {
  /// Raw rows retrieved per collection.
  pub access: AccessResults,
  /// Rows reduced to each access rule's target categories, keyed by rule key.
  pub filtered: BTreeMap<String, AccessResults>,
  /// Rows masked per collection.
  pub erasure: BTreeMap<CollectionAddress, u64>,
}

/// The node a run failed at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeFailure {
  pub step: ActionType,
  pub collection: CollectionAddress,
  pub message: String,
}

/// How one run of a request ended.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
  Complete(RunResults),
  /// Paused; supply the awaited input through [RunState] and run again.
  RequiresInput {
    awaiting: AwaitingInput,
    partial: RunResults,
  },
  /// A node failed. Nodes that paused in the same step keep their `paused` log entry and
  /// still accept input through [RunState].
  Error {
    failure: NodeFailure,
    partial: RunResults,
  },
  Canceled {
    partial: RunResults,
  },
  TimedOut {
    partial: RunResults,
  },
}

impl RunOutcome {
  pub fn is_complete(&self) -> bool {
    matches!(self, RunOutcome::Complete(_))
  }

  pub fn results(&self) -> &RunResults {
    match self {
      RunOutcome::Complete(results) => results,
      RunOutcome::RequiresInput { partial, .. }
      | RunOutcome::Error { partial, .. }
      | RunOutcome::Canceled { partial }
      | RunOutcome::TimedOut { partial } => partial,
    }
  }
}

enum Progress {
  Finished,
  Stopped(ActionType, StepStop),
}

/// Executes privacy requests against a set of connections.
#[derive(Clone)]
pub struct RequestRunner {
  connectors: ConnectorRegistry,
  store: Arc<dyn RunStateStore>,
  config: ExecutionConfig,
}

impl RequestRunner {
  pub fn new(
    connectors: ConnectorRegistry,
    store: Arc<dyn RunStateStore>,
    config: ExecutionConfig,
  ) -> Self {
    Self {
      connectors,
      store,
      config,
    }
  }

  pub fn config(&self) -> &ExecutionConfig {
    &self.config
  }

  pub fn connectors(&self) -> &ConnectorRegistry {
    &self.connectors
  }

  /// Connection changes made here are seen by the next run, never by one in progress.
  pub fn connectors_mut(&mut self) -> &mut ConnectorRegistry {
    &mut self.connectors
  }

  /// Run state handle of one request, used to supply manual input and callbacks.
  pub fn run_state(&self, request_id: &str) -> RunState {
    RunState::new(Arc::clone(&self.store), request_id)
  }

  /// Runs (or resumes) `request` over `datasets`.
  ///
  /// Datasets whose connection is no longer configured are left out. Configuration problems
  /// and untraversable plans are returned as errors before any node runs.
  #[instrument(level = "trace", skip_all, fields(request_id = %request.id))]
  pub async fn run(
    &self,
    request: &PrivacyRequest,
    datasets: &[Dataset],
    cancel: &CancelFlag,
  ) -> Result<RunOutcome, RunError> {
    let connections = self.connectors.snapshot();
    let active: Vec<Dataset> = datasets
      .iter()
      .filter(|d| {
        let known = connections.contains_key(&d.connection_key);
        if !known {
          info!(dataset = %d.name, connection = %d.connection_key, "connection removed; dataset omitted");
        }
        known
      })
      .cloned()
      .collect();

    let graph = DatasetGraph::new(&active)?;
    let traversal = Traversal::new(&graph, &request.identity)?;
    if !traversal.details().is_traversable {
      warn!(msg = ?traversal.details().msg, "plan is not traversable");
      return Err(RunError::NotTraversable(traversal.details().clone()));
    }

    let mut plans: BTreeMap<CollectionAddress, MaskingPlan> = BTreeMap::new();
    if request.policy.has_rules_for(ActionType::Erasure) {
      for node in traversal.nodes() {
        let plan = update_value_map(node.address(), node.collection(), &request.policy)?;
        plans.insert(node.address().clone(), plan);
      }
    }

    let ctx = TaskContext {
      request: request.clone(),
      state: self.run_state(&request.id),
      connections,
      connectors: self.connectors.clone(),
      retry: RetryPolicy::from_config(&self.config),
    };
    info!(nodes = traversal.order().len(), "run started");

    let execution = self.execute(&ctx, &traversal, &plans, cancel);
    let progress = match self.config.run_timeout() {
      Some(limit) => match tokio::time::timeout(limit, execution).await {
        Ok(progress) => Some(progress?),
        Err(_) => None,
      },
      None => Some(execution.await?),
    };

    let state = &ctx.state;
    let partial = collect_results(state, &graph, &traversal, request).await?;
    let outcome = match progress {
      None => {
        warn!(collections = partial.access.len(), "run timed out");
        RunOutcome::TimedOut { partial }
      }
      Some(Progress::Finished) => {
        state.clear_checkpoint().await?;
        info!("run complete");
        RunOutcome::Complete(partial)
      }
      Some(Progress::Stopped(_, StepStop::Paused(awaiting))) => {
        state
          .record_checkpoint(awaiting.step, &awaiting.collection)
          .await?;
        info!(address = %awaiting.collection, step = %awaiting.step, "run paused");
        RunOutcome::RequiresInput { awaiting, partial }
      }
      Some(Progress::Stopped(step, StepStop::Failed { address, message })) => {
        state.record_checkpoint(step, &address).await?;
        warn!(address = %address, %step, "run failed: {}", message);
        RunOutcome::Error {
          failure: NodeFailure {
            step,
            collection: address,
            message,
          },
          partial,
        }
      }
      Some(Progress::Stopped(_, StepStop::Canceled)) => {
        info!("run canceled");
        RunOutcome::Canceled { partial }
      }
    };
    Ok(outcome)
  }

  async fn execute(
    &self,
    ctx: &TaskContext,
    traversal: &Traversal,
    plans: &BTreeMap<CollectionAddress, MaskingPlan>,
    cancel: &CancelFlag,
  ) -> Result<Progress, StateError> {
    let seed: Row = ctx
      .request
      .identity
      .iter()
      .map(|(k, v)| (k.clone(), v.clone()))
      .collect();
    let limit = self.config.max_concurrency;

    let access = run_step(
      traversal,
      ActionType::Access,
      &ctx.state,
      limit,
      cancel,
      seed.clone(),
      |node, upstream| async move { run_access_node(ctx, node, &upstream).await },
    )
    .await?;
    if let Some(stop) = access.stop {
      return Ok(Progress::Stopped(ActionType::Access, stop));
    }
    if !ctx.request.policy.has_rules_for(ActionType::Erasure) {
      return Ok(Progress::Finished);
    }

    let erasure = run_step(
      traversal,
      ActionType::Erasure,
      &ctx.state,
      limit,
      cancel,
      seed,
      |node, _| async move {
        let rows = ctx
          .state
          .get_cached_result(ActionType::Access, node.address())
          .await?
          .and_then(|cached| cached.rows().map(<[Row]>::to_vec))
          .unwrap_or_default();
        let plan = plans.get(node.address()).cloned().unwrap_or_default();
        run_erasure_node(ctx, node, &rows, &plan).await
      },
    )
    .await?;
    Ok(match erasure.stop {
      Some(stop) => Progress::Stopped(ActionType::Erasure, stop),
      None => Progress::Finished,
    })
  }
}

impl std::fmt::Debug for RequestRunner {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("RequestRunner")
      .field("connectors", &self.connectors)
      .field("config", &self.config)
      .finish()
  }
}

/// Rebuilds results from the cache: raw rows, rows filtered per access rule and erasure
/// counts, for every node that has a cached result.
async fn collect_results(
  state: &RunState,
  graph: &DatasetGraph,
  traversal: &Traversal,
  request: &PrivacyRequest,
) -> Result<RunResults, StateError> {
  let mut results = RunResults::default();
  for node in traversal.nodes() {
    let address = node.address();
    if let Some(cached) = state.get_cached_result(ActionType::Access, address).await? {
      if let Some(rows) = cached.rows() {
        results.access.insert(address.clone(), rows.to_vec());
      }
    }
    if let Some(cached) = state.get_cached_result(ActionType::Erasure, address).await? {
      if let Some(count) = cached.masked_count() {
        results.erasure.insert(address.clone(), count);
      }
    }
  }
  let mapping = graph.data_category_field_mapping();
  for rule in request.policy.rules_for(ActionType::Access) {
    results.filtered.insert(
      rule.key.clone(),
      filter_data_categories(&results.access, &rule.targets, &mapping),
    );
  }
  Ok(results)
}
