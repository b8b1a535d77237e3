//! Runs one step (access or erasure) over a traversal: every node once, dependencies first,
//! independent nodes concurrently.

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::StreamExt;
use futures::stream::FuturesUnordered;
use tracing::{info, instrument, warn};

use super::input_data::UpstreamRows;
use crate::error::StateError;
use crate::run_state::RunState;
use crate::traversal::{Traversal, TraversalNode};
use crate::types::{ActionType, AwaitingInput, CollectionAddress, ExecutionStatus, NodeOutcome, Row};

/// Cooperative cancellation shared between a caller and a running request.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn cancel(&self) {
    self.0.store(true, Ordering::SeqCst);
  }

  pub fn is_canceled(&self) -> bool {
    self.0.load(Ordering::SeqCst)
  }
}

/// Why a step ended before every node ran.
#[derive(Debug, Clone, PartialEq)]
pub enum StepStop {
  Paused(AwaitingInput),
  Failed {
    address: CollectionAddress,
    message: String,
  },
  Canceled,
}

/// Outcomes of the nodes that ran, plus the reason the step stopped early, if it did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepReport {
  pub outcomes: BTreeMap<CollectionAddress, NodeOutcome>,
  pub stop: Option<StepStop>,
}

impl StepReport {
  pub fn is_finished(&self) -> bool {
    self.stop.is_none()
  }
}

/// Upstream nodes that must release before `node` may start: its non-root data sources plus
/// its `after` dependencies that are part of the plan.
fn dependencies(traversal: &Traversal, node: &TraversalNode) -> Vec<CollectionAddress> {
  let mut deps: BTreeSet<CollectionAddress> = node
    .parents()
    .into_iter()
    .filter(|p| !p.is_root())
    .collect();
  deps.extend(
    node
      .after
      .iter()
      .filter(|a| traversal.node(a).is_some())
      .cloned(),
  );
  deps.into_iter().collect()
}

/// Executes `run_node` for every node of `traversal`.
///
/// A node starts once every dependency completed or was skipped, with at most
/// `max_concurrency` nodes in flight. Cancellation is checked before each start. After a
/// failure or a pause no further node starts, in-flight nodes run to the end, and on
/// failure every pending node downstream of the failed one is logged `error`. A failure
/// outranks a pause; among pauses the node earliest in the plan is reported.
#[instrument(level = "trace", skip_all, fields(request_id = %state.request_id(), %action))]
pub async fn run_step<'t, F, Fut>(
  traversal: &'t Traversal,
  action: ActionType,
  state: &RunState,
  max_concurrency: usize,
  cancel: &CancelFlag,
  seed_row: Row,
  run_node: F,
) -> Result<StepReport, StateError>
where
  F: Fn(&'t TraversalNode, UpstreamRows) -> Fut,
  Fut: Future<Output = Result<NodeOutcome, StateError>>,
{
  let order = traversal.order();
  let position: BTreeMap<&CollectionAddress, usize> =
    order.iter().enumerate().map(|(i, a)| (a, i)).collect();
  let deps: BTreeMap<CollectionAddress, Vec<CollectionAddress>> = traversal
    .nodes()
    .map(|n| (n.address().clone(), dependencies(traversal, n)))
    .collect();

  let mut outputs = UpstreamRows::from([(CollectionAddress::root(), vec![seed_row])]);
  let mut released: BTreeSet<CollectionAddress> = BTreeSet::new();
  let mut pending: Vec<&'t TraversalNode> = traversal.nodes().collect();
  let mut running = FuturesUnordered::new();
  let mut report = StepReport::default();
  let mut failure: Option<(CollectionAddress, String)> = None;
  let mut pauses: Vec<AwaitingInput> = Vec::new();
  let mut canceled = false;
  let limit = max_concurrency.max(1);

  loop {
    let halted = failure.is_some() || !pauses.is_empty() || canceled;
    let mut i = 0;
    while !halted && i < pending.len() && running.len() < limit {
      let node = pending[i];
      let ready = deps
        .get(node.address())
        .is_none_or(|d| d.iter().all(|a| released.contains(a)));
      if !ready {
        i += 1;
        continue;
      }
      if cancel.is_canceled() {
        info!(address = %node.address(), "canceled before start");
        canceled = true;
        break;
      }
      pending.remove(i);
      let upstream: UpstreamRows = node
        .parents()
        .into_iter()
        .filter_map(|p| outputs.get(&p).map(|rows| (p, rows.clone())))
        .collect();
      let fut = run_node(node, upstream);
      running.push(async move { (node, fut.await) });
    }

    let Some((node, result)) = running.next().await else {
      break;
    };
    let outcome = result?;
    let address = node.address().clone();
    match &outcome {
      NodeOutcome::Complete(_) | NodeOutcome::Skipped(_) => {
        outputs.insert(address.clone(), outcome.output_rows());
        released.insert(address.clone());
      }
      NodeOutcome::Paused(awaiting) => pauses.push(awaiting.clone()),
      NodeOutcome::Failed(message) => {
        warn!(address = %address, "node failed: {}", message);
        if failure.is_none() {
          failure = Some((address.clone(), message.clone()));
        }
      }
    }
    report.outcomes.insert(address, outcome);
  }

  report.stop = if let Some((address, message)) = failure {
    log_failed_dependents(state, action, &address, &pending, &deps).await?;
    Some(StepStop::Failed { address, message })
  } else if !pauses.is_empty() {
    pauses.sort_by_key(|p| position.get(&p.collection).copied().unwrap_or(usize::MAX));
    pauses.into_iter().next().map(StepStop::Paused)
  } else if canceled {
    Some(StepStop::Canceled)
  } else {
    None
  };
  info!(ran = report.outcomes.len(), stopped = report.stop.is_some(), "step finished");
  Ok(report)
}

/// Logs `error` for every node in `pending` that depends, directly or transitively, on
/// `failed`. `pending` is in plan order, so one pass reaches every dependent.
async fn log_failed_dependents(
  state: &RunState,
  action: ActionType,
  failed: &CollectionAddress,
  pending: &[&TraversalNode],
  deps: &BTreeMap<CollectionAddress, Vec<CollectionAddress>>,
) -> Result<(), StateError> {
  let mut tainted = BTreeSet::from([failed.clone()]);
  for node in pending {
    let depends = deps
      .get(node.address())
      .is_some_and(|d| d.iter().any(|a| tainted.contains(a)));
    if depends {
      tainted.insert(node.address().clone());
      state
        .log(
          node.address(),
          action,
          ExecutionStatus::Error,
          Some(format!("upstream collection {} failed", failed)),
        )
        .await?;
    }
  }
  Ok(())
}
