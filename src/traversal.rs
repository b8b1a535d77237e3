//! Traversal planning: decide the visit order of a [DatasetGraph] for one identity seed.
//!
//! The synthetic root node `__ROOT__:__ROOT__` carries the seed and has an identity edge to
//! every identity field whose identity is present in the seed. From there a node becomes
//! visitable once it has been reached by some edge and every directed upstream source and
//! every `after` dependency has been visited. Among visitable nodes the lexically smallest
//! address goes first, so the plan is a pure function of the graph and the seed.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info, instrument};

use crate::error::GraphError;
use crate::graph::{DatasetGraph, Edge, EdgeKind, Node};
use crate::types::{Collection, CollectionAddress, FieldPath, IdentitySeed, ROOT_COLLECTION};

/// Whether a plan covers every node, and why not if it does not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraversalDetails {
  pub is_traversable: bool,
  pub msg: Option<String>,
  pub unreachable: Vec<CollectionAddress>,
}

/// A graph node plus the edges resolved for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct TraversalNode {
  pub node: Node,
  /// Edges delivering data into this node, oriented towards it.
  pub incoming: Vec<Edge>,
  /// Edges carrying this node's data to nodes visited later.
  pub outgoing: Vec<Edge>,
  /// Ordering-only dependencies.
  pub after: Vec<CollectionAddress>,
}

impl TraversalNode {
  pub fn address(&self) -> &CollectionAddress {
    &self.node.address
  }

  pub fn collection(&self) -> &Collection {
    &self.node.collection
  }

  pub fn is_root(&self) -> bool {
    self.node.address.is_root()
  }

  /// Distinct upstream collections that feed this node (may include the root).
  pub fn parents(&self) -> Vec<CollectionAddress> {
    let set: BTreeSet<_> = self
      .incoming
      .iter()
      .map(|e| e.source.collection.clone())
      .collect();
    set.into_iter().collect()
  }

  /// Distinct downstream collections fed by this node.
  pub fn children(&self) -> Vec<CollectionAddress> {
    let set: BTreeSet<_> = self
      .outgoing
      .iter()
      .map(|e| e.destination.collection.clone())
      .collect();
    set.into_iter().collect()
  }

  /// Local field paths that receive query input.
  pub fn input_keys(&self) -> Vec<FieldPath> {
    let set: BTreeSet<_> = self
      .incoming
      .iter()
      .map(|e| e.destination.path.clone())
      .collect();
    set.into_iter().collect()
  }

  /// upstream collection -> `(upstream field, local field)` pairs.
  pub fn incoming_field_map(&self) -> BTreeMap<CollectionAddress, Vec<(FieldPath, FieldPath)>> {
    let mut out: BTreeMap<CollectionAddress, Vec<(FieldPath, FieldPath)>> = BTreeMap::new();
    for edge in &self.incoming {
      out
        .entry(edge.source.collection.clone())
        .or_default()
        .push((edge.source.path.clone(), edge.destination.path.clone()));
    }
    out
  }
}

/// Per-node field mappings used in a run: `{"from": {upstream: ["a -> b"]}, "to": {...}}`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TraversalMapEntry {
  pub from: BTreeMap<CollectionAddress, BTreeSet<String>>,
  pub to: BTreeMap<CollectionAddress, BTreeSet<String>>,
}

/// Visit plan of one graph for one identity seed. Immutable once built.
#[derive(Debug, Clone)]
pub struct Traversal {
  root: TraversalNode,
  nodes: BTreeMap<CollectionAddress, TraversalNode>,
  order: Vec<CollectionAddress>,
  details: TraversalDetails,
}

impl Traversal {
  /// Plans the traversal. Only a field that references itself is an error; every other
  /// problem is reported through [Traversal::details].
  #[instrument(level = "trace", skip(graph, seed))]
  pub fn new(graph: &DatasetGraph, seed: &IdentitySeed) -> Result<Self, GraphError> {
    let root_address = CollectionAddress::root();

    let mut edges = Vec::new();
    for (field, identity) in graph.identity_fields() {
      if seed.get(&identity).is_some_and(|v| !v.is_null()) {
        let source = root_address.field_address(FieldPath::new([identity]));
        edges.push(Edge::new(source, field, EdgeKind::Identity));
      }
    }
    for edge in graph.edges() {
      if edge.is_internal() {
        if edge.source.path == edge.destination.path {
          return Err(GraphError::SelfReferentialField(edge.source.clone()));
        }
        continue;
      }
      edges.push(edge.clone());
    }
    edges.sort();

    let mut upstream: BTreeMap<&CollectionAddress, BTreeSet<&CollectionAddress>> = BTreeMap::new();
    for edge in edges.iter().filter(|e| e.kind.is_directed()) {
      upstream
        .entry(&edge.destination.collection)
        .or_default()
        .insert(&edge.source.collection);
    }

    let mut incoming: BTreeMap<CollectionAddress, Vec<Edge>> = BTreeMap::new();
    let mut outgoing: BTreeMap<CollectionAddress, Vec<Edge>> = BTreeMap::new();
    let mut finished: BTreeSet<CollectionAddress> = BTreeSet::new();
    let mut touched: BTreeSet<CollectionAddress> = BTreeSet::new();
    let mut order = Vec::new();

    let mut visit = |address: &CollectionAddress,
                     finished: &mut BTreeSet<CollectionAddress>,
                     touched: &mut BTreeSet<CollectionAddress>| {
      finished.insert(address.clone());
      for edge in edges.iter().filter(|e| e.touches(address)) {
        let oriented = edge.oriented_from(address);
        let other = &oriented.destination.collection;
        if &oriented.source.collection != address || finished.contains(other) {
          continue;
        }
        touched.insert(other.clone());
        incoming
          .entry(other.clone())
          .or_default()
          .push(oriented.clone());
        outgoing
          .entry(address.clone())
          .or_default()
          .push(oriented);
      }
    };

    visit(&root_address, &mut finished, &mut touched);
    loop {
      let next = touched
        .iter()
        .filter(|a| !finished.contains(*a))
        .find(|a| {
          let sources_done = upstream
            .get(a)
            .is_none_or(|srcs| srcs.iter().all(|s| finished.contains(*s)));
          let after_done = graph.after(a).iter().all(|d| finished.contains(d));
          sources_done && after_done
        })
        .cloned();
      let Some(address) = next else {
        break;
      };
      debug!(address = %address, "visiting");
      visit(&address, &mut finished, &mut touched);
      order.push(address);
    }

    let unreachable: Vec<CollectionAddress> = graph
      .nodes()
      .keys()
      .filter(|a| !finished.contains(*a))
      .cloned()
      .collect();
    let dangling = graph.dangling_references();
    let mut problems: Vec<String> = dangling
      .iter()
      .map(|d| format!("Referred to object {} does not exist", d))
      .collect();
    if !unreachable.is_empty() {
      problems.push(format!(
        "Some nodes were not reachable: {}",
        unreachable
          .iter()
          .map(ToString::to_string)
          .collect::<Vec<_>>()
          .join(", ")
      ));
    }
    let msg = (!problems.is_empty()).then(|| problems.join("; "));
    let details = TraversalDetails {
      is_traversable: msg.is_none(),
      msg,
      unreachable,
    };

    let mut take = |node: Node| {
      let address = node.address.clone();
      TraversalNode {
        after: graph.after(&address),
        incoming: incoming.remove(&address).unwrap_or_default(),
        outgoing: outgoing.remove(&address).unwrap_or_default(),
        node,
      }
    };
    let root = take(Node {
      address: root_address,
      connection_key: String::new(),
      collection: Collection::new(ROOT_COLLECTION, Vec::new()),
    });
    let nodes: BTreeMap<CollectionAddress, TraversalNode> = order
      .iter()
      .filter_map(|a| graph.node(a))
      .map(|n| (n.address.clone(), take(n.clone())))
      .collect();

    info!(
      visited = order.len(),
      unreachable = details.unreachable.len(),
      traversable = details.is_traversable,
      "planned traversal"
    );
    Ok(Self {
      root,
      nodes,
      order,
      details,
    })
  }

  /// Reachability diagnostics. Never fails.
  pub fn details(&self) -> &TraversalDetails {
    &self.details
  }

  pub fn root(&self) -> &TraversalNode {
    &self.root
  }

  /// Visited (non-root) nodes in visit order.
  pub fn order(&self) -> &[CollectionAddress] {
    &self.order
  }

  pub fn node(&self, address: &CollectionAddress) -> Option<&TraversalNode> {
    self.nodes.get(address)
  }

  pub fn nodes(&self) -> impl Iterator<Item = &TraversalNode> {
    self.order.iter().filter_map(|a| self.nodes.get(a))
  }

  /// Calls `visit` once per reachable node in dependency order and returns the end nodes.
  pub fn traverse<E, F>(&self, env: &mut E, mut visit: F) -> Vec<CollectionAddress>
  where
    F: FnMut(&TraversalNode, &mut E),
  {
    for node in self.nodes() {
      visit(node, env);
    }
    self.end_nodes()
  }

  /// Visited nodes with no downstream children.
  pub fn end_nodes(&self) -> Vec<CollectionAddress> {
    self
      .nodes()
      .filter(|n| n.outgoing.is_empty())
      .map(|n| n.address().clone())
      .collect()
  }

  /// Field mappings per node, including the root.
  pub fn traversal_map(&self) -> BTreeMap<CollectionAddress, TraversalMapEntry> {
    std::iter::once(&self.root)
      .chain(self.nodes())
      .map(|n| {
        let mut entry = TraversalMapEntry::default();
        for e in &n.incoming {
          entry
            .from
            .entry(e.source.collection.clone())
            .or_default()
            .insert(format!("{} -> {}", e.source.path, e.destination.path));
        }
        for e in &n.outgoing {
          entry
            .to
            .entry(e.destination.collection.clone())
            .or_default()
            .insert(format!("{} -> {}", e.source.path, e.destination.path));
        }
        (n.address().clone(), entry)
      })
      .collect()
  }
}
