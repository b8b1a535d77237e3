//! Dataset graph: one node per collection, one directed edge per field reference.
//!
//! Edges are normalised so that data always flows `source -> destination`; bidirectional
//! references keep a canonical (sorted) orientation until the traversal decides which side
//! runs first.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use tracing::{info, instrument, warn};

use crate::error::GraphError;
use crate::types::{
  Collection, CollectionAddress, Dataset, FieldAddress, FieldPath, ReferenceDirection,
};

/// How an edge was declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EdgeKind {
  /// Destination declared `direction: from` on the source.
  From,
  /// Source declared `direction: to` on the destination.
  To,
  /// No direction; oriented by whichever side is visited first.
  Bidirectional,
  /// Root identity node to an identity-seeded field.
  Identity,
}

impl EdgeKind {
  pub fn is_directed(self) -> bool {
    !matches!(self, EdgeKind::Bidirectional)
  }
}

/// Field-level dependency between two collections.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Edge {
  pub source: FieldAddress,
  pub destination: FieldAddress,
  pub kind: EdgeKind,
}

impl Edge {
  pub fn new(source: FieldAddress, destination: FieldAddress, kind: EdgeKind) -> Self {
    Self {
      source,
      destination,
      kind,
    }
  }

  /// True when both ends sit in the same collection.
  pub fn is_internal(&self) -> bool {
    self.source.collection == self.destination.collection
  }

  /// True when `address` is one of the edge's ends.
  pub fn touches(&self, address: &CollectionAddress) -> bool {
    &self.source.collection == address || &self.destination.collection == address
  }

  /// The same edge with its ends swapped (only meaningful for bidirectional edges).
  pub fn reversed(&self) -> Self {
    Self {
      source: self.destination.clone(),
      destination: self.source.clone(),
      kind: self.kind,
    }
  }

  /// Orients a bidirectional edge so that `from` is its source. Directed edges are returned
  /// unchanged.
  pub fn oriented_from(&self, from: &CollectionAddress) -> Self {
    if self.kind == EdgeKind::Bidirectional && &self.source.collection != from {
      self.reversed()
    } else {
      self.clone()
    }
  }
}

impl fmt::Display for Edge {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let arrow = if self.kind == EdgeKind::Bidirectional {
      "<->"
    } else {
      "->"
    };
    write!(f, "{} {} {}", self.source, arrow, self.destination)
  }
}

/// One collection in the graph. Nodes compare by address only.
#[derive(Debug, Clone)]
pub struct Node {
  pub address: CollectionAddress,
  pub connection_key: String,
  pub collection: Collection,
}

impl Node {
  pub fn dataset_name(&self) -> &str {
    &self.address.dataset
  }
}

impl PartialEq for Node {
  fn eq(&self, other: &Self) -> bool {
    self.address == other.address
  }
}

impl Eq for Node {}

/// Union of all collections of a set of datasets and the references between them.
#[derive(Debug, Clone, Default)]
pub struct DatasetGraph {
  nodes: BTreeMap<CollectionAddress, Node>,
  edges: Vec<Edge>,
  after: BTreeMap<CollectionAddress, BTreeSet<CollectionAddress>>,
  dangling: BTreeSet<String>,
}

impl DatasetGraph {
  /// Builds the graph. Duplicate collections and field-path collisions are errors; references
  /// to objects that do not exist are kept as diagnostics (see [DatasetGraph::dangling_references]).
  #[instrument(level = "trace", skip(datasets), fields(datasets = datasets.len()))]
  pub fn new(datasets: &[Dataset]) -> Result<Self, GraphError> {
    let mut nodes = BTreeMap::new();
    for dataset in datasets {
      for collection in &dataset.collections {
        let address = CollectionAddress::new(&dataset.name, &collection.name);
        if address.is_reserved() {
          return Err(GraphError::ReservedAddress(address));
        }
        if let Some(path) = collection.path_collisions().into_iter().next() {
          return Err(GraphError::FieldPathCollision {
            collection: address,
            path,
          });
        }
        let node = Node {
          address: address.clone(),
          connection_key: dataset.connection_key.clone(),
          collection: collection.clone(),
        };
        if nodes.insert(address.clone(), node).is_some() {
          return Err(GraphError::DuplicateCollection(address));
        }
      }
    }

    let mut dangling = BTreeSet::new();
    let mut directed = BTreeSet::new();
    let mut bidirectional = BTreeSet::new();
    for node in nodes.values() {
      for (path, field) in node.collection.field_dict() {
        let here = node.address.field_address(path);
        for reference in field.references() {
          let Some(target) = resolve_field(&nodes, &reference.address) else {
            dangling.insert(reference.address.to_string());
            continue;
          };
          match reference.direction {
            Some(ReferenceDirection::From) => {
              directed.insert(Edge::new(target, here.clone(), EdgeKind::From));
            }
            Some(ReferenceDirection::To) => {
              directed.insert(Edge::new(here.clone(), target, EdgeKind::To));
            }
            None => {
              let (a, b) = if here <= target {
                (here.clone(), target)
              } else {
                (target, here.clone())
              };
              bidirectional.insert((a, b));
            }
          }
        }
      }
    }

    // A reference declared on both sides collapses to one edge; a directed declaration wins
    // over an undirected one for the same pair.
    let mut seen_pairs = BTreeSet::new();
    let mut edges = Vec::new();
    for edge in directed {
      let pair = (edge.source.clone(), edge.destination.clone());
      if seen_pairs.insert(pair) {
        edges.push(edge);
      }
    }
    for (a, b) in bidirectional {
      let forward = (a.clone(), b.clone());
      let backward = (b.clone(), a.clone());
      if !seen_pairs.contains(&forward) && !seen_pairs.contains(&backward) {
        edges.push(Edge::new(a, b, EdgeKind::Bidirectional));
      }
    }
    edges.sort();

    let mut after: BTreeMap<CollectionAddress, BTreeSet<CollectionAddress>> = BTreeMap::new();
    for node in nodes.values() {
      for dep in &node.collection.after {
        if nodes.contains_key(dep) {
          after
            .entry(node.address.clone())
            .or_default()
            .insert(dep.clone());
        } else {
          dangling.insert(dep.to_string());
        }
      }
    }

    if !dangling.is_empty() {
      warn!(dangling = ?dangling, "dataset graph has dangling references");
    }
    info!(nodes = nodes.len(), edges = edges.len(), "built dataset graph");
    Ok(Self {
      nodes,
      edges,
      after,
      dangling,
    })
  }

  pub fn nodes(&self) -> &BTreeMap<CollectionAddress, Node> {
    &self.nodes
  }

  pub fn node(&self, address: &CollectionAddress) -> Option<&Node> {
    self.nodes.get(address)
  }

  /// All field edges, sorted.
  pub fn edges(&self) -> &[Edge] {
    &self.edges
  }

  /// Ordering-only dependencies of `address` (its `after` hints that exist in the graph).
  pub fn after(&self, address: &CollectionAddress) -> Vec<CollectionAddress> {
    self
      .after
      .get(address)
      .map(|s| s.iter().cloned().collect())
      .unwrap_or_default()
  }

  /// Addresses of referenced objects that are not in the graph.
  pub fn dangling_references(&self) -> Vec<String> {
    self.dangling.iter().cloned().collect()
  }

  /// Every identity-seeded field with the identity name it is seeded from.
  pub fn identity_fields(&self) -> Vec<(FieldAddress, String)> {
    self
      .nodes
      .values()
      .flat_map(|n| {
        n.collection
          .identities()
          .into_iter()
          .map(|(path, identity)| (n.address.field_address(path), identity))
      })
      .collect()
  }

  /// address -> data category -> field paths tagged with it.
  pub fn data_category_field_mapping(
    &self,
  ) -> BTreeMap<CollectionAddress, BTreeMap<String, Vec<FieldPath>>> {
    self
      .nodes
      .iter()
      .map(|(addr, node)| (addr.clone(), node.collection.field_paths_by_category()))
      .collect()
  }
}

/// Resolves a referenced field to its full dotted path (references may use a unique simple
/// name for a nested field).
fn resolve_field(
  nodes: &BTreeMap<CollectionAddress, Node>,
  address: &FieldAddress,
) -> Option<FieldAddress> {
  let node = nodes.get(&address.collection)?;
  let dict = node.collection.field_dict();
  if dict.contains_key(&address.path) {
    return Some(address.clone());
  }
  if address.path.len() != 1 {
    return None;
  }
  let leaf = address.path.leaf()?;
  let mut matches = dict.keys().filter(|p| p.leaf() == Some(leaf));
  match (matches.next(), matches.next()) {
    (Some(path), None) => Some(node.address.field_address(path.clone())),
    _ => None,
  }
}
