//! Stable keys for collections and fields: `dataset:collection` and `dataset:collection:a.b`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Dataset name of the synthetic root node that carries the identity seed.
pub const ROOT_DATASET: &str = "__ROOT__";
/// Collection name of the synthetic root node.
pub const ROOT_COLLECTION: &str = "__ROOT__";
/// Dataset names starting with this prefix are reserved for synthetic nodes.
pub const RESERVED_PREFIX: &str = "__";

/// Address could not be parsed from its string form.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid address '{input}': {reason}")]
pub struct AddressParseError {
  pub input: String,
  pub reason: &'static str,
}

/// Dotted path to a (possibly nested) field inside a collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct FieldPath(Vec<String>);

impl FieldPath {
  pub fn new<I, S>(segments: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    Self(segments.into_iter().map(Into::into).collect())
  }

  /// Splits a dotted string (`workplace_info.employer`) into a path.
  pub fn parse(dotted: &str) -> Self {
    Self(dotted.split('.').map(str::to_string).collect())
  }

  pub fn segments(&self) -> &[String] {
    &self.0
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  /// Last segment: the simple name of the addressed field.
  pub fn leaf(&self) -> Option<&str> {
    self.0.last().map(String::as_str)
  }

  /// Returns a new path with `segment` appended.
  pub fn child(&self, segment: impl Into<String>) -> Self {
    let mut segments = self.0.clone();
    segments.push(segment.into());
    Self(segments)
  }

  pub fn string_path(&self) -> String {
    self.0.join(".")
  }
}

impl fmt::Display for FieldPath {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.string_path())
  }
}

impl Serialize for FieldPath {
  fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&self.string_path())
  }
}

impl<'de> Deserialize<'de> for FieldPath {
  fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    let s = String::deserialize(deserializer)?;
    Ok(FieldPath::parse(&s))
  }
}

/// `dataset:collection` identifier used as the key for nodes, logs, caches and checkpoints.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CollectionAddress {
  pub dataset: String,
  pub collection: String,
}

impl CollectionAddress {
  pub fn new(dataset: impl Into<String>, collection: impl Into<String>) -> Self {
    Self {
      dataset: dataset.into(),
      collection: collection.into(),
    }
  }

  /// Address of the synthetic identity root node.
  pub fn root() -> Self {
    Self::new(ROOT_DATASET, ROOT_COLLECTION)
  }

  pub fn is_root(&self) -> bool {
    self.dataset == ROOT_DATASET && self.collection == ROOT_COLLECTION
  }

  /// True for addresses in the synthetic namespace.
  pub fn is_reserved(&self) -> bool {
    self.dataset.starts_with(RESERVED_PREFIX)
  }

  pub fn field_address(&self, path: FieldPath) -> FieldAddress {
    FieldAddress {
      collection: self.clone(),
      path,
    }
  }
}

impl fmt::Display for CollectionAddress {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}", self.dataset, self.collection)
  }
}

impl FromStr for CollectionAddress {
  type Err = AddressParseError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let mut parts = s.split(':');
    match (parts.next(), parts.next(), parts.next()) {
      (Some(d), Some(c), None) if !d.is_empty() && !c.is_empty() => Ok(Self::new(d, c)),
      _ => Err(AddressParseError {
        input: s.to_string(),
        reason: "expected 'dataset:collection'",
      }),
    }
  }
}

impl TryFrom<String> for CollectionAddress {
  type Error = AddressParseError;

  fn try_from(value: String) -> Result<Self, Self::Error> {
    value.parse()
  }
}

impl From<CollectionAddress> for String {
  fn from(value: CollectionAddress) -> Self {
    value.to_string()
  }
}

/// `dataset:collection:field.path` identifier of one field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FieldAddress {
  pub collection: CollectionAddress,
  pub path: FieldPath,
}

impl FieldAddress {
  pub fn new(dataset: impl Into<String>, collection: impl Into<String>, path: FieldPath) -> Self {
    Self {
      collection: CollectionAddress::new(dataset, collection),
      path,
    }
  }
}

impl fmt::Display for FieldAddress {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}", self.collection, self.path)
  }
}

impl FromStr for FieldAddress {
  type Err = AddressParseError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let mut parts = s.splitn(3, ':');
    match (parts.next(), parts.next(), parts.next()) {
      (Some(d), Some(c), Some(f)) if !d.is_empty() && !c.is_empty() && !f.is_empty() => {
        Ok(Self::new(d, c, FieldPath::parse(f)))
      }
      _ => Err(AddressParseError {
        input: s.to_string(),
        reason: "expected 'dataset:collection:field'",
      }),
    }
  }
}

impl TryFrom<String> for FieldAddress {
  type Error = AddressParseError;

  fn try_from(value: String) -> Result<Self, Self::Error> {
    value.parse()
  }
}

impl From<FieldAddress> for String {
  fn from(value: FieldAddress) -> Self {
    value.to_string()
  }
}
