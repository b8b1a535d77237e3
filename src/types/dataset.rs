//! A named group of collections bound to one connection.

use super::{Collection, CollectionAddress};

/// A named group of collections bound to one connection key.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Dataset {
  pub name: String,
  pub connection_key: String,
  pub collections: Vec<Collection>,
}

impl Dataset {
  pub fn new(
    name: impl Into<String>,
    connection_key: impl Into<String>,
    collections: Vec<Collection>,
  ) -> Self {
    Self {
      name: name.into(),
      connection_key: connection_key.into(),
      collections,
    }
  }

  pub fn collection(&self, name: &str) -> Option<&Collection> {
    self.collections.iter().find(|c| c.name == name)
  }

  pub fn addresses(&self) -> Vec<CollectionAddress> {
    self
      .collections
      .iter()
      .map(|c| CollectionAddress::new(&self.name, &c.name))
      .collect()
  }
}
