//! A typed field of a collection and its outgoing references.

use serde::{Deserialize, Serialize};

use super::{DataType, FieldAddress};

/// Declared direction of a field reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceDirection {
  /// This collection receives values from the referenced field.
  From,
  /// This collection provides values to the referenced field.
  To,
}

/// Reference from a field to a field in another (or the same) collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldReference {
  pub address: FieldAddress,
  /// `None` means the edge may be traversed either way.
  pub direction: Option<ReferenceDirection>,
}

impl FieldReference {
  pub fn new(address: FieldAddress, direction: Option<ReferenceDirection>) -> Self {
    Self { address, direction }
  }
}

/// A named, typed attribute of a collection.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Field {
  pub name: String,
  pub data_type: DataType,
  pub primary_key: bool,
  /// Identity name this field is seeded from (e.g. `email`).
  pub identity: Option<String>,
  pub references: Vec<FieldReference>,
  pub data_categories: Vec<String>,
  /// Maximum length honoured when a masked string is written back.
  pub length: Option<usize>,
  /// Sub-fields of an object-typed field.
  pub fields: Vec<Field>,
}

impl Field {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      ..Self::default()
    }
  }

  pub fn with_type(mut self, data_type: DataType) -> Self {
    self.data_type = data_type;
    self
  }

  pub fn primary_key(mut self) -> Self {
    self.primary_key = true;
    self
  }

  pub fn identity(mut self, name: impl Into<String>) -> Self {
    self.identity = Some(name.into());
    self
  }

  pub fn reference(mut self, address: FieldAddress, direction: Option<ReferenceDirection>) -> Self {
    self.references.push(FieldReference::new(address, direction));
    self
  }

  pub fn categories<I, S>(mut self, categories: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.data_categories = categories.into_iter().map(Into::into).collect();
    self
  }

  pub fn with_length(mut self, length: usize) -> Self {
    self.length = Some(length);
    self
  }

  pub fn with_fields(mut self, fields: Vec<Field>) -> Self {
    self.fields = fields;
    self
  }

  /// Current references of this field (possibly empty).
  pub fn references(&self) -> &[FieldReference] {
    &self.references
  }

  pub fn is_object(&self) -> bool {
    !self.fields.is_empty()
  }
}
