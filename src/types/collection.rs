//! A named set of fields inside a dataset.

use std::collections::BTreeMap;

use super::{CollectionAddress, Field, FieldPath};

/// A named set of fields plus ordering hints relative to other collections.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Collection {
  pub name: String,
  pub fields: Vec<Field>,
  /// Collections that must be visited before this one (no data flows along these).
  pub after: Vec<CollectionAddress>,
}

impl Collection {
  pub fn new(name: impl Into<String>, fields: Vec<Field>) -> Self {
    Self {
      name: name.into(),
      fields,
      after: Vec::new(),
    }
  }

  pub fn with_after(mut self, after: Vec<CollectionAddress>) -> Self {
    self.after = after;
    self
  }

  /// Flattens nested object fields into dotted paths (`workplace_info.employer`).
  ///
  /// Both object fields and their leaves are present. When a top-level field name collides
  /// with a nested dotted path the first one wins here; [Collection::path_collisions] reports it.
  pub fn field_dict(&self) -> BTreeMap<FieldPath, &Field> {
    let mut out = BTreeMap::new();
    for field in &self.fields {
      collect_fields(field, FieldPath::default(), &mut out, &mut Vec::new());
    }
    out
  }

  /// Dotted paths that are reachable both as a literal top-level name and as a nested path.
  pub fn path_collisions(&self) -> Vec<FieldPath> {
    let mut seen = BTreeMap::new();
    let mut collisions = Vec::new();
    for field in &self.fields {
      collect_fields(field, FieldPath::default(), &mut seen, &mut collisions);
    }
    collisions
  }

  /// Looks a field up by dotted path, or by simple name when it is unique in the collection.
  pub fn field(&self, path: &FieldPath) -> Option<&Field> {
    let dict = self.field_dict();
    if let Some(f) = dict.get(path) {
      return Some(*f);
    }
    if path.len() != 1 {
      return None;
    }
    let name = path.leaf()?;
    let mut matches = dict.iter().filter(|(p, _)| p.leaf() == Some(name));
    match (matches.next(), matches.next()) {
      (Some((_, f)), None) => Some(*f),
      _ => None,
    }
  }

  /// Fields flagged as identity seeds, as `(path, identity name)`.
  pub fn identities(&self) -> Vec<(FieldPath, String)> {
    self
      .field_dict()
      .into_iter()
      .filter_map(|(p, f)| f.identity.clone().map(|i| (p, i)))
      .collect()
  }

  pub fn primary_keys(&self) -> Vec<FieldPath> {
    self
      .field_dict()
      .into_iter()
      .filter(|(_, f)| f.primary_key)
      .map(|(p, _)| p)
      .collect()
  }

  /// Data category -> field paths tagged with it.
  pub fn field_paths_by_category(&self) -> BTreeMap<String, Vec<FieldPath>> {
    let mut out: BTreeMap<String, Vec<FieldPath>> = BTreeMap::new();
    for (path, field) in self.field_dict() {
      for category in &field.data_categories {
        out.entry(category.clone()).or_default().push(path.clone());
      }
    }
    out
  }

  /// Paths of fields with no sub-fields.
  pub fn leaf_paths(&self) -> Vec<FieldPath> {
    self
      .field_dict()
      .into_iter()
      .filter(|(_, f)| !f.is_object())
      .map(|(p, _)| p)
      .collect()
  }
}

fn collect_fields<'a>(
  field: &'a Field,
  parent: FieldPath,
  out: &mut BTreeMap<FieldPath, &'a Field>,
  collisions: &mut Vec<FieldPath>,
) {
  let path = if field.name.contains('.') && parent.is_empty() {
    FieldPath::parse(&field.name)
  } else {
    parent.child(field.name.clone())
  };
  if out.contains_key(&path) {
    collisions.push(path.clone());
  } else {
    out.insert(path.clone(), field);
  }
  for sub in &field.fields {
    collect_fields(sub, path.clone(), out, collisions);
  }
}
