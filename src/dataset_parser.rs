//! Parse and validate dataset definitions into the reference model.
//!
//! Definitions are JSON documents keyed by `fides_key`, with per-field `fidesops_meta`
//! (references, identity, primary key, data type, length) and per-collection
//! `fidesops_meta.after`. Validation does not stop at the first problem: every error is
//! collected with the location it was found at.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use tracing::instrument;

use crate::error::{DatasetValidationErrors, ValidationError};
use crate::types::{
  Collection, CollectionAddress, DataType, Dataset, Field, FieldAddress, FieldPath,
  FieldReference, RESERVED_PREFIX, ReferenceDirection, ScalarType,
};

/// Lowercase dot-separated identifiers: `user.contact.email`.
const DATA_CATEGORY_PATTERN: &str = r"^[a-z_][a-z0-9_]*(\.[a-z_][a-z0-9_]*)*$";

/// Compiled once per process.
pub(crate) fn data_category_re() -> Result<&'static Regex, &'static regex::Error> {
  static RE: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();
  RE.get_or_init(|| Regex::new(DATA_CATEGORY_PATTERN)).as_ref()
}

#[derive(Debug, Deserialize)]
struct DatasetDef {
  fides_key: String,
  #[serde(default)]
  collections: Vec<CollectionDef>,
}

#[derive(Debug, Deserialize)]
struct CollectionDef {
  name: String,
  #[serde(default)]
  fidesops_meta: Option<CollectionMetaDef>,
  #[serde(default)]
  fields: Vec<FieldDef>,
}

#[derive(Debug, Default, Deserialize)]
struct CollectionMetaDef {
  #[serde(default)]
  after: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct FieldDef {
  name: String,
  #[serde(default)]
  data_categories: Vec<String>,
  #[serde(default)]
  fidesops_meta: Option<FieldMetaDef>,
  #[serde(default)]
  fields: Vec<FieldDef>,
}

#[derive(Debug, Default, Deserialize)]
struct FieldMetaDef {
  #[serde(default)]
  references: Vec<ReferenceDef>,
  #[serde(default)]
  identity: Option<String>,
  #[serde(default)]
  primary_key: bool,
  #[serde(default)]
  data_type: Option<String>,
  #[serde(default)]
  length: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct ReferenceDef {
  dataset: String,
  /// `collection.field` or `collection.object.leaf`.
  field: String,
  #[serde(default)]
  direction: Option<String>,
}

/// Parses one dataset definition from JSON text and binds it to `connection_key`.
pub fn parse_dataset(
  json: &str,
  connection_key: &str,
) -> Result<Dataset, DatasetValidationErrors> {
  let value: Value = serde_json::from_str(json).map_err(|e| DatasetValidationErrors {
    dataset: String::new(),
    errors: vec![ValidationError::new("$", e.to_string())],
  })?;
  dataset_from_value(value, connection_key)
}

/// Same as [parse_dataset] for an already-decoded JSON value.
#[instrument(level = "trace", skip(value))]
pub fn dataset_from_value(
  value: Value,
  connection_key: &str,
) -> Result<Dataset, DatasetValidationErrors> {
  let name_hint = value
    .get("fides_key")
    .and_then(Value::as_str)
    .unwrap_or_default()
    .to_string();
  let def: DatasetDef = serde_json::from_value(value).map_err(|e| DatasetValidationErrors {
    dataset: name_hint,
    errors: vec![ValidationError::new("$", e.to_string())],
  })?;
  let category_re = data_category_re().map_err(|e| DatasetValidationErrors {
    dataset: def.fides_key.clone(),
    errors: vec![ValidationError::new("$", e.to_string())],
  })?;
  let mut v = Validator {
    category_re,
    errors: Vec::new(),
  };
  let dataset = v.dataset(def, connection_key);
  if v.errors.is_empty() {
    Ok(dataset)
  } else {
    Err(DatasetValidationErrors {
      dataset: dataset.name,
      errors: v.errors,
    })
  }
}

struct Validator {
  category_re: &'static Regex,
  errors: Vec<ValidationError>,
}

impl Validator {
  fn error(&mut self, path: impl Into<String>, message: impl Into<String>) {
    self.errors.push(ValidationError::new(path, message));
  }

  fn name(&mut self, path: &str, name: &str) {
    if name.trim().is_empty() {
      self.error(path, "name must not be empty");
    } else if name.contains(':') {
      self.error(path, format!("name '{}' must not contain ':'", name));
    }
  }

  fn dataset(&mut self, def: DatasetDef, connection_key: &str) -> Dataset {
    self.name("fides_key", &def.fides_key);
    if def.fides_key.starts_with(RESERVED_PREFIX) {
      self.error(
        "fides_key",
        format!(
          "dataset name '{}' uses the reserved prefix '{}'",
          def.fides_key, RESERVED_PREFIX
        ),
      );
    }
    let mut seen = BTreeSet::new();
    let mut collections = Vec::with_capacity(def.collections.len());
    for (i, c) in def.collections.into_iter().enumerate() {
      let path = format!("collections[{}]", i);
      if !seen.insert(c.name.clone()) {
        self.error(
          format!("{}.name", path),
          format!("duplicate collection name '{}'", c.name),
        );
      }
      collections.push(self.collection(&path, &def.fides_key, c));
    }
    Dataset::new(def.fides_key, connection_key, collections)
  }

  fn collection(&mut self, path: &str, dataset: &str, def: CollectionDef) -> Collection {
    self.name(&format!("{}.name", path), &def.name);
    let meta = def.fidesops_meta.unwrap_or_default();
    let mut after = Vec::new();
    for (i, raw) in meta.after.iter().enumerate() {
      match parse_dotted_collection(raw) {
        Some(addr) => after.push(addr),
        None => self.error(
          format!("{}.fidesops_meta.after[{}]", path, i),
          format!("'{}' is not a 'dataset.collection' address", raw),
        ),
      }
    }
    let fields = self.fields(&format!("{}.fields", path), dataset, def.fields);
    Collection::new(def.name, fields).with_after(after)
  }

  fn fields(&mut self, path: &str, dataset: &str, defs: Vec<FieldDef>) -> Vec<Field> {
    let mut seen = BTreeSet::new();
    let mut out = Vec::with_capacity(defs.len());
    for (i, f) in defs.into_iter().enumerate() {
      let field_path = format!("{}[{}]", path, i);
      if !seen.insert(f.name.clone()) {
        self.error(
          format!("{}.name", field_path),
          format!("duplicate field name '{}'", f.name),
        );
      }
      out.push(self.field(&field_path, dataset, f));
    }
    out
  }

  fn field(&mut self, path: &str, dataset: &str, def: FieldDef) -> Field {
    if def.name.trim().is_empty() {
      self.error(format!("{}.name", path), "name must not be empty");
    }
    for (i, category) in def.data_categories.iter().enumerate() {
      if !self.category_re.is_match(category) {
        self.error(
          format!("{}.data_categories[{}]", path, i),
          format!("'{}' is not a valid data category", category),
        );
      }
    }
    let meta = def.fidesops_meta.unwrap_or_default();
    let meta_path = format!("{}.fidesops_meta", path);
    let sub_fields = self.fields(&format!("{}.fields", path), dataset, def.fields);

    let data_type = match meta.data_type.as_deref() {
      Some(raw) => match raw.parse::<DataType>() {
        Ok(t) => t,
        Err(e) => {
          self.error(format!("{}.data_type", meta_path), e);
          DataType::default()
        }
      },
      None if !sub_fields.is_empty() => DataType::scalar(ScalarType::Object),
      None => DataType::default(),
    };
    if !sub_fields.is_empty() && data_type.scalar != ScalarType::Object {
      self.error(
        format!("{}.data_type", meta_path),
        format!("field with sub-fields must be an object, not '{}'", data_type),
      );
    }

    let length = match meta.length {
      Some(n) if n < 0 => {
        self.error(
          format!("{}.length", meta_path),
          format!("length must be non-negative, got {}", n),
        );
        None
      }
      Some(n) => usize::try_from(n).ok(),
      None => None,
    };

    let mut field = Field::new(def.name)
      .with_type(data_type)
      .categories(def.data_categories)
      .with_fields(sub_fields);
    field.length = length;
    field.primary_key = meta.primary_key;
    field.identity = meta.identity;

    for (i, r) in meta.references.iter().enumerate() {
      let ref_path = format!("{}.references[{}]", meta_path, i);
      let direction = match r.direction.as_deref() {
        None => None,
        Some("from") => Some(ReferenceDirection::From),
        Some("to") => Some(ReferenceDirection::To),
        Some(other) => {
          self.error(
            format!("{}.direction", ref_path),
            format!("direction must be 'from' or 'to', got '{}'", other),
          );
          None
        }
      };
      let target = if r.dataset.is_empty() { dataset } else { &r.dataset };
      match parse_reference_field(target, &r.field) {
        Some(address) => field.references.push(FieldReference::new(address, direction)),
        None => self.error(
          format!("{}.field", ref_path),
          format!("'{}' is not a 'collection.field' reference", r.field),
        ),
      }
    }
    field
  }
}

/// `ds.coll` -> `ds:coll`.
fn parse_dotted_collection(raw: &str) -> Option<CollectionAddress> {
  let (dataset, collection) = raw.split_once('.')?;
  if dataset.is_empty() || collection.is_empty() || collection.contains('.') {
    return None;
  }
  Some(CollectionAddress::new(dataset, collection))
}

/// `coll.a.b` in `dataset` -> `dataset:coll:a.b`.
fn parse_reference_field(dataset: &str, raw: &str) -> Option<FieldAddress> {
  let (collection, field) = raw.split_once('.')?;
  if collection.is_empty() || field.is_empty() || field.split('.').any(str::is_empty) {
    return None;
  }
  Some(FieldAddress::new(dataset, collection, FieldPath::parse(field)))
}
