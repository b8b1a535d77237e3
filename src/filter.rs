//! Reduce raw access results to the fields whose data categories a policy targets.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::instrument;

use crate::types::{CollectionAddress, FieldPath, Row, category_matches};

/// Rows per collection, as returned by the access step.
pub type AccessResults = BTreeMap<CollectionAddress, Vec<Row>>;

/// Keeps, per collection, only the fields tagged with a category equal to or below one of
/// `targets`. Rows left with no fields are dropped, and so are collections left with no rows.
/// Nested selections keep their shape through objects and arrays of objects.
#[instrument(level = "trace", skip(raw, mapping))]
pub fn filter_data_categories(
  raw: &AccessResults,
  targets: &[String],
  mapping: &BTreeMap<CollectionAddress, BTreeMap<String, Vec<FieldPath>>>,
) -> AccessResults {
  let mut out = AccessResults::new();
  for (address, rows) in raw {
    let Some(categories) = mapping.get(address) else {
      continue;
    };
    let mut paths: Vec<&FieldPath> = categories
      .iter()
      .filter(|(category, _)| targets.iter().any(|t| category_matches(t, category)))
      .flat_map(|(_, paths)| paths.iter())
      .collect();
    paths.sort();
    paths.dedup();
    if paths.is_empty() {
      continue;
    }
    let filtered: Vec<Row> = rows
      .iter()
      .filter_map(|row| select_row(row, &paths))
      .collect();
    if !filtered.is_empty() {
      out.insert(address.clone(), filtered);
    }
  }
  out
}

fn select_row(row: &Row, paths: &[&FieldPath]) -> Option<Row> {
  let mut merged: Option<Selection> = None;
  for path in paths {
    let Some(selection) = select_in_object(row, path.segments()) else {
      continue;
    };
    merged = Some(match merged {
      Some(existing) => existing.merge(selection),
      None => selection,
    });
  }
  match merged?.into_value() {
    Value::Object(map) if !map.is_empty() => Some(map),
    _ => None,
  }
}

/// Partial copy of a value. Array selections keep one slot per element so that selections of
/// different paths through the same array can be merged by position.
#[derive(Debug, Clone)]
enum Selection {
  Whole(Value),
  Object(BTreeMap<String, Selection>),
  Array(Vec<Option<Selection>>),
}

impl Selection {
  fn merge(self, other: Selection) -> Selection {
    match (self, other) {
      (Selection::Whole(v), _) | (_, Selection::Whole(v)) => Selection::Whole(v),
      (Selection::Object(mut a), Selection::Object(b)) => {
        for (k, v) in b {
          let merged = match a.remove(&k) {
            Some(existing) => existing.merge(v),
            None => v,
          };
          a.insert(k, merged);
        }
        Selection::Object(a)
      }
      (Selection::Array(a), Selection::Array(b)) if a.len() == b.len() => Selection::Array(
        a.into_iter()
          .zip(b)
          .map(|pair| match pair {
            (Some(x), Some(y)) => Some(x.merge(y)),
            (x, y) => x.or(y),
          })
          .collect(),
      ),
      (first, _) => first,
    }
  }

  fn into_value(self) -> Value {
    match self {
      Selection::Whole(v) => v,
      Selection::Object(map) => Value::Object(
        map
          .into_iter()
          .map(|(k, v)| (k, v.into_value()))
          .collect(),
      ),
      Selection::Array(items) => {
        Value::Array(items.into_iter().flatten().map(Selection::into_value).collect())
      }
    }
  }
}

fn select_in_object(object: &Row, segments: &[String]) -> Option<Selection> {
  let (first, rest) = segments.split_first()?;
  let child = select_in_value(object.get(first)?, rest)?;
  Some(Selection::Object(BTreeMap::from([(first.clone(), child)])))
}

fn select_in_value(value: &Value, rest: &[String]) -> Option<Selection> {
  if rest.is_empty() {
    return Some(Selection::Whole(value.clone()));
  }
  match value {
    Value::Object(map) => select_in_object(map, rest),
    Value::Array(items) => {
      let slots: Vec<Option<Selection>> = items
        .iter()
        .map(|item| select_in_value(item, rest))
        .collect();
      slots
        .iter()
        .any(Option::is_some)
        .then_some(Selection::Array(slots))
    }
    _ => None,
  }
}
