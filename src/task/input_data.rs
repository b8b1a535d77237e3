//! Aggregate upstream rows into the query input of one node.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::traversal::TraversalNode;
use crate::types::{CollectionAddress, DataType, InputData, Row};

/// Rows produced by each upstream collection (the root contributes the identity seed row).
pub type UpstreamRows = BTreeMap<CollectionAddress, Vec<Row>>;

/// Builds `local field -> values` for `node` from its upstream rows.
///
/// Values are read along each incoming edge, flattened through lists and arrays of objects,
/// coerced to the local field's type (values that do not coerce are dropped) and deduplicated
/// in first-seen order. Missing upstream collections and fields contribute nothing.
pub fn to_input_data(node: &TraversalNode, upstream: &UpstreamRows) -> InputData {
  let mut out = InputData::new();
  for (parent, pairs) in node.incoming_field_map() {
    let rows = upstream.get(&parent).map(Vec::as_slice).unwrap_or_default();
    for (source, destination) in pairs {
      let data_type = node
        .collection()
        .field(&destination)
        .map(|f| f.data_type)
        .unwrap_or_default();
      let values = out.entry(destination).or_default();
      for row in rows {
        let mut raw = Vec::new();
        collect_values(row, source.segments(), &mut raw);
        for v in raw {
          push_coerced(values, &data_type, v);
        }
      }
    }
  }
  out
}

fn push_coerced(values: &mut Vec<Value>, data_type: &DataType, value: &Value) {
  let Some(coerced) = data_type.coerce(value) else {
    return;
  };
  if !values.contains(&coerced) {
    values.push(coerced);
  }
}

/// Values at `segments` inside `row`, descending into arrays along the way and flattening a
/// final array into its elements.
fn collect_values<'a>(row: &'a Row, segments: &[String], out: &mut Vec<&'a Value>) {
  let Some((first, rest)) = segments.split_first() else {
    return;
  };
  if let Some(v) = row.get(first) {
    collect_from_value(v, rest, out);
  }
}

fn collect_from_value<'a>(value: &'a Value, rest: &[String], out: &mut Vec<&'a Value>) {
  match value {
    Value::Array(items) => {
      for item in items {
        collect_from_value(item, rest, out);
      }
    }
    Value::Object(map) if !rest.is_empty() => collect_values(map, rest, out),
    _ if rest.is_empty() => out.push(value),
    _ => {}
  }
}
