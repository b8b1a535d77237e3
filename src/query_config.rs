//! Query and update generation for SQL-like connectors, and the per-collection masking plan.
//!
//! Selects are an OR of per-field clauses (`email = :email OR id IN (...)`); updates set every
//! masked field of one row and are keyed by the row's primary key.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;
use tracing::{debug, instrument};

use crate::error::GraphError;
use crate::traversal::{Traversal, TraversalNode};
use crate::types::{
  ActionType, Collection, CollectionAddress, FieldPath, InputData, MaskingStrategy, Policy, Row,
  category_matches,
};

/// Field path -> strategy used to mask it.
pub type MaskingPlan = BTreeMap<FieldPath, MaskingStrategy>;

/// Value at a dotted path inside a row (objects only; arrays are not descended).
pub fn row_value<'a>(row: &'a Row, path: &FieldPath) -> Option<&'a Value> {
  let (first, rest) = path.segments().split_first()?;
  let mut current = row.get(first)?;
  for segment in rest {
    current = current.as_object()?.get(segment)?;
  }
  Some(current)
}

/// Writes `value` at a dotted path, creating intermediate objects.
pub fn set_row_value(row: &mut Row, path: &FieldPath, value: Value) {
  let Some((last, parents)) = path.segments().split_last() else {
    return;
  };
  let mut current = row;
  for segment in parents {
    let entry = current
      .entry(segment.clone())
      .or_insert_with(|| Value::Object(Row::new()));
    if !entry.is_object() {
      *entry = Value::Object(Row::new());
    }
    let Value::Object(next) = entry else {
      return;
    };
    current = next;
  }
  current.insert(last.clone(), value);
}

/// One `field = value` or `field IN (values)` clause.
#[derive(Debug, Clone, PartialEq)]
pub struct Clause {
  pub field: FieldPath,
  pub values: Vec<Value>,
}

/// A generated select; clauses are combined with OR.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectStatement {
  pub table: String,
  pub fields: Vec<String>,
  pub clauses: Vec<Clause>,
}

impl SelectStatement {
  /// Statement text with named parameters.
  pub fn to_sql(&self) -> String {
    self.render(|clause| {
      let name = clause.field.string_path();
      if clause.values.len() == 1 {
        format!("{} = :{}", name, name)
      } else {
        let params = (0..clause.values.len())
          .map(|i| format!(":{}_in_stmt_generated_{}", name, i))
          .collect::<Vec<_>>()
          .join(", ");
        format!("{} IN ({})", name, params)
      }
    })
  }

  /// Statement text with `?` placeholders, for logging and dry runs.
  pub fn dry_run(&self) -> String {
    self.render(|clause| {
      let name = clause.field.string_path();
      if clause.values.len() <= 1 {
        format!("{} = ?", name)
      } else {
        let params = vec!["?"; clause.values.len()].join(", ");
        format!("{} IN ({})", name, params)
      }
    })
  }

  fn render(&self, clause: impl Fn(&Clause) -> String) -> String {
    let predicate = self
      .clauses
      .iter()
      .map(clause)
      .collect::<Vec<_>>()
      .join(" OR ");
    format!(
      "SELECT {} FROM {} WHERE {}",
      self.fields.join(","),
      self.table,
      predicate
    )
  }

  /// True when some clause matches the row.
  pub fn matches(&self, row: &Row) -> bool {
    self.clauses.iter().any(|c| {
      row_value(row, &c.field).is_some_and(|v| match v {
        Value::Array(items) => items.iter().any(|i| c.values.contains(i)),
        other => c.values.contains(other),
      })
    })
  }
}

/// A generated per-row update keyed by primary key.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateStatement {
  pub table: String,
  pub set: Vec<(FieldPath, Value)>,
  pub keys: Vec<(FieldPath, Value)>,
}

impl UpdateStatement {
  pub fn to_sql(&self) -> String {
    let set = self
      .set
      .iter()
      .map(|(p, _)| format!("{} = :{}", p, p))
      .collect::<Vec<_>>()
      .join(",");
    let keys = self
      .keys
      .iter()
      .map(|(p, _)| format!("{} = :{}", p, p))
      .collect::<Vec<_>>()
      .join(" AND ");
    format!("UPDATE {} SET {} WHERE {}", self.table, set, keys)
  }

  /// True when the row has every key value of this update.
  pub fn matches(&self, row: &Row) -> bool {
    self
      .keys
      .iter()
      .all(|(p, v)| row_value(row, p).is_some_and(|rv| rv == v))
  }
}

impl fmt::Display for UpdateStatement {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.to_sql())
  }
}

/// Query generation for one traversal node.
#[derive(Debug, Clone, Copy)]
pub struct QueryConfig<'a> {
  node: &'a TraversalNode,
}

impl<'a> QueryConfig<'a> {
  pub fn new(node: &'a TraversalNode) -> Self {
    Self { node }
  }

  pub fn collection(&self) -> &'a Collection {
    self.node.collection()
  }

  /// Top-level field names, in declaration order.
  pub fn field_names(&self) -> Vec<String> {
    self
      .collection()
      .fields
      .iter()
      .map(|f| f.name.clone())
      .collect()
  }

  /// Input restricted to this node's input keys, with nulls and empty keys removed.
  pub fn typed_filtered_values(&self, input: &InputData) -> InputData {
    let keys = self.node.input_keys();
    input
      .iter()
      .filter(|(k, _)| keys.contains(k))
      .map(|(k, values)| {
        let kept: Vec<Value> = values.iter().filter(|v| !v.is_null()).cloned().collect();
        (k.clone(), kept)
      })
      .filter(|(_, values)| !values.is_empty())
      .collect()
  }

  /// Select for the given input, or `None` when every input key is empty.
  pub fn generate_query(&self, input: &InputData) -> Option<SelectStatement> {
    let filtered = self.typed_filtered_values(input);
    if filtered.is_empty() {
      debug!(address = %self.node.address(), "no input values; skipping query");
      return None;
    }
    Some(SelectStatement {
      table: self.collection().name.clone(),
      fields: self.field_names(),
      clauses: filtered
        .into_iter()
        .map(|(field, values)| Clause { field, values })
        .collect(),
    })
  }

  /// Select text with one `?` per input key, independent of any actual values.
  pub fn dry_run_query(&self) -> Option<String> {
    let keys = self.node.input_keys();
    if keys.is_empty() {
      return None;
    }
    let statement = SelectStatement {
      table: self.collection().name.clone(),
      fields: self.field_names(),
      clauses: keys
        .into_iter()
        .map(|field| Clause {
          field,
          values: vec![Value::Null],
        })
        .collect(),
    };
    Some(statement.dry_run())
  }

  /// Update masking every planned field present in `row`, or `None` when the collection has
  /// no primary key, the row lacks a key value, or nothing would change.
  pub fn generate_update(&self, row: &Row, plan: &MaskingPlan) -> Option<UpdateStatement> {
    let collection = self.collection();
    let pks = collection.primary_keys();
    if pks.is_empty() {
      return None;
    }
    let mut keys = Vec::with_capacity(pks.len());
    for pk in pks {
      let value = row_value(row, &pk).filter(|v| !v.is_null())?;
      keys.push((pk, value.clone()));
    }
    let set: Vec<(FieldPath, Value)> = plan
      .iter()
      .filter_map(|(path, strategy)| {
        let current = row_value(row, path)?;
        let length = collection.field(path).and_then(|f| f.length);
        Some((path.clone(), strategy.mask(current, length)))
      })
      .collect();
    if set.is_empty() {
      return None;
    }
    Some(UpdateStatement {
      table: collection.name.clone(),
      set,
      keys,
    })
  }
}

/// Masking plan for one collection: every non-key field whose category matches an erasure
/// target gets that rule's strategy. Two different strategies on one field is an error.
#[instrument(level = "trace", skip(collection, policy))]
pub fn update_value_map(
  address: &CollectionAddress,
  collection: &Collection,
  policy: &Policy,
) -> Result<MaskingPlan, GraphError> {
  let by_category = collection.field_paths_by_category();
  let primary_keys = collection.primary_keys();
  let mut strategies: BTreeMap<&str, &MaskingStrategy> = BTreeMap::new();
  for rule in policy.rules_for(ActionType::Erasure) {
    let strategy = rule
      .masking_strategy
      .as_ref()
      .ok_or_else(|| GraphError::MissingMaskingStrategy(rule.key.clone()))?;
    strategies.entry(rule.key.as_str()).or_insert(strategy);
  }
  let mut plan: BTreeMap<FieldPath, (MaskingStrategy, String)> = BTreeMap::new();
  for target in policy.rule_targets(ActionType::Erasure) {
    let strategy = *strategies
      .get(target.rule_key.as_str())
      .ok_or_else(|| GraphError::MissingMaskingStrategy(target.rule_key.clone()))?;
    let paths = by_category
      .iter()
      .filter(|(category, _)| category_matches(&target.data_category, category))
      .flat_map(|(_, paths)| paths.iter());
    for path in paths {
      if primary_keys.contains(path) {
        continue;
      }
      match plan.get(path) {
        Some((existing, existing_rule)) if existing != strategy => {
          return Err(GraphError::MaskingConflict {
            collection: address.clone(),
            field: path.clone(),
            first: existing.name().to_string(),
            first_rule: existing_rule.clone(),
            second: strategy.name().to_string(),
            second_rule: target.rule_key.clone(),
          });
        }
        Some(_) => {}
        None => {
          plan.insert(path.clone(), (strategy.clone(), target.rule_key.clone()));
        }
      }
    }
  }
  Ok(plan.into_iter().map(|(p, (s, _))| (p, s)).collect())
}

/// Dry-run select text for every visited node that takes input, in visit order.
pub fn collect_queries(traversal: &Traversal) -> Vec<(CollectionAddress, String)> {
  let mut out = Vec::new();
  traversal.traverse(&mut out, |node, acc| {
    if let Some(sql) = QueryConfig::new(node).dry_run_query() {
      acc.push((node.address().clone(), sql));
    }
  });
  out
}
