//! Policy rules: action types, target data categories and masking strategies.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::MaskingStrategy;

/// Kind of work a rule (or an execution step) performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
  Access,
  Erasure,
}

impl fmt::Display for ActionType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ActionType::Access => write!(f, "access"),
      ActionType::Erasure => write!(f, "erasure"),
    }
  }
}

/// One policy rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
  pub key: String,
  pub action_type: ActionType,
  /// Target data categories (hierarchical, e.g. `user.contact`).
  pub targets: Vec<String>,
  /// Required for erasure rules.
  #[serde(default)]
  pub masking_strategy: Option<MaskingStrategy>,
}

/// A `(data_category, rule)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PolicyRuleTarget {
  pub data_category: String,
  pub rule_key: String,
}

/// Ordered list of rules applied to one privacy request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Policy {
  pub key: String,
  pub rules: Vec<Rule>,
}

impl Policy {
  pub fn rules_for(&self, action: ActionType) -> impl Iterator<Item = &Rule> {
    self.rules.iter().filter(move |r| r.action_type == action)
  }

  pub fn has_rules_for(&self, action: ActionType) -> bool {
    self.rules_for(action).next().is_some()
  }

  /// Targets of every rule with the given action type, in rule order.
  pub fn rule_targets(&self, action: ActionType) -> Vec<PolicyRuleTarget> {
    self
      .rules_for(action)
      .flat_map(|r| {
        r.targets.iter().map(|t| PolicyRuleTarget {
          data_category: t.clone(),
          rule_key: r.key.clone(),
        })
      })
      .collect()
  }
}

/// True when `field_category` equals `target` or sits below it in the dot hierarchy.
pub fn category_matches(target: &str, field_category: &str) -> bool {
  field_category == target
    || field_category
      .strip_prefix(target)
      .is_some_and(|rest| rest.starts_with('.'))
}
