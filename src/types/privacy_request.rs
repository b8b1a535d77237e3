//! A privacy request and the connection configuration its datasets are bound to.

use serde::{Deserialize, Serialize};

use super::{ActionType, IdentitySeed, Policy};

/// One data-subject request: an identity seed plus the policy to apply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrivacyRequest {
  pub id: String,
  pub identity: IdentitySeed,
  pub policy: Policy,
}

impl PrivacyRequest {
  pub fn new(id: impl Into<String>, identity: IdentitySeed, policy: Policy) -> Self {
    Self {
      id: id.into(),
      identity,
      policy,
    }
  }
}

/// Family of a connection; decides how its nodes are executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionType {
  Sql,
  Document,
  Saas,
  /// Human-in-the-loop collection point with no backing query.
  Manual,
}

/// Connection a dataset is bound to, as seen when a run starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConfig {
  pub key: String,
  pub connection_type: ConnectionType,
  #[serde(default)]
  pub disabled: bool,
  /// `None` enables every action.
  #[serde(default)]
  pub enabled_actions: Option<Vec<ActionType>>,
}

impl ConnectionConfig {
  pub fn new(key: impl Into<String>, connection_type: ConnectionType) -> Self {
    Self {
      key: key.into(),
      connection_type,
      disabled: false,
      enabled_actions: None,
    }
  }

  pub fn is_manual(&self) -> bool {
    self.connection_type == ConnectionType::Manual
  }

  /// Reason the given action must be skipped for this connection, if any.
  pub fn skip_reason(&self, action: ActionType) -> Option<String> {
    if self.disabled {
      return Some(format!("connection '{}' is disabled", self.key));
    }
    match &self.enabled_actions {
      Some(actions) if !actions.contains(&action) => Some(format!(
        "{} is not enabled for connection '{}'",
        action, self.key
      )),
      _ => None,
    }
  }
}
