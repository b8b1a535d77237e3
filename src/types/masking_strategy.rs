//! Masking strategies applied to field values during erasure.

use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Strategy descriptor attached to an erasure rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "strategy", content = "configuration", rename_all = "snake_case")]
pub enum MaskingStrategy {
  /// Replace the value with null.
  NullRewrite,
  /// Replace the value with a fixed string.
  StringRewrite { rewrite_value: String },
  /// Replace the value with the hex SHA-256 of `salt + value`.
  Hash { salt: String },
  /// Replace the value with a random alphanumeric string.
  RandomStringRewrite { length: usize },
}

impl MaskingStrategy {
  pub fn name(&self) -> &'static str {
    match self {
      MaskingStrategy::NullRewrite => "null_rewrite",
      MaskingStrategy::StringRewrite { .. } => "string_rewrite",
      MaskingStrategy::Hash { .. } => "hash",
      MaskingStrategy::RandomStringRewrite { .. } => "random_string_rewrite",
    }
  }

  /// Masks one value. String results are truncated to `max_length` when given.
  pub fn mask(&self, value: &Value, max_length: Option<usize>) -> Value {
    let masked = match self {
      MaskingStrategy::NullRewrite => return Value::Null,
      MaskingStrategy::StringRewrite { rewrite_value } => rewrite_value.clone(),
      MaskingStrategy::Hash { salt } => {
        if value.is_null() {
          return Value::Null;
        }
        let plain = match value {
          Value::String(s) => s.clone(),
          other => other.to_string(),
        };
        let mut hasher = Sha256::new();
        hasher.update(salt.as_bytes());
        hasher.update(plain.as_bytes());
        hex::encode(hasher.finalize())
      }
      MaskingStrategy::RandomStringRewrite { length } => rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(*length)
        .map(char::from)
        .collect(),
    };
    Value::String(truncate(masked, max_length))
  }
}

fn truncate(s: String, max_length: Option<usize>) -> String {
  match max_length {
    Some(n) if s.chars().count() > n => s.chars().take(n).collect(),
    _ => s,
  }
}
