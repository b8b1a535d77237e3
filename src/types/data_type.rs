//! Declared field data types and the converters used to coerce query inputs.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Scalar kind of a field's declared type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ScalarType {
  String,
  Integer,
  Float,
  Boolean,
  Object,
  ObjectId,
  #[default]
  NoOp,
}

/// Declared field type: a scalar kind, optionally as an array (`string[]`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DataType {
  pub scalar: ScalarType,
  pub is_array: bool,
}

impl DataType {
  pub const fn scalar(scalar: ScalarType) -> Self {
    Self {
      scalar,
      is_array: false,
    }
  }

  pub const fn array(scalar: ScalarType) -> Self {
    Self {
      scalar,
      is_array: true,
    }
  }

  /// Coerces one value to this type's scalar kind. Returns `None` when the value cannot be
  /// represented (it is then dropped from query inputs).
  pub fn coerce(&self, value: &Value) -> Option<Value> {
    if value.is_null() {
      return None;
    }
    match self.scalar {
      ScalarType::NoOp => Some(value.clone()),
      ScalarType::String => to_string_value(value),
      ScalarType::Integer => to_integer_value(value),
      ScalarType::Float => to_float_value(value),
      ScalarType::Boolean => to_boolean_value(value),
      ScalarType::ObjectId => to_object_id_value(value),
      ScalarType::Object => value.is_object().then(|| value.clone()),
    }
  }
}

impl fmt::Display for ScalarType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      ScalarType::String => "string",
      ScalarType::Integer => "integer",
      ScalarType::Float => "float",
      ScalarType::Boolean => "boolean",
      ScalarType::Object => "object",
      ScalarType::ObjectId => "object_id",
      ScalarType::NoOp => "no_op",
    };
    f.write_str(s)
  }
}

impl fmt::Display for DataType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if self.is_array {
      write!(f, "{}[]", self.scalar)
    } else {
      write!(f, "{}", self.scalar)
    }
  }
}

impl FromStr for DataType {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let trimmed = s.trim();
    let (name, is_array) = match trimmed.strip_suffix("[]") {
      Some(inner) => (inner, true),
      None => (trimmed, false),
    };
    let scalar = match name {
      "string" => ScalarType::String,
      "integer" => ScalarType::Integer,
      "float" => ScalarType::Float,
      "boolean" => ScalarType::Boolean,
      "object" => ScalarType::Object,
      "object_id" => ScalarType::ObjectId,
      "no_op" => ScalarType::NoOp,
      other => return Err(format!("unknown data type '{}'", other)),
    };
    Ok(Self { scalar, is_array })
  }
}

fn to_string_value(value: &Value) -> Option<Value> {
  match value {
    Value::String(_) => Some(value.clone()),
    Value::Number(n) => Some(Value::String(n.to_string())),
    Value::Bool(b) => Some(Value::String(b.to_string())),
    Value::Object(_) => object_id_string(value).map(Value::String),
    _ => None,
  }
}

fn to_integer_value(value: &Value) -> Option<Value> {
  match value {
    Value::Number(n) => {
      if let Some(i) = n.as_i64() {
        return Some(Value::from(i));
      }
      n.as_f64().and_then(integral_f64).map(Value::from)
    }
    Value::String(s) => {
      let s = s.trim();
      s.parse::<i64>()
        .ok()
        .or_else(|| s.parse::<f64>().ok().and_then(integral_f64))
        .map(Value::from)
    }
    Value::Bool(b) => Some(Value::from(i64::from(*b))),
    _ => None,
  }
}

fn integral_f64(f: f64) -> Option<i64> {
  if f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
    Some(f as i64)
  } else {
    None
  }
}

fn to_float_value(value: &Value) -> Option<Value> {
  let f = match value {
    Value::Number(n) => n.as_f64(),
    Value::String(s) => s.trim().parse::<f64>().ok(),
    _ => None,
  }?;
  serde_json::Number::from_f64(f).map(Value::Number)
}

fn to_boolean_value(value: &Value) -> Option<Value> {
  match value {
    Value::Bool(_) => Some(value.clone()),
    Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
      "true" | "t" | "yes" | "1" => Some(Value::Bool(true)),
      "false" | "f" | "no" | "0" => Some(Value::Bool(false)),
      _ => None,
    },
    Value::Number(n) => match n.as_i64() {
      Some(0) => Some(Value::Bool(false)),
      Some(1) => Some(Value::Bool(true)),
      _ => None,
    },
    _ => None,
  }
}

/// Object ids cross connector boundaries as opaque strings; `{"$oid": "..."}` is unwrapped.
fn to_object_id_value(value: &Value) -> Option<Value> {
  match value {
    Value::String(_) => Some(value.clone()),
    Value::Object(_) => object_id_string(value).map(Value::String),
    _ => None,
  }
}

fn object_id_string(value: &Value) -> Option<String> {
  value
    .get("$oid")
    .and_then(Value::as_str)
    .map(str::to_string)
}
