//! The language's two primitive kinds and the tagged runtime value.

use std::fmt;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
  Int,
  Str,
}

impl Kind {
  /// Value a variable of this kind holds before its first store.
  pub fn zero(&self) -> Value {
    match self {
      Kind::Int => Value::Int(0),
      Kind::Str => Value::Str(Rc::from("")),
    }
  }
}

impl fmt::Display for Kind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Kind::Int => f.write_str("integer"),
      Kind::Str => f.write_str("string"),
    }
  }
}

/// Operand stack and variable store entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
  Int(i64),
  Str(Rc<str>),
}

impl Value {
  pub fn kind(&self) -> Kind {
    match self {
      Value::Int(_) => Kind::Int,
      Value::Str(_) => Kind::Str,
    }
  }

  pub fn as_int(&self) -> Option<i64> {
    match self {
      Value::Int(value) => Some(*value),
      Value::Str(_) => None,
    }
  }
}

impl From<i64> for Value {
  fn from(value: i64) -> Self {
    Value::Int(value)
  }
}

impl From<&str> for Value {
  fn from(value: &str) -> Self {
    Value::Str(Rc::from(value))
  }
}

impl fmt::Display for Value {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Value::Int(value) => write!(f, "{value}"),
      Value::Str(text) => f.write_str(text),
    }
  }
}
