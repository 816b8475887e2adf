//! Primitive write commands and their ordering

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;

/// One property assignment: `property(args...) = value`.
///
/// A null value retracts the assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub property: String,
    pub args: Vec<Value>,
    pub value: Value,
}

impl Command {
    pub fn new(property: impl Into<String>, args: Vec<Value>, value: Value) -> Self {
        Self { property: property.into(), args, value }
    }

    /// Order by property then arguments, ignoring the value
    pub fn cmp_key(&self, other: &Command) -> Ordering {
        self.property
            .cmp(&other.property)
            .then_with(|| compare_slices(&self.args, &other.args))
    }

    /// Order by property, arguments, then value
    pub fn cmp_full(&self, other: &Command) -> Ordering {
        self.cmp_key(other).then_with(|| compare_values(&self.value, &other.value))
    }

    /// The same key with its value cleared
    pub fn retraction(mut self) -> Self {
        self.value = Value::Null;
        self
    }

    pub fn is_retraction(&self) -> bool {
        self.value.is_null()
    }
}

fn rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Total order over JSON values: null < bool < number < string < array < object
pub fn compare_values(lhs: &Value, rhs: &Value) -> Ordering {
    match (lhs, rhs) {
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        (Value::Number(a), Value::Number(b)) => {
            if let (Some(a), Some(b)) = (a.as_i64(), b.as_i64()) {
                a.cmp(&b)
            } else if let (Some(a), Some(b)) = (a.as_u64(), b.as_u64()) {
                a.cmp(&b)
            } else {
                let a = a.as_f64().unwrap_or(f64::NAN);
                let b = b.as_f64().unwrap_or(f64::NAN);
                a.total_cmp(&b)
            }
        }
        (Value::String(a), Value::String(b)) => a.cmp(b),
        (Value::Array(a), Value::Array(b)) => compare_slices(a, b),
        (Value::Object(a), Value::Object(b)) => {
            for ((ka, va), (kb, vb)) in a.iter().zip(b.iter()) {
                let ord = ka.cmp(kb).then_with(|| compare_values(va, vb));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            a.len().cmp(&b.len())
        }
        _ => rank(lhs).cmp(&rank(rhs)),
    }
}

/// Element-wise comparison, shorter first on a common prefix
pub fn compare_slices(lhs: &[Value], rhs: &[Value]) -> Ordering {
    for (a, b) in lhs.iter().zip(rhs.iter()) {
        let ord = compare_values(a, b);
        if ord != Ordering::Equal {
            return ord;
        }
    }
    lhs.len().cmp(&rhs.len())
}
