//! The dynamic value model shared by every layer of the engine.
//!
//! BIQL's source language (Python) carries heterogeneous values through a
//! single dynamically-typed object; ported to Rust this becomes a tagged
//! sum type. Every operator in `evaluator::ops` dispatches on the `Value`
//! tag, following the coercion lattice documented on [`Value::as_number`]
//! and [`Value::as_display_string`].

use indexmap::IndexMap;
use std::cmp::Ordering;
use std::fmt;

/// A row emitted by the evaluator: an ordered mapping from output column
/// name to value. Order matches spec.md §3's "stable column order"
/// invariant.
pub type Row = IndexMap<String, Value>;

/// A dynamically-typed value: a scalar, a list, or a nested mapping.
///
/// This same type represents resolved field values, JSON metadata (sidecar
/// values, already parsed by the external provider), and projected row
/// columns — there is exactly one value representation in this crate.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    List(Vec<Value>),
    Map(IndexMap<String, Value>),
}

impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Existence per spec.md §4.3(b): a bare field is truthy iff it
    /// resolves to a non-null, non-empty value.
    pub fn exists(&self) -> bool {
        match self {
            Value::Null => false,
            Value::String(s) => !s.is_empty(),
            Value::List(l) => !l.is_empty(),
            Value::Map(m) => !m.is_empty(),
            Value::Bool(_) | Value::Number(_) => true,
        }
    }

    /// Numeric coercion: numbers pass through; strings parse if they look
    /// like a number; everything else fails.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    /// Canonical string form used for string-equality fallback and for
    /// printing inside tabular formats. Lists/maps render as their JSON
    /// form, matching the formatter contract in spec.md §6.3.
    pub fn as_display_string(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => format_number(*n),
            Value::String(s) => s.clone(),
            Value::List(_) | Value::Map(_) => {
                serde_json::to_string(self).unwrap_or_default()
            }
        }
    }

    /// True if this value is all-ASCII-digits when rendered as a string
    /// (used by the `=` zero-padding coercion rule).
    pub fn is_digit_string(&self) -> bool {
        match self {
            Value::String(s) => !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()),
            Value::Number(n) => n.fract() == 0.0 && *n >= 0.0,
            _ => false,
        }
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        let mut s = format!("{}", n);
        if !s.contains('.') && !s.contains('e') && !s.contains('E') {
            s.push_str(".0");
        }
        s
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_display_string())
    }
}

/// Ordering used by ORDER BY: numeric first, falling back to the
/// lexicographic string form. Nulls always sort last regardless of
/// direction (direction flip happens at the call site).
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a.is_null(), b.is_null()) {
        (true, true) => return Ordering::Equal,
        (true, false) => return Ordering::Greater,
        (false, true) => return Ordering::Less,
        (false, false) => {}
    }
    if let (Some(x), Some(y)) = (a.as_number(), b.as_number()) {
        return x.partial_cmp(&y).unwrap_or(Ordering::Equal);
    }
    a.as_display_string().cmp(&b.as_display_string())
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Number(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(a) => Value::List(a.into_iter().map(Value::from).collect()),
            serde_json::Value::Object(o) => {
                Value::Map(o.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}
