use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use serde_json::Number;

use crate::{Collection, Model};

/// An attribute value: JSON-shaped data plus live reactive containers and
/// computed-property specs.
///
/// `Clone` copies plain data structurally and clones handles for models,
/// collections, and computed specs — the snapshot semantics change
/// tracking relies on (a snapshot never deep-copies a live entity).
#[derive(Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Array(Vec<Value>),
    Object(IndexMap<String, Value>),
    Model(Model),
    Collection(Collection),
    Computed(ComputedSpec),
}

/// A computed property: a derivation function plus the keypaths it reads.
///
/// The dependency list drives re-broadcast subscriptions; the function is
/// evaluated with the owning model as receiver.
#[derive(Clone)]
pub struct ComputedSpec {
    compute: Rc<dyn Fn(&Model) -> Value>,
    dependencies: Vec<String>,
}

impl ComputedSpec {
    pub fn new(compute: impl Fn(&Model) -> Value + 'static) -> Self {
        Self {
            compute: Rc::new(compute),
            dependencies: Vec::new(),
        }
    }

    /// Declare the keypaths this computed value reads.
    pub fn with_dependencies(
        compute: impl Fn(&Model) -> Value + 'static,
        dependencies: &[&str],
    ) -> Self {
        Self {
            compute: Rc::new(compute),
            dependencies: dependencies.iter().map(|d| d.to_string()).collect(),
        }
    }

    pub fn call(&self, receiver: &Model) -> Value {
        (self.compute)(receiver)
    }

    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    fn same_fn(&self, other: &ComputedSpec) -> bool {
        Rc::ptr_eq(&self.compute, &other.compute)
    }
}

impl fmt::Debug for ComputedSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComputedSpec")
            .field("dependencies", &self.dependencies)
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("Null"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Number(n) => write!(f, "Number({n})"),
            Value::String(s) => write!(f, "String({s:?})"),
            Value::Array(items) => f.debug_tuple("Array").field(items).finish(),
            Value::Object(map) => f.debug_tuple("Object").field(map).finish(),
            Value::Model(_) => f.write_str("Model(..)"),
            Value::Collection(_) => f.write_str("Collection(..)"),
            Value::Computed(spec) => spec.fmt(f),
        }
    }
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Boolean coercion for visibility and conditional directives.
    /// Containers and entities are truthy; empty strings and zero are not.
    pub fn truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
            Value::String(s) => !s.is_empty(),
            Value::Array(_) | Value::Object(_) => true,
            Value::Model(_) | Value::Collection(_) | Value::Computed(_) => true,
        }
    }

    /// Text rendered into the DOM for this value. `Null` renders empty;
    /// structured values render as compact JSON.
    pub fn display_text(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => n.to_string(),
            Value::String(s) => s.clone(),
            Value::Computed(_) => String::new(),
            other => serde_json::to_string(&other.to_json()).unwrap_or_default(),
        }
    }

    /// Plain-JSON projection: entities serialize through their own
    /// `to_json`, computed specs are stripped (`Null` in sequence slots).
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => serde_json::Value::Number(n.clone()),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Array(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Object(map) => {
                let mut out = serde_json::Map::new();
                for (key, value) in map {
                    if let Value::Computed(_) = value {
                        continue;
                    }
                    out.insert(key.clone(), value.to_json());
                }
                serde_json::Value::Object(out)
            }
            Value::Model(model) => model.to_json(),
            Value::Collection(collection) => collection.to_json(),
            Value::Computed(_) => serde_json::Value::Null,
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => Value::Object(
                map.into_iter()
                    .map(|(key, value)| (key, Value::from(value)))
                    .collect(),
            ),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(Number::from(n))
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        raw_equal(self, other)
    }
}

/// Deep equality on raw form: a model compares by its attributes, a
/// collection by its members, numbers by numeric value. Computed specs
/// compare by function identity.
pub fn raw_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Number(x), Value::Number(y)) => number_equal(x, y),
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Computed(x), Value::Computed(y)) => x.same_fn(y),
        (Value::Array(x), Value::Array(y)) => sequence_equal(x, y),
        (Value::Object(x), Value::Object(y)) => map_equal(x, y),
        // Entities unwrap to their raw form on either side.
        (Value::Model(m), other) | (other, Value::Model(m)) => {
            let attrs = Value::Object(m.raw_attributes());
            raw_equal(&attrs, other)
        }
        (Value::Collection(c), other) | (other, Value::Collection(c)) => {
            let members = Value::Array(c.models().into_iter().map(Value::Model).collect());
            raw_equal(&members, other)
        }
        _ => false,
    }
}

fn number_equal(a: &Number, b: &Number) -> bool {
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        return x == y;
    }
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn sequence_equal(a: &[Value], b: &[Value]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| raw_equal(x, y))
}

fn map_equal(a: &IndexMap<String, Value>, b: &IndexMap<String, Value>) -> bool {
    a.len() == b.len()
        && a.iter()
            .all(|(key, x)| b.get(key).is_some_and(|y| raw_equal(x, y)))
}

/// Flatten a plain object into dotted leaf paths. Nested non-empty plain
/// objects recurse; arrays and empty objects stay as leaves.
pub fn flatten_paths(map: &IndexMap<String, Value>) -> Vec<(String, Value)> {
    let mut out = Vec::new();
    for (key, value) in map {
        match value {
            Value::Object(inner) if !inner.is_empty() => {
                for (sub, leaf) in flatten_paths(inner) {
                    out.push((format!("{key}.{sub}"), leaf));
                }
            }
            other => out.push((key.clone(), other.clone())),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn raw_equal_scalars() {
        assert!(raw_equal(&Value::from(1i64), &Value::from(1.0)));
        assert!(!raw_equal(&Value::from(1i64), &Value::from("1")));
        assert!(raw_equal(&Value::Null, &Value::Null));
    }

    #[test]
    fn raw_equal_nested() {
        let a = Value::from(json!({"a": {"b": [1, 2]}}));
        let b = Value::from(json!({"a": {"b": [1, 2]}}));
        let c = Value::from(json!({"a": {"b": [1, 3]}}));
        assert!(raw_equal(&a, &b));
        assert!(!raw_equal(&a, &c));
    }

    #[test]
    fn model_compares_by_attributes() {
        let model = Model::with_attrs(Value::from(json!({"x": 1})));
        assert!(raw_equal(
            &Value::Model(model),
            &Value::from(json!({"x": 1}))
        ));
    }

    #[test]
    fn flatten_recurses_objects_only() {
        let map = match Value::from(json!({"a": {"b": 1, "c": {"d": 2}}, "e": [1], "f": {}})) {
            Value::Object(map) => map,
            _ => unreachable!(),
        };
        let paths: Vec<String> = flatten_paths(&map).into_iter().map(|(p, _)| p).collect();
        assert_eq!(paths, vec!["a.b", "a.c.d", "e", "f"]);
    }

    #[test]
    fn truthiness_matrix() {
        assert!(!Value::Null.truthy());
        assert!(!Value::from("").truthy());
        assert!(!Value::from(0i64).truthy());
        assert!(Value::from("x").truthy());
        assert!(Value::from(json!([])).truthy());
        assert!(Value::from(json!({})).truthy());
    }
}
