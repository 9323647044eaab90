use std::collections::HashMap;
use std::rc::Rc;

use woodhouse_core::Value;

type TransformFn = Rc<dyn Fn(&Value) -> Value>;
type IndexFn = Rc<dyn Fn(i64) -> i64>;

/// Per-keypath value transformers, keyed by the fully-prefixed keypath.
/// `model_to_view` runs before a value is written into the DOM,
/// `view_to_model` before a DOM value is written back, and `index` adjusts
/// the `$index` literal.
#[derive(Clone, Default)]
pub struct Transformers {
    model_to_view: HashMap<String, TransformFn>,
    view_to_model: HashMap<String, TransformFn>,
    index: HashMap<String, IndexFn>,
}

impl Transformers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn model_to_view(mut self, keypath: &str, f: impl Fn(&Value) -> Value + 'static) -> Self {
        self.model_to_view.insert(keypath.to_string(), Rc::new(f));
        self
    }

    pub fn view_to_model(mut self, keypath: &str, f: impl Fn(&Value) -> Value + 'static) -> Self {
        self.view_to_model.insert(keypath.to_string(), Rc::new(f));
        self
    }

    pub fn index(mut self, keypath: &str, f: impl Fn(i64) -> i64 + 'static) -> Self {
        self.index.insert(keypath.to_string(), Rc::new(f));
        self
    }

    pub(crate) fn apply_model_to_view(&self, keypath: &str, value: &Value) -> Value {
        match self.model_to_view.get(keypath) {
            Some(f) => f(value),
            None => value.clone(),
        }
    }

    pub(crate) fn apply_view_to_model(&self, keypath: &str, value: &Value) -> Value {
        match self.view_to_model.get(keypath) {
            Some(f) => f(value),
            None => value.clone(),
        }
    }

    pub(crate) fn apply_index(&self, keypath: &str, index: i64) -> i64 {
        match self.index.get(keypath) {
            Some(f) => f(index),
            None => index,
        }
    }
}
