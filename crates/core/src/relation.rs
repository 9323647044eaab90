use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::{Collection, Model, Value};

/// Factory side of a relation: how raw data becomes the related instance.
#[derive(Clone)]
pub enum RelationTarget {
    Model(Rc<dyn Fn(Value) -> Model>),
    Collection(Rc<dyn Fn(Value) -> Collection>),
}

/// Declares that one attribute key always holds an instance of a related
/// model or collection type. Absent keys are auto-initialized at
/// construction; writes through the key coerce raw data into the instance.
#[derive(Clone)]
pub struct Relation {
    key: String,
    target: RelationTarget,
}

impl Relation {
    /// Model relation with the default (plain model) factory.
    pub fn model(key: &str) -> Self {
        Self::model_with(key, Model::with_attrs)
    }

    pub fn model_with(key: &str, factory: impl Fn(Value) -> Model + 'static) -> Self {
        Self {
            key: key.to_string(),
            target: RelationTarget::Model(Rc::new(factory)),
        }
    }

    /// Collection relation with the default (plain collection) factory.
    pub fn collection(key: &str) -> Self {
        Self::collection_with(key, Collection::from_value)
    }

    pub fn collection_with(key: &str, factory: impl Fn(Value) -> Collection + 'static) -> Self {
        Self {
            key: key.to_string(),
            target: RelationTarget::Collection(Rc::new(factory)),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn target(&self) -> &RelationTarget {
        &self.target
    }

    pub fn is_collection(&self) -> bool {
        matches!(self.target, RelationTarget::Collection(_))
    }

    /// The raw placeholder written for an absent relation key before the
    /// constructor's initial `set` coerces it.
    pub fn raw_placeholder(&self) -> Value {
        match self.target {
            RelationTarget::Model(_) => Value::Object(IndexMap::new()),
            RelationTarget::Collection(_) => Value::Array(Vec::new()),
        }
    }

    /// A fresh, empty related instance.
    pub fn instantiate_empty(&self) -> Value {
        self.instantiate(self.raw_placeholder())
    }

    /// Build the related instance from raw data.
    pub fn instantiate(&self, raw: Value) -> Value {
        match &self.target {
            RelationTarget::Model(factory) => Value::Model(factory(raw)),
            RelationTarget::Collection(factory) => Value::Collection(factory(raw)),
        }
    }
}

impl fmt::Debug for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.target {
            RelationTarget::Model(_) => "model",
            RelationTarget::Collection(_) => "collection",
        };
        write!(f, "Relation({} -> {kind})", self.key)
    }
}
