use woodhouse_events::{Emitter, SubscriptionId};

use crate::{deep, Collection, EntityEvent, Model, Value};

/// A binding context: either a model or a collection. The binding engine
/// works against this uniform surface and never cares which one it holds.
#[derive(Clone)]
pub enum Entity {
    Model(Model),
    Collection(Collection),
}

impl Entity {
    /// Wrap raw data so it exposes the event surface: plain objects become
    /// models, arrays become collections, live entities pass through, and
    /// anything else becomes an empty collection.
    pub fn wrap(value: Value) -> Entity {
        match value {
            Value::Model(model) => Entity::Model(model),
            Value::Collection(collection) => Entity::Collection(collection),
            object @ Value::Object(_) => Entity::Model(Model::with_attrs(object)),
            array @ Value::Array(_) => Entity::Collection(Collection::from_value(array)),
            _ => Entity::Collection(Collection::new()),
        }
    }

    pub fn model(&self) -> Option<&Model> {
        match self {
            Entity::Model(model) => Some(model),
            Entity::Collection(_) => None,
        }
    }

    pub fn collection(&self) -> Option<&Collection> {
        match self {
            Entity::Collection(collection) => Some(collection),
            Entity::Model(_) => None,
        }
    }

    pub fn same(&self, other: &Entity) -> bool {
        match (self, other) {
            (Entity::Model(a), Entity::Model(b)) => a.same(b),
            (Entity::Collection(a), Entity::Collection(b)) => a.same(b),
            _ => false,
        }
    }

    pub fn get(&self, path: &str) -> Option<Value> {
        match self {
            Entity::Model(model) => model.get(path),
            Entity::Collection(collection) => {
                deep::resolve(&Value::Collection(collection.clone()), path)
            }
        }
    }

    /// Resolve without evaluating a computed spec in the final position.
    pub fn get_raw(&self, path: &str) -> Option<Value> {
        deep::resolve_raw(&self.to_value(), path)
    }

    /// Write through the entity. Collection roots address members by index
    /// and bypass the model change pipeline.
    pub fn set(&self, path: &str, value: Value) -> bool {
        match self {
            Entity::Model(model) => model.set(path, value),
            Entity::Collection(collection) => {
                deep::write_in_collection(collection, path, value);
                true
            }
        }
    }

    pub fn emitter(&self) -> Emitter<EntityEvent> {
        match self {
            Entity::Model(model) => model.emitter(),
            Entity::Collection(collection) => collection.emitter(),
        }
    }

    pub fn on(
        &self,
        events: &str,
        handler: impl Fn(&str, &EntityEvent) + 'static,
    ) -> SubscriptionId {
        self.emitter().on(events, handler)
    }

    pub fn off(&self, id: SubscriptionId) -> bool {
        self.emitter().off(id)
    }

    pub fn listener_count(&self) -> usize {
        self.emitter().listener_count()
    }

    pub fn to_value(&self) -> Value {
        match self {
            Entity::Model(model) => Value::Model(model.clone()),
            Entity::Collection(collection) => Value::Collection(collection.clone()),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Entity::Model(model) => model.to_json(),
            Entity::Collection(collection) => collection.to_json(),
        }
    }
}
