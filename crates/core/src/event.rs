use crate::{Collection, Model, Value};

/// Payload delivered with every entity event.
///
/// Event names on the wire: the aggregate `change`, per-path
/// `change:<keypath>` (including wildcard ancestor paths `change:<prefix>.*`),
/// and the collection events `add`, `remove`, `reset`, `sort`. Views may
/// trigger arbitrary custom names with a [`EntityEvent::Custom`] payload.
#[derive(Clone)]
pub enum EntityEvent {
    /// Aggregate change, once per outermost `set` drain step.
    Change { model: Model },
    /// One changed (or wildcard ancestor) keypath and its resolved value.
    ChangePath {
        model: Model,
        path: String,
        value: Value,
    },
    Add {
        collection: Collection,
        model: Model,
        index: usize,
    },
    Remove {
        collection: Collection,
        model: Model,
        index: usize,
    },
    Reset { collection: Collection },
    Sort { collection: Collection },
    Custom { data: Value },
}

impl EntityEvent {
    /// The resolved value carried by a per-path change, if any.
    pub fn change_value(&self) -> Option<&Value> {
        match self {
            EntityEvent::ChangePath { value, .. } => Some(value),
            _ => None,
        }
    }

    /// The model this event concerns, if any.
    pub fn model(&self) -> Option<&Model> {
        match self {
            EntityEvent::Change { model }
            | EntityEvent::ChangePath { model, .. }
            | EntityEvent::Add { model, .. }
            | EntityEvent::Remove { model, .. } => Some(model),
            _ => None,
        }
    }

    /// The collection this event concerns, if any.
    pub fn collection(&self) -> Option<&Collection> {
        match self {
            EntityEvent::Add { collection, .. }
            | EntityEvent::Remove { collection, .. }
            | EntityEvent::Reset { collection }
            | EntityEvent::Sort { collection } => Some(collection),
            _ => None,
        }
    }

    /// Member index for single-element collection mutations.
    pub fn index(&self) -> Option<usize> {
        match self {
            EntityEvent::Add { index, .. } | EntityEvent::Remove { index, .. } => Some(*index),
            _ => None,
        }
    }
}
