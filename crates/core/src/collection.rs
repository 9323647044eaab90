use std::cell::RefCell;
use std::rc::Rc;

use tracing::debug;
use woodhouse_events::{Emitter, SubscriptionId};

use crate::{next_cid, EntityEvent, Model, Value};

struct CollectionInner {
    models: Vec<Model>,
    emitter: Emitter<EntityEvent>,
    factory: Rc<dyn Fn(Value) -> Model>,
    cid: u64,
}

/// Ordered sequence of models with add/remove/reset/sort events. Cloning
/// the handle aliases the same collection; identity is the allocation.
#[derive(Clone)]
pub struct Collection {
    inner: Rc<RefCell<CollectionInner>>,
}

impl Default for Collection {
    fn default() -> Self {
        Self::new()
    }
}

impl Collection {
    pub fn new() -> Self {
        Self::with_factory(Model::with_attrs)
    }

    /// A collection whose raw inserts build members through `factory`.
    pub fn with_factory(factory: impl Fn(Value) -> Model + 'static) -> Self {
        Self {
            inner: Rc::new(RefCell::new(CollectionInner {
                models: Vec::new(),
                emitter: Emitter::new(),
                factory: Rc::new(factory),
                cid: next_cid(),
            })),
        }
    }

    /// Seed a collection from raw data (an array of member values).
    pub fn from_value(raw: Value) -> Self {
        let collection = Self::new();
        collection.reset_silent(raw);
        collection
    }

    pub fn same(&self, other: &Collection) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn cid(&self) -> u64 {
        self.inner.borrow().cid
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.borrow().models.is_empty()
    }

    pub fn at(&self, index: usize) -> Option<Model> {
        self.inner.borrow().models.get(index).cloned()
    }

    /// Snapshot of the member list.
    pub fn models(&self) -> Vec<Model> {
        self.inner.borrow().models.clone()
    }

    pub fn index_of(&self, model: &Model) -> Option<usize> {
        self.inner.borrow().models.iter().position(|m| m.same(model))
    }

    pub fn each(&self, mut f: impl FnMut(&Model, usize)) {
        for (index, model) in self.models().iter().enumerate() {
            f(model, index);
        }
    }

    fn member_from(&self, raw: Value) -> Model {
        match raw {
            Value::Model(model) => model,
            other => {
                let factory = Rc::clone(&self.inner.borrow().factory);
                factory(other)
            }
        }
    }

    /// Append one member; emits a single `add` carrying its index.
    pub fn add(&self, model: Model) {
        let index = {
            let mut inner = self.inner.borrow_mut();
            inner.models.push(model.clone());
            inner.models.len() - 1
        };
        self.emit_add(model, index);
    }

    /// Insert one member at `index` (clamped); emits a single `add`.
    pub fn add_at(&self, model: Model, index: usize) {
        let index = {
            let mut inner = self.inner.borrow_mut();
            let index = index.min(inner.models.len());
            inner.models.insert(index, model.clone());
            index
        };
        self.emit_add(model, index);
    }

    /// Append raw data through the member factory.
    pub fn add_value(&self, raw: Value) {
        let model = self.member_from(raw);
        self.add(model);
    }

    fn emit_add(&self, model: Model, index: usize) {
        let emitter = self.emitter();
        emitter.trigger(
            "add",
            &EntityEvent::Add {
                collection: self.clone(),
                model,
                index,
            },
        );
    }

    /// Remove the given member; emits a single `remove` carrying the index
    /// it held. No-op when the model is not a member.
    pub fn remove(&self, model: &Model) -> bool {
        let index = match self.index_of(model) {
            Some(index) => index,
            None => return false,
        };
        self.remove_at(index).is_some()
    }

    /// Remove the member at `index`; emits a single `remove`.
    pub fn remove_at(&self, index: usize) -> Option<Model> {
        let model = {
            let mut inner = self.inner.borrow_mut();
            if index >= inner.models.len() {
                return None;
            }
            inner.models.remove(index)
        };
        let emitter = self.emitter();
        emitter.trigger(
            "remove",
            &EntityEvent::Remove {
                collection: self.clone(),
                model: model.clone(),
                index,
            },
        );
        Some(model)
    }

    /// Replace the whole membership; emits a single `reset`.
    pub fn reset(&self, raw: Value) {
        self.reset_silent(raw);
        let emitter = self.emitter();
        emitter.trigger(
            "reset",
            &EntityEvent::Reset {
                collection: self.clone(),
            },
        );
    }

    fn reset_silent(&self, raw: Value) {
        let members: Vec<Model> = match raw {
            Value::Array(items) => items.into_iter().map(|item| self.member_from(item)).collect(),
            Value::Collection(other) => other.models(),
            Value::Null => Vec::new(),
            single => vec![self.member_from(single)],
        };
        self.inner.borrow_mut().models = members;
    }

    /// Move the member at `from` so it sits at `to` (index taken after the
    /// removal). Emits exactly one `sort`; never `add` or `remove`.
    pub fn move_item(&self, from: usize, to: usize) {
        {
            let mut inner = self.inner.borrow_mut();
            if from >= inner.models.len() {
                return;
            }
            let model = inner.models.remove(from);
            let to = to.min(inner.models.len());
            inner.models.insert(to, model);
        }
        debug!(cid = self.cid(), from, to, "collection move");
        let emitter = self.emitter();
        emitter.trigger(
            "sort",
            &EntityEvent::Sort {
                collection: self.clone(),
            },
        );
    }

    /// Replace the member at `index` in place, without events. Used by
    /// keypath writes that address a member slot directly.
    pub(crate) fn raw_replace_at(&self, index: usize, model: Model) {
        let mut inner = self.inner.borrow_mut();
        if index < inner.models.len() {
            inner.models[index] = model;
        }
    }

    pub(crate) fn make_member(&self, raw: Value) -> Model {
        self.member_from(raw)
    }

    // Events ----------------------------------------------------------------

    pub fn emitter(&self) -> Emitter<EntityEvent> {
        self.inner.borrow().emitter.clone()
    }

    pub fn on(&self, events: &str, handler: impl Fn(&str, &EntityEvent) + 'static) -> SubscriptionId {
        self.emitter().on(events, handler)
    }

    pub fn off(&self, id: SubscriptionId) -> bool {
        self.emitter().off(id)
    }

    pub fn listener_count(&self) -> usize {
        self.emitter().listener_count()
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Array(self.models().iter().map(Model::to_json).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn named(collection: &Collection) -> Vec<serde_json::Value> {
        collection
            .models()
            .iter()
            .map(|m| m.to_json()["name"].clone())
            .collect()
    }

    #[test]
    fn from_value_builds_members() {
        let collection =
            Collection::from_value(Value::from(json!([{"name": "a"}, {"name": "b"}])));
        assert_eq!(collection.len(), 2);
        assert_eq!(named(&collection), vec![json!("a"), json!("b")]);
    }

    #[test]
    fn move_item_reorders_with_single_splice() {
        let collection = Collection::from_value(Value::from(json!(
            [{"name": "A"}, {"name": "B"}, {"name": "C"}, {"name": "D"}, {"name": "E"}]
        )));
        collection.move_item(1, 3);
        assert_eq!(
            named(&collection),
            vec![json!("A"), json!("C"), json!("D"), json!("E"), json!("B")]
        );
    }

    #[test]
    fn add_at_clamps_and_reports_index() {
        let collection = Collection::new();
        collection.add_value(Value::from(json!({"name": "a"})));
        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen2 = Rc::clone(&seen);
        collection.on("add", move |_, ev| {
            seen2.borrow_mut().push(ev.index().expect("add has index"));
        });
        collection.add_at(Model::with_attrs(Value::from(json!({"name": "b"}))), 99);
        assert_eq!(seen.borrow().as_slice(), &[1]);
    }
}
