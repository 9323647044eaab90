use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use tracing::debug;
use woodhouse_events::{Emitter, ListenerRegistry, SubscriptionId};

use crate::value::{flatten_paths, raw_equal};
use crate::{deep, next_cid, EntityEvent, Relation, Value};
use woodhouse_keypath as keypath;

/// Options carried by one `set` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SetOptions {
    /// Suppress all events for this call.
    pub silent: bool,
    /// Erase the addressed attributes instead of writing them.
    pub unset: bool,
}

/// Reusable model blueprint: defaults, relation declarations, and an
/// optional validation hook. Shared across instances via `Rc`.
#[derive(Default)]
pub struct ModelSpec {
    defaults: IndexMap<String, Value>,
    relations: Vec<Relation>,
    validator: Option<Rc<dyn Fn(&Model, &IndexMap<String, Value>) -> bool>>,
}

impl ModelSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Default for one attribute, applied only when absent at construction.
    pub fn default_value(mut self, key: &str, value: Value) -> Self {
        self.defaults.insert(key.to_string(), value);
        self
    }

    pub fn relation(mut self, relation: Relation) -> Self {
        self.relations.push(relation);
        self
    }

    /// Validation hook: inspects the incoming entries before any mutation;
    /// returning `false` rejects the whole `set`.
    pub fn validator(
        mut self,
        validator: impl Fn(&Model, &IndexMap<String, Value>) -> bool + 'static,
    ) -> Self {
        self.validator = Some(Rc::new(validator));
        self
    }

    pub fn relations(&self) -> &[Relation] {
        &self.relations
    }
}

/// Re-entrancy state of one model's `set` pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SetPhase {
    Idle,
    Accumulating,
    Draining,
}

struct ModelInner {
    attributes: IndexMap<String, Value>,
    spec: Rc<ModelSpec>,
    changed: IndexMap<String, Value>,
    previous: Option<IndexMap<String, Value>>,
    emitter: Emitter<EntityEvent>,
    listeners: Rc<ListenerRegistry<EntityEvent>>,
    computed_subs: HashMap<String, Vec<SubscriptionId>>,
    phase: SetPhase,
    pending: VecDeque<SetOptions>,
    cid: u64,
}

/// Reactive model with deep-keypath attributes, relations, and computed
/// properties. Cloning the handle aliases the same model.
#[derive(Clone)]
pub struct Model {
    inner: Rc<RefCell<ModelInner>>,
}

/// Non-owning model handle for subscriptions that must not keep the model
/// alive.
pub struct ModelWeak {
    inner: Weak<RefCell<ModelInner>>,
}

impl ModelWeak {
    pub fn upgrade(&self) -> Option<Model> {
        self.inner.upgrade().map(|inner| Model { inner })
    }
}

impl Default for Model {
    fn default() -> Self {
        Self::new()
    }
}

impl Model {
    pub fn new() -> Self {
        Self::from_spec(Rc::new(ModelSpec::new()), Value::Null)
    }

    /// A plain model seeded from raw attributes (an object value; anything
    /// else starts the model empty).
    pub fn with_attrs(attrs: Value) -> Self {
        Self::from_spec(Rc::new(ModelSpec::new()), attrs)
    }

    pub fn from_json(attrs: serde_json::Value) -> Self {
        Self::with_attrs(Value::from(attrs))
    }

    /// Construct against a blueprint: defaults fill missing keys, absent
    /// relation keys are auto-initialized, and the initial attributes run
    /// through the full `set` pipeline so relations coerce. `changed` is
    /// empty afterwards.
    pub fn from_spec(spec: Rc<ModelSpec>, attrs: Value) -> Self {
        let mut initial = match attrs {
            Value::Object(map) => map,
            _ => IndexMap::new(),
        };
        for (key, value) in &spec.defaults {
            if !initial.contains_key(key) {
                initial.insert(key.clone(), value.clone());
            }
        }
        for relation in &spec.relations {
            if !initial.contains_key(relation.key()) {
                initial.insert(relation.key().to_string(), relation.raw_placeholder());
            }
        }
        let model = Model {
            inner: Rc::new(RefCell::new(ModelInner {
                attributes: IndexMap::new(),
                spec,
                changed: IndexMap::new(),
                previous: None,
                emitter: Emitter::new(),
                listeners: Rc::new(ListenerRegistry::new()),
                computed_subs: HashMap::new(),
                phase: SetPhase::Idle,
                pending: VecDeque::new(),
                cid: next_cid(),
            })),
        };
        if !initial.is_empty() {
            model.set_impl(initial, SetOptions::default(), false);
        }
        model.inner.borrow_mut().changed.clear();
        model
    }

    pub fn same(&self, other: &Model) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn downgrade(&self) -> ModelWeak {
        ModelWeak {
            inner: Rc::downgrade(&self.inner),
        }
    }

    pub fn cid(&self) -> u64 {
        self.inner.borrow().cid
    }

    // Reads -----------------------------------------------------------------

    /// Resolve a keypath against the attributes; computed properties in the
    /// final position evaluate with their owning model as receiver.
    pub fn get(&self, path: &str) -> Option<Value> {
        deep::resolve(&Value::Model(self.clone()), path)
    }

    /// Value at `path` as of the start of the last outermost `set`.
    pub fn previous(&self, path: &str) -> Option<Value> {
        let previous = self.inner.borrow().previous.clone()?;
        deep::resolve(&Value::Object(previous), path)
    }

    /// Snapshot taken at the start of the last outermost `set`.
    pub fn previous_attributes(&self) -> Option<IndexMap<String, Value>> {
        self.inner.borrow().previous.clone()
    }

    /// Whether anything changed in the last `set` (or a specific path did).
    pub fn has_changed(&self, path: Option<&str>) -> bool {
        let inner = self.inner.borrow();
        match path {
            None => !inner.changed.is_empty(),
            Some(path) => inner.changed.contains_key(path),
        }
    }

    /// Without a diff: the changed-path map from the last `set`, or `None`
    /// when nothing changed. With a diff: the subset of its keys whose value
    /// differs from the pre-change (or current, outside a `set`) attributes.
    pub fn changed_attributes(
        &self,
        diff: Option<&IndexMap<String, Value>>,
    ) -> Option<IndexMap<String, Value>> {
        let inner = self.inner.borrow();
        match diff {
            None => {
                if inner.changed.is_empty() {
                    None
                } else {
                    Some(inner.changed.clone())
                }
            }
            Some(diff) => {
                let old = if inner.phase != SetPhase::Idle {
                    inner.previous.as_ref().unwrap_or(&inner.attributes)
                } else {
                    &inner.attributes
                };
                let mut out = IndexMap::new();
                for (key, value) in diff {
                    let old_value = old.get(key).cloned().unwrap_or(Value::Null);
                    if !raw_equal(&old_value, value) {
                        out.insert(key.clone(), value.clone());
                    }
                }
                if out.is_empty() {
                    None
                } else {
                    Some(out)
                }
            }
        }
    }

    // Writes ----------------------------------------------------------------

    pub fn set(&self, path: &str, value: impl Into<Value>) -> bool {
        self.set_with(path, value, SetOptions::default())
    }

    pub fn set_with(&self, path: &str, value: impl Into<Value>, options: SetOptions) -> bool {
        let mut entries = IndexMap::new();
        entries.insert(path.to_string(), value.into());
        self.set_entries(entries, options)
    }

    /// Erase `path` through the `set` pipeline (events included).
    pub fn unset(&self, path: &str) -> bool {
        self.set_with(
            path,
            Value::Null,
            SetOptions {
                unset: true,
                silent: false,
            },
        )
    }

    /// Set several keypaths in one call. Change events dedupe across the
    /// whole call; the aggregate `change` fires once per queued drain step.
    pub fn set_entries(&self, entries: IndexMap<String, Value>, options: SetOptions) -> bool {
        self.set_impl(entries, options, true)
    }

    fn set_impl(
        &self,
        entries: IndexMap<String, Value>,
        options: SetOptions,
        validate: bool,
    ) -> bool {
        if validate {
            let validator = self.inner.borrow().spec.validator.clone();
            if let Some(validator) = validator {
                if !validator(self, &entries) {
                    return false;
                }
            }
        }

        let was_changing = {
            let mut inner = self.inner.borrow_mut();
            let was = inner.phase != SetPhase::Idle;
            if !was {
                inner.previous = Some(inner.attributes.clone());
                inner.changed.clear();
                inner.phase = SetPhase::Accumulating;
            }
            was
        };
        let previous_root = Value::Object(
            self.inner
                .borrow()
                .previous
                .clone()
                .unwrap_or_default(),
        );

        let mut changes: Vec<String> = Vec::new();
        for (attr, value) in &entries {
            // (a) Does the committed value differ? Drives the event list.
            let current = self.get(attr).unwrap_or(Value::Null);
            if !raw_equal(&current, value) {
                changes.push(attr.clone());
                if let Value::Object(map) = value {
                    for (sub, _) in flatten_paths(map) {
                        changes.push(format!("{attr}.{sub}"));
                    }
                }
            }

            // (b) Does it differ from the outermost-set snapshot? Drives
            // the changed map.
            self.book_changed(&previous_root, attr, value);
            if let Value::Object(map) = value {
                for (sub, leaf) in flatten_paths(map) {
                    self.book_changed(&previous_root, &format!("{attr}.{sub}"), &leaf);
                }
            }

            // (d) Commit.
            if options.unset {
                deep::erase(self, attr);
            } else {
                deep::write(self, attr, value.clone());
            }
        }

        // Wildcard entries in the changed map, one per unique ancestor of
        // every changed leaf path, carrying the ancestor's current value.
        let leaf_paths: Vec<String> = {
            let inner = self.inner.borrow();
            inner
                .changed
                .keys()
                .filter(|path| !path.ends_with(".*"))
                .cloned()
                .collect()
        };
        for path in &leaf_paths {
            for ancestor in keypath::ancestors(path) {
                let value = self.get(&ancestor).unwrap_or(Value::Null);
                self.inner
                    .borrow_mut()
                    .changed
                    .insert(keypath::wildcard(&ancestor), value);
            }
        }

        if !options.silent {
            if !changes.is_empty() {
                self.inner.borrow_mut().pending.push_back(options);
            }
            let emitter = self.emitter();
            let mut already: HashSet<String> = HashSet::new();
            for path in &changes {
                if already.insert(path.clone()) {
                    let value = self.get(path).unwrap_or(Value::Null);
                    debug!(cid = self.cid(), path = %path, "trigger change:<path>");
                    emitter.trigger(
                        &format!("change:{path}"),
                        &EntityEvent::ChangePath {
                            model: self.clone(),
                            path: path.clone(),
                            value,
                        },
                    );
                }
                for ancestor in keypath::ancestors(path) {
                    let wildcard = keypath::wildcard(&ancestor);
                    if already.insert(wildcard.clone()) {
                        let value = self.get(&ancestor).unwrap_or(Value::Null);
                        debug!(cid = self.cid(), path = %wildcard, "trigger change:<wildcard>");
                        emitter.trigger(
                            &format!("change:{wildcard}"),
                            &EntityEvent::ChangePath {
                                model: self.clone(),
                                path: wildcard,
                                value,
                            },
                        );
                    }
                }
            }
        }

        self.computed_property_events(&entries);

        // Nested calls stop here; the outermost call drains the queue,
        // looping while handlers keep scheduling further changes.
        if was_changing {
            return true;
        }
        if !options.silent {
            loop {
                let queued = self.inner.borrow_mut().pending.pop_front();
                if queued.is_none() {
                    break;
                }
                self.inner.borrow_mut().phase = SetPhase::Draining;
                debug!(cid = self.cid(), "trigger change");
                let emitter = self.emitter();
                emitter.trigger("change", &EntityEvent::Change { model: self.clone() });
            }
        }
        {
            let mut inner = self.inner.borrow_mut();
            inner.pending.clear();
            inner.phase = SetPhase::Idle;
        }
        true
    }

    fn book_changed(&self, previous_root: &Value, path: &str, value: &Value) {
        let previous = deep::resolve(previous_root, path).unwrap_or(Value::Null);
        let mut inner = self.inner.borrow_mut();
        if raw_equal(&previous, value) {
            inner.changed.shift_remove(path);
        } else {
            inner.changed.insert(path.to_string(), value.clone());
        }
    }

    /// Maintain dependency subscriptions for every computed attribute in
    /// `entries`. Re-registering an attribute first drops its old
    /// subscriptions, so repeated sets never stack duplicates.
    fn computed_property_events(&self, entries: &IndexMap<String, Value>) {
        for (attr, value) in entries {
            let spec = match value {
                Value::Computed(spec) => spec.clone(),
                _ => continue,
            };
            let (listeners, old_ids) = {
                let mut inner = self.inner.borrow_mut();
                (
                    Rc::clone(&inner.listeners),
                    inner.computed_subs.remove(attr).unwrap_or_default(),
                )
            };
            for id in old_ids {
                listeners.stop_id(id);
            }
            let mut new_ids = Vec::new();
            for dependency in spec.dependencies() {
                let weak = self.downgrade();
                let attr_name = attr.clone();
                let spec = spec.clone();
                let handler = move |_: &str, _: &EntityEvent| {
                    let model = match weak.upgrade() {
                        Some(model) => model,
                        None => return,
                    };
                    let value = spec.call(&model);
                    let emitter = model.emitter();
                    emitter.trigger(
                        &format!("change:{attr_name}"),
                        &EntityEvent::ChangePath {
                            model: model.clone(),
                            path: attr_name.clone(),
                            value,
                        },
                    );
                };
                let id = match self.get(dependency) {
                    Some(Value::Collection(collection)) => listeners.listen(
                        &collection.emitter(),
                        "change reset add remove sort",
                        handler,
                    ),
                    Some(Value::Model(model)) => {
                        listeners.listen(&model.emitter(), "change", handler)
                    }
                    _ => listeners.listen(
                        &self.emitter(),
                        &format!("change:{dependency}"),
                        handler,
                    ),
                };
                new_ids.push(id);
            }
            self.inner
                .borrow_mut()
                .computed_subs
                .insert(attr.clone(), new_ids);
        }
    }

    // Serialization ---------------------------------------------------------

    /// Plain-JSON projection: relations serialize through their own
    /// `to_json` (an empty `{}`/`[]` when the key is absent), computed
    /// attributes are stripped.
    pub fn to_json(&self) -> serde_json::Value {
        let (attributes, relations) = {
            let inner = self.inner.borrow();
            (inner.attributes.clone(), inner.spec.relations.to_vec())
        };
        let mut out = serde_json::Map::new();
        for (key, value) in &attributes {
            if let Value::Computed(_) = value {
                continue;
            }
            out.insert(key.clone(), value.to_json());
        }
        for relation in &relations {
            if !out.contains_key(relation.key()) {
                let empty = if relation.is_collection() {
                    serde_json::Value::Array(Vec::new())
                } else {
                    serde_json::Value::Object(serde_json::Map::new())
                };
                out.insert(relation.key().to_string(), empty);
            }
        }
        serde_json::Value::Object(out)
    }

    // Events ----------------------------------------------------------------

    pub fn emitter(&self) -> Emitter<EntityEvent> {
        self.inner.borrow().emitter.clone()
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

    /// Emit a custom event through this model's emitter.
    pub fn trigger(&self, event: &str, payload: &EntityEvent) {
        self.emitter().trigger(event, payload);
    }

    /// Subscribe to another emitter, remembering the subscription for
    /// [`Model::stop_listening`].
    pub fn listen_to(
        &self,
        emitter: &Emitter<EntityEvent>,
        events: &str,
        handler: impl Fn(&str, &EntityEvent) + 'static,
    ) -> SubscriptionId {
        let listeners = Rc::clone(&self.inner.borrow().listeners);
        listeners.listen(emitter, events, handler)
    }

    /// Release every subscription this model initiated on other objects.
    pub fn stop_listening(&self) {
        let listeners = Rc::clone(&self.inner.borrow().listeners);
        listeners.stop();
        self.inner.borrow_mut().computed_subs.clear();
    }

    // Raw access (keypath traversal) ----------------------------------------

    pub(crate) fn raw_attr(&self, key: &str) -> Option<Value> {
        self.inner.borrow().attributes.get(key).cloned()
    }

    pub(crate) fn raw_set_attr(&self, key: &str, value: Value) {
        self.inner
            .borrow_mut()
            .attributes
            .insert(key.to_string(), value);
    }

    pub(crate) fn raw_remove_attr(&self, key: &str) {
        self.inner.borrow_mut().attributes.shift_remove(key);
    }

    pub(crate) fn raw_attributes(&self) -> IndexMap<String, Value> {
        self.inner.borrow().attributes.clone()
    }

    pub(crate) fn with_raw_attrs_mut<R>(
        &self,
        f: impl FnOnce(&mut IndexMap<String, Value>) -> R,
    ) -> R {
        let mut inner = self.inner.borrow_mut();
        f(&mut inner.attributes)
    }

    /// The relation declared for `key`, if any.
    pub fn relation_for(&self, key: &str) -> Option<Relation> {
        self.inner
            .borrow()
            .spec
            .relations
            .iter()
            .find(|relation| relation.key() == key)
            .cloned()
    }
}
