//! Keypath traversal over mixed trees of plain data, models, and
//! collections.
//!
//! Resolution walks segment by segment with short-lived borrows only, so a
//! computed property evaluated at the end of a path is free to read the
//! model again. Writes run in two phases: plain-data mutation happens under
//! one borrow of the owning model's attributes, while anything that can
//! re-enter the event pipeline (relation coercion, delegated `set`,
//! collection resets) runs with every borrow released.

use indexmap::IndexMap;

use woodhouse_keypath as keypath;

use crate::{Collection, Model, Relation, RelationTarget, Value};

/// Resolve `path` against `root`. Returns `None` the moment a segment is
/// missing or a non-final segment resolves to null. A computed spec in the
/// final position is evaluated with the nearest enclosing model as receiver.
pub fn resolve(root: &Value, path: &str) -> Option<Value> {
    let segments = keypath::split(path);
    let mut receiver = match root {
        Value::Model(model) => Some(model.clone()),
        _ => None,
    };
    let mut current = root.clone();
    for (i, segment) in segments.iter().copied().enumerate() {
        let next = step(&current, segment)?;
        if i + 1 < segments.len() {
            if next.is_null() {
                return None;
            }
            if let Value::Model(model) = &next {
                receiver = Some(model.clone());
            }
        }
        current = next;
    }
    if let Value::Computed(spec) = &current {
        if let Some(model) = &receiver {
            return Some(spec.call(model));
        }
    }
    Some(current)
}

/// Like [`resolve`], but a computed spec in the final position is returned
/// as-is instead of being evaluated. Lets callers distinguish a computed
/// keypath (not writable from a view) from its current value.
pub fn resolve_raw(root: &Value, path: &str) -> Option<Value> {
    let segments = keypath::split(path);
    let mut current = root.clone();
    for (i, segment) in segments.iter().copied().enumerate() {
        let next = step(&current, segment)?;
        if i + 1 < segments.len() && next.is_null() {
            return None;
        }
        current = next;
    }
    Some(current)
}

fn step(current: &Value, segment: &str) -> Option<Value> {
    match current {
        Value::Model(model) => model.raw_attr(segment),
        Value::Collection(collection) => segment
            .parse::<usize>()
            .ok()
            .and_then(|index| collection.at(index))
            .map(Value::Model),
        Value::Object(map) => map.get(segment).cloned(),
        Value::Array(items) => segment
            .parse::<usize>()
            .ok()
            .and_then(|index| items.get(index))
            .cloned(),
        _ => None,
    }
}

/// Write `value` at `path` under `model`, vivifying missing intermediates
/// and honoring relation declarations at each model boundary.
pub fn write(model: &Model, path: &str, value: Value) {
    let segments: Vec<String> = keypath::split(path)
        .into_iter()
        .map(str::to_string)
        .collect();
    write_model(model, &segments, value);
}

/// Write `value` at `path` under a collection root (the first segment must
/// be a member index).
pub fn write_in_collection(collection: &Collection, path: &str, value: Value) {
    let segments: Vec<String> = keypath::split(path)
        .into_iter()
        .map(str::to_string)
        .collect();
    write_collection(collection, &segments, value);
}

/// Remove the attribute at `path` under `model`. Removing a collection
/// member emits that collection's `remove`; everything else is silent.
pub fn erase(model: &Model, path: &str) {
    let segments: Vec<String> = keypath::split(path)
        .into_iter()
        .map(str::to_string)
        .collect();
    erase_model(model, &segments);
}

// Write ---------------------------------------------------------------------

/// Continuation for work that must run with no attribute borrow held.
enum PlainOutcome {
    Done,
    DiveModel(Model, Vec<String>, Value),
    DiveCollection(Collection, Vec<String>, Value),
    DelegateModel(Model, Value),
    DelegateCollection(Collection, Value),
}

fn write_model(model: &Model, segments: &[String], value: Value) {
    let key = &segments[0];
    let relation = model.relation_for(key);
    if segments.len() == 1 {
        write_model_terminal(model, key, relation, value);
        return;
    }
    match model.raw_attr(key) {
        Some(Value::Model(nested)) => write_model(&nested, &segments[1..], value),
        Some(Value::Collection(nested)) => write_collection(&nested, &segments[1..], value),
        Some(Value::Object(_)) | Some(Value::Array(_)) => {
            run_plain(model, segments, value);
        }
        _ => match relation {
            Some(relation) => {
                let fresh = relation.instantiate_empty();
                model.raw_set_attr(key, fresh.clone());
                match fresh {
                    Value::Model(nested) => write_model(&nested, &segments[1..], value),
                    Value::Collection(nested) => write_collection(&nested, &segments[1..], value),
                    _ => {}
                }
            }
            None => {
                model.raw_set_attr(key, placeholder_for(&segments[1]));
                run_plain(model, segments, value);
            }
        },
    }
}

fn placeholder_for(next_segment: &str) -> Value {
    if keypath::is_index(next_segment) {
        Value::Array(Vec::new())
    } else {
        Value::Object(IndexMap::new())
    }
}

fn run_plain(model: &Model, segments: &[String], value: Value) {
    let outcome = model.with_raw_attrs_mut(|attrs| write_into_map(attrs, segments, value));
    match outcome {
        PlainOutcome::Done => {}
        PlainOutcome::DiveModel(nested, rest, value) => write_model(&nested, &rest, value),
        PlainOutcome::DiveCollection(nested, rest, value) => {
            write_collection(&nested, &rest, value)
        }
        PlainOutcome::DelegateModel(nested, value) => delegate_model_set(&nested, value),
        PlainOutcome::DelegateCollection(nested, value) => nested.reset(value),
    }
}

fn write_model_terminal(model: &Model, key: &str, relation: Option<Relation>, value: Value) {
    match relation {
        Some(relation) => match relation.target() {
            RelationTarget::Model(factory) => {
                let raw = unwrap_model_raw(value);
                match model.raw_attr(key) {
                    Some(Value::Model(existing)) => delegate_model_set(&existing, raw),
                    _ => {
                        let fresh = factory(raw);
                        model.raw_set_attr(key, Value::Model(fresh));
                    }
                }
            }
            RelationTarget::Collection(factory) => {
                let raw = unwrap_collection_raw(value);
                match model.raw_attr(key) {
                    Some(Value::Collection(existing)) => existing.reset(raw),
                    _ => {
                        let fresh = factory(raw);
                        model.raw_set_attr(key, Value::Collection(fresh));
                    }
                }
            }
        },
        None => match model.raw_attr(key) {
            Some(Value::Model(existing))
                if matches!(value, Value::Object(_) | Value::Model(_)) =>
            {
                delegate_model_set(&existing, value)
            }
            Some(Value::Collection(existing))
                if matches!(value, Value::Array(_) | Value::Collection(_)) =>
            {
                existing.reset(value)
            }
            _ => model.raw_set_attr(key, value),
        },
    }
}

fn delegate_model_set(model: &Model, value: Value) {
    match value {
        Value::Object(map) => {
            model.set_entries(map, Default::default());
        }
        Value::Model(other) => {
            model.set_entries(other.raw_attributes(), Default::default());
        }
        _ => {}
    }
}

fn unwrap_model_raw(value: Value) -> Value {
    match value {
        Value::Model(model) => Value::Object(model.raw_attributes()),
        other => other,
    }
}

fn unwrap_collection_raw(value: Value) -> Value {
    match value {
        Value::Collection(collection) => Value::Array(
            collection
                .models()
                .into_iter()
                .map(Value::Model)
                .collect(),
        ),
        other => other,
    }
}

fn write_collection(collection: &Collection, segments: &[String], value: Value) {
    let index = match segments[0].parse::<usize>() {
        Ok(index) => index,
        Err(_) => return,
    };
    let member = match collection.at(index) {
        Some(member) => member,
        None => return,
    };
    if segments.len() == 1 {
        match value {
            Value::Object(_) | Value::Model(_) => delegate_model_set(&member, value),
            other => {
                let replacement = collection.make_member(other);
                collection.raw_replace_at(index, replacement);
            }
        }
    } else {
        write_model(&member, &segments[1..], value);
    }
}

fn write_into_map(
    map: &mut IndexMap<String, Value>,
    segments: &[String],
    value: Value,
) -> PlainOutcome {
    let key = &segments[0];
    if segments.len() == 1 {
        return match map.get(key) {
            Some(Value::Model(existing))
                if matches!(value, Value::Object(_) | Value::Model(_)) =>
            {
                PlainOutcome::DelegateModel(existing.clone(), value)
            }
            Some(Value::Collection(existing))
                if matches!(value, Value::Array(_) | Value::Collection(_)) =>
            {
                PlainOutcome::DelegateCollection(existing.clone(), value)
            }
            _ => {
                map.insert(key.clone(), value);
                PlainOutcome::Done
            }
        };
    }
    let vivify = !matches!(
        map.get(key),
        Some(Value::Object(_) | Value::Array(_) | Value::Model(_) | Value::Collection(_))
    );
    if vivify {
        map.insert(key.clone(), placeholder_for(&segments[1]));
    }
    match map.get_mut(key).expect("slot just ensured") {
        Value::Model(nested) => PlainOutcome::DiveModel(nested.clone(), segments[1..].to_vec(), value),
        Value::Collection(nested) => {
            PlainOutcome::DiveCollection(nested.clone(), segments[1..].to_vec(), value)
        }
        plain => write_into(plain, &segments[1..], value),
    }
}

fn write_into(container: &mut Value, segments: &[String], value: Value) -> PlainOutcome {
    match container {
        Value::Object(map) => write_into_map(map, segments, value),
        Value::Array(items) => {
            let key = &segments[0];
            let index = match key.parse::<usize>() {
                Ok(index) => index,
                Err(_) => return PlainOutcome::Done,
            };
            if index >= items.len() {
                items.resize(index + 1, Value::Null);
            }
            if segments.len() == 1 {
                return match &items[index] {
                    Value::Model(existing)
                        if matches!(value, Value::Object(_) | Value::Model(_)) =>
                    {
                        PlainOutcome::DelegateModel(existing.clone(), value)
                    }
                    Value::Collection(existing)
                        if matches!(value, Value::Array(_) | Value::Collection(_)) =>
                    {
                        PlainOutcome::DelegateCollection(existing.clone(), value)
                    }
                    _ => {
                        items[index] = value;
                        PlainOutcome::Done
                    }
                };
            }
            let vivify = !matches!(
                items[index],
                Value::Object(_) | Value::Array(_) | Value::Model(_) | Value::Collection(_)
            );
            if vivify {
                items[index] = placeholder_for(&segments[1]);
            }
            match &mut items[index] {
                Value::Model(nested) => {
                    PlainOutcome::DiveModel(nested.clone(), segments[1..].to_vec(), value)
                }
                Value::Collection(nested) => {
                    PlainOutcome::DiveCollection(nested.clone(), segments[1..].to_vec(), value)
                }
                plain => write_into(plain, &segments[1..], value),
            }
        }
        _ => PlainOutcome::Done,
    }
}

// Erase ---------------------------------------------------------------------

enum EraseOutcome {
    Done,
    DiveModel(Model, Vec<String>),
    DiveCollection(Collection, Vec<String>),
}

fn erase_model(model: &Model, segments: &[String]) {
    let key = &segments[0];
    if segments.len() == 1 {
        model.raw_remove_attr(key);
        return;
    }
    match model.raw_attr(key) {
        Some(Value::Model(nested)) => erase_model(&nested, &segments[1..]),
        Some(Value::Collection(nested)) => erase_collection(&nested, &segments[1..]),
        Some(Value::Object(_)) | Some(Value::Array(_)) => {
            let outcome = model.with_raw_attrs_mut(|attrs| erase_into_map(attrs, segments));
            match outcome {
                EraseOutcome::Done => {}
                EraseOutcome::DiveModel(nested, rest) => erase_model(&nested, &rest),
                EraseOutcome::DiveCollection(nested, rest) => erase_collection(&nested, &rest),
            }
        }
        _ => {}
    }
}

fn erase_collection(collection: &Collection, segments: &[String]) {
    let index = match segments[0].parse::<usize>() {
        Ok(index) => index,
        Err(_) => return,
    };
    if segments.len() == 1 {
        collection.remove_at(index);
    } else if let Some(member) = collection.at(index) {
        erase_model(&member, &segments[1..]);
    }
}

fn erase_into_map(map: &mut IndexMap<String, Value>, segments: &[String]) -> EraseOutcome {
    let key = &segments[0];
    if segments.len() == 1 {
        map.shift_remove(key);
        return EraseOutcome::Done;
    }
    match map.get_mut(key) {
        Some(Value::Model(nested)) => EraseOutcome::DiveModel(nested.clone(), segments[1..].to_vec()),
        Some(Value::Collection(nested)) => {
            EraseOutcome::DiveCollection(nested.clone(), segments[1..].to_vec())
        }
        Some(plain @ (Value::Object(_) | Value::Array(_))) => erase_into(plain, &segments[1..]),
        _ => EraseOutcome::Done,
    }
}

fn erase_into(container: &mut Value, segments: &[String]) -> EraseOutcome {
    match container {
        Value::Object(map) => erase_into_map(map, segments),
        Value::Array(items) => {
            let index = match segments[0].parse::<usize>() {
                Ok(index) => index,
                Err(_) => return EraseOutcome::Done,
            };
            if index >= items.len() {
                return EraseOutcome::Done;
            }
            if segments.len() == 1 {
                items.remove(index);
                return EraseOutcome::Done;
            }
            match &mut items[index] {
                Value::Model(nested) => {
                    EraseOutcome::DiveModel(nested.clone(), segments[1..].to_vec())
                }
                Value::Collection(nested) => {
                    EraseOutcome::DiveCollection(nested.clone(), segments[1..].to_vec())
                }
                plain @ (Value::Object(_) | Value::Array(_)) => erase_into(plain, &segments[1..]),
                _ => EraseOutcome::Done,
            }
        }
        _ => EraseOutcome::Done,
    }
}
