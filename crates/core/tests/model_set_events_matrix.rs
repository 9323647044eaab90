//! Deep `set` pipeline matrix: per-path change events, wildcard ancestor
//! fan-out, dedup across one call, changed/previous bookkeeping, and the
//! re-entrant drain loop.

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;
use serde_json::json;
use woodhouse_core::{Model, ModelSpec, SetOptions, Value};

fn record_events(model: &Model, events: &str) -> Rc<RefCell<Vec<String>>> {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    model.on(events, move |name, _| sink.borrow_mut().push(name.to_string()));
    seen
}

fn get_json(model: &Model, path: &str) -> serde_json::Value {
    model
        .get(path)
        .map(|v| v.to_json())
        .unwrap_or(serde_json::Value::Null)
}

// ---------------------------------------------------------------------------
// Event fan-out
// ---------------------------------------------------------------------------

#[test]
fn deep_set_fires_leaf_then_every_ancestor_wildcard_once() {
    let model = Model::from_json(json!({"a": {"b": {"c": 1}}}));
    let seen = record_events(&model, "change:a.b.c change:a.b.* change:a.* change");

    assert!(model.set("a.b.c", 5));
    assert_eq!(
        seen.borrow().as_slice(),
        &["change:a.b.c", "change:a.b.*", "change:a.*", "change"]
    );
    assert_eq!(get_json(&model, "a.b.c"), json!(5));
}

#[test]
fn sibling_leaves_share_one_wildcard_per_ancestor() {
    let model = Model::from_json(json!({"a": {"b": 1, "c": 2}}));
    let seen = record_events(&model, "all");

    let mut entries = IndexMap::new();
    entries.insert("a.b".to_string(), Value::from(10i64));
    entries.insert("a.c".to_string(), Value::from(20i64));
    assert!(model.set_entries(entries, SetOptions::default()));

    assert_eq!(
        seen.borrow().as_slice(),
        &["change:a.b", "change:a.*", "change:a.c", "change"]
    );
}

#[test]
fn nested_object_value_marks_each_sub_path_changed() {
    let model = Model::from_json(json!({"a": {"b": 1}}));
    let seen = record_events(&model, "all");

    assert!(model.set("a", Value::from(json!({"b": 2}))));
    assert_eq!(
        seen.borrow().as_slice(),
        &["change:a", "change:a.b", "change:a.*", "change"]
    );
}

#[test]
fn unchanged_value_fires_nothing() {
    let model = Model::from_json(json!({"a": {"b": 1}}));
    let seen = record_events(&model, "all");

    assert!(model.set("a.b", 1i64));
    assert!(seen.borrow().is_empty());
    assert!(!model.has_changed(None));
}

#[test]
fn silent_set_mutates_without_events() {
    let model = Model::from_json(json!({"x": 1}));
    let seen = record_events(&model, "all");

    assert!(model.set_with(
        "x",
        2i64,
        SetOptions {
            silent: true,
            unset: false,
        }
    ));
    assert!(seen.borrow().is_empty());
    assert_eq!(get_json(&model, "x"), json!(2));
    assert!(model.has_changed(Some("x")));
}

#[test]
fn unset_erases_and_notifies() {
    let model = Model::from_json(json!({"a": {"b": 1}}));
    let seen = record_events(&model, "all");

    assert!(model.unset("a.b"));
    assert_eq!(
        seen.borrow().as_slice(),
        &["change:a.b", "change:a.*", "change"]
    );
    assert_eq!(model.get("a.b"), None);
    assert_eq!(get_json(&model, "a"), json!({}));
}

// ---------------------------------------------------------------------------
// changed / previous bookkeeping
// ---------------------------------------------------------------------------

#[test]
fn changed_map_holds_leaf_and_wildcard_paths() {
    let model = Model::from_json(json!({"a": {"b": 1}}));
    assert!(model.set("a.b", 2i64));

    let changed = model.changed_attributes(None).expect("something changed");
    let keys: Vec<&str> = changed.keys().map(String::as_str).collect();
    assert_eq!(keys, vec!["a.b", "a.*"]);
    assert_eq!(changed["a.b"].to_json(), json!(2));
    assert_eq!(changed["a.*"].to_json(), json!({"b": 2}));

    assert!(model.has_changed(None));
    assert!(model.has_changed(Some("a.b")));
    assert!(model.has_changed(Some("a.*")));
    assert!(!model.has_changed(Some("a")));
}

#[test]
fn previous_reads_the_outermost_snapshot() {
    let model = Model::from_json(json!({"a": {"b": 1}}));
    assert!(model.set("a.b", 2i64));

    assert_eq!(model.previous("a.b").map(|v| v.to_json()), Some(json!(1)));
    let previous = model.previous_attributes().expect("snapshot exists");
    assert_eq!(Value::Object(previous).to_json(), json!({"a": {"b": 1}}));
    assert_eq!(get_json(&model, "a.b"), json!(2));
}

#[test]
fn changed_attributes_diff_filters_to_actual_differences() {
    let model = Model::from_json(json!({"x": 1, "y": 2}));

    let mut diff = IndexMap::new();
    diff.insert("x".to_string(), Value::from(1i64));
    diff.insert("y".to_string(), Value::from(5i64));
    let out = model
        .changed_attributes(Some(&diff))
        .expect("y differs from current");
    assert_eq!(out.len(), 1);
    assert_eq!(out["y"].to_json(), json!(5));

    let mut same = IndexMap::new();
    same.insert("x".to_string(), Value::from(1i64));
    assert!(model.changed_attributes(Some(&same)).is_none());
}

#[test]
fn reverting_within_one_set_clears_the_leaf_entry() {
    let model = Model::from_json(json!({"x": 1}));
    let hook = model.clone();
    // The change handler immediately writes the snapshot value back.
    model.on("change:x", move |_, _| {
        hook.set("x", 1i64);
    });

    assert!(model.set("x", 2i64));
    assert_eq!(get_json(&model, "x"), json!(1));
    assert!(!model.has_changed(Some("x")));
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

#[test]
fn validation_failure_blocks_mutation_and_events() {
    let spec = ModelSpec::new().validator(|_, entries| !entries.contains_key("locked"));
    let model = Model::from_spec(Rc::new(spec), Value::from(json!({"open": 1})));
    let seen = record_events(&model, "all");

    assert!(!model.set("locked", 9i64));
    assert!(seen.borrow().is_empty());
    assert_eq!(model.get("locked"), None);

    assert!(model.set("open", 2i64));
    assert_eq!(get_json(&model, "open"), json!(2));
}

// ---------------------------------------------------------------------------
// Re-entrancy: drain-to-fixpoint
// ---------------------------------------------------------------------------

#[test]
fn nested_sets_defer_aggregate_change_to_the_outermost_call() {
    let model = Model::from_json(json!({"count": 0}));
    let seen = record_events(&model, "all");
    let chained = model.clone();
    model.on("change:count", move |_, event| {
        let current = event
            .change_value()
            .and_then(|v| v.to_json().as_i64())
            .unwrap_or(0);
        if current < 3 {
            chained.set("count", current + 1);
        }
    });

    assert!(model.set("count", 1i64));
    assert_eq!(get_json(&model, "count"), json!(3));

    // Every per-path event precedes every aggregate change, and the drain
    // emits one aggregate per queued set call.
    let events = seen.borrow();
    let first_aggregate = events.iter().position(|e| e == "change").expect("drained");
    assert!(events[..first_aggregate]
        .iter()
        .all(|e| e.starts_with("change:")));
    assert_eq!(events.iter().filter(|e| *e == "change").count(), 3);
    assert_eq!(
        events.iter().filter(|e| *e == "change:count").count(),
        3
    );
}

#[test]
fn handler_writing_a_sibling_lands_in_the_same_cycle() {
    let model = Model::from_json(json!({"a": 1, "b": 1}));
    let mirror = model.clone();
    model.on("change:a", move |_, _| {
        mirror.set("b", 2i64);
    });
    let seen = record_events(&model, "change");

    assert!(model.set("a", 2i64));
    assert_eq!(get_json(&model, "b"), json!(2));
    assert_eq!(seen.borrow().len(), 2);
    assert!(model.has_changed(Some("a")));
    assert!(model.has_changed(Some("b")));
}

// ---------------------------------------------------------------------------
// Round-trips
// ---------------------------------------------------------------------------

#[test]
fn set_get_roundtrip_scalar_nested_and_indexed() {
    let model = Model::new();
    assert!(model.set("plain", "hello"));
    assert!(model.set("deep.nested.key", 7i64));
    assert!(model.set("list.0", "first"));

    assert_eq!(get_json(&model, "plain"), json!("hello"));
    assert_eq!(get_json(&model, "deep.nested.key"), json!(7));
    assert_eq!(get_json(&model, "deep"), json!({"nested": {"key": 7}}));
    // A digit segment vivifies a sequence, not a map.
    assert_eq!(get_json(&model, "list"), json!(["first"]));
}

#[test]
fn resolution_stops_silently_at_missing_intermediates() {
    let model = Model::from_json(json!({"a": {"b": null}}));
    assert_eq!(model.get("a.missing.deep"), None);
    assert_eq!(model.get("a.b.deep"), None);
    assert_eq!(model.get(""), None);
}
