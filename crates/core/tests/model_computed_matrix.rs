//! Computed-property matrix: evaluation through `get`, dependency
//! re-broadcast, subscription dedup, and JSON stripping.

use std::cell::RefCell;
use std::rc::Rc;

use serde_json::json;
use woodhouse_core::{ComputedSpec, Model, ModelSpec, Relation, Value};

fn full_name_spec() -> Value {
    Value::Computed(ComputedSpec::with_dependencies(
        |model: &Model| {
            let first = model
                .get("first")
                .map(|v| v.display_text())
                .unwrap_or_default();
            let last = model
                .get("last")
                .map(|v| v.display_text())
                .unwrap_or_default();
            Value::String(format!("{first} {last}"))
        },
        &["first", "last"],
    ))
}

#[test]
fn get_evaluates_with_the_owning_model_as_receiver() {
    let model = Model::from_json(json!({"first": "Sterling", "last": "Archer"}));
    assert!(model.set("full", full_name_spec()));
    assert_eq!(
        model.get("full").map(|v| v.to_json()),
        Some(json!("Sterling Archer"))
    );
}

#[test]
fn dependency_change_rebroadcasts_the_computed_value() {
    let model = Model::from_json(json!({"first": "Sterling", "last": "Archer"}));
    assert!(model.set("full", full_name_spec()));

    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    model.on("change:full", move |_, event| {
        let value = event
            .change_value()
            .map(|v| v.display_text())
            .unwrap_or_default();
        sink.borrow_mut().push(value);
    });

    assert!(model.set("first", "Lana"));
    assert!(model.set("last", "Kane"));
    assert_eq!(seen.borrow().as_slice(), &["Lana Archer", "Lana Kane"]);
}

#[test]
fn repeated_registration_does_not_stack_subscriptions() {
    let model = Model::from_json(json!({"first": "a", "last": "b"}));
    assert!(model.set("full", full_name_spec()));
    let baseline = model.listener_count();

    // Setting the computed attribute again re-registers its dependencies.
    assert!(model.set("full", full_name_spec()));
    assert!(model.set("full", full_name_spec()));
    assert_eq!(model.listener_count(), baseline);

    let fires = Rc::new(RefCell::new(0));
    let sink = Rc::clone(&fires);
    model.on("change:full", move |_, _| *sink.borrow_mut() += 1);
    assert!(model.set("first", "z"));
    assert_eq!(*fires.borrow(), 1);
}

#[test]
fn collection_dependency_reacts_to_membership_events() {
    let spec = Rc::new(ModelSpec::new().relation(Relation::collection("items")));
    let model = Model::from_spec(spec, Value::Null);
    assert!(model.set(
        "count",
        Value::Computed(ComputedSpec::with_dependencies(
            |model: &Model| {
                let len = match model.get("items") {
                    Some(Value::Collection(items)) => items.len(),
                    _ => 0,
                };
                Value::from(len as i64)
            },
            &["items"],
        ))
    ));

    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    model.on("change:count", move |_, event| {
        sink.borrow_mut()
            .push(event.change_value().map(|v| v.to_json()).unwrap_or_default());
    });

    let items = match model.get("items") {
        Some(Value::Collection(items)) => items,
        _ => unreachable!("relation auto-initialized"),
    };
    items.add(Model::from_json(json!({"sku": "a"})));
    items.add(Model::from_json(json!({"sku": "b"})));
    items.remove_at(0);
    assert_eq!(seen.borrow().as_slice(), &[json!(1), json!(2), json!(1)]);
}

#[test]
fn computed_attributes_are_stripped_from_json() {
    let model = Model::from_json(json!({"first": "a", "last": "b"}));
    assert!(model.set("full", full_name_spec()));
    assert_eq!(model.to_json(), json!({"first": "a", "last": "b"}));
}

#[test]
fn computed_keypath_is_visible_raw_but_evaluated_through_get() {
    let model = Model::from_json(json!({"first": "a", "last": "b"}));
    assert!(model.set("full", full_name_spec()));

    assert!(matches!(
        woodhouse_core::deep::resolve_raw(&Value::Model(model.clone()), "full"),
        Some(Value::Computed(_))
    ));
    assert!(matches!(model.get("full"), Some(Value::String(_))));
}
