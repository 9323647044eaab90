//! Collection matrix: ordered membership, single-event mutations, and the
//! splice-based move.

use std::cell::RefCell;
use std::rc::Rc;

use proptest::prelude::*;
use serde_json::json;
use woodhouse_core::{Collection, Model, Value};

fn collection_of(names: &[&str]) -> Collection {
    let members: Vec<serde_json::Value> = names.iter().map(|n| json!({"name": n})).collect();
    Collection::from_value(Value::from(serde_json::Value::Array(members)))
}

fn names(collection: &Collection) -> Vec<String> {
    collection
        .models()
        .iter()
        .map(|m| m.to_json()["name"].as_str().unwrap_or_default().to_string())
        .collect()
}

fn count_events(collection: &Collection, events: &str) -> Rc<RefCell<Vec<String>>> {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    collection.on(events, move |name, _| sink.borrow_mut().push(name.to_string()));
    seen
}

// ---------------------------------------------------------------------------
// move
// ---------------------------------------------------------------------------

#[test]
fn move_reorders_with_exactly_one_sort_event() {
    let collection = collection_of(&["A", "B", "C", "D", "E"]);
    let seen = count_events(&collection, "add remove reset sort");

    collection.move_item(1, 3);

    assert_eq!(names(&collection), vec!["A", "C", "D", "E", "B"]);
    assert_eq!(seen.borrow().as_slice(), &["sort"]);
}

#[test]
fn move_out_of_bounds_is_a_no_op() {
    let collection = collection_of(&["A", "B"]);
    let seen = count_events(&collection, "all");
    collection.move_item(5, 0);
    assert_eq!(names(&collection), vec!["A", "B"]);
    assert!(seen.borrow().is_empty());
}

proptest! {
    /// `move_item` agrees with a plain remove-then-insert on a vector.
    #[test]
    fn move_matches_the_reference_splice(len in 1usize..8, from in 0usize..8, to in 0usize..8) {
        prop_assume!(from < len);
        let labels: Vec<String> = (0..len).map(|i| format!("m{i}")).collect();
        let labels_ref: Vec<&str> = labels.iter().map(String::as_str).collect();
        let collection = collection_of(&labels_ref);

        let mut reference = labels.clone();
        let moved = reference.remove(from);
        let slot = to.min(reference.len());
        reference.insert(slot, moved);

        collection.move_item(from, to);
        prop_assert_eq!(names(&collection), reference);
    }
}

// ---------------------------------------------------------------------------
// add / remove / reset
// ---------------------------------------------------------------------------

#[test]
fn add_and_remove_report_indices() {
    let collection = collection_of(&["A", "B"]);
    let indices = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&indices);
    collection.on("add remove", move |name, event| {
        sink.borrow_mut()
            .push((name.to_string(), event.index().expect("indexed event")));
    });

    collection.add_at(Model::from_json(json!({"name": "X"})), 1);
    collection.remove_at(0);

    assert_eq!(names(&collection), vec!["X", "B"]);
    assert_eq!(
        indices.borrow().as_slice(),
        &[("add".to_string(), 1), ("remove".to_string(), 0)]
    );
}

#[test]
fn remove_by_identity_finds_the_member() {
    let collection = collection_of(&["A", "B", "C"]);
    let member = collection.at(1).expect("member exists");
    assert!(collection.remove(&member));
    assert!(!collection.remove(&member));
    assert_eq!(names(&collection), vec!["A", "C"]);
}

#[test]
fn reset_replaces_membership_with_one_event() {
    let collection = collection_of(&["A", "B"]);
    let seen = count_events(&collection, "all");

    collection.reset(Value::from(json!([{"name": "Z"}])));

    assert_eq!(names(&collection), vec!["Z"]);
    assert_eq!(seen.borrow().as_slice(), &["reset"]);
}

#[test]
fn to_json_projects_members_in_order() {
    let collection = collection_of(&["A", "B"]);
    assert_eq!(
        collection.to_json(),
        json!([{"name": "A"}, {"name": "B"}])
    );
}
