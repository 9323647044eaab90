//! Binding-engine matrix: every directive, both data directions, scope
//! nesting, and the no-leak teardown guarantees.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use serde_json::json;
use woodhouse_core::{Collection, ComputedSpec, Model, ModelSpec, Relation, Value};
use woodhouse_view::{HandlerArgs, Transformers, View, ViewConfig};

fn static_template(markup: &'static str) -> impl Fn(&serde_json::Value) -> String {
    move |_| markup.to_string()
}

fn view_with(model: &Model, markup: &'static str) -> View {
    ViewConfig::new()
        .model(model.clone())
        .template(static_template(markup))
        .build()
}

fn list_spec() -> Rc<ModelSpec> {
    Rc::new(ModelSpec::new().relation(Relation::collection("items")))
}

fn items_of(model: &Model) -> Collection {
    match model.get("items") {
        Some(Value::Collection(items)) => items,
        _ => unreachable!("items relation"),
    }
}

fn li_texts(view: &View) -> Vec<String> {
    let ul = view.el().first_element_child().expect("list container");
    ul.children().iter().map(|li| li.text()).collect()
}

// ---------------------------------------------------------------------------
// bind-text / bind-html
// ---------------------------------------------------------------------------

#[test]
fn bind_text_syncs_both_directions() {
    let model = Model::from_json(json!({"name": "Archer"}));
    let view = view_with(&model, r#"<span bind-text="name"></span>"#);
    view.render().expect("render succeeds");

    let span = view.el().first_element_child().expect("span bound");
    assert_eq!(span.text(), "Archer");
    assert_eq!(span.attr("bind-text"), None, "directive attr consumed");

    model.set("name", "Lana");
    assert_eq!(span.text(), "Lana");

    span.set_text("Cyril");
    span.trigger("input");
    assert_eq!(model.get("name").map(|v| v.to_json()), Some(json!("Cyril")));
}

#[test]
fn bind_html_writes_markup_content() {
    let model = Model::from_json(json!({"body": "<b>hi</b>"}));
    let view = view_with(&model, r#"<div bind-html="body"></div>"#);
    view.render().expect("render succeeds");

    let div = view.el().first_element_child().expect("div bound");
    assert_eq!(div.html(), "<b>hi</b>");
    assert_eq!(div.text(), "hi");
}

#[test]
fn computed_keypaths_are_not_writable_from_the_view() {
    let model = Model::from_json(json!({"first": "a", "last": "b"}));
    model.set(
        "full",
        Value::Computed(ComputedSpec::with_dependencies(
            |m: &Model| {
                Value::String(format!(
                    "{} {}",
                    m.get("first").map(|v| v.display_text()).unwrap_or_default(),
                    m.get("last").map(|v| v.display_text()).unwrap_or_default()
                ))
            },
            &["first", "last"],
        )),
    );
    let view = view_with(&model, r#"<span bind-text="full"></span>"#);
    view.render().expect("render succeeds");

    let span = view.el().first_element_child().expect("span bound");
    assert_eq!(span.text(), "a b");

    span.set_text("overwritten");
    span.trigger("input");
    // The computed attribute survived the input event.
    assert_eq!(model.get("full").map(|v| v.display_text()), Some("a b".into()));
}

#[test]
fn model_to_view_skips_redundant_writes() {
    let model = Model::from_json(json!({"name": "x"}));
    let view = view_with(&model, r#"<span bind-text="name"></span>"#);
    view.render().expect("render succeeds");
    let span = view.el().first_element_child().expect("span bound");

    // A write-back echo finds identical content and leaves the DOM alone.
    let writes = Rc::new(Cell::new(0));
    let sink = Rc::clone(&writes);
    model.on("change:name", move |_, _| sink.set(sink.get() + 1));
    span.set_text("typed");
    span.trigger("input");
    assert_eq!(writes.get(), 1);
    assert_eq!(span.text(), "typed");
}

// ---------------------------------------------------------------------------
// Render idempotence
// ---------------------------------------------------------------------------

#[test]
fn double_render_leaves_one_binding_set() {
    let model = Model::from_json(json!({"name": "x"}));
    let view = view_with(&model, r#"<span bind-text="name"></span>"#);
    view.render().expect("first render");
    let after_first = (model.listener_count(), view.el().children().len());

    view.render().expect("second render");
    assert_eq!(
        (model.listener_count(), view.el().children().len()),
        after_first
    );

    model.set("name", "y");
    let span = view.el().first_element_child().expect("span bound");
    assert_eq!(span.text(), "y");
}

// ---------------------------------------------------------------------------
// bind-if / bind-unless
// ---------------------------------------------------------------------------

#[test]
fn bind_if_activates_and_tears_down_without_leaks() {
    let model = Model::from_json(json!({"active": false, "label": "hi"}));
    let view = view_with(
        &model,
        r#"<div bind-if="active"><span bind-text="label"></span></div>"#,
    );
    view.render().expect("render succeeds");
    let container = view.el().first_element_child().expect("conditional");
    assert!(container.children().is_empty());
    let baseline = model.listener_count();

    model.set("active", true);
    assert_eq!(container.children().len(), 1);
    assert_eq!(container.text(), "hi");
    assert_eq!(model.listener_count(), baseline + 1);

    // The nested binding is live while active.
    model.set("label", "hello");
    assert_eq!(container.text(), "hello");

    model.set("active", false);
    assert!(container.children().is_empty());
    assert_eq!(model.listener_count(), baseline);
}

#[test]
fn bind_unless_negates_the_condition() {
    let model = Model::from_json(json!({"hidden": false}));
    let view = view_with(&model, r#"<div bind-unless="hidden"><span>shown</span></div>"#);
    view.render().expect("render succeeds");
    let container = view.el().first_element_child().expect("conditional");
    assert_eq!(container.text(), "shown");

    model.set("hidden", true);
    assert!(container.children().is_empty());
}

// ---------------------------------------------------------------------------
// bind-each
// ---------------------------------------------------------------------------

#[test]
fn bind_each_builds_one_clone_per_member() {
    let model = Model::from_spec(
        list_spec(),
        Value::from(json!({"items": [{"name": "a"}, {"name": "b"}, {"name": "c"}]})),
    );
    let view = view_with(
        &model,
        r#"<ul bind-each="items"><li bind-text="name"></li></ul>"#,
    );
    view.render().expect("render succeeds");
    assert_eq!(li_texts(&view), vec!["a", "b", "c"]);
}

#[test]
fn bind_each_add_inserts_without_rebuilding_siblings() {
    let model = Model::from_spec(
        list_spec(),
        Value::from(json!({"items": [{"name": "a"}, {"name": "b"}, {"name": "c"}]})),
    );
    let view = view_with(
        &model,
        r#"<ul bind-each="items"><li bind-text="name"></li></ul>"#,
    );
    view.render().expect("render succeeds");
    let ul = view.el().first_element_child().expect("list");
    let first_before = ul.children()[0].clone();

    items_of(&model).add_at(Model::from_json(json!({"name": "x"})), 1);

    assert_eq!(li_texts(&view), vec!["a", "x", "b", "c"]);
    assert!(
        ul.children()[0].same(&first_before),
        "existing clones survive a single add"
    );
}

#[test]
fn bind_each_remove_tears_down_only_that_clone() {
    let model = Model::from_spec(
        list_spec(),
        Value::from(json!({"items": [{"name": "a"}, {"name": "b"}, {"name": "c"}]})),
    );
    let view = view_with(
        &model,
        r#"<ul bind-each="items"><li bind-text="name"></li></ul>"#,
    );
    view.render().expect("render succeeds");
    let items = items_of(&model);
    let removed_member = items.at(1).expect("member");
    let listeners_before = removed_member.listener_count();
    assert!(listeners_before > 0, "member clone is bound");

    items.remove_at(1);

    assert_eq!(li_texts(&view), vec!["a", "c"]);
    assert_eq!(removed_member.listener_count(), 0);
}

#[test]
fn bind_each_reset_and_sort_rebuild_in_order() {
    let model = Model::from_spec(
        list_spec(),
        Value::from(json!({"items": [{"name": "a"}, {"name": "b"}, {"name": "c"}]})),
    );
    let view = view_with(
        &model,
        r#"<ul bind-each="items"><li bind-text="name"></li></ul>"#,
    );
    view.render().expect("render succeeds");
    let items = items_of(&model);

    items.move_item(0, 2);
    assert_eq!(li_texts(&view), vec!["b", "c", "a"]);

    items.reset(Value::from(json!([{"name": "z"}])));
    assert_eq!(li_texts(&view), vec!["z"]);
}

#[test]
fn bind_each_member_updates_flow_into_their_clone() {
    let model = Model::from_spec(
        list_spec(),
        Value::from(json!({"items": [{"name": "a"}, {"name": "b"}]})),
    );
    let view = view_with(
        &model,
        r#"<ul bind-each="items"><li bind-text="name"></li></ul>"#,
    );
    view.render().expect("render succeeds");

    items_of(&model).at(1).expect("member").set("name", "beta");
    assert_eq!(li_texts(&view), vec!["a", "beta"]);
}

#[test]
fn bind_each_index_literal_with_offset() {
    let model = Model::from_spec(
        list_spec(),
        Value::from(json!({"items": [{"name": "a"}, {"name": "b"}]})),
    );
    let view = view_with(
        &model,
        r#"<ul bind-each="items"><li bind-attr-data-pos="$index" bind-index-offset="1" bind-text="name"></li></ul>"#,
    );
    view.render().expect("render succeeds");
    let ul = view.el().first_element_child().expect("list");
    let positions: Vec<Option<String>> =
        ul.children().iter().map(|li| li.attr("data-pos")).collect();
    assert_eq!(
        positions,
        vec![Some("1".to_string()), Some("2".to_string())]
    );
}

// ---------------------------------------------------------------------------
// bind-with
// ---------------------------------------------------------------------------

#[test]
fn bind_with_rescopes_descendants_to_the_relation() {
    let spec = Rc::new(ModelSpec::new().relation(Relation::model("owner")));
    let model = Model::from_spec(spec, Value::from(json!({"owner": {"name": "Mallory"}})));
    let view = view_with(
        &model,
        r#"<div bind-with="owner"><span bind-text="name"></span></div>"#,
    );
    view.render().expect("render succeeds");
    let container = view.el().first_element_child().expect("scope");
    assert_eq!(container.text(), "Mallory");

    // An in-place relation write notifies the rescoped binding.
    model.set("owner", Value::from(json!({"name": "Ms. Archer"})));
    assert_eq!(container.text(), "Ms. Archer");
}

#[test]
fn bind_with_prefix_keys_transformers() {
    let spec = Rc::new(ModelSpec::new().relation(Relation::model("owner")));
    let model = Model::from_spec(spec, Value::from(json!({"owner": {"name": "mallory"}})));
    let view = ViewConfig::new()
        .model(model.clone())
        .template(static_template(
            r#"<div bind-with="owner"><span bind-text="name"></span></div>"#,
        ))
        .transformers(Transformers::new().model_to_view("owner.name", |v| {
            Value::String(v.display_text().to_uppercase())
        }))
        .build();
    view.render().expect("render succeeds");
    assert_eq!(view.el().text(), "MALLORY");
}

// ---------------------------------------------------------------------------
// bind-array
// ---------------------------------------------------------------------------

#[test]
fn bind_array_regenerates_clones_per_entry() {
    let model = Model::from_json(json!({"tags": ["a", "b"]}));
    let view = view_with(&model, r#"<ul><li bind-array="tags"></li></ul>"#);
    view.render().expect("render succeeds");
    assert_eq!(li_texts(&view), vec!["a", "b"]);

    model.set("tags", Value::from(json!(["x", "y", "z"])));
    assert_eq!(li_texts(&view), vec!["x", "y", "z"]);

    model.set("tags", Value::from(json!([])));
    assert!(li_texts(&view).is_empty());
}

// ---------------------------------------------------------------------------
// Form controls
// ---------------------------------------------------------------------------

#[test]
fn bind_val_on_select_uses_the_change_event() {
    let model = Model::from_json(json!({"size": "m"}));
    let view = view_with(
        &model,
        r#"<select bind-val="size"><option value="s">S</option><option value="m">M</option></select>"#,
    );
    view.render().expect("render succeeds");
    let select = view.el().first_element_child().expect("select bound");
    assert_eq!(select.value(), "m");

    select.set_value("s");
    select.trigger("change");
    assert_eq!(model.get("size").map(|v| v.to_json()), Some(json!("s")));
}

#[test]
fn bind_val_events_attribute_overrides_the_view_event() {
    let model = Model::from_json(json!({"q": ""}));
    let view = view_with(&model, r#"<input bind-val="q" bind-val-events="blur">"#);
    view.render().expect("render succeeds");
    let input = view.el().first_element_child().expect("input bound");

    input.set_value("zz");
    input.trigger("textchange");
    assert_eq!(model.get("q").map(|v| v.to_json()), Some(json!("")));

    input.trigger("blur");
    assert_eq!(model.get("q").map(|v| v.to_json()), Some(json!("zz")));
}

#[test]
fn bind_checked_coerces_both_ways() {
    let model = Model::from_json(json!({"done": 1}));
    let view = view_with(&model, r#"<input type="checkbox" bind-checked="done">"#);
    view.render().expect("render succeeds");
    let input = view.el().first_element_child().expect("checkbox bound");
    assert!(input.checked(), "truthy model value checks the box");

    input.set_checked(false);
    input.trigger("change");
    assert_eq!(model.get("done").map(|v| v.to_json()), Some(json!(false)));
}

#[test]
fn bind_visible_and_hidden_toggle_without_removal() {
    let model = Model::from_json(json!({"on": false}));
    let view = view_with(
        &model,
        r#"<span bind-visible="on">a</span><span bind-hidden="on">b</span>"#,
    );
    view.render().expect("render succeeds");
    let spans = view.el().children();
    assert!(!spans[0].visible());
    assert!(spans[1].visible());

    model.set("on", true);
    assert!(spans[0].visible());
    assert!(!spans[1].visible());
    // Both spans stayed in the tree.
    assert_eq!(view.el().children().len(), 2);
}

#[test]
fn bind_enabled_and_disabled_drive_the_disabled_prop() {
    let model = Model::from_json(json!({"can": false}));
    let view = view_with(
        &model,
        r#"<button bind-enabled="can">go</button><button bind-disabled="can">stop</button>"#,
    );
    view.render().expect("render succeeds");
    let buttons = view.el().children();
    assert!(buttons[0].disabled());
    assert!(!buttons[1].disabled());

    model.set("can", true);
    assert!(!buttons[0].disabled());
    assert!(buttons[1].disabled());
}

// ---------------------------------------------------------------------------
// bind-attr-*
// ---------------------------------------------------------------------------

#[test]
fn bind_attr_sets_the_named_attribute() {
    let model = Model::from_json(json!({"url": "/a"}));
    let view = view_with(&model, r#"<a bind-attr-href="url">link</a>"#);
    view.render().expect("render succeeds");
    let anchor = view.el().first_element_child().expect("anchor bound");
    assert_eq!(anchor.attr("href"), Some("/a".to_string()));

    model.set("url", "/b");
    assert_eq!(anchor.attr("href"), Some("/b".to_string()));
}

// ---------------------------------------------------------------------------
// bind-click / bind-submit
// ---------------------------------------------------------------------------

#[test]
fn bind_click_invokes_the_named_handler() {
    let clicked = Rc::new(Cell::new(0));
    let sink = Rc::clone(&clicked);
    let model = Model::new();
    let view = ViewConfig::new()
        .model(model)
        .template(static_template(r#"<button bind-click="save">go</button>"#))
        .handler("save", move |_, args| {
            if let HandlerArgs::Command { event, .. } = args {
                assert_eq!(event.event_type(), "click");
            }
            sink.set(sink.get() + 1);
        })
        .build();
    view.render().expect("render succeeds");

    let button = view.el().first_element_child().expect("button bound");
    button.trigger("click");
    assert_eq!(clicked.get(), 1);
}

#[test]
fn bind_click_with_an_unknown_handler_is_silent() {
    let model = Model::new();
    let view = view_with(&model, r#"<button bind-click="missing">go</button>"#);
    view.render().expect("render succeeds");
    let button = view.el().first_element_child().expect("button");
    button.trigger("click");
    assert_eq!(button.listener_count(), 0);
}

// ---------------------------------------------------------------------------
// Transformers and late binding
// ---------------------------------------------------------------------------

#[test]
fn model_to_view_transformer_formats_the_value() {
    let model = Model::from_json(json!({"price": 42}));
    let view = ViewConfig::new()
        .model(model.clone())
        .template(static_template(r#"<span bind-text="price"></span>"#))
        .transformers(
            Transformers::new()
                .model_to_view("price", |v| Value::String(format!("${}", v.display_text()))),
        )
        .build();
    view.render().expect("render succeeds");
    assert_eq!(view.el().text(), "$42");

    model.set("price", 7i64);
    assert_eq!(view.el().text(), "$7");
}

#[test]
fn append_bindings_binds_markup_injected_after_render() {
    let model = Model::from_json(json!({"name": "late"}));
    let view = view_with(&model, r#"<span bind-text="name"></span>"#);
    view.render().expect("render succeeds");
    let before = view.binding_count();

    let extra = woodhouse_dom::Element::new("b");
    extra.set_attr("bind-text", "name");
    view.el().append(&extra);
    view.append_bindings();

    assert!(view.binding_count() > before);
    assert_eq!(extra.text(), "late");
    model.set("name", "later");
    assert_eq!(extra.text(), "later");
}
