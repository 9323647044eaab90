//! The declarative binding engine: scans a subtree for directive
//! attributes, wires model↔view subscriptions, and manages nested binding
//! scopes (loops, conditionals, rescoped contexts).
//!
//! Every handler follows the same discipline: the directive attribute is
//! consumed before the handler runs (clones never carry directives), the
//! initial application happens at bind time, and every subscription is
//! returned as a record so teardown is a flat drain.

use std::cell::RefCell;
use std::rc::Rc;

use woodhouse_core::{Collection, Entity, Model, Value};
use woodhouse_dom::{Element, Node};
use woodhouse_keypath as keypath;

use crate::binding::BindingRecord;
use crate::directive::{has_directive, owns_descendants, Directive};
use crate::view::{HandlerArgs, View};

/// One binding scope: the subtree root plus the context it binds against.
#[derive(Clone)]
pub struct BindOptions {
    pub el: Element,
    /// Model-shaped context for keypath directives.
    pub model: Option<Entity>,
    /// Enclosing collection, addressed by the `bind-each` literal `this`.
    pub collection: Option<Collection>,
    /// Loop index when inside a `bind-each` scope.
    pub index: Option<i64>,
    /// Keypath prefix accumulated through nested scopes; keys transformer
    /// lookups.
    pub keypath_prefix: Option<String>,
}

pub(crate) fn add_bindings(view: &View, options: &BindOptions) -> Vec<BindingRecord> {
    let root = options.el.clone();
    let mut candidates: Vec<Element> = Vec::new();
    if has_directive(&root) {
        candidates.push(root.clone());
    }
    for el in root.descendants() {
        if has_directive(&el) && !in_owned_scope(&el, &root) {
            candidates.push(el);
        }
    }

    let mut records = Vec::new();
    for el in candidates {
        for attr_name in el.attr_names() {
            let Some(directive) = Directive::parse(&attr_name) else {
                continue;
            };
            // A nested scope activated earlier in this pass may have
            // consumed the attribute already.
            let Some(value) = el.attr(&attr_name) else {
                continue;
            };
            el.remove_attr(&attr_name);
            dispatch(view, options, &el, directive, &value, &mut records);
        }
    }
    records
}

/// Whether `el` sits under an element (within this scan scope) that owns
/// its own descendants (`bind-each`, `bind-if`, `bind-unless`).
fn in_owned_scope(el: &Element, root: &Element) -> bool {
    let mut cursor = el.parent();
    while let Some(parent) = cursor {
        if owns_descendants(&parent) {
            return true;
        }
        if parent.same(root) {
            return false;
        }
        cursor = parent.parent();
    }
    false
}

fn dispatch(
    view: &View,
    options: &BindOptions,
    el: &Element,
    directive: Directive,
    value: &str,
    records: &mut Vec<BindingRecord>,
) {
    match directive {
        Directive::Each => bind_each(view, options, el, value, records),
        Directive::Array => bind_array(view, options, el, value, records),
        Directive::With => bind_with(view, options, el, value),
        Directive::If => bind_if_unless(view, options, el, value, false, records),
        Directive::Unless => bind_if_unless(view, options, el, value, true, records),
        Directive::Text => bind_text_html(view, options, el, value, false, records),
        Directive::Html => bind_text_html(view, options, el, value, true, records),
        Directive::Val => bind_val(view, options, el, value, records),
        Directive::Checked => bind_checked(view, options, el, value, records),
        Directive::Visible => bind_visible_hidden(view, options, el, value, false, records),
        Directive::Hidden => bind_visible_hidden(view, options, el, value, true, records),
        Directive::Enabled => bind_enabled_disabled(view, options, el, value, false, records),
        Directive::Disabled => bind_enabled_disabled(view, options, el, value, true, records),
        Directive::Click => bind_click_submit(view, options, el, value, "click", records),
        Directive::Submit => bind_click_submit(view, options, el, value, "submit", records),
        Directive::Attr(target) => bind_attr(view, options, el, &target, value, records),
    }
}

// Context resolution --------------------------------------------------------

/// Resolve the entity a directive binds against: a named view context wins,
/// then the `this` literal (the enclosing collection), then the scope model
/// (optionally narrowed by a keypath, wrapping plain data and instantiating
/// declared-but-absent relations).
fn context_for(
    view: &View,
    options: &BindOptions,
    el: &Element,
    context_attrs: &[&str],
    keypath: Option<&str>,
    collection_for_this: bool,
) -> Option<Entity> {
    for attr in context_attrs {
        if let Some(name) = el.attr(attr) {
            return view.context_entity(&name);
        }
    }
    if collection_for_this && keypath == Some("this") {
        if let Some(collection) = &options.collection {
            return Some(Entity::Collection(collection.clone()));
        }
    }
    let model = options.model.as_ref()?;
    let Some(path) = keypath else {
        return Some(model.clone());
    };
    match model.get(path) {
        Some(value) if !value.is_null() => Some(Entity::wrap(value)),
        _ => {
            if let Entity::Model(m) = model {
                if let Some(relation) = m.relation_for(path) {
                    return Some(Entity::wrap(relation.instantiate_empty()));
                }
            }
            None
        }
    }
}

/// Subscribe `apply` to `change:<keypath>` on the context and run it once
/// with the current value.
fn subscribe_change(
    context: &Entity,
    path: &str,
    apply: Rc<dyn Fn(&Value)>,
    records: &mut Vec<BindingRecord>,
) {
    let emitter = context.emitter();
    let on_change = Rc::clone(&apply);
    let id = emitter.on(&format!("change:{path}"), move |_, event| {
        let value = event.change_value().cloned().unwrap_or(Value::Null);
        on_change(&value);
    });
    records.push(BindingRecord::new(Rc::new(emitter), id));
    apply(&context.get(path).unwrap_or(Value::Null));
}

fn loop_index(view: &View, options: &BindOptions, el: &Element, prefixed: &str) -> i64 {
    let offset = el
        .attr("bind-index-offset")
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(0);
    view.transform_index(prefixed, options.index.unwrap_or(0) + offset)
}

fn clone_node(node: &Node) -> Node {
    match node {
        Node::Element(el) => Node::Element(el.deep_clone()),
        Node::Text(text) => Node::Text(text.clone()),
    }
}

// One-way directives --------------------------------------------------------

fn bind_attr(
    view: &View,
    options: &BindOptions,
    el: &Element,
    target_attr: &str,
    path: &str,
    records: &mut Vec<BindingRecord>,
) {
    let prefixed = keypath::with_prefix(options.keypath_prefix.as_deref(), path);
    if keypath::is_index_literal(path) {
        let index = loop_index(view, options, el, &prefixed);
        el.set_attr(target_attr, &index.to_string());
        return;
    }
    let Some(context) = context_for(view, options, el, &["bind-attr-context"], None, false) else {
        return;
    };
    let weak = view.downgrade();
    let target_el = el.clone();
    let target_attr = target_attr.to_string();
    let apply: Rc<dyn Fn(&Value)> = Rc::new(move |value: &Value| {
        let value = match weak.upgrade() {
            Some(view) => view.transform_model_to_view(&prefixed, value),
            None => value.clone(),
        };
        target_el.set_attr(&target_attr, &value.display_text());
    });
    subscribe_change(&context, path, apply, records);
}

fn bind_visible_hidden(
    view: &View,
    options: &BindOptions,
    el: &Element,
    path: &str,
    invert: bool,
    records: &mut Vec<BindingRecord>,
) {
    let attrs = ["bind-visible-context", "bind-hidden-context"];
    let Some(context) = context_for(view, options, el, &attrs, None, false) else {
        return;
    };
    let target_el = el.clone();
    let apply: Rc<dyn Fn(&Value)> = Rc::new(move |value: &Value| {
        let mut visible = value.truthy();
        if invert {
            visible = !visible;
        }
        target_el.toggle(visible);
    });
    subscribe_change(&context, path, apply, records);
}

fn bind_enabled_disabled(
    view: &View,
    options: &BindOptions,
    el: &Element,
    path: &str,
    invert: bool,
    records: &mut Vec<BindingRecord>,
) {
    let attrs = ["bind-enabled-context", "bind-disabled-context"];
    let Some(context) = context_for(view, options, el, &attrs, None, false) else {
        return;
    };
    let target_el = el.clone();
    let apply: Rc<dyn Fn(&Value)> = Rc::new(move |value: &Value| {
        let mut enabled = value.truthy();
        if invert {
            enabled = !enabled;
        }
        target_el.set_disabled(!enabled);
    });
    subscribe_change(&context, path, apply, records);
}

// Two-way directives --------------------------------------------------------

fn bind_text_html(
    view: &View,
    options: &BindOptions,
    el: &Element,
    path: &str,
    html: bool,
    records: &mut Vec<BindingRecord>,
) {
    let prefixed = keypath::with_prefix(options.keypath_prefix.as_deref(), path);
    if keypath::is_index_literal(path) {
        let index = loop_index(view, options, el, &prefixed);
        el.set_text(&index.to_string());
        return;
    }
    let attrs = ["bind-text-context", "bind-html-context"];
    let Some(context) = context_for(view, options, el, &attrs, None, false) else {
        return;
    };

    // Model to view: write only when the content actually differs, so a
    // write-back echo never clobbers an editing surface.
    let weak = view.downgrade();
    let target_el = el.clone();
    let to_view_path = prefixed.clone();
    let apply: Rc<dyn Fn(&Value)> = Rc::new(move |value: &Value| {
        let value = match weak.upgrade() {
            Some(view) => view.transform_model_to_view(&to_view_path, value),
            None => value.clone(),
        };
        let text = value.display_text();
        if html {
            if target_el.html() != text {
                let _ = target_el.set_html(&text);
            }
        } else if target_el.text() != text {
            target_el.set_text(&text);
        }
    });
    subscribe_change(&context, path, apply, records);

    // View to model: computed keypaths are not writable from the view.
    let weak = view.downgrade();
    let source_el = el.clone();
    let write_context = context.clone();
    let write_path = path.to_string();
    let id = el.on("input", move |_| {
        let raw = if html {
            Value::String(source_el.html())
        } else {
            Value::String(source_el.text())
        };
        let value = match weak.upgrade() {
            Some(view) => view.transform_view_to_model(&prefixed, &raw),
            None => raw,
        };
        if !matches!(write_context.get_raw(&write_path), Some(Value::Computed(_))) {
            write_context.set(&write_path, value);
        }
    });
    records.push(BindingRecord::new(Rc::new(el.clone()), id));
}

fn bind_val(
    view: &View,
    options: &BindOptions,
    el: &Element,
    path: &str,
    records: &mut Vec<BindingRecord>,
) {
    let prefixed = keypath::with_prefix(options.keypath_prefix.as_deref(), path);
    let Some(context) = context_for(view, options, el, &["bind-val-context"], None, false) else {
        return;
    };
    let view_events = el.attr("bind-val-events").unwrap_or_else(|| {
        if el.is_tag("select") {
            "change".to_string()
        } else {
            "textchange".to_string()
        }
    });

    let weak = view.downgrade();
    let target_el = el.clone();
    let to_view_path = prefixed.clone();
    let apply: Rc<dyn Fn(&Value)> = Rc::new(move |value: &Value| {
        let value = match weak.upgrade() {
            Some(view) => view.transform_model_to_view(&to_view_path, value),
            None => value.clone(),
        };
        let text = value.display_text();
        if target_el.value() != text {
            target_el.set_value(&text);
        }
    });
    subscribe_change(&context, path, apply, records);

    let weak = view.downgrade();
    let source_el = el.clone();
    let write_context = context.clone();
    let write_path = path.to_string();
    let id = el.on(&view_events, move |_| {
        let raw = Value::String(source_el.value());
        let value = match weak.upgrade() {
            Some(view) => view.transform_view_to_model(&prefixed, &raw),
            None => raw,
        };
        if !matches!(write_context.get_raw(&write_path), Some(Value::Computed(_))) {
            write_context.set(&write_path, value);
        }
    });
    records.push(BindingRecord::new(Rc::new(el.clone()), id));
}

fn bind_checked(
    view: &View,
    options: &BindOptions,
    el: &Element,
    path: &str,
    records: &mut Vec<BindingRecord>,
) {
    let Some(context) = context_for(view, options, el, &["bind-checked-context"], None, false)
    else {
        return;
    };
    let target_el = el.clone();
    let apply: Rc<dyn Fn(&Value)> = Rc::new(move |value: &Value| {
        let checked = value.truthy();
        if target_el.checked() != checked {
            target_el.set_checked(checked);
        }
    });
    subscribe_change(&context, path, apply, records);

    let source_el = el.clone();
    let write_context = context.clone();
    let write_path = path.to_string();
    let id = el.on("change", move |_| {
        if !matches!(write_context.get_raw(&write_path), Some(Value::Computed(_))) {
            write_context.set(&write_path, Value::Bool(source_el.checked()));
        }
    });
    records.push(BindingRecord::new(Rc::new(el.clone()), id));
}

// Command directives --------------------------------------------------------

fn bind_click_submit(
    view: &View,
    options: &BindOptions,
    el: &Element,
    handler_name: &str,
    event_type: &str,
    records: &mut Vec<BindingRecord>,
) {
    let group = el.attr(&format!("bind-{event_type}-context"));
    // A missing handler is routine over sparse configuration, not an error.
    let Some(handler) = view.resolve_handler(group.as_deref(), handler_name) else {
        return;
    };
    let weak = view.downgrade();
    let scope = options.clone();
    let id = el.on(event_type, move |event| {
        if let Some(view) = weak.upgrade() {
            handler(
                &view,
                HandlerArgs::Command {
                    event,
                    scope: &scope,
                },
            );
        }
    });
    records.push(BindingRecord::new(Rc::new(el.clone()), id));
}

// Scope directives ----------------------------------------------------------

fn bind_with(view: &View, options: &BindOptions, el: &Element, path: &str) {
    let prefixed = keypath::with_prefix(options.keypath_prefix.as_deref(), path);
    let Some(context) = context_for(view, options, el, &["bind-with-context"], Some(path), false)
    else {
        return;
    };
    let child = view.add_bindings(&BindOptions {
        el: el.clone(),
        model: Some(context),
        collection: None,
        index: None,
        keypath_prefix: Some(prefixed),
    });
    view.push_child_records(child);
}

fn bind_if_unless(
    view: &View,
    options: &BindOptions,
    el: &Element,
    path: &str,
    negate: bool,
    records: &mut Vec<BindingRecord>,
) {
    let attrs = ["bind-if-context", "bind-unless-context"];
    let Some(context) = context_for(view, options, el, &attrs, None, false) else {
        return;
    };
    // Cache the original contents; the live element holds whatever the
    // current condition produced.
    let contents: Rc<Vec<Node>> = Rc::new(el.clone_contents());
    el.empty();

    let active_records: Rc<RefCell<Vec<BindingRecord>>> = Rc::new(RefCell::new(Vec::new()));
    let weak = view.downgrade();
    let container = el.clone();
    let bind_context = context.clone();
    let apply: Rc<dyn Fn(&Value)> = Rc::new(move |value: &Value| {
        let Some(view) = weak.upgrade() else {
            return;
        };
        let stale: Vec<BindingRecord> = active_records.borrow_mut().drain(..).collect();
        view.remove_child_records(stale);
        container.empty();

        let mut active = value.truthy();
        if negate {
            active = !active;
        }
        if !active {
            return;
        }

        let mut roots = Vec::new();
        for node in contents.iter() {
            let clone = clone_node(node);
            if let Node::Element(element) = &clone {
                roots.push(element.clone());
            }
            container.append_node(clone);
        }
        let mut child = Vec::new();
        for root in roots {
            child.extend(view.add_bindings(&BindOptions {
                el: root,
                model: Some(bind_context.clone()),
                collection: None,
                index: None,
                keypath_prefix: None,
            }));
        }
        active_records.borrow_mut().extend(child.iter().cloned());
        view.push_child_records(child);
    });
    subscribe_change(&context, path, apply, records);
}

fn bind_array(
    view: &View,
    options: &BindOptions,
    el: &Element,
    path: &str,
    records: &mut Vec<BindingRecord>,
) {
    let Some(parent) = el.parent() else {
        return;
    };
    let append = el.attr("bind-array-direction").as_deref() == Some("append");
    let Some(context) = context_for(view, options, el, &["bind-array-context"], None, false) else {
        return;
    };
    // Detach the element; it serves as the per-entry template from here on.
    el.detach();
    let template = el.clone();
    let clones: Rc<RefCell<Vec<Element>>> = Rc::new(RefCell::new(Vec::new()));

    let apply: Rc<dyn Fn(&Value)> = Rc::new(move |value: &Value| {
        for old in clones.borrow_mut().drain(..) {
            old.detach();
        }
        let items: Vec<Value> = match value {
            Value::Array(items) => items.clone(),
            _ => Vec::new(),
        };
        let mut fresh = Vec::new();
        for item in &items {
            let entry = template.deep_clone();
            entry.set_text(&item.display_text());
            fresh.push(entry);
        }
        if append {
            for entry in &fresh {
                parent.append(entry);
            }
        } else {
            for (i, entry) in fresh.iter().enumerate() {
                parent.insert_at(i, entry);
            }
        }
        *clones.borrow_mut() = fresh;
    });
    subscribe_change(&context, path, apply, records);
}

// Loops ---------------------------------------------------------------------

struct EachState {
    /// One entry per generated clone, in member order, paired with the
    /// records its bindings created.
    pairs: Vec<(Element, Vec<BindingRecord>)>,
}

fn bind_each(
    view: &View,
    options: &BindOptions,
    el: &Element,
    path: &str,
    records: &mut Vec<BindingRecord>,
) {
    let prepend = el.attr("bind-each-direction").as_deref() == Some("prepend");
    let Some(context) = context_for(view, options, el, &["bind-each-context"], Some(path), true)
    else {
        return;
    };
    let Entity::Collection(collection) = context else {
        return;
    };
    let Some(first) = el.first_element_child() else {
        return;
    };
    let template = first.deep_clone();
    first.detach();

    // Non-repeated siblings inside the container bind once, against the
    // parent scope.
    for sibling in el.children() {
        records.extend(view.add_bindings(&BindOptions {
            el: sibling,
            model: options.model.clone(),
            collection: None,
            index: None,
            keypath_prefix: None,
        }));
    }

    let child_prefix = keypath::with_prefix(options.keypath_prefix.as_deref(), path);
    let state = Rc::new(RefCell::new(EachState { pairs: Vec::new() }));

    let reset_sort: Rc<dyn Fn(&Collection)> = {
        let weak = view.downgrade();
        let container = el.clone();
        let template = template.clone();
        let prefix = child_prefix.clone();
        let state = Rc::clone(&state);
        Rc::new(move |collection: &Collection| {
            let Some(view) = weak.upgrade() else {
                return;
            };
            let is_select = container.is_tag("select");
            let previous_value = is_select.then(|| container.value());

            let old: Vec<(Element, Vec<BindingRecord>)> =
                state.borrow_mut().pairs.drain(..).collect();
            let mut stale = Vec::new();
            for (clone, clone_records) in old {
                clone.detach();
                stale.extend(clone_records);
            }
            view.remove_child_records(stale);

            let mut fresh_records = Vec::new();
            let mut pairs = Vec::new();
            for (index, member) in collection.models().iter().enumerate() {
                let clone = template.deep_clone();
                let clone_records = view.add_bindings(&BindOptions {
                    el: clone.clone(),
                    model: Some(Entity::Model(member.clone())),
                    collection: None,
                    index: Some(index as i64),
                    keypath_prefix: Some(prefix.clone()),
                });
                fresh_records.extend(clone_records.iter().cloned());
                pairs.push((clone, clone_records));
            }
            if prepend {
                for (i, (clone, _)) in pairs.iter().enumerate() {
                    container.insert_at(i, clone);
                }
            } else {
                for (clone, _) in &pairs {
                    container.append(clone);
                }
            }
            state.borrow_mut().pairs = pairs;

            if let Some(previous) = previous_value {
                container.set_value(&previous);
            }
            view.push_child_records(fresh_records);
        })
    };

    let on_add: Rc<dyn Fn(&Model, &Collection)> = {
        let weak = view.downgrade();
        let container = el.clone();
        let template = template.clone();
        let prefix = child_prefix.clone();
        let state = Rc::clone(&state);
        Rc::new(move |member: &Model, collection: &Collection| {
            let Some(view) = weak.upgrade() else {
                return;
            };
            let Some(index) = collection.index_of(member) else {
                return;
            };
            let clone = template.deep_clone();
            // Insert relative to the existing clones, not the container's
            // other children.
            let slot = {
                let state = state.borrow();
                state
                    .pairs
                    .get(index)
                    .and_then(|(before, _)| {
                        container.children().iter().position(|c| c.same(before))
                    })
            };
            match slot {
                Some(position) => container.insert_at(position, &clone),
                None => container.append(&clone),
            }
            let clone_records = view.add_bindings(&BindOptions {
                el: clone.clone(),
                model: Some(Entity::Model(member.clone())),
                collection: None,
                index: Some(index as i64),
                keypath_prefix: Some(prefix.clone()),
            });
            {
                let mut state = state.borrow_mut();
                let at = index.min(state.pairs.len());
                state.pairs.insert(at, (clone, clone_records.clone()));
            }
            view.push_child_records(clone_records);
        })
    };

    let on_remove: Rc<dyn Fn(usize)> = {
        let weak = view.downgrade();
        let state = Rc::clone(&state);
        Rc::new(move |index: usize| {
            let Some(view) = weak.upgrade() else {
                return;
            };
            let removed = {
                let mut state = state.borrow_mut();
                if index >= state.pairs.len() {
                    return;
                }
                state.pairs.remove(index)
            };
            let (clone, clone_records) = removed;
            clone.detach();
            view.remove_child_records(clone_records);
        })
    };

    let emitter = collection.emitter();
    let id = emitter.on("add", {
        let on_add = Rc::clone(&on_add);
        move |_, event| {
            if let (Some(member), Some(collection)) = (event.model(), event.collection()) {
                on_add(member, collection);
            }
        }
    });
    records.push(BindingRecord::new(Rc::new(emitter.clone()), id));

    let id = emitter.on("remove", {
        let on_remove = Rc::clone(&on_remove);
        move |_, event| {
            if let Some(index) = event.index() {
                on_remove(index);
            }
        }
    });
    records.push(BindingRecord::new(Rc::new(emitter.clone()), id));

    let id = emitter.on("reset sort", {
        let reset_sort = Rc::clone(&reset_sort);
        move |_, event| {
            if let Some(collection) = event.collection() {
                reset_sort(collection);
            }
        }
    });
    records.push(BindingRecord::new(Rc::new(emitter), id));

    reset_sort(&collection);
}
