use std::cell::RefCell;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use woodhouse_events::{Emitter, SubscriptionId};

use crate::event::DomEvent;
use crate::parse::{self, ParseError};

/// One child slot of an element: a nested element or a run of text.
#[derive(Clone)]
pub enum Node {
    Element(Element),
    Text(String),
}

pub(crate) struct ElementInner {
    tag: String,
    attrs: IndexMap<String, String>,
    children: Vec<Node>,
    parent: Weak<RefCell<ElementInner>>,
    listeners: Emitter<DomEvent>,
    visible: bool,
    value: String,
    checked: bool,
    disabled: bool,
}

/// Handle to one element. Cloning the handle aliases the same element;
/// [`Element::deep_clone`] copies the subtree.
#[derive(Clone)]
pub struct Element {
    inner: Rc<RefCell<ElementInner>>,
}

impl Element {
    pub fn new(tag: &str) -> Self {
        Self {
            inner: Rc::new(RefCell::new(ElementInner {
                tag: tag.to_string(),
                attrs: IndexMap::new(),
                children: Vec::new(),
                parent: Weak::new(),
                listeners: Emitter::new(),
                visible: true,
                value: String::new(),
                checked: false,
                disabled: false,
            })),
        }
    }

    /// Identity: two handles naming the same element.
    pub fn same(&self, other: &Element) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn tag(&self) -> String {
        self.inner.borrow().tag.clone()
    }

    pub fn is_tag(&self, tag: &str) -> bool {
        self.inner.borrow().tag == tag
    }

    // Attributes ------------------------------------------------------------

    pub fn attr(&self, name: &str) -> Option<String> {
        self.inner.borrow().attrs.get(name).cloned()
    }

    pub fn set_attr(&self, name: &str, value: &str) {
        self.inner
            .borrow_mut()
            .attrs
            .insert(name.to_string(), value.to_string());
    }

    pub fn remove_attr(&self, name: &str) -> bool {
        self.inner.borrow_mut().attrs.shift_remove(name).is_some()
    }

    pub fn attr_names(&self) -> Vec<String> {
        self.inner.borrow().attrs.keys().cloned().collect()
    }

    // Tree ------------------------------------------------------------------

    pub fn parent(&self) -> Option<Element> {
        self.inner
            .borrow()
            .parent
            .upgrade()
            .map(|inner| Element { inner })
    }

    /// Element children, in order. Text runs are skipped.
    pub fn children(&self) -> Vec<Element> {
        self.inner
            .borrow()
            .children
            .iter()
            .filter_map(|node| match node {
                Node::Element(el) => Some(el.clone()),
                Node::Text(_) => None,
            })
            .collect()
    }

    /// All child nodes, including text runs.
    pub fn child_nodes(&self) -> Vec<Node> {
        self.inner.borrow().children.clone()
    }

    pub fn first_element_child(&self) -> Option<Element> {
        self.children().into_iter().next()
    }

    /// Every descendant element in document order (self excluded).
    pub fn descendants(&self) -> Vec<Element> {
        let mut out = Vec::new();
        collect_descendants(self, &mut out);
        out
    }

    /// Whether `ancestor` sits on this element's parent chain.
    pub fn is_descendant_of(&self, ancestor: &Element) -> bool {
        let mut cursor = self.parent();
        while let Some(el) = cursor {
            if el.same(ancestor) {
                return true;
            }
            cursor = el.parent();
        }
        false
    }

    pub fn append(&self, child: &Element) {
        child.detach();
        child.inner.borrow_mut().parent = Rc::downgrade(&self.inner);
        self.inner
            .borrow_mut()
            .children
            .push(Node::Element(child.clone()));
    }

    pub fn append_node(&self, node: Node) {
        if let Node::Element(el) = &node {
            el.detach();
            el.inner.borrow_mut().parent = Rc::downgrade(&self.inner);
        }
        self.inner.borrow_mut().children.push(node);
    }

    pub fn prepend(&self, child: &Element) {
        child.detach();
        child.inner.borrow_mut().parent = Rc::downgrade(&self.inner);
        self.inner
            .borrow_mut()
            .children
            .insert(0, Node::Element(child.clone()));
    }

    /// Insert `child` so it becomes the element child at `index`. Appends
    /// when `index` points at or past the end. Text runs keep their slots.
    pub fn insert_at(&self, index: usize, child: &Element) {
        let element_count = self.children().len();
        self.append(child);
        if index < element_count {
            let mut inner = self.inner.borrow_mut();
            let appended = inner.children.pop().expect("append pushed a node");
            // Find the slot of the index-th element child.
            let mut seen = 0usize;
            let mut slot = inner.children.len();
            for (pos, node) in inner.children.iter().enumerate() {
                if let Node::Element(_) = node {
                    if seen == index {
                        slot = pos;
                        break;
                    }
                    seen += 1;
                }
            }
            inner.children.insert(slot, appended);
        }
    }

    /// Remove this element from its parent. No-op when already detached.
    pub fn detach(&self) {
        let parent = match self.parent() {
            Some(parent) => parent,
            None => return,
        };
        self.inner.borrow_mut().parent = Weak::new();
        let mut parent_inner = parent.inner.borrow_mut();
        parent_inner.children.retain(|node| match node {
            Node::Element(el) => !el.same(self),
            Node::Text(_) => true,
        });
    }

    /// Remove all child nodes.
    pub fn empty(&self) {
        let children = std::mem::take(&mut self.inner.borrow_mut().children);
        for node in children {
            if let Node::Element(el) = node {
                el.inner.borrow_mut().parent = Weak::new();
            }
        }
    }

    /// Deep copies of this element's child nodes, detached from the tree.
    pub fn clone_contents(&self) -> Vec<Node> {
        self.inner
            .borrow()
            .children
            .iter()
            .map(|node| match node {
                Node::Element(el) => Node::Element(el.deep_clone()),
                Node::Text(text) => Node::Text(text.clone()),
            })
            .collect()
    }

    /// Structural copy: tag, attributes, props, and subtree. Event
    /// subscriptions do not carry over; the clone starts detached.
    pub fn deep_clone(&self) -> Element {
        let inner = self.inner.borrow();
        let clone = Element::new(&inner.tag);
        {
            let mut clone_inner = clone.inner.borrow_mut();
            clone_inner.attrs = inner.attrs.clone();
            clone_inner.visible = inner.visible;
            clone_inner.value = inner.value.clone();
            clone_inner.checked = inner.checked;
            clone_inner.disabled = inner.disabled;
        }
        for node in &inner.children {
            match node {
                Node::Element(el) => clone.append(&el.deep_clone()),
                Node::Text(text) => clone.append_node(Node::Text(text.clone())),
            }
        }
        clone
    }

    // Content ---------------------------------------------------------------

    /// Concatenated text of the subtree.
    pub fn text(&self) -> String {
        let mut out = String::new();
        collect_text(self, &mut out);
        out
    }

    /// Replace content with a single text run.
    pub fn set_text(&self, text: &str) {
        self.empty();
        if !text.is_empty() {
            self.inner
                .borrow_mut()
                .children
                .push(Node::Text(text.to_string()));
        }
    }

    /// Serialized markup of the content (not the element itself).
    pub fn html(&self) -> String {
        let mut out = String::new();
        for node in self.inner.borrow().children.iter() {
            parse::serialize_node(node, &mut out);
        }
        out
    }

    /// Replace content by parsing `markup`.
    pub fn set_html(&self, markup: &str) -> Result<(), ParseError> {
        let nodes = parse::parse_fragment(markup)?;
        self.empty();
        for node in nodes {
            self.append_node(node);
        }
        Ok(())
    }

    /// Serialized markup of the element and its content.
    pub fn to_html(&self) -> String {
        let mut out = String::new();
        parse::serialize_node(&Node::Element(self.clone()), &mut out);
        out
    }

    // Form-control props ----------------------------------------------------

    pub fn value(&self) -> String {
        self.inner.borrow().value.clone()
    }

    pub fn set_value(&self, value: &str) {
        self.inner.borrow_mut().value = value.to_string();
    }

    pub fn checked(&self) -> bool {
        self.inner.borrow().checked
    }

    pub fn set_checked(&self, checked: bool) {
        self.inner.borrow_mut().checked = checked;
    }

    pub fn disabled(&self) -> bool {
        self.inner.borrow().disabled
    }

    pub fn set_disabled(&self, disabled: bool) {
        self.inner.borrow_mut().disabled = disabled;
    }

    // Visibility ------------------------------------------------------------

    pub fn visible(&self) -> bool {
        self.inner.borrow().visible
    }

    pub fn show(&self) {
        self.inner.borrow_mut().visible = true;
    }

    pub fn hide(&self) {
        self.inner.borrow_mut().visible = false;
    }

    pub fn toggle(&self, visible: bool) {
        self.inner.borrow_mut().visible = visible;
    }

    /// Show, then run `done` once the transition completes. The in-memory
    /// tree has no animation clock, so completion is immediate; the
    /// callback contract is what callers rely on.
    pub fn show_with(&self, _duration_ms: Option<u64>, done: impl FnOnce()) {
        self.show();
        done();
    }

    /// Hide, then run `done` once the transition completes.
    pub fn hide_with(&self, _duration_ms: Option<u64>, done: impl FnOnce()) {
        self.hide();
        done();
    }

    // Events ----------------------------------------------------------------

    pub fn on(&self, events: &str, handler: impl Fn(&DomEvent) + 'static) -> SubscriptionId {
        let listeners = self.inner.borrow().listeners.clone();
        listeners.on(events, move |_, ev| handler(ev))
    }

    pub fn off(&self, id: SubscriptionId) -> bool {
        let listeners = self.inner.borrow().listeners.clone();
        listeners.off(id)
    }

    pub fn listener_count(&self) -> usize {
        self.inner.borrow().listeners.listener_count()
    }

    /// Dispatch an event of `event_type` to this element's subscribers.
    pub fn trigger(&self, event_type: &str) -> DomEvent {
        let listeners = self.inner.borrow().listeners.clone();
        let event = DomEvent::new(event_type, self.clone());
        listeners.trigger(event_type, &event);
        event
    }

    pub(crate) fn attrs_snapshot(&self) -> IndexMap<String, String> {
        self.inner.borrow().attrs.clone()
    }
}

fn collect_descendants(el: &Element, out: &mut Vec<Element>) {
    for child in el.children() {
        out.push(child.clone());
        collect_descendants(&child, out);
    }
}

fn collect_text(el: &Element, out: &mut String) {
    for node in el.inner.borrow().children.iter() {
        match node {
            Node::Element(child) => collect_text(child, out),
            Node::Text(text) => out.push_str(text),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_at_positions_among_element_children() {
        let parent = Element::new("ul");
        for name in ["a", "b", "c"] {
            let li = Element::new("li");
            li.set_text(name);
            parent.append(&li);
        }
        let li = Element::new("li");
        li.set_text("x");
        parent.insert_at(1, &li);

        let texts: Vec<String> = parent.children().iter().map(|c| c.text()).collect();
        assert_eq!(texts, vec!["a", "x", "b", "c"]);
    }

    #[test]
    fn insert_at_past_end_appends() {
        let parent = Element::new("ul");
        let li = Element::new("li");
        parent.insert_at(5, &li);
        assert_eq!(parent.children().len(), 1);
    }

    #[test]
    fn detach_and_reappend_moves_element() {
        let a = Element::new("div");
        let b = Element::new("div");
        let child = Element::new("span");
        a.append(&child);
        b.append(&child);

        assert!(a.children().is_empty());
        assert_eq!(b.children().len(), 1);
        assert!(child.parent().expect("has parent").same(&b));
    }

    #[test]
    fn deep_clone_copies_structure_not_listeners() {
        let el = Element::new("div");
        el.set_attr("class", "card");
        let inner = Element::new("span");
        inner.set_text("hi");
        el.append(&inner);
        el.on("click", |_| {});

        let clone = el.deep_clone();
        assert_eq!(clone.attr("class").as_deref(), Some("card"));
        assert_eq!(clone.text(), "hi");
        assert_eq!(clone.listener_count(), 0);
        assert!(clone.parent().is_none());
        assert!(!clone.same(&el));
    }

    #[test]
    fn trigger_reaches_subscribers_until_off() {
        let el = Element::new("button");
        let hits = Rc::new(RefCell::new(0));
        let hits2 = Rc::clone(&hits);
        let id = el.on("click", move |_| *hits2.borrow_mut() += 1);

        el.trigger("click");
        assert!(el.off(id));
        el.trigger("click");
        assert_eq!(*hits.borrow(), 1);
    }

    #[test]
    fn text_concatenates_subtree() {
        let el = Element::new("p");
        el.set_html("Hello <b>big</b> world").expect("markup parses");
        assert_eq!(el.text(), "Hello big world");
    }
}
