use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use thiserror::Error;
use tracing::debug;
use woodhouse_core::{Collection, Entity, EntityEvent, Model, Value};
use woodhouse_dom::{DomEvent, Element, ParseError};
use woodhouse_events::{Emitter, ListenerRegistry, SubscriptionId};

use crate::binding::{release_all, BindingRecord};
use crate::engine::{self, BindOptions};
use crate::Transformers;

/// jQuery's "fast" animation duration, used by animated show/hide.
const FAST_MS: u64 = 200;

#[derive(Debug, Error)]
pub enum ViewError {
    /// A declared event map names a handler the view does not define.
    /// This is a programming mistake and surfaces immediately.
    #[error("event handler '{0}' is not defined on the view")]
    UnknownHandler(String),
    #[error("template markup failed to parse: {0}")]
    Template(#[from] ParseError),
}

/// Arguments passed to a named view handler: a DOM event for delegated DOM
/// events, the DOM event plus its binding scope for command bindings
/// (`bind-click`/`bind-submit`), an entity event for model/collection event
/// maps.
pub enum HandlerArgs<'a> {
    Dom(&'a DomEvent),
    Command {
        event: &'a DomEvent,
        scope: &'a BindOptions,
    },
    Entity(&'a str, &'a EntityEvent),
}

pub type ViewHandler = Rc<dyn Fn(&View, HandlerArgs)>;
pub type TemplateFn = Rc<dyn Fn(&serde_json::Value) -> String>;
pub type LocalsFn = Rc<dyn Fn() -> serde_json::Map<String, serde_json::Value>>;
type HookFn = Rc<dyn Fn(&View)>;

/// One entry in a declarative entity-event map: handler name(s) resolved
/// on the view, or a function bound directly.
#[derive(Clone)]
pub enum EntityHandlerSpec {
    Names(String),
    Handler(ViewHandler),
}

impl EntityHandlerSpec {
    pub fn names(names: &str) -> Self {
        EntityHandlerSpec::Names(names.to_string())
    }

    pub fn handler(f: impl Fn(&View, HandlerArgs) + 'static) -> Self {
        EntityHandlerSpec::Handler(Rc::new(f))
    }
}

#[derive(Clone)]
struct DomEventSpec {
    event: String,
    /// Restrict delegation to descendant elements with this tag.
    selector: Option<String>,
    handler: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewState {
    Unrendered,
    Rendered,
    Removed,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RenderOptions {
    pub animate: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RemoveOptions {
    pub animate: bool,
}

/// Placement of a subview added with [`View::add_subview`].
#[derive(Default)]
pub struct SubviewOptions {
    /// Attach point; when absent the subview keeps its own element.
    pub el: Option<Element>,
    /// Append to `el` instead of adopting it as the subview's element.
    pub append: bool,
    /// Render immediately (the default).
    pub skip_render: bool,
}

#[derive(Default)]
struct Hooks {
    before_render: Option<HookFn>,
    on_render: Option<HookFn>,
    before_remove: Option<HookFn>,
    on_remove: Option<HookFn>,
}

/// Builder-style configuration for a [`View`].
#[derive(Default)]
pub struct ViewConfig {
    el: Option<Element>,
    model: Option<Model>,
    collection: Option<Collection>,
    template: Option<TemplateFn>,
    locals: Option<LocalsFn>,
    transformers: Transformers,
    handlers: HashMap<String, ViewHandler>,
    contexts: HashMap<String, Entity>,
    model_events: Vec<(String, EntityHandlerSpec)>,
    collection_events: Vec<(String, EntityHandlerSpec)>,
    dom_events: Vec<DomEventSpec>,
    hooks: Hooks,
}

impl ViewConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn el(mut self, el: Element) -> Self {
        self.el = Some(el);
        self
    }

    pub fn model(mut self, model: Model) -> Self {
        self.model = Some(model);
        self
    }

    pub fn collection(mut self, collection: Collection) -> Self {
        self.collection = Some(collection);
        self
    }

    pub fn template(mut self, template: impl Fn(&serde_json::Value) -> String + 'static) -> Self {
        self.template = Some(Rc::new(template));
        self
    }

    /// Extra template-context entries, mixed in after `model`/`collection`.
    pub fn locals(
        mut self,
        locals: impl Fn() -> serde_json::Map<String, serde_json::Value> + 'static,
    ) -> Self {
        self.locals = Some(Rc::new(locals));
        self
    }

    pub fn transformers(mut self, transformers: Transformers) -> Self {
        self.transformers = transformers;
        self
    }

    /// Register a named handler for command bindings, delegated DOM events,
    /// and entity-event maps. Dotted names (`"group.name"`) form handler
    /// groups selected by `bind-*-context` attributes.
    pub fn handler(mut self, name: &str, f: impl Fn(&View, HandlerArgs) + 'static) -> Self {
        self.handlers.insert(name.to_string(), Rc::new(f));
        self
    }

    /// Register a named binding context for `bind-*-context` attributes.
    pub fn context(mut self, name: &str, entity: Entity) -> Self {
        self.contexts.insert(name.to_string(), entity);
        self
    }

    pub fn model_event(mut self, event: &str, spec: EntityHandlerSpec) -> Self {
        self.model_events.push((event.to_string(), spec));
        self
    }

    pub fn collection_event(mut self, event: &str, spec: EntityHandlerSpec) -> Self {
        self.collection_events.push((event.to_string(), spec));
        self
    }

    /// Delegate a DOM event to a named handler, optionally restricted to
    /// descendant elements with the given tag.
    pub fn dom_event(mut self, event: &str, selector: Option<&str>, handler: &str) -> Self {
        self.dom_events.push(DomEventSpec {
            event: event.to_string(),
            selector: selector.map(str::to_string),
            handler: handler.to_string(),
        });
        self
    }

    pub fn on_before_render(mut self, f: impl Fn(&View) + 'static) -> Self {
        self.hooks.before_render = Some(Rc::new(f));
        self
    }

    pub fn on_render(mut self, f: impl Fn(&View) + 'static) -> Self {
        self.hooks.on_render = Some(Rc::new(f));
        self
    }

    pub fn on_before_remove(mut self, f: impl Fn(&View) + 'static) -> Self {
        self.hooks.before_remove = Some(Rc::new(f));
        self
    }

    pub fn on_remove(mut self, f: impl Fn(&View) + 'static) -> Self {
        self.hooks.on_remove = Some(Rc::new(f));
        self
    }

    pub fn build(self) -> View {
        View {
            inner: Rc::new(RefCell::new(ViewInner {
                el: self.el.unwrap_or_else(|| Element::new("div")),
                model: self.model,
                collection: self.collection,
                template: self.template,
                locals: self.locals,
                transformers: self.transformers,
                handlers: self.handlers,
                contexts: self.contexts,
                model_events: self.model_events,
                collection_events: self.collection_events,
                dom_events: self.dom_events,
                bindings: Vec::new(),
                child_bindings: Vec::new(),
                subviews: Vec::new(),
                superview: Weak::new(),
                emitter: Emitter::new(),
                listeners: Rc::new(ListenerRegistry::new()),
                dom_listeners: Vec::new(),
                state: ViewState::Unrendered,
                hooks: self.hooks,
            })),
        }
    }
}

struct ViewInner {
    el: Element,
    model: Option<Model>,
    collection: Option<Collection>,
    template: Option<TemplateFn>,
    locals: Option<LocalsFn>,
    transformers: Transformers,
    handlers: HashMap<String, ViewHandler>,
    contexts: HashMap<String, Entity>,
    model_events: Vec<(String, EntityHandlerSpec)>,
    collection_events: Vec<(String, EntityHandlerSpec)>,
    dom_events: Vec<DomEventSpec>,
    bindings: Vec<BindingRecord>,
    child_bindings: Vec<BindingRecord>,
    subviews: Vec<View>,
    superview: Weak<RefCell<ViewInner>>,
    emitter: Emitter<EntityEvent>,
    listeners: Rc<ListenerRegistry<EntityEvent>>,
    dom_listeners: Vec<(Element, SubscriptionId)>,
    state: ViewState,
    hooks: Hooks,
}

/// A view owning an element, optional model/collection, declarative
/// bindings, and an exclusively-owned subview tree.
///
/// `render` is idempotent: a rendered view cleans itself up first, so
/// calling it any number of times leaves one set of bindings and handlers.
#[derive(Clone)]
pub struct View {
    inner: Rc<RefCell<ViewInner>>,
}

/// Non-owning view handle for closures that must not keep the view alive.
pub struct ViewWeak {
    inner: Weak<RefCell<ViewInner>>,
}

impl ViewWeak {
    pub fn upgrade(&self) -> Option<View> {
        self.inner.upgrade().map(|inner| View { inner })
    }
}

impl View {
    pub fn downgrade(&self) -> ViewWeak {
        ViewWeak {
            inner: Rc::downgrade(&self.inner),
        }
    }

    pub fn same(&self, other: &View) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn el(&self) -> Element {
        self.inner.borrow().el.clone()
    }

    /// Swap the view's element (pre-render attachment point).
    pub fn set_element(&self, el: Element) {
        self.undelegate_events();
        self.inner.borrow_mut().el = el;
    }

    pub fn model(&self) -> Option<Model> {
        self.inner.borrow().model.clone()
    }

    pub fn collection(&self) -> Option<Collection> {
        self.inner.borrow().collection.clone()
    }

    pub fn state(&self) -> ViewState {
        self.inner.borrow().state
    }

    pub fn is_rendered(&self) -> bool {
        self.inner.borrow().state == ViewState::Rendered
    }

    // Rendering -------------------------------------------------------------

    pub fn render(&self) -> Result<(), ViewError> {
        self.render_with(RenderOptions::default())
    }

    /// Render the template into the element, establish bindings, and
    /// delegate events. A second render cleans up the first completely, so
    /// no handler or binding is ever duplicated.
    pub fn render_with(&self, options: RenderOptions) -> Result<(), ViewError> {
        if self.state() == ViewState::Removed {
            return Ok(());
        }
        debug!("render view");
        if self.state() == ViewState::Rendered {
            self.cleanup();
        }

        if let Some(hook) = self.hook(|h| h.before_render.clone()) {
            hook(self);
        }

        let (el, template) = {
            let inner = self.inner.borrow();
            (inner.el.clone(), inner.template.clone())
        };
        if let Some(template) = template {
            let markup = template(&self.template_context());
            el.set_html(&markup)?;
        }

        if options.animate {
            el.hide();
            el.show_with(Some(FAST_MS), || {});
        } else {
            el.show();
        }

        let (model, collection) = {
            let inner = self.inner.borrow();
            (inner.model.clone(), inner.collection.clone())
        };
        let records = self.add_bindings(&BindOptions {
            el,
            model: model.map(Entity::Model),
            collection,
            index: None,
            keypath_prefix: None,
        });
        self.inner.borrow_mut().bindings = records;

        self.delegate_events()?;
        self.inner.borrow_mut().state = ViewState::Rendered;

        if let Some(hook) = self.hook(|h| h.on_render.clone()) {
            hook(self);
        }
        Ok(())
    }

    /// Release everything this render cycle created: subviews (cascading),
    /// own and child bindings, delegated events, and subscriptions this
    /// view initiated elsewhere.
    pub fn cleanup(&self) {
        self.remove_subviews();
        let (own, children) = {
            let mut inner = self.inner.borrow_mut();
            (
                std::mem::take(&mut inner.bindings),
                std::mem::take(&mut inner.child_bindings),
            )
        };
        release_all(own);
        release_all(children);
        self.undelegate_events();
        let listeners = Rc::clone(&self.inner.borrow().listeners);
        listeners.stop();
    }

    pub fn remove(&self) {
        self.remove_with(RemoveOptions::default())
    }

    /// Remove the view for good: cleanup, detach the element (after the
    /// hide transition when animated), and mark the view terminal.
    pub fn remove_with(&self, options: RemoveOptions) {
        debug!("remove view");
        if let Some(hook) = self.hook(|h| h.before_remove.clone()) {
            hook(self);
        }
        self.cleanup();

        let el = self.el();
        let duration = options.animate.then_some(FAST_MS);
        let detached = el.clone();
        el.hide_with(duration, move || {
            detached.detach();
        });

        self.inner.borrow_mut().state = ViewState::Removed;
        if let Some(hook) = self.hook(|h| h.on_remove.clone()) {
            hook(self);
        }
    }

    fn hook(&self, pick: impl Fn(&Hooks) -> Option<HookFn>) -> Option<HookFn> {
        pick(&self.inner.borrow().hooks)
    }

    /// Template context: serialized model and collection plus locals.
    pub fn template_context(&self) -> serde_json::Value {
        let (model, collection, locals) = {
            let inner = self.inner.borrow();
            (
                inner.model.clone(),
                inner.collection.clone(),
                inner.locals.clone(),
            )
        };
        let mut context = serde_json::Map::new();
        context.insert(
            "model".to_string(),
            model
                .map(|m| m.to_json())
                .unwrap_or(serde_json::Value::Object(serde_json::Map::new())),
        );
        context.insert(
            "collection".to_string(),
            collection
                .map(|c| c.to_json())
                .unwrap_or(serde_json::Value::Object(serde_json::Map::new())),
        );
        if let Some(locals) = locals {
            for (key, value) in locals() {
                context.insert(key, value);
            }
        }
        serde_json::Value::Object(context)
    }

    // Bindings --------------------------------------------------------------

    /// Scan a subtree for binding directives and activate them. Returns the
    /// records for the top-level scope; nested scopes register their own
    /// records under the view's child bindings.
    pub fn add_bindings(&self, options: &BindOptions) -> Vec<BindingRecord> {
        engine::add_bindings(self, options)
    }

    /// Bind markup injected after the initial render; the new records join
    /// the view's own list.
    pub fn append_bindings(&self) {
        let (el, model, collection) = {
            let inner = self.inner.borrow();
            (
                inner.el.clone(),
                inner.model.clone(),
                inner.collection.clone(),
            )
        };
        let added = self.add_bindings(&BindOptions {
            el,
            model: model.map(Entity::Model),
            collection,
            index: None,
            keypath_prefix: None,
        });
        self.inner.borrow_mut().bindings.extend(added);
    }

    /// Release the view's own top-level bindings.
    pub fn remove_bindings(&self) {
        let own = std::mem::take(&mut self.inner.borrow_mut().bindings);
        release_all(own);
    }

    pub fn binding_count(&self) -> usize {
        self.inner.borrow().bindings.len()
    }

    pub fn child_binding_count(&self) -> usize {
        self.inner.borrow().child_bindings.len()
    }

    pub(crate) fn push_child_records(&self, records: Vec<BindingRecord>) {
        if records.is_empty() {
            return;
        }
        debug!(count = records.len(), "added child bindings");
        self.inner.borrow_mut().child_bindings.extend(records);
    }

    /// Tear down a nested scope's records: drop them from the tracked
    /// child-binding list and unsubscribe each.
    pub(crate) fn remove_child_records(&self, records: Vec<BindingRecord>) {
        if records.is_empty() {
            return;
        }
        let ids: std::collections::HashSet<u64> = records.iter().map(BindingRecord::id).collect();
        self.inner
            .borrow_mut()
            .child_bindings
            .retain(|record| !ids.contains(&record.id()));
        release_all(records);
    }

    // Named lookups ---------------------------------------------------------

    pub(crate) fn resolve_handler(&self, group: Option<&str>, name: &str) -> Option<ViewHandler> {
        let key = match group {
            Some(group) => format!("{group}.{name}"),
            None => name.to_string(),
        };
        self.inner.borrow().handlers.get(&key).cloned()
    }

    pub(crate) fn context_entity(&self, name: &str) -> Option<Entity> {
        self.inner.borrow().contexts.get(name).cloned()
    }

    pub(crate) fn transformers(&self) -> Transformers {
        self.inner.borrow().transformers.clone()
    }

    pub(crate) fn transform_model_to_view(&self, keypath: &str, value: &Value) -> Value {
        self.transformers().apply_model_to_view(keypath, value)
    }

    pub(crate) fn transform_view_to_model(&self, keypath: &str, value: &Value) -> Value {
        self.transformers().apply_view_to_model(keypath, value)
    }

    pub(crate) fn transform_index(&self, keypath: &str, index: i64) -> i64 {
        self.transformers().apply_index(keypath, index)
    }

    // Subviews --------------------------------------------------------------

    /// Register exclusive ownership of `subview`, optionally attach and
    /// render it, and forward its events under `subview:<event>`.
    pub fn add_subview(&self, subview: &View, options: SubviewOptions) -> Result<(), ViewError> {
        {
            let mut inner = self.inner.borrow_mut();
            inner.subviews.push(subview.clone());
        }
        subview.inner.borrow_mut().superview = Rc::downgrade(&self.inner);

        if let Some(el) = options.el {
            if options.append {
                el.append(&subview.el());
            } else {
                subview.set_element(el);
            }
        }
        if !options.skip_render {
            subview.render()?;
        }
        self.forward_subview_events(subview);
        Ok(())
    }

    /// Forward every event the subview emits to this view, namespaced.
    fn forward_subview_events(&self, subview: &View) {
        let weak = self.downgrade();
        let listeners = Rc::clone(&self.inner.borrow().listeners);
        listeners.listen(&subview.emitter(), "all", move |name, payload| {
            if let Some(view) = weak.upgrade() {
                view.trigger(&format!("subview:{name}"), payload);
            }
        });
    }

    pub fn superview(&self) -> Option<View> {
        self.inner
            .borrow()
            .superview
            .upgrade()
            .map(|inner| View { inner })
    }

    pub fn subviews(&self) -> Vec<View> {
        self.inner.borrow().subviews.clone()
    }

    /// Drop this view from its superview's ownership list (without
    /// removing it).
    pub fn remove_from_superview(&self) {
        if let Some(superview) = self.superview() {
            superview
                .inner
                .borrow_mut()
                .subviews
                .retain(|v| !v.same(self));
        }
        self.inner.borrow_mut().superview = Weak::new();
    }

    /// Detach and terminate one subview.
    pub fn remove_subview(&self, subview: &View) {
        subview.remove_from_superview();
        subview.remove();
    }

    /// Terminate every subview, cascading through their own subview trees.
    pub fn remove_subviews(&self) {
        let subviews = std::mem::take(&mut self.inner.borrow_mut().subviews);
        for subview in subviews {
            subview.remove();
        }
    }

    // Event delegation ------------------------------------------------------

    /// (Re-)bind the declarative DOM-event and entity-event maps. Always
    /// unbinds first, so re-delegation never stacks handlers.
    pub fn delegate_events(&self) -> Result<(), ViewError> {
        self.undelegate_events();

        let (el, model, collection, model_events, collection_events, dom_events) = {
            let inner = self.inner.borrow();
            (
                inner.el.clone(),
                inner.model.clone(),
                inner.collection.clone(),
                inner.model_events.clone(),
                inner.collection_events.clone(),
                inner.dom_events.clone(),
            )
        };

        if let Some(model) = &model {
            self.bind_entity_events(&model.emitter(), &model_events)?;
        }
        if let Some(collection) = &collection {
            self.bind_entity_events(&collection.emitter(), &collection_events)?;
        }

        for spec in &dom_events {
            let handler = self
                .resolve_handler(None, &spec.handler)
                .ok_or_else(|| ViewError::UnknownHandler(spec.handler.clone()))?;
            let targets: Vec<Element> = match &spec.selector {
                None => vec![el.clone()],
                Some(tag) => el
                    .descendants()
                    .into_iter()
                    .filter(|d| d.is_tag(tag))
                    .collect(),
            };
            for target in targets {
                let weak = self.downgrade();
                let handler = handler.clone();
                let id = target.on(&spec.event, move |event| {
                    if let Some(view) = weak.upgrade() {
                        handler(&view, HandlerArgs::Dom(event));
                    }
                });
                self.inner.borrow_mut().dom_listeners.push((target, id));
            }
        }
        Ok(())
    }

    fn bind_entity_events(
        &self,
        emitter: &Emitter<EntityEvent>,
        specs: &[(String, EntityHandlerSpec)],
    ) -> Result<(), ViewError> {
        let listeners = Rc::clone(&self.inner.borrow().listeners);
        for (event, spec) in specs {
            let handlers: Vec<ViewHandler> = match spec {
                EntityHandlerSpec::Handler(handler) => vec![handler.clone()],
                EntityHandlerSpec::Names(names) => {
                    let mut out = Vec::new();
                    for name in names.split_whitespace() {
                        let handler = self
                            .resolve_handler(None, name)
                            .ok_or_else(|| ViewError::UnknownHandler(name.to_string()))?;
                        out.push(handler);
                    }
                    out
                }
            };
            for handler in handlers {
                let weak = self.downgrade();
                listeners.listen(emitter, event, move |name, payload| {
                    if let Some(view) = weak.upgrade() {
                        handler(&view, HandlerArgs::Entity(name, payload));
                    }
                });
            }
        }
        Ok(())
    }

    /// Unbind delegated DOM events and entity-event maps.
    pub fn undelegate_events(&self) {
        let dom_listeners = std::mem::take(&mut self.inner.borrow_mut().dom_listeners);
        for (el, id) in dom_listeners {
            el.off(id);
        }
        let (listeners, model, collection) = {
            let inner = self.inner.borrow();
            (
                Rc::clone(&inner.listeners),
                inner.model.clone(),
                inner.collection.clone(),
            )
        };
        if let Some(model) = model {
            listeners.stop_emitter(&model.emitter());
        }
        if let Some(collection) = collection {
            listeners.stop_emitter(&collection.emitter());
        }
    }

    // View events -----------------------------------------------------------

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

    pub fn trigger(&self, event: &str, payload: &EntityEvent) {
        self.emitter().trigger(event, payload);
    }
}

/// A view preset that renders one item view per collection member into a
/// list element after its own render pass, owning the items as subviews.
pub fn collection_view(
    config: ViewConfig,
    list_el: Option<Element>,
    item_view: impl Fn(&Model) -> View + 'static,
) -> View {
    let item_view = Rc::new(item_view);
    let user_hook = config.hooks.on_render.clone();
    let mut config = config;
    config.hooks.on_render = Some(Rc::new(move |view: &View| {
        if let Some(user_hook) = &user_hook {
            user_hook(view);
        }
        let Some(collection) = view.collection() else {
            return;
        };
        let target = list_el.clone().unwrap_or_else(|| view.el());
        collection.each(|model, _| {
            let item = item_view(model);
            let _ = view.add_subview(
                &item,
                SubviewOptions {
                    el: Some(target.clone()),
                    append: true,
                    skip_render: false,
                },
            );
        });
    }));
    config.build()
}
