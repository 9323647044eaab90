//! Woodhouse: reactive deep-keypath models bound to a DOM tree through a
//! declarative attribute vocabulary.
//!
//! The pieces, bottom up:
//! - [`Model`]/[`Collection`]: deep-keypath attributes, relations, computed
//!   properties, deduplicated change events with wildcard ancestor
//!   notifications.
//! - [`View`]: template rendering, the `bind-*` binding engine, subview
//!   lifecycle with cascading teardown.
//! - [`Router`]/[`RequestPool`]: navigation that aborts in-flight requests
//!   on an actual route change.

mod router;

pub use router::{NavigateOptions, ReadyState, RequestHandle, RequestPool, Router};

pub use woodhouse_core::{
    deep, flatten_paths, raw_equal, Collection, ComputedSpec, Entity, EntityEvent, Model,
    ModelSpec, ModelWeak, Relation, RelationTarget, SetOptions, Value,
};
pub use woodhouse_dom::{parse_fragment, DomEvent, Element, Node, ParseError};
pub use woodhouse_events::{Emitter, ListenerRegistry, SubscriptionId};
pub use woodhouse_view::{
    collection_view, BindOptions, BindingRecord, BindingTarget, Directive, EntityHandlerSpec,
    HandlerArgs, RemoveOptions, RenderOptions, SubviewOptions, Transformers, View, ViewConfig,
    ViewError, ViewState, ViewWeak,
};

pub mod keypath {
    //! Dotted keypath string utilities.
    pub use woodhouse_keypath::*;
}

/// Library version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
