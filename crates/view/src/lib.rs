//! Declarative binding engine and view lifecycle.
//!
//! A [`View`] renders a template into its element, scans the result for
//! `bind-*` directive attributes, and keeps DOM and model state in sync
//! both ways until cleaned up. Rendering is idempotent; removal cascades
//! through exclusively-owned subviews.

mod binding;
mod directive;
mod engine;
mod transform;
mod view;

pub use binding::{release_all, BindingRecord, BindingTarget};
pub use directive::Directive;
pub use engine::BindOptions;
pub use transform::Transformers;
pub use view::{
    collection_view, EntityHandlerSpec, HandlerArgs, LocalsFn, RemoveOptions, RenderOptions,
    SubviewOptions, TemplateFn, View, ViewConfig, ViewError, ViewHandler, ViewState, ViewWeak,
};
