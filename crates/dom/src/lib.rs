//! In-memory element tree with the imperative surface a binding engine
//! consumes: attribute access, subtree query, deep clone, index-aware
//! insertion, visibility with completion callbacks, and per-element event
//! subscription.
//!
//! Markup enters the tree through [`parse_fragment`]; [`Element::html`]
//! serializes content back out so callers can compare before writing.

mod element;
mod event;
mod parse;

pub use element::{Element, Node};
pub use event::DomEvent;
pub use parse::{parse_fragment, ParseError};
