//! Reactive deep-keypath models.
//!
//! A [`Model`] owns an ordered attribute map addressed by dotted keypaths.
//! Mutation goes through [`Model::set`], which compares deeply, records
//! changed paths, and emits one `change:<path>` per changed leaf plus one
//! `change:<ancestor>.*` per ancestor level, deduplicated per call, before
//! a single aggregate `change`. Relations keep declared keys coerced to
//! live [`Model`]/[`Collection`] instances; computed properties re-broadcast
//! when their declared dependencies change.

pub mod deep;

mod collection;
mod entity;
mod event;
mod model;
mod relation;
mod value;

pub use collection::Collection;
pub use entity::Entity;
pub use event::EntityEvent;
pub use model::{Model, ModelSpec, ModelWeak, SetOptions};
pub use relation::{Relation, RelationTarget};
pub use value::{flatten_paths, raw_equal, ComputedSpec, Value};

use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide instance counter for diagnostic ids.
pub(crate) fn next_cid() -> u64 {
    static NEXT: AtomicU64 = AtomicU64::new(1);
    NEXT.fetch_add(1, Ordering::Relaxed)
}
