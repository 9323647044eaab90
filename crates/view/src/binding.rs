use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::debug;
use woodhouse_core::EntityEvent;
use woodhouse_dom::Element;
use woodhouse_events::{Emitter, SubscriptionId};

/// Anything a binding can be torn down from. Both entity emitters and DOM
/// elements qualify; the engine never cares which it holds.
pub trait BindingTarget {
    /// Remove one subscription. Returns `false` when it was already gone;
    /// double removal is a no-op, never an error.
    fn unsubscribe(&self, id: SubscriptionId) -> bool;
}

impl BindingTarget for Emitter<EntityEvent> {
    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.off(id)
    }
}

impl BindingTarget for Element {
    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.off(id)
    }
}

/// One live binding: an opaque capability for later unsubscription.
#[derive(Clone)]
pub struct BindingRecord {
    id: u64,
    target: Rc<dyn BindingTarget>,
    subscription: SubscriptionId,
}

impl BindingRecord {
    pub fn new(target: Rc<dyn BindingTarget>, subscription: SubscriptionId) -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self {
            id: NEXT.fetch_add(1, Ordering::Relaxed),
            target,
            subscription,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Unsubscribe this record from its source. Safe to call repeatedly.
    pub fn release(&self) -> bool {
        self.target.unsubscribe(self.subscription)
    }
}

/// Drain `records` front to back, unsubscribing each. Records whose source
/// already dropped the subscription are skipped. Returns how many records
/// were drained.
pub fn release_all(records: Vec<BindingRecord>) -> usize {
    let count = records.len();
    for record in records {
        record.release();
    }
    if count > 0 {
        debug!(count, "released bindings");
    }
    count
}
