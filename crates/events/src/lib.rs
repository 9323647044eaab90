//! Observable primitive: a single-threaded event emitter with stable
//! subscription ids, plus listener-side bookkeeping.
//!
//! Subscriptions are keyed by event name. A subscription made with a
//! space-separated list (`"reset sort"`) matches any of the listed names;
//! the reserved name `all` matches every event. Handlers receive the
//! concrete event name along with the payload so multi-event and `all`
//! subscribers can tell deliveries apart.
//!
//! Dispatch runs against a snapshot of the subscription list, so a handler
//! may subscribe, unsubscribe, or trigger again without invalidating the
//! in-flight delivery.

use std::cell::RefCell;
use std::rc::Rc;

/// Stable handle for one subscription, used to unsubscribe later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

struct Subscription<T> {
    id: SubscriptionId,
    events: Vec<String>,
    handler: Rc<dyn Fn(&str, &T)>,
}

struct EmitterInner<T> {
    subs: Vec<Subscription<T>>,
    next_id: u64,
}

/// Event emitter handle. Cloning produces another handle to the same
/// subscription list; identity is the shared allocation.
pub struct Emitter<T> {
    inner: Rc<RefCell<EmitterInner<T>>>,
}

impl<T> Clone for Emitter<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> Default for Emitter<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Emitter<T> {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(EmitterInner {
                subs: Vec::new(),
                next_id: 1,
            })),
        }
    }

    /// Two handles are the same emitter when they share the allocation.
    pub fn same(&self, other: &Emitter<T>) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Subscribe `handler` to the space-separated `events` list.
    pub fn on(&self, events: &str, handler: impl Fn(&str, &T) + 'static) -> SubscriptionId {
        let mut inner = self.inner.borrow_mut();
        let id = SubscriptionId(inner.next_id);
        inner.next_id += 1;
        inner.subs.push(Subscription {
            id,
            events: events.split_whitespace().map(str::to_string).collect(),
            handler: Rc::new(handler),
        });
        id
    }

    /// Remove the subscription with `id`. Returns whether anything was
    /// removed; removing twice is a no-op.
    pub fn off(&self, id: SubscriptionId) -> bool {
        let mut inner = self.inner.borrow_mut();
        let before = inner.subs.len();
        inner.subs.retain(|sub| sub.id != id);
        inner.subs.len() != before
    }

    /// Drop every subscription.
    pub fn clear(&self) {
        self.inner.borrow_mut().subs.clear();
    }

    pub fn listener_count(&self) -> usize {
        self.inner.borrow().subs.len()
    }

    /// Deliver `payload` to every subscription matching `event`.
    pub fn trigger(&self, event: &str, payload: &T) {
        let matched: Vec<Rc<dyn Fn(&str, &T)>> = {
            let inner = self.inner.borrow();
            inner
                .subs
                .iter()
                .filter(|sub| sub.events.iter().any(|e| e == event || e == "all"))
                .map(|sub| Rc::clone(&sub.handler))
                .collect()
        };
        for handler in matched {
            handler(event, payload);
        }
    }
}

struct ListenRecord<T> {
    emitter: Emitter<T>,
    id: SubscriptionId,
}

/// Listener-side bookkeeping: records every subscription this object made on
/// other emitters so they can all be released at once.
pub struct ListenerRegistry<T> {
    records: RefCell<Vec<ListenRecord<T>>>,
}

impl<T> Default for ListenerRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ListenerRegistry<T> {
    pub fn new() -> Self {
        Self {
            records: RefCell::new(Vec::new()),
        }
    }

    /// Subscribe to `emitter` and remember the subscription.
    pub fn listen(
        &self,
        emitter: &Emitter<T>,
        events: &str,
        handler: impl Fn(&str, &T) + 'static,
    ) -> SubscriptionId {
        let id = emitter.on(events, handler);
        self.records.borrow_mut().push(ListenRecord {
            emitter: emitter.clone(),
            id,
        });
        id
    }

    /// Release one remembered subscription by id.
    pub fn stop_id(&self, id: SubscriptionId) -> bool {
        let record = {
            let mut records = self.records.borrow_mut();
            match records.iter().position(|r| r.id == id) {
                Some(pos) => records.swap_remove(pos),
                None => return false,
            }
        };
        record.emitter.off(record.id)
    }

    /// Release every remembered subscription on `emitter`.
    pub fn stop_emitter(&self, emitter: &Emitter<T>) {
        let dropped: Vec<ListenRecord<T>> = {
            let mut records = self.records.borrow_mut();
            let (on_emitter, rest): (Vec<_>, Vec<_>) =
                records.drain(..).partition(|r| r.emitter.same(emitter));
            *records = rest;
            on_emitter
        };
        for record in dropped {
            record.emitter.off(record.id);
        }
    }

    /// Release every remembered subscription.
    pub fn stop(&self) {
        let dropped: Vec<ListenRecord<T>> = self.records.borrow_mut().drain(..).collect();
        for record in dropped {
            record.emitter.off(record.id);
        }
    }

    pub fn len(&self) -> usize {
        self.records.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.borrow().is_empty()
    }
}
