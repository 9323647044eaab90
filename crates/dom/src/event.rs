use std::cell::Cell;

use crate::Element;

/// A dispatched element event. Events do not bubble; delivery is to the
/// target element's own subscribers only.
pub struct DomEvent {
    event_type: String,
    target: Element,
    default_prevented: Cell<bool>,
    propagation_stopped: Cell<bool>,
}

impl DomEvent {
    pub(crate) fn new(event_type: &str, target: Element) -> Self {
        Self {
            event_type: event_type.to_string(),
            target,
            default_prevented: Cell::new(false),
            propagation_stopped: Cell::new(false),
        }
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn target(&self) -> &Element {
        &self.target
    }

    pub fn prevent_default(&self) {
        self.default_prevented.set(true);
    }

    pub fn default_prevented(&self) -> bool {
        self.default_prevented.get()
    }

    pub fn stop_propagation(&self) {
        self.propagation_stopped.set(true);
    }

    pub fn propagation_stopped(&self) -> bool {
        self.propagation_stopped.get()
    }
}
