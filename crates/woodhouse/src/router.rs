//! Navigation guard: route changes abort every in-flight request before
//! the underlying history sink sees the new route.

use std::cell::RefCell;
use std::rc::Rc;

use tracing::debug;

/// Lifecycle state of a tracked request, mirroring the XHR ready states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ReadyState {
    Unsent,
    Opened,
    HeadersReceived,
    Loading,
    Done,
}

impl ReadyState {
    /// Started but not finished: the window in which an abort is useful.
    pub fn in_flight(self) -> bool {
        self > ReadyState::Unsent && self < ReadyState::Done
    }
}

/// A cancelable request handle. Aborting is fire-and-forget; an aborted
/// request must complete as a non-error outcome with no further state
/// mutation.
pub trait RequestHandle {
    fn ready_state(&self) -> ReadyState;
    fn abort(&self);
}

/// Application-scoped pool of outstanding request handles. Owned by the
/// application alongside its router; lifetime is app start to app stop.
#[derive(Default)]
pub struct RequestPool {
    requests: RefCell<Vec<Rc<dyn RequestHandle>>>,
}

impl RequestPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a request until the next route change clears the pool.
    pub fn track(&self, request: Rc<dyn RequestHandle>) {
        self.requests.borrow_mut().push(request);
    }

    pub fn len(&self) -> usize {
        self.requests.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.borrow().is_empty()
    }

    /// Abort every request still in flight and clear the pool. Returns how
    /// many aborts were issued.
    pub fn abort_in_flight(&self) -> usize {
        let drained: Vec<Rc<dyn RequestHandle>> = self.requests.borrow_mut().drain(..).collect();
        let mut aborted = 0;
        for request in drained {
            if request.ready_state().in_flight() {
                debug!("request aborted by router navigation");
                request.abort();
                aborted += 1;
            }
        }
        aborted
    }
}

/// Options for one navigation.
#[derive(Debug, Clone, Copy, Default)]
pub struct NavigateOptions {
    /// Forget the current fragment first, so navigating to it again
    /// re-runs the route.
    pub force: bool,
    /// Record the route without running its handler (passed through to the
    /// history sink).
    pub replace: bool,
}

type ShouldNavigateFn = Box<dyn Fn(&NavigateOptions) -> bool>;
type NavigateSink = Box<dyn Fn(&str, &NavigateOptions)>;

/// Router front: decides whether a navigation happens, cancels outstanding
/// requests when it does, and delegates the actual history change.
pub struct Router {
    pool: Rc<RequestPool>,
    fragment: RefCell<Option<String>>,
    should_navigate: ShouldNavigateFn,
    sink: NavigateSink,
}

impl Router {
    pub fn new(pool: Rc<RequestPool>, sink: impl Fn(&str, &NavigateOptions) + 'static) -> Self {
        Self {
            pool,
            fragment: RefCell::new(None),
            should_navigate: Box::new(|_| true),
            sink: Box::new(sink),
        }
    }

    /// Replace the default always-true navigation predicate.
    pub fn with_should_navigate(
        mut self,
        predicate: impl Fn(&NavigateOptions) -> bool + 'static,
    ) -> Self {
        self.should_navigate = Box::new(predicate);
        self
    }

    /// The currently-active route fragment.
    pub fn fragment(&self) -> Option<String> {
        self.fragment.borrow().clone()
    }

    pub fn pool(&self) -> &Rc<RequestPool> {
        &self.pool
    }

    /// Navigate to `route`. Navigating to the active route is a no-op, the
    /// predicate may veto, and an actual change aborts every in-flight
    /// request before delegating to the history sink.
    pub fn navigate(&self, route: &str, options: NavigateOptions) {
        if self.fragment.borrow().as_deref() == Some(route) {
            return;
        }
        if !(self.should_navigate)(&options) {
            return;
        }
        self.pool.abort_in_flight();
        if options.force {
            *self.fragment.borrow_mut() = None;
        }
        (self.sink)(route, &options);
        *self.fragment.borrow_mut() = Some(route.to_string());
    }
}
