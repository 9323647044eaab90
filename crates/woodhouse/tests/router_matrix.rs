//! Navigation-guard matrix: in-flight abort on route change, same-route
//! no-op, and the navigation predicate.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use woodhouse::{NavigateOptions, ReadyState, RequestHandle, RequestPool, Router};

struct FakeRequest {
    state: Cell<ReadyState>,
    aborted: Cell<bool>,
}

impl FakeRequest {
    fn new(state: ReadyState) -> Rc<Self> {
        Rc::new(Self {
            state: Cell::new(state),
            aborted: Cell::new(false),
        })
    }
}

impl RequestHandle for FakeRequest {
    fn ready_state(&self) -> ReadyState {
        self.state.get()
    }

    fn abort(&self) {
        self.aborted.set(true);
        self.state.set(ReadyState::Done);
    }
}

fn recording_router(pool: Rc<RequestPool>) -> (Router, Rc<RefCell<Vec<String>>>) {
    let log = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&log);
    let router = Router::new(pool, move |route, _| sink.borrow_mut().push(route.to_string()));
    (router, log)
}

#[test]
fn navigation_aborts_only_in_flight_requests() {
    let pool = Rc::new(RequestPool::new());
    let unsent = FakeRequest::new(ReadyState::Unsent);
    let loading = FakeRequest::new(ReadyState::Loading);
    let done = FakeRequest::new(ReadyState::Done);
    pool.track(unsent.clone());
    pool.track(loading.clone());
    pool.track(done.clone());

    let (router, log) = recording_router(Rc::clone(&pool));
    router.navigate("inbox", NavigateOptions::default());

    assert!(!unsent.aborted.get());
    assert!(loading.aborted.get());
    assert!(!done.aborted.get());
    assert!(pool.is_empty(), "pool cleared after navigation");
    assert_eq!(log.borrow().as_slice(), &["inbox"]);
    assert_eq!(router.fragment().as_deref(), Some("inbox"));
}

#[test]
fn navigating_to_the_active_route_is_a_no_op() {
    let pool = Rc::new(RequestPool::new());
    let (router, log) = recording_router(Rc::clone(&pool));
    router.navigate("inbox", NavigateOptions::default());

    let pending = FakeRequest::new(ReadyState::Opened);
    pool.track(pending.clone());
    router.navigate("inbox", NavigateOptions::default());

    assert!(!pending.aborted.get(), "no-op navigation leaves requests alone");
    assert_eq!(pool.len(), 1);
    assert_eq!(log.borrow().len(), 1);
}

#[test]
fn should_navigate_vetoes_without_side_effects() {
    let pool = Rc::new(RequestPool::new());
    let pending = FakeRequest::new(ReadyState::Loading);
    pool.track(pending.clone());

    let log = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&log);
    let router = Router::new(Rc::clone(&pool), move |route, _| {
        sink.borrow_mut().push(route.to_string())
    })
    .with_should_navigate(|_| false);

    router.navigate("inbox", NavigateOptions::default());
    assert!(log.borrow().is_empty());
    assert!(!pending.aborted.get());
    assert_eq!(router.fragment(), None);
}

#[test]
fn force_clears_the_remembered_fragment_before_delegating() {
    let pool = Rc::new(RequestPool::new());
    let (router, log) = recording_router(pool);
    router.navigate("a", NavigateOptions::default());
    router.navigate(
        "b",
        NavigateOptions {
            force: true,
            replace: false,
        },
    );

    assert_eq!(log.borrow().as_slice(), &["a", "b"]);
    assert_eq!(router.fragment().as_deref(), Some("b"));
}

#[test]
fn aborted_requests_do_not_count_as_errors() {
    // An abort flips the request to Done; re-running the sweep finds
    // nothing further to do.
    let pool = Rc::new(RequestPool::new());
    let request = FakeRequest::new(ReadyState::HeadersReceived);
    pool.track(request.clone());
    assert_eq!(pool.abort_in_flight(), 1);

    pool.track(request.clone());
    assert_eq!(pool.abort_in_flight(), 0);
    assert!(request.aborted.get());
}
