//! Subscriptions and teardown.
//!
//! A `Subscription` represents one run of a sequence's producer. It owns the
//! cleanup actions (`Teardown`) that release whatever the producer acquired:
//! timers, threads, other subscriptions. These are run exactly once, either
//! when the caller unsubscribes or when the sequence terminates by itself.

use std::fmt;
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, warn};


/// A boxed cleanup action.
type Action = Box<dyn FnOnce() + Send + 'static>;

enum Kind {
    Noop,
    Action(Action),
    Subscription(Subscription),
}

/// A cleanup action run when a subscription ends.
///
/// Closures and subscriptions convert into a teardown via `From`, so most of
/// the time there is no need to construct one explicitly.
pub struct Teardown {
    kind: Kind,
}

impl Teardown {
    /// A teardown that does nothing.
    pub fn noop() -> Teardown {
        Teardown { kind: Kind::Noop }
    }

    /// Wrap a closure.
    pub fn new<F: FnOnce() + Send + 'static>(f: F) -> Teardown {
        Teardown { kind: Kind::Action(Box::new(f)) }
    }

    /// Execute the teardown.
    ///
    /// A panicking action is caught and logged, so that the caller can carry
    /// on with any remaining cleanup.
    fn run(self) {
        match self.kind {
            Kind::Noop => (),
            Kind::Action(action) => {
                if panic::catch_unwind(AssertUnwindSafe(action)).is_err() {
                    warn!("teardown action panicked; continuing with remaining teardown");
                }
            }
            Kind::Subscription(subscription) => subscription.unsubscribe(),
        }
    }
}

impl Default for Teardown {
    fn default() -> Teardown { Teardown::noop() }
}

impl From<()> for Teardown {
    fn from(_: ()) -> Teardown { Teardown::noop() }
}

impl<F: FnOnce() + Send + 'static> From<F> for Teardown {
    fn from(f: F) -> Teardown { Teardown::new(f) }
}

impl From<Subscription> for Teardown {
    fn from(subscription: Subscription) -> Teardown {
        Teardown { kind: Kind::Subscription(subscription) }
    }
}

impl fmt::Debug for Teardown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            Kind::Noop => f.write_str("Teardown::Noop"),
            Kind::Action(_) => f.write_str("Teardown::Action"),
            Kind::Subscription(ref s) => f.debug_tuple("Teardown::Subscription").field(s).finish(),
        }
    }
}


/// Anything a producer may hand back from its body.
///
/// A producer returns its teardown (or nothing). Returning `Err(e)` instead
/// reports a failure, which the subscriber receives through its `error`
/// callback. This allows producers to use the `?` operator.
pub trait IntoTeardown<E> {
    /// Convert into a teardown, or the error the producer failed with.
    fn into_teardown(self) -> Result<Teardown, E>;
}

impl<E> IntoTeardown<E> for () {
    fn into_teardown(self) -> Result<Teardown, E> { Ok(Teardown::noop()) }
}

impl<E> IntoTeardown<E> for Teardown {
    fn into_teardown(self) -> Result<Teardown, E> { Ok(self) }
}

impl<E> IntoTeardown<E> for Subscription {
    fn into_teardown(self) -> Result<Teardown, E> { Ok(self.into()) }
}

impl<E, F: FnOnce() + Send + 'static> IntoTeardown<E> for F {
    fn into_teardown(self) -> Result<Teardown, E> { Ok(Teardown::new(self)) }
}

impl<E, R: IntoTeardown<E>> IntoTeardown<E> for Result<R, E> {
    fn into_teardown(self) -> Result<Teardown, E> {
        self.and_then(IntoTeardown::into_teardown)
    }
}


struct State {
    closed: bool,
    teardowns: Vec<Teardown>,
}

/// A handle on one run of a sequence.
///
/// Clones refer to the same subscription. Dropping a handle does not
/// unsubscribe.
#[derive(Clone)]
pub struct Subscription {
    state: Arc<Mutex<State>>,
}

impl Subscription {
    /// Create an open subscription without any teardown.
    ///
    /// This is mostly useful as a container to `add` other subscriptions to.
    pub fn new() -> Subscription {
        Subscription {
            state: Arc::new(Mutex::new(State { closed: false, teardowns: vec![] })),
        }
    }

    /// Create a subscription that is already closed.
    pub fn closed() -> Subscription {
        Subscription {
            state: Arc::new(Mutex::new(State { closed: true, teardowns: vec![] })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether the subscription has ended.
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Cancel the subscription.
    ///
    /// The first call closes the subscription and runs every teardown in the
    /// order it was added. Subsequent calls do nothing.
    pub fn unsubscribe(&self) {
        let teardowns = {
            let mut state = self.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            mem::replace(&mut state.teardowns, vec![])
        };
        debug!("tearing down subscription ({} actions)", teardowns.len());
        // The lock is released here, so teardown may freely touch this
        // subscription again.
        for teardown in teardowns {
            teardown.run();
        }
    }

    /// Attach a teardown.
    ///
    /// If the subscription is already closed, the teardown runs right away.
    /// Adding a subscription to itself is ignored.
    pub fn add<T: Into<Teardown>>(&self, teardown: T) {
        let teardown = teardown.into();
        if let Kind::Subscription(ref other) = teardown.kind {
            if other.same_as(self) {
                return;
            }
        }
        let mut state = self.lock();
        if state.closed {
            drop(state);
            teardown.run();
        } else {
            state.teardowns.push(teardown);
        }
    }

    /// Detach a previously added subscription without unsubscribing it.
    pub fn remove(&self, other: &Subscription) {
        self.lock().teardowns.retain(|teardown| match teardown.kind {
            Kind::Subscription(ref s) => !s.same_as(other),
            _ => true,
        });
    }

    /// Whether two handles refer to the same subscription.
    pub fn same_as(&self, other: &Subscription) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }
}

impl Default for Subscription {
    fn default() -> Subscription { Subscription::new() }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("Subscription")
            .field("closed", &state.closed)
            .field("teardowns", &state.teardowns.len())
            .finish()
    }
}
