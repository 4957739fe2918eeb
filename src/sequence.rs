//! Cold push-based sequences.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use log::{trace, warn};

use crate::observer::Observer;
use crate::subscriber::Subscriber;
use crate::subscription::{IntoTeardown, Subscription, Teardown};


/// A type-erased producer.
type Producer<T, E> = dyn Fn(Subscriber<T, E>) -> Result<Teardown, E> + Send + Sync + 'static;


/// A lazy, reusable description of how to push values to a subscriber.
///
/// A sequence does nothing by itself. Every call to `subscribe` runs the
/// producer anew with a fresh subscriber, so two subscriptions never share
/// any state ("cold" semantics).
///
/// The producer may push values synchronously, or hand its subscriber to a
/// timer or another thread and push later. It returns the teardown to run
/// once the subscription ends, or nothing. Returning an `Err` reports a
/// failure through the observer's `error` callback.
///
/// ```
/// # use pushseq::{PushSequence, Observer};
/// # use std::sync::{Arc, Mutex};
/// let sequence = PushSequence::new(|s| {
///     s.emit(1);
///     s.emit(2);
///     s.complete();
///     || println!("executing teardown code")
/// });
///
/// let sum = Arc::new(Mutex::new(0));
/// let subscription = sequence.subscribe(Observer::<i32, ()>::new().on_next({
///     let sum = sum.clone();
///     move |n| *sum.lock().unwrap() += n
/// }));
/// assert_eq!(*sum.lock().unwrap(), 3);
/// assert!(subscription.is_closed());
/// ```
pub struct PushSequence<T, E = ()> {
    producer: Arc<Producer<T, E>>,
}

impl<T, E> Clone for PushSequence<T, E> {
    fn clone(&self) -> PushSequence<T, E> {
        PushSequence { producer: self.producer.clone() }
    }
}

impl<T, E> PushSequence<T, E> {
    /// Create a sequence from a producer.
    ///
    /// The producer is only stored; it runs once per subscription.
    pub fn new<F, R>(producer: F) -> PushSequence<T, E>
        where F: Fn(Subscriber<T, E>) -> R + Send + Sync + 'static,
              R: IntoTeardown<E>,
    {
        PushSequence {
            producer: Arc::new(move |subscriber| producer(subscriber).into_teardown()),
        }
    }

    /// Start a new run of the producer.
    ///
    /// Accepts a full `Observer` or just a closure for values. Returns as
    /// soon as the producer has returned, which does not mean the sequence
    /// is done.
    ///
    /// If the producer panics, the subscription is torn down before the
    /// panic continues.
    pub fn subscribe<O>(&self, observer: O) -> Subscription
        where O: Into<Observer<T, E>>,
              T: Send + 'static,
              E: Send + 'static,
    {
        trace!("subscribing to sequence");
        let subscription = Subscription::new();
        let subscriber = Subscriber::new(observer.into(), subscription.clone());
        let produced = panic::catch_unwind(AssertUnwindSafe(|| (self.producer)(subscriber.clone())));
        match produced {
            // Runs at once if the producer already terminated
            Ok(Ok(teardown)) => subscription.add(teardown),
            Ok(Err(err)) => subscriber.raise_error(err),
            Err(payload) => {
                warn!("producer panicked; tearing down its subscription");
                subscription.unsubscribe();
                panic::resume_unwind(payload);
            }
        }
        subscription
    }
}

impl<T: Send + 'static, E: 'static> PushSequence<T, E> {
    /// A sequence that completes right away.
    pub fn empty() -> PushSequence<T, E> {
        PushSequence::new(|s: Subscriber<T, E>| s.complete())
    }

    /// A sequence that never signals anything.
    pub fn never() -> PushSequence<T, E> {
        PushSequence::new(|_: Subscriber<T, E>| ())
    }

    /// Emit every item of a collection, then complete.
    ///
    /// The collection is cloned for every subscription. Emission stops early
    /// if the subscriber is closed in between.
    ///
    /// ```
    /// # use pushseq::PushSequence;
    /// # use std::sync::{Arc, Mutex};
    /// let titles = PushSequence::<_, ()>::from_iter(vec!["Ulysses", "Emma"]);
    /// let seen = Arc::new(Mutex::new(vec![]));
    /// titles.subscribe({
    ///     let seen = seen.clone();
    ///     move |title: &'static str| seen.lock().unwrap().push(title)
    /// });
    /// assert_eq!(*seen.lock().unwrap(), vec!["Ulysses", "Emma"]);
    /// ```
    pub fn from_iter<I>(iterable: I) -> PushSequence<T, E>
        where I: IntoIterator<Item=T> + Clone + Send + Sync + 'static,
    {
        PushSequence::new(move |s: Subscriber<T, E>| {
            for item in iterable.clone() {
                if s.is_closed() {
                    return;
                }
                s.emit(item);
            }
            s.complete();
        })
    }

    /// Emit the given values in order, then complete.
    pub fn of(values: Vec<T>) -> PushSequence<T, E>
        where T: Clone + Sync,
    {
        PushSequence::from_iter(values)
    }
}

impl<T: Send + 'static, E: Clone + Send + Sync + 'static> PushSequence<T, E> {
    /// A sequence that raises the given error right away.
    pub fn throw_error(err: E) -> PushSequence<T, E> {
        PushSequence::new(move |s: Subscriber<T, E>| s.raise_error(err.clone()))
    }
}

impl<T, E> fmt::Debug for PushSequence<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PushSequence")
    }
}
