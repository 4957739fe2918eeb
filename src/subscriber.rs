//! The producer-facing end of a subscription.

use std::collections::VecDeque;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use log::{trace, warn};

use crate::observer::Observer;
use crate::subscription::{Subscription, Teardown};


enum Signal<T, E> {
    Next(T),
    Error(E),
    Complete,
}

/// Signals waiting to be delivered, and whether some call is delivering.
struct Pending<T, E> {
    signals: VecDeque<Signal<T, E>>,
    draining: bool,
}

struct Inner<T, E> {
    observer: Mutex<Observer<T, E>>,
    pending: Mutex<Pending<T, E>>,
    stopped: AtomicBool,
    subscription: Subscription,
}

impl<T, E> Inner<T, E> {
    fn observer(&self) -> MutexGuard<'_, Observer<T, E>> {
        self.observer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn pending(&self) -> MutexGuard<'_, Pending<T, E>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drop the observer's callbacks and whatever they captured.
    ///
    /// If a callback is running right now, the delivering call drops them
    /// once it returns instead.
    fn release(&self) {
        match self.observer.try_lock() {
            Ok(mut observer) => observer.clear(),
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner().clear(),
            Err(TryLockError::WouldBlock) => (),
        }
    }
}

/// Gives up the delivery role when an observer callback panics, so that
/// signals queued later still get delivered.
struct Draining<'a, T, E>(&'a Inner<T, E>);

impl<'a, T, E> Drop for Draining<'a, T, E> {
    fn drop(&mut self) {
        if thread::panicking() {
            warn!("observer callback panicked during delivery");
            self.0.pending().draining = false;
        }
    }
}


/// The endpoint a producer pushes its signals into.
///
/// A subscriber forwards values, an error or completion to the observer of a
/// single subscription. Once the subscription is terminal or has been
/// unsubscribed, every method silently does nothing.
///
/// Subscribers are cheap to clone and may be sent to other threads, e.g. to
/// emit from a timer. All clones feed the same observer, and deliveries to it
/// are serialized in call order. A signal pushed while another one is being
/// delivered, including from inside an observer callback, is queued and
/// delivered right after it.
pub struct Subscriber<T, E> {
    inner: Arc<Inner<T, E>>,
}

impl<T, E> Clone for Subscriber<T, E> {
    fn clone(&self) -> Subscriber<T, E> {
        Subscriber { inner: self.inner.clone() }
    }
}

impl<T: Send + 'static, E: Send + 'static> Subscriber<T, E> {
    /// Bind an observer to a subscription.
    ///
    /// Unsubscribing releases the observer, even while clones of the
    /// subscriber are still around.
    pub(crate) fn new(observer: Observer<T, E>, subscription: Subscription) -> Subscriber<T, E> {
        let inner = Arc::new(Inner {
            observer: Mutex::new(observer),
            pending: Mutex::new(Pending { signals: VecDeque::new(), draining: false }),
            stopped: AtomicBool::new(false),
            subscription: subscription.clone(),
        });
        let weak = Arc::downgrade(&inner);
        subscription.add(move || if let Some(inner) = weak.upgrade() {
            inner.release();
        });
        Subscriber { inner: inner }
    }
}

impl<T, E> Subscriber<T, E> {
    /// Whether further signals will be ignored.
    ///
    /// Long-running producers should poll this and stop working once it
    /// returns `true`.
    pub fn is_closed(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst) || self.inner.subscription.is_closed()
    }

    /// Claim the right to send the terminal signal.
    fn stop(&self) -> bool {
        !self.inner.subscription.is_closed() && !self.inner.stopped.swap(true, Ordering::SeqCst)
    }

    /// Push a value to the observer.
    pub fn emit(&self, value: T) {
        if self.is_closed() {
            return;
        }
        self.push(Signal::Next(value));
    }

    /// Terminate with an error.
    ///
    /// The observer's `error` callback runs first, then the subscription is
    /// torn down.
    pub fn raise_error(&self, err: E) {
        if !self.stop() {
            return;
        }
        trace!("sequence raised an error");
        self.push(Signal::Error(err));
    }

    /// Terminate successfully.
    ///
    /// The observer's `complete` callback runs first, then the subscription
    /// is torn down.
    pub fn complete(&self) {
        if !self.stop() {
            return;
        }
        trace!("sequence completed");
        self.push(Signal::Complete);
    }

    /// Attach an extra teardown to the underlying subscription.
    pub fn add<D: Into<Teardown>>(&self, teardown: D) {
        self.inner.subscription.add(teardown);
    }

    /// Queue a signal, then deliver the queue unless another call already
    /// does.
    fn push(&self, signal: Signal<T, E>) {
        {
            let mut pending = self.inner.pending();
            pending.signals.push_back(signal);
            if pending.draining {
                return;
            }
            pending.draining = true;
        }
        let _draining = Draining(&*self.inner);
        loop {
            let signal = {
                let mut pending = self.inner.pending();
                match pending.signals.pop_front() {
                    Some(signal) => signal,
                    None => {
                        pending.draining = false;
                        return;
                    }
                }
            };
            self.deliver(signal);
        }
    }

    fn deliver(&self, signal: Signal<T, E>) {
        let subscription = &self.inner.subscription;
        let mut observer = self.inner.observer();
        if subscription.is_closed() {
            observer.clear();
            return;
        }
        match signal {
            Signal::Next(value) => {
                observer.next(value);
                // Unsubscribed from within the callback
                if subscription.is_closed() {
                    observer.clear();
                }
            }
            Signal::Error(err) => self.terminate(observer, move |o| o.error(err)),
            Signal::Complete => self.terminate(observer, |o| o.complete()),
        }
    }

    /// Run a terminal callback, then tear down even if the callback panics.
    fn terminate<F>(&self, mut observer: MutexGuard<'_, Observer<T, E>>, callback: F)
        where F: FnOnce(&mut Observer<T, E>),
    {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| callback(&mut *observer)));
        observer.clear();
        drop(observer);
        self.inner.subscription.unsubscribe();
        if let Err(payload) = outcome {
            panic::resume_unwind(payload);
        }
    }
}

impl<T, E> fmt::Debug for Subscriber<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriber")
            .field("closed", &self.is_closed())
            .finish()
    }
}


#[cfg(test)]
mod test {
    use std::panic::{self, AssertUnwindSafe};
    use std::sync::{Arc, Mutex};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc::{channel, RecvTimeoutError};
    use std::thread;
    use std::time::Duration;

    use crate::observer::Observer;
    use crate::subscription::Subscription;
    use crate::testing::{Note, Recorder};
    use super::Subscriber;

    fn recorded<T, E>() -> (Recorder<T, E>, Subscriber<T, E>, Subscription)
        where T: Send + 'static, E: Send + 'static,
    {
        let rec = Recorder::new();
        let sub = Subscription::new();
        let subscriber = Subscriber::new(rec.observer(), sub.clone());
        (rec, subscriber, sub)
    }

    #[test]
    fn emit_in_order() {
        let (rec, s, _) = recorded::<i32, ()>();
        s.emit(1);
        s.emit(2);
        s.emit(3);
        s.complete();
        assert_eq!(rec.notes(), vec![
            Note::Next(1), Note::Next(2), Note::Next(3), Note::Complete,
        ]);
    }

    #[test]
    fn nothing_after_complete() {
        let (rec, s, sub) = recorded::<i32, &str>();
        s.complete();
        s.emit(1);
        s.raise_error("late");
        s.complete();
        assert_eq!(rec.notes(), vec![Note::Complete]);
        assert!(sub.is_closed());
    }

    #[test]
    fn error_short_circuits_completion() {
        let (rec, s, sub) = recorded::<i32, &str>();
        s.emit(1);
        s.raise_error("x");
        s.complete();
        s.emit(2);
        assert_eq!(rec.notes(), vec![Note::Next(1), Note::Error("x")]);
        assert!(sub.is_closed());
    }

    #[test]
    fn terminal_signal_runs_teardown_once() {
        let (_, s, sub) = recorded::<i32, ()>();
        let count = Arc::new(AtomicUsize::new(0));
        {
            let count = count.clone();
            sub.add(move || { count.fetch_add(1, Ordering::SeqCst); });
        }
        s.complete();
        sub.unsubscribe();
        s.complete();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn nothing_after_unsubscribe() {
        let (rec, s, sub) = recorded::<i32, ()>();
        s.emit(1);
        sub.unsubscribe();
        s.emit(2);
        s.complete();
        assert_eq!(rec.notes(), vec![Note::Next(1)]);
        assert!(s.is_closed());
    }

    #[test]
    fn unsubscribe_from_inside_next() {
        let sub = Subscription::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let observer: Observer<i32, ()> = {
            let (sub, seen) = (sub.clone(), seen.clone());
            Observer::new().on_next(move |n: i32| {
                seen.fetch_add(1, Ordering::SeqCst);
                if n == 2 {
                    sub.unsubscribe();
                }
            })
        };
        let s = Subscriber::new(observer, sub.clone());
        for n in 1..5 {
            s.emit(n);
        }
        assert_eq!(seen.load(Ordering::SeqCst), 2);
        assert!(sub.is_closed());
    }

    #[test]
    fn complete_may_unsubscribe() {
        let sub = Subscription::new();
        let observer: Observer<(), ()> = {
            let sub = sub.clone();
            Observer::new().on_complete(move || sub.unsubscribe())
        };
        let s = Subscriber::new(observer, sub.clone());
        s.complete();
        assert!(sub.is_closed());
    }

    #[test]
    fn emit_from_many_threads() {
        let (rec, s, _) = recorded::<usize, ()>();
        let handles: Vec<_> = (0..4)
            .map(|k| {
                let s = s.clone();
                thread::spawn(move || for n in 0..100 { s.emit(k * 100 + n) })
            })
            .collect();
        for handle in handles { handle.join().unwrap(); }
        s.complete();
        let notes = rec.notes();
        assert_eq!(notes.len(), 401);
        assert_eq!(notes.last(), Some(&Note::Complete));
    }

    /// A subscriber whose observer gets a handle on that same subscriber.
    fn looped<F>(on_next: F) -> (Arc<Mutex<Vec<Note<i32, ()>>>>, Subscriber<i32, ()>)
        where F: Fn(&Subscriber<i32, ()>, i32) + Send + 'static,
    {
        let notes = Arc::new(Mutex::new(vec![]));
        let slot: Arc<Mutex<Option<Subscriber<i32, ()>>>> = Default::default();
        let observer = Observer::new()
            .on_next({
                let (notes, slot) = (notes.clone(), slot.clone());
                move |n: i32| {
                    notes.lock().unwrap().push(Note::Next(n));
                    let s = slot.lock().unwrap().clone();
                    if let Some(s) = s {
                        on_next(&s, n);
                    }
                }
            })
            .on_complete({
                let notes = notes.clone();
                move || notes.lock().unwrap().push(Note::Complete)
            });
        let s = Subscriber::new(observer, Subscription::new());
        *slot.lock().unwrap() = Some(s.clone());
        (notes, s)
    }

    #[test]
    fn signals_from_inside_next_are_queued() {
        let (notes, s) = looped(|s, n| if n == 1 {
            s.emit(2);
            s.complete();
            s.emit(3);
        });
        s.emit(1);
        assert_eq!(*notes.lock().unwrap(), vec![
            Note::Next(1), Note::Next(2), Note::Complete,
        ]);
        assert!(s.is_closed());
    }

    #[test]
    fn emit_from_another_thread_inside_next() {
        let (notes, s) = looped(|s, n| if n == 1 {
            let s = s.clone();
            thread::spawn(move || s.emit(2)).join().unwrap();
        });
        s.emit(1);
        s.complete();
        assert_eq!(*notes.lock().unwrap(), vec![
            Note::Next(1), Note::Next(2), Note::Complete,
        ]);
    }

    #[test]
    fn panicking_observer_does_not_wedge() {
        let notes: Arc<Mutex<Vec<Note<i32, ()>>>> = Arc::new(Mutex::new(vec![]));
        let observer: Observer<i32, ()> = Observer::new()
            .on_next({
                let notes = notes.clone();
                move |n: i32| {
                    if n == 1 {
                        panic!("observer failure");
                    }
                    notes.lock().unwrap().push(Note::Next(n));
                }
            })
            .on_complete({
                let notes = notes.clone();
                move || notes.lock().unwrap().push(Note::Complete)
            });
        let sub = Subscription::new();
        let torn_down = Arc::new(AtomicUsize::new(0));
        {
            let torn_down = torn_down.clone();
            sub.add(move || { torn_down.fetch_add(1, Ordering::SeqCst); });
        }
        let s = Subscriber::new(observer, sub.clone());
        assert!(panic::catch_unwind(AssertUnwindSafe(|| s.emit(1))).is_err());
        s.emit(2);
        s.complete();
        assert_eq!(*notes.lock().unwrap(), vec![Note::Next(2), Note::Complete]);
        assert!(sub.is_closed());
        assert_eq!(torn_down.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unsubscribe_after_panicking_observer() {
        let observer: Observer<i32, ()> = Observer::new().on_next(|_: i32| panic!("observer failure"));
        let sub = Subscription::new();
        let torn_down = Arc::new(AtomicUsize::new(0));
        {
            let torn_down = torn_down.clone();
            sub.add(move || { torn_down.fetch_add(1, Ordering::SeqCst); });
        }
        let s = Subscriber::new(observer, sub.clone());
        assert!(panic::catch_unwind(AssertUnwindSafe(|| s.emit(1))).is_err());
        sub.unsubscribe();
        assert_eq!(torn_down.load(Ordering::SeqCst), 1);
        assert!(s.is_closed());
    }

    #[test]
    fn unsubscribe_releases_the_observer() {
        let (tx, rx) = channel::<i32>();
        let sub = Subscription::new();
        let s: Subscriber<i32, ()> = Subscriber::new(Observer::from(move |n: i32| { let _ = tx.send(n); }), sub.clone());
        s.emit(1);
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)), Ok(1));
        sub.unsubscribe();
        // The subscriber is still alive, but the sender is gone
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)), Err(RecvTimeoutError::Disconnected));
        drop(s);
    }

    #[test]
    fn unsubscribe_inside_next_releases_the_observer() {
        let (tx, rx) = channel::<i32>();
        let sub = Subscription::new();
        let observer: Observer<i32, ()> = {
            let sub = sub.clone();
            Observer::from(move |n: i32| {
                let _ = tx.send(n);
                sub.unsubscribe();
            })
        };
        let s = Subscriber::new(observer, sub.clone());
        s.emit(1);
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)), Ok(1));
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)), Err(RecvTimeoutError::Disconnected));
        drop(s);
    }
}
