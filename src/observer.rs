//! Observers: the callbacks reacting to a sequence.

use std::fmt;


type NextFn<T> = Box<dyn FnMut(T) + Send + 'static>;
type ErrorFn<E> = Box<dyn FnOnce(E) + Send + 'static>;
type CompleteFn = Box<dyn FnOnce() + Send + 'static>;


/// A set of up to three callbacks reacting to values, an error and
/// completion.
///
/// Every callback is optional; a missing one simply ignores the respective
/// signal. Since `error` and `complete` are terminal, they are called at most
/// once, so they may be `FnOnce`.
///
/// ```
/// # use pushseq::{Observer, PushSequence};
/// let observer = Observer::new()
///     .on_next(|n: i32| println!("value produced: {}", n))
///     .on_error(|err: String| println!("ERROR: {}", err))
///     .on_complete(|| println!("all done producing values"));
/// PushSequence::of(vec![1, 3, 5]).subscribe(observer);
/// ```
///
/// Any closure taking a value converts into an observer that only listens
/// to values:
///
/// ```
/// # use pushseq::PushSequence;
/// PushSequence::<_, ()>::of(vec![2, 4]).subscribe(|n: i32| println!("{}", n));
/// ```
pub struct Observer<T, E> {
    next: Option<NextFn<T>>,
    error: Option<ErrorFn<E>>,
    complete: Option<CompleteFn>,
}

impl<T, E> Observer<T, E> {
    /// An observer ignoring everything.
    pub fn new() -> Observer<T, E> {
        Observer { next: None, error: None, complete: None }
    }

    /// Set the callback for values.
    pub fn on_next<F>(mut self, f: F) -> Observer<T, E>
        where F: FnMut(T) + Send + 'static,
    {
        self.next = Some(Box::new(f));
        self
    }

    /// Set the callback for the error signal.
    pub fn on_error<F>(mut self, f: F) -> Observer<T, E>
        where F: FnOnce(E) + Send + 'static,
    {
        self.error = Some(Box::new(f));
        self
    }

    /// Set the callback for the completion signal.
    pub fn on_complete<F>(mut self, f: F) -> Observer<T, E>
        where F: FnOnce() + Send + 'static,
    {
        self.complete = Some(Box::new(f));
        self
    }

    pub(crate) fn next(&mut self, value: T) {
        if let Some(ref mut next) = self.next {
            next(value);
        }
    }

    /// Deliver an error. Both terminal callbacks are dropped afterwards.
    pub(crate) fn error(&mut self, err: E) {
        self.complete = None;
        if let Some(error) = self.error.take() {
            error(err);
        }
    }

    /// Deliver completion. Both terminal callbacks are dropped afterwards.
    pub(crate) fn complete(&mut self) {
        self.error = None;
        if let Some(complete) = self.complete.take() {
            complete();
        }
    }

    /// Drop all callbacks, releasing whatever they captured.
    pub(crate) fn clear(&mut self) {
        self.next = None;
        self.error = None;
        self.complete = None;
    }
}

impl<T, E> Default for Observer<T, E> {
    fn default() -> Observer<T, E> { Observer::new() }
}

impl<T, E, F> From<F> for Observer<T, E>
    where F: FnMut(T) + Send + 'static,
{
    fn from(f: F) -> Observer<T, E> {
        Observer::new().on_next(f)
    }
}

impl<T, E> fmt::Debug for Observer<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observer")
            .field("next", &self.next.is_some())
            .field("error", &self.error.is_some())
            .field("complete", &self.complete.is_some())
            .finish()
    }
}
