//! Cancellable timers and the sequences built on them.
//!
//! Each timer runs on its own background thread and sleeps on a condition
//! variable, so that cancelling wakes it up right away instead of waiting for
//! the next tick.

use std::io;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use log::debug;
use thiserror::Error;

use crate::sequence::PushSequence;
use crate::subscriber::Subscriber;
use crate::subscription::{IntoTeardown, Teardown};


/// Prefix of the names of timer threads.
const THREAD_NAME: &str = "pushseq-timer";


/// Errors raised when setting up a timer.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum TimerError {
    /// The background thread driving the timer could not be started.
    #[error("failed to spawn timer thread: {0}")]
    Spawn(#[from] io::Error),
}


struct Shared {
    cancelled: Mutex<bool>,
    wake: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, bool> {
        self.cancelled.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Block until `deadline`, or until cancelled if there is none. Returns
    /// `false` if cancelled before.
    fn sleep_until(&self, deadline: Option<Instant>) -> bool {
        let mut cancelled = self.lock();
        loop {
            if *cancelled {
                return false;
            }
            cancelled = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return true;
                    }
                    match self.wake.wait_timeout(cancelled, deadline - now) {
                        Ok((guard, _)) => guard,
                        Err(poisoned) => poisoned.into_inner().0,
                    }
                }
                None => self.wake.wait(cancelled).unwrap_or_else(PoisonError::into_inner),
            };
        }
    }
}


/// A handle on a running timer.
///
/// Clones control the same timer. Dropping the handle does not cancel it.
#[derive(Clone)]
pub struct Timer {
    shared: Arc<Shared>,
}

impl Timer {
    fn spawn<F>(kind: &str, body: F) -> Result<Timer, TimerError>
        where F: FnOnce(&Shared) + Send + 'static,
    {
        let shared = Arc::new(Shared { cancelled: Mutex::new(false), wake: Condvar::new() });
        let thread_shared = shared.clone();
        thread::Builder::new()
            .name(format!("{}-{}", THREAD_NAME, kind))
            .spawn(move || body(&thread_shared))?;
        Ok(Timer { shared: shared })
    }

    /// Call `f` once after `delay`, unless cancelled first.
    ///
    /// A delay too long to represent never fires.
    pub fn after<F>(delay: Duration, f: F) -> Result<Timer, TimerError>
        where F: FnOnce() + Send + 'static,
    {
        let deadline = Instant::now().checked_add(delay);
        debug!("starting one-shot timer ({:?})", delay);
        Timer::spawn("after", move |shared| {
            if shared.sleep_until(deadline) {
                f();
            }
        })
    }

    /// Call `f` with `0, 1, 2, …` every `period`, until cancelled.
    ///
    /// Ticks are scheduled relative to the start, so a slow callback does not
    /// make the timer drift.
    pub fn every<F>(period: Duration, mut f: F) -> Result<Timer, TimerError>
        where F: FnMut(u64) + Send + 'static,
    {
        let start = Instant::now();
        debug!("starting recurring timer ({:?})", period);
        Timer::spawn("every", move |shared| {
            let mut deadline = Some(start);
            for tick in 0.. {
                // Past the representable range the timer just waits for cancel
                deadline = deadline.and_then(|d| d.checked_add(period));
                if !shared.sleep_until(deadline) {
                    break;
                }
                f(tick);
            }
        })
    }

    /// Stop the timer.
    ///
    /// No callback starts once the timer thread has observed the
    /// cancellation; a callback already running is not interrupted.
    /// Idempotent.
    pub fn cancel(&self) {
        let mut cancelled = self.shared.lock();
        if !*cancelled {
            debug!("cancelling timer");
            *cancelled = true;
            self.shared.wake.notify_all();
        }
    }

    /// Whether `cancel` has been called.
    pub fn is_cancelled(&self) -> bool {
        *self.shared.lock()
    }
}

impl From<Timer> for Teardown {
    fn from(timer: Timer) -> Teardown {
        Teardown::new(move || timer.cancel())
    }
}

impl<E> IntoTeardown<E> for Timer {
    fn into_teardown(self) -> Result<Teardown, E> { Ok(self.into()) }
}


/// Emit `0, 1, 2, …` every `period`.
///
/// The sequence never completes by itself; unsubscribing cancels the timer.
///
/// ```
/// # use pushseq::{interval, TimerError};
/// # use std::sync::mpsc::channel;
/// # use std::time::Duration;
/// let (tx, rx) = channel();
/// let ticks = interval::<TimerError>(Duration::from_millis(5));
/// let subscription = ticks.subscribe(move |n: u64| { let _ = tx.send(n); });
/// assert_eq!(rx.recv().unwrap(), 0);
/// assert_eq!(rx.recv().unwrap(), 1);
/// subscription.unsubscribe();
/// ```
pub fn interval<E>(period: Duration) -> PushSequence<u64, E>
    where E: From<TimerError> + Send + 'static,
{
    PushSequence::new(move |s: Subscriber<u64, E>| -> Result<Timer, E> {
        Timer::every(period, move |tick| s.emit(tick)).map_err(E::from)
    })
}

/// Emit `0` once after `delay`, then complete.
pub fn timer<E>(delay: Duration) -> PushSequence<u64, E>
    where E: From<TimerError> + Send + 'static,
{
    PushSequence::new(move |s: Subscriber<u64, E>| -> Result<Timer, E> {
        Timer::after(delay, move || {
            s.emit(0);
            s.complete();
        })
        .map_err(E::from)
    })
}
