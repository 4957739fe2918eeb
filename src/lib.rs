//! Cold push-based sequences
//!
//! *pushseq* provides a minimal observable primitive in Rust: a lazy,
//! reusable description of a value-producing process that pushes its values
//! to whoever subscribes.
//!
//! Where a stream in a functional reactive network is *hot* (every listener
//! sees the same events), a `PushSequence` is *cold*: every subscription runs
//! the producer from scratch, with its own private state.
//!
//!
//! # Primitives
//!
//! - `PushSequence` holds a producer. Calling `subscribe` runs it with a fresh
//!   `Subscriber`.
//! - The producer pushes values into the `Subscriber` with `emit`, and ends
//!   the run with either `complete` or `raise_error`.
//! - The caller reacts through an `Observer`: up to three optional callbacks
//!   for values, the error and completion.
//! - `subscribe` hands back a `Subscription`. Calling `unsubscribe` on it
//!   cancels the run and executes the `Teardown` the producer returned.
//!
//! Once a run has completed, failed or been cancelled, everything pushed into
//! its subscriber is silently dropped, and the teardown runs exactly once.
//!
//!
//! # Example
//!
//! ```
//! # // NOTE: If you change this example, please update the README.md
//! # // accordingly, so that they remain in sync!
//! use std::sync::{Arc, Mutex};
//! use pushseq::{Observer, PushSequence};
//!
//! // Nothing runs yet
//! let books = PushSequence::new(|s| {
//!     for title in &["Goodnight Moon", "Winnie-the-Pooh", "Where the Wild Things Are"] {
//!         s.emit(title.to_string());
//!     }
//!     s.complete();
//!     || println!("executing teardown code")
//! });
//!
//! let log = Arc::new(Mutex::new(vec![]));
//! let observer = Observer::<String, String>::new()
//!     .on_next({
//!         let log = log.clone();
//!         move |title| log.lock().unwrap().push(title)
//!     })
//!     .on_complete({
//!         let log = log.clone();
//!         move || log.lock().unwrap().push("all done".to_string())
//!     });
//!
//! // Now the producer runs, and since it completes, tears down right away
//! let subscription = books.subscribe(observer);
//! assert!(subscription.is_closed());
//! assert_eq!(log.lock().unwrap().len(), 4);
//! ```
//!
//! Producers may also push from other threads. The `interval` sequence for
//! instance owns a recurring `Timer`, which it cancels on teardown:
//!
//! ```
//! use std::sync::mpsc::channel;
//! use std::time::Duration;
//! use pushseq::{interval, TimerError};
//!
//! let (tx, rx) = channel();
//! let subscription = interval::<TimerError>(Duration::from_millis(1))
//!     .subscribe(move |n: u64| { let _ = tx.send(n); });
//! assert_eq!(rx.iter().take(3).collect::<Vec<_>>(), vec![0, 1, 2]);
//! subscription.unsubscribe();
//! ```
//!
//! All types are `Send + Sync`, so subscribers can be handed to other
//! threads. Deliveries to one observer are serialized in call order: a
//! signal pushed while another is being delivered, even from inside an
//! observer callback, is queued and delivered next. Unsubscribing works from
//! anywhere.

#![warn(missing_docs)]

pub use crate::observer::Observer;
pub use crate::sequence::PushSequence;
pub use crate::subscriber::Subscriber;
pub use crate::subscription::{IntoTeardown, Subscription, Teardown};
pub use crate::timer::{interval, timer, Timer, TimerError};

mod observer;
mod sequence;
mod subscriber;
mod subscription;
mod timer;
#[cfg(test)]
mod testing;
