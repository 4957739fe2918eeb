//! Utilities for the test suite.

use std::sync::{Arc, Mutex};

use crate::observer::Observer;


/// A signal as seen by an observer.
#[derive(Clone, Debug, PartialEq)]
pub enum Note<T, E> {
    Next(T),
    Error(E),
    Complete,
}

/// Records everything an observer receives, in order.
pub struct Recorder<T, E> {
    notes: Arc<Mutex<Vec<Note<T, E>>>>,
}

impl<T, E> Clone for Recorder<T, E> {
    fn clone(&self) -> Recorder<T, E> {
        Recorder { notes: self.notes.clone() }
    }
}

impl<T: Send + 'static, E: Send + 'static> Recorder<T, E> {
    pub fn new() -> Recorder<T, E> {
        Recorder { notes: Arc::new(Mutex::new(vec![])) }
    }

    /// An observer that records into this recorder.
    pub fn observer(&self) -> Observer<T, E> {
        let (on_next, on_error, on_complete) =
            (self.notes.clone(), self.notes.clone(), self.notes.clone());
        Observer::new()
            .on_next(move |t| on_next.lock().unwrap().push(Note::Next(t)))
            .on_error(move |e| on_error.lock().unwrap().push(Note::Error(e)))
            .on_complete(move || on_complete.lock().unwrap().push(Note::Complete))
    }
}

impl<T: Clone, E: Clone> Recorder<T, E> {
    /// Everything received so far.
    pub fn notes(&self) -> Vec<Note<T, E>> {
        self.notes.lock().unwrap().clone()
    }
}


mod test {
    use super::{Note, Recorder};

    #[test]
    fn recorder_keeps_order() {
        let rec: Recorder<i32, ()> = Recorder::new();
        let mut observer = rec.observer();
        observer.next(1);
        observer.next(2);
        observer.complete();
        assert_eq!(rec.notes(), vec![Note::Next(1), Note::Next(2), Note::Complete]);
    }
}
