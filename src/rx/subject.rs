//! Hot multicast stream.
//!
//! Used for the root URI stream the poll tick pushes into, for each group
//! produced by [`Observable::group_by`], and behind [`Observable::share`].
//! Subscribers only see values pushed after they subscribed; a subscriber
//! arriving after termination receives the terminal signal immediately.

use std::sync::{Arc, Condvar, Mutex};

use super::{lock, Disposable, Observable, Observer, Subscriber};
use crate::error::{FeedError, StreamError};

pub struct Subject<T> {
    inner: Arc<SubjectInner<T>>,
}

struct SubjectInner<T> {
    state: Mutex<State<T>>,
    terminated: Condvar,
}

struct State<T> {
    next_id: u64,
    subscribers: Vec<(u64, Subscriber<T>)>,
    terminal: Option<Terminal>,
}

#[derive(Clone)]
enum Terminal {
    Completed,
    Error(StreamError),
}

impl<T> Clone for Subject<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Clone + Send + 'static> Default for Subject<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + 'static> Subject<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(SubjectInner {
                state: Mutex::new(State {
                    next_id: 0,
                    subscribers: Vec::new(),
                    terminal: None,
                }),
                terminated: Condvar::new(),
            }),
        }
    }

    /// Push a value to every current subscriber.
    ///
    /// Fails if the subject has already completed or errored.
    pub fn try_next(&self, value: T) -> Result<(), FeedError> {
        let subscribers = {
            let state = lock(&self.inner.state);
            if state.terminal.is_some() {
                return Err(FeedError::Schedule("stream already terminated".into()));
            }
            state
                .subscribers
                .iter()
                .map(|(_, s)| s.clone())
                .collect::<Vec<_>>()
        };
        for subscriber in subscribers {
            subscriber.next(value.clone());
        }
        Ok(())
    }

    pub fn complete(&self) {
        self.terminate(Terminal::Completed);
    }

    pub fn error(&self, error: StreamError) {
        self.terminate(Terminal::Error(error));
    }

    fn terminate(&self, terminal: Terminal) {
        let subscribers = {
            let mut state = lock(&self.inner.state);
            if state.terminal.is_some() {
                return;
            }
            state.terminal = Some(terminal.clone());
            std::mem::take(&mut state.subscribers)
        };
        self.inner.terminated.notify_all();
        for (_, subscriber) in subscribers {
            deliver(&subscriber, &terminal);
        }
    }

    /// Attach a subscriber; the returned handle detaches it again.
    pub fn add_subscriber(&self, subscriber: Subscriber<T>) -> Disposable {
        let id = {
            let mut state = lock(&self.inner.state);
            if let Some(terminal) = state.terminal.clone() {
                drop(state);
                deliver(&subscriber, &terminal);
                return Disposable::empty();
            }
            let id = state.next_id;
            state.next_id += 1;
            state.subscribers.push((id, subscriber));
            id
        };
        let inner = self.inner.clone();
        Disposable::new(move || {
            lock(&inner.state).subscribers.retain(|(sid, _)| *sid != id);
        })
    }

    pub fn observable(&self) -> Observable<T> {
        let subject = self.clone();
        Observable::create(move |subscriber| subject.add_subscriber(subscriber))
    }

    /// Block the calling thread until the subject terminates.
    pub fn wait(&self) -> Result<(), StreamError> {
        let mut state = lock(&self.inner.state);
        loop {
            match &state.terminal {
                Some(Terminal::Completed) => return Ok(()),
                Some(Terminal::Error(e)) => return Err(e.clone()),
                None => {
                    state = self
                        .inner
                        .terminated
                        .wait(state)
                        .unwrap_or_else(std::sync::PoisonError::into_inner);
                }
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.inner.state).subscribers.len()
    }
}

fn deliver<T>(subscriber: &Subscriber<T>, terminal: &Terminal) {
    match terminal {
        Terminal::Completed => subscriber.complete(),
        Terminal::Error(e) => subscriber.error(e.clone()),
    }
}

impl<T: Clone + Send + 'static> Observer<T> for Subject<T> {
    fn on_next(&self, value: T) {
        // Values racing a terminal signal are dropped.
        let _ = self.try_next(value);
    }

    fn on_error(&self, error: StreamError) {
        self.error(error);
    }

    fn on_completed(&self) {
        self.complete();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
