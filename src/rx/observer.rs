//! Consumer side of a stream.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::CancelToken;
use crate::error::StreamError;

/// Receives the values and the terminal signal of one subscription.
pub trait Observer<T>: Send + Sync {
    fn on_next(&self, value: T);
    fn on_error(&self, error: StreamError);
    fn on_completed(&self);
}

/// Build an [`Observer`] from three closures.
pub fn observer<T, N, E, C>(on_next: N, on_error: E, on_completed: C) -> impl Observer<T>
where
    N: Fn(T) + Send + Sync + 'static,
    E: Fn(StreamError) + Send + Sync + 'static,
    C: Fn() + Send + Sync + 'static,
{
    FnObserver {
        on_next,
        on_error,
        on_completed,
        _value: PhantomData,
    }
}

struct FnObserver<T, N, E, C> {
    on_next: N,
    on_error: E,
    on_completed: C,
    _value: PhantomData<fn(T)>,
}

impl<T, N, E, C> Observer<T> for FnObserver<T, N, E, C>
where
    N: Fn(T) + Send + Sync,
    E: Fn(StreamError) + Send + Sync,
    C: Fn() + Send + Sync,
{
    fn on_next(&self, value: T) {
        (self.on_next)(value)
    }

    fn on_error(&self, error: StreamError) {
        (self.on_error)(error)
    }

    fn on_completed(&self) {
        (self.on_completed)()
    }
}

// ---------------------------------------------------------------------------
// Subscriber
// ---------------------------------------------------------------------------

/// The consumer handle a producer emits into.
///
/// Wraps one [`Observer`] with the subscription's [`CancelToken`] and a
/// terminal latch: once the token is cancelled or a terminal signal has been
/// delivered, every further call is dropped.
pub struct Subscriber<T> {
    inner: Arc<SubscriberInner<T>>,
}

struct SubscriberInner<T> {
    observer: Arc<dyn Observer<T>>,
    token: CancelToken,
    stopped: AtomicBool,
}

impl<T> Clone for Subscriber<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Subscriber<T> {
    pub fn new(observer: Arc<dyn Observer<T>>, token: CancelToken) -> Self {
        Self {
            inner: Arc::new(SubscriberInner {
                observer,
                token,
                stopped: AtomicBool::new(false),
            }),
        }
    }

    /// True once the subscription was disposed or has terminated.
    pub fn is_cancelled(&self) -> bool {
        self.inner.token.is_cancelled() || self.inner.stopped.load(Ordering::Acquire)
    }

    /// Deliver one value.  Returns `false` (and drops the value) if the
    /// subscription no longer accepts values, so loops can stop early.
    pub fn next(&self, value: T) -> bool {
        if self.is_cancelled() {
            return false;
        }
        self.inner.observer.on_next(value);
        true
    }

    pub fn error(&self, error: StreamError) {
        if self.begin_terminal() {
            self.inner.observer.on_error(error);
        }
    }

    pub fn complete(&self) {
        if self.begin_terminal() {
            self.inner.observer.on_completed();
        }
    }

    fn begin_terminal(&self) -> bool {
        !self.inner.token.is_cancelled() && !self.inner.stopped.swap(true, Ordering::AcqRel)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
