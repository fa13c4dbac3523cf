//! Producers and the operators the feed pipeline is composed from.
//!
//! Every operator follows the same shape: subscribing to the result
//! subscribes upstream with an observer that forwards into the downstream
//! [`Subscriber`], and the returned [`Disposable`] tears down both.  Errors
//! and completion pass through unchanged; only `next` is transformed.

use std::collections::HashMap;
use std::hash::Hash;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::scheduler::Lane;
use super::{
    lock, CancelToken, CompositeDisposable, Disposable, Observer, Scheduler, Subject, Subscriber,
};
use crate::error::StreamError;

type SubscribeFn<T> = dyn Fn(Subscriber<T>) -> Disposable + Send + Sync;

/// A cold, push-based stream: nothing happens until it is subscribed, and
/// every subscription runs the producer afresh for one consumer.
pub struct Observable<T> {
    subscribe_fn: Arc<SubscribeFn<T>>,
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            subscribe_fn: self.subscribe_fn.clone(),
        }
    }
}

impl<T: Send + 'static> Observable<T> {
    /// Wrap a producer.  It receives the consumer and returns whatever must
    /// be torn down when the subscription is disposed.
    pub fn create<F>(subscribe_fn: F) -> Self
    where
        F: Fn(Subscriber<T>) -> Disposable + Send + Sync + 'static,
    {
        Self {
            subscribe_fn: Arc::new(subscribe_fn),
        }
    }

    pub fn subscribe<O>(&self, observer: O) -> Disposable
    where
        O: Observer<T> + 'static,
    {
        let token = CancelToken::new();
        let subscriber = Subscriber::new(Arc::new(observer), token.clone());
        let upstream = (self.subscribe_fn)(subscriber);

        // Cancel first so nothing is emitted while upstream tears down.
        let subscription = CompositeDisposable::new();
        subscription.add(token);
        subscription.add(upstream);
        subscription.into()
    }

    /// Build an operator from a `next` handler; error and completion are
    /// forwarded as-is.
    pub fn lift<U, F>(&self, on_next: F) -> Observable<U>
    where
        U: Send + 'static,
        F: Fn(&Subscriber<U>, T) + Send + Sync + 'static,
    {
        let source = self.clone();
        let on_next = Arc::new(on_next);
        Observable::create(move |downstream: Subscriber<U>| {
            source.subscribe(Forward {
                downstream,
                on_next: on_next.clone(),
                _value: PhantomData,
            })
        })
    }

    pub fn map<U, F>(&self, f: F) -> Observable<U>
    where
        U: Send + 'static,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        self.lift(move |downstream, value| {
            downstream.next(f(value));
        })
    }

    pub fn filter<F>(&self, predicate: F) -> Observable<T>
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.lift(move |downstream, value| {
            if predicate(&value) {
                downstream.next(value);
            }
        })
    }

    /// Subscribe to the stream `f` returns for each value and merge all of
    /// them into one.  Completes once the source and every inner stream have
    /// completed; the first error from any of them ends the merged stream.
    pub fn flat_map<U, F>(&self, f: F) -> Observable<U>
    where
        U: Send + 'static,
        F: Fn(T) -> Observable<U> + Send + Sync + 'static,
    {
        let source = self.clone();
        let f = Arc::new(f);
        Observable::create(move |downstream: Subscriber<U>| {
            let subscriptions = CompositeDisposable::new();
            let outer = FlatMapOuter {
                downstream,
                f: f.clone(),
                // The outer stream counts as one active source.
                active: Arc::new(AtomicUsize::new(1)),
                subscriptions: subscriptions.clone(),
                _value: PhantomData,
            };
            subscriptions.add(source.subscribe(outer));
            subscriptions.into()
        })
    }

    /// Partition the stream by `key_fn`.
    ///
    /// A [`Grouped`] stream is emitted the first time a key is seen; it then
    /// carries every element with that key in source order.  Groups must be
    /// subscribed while the group is being emitted to see its first element.
    pub fn group_by<K, F>(&self, key_fn: F) -> Observable<Grouped<K, T>>
    where
        T: Clone,
        K: Eq + Hash + Clone + Send + Sync + 'static,
        F: Fn(&T) -> K + Send + Sync + 'static,
    {
        let source = self.clone();
        let key_fn = Arc::new(key_fn);
        Observable::create(move |downstream: Subscriber<Grouped<K, T>>| {
            source.subscribe(GroupBy {
                downstream,
                key_fn: key_fn.clone(),
                groups: Mutex::new(HashMap::new()),
            })
        })
    }

    /// Re-deliver every signal on `scheduler`, preserving order.
    pub fn observe_on(&self, scheduler: Scheduler) -> Observable<T> {
        let source = self.clone();
        Observable::create(move |downstream: Subscriber<T>| {
            let lane = scheduler.lane();
            source.subscribe(ObserveOn { downstream, lane })
        })
    }

    /// Multicast one upstream subscription to every subscriber.
    ///
    /// Upstream is subscribed when the first subscriber arrives and disposed
    /// when the last one leaves.
    pub fn share(&self) -> Observable<T>
    where
        T: Clone,
    {
        let shared = Arc::new(Share {
            source: self.clone(),
            state: Mutex::new(ShareState {
                subject: None,
                connection: None,
                subscribers: 0,
            }),
        });
        Observable::create(move |downstream: Subscriber<T>| shared.attach(downstream))
    }
}

// ---------------------------------------------------------------------------
// lift
// ---------------------------------------------------------------------------

struct Forward<T, U, F> {
    downstream: Subscriber<U>,
    on_next: Arc<F>,
    _value: PhantomData<fn(T)>,
}

impl<T, U, F> Observer<T> for Forward<T, U, F>
where
    F: Fn(&Subscriber<U>, T) + Send + Sync,
{
    fn on_next(&self, value: T) {
        if !self.downstream.is_cancelled() {
            (self.on_next)(&self.downstream, value);
        }
    }

    fn on_error(&self, error: StreamError) {
        self.downstream.error(error);
    }

    fn on_completed(&self) {
        self.downstream.complete();
    }
}

// ---------------------------------------------------------------------------
// flat_map
// ---------------------------------------------------------------------------

struct FlatMapOuter<T, U, F> {
    downstream: Subscriber<U>,
    f: Arc<F>,
    active: Arc<AtomicUsize>,
    subscriptions: CompositeDisposable,
    _value: PhantomData<fn(T)>,
}

impl<T, U, F> Observer<T> for FlatMapOuter<T, U, F>
where
    U: Send + 'static,
    F: Fn(T) -> Observable<U> + Send + Sync,
{
    fn on_next(&self, value: T) {
        if self.downstream.is_cancelled() {
            return;
        }
        self.active.fetch_add(1, Ordering::AcqRel);
        let inner = (self.f)(value);
        self.subscriptions.add(inner.subscribe(FlatMapInner {
            downstream: self.downstream.clone(),
            active: self.active.clone(),
        }));
    }

    fn on_error(&self, error: StreamError) {
        self.downstream.error(error);
    }

    fn on_completed(&self) {
        if self.active.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.downstream.complete();
        }
    }
}

struct FlatMapInner<U> {
    downstream: Subscriber<U>,
    active: Arc<AtomicUsize>,
}

impl<U> Observer<U> for FlatMapInner<U> {
    fn on_next(&self, value: U) {
        self.downstream.next(value);
    }

    fn on_error(&self, error: StreamError) {
        self.downstream.error(error);
    }

    fn on_completed(&self) {
        if self.active.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.downstream.complete();
        }
    }
}

// ---------------------------------------------------------------------------
// group_by
// ---------------------------------------------------------------------------

/// One keyed sub-stream produced by [`Observable::group_by`].
pub struct Grouped<K, T> {
    key: K,
    stream: Observable<T>,
}

impl<K: Clone, T> Clone for Grouped<K, T> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            stream: self.stream.clone(),
        }
    }
}

impl<K, T> Grouped<K, T> {
    pub fn key(&self) -> &K {
        &self.key
    }

    pub fn into_stream(self) -> Observable<T> {
        self.stream
    }
}

struct GroupBy<K, T, F> {
    downstream: Subscriber<Grouped<K, T>>,
    key_fn: Arc<F>,
    groups: Mutex<HashMap<K, Subject<T>>>,
}

impl<K, T, F> GroupBy<K, T, F>
where
    T: Clone + Send + 'static,
{
    fn drain(&self) -> Vec<Subject<T>> {
        lock(&self.groups).drain().map(|(_, group)| group).collect()
    }
}

impl<K, T, F> Observer<T> for GroupBy<K, T, F>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    T: Clone + Send + 'static,
    F: Fn(&T) -> K + Send + Sync,
{
    fn on_next(&self, value: T) {
        if self.downstream.is_cancelled() {
            return;
        }
        let key = (self.key_fn)(&value);
        let (group, fresh) = {
            let mut groups = lock(&self.groups);
            match groups.get(&key) {
                Some(group) => (group.clone(), false),
                None => {
                    let group = Subject::new();
                    groups.insert(key.clone(), group.clone());
                    (group, true)
                }
            }
        };
        if fresh {
            self.downstream.next(Grouped {
                key,
                stream: group.observable(),
            });
        }
        let _ = group.try_next(value);
    }

    fn on_error(&self, error: StreamError) {
        for group in self.drain() {
            group.error(error.clone());
        }
        self.downstream.error(error);
    }

    fn on_completed(&self) {
        for group in self.drain() {
            group.complete();
        }
        self.downstream.complete();
    }
}

// ---------------------------------------------------------------------------
// observe_on
// ---------------------------------------------------------------------------

struct ObserveOn<T> {
    downstream: Subscriber<T>,
    lane: Lane,
}

impl<T: Send + 'static> Observer<T> for ObserveOn<T> {
    fn on_next(&self, value: T) {
        let downstream = self.downstream.clone();
        // The cancellation check happens again at delivery time, so values
        // queued before a dispose are never delivered after it.
        self.lane.post(move || {
            downstream.next(value);
        });
    }

    fn on_error(&self, error: StreamError) {
        let downstream = self.downstream.clone();
        self.lane.post(move || downstream.error(error));
    }

    fn on_completed(&self) {
        let downstream = self.downstream.clone();
        self.lane.post(move || downstream.complete());
    }
}

// ---------------------------------------------------------------------------
// share
// ---------------------------------------------------------------------------

struct Share<T> {
    source: Observable<T>,
    state: Mutex<ShareState<T>>,
}

struct ShareState<T> {
    subject: Option<Subject<T>>,
    connection: Option<Disposable>,
    subscribers: usize,
}

impl<T: Clone + Send + 'static> Share<T> {
    fn attach(self: &Arc<Self>, downstream: Subscriber<T>) -> Disposable {
        let (subject, connect) = {
            let mut state = lock(&self.state);
            let subject = state.subject.get_or_insert_with(Subject::new).clone();
            state.subscribers += 1;
            (subject, state.subscribers == 1)
        };
        let membership = subject.add_subscriber(downstream);
        if connect {
            let connection = self.source.subscribe(subject.clone());
            lock(&self.state).connection = Some(connection);
        }

        let shared = self.clone();
        Disposable::new(move || {
            membership.dispose();
            let connection = {
                let mut state = lock(&shared.state);
                state.subscribers -= 1;
                if state.subscribers > 0 {
                    return;
                }
                state.subject = None;
                state.connection.take()
            };
            if let Some(connection) = connection {
                connection.dispose();
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
