//! Push-based stream primitive the feed pipeline is built on.
//!
//! A producer ([`Observable`]) is handed a consumer ([`Subscriber`]) and
//! returns a [`Disposable`].  Values flow downstream through `next`, a stream
//! ends with exactly one `complete` or `error`, and disposing the handle stops
//! every further callback for that subscription.
//!
//! * **`disposable`** — cancellation handles and the disposal tree.
//! * **`observer`** — the consumer side and its single-shot guard.
//! * **`observable`** — producers and the operators the pipeline needs.
//! * **`subject`** — hot multicast streams (root URI stream, group streams).
//! * **`scheduler`** — execution contexts backed by `tokio` runtimes.

mod disposable;
mod observable;
mod observer;
mod scheduler;
mod subject;

pub use disposable::{CancelToken, CompositeDisposable, Disposable, SerialDisposable};
pub use observable::{Grouped, Observable};
pub use observer::{observer, Observer, Subscriber};
pub use scheduler::{EventLoop, Scheduler, ThreadPool};
pub use subject::Subject;

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a mutex, recovering the guard if another thread panicked while
/// holding it.  All state guarded in this module stays consistent across a
/// panic (plain collections and flags), so the data is still usable.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
