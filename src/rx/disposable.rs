//! Cancellation handles.
//!
//! Every handle here is idempotent: disposing twice is a no-op, and a child
//! added to an already-disposed parent is disposed on the spot.

use std::fmt;
use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use super::lock;

type Action = Box<dyn FnOnce() + Send>;

/// A handle that runs its teardown action at most once.
#[derive(Clone)]
pub struct Disposable {
    inner: Arc<DisposableInner>,
}

struct DisposableInner {
    disposed: AtomicBool,
    action: Mutex<Option<Action>>,
}

impl Disposable {
    pub fn new(action: impl FnOnce() + Send + 'static) -> Self {
        Self {
            inner: Arc::new(DisposableInner {
                disposed: AtomicBool::new(false),
                action: Mutex::new(Some(Box::new(action))),
            }),
        }
    }

    /// A handle with nothing to tear down.
    pub fn empty() -> Self {
        Self {
            inner: Arc::new(DisposableInner {
                disposed: AtomicBool::new(false),
                action: Mutex::new(None),
            }),
        }
    }

    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        let action = lock(&self.inner.action).take();
        if let Some(action) = action {
            action();
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }
}

impl fmt::Debug for Disposable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Disposable")
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Cancellation flag
// ---------------------------------------------------------------------------

/// Shared "stop emitting" flag for one subscription.
///
/// Stages check it before every externally observable action; nothing is
/// interrupted preemptively.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

impl From<CancelToken> for Disposable {
    fn from(token: CancelToken) -> Self {
        Disposable::new(move || token.cancel())
    }
}

// ---------------------------------------------------------------------------
// Composite
// ---------------------------------------------------------------------------

/// A node of the disposal tree: disposing it disposes every child once.
#[derive(Clone, Default)]
pub struct CompositeDisposable {
    inner: Arc<Mutex<Composite>>,
}

#[derive(Default)]
struct Composite {
    disposed: bool,
    children: Vec<Disposable>,
}

impl CompositeDisposable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, child: impl Into<Disposable>) {
        let child = child.into();
        let mut composite = lock(&self.inner);
        if composite.disposed {
            drop(composite);
            child.dispose();
        } else {
            composite.children.push(child);
        }
    }

    pub fn dispose(&self) {
        let children = {
            let mut composite = lock(&self.inner);
            if composite.disposed {
                return;
            }
            composite.disposed = true;
            mem::take(&mut composite.children)
        };
        // Children run their teardown outside the lock; a child may well
        // reach back into this composite (e.g. an error handler disposing
        // the whole tree).
        for child in children {
            child.dispose();
        }
    }

    pub fn is_disposed(&self) -> bool {
        lock(&self.inner).disposed
    }
}

impl From<CompositeDisposable> for Disposable {
    fn from(composite: CompositeDisposable) -> Self {
        Disposable::new(move || composite.dispose())
    }
}

// ---------------------------------------------------------------------------
// Serial
// ---------------------------------------------------------------------------

/// Holds one replaceable child; setting a new child disposes the previous
/// one.  The poll tick reschedules itself through this.
#[derive(Clone, Default)]
pub struct SerialDisposable {
    inner: Arc<Mutex<Serial>>,
}

#[derive(Default)]
struct Serial {
    disposed: bool,
    current: Option<Disposable>,
}

impl SerialDisposable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, next: Disposable) {
        let previous = {
            let mut serial = lock(&self.inner);
            if serial.disposed {
                drop(serial);
                next.dispose();
                return;
            }
            serial.current.replace(next)
        };
        if let Some(previous) = previous {
            previous.dispose();
        }
    }

    pub fn is_disposed(&self) -> bool {
        lock(&self.inner).disposed
    }

    pub fn dispose(&self) {
        let current = {
            let mut serial = lock(&self.inner);
            if serial.disposed {
                return;
            }
            serial.disposed = true;
            serial.current.take()
        };
        if let Some(current) = current {
            current.dispose();
        }
    }
}

impl From<SerialDisposable> for Disposable {
    fn from(serial: SerialDisposable) -> Self {
        Disposable::new(move || serial.dispose())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
