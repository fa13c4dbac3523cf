//! Execution contexts.
//!
//! Two kinds, both backed by `tokio` runtimes:
//!
//! * [`EventLoop`] — one dedicated thread driving a current-thread runtime.
//!   Everything scheduled on it (timers, and every [`Lane`] created from it)
//!   runs serialized on that thread.
//! * [`ThreadPool`] — a multi-thread runtime whose lanes each get their own
//!   blocking thread, so blocking work (HTTP, parsing) never stalls a timer.

use std::io;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tokio::runtime::{Builder, Handle, Runtime};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use super::{CancelToken, Disposable};

type Job = Box<dyn FnOnce() + Send>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Kind {
    EventLoop,
    NewThread,
}

/// A cheap handle for scheduling work on an [`EventLoop`] or [`ThreadPool`].
#[derive(Clone, Debug)]
pub struct Scheduler {
    handle: Handle,
    kind: Kind,
}

/// An ordered queue of jobs drained on one execution context.
pub struct Lane {
    tx: mpsc::UnboundedSender<Job>,
}

impl Lane {
    /// Queue a job.  Jobs posted after the context shut down are dropped.
    pub fn post(&self, job: impl FnOnce() + Send + 'static) {
        let _ = self.tx.send(Box::new(job));
    }
}

impl Scheduler {
    /// Open a new lane.  The drain task ends once the lane is dropped.
    pub fn lane(&self) -> Lane {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        match self.kind {
            Kind::EventLoop => {
                self.handle.spawn(async move {
                    while let Some(job) = rx.recv().await {
                        job();
                    }
                });
            }
            Kind::NewThread => {
                self.handle.spawn_blocking(move || {
                    while let Some(job) = rx.blocking_recv() {
                        job();
                    }
                });
            }
        }
        Lane { tx }
    }

    /// Run `action` once after `delay`, unless the returned handle is
    /// disposed first.
    pub fn schedule_after(
        &self,
        delay: Duration,
        action: impl FnOnce() + Send + 'static,
    ) -> Disposable {
        let token = CancelToken::new();
        let armed = token.clone();
        let kind = self.kind;
        let task = self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            if armed.is_cancelled() {
                return;
            }
            match kind {
                Kind::EventLoop => action(),
                Kind::NewThread => {
                    let _ = tokio::task::spawn_blocking(action).await;
                }
            }
        });
        Disposable::new(move || {
            token.cancel();
            task.abort();
        })
    }
}

// ---------------------------------------------------------------------------
// Event loop
// ---------------------------------------------------------------------------

/// A single named thread serializing all work scheduled on it.
pub struct EventLoop {
    scheduler: Scheduler,
    shutdown: Option<oneshot::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl EventLoop {
    pub fn start(name: &str) -> io::Result<Self> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        let handle = runtime.handle().clone();
        let (shutdown, stopped) = oneshot::channel::<()>();
        let thread = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                runtime.block_on(async {
                    let _ = stopped.await;
                });
            })?;
        debug!(name, "event loop started");
        Ok(Self {
            scheduler: Scheduler {
                handle,
                kind: Kind::EventLoop,
            },
            shutdown: Some(shutdown),
            thread: Some(thread),
        })
    }

    pub fn scheduler(&self) -> Scheduler {
        self.scheduler.clone()
    }
}

impl Drop for EventLoop {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(thread) = self.thread.take() {
            // Never join from the loop's own thread.
            if thread.thread().id() != thread::current().id() {
                let _ = thread.join();
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Thread pool
// ---------------------------------------------------------------------------

/// Blocking worker context: every lane runs on a thread of its own.
pub struct ThreadPool {
    runtime: Option<Runtime>,
    scheduler: Scheduler,
}

impl ThreadPool {
    pub fn start(name: &str) -> io::Result<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name(name)
            .enable_all()
            .build()?;
        let scheduler = Scheduler {
            handle: runtime.handle().clone(),
            kind: Kind::NewThread,
        };
        debug!(name, "worker pool started");
        Ok(Self {
            runtime: Some(runtime),
            scheduler,
        })
    }

    pub fn scheduler(&self) -> Scheduler {
        self.scheduler.clone()
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        // Workers may be parked inside a blocking HTTP request; don't wait.
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
