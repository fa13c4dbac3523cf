//! Scheduling harness: periodic polling and the shutdown deadline.
//!
//! [`run`] owns every execution context the pipeline uses:
//!
//! * a worker [`ThreadPool`] for fetching and parsing,
//! * an output [`EventLoop`] that runs the poll tick, the deadline, and
//!   every delivery to the sink (so items reach the sink strictly one at a
//!   time, never interleaved across the Atom and RSS branches),
//! * the calling thread, which blocks on the root URI stream until it
//!   terminates.
//!
//! The deadline and any terminal error both dispose the whole subscription
//! tree and then terminate the root URI stream, which releases the caller.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::StreamError;
use crate::pipeline;
use crate::rx::{observer, CompositeDisposable, EventLoop, Scheduler, SerialDisposable, Subject, ThreadPool};
use crate::source::{Fetch, Item};

/// How a run ended.
#[derive(Debug)]
pub struct RunOutcome {
    /// Items handed to the sink.
    pub items: usize,
    /// The error that shut the pipeline down, if it didn't reach the deadline.
    pub error: Option<StreamError>,
}

/// Poll `config.uris` every `config.interval` until `config.deadline`,
/// handing each item to `sink` on the output thread.
pub fn run<S>(config: &Config, fetcher: Arc<dyn Fetch>, sink: S) -> Result<RunOutcome>
where
    S: Fn(&Item) + Send + Sync + 'static,
{
    info!(
        uris = config.uris.len(),
        interval = ?config.interval,
        deadline = ?config.deadline,
        policy = ?config.policy,
        "starting"
    );
    let output = EventLoop::start("feedstream-output").context("failed to start output thread")?;
    let workers = ThreadPool::start("feedstream-worker").context("failed to start worker pool")?;

    let uris: Subject<String> = Subject::new();
    let branches = pipeline::build(&uris.observable(), fetcher, &workers.scheduler(), config.policy);

    let subscriptions = CompositeDisposable::new();
    let delivered = Arc::new(AtomicUsize::new(0));
    let sink = Arc::new(sink);

    for branch in branches.into_vec() {
        let sink = sink.clone();
        let delivered = delivered.clone();
        let (tree, root) = (subscriptions.clone(), uris.clone());
        subscriptions.add(branch.observe_on(output.scheduler()).subscribe(observer(
            move |item: Item| {
                sink(&item);
                delivered.fetch_add(1, Ordering::Relaxed);
            },
            move |error: StreamError| {
                if tree.is_disposed() {
                    return;
                }
                warn!(error = %error, "pipeline failed");
                tree.dispose();
                root.error(error);
            },
            || {},
        )));
    }

    let deadline = {
        let (tree, root) = (subscriptions.clone(), uris.clone());
        let after = config.deadline;
        output.scheduler().schedule_after(after, move || {
            info!(after = ?after, "deadline reached");
            tree.dispose();
            root.complete();
        })
    };
    subscriptions.add(deadline);

    let tick = SerialDisposable::new();
    subscriptions.add(tick.clone());
    start_tick(
        output.scheduler(),
        config.interval,
        uris.clone(),
        Arc::from(config.uris.clone()),
        tick,
    );

    let result = uris.wait();
    subscriptions.dispose();
    debug!(listeners = uris.subscriber_count(), "root stream terminated");

    drop(output);
    drop(workers);

    Ok(RunOutcome {
        items: delivered.load(Ordering::Relaxed),
        error: result.err(),
    })
}

/// Fire the first tick immediately.  Armed from the event loop's own thread
/// so it can't run before its handle is stored in `slot`.
fn start_tick(
    scheduler: Scheduler,
    interval: Duration,
    root: Subject<String>,
    uris: Arc<[String]>,
    slot: SerialDisposable,
) {
    let lane = scheduler.lane();
    lane.post(move || schedule_tick(scheduler, Duration::ZERO, interval, root, uris, slot));
}

/// Push every URI into `root` after `delay`, then reschedule every
/// `interval`.  A failed push is forwarded as an error on `root` instead of
/// escaping the timer, and disposes `slot` so the tick stops for good.
fn schedule_tick(
    scheduler: Scheduler,
    delay: Duration,
    interval: Duration,
    root: Subject<String>,
    uris: Arc<[String]>,
    slot: SerialDisposable,
) {
    let next = (scheduler.clone(), slot.clone());
    slot.set(scheduler.schedule_after(delay, move || {
        let (scheduler, slot) = next;
        debug!(uris = uris.len(), "poll tick");
        for uri in uris.iter() {
            if let Err(e) = root.try_next(uri.clone()) {
                debug!(error = %e, "tick stopped");
                slot.dispose();
                root.error(Arc::new(e));
                return;
            }
        }
        schedule_tick(scheduler, interval, interval, root, uris, slot);
    }));
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FeedError;
    use crate::source::atom::tests::atom_feed;
    use crate::source::rss::tests::TWO_ITEMS;
    use crate::source::{FailurePolicy, Response};
    use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
    use std::collections::HashMap;
    use std::sync::mpsc;
    use std::sync::Mutex;
    use std::thread;
    use std::time::Instant;

    /// Serves canned bodies; unknown URIs fail like a refused connection.
    #[derive(Default)]
    struct FakeFetch {
        routes: HashMap<String, (&'static str, String)>,
        delay: Option<Duration>,
    }

    impl FakeFetch {
        fn route(mut self, uri: &str, content_type: &'static str, body: impl Into<String>) -> Self {
            self.routes.insert(uri.to_string(), (content_type, body.into()));
            self
        }
    }

    impl Fetch for FakeFetch {
        fn get(&self, uri: &str) -> Result<Response, FeedError> {
            if let Some(delay) = self.delay {
                thread::sleep(delay);
            }
            let (content_type, body) = self.routes.get(uri).ok_or_else(|| FeedError::HttpStatus {
                uri: uri.to_string(),
                status: 404,
            })?;
            let mut headers = HeaderMap::new();
            headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
            Ok(Response::new(uri, 200, headers, body.clone().into_bytes()))
        }
    }

    fn config(uris: &[&str], deadline_ms: u64, policy: FailurePolicy) -> Config {
        Config {
            uris: uris.iter().map(|u| u.to_string()).collect(),
            // Long enough that only the immediate first tick fires.
            interval: Duration::from_secs(60),
            deadline: Duration::from_millis(deadline_ms),
            timeout: Duration::from_secs(1),
            policy,
        }
    }

    fn run_collect(config: &Config, fetch: FakeFetch) -> (Vec<String>, RunOutcome) {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let l = lines.clone();
        let outcome = run(config, Arc::new(fetch), move |item| {
            l.lock().unwrap().push(item.to_string());
        })
        .unwrap();
        let lines = lines.lock().unwrap().clone();
        (lines, outcome)
    }

    #[test]
    fn two_entry_atom_feed_prints_in_order() {
        let fetch = FakeFetch::default().route("http://a/feed.atom", "application/atom+xml", atom_feed(2));
        let (lines, outcome) = run_collect(&config(&["http://a/feed.atom"], 500, FailurePolicy::Isolate), fetch);

        assert_eq!(
            lines,
            vec!["atom: (Example Feed) Entry 1", "atom: (Example Feed) Entry 2"]
        );
        assert_eq!(outcome.items, 2);
        assert!(outcome.error.is_none());
    }

    #[test]
    fn atom_and_rss_branches_both_deliver() {
        let fetch = FakeFetch::default()
            .route("http://a", "application/atom+xml; charset=utf-8", atom_feed(1))
            .route("http://r", "application/rss+xml", TWO_ITEMS)
            .route("http://h", "text/html", "<html></html>");
        let (mut lines, outcome) =
            run_collect(&config(&["http://a", "http://r", "http://h"], 500, FailurePolicy::Isolate), fetch);

        lines.sort();
        assert_eq!(
            lines,
            vec![
                "atom: (Example Feed) Entry 1",
                "rss: (Test Feed) First Post",
                "rss: (Test Feed) Second Post",
            ]
        );
        assert!(outcome.error.is_none());
    }

    #[test]
    fn deadline_with_nothing_resolved_is_clean() {
        let fetch = FakeFetch {
            delay: Some(Duration::from_secs(2)),
            ..FakeFetch::default()
        }
        .route("http://slow", "application/atom+xml", atom_feed(1));
        let (lines, outcome) = run_collect(&config(&["http://slow"], 100, FailurePolicy::Abort), fetch);

        assert!(lines.is_empty());
        assert_eq!(outcome.items, 0);
        assert!(outcome.error.is_none());
    }

    #[test]
    fn transport_failure_aborts_with_no_items() {
        let (lines, outcome) =
            run_collect(&config(&["http://missing"], 2_000, FailurePolicy::Abort), FakeFetch::default());

        assert!(lines.is_empty());
        let error = outcome.error.expect("the fetch failure should end the run");
        assert_eq!(error.to_string(), "http://missing: HTTP error: status 404");
    }

    #[test]
    fn isolate_keeps_good_feeds_when_one_fails() {
        let fetch = FakeFetch::default()
            .route("http://good", "application/atom+xml", atom_feed(2))
            .route("http://broken", "application/rss+xml", "<rss><channel>");
        let (lines, outcome) = run_collect(
            &config(&["http://missing", "http://broken", "http://good"], 500, FailurePolicy::Isolate),
            fetch,
        );

        assert_eq!(lines.len(), 2);
        assert!(outcome.error.is_none());
    }

    #[test]
    fn malformed_document_aborts_under_abort_policy() {
        let fetch = FakeFetch::default().route("http://broken", "text/xml", "<rss><channel></rss>");
        let (lines, outcome) = run_collect(&config(&["http://broken"], 2_000, FailurePolicy::Abort), fetch);

        assert!(lines.is_empty());
        assert!(outcome.error.is_some());
    }

    #[test]
    fn tick_repeats_until_deadline() {
        let fetch = FakeFetch::default().route("http://a", "application/atom+xml", atom_feed(1));
        let mut config = config(&["http://a"], 450, FailurePolicy::Isolate);
        config.interval = Duration::from_millis(100);
        let (lines, outcome) = run_collect(&config, fetch);

        // Ticks at roughly 0, 100, 200, 300, 400 ms; no deduplication.
        assert!(lines.len() >= 3, "expected repeated polls, got {}", lines.len());
        assert!(lines.iter().all(|l| l == "atom: (Example Feed) Entry 1"));
        assert!(outcome.error.is_none());
    }

    fn wait_until(condition: impl Fn() -> bool) -> bool {
        let limit = Instant::now() + Duration::from_secs(2);
        while Instant::now() < limit {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        condition()
    }

    fn uri_list(uris: &[&str]) -> Arc<[String]> {
        uris.iter().map(|u| u.to_string()).collect()
    }

    #[test]
    fn tick_on_terminated_root_stops_without_rescheduling() {
        let output = EventLoop::start("test-output").unwrap();
        let root: Subject<String> = Subject::new();
        root.complete();
        let slot = SerialDisposable::new();

        start_tick(
            output.scheduler(),
            Duration::from_millis(10),
            root.clone(),
            uri_list(&["http://a"]),
            slot.clone(),
        );

        assert!(root.wait().is_ok());
        assert!(wait_until(|| slot.is_disposed()), "failed tick must not reschedule");

        // The loop survived the failed push and still runs new work.
        let (tx, rx) = mpsc::channel();
        let _d = output.scheduler().schedule_after(Duration::ZERO, move || {
            tx.send(()).unwrap();
        });
        assert!(rx.recv_timeout(Duration::from_secs(2)).is_ok());
    }

    #[test]
    fn tick_racing_a_branch_error_keeps_the_branch_error() {
        let output = EventLoop::start("test-output").unwrap();
        let root: Subject<String> = Subject::new();
        let r = root.clone();
        // A branch fails while the tick is still pushing the first URI.
        let _d = root.observable().subscribe(observer(
            move |_: String| {
                r.error(Arc::new(FeedError::HttpStatus {
                    uri: "http://a".into(),
                    status: 500,
                }))
            },
            |_| {},
            || {},
        ));
        let slot = SerialDisposable::new();

        start_tick(
            output.scheduler(),
            Duration::from_millis(10),
            root.clone(),
            uri_list(&["http://a", "http://b"]),
            slot.clone(),
        );

        let error = root.wait().unwrap_err();
        assert_eq!(error.to_string(), "http://a: HTTP error: status 500");
        assert!(wait_until(|| slot.is_disposed()), "failed tick must not reschedule");
    }
}
