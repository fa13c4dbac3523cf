//! Wiring of the stage graph.
//!
//! ```text
//! uris ─► [worker] fetch ─► group by Content-Type ─► keep XML ─► [worker] parse XML
//!                                                                      │
//!                                                         group by root element (shared)
//!                                                          │                     │
//!                                        "feed" ─► [worker] Atom parse    "rss" ─► [worker] RSS parse
//!                                                          │                     │
//!                                                    flatten entries       flatten items
//!                                                          ▼                     ▼
//!                                                       Item stream          Item stream
//! ```
//!
//! `[worker]` marks a hop onto a blocking lane.  Each branch is a separate
//! subscription; the root grouping is shared so each URI is fetched and
//! parsed once no matter how many branches listen.

use std::sync::Arc;

use crate::rx::{Observable, Scheduler};
use crate::source::{atom, content_type, http, rss, xml, FailurePolicy, Fetch, Item};

/// The two item streams the graph ends in.
pub struct Branches {
    pub atom: Observable<Item>,
    pub rss: Observable<Item>,
}

impl Branches {
    pub fn into_vec(self) -> Vec<Observable<Item>> {
        vec![self.atom, self.rss]
    }
}

pub fn build(
    uris: &Observable<String>,
    fetcher: Arc<dyn Fetch>,
    worker: &Scheduler,
    policy: FailurePolicy,
) -> Branches {
    let responses = http::http_get(&uris.observe_on(worker.clone()), fetcher, policy);
    let xml_responses = content_type::xml_only(&content_type::by_content_type(&responses));
    let docs = xml::parse(&xml_responses.observe_on(worker.clone()), policy);
    let by_root = xml::by_root(&docs).share();

    let atom_docs = xml::select_root(&by_root, "feed").observe_on(worker.clone());
    let rss_docs = xml::select_root(&by_root, "rss").observe_on(worker.clone());

    Branches {
        atom: atom::entries(&atom::parse(&atom_docs, policy), policy),
        rss: rss::entries(&rss::parse(&rss_docs, policy), policy),
    }
}
