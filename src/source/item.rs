//! The record every feed format is flattened into.
//!
//! An [`Item`] pairs feed-level metadata ([`ItemSource`], identical for every
//! item read from the same document) with entry-level metadata
//! ([`ItemData`]).  A field a format does not provide is the empty string,
//! never an `Option`, so consumers don't have to tell "absent" from "empty".
//!
//! ## For contributors
//!
//! The mapping from each format into these structs lives next to the format
//! (`atom.rs`, `rss.rs`); [`SourceEntry`] is the single entry point that
//! dispatches to them.

use std::fmt;

use chrono::{DateTime, Utc};

use super::atom::AtomFeed;
use super::rss::RssChannel;
use crate::error::FeedError;

/// Which branch of the pipeline produced an item.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FeedKind {
    Atom,
    Rss,
}

impl fmt::Display for FeedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FeedKind::Atom => "atom",
            FeedKind::Rss => "rss",
        })
    }
}

/// Feed-level fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemSource {
    /// URI the document was fetched from.
    pub uri: String,
    pub id: String,
    pub title: String,
    /// Atom `<subtitle>`; the channel `<link>` for RSS.
    pub subtitle: String,
    pub updated: String,
    pub author_name: String,
    pub author_email: String,
}

/// Entry-level fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemData {
    pub id: String,
    pub title: String,
    pub author: String,
    pub published: String,
    pub updated: String,
    pub summary: String,
    /// Atom `<content>`; the item `<description>` for RSS.
    pub content: String,
}

/// A single feed entry, normalised from any supported format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub kind: FeedKind,
    pub source: ItemSource,
    pub data: ItemData,
}

/// Console form: `<kind>: (<feed title>) <entry title>`.
impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: ({}) {}", self.kind, self.source.title, self.data.title)
    }
}

/// One entry of one parsed document, in whichever format it came in.
pub enum SourceEntry<'a> {
    Atom(&'a AtomFeed, &'a feed_rs::model::Entry),
    Rss(&'a RssChannel, &'a ::rss::Item),
}

impl Item {
    /// Map one entry to an [`Item`].
    ///
    /// `source` must be the [`ItemSource`] computed once for the entry's
    /// document, which keeps it identical across that document's items.
    pub fn from_entry(source: &ItemSource, entry: SourceEntry<'_>) -> Result<Item, FeedError> {
        let (kind, data) = match entry {
            SourceEntry::Atom(feed, entry) => (FeedKind::Atom, feed.entry_data(&source.uri, entry)?),
            SourceEntry::Rss(channel, item) => (FeedKind::Rss, channel.item_data(&source.uri, item)?),
        };
        Ok(Item {
            kind,
            source: source.clone(),
            data,
        })
    }
}

// ---------------------------------------------------------------------------
// Timestamps
// ---------------------------------------------------------------------------

pub(crate) fn timestamp(dt: Option<DateTime<Utc>>) -> String {
    dt.map(|dt| dt.to_rfc3339()).unwrap_or_default()
}

/// Normalise an RFC 2822 date (as RSS uses) to RFC 3339.  Dates that don't
/// parse are passed through verbatim rather than dropped.
pub(crate) fn rfc2822_timestamp(raw: Option<&str>) -> String {
    let Some(raw) = raw.map(str::trim) else {
        return String::new();
    };
    DateTime::parse_from_rfc2822(raw)
        .map(|dt| dt.with_timezone(&Utc).to_rfc3339())
        .unwrap_or_else(|_| raw.to_string())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
