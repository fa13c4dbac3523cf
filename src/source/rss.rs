//! RSS format: typed channel view, parse stage, and item flattening.
//!
//! Parsing is done by the [`rss`] crate.  Use this file together with
//! `atom.rs` as the template when adding another format.

use std::sync::Arc;

use tracing::debug;

use super::item::rfc2822_timestamp;
use super::xml::XmlDoc;
use super::{FailurePolicy, Item, ItemData, ItemSource, Response, SourceEntry};
use crate::error::FeedError;
use crate::rx::Observable;

/// An RSS 2.0 `<rss><channel>` document.
pub struct RssChannel {
    channel: rss::Channel,
}

impl RssChannel {
    /// Read the document behind `doc` as an RSS channel.  Fails if the root
    /// element isn't `<rss>` or the channel is malformed.
    pub fn from_document(doc: &XmlDoc) -> Result<Self, FeedError> {
        let uri = doc.response.source_uri();
        if doc.document.root() != Some("rss") {
            return Err(FeedError::Rss {
                uri: uri.to_string(),
                source: rss::Error::InvalidStartTag,
            });
        }
        let channel = rss::Channel::read_from(doc.response.body()).map_err(|source| FeedError::Rss {
            uri: uri.to_string(),
            source,
        })?;
        Ok(Self { channel })
    }

    pub fn items(&self) -> &[rss::Item] {
        self.channel.items()
    }

    /// Channel-level fields shared by every item of this document.
    ///
    /// RSS has no feed id or author email; the channel link stands in for
    /// the subtitle.
    pub fn source(&self, uri: &str) -> ItemSource {
        ItemSource {
            uri: uri.to_string(),
            id: String::new(),
            title: self.channel.title().to_string(),
            subtitle: self.channel.link().to_string(),
            updated: rfc2822_timestamp(self.channel.last_build_date()),
            author_name: self.channel.managing_editor().unwrap_or_default().to_string(),
            author_email: String::new(),
        }
    }

    /// Item-level fields.  RSS items have no id; an item needs at least a
    /// title or a description to be meaningful.
    pub(crate) fn item_data(&self, uri: &str, item: &rss::Item) -> Result<ItemData, FeedError> {
        if item.title().is_none() && item.description().is_none() {
            return Err(FeedError::Mapping {
                uri: uri.to_string(),
                reason: "rss item has neither <title> nor <description>".into(),
            });
        }
        Ok(ItemData {
            id: String::new(),
            title: item.title().unwrap_or_default().to_string(),
            author: item.author().unwrap_or_default().to_string(),
            published: rfc2822_timestamp(item.pub_date()),
            updated: String::new(),
            summary: String::new(),
            content: item.description().unwrap_or_default().to_string(),
        })
    }

    /// Every item as an [`Item`], in document order.
    pub fn to_items(&self, uri: &str) -> Result<Vec<Item>, FeedError> {
        let source = self.source(uri);
        self.items()
            .iter()
            .map(|item| Item::from_entry(&source, SourceEntry::Rss(self, item)))
            .collect()
    }
}

/// A parsed RSS channel with the response it came from.
#[derive(Clone)]
pub struct RssDoc {
    pub response: Arc<Response>,
    pub channel: Arc<RssChannel>,
}

/// Wrap each `<rss>` document in an [`RssChannel`].
pub fn parse(docs: &Observable<XmlDoc>, policy: FailurePolicy) -> Observable<RssDoc> {
    docs.lift(move |downstream, doc: XmlDoc| match RssChannel::from_document(&doc) {
        Ok(channel) => {
            debug!(uri = doc.response.source_uri(), items = channel.items().len(), "rss channel");
            downstream.next(RssDoc {
                response: doc.response,
                channel: Arc::new(channel),
            });
        }
        Err(e) => policy.fail(downstream, e),
    })
}

/// Emit one [`Item`] per channel item, in document order.
///
/// A document whose items can't all be mapped emits nothing; emission stops
/// as soon as the subscription is disposed.
pub fn entries(channels: &Observable<RssDoc>, policy: FailurePolicy) -> Observable<Item> {
    channels.lift(move |downstream, doc: RssDoc| {
        match doc.channel.to_items(doc.response.source_uri()) {
            Ok(items) => {
                for item in items {
                    if !downstream.next(item) {
                        break;
                    }
                }
            }
            Err(e) => policy.fail(downstream, e),
        }
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
