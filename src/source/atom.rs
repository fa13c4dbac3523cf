//! Atom format: typed feed view, parse stage, and entry flattening.

use std::sync::Arc;

use feed_rs::model::{Entry, Feed, FeedType, Text};
use tracing::debug;

use super::item::timestamp;
use super::xml::XmlDoc;
use super::{FailurePolicy, Item, ItemData, ItemSource, Response, SourceEntry};
use crate::error::FeedError;
use crate::rx::Observable;

/// An Atom `<feed>` document.
pub struct AtomFeed {
    feed: Feed,
}

impl AtomFeed {
    /// Read the document behind `doc` as Atom.  Fails if the root element
    /// isn't `<feed>` or the feed reader rejects the structure.
    pub fn from_document(doc: &XmlDoc) -> Result<Self, FeedError> {
        let uri = doc.response.source_uri();
        let not_atom = |reason: String| FeedError::Atom {
            uri: uri.to_string(),
            reason,
        };

        if doc.document.root() != Some("feed") {
            return Err(not_atom(format!(
                "root element is <{}>",
                doc.document.root().unwrap_or_default()
            )));
        }
        let feed = feed_rs::parser::parse(doc.response.body()).map_err(|e| not_atom(e.to_string()))?;
        if feed.feed_type != FeedType::Atom {
            return Err(not_atom(format!("parsed as {:?}", feed.feed_type)));
        }
        Ok(Self { feed })
    }

    pub fn entries(&self) -> &[Entry] {
        &self.feed.entries
    }

    /// Feed-level fields shared by every item of this document.
    pub fn source(&self, uri: &str) -> ItemSource {
        let author = self.feed.authors.first();
        ItemSource {
            uri: uri.to_string(),
            id: self.feed.id.clone(),
            title: text(self.feed.title.as_ref()),
            subtitle: text(self.feed.description.as_ref()),
            updated: timestamp(self.feed.updated),
            author_name: author.map(|p| p.name.clone()).unwrap_or_default(),
            author_email: author.and_then(|p| p.email.clone()).unwrap_or_default(),
        }
    }

    /// Entry-level fields.  Atom requires every entry to carry a title.
    pub(crate) fn entry_data(&self, uri: &str, entry: &Entry) -> Result<ItemData, FeedError> {
        let title = entry.title.as_ref().ok_or_else(|| FeedError::Mapping {
            uri: uri.to_string(),
            reason: format!("atom entry {:?} has no <title>", entry.id),
        })?;
        Ok(ItemData {
            id: entry.id.clone(),
            title: title.content.clone(),
            author: entry.authors.first().map(|p| p.name.clone()).unwrap_or_default(),
            published: timestamp(entry.published),
            updated: timestamp(entry.updated),
            summary: text(entry.summary.as_ref()),
            content: entry
                .content
                .as_ref()
                .and_then(|c| c.body.clone())
                .unwrap_or_default(),
        })
    }

    /// Every entry as an [`Item`], in document order.
    pub fn items(&self, uri: &str) -> Result<Vec<Item>, FeedError> {
        let source = self.source(uri);
        self.entries()
            .iter()
            .map(|entry| Item::from_entry(&source, SourceEntry::Atom(self, entry)))
            .collect()
    }
}

fn text(t: Option<&Text>) -> String {
    t.map(|t| t.content.clone()).unwrap_or_default()
}

/// A parsed Atom feed with the response it came from.
#[derive(Clone)]
pub struct AtomDoc {
    pub response: Arc<Response>,
    pub feed: Arc<AtomFeed>,
}

/// Wrap each `<feed>` document in an [`AtomFeed`].
pub fn parse(docs: &Observable<XmlDoc>, policy: FailurePolicy) -> Observable<AtomDoc> {
    docs.lift(move |downstream, doc: XmlDoc| match AtomFeed::from_document(&doc) {
        Ok(feed) => {
            debug!(uri = doc.response.source_uri(), entries = feed.entries().len(), "atom feed");
            downstream.next(AtomDoc {
                response: doc.response,
                feed: Arc::new(feed),
            });
        }
        Err(e) => policy.fail(downstream, e),
    })
}

/// Emit one [`Item`] per entry of each feed, in document order.
///
/// A document whose entries can't all be mapped emits nothing; emission
/// stops as soon as the subscription is disposed.
pub fn entries(feeds: &Observable<AtomDoc>, policy: FailurePolicy) -> Observable<Item> {
    feeds.lift(move |downstream, doc: AtomDoc| {
        match doc.feed.items(doc.response.source_uri()) {
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

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::rx::{observer, Disposable, Subject};
    use crate::source::xml::XmlDocument;
    use crate::source::item::FeedKind;
    use reqwest::header::HeaderMap;
    use std::sync::Mutex;

    pub(crate) fn atom_feed(entries: usize) -> String {
        let mut xml = String::from(
            r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Example Feed</title>
  <subtitle>All the examples</subtitle>
  <id>urn:uuid:feed</id>
  <updated>2024-01-02T00:00:00Z</updated>
  <author><name>Jane Doe</name><email>jane@example.com</email></author>
"#,
        );
        for i in 1..=entries {
            xml.push_str(&format!(
                r#"  <entry>
    <title>Entry {i}</title>
    <id>urn:uuid:entry-{i}</id>
    <updated>2024-01-0{i}T12:00:00Z</updated>
    <published>2024-01-0{i}T10:00:00Z</published>
    <summary>Summary {i}</summary>
    <content type="text">Content {i}</content>
  </entry>
"#
            ));
        }
        xml.push_str("</feed>\n");
        xml
    }

    fn doc(uri: &str, body: &str) -> XmlDoc {
        XmlDoc {
            response: Arc::new(Response::new(uri, 200, HeaderMap::new(), body.as_bytes().to_vec())),
            document: Arc::new(XmlDocument::parse(uri, body.as_bytes()).unwrap()),
        }
    }

    #[test]
    fn n_entries_give_n_items_with_shared_source() {
        let feed = AtomFeed::from_document(&doc("http://a/feed.atom", &atom_feed(3))).unwrap();
        let items = feed.items("http://a/feed.atom").unwrap();

        assert_eq!(items.len(), 3);
        for (i, item) in items.iter().enumerate() {
            assert_eq!(item.kind, FeedKind::Atom);
            assert_eq!(item.source, items[0].source);
            assert_eq!(item.data.title, format!("Entry {}", i + 1));
            assert_eq!(item.data.id, format!("urn:uuid:entry-{}", i + 1));
        }

        let source = &items[0].source;
        assert_eq!(source.uri, "http://a/feed.atom");
        assert_eq!(source.id, "urn:uuid:feed");
        assert_eq!(source.title, "Example Feed");
        assert_eq!(source.subtitle, "All the examples");
        assert_eq!(source.updated, "2024-01-02T00:00:00+00:00");
        assert_eq!(source.author_name, "Jane Doe");
        assert_eq!(source.author_email, "jane@example.com");

        let data = &items[1].data;
        assert_eq!(data.published, "2024-01-02T10:00:00+00:00");
        assert_eq!(data.updated, "2024-01-02T12:00:00+00:00");
        assert_eq!(data.summary, "Summary 2");
        assert_eq!(data.content, "Content 2");
    }

    #[test]
    fn rss_document_is_not_atom() {
        let body = r#"<rss version="2.0"><channel><title>t</title></channel></rss>"#;
        assert!(matches!(
            AtomFeed::from_document(&doc("u", body)),
            Err(FeedError::Atom { .. })
        ));
    }

    #[test]
    fn entry_without_title_fails_mapping() {
        let body = r#"<feed xmlns="http://www.w3.org/2005/Atom"><title>t</title><id>f</id>
<entry><id>e1</id><updated>2024-01-01T00:00:00Z</updated></entry></feed>"#;
        let feed = AtomFeed::from_document(&doc("http://m", body)).unwrap();
        let err = feed.items("http://m").unwrap_err();
        assert!(err.to_string().starts_with("http://m: atom entry"));
    }

    #[test]
    fn dispose_mid_document_stops_remaining_entries() {
        let subject = Subject::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let handle: Arc<Mutex<Option<Disposable>>> = Arc::default();
        let (s, h) = (seen.clone(), handle.clone());

        let d = entries(&parse(&subject.observable(), FailurePolicy::Abort), FailurePolicy::Abort)
            .subscribe(observer(
                move |item: Item| {
                    let mut seen = s.lock().unwrap();
                    seen.push(item.data.title);
                    if seen.len() == 2 {
                        if let Some(d) = h.lock().unwrap().as_ref() {
                            d.dispose();
                        }
                    }
                },
                |e| panic!("unexpected error: {e}"),
                || {},
            ));
        *handle.lock().unwrap() = Some(d.clone());

        subject.try_next(doc("http://a", &atom_feed(5))).unwrap();
        subject.try_next(doc("http://b", &atom_feed(5))).unwrap();

        assert_eq!(*seen.lock().unwrap(), vec!["Entry 1", "Entry 2"]);
        assert!(d.is_disposed());
        // Disposing again is harmless.
        d.dispose();
    }
}
