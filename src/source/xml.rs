//! XML-parse stage and root-element grouping.

use std::sync::Arc;

use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::debug;

use super::{FailurePolicy, Response};
use crate::error::FeedError;
use crate::rx::{Grouped, Observable};

/// A body that has been checked to be well-formed XML.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlDocument {
    root: Option<String>,
    elements: usize,
}

impl XmlDocument {
    /// Walk the whole of `bytes`, rejecting mismatched or unclosed elements.
    ///
    /// `uri` is only used to label errors.
    pub fn parse(uri: &str, bytes: &[u8]) -> Result<Self, FeedError> {
        let mut reader = Reader::from_reader(bytes);
        let mut buf = Vec::new();
        let mut depth = 0usize;
        let mut root = None;
        let mut elements = 0usize;

        loop {
            let event = reader
                .read_event_into(&mut buf)
                .map_err(|source| FeedError::Xml {
                    uri: uri.to_string(),
                    source,
                })?;
            match event {
                Event::Start(start) => {
                    if depth == 0 {
                        check_single_root(uri, root.as_deref())?;
                        root = Some(local_name(start.local_name().as_ref()));
                    }
                    depth += 1;
                    elements += 1;
                }
                Event::Empty(empty) => {
                    if depth == 0 {
                        check_single_root(uri, root.as_deref())?;
                        root = Some(local_name(empty.local_name().as_ref()));
                    }
                    elements += 1;
                }
                Event::End(_) => depth = depth.saturating_sub(1),
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        if depth != 0 {
            return Err(FeedError::Document {
                uri: uri.to_string(),
                reason: format!("{depth} element(s) left open at end of document"),
            });
        }
        Ok(Self { root, elements })
    }

    /// Local name of the outermost element, if the document has one.
    pub fn root(&self) -> Option<&str> {
        self.root.as_deref()
    }

    pub fn elements(&self) -> usize {
        self.elements
    }
}

fn check_single_root(uri: &str, root: Option<&str>) -> Result<(), FeedError> {
    match root {
        Some(first) => Err(FeedError::Document {
            uri: uri.to_string(),
            reason: format!("second top-level element after <{first}>"),
        }),
        None => Ok(()),
    }
}

fn local_name(name: &[u8]) -> String {
    String::from_utf8_lossy(name).into_owned()
}

/// A parsed document together with the response it came from.
#[derive(Debug, Clone)]
pub struct XmlDoc {
    pub response: Arc<Response>,
    pub document: Arc<XmlDocument>,
}

/// Parse each response body, emitting documents in arrival order.
pub fn parse(responses: &Observable<Arc<Response>>, policy: FailurePolicy) -> Observable<XmlDoc> {
    responses.lift(move |downstream, response: Arc<Response>| {
        match XmlDocument::parse(response.source_uri(), response.body()) {
            Ok(document) => {
                debug!(
                    uri = response.source_uri(),
                    root = document.root().unwrap_or_default(),
                    elements = document.elements(),
                    "parsed"
                );
                downstream.next(XmlDoc {
                    response,
                    document: Arc::new(document),
                });
            }
            Err(e) => policy.fail(downstream, e),
        }
    })
}

/// Group documents by root element name (empty for a document with no root).
pub fn by_root(docs: &Observable<XmlDoc>) -> Observable<Grouped<String, XmlDoc>> {
    docs.group_by(|doc: &XmlDoc| doc.document.root().unwrap_or_default().to_string())
}

/// The documents of one root-name group.
pub fn select_root(
    groups: &Observable<Grouped<String, XmlDoc>>,
    root: &'static str,
) -> Observable<XmlDoc> {
    groups
        .filter(move |group| group.key() == root)
        .flat_map(Grouped::into_stream)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
