//! Error type shared by every pipeline stage.
//!
//! Each variant corresponds to one place a feed can go wrong on its way from
//! URI to [`Item`](crate::source::Item).  Stages never panic on bad input;
//! they either skip the offending element (see
//! [`FailurePolicy`](crate::source::FailurePolicy)) or end their stream with
//! one of these.

use std::sync::Arc;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FeedError {
    /// Network-level failure (DNS, connect, TLS, body read, timeout).
    #[error("{uri}: request failed: {source}")]
    Transport {
        uri: String,
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with a non-2xx status.
    #[error("{uri}: HTTP error: status {status}")]
    HttpStatus { uri: String, status: u16 },

    /// `Content-Type` header missing or not of the form `top/sub[+format]`.
    #[error("malformed content type: {0:?}")]
    ContentType(String),

    /// Tokenizer-level XML error.
    #[error("{uri}: malformed XML: {source}")]
    Xml {
        uri: String,
        #[source]
        source: quick_xml::Error,
    },

    /// The XML tokenized but is not a single well-formed document.
    #[error("{uri}: malformed XML: {reason}")]
    Document { uri: String, reason: String },

    #[error("{uri}: not an Atom feed: {reason}")]
    Atom { uri: String, reason: String },

    #[error("{uri}: not an RSS channel: {source}")]
    Rss {
        uri: String,
        #[source]
        source: rss::Error,
    },

    /// An entry could not be turned into an [`Item`](crate::source::Item).
    #[error("{uri}: {reason}")]
    Mapping { uri: String, reason: String },

    /// The poll tick could not push URIs into the root stream.
    #[error("scheduling failed: {0}")]
    Schedule(String),
}

/// Terminal error carried by a stream.
///
/// Reference counted so a single failure can be forwarded unchanged to every
/// sub-stream that observes it.
pub type StreamError = Arc<FeedError>;
