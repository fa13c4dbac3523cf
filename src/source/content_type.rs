//! Classification stage: keep only responses that declare an XML payload.

use std::str::FromStr;
use std::sync::Arc;

use tracing::{debug, warn};

use super::Response;
use crate::error::FeedError;
use crate::rx::{Grouped, Observable};

/// A parsed `Content-Type` value of the form
/// `top/sub[+format][; charset=...]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentType {
    pub top: String,
    pub sub: String,
    /// Structured-syntax suffix (`xml` in `application/atom+xml`); empty
    /// when there is none.
    pub format: String,
    pub charset: Option<String>,
}

impl ContentType {
    /// `application/*` or `text/*` whose suffix (or, without one, whose
    /// subtype) is `xml`.
    pub fn is_xml(&self) -> bool {
        let xml = if self.format.is_empty() {
            self.sub == "xml"
        } else {
            self.format == "xml"
        };
        matches!(self.top.as_str(), "application" | "text") && xml
    }
}

fn is_token(s: &str) -> bool {
    !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '.' || c == '-')
}

impl FromStr for ContentType {
    type Err = FeedError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let malformed = || FeedError::ContentType(value.to_string());
        let lowered = value.to_ascii_lowercase();
        let mut parts = lowered.split(';');

        let media = parts.next().unwrap_or_default().trim();
        let (top, rest) = media.split_once('/').ok_or_else(malformed)?;
        let (sub, format) = match rest.split_once('+') {
            Some((sub, format)) if is_token(format) => (sub, format),
            Some(_) => return Err(malformed()),
            None => (rest, ""),
        };
        if !is_token(top) || !is_token(sub) {
            return Err(malformed());
        }

        let charset = parts
            .filter_map(|param| param.trim().strip_prefix("charset="))
            .map(|cs| cs.trim_matches('"').to_string())
            .next();

        Ok(ContentType {
            top: top.to_string(),
            sub: sub.to_string(),
            format: format.to_string(),
            charset,
        })
    }
}

/// Group responses by the verbatim `Content-Type` header (empty when absent).
pub fn by_content_type(
    responses: &Observable<Arc<Response>>,
) -> Observable<Grouped<String, Arc<Response>>> {
    responses.group_by(|response: &Arc<Response>| {
        response.header("Content-Type").unwrap_or_default().to_string()
    })
}

/// Keep the groups whose content type is XML and merge them back into one
/// stream.  A header that doesn't parse never fails the pipeline; the whole
/// group is logged once and skipped.
pub fn xml_only(
    groups: &Observable<Grouped<String, Arc<Response>>>,
) -> Observable<Arc<Response>> {
    groups
        .filter(|group| match group.key().parse::<ContentType>() {
            Ok(content_type) => {
                let keep = content_type.is_xml();
                debug!(content_type = %group.key(), keep, "classified");
                keep
            }
            Err(e) => {
                warn!(error = %e, "skipping responses");
                false
            }
        })
        .flat_map(Grouped::into_stream)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
