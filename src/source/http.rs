//! Fetch stage: URIs in, HTTP responses out.
//!
//! The network itself sits behind the [`Fetch`] trait so the rest of the
//! pipeline can be driven by an in-memory fake in tests.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, CONNECTION, USER_AGENT};
use tracing::debug;

use super::FailurePolicy;
use crate::error::FeedError;
use crate::rx::Observable;

/// A completed HTTP exchange for one URI.
///
/// Created by the fetch stage and then shared read-only (as
/// `Arc<Response>`) by every stage downstream of it.
#[derive(Debug, Clone)]
pub struct Response {
    uri: String,
    status: u16,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl Response {
    pub fn new(uri: impl Into<String>, status: u16, headers: HeaderMap, body: Vec<u8>) -> Self {
        Self {
            uri: uri.into(),
            status,
            headers,
            body,
        }
    }

    pub fn source_uri(&self) -> &str {
        &self.uri
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    /// Header lookup; names are case-insensitive.  Values that aren't
    /// visible ASCII are treated as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }
}

/// Anything that can GET a URI synchronously.
pub trait Fetch: Send + Sync {
    fn get(&self, uri: &str) -> Result<Response, FeedError>;
}

/// [`Fetch`] over a blocking `reqwest` client.
pub struct HttpClient {
    client: reqwest::blocking::Client,
}

impl HttpClient {
    pub fn new(timeout: Duration) -> reqwest::Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }
}

impl Fetch for HttpClient {
    fn get(&self, uri: &str) -> Result<Response, FeedError> {
        let transport = |source| FeedError::Transport {
            uri: uri.to_string(),
            source,
        };

        let response = self
            .client
            .get(uri)
            .header(CONNECTION, "close")
            .header(USER_AGENT, concat!("feedstream/", env!("CARGO_PKG_VERSION")))
            .send()
            .map_err(transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FeedError::HttpStatus {
                uri: uri.to_string(),
                status: status.as_u16(),
            });
        }

        let headers = response.headers().clone();
        let body = response.bytes().map_err(transport)?.to_vec();
        Ok(Response::new(uri, status.as_u16(), headers, body))
    }
}

/// Fetch every URI the upstream emits.
///
/// Runs on whichever context delivers the URIs; the pipeline puts a worker
/// lane in front of it so the poll tick never waits on the network.
pub fn http_get(
    uris: &Observable<String>,
    fetcher: Arc<dyn Fetch>,
    policy: FailurePolicy,
) -> Observable<Arc<Response>> {
    uris.lift(move |downstream, uri: String| {
        debug!(%uri, "fetching");
        match fetcher.get(&uri) {
            Ok(response) => {
                debug!(%uri, status = response.status(), bytes = response.body().len(), "fetched");
                downstream.next(response);
            }
            Err(e) => policy.fail(downstream, e),
        }
    })
    .map(Arc::new)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rx::{observer, Subject};
    use reqwest::header::{HeaderValue, CONTENT_TYPE};
    use std::sync::Mutex;
    use wiremock::matchers::{header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct Canned;

    impl Fetch for Canned {
        fn get(&self, uri: &str) -> Result<Response, FeedError> {
            if uri.contains("down") {
                return Err(FeedError::HttpStatus {
                    uri: uri.to_string(),
                    status: 503,
                });
            }
            let mut headers = HeaderMap::new();
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/rss+xml"));
            Ok(Response::new(uri, 200, headers, b"<rss/>".to_vec()))
        }
    }

    fn run(policy: FailurePolicy, uris: &[&str]) -> (Vec<String>, Vec<String>) {
        let subject = Subject::new();
        let ok = Arc::new(Mutex::new(Vec::new()));
        let errors = Arc::new(Mutex::new(Vec::new()));
        let (o, e) = (ok.clone(), errors.clone());
        let _d = http_get(&subject.observable(), Arc::new(Canned), policy).subscribe(observer(
            move |r: Arc<Response>| o.lock().unwrap().push(r.source_uri().to_string()),
            move |err| e.lock().unwrap().push(err.to_string()),
            || {},
        ));
        for uri in uris {
            let _ = subject.try_next(uri.to_string());
        }
        let ok = ok.lock().unwrap().clone();
        let errors = errors.lock().unwrap().clone();
        (ok, errors)
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let response = Canned.get("http://a/feed").unwrap();
        assert_eq!(response.header("content-type"), Some("application/rss+xml"));
        assert_eq!(response.header("Content-Type"), Some("application/rss+xml"));
        assert_eq!(response.header("X-Missing"), None);
    }

    #[test]
    fn isolate_skips_failed_fetch() {
        let (ok, errors) = run(FailurePolicy::Isolate, &["http://a", "http://down", "http://b"]);
        assert_eq!(ok, vec!["http://a", "http://b"]);
        assert!(errors.is_empty());
    }

    #[test]
    fn abort_terminates_on_first_failure() {
        let (ok, errors) = run(FailurePolicy::Abort, &["http://a", "http://down", "http://b"]);
        assert_eq!(ok, vec!["http://a"]);
        assert_eq!(errors, vec!["http://down: HTTP error: status 503"]);
    }

    // The blocking client must not be built, used or dropped on an async
    // thread, so the real-client tests hop onto the blocking pool.
    async fn blocking_get(uri: String) -> Result<Response, FeedError> {
        tokio::task::spawn_blocking(move || HttpClient::new(Duration::from_secs(5)).unwrap().get(&uri))
            .await
            .unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn client_requests_connection_close() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("connection", "close"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("<rss/>")
                    .insert_header("Content-Type", "application/rss+xml"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let response = blocking_get(format!("{}/feed", server.uri())).await.unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(response.header("content-type"), Some("application/rss+xml"));
        assert_eq!(response.body(), b"<rss/>".as_slice());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn client_maps_non_success_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let uri = format!("{}/feed", server.uri());
        match blocking_get(uri.clone()).await {
            Err(FeedError::HttpStatus { uri: failed, status: 503 }) => assert_eq!(failed, uri),
            other => panic!("expected HttpStatus(503), got {other:?}"),
        }
    }

    #[test]
    fn client_maps_refused_connection_to_transport() {
        let client = HttpClient::new(Duration::from_secs(2)).unwrap();
        match client.get("http://127.0.0.1:1/feed") {
            Err(e @ FeedError::Transport { .. }) => {
                assert!(e.to_string().starts_with("http://127.0.0.1:1/feed: request failed"));
            }
            other => panic!("expected Transport, got {other:?}"),
        }
    }
}
