use async_trait::async_trait;
use thiserror::Error;

/// HTTP headers represented as key/value pairs.
///
/// Header names are treated case-insensitively by helper functions.
pub type HttpHeaders = Vec<(String, String)>;

/// A minimal HTTP GET request.
///
/// The upstream API is read-only for this pipeline, so the transport only
/// models GET.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub url: String,
    pub headers: HttpHeaders,
}

/// A minimal HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HttpHeaders,
    pub body: Vec<u8>,
}

impl HttpResponse {
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        header_get(&self.headers, name)
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("http transport error: {0}")]
    Transport(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("no mock response registered for {url}")]
    NoMockResponse { url: String },
}

/// Transport boundary for all HTTP I/O.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError>;
}

/// Get the first header value matching `name` (case-insensitive).
#[must_use]
pub fn header_get<'a>(headers: &'a HttpHeaders, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

pub mod reqwest_transport {
    use super::*;

    use std::time::Duration as StdDuration;

    /// A real HTTP transport backed by reqwest.
    #[derive(Clone)]
    pub struct ReqwestTransport {
        client: reqwest::Client,
    }

    impl ReqwestTransport {
        pub fn new(client: reqwest::Client) -> Self {
            Self { client }
        }

        pub fn with_timeout(timeout: StdDuration) -> Result<Self, HttpError> {
            let client = reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .map_err(|e| HttpError::Transport(e.to_string()))?;
            Ok(Self { client })
        }
    }

    #[async_trait]
    impl HttpTransport for ReqwestTransport {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
            let mut builder = self.client.get(&request.url);
            for (k, v) in request.headers {
                builder = builder.header(&k, &v);
            }

            let resp = builder.send().await.map_err(|e| {
                if e.is_timeout() {
                    HttpError::Timeout(e.to_string())
                } else {
                    HttpError::Transport(e.to_string())
                }
            })?;

            let status = resp.status().as_u16();
            let mut headers: HttpHeaders = Vec::new();
            for (name, value) in resp.headers().iter() {
                headers.push((
                    name.as_str().to_string(),
                    value.to_str().unwrap_or_default().to_string(),
                ));
            }

            let body = resp
                .bytes()
                .await
                .map_err(|e| HttpError::Transport(e.to_string()))?
                .to_vec();

            Ok(HttpResponse {
                status,
                headers,
                body,
            })
        }
    }
}

// ---------- Test-only mock transport ----------

#[cfg(test)]
use std::collections::{HashMap, VecDeque};
#[cfg(test)]
use std::sync::{Arc, Mutex};

/// In-memory mock transport.
///
/// Designed for unit tests: no sockets, no loopback HTTP servers.
#[cfg(test)]
#[derive(Clone, Default)]
pub struct MockTransport {
    inner: Arc<Mutex<MockTransportInner>>,
}

#[cfg(test)]
#[derive(Default)]
struct MockTransportInner {
    routes: HashMap<String, VecDeque<Result<HttpResponse, String>>>,
    requests: Vec<HttpRequest>,
}

#[cfg(test)]
impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a response for a URL.
    ///
    /// If multiple responses are registered for the same URL, they are
    /// returned in FIFO order.
    pub fn push_response(&self, url: impl Into<String>, response: HttpResponse) {
        let mut inner = self
            .inner
            .lock()
            .expect("mock transport lock should not be poisoned");
        inner
            .routes
            .entry(url.into())
            .or_default()
            .push_back(Ok(response));
    }

    /// Register a transport-level failure for a URL.
    pub fn push_error(&self, url: impl Into<String>, message: impl Into<String>) {
        let mut inner = self
            .inner
            .lock()
            .expect("mock transport lock should not be poisoned");
        inner
            .routes
            .entry(url.into())
            .or_default()
            .push_back(Err(message.into()));
    }

    #[must_use]
    pub fn requests(&self) -> Vec<HttpRequest> {
        let inner = self
            .inner
            .lock()
            .expect("mock transport lock should not be poisoned");
        inner.requests.clone()
    }

    #[must_use]
    pub fn request_count(&self) -> usize {
        self.requests().len()
    }
}

#[cfg(test)]
#[async_trait]
impl HttpTransport for MockTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        let mut inner = self
            .inner
            .lock()
            .expect("mock transport lock should not be poisoned");

        let url = request.url.clone();
        inner.requests.push(request);

        match inner.routes.get_mut(&url).and_then(|q| q.pop_front()) {
            Some(Ok(resp)) => Ok(resp),
            Some(Err(message)) => Err(HttpError::Transport(message)),
            None => Err(HttpError::NoMockResponse { url }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok_response(body: &[u8]) -> HttpResponse {
        HttpResponse {
            status: 200,
            headers: Vec::new(),
            body: body.to_vec(),
        }
    }

    #[test]
    fn header_get_is_case_insensitive_and_returns_first_match() {
        let headers: HttpHeaders = vec![
            ("ETag".to_string(), "W/\"abc\"".to_string()),
            ("etag".to_string(), "W/\"def\"".to_string()),
        ];
        assert_eq!(header_get(&headers, "etag"), Some("W/\"abc\""));
        assert_eq!(header_get(&headers, "ETAG"), Some("W/\"abc\""));
        assert_eq!(header_get(&headers, "missing"), None);
    }

    #[test]
    fn http_response_header_delegates_to_helper() {
        let resp = HttpResponse {
            status: 200,
            headers: vec![("Content-Type".to_string(), "text/plain".to_string())],
            body: Vec::new(),
        };
        assert_eq!(resp.header("content-type"), Some("text/plain"));
        assert_eq!(resp.header("missing"), None);
    }

    #[test]
    fn is_success_covers_2xx_only() {
        for status in [200u16, 201, 204, 299] {
            let resp = HttpResponse {
                status,
                headers: Vec::new(),
                body: Vec::new(),
            };
            assert!(resp.is_success(), "status {status} should be success");
        }
        for status in [199u16, 301, 403, 500] {
            let resp = HttpResponse {
                status,
                headers: Vec::new(),
                body: Vec::new(),
            };
            assert!(!resp.is_success(), "status {status} should not be success");
        }
    }

    #[tokio::test]
    async fn mock_transport_returns_registered_responses_in_fifo_order() {
        let transport = MockTransport::new();
        let url = "https://example.com/api";

        transport.push_response(url, ok_response(b"first"));
        transport.push_response(url, ok_response(b"second"));

        let req = HttpRequest {
            url: url.to_string(),
            headers: vec![("Accept".to_string(), "application/json".to_string())],
        };

        let first = transport.send(req.clone()).await.expect("first response");
        let second = transport.send(req.clone()).await.expect("second response");
        assert_eq!(first.body, b"first".to_vec());
        assert_eq!(second.body, b"second".to_vec());

        let requests = transport.requests();
        assert_eq!(requests, vec![req.clone(), req]);
    }

    #[tokio::test]
    async fn mock_transport_errors_when_no_response_is_registered() {
        let transport = MockTransport::new();
        let req = HttpRequest {
            url: "https://example.com/missing".to_string(),
            headers: Vec::new(),
        };

        let err = transport
            .send(req)
            .await
            .expect_err("missing mock should error");
        match err {
            HttpError::NoMockResponse { url } => {
                assert_eq!(url, "https://example.com/missing");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn mock_transport_surfaces_pushed_transport_errors() {
        let transport = MockTransport::new();
        let url = "https://example.com/flaky";
        transport.push_error(url, "connection reset");
        transport.push_response(url, ok_response(b"recovered"));

        let req = HttpRequest {
            url: url.to_string(),
            headers: Vec::new(),
        };

        let err = transport
            .send(req.clone())
            .await
            .expect_err("first call should fail");
        assert!(matches!(err, HttpError::Transport(_)));

        let resp = transport.send(req).await.expect("second call should pass");
        assert_eq!(resp.body, b"recovered".to_vec());
    }

    #[test]
    fn reqwest_transport_with_timeout_builds_client() {
        let transport =
            reqwest_transport::ReqwestTransport::with_timeout(std::time::Duration::from_secs(10))
                .expect("reqwest transport should build");
        let _ = transport;
    }
}
