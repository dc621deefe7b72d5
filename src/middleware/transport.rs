//! The bottom of the middleware stack: turns an [`HttpRequest`] into bytes
//! on the wire and back. Every layer above is transparent to payload bytes,
//! so this is the only place that knows about `reqwest`.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::rate_limit::RateLimitScope;

/// An HTTP method, kept minimal to the set this crate actually issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Delete,
}

impl Method {
    fn as_reqwest(self) -> reqwest::Method {
        match self {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

/// A request flowing down through the middleware stack.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub body: Option<Vec<u8>>,
    /// `true` for endpoints classified public; the auth layer bypasses
    /// token attachment for these.
    pub public: bool,
    /// Which hierarchical rate-limit scope(s) this request must acquire
    /// from before being dispatched.
    pub rate_limit_scope: RateLimitScope,
    /// Per-request deadline, bounding only the transport call.
    pub deadline: Duration,
}

impl HttpRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HashMap::new(),
            body: None,
            public: false,
            rate_limit_scope: RateLimitScope::PublicData,
            deadline: Duration::from_secs(30),
        }
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn with_json_body(mut self, body: &impl serde::Serialize) -> Result<Self, serde_json::Error> {
        self.body = Some(serde_json::to_vec(body)?);
        self.headers
            .insert("Content-Type".to_string(), "application/json".to_string());
        Ok(self)
    }

    pub fn public(mut self) -> Self {
        self.public = true;
        self
    }

    pub fn scoped(mut self, scope: RateLimitScope) -> Self {
        self.rate_limit_scope = scope;
        self
    }
}

/// A response flowing back up through the stack.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
    pub received_at: DateTime<Utc>,
}

impl HttpResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

/// Low-level errors a [`Transport`] can raise; the retry layer inspects
/// these to decide retryability.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out")]
    Timeout,

    #[error("request cancelled")]
    Cancelled,
}

/// The seam every middleware layer is built on. Implemented once for real
/// traffic ([`ReqwestTransport`]) and once in-memory for tests
/// ([`crate::middleware::transport::MockTransport`], behind `cfg(test)`).
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// The real transport, multiplexed over HTTP/2 when the server negotiates
/// it; `reqwest`'s default `Client` already prefers h2.
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        static USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));
        Self {
            client: reqwest::Client::builder()
                .user_agent(USER_AGENT)
                .build()
                .expect("failed to build reqwest client"),
        }
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let mut builder = self
            .client
            .request(request.method.as_reqwest(), &request.url)
            .timeout(request.deadline);

        for (key, value) in &request.headers {
            builder = builder.header(key, value);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout
            } else {
                TransportError::Network(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.to_string(), v.to_string())))
            .collect();
        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?
            .to_vec();

        Ok(HttpResponse {
            status,
            headers,
            body,
            received_at: Utc::now(),
        })
    }
}

/// An in-memory transport driven by a queue of canned responses, used by
/// the middleware/retry/circuit-breaker unit tests so their properties can
/// be exercised deterministically without a network.
#[cfg(test)]
pub struct MockTransport {
    responses: std::sync::Mutex<std::collections::VecDeque<Result<HttpResponse, TransportError>>>,
    calls: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl MockTransport {
    pub fn new(responses: Vec<Result<HttpResponse, TransportError>>) -> Self {
        Self {
            responses: std::sync::Mutex::new(responses.into()),
            calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }

    pub fn ok(status: u16, body: &str) -> Result<HttpResponse, TransportError> {
        Ok(HttpResponse {
            status,
            headers: HashMap::new(),
            body: body.as_bytes().to_vec(),
            received_at: Utc::now(),
        })
    }
}

#[cfg(test)]
#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, _request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let mut responses = self.responses.lock().unwrap();
        responses
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::Network("no more canned responses".into())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_transport_replays_in_order() {
        let transport = MockTransport::new(vec![
            MockTransport::ok(200, "first"),
            MockTransport::ok(500, "second"),
        ]);
        let r1 = transport.send(HttpRequest::new(Method::Get, "http://x")).await.unwrap();
        assert_eq!(r1.body, b"first");
        let r2 = transport.send(HttpRequest::new(Method::Get, "http://x")).await.unwrap();
        assert_eq!(r2.status, 500);
        assert_eq!(transport.calls(), 2);
    }

    #[test]
    fn response_header_lookup_is_case_insensitive() {
        let response = HttpResponse {
            status: 200,
            headers: HashMap::from([("Retry-After".to_string(), "5".to_string())]),
            body: vec![],
            received_at: Utc::now(),
        };
        assert_eq!(response.header("retry-after"), Some("5"));
    }
}
