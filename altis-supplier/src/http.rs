use async_trait::async_trait;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

// ============================================================================
// Transport seam
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
    pub timeout: Duration,
}

impl HttpRequest {
    /// Path component of `url`, e.g. `/api/v1/flights/searchAirport`.
    pub fn path(&self) -> &str {
        let without_scheme = self
            .url
            .split_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or(&self.url);
        match without_scheme.find('/') {
            Some(idx) => &without_scheme[idx..],
            None => "/",
        }
    }

    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("transport failure: {0}")]
    Other(String),
}

/// Sends one request and hands back the raw status and body.
/// Implementations must be safe to share across concurrent tasks.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// Production transport. `reqwest::Client` pools connections internally and
/// is cheap to clone, so one instance serves every provider.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("altis-search/", env!("CARGO_PKG_VERSION")))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| TransportError::Other(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let mut builder = match request.method {
            HttpMethod::Get => self.client.get(&request.url),
            HttpMethod::Post => self.client.post(&request.url),
        };
        builder = builder.query(&request.query).timeout(request.timeout);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(map_reqwest_error)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(map_reqwest_error)?;
        Ok(HttpResponse { status, body })
    }
}

fn map_reqwest_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else if err.is_connect() {
        TransportError::Connect(err.to_string())
    } else {
        TransportError::Other(err.to_string())
    }
}

// ============================================================================
// Transient client
// ============================================================================

#[derive(Debug, Clone, thiserror::Error)]
pub enum UpstreamError {
    #[error("Upstream returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Upstream call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Upstream unreachable: {0}")]
    Network(String),

    #[error("Upstream body could not be decoded: {0}")]
    Decode(String),
}

impl UpstreamError {
    /// 429, 5xx, timeouts and aborted connections are worth another attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            UpstreamError::Status { status, .. } => *status == 429 || (500..600).contains(status),
            UpstreamError::Timeout(_) | UpstreamError::Network(_) => true,
            UpstreamError::Decode(_) => false,
        }
    }
}

/// Stateless JSON-over-HTTP helper bound to one upstream's base URL and auth
/// headers. Every call carries its own timeout; retries are the caller's job.
pub struct TransientClient {
    transport: Arc<dyn HttpTransport>,
    base_url: String,
    headers: Vec<(String, String)>,
}

impl TransientClient {
    pub fn new(transport: Arc<dyn HttpTransport>, base_url: impl Into<String>) -> Self {
        Self {
            transport,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            headers: vec![("Accept".to_string(), "application/json".to_string())],
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        timeout: Duration,
    ) -> Result<T, UpstreamError> {
        self.execute(self.request(HttpMethod::Get, path, query, None, timeout)).await
    }

    pub async fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        body: Value,
        timeout: Duration,
    ) -> Result<T, UpstreamError> {
        self.execute(self.request(HttpMethod::Post, path, query, Some(body), timeout)).await
    }

    fn request(
        &self,
        method: HttpMethod,
        path: &str,
        query: &[(&str, String)],
        body: Option<Value>,
        timeout: Duration,
    ) -> HttpRequest {
        HttpRequest {
            method,
            url: format!("{}{}", self.base_url, path),
            query: query.iter().map(|(k, v)| (k.to_string(), v.clone())).collect(),
            headers: self.headers.clone(),
            body,
            timeout,
        }
    }

    async fn execute<T: DeserializeOwned>(&self, request: HttpRequest) -> Result<T, UpstreamError> {
        let timeout = request.timeout;
        let path = request.path().to_string();
        let started = Instant::now();

        let response = match tokio::time::timeout(timeout, self.transport.send(request)).await {
            Err(_) | Ok(Err(TransportError::Timeout)) => return Err(UpstreamError::Timeout(timeout)),
            Ok(Err(err)) => return Err(UpstreamError::Network(err.to_string())),
            Ok(Ok(response)) => response,
        };

        debug!(
            path = %path,
            status = response.status,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Upstream call completed"
        );

        if !(200..300).contains(&response.status) {
            let message = serde_json::from_str::<Value>(&response.body)
                .ok()
                .and_then(|body| extract_error_message(&body))
                .unwrap_or_else(|| snippet(&response.body));
            return Err(UpstreamError::Status {
                status: response.status,
                message,
            });
        }

        serde_json::from_str::<T>(&response.body).map_err(|e| UpstreamError::Decode(e.to_string()))
    }
}

/// Pull a human-readable message out of the error shapes upstreams use:
/// `{"message": ..}`, `{"error": ".."}`, `{"error": {"message": ..}}`,
/// `{"errors": [{"message": ..}]}`.
pub fn extract_error_message(body: &Value) -> Option<String> {
    let as_text = |v: &Value| match v {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Null => None,
        other if !other.is_object() => Some(other.to_string()),
        _ => None,
    };

    if let Some(message) = body.get("message").and_then(as_text) {
        return Some(message);
    }
    if let Some(error) = body.get("error") {
        if let Some(message) = as_text(error).or_else(|| error.get("message").and_then(as_text)) {
            return Some(message);
        }
    }
    body.get("errors")
        .and_then(|errors| errors.get(0))
        .and_then(|first| first.get("message").or_else(|| first.get("title")))
        .and_then(as_text)
}

fn snippet(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "empty body".to_string();
    }
    trimmed.chars().take(200).collect()
}

// ============================================================================
// Scripted transport for tests and demos
// ============================================================================

#[derive(Debug, Clone)]
pub enum MockReply {
    Json { status: u16, body: Value },
    Raw { status: u16, body: String },
    Fail(TransportError),
    /// Never answers; only a timeout or cancellation gets the caller out.
    Hang,
    Delayed(Duration, Box<MockReply>),
}

impl MockReply {
    pub fn ok(body: Value) -> Self {
        MockReply::Json { status: 200, body }
    }

    pub fn status(status: u16, body: Value) -> Self {
        MockReply::Json { status, body }
    }

    pub fn after(self, delay: Duration) -> Self {
        MockReply::Delayed(delay, Box::new(self))
    }
}

/// Replies are queued per route. A route is a path, optionally narrowed by one
/// query pair (`/path?key=value`). The last queued reply of a route repeats.
#[derive(Default)]
pub struct MockTransport {
    routes: Mutex<HashMap<String, VecDeque<MockReply>>>,
    calls: Mutex<Vec<HttpRequest>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&self, route: &str, reply: MockReply) -> &Self {
        self.routes
            .lock()
            .entry(route.to_string())
            .or_default()
            .push_back(reply);
        self
    }

    pub fn calls(&self) -> Vec<HttpRequest> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self, path: &str) -> usize {
        self.calls.lock().iter().filter(|c| c.path() == path).count()
    }

    fn next_reply(&self, request: &HttpRequest) -> Option<MockReply> {
        let mut routes = self.routes.lock();
        let path = request.path();
        let narrowed = request
            .query
            .iter()
            .map(|(k, v)| format!("{}?{}={}", path, k, v))
            .find(|key| routes.contains_key(key));
        let key = narrowed.unwrap_or_else(|| path.to_string());

        let queue = routes.get_mut(&key)?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let reply = self.next_reply(&request);
        self.calls.lock().push(request);

        let mut reply = match reply {
            Some(reply) => reply,
            None => {
                return Ok(HttpResponse {
                    status: 404,
                    body: r#"{"message":"no mock route"}"#.to_string(),
                })
            }
        };

        loop {
            match reply {
                MockReply::Delayed(delay, inner) => {
                    tokio::time::sleep(delay).await;
                    reply = *inner;
                }
                MockReply::Hang => return std::future::pending().await,
                MockReply::Fail(err) => return Err(err),
                MockReply::Json { status, body } => {
                    return Ok(HttpResponse { status, body: body.to_string() })
                }
                MockReply::Raw { status, body } => return Ok(HttpResponse { status, body }),
            }
        }
    }
}
