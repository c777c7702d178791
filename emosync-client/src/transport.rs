//! Transport seam: one request in, one status + body out.
//!
//! [`SessionManager`](crate::SessionManager) and [`EmotionApi`](crate::EmotionApi)
//! only ever talk to a [`Transport`], so tests can script the backend without
//! a socket. [`HttpTransport`] is the reqwest-backed implementation.

use std::fmt;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use emosync_core::config::ApiConfig;
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::ApiError;

/// Request payload encoding.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// No body.
    Empty,
    /// `application/json`.
    Json(serde_json::Value),
    /// `application/x-www-form-urlencoded`.
    Form(Vec<(String, String)>),
}

/// A single backend request, relative to the transport's base URL.
#[derive(Clone)]
pub struct ApiRequest {
    /// HTTP method.
    pub method: Method,
    /// Path beginning with `/`.
    pub path: String,
    /// Query string pairs.
    pub query: Vec<(String, String)>,
    /// Full `Authorization` header value, if any.
    pub authorization: Option<String>,
    /// Body.
    pub body: RequestBody,
    /// Per-request timeout overriding the transport default.
    pub timeout: Option<Duration>,
}

impl ApiRequest {
    fn new(method: Method, path: impl Into<String>, body: RequestBody) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            authorization: None,
            body,
            timeout: None,
        }
    }

    /// `GET path`.
    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path, RequestBody::Empty)
    }

    /// `POST path` with a JSON body.
    #[must_use]
    pub fn post_json(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self::new(Method::POST, path, RequestBody::Json(body))
    }

    /// `POST path` with a form body.
    #[must_use]
    pub fn post_form<K, V>(path: impl Into<String>, fields: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let fields = fields.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        Self::new(Method::POST, path, RequestBody::Form(fields))
    }

    /// Append a query pair.
    #[must_use]
    pub fn with_query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    /// Set the `Authorization` header value.
    #[must_use]
    pub fn with_authorization(mut self, header: impl Into<String>) -> Self {
        self.authorization = Some(header.into());
        self
    }

    /// Override the timeout for this request.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

// The authorization header stays out of logs.
impl fmt::Debug for ApiRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiRequest")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("query", &self.query)
            .field("authorized", &self.authorization.is_some())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Status and body of a completed round trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    /// HTTP status code.
    pub status: u16,
    /// Raw body text.
    pub body: String,
}

impl ApiResponse {
    /// Build a response.
    #[must_use]
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// 2xx.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Deserialize the body.
    ///
    /// # Errors
    /// [`ApiError::Parse`] when the body does not match `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        serde_json::from_str(&self.body)
            .map_err(|e| ApiError::Parse(format!("{e}; raw body: '{}'", truncate(&self.body, 200))))
    }

    /// The server's `{"detail": "..."}` message, if present.
    #[must_use]
    pub fn detail(&self) -> Option<String> {
        let value: serde_json::Value = serde_json::from_str(&self.body).ok()?;
        match &value["detail"] {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Null => None,
            // Validation errors arrive as a list of objects.
            other => Some(other.to_string()),
        }
    }

    /// Turn a non-success response into [`ApiError::Protocol`].
    #[must_use]
    pub fn protocol_error(&self) -> ApiError {
        ApiError::Protocol {
            status: self.status,
            body: self.detail().unwrap_or_else(|| truncate(&self.body, 200).to_string()),
        }
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Sends one request and returns the raw response.
///
/// Implementations map connection failures to [`ApiError::Network`] and
/// time-outs to [`ApiError::Timeout`]; any received status is returned as
/// `Ok`, including 4xx and 5xx.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform the round trip.
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ApiError>;
}

/// reqwest-backed [`Transport`].
pub struct HttpTransport {
    http: Client,
    base_url: String,
    default_timeout: Duration,
}

impl HttpTransport {
    /// Create a transport for `config.base_url`.
    ///
    /// # Errors
    /// [`ApiError::Network`] if the HTTP client cannot be built.
    pub fn new(config: &ApiConfig) -> Result<Self, ApiError> {
        let http = Client::builder()
            .build()
            .map_err(|e| ApiError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            default_timeout: Duration::from_millis(config.request_timeout_ms),
        })
    }

    /// Base URL without trailing slash.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        let url = format!("{}{}", self.base_url, request.path);
        let timeout = request.timeout.unwrap_or(self.default_timeout);

        let mut builder = self.http.request(request.method.clone(), &url).timeout(timeout);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(header) = &request.authorization {
            builder = builder.header(reqwest::header::AUTHORIZATION, header);
        }
        builder = match &request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(value),
            RequestBody::Form(fields) => builder.form(fields),
        };

        let start = Instant::now();
        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                #[allow(clippy::cast_possible_truncation)]
                let ms = timeout.as_millis() as u64;
                warn!(method = %request.method, path = %request.path, timeout_ms = ms, "Request timed out");
                ApiError::Timeout(ms)
            } else {
                warn!(method = %request.method, path = %request.path, error = %e, "Request failed");
                ApiError::from(e)
            }
        })?;

        let status = response.status().as_u16();
        let body = response.text().await?;
        debug!(
            method = %request.method,
            path = %request.path,
            status,
            latency_ms = start.elapsed().as_millis(),
            "Backend round trip"
        );
        Ok(ApiResponse { status, body })
    }
}

// ---------------------------------------------------------------------------
// Scripted transport for unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod mock {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::{ApiError, ApiRequest, ApiResponse, Transport, async_trait};

    type Handler = dyn Fn(&ApiRequest) -> Result<ApiResponse, ApiError> + Send + Sync;

    /// Answers every request with a closure and records what it saw.
    pub(crate) struct ScriptedTransport {
        handler: Box<Handler>,
        pub(crate) seen: Mutex<Vec<ApiRequest>>,
    }

    impl ScriptedTransport {
        pub(crate) fn new<F>(handler: F) -> Arc<Self>
        where
            F: Fn(&ApiRequest) -> Result<ApiResponse, ApiError> + Send + Sync + 'static,
        {
            Arc::new(Self {
                handler: Box::new(handler),
                seen: Mutex::new(Vec::new()),
            })
        }

        pub(crate) fn paths(&self) -> Vec<String> {
            self.seen.lock().iter().map(|r| r.path.clone()).collect()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
            self.seen.lock().push(request.clone());
            // Let concurrent callers interleave.
            tokio::task::yield_now().await;
            (self.handler)(&request)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detail_is_extracted() {
        let resp = ApiResponse::new(401, r#"{"detail":"Incorrect username or password"}"#);
        assert_eq!(resp.detail().as_deref(), Some("Incorrect username or password"));
        assert!(!resp.is_success());
    }

    #[test]
    fn protocol_error_falls_back_to_body() {
        let resp = ApiResponse::new(502, "<html>bad gateway</html>");
        match resp.protocol_error() {
            ApiError::Protocol { status, body } => {
                assert_eq!(status, 502);
                assert!(body.contains("bad gateway"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn debug_hides_authorization() {
        let req = ApiRequest::get("/health").with_authorization("Bearer secret");
        let rendered = format!("{req:?}");
        assert!(!rendered.contains("secret"));
        assert!(rendered.contains("authorized: true"));
    }

    #[test]
    fn form_builder_collects_pairs() {
        let req = ApiRequest::post_form("/token", [("username", "alice"), ("password", "pw")]);
        assert_eq!(req.method, Method::POST);
        assert_eq!(
            req.body,
            RequestBody::Form(vec![
                ("username".into(), "alice".into()),
                ("password".into(), "pw".into())
            ])
        );
    }

    #[test]
    fn json_reports_parse_error() {
        let resp = ApiResponse::new(200, "not json");
        let err = resp.json::<serde_json::Value>().expect_err("must fail");
        assert!(matches!(err, ApiError::Parse(_)));
    }
}
