// REST client for the banking backend
//
// Wraps `reqwest::Client` with base-URL resolution, bearer and
// idempotency header injection, and status classification. Callers get
// a decoded JSON body on success, or an `Error` variant that already
// says which class of failure occurred.

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::transport::TransportConfig;

/// Header carrying the per-submission idempotency token on mutating calls.
pub const IDEMPOTENCY_KEY: HeaderName = HeaderName::from_static("idempotency-key");

// ── RestRequest ──────────────────────────────────────────────────────

/// A single outbound call, described before it is issued.
#[derive(Debug, Clone)]
pub struct RestRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: HeaderMap,
    pub body: Option<Value>,
    pub bearer: Option<SecretString>,
    pub idempotency_key: Option<String>,
}

impl RestRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: HeaderMap::new(),
            body: None,
            bearer: None,
            idempotency_key: None,
        }
    }

    pub fn query(mut self, query: Vec<(String, String)>) -> Self {
        self.query = query;
        self
    }

    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn bearer(mut self, token: SecretString) -> Self {
        self.bearer = Some(token);
        self
    }

    pub fn idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }
}

// ── RestResponse ─────────────────────────────────────────────────────

/// A successful (2xx) response. `body` is `Null` for empty payloads and a
/// JSON string for `text/*` payloads.
#[derive(Debug, Clone, PartialEq)]
pub struct RestResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl RestResponse {
    /// `202 Accepted`: the server wants a second verification step.
    pub fn is_accepted(&self) -> bool {
        self.status == StatusCode::ACCEPTED
    }
}

// ── RestClient ───────────────────────────────────────────────────────

/// Raw HTTP client for the banking REST API.
pub struct RestClient {
    http: reqwest::Client,
    base_url: Url,
}

impl RestClient {
    /// Create a new client from a `TransportConfig`.
    pub fn new(base_url: Url, transport: &TransportConfig) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self { http, base_url })
    }

    /// Create a client around a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, base_url: Url) -> Self {
        Self { http, base_url }
    }

    /// The API base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Issue a request and classify the outcome.
    pub async fn send(&self, request: RestRequest) -> Result<RestResponse, Error> {
        let url = self.base_url.join(&request.path)?;
        debug!(method = %request.method, url = %url, "sending request");

        let mut builder = self
            .http
            .request(request.method, url)
            .headers(request.headers);

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(token) = request.bearer {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", token.expose_secret()))?;
            value.set_sensitive(true);
            builder = builder.header(AUTHORIZATION, value);
        }
        if let Some(key) = request.idempotency_key {
            builder = builder.header(IDEMPOTENCY_KEY, HeaderValue::from_str(&key)?);
        }
        if let Some(body) = request.body {
            builder = builder.json(&body);
        }

        let resp = builder.send().await.map_err(Error::Transport)?;
        classify(resp).await
    }
}

// ── Outcome classification ───────────────────────────────────────────

async fn classify(resp: reqwest::Response) -> Result<RestResponse, Error> {
    let status = resp.status();
    let is_text = resp
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("text/"));
    let body = resp.text().await.map_err(Error::Transport)?;

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(Error::Unauthorized {
            status: status.as_u16(),
            message: error_message(status, &body),
        });
    }
    if status.is_client_error() {
        return Err(Error::Rejected {
            status: status.as_u16(),
            message: error_message(status, &body),
        });
    }
    if !status.is_success() {
        return Err(Error::Server {
            status: status.as_u16(),
            message: error_message(status, &body),
        });
    }

    let body = if body.trim().is_empty() {
        Value::Null
    } else if is_text {
        Value::String(body)
    } else {
        serde_json::from_str(&body).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body: body.clone(),
        })?
    };

    Ok(RestResponse { status, body })
}

/// Pull a human-readable message out of an error body.
///
/// Accepts `{"message": ..}` or `{"error": ..}` JSON, falls back to the
/// raw text, then to the status reason phrase.
pub(crate) fn error_message(status: StatusCode, body: &str) -> String {
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(body) {
        for field in ["message", "error", "detail"] {
            if let Some(msg) = map.get(field).and_then(Value::as_str) {
                return msg.to_owned();
            }
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_owned()
    } else {
        trimmed.to_owned()
    }
}
