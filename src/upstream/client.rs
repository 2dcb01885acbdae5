//! HTTP client for the game engine.
//!
//! # Responsibilities
//! - Build the upstream URL (base + path + original query)
//! - Forward an allowlisted set of headers, never `Authorization`
//! - Enforce the timeout budget of the call's class
//! - Classify failures: upstream rejection, unreachable, timed out
//!
//! # Design Decisions
//! - One shared `reqwest::Client` (connection pooling, connect timeout)
//! - No retries; each call is made exactly once
//! - Upstream success statuses are preserved

use std::error::Error as StdError;

use axum::{
    body::{Body, Bytes},
    http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
};
use serde_json::Value;

use crate::config::UpstreamConfig;
use crate::error::{GatewayError, GatewayResult};
use crate::observability::metrics;
use crate::resilience::{TimeoutClass, TimeoutPolicy};

const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");
const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

/// Inbound headers copied to the upstream call.
const FORWARDED: [HeaderName; 3] = [header::CONTENT_TYPE, header::ACCEPT, X_REQUEST_ID];

/// Select the headers the upstream may see, tagging the client key.
pub fn forwarded_headers(inbound: &HeaderMap, client_key: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for name in FORWARDED {
        if let Some(value) = inbound.get(&name) {
            headers.insert(name, value.clone());
        }
    }
    if let Ok(value) = HeaderValue::from_str(client_key) {
        headers.insert(X_FORWARDED_FOR, value);
    }
    headers
}

/// One call to the upstream engine.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub timeout: TimeoutClass,
}

impl OutboundRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: None,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            timeout: TimeoutClass::Standard,
        }
    }

    pub fn with_query(mut self, query: Option<String>) -> Self {
        self.query = query.filter(|q| !q.is_empty());
        self
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_body(mut self, body: Bytes) -> Self {
        self.body = body;
        self
    }

    /// Serialize `value` as the body and mark it JSON.
    pub fn set_json(&mut self, value: &Value) {
        self.body = Bytes::from(value.to_string());
        self.headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
    }

    pub fn with_timeout(mut self, class: TimeoutClass) -> Self {
        self.timeout = class;
        self
    }

    fn sends_body(&self) -> bool {
        matches!(self.method, Method::POST | Method::PUT | Method::PATCH)
    }
}

/// A successful upstream reply.
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamReply {
    pub status: StatusCode,
    pub payload: Payload,
}

/// Body of a successful reply.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Json(Value),
    Raw {
        content_type: Option<HeaderValue>,
        bytes: Bytes,
    },
    Empty,
}

impl UpstreamReply {
    pub fn new(status: StatusCode, content_type: Option<HeaderValue>, bytes: Bytes) -> Self {
        let payload = if bytes.is_empty() {
            Payload::Empty
        } else {
            let looks_json = content_type
                .as_ref()
                .and_then(|v| v.to_str().ok())
                .map_or(true, |ct| ct.contains("json"));
            match looks_json.then(|| serde_json::from_slice::<Value>(&bytes)) {
                Some(Ok(value)) => Payload::Json(value),
                _ => Payload::Raw {
                    content_type,
                    bytes,
                },
            }
        };
        Self { status, payload }
    }

    pub fn json(status: StatusCode, value: Value) -> Self {
        Self {
            status,
            payload: Payload::Json(value),
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match &self.payload {
            Payload::Json(value) => Some(value),
            _ => None,
        }
    }
}

impl IntoResponse for UpstreamReply {
    fn into_response(self) -> Response {
        let (content_type, body) = match self.payload {
            Payload::Json(value) => (
                Some(HeaderValue::from_static("application/json")),
                Body::from(value.to_string()),
            ),
            Payload::Raw {
                content_type,
                bytes,
            } => (content_type, Body::from(bytes)),
            Payload::Empty => (None, Body::empty()),
        };

        let mut response = Response::new(body);
        *response.status_mut() = self.status;
        if let Some(content_type) = content_type {
            response
                .headers_mut()
                .insert(header::CONTENT_TYPE, content_type);
        }
        response
    }
}

/// Client for the game engine's REST surface.
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    http: reqwest::Client,
    base_url: String,
    policy: TimeoutPolicy,
}

impl UpstreamClient {
    pub fn new(config: &UpstreamConfig) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            policy: TimeoutPolicy::from_config(config),
        })
    }

    pub fn policy(&self) -> &TimeoutPolicy {
        &self.policy
    }

    pub fn url(&self, path: &str, query: Option<&str>) -> String {
        match query {
            Some(query) => format!("{}{}?{}", self.base_url, path, query),
            None => format!("{}{}", self.base_url, path),
        }
    }

    /// Make the call. Every failure comes back as a `GatewayError`.
    pub async fn forward(&self, request: OutboundRequest) -> GatewayResult<UpstreamReply> {
        let url = self.url(&request.path, request.query.as_deref());
        let budget = self.policy.timeout(request.timeout);

        let mut headers = request.headers.clone();
        headers.remove(header::AUTHORIZATION);
        let body = if request.body.is_empty() && request.sends_body() {
            headers.insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/json"),
            );
            Bytes::from_static(b"{}")
        } else {
            request.body
        };

        tracing::debug!(
            method = %request.method,
            upstream = %url,
            timeout_class = request.timeout.as_str(),
            timeout_secs = budget.as_secs(),
            "Forwarding to upstream"
        );

        let response = self
            .http
            .request(request.method.clone(), &url)
            .headers(headers)
            .timeout(budget)
            .body(body)
            .send()
            .await
            .map_err(|e| transport_error(e, budget, &url))?;

        let status = response.status();
        let content_type = response.headers().get(header::CONTENT_TYPE).cloned();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| transport_error(e, budget, &url))?;

        if status.is_client_error() || status.is_server_error() {
            tracing::warn!(
                method = %request.method,
                upstream = %url,
                status = status.as_u16(),
                "Upstream rejected request"
            );
            return Err(GatewayError::from_upstream(status, &bytes));
        }

        Ok(UpstreamReply::new(status, content_type, bytes))
    }
}

/// How a call that never produced a complete reply failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TransportFailure {
    Unreachable,
    TimedOut,
}

impl TransportFailure {
    /// A connect timeout reports both flags; it is a connectivity failure.
    fn classify(is_connect: bool, is_timeout: bool) -> Self {
        if !is_connect && is_timeout {
            TransportFailure::TimedOut
        } else {
            TransportFailure::Unreachable
        }
    }
}

fn transport_error(err: reqwest::Error, budget: std::time::Duration, url: &str) -> GatewayError {
    match TransportFailure::classify(err.is_connect(), err.is_timeout()) {
        TransportFailure::TimedOut => {
            tracing::error!(upstream = %url, timeout_secs = budget.as_secs(), "Upstream timed out");
            metrics::record_upstream_failure("timeout");
            GatewayError::upstream_timeout(budget)
        }
        TransportFailure::Unreachable => {
            let cause = root_cause(&err);
            tracing::error!(upstream = %url, error = %cause, "Upstream unreachable");
            metrics::record_upstream_failure("unreachable");
            GatewayError::upstream_unreachable(cause)
        }
    }
}

/// Innermost error text ("Connection refused" rather than "error sending request").
fn root_cause(err: &(dyn StdError + 'static)) -> String {
    let mut current = err;
    while let Some(source) = current.source() {
        current = source;
    }
    current.to_string()
}
