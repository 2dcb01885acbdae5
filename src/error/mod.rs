//! Gateway error model.
//!
//! # Data Flow
//! ```text
//! Any stage failure (identity, enforcement, body read, upstream)
//!     → GatewayError (kind + status + message, built on the failure path only)
//!     → envelope.rs (uniform JSON envelope, severity-scaled logging)
//!     → Send to client
//! ```
//!
//! # Design Decisions
//! - One error type for every request-path failure; stages return `Result`
//! - Status is fixed by kind, except upstream rejections which keep the
//!   upstream status verbatim
//! - Internal detail is logged, never serialized

pub mod envelope;

use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::time::Duration;
use thiserror::Error;

/// Result alias for request-path operations.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Classification of a request-path failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed or semantically invalid client input.
    Validation,
    /// Missing, malformed or expired credentials.
    Authentication,
    /// Authenticated caller lacks permission.
    Authorization,
    /// No such route or resource.
    NotFound,
    /// Request conflicts with current state.
    Conflict,
    /// Request body exceeds the configured limit.
    PayloadTooLarge,
    /// Per-client request budget exhausted.
    RateLimited,
    /// Upstream explicitly rejected the request (4xx/5xx).
    Upstream,
    /// Upstream could not be reached (refused, reset, DNS).
    UpstreamUnreachable,
    /// Upstream did not answer within the timeout budget.
    UpstreamTimeout,
    /// A defect inside the gateway.
    Internal,
}

impl ErrorKind {
    /// HTTP status for this kind. Upstream errors override it with the real status.
    pub fn default_status(self) -> StatusCode {
        match self {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::Authentication => StatusCode::UNAUTHORIZED,
            ErrorKind::Authorization => StatusCode::FORBIDDEN,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ErrorKind::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ErrorKind::Upstream => StatusCode::BAD_GATEWAY,
            ErrorKind::UpstreamUnreachable | ErrorKind::UpstreamTimeout => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable label for logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Authentication => "authentication",
            ErrorKind::Authorization => "authorization",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::PayloadTooLarge => "payload_too_large",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::Upstream => "upstream",
            ErrorKind::UpstreamUnreachable => "upstream_unreachable",
            ErrorKind::UpstreamTimeout => "upstream_timeout",
            ErrorKind::Internal => "internal",
        }
    }
}

/// A failure on the request path, rendered as the uniform envelope.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct GatewayError {
    kind: ErrorKind,
    status: StatusCode,
    message: String,
    details: Option<Map<String, Value>>,
    /// Top-level fields merged into the envelope (upstream body, rate limit).
    extra: Map<String, Value>,
    /// Server-side only.
    internal: Option<String>,
    timestamp: DateTime<Utc>,
}

impl GatewayError {
    /// Create an error of the given kind with its default status.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            status: kind.default_status(),
            message: message.into(),
            details: None,
            extra: Map::new(),
            internal: None,
            timestamp: Utc::now(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Authentication, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Authorization, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, message)
    }

    pub fn payload_too_large(limit_bytes: usize) -> Self {
        Self::new(
            ErrorKind::PayloadTooLarge,
            format!("Request body exceeds the {} byte limit", limit_bytes),
        )
    }

    /// The 429 rejection; carries the configured limit as a top-level field.
    pub fn rate_limited(limit: u32) -> Self {
        let mut err = Self::new(ErrorKind::RateLimited, "Rate limit exceeded");
        err.extra.insert("limit".to_string(), Value::from(limit));
        err
    }

    /// Connectivity failure towards the upstream engine.
    pub fn upstream_unreachable(reason: impl std::fmt::Display) -> Self {
        Self::new(
            ErrorKind::UpstreamUnreachable,
            format!("Failed to connect to game server: {}", reason),
        )
    }

    /// Upstream exceeded its timeout budget.
    pub fn upstream_timeout(budget: Duration) -> Self {
        Self::new(
            ErrorKind::UpstreamTimeout,
            format!(
                "Game server did not respond within {} seconds",
                budget.as_secs()
            ),
        )
    }

    /// A gateway defect. `detail` is logged but the client only sees a generic message.
    pub fn internal(detail: impl std::fmt::Display) -> Self {
        let mut err = Self::new(ErrorKind::Internal, "Internal server error");
        err.internal = Some(detail.to_string());
        err
    }

    /// Attach a details object (e.g. per-field validation messages).
    pub fn with_details(mut self, details: Map<String, Value>) -> Self {
        self.details = Some(details);
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn details(&self) -> Option<&Map<String, Value>> {
        self.details.as_ref()
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}
