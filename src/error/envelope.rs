//! Error translation into the uniform failure envelope.
//!
//! ```text
//! {"success": false, "error": "...", "status": 404,
//!  "timestamp": "2026-01-09T03:30:00.000Z", "details": {...}}
//! ```

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use chrono::SecondsFormat;
use serde_json::{Map, Value};

use super::{ErrorKind, GatewayError};
use crate::observability::metrics;

impl GatewayError {
    /// Translate an upstream 4xx/5xx reply into a gateway error.
    ///
    /// A JSON object body is passed through with the real status and
    /// `success=false`; anything else is wrapped as raw text.
    pub fn from_upstream(status: StatusCode, body: &[u8]) -> Self {
        match serde_json::from_slice::<Value>(body) {
            Ok(Value::Object(fields)) => Self::from_upstream_object(status, fields),
            _ => {
                let text = String::from_utf8_lossy(body).trim().to_string();
                let message = if text.is_empty() {
                    status
                        .canonical_reason()
                        .unwrap_or("Upstream error")
                        .to_string()
                } else {
                    text
                };
                let mut err = Self::new(ErrorKind::Upstream, message);
                err.status = status;
                err
            }
        }
    }

    fn from_upstream_object(status: StatusCode, mut fields: Map<String, Value>) -> Self {
        let message = ["error", "detail", "message"]
            .iter()
            .find_map(|key| fields.get(*key).and_then(Value::as_str))
            .map(str::to_string)
            .unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("Upstream error")
                    .to_string()
            });

        // A structured `error` would be clobbered by the string message.
        let mut details = match fields.remove("details") {
            Some(Value::Object(map)) => Some(map),
            Some(other) => Some(Map::from_iter([("details".to_string(), other)])),
            None => None,
        };
        if let Some(structured) = fields.remove("error").filter(|v| !v.is_string()) {
            details
                .get_or_insert_with(Map::new)
                .insert("error".to_string(), structured);
        }

        let mut err = Self::new(ErrorKind::Upstream, message);
        err.status = status;
        err.extra = fields;
        err.details = details;
        err
    }

    /// Render the JSON envelope.
    pub fn to_envelope(&self) -> Value {
        let mut body = self.extra.clone();
        body.insert("success".to_string(), Value::Bool(false));
        body.insert("error".to_string(), Value::String(self.message.clone()));
        body.insert("status".to_string(), Value::from(self.status.as_u16()));
        body.insert(
            "timestamp".to_string(),
            Value::String(self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
        match &self.details {
            Some(details) => {
                body.insert("details".to_string(), Value::Object(details.clone()));
            }
            None => {
                body.remove("details");
            }
        }
        Value::Object(body)
    }

    /// Log at a severity matching the status class.
    fn log(&self) {
        if self.status.is_server_error() {
            tracing::error!(
                kind = self.kind.as_str(),
                status = self.status.as_u16(),
                internal = self.internal.as_deref().unwrap_or(""),
                "{}",
                self.message
            );
        } else {
            tracing::warn!(
                kind = self.kind.as_str(),
                status = self.status.as_u16(),
                "{}",
                self.message
            );
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        self.log();
        metrics::record_error(self.kind.as_str(), self.status.as_u16());

        let body = self.to_envelope().to_string();
        let mut response = Response::new(body.into());
        *response.status_mut() = self.status;
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        response
    }
}
