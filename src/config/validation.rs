//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, limits representable)
//! - Check addresses and the upstream URL parse
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;
use thiserror::Error;
use url::Url;

use crate::config::schema::GatewayConfig;
use crate::security::rate_limit::MAX_CAPACITY;

/// Minimum HS256 secret length in bytes.
pub const MIN_JWT_SECRET_LEN: usize = 32;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Check a parsed configuration, collecting every problem found.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::new(
            "listener.max_connections",
            "must be greater than zero",
        ));
    }

    let upstream = &config.upstream;
    match Url::parse(&upstream.base_url) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {}
        Ok(url) => errors.push(ValidationError::new(
            "upstream.base_url",
            format!("unsupported scheme '{}'", url.scheme()),
        )),
        Err(e) => errors.push(ValidationError::new(
            "upstream.base_url",
            format!("invalid URL: {}", e),
        )),
    }
    for (field, secs) in [
        ("upstream.connect_timeout_secs", upstream.connect_timeout_secs),
        ("upstream.standard_timeout_secs", upstream.standard_timeout_secs),
        ("upstream.upload_timeout_secs", upstream.upload_timeout_secs),
    ] {
        if secs == 0 {
            errors.push(ValidationError::new(field, "must be greater than zero"));
        }
    }
    if upstream.upload_timeout_secs < upstream.standard_timeout_secs {
        errors.push(ValidationError::new(
            "upstream.upload_timeout_secs",
            "must not be shorter than the standard timeout",
        ));
    }
    if upstream.max_body_bytes == 0 || upstream.max_upload_bytes == 0 {
        errors.push(ValidationError::new(
            "upstream.max_body_bytes",
            "body limits must be greater than zero",
        ));
    }
    if upstream.max_concurrent_uploads == 0 {
        errors.push(ValidationError::new(
            "upstream.max_concurrent_uploads",
            "must be greater than zero",
        ));
    }

    let rate_limit = &config.rate_limit;
    if rate_limit.enabled {
        if rate_limit.requests_per_minute == 0 {
            errors.push(ValidationError::new(
                "rate_limit.requests_per_minute",
                "must be greater than zero",
            ));
        } else if rate_limit.requests_per_minute > MAX_CAPACITY {
            errors.push(ValidationError::new(
                "rate_limit.requests_per_minute",
                format!("must not exceed {}", MAX_CAPACITY),
            ));
        }
        if rate_limit.window_secs == 0 {
            errors.push(ValidationError::new(
                "rate_limit.window_secs",
                "must be greater than zero",
            ));
        }
        if rate_limit.sweep_interval_secs == 0 {
            errors.push(ValidationError::new(
                "rate_limit.sweep_interval_secs",
                "must be greater than zero",
            ));
        }
    }

    if config.auth.jwt_secret.len() < MIN_JWT_SECRET_LEN {
        errors.push(ValidationError::new(
            "auth.jwt_secret",
            format!("must be at least {} bytes", MIN_JWT_SECRET_LEN),
        ));
    }

    let obs = &config.observability;
    if obs.metrics_enabled && obs.metrics_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", obs.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
