//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address, TLS).
    pub listener: ListenerConfig,

    /// Upstream game engine settings.
    pub upstream: UpstreamConfig,

    /// Rate limiting configuration.
    pub rate_limit: RateLimitConfig,

    /// Credential verification settings.
    pub auth: AuthConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Optional TLS configuration.
    pub tls: Option<TlsConfig>,

    /// Maximum in-flight requests (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            tls: None,
            max_connections: 10_000,
        }
    }
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to certificate file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,
}

/// Upstream game engine configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Base URL of the engine's REST surface (e.g., "http://localhost:8000").
    pub base_url: String,

    /// TCP connect timeout in seconds.
    pub connect_timeout_secs: u64,

    /// Budget for ordinary calls in seconds.
    pub standard_timeout_secs: u64,

    /// Budget for multipart uploads in seconds.
    pub upload_timeout_secs: u64,

    /// Largest accepted request body on standard routes.
    pub max_body_bytes: usize,

    /// Largest accepted request body on upload routes.
    pub max_upload_bytes: usize,

    /// Upload requests buffered concurrently; further uploads wait for a slot.
    pub max_concurrent_uploads: usize,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            connect_timeout_secs: 30,
            standard_timeout_secs: 30,
            upload_timeout_secs: 300,
            max_body_bytes: 2 * 1024 * 1024,
            max_upload_bytes: 512 * 1024 * 1024,
            max_concurrent_uploads: 4,
        }
    }
}

impl UpstreamConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Requests admitted per client per window.
    pub requests_per_minute: u32,

    /// Window length in seconds.
    pub window_secs: u64,

    /// How often idle buckets are swept, in seconds.
    pub sweep_interval_secs: u64,

    /// Buckets whose window started longer ago than this are swept.
    pub idle_threshold_secs: u64,

    /// Path prefixes that bypass admission entirely.
    pub exempt_prefixes: Vec<String>,

    /// Key clients by the first `X-Forwarded-For` entry.
    pub trust_forwarded_for: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            requests_per_minute: 60,
            window_secs: 60,
            sweep_interval_secs: 300,
            idle_threshold_secs: 300,
            exempt_prefixes: vec![
                "/swagger-ui".to_string(),
                "/v3/api-docs".to_string(),
                "/actuator".to_string(),
            ],
            trust_forwarded_for: true,
        }
    }
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn idle_threshold(&self) -> Duration {
        Duration::from_secs(self.idle_threshold_secs)
    }
}

/// Credential verification configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AuthConfig {
    /// HS256 secret shared with the credential issuer.
    pub jwt_secret: String,
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log line format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config: GatewayConfig = toml::from_str("").unwrap();
        assert_eq!(config.rate_limit.requests_per_minute, 60);
        assert_eq!(config.rate_limit.window(), Duration::from_secs(60));
        assert_eq!(config.upstream.standard_timeout_secs, 30);
        assert_eq!(config.upstream.upload_timeout_secs, 300);
        assert_eq!(config.upstream.max_concurrent_uploads, 4);
        assert_eq!(config.observability.log_format, LogFormat::Pretty);
        assert!(config.rate_limit.trust_forwarded_for);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config: GatewayConfig = toml::from_str(
            r#"
            [upstream]
            base_url = "http://engine:9000/"

            [rate_limit]
            requests_per_minute = 2

            [observability]
            log_format = "json"
            "#,
        )
        .unwrap();
        assert_eq!(config.upstream.base_url, "http://engine:9000/");
        assert_eq!(config.upstream.connect_timeout(), Duration::from_secs(30));
        assert_eq!(config.rate_limit.requests_per_minute, 2);
        assert_eq!(config.rate_limit.exempt_prefixes.len(), 3);
        assert_eq!(config.observability.log_format, LogFormat::Json);
    }
}
