//! Configuration loading from disk and the environment.

use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::config::schema::GatewayConfig;
use crate::config::validation::{validate_config, ValidationError};

pub const ENV_UPSTREAM_URL: &str = "GATEWAY_UPSTREAM_URL";
pub const ENV_REQUESTS_PER_MINUTE: &str = "GATEWAY_REQUESTS_PER_MINUTE";
pub const ENV_JWT_SECRET: &str = "GATEWAY_JWT_SECRET";
pub const ENV_BIND_ADDRESS: &str = "GATEWAY_BIND_ADDRESS";

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {name}: {value:?}")]
    Env { name: &'static str, value: String },

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration.
///
/// `path = None` means "use defaults"; an explicit path must exist.
/// Environment overrides are applied before validation.
pub fn load_config(path: Option<&Path>) -> Result<GatewayConfig, ConfigError> {
    let mut config = match path {
        Some(path) => {
            let content = fs::read_to_string(path)?;
            toml::from_str(&content)?
        }
        None => GatewayConfig::default(),
    };

    apply_env_overrides(&mut config, |name| std::env::var(name).ok())?;
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Overlay `GATEWAY_*` variables; `lookup` abstracts the environment for tests.
pub fn apply_env_overrides<F>(config: &mut GatewayConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(url) = lookup(ENV_UPSTREAM_URL) {
        config.upstream.base_url = url;
    }
    if let Some(raw) = lookup(ENV_REQUESTS_PER_MINUTE) {
        config.rate_limit.requests_per_minute =
            raw.trim().parse().map_err(|_| ConfigError::Env {
                name: ENV_REQUESTS_PER_MINUTE,
                value: raw.clone(),
            })?;
    }
    if let Some(secret) = lookup(ENV_JWT_SECRET) {
        config.auth.jwt_secret = secret;
    }
    if let Some(addr) = lookup(ENV_BIND_ADDRESS) {
        config.listener.bind_address = addr;
    }
    Ok(())
}
