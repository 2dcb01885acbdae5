//! Timeout budgets per call class.
//!
//! # Responsibilities
//! - Map a route's timeout class to its deadline and body size limit
//!
//! # Design Decisions
//! - Two classes only: ordinary calls and multipart uploads
//! - Timeout errors are distinct from other errors
//! - Timed-out requests return 503 with a gateway-origin message

use std::time::Duration;

use crate::config::UpstreamConfig;

/// Which budget an upstream call runs under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeoutClass {
    #[default]
    Standard,
    /// Multipart uploads (vulnbox archives).
    Upload,
}

impl TimeoutClass {
    pub fn as_str(self) -> &'static str {
        match self {
            TimeoutClass::Standard => "standard",
            TimeoutClass::Upload => "upload",
        }
    }
}

/// Deadlines and body limits for each class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutPolicy {
    pub standard: Duration,
    pub upload: Duration,
    pub max_body_bytes: usize,
    pub max_upload_bytes: usize,
}

impl TimeoutPolicy {
    pub fn from_config(config: &UpstreamConfig) -> Self {
        Self {
            standard: Duration::from_secs(config.standard_timeout_secs),
            upload: Duration::from_secs(config.upload_timeout_secs),
            max_body_bytes: config.max_body_bytes,
            max_upload_bytes: config.max_upload_bytes,
        }
    }

    /// Total deadline for one upstream call.
    pub fn timeout(&self, class: TimeoutClass) -> Duration {
        match class {
            TimeoutClass::Standard => self.standard,
            TimeoutClass::Upload => self.upload,
        }
    }

    /// Largest accepted inbound body.
    pub fn body_limit(&self, class: TimeoutClass) -> usize {
        match class {
            TimeoutClass::Standard => self.max_body_bytes,
            TimeoutClass::Upload => self.max_upload_bytes,
        }
    }
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self::from_config(&UpstreamConfig::default())
    }
}
