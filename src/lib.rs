//! Edge gateway for the attack/defense game engine.

pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod resilience;
pub mod routing;
pub mod security;
pub mod upstream;

pub use config::GatewayConfig;
pub use error::{GatewayError, GatewayResult};
pub use http::GatewayServer;
pub use lifecycle::Shutdown;
