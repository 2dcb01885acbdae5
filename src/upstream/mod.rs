//! Upstream game engine access.
//!
//! # Data Flow
//! ```text
//! Dispatcher
//!     → client.rs (URL, headers, timeout class → reqwest call)
//!     → 2xx: UpstreamReply (status preserved, JSON or raw payload)
//!     → 4xx/5xx: GatewayError::from_upstream (status + body passed through)
//!     → transport failure: UpstreamUnreachable / UpstreamTimeout (503)
//!
//! Current-game routes
//!     → games.rs (GET /games?limit=100 → latest by created_at → action)
//! ```

pub mod client;
pub mod games;

pub use client::{forwarded_headers, OutboundRequest, Payload, UpstreamClient, UpstreamReply};
