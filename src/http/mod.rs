//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (Axum setup, request ID, tracing, panic capture)
//!     → rate limit middleware (admission, X-RateLimit-* headers)
//!     → dispatch.rs (identity → route → access → body → team scope → upstream)
//!     → GatewayError / UpstreamReply rendered as the response
//!     → Send to client
//! ```

pub mod dispatch;
pub mod server;

pub use server::{AppState, GatewayServer, ServerError};
