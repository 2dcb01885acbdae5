//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → plain: tokio TcpListener served by axum
//!     → tls.rs (optional rustls handshake via axum-server)
//!     → Hand off to HTTP layer
//! ```
//!
//! # Design Decisions
//! - TLS is optional and handled transparently
//! - In-flight requests are bounded at the HTTP layer, not per socket

pub mod tls;
