//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → rate_limit.rs (per-client admission, X-RateLimit-* headers)
//!     → identity.rs (bearer token → Identity)
//!     → routing access policy (role check)
//!     → team_scope.rs (team isolation on body/query/path/response)
//!     → Pass to upstream
//! ```
//!
//! # Design Decisions
//! - Fail closed: reject on any security check failure
//! - No trust in client input; team fields are overwritten, not trusted
//! - Every rejection is a `GatewayError`, rendered as the uniform envelope

pub mod identity;
pub mod rate_limit;
pub mod team_scope;

pub use identity::{Identity, IdentityResolver, JwtIdentityResolver, Role};
pub use rate_limit::{Admission, RateLimiter};
