//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Request to upstream:
//!     → timeouts.rs (pick the budget for the route's timeout class)
//!     → upstream client (enforces connect + total deadline)
//!     → On expiry: UpstreamTimeout, distinct from UpstreamUnreachable
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every upstream call has a deadline
//! - No implicit retries: a failed call is reported, never replayed

pub mod timeouts;

pub use timeouts::{TimeoutClass, TimeoutPolicy};
