//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (method, path)
//!     → router.rs (route lookup over the static table)
//!     → matcher.rs (segment-wise template match, parameter capture)
//!     → Return: matched Route + PathParams, or NoMatch (404)
//!
//! Route Compilation (at startup):
//!     RouteTable::default_routes()
//!     → Compile path templates
//!     → Sort by specificity (literal segments first)
//!     → Freeze as immutable RouteTable
//! ```
//!
//! # Design Decisions
//! - Routes compiled at startup, immutable at runtime
//! - No regex in hot path
//! - Deterministic: same input always matches same route
//! - First match wins (ordered by specificity)

pub mod matcher;
pub mod router;

pub use matcher::{PathParams, PathPattern};
pub use router::{Access, GameAction, Route, RouteMatch, RouteTable, Target, TeamScope};
