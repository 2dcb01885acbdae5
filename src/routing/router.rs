//! Route table and lookup.
//!
//! # Responsibilities
//! - Store the gateway's routes (method, path template, access policy,
//!   team scope, timeout class, upstream target)
//! - Look up the matching route for a request
//! - Return matched route or explicit no-match
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - Routes are sorted by specificity once; first match wins
//! - O(n) scan (acceptable for the table size)

use axum::http::Method;

use crate::error::{GatewayError, GatewayResult};
use crate::resilience::TimeoutClass;
use crate::routing::matcher::{PathParams, PathPattern};
use crate::security::identity::{Identity, Role};

/// Prefix under which upstream paths are exposed verbatim.
pub const PROXY_PREFIX: &str = "/api/proxy";

const STAFF: &[Role] = &[Role::Admin, Role::Teacher];
const ADMIN: &[Role] = &[Role::Admin];
const STAFF_AND_TEAM: &[Role] = &[Role::Admin, Role::Teacher, Role::Team];
const PARTICIPANTS: &[Role] = &[Role::Admin, Role::Teacher, Role::Team, Role::Student];

/// Who may call a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Public,
    Roles(&'static [Role]),
}

impl Access {
    /// PUBLIC callers on a protected route get 401, wrong roles get 403.
    pub fn check(&self, identity: &Identity) -> GatewayResult<()> {
        match self {
            Access::Public => Ok(()),
            Access::Roles(_) if identity.is_public() => {
                Err(GatewayError::unauthenticated("Authentication required"))
            }
            Access::Roles(roles) if roles.contains(&identity.role) => Ok(()),
            Access::Roles(_) => Err(GatewayError::forbidden(
                "Insufficient permissions for this resource",
            )),
        }
    }
}

/// Where the caller's team is enforced for team-scoped callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeamScope {
    None,
    /// JSON body field, overwritten with the caller's team.
    Body(&'static str),
    /// Query parameter, overwritten with the caller's team.
    Query(&'static str),
    /// Path parameter, must equal the caller's team.
    PathParam(&'static str),
    /// Field of the upstream response, must equal the caller's team.
    ResponseOwner(&'static str),
}

/// Operations on the most recently created game.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameAction {
    Start,
    Stop,
    Status,
    Scoreboard,
}

/// What a matched route forwards to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// Same method, path (minus `/api/proxy`), query and body.
    Verbatim,
    CurrentGame(GameAction),
}

/// A single gateway route.
#[derive(Debug, Clone)]
pub struct Route {
    pub name: &'static str,
    pub method: Method,
    pub pattern: PathPattern,
    pub access: Access,
    pub team_scope: TeamScope,
    pub timeout: TimeoutClass,
    pub target: Target,
}

impl Route {
    fn new(method: Method, template: &'static str, access: Access) -> Self {
        Self {
            name: template,
            method,
            pattern: PathPattern::parse(template),
            access,
            team_scope: TeamScope::None,
            timeout: TimeoutClass::Standard,
            target: Target::Verbatim,
        }
    }

    fn scoped(mut self, scope: TeamScope) -> Self {
        self.team_scope = scope;
        self
    }

    fn upload(mut self) -> Self {
        self.timeout = TimeoutClass::Upload;
        self
    }

    fn current_game(mut self, action: GameAction) -> Self {
        self.target = Target::CurrentGame(action);
        self
    }
}

/// A successful lookup.
#[derive(Debug)]
pub struct RouteMatch<'a> {
    pub route: &'a Route,
    pub params: PathParams,
}

/// The immutable route table.
#[derive(Debug, Clone)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    pub fn new(mut routes: Vec<Route>) -> Self {
        routes.sort_by(|a, b| a.pattern.specificity_cmp(&b.pattern));
        Self { routes }
    }

    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    /// Find the route for `method` + `path`. Unknown path or method is `None`.
    pub fn match_route(&self, method: &Method, path: &str) -> Option<RouteMatch<'_>> {
        self.routes
            .iter()
            .filter(|route| route.method == *method)
            .find_map(|route| {
                route
                    .pattern
                    .matches(path)
                    .map(|params| RouteMatch { route, params })
            })
    }

    /// The gateway's full surface over the game engine.
    pub fn default_routes() -> Self {
        use Access::{Public, Roles};
        use Method as M;

        let p = |method: Method, template: &'static str, access: Access| {
            Route::new(method, template, access)
        };

        let routes = vec![
            // checkers
            p(M::GET, "/api/proxy/checkers", Roles(STAFF)),
            p(M::GET, "/api/proxy/checkers/{checker_id}", Roles(STAFF)),
            p(M::PATCH, "/api/proxy/checkers/{checker_id}", Roles(ADMIN)),
            p(M::DELETE, "/api/proxy/checkers/{checker_id}", Roles(ADMIN)),
            p(M::POST, "/api/proxy/checkers/{checker_id}/validate", Roles(ADMIN)),
            p(M::GET, "/api/proxy/checker/statuses", Roles(STAFF)),
            p(M::GET, "/api/proxy/checker/statuses/{status_id}", Roles(STAFF)),
            p(M::DELETE, "/api/proxy/checker/statuses/{status_id}", Roles(ADMIN)),
            // flags
            p(M::GET, "/api/proxy/flags", Roles(STAFF)),
            p(M::GET, "/api/proxy/flags/stats", Roles(STAFF)),
            p(M::GET, "/api/proxy/flags/{flag_id}", Roles(STAFF)),
            p(M::GET, "/api/proxy/flags/by-value/{flag_value}", Roles(STAFF)),
            p(M::GET, "/api/proxy/flags/tick/{tick_id}", Roles(STAFF)),
            p(M::GET, "/api/proxy/flags/team/{team_id}/tick/{tick_id}", Roles(STAFF)),
            // games
            p(M::POST, "/api/proxy/games", Roles(ADMIN)),
            p(M::GET, "/api/proxy/games", Roles(STAFF)),
            p(M::GET, "/api/proxy/games/{game_id}", Roles(STAFF)),
            p(M::PATCH, "/api/proxy/games/{game_id}", Roles(ADMIN)),
            p(M::DELETE, "/api/proxy/games/{game_id}", Roles(ADMIN)),
            p(M::POST, "/api/proxy/games/{game_id}/start", Roles(ADMIN)),
            p(M::POST, "/api/proxy/games/{game_id}/pause", Roles(ADMIN)),
            p(M::POST, "/api/proxy/games/{game_id}/stop", Roles(ADMIN)),
            p(M::POST, "/api/proxy/games/{game_id}/teams", Roles(ADMIN)),
            p(M::POST, "/api/proxy/games/{game_id}/assign-vulnbox", Roles(ADMIN)),
            p(M::POST, "/api/proxy/games/{game_id}/assign-checker", Roles(ADMIN)),
            p(M::GET, "/api/proxy/games/{game_id}/teams", Roles(STAFF)),
            p(M::GET, "/api/proxy/games/{game_id}/teams/{team_id}", Roles(STAFF_AND_TEAM))
                .scoped(TeamScope::PathParam("team_id")),
            p(M::DELETE, "/api/proxy/games/{game_id}/teams/{team_id}", Roles(ADMIN)),
            // scoreboard
            p(M::GET, "/api/proxy/scoreboard", Public),
            p(M::GET, "/api/proxy/scoreboard/{game_id}", Public),
            p(M::GET, "/api/proxy/scoreboard/{game_id}/team/{team_id}", Public),
            // submissions
            p(M::POST, "/api/proxy/submissions", Roles(PARTICIPANTS))
                .scoped(TeamScope::Body("team_id")),
            p(M::GET, "/api/proxy/submissions", Roles(PARTICIPANTS))
                .scoped(TeamScope::Query("team_id")),
            p(M::GET, "/api/proxy/submissions/{submission_id}", Roles(PARTICIPANTS))
                .scoped(TeamScope::ResponseOwner("team_id")),
            p(M::DELETE, "/api/proxy/submissions/{submission_id}", Roles(ADMIN)),
            // ticks
            p(M::GET, "/api/proxy/ticks", Roles(STAFF)),
            p(M::GET, "/api/proxy/ticks/current", Public),
            p(M::GET, "/api/proxy/ticks/latest", Public),
            p(M::GET, "/api/proxy/ticks/{tick_id}", Roles(STAFF)),
            p(M::GET, "/api/proxy/ticks/number/{tick_number}", Roles(STAFF)),
            // vulnboxes
            p(M::POST, "/api/proxy/vulnboxes", Roles(ADMIN)).upload(),
            p(M::GET, "/api/proxy/vulnboxes", Roles(STAFF)),
            p(M::GET, "/api/proxy/vulnboxes/{vulnbox_id}", Roles(STAFF)),
            p(M::PATCH, "/api/proxy/vulnboxes/{vulnbox_id}", Roles(ADMIN)),
            p(M::DELETE, "/api/proxy/vulnboxes/{vulnbox_id}", Roles(ADMIN)),
            // current game
            p(M::POST, "/api/game/start", Roles(STAFF)).current_game(GameAction::Start),
            p(M::POST, "/api/game/stop", Roles(STAFF)).current_game(GameAction::Stop),
            p(M::GET, "/api/game/status", Roles(STAFF)).current_game(GameAction::Status),
            p(M::GET, "/api/scoreboard", Public).current_game(GameAction::Scoreboard),
        ];

        Self::new(routes)
    }
}

/// Upstream path for a verbatim route: the request path without `/api/proxy`.
pub fn upstream_path(path: &str) -> &str {
    match path.strip_prefix(PROXY_PREFIX) {
        Some("") => "/",
        Some(rest) => rest,
        None => path,
    }
}
