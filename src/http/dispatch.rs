//! Request dispatch.
//!
//! # Responsibilities
//! - Resolve the caller, find the route, apply its access policy
//! - Read the body within the route's size limit, holding an upload slot
//!   while an upload body is buffered and forwarded
//! - Enforce team isolation for team-scoped callers
//! - Forward to the upstream engine and shape the reply
//!
//! # Design Decisions
//! - Stages run in a fixed order and the first failure short-circuits
//! - Every failure is a `GatewayError`; the handler itself never fails
//! - Admission control runs earlier, as middleware

use std::net::SocketAddr;
use std::time::Instant;

use axum::{
    body::{Body, Bytes},
    extract::{ConnectInfo, State},
    http::Request,
    response::{IntoResponse, Response},
};
use http_body_util::{BodyExt, LengthLimitError, Limited};
use serde_json::{Map, Value};

use crate::error::{GatewayError, GatewayResult};
use crate::http::server::AppState;
use crate::observability::metrics;
use crate::resilience::TimeoutClass;
use crate::routing::router::upstream_path;
use crate::routing::{RouteMatch, Target, TeamScope};
use crate::security::identity::Identity;
use crate::security::rate_limit::client_key;
use crate::security::team_scope::{self, QueryParams};
use crate::upstream::{forwarded_headers, OutboundRequest, UpstreamReply};

/// Fallback handler for every non-local path.
pub async fn dispatch(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();

    let mut route_label = "none";
    let response = match handle(&state, request, &mut route_label).await {
        Ok(reply) => reply.into_response(),
        Err(err) => err.into_response(),
    };

    let status = response.status().as_u16();
    tracing::debug!(
        request_id = %request_id,
        method = %method,
        path = %path,
        route = route_label,
        status,
        "Request completed"
    );
    metrics::record_request(method.as_str(), status, route_label, start);
    response
}

async fn handle(
    state: &AppState,
    request: Request<Body>,
    route_label: &mut &'static str,
) -> GatewayResult<UpstreamReply> {
    let identity = state.identity.resolve(request.headers())?;

    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let RouteMatch { route, params } = state
        .routes
        .match_route(&method, &path)
        .ok_or_else(|| GatewayError::not_found(format!("No route for {} {}", method, path)))?;
    *route_label = route.name;

    route.access.check(&identity).inspect_err(|_| {
        tracing::warn!(
            user = identity.display_name(),
            role = %identity.role,
            route = route.name,
            "Access denied"
        );
    })?;

    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let client = client_key(request.headers(), peer, state.trust_forwarded_for);
    let headers = forwarded_headers(request.headers(), &client);

    match route.target {
        Target::CurrentGame(action) => state.upstream.current_game(action, &headers).await,
        Target::Verbatim => {
            let _upload_slot = match route.timeout {
                TimeoutClass::Upload => Some(
                    state
                        .upload_slots
                        .acquire()
                        .await
                        .map_err(|_| GatewayError::internal("upload slots closed"))?,
                ),
                TimeoutClass::Standard => None,
            };

            let query = request.uri().query().map(str::to_string);
            let limit = state.upstream.policy().body_limit(route.timeout);
            let body = read_body(request.into_body(), limit).await?;

            let mut outbound = OutboundRequest::new(method, upstream_path(&path))
                .with_query(query)
                .with_headers(headers)
                .with_body(body)
                .with_timeout(route.timeout);

            match route.team_scope {
                TeamScope::None | TeamScope::ResponseOwner(_) => {}
                TeamScope::Body(field) => scope_body(&identity, &mut outbound, field)?,
                TeamScope::Query(field) => {
                    let mut query = QueryParams::parse(outbound.query.as_deref());
                    team_scope::enforce(&identity, &mut query, field)?;
                    outbound.query = query.to_query_string();
                }
                TeamScope::PathParam(name) => {
                    let requested = params.get(name).unwrap_or_default();
                    team_scope::enforce_value(&identity, requested)?;
                }
            }

            let reply = state.upstream.forward(outbound).await?;
            if let TeamScope::ResponseOwner(field) = route.team_scope {
                check_owner(&identity, &reply, field)?;
            }
            Ok(reply)
        }
    }
}

/// Collect the body, refusing anything over `limit` bytes.
async fn read_body(body: Body, limit: usize) -> GatewayResult<Bytes> {
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.is::<LengthLimitError>() => Err(GatewayError::payload_too_large(limit)),
        Err(e) => Err(GatewayError::validation(format!(
            "Failed to read request body: {}",
            e
        ))),
    }
}

/// Rewrite the JSON body's team field for team-scoped callers.
fn scope_body(identity: &Identity, outbound: &mut OutboundRequest, field: &str) -> GatewayResult<()> {
    if identity.is_privileged() {
        return Ok(());
    }

    let mut object = if outbound.body.is_empty() {
        Map::new()
    } else {
        match serde_json::from_slice::<Value>(&outbound.body) {
            Ok(Value::Object(object)) => object,
            _ => return Err(GatewayError::validation("Request body must be a JSON object")),
        }
    };

    team_scope::enforce(identity, &mut object, field)?;
    tracing::info!(
        user = identity.display_name(),
        team = identity.team_id().unwrap_or_default(),
        "Team scope applied to request body"
    );

    outbound.set_json(&Value::Object(object));
    Ok(())
}

fn check_owner(identity: &Identity, reply: &UpstreamReply, field: &str) -> GatewayResult<()> {
    if identity.is_privileged() {
        return Ok(());
    }
    match reply.as_json() {
        Some(Value::Object(document)) => team_scope::enforce_owner(identity, document, field),
        _ => Err(GatewayError::forbidden("Cannot access resources of other teams")),
    }
}
