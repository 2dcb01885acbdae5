//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the health endpoint and the dispatcher
//! - Wire up middleware (request ID, tracing, panic capture, rate limiting,
//!   concurrency limit)
//! - Bind server to a plain or TLS listener
//! - Run the rate limit sweeper alongside the server
//! - Drain in-flight requests on shutdown

use std::any::Any;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::Request,
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, Semaphore};
use tower::limit::GlobalConcurrencyLimitLayer;
use tower::ServiceBuilder;
use tower_http::{
    catch_panic::CatchPanicLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::config::{GatewayConfig, TlsConfig};
use crate::error::GatewayError;
use crate::http::dispatch::dispatch;
use crate::net::tls::load_tls_config;
use crate::routing::RouteTable;
use crate::security::identity::{IdentityResolver, JwtIdentityResolver};
use crate::security::rate_limit::{rate_limit_middleware, RateLimiter};
use crate::upstream::UpstreamClient;

/// How long TLS connections may take to drain after shutdown.
const TLS_DRAIN_GRACE: Duration = Duration::from_secs(30);

/// Errors that stop the server from starting or running.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to build upstream client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub identity: Arc<dyn IdentityResolver>,
    pub routes: Arc<RouteTable>,
    pub upstream: UpstreamClient,
    pub trust_forwarded_for: bool,
    /// Bounds how many upload bodies are buffered at once.
    pub upload_slots: Arc<Semaphore>,
}

/// HTTP server for the gateway.
pub struct GatewayServer {
    router: Router,
    limiter: Option<Arc<RateLimiter>>,
    sweep_interval: Duration,
}

impl GatewayServer {
    /// Create a server verifying bearer tokens with the configured secret.
    pub fn new(config: &GatewayConfig) -> Result<Self, ServerError> {
        let identity = Arc::new(JwtIdentityResolver::new(&config.auth.jwt_secret));
        Self::with_identity(config, identity)
    }

    /// Create a server with a custom identity resolver.
    pub fn with_identity(
        config: &GatewayConfig,
        identity: Arc<dyn IdentityResolver>,
    ) -> Result<Self, ServerError> {
        let routes = RouteTable::default_routes();
        tracing::info!(
            routes = routes.route_count(),
            upstream = %config.upstream.base_url,
            max_concurrent_uploads = config.upstream.max_concurrent_uploads,
            "Route table compiled"
        );

        let state = AppState {
            identity,
            routes: Arc::new(routes),
            upstream: UpstreamClient::new(&config.upstream)?,
            trust_forwarded_for: config.rate_limit.trust_forwarded_for,
            upload_slots: Arc::new(Semaphore::new(config.upstream.max_concurrent_uploads)),
        };

        let limiter = config
            .rate_limit
            .enabled
            .then(|| Arc::new(RateLimiter::new(&config.rate_limit)));
        if let Some(limiter) = &limiter {
            tracing::info!(
                capacity = limiter.capacity(),
                window_secs = config.rate_limit.window_secs,
                "Rate limiting enabled"
            );
        }

        let router = Self::build_router(config, state, limiter.clone());
        Ok(Self {
            router,
            limiter,
            sweep_interval: config.rate_limit.sweep_interval(),
        })
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(
        config: &GatewayConfig,
        state: AppState,
        limiter: Option<Arc<RateLimiter>>,
    ) -> Router {
        let mut router = Router::new()
            .route("/actuator/health", get(health))
            .fallback(dispatch)
            .with_state(state)
            // Inside the rate limiter so a 500 still carries X-RateLimit-*.
            .layer(CatchPanicLayer::custom(handle_panic));

        if let Some(limiter) = limiter {
            router = router.layer(middleware::from_fn_with_state(
                limiter,
                rate_limit_middleware,
            ));
        }

        router.layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                        let request_id = request
                            .headers()
                            .get("x-request-id")
                            .and_then(|v| v.to_str().ok())
                            .unwrap_or("-");
                        tracing::info_span!(
                            "request",
                            method = %request.method(),
                            path = %request.uri().path(),
                            request_id = %request_id,
                        )
                    }),
                )
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(GlobalConcurrencyLimitLayer::new(
                    config.listener.max_connections,
                )),
        )
    }

    /// The assembled router, for embedding or tests.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn rate_limiter(&self) -> Option<&Arc<RateLimiter>> {
        self.limiter.as_ref()
    }

    fn spawn_sweeper(&self, shutdown: &broadcast::Receiver<()>) {
        if let Some(limiter) = &self.limiter {
            tokio::spawn(
                Arc::clone(limiter).run_sweeper(self.sweep_interval, shutdown.resubscribe()),
            );
        }
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ServerError> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        self.spawn_sweeper(&shutdown);

        let app = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("HTTP server draining connections");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Run the server behind TLS.
    pub async fn run_tls(
        self,
        addr: SocketAddr,
        tls: &TlsConfig,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ServerError> {
        let rustls = load_tls_config(tls).await?;
        tracing::info!(address = %addr, "HTTPS server starting");

        self.spawn_sweeper(&shutdown);

        let handle = axum_server::Handle::new();
        let drain = handle.clone();
        tokio::spawn(async move {
            let _ = shutdown.recv().await;
            tracing::info!("HTTPS server draining connections");
            drain.graceful_shutdown(Some(TLS_DRAIN_GRACE));
        });

        axum_server::bind_rustls(addr, rustls)
            .handle(handle)
            .serve(
                self.router
                    .into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await?;

        tracing::info!("HTTPS server stopped");
        Ok(())
    }
}

/// Liveness probe; never rate limited, never authenticated.
async fn health() -> impl IntoResponse {
    Json(json!({ "status": "UP" }))
}

/// Render a caught panic as the 500 envelope.
fn handle_panic(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };
    GatewayError::internal(format!("handler panicked: {}", detail)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use tower::ServiceExt;

    fn config() -> GatewayConfig {
        let mut config = GatewayConfig::default();
        config.auth.jwt_secret = "s".repeat(32);
        config.upstream.base_url = "http://127.0.0.1:9".to_string();
        config.rate_limit.requests_per_minute = 1;
        config
    }

    #[tokio::test]
    async fn health_is_up_and_exempt() {
        let server = GatewayServer::new(&config()).unwrap();
        for _ in 0..3 {
            let response = server
                .router()
                .oneshot(Request::get("/actuator/health").body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert!(response.headers().get("x-ratelimit-limit").is_none());
            assert!(response.headers().get("x-request-id").is_some());
        }
    }

    #[tokio::test]
    async fn unknown_route_is_enveloped_404() {
        let server = GatewayServer::new(&config()).unwrap();
        let response = server
            .router()
            .oneshot(Request::get("/api/proxy/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.headers()["x-ratelimit-limit"], "1");

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let envelope: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(envelope["success"], json!(false));
        assert_eq!(envelope["status"], json!(404));
    }

    #[tokio::test]
    async fn caller_request_id_is_echoed() {
        let server = GatewayServer::new(&config()).unwrap();
        let response = server
            .router()
            .oneshot(
                Request::get("/actuator/health")
                    .header("x-request-id", "abc-123")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.headers()["x-request-id"], "abc-123");
    }

    struct ExplodingResolver;

    impl IdentityResolver for ExplodingResolver {
        fn resolve(&self, _headers: &axum::http::HeaderMap) -> crate::error::GatewayResult<crate::security::Identity> {
            panic!("resolver exploded");
        }
    }

    #[tokio::test]
    async fn panic_response_keeps_rate_limit_headers() {
        let server = GatewayServer::with_identity(&config(), Arc::new(ExplodingResolver)).unwrap();
        let response = server
            .router()
            .oneshot(Request::get("/api/proxy/scoreboard").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.headers()["x-ratelimit-limit"], "1");
        assert_eq!(response.headers()["x-ratelimit-remaining"], "0");
        assert!(response.headers().contains_key("x-ratelimit-reset"));
        assert!(response.headers().contains_key("x-request-id"));

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let envelope: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(envelope["status"], json!(500));
        assert_eq!(envelope["error"], json!("Internal server error"));
    }

    #[test]
    fn panic_becomes_internal_envelope() {
        let response = handle_panic(Box::new("boom"));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn disabled_limiter_is_not_built() {
        let mut config = config();
        config.rate_limit.enabled = false;
        let server = GatewayServer::new(&config).unwrap();
        assert!(server.rate_limiter().is_none());
    }
}
