//! Shared utilities for integration and load testing.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use atkdef_gateway::config::GatewayConfig;
use atkdef_gateway::http::GatewayServer;
use atkdef_gateway::lifecycle::Shutdown;
use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Router,
};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use tokio::net::TcpListener;

pub const SECRET: &str = "integration-test-secret-0123456789";

/// A request as seen by the mock upstream.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl RecordedRequest {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap()
    }
}

type Handler = Arc<
    dyn Fn(RecordedRequest) -> std::pin::Pin<Box<dyn Future<Output = (u16, String)> + Send>>
        + Send
        + Sync,
>;

#[derive(Clone)]
struct MockState {
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    handler: Handler,
}

/// Handle to a running mock upstream.
pub struct MockUpstream {
    pub addr: SocketAddr,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockUpstream {
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn hits(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

async fn record(
    State(state): State<MockState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request = RecordedRequest {
        method,
        path: uri.path().to_string(),
        query: uri.query().map(str::to_string),
        headers,
        body,
    };
    state.requests.lock().unwrap().push(request.clone());

    let (status, body) = (state.handler)(request).await;
    (
        StatusCode::from_u16(status).unwrap(),
        [(header::CONTENT_TYPE, "application/json")],
        body,
    )
        .into_response()
}

/// Start a programmable mock upstream on an ephemeral port.
pub async fn start_programmable_upstream<F, Fut>(f: F) -> MockUpstream
where
    F: Fn(RecordedRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let requests = Arc::new(Mutex::new(Vec::new()));

    let handler: Handler = Arc::new(move |request| Box::pin(f(request)));
    let app = Router::new().fallback(record).with_state(MockState {
        requests: requests.clone(),
        handler,
    });

    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    MockUpstream { addr, requests }
}

/// Start a mock upstream that always answers `status` with `body`.
pub async fn start_mock_upstream(status: u16, body: Value) -> MockUpstream {
    let body = body.to_string();
    start_programmable_upstream(move |_| {
        let body = body.clone();
        async move { (status, body) }
    })
    .await
}

/// An address nothing listens on.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

/// Config pointing at `upstream_url` with a generous rate limit.
pub fn gateway_config(upstream_url: &str) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.upstream.base_url = upstream_url.to_string();
    config.auth.jwt_secret = SECRET.to_string();
    config.rate_limit.requests_per_minute = 1_000;
    config.observability.metrics_enabled = false;
    config
}

/// Handle to a running gateway.
pub struct TestGateway {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
}

impl TestGateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

pub async fn start_gateway(config: GatewayConfig) -> TestGateway {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = GatewayServer::new(&config).unwrap();
    let shutdown = Shutdown::new();
    let receiver = shutdown.subscribe();

    tokio::spawn(async move {
        let _ = server.run(listener, receiver).await;
    });

    TestGateway { addr, shutdown }
}

/// Mint a bearer token the way the credential issuer does.
pub fn token(role: &str, team_id: Option<&str>) -> String {
    let exp = chrono::Utc::now().timestamp() + 3600;
    let mut claims = json!({
        "sub": format!("{}-user", role.to_lowercase()),
        "userId": 1,
        "roles": [format!("ROLE_{}", role)],
        "exp": exp,
    });
    if let Some(team) = team_id {
        claims["teamId"] = json!(team);
    }
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap()
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

/// Read a response body as JSON.
pub async fn body_json(response: reqwest::Response) -> Value {
    response.json().await.unwrap()
}
