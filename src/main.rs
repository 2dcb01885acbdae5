//! atkdef-gateway
//!
//! Edge gateway in front of the attack/defense game engine.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ request id / trace / panic capture
//!                         │
//!                         ▼
//!                     rate limit ──(429)──▶ envelope
//!                         │
//!                         ▼
//!                     identity ──(401)──▶ envelope
//!                         │
//!                         ▼
//!                     route + access ──(404/401/403)──▶ envelope
//!                         │
//!                         ▼
//!                     team scope ──(403)──▶ envelope
//!                         │
//!                         ▼
//!                     upstream client ──(4xx/5xx passthrough, 503)──▶ envelope
//!                         │
//!     Client Response     ▼
//!     ◀────────────── upstream reply
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use tokio::net::TcpListener;

use atkdef_gateway::config::{load_config, GatewayConfig};
use atkdef_gateway::http::GatewayServer;
use atkdef_gateway::lifecycle::{signals, Shutdown};
use atkdef_gateway::observability::{logging, metrics};

const DEFAULT_CONFIG: &str = "gateway.toml";

#[derive(Parser)]
#[command(name = "atkdef-gateway")]
#[command(about = "Edge gateway for the attack/defense game engine", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, env = "GATEWAY_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // An explicit path must exist; the default file is optional.
    let path = cli.config.or_else(|| {
        let default = PathBuf::from(DEFAULT_CONFIG);
        default.exists().then_some(default)
    });

    let config = match load_config(path.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("atkdef-gateway: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = logging::init_logging(&config.observability) {
        eprintln!("atkdef-gateway: failed to initialize logging: {}", e);
        return ExitCode::FAILURE;
    }

    match run(config, path.as_deref()).await {
        Ok(()) => {
            tracing::info!("Shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "Gateway failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(
    config: GatewayConfig,
    path: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!(
        config = %path.map_or_else(|| "<defaults>".to_string(), |p| p.display().to_string()),
        bind_address = %config.listener.bind_address,
        upstream = %config.upstream.base_url,
        requests_per_minute = config.rate_limit.requests_per_minute,
        rate_limit_enabled = config.rate_limit.enabled,
        "atkdef-gateway v{} starting",
        env!("CARGO_PKG_VERSION")
    );

    if config.observability.metrics_enabled {
        let addr: SocketAddr = config.observability.metrics_address.parse()?;
        metrics::init_metrics(addr);
    }

    let server = GatewayServer::new(&config)?;
    let shutdown = Shutdown::new();
    let receiver = shutdown.subscribe();

    let serve = async {
        match &config.listener.tls {
            Some(tls) => {
                let addr: SocketAddr = config.listener.bind_address.parse()?;
                server.run_tls(addr, tls, receiver).await?;
            }
            None => {
                let listener = TcpListener::bind(&config.listener.bind_address).await?;
                server.run(listener, receiver).await?;
            }
        }
        Ok::<(), Box<dyn std::error::Error>>(())
    };

    tokio::pin!(serve);

    tokio::select! {
        result = &mut serve => return result,
        _ = signals::shutdown_on_signal(&shutdown) => {}
    }

    // Server keeps draining in-flight requests after the trigger.
    serve.await
}
