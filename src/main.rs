use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::anyhow;
use clap::Parser;
use tracing::{info, warn};

use voice_turn_gateway::config::{ConfigStore, GatewayConfig};
use voice_turn_gateway::routes::build_router;
use voice_turn_gateway::state::AppState;

/// Voice-turn gateway: bridges smart-glasses audio turns to an agent
/// runtime over a framed WebSocket protocol.
#[derive(Parser, Debug)]
#[command(name = "voice-turn-gateway")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Load environment variables from this file instead of the default
    /// `.env` lookup.
    #[arg(long)]
    env_file: Option<PathBuf>,
}

const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match &cli.env_file {
        Some(path) => {
            dotenvy::from_path(path)
                .map_err(|e| anyhow!("failed to load env file '{}': {e}", path.display()))?;
        }
        None => {
            let _ = dotenvy::dotenv();
        }
    }
    tracing_subscriber::fmt::init();

    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("failed to install default crypto provider"))?;

    let config = GatewayConfig::from_env().map_err(|e| anyhow!(e.to_string()))?;
    let address = config.address();
    let store = ConfigStore::new(config);

    let state = AppState::new(store).await.map_err(|e| anyhow!(e.to_string()))?;
    let app = build_router(state.clone());

    let socket_addr: SocketAddr = address
        .parse()
        .map_err(|e| anyhow!("invalid server address '{address}': {e}"))?;
    let listener = tokio::net::TcpListener::bind(&socket_addr).await?;
    info!("voice-turn gateway listening on http://{socket_addr}");

    let (shutdown_tx, mut shutdown_rx) = tokio::sync::watch::channel(false);
    let graceful = async move {
        let _ = shutdown_rx.changed().await;
    };

    let server = tokio::spawn(
        axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
            .with_graceful_shutdown(graceful),
    );

    wait_for_termination().await;
    info!("shutdown signal received, disconnecting agent-runtime client");
    // Stop accepting new requests and fail pending agent sends immediately;
    // the timeout below only bounds how long already-in-flight turns get
    // to finish writing their responses.
    state.shutdown().await;
    let _ = shutdown_tx.send(true);

    if tokio::time::timeout(SHUTDOWN_GRACE, server).await.is_err() {
        warn!("in-flight turns did not finish within the shutdown grace period, exiting");
    }

    Ok(())
}

async fn wait_for_termination() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
