//! HTTP server: WebSocket endpoint, health check and optional static files.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{extract::State, routing::get, Json, Router};
use locshare_core::{Relay, SharedRelay};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{info, instrument, warn};

use crate::broadcaster::Broadcaster;
use crate::handler::SessionProtocolHandler;
use crate::session_reaper::{SessionReaper, DEFAULT_IDLE_TIMEOUT, DEFAULT_SWEEP_INTERVAL};
use crate::ws_server;

/// Settings the gateway needs from the process configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub addr: SocketAddr,
    pub idle_timeout: Duration,
    pub sweep_interval: Duration,
    /// Directory served at `/` for the browser client, if any.
    pub static_dir: Option<PathBuf>,
}

impl GatewayConfig {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            static_dir: None,
        }
    }
}

/// Application state shared across routes.
#[derive(Clone)]
pub struct GatewayState {
    pub relay: SharedRelay,
    pub broadcaster: Broadcaster,
    pub handler: SessionProtocolHandler,
}

impl GatewayState {
    pub fn new() -> Self {
        let relay = Relay::shared();
        let broadcaster = Broadcaster::new();
        let handler = SessionProtocolHandler::new(relay.clone(), broadcaster.clone());
        Self {
            relay,
            broadcaster,
            handler,
        }
    }

    pub fn reaper(&self) -> SessionReaper {
        SessionReaper::new(self.relay.clone(), self.broadcaster.clone())
    }
}

impl Default for GatewayState {
    fn default() -> Self {
        Self::new()
    }
}

/// Build the router: `/ws`, `/api/health`, and the static client as fallback.
///
/// CORS is wide open so a client hosted elsewhere can reach the health route.
pub fn build_router(state: GatewayState, static_dir: Option<PathBuf>) -> Router {
    let mut app = Router::new()
        .route("/ws", get(ws_server::ws_handler))
        .route("/api/health", get(health))
        .with_state(state);

    if let Some(dir) = static_dir {
        if !dir.is_dir() {
            warn!(dir = %dir.display(), "static directory does not exist");
        }
        app = app.fallback_service(ServeDir::new(dir));
    }

    app.layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn health(State(state): State<GatewayState>) -> Json<Value> {
    let (sessions, bound) = {
        let relay = state.relay.lock().await;
        (relay.sessions.len(), relay.connections.len())
    };
    let connections = state.broadcaster.connection_count().await;
    Json(json!({
        "status": "ok",
        "sessions": sessions,
        "boundConnections": bound,
        "connections": connections,
    }))
}

/// Start the reaper and serve until Ctrl-C.
#[instrument(skip(state, config), fields(addr = %config.addr))]
pub async fn start_server(config: GatewayConfig, state: GatewayState) -> Result<()> {
    let reaper = state
        .reaper()
        .with_idle_timeout(config.idle_timeout)
        .with_sweep_interval(config.sweep_interval)
        .spawn();

    let app = build_router(state, config.static_dir.clone());

    let listener = TcpListener::bind(&config.addr)
        .await
        .with_context(|| format!("failed to bind {}", config.addr))?;
    info!("locshare relay listening on {}", config.addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    reaper.abort();
    info!("locshare relay stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
