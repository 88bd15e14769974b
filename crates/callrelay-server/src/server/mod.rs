use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use callrelay_signaling::{ConnectionRegistry, SignalingRelay};
use serde::Serialize;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{debug, info, Level};

use crate::config::ServerConfig;
use crate::shutdown::GracefulShutdown;

mod routes;

/// Server application state
pub struct AppState {
    /// Relay shared by every signaling connection
    pub relay: SignalingRelay,
    pub config: ServerConfig,
    pub shutdown: GracefulShutdown,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let shutdown = GracefulShutdown::new(config.drain_timeout);
        Self {
            relay: SignalingRelay::new(registry),
            config,
            shutdown,
        }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        self.relay.registry()
    }
}

/// Start the server and run until a shutdown signal arrives.
pub async fn start(config: ServerConfig) -> Result<()> {
    let listener = TcpListener::bind(config.bind_addr).await?;
    let state = Arc::new(AppState::new(config));

    let signal_shutdown = state.shutdown.clone();
    tokio::spawn(async move { signal_shutdown.wait_for_signal().await });

    serve(listener, state).await
}

/// Serve on an already-bound listener until the stop token is cancelled,
/// then drain open signaling connections.
pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> Result<()> {
    let stop_token = state.shutdown.stop_token();

    let sweeper = state.config.stale_sweep_interval.map(|interval| {
        spawn_stale_sweeper(Arc::clone(state.registry()), interval, stop_token.clone())
    });

    let app = create_router(Arc::clone(&state));

    let addr = listener.local_addr()?;
    info!("Starting Axum HTTP server on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            stop_token.cancelled().await;
            info!("HTTP server received shutdown signal, draining connections");
        })
        .await?;

    state.shutdown.drain().await;

    if let Some(sweeper) = sweeper {
        let _ = sweeper.await;
    }

    info!(
        remaining_registrations = state.registry().connection_count(),
        "Server stopped"
    );

    Ok(())
}

/// Periodically remove registrations whose connection died without
/// running its close hook.
fn spawn_stale_sweeper(
    registry: Arc<ConnectionRegistry>,
    interval: Duration,
    stop_token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = stop_token.cancelled() => {
                    debug!("Stale registration sweeper stopped");
                    return;
                }
                _ = ticker.tick() => {
                    registry.cleanup_stale();
                }
            }
        }
    })
}

/// Create the Axum router with all routes and middleware
fn create_router(state: Arc<AppState>) -> Router {
    let websocket_router = routes::websocket::router(Arc::clone(&state));

    Router::new()
        .route("/health", get(health_handler))
        .route("/api/v1/health", get(detailed_health_handler))
        .with_state(state)
        .merge(websocket_router)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(CorsLayer::permissive())
}

/// Response for detailed health check
#[derive(Debug, Serialize)]
struct DetailedHealthResponse {
    status: String,
    service: String,
    version: String,
    registered_connections: usize,
    active_connections: usize,
}

/// Simple health check endpoint (for load balancers)
async fn health_handler() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "callrelay-server",
            "version": env!("CARGO_PKG_VERSION"),
        })),
    )
}

/// Detailed health check endpoint (for monitoring)
async fn detailed_health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let stopping = state.shutdown.stop_token().is_cancelled();
    let status_code = if stopping {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    (
        status_code,
        Json(DetailedHealthResponse {
            status: if stopping { "stopping" } else { "healthy" }.to_string(),
            service: "callrelay-server".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            registered_connections: state.registry().connection_count(),
            active_connections: state.shutdown.active_connections(),
        }),
    )
}
