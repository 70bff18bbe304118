//! Health Check Server - Liveness and Readiness Probes
//!
//! Exposes /live and /ready endpoints via axum 0.7. Readiness flips on
//! once storage and bus listeners are up, and off again at shutdown.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use tokio::sync::broadcast;
use tracing::{info, instrument};

/// Shared health state polled by readiness probes.
#[derive(Debug, Clone, Default)]
pub struct HealthState {
    /// Whether the object store answered at startup.
    pub storage_ready: Arc<AtomicBool>,
    /// Whether every bus listener is subscribed.
    pub listeners_ready: Arc<AtomicBool>,
}

impl HealthState {
    /// Create a new health state (not ready until startup completes).
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_storage_ready(&self, ready: bool) {
        self.storage_ready.store(ready, Ordering::Relaxed);
    }

    pub fn set_listeners_ready(&self, ready: bool) {
        self.listeners_ready.store(ready, Ordering::Relaxed);
    }

    /// Check if the service is ready to serve traffic.
    pub fn is_ready(&self) -> bool {
        self.storage_ready.load(Ordering::Relaxed) && self.listeners_ready.load(Ordering::Relaxed)
    }
}

/// Axum-based health check HTTP server.
pub struct HealthServer {
    /// Health state shared with all components.
    state: Arc<HealthState>,
    /// Bind port.
    port: u16,
}

impl HealthServer {
    /// Create a new health server.
    pub fn new(state: Arc<HealthState>, port: u16) -> Self {
        Self { state, port }
    }

    fn router(state: Arc<HealthState>) -> Router {
        Router::new()
            .route("/live", get(Self::liveness))
            .route("/ready", get(Self::readiness))
            .with_state(state)
    }

    /// Start the health check server in the background.
    #[instrument(skip(self, shutdown_rx))]
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) -> anyhow::Result<()> {
        let app = Self::router(Arc::clone(&self.state));

        let addr = format!("0.0.0.0:{}", self.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;

        info!(address = %addr, "Health server started");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            })
            .await?;

        Ok(())
    }

    /// Liveness probe: always returns 200 if the process is running.
    async fn liveness() -> impl IntoResponse {
        (StatusCode::OK, "OK")
    }

    /// Readiness probe: 200 only once storage and listeners are up.
    async fn readiness(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
        if state.is_ready() {
            (StatusCode::OK, "READY")
        } else {
            (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
        }
    }
}
