//! Prometheus Metrics Registry - Pipeline Observability
//!
//! Registers and exposes Prometheus metrics for the collector, the
//! retention engine and bus traffic. Served on `/metrics` by axum.

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use tokio::sync::broadcast;
use tracing::{info, instrument};

/// Centralized Prometheus metrics for the pipeline.
///
/// All metrics follow the naming convention `sotah_*`.
pub struct MetricsRegistry {
    /// Prometheus registry.
    registry: Registry,
    /// Manifests deleted by retention cleanup.
    pub expired_manifests_removed: IntCounter,
    /// History shards deleted by retention cleanup.
    pub pricelist_histories_removed: IntCounter,
    /// Realms whose compute succeeded in the latest cycle.
    pub included_realms: IntGauge,
    /// Realms that yielded a new snapshot.
    pub collected_realms: IntCounter,
    /// Realms whose acquisition failed.
    pub acquire_failures: IntCounterVec,
    /// Bus requests by subject and reply code.
    pub bus_requests: IntCounterVec,
    /// Wall time of one collector cycle.
    pub cycle_seconds: Histogram,
}

impl MetricsRegistry {
    /// Create and register all Prometheus metrics.
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let expired_manifests_removed = IntCounter::new(
            "sotah_total_expired_manifests_removed",
            "Expired auction manifests removed by retention cleanup",
        )?;

        let pricelist_histories_removed = IntCounter::new(
            "sotah_total_pricelist_histories_removed",
            "Expired price-history shards removed by retention cleanup",
        )?;

        let included_realms = IntGauge::new(
            "sotah_included_realms",
            "Realms successfully computed in the latest collector cycle",
        )?;

        let collected_realms = IntCounter::new(
            "sotah_collected_realms_total",
            "Realms that yielded a new snapshot",
        )?;

        let acquire_failures = IntCounterVec::new(
            Opts::new(
                "sotah_acquire_failures_total",
                "Realm acquisitions that failed",
            ),
            &["region"],
        )?;

        let bus_requests = IntCounterVec::new(
            Opts::new("sotah_bus_requests_total", "Bus requests by reply code"),
            &["subject", "code"],
        )?;

        let cycle_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "sotah_collector_cycle_seconds",
                "Duration of one collector cycle in seconds",
            )
            .buckets(vec![1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0]),
        )?;

        // Register all metrics
        registry.register(Box::new(expired_manifests_removed.clone()))?;
        registry.register(Box::new(pricelist_histories_removed.clone()))?;
        registry.register(Box::new(included_realms.clone()))?;
        registry.register(Box::new(collected_realms.clone()))?;
        registry.register(Box::new(acquire_failures.clone()))?;
        registry.register(Box::new(bus_requests.clone()))?;
        registry.register(Box::new(cycle_seconds.clone()))?;

        Ok(Self {
            registry,
            expired_manifests_removed,
            pricelist_histories_removed,
            included_realms,
            collected_realms,
            acquire_failures,
            bus_requests,
            cycle_seconds,
        })
    }

    /// Count one bus request outcome.
    pub fn record_bus_request(&self, subject: &str, code: &str) {
        self.bus_requests.with_label_values(&[subject, code]).inc();
    }

    /// Render every metric in the text exposition format.
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        if encoder.encode(&self.registry.gather(), &mut buffer).is_err() {
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }

    /// Serve Prometheus metrics on the configured bind address.
    #[instrument(skip(self, shutdown_rx))]
    pub async fn serve(
        self: Arc<Self>,
        bind_address: String,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> anyhow::Result<()> {
        let metrics_self = Arc::clone(&self);

        let app = Router::new().route(
            "/metrics",
            get(move || {
                let metrics = Arc::clone(&metrics_self);
                async move { metrics.render() }
            }),
        );

        let listener = tokio::net::TcpListener::bind(&bind_address).await?;
        info!(address = %bind_address, "Prometheus metrics server started");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            })
            .await?;

        Ok(())
    }
}
