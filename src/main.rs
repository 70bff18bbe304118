//! Sotah Pipeline — Entry Point
//!
//! Loads configuration, wires the object store, bus, upstream client and
//! the pipeline service, then runs the collector and cleanup timers until
//! SIGINT.
//!
//! Wiring sequence:
//! 1. Load config.json + validate
//! 2. Init tracing (JSON structured logging, RUST_LOG or config log_level)
//! 3. Open the object store (optionally behind the on-node cache)
//! 4. Create the bus and metrics registry
//! 5. Build service state from boot data
//! 6. Resolve upstream credentials (env, then boot bucket)
//! 7. Create the upstream client
//! 8. Load realms and the item catalog
//! 9. Bind every bus listener
//! 10. Spawn the collector and cleanup timers
//! 11. Spawn metrics and health servers
//! 12. Wait for SIGINT → stop timers → stop listeners → exit

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use sotah_pipeline::adapters::api::{ApiClient, BlizzardUpstream, ClientCredentials, ClientCredentialsAuth};
use sotah_pipeline::adapters::bus::memory::InMemoryBus;
use sotah_pipeline::adapters::metrics::health::{HealthServer, HealthState};
use sotah_pipeline::adapters::metrics::prometheus::MetricsRegistry;
use sotah_pipeline::adapters::storage::boot::BootStore;
use sotah_pipeline::adapters::storage::cached::CachedObjectStore;
use sotah_pipeline::adapters::storage::local::LocalObjectStore;
use sotah_pipeline::adapters::storage::ALL_BUCKETS;
use sotah_pipeline::config::{self, AppConfig, BootstrapEnv};
use sotah_pipeline::ports::{MessageBus, ObjectStore, UpstreamApi};
use sotah_pipeline::usecases::messenger::Messenger;
use sotah_pipeline::usecases::service::{load_realms, stop_listeners, PipelineService};
use sotah_pipeline::usecases::state::ServiceState;

const CONFIG_PATH: &str = "config.json";

#[tokio::main]
async fn main() -> Result<()> {
    // ── 1. Load configuration from config.json ──────────────
    let path = std::env::args().nth(1).unwrap_or_else(|| CONFIG_PATH.to_string());
    let config = config::loader::load_config(&path).context("Failed to load configuration")?;

    // ── 2. Initialize structured JSON logging ───────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .json()
        .init();

    let env = BootstrapEnv::from_env();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        game_version = %config.game_version,
        regions = config.regions.len(),
        env = ?env,
        "Starting sotah pipeline"
    );

    // ── 3. Object store ─────────────────────────────────────
    let store = open_store(&config).await?;
    for bucket in ALL_BUCKETS {
        store
            .ensure_bucket(bucket)
            .await
            .with_context(|| format!("Failed to create bucket {bucket}"))?;
    }
    let health = Arc::new(HealthState::new());
    health.set_storage_ready(true);

    // ── 4. Bus and metrics ──────────────────────────────────
    let bus: Arc<dyn MessageBus> = Arc::new(InMemoryBus::new());
    let metrics = Arc::new(MetricsRegistry::new().context("Failed to register metrics")?);
    let messenger = Messenger::new(Arc::clone(&bus), Arc::clone(&metrics));

    // ── 5. Service state from boot data ─────────────────────
    let boot = BootStore::new(Arc::clone(&store));
    let regions = if config.use_gcloud {
        Some(boot.regions().await.context("Failed to read regions from boot bucket")?)
    } else {
        None
    };
    let state = Arc::new(ServiceState::new(config.boot_data(regions), config.game_version.clone()));

    // ── 6. Upstream credentials ─────────────────────────────
    let credentials = resolve_credentials(&env, &boot, config.use_gcloud).await;
    if credentials.is_none() && config.api_key.is_none() {
        warn!("No upstream credentials; requests are sent unauthenticated");
    }

    // ── 7. Upstream client ──────────────────────────────────
    let client = Arc::new(ApiClient::new(config.api.client_config()).context("Failed to create API client")?);
    let auth = credentials.map(|c| {
        Arc::new(ClientCredentialsAuth::new(
            client.http().clone(),
            config.api.oauth_url.clone(),
            c,
        ))
    });
    let upstream: Arc<dyn UpstreamApi> = Arc::new(
        BlizzardUpstream::new(Arc::clone(&client), auth, config.api.endpoints()).with_api_key(config.api_key.clone()),
    );

    let service = PipelineService::new(
        Arc::clone(&store),
        Arc::clone(&upstream),
        messenger,
        Arc::clone(&state),
        config.retention_days,
    );

    // ── 8. Realms and item catalog ──────────────────────────
    let realms = load_realms(upstream.as_ref(), &state).await;
    let items = service
        .item_sync()
        .load_catalog()
        .await
        .context("Failed to load item catalog")?;
    info!(realms, items, "Boot data loaded");

    // ── 9. Bus listeners ────────────────────────────────────
    let listeners = service.start().await.context("Failed to bind listeners")?;
    health.set_listeners_ready(true);
    info!(listeners = listeners.len(), "All listeners bound");

    // ── 10. Collector and cleanup timers ────────────────────
    let timers = service.spawn_timers(config.collect_interval(), config.cleanup_interval());

    // ── 11. Metrics and health servers ──────────────────────
    let (shutdown_tx, _shutdown_rx) = broadcast::channel::<()>(1);

    let metrics_handle = if config.metrics.enabled {
        let rx = shutdown_tx.subscribe();
        let bind = config.metrics.bind_address.clone();
        let registry = Arc::clone(&metrics);
        Some(tokio::spawn(async move {
            if let Err(e) = registry.serve(bind, rx).await {
                error!(error = %e, "Metrics server failed");
            }
        }))
    } else {
        None
    };

    let health_rx = shutdown_tx.subscribe();
    let health_server = HealthServer::new(Arc::clone(&health), config.metrics.health_port);
    let health_handle = tokio::spawn(async move {
        if let Err(e) = health_server.run(health_rx).await {
            error!(error = %e, "Health server failed");
        }
    });

    info!("Pipeline is running");

    // ── 12. Wait for SIGINT ─────────────────────────────────
    if let Err(e) = signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for SIGINT");
    }
    info!("SIGINT received, initiating graceful shutdown");

    // 1. Readiness probe → 503
    health.set_listeners_ready(false);
    let _ = shutdown_tx.send(());

    // 2. Stop timers; each waits for its in-flight tick
    for timer in timers {
        timer.stop().await;
    }

    // 3. Stop listeners; in-flight handlers drain
    stop_listeners(bus.as_ref(), listeners).await;

    // 4. Wait for servers (up to 5s)
    let _ = tokio::time::timeout(std::time::Duration::from_secs(5), health_handle).await;
    if let Some(handle) = metrics_handle {
        let _ = tokio::time::timeout(std::time::Duration::from_secs(5), handle).await;
    }

    info!("Shutdown complete");
    Ok(())
}

/// Local canonical store, optionally served through the on-node cache.
async fn open_store(config: &AppConfig) -> Result<Arc<dyn ObjectStore>> {
    let canonical: Arc<dyn ObjectStore> = Arc::new(
        LocalObjectStore::open(&config.storage_dir)
            .await
            .with_context(|| format!("Failed to open storage dir {}", config.storage_dir))?,
    );
    if !config.use_cache_dir {
        return Ok(canonical);
    }

    let cache: Arc<dyn ObjectStore> = Arc::new(
        LocalObjectStore::open(&config.cache_dir)
            .await
            .with_context(|| format!("Failed to open cache dir {}", config.cache_dir))?,
    );
    info!(cache_dir = %config.cache_dir, "Serving reads through on-node cache");
    Ok(Arc::new(CachedObjectStore::new(canonical, cache)))
}

/// Credentials from the environment, falling back to the boot bucket.
async fn resolve_credentials(env: &BootstrapEnv, boot: &BootStore, use_gcloud: bool) -> Option<ClientCredentials> {
    if let (Some(client_id), Some(client_secret)) = (&env.client_id, &env.client_secret) {
        return Some(ClientCredentials {
            client_id: client_id.clone(),
            client_secret: client_secret.clone(),
        });
    }
    if !use_gcloud {
        return None;
    }
    match boot.credentials().await {
        Ok(credentials) => Some(credentials),
        Err(e) => {
            warn!(error = %e, "Failed to read credentials from boot bucket");
            None
        }
    }
}
