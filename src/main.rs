//! ANVIL server binary.
//!
//! Wires the store, sample bridge, dispatcher, background workers, and
//! the `/v1` HTTP surface together from environment configuration.

use anyhow::Context;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use anvil::api::{create_router, AppState};
use anvil::bridge::{CachedBridge, DirectBridge, HttpBridge, InMemorySampleSource, SampleBridge};
use anvil::config::{BridgeBackend, ServiceConfig};
use anvil::core::{SystemClock, TracingSink};
use anvil::dispatch::{Dispatcher, DispatcherConfig};
use anvil::store::MemoryStore;
use anvil::workers::{
    AgreementRecomputeWorker, RetentionWorker, RetentionWorkerConfig, TimeoutWorker,
    TimeoutWorkerConfig,
};

fn build_primary(config: &ServiceConfig, backend: BridgeBackend) -> Arc<dyn SampleBridge> {
    match backend {
        BridgeBackend::Http => Arc::new(
            HttpBridge::new(config.http_base_url.clone(), config.http_api_token.clone())
                .with_timeout(config.http_timeout),
        ),
        // `cached` resolves its primary separately; anything else falls
        // back to the in-process source.
        _ => Arc::new(DirectBridge::new(InMemorySampleSource::new())),
    }
}

fn build_bridge(
    config: &ServiceConfig,
    telemetry: Arc<dyn anvil::core::TelemetrySink>,
) -> Arc<dyn SampleBridge> {
    match config.bridge_backend {
        BridgeBackend::Cached => {
            let primary = build_primary(config, config.bridge_primary_backend);
            Arc::new(CachedBridge::new(primary, config.cache_ttl, telemetry))
        }
        backend => build_primary(config, backend),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ServiceConfig::from_env();
    tracing::info!(version = anvil::VERSION, "starting anvil");

    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(SystemClock);
    let telemetry = Arc::new(TracingSink);

    let bridge = build_bridge(&config, telemetry.clone());

    let dispatcher = Arc::new(Dispatcher::new(
        store.clone(),
        clock.clone(),
        telemetry.clone(),
        DispatcherConfig {
            permissive_submission: config.permissive_submission,
            ..DispatcherConfig::default()
        },
    ));

    // Background workers.
    let timeout_worker = Arc::new(TimeoutWorker::new(
        store.clone(),
        clock.clone(),
        telemetry.clone(),
        TimeoutWorkerConfig {
            interval: config.timeout_worker_interval,
            requeue_delay: chrono::Duration::seconds(config.requeue_delay_secs),
        },
    ));
    let timeout_handle = timeout_worker.spawn();

    let recompute_worker = Arc::new(AgreementRecomputeWorker::new(
        store.clone(),
        clock.clone(),
        telemetry.clone(),
        Default::default(),
    ));
    let recompute_handle = recompute_worker.spawn(std::time::Duration::from_secs(24 * 3600));

    let retention_worker = Arc::new(RetentionWorker::new(
        store.clone(),
        clock.clone(),
        RetentionWorkerConfig {
            audit_cutoff_days: config.retention_days_default,
            ..RetentionWorkerConfig::default()
        },
    ));
    let retention_handle = retention_worker.spawn(std::time::Duration::from_secs(24 * 3600));

    if config.api_enabled {
        let state = Arc::new(AppState {
            store,
            dispatcher,
            bridge,
            clock,
        });
        let router = create_router(state);

        let listener = tokio::net::TcpListener::bind(&config.bind_addr)
            .await
            .with_context(|| format!("binding {}", config.bind_addr))?;
        tracing::info!(addr = %config.bind_addr, "api listening");

        axum::serve(listener, router)
            .with_graceful_shutdown(async {
                let _ = tokio::signal::ctrl_c().await;
                tracing::info!("shutdown signal received");
            })
            .await
            .context("api server failed")?;
    } else {
        tracing::info!("api disabled, running workers only");
        let _ = tokio::signal::ctrl_c().await;
    }

    timeout_handle.abort();
    recompute_handle.abort();
    retention_handle.abort();
    tracing::info!("anvil stopped");
    Ok(())
}
