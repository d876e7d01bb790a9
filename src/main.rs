mod app;
mod config;
mod delivery;
mod domain;
mod repository;
mod telemetry;
mod usecase;

use std::sync::Arc;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing_subscriber::EnvFilter;

use crate::app::{router, AppState};
use crate::config::{AppConfig, StorageBackend};
use crate::repository::memory::InMemoryStore;
use crate::repository::postgres::{create_pool, PostgresStore};
use crate::usecase::contracts::{DocumentStore, TokenVerifier};
use crate::usecase::error::hide_internal_details;
use crate::usecase::jwt::JwtService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    // Initialize tracing subscriber with optional OpenTelemetry layer
    let tracer_provider = if config.telemetry_enabled {
        let telemetry_config = telemetry::TelemetryConfig::from(&config);
        let provider = telemetry::init_telemetry_with_subscriber(&telemetry_config, env_filter)
            .map_err(|e| anyhow::anyhow!("failed to initialize telemetry: {e}"))?;
        Some(provider)
    } else {
        telemetry::init_subscriber_without_telemetry(env_filter);
        None
    };

    tracing::info!("starting the tours service");

    hide_internal_details(config.is_production());

    let metrics_handle = PrometheusBuilder::new().install_recorder()?;
    metrics_process::Collector::default().describe();
    tracing::info!("prometheus metrics initialized");

    tracing::info!(
        telemetry_enabled = config.telemetry_enabled,
        storage_backend = ?config.storage_backend,
        environment = ?config.environment,
        "config loaded"
    );

    let token_verifier: Arc<dyn TokenVerifier> = Arc::new(JwtService::new(config.jwt_secret.clone()));

    match config.storage_backend {
        StorageBackend::Postgres => {
            let pool = create_pool(&config.database_url, config.database_max_connections).await?;
            tracing::info!("database pool created");

            sqlx::migrate!().run(&pool).await?;
            tracing::info!("database migrations applied");

            serve(&config, PostgresStore::new(pool), token_verifier, metrics_handle).await?;
        }
        StorageBackend::Memory => {
            tracing::warn!("using the in-memory store, data will not survive a restart");
            serve(&config, InMemoryStore::new(), token_verifier, metrics_handle).await?;
        }
    }

    if let Some(provider) = tracer_provider {
        telemetry::shutdown_telemetry(provider);
    }

    Ok(())
}

async fn serve<S: DocumentStore>(
    config: &AppConfig,
    store: S,
    token_verifier: Arc<dyn TokenVerifier>,
    metrics_handle: PrometheusHandle,
) -> anyhow::Result<()> {
    let shared_state = Arc::new(AppState::new(store, token_verifier, Some(metrics_handle)));
    let router = router(shared_state);

    let listener = tokio::net::TcpListener::bind(&config.http_addr).await?;
    tracing::info!(addr = %config.http_addr, "tours service running");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("tours service stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
}
