//! PMP Chain Engine
//!
//! Runs tenant-scoped workflow chains: ordered steps with conditions, post-step actions
//! (continue, skip, stop, retry, rollback, branch), pause/resume/cancel and compensation.
//! - `domain`: chain model, execution controller and collaborator traits
//! - `infrastructure`: storage backends, HTTP step invoker, event sinks, observability
//! - `api`: axum HTTP surface

pub mod api;
pub mod cli;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::AppConfig;

use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use api::state::AppState;
use config::StorageSettings;
use domain::chain::{ChainController, ChainExecution, EventSink};
use infrastructure::chain::{
    BroadcastEventSink, ChainEngineConfig, CompositeEventSink, HttpStepInvoker, LoggingEventSink,
    MetricsEventSink, MokaChainCache, StorageChainStore, StoredChain, WebhookEventSink,
};
use infrastructure::services::ChainService;
use infrastructure::storage::{PostgresConfig, StorageBackend, StorageConfig, StorageType};

const CHAINS_TABLE: &str = "chain_definitions";
const EXECUTIONS_TABLE: &str = "chain_executions";

/// Create the application state with default configuration
pub async fn create_app_state() -> anyhow::Result<AppState> {
    create_app_state_with_config(&AppConfig::default()).await
}

/// Create the application state with custom configuration
pub async fn create_app_state_with_config(config: &AppConfig) -> anyhow::Result<AppState> {
    let engine = ChainEngineConfig::from(config);

    let storage_config = storage_config(&config.storage)?;
    info!(backend = ?storage_config.storage_type(), "Storage backend selected");

    let backend = StorageBackend::connect(&storage_config)
        .await
        .context("Failed to connect storage backend")?;
    let chains = backend.storage::<StoredChain>(CHAINS_TABLE).await?;
    let executions = backend.storage::<ChainExecution>(EXECUTIONS_TABLE).await?;
    let store = Arc::new(StorageChainStore::new(chains, executions));

    let cache = Arc::new(MokaChainCache::new(&engine.cache));
    let invoker =
        Arc::new(HttpStepInvoker::new(&engine.invoker).context("Invalid workflow runner settings")?);
    info!(base_url = %engine.invoker.base_url, "Workflow runner configured");

    let broadcast = BroadcastEventSink::new(engine.broadcast_capacity);
    let mut sinks = CompositeEventSink::new()
        .with_sink(Arc::new(LoggingEventSink))
        .with_sink(Arc::new(MetricsEventSink))
        .with_sink(Arc::new(broadcast.clone()));

    if let Some(url) = &engine.webhook_url {
        info!(url = %url, signed = engine.webhook_secret.is_some(), "Chain event webhook enabled");
        sinks = sinks.with_sink(Arc::new(WebhookEventSink::new(
            url.clone(),
            engine.webhook_secret.clone(),
        )?));
    }
    let events: Arc<dyn EventSink> = Arc::new(sinks);

    let controller = Arc::new(ChainController::new(
        store,
        cache,
        invoker,
        events,
        engine.controller.clone(),
    ));

    let chain_service = Arc::new(ChainService::new(controller));

    Ok(AppState::new(chain_service, broadcast.sender()))
}

/// Resolve the storage section; `DATABASE_URL` fills in a missing Postgres URL
fn storage_config(settings: &StorageSettings) -> anyhow::Result<StorageConfig> {
    match settings.backend.parse::<StorageType>()? {
        StorageType::InMemory => Ok(StorageConfig::InMemory),
        StorageType::Postgres => {
            let url = settings
                .database_url
                .clone()
                .or_else(|| std::env::var("DATABASE_URL").ok())
                .context("storage.database_url or DATABASE_URL is required for postgres")?;

            Ok(StorageConfig::Postgres(
                PostgresConfig::new(url).with_max_connections(settings.max_connections),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_config_memory() {
        let config = storage_config(&StorageSettings::default()).unwrap();
        assert_eq!(config.storage_type(), StorageType::InMemory);
    }

    #[test]
    fn test_storage_config_postgres_with_url() {
        let settings = StorageSettings {
            backend: "postgres".to_string(),
            database_url: Some("postgres://db/chains".to_string()),
            max_connections: 4,
        };

        match storage_config(&settings).unwrap() {
            StorageConfig::Postgres(pg) => {
                assert_eq!(pg.url, "postgres://db/chains");
                assert_eq!(pg.max_connections, 4);
            }
            other => panic!("expected postgres config, got {:?}", other),
        }
    }

    #[test]
    fn test_storage_config_unknown_backend() {
        let settings = StorageSettings {
            backend: "redis".to_string(),
            ..StorageSettings::default()
        };
        assert!(storage_config(&settings).is_err());
    }

    #[tokio::test]
    async fn test_create_app_state_in_memory() {
        let state = create_app_state().await.unwrap();

        assert!(state.chain_service.list("acme").await.unwrap().is_empty());
        assert_eq!(state.events.receiver_count(), 0);
    }
}
