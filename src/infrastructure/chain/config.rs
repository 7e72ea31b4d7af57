//! Engine settings derived from the application configuration

use std::time::Duration;

use crate::config::AppConfig;
use crate::domain::chain::ControllerConfig;

use super::cache::ChainCacheConfig;
use super::invoker::HttpInvokerConfig;

/// Everything needed to assemble a chain controller and its collaborators
#[derive(Debug, Clone)]
pub struct ChainEngineConfig {
    pub controller: ControllerConfig,
    pub cache: ChainCacheConfig,
    pub invoker: HttpInvokerConfig,
    pub broadcast_capacity: usize,
    pub webhook_url: Option<String>,
    pub webhook_secret: Option<String>,
}

impl From<&AppConfig> for ChainEngineConfig {
    fn from(config: &AppConfig) -> Self {
        let engine = &config.engine;

        let mut invoker = HttpInvokerConfig::new(config.invoker.base_url.clone())
            .with_timeout(Duration::from_secs(config.invoker.timeout_secs));
        if let Some(key) = &config.invoker.api_key {
            invoker = invoker.with_api_key(key.clone());
        }

        Self {
            controller: ControllerConfig {
                default_max_retries: engine.default_max_retries,
                default_step_timeout: engine.default_step_timeout_ms.map(Duration::from_millis),
                max_transitions_per_run: engine.max_transitions_per_run,
            },
            cache: ChainCacheConfig {
                max_capacity: config.cache.max_capacity,
                ttl: Duration::from_secs(config.cache.ttl_secs),
            },
            invoker,
            broadcast_capacity: config.events.broadcast_capacity,
            webhook_url: config.events.webhook_url.clone().filter(|u| !u.trim().is_empty()),
            webhook_secret: config.events.webhook_secret.clone(),
        }
    }
}
