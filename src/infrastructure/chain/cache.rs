//! Bounded chain/execution cache using moka

use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache as MokaCache;

use crate::domain::chain::{
    ChainCache, ChainDefinition, ChainExecution, ChainId, ChainKey, ExecutionId, TenantId,
};

/// Configuration for [`MokaChainCache`]
#[derive(Debug, Clone)]
pub struct ChainCacheConfig {
    /// Maximum entries per record kind
    pub max_capacity: u64,
    pub ttl: Duration,
}

impl Default for ChainCacheConfig {
    fn default() -> Self {
        Self {
            max_capacity: 10_000,
            ttl: Duration::from_secs(3600),
        }
    }
}

/// Process-local cache of definitions and executions
///
/// Entries expire after the configured TTL and are evicted when capacity is reached;
/// the chain store remains authoritative.
#[derive(Debug, Clone)]
pub struct MokaChainCache {
    chains: MokaCache<String, ChainDefinition>,
    executions: MokaCache<String, ChainExecution>,
}

impl MokaChainCache {
    pub fn new(config: &ChainCacheConfig) -> Self {
        Self {
            chains: MokaCache::builder()
                .max_capacity(config.max_capacity)
                .time_to_live(config.ttl)
                .build(),
            executions: MokaCache::builder()
                .max_capacity(config.max_capacity)
                .time_to_live(config.ttl)
                .build(),
        }
    }
}

impl Default for MokaChainCache {
    fn default() -> Self {
        Self::new(&ChainCacheConfig::default())
    }
}

#[async_trait]
impl ChainCache for MokaChainCache {
    async fn get_chain(&self, tenant_id: &TenantId, id: &ChainId) -> Option<ChainDefinition> {
        self.chains.get(&ChainKey::new(tenant_id, id).to_string()).await
    }

    async fn put_chain(&self, chain: &ChainDefinition) {
        self.chains
            .insert(chain.key().to_string(), chain.clone())
            .await;
    }

    async fn invalidate_chain(&self, tenant_id: &TenantId, id: &ChainId) {
        self.chains
            .invalidate(&ChainKey::new(tenant_id, id).to_string())
            .await;
    }

    async fn get_execution(&self, id: &ExecutionId) -> Option<ChainExecution> {
        self.executions.get(id.as_str()).await
    }

    async fn put_execution(&self, execution: &ChainExecution) {
        self.executions
            .insert(execution.id().to_string(), execution.clone())
            .await;
    }

    async fn invalidate_execution(&self, id: &ExecutionId) {
        self.executions.invalidate(id.as_str()).await;
    }
}
