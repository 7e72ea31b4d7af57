//! Read-through cache contract for chains and executions

use std::fmt::Debug;

use async_trait::async_trait;

use super::entity::{ChainDefinition, ChainId, ChainKey, TenantId};
use super::execution::{ChainExecution, ExecutionId};

/// Process-local copy of recently used records
///
/// The chain store stays the source of truth. Definitions are keyed by tenant and id.
/// Executions are keyed by id only, so callers check tenant ownership on every hit.
#[async_trait]
pub trait ChainCache: Send + Sync + Debug {
    async fn get_chain(&self, tenant_id: &TenantId, id: &ChainId) -> Option<ChainDefinition>;

    async fn put_chain(&self, chain: &ChainDefinition);

    async fn invalidate_chain(&self, tenant_id: &TenantId, id: &ChainId);

    async fn get_execution(&self, id: &ExecutionId) -> Option<ChainExecution>;

    async fn put_execution(&self, execution: &ChainExecution);

    async fn invalidate_execution(&self, id: &ExecutionId);
}
