//! Chain store backed by generic entity storage

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::chain::{
    ChainDefinition, ChainExecution, ChainId, ChainKey, ChainStore, ExecutionId, TenantId,
};
use crate::domain::storage::{Storage, StorageEntity};
use crate::domain::DomainError;

/// Persisted chain row, keyed by tenant and chain id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredChain {
    key: ChainKey,
    chain: ChainDefinition,
}

impl StoredChain {
    pub fn new(chain: ChainDefinition) -> Self {
        Self {
            key: chain.key(),
            chain,
        }
    }

    pub fn into_chain(self) -> ChainDefinition {
        self.chain
    }
}

impl StorageEntity for StoredChain {
    type Key = ChainKey;

    fn key(&self) -> &Self::Key {
        &self.key
    }
}

/// Tenant-scoped [`ChainStore`] over two entity storages
///
/// Definitions live under a tenant-qualified key, so two tenants may use the same
/// chain id. Executions of another tenant are filtered out on read and look exactly
/// like missing ones.
#[derive(Debug, Clone)]
pub struct StorageChainStore {
    chains: Arc<dyn Storage<StoredChain>>,
    executions: Arc<dyn Storage<ChainExecution>>,
}

impl StorageChainStore {
    pub fn new(
        chains: Arc<dyn Storage<StoredChain>>,
        executions: Arc<dyn Storage<ChainExecution>>,
    ) -> Self {
        Self { chains, executions }
    }
}

#[async_trait]
impl ChainStore for StorageChainStore {
    async fn create_chain(&self, chain: ChainDefinition) -> Result<ChainId, DomainError> {
        let id = chain.id().clone();
        let tenant_id = chain.tenant_id().clone();

        match self.chains.create(StoredChain::new(chain)).await {
            Ok(_) => {}
            Err(DomainError::Conflict { .. }) => {
                return Err(DomainError::conflict(format!("Chain '{}' already exists", id)));
            }
            Err(e) => return Err(e),
        }

        debug!(chain_id = %id, tenant_id = %tenant_id, "Stored chain");
        Ok(id)
    }

    async fn get_chain(
        &self,
        id: &ChainId,
        tenant_id: &TenantId,
    ) -> Result<Option<ChainDefinition>, DomainError> {
        Ok(self
            .chains
            .get(&ChainKey::new(tenant_id, id))
            .await?
            .map(StoredChain::into_chain))
    }

    async fn list_chains(&self, tenant_id: &TenantId) -> Result<Vec<ChainDefinition>, DomainError> {
        Ok(self
            .chains
            .list()
            .await?
            .into_iter()
            .map(StoredChain::into_chain)
            .filter(|chain| chain.belongs_to(tenant_id))
            .collect())
    }

    async fn update_chain(&self, chain: ChainDefinition) -> Result<ChainDefinition, DomainError> {
        if !self.chains.exists(&chain.key()).await? {
            return Err(DomainError::not_found(format!(
                "Chain '{}' not found",
                chain.id()
            )));
        }

        Ok(self
            .chains
            .update(StoredChain::new(chain))
            .await?
            .into_chain())
    }

    async fn delete_chain(&self, id: &ChainId, tenant_id: &TenantId) -> Result<bool, DomainError> {
        self.chains.delete(&ChainKey::new(tenant_id, id)).await
    }

    async fn create_execution(&self, execution: &ChainExecution) -> Result<(), DomainError> {
        self.executions.create(execution.clone()).await?;
        Ok(())
    }

    async fn update_execution(&self, execution: &ChainExecution) -> Result<(), DomainError> {
        self.executions.update(execution.clone()).await?;
        Ok(())
    }

    async fn get_execution(
        &self,
        id: &ExecutionId,
        tenant_id: &TenantId,
    ) -> Result<Option<ChainExecution>, DomainError> {
        Ok(self
            .executions
            .get(id)
            .await?
            .filter(|execution| execution.belongs_to(tenant_id)))
    }

    async fn list_executions(
        &self,
        tenant_id: &TenantId,
        chain_id: &ChainId,
    ) -> Result<Vec<ChainExecution>, DomainError> {
        Ok(self
            .executions
            .list()
            .await?
            .into_iter()
            .filter(|e| e.belongs_to(tenant_id) && e.chain_id() == chain_id)
            .collect())
    }
}
