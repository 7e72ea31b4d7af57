//! Chain store contract

use std::fmt::Debug;

use async_trait::async_trait;

use super::entity::{ChainDefinition, ChainId, TenantId};
use super::execution::{ChainExecution, ExecutionId};
use crate::domain::error::DomainError;

/// Durable record of chain definitions and execution state
///
/// Reads are scoped by tenant: a record owned by another tenant is reported as
/// missing, never as forbidden. Chain ids only need to be unique within a tenant.
#[async_trait]
pub trait ChainStore: Send + Sync + Debug {
    async fn create_chain(&self, chain: ChainDefinition) -> Result<ChainId, DomainError>;

    async fn get_chain(
        &self,
        id: &ChainId,
        tenant_id: &TenantId,
    ) -> Result<Option<ChainDefinition>, DomainError>;

    async fn list_chains(&self, tenant_id: &TenantId) -> Result<Vec<ChainDefinition>, DomainError>;

    async fn update_chain(&self, chain: ChainDefinition) -> Result<ChainDefinition, DomainError>;

    /// Returns false when the chain does not exist for this tenant
    async fn delete_chain(&self, id: &ChainId, tenant_id: &TenantId) -> Result<bool, DomainError>;

    async fn create_execution(&self, execution: &ChainExecution) -> Result<(), DomainError>;

    async fn update_execution(&self, execution: &ChainExecution) -> Result<(), DomainError>;

    async fn get_execution(
        &self,
        id: &ExecutionId,
        tenant_id: &TenantId,
    ) -> Result<Option<ChainExecution>, DomainError>;

    async fn list_executions(
        &self,
        tenant_id: &TenantId,
        chain_id: &ChainId,
    ) -> Result<Vec<ChainExecution>, DomainError>;
}
