//! Application state for shared services

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::broadcast;

use crate::domain::chain::{ChainDefinition, ChainEvent, ChainExecution, StepOutcome};
use crate::domain::DomainError;
use crate::infrastructure::services::{ChainService, CreateChainRequest, UpdateChainRequest};

/// Application state containing shared services using dynamic dispatch
#[derive(Clone)]
pub struct AppState {
    pub chain_service: Arc<dyn ChainServiceTrait>,
    /// Lifecycle events of every execution, fed by the broadcast event sink
    pub events: broadcast::Sender<ChainEvent>,
}

impl AppState {
    pub fn new(
        chain_service: Arc<dyn ChainServiceTrait>,
        events: broadcast::Sender<ChainEvent>,
    ) -> Self {
        Self {
            chain_service,
            events,
        }
    }
}

/// Chain operations available to HTTP handlers, keyed by raw string ids
#[async_trait::async_trait]
pub trait ChainServiceTrait: Send + Sync {
    async fn create(
        &self,
        tenant_id: &str,
        user_id: &str,
        request: CreateChainRequest,
    ) -> Result<ChainDefinition, DomainError>;
    async fn get(&self, tenant_id: &str, id: &str) -> Result<ChainDefinition, DomainError>;
    async fn list(&self, tenant_id: &str) -> Result<Vec<ChainDefinition>, DomainError>;
    async fn update(
        &self,
        tenant_id: &str,
        id: &str,
        request: UpdateChainRequest,
    ) -> Result<ChainDefinition, DomainError>;
    async fn delete(&self, tenant_id: &str, id: &str) -> Result<(), DomainError>;
    async fn set_active(
        &self,
        tenant_id: &str,
        id: &str,
        active: bool,
    ) -> Result<ChainDefinition, DomainError>;

    async fn execute(
        &self,
        tenant_id: &str,
        chain_id: &str,
        user_id: &str,
        input: HashMap<String, Value>,
    ) -> Result<ChainExecution, DomainError>;
    async fn get_execution(&self, tenant_id: &str, id: &str)
        -> Result<ChainExecution, DomainError>;
    async fn list_executions(
        &self,
        tenant_id: &str,
        chain_id: &str,
    ) -> Result<Vec<ChainExecution>, DomainError>;
    async fn pause(&self, tenant_id: &str, id: &str) -> Result<ChainExecution, DomainError>;
    async fn resume(&self, tenant_id: &str, id: &str) -> Result<ChainExecution, DomainError>;
    async fn cancel(&self, tenant_id: &str, id: &str) -> Result<ChainExecution, DomainError>;
    async fn add_step_result(
        &self,
        tenant_id: &str,
        execution_id: &str,
        step_id: &str,
        outcome: StepOutcome,
    ) -> Result<ChainExecution, DomainError>;
}

#[async_trait::async_trait]
impl ChainServiceTrait for ChainService {
    async fn create(
        &self,
        tenant_id: &str,
        user_id: &str,
        request: CreateChainRequest,
    ) -> Result<ChainDefinition, DomainError> {
        ChainService::create(self, tenant_id, user_id, request).await
    }

    async fn get(&self, tenant_id: &str, id: &str) -> Result<ChainDefinition, DomainError> {
        ChainService::get(self, tenant_id, id).await
    }

    async fn list(&self, tenant_id: &str) -> Result<Vec<ChainDefinition>, DomainError> {
        ChainService::list(self, tenant_id).await
    }

    async fn update(
        &self,
        tenant_id: &str,
        id: &str,
        request: UpdateChainRequest,
    ) -> Result<ChainDefinition, DomainError> {
        ChainService::update(self, tenant_id, id, request).await
    }

    async fn delete(&self, tenant_id: &str, id: &str) -> Result<(), DomainError> {
        ChainService::delete(self, tenant_id, id).await
    }

    async fn set_active(
        &self,
        tenant_id: &str,
        id: &str,
        active: bool,
    ) -> Result<ChainDefinition, DomainError> {
        ChainService::set_active(self, tenant_id, id, active).await
    }

    async fn execute(
        &self,
        tenant_id: &str,
        chain_id: &str,
        user_id: &str,
        input: HashMap<String, Value>,
    ) -> Result<ChainExecution, DomainError> {
        ChainService::execute(self, tenant_id, chain_id, user_id, input).await
    }

    async fn get_execution(
        &self,
        tenant_id: &str,
        id: &str,
    ) -> Result<ChainExecution, DomainError> {
        ChainService::get_execution(self, tenant_id, id).await
    }

    async fn list_executions(
        &self,
        tenant_id: &str,
        chain_id: &str,
    ) -> Result<Vec<ChainExecution>, DomainError> {
        ChainService::list_executions(self, tenant_id, chain_id).await
    }

    async fn pause(&self, tenant_id: &str, id: &str) -> Result<ChainExecution, DomainError> {
        ChainService::pause(self, tenant_id, id).await
    }

    async fn resume(&self, tenant_id: &str, id: &str) -> Result<ChainExecution, DomainError> {
        ChainService::resume(self, tenant_id, id).await
    }

    async fn cancel(&self, tenant_id: &str, id: &str) -> Result<ChainExecution, DomainError> {
        ChainService::cancel(self, tenant_id, id).await
    }

    async fn add_step_result(
        &self,
        tenant_id: &str,
        execution_id: &str,
        step_id: &str,
        outcome: StepOutcome,
    ) -> Result<ChainExecution, DomainError> {
        ChainService::add_step_result(self, tenant_id, execution_id, step_id, outcome).await
    }
}
