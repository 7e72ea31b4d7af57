//! Chain service - string-id facade over the chain controller

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::instrument;

use crate::domain::chain::{
    ChainController, ChainDefinition, ChainExecution, ChainId, ChainStep, ExecutionId, StepId,
    StepOutcome, TenantId,
};
use crate::domain::DomainError;

/// Request to create a new chain
#[derive(Debug, Clone, Default)]
pub struct CreateChainRequest {
    pub id: Option<String>,
    pub name: String,
    pub description: Option<String>,
    pub steps: Vec<ChainStep>,
    pub rollback_steps: Vec<ChainStep>,
    pub variables: HashMap<String, Value>,
    pub is_active: bool,
}

impl CreateChainRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_active: true,
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_step(mut self, step: ChainStep) -> Self {
        self.steps.push(step);
        self
    }

    pub fn with_rollback_step(mut self, step: ChainStep) -> Self {
        self.rollback_steps.push(step);
        self
    }

    pub fn with_variable(mut self, name: impl Into<String>, value: Value) -> Self {
        self.variables.insert(name.into(), value);
        self
    }
}

/// Request to update an existing chain; `None` leaves a field untouched
#[derive(Debug, Clone, Default)]
pub struct UpdateChainRequest {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub steps: Option<Vec<ChainStep>>,
    pub rollback_steps: Option<Vec<ChainStep>>,
    pub variables: Option<HashMap<String, Value>>,
    pub is_active: Option<bool>,
}

impl UpdateChainRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_steps(mut self, steps: Vec<ChainStep>) -> Self {
        self.steps = Some(steps);
        self
    }

    pub fn with_active(mut self, active: bool) -> Self {
        self.is_active = Some(active);
        self
    }
}

/// Chain service used by the HTTP layer and the CLI
#[derive(Debug, Clone)]
pub struct ChainService {
    controller: Arc<ChainController>,
}

impl ChainService {
    pub fn new(controller: Arc<ChainController>) -> Self {
        Self { controller }
    }

    pub fn controller(&self) -> &Arc<ChainController> {
        &self.controller
    }

    #[instrument(skip(self, request), fields(tenant_id = %tenant_id, name = %request.name))]
    pub async fn create(
        &self,
        tenant_id: &str,
        user_id: &str,
        request: CreateChainRequest,
    ) -> Result<ChainDefinition, DomainError> {
        let tenant = parse_tenant(tenant_id)?;
        let mut definition = match request.id {
            Some(id) => ChainDefinition::with_id(parse_chain_id(&id)?, tenant, request.name),
            None => ChainDefinition::new(tenant, request.name),
        };

        if let Some(description) = request.description {
            definition = definition.with_description(description);
        }

        definition = definition
            .with_steps(request.steps)
            .with_rollback_steps(request.rollback_steps)
            .with_variables(request.variables)
            .with_active(request.is_active)
            .with_created_by(user_id);

        Ok(self.controller.create_chain(definition).await?)
    }

    pub async fn get(&self, tenant_id: &str, id: &str) -> Result<ChainDefinition, DomainError> {
        let tenant = parse_tenant(tenant_id)?;
        Ok(self.controller.get_chain(&parse_chain_id(id)?, &tenant).await?)
    }

    pub async fn list(&self, tenant_id: &str) -> Result<Vec<ChainDefinition>, DomainError> {
        let tenant = parse_tenant(tenant_id)?;
        Ok(self.controller.list_chains(&tenant).await?)
    }

    #[instrument(skip(self, request), fields(tenant_id = %tenant_id, chain_id = %id))]
    pub async fn update(
        &self,
        tenant_id: &str,
        id: &str,
        request: UpdateChainRequest,
    ) -> Result<ChainDefinition, DomainError> {
        let tenant = parse_tenant(tenant_id)?;
        let mut chain = self
            .controller
            .get_chain(&parse_chain_id(id)?, &tenant)
            .await?;

        if let Some(name) = request.name {
            chain.set_name(name);
        }

        if let Some(description) = request.description {
            chain.set_description(description);
        }

        if request.steps.is_some() || request.rollback_steps.is_some() {
            let steps = request.steps.unwrap_or_else(|| chain.steps().to_vec());
            let rollback = request
                .rollback_steps
                .unwrap_or_else(|| chain.rollback_steps().to_vec());
            chain.set_steps(steps, rollback);
        }

        if let Some(variables) = request.variables {
            chain.set_variables(variables);
        }

        if let Some(active) = request.is_active {
            chain.set_active(active);
        }

        Ok(self.controller.update_chain(chain).await?)
    }

    pub async fn delete(&self, tenant_id: &str, id: &str) -> Result<(), DomainError> {
        let tenant = parse_tenant(tenant_id)?;
        Ok(self
            .controller
            .delete_chain(&parse_chain_id(id)?, &tenant)
            .await?)
    }

    pub async fn set_active(
        &self,
        tenant_id: &str,
        id: &str,
        active: bool,
    ) -> Result<ChainDefinition, DomainError> {
        let tenant = parse_tenant(tenant_id)?;
        Ok(self
            .controller
            .set_chain_active(&parse_chain_id(id)?, &tenant, active)
            .await?)
    }

    /// Start an execution; the steps run on a background task
    #[instrument(skip(self, input), fields(tenant_id = %tenant_id, chain_id = %chain_id))]
    pub async fn execute(
        &self,
        tenant_id: &str,
        chain_id: &str,
        user_id: &str,
        input: HashMap<String, Value>,
    ) -> Result<ChainExecution, DomainError> {
        let tenant = parse_tenant(tenant_id)?;
        Ok(self
            .controller
            .execute_chain(&parse_chain_id(chain_id)?, &tenant, user_id, input)
            .await?)
    }

    pub async fn get_execution(
        &self,
        tenant_id: &str,
        id: &str,
    ) -> Result<ChainExecution, DomainError> {
        let tenant = parse_tenant(tenant_id)?;
        Ok(self
            .controller
            .get_execution(&parse_execution_id(id)?, &tenant)
            .await?)
    }

    pub async fn list_executions(
        &self,
        tenant_id: &str,
        chain_id: &str,
    ) -> Result<Vec<ChainExecution>, DomainError> {
        let tenant = parse_tenant(tenant_id)?;
        let chain_id = parse_chain_id(chain_id)?;

        // Unknown or foreign chains are a 404, not an empty list
        self.controller.get_chain(&chain_id, &tenant).await?;

        Ok(self.controller.list_executions(&tenant, &chain_id).await?)
    }

    pub async fn pause(&self, tenant_id: &str, id: &str) -> Result<ChainExecution, DomainError> {
        let tenant = parse_tenant(tenant_id)?;
        Ok(self
            .controller
            .pause(&parse_execution_id(id)?, &tenant)
            .await?)
    }

    pub async fn resume(&self, tenant_id: &str, id: &str) -> Result<ChainExecution, DomainError> {
        let tenant = parse_tenant(tenant_id)?;
        Ok(self
            .controller
            .resume(&parse_execution_id(id)?, &tenant)
            .await?)
    }

    pub async fn cancel(&self, tenant_id: &str, id: &str) -> Result<ChainExecution, DomainError> {
        let tenant = parse_tenant(tenant_id)?;
        Ok(self
            .controller
            .cancel(&parse_execution_id(id)?, &tenant)
            .await?)
    }

    pub async fn add_step_result(
        &self,
        tenant_id: &str,
        execution_id: &str,
        step_id: &str,
        outcome: StepOutcome,
    ) -> Result<ChainExecution, DomainError> {
        let tenant = parse_tenant(tenant_id)?;
        let step_id = StepId::new(step_id)?;
        Ok(self
            .controller
            .add_step_result(&parse_execution_id(execution_id)?, &tenant, &step_id, outcome)
            .await?)
    }
}

fn parse_tenant(id: &str) -> Result<TenantId, DomainError> {
    Ok(TenantId::new(id)?)
}

fn parse_chain_id(id: &str) -> Result<ChainId, DomainError> {
    Ok(ChainId::new(id)?)
}

fn parse_execution_id(id: &str) -> Result<ExecutionId, DomainError> {
    Ok(ExecutionId::new(id)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::domain::chain::mock::{
        MemoryChainCache, MockChainStore, RecordingSink, ScriptedInvoker,
    };
    use crate::domain::chain::{ControllerConfig, ExecutionStatus};

    fn service() -> ChainService {
        let controller = ChainController::new(
            Arc::new(MockChainStore::new()),
            Arc::new(MemoryChainCache::default()),
            Arc::new(ScriptedInvoker::new()),
            Arc::new(RecordingSink::new()),
            ControllerConfig::default(),
        );
        ChainService::new(Arc::new(controller))
    }

    fn step(id: &str, order: usize) -> ChainStep {
        ChainStep::new(StepId::new(id).unwrap(), format!("wf-{}", id), order)
    }

    async fn wait_for_terminal(service: &ChainService, id: &str) -> ChainExecution {
        for _ in 0..100 {
            let execution = service.get_execution("acme", id).await.unwrap();
            if execution.is_terminal() {
                return execution;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        panic!("execution {} did not finish", id);
    }

    #[tokio::test]
    async fn test_create_with_explicit_id() {
        let service = service();
        let chain = service
            .create(
                "acme",
                "alice",
                CreateChainRequest::new("Checkout")
                    .with_id("checkout")
                    .with_step(step("charge", 0)),
            )
            .await
            .unwrap();

        assert_eq!(chain.id().as_str(), "checkout");
        assert_eq!(chain.created_by(), Some("alice"));
        assert!(chain.is_active());
    }

    #[tokio::test]
    async fn test_invalid_ids_are_rejected() {
        let service = service();

        assert!(service.get("acme", "bad id!").await.is_err());
        assert!(service.get("", "checkout").await.is_err());
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_definition() {
        let service = service();
        let result = service
            .create("acme", "alice", CreateChainRequest::new("Empty"))
            .await;

        assert!(matches!(result, Err(DomainError::Validation { .. })));
    }

    #[tokio::test]
    async fn test_update_keeps_rollback_steps_when_only_steps_change() {
        let service = service();
        let chain = service
            .create(
                "acme",
                "alice",
                CreateChainRequest::new("Checkout")
                    .with_step(step("charge", 0))
                    .with_rollback_step(step("refund", 0)),
            )
            .await
            .unwrap();

        let updated = service
            .update(
                "acme",
                chain.id().as_str(),
                UpdateChainRequest::new()
                    .with_name("Checkout v2")
                    .with_steps(vec![step("reserve", 0), step("charge", 1)]),
            )
            .await
            .unwrap();

        assert_eq!(updated.name(), "Checkout v2");
        assert_eq!(updated.step_count(), 2);
        assert_eq!(updated.rollback_steps().len(), 1);
        assert_eq!(updated.version(), chain.version() + 1);
    }

    #[tokio::test]
    async fn test_execute_runs_in_background() {
        let service = service();
        let chain = service
            .create(
                "acme",
                "alice",
                CreateChainRequest::new("Two steps")
                    .with_step(step("a", 0))
                    .with_step(step("b", 1)),
            )
            .await
            .unwrap();

        let started = service
            .execute("acme", chain.id().as_str(), "alice", HashMap::new())
            .await
            .unwrap();
        assert_eq!(started.status(), ExecutionStatus::Running);

        let finished = wait_for_terminal(&service, started.id().as_str()).await;
        assert_eq!(finished.status(), ExecutionStatus::Completed);
        assert_eq!(finished.completed_steps().len(), 2);

        let listed = service
            .list_executions("acme", chain.id().as_str())
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
    }

    #[tokio::test]
    async fn test_deactivated_chain_cannot_start() {
        let service = service();
        let chain = service
            .create("acme", "alice", CreateChainRequest::new("A").with_step(step("a", 0)))
            .await
            .unwrap();

        let inactive = service
            .set_active("acme", chain.id().as_str(), false)
            .await
            .unwrap();
        assert!(!inactive.is_active());

        let result = service
            .execute("acme", chain.id().as_str(), "alice", HashMap::new())
            .await;
        assert!(result.is_err());

        service
            .set_active("acme", chain.id().as_str(), true)
            .await
            .unwrap();
        assert!(service
            .execute("acme", chain.id().as_str(), "alice", HashMap::new())
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_list_executions_of_foreign_chain_is_not_found() {
        let service = service();
        let chain = service
            .create("acme", "alice", CreateChainRequest::new("A").with_step(step("a", 0)))
            .await
            .unwrap();

        let result = service.list_executions("globex", chain.id().as_str()).await;
        assert!(matches!(result, Err(DomainError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_add_step_result_and_lifecycle_errors() {
        let service = service();
        let chain = service
            .create("acme", "alice", CreateChainRequest::new("A").with_step(step("a", 0)))
            .await
            .unwrap();
        let execution = service
            .execute("acme", chain.id().as_str(), "alice", HashMap::new())
            .await
            .unwrap();
        let finished = wait_for_terminal(&service, execution.id().as_str()).await;

        let result = service
            .add_step_result(
                "acme",
                finished.id().as_str(),
                "a",
                StepOutcome::success(json!(1)),
            )
            .await;
        assert!(matches!(result, Err(DomainError::InvalidState { .. })));

        let result = service.resume("acme", finished.id().as_str()).await;
        assert!(matches!(result, Err(DomainError::InvalidState { .. })));
    }
}
