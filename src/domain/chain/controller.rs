//! Chain execution controller - drives executions from start to a terminal state

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{Value, json};
use tokio::sync::{Mutex, RwLock};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use super::action::{self, ActionOutcome, ControlDirective};
use super::cache::ChainCache;
use super::entity::{ChainDefinition, ChainId, ChainStep, StepId, TenantId};
use super::error::ChainError;
use super::events::{ChainEvent, ChainEventKind, EventSink};
use super::execution::{ChainExecution, ExecutionId, ExecutionStatus};
use super::invoker::{StepInvoker, StepOutcome};
use super::rollback::{RollbackCoordinator, RollbackReport};
use super::store::ChainStore;
use super::validation::validate_chain;

/// Configuration for the chain controller
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Retries granted to steps that do not declare their own
    pub default_max_retries: u32,
    /// Invocation timeout for steps that do not declare their own
    pub default_step_timeout: Option<Duration>,
    /// Step evaluations allowed in one driving run before the execution fails
    pub max_transitions_per_run: usize,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            default_max_retries: 3,
            default_step_timeout: None,
            max_transitions_per_run: 1000,
        }
    }
}

/// Per-execution writer slot; its mutex serialises every state change
#[derive(Debug, Default)]
struct ExecutionSlot {
    /// A task is currently running the step loop for this execution
    driving: bool,
}

enum NextStep {
    Invoke(ChainStep),
    Done(ChainExecution),
}

/// Chain controller - owns chain definitions and drives their executions
pub struct ChainController {
    store: Arc<dyn ChainStore>,
    cache: Arc<dyn ChainCache>,
    invoker: Arc<dyn StepInvoker>,
    events: Arc<dyn EventSink>,
    rollback: RollbackCoordinator,
    config: ControllerConfig,
    slots: RwLock<HashMap<String, Arc<Mutex<ExecutionSlot>>>>,
}

impl std::fmt::Debug for ChainController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainController")
            .field("config", &self.config)
            .finish()
    }
}

impl ChainController {
    pub fn new(
        store: Arc<dyn ChainStore>,
        cache: Arc<dyn ChainCache>,
        invoker: Arc<dyn StepInvoker>,
        events: Arc<dyn EventSink>,
        config: ControllerConfig,
    ) -> Self {
        let rollback = RollbackCoordinator::new(invoker.clone())
            .with_default_timeout(config.default_step_timeout);

        Self {
            store,
            cache,
            invoker,
            events,
            rollback,
            config,
            slots: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    // Chain definitions

    /// Validate and persist a new chain definition
    pub async fn create_chain(
        &self,
        mut definition: ChainDefinition,
    ) -> Result<ChainDefinition, ChainError> {
        validate_chain(&definition)?;
        definition.sort_steps();

        self.store.create_chain(definition.clone()).await?;
        self.cache.put_chain(&definition).await;

        info!(
            chain_id = %definition.id(),
            tenant_id = %definition.tenant_id(),
            steps = definition.step_count(),
            "Created chain"
        );

        Ok(definition)
    }

    pub async fn get_chain(
        &self,
        id: &ChainId,
        tenant_id: &TenantId,
    ) -> Result<ChainDefinition, ChainError> {
        if let Some(chain) = self.cache.get_chain(tenant_id, id).await {
            return Ok(chain);
        }

        let chain = self
            .store
            .get_chain(id, tenant_id)
            .await?
            .ok_or_else(|| ChainError::chain_not_found(id.as_str()))?;

        self.cache.put_chain(&chain).await;
        Ok(chain)
    }

    pub async fn list_chains(&self, tenant_id: &TenantId) -> Result<Vec<ChainDefinition>, ChainError> {
        let mut chains = self.store.list_chains(tenant_id).await?;
        chains.sort_by_key(|c| c.created_at());
        Ok(chains)
    }

    /// Persist a modified definition; running executions keep their own snapshot
    pub async fn update_chain(
        &self,
        mut definition: ChainDefinition,
    ) -> Result<ChainDefinition, ChainError> {
        validate_chain(&definition)?;
        definition.sort_steps();

        // Ownership check before writing
        self.get_chain(definition.id(), definition.tenant_id()).await?;

        let updated = self.store.update_chain(definition).await?;
        self.cache.put_chain(&updated).await;

        info!(
            chain_id = %updated.id(),
            version = updated.version(),
            "Updated chain"
        );

        Ok(updated)
    }

    pub async fn delete_chain(&self, id: &ChainId, tenant_id: &TenantId) -> Result<(), ChainError> {
        let deleted = self.store.delete_chain(id, tenant_id).await?;
        self.cache.invalidate_chain(tenant_id, id).await;

        if !deleted {
            return Err(ChainError::chain_not_found(id.as_str()));
        }

        info!(chain_id = %id, "Deleted chain");
        Ok(())
    }

    pub async fn set_chain_active(
        &self,
        id: &ChainId,
        tenant_id: &TenantId,
        active: bool,
    ) -> Result<ChainDefinition, ChainError> {
        let mut chain = self.get_chain(id, tenant_id).await?;
        chain.set_active(active);

        let updated = self.store.update_chain(chain).await?;
        self.cache.put_chain(&updated).await;
        Ok(updated)
    }

    // Executions

    /// Persist a new running execution and claim its driver slot
    ///
    /// The caller must follow up with [`ChainController::drive`].
    pub async fn start_execution(
        &self,
        chain_id: &ChainId,
        tenant_id: &TenantId,
        user_id: &str,
        input: HashMap<String, Value>,
    ) -> Result<ChainExecution, ChainError> {
        let chain = self.get_chain(chain_id, tenant_id).await?;
        if !chain.is_active() {
            return Err(ChainError::validation(format!(
                "Chain '{}' is inactive",
                chain_id
            )));
        }

        let execution = ChainExecution::new(&chain, user_id, input);
        self.store.create_execution(&execution).await?;
        self.cache.put_execution(&execution).await;

        let slot = self.slot(execution.id()).await;
        slot.lock().await.driving = true;

        info!(
            execution_id = %execution.id(),
            chain_id = %chain_id,
            tenant_id = %tenant_id,
            user_id = %user_id,
            "Started chain execution"
        );
        self.emit(
            ChainEventKind::Started,
            &execution,
            json!({ "user_id": user_id, "steps": chain.step_count() }),
        );

        Ok(execution)
    }

    /// Start an execution and drive it on a background task
    pub async fn execute_chain(
        self: &Arc<Self>,
        chain_id: &ChainId,
        tenant_id: &TenantId,
        user_id: &str,
        input: HashMap<String, Value>,
    ) -> Result<ChainExecution, ChainError> {
        let execution = self
            .start_execution(chain_id, tenant_id, user_id, input)
            .await?;

        self.spawn_driver(execution.id().clone(), tenant_id.clone());
        Ok(execution)
    }

    /// Start an execution and drive it to a stopping point before returning
    pub async fn run_chain(
        &self,
        chain_id: &ChainId,
        tenant_id: &TenantId,
        user_id: &str,
        input: HashMap<String, Value>,
    ) -> Result<ChainExecution, ChainError> {
        let execution = self
            .start_execution(chain_id, tenant_id, user_id, input)
            .await?;

        self.drive(execution.id(), tenant_id).await
    }

    /// Run the step loop until the execution stops running
    ///
    /// Returns the last persisted state: terminal, or paused.
    pub async fn drive(
        &self,
        id: &ExecutionId,
        tenant_id: &TenantId,
    ) -> Result<ChainExecution, ChainError> {
        let slot = self.slot(id).await;
        let mut transitions = 0usize;

        loop {
            let step = {
                let mut guard = slot.lock().await;
                match self.next_step(id, tenant_id, &mut transitions).await {
                    Ok(NextStep::Invoke(step)) => step,
                    Ok(NextStep::Done(execution)) => {
                        guard.driving = false;
                        self.release_if_terminal(&execution).await;
                        return Ok(execution);
                    }
                    Err(e) => {
                        guard.driving = false;
                        return Err(e);
                    }
                }
            };

            // No lock held while the step runs
            let started = Instant::now();
            let outcome = self.invoke_step(&step).await;
            let elapsed = started.elapsed();

            let mut guard = slot.lock().await;
            match self.settle_step(id, tenant_id, &step, outcome, elapsed).await {
                Ok(None) => {}
                Ok(Some(execution)) => {
                    guard.driving = false;
                    self.release_if_terminal(&execution).await;
                    return Ok(execution);
                }
                Err(e) => {
                    guard.driving = false;
                    return Err(e);
                }
            }
        }
    }

    pub async fn get_execution(
        &self,
        id: &ExecutionId,
        tenant_id: &TenantId,
    ) -> Result<ChainExecution, ChainError> {
        self.load_execution(id, tenant_id).await
    }

    pub async fn list_executions(
        &self,
        tenant_id: &TenantId,
        chain_id: &ChainId,
    ) -> Result<Vec<ChainExecution>, ChainError> {
        let mut executions = self.store.list_executions(tenant_id, chain_id).await?;
        executions.sort_by_key(|e| e.start_time());
        Ok(executions)
    }

    /// Halt at the next safe point; an in-flight step still settles
    pub async fn pause(
        &self,
        id: &ExecutionId,
        tenant_id: &TenantId,
    ) -> Result<ChainExecution, ChainError> {
        let slot = self.slot(id).await;
        let result = self.pause_locked(&slot, id, tenant_id).await;
        self.release_idle(id, slot).await;
        result
    }

    async fn pause_locked(
        &self,
        slot: &Mutex<ExecutionSlot>,
        id: &ExecutionId,
        tenant_id: &TenantId,
    ) -> Result<ChainExecution, ChainError> {
        let _guard = slot.lock().await;

        let mut execution = self.load_execution(id, tenant_id).await?;
        execution.pause()?;
        self.persist(&execution).await?;

        info!(execution_id = %id, step = execution.current_step(), "Paused execution");
        self.emit(
            ChainEventKind::Paused,
            &execution,
            json!({ "current_step": execution.current_step() }),
        );

        Ok(execution)
    }

    /// Continue a paused execution from its cursor on a background task
    pub async fn resume(
        self: &Arc<Self>,
        id: &ExecutionId,
        tenant_id: &TenantId,
    ) -> Result<ChainExecution, ChainError> {
        let slot = self.slot(id).await;
        let result = self.resume_locked(&slot, id, tenant_id).await;
        self.release_idle(id, slot).await;
        result
    }

    async fn resume_locked(
        self: &Arc<Self>,
        slot: &Mutex<ExecutionSlot>,
        id: &ExecutionId,
        tenant_id: &TenantId,
    ) -> Result<ChainExecution, ChainError> {
        let mut guard = slot.lock().await;

        let mut execution = self.load_execution(id, tenant_id).await?;
        execution.resume()?;
        self.persist(&execution).await?;

        info!(execution_id = %id, step = execution.current_step(), "Resumed execution");
        self.emit(
            ChainEventKind::Resumed,
            &execution,
            json!({ "current_step": execution.current_step() }),
        );

        // A driver that has not reached its next safe point yet picks the run back up
        if !guard.driving {
            guard.driving = true;
            self.spawn_driver(id.clone(), tenant_id.clone());
        }

        Ok(execution)
    }

    /// Stop the execution for good; an in-flight step result is discarded
    pub async fn cancel(
        &self,
        id: &ExecutionId,
        tenant_id: &TenantId,
    ) -> Result<ChainExecution, ChainError> {
        let slot = self.slot(id).await;
        let result = self.cancel_locked(&slot, id, tenant_id).await;
        self.release_idle(id, slot).await;
        result
    }

    async fn cancel_locked(
        &self,
        slot: &Mutex<ExecutionSlot>,
        id: &ExecutionId,
        tenant_id: &TenantId,
    ) -> Result<ChainExecution, ChainError> {
        let _guard = slot.lock().await;

        let mut execution = self.load_execution(id, tenant_id).await?;
        execution.cancel()?;
        self.persist(&execution).await?;

        info!(execution_id = %id, "Cancelled execution");
        self.emit(
            ChainEventKind::Cancelled,
            &execution,
            json!({ "current_step": execution.current_step() }),
        );

        Ok(execution)
    }

    /// Record an externally produced step outcome without moving the cursor
    pub async fn add_step_result(
        &self,
        id: &ExecutionId,
        tenant_id: &TenantId,
        step_id: &StepId,
        outcome: StepOutcome,
    ) -> Result<ChainExecution, ChainError> {
        let slot = self.slot(id).await;
        let result = self
            .add_step_result_locked(&slot, id, tenant_id, step_id, outcome)
            .await;
        self.release_idle(id, slot).await;
        result
    }

    async fn add_step_result_locked(
        &self,
        slot: &Mutex<ExecutionSlot>,
        id: &ExecutionId,
        tenant_id: &TenantId,
        step_id: &StepId,
        outcome: StepOutcome,
    ) -> Result<ChainExecution, ChainError> {
        let _guard = slot.lock().await;

        let mut execution = self.load_execution(id, tenant_id).await?;
        if execution.is_terminal() {
            return Err(ChainError::invalid_transition(
                "record a step result for",
                execution.status(),
            ));
        }

        let step = execution
            .definition()
            .find_step(step_id)
            .cloned()
            .ok_or_else(|| ChainError::step_not_found(step_id.as_str()))?;

        let kind = if outcome.success {
            execution.record_success(step_id, outcome.result.clone());
            if let Some(variable) = step.output_variable() {
                execution.set_variable(variable, outcome.result.clone());
            }
            ChainEventKind::StepCompleted
        } else {
            let error = outcome.error_message();
            execution.record_failure(step_id, failure_payload(&outcome, &error));
            ChainEventKind::StepFailed
        };

        self.persist(&execution).await?;

        debug!(execution_id = %id, step_id = %step_id, success = outcome.success, "Recorded external step result");
        self.emit(
            kind,
            &execution,
            json!({
                "step_id": step_id,
                "external": true,
                "result": outcome.result,
                "error": outcome.error,
            }),
        );

        Ok(execution)
    }

    // Loop internals

    async fn next_step(
        &self,
        id: &ExecutionId,
        tenant_id: &TenantId,
        transitions: &mut usize,
    ) -> Result<NextStep, ChainError> {
        loop {
            let mut execution = self.load_execution(id, tenant_id).await?;
            if execution.status() != ExecutionStatus::Running {
                return Ok(NextStep::Done(execution));
            }

            let Some(step) = execution.current_chain_step().cloned() else {
                execution.complete()?;
                self.persist(&execution).await?;

                info!(
                    execution_id = %id,
                    completed = execution.completed_steps().len(),
                    failed = execution.failed_steps().len(),
                    "Chain execution completed"
                );
                self.emit_terminal(&execution);
                return Ok(NextStep::Done(execution));
            };

            if *transitions >= self.config.max_transitions_per_run {
                let message = format!(
                    "execution exceeded {} step transitions in one run",
                    self.config.max_transitions_per_run
                );
                warn!(execution_id = %id, step_id = %step.id(), "{}", message);

                execution.fail(ChainError::fatal(message).to_string())?;
                self.persist(&execution).await?;
                self.emit_terminal(&execution);
                return Ok(NextStep::Done(execution));
            }
            *transitions += 1;

            if let Some(condition) = step.condition() {
                if !condition.evaluate(&execution) {
                    execution.advance();
                    self.persist(&execution).await?;

                    debug!(execution_id = %id, step_id = %step.id(), "Condition not met, skipping step");
                    self.emit(
                        ChainEventKind::StepSkipped,
                        &execution,
                        json!({ "step_id": step.id() }),
                    );
                    continue;
                }
            }

            return Ok(NextStep::Invoke(step));
        }
    }

    async fn invoke_step(&self, step: &ChainStep) -> StepOutcome {
        let workflow_id = step.workflow_id().unwrap_or_default();
        let limit = step
            .timeout_ms()
            .map(Duration::from_millis)
            .or(self.config.default_step_timeout);

        let invocation = self.invoker.invoke(workflow_id, step.parameters());

        let result = match limit {
            Some(limit) => match timeout(limit, invocation).await {
                Ok(result) => result,
                Err(_) => {
                    return StepOutcome::failure(format!(
                        "step '{}' timed out after {}ms",
                        step.id(),
                        limit.as_millis()
                    ));
                }
            },
            None => invocation.await,
        };

        result.unwrap_or_else(|e| StepOutcome::failure(e.to_string()))
    }

    /// Apply a finished attempt. Returns the execution once the loop must stop.
    async fn settle_step(
        &self,
        id: &ExecutionId,
        tenant_id: &TenantId,
        step: &ChainStep,
        outcome: StepOutcome,
        elapsed: Duration,
    ) -> Result<Option<ChainExecution>, ChainError> {
        let mut execution = self.load_execution(id, tenant_id).await?;
        if execution.is_terminal() {
            info!(
                execution_id = %id,
                step_id = %step.id(),
                status = %execution.status(),
                "Execution ended while step was running, discarding its result"
            );
            return Ok(Some(execution));
        }

        let mut pending = Vec::new();
        let attempt = execution.record_attempt(step.id());
        let duration_ms = elapsed.as_millis() as u64;

        if outcome.success {
            execution.record_success(step.id(), outcome.result.clone());
            if let Some(variable) = step.output_variable() {
                execution.set_variable(variable, outcome.result.clone());
            }
            pending.push((
                ChainEventKind::StepCompleted,
                json!({
                    "step_id": step.id(),
                    "attempt": attempt,
                    "duration_ms": duration_ms,
                    "result": outcome.result,
                }),
            ));

            let decision = action::apply(step.on_success().unwrap_or_default(), &execution);
            self.after_success(&mut execution, decision)?;
        } else {
            let error = outcome.error_message();
            execution.record_failure(step.id(), failure_payload(&outcome, &error));
            pending.push((
                ChainEventKind::StepFailed,
                json!({
                    "step_id": step.id(),
                    "attempt": attempt,
                    "duration_ms": duration_ms,
                    "error": error,
                }),
            ));

            warn!(
                execution_id = %id,
                step_id = %step.id(),
                attempt,
                error = %error,
                "Step failed"
            );

            if let Some(report) = self
                .after_failure(&mut execution, step, attempt, &error)
                .await?
            {
                pending.push((
                    ChainEventKind::RollbackCompleted,
                    json!({
                        "succeeded": report.succeeded(),
                        "failed": report.failed(),
                        "entries": report.entries,
                    }),
                ));
            }
        }

        self.persist(&execution).await?;

        for (kind, payload) in pending {
            self.emit(kind, &execution, payload);
        }

        if execution.is_terminal() {
            self.emit_terminal(&execution);
            return Ok(Some(execution));
        }

        Ok(None)
    }

    fn after_success(
        &self,
        execution: &mut ChainExecution,
        decision: ActionOutcome,
    ) -> Result<(), ChainError> {
        match (decision.directive, decision.branched_to) {
            (ControlDirective::Stop, _) => {
                execution.advance();
                execution.complete()?;
            }
            (_, Some(target)) => execution.jump_to(target),
            _ => execution.advance(),
        }
        Ok(())
    }

    async fn after_failure(
        &self,
        execution: &mut ChainExecution,
        step: &ChainStep,
        attempt: u32,
        error: &str,
    ) -> Result<Option<RollbackReport>, ChainError> {
        let Some(actions) = step.on_failure() else {
            execution.fail(ChainError::step_execution(step.id().as_str(), error).to_string())?;
            return Ok(None);
        };

        let decision = action::apply(actions, execution);
        match decision.directive {
            ControlDirective::Continue | ControlDirective::Skip => {
                match decision.branched_to {
                    Some(target) => execution.jump_to(target),
                    None => execution.advance(),
                }
                Ok(None)
            }
            ControlDirective::Stop => {
                execution.fail(ChainError::step_execution(step.id().as_str(), error).to_string())?;
                Ok(None)
            }
            ControlDirective::Retry => {
                let max_retries = step.retries().unwrap_or(self.config.default_max_retries);
                if attempt <= max_retries {
                    debug!(
                        execution_id = %execution.id(),
                        step_id = %step.id(),
                        attempt,
                        max_retries,
                        "Retrying step"
                    );
                } else {
                    execution.fail(
                        ChainError::fatal(format!(
                            "step '{}' exhausted {} retries: {}",
                            step.id(),
                            max_retries,
                            error
                        ))
                        .to_string(),
                    )?;
                }
                Ok(None)
            }
            ControlDirective::Rollback => {
                let report = self.rollback.rollback(execution).await;
                execution.set_rollback(report.clone());
                execution.fail(ChainError::step_execution(step.id().as_str(), error).to_string())?;
                Ok(Some(report))
            }
        }
    }

    // Helpers

    async fn load_execution(
        &self,
        id: &ExecutionId,
        tenant_id: &TenantId,
    ) -> Result<ChainExecution, ChainError> {
        if let Some(execution) = self.cache.get_execution(id).await {
            if execution.belongs_to(tenant_id) {
                return Ok(execution);
            }
            return Err(ChainError::execution_not_found(id.as_str()));
        }

        let execution = self
            .store
            .get_execution(id, tenant_id)
            .await?
            .ok_or_else(|| ChainError::execution_not_found(id.as_str()))?;

        self.cache.put_execution(&execution).await;
        Ok(execution)
    }

    /// Store first, then cache; a failed write leaves the cache on the last good state
    async fn persist(&self, execution: &ChainExecution) -> Result<(), ChainError> {
        self.store.update_execution(execution).await?;
        self.cache.put_execution(execution).await;
        Ok(())
    }

    fn emit(&self, kind: ChainEventKind, execution: &ChainExecution, payload: Value) {
        self.events.emit(&ChainEvent::new(kind, execution, payload));
    }

    fn emit_terminal(&self, execution: &ChainExecution) {
        let (kind, payload) = match execution.status() {
            ExecutionStatus::Completed => (
                ChainEventKind::Completed,
                json!({ "completed_steps": execution.completed_steps() }),
            ),
            ExecutionStatus::Failed => {
                info!(
                    execution_id = %execution.id(),
                    error = execution.error().unwrap_or_default(),
                    "Chain execution failed"
                );
                (
                    ChainEventKind::Failed,
                    json!({
                        "error": execution.error(),
                        "failed_steps": execution.failed_steps(),
                    }),
                )
            }
            _ => return,
        };
        self.emit(kind, execution, payload);
    }

    fn spawn_driver(self: &Arc<Self>, id: ExecutionId, tenant_id: TenantId) {
        let controller = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = controller.drive(&id, &tenant_id).await {
                error!(execution_id = %id, error = %e, "Chain execution driver stopped with error");
            }
        });
    }

    /// Get or create the writer slot for an execution
    async fn slot(&self, id: &ExecutionId) -> Arc<Mutex<ExecutionSlot>> {
        {
            let slots = self.slots.read().await;
            if let Some(slot) = slots.get(id.as_str()) {
                return slot.clone();
            }
        }

        let mut slots = self.slots.write().await;
        slots.entry(id.to_string()).or_default().clone()
    }

    async fn release_if_terminal(&self, execution: &ChainExecution) {
        if execution.is_terminal() {
            self.slots.write().await.remove(execution.id().as_str());
        }
    }

    /// Drop a slot that no task holds and no driver owns
    ///
    /// Clones are only handed out under the map lock, so a strong count of two
    /// (the map and `slot`) means nobody else can be waiting on it.
    async fn release_idle(&self, id: &ExecutionId, slot: Arc<Mutex<ExecutionSlot>>) {
        let mut slots = self.slots.write().await;
        let idle = slots
            .get(id.as_str())
            .is_some_and(|current| Arc::ptr_eq(current, &slot))
            && Arc::strong_count(&slot) == 2
            && slot.try_lock().is_ok_and(|guard| !guard.driving);
        if idle {
            slots.remove(id.as_str());
        }
    }
}

fn failure_payload(outcome: &StepOutcome, error: &str) -> Value {
    if outcome.result.is_null() {
        json!({ "error": error })
    } else {
        outcome.result.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::chain::action::Action;
    use crate::domain::chain::cache::mock::MemoryChainCache;
    use crate::domain::chain::condition::Condition;
    use crate::domain::chain::events::mock::RecordingSink;
    use crate::domain::chain::invoker::mock::ScriptedInvoker;
    use crate::domain::chain::store::mock::MockChainStore;
    use crate::domain::DomainError;

    struct Harness {
        controller: Arc<ChainController>,
        store: Arc<MockChainStore>,
        invoker: Arc<ScriptedInvoker>,
        sink: Arc<RecordingSink>,
    }

    fn harness(invoker: ScriptedInvoker) -> Harness {
        harness_with_config(invoker, ControllerConfig::default())
    }

    fn harness_with_config(invoker: ScriptedInvoker, config: ControllerConfig) -> Harness {
        let store = Arc::new(MockChainStore::new());
        let invoker = Arc::new(invoker);
        let sink = Arc::new(RecordingSink::new());
        let controller = Arc::new(ChainController::new(
            store.clone(),
            Arc::new(MemoryChainCache::new()),
            invoker.clone(),
            sink.clone(),
            config,
        ));

        Harness {
            controller,
            store,
            invoker,
            sink,
        }
    }

    fn tenant() -> TenantId {
        TenantId::new("acme").unwrap()
    }

    fn sid(id: &str) -> StepId {
        StepId::new(id).unwrap()
    }

    /// Step `id` invokes workflow `wf-<id>`
    fn step(id: &str, order: usize) -> ChainStep {
        ChainStep::new(sid(id), format!("wf-{}", id), order)
    }

    fn ids(steps: &[StepId]) -> Vec<&str> {
        steps.iter().map(StepId::as_str).collect()
    }

    async fn create(h: &Harness, steps: Vec<ChainStep>) -> ChainDefinition {
        create_with(h, ChainDefinition::new(tenant(), "Test chain").with_steps(steps)).await
    }

    async fn create_with(h: &Harness, definition: ChainDefinition) -> ChainDefinition {
        h.controller.create_chain(definition).await.unwrap()
    }

    async fn run(h: &Harness, chain: &ChainDefinition) -> ChainExecution {
        h.controller
            .run_chain(chain.id(), &tenant(), "user-1", HashMap::new())
            .await
            .unwrap()
    }

    async fn wait_until<F: Fn() -> bool>(condition: F) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    async fn wait_for_status(h: &Harness, id: &ExecutionId, status: ExecutionStatus) -> ChainExecution {
        let store = h.store.clone();
        let target = id.clone();
        wait_until(move || {
            store
                .stored_execution(&target)
                .is_some_and(|e| e.status() == status)
        })
        .await;
        h.store.stored_execution(id).unwrap()
    }

    #[tokio::test]
    async fn test_all_steps_succeed() {
        let h = harness(ScriptedInvoker::new());
        let chain = create(&h, vec![step("s1", 0), step("s2", 1), step("s3", 2)]).await;

        let execution = run(&h, &chain).await;

        assert_eq!(execution.status(), ExecutionStatus::Completed);
        assert_eq!(execution.completed_steps().len(), 3);
        assert_eq!(execution.current_step(), 3);
        assert!(execution.failed_steps().is_empty());
        assert!(execution.end_time().is_some());
        assert_eq!(h.invoker.calls(), vec!["wf-s1", "wf-s2", "wf-s3"]);
        assert_eq!(
            h.sink.names(),
            vec!["started", "step:completed", "step:completed", "step:completed", "completed"]
        );
    }

    #[tokio::test]
    async fn test_stop_on_failure() {
        let h = harness(
            ScriptedInvoker::new().with_outcomes("wf-s2", vec![StepOutcome::failure("card declined")]),
        );
        let chain = create(
            &h,
            vec![
                step("s1", 0),
                step("s2", 1).with_on_failure(vec![Action::Stop]),
                step("s3", 2),
            ],
        )
        .await;

        let execution = run(&h, &chain).await;

        assert_eq!(execution.status(), ExecutionStatus::Failed);
        assert_eq!(ids(execution.completed_steps()), vec!["s1"]);
        assert_eq!(ids(execution.failed_steps()), vec!["s2"]);
        assert_eq!(h.invoker.call_count("wf-s3"), 0);
        assert_eq!(execution.error(), Some("Step 's2' failed: card declined"));
        assert_eq!(h.sink.names().last(), Some(&"failed"));
    }

    #[tokio::test]
    async fn test_retry_then_succeed() {
        let h = harness(ScriptedInvoker::new().with_outcomes(
            "wf-s1",
            vec![StepOutcome::failure("flaky"), StepOutcome::success(json!("ok"))],
        ));
        let chain = create(
            &h,
            vec![step("s1", 0).with_on_failure(vec![Action::Retry]), step("s2", 1)],
        )
        .await;

        let execution = run(&h, &chain).await;

        assert_eq!(execution.status(), ExecutionStatus::Completed);
        assert_eq!(ids(execution.completed_steps()), vec!["s1", "s2"]);
        assert!(execution.failed_steps().is_empty());
        assert_eq!(h.invoker.call_count("wf-s1"), 2);
        assert_eq!(execution.attempts(&sid("s1")), 2);
        assert_eq!(execution.result("s1"), Some(&json!("ok")));
    }

    #[tokio::test]
    async fn test_pause_between_steps_then_resume() {
        let invoker = ScriptedInvoker::new();
        let gate = invoker.gate("wf-s1");
        let h = harness(invoker);
        let chain = create(&h, vec![step("s1", 0), step("s2", 1), step("s3", 2)]).await;

        let started = h
            .controller
            .execute_chain(chain.id(), &tenant(), "user-1", HashMap::new())
            .await
            .unwrap();
        let id = started.id().clone();

        let invoker = h.invoker.clone();
        wait_until(move || invoker.call_count("wf-s1") == 1).await;

        let paused = h.controller.pause(&id, &tenant()).await.unwrap();
        assert_eq!(paused.status(), ExecutionStatus::Paused);
        gate.notify_one();

        let store = h.store.clone();
        let target = id.clone();
        wait_until(move || {
            store
                .stored_execution(&target)
                .is_some_and(|e| e.current_step() == 1)
        })
        .await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        let execution = h.controller.get_execution(&id, &tenant()).await.unwrap();
        assert_eq!(execution.status(), ExecutionStatus::Paused);
        assert_eq!(execution.current_step(), 1);
        assert_eq!(ids(execution.completed_steps()), vec!["s1"]);
        assert_eq!(h.invoker.call_count("wf-s2"), 0);

        h.controller.resume(&id, &tenant()).await.unwrap();
        let finished = wait_for_status(&h, &id, ExecutionStatus::Completed).await;

        assert_eq!(finished.completed_steps().len(), 3);
        assert_eq!(h.invoker.call_count("wf-s1"), 1);
        assert_eq!(h.invoker.calls(), vec!["wf-s1", "wf-s2", "wf-s3"]);
        assert!(h.sink.names().contains(&"paused"));
        assert!(h.sink.names().contains(&"resumed"));
    }

    #[tokio::test]
    async fn test_rollback_runs_in_reverse() {
        let h = harness(ScriptedInvoker::new().with_outcomes(
            "wf-s2",
            vec![StepOutcome::failure("inventory unavailable")],
        ));
        let definition = ChainDefinition::new(tenant(), "Order")
            .with_steps(vec![
                step("s1", 0),
                step("s2", 1).with_on_failure(vec![Action::Rollback]),
            ])
            .with_rollback_steps(vec![step("rb1", 0), step("rb2", 1)]);
        let chain = create_with(&h, definition).await;

        let execution = run(&h, &chain).await;

        assert_eq!(execution.status(), ExecutionStatus::Failed);
        assert_eq!(h.invoker.calls(), vec!["wf-s1", "wf-s2", "wf-rb2", "wf-rb1"]);

        let report = execution.rollback().unwrap();
        assert_eq!(report.entries.len(), 2);
        assert_eq!(report.entries[0].step_id, "rb2");

        let names = h.sink.names();
        let rollback_at = names.iter().position(|n| *n == "rollback:completed").unwrap();
        let failed_at = names.iter().position(|n| *n == "failed").unwrap();
        assert!(rollback_at < failed_at);
    }

    #[tokio::test]
    async fn test_false_condition_skips_without_recording() {
        let h = harness(ScriptedInvoker::new());
        let definition = ChainDefinition::new(tenant(), "Conditional")
            .with_variable("premium", json!(false))
            .with_steps(vec![
                step("s1", 0),
                step("s2", 1).with_condition(Condition::custom("$premium == true")),
                step("s3", 2),
            ]);
        let chain = create_with(&h, definition).await;

        let execution = run(&h, &chain).await;

        assert_eq!(execution.status(), ExecutionStatus::Completed);
        assert_eq!(execution.current_step(), 3);
        assert_eq!(ids(execution.completed_steps()), vec!["s1", "s3"]);
        assert!(execution.failed_steps().is_empty());
        assert_eq!(h.invoker.call_count("wf-s2"), 0);
        assert!(h.sink.names().contains(&"step:skipped"));
    }

    #[tokio::test]
    async fn test_input_variables_drive_conditions() {
        let h = harness(ScriptedInvoker::new());
        let definition = ChainDefinition::new(tenant(), "Conditional")
            .with_variable("premium", json!(false))
            .with_steps(vec![step("s1", 0).with_condition(Condition::custom("$premium"))]);
        let chain = create_with(&h, definition).await;

        let mut input = HashMap::new();
        input.insert("premium".to_string(), json!(true));
        let execution = h
            .controller
            .run_chain(chain.id(), &tenant(), "user-1", input)
            .await
            .unwrap();

        assert_eq!(ids(execution.completed_steps()), vec!["s1"]);
    }

    #[tokio::test]
    async fn test_arithmetic_condition_on_variables() {
        let h = harness(ScriptedInvoker::new());
        let definition = ChainDefinition::new(tenant(), "Arithmetic")
            .with_variable("a", json!(5))
            .with_variable("b", json!(1))
            .with_steps(vec![
                step("s1", 0).with_condition(Condition::custom("$a-$b > 0")),
                step("s2", 1).with_condition(Condition::custom("$b-1 > 0")),
            ]);
        let chain = create_with(&h, definition).await;

        let execution = run(&h, &chain).await;

        assert_eq!(execution.status(), ExecutionStatus::Completed);
        assert_eq!(ids(execution.completed_steps()), vec!["s1"]);
        assert_eq!(h.invoker.calls(), vec!["wf-s1"]);
    }

    #[tokio::test]
    async fn test_failure_condition_runs_after_failure() {
        let h = harness(ScriptedInvoker::new().with_outcomes("wf-s1", vec![StepOutcome::failure("x")]));
        let chain = create(
            &h,
            vec![
                step("s1", 0).with_on_failure(vec![Action::Continue]),
                step("notify", 1).with_condition(Condition::Failure),
                step("s3", 2).with_condition(Condition::Success),
            ],
        )
        .await;

        let execution = run(&h, &chain).await;

        assert_eq!(execution.status(), ExecutionStatus::Completed);
        assert_eq!(ids(execution.failed_steps()), vec!["s1"]);
        assert_eq!(ids(execution.completed_steps()), vec!["notify"]);
        assert_eq!(h.invoker.call_count("wf-s3"), 0);
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let failures = (0..10).map(|_| StepOutcome::failure("boom")).collect();
        let h = harness(ScriptedInvoker::new().with_outcomes("wf-s1", failures));
        let chain = create(
            &h,
            vec![step("s1", 0).with_retries(2).with_on_failure(vec![Action::Retry])],
        )
        .await;

        let execution = run(&h, &chain).await;

        assert_eq!(execution.status(), ExecutionStatus::Failed);
        assert_eq!(h.invoker.call_count("wf-s1"), 3);
        assert_eq!(execution.error(), Some("step 's1' exhausted 2 retries: boom"));
    }

    #[tokio::test]
    async fn test_default_retry_limit_applies() {
        let failures = (0..10).map(|_| StepOutcome::failure("boom")).collect();
        let config = ControllerConfig {
            default_max_retries: 1,
            ..ControllerConfig::default()
        };
        let h = harness_with_config(ScriptedInvoker::new().with_outcomes("wf-s1", failures), config);
        let chain = create(&h, vec![step("s1", 0).with_on_failure(vec![Action::Retry])]).await;

        run(&h, &chain).await;

        assert_eq!(h.invoker.call_count("wf-s1"), 2);
    }

    #[tokio::test]
    async fn test_step_timeout_counts_as_failure() {
        let h = harness(ScriptedInvoker::new().with_delay("wf-s1", Duration::from_millis(500)));
        let chain = create(&h, vec![step("s1", 0).with_timeout_ms(20), step("s2", 1)]).await;

        let execution = run(&h, &chain).await;

        assert_eq!(execution.status(), ExecutionStatus::Failed);
        assert_eq!(ids(execution.failed_steps()), vec!["s1"]);
        assert!(execution.error().unwrap().contains("step 's1' timed out after 20ms"));
        assert_eq!(h.invoker.call_count("wf-s2"), 0);
    }

    #[tokio::test]
    async fn test_no_failure_handler_is_fatal() {
        let h = harness(ScriptedInvoker::new().with_outcomes("wf-s1", vec![StepOutcome::failure("nope")]));
        let chain = create(&h, vec![step("s1", 0), step("s2", 1)]).await;

        let execution = run(&h, &chain).await;

        assert_eq!(execution.status(), ExecutionStatus::Failed);
        assert_eq!(execution.result("s1"), Some(&json!({"error": "nope"})));
        assert_eq!(h.invoker.call_count("wf-s2"), 0);
    }

    #[tokio::test]
    async fn test_continue_on_failure_tolerates() {
        let h = harness(ScriptedInvoker::new().with_outcomes("wf-s1", vec![StepOutcome::failure("meh")]));
        let chain = create(
            &h,
            vec![step("s1", 0).with_on_failure(vec![Action::Continue]), step("s2", 1)],
        )
        .await;

        let execution = run(&h, &chain).await;

        assert_eq!(execution.status(), ExecutionStatus::Completed);
        assert_eq!(ids(execution.failed_steps()), vec!["s1"]);
        assert_eq!(ids(execution.completed_steps()), vec!["s2"]);
    }

    #[tokio::test]
    async fn test_skip_on_success_moves_to_next_step() {
        let h = harness(ScriptedInvoker::new());
        let chain = create(
            &h,
            vec![
                step("s1", 0).with_on_success(vec![Action::Skip]),
                step("s2", 1),
                step("s3", 2).with_on_success(vec![Action::Skip]),
            ],
        )
        .await;

        let execution = run(&h, &chain).await;

        assert_eq!(execution.status(), ExecutionStatus::Completed);
        assert_eq!(h.invoker.calls(), vec!["wf-s1", "wf-s2", "wf-s3"]);
        assert_eq!(execution.current_step(), 3);
    }

    #[tokio::test]
    async fn test_stop_on_success_completes_early() {
        let h = harness(ScriptedInvoker::new());
        let chain = create(
            &h,
            vec![step("s1", 0).with_on_success(vec![Action::Stop]), step("s2", 1)],
        )
        .await;

        let execution = run(&h, &chain).await;

        assert_eq!(execution.status(), ExecutionStatus::Completed);
        assert_eq!(h.invoker.call_count("wf-s2"), 0);
    }

    #[tokio::test]
    async fn test_branch_moves_cursor() {
        let h = harness(ScriptedInvoker::new());
        let chain = create(
            &h,
            vec![
                step("s1", 0).with_on_success(vec![Action::branch(Condition::Always, 2)]),
                step("s2", 1),
                step("s3", 2),
            ],
        )
        .await;

        let execution = run(&h, &chain).await;

        assert_eq!(h.invoker.calls(), vec!["wf-s1", "wf-s3"]);
        assert_eq!(execution.current_step(), 3);
    }

    #[tokio::test]
    async fn test_branch_on_result_via_output_variable() {
        let h = harness(ScriptedInvoker::new().with_outcomes(
            "wf-check",
            vec![StepOutcome::success(json!({"score": 90}))],
        ));
        let chain = create(
            &h,
            vec![
                step("check", 0)
                    .with_output_variable("check_result")
                    .with_on_success(vec![Action::branch(
                        Condition::custom("$check_result.score >= 80"),
                        2,
                    )]),
                step("manual-review", 1),
                step("approve", 2),
            ],
        )
        .await;

        let execution = run(&h, &chain).await;

        assert_eq!(h.invoker.call_count("wf-manual-review"), 0);
        assert_eq!(
            execution.variables().get("check_result"),
            Some(&json!({"score": 90}))
        );
    }

    #[tokio::test]
    async fn test_branch_cycle_hits_transition_budget() {
        let config = ControllerConfig {
            max_transitions_per_run: 10,
            ..ControllerConfig::default()
        };
        let h = harness_with_config(ScriptedInvoker::new(), config);
        let chain = create(
            &h,
            vec![
                step("s1", 0),
                step("s2", 1).with_on_success(vec![Action::branch(Condition::Always, 0)]),
            ],
        )
        .await;

        let execution = run(&h, &chain).await;

        assert_eq!(execution.status(), ExecutionStatus::Failed);
        assert!(execution.error().unwrap().contains("exceeded 10 step transitions"));
        assert_eq!(h.invoker.calls().len(), 10);
    }

    #[tokio::test]
    async fn test_terminal_execution_is_immutable() {
        let h = harness(ScriptedInvoker::new());
        let chain = create(&h, vec![step("s1", 0)]).await;
        let execution = run(&h, &chain).await;
        let id = execution.id().clone();

        assert!(matches!(
            h.controller.pause(&id, &tenant()).await,
            Err(ChainError::InvalidTransition { .. })
        ));
        assert!(matches!(
            h.controller.resume(&id, &tenant()).await,
            Err(ChainError::InvalidTransition { .. })
        ));
        assert!(matches!(
            h.controller.cancel(&id, &tenant()).await,
            Err(ChainError::InvalidTransition { .. })
        ));
        assert!(matches!(
            h.controller
                .add_step_result(&id, &tenant(), &sid("s1"), StepOutcome::success(json!(1)))
                .await,
            Err(ChainError::InvalidTransition { .. })
        ));

        let history = h.store.status_history(&id);
        let first_terminal = history.iter().position(|s| s.is_terminal()).unwrap();
        assert_eq!(first_terminal, history.len() - 1);
    }

    #[tokio::test]
    async fn test_cancel_paused_execution() {
        let h = harness(ScriptedInvoker::new());
        let chain = create(&h, vec![step("s1", 0), step("s2", 1)]).await;

        let execution = h
            .controller
            .start_execution(chain.id(), &tenant(), "user-1", HashMap::new())
            .await
            .unwrap();
        let id = execution.id().clone();

        h.controller.pause(&id, &tenant()).await.unwrap();
        let driven = h.controller.drive(&id, &tenant()).await.unwrap();
        assert_eq!(driven.status(), ExecutionStatus::Paused);

        let cancelled = h.controller.cancel(&id, &tenant()).await.unwrap();
        assert_eq!(cancelled.status(), ExecutionStatus::Cancelled);
        assert!(cancelled.end_time().is_some());
        assert!(h.invoker.calls().is_empty());
        assert!(h.controller.resume(&id, &tenant()).await.is_err());
    }

    #[tokio::test]
    async fn test_cancel_discards_in_flight_step() {
        let invoker = ScriptedInvoker::new();
        let gate = invoker.gate("wf-s1");
        let h = harness(invoker);
        let chain = create(&h, vec![step("s1", 0), step("s2", 1)]).await;

        let started = h
            .controller
            .execute_chain(chain.id(), &tenant(), "user-1", HashMap::new())
            .await
            .unwrap();
        let id = started.id().clone();

        let invoker = h.invoker.clone();
        wait_until(move || invoker.call_count("wf-s1") == 1).await;

        h.controller.cancel(&id, &tenant()).await.unwrap();
        gate.notify_one();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let execution = h.controller.get_execution(&id, &tenant()).await.unwrap();
        assert_eq!(execution.status(), ExecutionStatus::Cancelled);
        assert!(execution.completed_steps().is_empty());
        assert_eq!(h.invoker.call_count("wf-s2"), 0);
    }

    #[tokio::test]
    async fn test_resume_requires_paused() {
        let h = harness(ScriptedInvoker::new());
        let chain = create(&h, vec![step("s1", 0)]).await;
        let execution = h
            .controller
            .start_execution(chain.id(), &tenant(), "user-1", HashMap::new())
            .await
            .unwrap();

        let err = h.controller.resume(execution.id(), &tenant()).await.unwrap_err();
        assert_eq!(err.to_string(), "Cannot resume execution in 'running' state");
    }

    #[tokio::test]
    async fn test_other_tenant_sees_not_found() {
        let h = harness(ScriptedInvoker::new());
        let chain = create(&h, vec![step("s1", 0)]).await;
        let execution = run(&h, &chain).await;
        let other = TenantId::new("globex").unwrap();

        assert!(matches!(
            h.controller.get_execution(execution.id(), &other).await,
            Err(ChainError::NotFound { kind: "Execution", .. })
        ));
        assert!(matches!(
            h.controller.get_chain(chain.id(), &other).await,
            Err(ChainError::NotFound { kind: "Chain", .. })
        ));
        assert!(
            h.controller
                .run_chain(chain.id(), &other, "intruder", HashMap::new())
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_tenants_share_chain_id_namespace_independently() {
        let h = harness(ScriptedInvoker::new());
        let id = ChainId::new("payments").unwrap();
        let other = TenantId::new("globex").unwrap();

        create_with(
            &h,
            ChainDefinition::with_id(id.clone(), tenant(), "Acme payments")
                .with_step(step("s1", 0)),
        )
        .await;
        assert!(matches!(
            h.controller.get_chain(&id, &other).await,
            Err(ChainError::NotFound { kind: "Chain", .. })
        ));

        create_with(
            &h,
            ChainDefinition::with_id(id.clone(), other.clone(), "Globex payments")
                .with_step(step("s1", 0)),
        )
        .await;

        let ours = h.controller.get_chain(&id, &tenant()).await.unwrap();
        let theirs = h.controller.get_chain(&id, &other).await.unwrap();
        assert_eq!(ours.name(), "Acme payments");
        assert_eq!(theirs.name(), "Globex payments");

        h.controller.delete_chain(&id, &other).await.unwrap();
        assert_eq!(
            h.controller.get_chain(&id, &tenant()).await.unwrap().name(),
            "Acme payments"
        );
    }

    #[tokio::test]
    async fn test_inactive_chain_cannot_start() {
        let h = harness(ScriptedInvoker::new());
        let chain = create(&h, vec![step("s1", 0)]).await;
        h.controller
            .set_chain_active(chain.id(), &tenant(), false)
            .await
            .unwrap();

        let result = h
            .controller
            .run_chain(chain.id(), &tenant(), "user-1", HashMap::new())
            .await;

        assert!(matches!(result, Err(ChainError::Validation(_))));
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_definition() {
        let h = harness(ScriptedInvoker::new());
        let result = h
            .controller
            .create_chain(ChainDefinition::new(tenant(), "Gappy").with_steps(vec![step("a", 0), step("b", 2)]))
            .await;

        assert!(matches!(result, Err(ChainError::Validation(_))));
        assert!(h.controller.list_chains(&tenant()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_does_not_affect_started_execution() {
        let h = harness(ScriptedInvoker::new());
        let chain = create(&h, vec![step("s1", 0)]).await;
        let execution = h
            .controller
            .start_execution(chain.id(), &tenant(), "user-1", HashMap::new())
            .await
            .unwrap();

        let mut changed = h.controller.get_chain(chain.id(), &tenant()).await.unwrap();
        changed.set_steps(vec![step("other", 0)], vec![]);
        let updated = h.controller.update_chain(changed).await.unwrap();
        assert_eq!(updated.version(), 2);

        let finished = h.controller.drive(execution.id(), &tenant()).await.unwrap();

        assert_eq!(h.invoker.calls(), vec!["wf-s1"]);
        assert_eq!(finished.definition().version(), 1);
    }

    #[tokio::test]
    async fn test_add_step_result_records_without_moving_cursor() {
        let h = harness(ScriptedInvoker::new());
        let chain = create(&h, vec![step("s1", 0).with_output_variable("approval"), step("s2", 1)]).await;
        let execution = h
            .controller
            .start_execution(chain.id(), &tenant(), "user-1", HashMap::new())
            .await
            .unwrap();
        let id = execution.id().clone();

        let updated = h
            .controller
            .add_step_result(&id, &tenant(), &sid("s2"), StepOutcome::failure("rejected"))
            .await
            .unwrap();
        assert_eq!(ids(updated.failed_steps()), vec!["s2"]);
        assert_eq!(updated.current_step(), 0);

        let updated = h
            .controller
            .add_step_result(&id, &tenant(), &sid("s1"), StepOutcome::success(json!("yes")))
            .await
            .unwrap();
        assert_eq!(ids(updated.completed_steps()), vec!["s1"]);
        assert_eq!(updated.variables().get("approval"), Some(&json!("yes")));
        assert!(h.sink.names().contains(&"step:failed"));

        let missing = h
            .controller
            .add_step_result(&id, &tenant(), &sid("ghost"), StepOutcome::success(json!(null)))
            .await;
        assert!(matches!(missing, Err(ChainError::NotFound { kind: "Step", .. })));
    }

    #[tokio::test]
    async fn test_store_failure_is_propagated() {
        let h = harness(ScriptedInvoker::new());
        let chain = create(&h, vec![step("s1", 0)]).await;
        let execution = h
            .controller
            .start_execution(chain.id(), &tenant(), "user-1", HashMap::new())
            .await
            .unwrap();

        h.store.fail_with("database unavailable");
        let result = h.controller.drive(execution.id(), &tenant()).await;

        assert!(matches!(
            result,
            Err(ChainError::Domain(DomainError::Storage { .. }))
        ));
    }

    #[tokio::test]
    async fn test_list_and_delete_chains() {
        let h = harness(ScriptedInvoker::new());
        let first = create(&h, vec![step("s1", 0)]).await;
        create(&h, vec![step("s1", 0)]).await;

        assert_eq!(h.controller.list_chains(&tenant()).await.unwrap().len(), 2);

        h.controller.delete_chain(first.id(), &tenant()).await.unwrap();
        assert_eq!(h.controller.list_chains(&tenant()).await.unwrap().len(), 1);
        assert!(h.controller.get_chain(first.id(), &tenant()).await.is_err());
        assert!(h.controller.delete_chain(first.id(), &tenant()).await.is_err());
    }

    #[tokio::test]
    async fn test_list_executions() {
        let h = harness(ScriptedInvoker::new());
        let chain = create(&h, vec![step("s1", 0)]).await;
        run(&h, &chain).await;
        run(&h, &chain).await;

        let executions = h
            .controller
            .list_executions(&tenant(), chain.id())
            .await
            .unwrap();
        assert_eq!(executions.len(), 2);
    }

    #[tokio::test]
    async fn test_rejected_operations_leave_no_slots() {
        let h = harness(ScriptedInvoker::new());
        let chain = create(&h, vec![step("s1", 0)]).await;
        let execution = run(&h, &chain).await;
        let unknown = ExecutionId::new("exec-missing").unwrap();

        assert!(h.controller.pause(&unknown, &tenant()).await.is_err());
        assert!(h.controller.cancel(execution.id(), &tenant()).await.is_err());
        assert!(
            h.controller
                .add_step_result(execution.id(), &tenant(), &sid("s1"), StepOutcome::success(json!(1)))
                .await
                .is_err()
        );

        assert!(h.controller.slots.read().await.is_empty());
    }
}
