//! Compensation of failed executions

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::execution::ChainExecution;
use super::invoker::StepInvoker;

/// Outcome of one rollback step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollbackEntry {
    pub step_id: String,
    pub workflow_id: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Record of a compensation run, in execution order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollbackReport {
    pub entries: Vec<RollbackEntry>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RollbackReport {
    pub fn succeeded(&self) -> usize {
        self.entries.iter().filter(|e| e.success).count()
    }

    pub fn failed(&self) -> usize {
        self.entries.len() - self.succeeded()
    }
}

/// Runs a definition's rollback steps in reverse order
///
/// Compensation is best effort: every rollback step runs regardless of its own
/// condition or actions, and a failing step never stops the ones before it.
#[derive(Clone)]
pub struct RollbackCoordinator {
    invoker: Arc<dyn StepInvoker>,
    default_timeout: Option<Duration>,
}

impl std::fmt::Debug for RollbackCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RollbackCoordinator")
            .field("default_timeout", &self.default_timeout)
            .finish()
    }
}

impl RollbackCoordinator {
    pub fn new(invoker: Arc<dyn StepInvoker>) -> Self {
        Self {
            invoker,
            default_timeout: None,
        }
    }

    pub fn with_default_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub async fn rollback(&self, execution: &ChainExecution) -> RollbackReport {
        let started_at = Utc::now();
        let steps = execution.definition().rollback_steps();
        let mut entries = Vec::with_capacity(steps.len());

        info!(
            execution_id = %execution.id(),
            steps = steps.len(),
            "Starting rollback"
        );

        for step in steps.iter().rev() {
            let workflow_id = step.workflow_id().unwrap_or_default().to_string();
            let timeout = step
                .timeout_ms()
                .map(Duration::from_millis)
                .or(self.default_timeout);

            let invocation = self.invoker.invoke(&workflow_id, step.parameters());
            let result = match timeout {
                Some(limit) => match tokio::time::timeout(limit, invocation).await {
                    Ok(result) => result.map_err(|e| e.to_string()),
                    Err(_) => Err(format!("timed out after {}ms", limit.as_millis())),
                },
                None => invocation.await.map_err(|e| e.to_string()),
            };

            let error = match result {
                Ok(outcome) if outcome.success => None,
                Ok(outcome) => Some(outcome.error_message()),
                Err(e) => Some(e),
            };

            if let Some(error) = &error {
                warn!(
                    execution_id = %execution.id(),
                    step_id = %step.id(),
                    error = %error,
                    "Rollback step failed, continuing with remaining steps"
                );
            }

            entries.push(RollbackEntry {
                step_id: step.id().to_string(),
                workflow_id,
                success: error.is_none(),
                error,
            });
        }

        let report = RollbackReport {
            entries,
            started_at,
            finished_at: Utc::now(),
        };

        info!(
            execution_id = %execution.id(),
            succeeded = report.succeeded(),
            failed = report.failed(),
            "Rollback finished"
        );

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DomainError;
    use crate::domain::chain::entity::{ChainDefinition, ChainStep, StepId, TenantId};
    use crate::domain::chain::invoker::mock::ScriptedInvoker;
    use crate::domain::chain::invoker::{MockStepInvoker, StepOutcome};
    use crate::domain::chain::{Action, Condition};
    use serde_json::json;
    use std::collections::HashMap;

    fn step(id: &str, workflow: &str, order: usize) -> ChainStep {
        ChainStep::new(StepId::new(id).unwrap(), workflow, order)
    }

    fn execution(rollback_steps: Vec<ChainStep>) -> ChainExecution {
        let definition = ChainDefinition::new(TenantId::new("acme").unwrap(), "Rollback")
            .with_step(step("main", "wf-main", 0))
            .with_rollback_steps(rollback_steps);
        ChainExecution::new(&definition, "u", HashMap::new())
    }

    #[tokio::test]
    async fn test_runs_in_reverse_order() {
        let invoker = Arc::new(ScriptedInvoker::new());
        let coordinator = RollbackCoordinator::new(invoker.clone());
        let execution = execution(vec![
            step("rb1", "undo-1", 0),
            step("rb2", "undo-2", 1),
            step("rb3", "undo-3", 2),
        ]);

        let report = coordinator.rollback(&execution).await;

        assert_eq!(invoker.calls(), vec!["undo-3", "undo-2", "undo-1"]);
        assert_eq!(report.succeeded(), 3);
        assert_eq!(report.entries[0].step_id, "rb3");
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_remaining_steps() {
        let invoker = Arc::new(
            ScriptedInvoker::new().with_outcomes("undo-2", vec![StepOutcome::failure("refund api down")]),
        );
        let coordinator = RollbackCoordinator::new(invoker.clone());
        let execution = execution(vec![step("rb1", "undo-1", 0), step("rb2", "undo-2", 1)]);

        let report = coordinator.rollback(&execution).await;

        assert_eq!(invoker.calls(), vec!["undo-2", "undo-1"]);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.entries[0].error.as_deref(), Some("refund api down"));
        assert!(report.entries[1].success);
    }

    #[tokio::test]
    async fn test_invoker_errors_are_recorded() {
        let mut invoker = MockStepInvoker::new();
        invoker
            .expect_invoke()
            .times(2)
            .returning(|workflow_id, _| {
                if workflow_id == "undo-1" {
                    Ok(StepOutcome::success(json!(null)))
                } else {
                    Err(DomainError::invoker("http", "connection refused"))
                }
            });

        let coordinator = RollbackCoordinator::new(Arc::new(invoker));
        let execution = execution(vec![step("rb1", "undo-1", 0), step("rb2", "undo-2", 1)]);

        let report = coordinator.rollback(&execution).await;

        assert!(!report.entries[0].success);
        assert!(report.entries[0].error.as_ref().unwrap().contains("connection refused"));
        assert!(report.entries[1].success);
    }

    #[tokio::test]
    async fn test_ignores_step_conditions_and_actions() {
        let invoker = Arc::new(ScriptedInvoker::new());
        let coordinator = RollbackCoordinator::new(invoker.clone());
        let execution = execution(vec![
            step("rb1", "undo-1", 0)
                .with_condition(Condition::custom("false"))
                .with_on_success(vec![Action::Stop]),
        ]);

        coordinator.rollback(&execution).await;

        assert_eq!(invoker.call_count("undo-1"), 1);
    }

    #[tokio::test]
    async fn test_rollback_step_timeout() {
        let invoker = Arc::new(ScriptedInvoker::new().with_delay("slow-undo", Duration::from_millis(200)));
        let coordinator = RollbackCoordinator::new(invoker.clone());
        let execution = execution(vec![step("rb1", "slow-undo", 0).with_timeout_ms(10)]);

        let report = coordinator.rollback(&execution).await;

        assert_eq!(report.entries[0].error.as_deref(), Some("timed out after 10ms"));
    }

    #[tokio::test]
    async fn test_no_rollback_steps() {
        let coordinator = RollbackCoordinator::new(Arc::new(ScriptedInvoker::new()));
        let report = coordinator.rollback(&execution(vec![])).await;
        assert!(report.entries.is_empty());
    }
}
