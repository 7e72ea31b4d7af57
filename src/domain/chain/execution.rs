//! Chain execution record and status lifecycle

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::entity::{ChainDefinition, ChainId, ChainStep, StepId, TenantId};
use super::error::ChainError;
use super::rollback::RollbackReport;
use crate::domain::storage::{StorageEntity, StorageKey};

static EXECUTION_ID_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9_-]{0,63}$").unwrap());

/// Execution identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ExecutionId(String);

impl ExecutionId {
    pub fn new(id: impl Into<String>) -> Result<Self, ChainError> {
        let id = id.into();
        if !EXECUTION_ID_PATTERN.is_match(&id) {
            return Err(ChainError::validation(format!(
                "Invalid execution ID '{}'",
                id
            )));
        }
        Ok(Self(id))
    }

    /// Generate a new execution ID with UUID
    pub fn generate() -> Self {
        Self(format!("exec-{}", uuid::Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ExecutionId {
    type Error = ChainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ExecutionId> for String {
    fn from(id: ExecutionId) -> Self {
        id.0
    }
}

impl fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for ExecutionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl StorageKey for ExecutionId {
    fn as_str(&self) -> &str {
        &self.0
    }
}

/// Status of a chain execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Steps are being driven
    #[default]
    Running,

    /// Halted at a safe point, waiting for resume
    Paused,

    /// All steps finished
    Completed,

    /// A step failure ended the execution
    Failed,

    /// Stopped by the caller
    Cancelled,
}

impl ExecutionStatus {
    /// Check if this status represents a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Check if this status can transition to another status
    pub fn can_transition_to(&self, target: ExecutionStatus) -> bool {
        match (self, target) {
            // From Running
            (Self::Running, Self::Paused) => true,
            (Self::Running, Self::Completed) => true,
            (Self::Running, Self::Failed) => true,
            (Self::Running, Self::Cancelled) => true,

            // From Paused
            (Self::Paused, Self::Running) => true,
            (Self::Paused, Self::Cancelled) => true,
            // The step that was in flight when pause arrived still settles the run
            (Self::Paused, Self::Completed) => true,
            (Self::Paused, Self::Failed) => true,

            // Terminal states cannot transition
            (Self::Completed, _) => false,
            (Self::Failed, _) => false,
            (Self::Cancelled, _) => false,

            _ => false,
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Paused => write!(f, "paused"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// One running instance of a chain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainExecution {
    id: ExecutionId,

    chain_id: ChainId,

    tenant_id: TenantId,

    user_id: String,

    /// Definition as it was when the execution started
    definition: ChainDefinition,

    status: ExecutionStatus,

    /// Zero-based cursor into the definition's steps
    current_step: usize,

    completed_steps: Vec<StepId>,

    failed_steps: Vec<StepId>,

    variables: HashMap<String, Value>,

    /// Last result per step id
    results: HashMap<String, Value>,

    /// Invocation attempts per step id
    #[serde(default)]
    attempts: HashMap<String, u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    rollback: Option<RollbackReport>,

    start_time: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    end_time: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,

    updated_at: DateTime<Utc>,
}

impl ChainExecution {
    /// Start a new execution of `definition`; input variables win over defaults
    pub fn new(
        definition: &ChainDefinition,
        user_id: impl Into<String>,
        input: HashMap<String, Value>,
    ) -> Self {
        let mut variables = definition.variables().clone();
        variables.extend(input);

        let now = Utc::now();
        Self {
            id: ExecutionId::generate(),
            chain_id: definition.id().clone(),
            tenant_id: definition.tenant_id().clone(),
            user_id: user_id.into(),
            definition: definition.clone(),
            status: ExecutionStatus::Running,
            current_step: 0,
            completed_steps: Vec::new(),
            failed_steps: Vec::new(),
            variables,
            results: HashMap::new(),
            attempts: HashMap::new(),
            rollback: None,
            start_time: now,
            end_time: None,
            error: None,
            updated_at: now,
        }
    }

    // Getters

    pub fn id(&self) -> &ExecutionId {
        &self.id
    }

    pub fn chain_id(&self) -> &ChainId {
        &self.chain_id
    }

    pub fn tenant_id(&self) -> &TenantId {
        &self.tenant_id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn definition(&self) -> &ChainDefinition {
        &self.definition
    }

    pub fn status(&self) -> ExecutionStatus {
        self.status
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn current_step(&self) -> usize {
        self.current_step
    }

    /// Step under the cursor, if the cursor is still inside the chain
    pub fn current_chain_step(&self) -> Option<&ChainStep> {
        self.definition.step(self.current_step)
    }

    pub fn completed_steps(&self) -> &[StepId] {
        &self.completed_steps
    }

    pub fn failed_steps(&self) -> &[StepId] {
        &self.failed_steps
    }

    pub fn has_failures(&self) -> bool {
        !self.failed_steps.is_empty()
    }

    pub fn variables(&self) -> &HashMap<String, Value> {
        &self.variables
    }

    pub fn results(&self) -> &HashMap<String, Value> {
        &self.results
    }

    pub fn result(&self, step_id: &str) -> Option<&Value> {
        self.results.get(step_id)
    }

    pub fn attempts(&self, step_id: &StepId) -> u32 {
        self.attempts.get(step_id.as_str()).copied().unwrap_or(0)
    }

    pub fn rollback(&self) -> Option<&RollbackReport> {
        self.rollback.as_ref()
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.end_time
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn belongs_to(&self, tenant_id: &TenantId) -> bool {
        &self.tenant_id == tenant_id
    }

    // Step bookkeeping

    /// Count one more invocation of `step_id` and return the new total
    pub fn record_attempt(&mut self, step_id: &StepId) -> u32 {
        let counter = self.attempts.entry(step_id.to_string()).or_insert(0);
        *counter += 1;
        *counter
    }

    /// Record a successful outcome; clears any earlier failure of the step
    pub fn record_success(&mut self, step_id: &StepId, result: Value) {
        self.results.insert(step_id.to_string(), result);
        self.failed_steps.retain(|id| id != step_id);
        if !self.completed_steps.contains(step_id) {
            self.completed_steps.push(step_id.clone());
        }
        self.touch();
    }

    /// Record a failed outcome; clears any earlier success of the step
    pub fn record_failure(&mut self, step_id: &StepId, result: Value) {
        self.results.insert(step_id.to_string(), result);
        self.completed_steps.retain(|id| id != step_id);
        if !self.failed_steps.contains(step_id) {
            self.failed_steps.push(step_id.clone());
        }
        self.touch();
    }

    pub fn set_variable(&mut self, name: impl Into<String>, value: Value) {
        self.variables.insert(name.into(), value);
        self.touch();
    }

    pub fn set_rollback(&mut self, report: RollbackReport) {
        self.rollback = Some(report);
        self.touch();
    }

    // Cursor movement

    /// Move to the next step; the cursor never passes the end of the chain
    pub fn advance(&mut self) {
        self.current_step = (self.current_step + 1).min(self.definition.step_count());
        self.touch();
    }

    pub fn jump_to(&mut self, index: usize) {
        self.current_step = index;
        self.touch();
    }

    pub fn has_remaining_steps(&self) -> bool {
        self.current_step < self.definition.step_count()
    }

    // Status transitions

    pub fn pause(&mut self) -> Result<(), ChainError> {
        self.transition("pause", ExecutionStatus::Paused)
    }

    pub fn resume(&mut self) -> Result<(), ChainError> {
        self.transition("resume", ExecutionStatus::Running)
    }

    pub fn cancel(&mut self) -> Result<(), ChainError> {
        self.transition("cancel", ExecutionStatus::Cancelled)?;
        self.end_time = Some(Utc::now());
        Ok(())
    }

    pub fn complete(&mut self) -> Result<(), ChainError> {
        self.transition("complete", ExecutionStatus::Completed)?;
        self.end_time = Some(Utc::now());
        Ok(())
    }

    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), ChainError> {
        self.transition("fail", ExecutionStatus::Failed)?;
        self.error = Some(error.into());
        self.end_time = Some(Utc::now());
        Ok(())
    }

    fn transition(&mut self, action: &'static str, target: ExecutionStatus) -> Result<(), ChainError> {
        if !self.status.can_transition_to(target) {
            return Err(ChainError::invalid_transition(action, self.status));
        }
        self.status = target;
        self.touch();
        Ok(())
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

impl StorageEntity for ChainExecution {
    type Key = ExecutionId;

    fn key(&self) -> &Self::Key {
        &self.id
    }
}
