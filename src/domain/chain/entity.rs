//! Chain definition entities

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::action::Action;
use super::condition::Condition;
use super::error::ChainError;
use crate::domain::storage::StorageKey;

/// Maximum length for chain, step and tenant identifiers
pub const MAX_ID_LENGTH: usize = 64;

/// Alphanumeric with hyphens and underscores, must start alphanumeric
static ID_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9_-]*$").unwrap());

fn validate_identifier(kind: &str, id: &str) -> Result<(), ChainError> {
    if id.is_empty() {
        return Err(ChainError::validation(format!("{} ID cannot be empty", kind)));
    }

    if id.len() > MAX_ID_LENGTH {
        return Err(ChainError::validation(format!(
            "{} ID exceeds maximum length of {} characters",
            kind, MAX_ID_LENGTH
        )));
    }

    if !ID_PATTERN.is_match(id) {
        return Err(ChainError::validation(format!(
            "Invalid {} ID '{}': must be alphanumeric with hyphens or underscores",
            kind.to_lowercase(),
            id
        )));
    }

    Ok(())
}

/// Validated chain identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ChainId(String);

impl ChainId {
    pub fn new(id: impl Into<String>) -> Result<Self, ChainError> {
        let id = id.into();
        validate_identifier("Chain", &id)?;
        Ok(Self(id))
    }

    /// Generate a new chain ID with UUID
    pub fn generate() -> Self {
        Self(format!("chain-{}", uuid::Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ChainId {
    type Error = ChainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ChainId> for String {
    fn from(id: ChainId) -> Self {
        id.0
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Tenant-qualified chain key; chain ids are only unique within one tenant
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChainKey(String);

impl ChainKey {
    pub fn new(tenant_id: &TenantId, id: &ChainId) -> Self {
        Self(format!("{}/{}", tenant_id, id))
    }
}

impl fmt::Display for ChainKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl StorageKey for ChainKey {
    fn as_str(&self) -> &str {
        &self.0
    }
}

/// Step identifier, unique within a chain
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StepId(String);

impl StepId {
    pub fn new(id: impl Into<String>) -> Result<Self, ChainError> {
        let id = id.into();
        validate_identifier("Step", &id)?;
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for StepId {
    type Error = ChainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<StepId> for String {
    fn from(id: StepId) -> Self {
        id.0
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Owning tenant of chains and executions
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TenantId(String);

impl TenantId {
    pub fn new(id: impl Into<String>) -> Result<Self, ChainError> {
        let id = id.into();
        validate_identifier("Tenant", &id)?;
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for TenantId {
    type Error = ChainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<TenantId> for String {
    fn from(id: TenantId) -> Self {
        id.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn default_parameters() -> Value {
    Value::Object(Default::default())
}

/// A single unit of work in a chain
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChainStep {
    id: StepId,

    /// Workflow invoked by this step; required, checked by validation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    workflow_id: Option<String>,

    /// Zero-based position in the chain
    #[serde(default)]
    order: usize,

    /// Parameters passed verbatim to the step invoker
    #[serde(default = "default_parameters")]
    parameters: Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    condition: Option<Condition>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    on_success: Option<Vec<Action>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    on_failure: Option<Vec<Action>>,

    /// Per-invocation timeout in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    timeout_ms: Option<u64>,

    /// Maximum number of retries granted to `retry` actions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    retries: Option<u32>,

    /// Execution variable that receives the step result on success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    output_variable: Option<String>,
}

impl ChainStep {
    pub fn new(id: StepId, workflow_id: impl Into<String>, order: usize) -> Self {
        Self {
            id,
            workflow_id: Some(workflow_id.into()),
            order,
            parameters: default_parameters(),
            condition: None,
            on_success: None,
            on_failure: None,
            timeout_ms: None,
            retries: None,
            output_variable: None,
        }
    }

    // Builder methods

    pub fn without_workflow(mut self) -> Self {
        self.workflow_id = None;
        self
    }

    pub fn with_parameters(mut self, parameters: Value) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn with_on_success(mut self, actions: Vec<Action>) -> Self {
        self.on_success = Some(actions);
        self
    }

    pub fn with_on_failure(mut self, actions: Vec<Action>) -> Self {
        self.on_failure = Some(actions);
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = Some(retries);
        self
    }

    pub fn with_output_variable(mut self, name: impl Into<String>) -> Self {
        self.output_variable = Some(name.into());
        self
    }

    // Getters

    pub fn id(&self) -> &StepId {
        &self.id
    }

    pub fn workflow_id(&self) -> Option<&str> {
        self.workflow_id.as_deref().filter(|w| !w.trim().is_empty())
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn parameters(&self) -> &Value {
        &self.parameters
    }

    pub fn condition(&self) -> Option<&Condition> {
        self.condition.as_ref()
    }

    pub fn on_success(&self) -> Option<&[Action]> {
        self.on_success.as_deref()
    }

    pub fn on_failure(&self) -> Option<&[Action]> {
        self.on_failure.as_deref()
    }

    pub fn timeout_ms(&self) -> Option<u64> {
        self.timeout_ms
    }

    pub fn retries(&self) -> Option<u32> {
        self.retries
    }

    pub fn output_variable(&self) -> Option<&str> {
        self.output_variable.as_deref()
    }
}

/// A reusable chain of workflow steps with optional compensation steps
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainDefinition {
    id: ChainId,

    tenant_id: TenantId,

    name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,

    steps: Vec<ChainStep>,

    /// Compensation steps, executed in reverse order on rollback
    #[serde(default)]
    rollback_steps: Vec<ChainStep>,

    /// Default execution variables
    #[serde(default)]
    variables: HashMap<String, Value>,

    is_active: bool,

    /// Increments whenever steps change
    version: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    created_by: Option<String>,

    created_at: DateTime<Utc>,

    updated_at: DateTime<Utc>,
}

impl ChainDefinition {
    /// Create a new active chain with a generated ID
    pub fn new(tenant_id: TenantId, name: impl Into<String>) -> Self {
        Self::with_id(ChainId::generate(), tenant_id, name)
    }

    pub fn with_id(id: ChainId, tenant_id: TenantId, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            tenant_id,
            name: name.into(),
            description: None,
            steps: Vec::new(),
            rollback_steps: Vec::new(),
            variables: HashMap::new(),
            is_active: true,
            version: 1,
            created_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    // Builder methods

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_steps(mut self, steps: Vec<ChainStep>) -> Self {
        self.steps = steps;
        self
    }

    pub fn with_step(mut self, step: ChainStep) -> Self {
        self.steps.push(step);
        self
    }

    pub fn with_rollback_steps(mut self, steps: Vec<ChainStep>) -> Self {
        self.rollback_steps = steps;
        self
    }

    pub fn with_variables(mut self, variables: HashMap<String, Value>) -> Self {
        self.variables = variables;
        self
    }

    pub fn with_variable(mut self, name: impl Into<String>, value: Value) -> Self {
        self.variables.insert(name.into(), value);
        self
    }

    pub fn with_active(mut self, active: bool) -> Self {
        self.is_active = active;
        self
    }

    pub fn with_created_by(mut self, user_id: impl Into<String>) -> Self {
        self.created_by = Some(user_id.into());
        self
    }

    // Getters

    pub fn id(&self) -> &ChainId {
        &self.id
    }

    pub fn tenant_id(&self) -> &TenantId {
        &self.tenant_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn steps(&self) -> &[ChainStep] {
        &self.steps
    }

    pub fn step(&self, index: usize) -> Option<&ChainStep> {
        self.steps.get(index)
    }

    pub fn find_step(&self, id: &StepId) -> Option<&ChainStep> {
        self.steps.iter().find(|s| s.id() == id)
    }

    pub fn rollback_steps(&self) -> &[ChainStep] {
        &self.rollback_steps
    }

    pub fn variables(&self) -> &HashMap<String, Value> {
        &self.variables
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn created_by(&self) -> Option<&str> {
        self.created_by.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    pub fn belongs_to(&self, tenant_id: &TenantId) -> bool {
        &self.tenant_id == tenant_id
    }

    pub fn key(&self) -> ChainKey {
        ChainKey::new(&self.tenant_id, &self.id)
    }

    /// Arrange steps by their declared order; run after validation
    pub fn sort_steps(&mut self) {
        self.steps.sort_by_key(|s| s.order());
        self.rollback_steps.sort_by_key(|s| s.order());
    }

    // Setters (mutate and update timestamp)

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
        self.touch();
    }

    pub fn set_description(&mut self, description: Option<String>) {
        self.description = description;
        self.touch();
    }

    pub fn set_steps(&mut self, steps: Vec<ChainStep>, rollback_steps: Vec<ChainStep>) {
        self.steps = steps;
        self.rollback_steps = rollback_steps;
        self.increment_version();
    }

    pub fn set_variables(&mut self, variables: HashMap<String, Value>) {
        self.variables = variables;
        self.increment_version();
    }

    pub fn set_active(&mut self, active: bool) {
        self.is_active = active;
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    fn increment_version(&mut self) {
        self.version += 1;
        self.touch();
    }
}
