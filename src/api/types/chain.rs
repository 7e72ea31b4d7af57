//! Request and response bodies for chain and execution endpoints

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use validator::Validate;

use crate::domain::chain::{
    ChainDefinition, ChainExecution, ChainStep, ExecutionStatus, RollbackReport, StepOutcome,
};
use crate::infrastructure::services::{CreateChainRequest, UpdateChainRequest};

/// `POST /v1/chains`
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateChainBody {
    #[validate(length(min = 1, max = 64, message = "must be 1-64 characters"))]
    pub id: Option<String>,

    #[validate(length(min = 1, max = 200, message = "must be 1-200 characters"))]
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    #[validate(length(min = 1, message = "at least one step is required"))]
    pub steps: Vec<ChainStep>,

    #[serde(default)]
    pub rollback_steps: Vec<ChainStep>,

    #[serde(default)]
    pub variables: HashMap<String, Value>,

    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl From<CreateChainBody> for CreateChainRequest {
    fn from(body: CreateChainBody) -> Self {
        Self {
            id: body.id,
            name: body.name,
            description: body.description,
            steps: body.steps,
            rollback_steps: body.rollback_steps,
            variables: body.variables,
            is_active: body.is_active,
        }
    }
}

/// `PUT /v1/chains/{chain_id}`; absent fields are left untouched
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateChainBody {
    #[validate(length(min = 1, max = 200, message = "must be 1-200 characters"))]
    pub name: Option<String>,

    /// `null` clears the description
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,

    #[validate(length(min = 1, message = "at least one step is required"))]
    pub steps: Option<Vec<ChainStep>>,

    pub rollback_steps: Option<Vec<ChainStep>>,

    pub variables: Option<HashMap<String, Value>>,

    pub is_active: Option<bool>,
}

fn double_option<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

impl From<UpdateChainBody> for UpdateChainRequest {
    fn from(body: UpdateChainBody) -> Self {
        Self {
            name: body.name,
            description: body.description,
            steps: body.steps,
            rollback_steps: body.rollback_steps,
            variables: body.variables,
            is_active: body.is_active,
        }
    }
}

/// `POST /v1/chains/{chain_id}/executions`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExecuteChainBody {
    /// Merged over the chain's default variables
    #[serde(default)]
    pub variables: HashMap<String, Value>,
}

/// `POST /v1/executions/{execution_id}/steps/{step_id}/result`
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct StepResultBody {
    pub success: bool,

    #[serde(default)]
    pub result: Value,

    #[validate(length(max = 4096, message = "must be at most 4096 characters"))]
    pub error: Option<String>,
}

impl From<StepResultBody> for StepOutcome {
    fn from(body: StepResultBody) -> Self {
        if body.success {
            StepOutcome::success(body.result)
        } else {
            let outcome = match body.error {
                Some(error) => StepOutcome::failure(error),
                None => StepOutcome {
                    success: false,
                    result: Value::Null,
                    error: None,
                },
            };
            outcome.with_result(body.result)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainResponse {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub steps: Vec<ChainStep>,
    pub rollback_steps: Vec<ChainStep>,
    pub variables: HashMap<String, Value>,
    pub is_active: bool,
    pub version: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ChainDefinition> for ChainResponse {
    fn from(chain: ChainDefinition) -> Self {
        Self {
            id: chain.id().to_string(),
            tenant_id: chain.tenant_id().to_string(),
            name: chain.name().to_string(),
            description: chain.description().map(str::to_string),
            steps: chain.steps().to_vec(),
            rollback_steps: chain.rollback_steps().to_vec(),
            variables: chain.variables().clone(),
            is_active: chain.is_active(),
            version: chain.version(),
            created_by: chain.created_by().map(str::to_string),
            created_at: chain.created_at(),
            updated_at: chain.updated_at(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainListResponse {
    pub object: String,
    pub data: Vec<ChainResponse>,
}

impl ChainListResponse {
    pub fn new(chains: Vec<ChainDefinition>) -> Self {
        Self {
            object: "list".to_string(),
            data: chains.into_iter().map(ChainResponse::from).collect(),
        }
    }
}

/// Execution status view; the definition snapshot is omitted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResponse {
    pub id: String,
    pub chain_id: String,
    pub tenant_id: String,
    pub user_id: String,
    pub chain_version: u32,
    pub status: ExecutionStatus,
    pub current_step: usize,
    pub total_steps: usize,
    pub completed_steps: Vec<String>,
    pub failed_steps: Vec<String>,
    pub variables: HashMap<String, Value>,
    pub results: HashMap<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rollback: Option<RollbackReport>,
    pub start_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<ChainExecution> for ExecutionResponse {
    fn from(execution: ChainExecution) -> Self {
        Self {
            id: execution.id().to_string(),
            chain_id: execution.chain_id().to_string(),
            tenant_id: execution.tenant_id().to_string(),
            user_id: execution.user_id().to_string(),
            chain_version: execution.definition().version(),
            status: execution.status(),
            current_step: execution.current_step(),
            total_steps: execution.definition().step_count(),
            completed_steps: execution
                .completed_steps()
                .iter()
                .map(ToString::to_string)
                .collect(),
            failed_steps: execution
                .failed_steps()
                .iter()
                .map(ToString::to_string)
                .collect(),
            variables: execution.variables().clone(),
            results: execution.results().clone(),
            rollback: execution.rollback().cloned(),
            start_time: execution.start_time(),
            end_time: execution.end_time(),
            error: execution.error().map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionListResponse {
    pub object: String,
    pub data: Vec<ExecutionResponse>,
}

impl ExecutionListResponse {
    pub fn new(executions: Vec<ChainExecution>) -> Self {
        Self {
            object: "list".to_string(),
            data: executions.into_iter().map(ExecutionResponse::from).collect(),
        }
    }
}
