//! Step invoker contract

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::error::DomainError;

#[cfg(test)]
use mockall::automock;

/// Outcome of running one workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepOutcome {
    pub success: bool,

    #[serde(default)]
    pub result: Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepOutcome {
    pub fn success(result: Value) -> Self {
        Self {
            success: true,
            result,
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            result: Value::Null,
            error: Some(error.into()),
        }
    }

    pub fn with_result(mut self, result: Value) -> Self {
        self.result = result;
        self
    }

    /// Error text for a failed outcome
    pub fn error_message(&self) -> String {
        self.error
            .clone()
            .unwrap_or_else(|| "step reported failure without an error message".to_string())
    }
}

/// Runs one workflow with the step's parameters
///
/// Transport errors are returned as `Err`; the controller records them as a failed
/// attempt exactly like an `Ok` outcome with `success == false`.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait StepInvoker: Send + Sync {
    async fn invoke(&self, workflow_id: &str, parameters: &Value) -> Result<StepOutcome, DomainError>;
}
