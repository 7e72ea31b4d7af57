//! Step gating conditions

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::execution::ChainExecution;
use super::expression::{Scope, evaluate_bool};

/// Decides whether a step runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Condition {
    /// Always run
    Always,

    /// Run only while no step has failed
    Success,

    /// Run only once some step has failed
    Failure,

    /// Run when the sandboxed expression is truthy
    Custom { expression: String },
}

impl Condition {
    pub fn custom(expression: impl Into<String>) -> Self {
        Self::Custom {
            expression: expression.into(),
        }
    }

    /// Evaluate against an execution; expression errors count as "not met"
    pub fn evaluate(&self, execution: &ChainExecution) -> bool {
        match self {
            Self::Always => true,
            Self::Success => !execution.has_failures(),
            Self::Failure => execution.has_failures(),
            Self::Custom { expression } => {
                let scope = Scope::new(execution.variables(), execution.results());
                match evaluate_bool(expression, &scope) {
                    Ok(result) => result,
                    Err(e) => {
                        warn!(
                            execution_id = %execution.id(),
                            expression = %expression,
                            error = %e,
                            "Custom condition failed to evaluate, treating as false"
                        );
                        false
                    }
                }
            }
        }
    }
}
