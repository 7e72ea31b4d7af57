//! Chain engine error types

use thiserror::Error;

use crate::domain::DomainError;

/// Errors raised by chain definition handling and the execution controller
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("Invalid chain definition: {0}")]
    Validation(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Cannot {action} execution in '{status}' state")]
    InvalidTransition { action: &'static str, status: String },

    #[error("Step '{step}' failed: {message}")]
    StepExecution { step: String, message: String },

    #[error("{0}")]
    Fatal(String),

    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl ChainError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn chain_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "Chain",
            id: id.into(),
        }
    }

    pub fn execution_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "Execution",
            id: id.into(),
        }
    }

    pub fn step_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "Step",
            id: id.into(),
        }
    }

    pub fn invalid_transition(action: &'static str, status: impl ToString) -> Self {
        Self::InvalidTransition {
            action,
            status: status.to_string(),
        }
    }

    pub fn step_execution(step: impl Into<String>, message: impl Into<String>) -> Self {
        Self::StepExecution {
            step: step.into(),
            message: message.into(),
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal(message.into())
    }
}

impl From<ChainError> for DomainError {
    fn from(err: ChainError) -> Self {
        match err {
            ChainError::Validation(message) => DomainError::validation(message),
            ChainError::NotFound { kind, id } => {
                DomainError::not_found(format!("{} '{}' not found", kind, id))
            }
            e @ ChainError::InvalidTransition { .. } => DomainError::invalid_state(e.to_string()),
            e @ (ChainError::StepExecution { .. } | ChainError::Fatal(_)) => {
                DomainError::internal(e.to_string())
            }
            ChainError::Domain(inner) => inner,
        }
    }
}
