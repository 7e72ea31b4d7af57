//! Workflow chain domain - definitions, executions and the execution controller

pub mod action;
mod cache;
mod condition;
mod controller;
mod entity;
mod error;
mod events;
pub mod expression;
mod execution;
mod invoker;
mod rollback;
mod store;
mod validation;

pub use action::{Action, ActionOutcome, ControlDirective};
pub use cache::ChainCache;
pub use condition::Condition;
pub use controller::{ChainController, ControllerConfig};
pub use entity::{ChainDefinition, ChainId, ChainKey, ChainStep, StepId, TenantId, MAX_ID_LENGTH};
pub use error::ChainError;
pub use events::{ChainEvent, ChainEventKind, EventSink};
pub use execution::{ChainExecution, ExecutionId, ExecutionStatus};
pub use invoker::{StepInvoker, StepOutcome};
pub use rollback::{RollbackCoordinator, RollbackEntry, RollbackReport};
pub use store::ChainStore;
pub use validation::{expression_warnings, validate_chain, ChainValidationError};
