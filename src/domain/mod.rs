//! Domain layer - Core business logic and entities

pub mod chain;
pub mod error;
pub mod storage;

pub use chain::{
    Action, ChainCache, ChainController, ChainDefinition, ChainError, ChainEvent, ChainEventKind,
    ChainExecution, ChainId, ChainStep, ChainStore, Condition, ControllerConfig, EventSink,
    ExecutionId, ExecutionStatus, StepId, StepInvoker, StepOutcome, TenantId,
};
pub use error::DomainError;
pub use storage::{Storage, StorageEntity, StorageKey};
