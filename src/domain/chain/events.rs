//! Lifecycle events and the sink contract

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::entity::{ChainId, TenantId};
use super::execution::{ChainExecution, ExecutionId};

/// Lifecycle event names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChainEventKind {
    #[serde(rename = "started")]
    Started,
    #[serde(rename = "step:completed")]
    StepCompleted,
    #[serde(rename = "step:failed")]
    StepFailed,
    #[serde(rename = "step:skipped")]
    StepSkipped,
    #[serde(rename = "paused")]
    Paused,
    #[serde(rename = "resumed")]
    Resumed,
    #[serde(rename = "completed")]
    Completed,
    #[serde(rename = "failed")]
    Failed,
    #[serde(rename = "cancelled")]
    Cancelled,
    #[serde(rename = "rollback:completed")]
    RollbackCompleted,
}

impl ChainEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::StepCompleted => "step:completed",
            Self::StepFailed => "step:failed",
            Self::StepSkipped => "step:skipped",
            Self::Paused => "paused",
            Self::Resumed => "resumed",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::RollbackCompleted => "rollback:completed",
        }
    }

    /// Last event an execution emits
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for ChainEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One lifecycle notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainEvent {
    pub event: ChainEventKind,
    pub execution_id: ExecutionId,
    pub chain_id: ChainId,
    pub tenant_id: TenantId,
    pub timestamp: DateTime<Utc>,
    pub payload: Value,
}

impl ChainEvent {
    pub fn new(kind: ChainEventKind, execution: &ChainExecution, payload: Value) -> Self {
        Self {
            event: kind,
            execution_id: execution.id().clone(),
            chain_id: execution.chain_id().clone(),
            tenant_id: execution.tenant_id().clone(),
            timestamp: Utc::now(),
            payload,
        }
    }

    pub fn name(&self) -> &'static str {
        self.event.as_str()
    }
}

/// Observer of lifecycle events
///
/// Delivery is best effort. `emit` must return quickly and must not fail the caller;
/// sinks with slow transports hand the event off to a background task.
pub trait EventSink: Send + Sync + fmt::Debug {
    fn emit(&self, event: &ChainEvent);
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::sync::Mutex;

    /// Sink that keeps every event in memory
    #[derive(Debug, Default)]
    pub struct RecordingSink {
        events: Mutex<Vec<ChainEvent>>,
    }

    impl RecordingSink {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn events(&self) -> Vec<ChainEvent> {
            self.events.lock().unwrap().clone()
        }

        pub fn names(&self) -> Vec<&'static str> {
            self.events.lock().unwrap().iter().map(|e| e.name()).collect()
        }
    }

    impl EventSink for RecordingSink {
        fn emit(&self, event: &ChainEvent) {
            self.events.lock().unwrap().push(event.clone());
        }
    }
}
