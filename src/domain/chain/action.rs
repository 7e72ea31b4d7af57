//! Post-step actions and the directive they resolve to

use std::fmt;

use serde::{Deserialize, Serialize};

use super::condition::Condition;
use super::execution::ChainExecution;

/// Action attached to a step's `on_success` / `on_failure` list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    Continue,
    Skip,
    Stop,
    Retry,
    Rollback,
    /// Move the cursor to `target_step_index` when `condition` holds
    Branch {
        condition: Condition,
        target_step_index: usize,
    },
}

impl Action {
    pub fn branch(condition: Condition, target_step_index: usize) -> Self {
        Self::Branch {
            condition,
            target_step_index,
        }
    }

    /// Directive carried by this action, `None` for branches
    pub fn directive(&self) -> Option<ControlDirective> {
        match self {
            Self::Continue => Some(ControlDirective::Continue),
            Self::Skip => Some(ControlDirective::Skip),
            Self::Stop => Some(ControlDirective::Stop),
            Self::Retry => Some(ControlDirective::Retry),
            Self::Rollback => Some(ControlDirective::Rollback),
            Self::Branch { .. } => None,
        }
    }
}

/// Control decision taken after a step finishes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ControlDirective {
    #[default]
    Continue,
    Skip,
    Stop,
    Retry,
    Rollback,
}

impl fmt::Display for ControlDirective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Continue => write!(f, "continue"),
            Self::Skip => write!(f, "skip"),
            Self::Stop => write!(f, "stop"),
            Self::Retry => write!(f, "retry"),
            Self::Rollback => write!(f, "rollback"),
        }
    }
}

/// Result of processing an action list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ActionOutcome {
    pub directive: ControlDirective,

    /// Cursor target set by the last matching branch before the directive
    pub branched_to: Option<usize>,
}

/// Resolve `actions` in order. The first directive-bearing action wins; branches
/// encountered before it record their target when their condition holds.
pub fn apply(actions: &[Action], execution: &ChainExecution) -> ActionOutcome {
    let mut outcome = ActionOutcome::default();

    for action in actions {
        if let Action::Branch {
            condition,
            target_step_index,
        } = action
        {
            if condition.evaluate(execution) {
                outcome.branched_to = Some(*target_step_index);
            }
            continue;
        }

        if let Some(directive) = action.directive() {
            outcome.directive = directive;
            break;
        }
    }

    outcome
}
