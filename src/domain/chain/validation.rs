//! Chain definition validation

use std::collections::HashSet;
use std::fmt;

use super::action::Action;
use super::condition::Condition;
use super::entity::{ChainDefinition, ChainStep};
use super::error::ChainError;
use super::expression::Expression;

/// Maximum length for chain names
pub const MAX_CHAIN_NAME_LENGTH: usize = 200;

/// Chain validation errors
#[derive(Debug, Clone, PartialEq)]
pub enum ChainValidationError {
    /// Chain has no steps
    NoSteps,
    /// Chain name is empty or too long
    InvalidName { length: usize, max: usize },
    /// Sorted step orders are not `0..N-1`
    NonContiguousOrder { orders: Vec<usize> },
    /// Step id appears more than once
    DuplicateStepId { step_id: String },
    /// Step has no workflow reference
    MissingWorkflow { step_id: String },
    /// Rollback step has no workflow reference
    MissingRollbackWorkflow { step_id: String },
    /// Branch points outside the step list
    BranchOutOfRange { step_id: String, target: usize, steps: usize },
    /// Custom condition expression is empty
    EmptyExpression { step_id: String },
}

impl fmt::Display for ChainValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoSteps => write!(f, "Chain must have at least one step"),
            Self::InvalidName { length, max } => write!(
                f,
                "Chain name must be between 1 and {} characters, got {}",
                max, length
            ),
            Self::NonContiguousOrder { orders } => write!(
                f,
                "Step orders must be contiguous from 0, got {:?}",
                orders
            ),
            Self::DuplicateStepId { step_id } => {
                write!(f, "Duplicate step id '{}'", step_id)
            }
            Self::MissingWorkflow { step_id } => {
                write!(f, "Step '{}' has no workflow_id", step_id)
            }
            Self::MissingRollbackWorkflow { step_id } => {
                write!(f, "Rollback step '{}' has no workflow_id", step_id)
            }
            Self::BranchOutOfRange {
                step_id,
                target,
                steps,
            } => write!(
                f,
                "Step '{}' branches to index {} but the chain has {} steps",
                step_id, target, steps
            ),
            Self::EmptyExpression { step_id } => {
                write!(f, "Step '{}' has an empty custom expression", step_id)
            }
        }
    }
}

impl std::error::Error for ChainValidationError {}

impl From<ChainValidationError> for ChainError {
    fn from(error: ChainValidationError) -> Self {
        ChainError::validation(error.to_string())
    }
}

/// Validate a chain definition before it is persisted
pub fn validate_chain(definition: &ChainDefinition) -> Result<(), ChainValidationError> {
    let name_length = definition.name().trim().chars().count();
    if name_length == 0 || name_length > MAX_CHAIN_NAME_LENGTH {
        return Err(ChainValidationError::InvalidName {
            length: name_length,
            max: MAX_CHAIN_NAME_LENGTH,
        });
    }

    let steps = definition.steps();
    if steps.is_empty() {
        return Err(ChainValidationError::NoSteps);
    }

    let mut orders: Vec<usize> = steps.iter().map(ChainStep::order).collect();
    orders.sort_unstable();
    if orders.iter().enumerate().any(|(index, order)| index != *order) {
        return Err(ChainValidationError::NonContiguousOrder { orders });
    }

    let mut seen = HashSet::new();
    for step in steps {
        if !seen.insert(step.id().as_str()) {
            return Err(ChainValidationError::DuplicateStepId {
                step_id: step.id().to_string(),
            });
        }

        if step.workflow_id().is_none() {
            return Err(ChainValidationError::MissingWorkflow {
                step_id: step.id().to_string(),
            });
        }

        validate_step_logic(step, steps.len())?;
    }

    for step in definition.rollback_steps() {
        if step.workflow_id().is_none() {
            return Err(ChainValidationError::MissingRollbackWorkflow {
                step_id: step.id().to_string(),
            });
        }
    }

    Ok(())
}

fn validate_step_logic(step: &ChainStep, step_count: usize) -> Result<(), ChainValidationError> {
    if let Some(condition) = step.condition() {
        validate_condition(step, condition)?;
    }

    let actions = step
        .on_success()
        .into_iter()
        .flatten()
        .chain(step.on_failure().into_iter().flatten());

    for action in actions {
        if let Action::Branch {
            condition,
            target_step_index,
        } = action
        {
            if *target_step_index >= step_count {
                return Err(ChainValidationError::BranchOutOfRange {
                    step_id: step.id().to_string(),
                    target: *target_step_index,
                    steps: step_count,
                });
            }
            validate_condition(step, condition)?;
        }
    }

    Ok(())
}

fn validate_condition(step: &ChainStep, condition: &Condition) -> Result<(), ChainValidationError> {
    if let Condition::Custom { expression } = condition {
        if expression.trim().is_empty() {
            return Err(ChainValidationError::EmptyExpression {
                step_id: step.id().to_string(),
            });
        }
    }
    Ok(())
}

/// Parse check for custom expressions; failures are reported, not rejected,
/// because a malformed expression only ever evaluates to false
pub fn expression_warnings(definition: &ChainDefinition) -> Vec<String> {
    let mut warnings = Vec::new();

    for step in definition.steps() {
        let conditions = step.condition().into_iter().chain(
            step.on_success()
                .into_iter()
                .flatten()
                .chain(step.on_failure().into_iter().flatten())
                .filter_map(|action| match action {
                    Action::Branch { condition, .. } => Some(condition),
                    _ => None,
                }),
        );

        for condition in conditions {
            if let Condition::Custom { expression } = condition {
                if let Err(e) = Expression::parse(expression) {
                    warnings.push(format!("Step '{}': {}", step.id(), e));
                }
            }
        }
    }

    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::chain::entity::{StepId, TenantId};

    fn step(id: &str, order: usize) -> ChainStep {
        ChainStep::new(StepId::new(id).unwrap(), "wf", order)
    }

    fn chain(steps: Vec<ChainStep>) -> ChainDefinition {
        ChainDefinition::new(TenantId::new("acme").unwrap(), "Valid chain").with_steps(steps)
    }

    #[test]
    fn test_valid_chain() {
        let definition = chain(vec![step("b", 1), step("a", 0), step("c", 2)]);
        assert!(validate_chain(&definition).is_ok());
    }

    #[test]
    fn test_empty_steps() {
        assert_eq!(validate_chain(&chain(vec![])), Err(ChainValidationError::NoSteps));
    }

    #[test]
    fn test_empty_name() {
        let definition = ChainDefinition::new(TenantId::new("acme").unwrap(), "  ")
            .with_step(step("a", 0));
        assert!(matches!(
            validate_chain(&definition),
            Err(ChainValidationError::InvalidName { length: 0, .. })
        ));
    }

    #[test]
    fn test_order_gap() {
        let result = validate_chain(&chain(vec![step("a", 0), step("b", 2)]));
        assert_eq!(
            result,
            Err(ChainValidationError::NonContiguousOrder { orders: vec![0, 2] })
        );
    }

    #[test]
    fn test_order_duplicate() {
        let result = validate_chain(&chain(vec![step("a", 0), step("b", 0)]));
        assert!(matches!(result, Err(ChainValidationError::NonContiguousOrder { .. })));
    }

    #[test]
    fn test_order_not_starting_at_zero() {
        let result = validate_chain(&chain(vec![step("a", 1), step("b", 2)]));
        assert!(matches!(result, Err(ChainValidationError::NonContiguousOrder { .. })));
    }

    #[test]
    fn test_duplicate_step_id() {
        let result = validate_chain(&chain(vec![step("a", 0), step("a", 1)]));
        assert_eq!(
            result,
            Err(ChainValidationError::DuplicateStepId {
                step_id: "a".to_string()
            })
        );
    }

    #[test]
    fn test_missing_workflow() {
        let result = validate_chain(&chain(vec![step("a", 0).without_workflow()]));
        assert_eq!(
            result,
            Err(ChainValidationError::MissingWorkflow {
                step_id: "a".to_string()
            })
        );
    }

    #[test]
    fn test_rollback_step_missing_workflow() {
        let definition = chain(vec![step("a", 0)])
            .with_rollback_steps(vec![step("undo", 0).without_workflow()]);
        assert!(matches!(
            validate_chain(&definition),
            Err(ChainValidationError::MissingRollbackWorkflow { .. })
        ));
    }

    #[test]
    fn test_branch_out_of_range() {
        let definition = chain(vec![
            step("a", 0).with_on_success(vec![Action::branch(Condition::Always, 5)]),
            step("b", 1),
        ]);

        let err = validate_chain(&definition).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Step 'a' branches to index 5 but the chain has 2 steps"
        );
    }

    #[test]
    fn test_empty_custom_expression() {
        let definition = chain(vec![step("a", 0).with_condition(Condition::custom(" "))]);
        assert!(matches!(
            validate_chain(&definition),
            Err(ChainValidationError::EmptyExpression { .. })
        ));
    }

    #[test]
    fn test_into_chain_error() {
        let err: ChainError = ChainValidationError::NoSteps.into();
        assert_eq!(
            err.to_string(),
            "Invalid chain definition: Chain must have at least one step"
        );
    }

    #[test]
    fn test_expression_warnings() {
        let definition = chain(vec![
            step("a", 0).with_condition(Condition::custom("$x >")),
            step("b", 1).with_on_failure(vec![Action::branch(Condition::custom("$y == 1"), 0)]),
        ]);

        let warnings = expression_warnings(&definition);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].starts_with("Step 'a'"));
    }
}
