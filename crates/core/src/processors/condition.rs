use super::{config_object, loose_eq, object, ProcessorEnv, StepOutcome, StepProcessor};
use crate::error::{EngineError, Result};
use crate::types::{DataContext, StepId, StepType};
use crate::workflow::Step;
use serde_json::{json, Value};
use std::cmp::Ordering;

/// Routes the run to one of two steps based on a single comparison.
///
/// Config:
/// ```json
/// {"condition": {"field": "amount", "operator": "greater_than", "value": 100,
///                "true_step": "review", "false_step": "approve"}}
/// ```
/// `true_step`/`false_step` are also accepted next to `condition`. When the
/// chosen branch is not configured the step's first successor is used.
pub struct ConditionProcessor;

/// Supported comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Equals,
    NotEquals,
    GreaterThan,
    LessThan,
}

impl Operator {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "equals" => Some(Self::Equals),
            "not_equals" => Some(Self::NotEquals),
            "greater_than" => Some(Self::GreaterThan),
            "less_than" => Some(Self::LessThan),
            _ => None,
        }
    }

    pub fn evaluate(&self, actual: &Value, expected: &Value) -> Result<bool> {
        match self {
            Self::Equals => Ok(loose_eq(actual, expected)),
            Self::NotEquals => Ok(!loose_eq(actual, expected)),
            Self::GreaterThan => Ok(order(actual, expected)? == Ordering::Greater),
            Self::LessThan => Ok(order(actual, expected)? == Ordering::Less),
        }
    }
}

fn order(actual: &Value, expected: &Value) -> Result<Ordering> {
    let ordering = match (actual, expected) {
        (Value::Number(a), Value::Number(b)) => a
            .as_f64()
            .zip(b.as_f64())
            .and_then(|(a, b)| a.partial_cmp(&b)),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    };
    ordering.ok_or_else(|| {
        EngineError::StepExecutionFailed(format!("Cannot compare {} with {}", actual, expected))
    })
}

/// Look up a branch key inside `condition`, falling back to the top level of the config
fn branch(config: &DataContext, key: &str) -> Option<StepId> {
    config_object(config, "condition")
        .and_then(|condition| condition.get(key))
        .or_else(|| config.get(key))
        .and_then(Value::as_str)
        .map(StepId::new)
}

/// Every step a condition config can branch to
pub fn branch_targets(config: &DataContext) -> Vec<StepId> {
    ["true_step", "false_step"]
        .into_iter()
        .filter_map(|key| branch(config, key))
        .collect()
}

#[async_trait::async_trait]
impl StepProcessor for ConditionProcessor {
    fn step_type(&self) -> StepType {
        StepType::Condition
    }

    async fn process(
        &self,
        step: &Step,
        context: &DataContext,
        env: &ProcessorEnv,
    ) -> Result<StepOutcome> {
        env.simulate(0.2).await?;

        let empty = DataContext::new();
        let condition = config_object(&step.config, "condition").unwrap_or(&empty);
        let field = condition.get("field").and_then(Value::as_str).unwrap_or_default();
        let operator_name = condition
            .get("operator")
            .and_then(Value::as_str)
            .unwrap_or("equals");
        let expected = condition.get("value").cloned().unwrap_or(Value::Null);

        let actual = context.get(field).ok_or_else(|| {
            EngineError::StepValidationFailed(format!("Condition field '{}' not found", field))
        })?;

        let operator = Operator::parse(operator_name).ok_or_else(|| {
            EngineError::StepExecutionFailed(format!(
                "Unsupported condition operator '{}'",
                operator_name
            ))
        })?;
        let result = operator.evaluate(actual, &expected)?;

        let next_step = branch(
            &step.config,
            if result { "true_step" } else { "false_step" },
        );

        Ok(StepOutcome::new(object([
            ("condition_result", json!(result)),
            ("field_value", actual.clone()),
            ("expected_value", expected),
        ]))
        .with_next_step(next_step))
    }
}
