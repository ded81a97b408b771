use super::{is_truthy, loose_eq, object, ProcessorEnv, StepOutcome, StepProcessor};
use crate::error::{EngineError, Result};
use crate::types::{DataContext, StepType};
use crate::workflow::Step;
use serde_json::{json, Value};

/// Evaluates field rules against the context.
///
/// Config:
/// ```json
/// {
///   "rules": [{"field": "document_type", "condition": "equals", "value": "pdf"},
///             {"field": "document_file", "condition": "not_empty"}],
///   "fail_on_validation_error": true
/// }
/// ```
pub struct ValidationProcessor;

impl ValidationProcessor {
    fn evaluate_rule(rule: &Value, context: &DataContext) -> Value {
        let field = rule.get("field").and_then(Value::as_str);
        let condition = rule.get("condition").and_then(Value::as_str);
        let expected = rule.get("value").unwrap_or(&Value::Null);

        let Some(actual) = field.and_then(|f| context.get(f)) else {
            return json!({"rule": rule, "passed": false, "error": "Field not found"});
        };

        let passed = match condition {
            Some("equals") => loose_eq(actual, expected),
            Some("not_empty") => is_truthy(actual),
            _ => false,
        };

        json!({"rule": rule, "passed": passed})
    }
}

#[async_trait::async_trait]
impl StepProcessor for ValidationProcessor {
    fn step_type(&self) -> StepType {
        StepType::Validation
    }

    async fn process(
        &self,
        step: &Step,
        context: &DataContext,
        env: &ProcessorEnv,
    ) -> Result<StepOutcome> {
        env.simulate(0.5).await?;

        let rules = step
            .config
            .get("rules")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();

        let results: Vec<Value> = rules
            .iter()
            .map(|rule| Self::evaluate_rule(rule, context))
            .collect();
        let failed = results
            .iter()
            .filter(|r| r["passed"] != Value::Bool(true))
            .count();
        let all_passed = failed == 0;

        let fail_on_error = step
            .config
            .get("fail_on_validation_error")
            .and_then(Value::as_bool)
            .unwrap_or(true);

        if !all_passed && fail_on_error {
            tracing::debug!(step_id = %step.id, failed, "Validation rules failed");
            return Err(EngineError::StepValidationFailed("Validation failed".to_string()));
        }

        let mut outcome = StepOutcome::new(object([
            ("validation_passed", json!(all_passed)),
            ("validation_results", json!(results)),
        ]));
        if !all_passed {
            outcome = outcome.with_warnings(vec![format!(
                "{} validation rule(s) failed; continuing because fail_on_validation_error is false",
                failed
            )]);
        }
        Ok(outcome)
    }
}
