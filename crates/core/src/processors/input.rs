use super::{config_object, object, ProcessorEnv, StepOutcome, StepProcessor};
use crate::error::{EngineError, Result};
use crate::types::{DataContext, StepType};
use crate::workflow::Step;
use serde_json::{json, Value};

/// Checks that the run was started with the fields the workflow needs.
///
/// Config: `{"input": {"required_fields": ["field", ...]}}`
pub struct InputProcessor;

#[async_trait::async_trait]
impl StepProcessor for InputProcessor {
    fn step_type(&self) -> StepType {
        StepType::Input
    }

    async fn process(
        &self,
        step: &Step,
        context: &DataContext,
        env: &ProcessorEnv,
    ) -> Result<StepOutcome> {
        env.simulate(1.0).await?;

        let required_fields = config_object(&step.config, "input")
            .and_then(|input| input.get("required_fields"))
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();

        for field in required_fields.iter().filter_map(Value::as_str) {
            if !context.contains_key(field) {
                return Err(EngineError::StepValidationFailed(format!(
                    "Required field '{}' not found in input",
                    field
                )));
            }
        }

        let input_fields: Vec<&String> = context.keys().collect();
        Ok(StepOutcome::new(object([
            ("processed_input", json!(true)),
            ("input_fields", json!(input_fields)),
            ("timestamp", json!(chrono::Utc::now().to_rfc3339())),
        ])))
    }
}
