use super::{config_str, object, ProcessorEnv, StepOutcome, StepProcessor};
use crate::error::Result;
use crate::types::{DataContext, StepType};
use crate::workflow::Step;
use serde_json::{json, Value};

/// Projects selected context fields into an output document.
///
/// Config: `{"format": "json", "fields": ["a", "b"]}`. Without `fields` every
/// current context key is projected. Fields missing from the context are left out.
pub struct OutputProcessor;

#[async_trait::async_trait]
impl StepProcessor for OutputProcessor {
    fn step_type(&self) -> StepType {
        StepType::Output
    }

    async fn process(
        &self,
        step: &Step,
        context: &DataContext,
        env: &ProcessorEnv,
    ) -> Result<StepOutcome> {
        env.simulate(1.0).await?;

        let format = config_str(&step.config, "format").unwrap_or("json");

        let projected: DataContext = match step.config.get("fields").and_then(Value::as_array) {
            Some(fields) => fields
                .iter()
                .filter_map(Value::as_str)
                .filter_map(|field| {
                    context
                        .get(field)
                        .map(|value| (field.to_string(), value.clone()))
                })
                .collect(),
            None => context.clone(),
        };

        Ok(StepOutcome::new(object([
            ("output_generated", json!(true)),
            ("format", json!(format)),
            ("output_data", Value::Object(projected)),
        ])))
    }
}
