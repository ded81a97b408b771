use super::{config_object, config_str, object, ProcessorEnv, StepOutcome, StepProcessor};
use crate::error::Result;
use crate::types::{DataContext, StepType};
use crate::workflow::Step;
use serde_json::json;

/// Stands in for an outbound API call described by `{"api": {"url": ..., "method": "GET"}}`.
///
/// No request is sent; a synthetic 200 response is reported. A real client would
/// need its own retry and timeout policy.
pub struct ApiCallProcessor;

#[async_trait::async_trait]
impl StepProcessor for ApiCallProcessor {
    fn step_type(&self) -> StepType {
        StepType::ApiCall
    }

    async fn process(
        &self,
        step: &Step,
        _context: &DataContext,
        env: &ProcessorEnv,
    ) -> Result<StepOutcome> {
        env.simulate(1.5).await?;

        let empty = DataContext::new();
        let api = config_object(&step.config, "api").unwrap_or(&empty);
        let url = api.get("url").cloned().unwrap_or_default();
        let method = config_str(api, "method").unwrap_or("GET").to_uppercase();

        tracing::info!(
            execution_id = %env.execution_id,
            step_id = %step.id,
            %method,
            "Would call external API: {}",
            url
        );

        Ok(StepOutcome::new(object([
            ("api_call_completed", json!(true)),
            ("url", url),
            ("method", json!(method)),
            ("status_code", json!(200)),
            (
                "response_data",
                json!({
                    "success": true,
                    "message": "API call simulated successfully"
                }),
            ),
        ])))
    }
}
