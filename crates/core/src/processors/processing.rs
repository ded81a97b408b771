use super::{config_f64, config_str, object, ProcessorEnv, StepOutcome, StepProcessor};
use crate::error::Result;
use crate::types::{DataContext, StepType};
use crate::workflow::Step;
use serde_json::{json, Value};

const DEFAULT_PROCESSING_TIME_SECS: f64 = 2.0;

/// Runs a named operation over the context.
///
/// Document and image operations are opaque to the engine; this processor only
/// reports what a real implementation would produce. It never fails.
pub struct ProcessingProcessor;

#[async_trait::async_trait]
impl StepProcessor for ProcessingProcessor {
    fn step_type(&self) -> StepType {
        StepType::Processing
    }

    async fn process(
        &self,
        step: &Step,
        context: &DataContext,
        env: &ProcessorEnv,
    ) -> Result<StepOutcome> {
        let processing_time =
            config_f64(&step.config, "processing_time").unwrap_or(DEFAULT_PROCESSING_TIME_SECS);
        env.simulate(processing_time).await?;

        let operation = config_str(&step.config, "operation").unwrap_or("default");
        tracing::debug!(
            execution_id = %env.execution_id,
            step_id = %step.id,
            operation,
            "Running processing operation"
        );

        let lookup = |key: &str, default: Value| context.get(key).cloned().unwrap_or(default);

        let output = match operation {
            "document_processing" => object([
                ("processed_document", json!(true)),
                ("document_type", lookup("document_type", json!("unknown"))),
                ("pages_processed", lookup("page_count", json!(1))),
                ("processing_result", json!("success")),
            ]),
            "image_analysis" => object([
                ("analyzed_image", json!(true)),
                ("image_format", lookup("image_format", json!("unknown"))),
                (
                    "analysis_result",
                    json!({
                        "brightness": 142,
                        "dominant_color": "#3b82f6",
                        "objects_detected": 3
                    }),
                ),
            ]),
            other => object([
                ("processed", json!(true)),
                ("operation", json!(other)),
                ("result", json!("completed")),
            ]),
        };

        Ok(StepOutcome::new(output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processors::tests::{context, env, step};

    #[tokio::test]
    async fn test_document_processing_reads_context() {
        let step = step(
            StepType::Processing,
            json!({"operation": "document_processing"}),
        );
        let ctx = context(json!({"document_type": "pdf", "page_count": 12}));

        let outcome = ProcessingProcessor.process(&step, &ctx, &env()).await.unwrap();

        assert_eq!(outcome.output["processed_document"], true);
        assert_eq!(outcome.output["document_type"], "pdf");
        assert_eq!(outcome.output["pages_processed"], 12);
    }

    #[tokio::test]
    async fn test_image_analysis_defaults() {
        let step = step(StepType::Processing, json!({"operation": "image_analysis"}));

        let outcome = ProcessingProcessor
            .process(&step, &DataContext::new(), &env())
            .await
            .unwrap();

        assert_eq!(outcome.output["image_format"], "unknown");
        assert_eq!(outcome.output["analysis_result"]["objects_detected"], 3);
    }

    #[tokio::test]
    async fn test_unknown_operation_is_generic() {
        let step = step(StepType::Processing, json!({"operation": "ocr"}));

        let outcome = ProcessingProcessor
            .process(&step, &DataContext::new(), &env())
            .await
            .unwrap();

        assert_eq!(outcome.output["processed"], true);
        assert_eq!(outcome.output["operation"], "ocr");
    }

    #[tokio::test(start_paused = true)]
    async fn test_simulated_latency_uses_processing_time() {
        let step = step(StepType::Processing, json!({"processing_time": 3}));
        let env = ProcessorEnv {
            simulate_latency: true,
            ..env()
        };

        let started = tokio::time::Instant::now();
        ProcessingProcessor
            .process(&step, &DataContext::new(), &env)
            .await
            .unwrap();

        assert!(started.elapsed() >= std::time::Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_unrepresentable_processing_time_fails_step() {
        let step = step(StepType::Processing, json!({"processing_time": 1e30}));
        let env = ProcessorEnv {
            simulate_latency: true,
            ..env()
        };

        let err = ProcessingProcessor
            .process(&step, &DataContext::new(), &env)
            .await
            .unwrap_err();

        assert!(matches!(err, crate::error::EngineError::StepExecutionFailed(_)));
        assert!(err.to_string().starts_with("Invalid processing time"));
    }
}
