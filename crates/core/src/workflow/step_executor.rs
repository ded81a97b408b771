use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::processors::{ProcessorEnv, ProcessorRegistry, StepOutcome};
use crate::types::{DataContext, ExecutionId};
use crate::workflow::Step;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Result of dispatching one step
#[derive(Debug, Clone)]
pub enum StepResult {
    Completed(StepOutcome),
    Failed(String),
    /// The execution was cancelled while the step was running
    Cancelled,
}

/// Dispatches steps to their processors with timeout, cancellation and fault containment
pub struct StepExecutor {
    registry: Arc<ProcessorRegistry>,
    default_timeout: Option<Duration>,
    simulate_latency: bool,
}

impl StepExecutor {
    pub fn new(registry: Arc<ProcessorRegistry>, config: &EngineConfig) -> Self {
        Self {
            registry,
            default_timeout: config.step_timeout(),
            simulate_latency: config.simulate_latency,
        }
    }

    /// Execute a step against a snapshot of the run's context.
    ///
    /// Processor errors, timeouts and panics all come back as [`StepResult::Failed`].
    pub async fn execute(
        &self,
        execution_id: ExecutionId,
        step: &Step,
        context: &DataContext,
        cancel: &CancellationToken,
    ) -> StepResult {
        let Some(processor) = self.registry.get(step.step_type) else {
            let error = EngineError::UnknownStepType(step.step_type);
            tracing::warn!(%execution_id, step_id = %step.id, "{}", error);
            return StepResult::Failed(error.to_string());
        };

        let env = ProcessorEnv {
            execution_id,
            simulate_latency: self.simulate_latency,
        };
        let timeout = self.timeout_for(step);

        // Run on its own task so a panicking processor fails the step, not the run
        let task_step = step.clone();
        let task_context = context.clone();
        let mut handle = tokio::spawn(async move {
            let work = processor.process(&task_step, &task_context, &env);
            match timeout {
                Some(limit) => match tokio::time::timeout(limit, work).await {
                    Ok(result) => result,
                    Err(_) => Err(EngineError::StepExecutionFailed(format!(
                        "Step timed out after {} seconds",
                        limit.as_secs_f64()
                    ))),
                },
                None => work.await,
            }
        });

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                handle.abort();
                tracing::warn!(%execution_id, step_id = %step.id, "Step interrupted by cancellation");
                StepResult::Cancelled
            }
            joined = &mut handle => match joined {
                Ok(Ok(outcome)) => StepResult::Completed(outcome),
                Ok(Err(e)) => StepResult::Failed(e.to_string()),
                Err(join_error) => {
                    tracing::error!(%execution_id, step_id = %step.id, "Step processor aborted: {}", join_error);
                    StepResult::Failed(format!("Step processor crashed: {}", join_error))
                }
            },
        }
    }

    /// Per-step `timeout_secs` wins over the engine default. Values no `Duration` can hold are ignored.
    fn timeout_for(&self, step: &Step) -> Option<Duration> {
        step.config
            .get("timeout_secs")
            .and_then(Value::as_f64)
            .filter(|secs| *secs > 0.0)
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
            .or(self.default_timeout)
    }
}
