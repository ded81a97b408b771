use super::definition::{Step, Workflow};
use super::execution::Execution;
use super::step_executor::{StepExecutor, StepResult};
use crate::error::EngineError;
use crate::events::{EventBus, EventType, ExecutionEvent};
use crate::types::{DataContext, ExecutionId, ExecutionStatus, StepId, WorkflowId};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, Semaphore};
use tokio_util::sync::CancellationToken;

/// How the traversal loop ended
enum RunEnd {
    Completed,
    Failed,
    Cancelled,
}

/// Drives one execution from admission to a terminal state.
///
/// The run owns a snapshot of the workflow taken at admission and clones every
/// step before mutating its run-state, so concurrent runs of the same workflow
/// never share step state.
pub(crate) struct Runner {
    pub workflow: Arc<Workflow>,
    pub record: Arc<Mutex<Execution>>,
    pub execution_id: ExecutionId,
    pub step_executor: Arc<StepExecutor>,
    pub events: EventBus,
    pub cancel: CancellationToken,
    pub step_delay: Duration,
    pub status_tx: Arc<watch::Sender<ExecutionStatus>>,
}

impl Runner {
    /// Run under a [`CrashGuard`], so a panicking driver still leaves a terminal record
    pub async fn run_supervised(self, permits: Arc<Semaphore>) {
        let guard = CrashGuard {
            record: self.record.clone(),
            execution_id: self.execution_id,
            workflow_id: self.workflow.id,
            events: self.events.clone(),
            status_tx: self.status_tx.clone(),
        };
        guard.watch(self.run(permits)).await;
    }

    /// Wait for a concurrency permit, then run to completion
    pub async fn run(self, permits: Arc<Semaphore>) {
        let permit = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            permit = permits.acquire_owned() => permit.ok(),
        };

        let Some(_permit) = permit else {
            self.finish_unstarted().await;
            return;
        };

        let end = self.traverse().await;
        self.finalize(end).await;
    }

    async fn traverse(&self) -> RunEnd {
        let input = {
            let mut record = self.record.lock().await;
            record.mark_running();
            record.info(format!("Starting workflow execution: {}", self.workflow.name));
            record.input_data.clone()
        };
        let _ = self.status_tx.send(ExecutionStatus::Running);
        tracing::info!(
            execution_id = %self.execution_id,
            workflow_id = %self.workflow.id,
            "Starting workflow execution: {}",
            self.workflow.name
        );
        self.publish(EventType::ExecutionStarted {
            workflow_name: self.workflow.name.clone(),
        });

        let mut context: DataContext = input;
        let mut current = self.workflow.start_step_id.clone();

        while let Some(step_id) = current.take() {
            if self.cancel.is_cancelled() {
                return RunEnd::Cancelled;
            }

            let Some(definition) = self.workflow.steps.get(&step_id) else {
                self.fail_dangling(&step_id).await;
                return RunEnd::Failed;
            };

            let mut step = definition.clone();
            step.begin(&context);
            {
                let mut record = self.record.lock().await;
                record.current_step = Some(step.clone());
                record.info(format!("Executing step: {}", step.name));
            }
            tracing::info!(execution_id = %self.execution_id, step_id = %step.id, "Executing step: {}", step.name);
            self.publish(EventType::StepStarted {
                step_id: step.id.clone(),
            });

            let result = self
                .step_executor
                .execute(self.execution_id, &step, &context, &self.cancel)
                .await;

            match result {
                StepResult::Completed(outcome) => {
                    context.extend(outcome.output.clone());
                    let next = outcome
                        .next_step
                        .clone()
                        .or_else(|| step.next_steps.first().cloned());
                    step.complete(outcome.output);

                    self.record_success(&step, &context, outcome.warnings).await;
                    self.publish(EventType::StepCompleted {
                        step_id: step.id.clone(),
                        duration_secs: step.duration.unwrap_or_default(),
                        next_step: next.clone(),
                    });
                    current = next;
                }
                StepResult::Failed(error) => {
                    step.fail(error.clone());
                    self.record_failure(step, &error).await;
                    return RunEnd::Failed;
                }
                StepResult::Cancelled => {
                    step.skip("Execution cancelled");
                    let mut record = self.record.lock().await;
                    record.current_step = Some(step);
                    return RunEnd::Cancelled;
                }
            }

            if current.is_some() && !self.step_delay.is_zero() {
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => return RunEnd::Cancelled,
                    _ = tokio::time::sleep(self.step_delay) => {}
                }
            }
        }

        let mut record = self.record.lock().await;
        record.output_data = context;
        RunEnd::Completed
    }

    async fn record_success(&self, step: &Step, context: &DataContext, warnings: Vec<String>) {
        let mut record = self.record.lock().await;
        record.current_step = Some(step.clone());
        for warning in warnings {
            record.warn(warning);
        }
        record.context = context.clone();
        record.steps_executed.push(step.clone());
        record.info(format!("Step {} completed successfully", step.name));
    }

    async fn record_failure(&self, step: Step, error: &str) {
        tracing::error!(
            execution_id = %self.execution_id,
            step_id = %step.id,
            "Step {} failed: {}",
            step.name,
            error
        );
        self.publish(EventType::StepFailed {
            step_id: step.id.clone(),
            error: error.to_string(),
        });

        let mut record = self.record.lock().await;
        record.current_step = Some(step.clone());
        record.error(format!("Step {} failed: {}", step.name, error));
        record.steps_executed.push(step);
        record.mark_failed(error);
    }

    /// A successor or branch target names a step the workflow does not have
    async fn fail_dangling(&self, step_id: &StepId) {
        let message = format!("Step '{}' not found in workflow", step_id);
        tracing::error!(execution_id = %self.execution_id, "{}", message);

        let mut record = self.record.lock().await;
        record.error(message.clone());
        record.mark_failed(EngineError::InvalidDefinition(message).to_string());
    }

    async fn finalize(&self, end: RunEnd) {
        let (status, duration, error) = {
            let mut record = self.record.lock().await;
            match end {
                RunEnd::Completed => {
                    record.status = ExecutionStatus::Completed;
                    record.info("Workflow execution completed successfully");
                }
                RunEnd::Cancelled => {
                    record.status = ExecutionStatus::Cancelled;
                    record.error_message = Some("Execution cancelled".to_string());
                    record.warn("Workflow execution cancelled");
                }
                RunEnd::Failed => {}
            }
            record.finish();
            (
                record.status,
                record.duration.unwrap_or_default(),
                record.error_message.clone(),
            )
        };

        match status {
            ExecutionStatus::Completed => {
                tracing::info!(execution_id = %self.execution_id, "Workflow execution completed");
                self.publish(EventType::ExecutionCompleted {
                    duration_secs: duration,
                });
            }
            ExecutionStatus::Cancelled => {
                tracing::warn!(execution_id = %self.execution_id, "Workflow execution cancelled");
                self.publish(EventType::ExecutionCancelled {
                    reason: "Cancellation requested".to_string(),
                });
            }
            _ => {
                let error = error.unwrap_or_else(|| "Unknown error".to_string());
                tracing::error!(execution_id = %self.execution_id, "Workflow execution failed: {}", error);
                self.publish(EventType::ExecutionFailed {
                    error,
                    duration_secs: duration,
                });
            }
        }

        let _ = self.status_tx.send(status);
    }

    /// Cancelled (or the engine shut down) before a permit was granted
    async fn finish_unstarted(&self) {
        {
            let mut record = self.record.lock().await;
            record.status = ExecutionStatus::Cancelled;
            record.error_message = Some("Execution cancelled before it started".to_string());
            record.warn("Workflow execution cancelled before it started");
            record.finish();
        }
        tracing::warn!(execution_id = %self.execution_id, "Workflow execution cancelled before it started");
        self.publish(EventType::ExecutionCancelled {
            reason: "Cancelled while waiting for a worker".to_string(),
        });
        let _ = self.status_tx.send(ExecutionStatus::Cancelled);
    }

    fn publish(&self, event_type: EventType) {
        self.events.publish(ExecutionEvent::new(
            self.execution_id,
            self.workflow.id,
            event_type,
        ));
    }
}

/// Marks an execution failed when its driver task dies without finishing it
pub(crate) struct CrashGuard {
    pub record: Arc<Mutex<Execution>>,
    pub execution_id: ExecutionId,
    pub workflow_id: WorkflowId,
    pub events: EventBus,
    pub status_tx: Arc<watch::Sender<ExecutionStatus>>,
}

impl CrashGuard {
    pub async fn watch<F>(self, run: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if let Err(join_error) = tokio::spawn(run).await {
            self.fail(format!("Workflow execution crashed: {}", join_error))
                .await;
        }
    }

    async fn fail(&self, error: String) {
        let duration = {
            let mut record = self.record.lock().await;
            if record.is_terminal() {
                let _ = self.status_tx.send(record.status);
                return;
            }
            record.error(error.clone());
            record.mark_failed(error.clone());
            record.finish();
            record.duration.unwrap_or_default()
        };

        tracing::error!(execution_id = %self.execution_id, "{}", error);
        self.events.publish(ExecutionEvent::new(
            self.execution_id,
            self.workflow_id,
            EventType::ExecutionFailed {
                error,
                duration_secs: duration,
            },
        ));
        let _ = self.status_tx.send(ExecutionStatus::Failed);
    }
}
