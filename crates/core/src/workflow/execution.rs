use super::definition::{ElapsedSeconds, Step};
use crate::types::{DataContext, ExecutionId, ExecutionStatus, LogLevel, StepId, WorkflowId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One line of an execution's own log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    pub step_id: Option<StepId>,
}

/// The record of a single run of a workflow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Execution {
    pub execution_id: ExecutionId,
    pub workflow_id: WorkflowId,
    pub status: ExecutionStatus,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    /// Seconds between `start_time` and `end_time`, set once terminal
    pub duration: Option<f64>,
    pub steps_executed: Vec<Step>,
    pub current_step: Option<Step>,
    pub error_message: Option<String>,
    pub input_data: DataContext,
    /// Working document shared by every step of the run
    pub context: DataContext,
    pub output_data: DataContext,
    pub execution_log: Vec<LogEntry>,
}

impl Execution {
    pub fn new(workflow_id: WorkflowId, input_data: DataContext) -> Self {
        Self {
            execution_id: ExecutionId::new(),
            workflow_id,
            status: ExecutionStatus::Pending,
            start_time: None,
            end_time: None,
            duration: None,
            steps_executed: Vec::new(),
            current_step: None,
            error_message: None,
            context: input_data.clone(),
            input_data,
            output_data: DataContext::new(),
            execution_log: Vec::new(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Append a log entry attributed to the current step, if any
    pub fn log(&mut self, level: LogLevel, message: impl Into<String>) {
        let step_id = self.current_step.as_ref().map(|step| step.id.clone());
        self.execution_log.push(LogEntry {
            timestamp: Utc::now(),
            level,
            message: message.into(),
            step_id,
        });
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.log(LogLevel::Info, message);
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.log(LogLevel::Warning, message);
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.log(LogLevel::Error, message);
    }

    pub(crate) fn mark_running(&mut self) {
        self.status = ExecutionStatus::Running;
        self.start_time = Some(Utc::now());
    }

    pub(crate) fn mark_failed(&mut self, error: impl Into<String>) {
        self.status = ExecutionStatus::Failed;
        self.error_message = Some(error.into());
    }

    /// Stamp the end of the run and drop the current-step pointer
    pub(crate) fn finish(&mut self) {
        let end = Utc::now();
        self.end_time = Some(end);
        self.duration = self.start_time.map(|start| start.elapsed_seconds_until(end));
        self.current_step = None;
    }

    /// Ids of the steps that ran, in order
    pub fn executed_step_ids(&self) -> Vec<&str> {
        self.steps_executed
            .iter()
            .map(|step| step.id.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StepType;
    use serde_json::json;

    #[test]
    fn test_new_execution_seeds_context_from_input() {
        let mut input = DataContext::new();
        input.insert("doc".to_string(), json!("x.pdf"));

        let execution = Execution::new(WorkflowId::new(), input.clone());

        assert_eq!(execution.status, ExecutionStatus::Pending);
        assert_eq!(execution.context, input);
        assert_eq!(execution.input_data, input);
        assert!(execution.output_data.is_empty());
    }

    #[test]
    fn test_log_attributes_current_step() {
        let mut execution = Execution::new(WorkflowId::new(), DataContext::new());
        execution.info("before");
        execution.current_step = Some(Step::new("upload", "Upload", StepType::Input));
        execution.error("during");

        assert_eq!(execution.execution_log.len(), 2);
        assert!(execution.execution_log[0].step_id.is_none());
        assert_eq!(execution.execution_log[1].level, LogLevel::Error);
        assert_eq!(
            execution.execution_log[1].step_id,
            Some(StepId::new("upload"))
        );
    }

    #[test]
    fn test_finish_sets_duration_and_clears_current_step() {
        let mut execution = Execution::new(WorkflowId::new(), DataContext::new());
        execution.mark_running();
        execution.current_step = Some(Step::new("a", "A", StepType::Output));
        execution.finish();

        assert!(execution.current_step.is_none());
        assert!(execution.end_time.is_some());
        assert!(execution.duration.unwrap() >= 0.0);
    }

    #[test]
    fn test_serialized_field_names() {
        let execution = Execution::new(WorkflowId::new(), DataContext::new());
        let value = serde_json::to_value(&execution).unwrap();

        for field in [
            "execution_id",
            "workflow_id",
            "status",
            "steps_executed",
            "current_step",
            "execution_log",
            "input_data",
            "output_data",
        ] {
            assert!(value.get(field).is_some(), "missing field {}", field);
        }
        assert_eq!(value["status"], "pending");
    }
}
