use super::graph::WorkflowGraph;
use crate::error::{EngineError, Result};
use crate::types::{DataContext, StepId, StepStatus, StepType, WorkflowId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const DEFAULT_WORKFLOW_VERSION: &str = "1.0.0";

/// A node in a workflow graph, plus the run-state of its latest participation in an execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub id: StepId,
    pub name: String,
    #[serde(rename = "type")]
    pub step_type: StepType,
    #[serde(default)]
    pub config: DataContext,
    #[serde(default)]
    pub status: StepStatus,
    #[serde(default)]
    pub input_data: Option<DataContext>,
    #[serde(default)]
    pub output_data: Option<DataContext>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    /// Seconds between `start_time` and `end_time`
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub next_steps: Vec<StepId>,
    #[serde(default)]
    pub previous_steps: Vec<StepId>,
}

impl Step {
    pub fn new(id: impl Into<StepId>, name: impl Into<String>, step_type: StepType) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            step_type,
            config: DataContext::new(),
            status: StepStatus::Pending,
            input_data: None,
            output_data: None,
            error_message: None,
            start_time: None,
            end_time: None,
            duration: None,
            next_steps: Vec::new(),
            previous_steps: Vec::new(),
        }
    }

    /// Replace the configuration document. Anything other than a JSON object leaves it empty.
    pub fn with_config(mut self, config: serde_json::Value) -> Self {
        self.config = match config {
            serde_json::Value::Object(map) => map,
            _ => DataContext::new(),
        };
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.next_steps.is_empty()
    }

    /// Clear everything a previous run left behind
    pub fn reset_run_state(&mut self) {
        self.status = StepStatus::Pending;
        self.input_data = None;
        self.output_data = None;
        self.error_message = None;
        self.start_time = None;
        self.end_time = None;
        self.duration = None;
    }

    pub(crate) fn begin(&mut self, context: &DataContext) {
        self.reset_run_state();
        self.status = StepStatus::Running;
        self.start_time = Some(Utc::now());
        self.input_data = Some(context.clone());
    }

    pub(crate) fn complete(&mut self, output: DataContext) {
        self.status = StepStatus::Completed;
        self.output_data = Some(output);
        self.stop_clock();
    }

    pub(crate) fn fail(&mut self, error: impl Into<String>) {
        self.status = StepStatus::Failed;
        self.error_message = Some(error.into());
        self.stop_clock();
    }

    pub(crate) fn skip(&mut self, reason: impl Into<String>) {
        self.status = StepStatus::Skipped;
        self.error_message = Some(reason.into());
        self.stop_clock();
    }

    fn stop_clock(&mut self) {
        let end = Utc::now();
        self.end_time = Some(end);
        self.duration = self.start_time.map(|start| start.elapsed_seconds_until(end));
    }
}

/// A named, versioned graph of steps with a designated start step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: WorkflowId,
    pub name: String,
    pub description: String,
    pub steps: BTreeMap<StepId, Step>,
    pub start_step_id: Option<StepId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: String,
    pub is_active: bool,
    pub execution_count: u64,
}

impl Workflow {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: WorkflowId::new(),
            name: name.into(),
            description: description.into(),
            steps: BTreeMap::new(),
            start_step_id: None,
            created_at: now,
            updated_at: now,
            version: DEFAULT_WORKFLOW_VERSION.to_string(),
            is_active: true,
            execution_count: 0,
        }
    }

    /// Insert a step, replacing any step with the same id
    pub fn add_step(&mut self, step: Step) {
        self.steps.insert(step.id.clone(), step);
        self.touch();
    }

    /// Link `from` to `to`. Does nothing unless both steps already exist.
    pub fn connect_steps(&mut self, from: &str, to: &str) {
        if !self.steps.contains_key(from) || !self.steps.contains_key(to) {
            return;
        }

        if let Some(step) = self.steps.get_mut(from) {
            step.next_steps.push(StepId::new(to));
        }
        if let Some(step) = self.steps.get_mut(to) {
            step.previous_steps.push(StepId::new(from));
        }
        self.touch();
    }

    /// Designate the entry step. Does nothing if the step does not exist.
    pub fn set_start_step(&mut self, step_id: &str) {
        if self.steps.contains_key(step_id) {
            self.start_step_id = Some(StepId::new(step_id));
            self.touch();
        }
    }

    pub fn step(&self, step_id: &str) -> Option<&Step> {
        self.steps.get(step_id)
    }

    pub fn start_step(&self) -> Option<&Step> {
        self.start_step_id
            .as_ref()
            .and_then(|id| self.steps.get(id.as_str()))
    }

    /// Human-readable warnings about the graph shape. Never blocks execution.
    pub fn lint(&self) -> Vec<String> {
        WorkflowGraph::from_workflow(self).warnings()
    }

    /// Build a workflow from a definition document
    pub fn from_definition(definition: WorkflowDefinition) -> Result<Self> {
        if definition.steps.is_empty() {
            return Err(EngineError::InvalidDefinition(format!(
                "workflow '{}' has no steps",
                definition.name
            )));
        }

        let mut workflow = Workflow::new(definition.name, definition.description);
        if let Some(version) = definition.version {
            workflow.version = version;
        }
        if let Some(is_active) = definition.is_active {
            workflow.is_active = is_active;
        }

        let first_step = definition.steps[0].id.clone();
        for step in definition.steps {
            workflow.add_step(
                Step::new(step.id, step.name, step.step_type).with_config(step.config),
            );
        }

        for connection in &definition.connections {
            for endpoint in [&connection.from, &connection.to] {
                if !workflow.steps.contains_key(endpoint.as_str()) {
                    return Err(EngineError::InvalidDefinition(format!(
                        "connection references unknown step '{}'",
                        endpoint
                    )));
                }
            }
            workflow.connect_steps(connection.from.as_str(), connection.to.as_str());
        }

        let start = definition.start_step.unwrap_or(first_step);
        if !workflow.steps.contains_key(start.as_str()) {
            return Err(EngineError::InvalidDefinition(format!(
                "start step '{}' is not defined",
                start
            )));
        }
        workflow.set_start_step(start.as_str());

        Ok(workflow)
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Portable description of a workflow, as exchanged with host applications
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
    pub steps: Vec<StepDefinition>,
    #[serde(default)]
    pub connections: Vec<Connection>,
    /// Defaults to the first listed step
    #[serde(default)]
    pub start_step: Option<StepId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepDefinition {
    pub id: StepId,
    pub name: String,
    #[serde(rename = "type")]
    pub step_type: StepType,
    #[serde(default)]
    pub config: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Connection {
    pub from: StepId,
    pub to: StepId,
}

// Helper trait for duration calculation
pub(crate) trait ElapsedSeconds {
    fn elapsed_seconds_until(&self, other: DateTime<Utc>) -> f64;
}

impl ElapsedSeconds for DateTime<Utc> {
    fn elapsed_seconds_until(&self, other: DateTime<Utc>) -> f64 {
        (other - *self)
            .num_microseconds()
            .map(|us| us as f64 / 1_000_000.0)
            .unwrap_or_default()
    }
}
