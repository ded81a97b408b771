use super::definition::Workflow;
use super::execution::Execution;
use super::runner::Runner;
use super::step_executor::StepExecutor;
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::events::{EventBus, ExecutionEvent};
use crate::processors::ProcessorRegistry;
use crate::template::sample_workflows;
use crate::types::{DataContext, ExecutionId, ExecutionStatus, WorkflowId};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, watch, Mutex, RwLock, Semaphore};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Bookkeeping for one registered execution
struct ExecutionEntry {
    workflow_id: WorkflowId,
    record: Arc<Mutex<Execution>>,
    cancel: CancellationToken,
    status: watch::Receiver<ExecutionStatus>,
}

#[derive(Default)]
struct ExecutionRegistry {
    entries: HashMap<ExecutionId, ExecutionEntry>,
    /// Registration order, for listing
    order: Vec<ExecutionId>,
}

struct EngineInner {
    config: EngineConfig,
    workflows: RwLock<HashMap<WorkflowId, Workflow>>,
    executions: RwLock<ExecutionRegistry>,
    step_executor: Arc<StepExecutor>,
    events: EventBus,
    permits: Arc<Semaphore>,
    tracker: TaskTracker,
    shutdown: CancellationToken,
}

/// Owns the workflow and execution registries and runs executions in the background.
///
/// Cloning is cheap; clones share the same registries.
#[derive(Clone)]
pub struct WorkflowEngine {
    inner: Arc<EngineInner>,
}

impl WorkflowEngine {
    /// Engine with every built-in processor registered
    pub fn new(config: EngineConfig) -> Self {
        Self::with_registry(config, ProcessorRegistry::with_builtin())
    }

    pub fn with_registry(config: EngineConfig, registry: ProcessorRegistry) -> Self {
        let step_executor = Arc::new(StepExecutor::new(Arc::new(registry), &config));
        let permits = Arc::new(Semaphore::new(config.max_concurrent_executions.max(1)));
        let events = EventBus::new(config.event_buffer.max(1));

        Self {
            inner: Arc::new(EngineInner {
                config,
                workflows: RwLock::new(HashMap::new()),
                executions: RwLock::new(ExecutionRegistry::default()),
                step_executor,
                events,
                permits,
                tracker: TaskTracker::new(),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Create and register an empty workflow
    pub async fn create_workflow(
        &self,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Workflow {
        let workflow = Workflow::new(name, description);
        self.register_workflow(workflow.clone()).await;
        workflow
    }

    /// Register a workflow, replacing any workflow with the same id.
    ///
    /// Runs already in flight keep the snapshot they were admitted with.
    pub async fn register_workflow(&self, workflow: Workflow) -> WorkflowId {
        let id = workflow.id;
        tracing::info!(workflow_id = %id, "Registered workflow: {}", workflow.name);
        self.inner.workflows.write().await.insert(id, workflow);
        id
    }

    pub async fn get_workflow(&self, workflow_id: WorkflowId) -> Result<Workflow> {
        self.inner
            .workflows
            .read()
            .await
            .get(&workflow_id)
            .cloned()
            .ok_or_else(|| EngineError::workflow_not_found(workflow_id))
    }

    /// All registered workflows, sorted by creation time
    pub async fn list_workflows(&self) -> Vec<Workflow> {
        let mut workflows: Vec<Workflow> =
            self.inner.workflows.read().await.values().cloned().collect();
        workflows.sort_by_key(|workflow| workflow.created_at);
        workflows
    }

    /// Returns false if no such workflow was registered
    pub async fn delete_workflow(&self, workflow_id: WorkflowId) -> bool {
        self.inner
            .workflows
            .write()
            .await
            .remove(&workflow_id)
            .is_some()
    }

    /// Register the built-in sample workflows
    pub async fn register_sample_workflows(&self) -> Vec<WorkflowId> {
        let mut ids = Vec::new();
        for workflow in sample_workflows() {
            ids.push(self.register_workflow(workflow).await);
        }
        ids
    }

    /// Admit a run of the workflow and start it in the background.
    ///
    /// Returns the pending record before the run makes any progress. Step
    /// failures never surface here; they are recorded on the execution.
    pub async fn execute_workflow(
        &self,
        workflow_id: WorkflowId,
        input: DataContext,
    ) -> Result<Execution> {
        let snapshot = {
            let mut workflows = self.inner.workflows.write().await;
            let workflow = workflows
                .get_mut(&workflow_id)
                .ok_or_else(|| EngineError::workflow_not_found(workflow_id))?;

            if workflow.start_step_id.is_none() {
                return Err(EngineError::InvalidDefinition(format!(
                    "Workflow {} has no start step defined",
                    workflow.name
                )));
            }

            workflow.execution_count += 1;
            Arc::new(workflow.clone())
        };

        let execution = Execution::new(workflow_id, input);
        let execution_id = execution.execution_id;
        let record = Arc::new(Mutex::new(execution.clone()));
        let cancel = self.inner.shutdown.child_token();
        let (status_tx, status_rx) = watch::channel(ExecutionStatus::Pending);

        {
            let mut executions = self.inner.executions.write().await;
            executions.entries.insert(
                execution_id,
                ExecutionEntry {
                    workflow_id,
                    record: record.clone(),
                    cancel: cancel.clone(),
                    status: status_rx,
                },
            );
            executions.order.push(execution_id);
        }

        let runner = Runner {
            workflow: snapshot,
            record,
            execution_id,
            step_executor: self.inner.step_executor.clone(),
            events: self.inner.events.clone(),
            cancel,
            step_delay: self.inner.config.step_delay(),
            status_tx: Arc::new(status_tx),
        };
        self.inner
            .tracker
            .spawn(runner.run_supervised(self.inner.permits.clone()));

        tracing::info!(%execution_id, %workflow_id, "Execution admitted");
        Ok(execution)
    }

    /// Current snapshot of an execution
    pub async fn get_execution(&self, execution_id: ExecutionId) -> Result<Execution> {
        let record = self.record(execution_id).await?;
        let execution = record.lock().await.clone();
        Ok(execution)
    }

    /// Executions in registration order, optionally restricted to one workflow
    pub async fn list_executions(&self, workflow_id: Option<WorkflowId>) -> Vec<Execution> {
        let records: Vec<Arc<Mutex<Execution>>> = {
            let executions = self.inner.executions.read().await;
            executions
                .order
                .iter()
                .filter_map(|id| executions.entries.get(id))
                .filter(|entry| workflow_id.map_or(true, |wf| entry.workflow_id == wf))
                .map(|entry| entry.record.clone())
                .collect()
        };

        let mut snapshots = Vec::with_capacity(records.len());
        for record in records {
            snapshots.push(record.lock().await.clone());
        }
        snapshots
    }

    /// Wait until the execution reaches a terminal state and return it
    pub async fn wait_for_execution(&self, execution_id: ExecutionId) -> Result<Execution> {
        let mut status = {
            let executions = self.inner.executions.read().await;
            executions
                .entries
                .get(&execution_id)
                .map(|entry| entry.status.clone())
                .ok_or_else(|| EngineError::execution_not_found(execution_id))?
        };

        let finished = status.wait_for(|status| status.is_terminal()).await.is_ok();
        let execution = self.get_execution(execution_id).await?;
        if !finished && !execution.is_terminal() {
            return Err(EngineError::Interrupted(execution_id));
        }
        Ok(execution)
    }

    /// Request cancellation. Returns false if the execution already finished.
    pub async fn cancel_execution(&self, execution_id: ExecutionId) -> Result<bool> {
        let (record, cancel) = {
            let executions = self.inner.executions.read().await;
            let entry = executions
                .entries
                .get(&execution_id)
                .ok_or_else(|| EngineError::execution_not_found(execution_id))?;
            (entry.record.clone(), entry.cancel.clone())
        };

        if record.lock().await.is_terminal() {
            return Ok(false);
        }

        tracing::info!(%execution_id, "Cancellation requested");
        cancel.cancel();
        Ok(true)
    }

    /// Drop an execution record. A run still in flight is cancelled.
    pub async fn delete_execution(&self, execution_id: ExecutionId) -> bool {
        let mut executions = self.inner.executions.write().await;
        let Some(entry) = executions.entries.remove(&execution_id) else {
            return false;
        };
        executions.order.retain(|id| *id != execution_id);
        entry.cancel.cancel();
        true
    }

    /// Lifecycle events of every execution started after subscribing
    pub fn subscribe(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.inner.events.subscribe()
    }

    /// Cancel every in-flight run and wait for the background tasks to exit
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down workflow engine");
        self.inner.shutdown.cancel();
        self.inner.tracker.close();
        self.inner.tracker.wait().await;
    }

    async fn record(&self, execution_id: ExecutionId) -> Result<Arc<Mutex<Execution>>> {
        self.inner
            .executions
            .read()
            .await
            .entries
            .get(&execution_id)
            .map(|entry| entry.record.clone())
            .ok_or_else(|| EngineError::execution_not_found(execution_id))
    }
}
