pub mod definition;
pub mod execution;
pub mod executor;
pub mod graph;
mod runner;
pub mod step_executor;

pub use definition::{Connection, Step, StepDefinition, Workflow, WorkflowDefinition, DEFAULT_WORKFLOW_VERSION};
pub use execution::{Execution, LogEntry};
pub use executor::WorkflowEngine;
pub use graph::{EdgeKind, WorkflowGraph};
pub use step_executor::{StepExecutor, StepResult};
