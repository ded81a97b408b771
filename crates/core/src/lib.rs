// Core engine for Stepflow workflow orchestration

pub mod config;
pub mod error;
pub mod events;
pub mod processors;
pub mod template;
pub mod types;
pub mod workflow;

pub use config::EngineConfig;
pub use error::{EngineError, Result};
pub use events::{EventBus, EventType, ExecutionEvent};
pub use processors::{ProcessorEnv, ProcessorRegistry, StepOutcome, StepProcessor};
pub use types::*;
pub use workflow::{
    Execution, LogEntry, Step, Workflow, WorkflowDefinition, WorkflowEngine, WorkflowGraph,
};
