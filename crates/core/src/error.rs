use crate::types::{ExecutionId, StepType};
use thiserror::Error;

/// Errors produced by the workflow engine
#[derive(Debug, Error)]
pub enum EngineError {
    /// Unknown workflow or execution id
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    /// Workflow cannot be run as defined (missing start step, dangling step reference)
    #[error("invalid workflow definition: {0}")]
    InvalidDefinition(String),

    /// A step rejected the data it was given
    #[error("{0}")]
    StepValidationFailed(String),

    /// A step reported a failure while doing its work
    #[error("{0}")]
    StepExecutionFailed(String),

    /// No processor is registered for the step type
    #[error("No processor found for step type: {0}")]
    UnknownStepType(StepType),

    /// The run's task went away before the execution reached a terminal state
    #[error("Execution {0} stopped without reaching a terminal state")]
    Interrupted(ExecutionId),
}

impl EngineError {
    pub fn workflow_not_found(id: impl std::fmt::Display) -> Self {
        Self::NotFound {
            kind: "Workflow",
            id: id.to_string(),
        }
    }

    pub fn execution_not_found(id: impl std::fmt::Display) -> Self {
        Self::NotFound {
            kind: "Execution",
            id: id.to_string(),
        }
    }
}

pub type Result<T, E = EngineError> = std::result::Result<T, E>;
