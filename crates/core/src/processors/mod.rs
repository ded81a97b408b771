// Step processors: one handler per step type

pub mod api_call;
pub mod condition;
pub mod input;
pub mod output;
pub mod processing;
pub mod transform;
pub mod validation;

use crate::error::{EngineError, Result};
use crate::types::{DataContext, ExecutionId, StepId, StepType};
use crate::workflow::Step;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

pub use api_call::ApiCallProcessor;
pub use condition::ConditionProcessor;
pub use input::InputProcessor;
pub use output::OutputProcessor;
pub use processing::ProcessingProcessor;
pub use transform::TransformProcessor;
pub use validation::ValidationProcessor;

/// What a successful step hands back to the run driver
#[derive(Debug, Clone, Default)]
pub struct StepOutcome {
    /// Merged into the run's context
    pub output: DataContext,
    /// Overrides the step's declared successors when set
    pub next_step: Option<StepId>,
    /// Non-fatal remarks, appended to the execution log as warnings
    pub warnings: Vec<String>,
}

impl StepOutcome {
    pub fn new(output: DataContext) -> Self {
        Self {
            output,
            ..Default::default()
        }
    }

    pub fn with_next_step(mut self, next_step: Option<StepId>) -> Self {
        self.next_step = next_step;
        self
    }

    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings = warnings;
        self
    }
}

/// Per-call information a processor may need beyond the step and context
#[derive(Debug, Clone)]
pub struct ProcessorEnv {
    pub execution_id: ExecutionId,
    pub simulate_latency: bool,
}

impl ProcessorEnv {
    /// Sleep for the nominal processing time when latency simulation is enabled.
    ///
    /// Fails the step when `seconds` is too large to wait for.
    pub async fn simulate(&self, seconds: f64) -> Result<()> {
        if !self.simulate_latency || seconds <= 0.0 || seconds.is_nan() {
            return Ok(());
        }

        let delay = Duration::try_from_secs_f64(seconds).map_err(|_| {
            EngineError::StepExecutionFailed(format!("Invalid processing time: {} seconds", seconds))
        })?;
        tokio::time::sleep(delay).await;
        Ok(())
    }
}

/// Handler for one step type.
///
/// `Ok` means the step succeeded; any `Err` is recorded as the step's failure.
#[async_trait::async_trait]
pub trait StepProcessor: Send + Sync {
    /// Step type this processor handles
    fn step_type(&self) -> StepType;

    async fn process(
        &self,
        step: &Step,
        context: &DataContext,
        env: &ProcessorEnv,
    ) -> Result<StepOutcome>;
}

/// Dispatch table from step type to processor
pub struct ProcessorRegistry {
    processors: HashMap<StepType, Arc<dyn StepProcessor>>,
}

impl ProcessorRegistry {
    pub fn new() -> Self {
        Self {
            processors: HashMap::new(),
        }
    }

    /// Registry with every built-in processor. `loop` has none.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(InputProcessor));
        registry.register(Arc::new(ProcessingProcessor));
        registry.register(Arc::new(ValidationProcessor));
        registry.register(Arc::new(OutputProcessor));
        registry.register(Arc::new(ConditionProcessor));
        registry.register(Arc::new(TransformProcessor));
        registry.register(Arc::new(ApiCallProcessor));
        registry
    }

    /// Register a processor, replacing any existing one for the same step type
    pub fn register(&mut self, processor: Arc<dyn StepProcessor>) {
        self.processors.insert(processor.step_type(), processor);
    }

    pub fn get(&self, step_type: StepType) -> Option<Arc<dyn StepProcessor>> {
        self.processors.get(&step_type).cloned()
    }

    pub fn contains(&self, step_type: StepType) -> bool {
        self.processors.contains_key(&step_type)
    }
}

impl Default for ProcessorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// Helpers shared by the built-in processors

pub(crate) fn config_str<'a>(config: &'a DataContext, key: &str) -> Option<&'a str> {
    config.get(key).and_then(Value::as_str)
}

pub(crate) fn config_object<'a>(config: &'a DataContext, key: &str) -> Option<&'a DataContext> {
    config.get(key).and_then(Value::as_object)
}

pub(crate) fn config_f64(config: &DataContext, key: &str) -> Option<f64> {
    config.get(key).and_then(Value::as_f64)
}

/// JSON object literal from key/value pairs
pub(crate) fn object<I, K>(pairs: I) -> DataContext
where
    I: IntoIterator<Item = (K, Value)>,
    K: Into<String>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v)).collect()
}

/// Emptiness in the loose sense: null, false, zero, and empty strings or collections
pub(crate) fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Equality that treats `5` and `5.0` as the same number
pub(crate) fn loose_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => left == right,
    }
}
