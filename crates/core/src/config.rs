use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Runtime settings for a [`crate::workflow::WorkflowEngine`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Upper bound on runs executing at the same time; extra runs wait in `pending`
    #[serde(default = "default_max_concurrent_executions")]
    pub max_concurrent_executions: usize,

    /// Default per-step timeout, overridable with a step's `timeout_secs` config key
    #[serde(default)]
    pub step_timeout_secs: Option<u64>,

    /// Make processors sleep for their nominal processing time
    #[serde(default)]
    pub simulate_latency: bool,

    /// Pause between two consecutive steps of a run
    #[serde(default)]
    pub step_delay_ms: u64,

    /// Capacity of the lifecycle event channel
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

fn default_max_concurrent_executions() -> usize {
    16
}

fn default_event_buffer() -> usize {
    256
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_executions: default_max_concurrent_executions(),
            step_timeout_secs: None,
            simulate_latency: false,
            step_delay_ms: 0,
            event_buffer: default_event_buffer(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file, falling back to defaults when it does not exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::info!("Configuration file not found, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file {}", path.display()))?;
        let config: Self = toml::from_str(&content).context("Failed to parse configuration file")?;

        if config.max_concurrent_executions == 0 {
            anyhow::bail!("max_concurrent_executions must be at least 1");
        }

        Ok(config)
    }

    pub fn step_delay(&self) -> Duration {
        Duration::from_millis(self.step_delay_ms)
    }

    pub fn step_timeout(&self) -> Option<Duration> {
        self.step_timeout_secs.map(Duration::from_secs)
    }
}
