use serde::Deserialize;
use std::time::Duration;

use crate::engine::ModelParams;
use crate::orchestration::WorkerLimits;

/// The TOML file structure for drover.toml.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    pub general: Option<GeneralConfig>,
    pub limits: Option<LimitsConfig>,
}

#[derive(Debug, Deserialize)]
pub struct GeneralConfig {
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub system_prompt: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LimitsConfig {
    /// Hard bound on worker reasoning-act iterations.
    pub iteration_ceiling: Option<u32>,
    /// Workers request an adjustment every this many iterations.
    pub adjustment_interval: Option<u32>,
    pub adjustment_timeout_secs: Option<u64>,
    /// Parent messages snapshotted for a worker at spawn.
    pub snapshot_window: Option<usize>,
    /// Conversation window sent to the engine per reasoning call.
    pub history_window: Option<usize>,
    /// Bound on the main loop's reasoning/tool cycle per turn.
    pub max_turn_iterations: Option<u32>,
    pub max_consecutive_engine_failures: Option<u32>,
    /// Operator cap on concurrently active delegated tasks per session.
    pub max_active_tasks: Option<usize>,
}

impl ConfigFile {
    pub fn to_partial(self) -> PartialConfig {
        let general = self.general;
        let limits = self.limits;
        let mut partial = PartialConfig::default();
        if let Some(g) = general {
            partial.model = g.model;
            partial.temperature = g.temperature;
            partial.system_prompt = g.system_prompt;
        }
        if let Some(l) = limits {
            partial.iteration_ceiling = l.iteration_ceiling;
            partial.adjustment_interval = l.adjustment_interval;
            partial.adjustment_timeout_secs = l.adjustment_timeout_secs;
            partial.snapshot_window = l.snapshot_window;
            partial.history_window = l.history_window;
            partial.max_turn_iterations = l.max_turn_iterations;
            partial.max_consecutive_engine_failures = l.max_consecutive_engine_failures;
            partial.max_active_tasks = l.max_active_tasks;
        }
        partial
    }
}

/// Fully-resolved runtime configuration. All fields have values.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub model: String,
    pub temperature: Option<f32>,
    pub system_prompt: Option<String>,
    pub iteration_ceiling: u32,
    pub adjustment_interval: u32,
    pub adjustment_timeout_secs: u64,
    pub snapshot_window: usize,
    pub history_window: usize,
    pub max_turn_iterations: u32,
    pub max_consecutive_engine_failures: u32,
    pub max_active_tasks: usize,
}

impl AppConfig {
    pub fn model_params(&self) -> ModelParams {
        ModelParams {
            model: self.model.clone(),
            temperature: self.temperature,
            max_tokens: None,
        }
    }

    pub fn worker_limits(&self) -> WorkerLimits {
        WorkerLimits {
            iteration_ceiling: self.iteration_ceiling,
            adjustment_interval: self.adjustment_interval,
            adjustment_timeout: Duration::from_secs(self.adjustment_timeout_secs),
            max_consecutive_engine_failures: self.max_consecutive_engine_failures,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        PartialConfig::default().finalize()
    }
}

/// Partial config used during merge. All fields are Option so that
/// missing fields don't override lower-priority values.
#[derive(Debug, Clone, Default)]
pub struct PartialConfig {
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub system_prompt: Option<String>,
    pub iteration_ceiling: Option<u32>,
    pub adjustment_interval: Option<u32>,
    pub adjustment_timeout_secs: Option<u64>,
    pub snapshot_window: Option<usize>,
    pub history_window: Option<usize>,
    pub max_turn_iterations: Option<u32>,
    pub max_consecutive_engine_failures: Option<u32>,
    pub max_active_tasks: Option<usize>,
}
