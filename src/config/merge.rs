use super::schema::{AppConfig, PartialConfig};

impl PartialConfig {
    /// Merge self with a lower-priority fallback.
    /// Self's non-None values take precedence.
    pub fn with_fallback(self, fallback: PartialConfig) -> PartialConfig {
        PartialConfig {
            model: self.model.or(fallback.model),
            temperature: self.temperature.or(fallback.temperature),
            system_prompt: self.system_prompt.or(fallback.system_prompt),
            iteration_ceiling: self.iteration_ceiling.or(fallback.iteration_ceiling),
            adjustment_interval: self.adjustment_interval.or(fallback.adjustment_interval),
            adjustment_timeout_secs: self
                .adjustment_timeout_secs
                .or(fallback.adjustment_timeout_secs),
            snapshot_window: self.snapshot_window.or(fallback.snapshot_window),
            history_window: self.history_window.or(fallback.history_window),
            max_turn_iterations: self.max_turn_iterations.or(fallback.max_turn_iterations),
            max_consecutive_engine_failures: self
                .max_consecutive_engine_failures
                .or(fallback.max_consecutive_engine_failures),
            max_active_tasks: self.max_active_tasks.or(fallback.max_active_tasks),
        }
    }

    /// Convert to AppConfig, filling any remaining gaps with defaults.
    pub fn finalize(self) -> AppConfig {
        AppConfig {
            model: self.model.unwrap_or_else(|| "default".to_string()),
            temperature: self.temperature,
            system_prompt: self.system_prompt,
            iteration_ceiling: self.iteration_ceiling.unwrap_or(15),
            adjustment_interval: self.adjustment_interval.unwrap_or(3),
            adjustment_timeout_secs: self.adjustment_timeout_secs.unwrap_or(30),
            snapshot_window: self.snapshot_window.unwrap_or(10),
            history_window: self.history_window.unwrap_or(50),
            max_turn_iterations: self.max_turn_iterations.unwrap_or(20),
            max_consecutive_engine_failures: self.max_consecutive_engine_failures.unwrap_or(3),
            max_active_tasks: self.max_active_tasks.unwrap_or(8),
        }
    }
}
