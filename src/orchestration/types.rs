//! Shared vocabulary of the delegation subsystem.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::engine::Message;

/// Unique identifier for a delegated task. Short UUID-v4 prefixes, readable
/// in logs and chat output.
pub type TaskId = String;

/// Lifecycle status of a delegated task.
///
/// Transitions are monotonic: `Running ⇄ AwaitingAdjustment`, then exactly
/// one of the terminal states. [`super::registry::TaskRegistry`] enforces
/// that nothing leaves a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Running,
    AwaitingAdjustment,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

/// One delegated task as tracked by the registry.
///
/// The context snapshot is an immutable copy of a bounded window of the
/// parent conversation taken at spawn time; it never follows the parent.
#[derive(Debug, Clone, Serialize)]
pub struct DelegatedTask {
    pub id: TaskId,
    /// Human label, derived from the task text when not supplied.
    pub label: String,
    /// The originating task description.
    pub task: String,
    pub status: TaskStatus,
    #[serde(skip)]
    pub context_snapshot: Vec<Message>,
    /// Present only once the task completed or failed.
    pub result: Option<String>,
    pub iterations: u32,
    pub iteration_ceiling: u32,
    pub spawned_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl DelegatedTask {
    pub fn new(
        id: impl Into<TaskId>,
        label: impl Into<String>,
        task: impl Into<String>,
        context_snapshot: Vec<Message>,
        iteration_ceiling: u32,
    ) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            task: task.into(),
            status: TaskStatus::Running,
            context_snapshot,
            result: None,
            iterations: 0,
            iteration_ceiling,
            spawned_at: Utc::now(),
            completed_at: None,
        }
    }
}

/// What a worker run produced, handed to the manager for write-back.
#[derive(Debug, Clone)]
pub struct WorkerOutcome {
    /// Terminal status: Completed, Failed, or Cancelled.
    pub status: TaskStatus,
    pub result: Option<String>,
    pub iterations: u32,
}

/// Arguments of a delegation-trigger call, as extracted by the main loop.
#[derive(Debug, Clone)]
pub struct DelegationRequest {
    pub task: String,
    pub label: Option<String>,
}

impl DelegationRequest {
    /// Display label: the explicit one, or the task text truncated the way
    /// chat output wants it.
    pub fn display_label(&self) -> String {
        match &self.label {
            Some(label) => label.clone(),
            None => truncate_label(&self.task, 30),
        }
    }
}

/// Truncate on a char boundary, appending "..." when shortened.
pub fn truncate_label(s: &str, max_chars: usize) -> String {
    if s.chars().count() > max_chars {
        let cut: String = s.chars().take(max_chars).collect();
        format!("{cut}...")
    } else {
        s.to_string()
    }
}

/// Limits governing a single worker run.
#[derive(Debug, Clone)]
pub struct WorkerLimits {
    /// Hard upper bound on reasoning-act iterations.
    pub iteration_ceiling: u32,
    /// Issue an adjustment request every this many iterations.
    pub adjustment_interval: u32,
    /// How long a pending adjustment waits before resolving to "no
    /// adjustment".
    pub adjustment_timeout: std::time::Duration,
    /// Consecutive engine failures tolerated before the task fails.
    pub max_consecutive_engine_failures: u32,
}

impl Default for WorkerLimits {
    fn default() -> Self {
        Self {
            iteration_ceiling: 15,
            adjustment_interval: 3,
            adjustment_timeout: std::time::Duration::from_secs(30),
            max_consecutive_engine_failures: 3,
        }
    }
}
