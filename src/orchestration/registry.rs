//! Bookkeeping for delegated tasks.
//!
//! [`TaskRegistry`] is a plain data structure: it lives inside
//! `ConversationState` and is only ever touched under the session lock, so
//! it carries no synchronization of its own. It enforces the two invariants
//! the rest of the system leans on: task ids are unique, and status
//! transitions are monotonic (terminal states absorb).

use std::collections::HashMap;

use chrono::Utc;
use tracing::warn;

use super::types::{DelegatedTask, TaskId, TaskStatus};

/// Active/completed delegated-task view for one session.
#[derive(Debug, Clone, Default)]
pub struct TaskRegistry {
    tasks: HashMap<TaskId, DelegatedTask>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new task. Rejects duplicate ids: two workers must never
    /// share one task identifier.
    pub fn insert(&mut self, task: DelegatedTask) -> Result<(), String> {
        if self.tasks.contains_key(&task.id) {
            return Err(format!("task id already registered: {}", task.id));
        }
        self.tasks.insert(task.id.clone(), task);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&DelegatedTask> {
        self.tasks.get(id)
    }

    /// Attempt a status transition. Returns `false` (and leaves the entry
    /// untouched) when the task is unknown or already terminal. Stamps
    /// `completed_at` when entering a terminal state.
    pub fn transition(&mut self, id: &str, status: TaskStatus) -> bool {
        let Some(task) = self.tasks.get_mut(id) else {
            warn!(task_id = id, "Status transition for unknown task");
            return false;
        };
        if task.status.is_terminal() {
            warn!(
                task_id = id,
                from = ?task.status,
                to = ?status,
                "Refusing transition out of terminal status"
            );
            return false;
        }
        if status.is_terminal() {
            task.completed_at = Some(Utc::now());
        }
        task.status = status;
        true
    }

    /// Record the worker's result text. Separate from `transition` so the
    /// caller controls the combined atomic unit.
    pub fn set_result(&mut self, id: &str, result: Option<String>) {
        if let Some(task) = self.tasks.get_mut(id) {
            task.result = result;
        }
    }

    pub fn set_iterations(&mut self, id: &str, iterations: u32) {
        if let Some(task) = self.tasks.get_mut(id) {
            task.iterations = iterations;
        }
    }

    /// Tasks not yet in a terminal state.
    pub fn active(&self) -> Vec<&DelegatedTask> {
        self.tasks.values().filter(|t| !t.status.is_terminal()).collect()
    }

    pub fn active_count(&self) -> usize {
        self.tasks.values().filter(|t| !t.status.is_terminal()).count()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Remove every terminal task, returning the removed entries. The main
    /// loop calls this during state merge, after terminal statuses have
    /// been surfaced as messages.
    pub fn prune_terminal(&mut self) -> Vec<DelegatedTask> {
        let terminal_ids: Vec<TaskId> = self
            .tasks
            .values()
            .filter(|t| t.status.is_terminal())
            .map(|t| t.id.clone())
            .collect();
        terminal_ids
            .into_iter()
            .filter_map(|id| self.tasks.remove(&id))
            .collect()
    }

    /// Snapshot of all entries, active first, for status rendering.
    pub fn snapshot(&self) -> Vec<DelegatedTask> {
        let mut all: Vec<DelegatedTask> = self.tasks.values().cloned().collect();
        all.sort_by(|a, b| {
            (a.status.is_terminal(), a.spawned_at).cmp(&(b.status.is_terminal(), b.spawned_at))
        });
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(id: &str) -> DelegatedTask {
        DelegatedTask::new(id, "label", "do something", Vec::new(), 15)
    }

    #[test]
    fn insert_rejects_duplicate_id() {
        let mut reg = TaskRegistry::new();
        reg.insert(task("t1")).unwrap();

        let err = reg.insert(task("t1")).unwrap_err();
        assert!(err.contains("already registered"));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn transition_to_terminal_stamps_completed_at() {
        let mut reg = TaskRegistry::new();
        reg.insert(task("t1")).unwrap();

        assert!(reg.transition("t1", TaskStatus::Completed));
        let t = reg.get("t1").unwrap();
        assert_eq!(t.status, TaskStatus::Completed);
        assert!(t.completed_at.is_some());
    }

    #[test]
    fn no_transition_out_of_terminal_state() {
        let mut reg = TaskRegistry::new();
        reg.insert(task("t1")).unwrap();
        assert!(reg.transition("t1", TaskStatus::Cancelled));

        // A late completion write must be refused.
        assert!(!reg.transition("t1", TaskStatus::Completed));
        assert_eq!(reg.get("t1").unwrap().status, TaskStatus::Cancelled);
    }

    #[test]
    fn awaiting_adjustment_flips_back_to_running() {
        let mut reg = TaskRegistry::new();
        reg.insert(task("t1")).unwrap();

        assert!(reg.transition("t1", TaskStatus::AwaitingAdjustment));
        assert!(reg.transition("t1", TaskStatus::Running));
        assert_eq!(reg.get("t1").unwrap().status, TaskStatus::Running);
    }

    #[test]
    fn transition_unknown_task_is_refused() {
        let mut reg = TaskRegistry::new();
        assert!(!reg.transition("ghost", TaskStatus::Completed));
    }

    #[test]
    fn active_excludes_terminal_tasks() {
        let mut reg = TaskRegistry::new();
        reg.insert(task("t1")).unwrap();
        reg.insert(task("t2")).unwrap();
        reg.transition("t1", TaskStatus::Failed);

        assert_eq!(reg.active_count(), 1);
        assert_eq!(reg.active()[0].id, "t2");
    }

    #[test]
    fn prune_terminal_removes_and_returns_entries() {
        let mut reg = TaskRegistry::new();
        reg.insert(task("t1")).unwrap();
        reg.insert(task("t2")).unwrap();
        reg.insert(task("t3")).unwrap();
        reg.transition("t1", TaskStatus::Completed);
        reg.transition("t3", TaskStatus::Cancelled);

        let pruned = reg.prune_terminal();
        assert_eq!(pruned.len(), 2);
        assert_eq!(reg.len(), 1);
        assert!(reg.get("t2").is_some());
    }

    #[test]
    fn set_result_only_touches_known_tasks() {
        let mut reg = TaskRegistry::new();
        reg.insert(task("t1")).unwrap();

        reg.set_result("t1", Some("answer".into()));
        reg.set_result("ghost", Some("ignored".into()));

        assert_eq!(reg.get("t1").unwrap().result.as_deref(), Some("answer"));
    }
}
