//! Per-session conversation state and its shared handle.
//!
//! [`ConversationState`] owns the message sequence, the embedded
//! [`TaskRegistry`] view of delegated tasks, and per-turn scratch.
//! [`SharedSession`] is the only way concurrent parties reach it: every
//! method takes the lock once, applies a whole command, and releases —
//! the lock is never held across an await, and a delegation completion
//! (status + result + summary message) is applied as one unit.

pub mod store;

pub use store::SessionStore;

use std::sync::{Arc, Mutex};

use crate::engine::Message;
use crate::orchestration::registry::TaskRegistry;
use crate::orchestration::types::{DelegatedTask, TaskStatus, WorkerOutcome};

/// Conversation state for one `channel:chat_id` session.
#[derive(Debug, Clone, Default)]
pub struct ConversationState {
    /// Ordered message sequence; append-only within a turn.
    pub messages: Vec<Message>,
    /// Delegated-task view shared between the main loop and the manager.
    pub tasks: TaskRegistry,
    /// Names of tools invoked this turn. Cleared at turn start.
    pub tools_this_turn: Vec<String>,
}

/// Thread-safe handle to one session's [`ConversationState`].
#[derive(Clone)]
pub struct SharedSession {
    key: Arc<str>,
    state: Arc<Mutex<ConversationState>>,
}

impl SharedSession {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: Arc::from(key.into()),
            state: Arc::new(Mutex::new(ConversationState::default())),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn append_message(&self, msg: Message) {
        self.state.lock().unwrap().messages.push(msg);
    }

    /// Append a batch in order, under one lock acquisition.
    pub fn append_messages(&self, msgs: Vec<Message>) {
        self.state.lock().unwrap().messages.extend(msgs);
    }

    /// Full message sequence, cloned for an engine call.
    pub fn messages(&self) -> Vec<Message> {
        self.state.lock().unwrap().messages.clone()
    }

    pub fn message_count(&self) -> usize {
        self.state.lock().unwrap().messages.len()
    }

    /// Immutable copy of the most recent `n` messages — the initial
    /// context snapshot handed to a worker at spawn time.
    pub fn recent_messages(&self, n: usize) -> Vec<Message> {
        let state = self.state.lock().unwrap();
        let len = state.messages.len();
        state.messages[len.saturating_sub(n)..].to_vec()
    }

    /// Register a freshly-created delegated task. Fails on duplicate ids.
    pub fn register_task(&self, task: DelegatedTask) -> Result<(), String> {
        self.state.lock().unwrap().tasks.insert(task)
    }

    pub fn task(&self, id: &str) -> Option<DelegatedTask> {
        self.state.lock().unwrap().tasks.get(id).cloned()
    }

    pub fn active_task_count(&self) -> usize {
        self.state.lock().unwrap().tasks.active_count()
    }

    pub fn task_snapshot(&self) -> Vec<DelegatedTask> {
        self.state.lock().unwrap().tasks.snapshot()
    }

    /// Worker-side status flip (`Running ⇄ AwaitingAdjustment`). Refused
    /// for terminal tasks.
    pub fn set_task_status(&self, id: &str, status: TaskStatus) -> bool {
        self.state.lock().unwrap().tasks.transition(id, status)
    }

    pub fn set_task_iterations(&self, id: &str, iterations: u32) {
        self.state.lock().unwrap().tasks.set_iterations(id, iterations);
    }

    /// Apply a worker completion as one atomic unit: terminal status,
    /// result, iteration count, and the summary message the next reasoning
    /// turn will see.
    ///
    /// Returns `false` without appending anything when the transition is
    /// refused (the task was cancelled first, or is unknown).
    pub fn apply_completion(&self, id: &str, outcome: &WorkerOutcome, summary: Message) -> bool {
        let mut state = self.state.lock().unwrap();
        if !state.tasks.transition(id, outcome.status) {
            return false;
        }
        state.tasks.set_result(id, outcome.result.clone());
        state.tasks.set_iterations(id, outcome.iterations);
        state.messages.push(summary);
        true
    }

    /// Mark a task cancelled and surface a note, as one unit. Returns
    /// `false` when the task is unknown or already terminal.
    pub fn cancel_task(&self, id: &str, note: Message) -> bool {
        let mut state = self.state.lock().unwrap();
        if !state.tasks.transition(id, TaskStatus::Cancelled) {
            return false;
        }
        state.messages.push(note);
        true
    }

    /// State merge: drop terminal tasks from the visible set. Their
    /// summary messages were appended when they completed, so pruning
    /// never loses information.
    pub fn prune_surfaced_tasks(&self) -> Vec<DelegatedTask> {
        self.state.lock().unwrap().tasks.prune_terminal()
    }

    pub fn note_tool_use(&self, name: &str) {
        self.state
            .lock()
            .unwrap()
            .tools_this_turn
            .push(name.to_string());
    }

    pub fn tools_this_turn(&self) -> Vec<String> {
        self.state.lock().unwrap().tools_this_turn.clone()
    }

    /// Clear per-turn scratch at turn start.
    pub fn begin_turn(&self) {
        self.state.lock().unwrap().tools_this_turn.clear();
    }

    /// Reset the conversation (`/new`). Running tasks stay registered;
    /// they outlive turns and will surface into the fresh history.
    pub fn reset_messages(&self) {
        let mut state = self.state.lock().unwrap();
        state.messages.clear();
        state.tools_this_turn.clear();
    }

    /// Opaque snapshot of the whole state, for checkpoint storage.
    pub fn snapshot(&self) -> ConversationState {
        self.state.lock().unwrap().clone()
    }
}
