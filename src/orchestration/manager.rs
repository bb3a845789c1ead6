//! Supervision of subagent workers.
//!
//! [`SubagentManager`] owns every spawned worker for the lifetime of the
//! session: each gets a child [`CancellationToken`] and a retained
//! `JoinHandle`, so nothing is fire-and-forget. It also owns the
//! [`AdjustmentChannel`] and applies completion write-back through the
//! session handle as one atomic unit.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::adjustment::AdjustmentChannel;
use super::types::{
    DelegatedTask, DelegationRequest, TaskId, TaskStatus, WorkerLimits, WorkerOutcome,
};
use super::worker::{run_worker, WorkerContext};
use crate::bus::MessageBus;
use crate::engine::{Message, ModelParams, ReasoningEngine};
use crate::session::SharedSession;
use crate::tools::{ToolRegistry, DELEGATE_TOOL, MESSAGE_TOOL};

/// Per-worker supervision entry.
struct WorkerHandle {
    cancel: CancellationToken,
    join: Option<JoinHandle<()>>,
}

/// Supervises zero-or-more concurrently executing workers.
#[derive(Clone)]
pub struct SubagentManager {
    engine: Arc<dyn ReasoningEngine>,
    /// Isolated tool subset handed to every worker.
    worker_tools: ToolRegistry,
    bus: MessageBus,
    adjustments: AdjustmentChannel,
    workers: Arc<Mutex<HashMap<TaskId, WorkerHandle>>>,
    root_cancel: CancellationToken,
    params: ModelParams,
    limits: WorkerLimits,
    /// Operator-imposed cap on concurrently active tasks per session.
    max_active_tasks: usize,
    /// Bounded window of parent messages snapshotted at spawn.
    snapshot_window: usize,
}

impl SubagentManager {
    pub fn new(
        engine: Arc<dyn ReasoningEngine>,
        tools: &ToolRegistry,
        bus: MessageBus,
        params: ModelParams,
        limits: WorkerLimits,
        max_active_tasks: usize,
        snapshot_window: usize,
    ) -> Self {
        Self {
            engine,
            worker_tools: tools.without(&[DELEGATE_TOOL, MESSAGE_TOOL]),
            bus,
            adjustments: AdjustmentChannel::new(),
            workers: Arc::new(Mutex::new(HashMap::new())),
            root_cancel: CancellationToken::new(),
            params,
            limits,
            max_active_tasks,
            snapshot_window,
        }
    }

    /// Start a worker for `request` without blocking the caller.
    ///
    /// Takes the context snapshot, registers the task (duplicate ids are
    /// rejected by the registry), and spawns the supervision task that
    /// runs the worker and applies the completion write-back.
    pub fn spawn(
        &self,
        session: &SharedSession,
        request: DelegationRequest,
        origin_channel: &str,
        origin_chat_id: &str,
    ) -> Result<TaskId, String> {
        if session.active_task_count() >= self.max_active_tasks {
            return Err(format!(
                "max active tasks reached ({}/{})",
                session.active_task_count(),
                self.max_active_tasks
            ));
        }

        let id: TaskId = uuid::Uuid::new_v4().to_string()[..8].to_string();
        let label = request.display_label();
        let snapshot = session.recent_messages(self.snapshot_window);

        session.register_task(DelegatedTask::new(
            id.clone(),
            label.clone(),
            request.task.clone(),
            snapshot.clone(),
            self.limits.iteration_ceiling,
        ))?;

        let cancel = self.root_cancel.child_token();
        self.workers.lock().unwrap().insert(
            id.clone(),
            WorkerHandle {
                cancel: cancel.clone(),
                join: None,
            },
        );

        let ctx = WorkerContext {
            task_id: id.clone(),
            task: request.task.clone(),
            engine: self.engine.clone(),
            tools: self.worker_tools.clone(),
            adjustments: self.adjustments.clone(),
            bus: self.bus.clone(),
            origin_channel: origin_channel.to_string(),
            origin_chat_id: origin_chat_id.to_string(),
            params: self.params.clone(),
            limits: self.limits.clone(),
            cancel,
            session: session.clone(),
        };

        let task_id = id.clone();
        let task_label = label;
        let task_text = request.task;
        let workers = self.workers.clone();
        let session = session.clone();

        let handle = tokio::spawn(async move {
            let outcome = run_worker(ctx, &snapshot).await;

            let summary = completion_summary(&task_label, &task_text, &outcome);
            if session.apply_completion(&task_id, &outcome, summary) {
                info!(task_id = %task_id, status = ?outcome.status, "Task completion recorded");
            } else {
                // The task was cancelled (or otherwise terminal) before the
                // worker finished; its result is discarded.
                info!(task_id = %task_id, "Completion write refused by terminal status");
            }

            workers.lock().unwrap().remove(&task_id);
        });

        // The supervision task may already have finished and removed its
        // entry; only attach the handle if it is still there.
        if let Some(entry) = self.workers.lock().unwrap().get_mut(&id) {
            entry.join = Some(handle);
        }

        info!(task_id = %id, "Worker spawned");
        Ok(id)
    }

    /// Resolve a pending adjustment request for `task_id`.
    ///
    /// A no-op (warned, not an error) when nothing is pending: adjustment
    /// and request are allowed to race.
    pub fn handle_adjustment(&self, task_id: &str, feedback: serde_json::Value) -> bool {
        self.adjustments.resolve(task_id, feedback)
    }

    /// Cancel a running task: mark it Cancelled in the session view and
    /// signal its token. The worker observes the token at its next
    /// iteration boundary; a late completion write is refused by the
    /// registry's terminal guard.
    pub fn cancel(&self, session: &SharedSession, task_id: &str) -> bool {
        let Some(task) = session.task(task_id) else {
            warn!(task_id, "Cancel requested for unknown task");
            return false;
        };

        let note = Message::system(format!(
            "[Background task '{}' cancelled by operator]",
            task.label
        ));
        if !session.cancel_task(task_id, note) {
            warn!(task_id, "Cancel requested for already-terminal task");
            return false;
        }

        if let Some(entry) = self.workers.lock().unwrap().get(task_id) {
            entry.cancel.cancel();
        }
        info!(task_id, "Task cancelled");
        true
    }

    /// Number of workers currently under supervision.
    pub fn active_worker_count(&self) -> usize {
        self.workers.lock().unwrap().len()
    }

    /// Cancel the root token and join every worker with a bounded wait.
    pub async fn shutdown_all(&self) {
        self.root_cancel.cancel();

        let handles: Vec<JoinHandle<()>> = {
            let mut workers = self.workers.lock().unwrap();
            workers
                .values_mut()
                .filter_map(|w| w.join.take())
                .collect()
        };

        for handle in handles {
            let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
        }
    }
}

/// The system-role summary appended to the parent conversation when a
/// worker finishes. The next reasoning turn sees it verbatim.
fn completion_summary(label: &str, task: &str, outcome: &WorkerOutcome) -> Message {
    let status_text = match outcome.status {
        TaskStatus::Completed => "completed",
        TaskStatus::Failed => "failed",
        TaskStatus::Cancelled => "cancelled",
        // Workers only ever return terminal outcomes.
        TaskStatus::Running | TaskStatus::AwaitingAdjustment => "finished",
    };
    let result_text = outcome.result.as_deref().unwrap_or("No result");

    Message::system(format!(
        "[Background task '{label}' {status_text} after {} iterations]\n\n\
         Task: {task}\n\n\
         Result:\n{result_text}\n\n\
         Summarize this naturally for the user. Keep it brief (1-2 sentences).",
        outcome.iterations
    ))
}
