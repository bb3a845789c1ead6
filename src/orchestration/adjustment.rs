//! Adjustment protocol: a correlation table from task id to a single
//! pending waiter.
//!
//! A worker calls [`AdjustmentChannel::request`] and then waits on the
//! returned [`PendingAdjustment`] with a timeout. An external actor calls
//! [`AdjustmentChannel::resolve`] to deliver feedback. Resolution and
//! timeout are mutually exclusive and exactly-once: the pending entry is
//! removed under the lock before delivery, and expiry removes it before
//! returning the [`AdjustmentOutcome::Unresolved`] sentinel. A timeout is
//! the expected common case, not an error.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::error::AdjustmentError;
use crate::orchestration::types::TaskId;

/// How a pending adjustment request ended.
#[derive(Debug, Clone, PartialEq)]
pub enum AdjustmentOutcome {
    /// Structured feedback delivered before the timeout.
    Feedback(serde_json::Value),
    /// The timeout expired with no feedback: proceed unmodified.
    Unresolved,
}

/// Correlation table shared by the manager and its workers.
#[derive(Debug, Clone, Default)]
pub struct AdjustmentChannel {
    pending: Arc<Mutex<HashMap<TaskId, oneshot::Sender<serde_json::Value>>>>,
}

impl AdjustmentChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a pending adjustment request for `task_id`.
    ///
    /// Fails with [`AdjustmentError::DuplicateRequest`] when one is already
    /// pending for that id: at most one outstanding adjustment per task.
    pub fn request(&self, task_id: &str) -> Result<PendingAdjustment, AdjustmentError> {
        let mut pending = self.pending.lock().unwrap();
        if pending.contains_key(task_id) {
            return Err(AdjustmentError::DuplicateRequest(task_id.to_string()));
        }
        let (tx, rx) = oneshot::channel();
        pending.insert(task_id.to_string(), tx);
        Ok(PendingAdjustment {
            task_id: task_id.to_string(),
            rx,
            channel: self.clone(),
        })
    }

    /// Deliver feedback to the waiter for `task_id`, if one is pending.
    ///
    /// A missing waiter is a no-op logged as a warning, not an error:
    /// adjustment and request are allowed to race.
    pub fn resolve(&self, task_id: &str, feedback: serde_json::Value) -> bool {
        let sender = self.pending.lock().unwrap().remove(task_id);
        match sender {
            Some(tx) => {
                // The waiter may have timed out between our remove and this
                // send; the dropped receiver makes that a clean no-op.
                let delivered = tx.send(feedback).is_ok();
                if !delivered {
                    debug!(task_id, "Adjustment feedback arrived after timeout");
                }
                delivered
            }
            None => {
                warn!(task_id, "No pending adjustment request for task");
                false
            }
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().unwrap().len()
    }

    fn forget(&self, task_id: &str) {
        self.pending.lock().unwrap().remove(task_id);
    }
}

/// A single in-flight adjustment request. Consume it with [`wait`].
///
/// [`wait`]: PendingAdjustment::wait
#[derive(Debug)]
pub struct PendingAdjustment {
    task_id: TaskId,
    rx: oneshot::Receiver<serde_json::Value>,
    channel: AdjustmentChannel,
}

impl PendingAdjustment {
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Wait for feedback, bounded by `timeout`.
    ///
    /// Expiry removes the pending entry and yields `Unresolved`; the entry
    /// is also cleaned up on normal delivery (the resolver removed it) and
    /// on sender drop.
    pub async fn wait(self, timeout: Duration) -> AdjustmentOutcome {
        let outcome = match tokio::time::timeout(timeout, self.rx).await {
            Ok(Ok(feedback)) => AdjustmentOutcome::Feedback(feedback),
            // Sender dropped without sending (channel shut down).
            Ok(Err(_)) => AdjustmentOutcome::Unresolved,
            Err(_) => AdjustmentOutcome::Unresolved,
        };
        self.channel.forget(&self.task_id);
        outcome
    }
}
