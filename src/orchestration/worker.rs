//! The subagent worker: one bounded reasoning-act loop per delegated task.
//!
//! The worker owns its transcript exclusively; the only shared touch points
//! are the session's task view (status flips, iteration count) and the
//! adjustment channel. Liveness is guaranteed by the iteration ceiling:
//! for a ceiling of N the engine is invoked at most N times, engine
//! failures included.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::adjustment::{AdjustmentChannel, AdjustmentOutcome};
use super::types::{TaskId, TaskStatus, WorkerLimits, WorkerOutcome};
use crate::bus::{MessageBus, OutboundMessage};
use crate::engine::{Message, ModelParams, ReasoningEngine, Role};
use crate::session::SharedSession;
use crate::tools::{ToolRegistry, DELEGATE_TOOL, MESSAGE_TOOL};

/// How many transcript messages an adjustment request excerpts.
const EXCERPT_MESSAGES: usize = 5;
/// Per-message cap in the rendered excerpt.
const EXCERPT_CHARS: usize = 200;

/// Everything a worker run needs. Built by the manager at spawn time.
pub struct WorkerContext {
    pub task_id: TaskId,
    pub task: String,
    pub engine: Arc<dyn ReasoningEngine>,
    /// Isolated tool subset: no delegation, no direct user messaging.
    pub tools: ToolRegistry,
    pub adjustments: AdjustmentChannel,
    pub bus: MessageBus,
    /// Where adjustment requests are surfaced.
    pub origin_channel: String,
    pub origin_chat_id: String,
    pub params: ModelParams,
    pub limits: WorkerLimits,
    pub cancel: CancellationToken,
    pub session: SharedSession,
}

/// Run the bounded reasoning-act loop for one delegated task.
///
/// Returns the terminal [`WorkerOutcome`]; the caller (the manager's
/// supervision task) performs the completion write-back.
pub async fn run_worker(ctx: WorkerContext, snapshot: &[Message]) -> WorkerOutcome {
    info!(task_id = %ctx.task_id, "Worker starting");

    let mut messages = vec![Message::system(build_worker_prompt(&ctx.task))];
    if !snapshot.is_empty() {
        messages.push(Message::system(render_snapshot(snapshot)));
    }
    messages.push(Message::user(ctx.task.clone()));

    let tool_defs = ctx.tools.definitions();
    let mut iterations: u32 = 0;
    let mut consecutive_failures: u32 = 0;
    let mut last_text: Option<String> = None;

    while iterations < ctx.limits.iteration_ceiling {
        // Cancellation is observed at iteration boundaries only; a
        // cancelled worker stops issuing engine calls and never writes a
        // completed result (the registry's terminal guard backs this up).
        if ctx.cancel.is_cancelled() {
            info!(task_id = %ctx.task_id, iterations, "Worker observed cancellation");
            return WorkerOutcome {
                status: TaskStatus::Cancelled,
                result: None,
                iterations,
            };
        }

        iterations += 1;
        ctx.session.set_task_iterations(&ctx.task_id, iterations);

        let response = match ctx.engine.chat(&messages, &tool_defs, &ctx.params).await {
            Ok(resp) => {
                consecutive_failures = 0;
                resp
            }
            Err(e) => {
                consecutive_failures += 1;
                warn!(
                    task_id = %ctx.task_id,
                    iterations,
                    consecutive_failures,
                    "Worker engine call failed: {e}"
                );
                if consecutive_failures >= ctx.limits.max_consecutive_engine_failures {
                    return WorkerOutcome {
                        status: TaskStatus::Failed,
                        result: Some(format!("Engine failed repeatedly: {e}")),
                        iterations,
                    };
                }
                continue;
            }
        };

        if let Some(text) = response.content.as_deref() {
            if !text.is_empty() {
                last_text = Some(text.to_string());
            }
        }

        if response.tool_calls.is_empty() {
            // No tool calls: the task is done, last text is the result.
            return WorkerOutcome {
                status: TaskStatus::Completed,
                result: last_text,
                iterations,
            };
        }

        let calls = response.tool_calls.clone();
        messages.push(Message::assistant_with_calls(
            response.content.unwrap_or_default(),
            calls.clone(),
        ));

        for call in &calls {
            let result = if is_forbidden(&call.name) {
                warn!(task_id = %ctx.task_id, tool = %call.name, "Worker requested forbidden capability");
                format!(
                    "Error: tool '{}' is not available to background tasks",
                    call.name
                )
            } else {
                match ctx.tools.execute(&call.name, call.arguments.clone()).await {
                    Ok(output) => output,
                    Err(e) => format!("Error: {e}"),
                }
            };
            messages.push(Message::tool_result(call.id.clone(), result));
        }

        // Periodic adjustment: yield to the supervisor every N iterations.
        if ctx.limits.adjustment_interval > 0 && iterations % ctx.limits.adjustment_interval == 0 {
            if let Some(feedback) = request_adjustment(&ctx, &messages).await {
                messages.push(Message::system(format!(
                    "[Supervisor adjustment] {feedback}\nFold this guidance into your next steps."
                )));
            }
        }
    }

    // Ceiling reached with tool calls still pending.
    info!(task_id = %ctx.task_id, iterations, "Worker hit iteration ceiling");
    match last_text {
        Some(text) => WorkerOutcome {
            status: TaskStatus::Completed,
            result: Some(text),
            iterations,
        },
        None => WorkerOutcome {
            status: TaskStatus::Failed,
            result: Some("Iteration ceiling reached with no usable output".to_string()),
            iterations,
        },
    }
}

/// Issue one adjustment request and wait for resolution or timeout.
///
/// The status flips to `AwaitingAdjustment` for the duration of the wait
/// and back to `Running` afterwards; feedback never mutates task status.
async fn request_adjustment(
    ctx: &WorkerContext,
    transcript: &[Message],
) -> Option<serde_json::Value> {
    let pending = match ctx.adjustments.request(&ctx.task_id) {
        Ok(p) => p,
        Err(e) => {
            // An earlier request is still pending; skip this cycle.
            warn!(task_id = %ctx.task_id, "Skipping adjustment request: {e}");
            return None;
        }
    };

    ctx.session
        .set_task_status(&ctx.task_id, TaskStatus::AwaitingAdjustment);

    let excerpt = render_excerpt(transcript);
    // Surfacing the request is best-effort: with no channel listening the
    // wait simply times out.
    let _ = ctx.bus.publish_outbound(OutboundMessage::adjustment_request(
        ctx.origin_channel.clone(),
        ctx.origin_chat_id.clone(),
        &ctx.task_id,
        excerpt,
    ));

    let outcome = pending.wait(ctx.limits.adjustment_timeout).await;
    ctx.session.set_task_status(&ctx.task_id, TaskStatus::Running);

    match outcome {
        AdjustmentOutcome::Feedback(value) => {
            info!(task_id = %ctx.task_id, "Adjustment feedback received");
            Some(value)
        }
        AdjustmentOutcome::Unresolved => {
            debug!(task_id = %ctx.task_id, "Adjustment request timed out, proceeding unmodified");
            None
        }
    }
}

fn is_forbidden(tool_name: &str) -> bool {
    tool_name == DELEGATE_TOOL || tool_name == MESSAGE_TOOL
}

/// System prompt for a worker: the task, the cadence, the prohibitions.
fn build_worker_prompt(task: &str) -> String {
    format!(
        "You are a background worker spawned to complete a specific task.\n\n\
         ## Task\n{task}\n\n\
         ## Rules\n\
         1. Stay focused: complete only the assigned task.\n\
         2. Supervisor guidance may arrive periodically; fold it into your next steps.\n\
         3. Be concise but informative in your final answer.\n\n\
         ## What you cannot do\n\
         - Send messages directly to users\n\
         - Delegate further background tasks\n\
         - Access the parent conversation beyond the initial context provided"
    )
}

/// Render the spawn-time context snapshot as a single system message.
fn render_snapshot(snapshot: &[Message]) -> String {
    let mut out = String::from("## Initial context (parent conversation excerpt)\n");
    for msg in snapshot {
        out.push_str(&format!("{}: {}\n", role_name(msg.role), msg.content));
    }
    out
}

/// Bounded excerpt of the running transcript for an adjustment request.
fn render_excerpt(transcript: &[Message]) -> String {
    let start = transcript.len().saturating_sub(EXCERPT_MESSAGES);
    transcript[start..]
        .iter()
        .map(|msg| {
            let content: String = msg.content.chars().take(EXCERPT_CHARS).collect();
            format!("{}: {}", role_name(msg.role), content)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn role_name(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ToolCall;

    #[test]
    fn worker_prompt_names_task_and_prohibitions() {
        let prompt = build_worker_prompt("Summarize the report");
        assert!(prompt.contains("Summarize the report"));
        assert!(prompt.contains("cannot do"));
        assert!(prompt.contains("Delegate"));
    }

    #[test]
    fn forbidden_tools_are_exactly_delegation_and_messaging() {
        assert!(is_forbidden(DELEGATE_TOOL));
        assert!(is_forbidden(MESSAGE_TOOL));
        assert!(!is_forbidden("file_read"));
    }

    #[test]
    fn excerpt_is_bounded_in_messages_and_chars() {
        let mut transcript = Vec::new();
        for i in 0..10 {
            transcript.push(Message::assistant(format!("step {i} {}", "x".repeat(500))));
        }

        let excerpt = render_excerpt(&transcript);
        let lines: Vec<&str> = excerpt.lines().collect();
        assert_eq!(lines.len(), EXCERPT_MESSAGES);
        assert!(lines[0].contains("step 5"));
        assert!(lines.iter().all(|l| l.len() <= EXCERPT_CHARS + 20));
    }

    #[test]
    fn snapshot_renders_roles_in_order() {
        let snapshot = vec![
            Message::user("question"),
            Message::assistant_with_calls("working", vec![ToolCall::new("c1", "t", serde_json::json!({}))]),
        ];
        let rendered = render_snapshot(&snapshot);
        let user_pos = rendered.find("user: question").unwrap();
        let asst_pos = rendered.find("assistant: working").unwrap();
        assert!(user_pos < asst_pos);
    }
}
