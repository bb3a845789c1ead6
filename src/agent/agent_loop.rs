//! The main control-loop state machine.
//!
//! One turn runs from an inbound message to a terminal answer:
//! `reasoning → {tool_execution | delegating | terminal}`, with tool
//! execution and delegation always returning to reasoning after state
//! merge. Delegation is non-blocking — the worker runs concurrently and
//! its completion surfaces as a system message in a later reasoning turn.
//!
//! Failures are absorbed, never propagated past the turn: a failing tool
//! becomes a tool-result message, a failing engine call counts toward a
//! small consecutive-failure budget, and hitting the turn-iteration guard
//! produces a reported message.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tracing::{info, warn};

use super::commands::{help_text, parse_command};
use crate::bus::events::KIND_ADJUSTMENT_RESPONSE;
use crate::bus::{InboundMessage, MessageBus, OutboundMessage};
use crate::config::AppConfig;
use crate::engine::{
    EngineOutcome, Message, ModelParams, ReasoningEngine, ToolCall, ToolDefinition,
};
use crate::orchestration::{DelegationRequest, SubagentManager};
use crate::session::{SessionStore, SharedSession};
use crate::tools::{ToolRegistry, DELEGATE_TOOL};

/// Schema of the delegation-trigger pseudo-tool advertised to the engine
/// alongside the real tools. Calls to it are intercepted by the loop, not
/// executed through the registry.
pub fn delegate_tool_definition() -> ToolDefinition {
    ToolDefinition::new(
        DELEGATE_TOOL,
        "Delegate a self-contained sub-task to a background worker. \
         The worker runs concurrently with this conversation and reports \
         its result back as a system message when it finishes.",
        json!({
            "type": "object",
            "properties": {
                "task": {
                    "type": "string",
                    "description": "Complete description of the sub-task"
                },
                "label": {
                    "type": "string",
                    "description": "Optional short label for status displays"
                }
            },
            "required": ["task"]
        }),
    )
}

/// The top-level agent loop: consumes inbound bus messages, drives one
/// turn per message, publishes terminal answers outbound.
pub struct AgentLoop {
    engine: Arc<dyn ReasoningEngine>,
    tools: ToolRegistry,
    bus: MessageBus,
    sessions: Arc<SessionStore>,
    manager: SubagentManager,
    params: ModelParams,
    system_prompt: Option<String>,
    history_window: usize,
    max_turn_iterations: u32,
    max_consecutive_engine_failures: u32,
    running: Arc<AtomicBool>,
}

impl AgentLoop {
    pub fn new(
        config: &AppConfig,
        engine: Arc<dyn ReasoningEngine>,
        tools: ToolRegistry,
        bus: MessageBus,
        sessions: Arc<SessionStore>,
    ) -> Self {
        let manager = SubagentManager::new(
            engine.clone(),
            &tools,
            bus.clone(),
            config.model_params(),
            config.worker_limits(),
            config.max_active_tasks,
            config.snapshot_window,
        );

        Self {
            engine,
            tools,
            bus,
            sessions,
            manager,
            params: config.model_params(),
            system_prompt: config.system_prompt.clone(),
            history_window: config.history_window,
            max_turn_iterations: config.max_turn_iterations,
            max_consecutive_engine_failures: config.max_consecutive_engine_failures,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn manager(&self) -> &SubagentManager {
        &self.manager
    }

    /// Run the loop, processing inbound messages until [`stop`] is called.
    ///
    /// [`stop`]: AgentLoop::stop
    pub async fn run(&self) -> anyhow::Result<()> {
        self.running.store(true, Ordering::SeqCst);
        info!("Agent loop started");

        let mut rx = self.bus.subscribe_inbound();

        while self.running.load(Ordering::SeqCst) {
            match tokio::time::timeout(Duration::from_secs(1), rx.recv()).await {
                Ok(Ok(msg)) => {
                    if let Some(reply) = self.handle_inbound(msg).await {
                        if let Err(e) = self.bus.publish_outbound(reply) {
                            warn!("Failed to publish outbound message: {e}");
                        }
                    }
                }
                Ok(Err(e)) => {
                    warn!("Inbound bus error: {e}");
                }
                Err(_) => {
                    // Timeout; re-check the running flag.
                }
            }
        }

        info!("Agent loop stopped");
        Ok(())
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        info!("Agent loop stopping");
    }

    /// Process one message directly and return the reply content. CLI and
    /// test callers use this instead of the bus loop.
    pub async fn process_direct(&self, content: &str, chat_id: &str) -> String {
        let msg = InboundMessage::new("cli", "user", chat_id, content);
        match self.handle_inbound(msg).await {
            Some(reply) => reply.content,
            None => String::new(),
        }
    }

    /// Dispatch one inbound message: adjustment resolutions and commands
    /// are handled without invoking the engine; everything else runs a
    /// full turn.
    pub async fn handle_inbound(&self, msg: InboundMessage) -> Option<OutboundMessage> {
        if msg.kind() == Some(KIND_ADJUSTMENT_RESPONSE) {
            self.apply_adjustment_response(&msg);
            return None;
        }

        let session = self.sessions.get_or_create(&msg.session_key()).await;

        if let Some((command, args)) = parse_command(&msg.content) {
            let reply = self.handle_command(&session, &command, args).await;
            return Some(OutboundMessage::new(msg.channel, msg.chat_id, reply));
        }

        let reply = self.process_turn(&session, &msg).await;
        Some(OutboundMessage::new(msg.channel, msg.chat_id, reply))
    }

    /// An externally-delivered adjustment resolution, tagged in metadata.
    fn apply_adjustment_response(&self, msg: &InboundMessage) {
        let task_id = msg
            .metadata
            .get("task_id")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        let feedback = msg.metadata.get("feedback").cloned().unwrap_or(json!(null));
        if task_id.is_empty() {
            warn!("Adjustment response without task_id");
            return;
        }
        self.manager.handle_adjustment(task_id, feedback);
    }

    async fn handle_command(&self, session: &SharedSession, command: &str, args: &str) -> String {
        match command {
            "/help" => help_text(),
            "/new" => {
                session.reset_messages();
                "Started a new conversation.".to_string()
            }
            "/status" => render_status(session),
            "/cancel" => {
                let task_id = args.split_whitespace().next().unwrap_or_default();
                if task_id.is_empty() {
                    return "Usage: /cancel <task-id>".to_string();
                }
                if self.manager.cancel(session, task_id) {
                    format!("Background task {task_id} cancelled.")
                } else {
                    format!("No running background task with id {task_id}.")
                }
            }
            "/adjust" => {
                let mut parts = args.splitn(2, char::is_whitespace);
                let task_id = parts.next().unwrap_or_default();
                let feedback = parts.next().unwrap_or_default().trim();
                if task_id.is_empty() || feedback.is_empty() {
                    return "Usage: /adjust <task-id> <feedback>".to_string();
                }
                if self
                    .manager
                    .handle_adjustment(task_id, json!({ "guidance": feedback }))
                {
                    format!("Adjustment delivered to task {task_id}.")
                } else {
                    format!("No pending adjustment request for task {task_id}.")
                }
            }
            unknown => format!("Unknown command: {unknown}\n{}", help_text()),
        }
    }

    /// Run one full turn for `msg`, returning the terminal answer.
    async fn process_turn(&self, session: &SharedSession, msg: &InboundMessage) -> String {
        session.begin_turn();
        session.append_message(Message::user(msg.content.clone()));

        let mut tool_defs = self.tools.definitions();
        tool_defs.push(delegate_tool_definition());

        let mut turn_iterations: u32 = 0;
        let mut consecutive_failures: u32 = 0;

        loop {
            // State merge: drop delegated tasks whose terminal status has
            // already been surfaced as a message.
            session.prune_surfaced_tasks();

            if turn_iterations >= self.max_turn_iterations {
                warn!(session = session.key(), "Turn iteration guard reached");
                let text = "I could not finish this request within the allowed \
                            number of steps."
                    .to_string();
                session.append_message(Message::assistant(text.clone()));
                return text;
            }
            turn_iterations += 1;

            let response = match self
                .engine
                .chat(&self.engine_messages(session), &tool_defs, &self.params)
                .await
            {
                Ok(resp) => {
                    consecutive_failures = 0;
                    resp
                }
                Err(e) => {
                    consecutive_failures += 1;
                    warn!(
                        session = session.key(),
                        consecutive_failures, "Engine call failed: {e}"
                    );
                    if consecutive_failures >= self.max_consecutive_engine_failures {
                        let text = format!("The reasoning engine is unavailable: {e}");
                        session.append_message(Message::assistant(text.clone()));
                        return text;
                    }
                    continue;
                }
            };

            let response_text = response.content.clone().unwrap_or_default();
            match response.classify(DELEGATE_TOOL) {
                EngineOutcome::Answer(text) => {
                    session.append_message(Message::assistant(text.clone()));
                    return text;
                }
                EngineOutcome::ToolCalls(calls) => {
                    self.execute_tool_calls(session, response_text, calls).await;
                }
                EngineOutcome::Delegate { call } => {
                    self.delegate(session, msg, response_text, call);
                }
            }
        }
    }

    /// Window of conversation sent to the engine, with the configured
    /// system prompt prepended (it is never stored in the session).
    fn engine_messages(&self, session: &SharedSession) -> Vec<Message> {
        let mut messages = Vec::new();
        if let Some(prompt) = &self.system_prompt {
            messages.push(Message::system(prompt.clone()));
        }
        messages.extend(session.recent_messages(self.history_window));
        messages
    }

    /// tool_execution state: run every call of the reasoning turn in
    /// order, appending a linked tool-result message for each. A failing
    /// tool is reported, never raised.
    async fn execute_tool_calls(&self, session: &SharedSession, text: String, calls: Vec<ToolCall>) {
        session.append_message(Message::assistant_with_calls(text, calls.clone()));

        for call in calls {
            session.note_tool_use(&call.name);
            let result = match self.tools.execute(&call.name, call.arguments.clone()).await {
                Ok(output) => output,
                Err(e) => format!("Error: {e}"),
            };
            session.append_message(Message::tool_result(call.id, result));
        }
    }

    /// delegating state: extract the request, spawn the worker without
    /// waiting, and acknowledge with the task id and active count.
    fn delegate(&self, session: &SharedSession, msg: &InboundMessage, text: String, call: ToolCall) {
        session.append_message(Message::assistant_with_calls(text, vec![call.clone()]));

        let Some(task) = call.str_arg("task").map(str::to_string) else {
            session.append_message(Message::tool_result(
                call.id,
                "Error: delegate requires a 'task' argument",
            ));
            return;
        };
        let request = DelegationRequest {
            task,
            label: call.str_arg("label").map(str::to_string),
        };
        let label = request.display_label();

        let ack = match self
            .manager
            .spawn(session, request, &msg.channel, &msg.chat_id)
        {
            Ok(task_id) => format!(
                "Background task '{label}' started (id: {task_id}). \
                 {} active delegated task(s).",
                session.active_task_count()
            ),
            Err(e) => format!("Error: could not start background task: {e}"),
        };
        session.append_message(Message::tool_result(call.id, ack));
    }
}

/// Render the delegated-task view for `/status`.
fn render_status(session: &SharedSession) -> String {
    let tasks = session.task_snapshot();
    if tasks.is_empty() {
        return "No delegated background tasks.".to_string();
    }
    let mut lines = vec!["Delegated background tasks:".to_string()];
    for task in tasks {
        lines.push(format!(
            "{}  {}  {}  {}/{} iterations",
            task.id,
            task.label,
            serde_json::to_value(task.status)
                .ok()
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_default(),
            task.iterations,
            task.iteration_ceiling,
        ));
    }
    lines.join("\n")
}
