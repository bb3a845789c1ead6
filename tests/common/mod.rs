//! Shared test doubles: a scripted reasoning engine and simple tools.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};

use drover::engine::{
    EngineResponse, Message, ModelParams, ReasoningEngine, Role, ToolCall, ToolDefinition,
};
use drover::error::{EngineError, ToolError};
use drover::tools::Tool;

/// Marker present in every worker system prompt; the mock engine uses it
/// to route calls to the worker script.
const WORKER_MARKER: &str = "background worker";

type Scripted = Result<EngineResponse, String>;

/// Scripted engine with separate response queues for the main loop and
/// for subagent workers (detected by their system prompt), so concurrent
/// execution stays deterministic.
#[derive(Default)]
pub struct MockEngine {
    main_script: Mutex<VecDeque<Scripted>>,
    worker_script: Mutex<VecDeque<Scripted>>,
    main_fallback: Mutex<EngineResponse>,
    worker_fallback: Mutex<EngineResponse>,
    main_calls: AtomicU32,
    worker_calls: AtomicU32,
    worker_transcripts: Mutex<Vec<Vec<Message>>>,
}

impl MockEngine {
    pub fn new() -> Arc<Self> {
        let engine = Self::default();
        *engine.main_fallback.lock().unwrap() = EngineResponse::text("[main script exhausted]");
        *engine.worker_fallback.lock().unwrap() = EngineResponse::text("worker done");
        Arc::new(engine)
    }

    pub fn main_push_text(&self, text: &str) {
        self.main_script
            .lock()
            .unwrap()
            .push_back(Ok(EngineResponse::text(text)));
    }

    pub fn main_push_calls(&self, calls: Vec<ToolCall>) {
        self.main_script
            .lock()
            .unwrap()
            .push_back(Ok(EngineResponse::with_calls(None, calls)));
    }

    pub fn main_push_error(&self, message: &str) {
        self.main_script
            .lock()
            .unwrap()
            .push_back(Err(message.to_string()));
    }

    pub fn worker_push_text(&self, text: &str) {
        self.worker_script
            .lock()
            .unwrap()
            .push_back(Ok(EngineResponse::text(text)));
    }

    pub fn worker_push_calls(&self, calls: Vec<ToolCall>) {
        self.worker_script
            .lock()
            .unwrap()
            .push_back(Ok(EngineResponse::with_calls(None, calls)));
    }

    pub fn worker_push_response(&self, response: EngineResponse) {
        self.worker_script.lock().unwrap().push_back(Ok(response));
    }

    pub fn worker_push_error(&self, message: &str) {
        self.worker_script
            .lock()
            .unwrap()
            .push_back(Err(message.to_string()));
    }

    /// Response returned to workers once their script is exhausted.
    pub fn set_worker_fallback(&self, response: EngineResponse) {
        *self.worker_fallback.lock().unwrap() = response;
    }

    pub fn main_calls(&self) -> u32 {
        self.main_calls.load(Ordering::SeqCst)
    }

    pub fn worker_calls(&self) -> u32 {
        self.worker_calls.load(Ordering::SeqCst)
    }

    /// Message sequences workers sent to the engine, in call order.
    pub fn worker_transcripts(&self) -> Vec<Vec<Message>> {
        self.worker_transcripts.lock().unwrap().clone()
    }

    fn is_worker_call(messages: &[Message]) -> bool {
        messages
            .iter()
            .any(|m| m.role == Role::System && m.content.contains(WORKER_MARKER))
    }
}

#[async_trait]
impl ReasoningEngine for MockEngine {
    async fn chat(
        &self,
        messages: &[Message],
        _tools: &[ToolDefinition],
        _params: &ModelParams,
    ) -> Result<EngineResponse, EngineError> {
        let (script, fallback, counter) = if Self::is_worker_call(messages) {
            self.worker_transcripts
                .lock()
                .unwrap()
                .push(messages.to_vec());
            (
                &self.worker_script,
                &self.worker_fallback,
                &self.worker_calls,
            )
        } else {
            (&self.main_script, &self.main_fallback, &self.main_calls)
        };

        counter.fetch_add(1, Ordering::SeqCst);

        let next = script.lock().unwrap().pop_front();
        match next {
            Some(Ok(response)) => Ok(response),
            Some(Err(message)) => Err(EngineError::RequestFailed(message)),
            None => Ok(fallback.lock().unwrap().clone()),
        }
    }
}

/// A response that requests one call of the named tool.
pub fn call(id: &str, tool: &str, args: Value) -> ToolCall {
    ToolCall::new(id, tool, args)
}

/// A tool-calling response that also carries assistant text.
pub fn calls_with_text(text: &str, calls: Vec<ToolCall>) -> EngineResponse {
    EngineResponse::with_calls(Some(text.to_string()), calls)
}

/// Tool that echoes its "text" argument.
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echo the given text back"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {"text": {"type": "string"}},
            "required": ["text"]
        })
    }

    async fn execute(&self, args: Value) -> Result<String, ToolError> {
        let text = args.get("text").and_then(|v| v.as_str()).unwrap_or("");
        Ok(format!("echo: {text}"))
    }
}

/// Poll until the task reaches a terminal status. Works under a paused
/// clock: the sleeps drive auto-advance.
pub async fn wait_terminal(
    session: &drover::session::SharedSession,
    id: &str,
) -> drover::orchestration::DelegatedTask {
    for _ in 0..2000 {
        if let Some(task) = session.task(id) {
            if task.status.is_terminal() {
                return task;
            }
        }
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    }
    panic!("task {id} never reached a terminal status");
}

/// Poll until `cond` holds.
pub async fn wait_for(mut cond: impl FnMut() -> bool) {
    for _ in 0..2000 {
        if cond() {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    }
    panic!("condition never became true");
}

/// Tool that always fails.
pub struct FailingTool;

#[async_trait]
impl Tool for FailingTool {
    fn name(&self) -> &str {
        "flaky"
    }

    fn description(&self) -> &str {
        "Always fails"
    }

    fn parameters(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, _args: Value) -> Result<String, ToolError> {
        Err(ToolError::ExecutionFailed("boom".to_string()))
    }
}
