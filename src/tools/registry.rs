//! Registry of tools available to a reasoning loop.
//!
//! Registration order is preserved so tool definitions reach the engine in
//! a stable order. Workers get a restricted view via [`ToolRegistry::without`]
//! that strips delegation and user-messaging capabilities.

use std::sync::Arc;

use serde_json::Value;
use tracing::warn;

use super::Tool;
use crate::engine::ToolDefinition;
use crate::error::ToolError;

/// Ordered collection of [`Tool`]s with an execute front door.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// Register a tool. A duplicate name replaces the earlier entry, with a
    /// warning, so callers can override defaults.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        if let Some(existing) = self.tools.iter_mut().find(|t| t.name() == tool.name()) {
            warn!(name = tool.name(), "Replacing already-registered tool");
            *existing = tool;
        } else {
            self.tools.push(tool);
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.iter().any(|t| t.name() == name)
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Tool schemas in registration order, for the engine call.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .map(|t| ToolDefinition::new(t.name(), t.description(), t.parameters()))
            .collect()
    }

    /// Execute a tool by name.
    ///
    /// Errors are returned, not raised past the caller: both loops convert
    /// them into tool-result messages so the model observes the failure.
    pub async fn execute(&self, name: &str, args: Value) -> Result<String, ToolError> {
        let tool = self
            .tools
            .iter()
            .find(|t| t.name() == name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;
        tool.execute(args).await
    }

    /// A copy of this registry with the named tools removed. Used to build
    /// the isolated subset handed to subagent workers.
    pub fn without(&self, excluded: &[&str]) -> Self {
        Self {
            tools: self
                .tools
                .iter()
                .filter(|t| !excluded.contains(&t.name()))
                .cloned()
                .collect(),
        }
    }
}
