//! Tool boundary: the [`Tool`] trait and the [`registry::ToolRegistry`].
//!
//! Concrete tool implementations (file I/O, shell, web) are collaborators
//! outside this core; the registry only needs their schemas and an execute
//! front door.

pub mod registry;

pub use registry::ToolRegistry;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::ToolError;

/// Name of the delegation-trigger pseudo-tool. It is advertised to the
/// engine alongside real tools but intercepted by the main loop instead of
/// being executed through the registry.
pub const DELEGATE_TOOL: &str = "delegate";

/// Name of the direct-user-messaging tool. Workers must not reach it; the
/// worker loop rejects calls to it with a synthetic error result.
pub const MESSAGE_TOOL: &str = "send_message";

/// A callable capability advertised to the reasoning engine.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON Schema for the arguments object.
    fn parameters(&self) -> Value;

    async fn execute(&self, args: Value) -> Result<String, ToolError>;
}
