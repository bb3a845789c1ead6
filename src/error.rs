use std::path::PathBuf;

/// Errors related to configuration loading and parsing.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config at {path}: {message}")]
    ParseError { path: PathBuf, message: String },
}

/// Errors from the reasoning-engine boundary. The core never treats these
/// as fatal: each one counts as a failed iteration of the owning loop.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Engine request failed: {0}")]
    RequestFailed(String),

    #[error("Engine returned an unusable response: {0}")]
    InvalidResponse(String),
}

/// Errors from tool execution. Callers convert these into tool-result
/// messages so the model can observe the failure and react.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Invalid tool arguments for {name}: {message}")]
    InvalidArguments { name: String, message: String },

    #[error("Tool execution failed: {0}")]
    ExecutionFailed(String),
}

/// Errors from the adjustment protocol.
#[derive(Debug, thiserror::Error)]
pub enum AdjustmentError {
    /// At most one adjustment request may be pending per task. The caller
    /// may retry after the pending one resolves or expires.
    #[error("An adjustment request is already pending for task {0}")]
    DuplicateRequest(String),
}

/// Errors from the in-process message bus.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("Failed to publish message: {0}")]
    SendFailed(String),
}
