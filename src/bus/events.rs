//! Message event types carried by the bus.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata key used to tag adjustment-protocol payloads.
pub const KIND_KEY: &str = "kind";
/// `kind` value for a published adjustment request.
pub const KIND_ADJUSTMENT_REQUEST: &str = "adjustment_request";
/// `kind` value for an externally-delivered adjustment resolution.
pub const KIND_ADJUSTMENT_RESPONSE: &str = "adjustment_response";

/// Message received from an external channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Channel type (cli, telegram, system, ...).
    pub channel: String,
    /// Sender identifier.
    pub sender_id: String,
    /// Chat/thread identifier.
    pub chat_id: String,
    /// Message text content.
    pub content: String,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    /// Channel-specific metadata.
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl InboundMessage {
    pub fn new(
        channel: impl Into<String>,
        sender_id: impl Into<String>,
        chat_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            channel: channel.into(),
            sender_id: sender_id.into(),
            chat_id: chat_id.into(),
            content: content.into(),
            timestamp: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    /// Session key this message routes to.
    pub fn session_key(&self) -> String {
        format!("{}:{}", self.channel, self.chat_id)
    }

    /// An adjustment resolution delivered from outside, carrying the task
    /// id and structured feedback in metadata.
    pub fn adjustment_response(
        channel: impl Into<String>,
        chat_id: impl Into<String>,
        task_id: impl Into<String>,
        feedback: serde_json::Value,
    ) -> Self {
        let task_id: String = task_id.into();
        let mut msg = Self::new(channel, "operator", chat_id, "");
        msg.metadata
            .insert(KIND_KEY.to_string(), serde_json::json!(KIND_ADJUSTMENT_RESPONSE));
        msg.metadata
            .insert("task_id".to_string(), serde_json::json!(task_id));
        msg.metadata.insert("feedback".to_string(), feedback);
        msg
    }

    /// The `kind` metadata tag, if any.
    pub fn kind(&self) -> Option<&str> {
        self.metadata.get(KIND_KEY).and_then(|v| v.as_str())
    }
}

/// Message published back to an external channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub channel: String,
    pub chat_id: String,
    pub content: String,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl OutboundMessage {
    pub fn new(
        channel: impl Into<String>,
        chat_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            channel: channel.into(),
            chat_id: chat_id.into(),
            content: content.into(),
            metadata: HashMap::new(),
        }
    }

    /// A published adjustment request: the task id and a bounded excerpt of
    /// the worker's transcript, addressed to the origin chat.
    pub fn adjustment_request(
        channel: impl Into<String>,
        chat_id: impl Into<String>,
        task_id: &str,
        excerpt: impl Into<String>,
    ) -> Self {
        let excerpt: String = excerpt.into();
        let mut msg = Self::new(
            channel,
            chat_id,
            format!(
                "[Adjustment request from task {task_id}]\n\n{excerpt}\n\n\
                 Reply with /adjust {task_id} <feedback> to steer it."
            ),
        );
        msg.metadata
            .insert(KIND_KEY.to_string(), serde_json::json!(KIND_ADJUSTMENT_REQUEST));
        msg.metadata
            .insert("task_id".to_string(), serde_json::json!(task_id));
        msg.metadata.insert(
            "requested_at".to_string(),
            serde_json::json!(Utc::now().to_rfc3339()),
        );
        msg
    }

    pub fn kind(&self) -> Option<&str> {
        self.metadata.get(KIND_KEY).and_then(|v| v.as_str())
    }
}
