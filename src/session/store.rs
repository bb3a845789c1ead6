//! Volatile session storage.
//!
//! The reference behavior is in-memory only: state is lost on restart. A
//! durable implementation must preserve the same data-model invariants
//! (message ordering, tool-result linkage, task-status monotonicity).

use std::collections::HashMap;

use tokio::sync::RwLock;

use super::{ConversationState, SharedSession};

/// In-memory map of session key → shared session handle.
#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, SharedSession>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the session for `key`, creating it on first use.
    pub async fn get_or_create(&self, key: &str) -> SharedSession {
        if let Some(session) = self.sessions.read().await.get(key) {
            return session.clone();
        }
        let mut sessions = self.sessions.write().await;
        sessions
            .entry(key.to_string())
            .or_insert_with(|| SharedSession::new(key))
            .clone()
    }

    pub async fn get(&self, key: &str) -> Option<SharedSession> {
        self.sessions.read().await.get(key).cloned()
    }

    /// Opaque save-style snapshot of one session's state.
    pub async fn snapshot(&self, key: &str) -> Option<ConversationState> {
        let session = self.get(key).await?;
        Some(session.snapshot())
    }

    pub async fn remove(&self, key: &str) -> bool {
        self.sessions.write().await.remove(key).is_some()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
