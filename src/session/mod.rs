//! Conversation sessions: identity, state, and the store seam.
//!
//! Session identity is owned by the caller pair `(user_id, chat_session_id)`;
//! the composite key keeps one user's sessions from colliding with another's
//! in a flat store.

pub mod history;
pub mod turn;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::error::SessionStoreError;
use crate::provider::{Content, ToolInvocation};

pub use turn::{Attachment, ChatTurnRunner, TurnInput, TurnOutput};

/// Maximum length of an auto-generated session title.
const TITLE_MAX_CHARS: usize = 40;

/// Composite storage key for a session.
pub fn session_key(user_id: &str, chat_session_id: &str) -> String {
    format!("{user_id}_{chat_session_id}")
}

/// Durable state of one conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub session_id: String,
    pub title: String,
    /// Persona bound at creation. Stays bound for the life of the session
    /// even if the persona later disappears from the catalog.
    pub bound_persona_id: Option<String>,
    pub messages: Vec<Content>,
    #[serde(default)]
    pub tool_records: Vec<ToolInvocation>,
    pub updated_at: DateTime<Utc>,
}

impl SessionState {
    /// Fresh session titled from the first user message.
    pub fn new(
        session_id: impl Into<String>,
        first_message: &str,
        bound_persona_id: Option<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            title: first_message.chars().take(TITLE_MAX_CHARS).collect(),
            bound_persona_id,
            messages: Vec::new(),
            tool_records: Vec::new(),
            updated_at: Utc::now(),
        }
    }
}

/// Session storage seam. Load errors and save errors are surfaced so the
/// turn layer can decide how to degrade; the store itself never does.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// `Ok(None)` means the key does not exist (not an error).
    async fn load(
        &self,
        user_id: &str,
        chat_session_id: &str,
    ) -> Result<Option<SessionState>, SessionStoreError>;

    async fn save(
        &self,
        user_id: &str,
        chat_session_id: &str,
        state: &SessionState,
    ) -> Result<(), SessionStoreError>;
}

/// Process-local store used in tests and single-node deployments.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: DashMap<String, SessionState>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn load(
        &self,
        user_id: &str,
        chat_session_id: &str,
    ) -> Result<Option<SessionState>, SessionStoreError> {
        Ok(self
            .sessions
            .get(&session_key(user_id, chat_session_id))
            .map(|entry| entry.value().clone()))
    }

    async fn save(
        &self,
        user_id: &str,
        chat_session_id: &str,
        state: &SessionState,
    ) -> Result<(), SessionStoreError> {
        self.sessions
            .insert(session_key(user_id, chat_session_id), state.clone());
        Ok(())
    }
}
