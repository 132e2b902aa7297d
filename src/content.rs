//! Content persistence: storing tool-produced artifacts.
//!
//! The persistence store is an external collaborator; the core treats it as
//! fire-and-forget. Persistence failures are logged and swallowed, never
//! retried, and never fail the turn.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::PersistenceError;
use crate::provider::ToolInvocation;
use crate::tools::ToolOutput;

/// The persistence shapes the store understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Summary,
    FlashcardSet,
    Quiz,
    StudyPlan,
    Insights,
}

impl ContentKind {
    /// Collection name used by the store. The camelCase names are part of
    /// the stored data layout and must not change.
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Summary => "summaries",
            ContentKind::FlashcardSet => "flashcardSets",
            ContentKind::Quiz => "quizzes",
            ContentKind::StudyPlan => "studyPlans",
            ContentKind::Insights => "insights",
        }
    }
}

/// External adapter that stores tool-produced artifacts per user.
#[async_trait]
pub trait ContentPersistence: Send + Sync {
    async fn persist(
        &self,
        user_id: &str,
        kind: ContentKind,
        payload: Value,
    ) -> Result<(), PersistenceError>;
}

/// Persist every resolved, recognized tool artifact from a turn.
///
/// Unrecognized tool names and unresolved calls are skipped silently for
/// persistence (they stay in the conversation record regardless). Errors
/// from the store are logged and dropped.
pub async fn persist_tool_artifacts(
    store: &dyn ContentPersistence,
    user_id: &str,
    invocations: &[ToolInvocation],
) {
    for invocation in invocations {
        let Some(artifact) = ToolOutput::from_invocation(invocation) else {
            continue;
        };
        let kind = artifact.content_kind();
        if let Err(err) = store.persist(user_id, kind, artifact.into_payload()).await {
            log::error!(
                "failed to persist {} for user {user_id}: {err}",
                kind.as_str()
            );
        }
    }
}
