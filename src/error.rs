//! Error types for the study-assistant orchestration core.
//!
//! The taxonomy follows the propagation policy of the turn pipeline: only
//! [`TurnFailure`] variants ever cross the entry-point boundary; selection,
//! persistence, and session-store errors are absorbed into fallback values
//! internally.

use thiserror::Error;

/// Substrings that mark a provider error as throttling-class (retryable).
pub const THROTTLING_MARKERS: &[&str] = &["429", "rate limit", "quota", "overloaded"];

/// Substring that marks a provider error as a safety-filter block.
pub const SAFETY_MARKER: &str = "safety";

/// Errors from persona catalog access and selection.
///
/// Never fatal to a turn: callers degrade to the neutral default persona.
#[derive(Debug, Error)]
pub enum SelectionError {
    /// The catalog returned no personas. A hard failure for the selector
    /// itself, since there is nothing to resolve to.
    #[error("persona catalog is empty")]
    EmptyCatalog,

    /// The catalog adapter could not be reached.
    #[error("persona catalog unavailable: {0}")]
    CatalogUnavailable(String),
}

/// An error returned by the model provider.
///
/// The provider is a black box, so classification is substring-based on the
/// error text, matching the markers the upstream APIs actually emit.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ProviderError {
    /// Raw error text from the provider or transport layer.
    pub message: String,
}

impl ProviderError {
    /// Create a provider error from any displayable source.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Whether this error is throttling-class and therefore retryable.
    pub fn is_throttling(&self) -> bool {
        let lower = self.message.to_lowercase();
        THROTTLING_MARKERS.iter().any(|m| lower.contains(m))
    }

    /// Whether this error represents a safety-filter block.
    pub fn is_safety_blocked(&self) -> bool {
        self.message.to_lowercase().contains(SAFETY_MARKER)
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        Self::new(err.to_string())
    }
}

/// Terminal failure of a single conversation turn.
///
/// The entry point converts these into user-safe messages; callers never see
/// the raw error.
#[derive(Debug, Error)]
pub enum TurnFailure {
    /// The provider rejected the request via its safety filter.
    #[error("response blocked by safety filter: {0}")]
    SafetyBlocked(ProviderError),

    /// Any other provider failure, including throttling errors that
    /// survived the retry budget.
    #[error("provider call failed: {0}")]
    Provider(ProviderError),
}

impl From<ProviderError> for TurnFailure {
    fn from(err: ProviderError) -> Self {
        if err.is_safety_blocked() {
            TurnFailure::SafetyBlocked(err)
        } else {
            TurnFailure::Provider(err)
        }
    }
}

/// Failure to persist a tool-produced artifact. Logged and swallowed,
/// never retried, never surfaced to the caller.
#[derive(Debug, Error)]
#[error("content persistence failed: {0}")]
pub struct PersistenceError(pub String);

/// Failure in the session store. Load failures degrade to a fresh session;
/// save failures are logged and swallowed (last-writer-wins store).
#[derive(Debug, Error)]
#[error("session store error: {0}")]
pub struct SessionStoreError(pub String);
