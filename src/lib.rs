//! # studycore
//!
//! Orchestration core for a conversational study assistant: persona
//! resolution with memoized deterministic embeddings, a sliding-window rate
//! limiter with exponential-backoff retries, single-round tool-calling
//! conversation turns with artifact persistence, and a map-reduce document
//! summarizer.
//!
//! External systems plug in through adapter traits: [`PersonaCatalog`],
//! [`ModelProvider`], [`SessionStore`], and [`ContentPersistence`]. A
//! concrete Gemini provider ships in [`provider::gemini`].

pub mod content;
pub mod error;
pub mod persona;
pub mod provider;
pub mod session;
pub mod summarizer;
pub mod tools;
pub mod utilities;

pub use content::{ContentKind, ContentPersistence};
pub use error::{ProviderError, SelectionError, TurnFailure};
pub use persona::{
    PersonaCatalog, PersonaDescriptor, PersonaSelectionResult, PersonaSelector, SelectionMethod,
};
pub use provider::{Content, ModelProvider, Role, TurnRequest, TurnResponse};
pub use session::{
    Attachment, ChatTurnRunner, InMemorySessionStore, SessionState, SessionStore, TurnInput,
    TurnOutput,
};
pub use summarizer::summarize_map_reduce;
pub use utilities::{RateLimitConfig, RateLimiter};
