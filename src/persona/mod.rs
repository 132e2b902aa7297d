//! Persona resolution: descriptors, catalog adapter, deterministic
//! embeddings, and the priority-chain selector.
//!
//! A persona is a named response-style configuration (tone + system
//! instruction) applied to a turn. The catalog is an external collaborator
//! and is consumed read-only; selection never mutates it.

pub mod cache;
pub mod embedding;
pub mod selector;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::SelectionError;

pub use cache::EmbeddingCache;
pub use embedding::EmbeddingVector;
pub use selector::{PersonaSelector, SelectorConfig};

/// Id of the reserved sentinel persona ("pick for me"). It is never a valid
/// selection target and is filtered out of every candidate set.
pub const SENTINEL_PERSONA_ID: &str = "auto";

/// Id of the designated neutral persona used when nothing else resolves.
pub const DEFAULT_PERSONA_ID: &str = "gurt";

/// An immutable persona descriptor as sourced from the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonaDescriptor {
    /// Stable catalog id.
    pub id: String,
    /// Short machine-friendly name (matched against explicit mentions).
    pub name: String,
    /// Human-facing display name.
    pub display_name: String,
    /// One-paragraph description of the persona's style.
    pub description: String,
    /// System-instruction template applied when this persona answers.
    pub prompt_template: String,
    /// Optional avatar reference (URL or emoji), UI-only.
    #[serde(default)]
    pub avatar_ref: Option<String>,
}

/// How a persona was chosen for a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionMethod {
    /// Caller-supplied id or an explicit mention in the prompt.
    Explicit,
    /// Embedding cosine-similarity arg-max.
    Semantic,
    /// Keyword-table scoring.
    Fallback,
    /// The designated neutral persona.
    Default,
}

/// The outcome of persona selection for one prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaSelectionResult {
    pub persona_id: String,
    pub persona_name: String,
    /// Roughly bounded in [-1, 1]; cosine scores can be slightly negative.
    pub confidence: f64,
    /// Human-readable justification, for monitoring.
    pub reason: String,
    pub method: SelectionMethod,
}

/// External collaborator providing the persona list. Read-only.
#[async_trait]
pub trait PersonaCatalog: Send + Sync {
    /// Fetch every persona descriptor, sentinel included.
    async fn fetch_all(&self) -> Result<Vec<PersonaDescriptor>, SelectionError>;
}

/// A fixed in-memory catalog, used in tests and simple deployments.
#[derive(Debug, Clone, Default)]
pub struct StaticPersonaCatalog {
    personas: Vec<PersonaDescriptor>,
}

impl StaticPersonaCatalog {
    pub fn new(personas: Vec<PersonaDescriptor>) -> Self {
        Self { personas }
    }
}

#[async_trait]
impl PersonaCatalog for StaticPersonaCatalog {
    async fn fetch_all(&self) -> Result<Vec<PersonaDescriptor>, SelectionError> {
        Ok(self.personas.clone())
    }
}

impl PersonaDescriptor {
    /// Convenience constructor for catalogs built in code.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        prompt_template: impl Into<String>,
    ) -> Self {
        let name = name.into();
        Self {
            id: id.into(),
            display_name: name.clone(),
            name,
            description: description.into(),
            prompt_template: prompt_template.into(),
            avatar_ref: None,
        }
    }
}
