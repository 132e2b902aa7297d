//! Priority-chain persona selection.
//!
//! The chain is an ordered list of strategies; the selector runs them in
//! order and takes the first result. The final strategy always yields, so
//! selection over a non-empty candidate set cannot fail:
//!
//! 1. caller-supplied explicit id;
//! 2. explicit mention in the prompt ("as Gurt", "use Dex", ...);
//! 3. embedding cosine similarity against each persona description;
//! 4. keyword-table scoring;
//! 5. the designated neutral persona.

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::SelectionError;

use super::cache::EmbeddingCache;
use super::embedding::EmbeddingVector;
use super::{
    PersonaDescriptor, PersonaSelectionResult, SelectionMethod, DEFAULT_PERSONA_ID,
    SENTINEL_PERSONA_ID,
};

/// Below this confidence a selection is logged for monitoring. It is still
/// returned; the floor never rejects a result.
pub const MIN_CONFIDENCE_THRESHOLD: f64 = 0.3;

/// Patterns that capture an explicit persona mention, in priority order.
static MENTION_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)\bas\s+(\w+)",
        r"(?i)\buse\s+(\w+)",
        r"(?i)\bwith\s+(\w+)",
        r"(?i)\blike\s+(\w+)\s+would",
        r"(?i)\bin\s+(\w+)'s\s+style",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("mention pattern is valid"))
    .collect()
});

struct KeywordRule {
    keywords: &'static [&'static str],
    /// Substring matched against persona ids and names.
    persona_pattern: &'static str,
    weight: f64,
}

/// Fixed keyword table used when the semantic path cannot run.
const KEYWORD_RULES: &[KeywordRule] = &[
    KeywordRule {
        keywords: &[
            "essay", "write", "paper", "article", "thesis", "argument", "persuasive", "academic",
        ],
        persona_pattern: "essay",
        weight: 1.0,
    },
    KeywordRule {
        keywords: &[
            "code", "program", "function", "debug", "python", "javascript", "java", "algorithm",
            "implement",
        ],
        persona_pattern: "code",
        weight: 1.0,
    },
    KeywordRule {
        keywords: &[
            "simple", "explain like", "eli5", "basic", "beginner", "easy", "understand", "confused",
        ],
        persona_pattern: "baby",
        weight: 1.0,
    },
    KeywordRule {
        keywords: &[
            "quick", "brief", "concise", "short", "tldr", "summary", "bullet", "direct",
        ],
        persona_pattern: "straight",
        weight: 1.0,
    },
    KeywordRule {
        keywords: &[
            "detail", "depth", "comprehensive", "thorough", "explain everything", "deep dive",
            "complete",
        ],
        persona_pattern: "lore",
        weight: 1.0,
    },
    KeywordRule {
        keywords: &[
            "memorize", "remember", "mnemonic", "recall", "study tips", "retention", "flashcard",
        ],
        persona_pattern: "memory",
        weight: 1.0,
    },
    KeywordRule {
        keywords: &[
            "idea", "brainstorm", "creative", "think", "suggest", "alternative", "possibilities",
        ],
        persona_pattern: "idea",
        weight: 1.0,
    },
    KeywordRule {
        keywords: &[
            "exam", "test", "quiz", "practice", "prepare", "strategy", "study plan",
        ],
        persona_pattern: "exam",
        weight: 1.0,
    },
];

/// One step of the priority chain.
///
/// Strategies are pure over their inputs; the embedding cache is passed in
/// so the semantic step can memoize per catalog revision.
pub trait SelectionStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Attempt to select a persona. `None` means "fall through to the next
    /// strategy".
    fn attempt(
        &self,
        prompt: &str,
        candidates: &[PersonaDescriptor],
        cache: &EmbeddingCache,
    ) -> Option<PersonaSelectionResult>;
}

/// Detects explicit persona mentions in the prompt text.
pub struct ExplicitMentionStrategy;

impl SelectionStrategy for ExplicitMentionStrategy {
    fn name(&self) -> &'static str {
        "explicit-mention"
    }

    fn attempt(
        &self,
        prompt: &str,
        candidates: &[PersonaDescriptor],
        _cache: &EmbeddingCache,
    ) -> Option<PersonaSelectionResult> {
        for pattern in MENTION_PATTERNS.iter() {
            for captures in pattern.captures_iter(prompt) {
                let token = captures.get(1)?.as_str().to_lowercase();
                let matched = candidates.iter().find(|p| {
                    p.name.to_lowercase() == token
                        || p.display_name.to_lowercase().contains(&token)
                });
                if let Some(persona) = matched {
                    return Some(PersonaSelectionResult {
                        persona_id: persona.id.clone(),
                        persona_name: persona.name.clone(),
                        confidence: 1.0,
                        reason: "Explicit mention in prompt".to_string(),
                        method: SelectionMethod::Explicit,
                    });
                }
            }
        }
        None
    }
}

/// Ranks candidates by embedding cosine similarity to the prompt.
pub struct SemanticStrategy;

impl SelectionStrategy for SemanticStrategy {
    fn name(&self) -> &'static str {
        "semantic"
    }

    fn attempt(
        &self,
        prompt: &str,
        candidates: &[PersonaDescriptor],
        cache: &EmbeddingCache,
    ) -> Option<PersonaSelectionResult> {
        let prompt_embedding = EmbeddingVector::from_text(prompt);
        let embeddings: HashMap<String, EmbeddingVector> = cache.embeddings_for(candidates);

        // Arg-max in catalog iteration order; strict comparison keeps the
        // earliest candidate on ties.
        let mut best: Option<(&PersonaDescriptor, f64)> = None;
        for persona in candidates {
            let Some(embedding) = embeddings.get(&persona.id) else {
                continue;
            };
            let score = prompt_embedding.cosine_similarity(embedding);
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((persona, score));
            }
        }

        let (persona, score) = best?;
        if score < MIN_CONFIDENCE_THRESHOLD {
            log::warn!(
                "low-confidence persona selection: id={} confidence={:.3} prompt={:.100}",
                persona.id,
                score,
                prompt
            );
        }
        Some(PersonaSelectionResult {
            persona_id: persona.id.clone(),
            persona_name: persona.name.clone(),
            confidence: score,
            reason: format!("Semantic similarity: {:.1}%", score * 100.0),
            method: SelectionMethod::Semantic,
        })
    }
}

/// Scores candidates against the fixed keyword table.
pub struct KeywordFallbackStrategy;

impl SelectionStrategy for KeywordFallbackStrategy {
    fn name(&self) -> &'static str {
        "keyword-fallback"
    }

    fn attempt(
        &self,
        prompt: &str,
        candidates: &[PersonaDescriptor],
        _cache: &EmbeddingCache,
    ) -> Option<PersonaSelectionResult> {
        let lower = prompt.to_lowercase();
        let mut scores: HashMap<&str, f64> = HashMap::new();

        for rule in KEYWORD_RULES {
            let rule_score: f64 = rule
                .keywords
                .iter()
                .filter(|k| lower.contains(*k))
                .map(|_| rule.weight)
                .sum();
            if rule_score <= 0.0 {
                continue;
            }
            let matched = candidates.iter().find(|p| {
                p.id.to_lowercase().contains(rule.persona_pattern)
                    || p.name.to_lowercase().contains(rule.persona_pattern)
            });
            if let Some(persona) = matched {
                *scores.entry(persona.id.as_str()).or_default() += rule_score;
            }
        }

        // Highest score wins; candidate order breaks ties.
        let mut best: Option<(&PersonaDescriptor, f64)> = None;
        for persona in candidates {
            let Some(score) = scores.get(persona.id.as_str()) else {
                continue;
            };
            if best.map_or(true, |(_, s)| *score > s) {
                best = Some((persona, *score));
            }
        }

        let (persona, score) = best?;
        Some(PersonaSelectionResult {
            persona_id: persona.id.clone(),
            persona_name: persona.name.clone(),
            confidence: (score / 3.0).min(1.0),
            reason: format!("Keyword matching ({score:.1} matches)"),
            method: SelectionMethod::Fallback,
        })
    }
}

/// Terminal strategy: the designated neutral persona, or the first catalog
/// entry when the neutral one is missing. Always yields.
pub struct DefaultStrategy {
    default_id: String,
}

impl SelectionStrategy for DefaultStrategy {
    fn name(&self) -> &'static str {
        "default"
    }

    fn attempt(
        &self,
        _prompt: &str,
        candidates: &[PersonaDescriptor],
        _cache: &EmbeddingCache,
    ) -> Option<PersonaSelectionResult> {
        let persona = candidates
            .iter()
            .find(|p| p.id == self.default_id)
            .or_else(|| candidates.first())?;
        Some(PersonaSelectionResult {
            persona_id: persona.id.clone(),
            persona_name: persona.name.clone(),
            confidence: 0.1,
            reason: "No strong match, using default".to_string(),
            method: SelectionMethod::Default,
        })
    }
}

/// Selector configuration: which persona is the sentinel and which is the
/// neutral default.
#[derive(Debug, Clone)]
pub struct SelectorConfig {
    pub sentinel_id: String,
    pub default_id: String,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            sentinel_id: SENTINEL_PERSONA_ID.to_string(),
            default_id: DEFAULT_PERSONA_ID.to_string(),
        }
    }
}

/// Resolves which persona should answer a prompt.
pub struct PersonaSelector {
    config: SelectorConfig,
    cache: Arc<EmbeddingCache>,
    strategies: Vec<Box<dyn SelectionStrategy>>,
}

impl Default for PersonaSelector {
    fn default() -> Self {
        Self::new(SelectorConfig::default())
    }
}

impl PersonaSelector {
    pub fn new(config: SelectorConfig) -> Self {
        let cache = Arc::new(EmbeddingCache::new(config.sentinel_id.clone()));
        let strategies: Vec<Box<dyn SelectionStrategy>> = vec![
            Box::new(ExplicitMentionStrategy),
            Box::new(SemanticStrategy),
            Box::new(KeywordFallbackStrategy),
            Box::new(DefaultStrategy {
                default_id: config.default_id.clone(),
            }),
        ];
        Self {
            config,
            cache,
            strategies,
        }
    }

    /// The embedding cache backing the semantic strategy. Exposed so the
    /// owner can invalidate it when the catalog changes out-of-band.
    pub fn cache(&self) -> &EmbeddingCache {
        &self.cache
    }

    pub fn config(&self) -> &SelectorConfig {
        &self.config
    }

    /// Resolve a persona for `prompt`.
    ///
    /// `explicit_persona_id` is the caller-supplied selection (e.g. from the
    /// UI); it wins outright when it names a real, non-sentinel persona.
    /// An empty candidate set is a hard failure, never silently resolved.
    pub fn select(
        &self,
        prompt: &str,
        explicit_persona_id: Option<&str>,
        catalog: &[PersonaDescriptor],
    ) -> Result<PersonaSelectionResult, SelectionError> {
        let candidates: Vec<PersonaDescriptor> = catalog
            .iter()
            .filter(|p| p.id != self.config.sentinel_id)
            .cloned()
            .collect();
        if candidates.is_empty() {
            return Err(SelectionError::EmptyCatalog);
        }

        if let Some(id) = explicit_persona_id {
            if let Some(persona) = candidates.iter().find(|p| p.id == id) {
                return Ok(PersonaSelectionResult {
                    persona_id: persona.id.clone(),
                    persona_name: persona.name.clone(),
                    confidence: 1.0,
                    reason: "Caller-supplied persona id".to_string(),
                    method: SelectionMethod::Explicit,
                });
            }
            log::warn!("caller-supplied persona id {id:?} not in catalog, resolving from prompt");
        }

        for strategy in &self.strategies {
            if let Some(result) = strategy.attempt(prompt, &candidates, &self.cache) {
                log::debug!(
                    "persona selected: id={} method={:?} confidence={:.3} via {}",
                    result.persona_id,
                    result.method,
                    result.confidence,
                    strategy.name()
                );
                return Ok(result);
            }
        }

        // Unreachable with a non-empty candidate set, since the default
        // strategy always yields; kept as a defensive hard failure.
        Err(SelectionError::EmptyCatalog)
    }
}
