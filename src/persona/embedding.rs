//! Deterministic feature-hash embeddings for persona matching.
//!
//! This is not a learned embedding: it is a fixed-width feature vector built
//! from letter frequencies, domain word stems, and punctuation counts. The
//! exact layout is compatibility-critical; downstream similarity scores are
//! stable across processes and releases because the construction is pure.

use serde::{Deserialize, Serialize};

/// Fixed width of every embedding vector.
pub const EMBEDDING_WIDTH: usize = 100;

/// Word stems the study domain cares about, one feature dimension each.
pub const DOMAIN_STEMS: [&str; 10] = [
    "writ", "code", "expl", "summ", "memo", "idea", "exam", "stra", "crea", "simp",
];

/// A fixed-length, L2-normalized feature vector derived from text.
///
/// Invariant: unit magnitude, unless the source text yields an all-zero
/// feature vector (which is left as the zero vector).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingVector(Vec<f64>);

impl EmbeddingVector {
    /// Build the embedding for a piece of text.
    ///
    /// Layout:
    /// - dims 0..26: lower-case letter frequency over the normalized text
    ///   (every character outside `[a-z0-9\s]` replaced by a space);
    /// - dims 26..36: counts of normalized words starting with each entry
    ///   of [`DOMAIN_STEMS`], in declared order;
    /// - dims 36..41: `?` count, `.` count, `!` count (over the original
    ///   text), word count, character count;
    /// - dims 41..100: zero padding.
    pub fn from_text(text: &str) -> Self {
        let normalized: String = text
            .to_lowercase()
            .chars()
            .map(|c| {
                if c.is_ascii_lowercase() || c.is_ascii_digit() || c.is_whitespace() {
                    c
                } else {
                    ' '
                }
            })
            .collect();
        let words: Vec<&str> = normalized.split_whitespace().collect();

        let mut vector = vec![0.0f64; EMBEDDING_WIDTH];

        for c in normalized.chars() {
            if c.is_ascii_lowercase() {
                vector[(c as usize) - ('a' as usize)] += 1.0;
            }
        }

        for (idx, stem) in DOMAIN_STEMS.iter().enumerate() {
            vector[26 + idx] = words.iter().filter(|w| w.starts_with(stem)).count() as f64;
        }

        vector[36] = text.matches('?').count() as f64;
        vector[37] = text.matches('.').count() as f64;
        vector[38] = text.matches('!').count() as f64;
        vector[39] = words.len() as f64;
        vector[40] = text.chars().count() as f64;

        let magnitude = vector.iter().map(|v| v * v).sum::<f64>().sqrt();
        if magnitude > 0.0 {
            for v in &mut vector {
                *v /= magnitude;
            }
        }

        Self(vector)
    }

    /// Cosine similarity with another vector, bounded in [-1, 1].
    ///
    /// Returns 0.0 when either vector has zero magnitude or the widths
    /// differ.
    pub fn cosine_similarity(&self, other: &Self) -> f64 {
        if self.0.len() != other.0.len() {
            return 0.0;
        }
        let mut dot = 0.0;
        let mut mag_a = 0.0;
        let mut mag_b = 0.0;
        for (a, b) in self.0.iter().zip(other.0.iter()) {
            dot += a * b;
            mag_a += a * a;
            mag_b += b * b;
        }
        let magnitude = mag_a.sqrt() * mag_b.sqrt();
        if magnitude > 0.0 {
            dot / magnitude
        } else {
            0.0
        }
    }

    /// Whether every feature is zero (e.g. for empty or symbol-only text).
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|v| *v == 0.0)
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }
}
