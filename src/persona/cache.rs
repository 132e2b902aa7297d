//! Memoized persona embeddings.
//!
//! Persona descriptions rarely change, so their embeddings are computed once
//! per catalog revision and reused across selections. The cache key is a
//! content hash of the catalog (ids, names, display names, descriptions),
//! so any edit, addition, or removal forces recomputation; a TTL and an
//! explicit `invalidate()` cover out-of-band catalog updates.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use sha2::{Digest, Sha256};

use super::embedding::EmbeddingVector;
use super::PersonaDescriptor;

/// How long a computed set of embeddings stays fresh.
pub const CACHE_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug)]
struct CacheEntry {
    catalog_hash: String,
    computed_at: Instant,
    embeddings: HashMap<String, EmbeddingVector>,
}

/// Thread-safe cache of `{persona_id -> embedding}` for one catalog revision.
#[derive(Debug)]
pub struct EmbeddingCache {
    entry: Mutex<Option<CacheEntry>>,
    ttl: Duration,
    /// Sentinel persona id excluded from the embedding set.
    sentinel_id: String,
    /// Number of full recomputations, observable in tests.
    recomputations: AtomicU64,
}

impl EmbeddingCache {
    pub fn new(sentinel_id: impl Into<String>) -> Self {
        Self::with_ttl(sentinel_id, CACHE_TTL)
    }

    pub fn with_ttl(sentinel_id: impl Into<String>, ttl: Duration) -> Self {
        Self {
            entry: Mutex::new(None),
            ttl,
            sentinel_id: sentinel_id.into(),
            recomputations: AtomicU64::new(0),
        }
    }

    /// Get the embeddings for the given catalog, recomputing when the
    /// catalog hash changed, the TTL expired, or the cache was invalidated.
    ///
    /// The sentinel persona never receives an embedding, which keeps it out
    /// of every similarity ranking.
    pub fn embeddings_for(
        &self,
        personas: &[PersonaDescriptor],
    ) -> HashMap<String, EmbeddingVector> {
        let hash = Self::catalog_hash(personas);
        let mut guard = self.entry.lock();

        if let Some(entry) = guard.as_ref() {
            if entry.catalog_hash == hash && entry.computed_at.elapsed() < self.ttl {
                return entry.embeddings.clone();
            }
        }

        log::info!("regenerating persona embeddings cache ({} personas)", personas.len());
        let mut embeddings = HashMap::new();
        for persona in personas {
            if persona.id == self.sentinel_id {
                continue;
            }
            let text = format!("{} {}", persona.display_name, persona.description);
            embeddings.insert(persona.id.clone(), EmbeddingVector::from_text(&text));
        }

        self.recomputations.fetch_add(1, Ordering::Relaxed);
        *guard = Some(CacheEntry {
            catalog_hash: hash,
            computed_at: Instant::now(),
            embeddings: embeddings.clone(),
        });
        embeddings
    }

    /// Drop the cached embeddings; the next lookup recomputes.
    pub fn invalidate(&self) {
        *self.entry.lock() = None;
        log::debug!("persona embedding cache invalidated");
    }

    /// Total number of recomputations performed so far.
    pub fn recomputation_count(&self) -> u64 {
        self.recomputations.load(Ordering::Relaxed)
    }

    fn catalog_hash(personas: &[PersonaDescriptor]) -> String {
        let mut hasher = Sha256::new();
        for p in personas {
            hasher.update(p.id.as_bytes());
            hasher.update([0]);
            hasher.update(p.name.as_bytes());
            hasher.update([0]);
            hasher.update(p.display_name.as_bytes());
            hasher.update([0]);
            hasher.update(p.description.as_bytes());
            hasher.update([0]);
        }
        hex::encode(hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> Vec<PersonaDescriptor> {
        vec![
            PersonaDescriptor::new("auto", "Auto", "picks for you", "n/a"),
            PersonaDescriptor::new("gurt", "Gurt", "friendly generalist tutor", "You are Gurt."),
            PersonaDescriptor::new("code-nerd", "Dex", "loves code and algorithms", "You are Dex."),
        ]
    }

    #[test]
    fn test_cache_hit_skips_recomputation() {
        let cache = EmbeddingCache::new("auto");
        let personas = catalog();
        cache.embeddings_for(&personas);
        cache.embeddings_for(&personas);
        assert_eq!(cache.recomputation_count(), 1);
    }

    #[test]
    fn test_sentinel_excluded() {
        let cache = EmbeddingCache::new("auto");
        let embeddings = cache.embeddings_for(&catalog());
        assert!(!embeddings.contains_key("auto"));
        assert!(embeddings.contains_key("gurt"));
        assert!(embeddings.contains_key("code-nerd"));
    }

    #[test]
    fn test_invalidate_forces_recomputation() {
        let cache = EmbeddingCache::new("auto");
        let personas = catalog();
        cache.embeddings_for(&personas);
        cache.invalidate();
        cache.embeddings_for(&personas);
        assert_eq!(cache.recomputation_count(), 2);
    }

    #[test]
    fn test_catalog_change_forces_recomputation() {
        let cache = EmbeddingCache::new("auto");
        let mut personas = catalog();
        cache.embeddings_for(&personas);

        personas.push(PersonaDescriptor::new(
            "essay-writer",
            "Quill",
            "academic writing specialist",
            "You are Quill.",
        ));
        cache.embeddings_for(&personas);
        assert_eq!(cache.recomputation_count(), 2);

        // Content edits are caught too, not just size changes.
        personas[1].description = "now a stern tutor".to_string();
        cache.embeddings_for(&personas);
        assert_eq!(cache.recomputation_count(), 3);
    }

    #[test]
    fn test_ttl_expiry_forces_recomputation() {
        let cache = EmbeddingCache::with_ttl("auto", Duration::from_millis(0));
        let personas = catalog();
        cache.embeddings_for(&personas);
        cache.embeddings_for(&personas);
        assert_eq!(cache.recomputation_count(), 2);
    }
}
