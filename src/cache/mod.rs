//! Cache layer for translated formulas and operation results
//!
//! Formulas are keyed by `(file id, max depth)`. Each entry records when it
//! was written and which aggregator built it; the engine only reuses an
//! entry that is newer than the graph's last mutation and was built with the
//! requested aggregator. Operation results (JSON) are keyed by a string id
//! and gated on the graph's last mutation the same way.
//!
//! - **ReadFormulaCache**: read-only lookups
//! - **WriteFormulaCache**: extends ReadFormulaCache with upserts and removal
//! - **ReadResultCache** / **WriteResultCache**: the same split for results
//! - **EngineCache**: both stores, as the engine needs them

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::error::CacheError;
use crate::translate::Aggregator;

pub mod sqlite;

pub use sqlite::SqliteFormulaCache;

/// Cache key: one formula per requirement file and projection depth
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FormulaKey {
    pub file_id: String,
    pub depth: u32,
}

impl FormulaKey {
    pub fn new(file_id: impl Into<String>, depth: u32) -> Self {
        Self {
            file_id: file_id.into(),
            depth,
        }
    }
}

impl fmt::Display for FormulaKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.file_id, self.depth)
    }
}

/// A cached formula text
#[derive(Debug, Clone, PartialEq)]
pub struct CachedFormula {
    pub text: String,
    /// When the entry was written
    pub moment: DateTime<Utc>,
    pub aggregator: Aggregator,
}

impl CachedFormula {
    /// Whether this entry may stand in for a fresh translation
    ///
    /// The entry must be strictly newer than the graph; a graph without a
    /// known mutation time is never considered older than a cache entry.
    pub fn is_fresh_for(&self, graph_moment: Option<DateTime<Utc>>, aggregator: Aggregator) -> bool {
        self.aggregator == aggregator && graph_moment.is_some_and(|moment| self.moment > moment)
    }
}

/// A cached operation result
#[derive(Debug, Clone, PartialEq)]
pub struct CachedResult {
    pub result: serde_json::Value,
    /// When the entry was written
    pub moment: DateTime<Utc>,
}

impl CachedResult {
    /// Same gate as [`CachedFormula::is_fresh_for`], without the aggregator
    pub fn is_fresh_for(&self, graph_moment: Option<DateTime<Utc>>) -> bool {
        graph_moment.is_some_and(|moment| self.moment > moment)
    }
}

/// Trait for read-only cache operations
pub trait ReadFormulaCache: Send + Sync {
    /// Get the entry for `key`, if any
    fn read(&self, key: &FormulaKey) -> Option<CachedFormula>;
}

/// Trait for writeable cache operations
pub trait WriteFormulaCache: ReadFormulaCache {
    /// Upsert the entry for `key`, stamping it with the current time
    ///
    /// Last write wins.
    fn replace(&self, key: &FormulaKey, text: &str, aggregator: Aggregator) -> Result<(), CacheError>;

    /// Remove the entry for `key`
    fn remove(&self, key: &FormulaKey);

    /// Clear all entries
    fn clear(&self);
}

/// Read-only lookups of operation results
pub trait ReadResultCache: Send + Sync {
    fn read_result(&self, id: &str) -> Option<CachedResult>;
}

/// Upserts of operation results
pub trait WriteResultCache: ReadResultCache {
    /// Upsert the result stored under `id`, stamping it with the current time
    fn replace_result(&self, id: &str, result: &serde_json::Value) -> Result<(), CacheError>;
}

/// Formula and result storage behind one handle
pub trait EngineCache: WriteFormulaCache + WriteResultCache {}

impl<T: WriteFormulaCache + WriteResultCache> EngineCache for T {}

/// In-memory cache using DashMap for thread-safety
#[derive(Clone, Default)]
pub struct MemoryFormulaCache {
    entries: Arc<DashMap<FormulaKey, CachedFormula>>,
    results: Arc<DashMap<String, CachedResult>>,
}

impl MemoryFormulaCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Overwrite the stored moment of an entry
    #[cfg(test)]
    pub fn set_moment(&self, key: &FormulaKey, moment: DateTime<Utc>) {
        if let Some(mut entry) = self.entries.get_mut(key) {
            entry.moment = moment;
        }
    }

    /// Overwrite the stored moment of a result
    #[cfg(test)]
    pub fn set_result_moment(&self, id: &str, moment: DateTime<Utc>) {
        if let Some(mut entry) = self.results.get_mut(id) {
            entry.moment = moment;
        }
    }

    /// Store raw text, e.g. to simulate a corrupt entry
    #[cfg(test)]
    pub fn insert_raw(&self, key: FormulaKey, entry: CachedFormula) {
        self.entries.insert(key, entry);
    }
}

impl ReadFormulaCache for MemoryFormulaCache {
    fn read(&self, key: &FormulaKey) -> Option<CachedFormula> {
        self.entries.get(key).map(|entry| entry.clone())
    }
}

impl WriteFormulaCache for MemoryFormulaCache {
    fn replace(&self, key: &FormulaKey, text: &str, aggregator: Aggregator) -> Result<(), CacheError> {
        self.entries.insert(
            key.clone(),
            CachedFormula {
                text: text.to_string(),
                moment: Utc::now(),
                aggregator,
            },
        );
        Ok(())
    }

    fn remove(&self, key: &FormulaKey) {
        self.entries.remove(key);
    }

    fn clear(&self) {
        self.entries.clear();
        self.results.clear();
    }
}

impl ReadResultCache for MemoryFormulaCache {
    fn read_result(&self, id: &str) -> Option<CachedResult> {
        self.results.get(id).map(|entry| entry.clone())
    }
}

impl WriteResultCache for MemoryFormulaCache {
    fn replace_result(&self, id: &str, result: &serde_json::Value) -> Result<(), CacheError> {
        self.results.insert(
            id.to_string(),
            CachedResult {
                result: result.clone(),
                moment: Utc::now(),
            },
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn key() -> FormulaKey {
        FormulaKey::new("file-1", 3)
    }

    #[test]
    fn test_key_display() {
        assert_eq!(key().to_string(), "file-1@3");
    }

    #[test]
    fn test_memory_cache_replace_and_read() {
        let cache = MemoryFormulaCache::new();
        assert!(cache.read(&key()).is_none());

        cache.replace(&key(), "(assert true)", Aggregator::Mean).unwrap();
        let entry = cache.read(&key()).unwrap();
        assert_eq!(entry.text, "(assert true)");
        assert_eq!(entry.aggregator, Aggregator::Mean);

        cache.replace(&key(), "(assert false)", Aggregator::WeightedMean).unwrap();
        assert_eq!(cache.read(&key()).unwrap().text, "(assert false)");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_depth_is_part_of_key() {
        let cache = MemoryFormulaCache::new();
        cache.replace(&key(), "a", Aggregator::Mean).unwrap();
        assert!(cache.read(&FormulaKey::new("file-1", 4)).is_none());
    }

    #[test]
    fn test_write_cache_remove_and_clear() {
        let cache = MemoryFormulaCache::new();
        let cache_ref: &dyn WriteFormulaCache = &cache;
        cache_ref.replace(&key(), "a", Aggregator::Mean).unwrap();
        cache_ref.remove(&key());
        assert!(cache.is_empty());

        cache_ref.replace(&key(), "a", Aggregator::Mean).unwrap();
        cache_ref.replace(&FormulaKey::new("file-2", 1), "b", Aggregator::Mean).unwrap();
        cache_ref.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_freshness() {
        let now = Utc::now();
        let entry = CachedFormula {
            text: String::new(),
            moment: now,
            aggregator: Aggregator::Mean,
        };
        assert!(entry.is_fresh_for(Some(now - Duration::seconds(1)), Aggregator::Mean));
        assert!(!entry.is_fresh_for(Some(now), Aggregator::Mean));
        assert!(!entry.is_fresh_for(Some(now + Duration::seconds(1)), Aggregator::Mean));
        assert!(!entry.is_fresh_for(Some(now - Duration::seconds(1)), Aggregator::WeightedMean));
        assert!(!entry.is_fresh_for(None, Aggregator::Mean));
    }

    #[test]
    fn test_memory_result_cache() {
        let cache = MemoryFormulaCache::new();
        assert!(cache.read_result("PyPI:file-1:3").is_none());

        let result = serde_json::json!({"total_direct_dependencies": 1});
        cache.replace_result("PyPI:file-1:3", &result).unwrap();
        let entry = cache.read_result("PyPI:file-1:3").unwrap();
        assert_eq!(entry.result, result);
        assert!(entry.is_fresh_for(Some(Utc::now() - Duration::minutes(1))));
        assert!(!entry.is_fresh_for(None));
        assert!(cache.read_result("NPM:file-1:3").is_none());

        cache.clear();
        assert!(cache.read_result("PyPI:file-1:3").is_none());
    }
}
