use papaya::HashMap as PapayaMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::profile::result::ResolutionResult;

/// `(normalized canonical URL, version)`. The version is whatever the caller
/// asked for or the concrete version that was chosen; both are cached.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey {
    pub url: String,
    pub version: String,
}

impl CacheKey {
    pub fn new(url: impl Into<String>, version: Option<&str>) -> Self {
        Self {
            url: url.into(),
            version: version.unwrap_or("latest").to_string(),
        }
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}|{}", self.url, self.version)
    }
}

struct CacheEntry {
    result: ResolutionResult,
    inserted_at: Instant,
    hits: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

/// In-process resolution cache owned by one resolver.
pub struct ProfileCache {
    entries: PapayaMap<CacheKey, CacheEntry>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ProfileCache {
    pub fn new() -> Self {
        Self {
            entries: PapayaMap::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn get(&self, key: &CacheKey) -> Option<ResolutionResult> {
        let entries = self.entries.pin();
        match entries.get(key) {
            Some(entry) => {
                entry.hits.fetch_add(1, Ordering::Relaxed);
                self.hits.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(key = %key, age_ms = entry.inserted_at.elapsed().as_millis() as u64, "Profile cache hit");
                Some(entry.result.clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn insert(&self, key: CacheKey, result: ResolutionResult) {
        self.entries.pin().insert(
            key,
            CacheEntry {
                result,
                inserted_at: Instant::now(),
                hits: AtomicU64::new(0),
            },
        );
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries.pin().contains_key(key)
    }

    /// Hits recorded against a single entry.
    pub fn entry_hits(&self, key: &CacheKey) -> Option<u64> {
        self.entries
            .pin()
            .get(key)
            .map(|entry| entry.hits.load(Ordering::Relaxed))
    }

    /// Remove every entry and return how many there were.
    pub fn clear(&self) -> usize {
        let entries = self.entries.pin();
        let count = entries.len();
        entries.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.entries.pin().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

impl Default for ProfileCache {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ProfileCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProfileCache")
            .field("stats", &self.stats())
            .finish()
    }
}
