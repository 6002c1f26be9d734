use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::storage::{CachedProfile, ProfileStore, UpsertOutcome};
use crate::version::{resolve_version, satisfies_range};

type StoreKey = (String, String);

/// In-memory `ProfileStore`. Clones share the same rows.
#[derive(Debug)]
pub struct MemoryProfileStore {
    rows: Arc<RwLock<HashMap<StoreKey, CachedProfile>>>,
    prefer_stable: bool,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self {
            rows: Arc::new(RwLock::new(HashMap::new())),
            prefer_stable: true,
        }
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }

    pub async fn access_count(&self, canonical_url: &str, version: &str) -> Option<u64> {
        let rows = self.rows.read().await;
        rows.get(&(canonical_url.to_string(), version.to_string()))
            .map(|row| row.access_count)
    }
}

#[async_trait]
impl ProfileStore for MemoryProfileStore {
    async fn get(&self, canonical_url: &str, version: Option<&str>) -> Result<Option<CachedProfile>> {
        let rows = self.rows.read().await;

        if let Some(version) = version {
            if let Some(row) = rows.get(&(canonical_url.to_string(), version.to_string())) {
                return Ok(Some(row.clone()));
            }
        }

        let versions: Vec<&str> = rows
            .keys()
            .filter(|(url, _)| url == canonical_url)
            .map(|(_, version)| version.as_str())
            .collect();
        let pool: Vec<&str> = match version {
            Some(range) => versions
                .into_iter()
                .filter(|candidate| satisfies_range(candidate, range))
                .collect(),
            None => versions,
        };

        if pool.is_empty() {
            return Ok(None);
        }
        let chosen = resolve_version(None, &pool, self.prefer_stable);
        Ok(rows.get(&(canonical_url.to_string(), chosen.version)).cloned())
    }

    async fn list_versions(&self, canonical_url: &str) -> Result<Vec<String>> {
        let rows = self.rows.read().await;
        Ok(rows
            .keys()
            .filter(|(url, _)| url == canonical_url)
            .map(|(_, version)| version.clone())
            .collect())
    }

    async fn upsert(&self, profile: CachedProfile) -> Result<UpsertOutcome> {
        let mut rows = self.rows.write().await;
        let key = (profile.canonical_url.clone(), profile.version.clone());

        match rows.get_mut(&key) {
            Some(existing) if existing.content_hash == profile.content_hash => {
                Ok(UpsertOutcome::Unchanged)
            }
            Some(existing) => {
                let access_count = existing.access_count;
                *existing = CachedProfile {
                    access_count,
                    ..profile
                };
                Ok(UpsertOutcome::Updated)
            }
            None => {
                rows.insert(key, profile);
                Ok(UpsertOutcome::Inserted)
            }
        }
    }

    async fn increment_access(&self, canonical_url: &str, version: &str) -> Result<()> {
        let mut rows = self.rows.write().await;
        if let Some(row) = rows.get_mut(&(canonical_url.to_string(), version.to_string())) {
            row.access_count += 1;
        }
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.rows.write().await.clear();
        Ok(())
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.rows.read().await.len())
    }
}

impl Default for MemoryProfileStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for MemoryProfileStore {
    fn clone(&self) -> Self {
        Self {
            rows: Arc::clone(&self.rows),
            prefer_stable: self.prefer_stable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::ResolutionSource;
    use crate::utils::content_hash;
    use chrono::Utc;
    use serde_json::json;

    fn row(version: &str, title: &str) -> CachedProfile {
        let content = json!({
            "resourceType": "StructureDefinition",
            "url": "http://example.org/sd/a",
            "version": version,
            "title": title,
        });
        CachedProfile {
            canonical_url: "http://example.org/sd/a".to_string(),
            version: version.to_string(),
            content_hash: content_hash(&content),
            profile_content: Arc::new(content),
            source: ResolutionSource::SimplifierRegistry,
            resolution_time_ms: 3,
            cached_at: Utc::now(),
            access_count: 0,
            dependencies: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent_on_content() {
        let store = MemoryProfileStore::new();
        assert_eq!(store.upsert(row("1.0.0", "A")).await.unwrap(), UpsertOutcome::Inserted);
        assert_eq!(store.upsert(row("1.0.0", "A")).await.unwrap(), UpsertOutcome::Unchanged);
        assert_eq!(store.upsert(row("1.0.0", "B")).await.unwrap(), UpsertOutcome::Updated);
        assert_eq!(store.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_get_by_range_and_latest() {
        let store = MemoryProfileStore::new();
        for version in ["1.0.0", "1.4.0", "2.0.0", "3.0.0-ballot"] {
            store.upsert(row(version, "x")).await.unwrap();
        }

        let url = "http://example.org/sd/a";
        let latest = store.get(url, None).await.unwrap().unwrap();
        assert_eq!(latest.version, "2.0.0");

        let ranged = store.get(url, Some("^1.0.0")).await.unwrap().unwrap();
        assert_eq!(ranged.version, "1.4.0");

        assert!(store.get(url, Some("9.9.9")).await.unwrap().is_none());
        assert!(store.get("http://example.org/other", None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_access_counter_survives_update() {
        let store = MemoryProfileStore::new();
        store.upsert(row("1.0.0", "A")).await.unwrap();
        store.increment_access("http://example.org/sd/a", "1.0.0").await.unwrap();
        store.upsert(row("1.0.0", "B")).await.unwrap();
        assert_eq!(store.access_count("http://example.org/sd/a", "1.0.0").await, Some(1));
    }
}
