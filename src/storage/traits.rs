use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::error::Result;
use crate::profile::ResolutionSource;

/// A persisted profile resolution, keyed by `(canonical_url, version)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedProfile {
    pub canonical_url: String,
    pub version: String,
    pub profile_content: Arc<Value>,
    /// Where the content originally came from.
    pub source: ResolutionSource,
    pub resolution_time_ms: u64,
    pub cached_at: DateTime<Utc>,
    pub access_count: u64,
    pub dependencies: Vec<String>,
    pub content_hash: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    /// Same key and identical content hash; nothing written.
    Unchanged,
}

/// Durable profile store consulted before any remote source.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Look up a row. `version` may be a concrete version or a range
    /// specifier; `None` means the best stored version.
    async fn get(&self, canonical_url: &str, version: Option<&str>) -> Result<Option<CachedProfile>>;

    async fn list_versions(&self, canonical_url: &str) -> Result<Vec<String>>;

    async fn upsert(&self, profile: CachedProfile) -> Result<UpsertOutcome>;

    async fn increment_access(&self, canonical_url: &str, version: &str) -> Result<()>;

    async fn clear(&self) -> Result<()>;

    async fn len(&self) -> Result<usize>;
}
