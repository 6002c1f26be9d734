use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::profile::dependencies::PackageDependencyReport;
use crate::profile::family::ProfileFamily;
use crate::version::ResolutionStrategy;

/// Where a resolved profile came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResolutionSource {
    LocalCache,
    Database,
    SimplifierRegistry,
    FhirRegistry,
    Filesystem,
}

impl ResolutionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionSource::LocalCache => "local-cache",
            ResolutionSource::Database => "database",
            ResolutionSource::SimplifierRegistry => "simplifier-registry",
            ResolutionSource::FhirRegistry => "fhir-registry",
            ResolutionSource::Filesystem => "filesystem",
        }
    }
}

impl std::fmt::Display for ResolutionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one resolution attempt.
///
/// A miss on every source is not an error: `profile` and `source` are `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionResult {
    pub canonical_url: String,
    pub profile: Option<Arc<Value>>,
    pub source: Option<ResolutionSource>,
    pub version: Option<String>,
    pub dependencies: Vec<String>,
    pub resolution_time_ms: u64,
    pub downloaded: bool,
    pub family: Option<ProfileFamily>,
    pub version_strategy: Option<ResolutionStrategy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_dependencies: Option<PackageDependencyReport>,
}

impl ResolutionResult {
    pub fn not_found(canonical_url: impl Into<String>, version: Option<String>) -> Self {
        Self {
            canonical_url: canonical_url.into(),
            profile: None,
            source: None,
            version,
            dependencies: Vec::new(),
            resolution_time_ms: 0,
            downloaded: false,
            family: None,
            version_strategy: None,
            package_dependencies: None,
        }
    }

    pub fn is_found(&self) -> bool {
        self.profile.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_serializes_kebab_case() {
        let json = serde_json::to_string(&ResolutionSource::SimplifierRegistry).unwrap();
        assert_eq!(json, "\"simplifier-registry\"");
        assert_eq!(ResolutionSource::LocalCache.to_string(), "local-cache");
    }

    #[test]
    fn test_not_found_has_no_source() {
        let result = ResolutionResult::not_found("http://example.org/sd", None);
        assert!(!result.is_found());
        assert!(result.source.is_none());
    }
}
