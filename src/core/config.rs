use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Hard ceilings for recursive reference traversal. Requests above these are clamped.
pub const MAX_TRAVERSAL_DEPTH: u32 = 3;
pub const MAX_REFERENCES_PER_RESOURCE: usize = 20;
pub const MAX_TRAVERSAL_TIMEOUT_MS: u64 = 60_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Upper bound for a single source lookup. There is no cross-source deadline.
    pub source_timeout: Duration,
    pub enable_database: bool,
    pub enable_registry: bool,
    pub enable_secondary_registry: bool,
    pub enable_filesystem: bool,
    pub filesystem_roots: Vec<PathBuf>,
    /// Write successful non-local resolutions to the durable store.
    pub persist_resolutions: bool,
    pub prefer_stable: bool,
    pub resolve_package_dependencies: bool,
    /// Let concurrent identical requests share one resolution.
    pub coalesce_requests: bool,
    pub max_dependency_depth: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            source_timeout: Duration::from_secs(10),
            enable_database: true,
            enable_registry: true,
            enable_secondary_registry: true,
            enable_filesystem: true,
            filesystem_roots: default_package_cache().into_iter().collect(),
            persist_resolutions: true,
            prefer_stable: true,
            resolve_package_dependencies: false,
            coalesce_requests: true,
            max_dependency_depth: 5,
        }
    }
}

impl ResolverConfig {
    /// Database and filesystem only, no registry traffic.
    pub fn offline() -> Self {
        Self {
            enable_registry: false,
            enable_secondary_registry: false,
            ..Default::default()
        }
    }

    pub fn with_source_timeout(mut self, timeout: Duration) -> Self {
        self.source_timeout = timeout;
        self
    }

    pub fn with_filesystem_roots(mut self, roots: Vec<PathBuf>) -> Self {
        self.filesystem_roots = roots;
        self
    }

    pub fn add_filesystem_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.filesystem_roots.push(root.into());
        self
    }

    pub fn with_persistence(mut self, enabled: bool) -> Self {
        self.persist_resolutions = enabled;
        self
    }

    pub fn with_prefer_stable(mut self, prefer_stable: bool) -> Self {
        self.prefer_stable = prefer_stable;
        self
    }

    pub fn with_package_dependencies(mut self, enabled: bool) -> Self {
        self.resolve_package_dependencies = enabled;
        self
    }

    pub fn with_request_coalescing(mut self, enabled: bool) -> Self {
        self.coalesce_requests = enabled;
        self
    }

    pub fn with_max_dependency_depth(mut self, depth: usize) -> Self {
        self.max_dependency_depth = depth;
        self
    }
}

/// Standard FHIR package cache (`~/.fhir/packages`).
pub fn default_package_cache() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".fhir").join("packages"))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpRegistryConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub user_agent: String,
}

impl HttpRegistryConfig {
    pub fn simplifier() -> Self {
        Self {
            base_url: "https://packages.simplifier.net".to_string(),
            ..Default::default()
        }
    }

    pub fn fhir_packages() -> Self {
        Self {
            base_url: "https://packages.fhir.org".to_string(),
            ..Default::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for HttpRegistryConfig {
    fn default() -> Self {
        Self {
            base_url: "https://packages.simplifier.net".to_string(),
            timeout: Duration::from_secs(30),
            user_agent: concat!("octofhir-profile-resolver/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Options for recursive reference traversal.
///
/// Fields are public and deserializable, so a value may exceed the hard
/// ceilings; [`ReferenceTraversalConfig::clamped`] brings it back within them
/// and the validator always applies it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReferenceTraversalConfig {
    pub enabled: bool,
    pub max_depth: u32,
    pub validate_external: bool,
    pub exclude_resource_types: Vec<String>,
    pub max_references_per_resource: usize,
    pub timeout_ms: u64,
}

impl Default for ReferenceTraversalConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_depth: 1,
            validate_external: false,
            exclude_resource_types: Vec::new(),
            max_references_per_resource: 10,
            timeout_ms: 30_000,
        }
    }
}

/// Caller-requested traversal options. Unset fields take the defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TraversalOptions {
    pub enabled: Option<bool>,
    pub max_depth: Option<i64>,
    pub validate_external: Option<bool>,
    pub exclude_resource_types: Option<Vec<String>>,
    pub max_references_per_resource: Option<i64>,
    pub timeout_ms: Option<i64>,
}

/// Build a traversal config from caller options, clamping every bound.
pub fn create_safe_config(options: TraversalOptions) -> ReferenceTraversalConfig {
    let defaults = ReferenceTraversalConfig::default();

    let max_depth = options
        .max_depth
        .map(|d| d.clamp(0, MAX_TRAVERSAL_DEPTH as i64) as u32)
        .unwrap_or(defaults.max_depth);
    let max_references_per_resource = options
        .max_references_per_resource
        .map(|n| n.clamp(0, MAX_REFERENCES_PER_RESOURCE as i64) as usize)
        .unwrap_or(defaults.max_references_per_resource);
    let timeout_ms = options
        .timeout_ms
        .map(|t| t.clamp(0, MAX_TRAVERSAL_TIMEOUT_MS as i64) as u64)
        .unwrap_or(defaults.timeout_ms);

    ReferenceTraversalConfig {
        enabled: options.enabled.unwrap_or(defaults.enabled),
        max_depth,
        validate_external: options.validate_external.unwrap_or(defaults.validate_external),
        exclude_resource_types: options
            .exclude_resource_types
            .unwrap_or(defaults.exclude_resource_types),
        max_references_per_resource,
        timeout_ms,
    }
}

impl ReferenceTraversalConfig {
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            ..Default::default()
        }
    }

    /// This config with every bound pulled under its hard ceiling.
    pub fn clamped(self) -> Self {
        Self {
            max_depth: self.max_depth.min(MAX_TRAVERSAL_DEPTH),
            max_references_per_resource: self
                .max_references_per_resource
                .min(MAX_REFERENCES_PER_RESOURCE),
            timeout_ms: self.timeout_ms.min(MAX_TRAVERSAL_TIMEOUT_MS),
            ..self
        }
    }

    pub fn with_max_depth(self, depth: i64) -> Self {
        Self {
            max_depth: depth.clamp(0, MAX_TRAVERSAL_DEPTH as i64) as u32,
            ..self
        }
    }

    pub fn with_external(self, validate_external: bool) -> Self {
        Self {
            validate_external,
            ..self
        }
    }

    pub fn with_excluded_types<I, S>(self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            exclude_resource_types: types.into_iter().map(Into::into).collect(),
            ..self
        }
    }

    pub fn with_max_references(self, max: i64) -> Self {
        Self {
            max_references_per_resource: max.clamp(0, MAX_REFERENCES_PER_RESOURCE as i64)
                as usize,
            ..self
        }
    }

    pub fn with_timeout_ms(self, timeout_ms: i64) -> Self {
        Self {
            timeout_ms: timeout_ms.clamp(0, MAX_TRAVERSAL_TIMEOUT_MS as i64) as u64,
            ..self
        }
    }
}
