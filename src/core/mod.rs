pub mod config;

pub use config::{
    HttpRegistryConfig, MAX_REFERENCES_PER_RESOURCE, MAX_TRAVERSAL_DEPTH,
    MAX_TRAVERSAL_TIMEOUT_MS, ReferenceTraversalConfig, ResolverConfig, TraversalOptions,
    create_safe_config, default_package_cache,
};
