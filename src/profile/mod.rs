//! Profile resolution by canonical URL and version.

pub mod cache;
pub mod canonical;
pub mod dependencies;
pub mod events;
pub mod family;
pub mod filesystem;
#[cfg(feature = "http-registry")]
pub mod http;
pub mod metadata;
pub mod package;
pub mod registry;
pub mod resolver;
pub mod result;

pub use cache::{CacheKey, CacheStats, ProfileCache};
pub use canonical::{canonical_name, normalize_canonical_url, split_canonical};
pub use dependencies::{
    DependencyGraphResolver, FailedPackage, PackageDependencyReport, RegistryDependencyResolver,
};
pub use events::ResolutionEvent;
pub use family::{ProfileFamily, classify_profile_family};
pub use filesystem::{FilesystemHit, FilesystemProfileSource};
#[cfg(feature = "http-registry")]
pub use http::HttpRegistryClient;
pub use metadata::{ProfileMetadata, extract_metadata, extract_profile_dependencies};
pub use package::{
    MAX_MEMBER_BYTES, extract_structure_definitions, extract_structure_definitions_with_limit,
    find_profile,
};
pub use registry::{
    PackageDetails, PackageRef, PackageSearchResult, PackageSummary, ProfileSearchHit,
    RegistryClient,
};
pub use resolver::{DependencyResolution, ProfileResolver};
pub use result::{ResolutionResult, ResolutionSource};
