//! # OctoFHIR Profile Resolver
//!
//! Profile and reference resolution for FHIR validation.
//!
//! ## Features
//!
//! - **Profile Resolution**: Resolve canonical URLs through an ordered chain of
//!   sources (in-process cache, durable store, package registries, filesystem)
//! - **Version Ranges**: Semantic version parsing, ordering and range matching
//! - **Reference Traversal**: Depth, width and time bounded reference walks with
//!   path-based cycle detection
//! - **Bundle References**: `fullUrl`, `urn:uuid` and relative reference
//!   resolution inside a Bundle, plus document-level checks
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use octofhir_profile_resolver::*;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<()> {
//! let resolver = ProfileResolver::new(ResolverConfig::default())
//!     .with_store(Arc::new(MemoryProfileStore::new()))
//!     .with_default_registries()?;
//!
//! let result = resolver
//!     .resolve("http://hl7.org/fhir/us/core/StructureDefinition/us-core-patient", Some("^6.0.0"))
//!     .await?;
//! if let Some(profile) = &result.profile {
//!     println!("{} from {:?}", profile["name"], result.source);
//! }
//! # Ok(())
//! # }
//! ```

pub mod core;
pub mod error;
pub mod profile;
pub mod reference;
pub mod storage;
pub mod types;
pub mod utils;
pub mod validation;
pub mod version;

pub use core::{
    HttpRegistryConfig, ReferenceTraversalConfig, ResolverConfig, TraversalOptions,
    create_safe_config,
};
pub use error::{ResolverError, Result};
pub use profile::{
    DependencyGraphResolver, DependencyResolution, PackageDependencyReport, ProfileFamily,
    ProfileResolver, RegistryClient, RegistryDependencyResolver, ResolutionEvent,
    ResolutionResult, ResolutionSource, extract_metadata, extract_profile_dependencies,
};
#[cfg(feature = "http-registry")]
pub use profile::HttpRegistryClient;
pub use reference::{
    BundleResolution, BundleResolutionStrategy, BundleValidationReport, RecursiveReferenceValidator,
    ReferenceChain, ReferenceKind, ResourceFetcher, TraversalResult, extract_references,
    resolve_bundle_reference, validate_bundle_references, would_create_circular_reference,
};
pub use storage::{CachedProfile, MemoryProfileStore, ProfileStore, UpsertOutcome};
pub use types::{Bundle, BundleEntry, BundleRequest, BundleType};
pub use validation::{ValidationIssue, ValidationSeverity};
pub use version::{
    ResolutionStrategy, SemanticVersion, VersionResolution, compare_versions, get_latest_version,
    parse_version, resolve_version, satisfies_range,
};
