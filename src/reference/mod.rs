//! Reference classification, extraction and resolution.
//!
//! - [`kind`] classifies reference strings by addressing scheme
//! - [`extract`] collects references from resource bodies
//! - [`circular`] holds the path-based cycle check
//! - [`bundle`] resolves references inside a self-contained Bundle
//! - [`recursive`] walks references across resources with depth, width and time limits

pub mod bundle;
pub mod circular;
pub mod extract;
pub mod kind;
pub mod recursive;

pub use bundle::{
    BundleResolution, BundleResolutionStrategy, BundleValidationReport, FullUrlIndex,
    UnresolvedReason, build_full_url_index, resolve_bundle_reference, resolve_with_index,
    validate_bundle_references,
};
pub use circular::{ReferenceChain, would_create_circular_reference};
pub use extract::{
    ExtractedReference, ReferenceExtraction, extract_references, extract_references_with_limit,
    resolve_contained_reference,
};
pub use kind::{ReferenceKind, reference_key};
pub use recursive::{
    BundleFetcher, CostEstimate, FnFetcher, MapFetcher, RecursiveReferenceValidator,
    ResourceFetcher, TraversalResult, TraversalState, estimate_validation_cost, fetcher_fn,
};
