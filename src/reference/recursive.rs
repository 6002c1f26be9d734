//! Depth-bounded, cycle-safe traversal of references between resources.
//!
//! The walk is depth first and fetches one reference at a time. Two pieces of
//! state are kept apart: a `visited` set shared by the whole call, so no
//! resource is validated twice, and a per-path chain that feeds cycle
//! detection.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::time::{Duration, Instant};

use crate::core::ReferenceTraversalConfig;
use crate::error::Result;
use crate::reference::bundle::{FullUrlIndex, build_full_url_index, resolve_with_index};
use crate::reference::circular::{ReferenceChain, would_create_circular_reference};
use crate::reference::extract::extract_references;
use crate::reference::kind::{ReferenceKind, reference_key};
use crate::types::{Bundle, resource_key};

/// Supplies the resource a reference points at.
///
/// `Ok(None)` and `Err(_)` are both recorded as unresolved references.
#[async_trait]
pub trait ResourceFetcher: Send + Sync {
    async fn fetch(&self, reference: &str) -> Result<Option<Value>>;
}

/// Adapts an async closure into a [`ResourceFetcher`].
pub struct FnFetcher<F> {
    fetch: F,
}

pub fn fetcher_fn<F, Fut>(fetch: F) -> FnFetcher<F>
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Option<Value>>> + Send,
{
    FnFetcher { fetch }
}

#[async_trait]
impl<F, Fut> ResourceFetcher for FnFetcher<F>
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Option<Value>>> + Send,
{
    async fn fetch(&self, reference: &str) -> Result<Option<Value>> {
        (self.fetch)(reference.to_string()).await
    }
}

/// In-memory fetcher keyed by `ResourceType/id`.
#[derive(Debug, Clone, Default)]
pub struct MapFetcher {
    resources: HashMap<String, Value>,
}

impl MapFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_resource(mut self, resource: Value) -> Self {
        self.insert(resource);
        self
    }

    pub fn insert(&mut self, resource: Value) {
        if let Some(key) = resource_key(&resource) {
            self.resources.insert(key, resource);
        }
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

#[async_trait]
impl ResourceFetcher for MapFetcher {
    async fn fetch(&self, reference: &str) -> Result<Option<Value>> {
        Ok(self.resources.get(&reference_key(reference)).cloned())
    }
}

/// Answers references from a Bundle's own entries.
#[derive(Debug, Clone)]
pub struct BundleFetcher {
    bundle: Bundle,
    index: FullUrlIndex,
}

impl BundleFetcher {
    pub fn new(bundle: Bundle) -> Self {
        let index = build_full_url_index(&bundle);
        Self { bundle, index }
    }
}

#[async_trait]
impl ResourceFetcher for BundleFetcher {
    async fn fetch(&self, reference: &str) -> Result<Option<Value>> {
        Ok(resolve_with_index(reference, &self.bundle, &self.index)
            .resource()
            .cloned())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TraversalState {
    NotStarted,
    Traversing,
    Completed,
    TimedOut,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraversalResult {
    pub state: TraversalState,
    pub total_resources_validated: usize,
    pub max_depth_reached: u32,
    pub references_followed: usize,
    pub unresolved_references: Vec<String>,
    pub circular_references: Vec<ReferenceChain>,
    /// Identities of validated resources in visit order.
    pub validated_resources: Vec<String>,
    pub validation_time_ms: u64,
    pub timed_out: bool,
}

impl TraversalResult {
    fn new() -> Self {
        Self {
            state: TraversalState::NotStarted,
            total_resources_validated: 0,
            max_depth_reached: 0,
            references_followed: 0,
            unresolved_references: Vec::new(),
            circular_references: Vec::new(),
            validated_resources: Vec::new(),
            validation_time_ms: 0,
            timed_out: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostEstimate {
    pub direct_references: usize,
    pub estimated_resources: usize,
    pub would_exceed_limits: bool,
}

const MAX_ESTIMATED_RESOURCES: usize = 100;
const ESTIMATE_RESOURCE_LIMIT: usize = 50;
const ESTIMATE_REFERENCE_LIMIT: usize = 20;

/// Shallow, linear estimate of how much a recursive validation would touch.
pub fn estimate_validation_cost(resource: &Value, config: &ReferenceTraversalConfig) -> CostEstimate {
    let direct_references = extract_references(resource).len();
    let estimated_resources =
        (direct_references * config.max_depth as usize).min(MAX_ESTIMATED_RESOURCES);
    CostEstimate {
        direct_references,
        estimated_resources,
        would_exceed_limits: estimated_resources > ESTIMATE_RESOURCE_LIMIT
            || direct_references > ESTIMATE_REFERENCE_LIMIT,
    }
}

/// One node on the explicit traversal stack.
struct Frame {
    depth: u32,
    /// Path from the root up to and including this node.
    path: ReferenceChain,
    references: Vec<String>,
    next: usize,
}

#[derive(Debug, Clone, Default)]
pub struct RecursiveReferenceValidator {
    config: ReferenceTraversalConfig,
}

impl RecursiveReferenceValidator {
    /// Bounds above the hard ceilings are clamped.
    pub fn new(config: ReferenceTraversalConfig) -> Self {
        Self {
            config: config.clamped(),
        }
    }

    pub fn config(&self) -> &ReferenceTraversalConfig {
        &self.config
    }

    pub async fn validate_recursively(
        &self,
        root: &Value,
        fetcher: &dyn ResourceFetcher,
    ) -> TraversalResult {
        let started = Instant::now();
        let deadline = Duration::from_millis(self.config.timeout_ms);
        let mut result = TraversalResult::new();

        if !self.config.enabled {
            return result;
        }
        result.state = TraversalState::Traversing;

        let mut visited: HashSet<String> = HashSet::new();
        let mut stack: Vec<Frame> = Vec::new();

        let root_id = resource_key(root).unwrap_or_else(|| "#root".to_string());
        if let Some(frame) = self.enter(root, root_id, 0, Vec::new(), &mut visited, &mut result) {
            stack.push(frame);
        }

        while let Some(frame) = stack.last_mut() {
            if started.elapsed() >= deadline {
                result.timed_out = true;
                break;
            }

            let Some(reference) = frame.references.get(frame.next).cloned() else {
                stack.pop();
                continue;
            };
            frame.next += 1;

            let candidate = reference_key(&reference);
            if would_create_circular_reference(&frame.path, &candidate) {
                let mut attempted = frame.path.clone();
                attempted.push(candidate);
                tracing::debug!(chain = ?attempted, "Circular reference detected");
                result.circular_references.push(attempted);
                continue;
            }

            if visited.contains(&candidate) {
                result.references_followed += 1;
                continue;
            }

            let (depth, path) = (frame.depth + 1, frame.path.clone());
            match fetcher.fetch(&reference).await {
                Ok(Some(resource)) => {
                    result.references_followed += 1;
                    let node_id = resource_key(&resource).unwrap_or(candidate);
                    if let Some(child) =
                        self.enter(&resource, node_id, depth, path, &mut visited, &mut result)
                    {
                        stack.push(child);
                    }
                }
                Ok(None) => result.unresolved_references.push(reference),
                Err(error) => {
                    tracing::debug!(%reference, %error, "Reference fetch failed");
                    result.unresolved_references.push(reference);
                }
            }
        }

        result.state = if result.timed_out {
            TraversalState::TimedOut
        } else {
            TraversalState::Completed
        };
        result.validation_time_ms = started.elapsed().as_millis() as u64;

        tracing::debug!(
            validated = result.total_resources_validated,
            followed = result.references_followed,
            unresolved = result.unresolved_references.len(),
            circular = result.circular_references.len(),
            timed_out = result.timed_out,
            "Recursive reference validation finished"
        );

        result
    }

    /// Validate one node and, when it may be descended from, return its frame.
    fn enter(
        &self,
        resource: &Value,
        node_id: String,
        depth: u32,
        mut path: ReferenceChain,
        visited: &mut HashSet<String>,
        result: &mut TraversalResult,
    ) -> Option<Frame> {
        if !visited.insert(node_id.clone()) {
            return None;
        }

        result.total_resources_validated += 1;
        result.max_depth_reached = result.max_depth_reached.max(depth);
        result.validated_resources.push(node_id.clone());

        if depth >= self.config.max_depth {
            return None;
        }

        path.push(node_id);
        Some(Frame {
            depth,
            path,
            references: self.references_to_follow(resource),
            next: 0,
        })
    }

    fn references_to_follow(&self, resource: &Value) -> Vec<String> {
        let mut seen = HashSet::new();
        extract_references(resource)
            .into_iter()
            .map(|extracted| extracted.reference)
            .filter(|reference| {
                let kind = ReferenceKind::classify(reference);
                if kind.is_contained() || kind == ReferenceKind::Invalid {
                    return false;
                }
                if kind.is_external() && !self.config.validate_external {
                    return false;
                }
                if let Some(resource_type) = kind.resource_type() {
                    if self
                        .config
                        .exclude_resource_types
                        .iter()
                        .any(|excluded| excluded == resource_type)
                    {
                        return false;
                    }
                }
                true
            })
            .filter(|reference| seen.insert(reference.clone()))
            .take(self.config.max_references_per_resource)
            .collect()
    }
}
