//! Multi-source profile resolution.
//!
//! Sources are tried one after another in a fixed order: the in-process
//! cache, the durable store, the primary registry, the secondary registry and
//! finally the local filesystem. The first hit wins. A failing source is
//! logged and counts as a miss.

use chrono::Utc;
use papaya::HashMap as PapayaMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tokio::sync::mpsc::UnboundedSender;

use crate::core::ResolverConfig;
use crate::error::{ResolverError, Result};
use crate::profile::cache::{CacheKey, CacheStats, ProfileCache};
use crate::profile::canonical::{normalize_canonical_url, split_canonical};
use crate::profile::dependencies::DependencyGraphResolver;
use crate::profile::events::{EventSink, ResolutionEvent};
use crate::profile::family::classify_profile_family;
use crate::profile::filesystem::FilesystemProfileSource;
use crate::profile::metadata::{extract_metadata, extract_profile_dependencies};
use crate::profile::package::{extract_structure_definitions, find_profile};
use crate::profile::registry::{PackageRef, ProfileSearchHit, RegistryClient};
use crate::profile::result::{ResolutionResult, ResolutionSource};
use crate::reference::{ReferenceChain, would_create_circular_reference};
use crate::storage::{CachedProfile, ProfileStore};
use crate::utils::{content_hash, with_timeout};
use crate::version::{
    ResolutionStrategy, is_concrete_version, resolve_version, satisfies_range,
    sort_versions_descending,
};

/// A profile together with the profiles it depends on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyResolution {
    pub root: ResolutionResult,
    pub dependencies: Vec<ResolutionResult>,
    pub unresolved: Vec<String>,
    pub circular: Vec<ReferenceChain>,
}

/// The version chosen before any source is consulted.
#[derive(Debug, Default)]
struct VersionSelection {
    requested: Option<String>,
    /// Concrete version to look for, if one could be chosen.
    version: Option<String>,
    strategy: Option<ResolutionStrategy>,
    /// Primary registry search made while building the pool.
    primary: PrimarySearch,
}

/// Outcome of the primary registry search for one request.
#[derive(Debug, Default)]
enum PrimarySearch {
    #[default]
    NotRun,
    Hits(Vec<ProfileSearchHit>),
    Failed,
}

impl PrimarySearch {
    fn hits(&self) -> Option<&[ProfileSearchHit]> {
        match self {
            PrimarySearch::Hits(hits) => Some(hits),
            _ => None,
        }
    }
}

impl VersionSelection {
    /// What each source is asked for: the chosen version, else the raw request.
    fn spec(&self) -> Option<&str> {
        self.version.as_deref().or(self.requested.as_deref())
    }
}

struct Found {
    content: Arc<Value>,
    version: Option<String>,
    source: ResolutionSource,
    downloaded: bool,
    dependencies: Vec<String>,
    package: Option<String>,
}

impl Found {
    fn new(content: Value, version: Option<String>, source: ResolutionSource) -> Self {
        Self {
            content: Arc::new(content),
            version,
            source,
            downloaded: false,
            dependencies: Vec::new(),
            package: None,
        }
    }
}

pub struct ProfileResolver {
    config: ResolverConfig,
    cache: ProfileCache,
    inflight: PapayaMap<CacheKey, Arc<Mutex<()>>>,
    store: Option<Arc<dyn ProfileStore>>,
    registry: Option<Arc<dyn RegistryClient>>,
    secondary_registry: Option<Arc<dyn RegistryClient>>,
    filesystem: FilesystemProfileSource,
    dependency_resolver: Option<Arc<dyn DependencyGraphResolver>>,
    events: EventSink,
}

impl ProfileResolver {
    /// A resolver with no store and no registries. Only the filesystem roots
    /// from `config` are consulted until sources are attached.
    pub fn new(config: ResolverConfig) -> Self {
        let filesystem = FilesystemProfileSource::new(config.filesystem_roots.clone());
        Self {
            config,
            cache: ProfileCache::new(),
            inflight: PapayaMap::new(),
            store: None,
            registry: None,
            secondary_registry: None,
            filesystem,
            dependency_resolver: None,
            events: EventSink::default(),
        }
    }

    /// Attach the public Simplifier and packages.fhir.org registries.
    #[cfg(feature = "http-registry")]
    pub fn with_default_registries(self) -> Result<Self> {
        use crate::profile::http::HttpRegistryClient;

        Ok(self
            .with_registry(Arc::new(HttpRegistryClient::simplifier()?))
            .with_secondary_registry(Arc::new(HttpRegistryClient::fhir_packages()?)))
    }

    pub fn with_store(mut self, store: Arc<dyn ProfileStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_registry(mut self, registry: Arc<dyn RegistryClient>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn with_secondary_registry(mut self, registry: Arc<dyn RegistryClient>) -> Self {
        self.secondary_registry = Some(registry);
        self
    }

    pub fn with_dependency_resolver(mut self, resolver: Arc<dyn DependencyGraphResolver>) -> Self {
        self.dependency_resolver = Some(resolver);
        self
    }

    pub fn with_event_sender(mut self, sender: UnboundedSender<ResolutionEvent>) -> Self {
        self.events = EventSink::new(sender);
        self
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Resolve a canonical URL to profile content.
    ///
    /// `canonical_url` may carry a `|version` suffix; an explicit `version`
    /// takes precedence over it. When every source misses the result has no
    /// profile. Only a blank URL is an error.
    pub async fn resolve(&self, canonical_url: &str, version: Option<&str>) -> Result<ResolutionResult> {
        let started = Instant::now();

        let (url, embedded_version) = split_canonical(canonical_url);
        if url.is_empty() {
            return Err(ResolverError::InvalidCanonical {
                message: "canonical URL is empty".to_string(),
            });
        }
        let url = normalize_canonical_url(&url);
        let requested = version
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .or(embedded_version);

        let request_key = CacheKey::new(url.clone(), requested.as_deref());
        if let Some(hit) = self.cached(&request_key, started) {
            return Ok(hit);
        }

        if !self.config.coalesce_requests {
            return Ok(self.resolve_uncached(url, requested, request_key, started).await);
        }

        let lock = self.inflight_lock(&request_key);
        let guard = Arc::clone(&lock).lock_owned().await;
        // Another caller may have finished while we waited.
        let result = match self.cached(&request_key, started) {
            Some(hit) => hit,
            None => {
                self.resolve_uncached(url, requested, request_key.clone(), started)
                    .await
            }
        };
        drop(guard);
        self.release_inflight(&request_key, lock);

        Ok(result)
    }

    async fn resolve_uncached(
        &self,
        url: String,
        requested: Option<String>,
        request_key: CacheKey,
        started: Instant,
    ) -> ResolutionResult {
        tracing::debug!(url = %url, version = ?requested, "Resolving profile");
        self.events.emit(ResolutionEvent::Started {
            canonical_url: url.clone(),
            version: requested.clone(),
        });

        let selection = self.select_version(&url, requested).await;

        if let Some(concrete) = &selection.version {
            let concrete_key = CacheKey::new(url.clone(), Some(concrete.as_str()));
            if concrete_key != request_key {
                if let Some(hit) = self.cached(&concrete_key, started) {
                    self.cache.insert(request_key, hit.clone());
                    return hit;
                }
            }
        }

        let Some(found) = self.lookup_sources(&url, &selection).await else {
            tracing::info!(url = %url, version = ?selection.spec(), "Profile not found in any source");
            self.events.emit(ResolutionEvent::NotFound {
                canonical_url: url.clone(),
                version: selection.spec().map(str::to_string),
            });
            let mut result = ResolutionResult::not_found(url, selection.version.clone());
            result.version_strategy = selection.strategy;
            result.family = classify_profile_family(&result.canonical_url);
            result.resolution_time_ms = elapsed_ms(started);
            return result;
        };

        let result = self.finish(&url, &selection, found, started).await;

        if let Some(version) = &result.version {
            self.cache
                .insert(CacheKey::new(url.clone(), Some(version.as_str())), result.clone());
        }
        self.cache.insert(request_key, result.clone());

        result
    }

    /// Resolve several profiles one after another.
    pub async fn resolve_many<'a, I>(&self, requests: I) -> Vec<Result<ResolutionResult>>
    where
        I: IntoIterator<Item = (&'a str, Option<&'a str>)>,
    {
        let mut results = Vec::new();
        for (url, version) in requests {
            results.push(self.resolve(url, version).await);
        }
        results
    }

    /// Resolve a profile and, depth first, every profile it depends on.
    ///
    /// Depth is bounded by `max_dependency_depth`. Dependencies that lead back
    /// onto the current path are reported in `circular` and not followed.
    pub async fn resolve_with_dependencies(
        &self,
        canonical_url: &str,
        version: Option<&str>,
    ) -> Result<DependencyResolution> {
        let root = self.resolve(canonical_url, version).await?;
        let mut resolution = DependencyResolution {
            root: root.clone(),
            dependencies: Vec::new(),
            unresolved: Vec::new(),
            circular: Vec::new(),
        };
        if !root.is_found() {
            return Ok(resolution);
        }

        let mut visited: HashSet<String> = HashSet::from([root.canonical_url.clone()]);
        let root_path: ReferenceChain = vec![root.canonical_url.clone()];
        let mut stack: Vec<(String, ReferenceChain, usize)> = root
            .dependencies
            .iter()
            .rev()
            .map(|dep| (dep.clone(), root_path.clone(), 1))
            .collect();

        while let Some((url, path, depth)) = stack.pop() {
            if would_create_circular_reference(&path, &url) {
                let mut chain = path;
                chain.push(url);
                tracing::debug!(chain = ?chain, "Circular profile dependency");
                resolution.circular.push(chain);
                continue;
            }
            if depth > self.config.max_dependency_depth || !visited.insert(url.clone()) {
                continue;
            }

            match self.resolve(&url, None).await {
                Ok(result) if result.is_found() => {
                    let mut child_path = path;
                    child_path.push(url);
                    for dep in result.dependencies.iter().rev() {
                        stack.push((dep.clone(), child_path.clone(), depth + 1));
                    }
                    resolution.dependencies.push(result);
                }
                Ok(_) => resolution.unresolved.push(url),
                Err(e) => {
                    tracing::warn!(url = %url, error = %e, "Dependency resolution failed");
                    resolution.unresolved.push(url);
                }
            }
        }

        Ok(resolution)
    }

    /// Versions known to the durable store and the primary registry, newest first.
    pub async fn available_versions(&self, canonical_url: &str) -> Result<Vec<String>> {
        let (url, _) = split_canonical(canonical_url);
        let url = normalize_canonical_url(&url);
        let mut pool = self.store_versions(&url).await;
        if let Some(hits) = self.primary_search(&url).await.hits() {
            pool.extend(hit_versions(hits, &url));
        }
        pool.sort();
        pool.dedup();
        Ok(sort_versions_descending(&pool))
    }

    /// Drop every in-process entry. The durable store is untouched.
    pub fn clear_cache(&self) -> usize {
        let removed = self.cache.clear();
        self.inflight.pin().clear();
        tracing::info!(entries = removed, "Profile cache cleared");
        self.events.emit(ResolutionEvent::CacheCleared { entries: removed });
        removed
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    fn cached(&self, key: &CacheKey, started: Instant) -> Option<ResolutionResult> {
        let mut hit = self.cache.get(key)?;
        hit.source = Some(ResolutionSource::LocalCache);
        hit.resolution_time_ms = elapsed_ms(started);
        tracing::trace!(key = %key, "Resolved from local cache");
        Some(hit)
    }

    fn inflight_lock(&self, key: &CacheKey) -> Arc<Mutex<()>> {
        let inflight = self.inflight.pin();
        Arc::clone(inflight.get_or_insert_with(key.clone(), || Arc::new(Mutex::new(()))))
    }

    /// Drop the coalescing lock for `key` once no other caller holds or awaits it.
    fn release_inflight(&self, key: &CacheKey, lock: Arc<Mutex<()>>) {
        let inflight = self.inflight.pin();
        let current = inflight.get(key).is_some_and(|entry| Arc::ptr_eq(entry, &lock));
        // One reference lives in the map, the other is ours.
        if current && Arc::strong_count(&lock) <= 2 {
            inflight.remove(key);
        }
    }

    async fn store_versions(&self, url: &str) -> Vec<String> {
        let Some(store) = self.store.as_ref().filter(|_| self.config.enable_database) else {
            return Vec::new();
        };
        match with_timeout("database", self.config.source_timeout, store.list_versions(url)).await {
            Ok(versions) => versions,
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "Could not list stored versions");
                Vec::new()
            }
        }
    }

    async fn primary_search(&self, url: &str) -> PrimarySearch {
        let Some(registry) = self.registry.as_ref().filter(|_| self.config.enable_registry) else {
            return PrimarySearch::NotRun;
        };
        let search = with_timeout(
            ResolutionSource::SimplifierRegistry.as_str(),
            self.config.source_timeout,
            registry.search_profiles(url),
        )
        .await;
        match search {
            Ok(hits) => PrimarySearch::Hits(hits),
            Err(e) => {
                tracing::warn!(registry = registry.name(), url = %url, error = %e, "Registry search failed");
                self.events.emit(ResolutionEvent::SourceFailed {
                    canonical_url: url.to_string(),
                    source: ResolutionSource::SimplifierRegistry,
                    error: e.to_string(),
                });
                PrimarySearch::Failed
            }
        }
    }

    /// Pick a concrete version from the store and primary registry pool.
    async fn select_version(&self, url: &str, requested: Option<String>) -> VersionSelection {
        let concrete = requested
            .as_deref()
            .filter(|spec| is_concrete_version(spec))
            .map(str::to_string);
        if let Some(version) = concrete {
            return VersionSelection {
                requested,
                version: Some(version),
                strategy: Some(ResolutionStrategy::Exact),
                primary: PrimarySearch::NotRun,
            };
        }

        let mut pool = self.store_versions(url).await;
        let primary = self.primary_search(url).await;
        if let Some(hits) = primary.hits() {
            pool.extend(hit_versions(hits, url));
        }

        pool.sort();
        pool.dedup();
        if pool.is_empty() {
            return VersionSelection {
                requested,
                version: None,
                strategy: Some(ResolutionStrategy::Fallback),
                primary,
            };
        }

        let resolution = resolve_version(requested.as_deref(), &pool, self.config.prefer_stable);
        tracing::debug!(
            url = %url,
            version = %resolution.version,
            strategy = ?resolution.strategy,
            candidates = pool.len(),
            "Selected profile version"
        );
        // A range nothing satisfies is passed on as asked, never pinned to
        // a version outside it.
        let explicit = requested
            .as_deref()
            .is_some_and(|spec| !matches!(spec, "latest" | "*"));
        let version = match resolution.strategy {
            ResolutionStrategy::Fallback if explicit => None,
            _ => Some(resolution.version),
        };
        VersionSelection {
            requested,
            version,
            strategy: Some(resolution.strategy),
            primary,
        }
    }

    async fn lookup_sources(&self, url: &str, selection: &VersionSelection) -> Option<Found> {
        let spec = selection.spec();
        let timeout = self.config.source_timeout;

        if let Some(store) = self.store.as_ref().filter(|_| self.config.enable_database) {
            let lookup = with_timeout("database", timeout, self.from_store(store, url, spec)).await;
            if let Some(found) = self.settle(url, ResolutionSource::Database, lookup) {
                return Some(found);
            }
        }

        if let Some(registry) = self.registry.as_ref().filter(|_| self.config.enable_registry) {
            let source = ResolutionSource::SimplifierRegistry;
            if matches!(selection.primary, PrimarySearch::Failed) {
                tracing::debug!(url = %url, source = %source, "Registry search already failed, skipping");
            } else {
                let lookup = with_timeout(
                    source.as_str(),
                    timeout,
                    self.from_registry(registry.as_ref(), source, url, spec, selection.primary.hits()),
                )
                .await;
                if let Some(found) = self.settle(url, source, lookup) {
                    return Some(found);
                }
            }
        }

        if let Some(registry) = self
            .secondary_registry
            .as_ref()
            .filter(|_| self.config.enable_secondary_registry)
        {
            let source = ResolutionSource::FhirRegistry;
            let lookup = with_timeout(
                source.as_str(),
                timeout,
                self.from_registry(registry.as_ref(), source, url, spec, None),
            )
            .await;
            if let Some(found) = self.settle(url, source, lookup) {
                return Some(found);
            }
        }

        if self.config.enable_filesystem && !self.filesystem.roots().is_empty() {
            let lookup = with_timeout("filesystem", timeout, async {
                let hit = self.filesystem.find(url, spec).await?;
                Ok::<_, ResolverError>(hit.map(|hit| {
                    tracing::debug!(path = %hit.path.display(), "Profile found on filesystem");
                    Found::new(hit.content, hit.version, ResolutionSource::Filesystem)
                }))
            })
            .await;
            if let Some(found) = self.settle(url, ResolutionSource::Filesystem, lookup) {
                return Some(found);
            }
        }

        None
    }

    /// Turn one source's outcome into a hit or a logged miss.
    fn settle(&self, url: &str, source: ResolutionSource, lookup: Result<Option<Found>>) -> Option<Found> {
        let outcome = lookup.and_then(|found| match found {
            Some(found) => {
                extract_metadata(&found.content)?;
                Ok(Some(found))
            }
            None => Ok(None),
        });

        match outcome {
            Ok(Some(found)) => Some(found),
            Ok(None) => {
                tracing::debug!(url = %url, source = %source, "Source miss");
                self.events.emit(ResolutionEvent::SourceMiss {
                    canonical_url: url.to_string(),
                    source,
                });
                None
            }
            Err(e) => {
                if e.is_miss() {
                    tracing::warn!(url = %url, source = %source, error = %e, "Source unavailable");
                } else {
                    tracing::warn!(url = %url, source = %source, error = %e, "Source returned unusable content");
                }
                self.events.emit(ResolutionEvent::SourceFailed {
                    canonical_url: url.to_string(),
                    source,
                    error: e.to_string(),
                });
                None
            }
        }
    }

    async fn from_store(&self, store: &Arc<dyn ProfileStore>, url: &str, spec: Option<&str>) -> Result<Option<Found>> {
        let Some(row) = store.get(url, spec).await? else {
            return Ok(None);
        };

        // The access counter is bookkeeping and never holds up the lookup.
        let counter = Arc::clone(store);
        let (canonical_url, version) = (row.canonical_url.clone(), row.version.clone());
        tokio::spawn(async move {
            if let Err(e) = counter.increment_access(&canonical_url, &version).await {
                tracing::warn!(url = %canonical_url, error = %e, "Failed to record profile access");
            }
        });

        Ok(Some(Found {
            content: row.profile_content,
            version: Some(row.version),
            source: ResolutionSource::Database,
            downloaded: false,
            dependencies: row.dependencies,
            package: None,
        }))
    }

    async fn from_registry(
        &self,
        registry: &dyn RegistryClient,
        source: ResolutionSource,
        url: &str,
        spec: Option<&str>,
        known_hits: Option<&[ProfileSearchHit]>,
    ) -> Result<Option<Found>> {
        let hits = match known_hits {
            Some(hits) => hits.to_vec(),
            None => registry.search_profiles(url).await?,
        };
        let Some(hit) = self.pick_hit(&hits, url, spec) else {
            return Ok(None);
        };
        let package = hit.package_ref();

        if let Some(content) = hit.content.clone() {
            let version = hit.version.clone().or_else(|| content_version(&content));
            if !version_accepted(spec, version.as_deref()) {
                tracing::debug!(url = %url, version = ?version, spec = ?spec, "Registry content outside requested version");
                return Ok(None);
            }
            let mut found = Found::new(content, version, source);
            found.package = package;
            return Ok(Some(found));
        }

        let Some(package) = package else {
            return Ok(None);
        };

        let definitions = match registry.get_package_profiles(&package).await {
            Ok(definitions) if !definitions.is_empty() => definitions,
            Ok(_) => self.download_definitions(registry, &package).await?,
            Err(e) => {
                tracing::debug!(registry = registry.name(), package = %package, error = %e, "Package listing failed, downloading");
                self.download_definitions(registry, &package).await?
            }
        };

        let wanted = hit.version.as_deref().or(spec.filter(|s| is_concrete_version(s)));
        let definition = find_profile(&definitions, url, wanted).or_else(|| {
            // Only an unpinned request may take whatever version the package ships.
            match spec {
                Some(s) if is_concrete_version(s) => None,
                _ => find_profile(&definitions, url, None),
            }
        });

        let Some(content) = definition.cloned() else {
            return Ok(None);
        };
        let version = content_version(&content).or_else(|| hit_version(hit));
        if !version_accepted(spec, version.as_deref()) {
            tracing::debug!(url = %url, package = %package, version = ?version, spec = ?spec, "Packaged profile outside requested version");
            return Ok(None);
        }

        let mut found = Found::new(content, version, source);
        found.downloaded = true;
        found.package = Some(package);
        Ok(Some(found))
    }

    async fn download_definitions(&self, registry: &dyn RegistryClient, package: &str) -> Result<Vec<Value>> {
        tracing::info!(registry = registry.name(), package = %package, "Downloading package for profile");
        let archive = registry.download_package(package).await?;
        extract_structure_definitions(&archive)
    }

    /// The search hit for `url` that best matches `spec`.
    fn pick_hit<'h>(&self, hits: &'h [ProfileSearchHit], url: &str, spec: Option<&str>) -> Option<&'h ProfileSearchHit> {
        let candidates: Vec<&ProfileSearchHit> = hits
            .iter()
            .filter(|hit| normalize_canonical_url(&hit.url) == url)
            .filter(|hit| version_accepted(spec, hit_version(hit).as_deref()))
            .collect();

        let versions: Vec<String> = candidates.iter().filter_map(|hit| hit_version(hit)).collect();
        if versions.is_empty() {
            return candidates.first().copied();
        }
        let best = resolve_version(None, &versions, self.config.prefer_stable).version;
        candidates
            .iter()
            .copied()
            .find(|hit| hit_version(hit).as_deref() == Some(best.as_str()))
    }

    async fn finish(&self, url: &str, selection: &VersionSelection, found: Found, started: Instant) -> ResolutionResult {
        let dependencies = if found.dependencies.is_empty() {
            extract_profile_dependencies(&found.content)
        } else {
            found.dependencies.clone()
        };
        let version = found
            .version
            .clone()
            .or_else(|| content_version(&found.content))
            .or_else(|| selection.version.clone());

        let package_dependencies = match (&self.dependency_resolver, &found.package) {
            (Some(resolver), Some(package)) if self.config.resolve_package_dependencies => {
                let package = PackageRef::parse(package);
                match resolver
                    .resolve_dependencies(&package.name, package.version.as_deref())
                    .await
                {
                    Ok(report) => Some(report),
                    Err(e) => {
                        tracing::warn!(package = %package, error = %e, "Package dependency resolution failed");
                        None
                    }
                }
            }
            _ => None,
        };

        let result = ResolutionResult {
            canonical_url: url.to_string(),
            profile: Some(Arc::clone(&found.content)),
            source: Some(found.source),
            version,
            dependencies,
            resolution_time_ms: elapsed_ms(started),
            downloaded: found.downloaded,
            family: classify_profile_family(url),
            version_strategy: selection.strategy,
            package_dependencies,
        };

        if found.source != ResolutionSource::Database {
            self.persist(&result).await;
        }

        tracing::info!(
            url = %url,
            version = ?result.version,
            source = %found.source,
            downloaded = result.downloaded,
            elapsed_ms = result.resolution_time_ms,
            "Profile resolved"
        );
        self.events.emit(ResolutionEvent::Resolved {
            canonical_url: url.to_string(),
            version: result.version.clone(),
            source: found.source,
            resolution_time_ms: result.resolution_time_ms,
            downloaded: result.downloaded,
        });

        result
    }

    /// Write a non-local resolution to the durable store. Failures are logged only.
    async fn persist(&self, result: &ResolutionResult) {
        if !self.config.persist_resolutions {
            return;
        }
        let (Some(store), Some(profile), Some(source)) = (&self.store, &result.profile, result.source) else {
            return;
        };

        let row = CachedProfile {
            canonical_url: result.canonical_url.clone(),
            version: result.version.clone().unwrap_or_else(|| "latest".to_string()),
            profile_content: Arc::clone(profile),
            source,
            resolution_time_ms: result.resolution_time_ms,
            cached_at: Utc::now(),
            access_count: 0,
            dependencies: result.dependencies.clone(),
            content_hash: content_hash(profile),
        };

        match with_timeout("database", self.config.source_timeout, store.upsert(row)).await {
            Ok(outcome) => {
                tracing::debug!(url = %result.canonical_url, outcome = ?outcome, "Persisted profile resolution");
            }
            Err(e) => {
                tracing::warn!(url = %result.canonical_url, error = %e, "Failed to persist profile resolution");
            }
        }
    }
}

impl std::fmt::Debug for ProfileResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProfileResolver")
            .field("config", &self.config)
            .field("cache", &self.cache)
            .field("has_store", &self.store.is_some())
            .field("registry", &self.registry.as_ref().map(|r| r.name().to_string()))
            .field(
                "secondary_registry",
                &self.secondary_registry.as_ref().map(|r| r.name().to_string()),
            )
            .field("filesystem_roots", &self.filesystem.roots())
            .finish()
    }
}

fn hit_versions<'a>(hits: &'a [ProfileSearchHit], url: &'a str) -> impl Iterator<Item = String> + 'a {
    hits.iter()
        .filter(move |hit| normalize_canonical_url(&hit.url) == url)
        .filter_map(hit_version)
}

/// The profile version a hit stands for. Package-only hits carry the
/// package version.
fn hit_version(hit: &ProfileSearchHit) -> Option<String> {
    hit.version
        .clone()
        .or_else(|| hit.content.as_ref().and_then(content_version))
        .or_else(|| hit.package_version.clone())
}

/// Whether a profile at `version` may answer a request for `spec`.
fn version_accepted(spec: Option<&str>, version: Option<&str>) -> bool {
    match (spec.map(str::trim), version) {
        (None | Some("" | "latest" | "*"), _) => true,
        (Some(spec), Some(version)) => version == spec || satisfies_range(version, spec),
        // An unversioned profile can only answer an unpinned request.
        (Some(spec), None) => !is_concrete_version(spec),
    }
}

fn content_version(content: &Value) -> Option<String> {
    content.get("version").and_then(Value::as_str).map(str::to_string)
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offline_resolver() -> ProfileResolver {
        ProfileResolver::new(ResolverConfig::offline().with_filesystem_roots(Vec::new()))
    }

    #[tokio::test]
    async fn test_inflight_locks_are_released_after_resolution() {
        let resolver = offline_resolver();
        for i in 0..5 {
            let result = resolver
                .resolve(&format!("http://example.org/StructureDefinition/p{i}"), None)
                .await
                .unwrap();
            assert!(!result.is_found());
        }
        assert_eq!(resolver.inflight.pin().len(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_waiters_leave_no_inflight_lock() {
        let resolver = offline_resolver();
        let url = "http://example.org/StructureDefinition/shared";
        let (a, b) = tokio::join!(resolver.resolve(url, None), resolver.resolve(url, Some("1.0.0")));
        assert!(a.is_ok() && b.is_ok());
        let (c, d) = tokio::join!(resolver.resolve(url, None), resolver.resolve(url, None));
        assert!(c.is_ok() && d.is_ok());
        assert_eq!(resolver.inflight.pin().len(), 0);
    }

    #[test]
    fn test_version_acceptance() {
        assert!(version_accepted(None, Some("1.0.0")));
        assert!(version_accepted(Some("latest"), None));
        assert!(version_accepted(Some("^6.0.0"), Some("6.1.0")));
        assert!(!version_accepted(Some("^6.0.0"), Some("3.1.1")));
        assert!(!version_accepted(Some("6.1.0"), None));
        assert!(version_accepted(Some("^6.0.0"), None));
    }

    #[test]
    fn test_package_version_stands_in_for_missing_hit_version() {
        let hit = ProfileSearchHit::new("http://example.org/StructureDefinition/p")
            .with_package("example.pkg", "2.0.0");
        assert_eq!(hit_version(&hit).as_deref(), Some("2.0.0"));

        let hits = [hit];
        let versions: Vec<String> = hit_versions(&hits, "http://example.org/StructureDefinition/p").collect();
        assert_eq!(versions, vec!["2.0.0".to_string()]);
    }
}
