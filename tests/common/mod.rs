use async_trait::async_trait;
use octofhir_profile_resolver::profile::{
    PackageDetails, PackageSearchResult, ProfileSearchHit, RegistryClient,
};
use octofhir_profile_resolver::storage::{CachedProfile, ProfileStore, UpsertOutcome};
use octofhir_profile_resolver::{ResolverConfig, ResolverError, Result};
use serde_json::{Value, json};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

#[allow(dead_code)]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Resolver config with only the sources a test attaches explicitly.
#[allow(dead_code)]
pub fn test_config() -> ResolverConfig {
    ResolverConfig::default()
        .with_filesystem_roots(Vec::new())
        .with_source_timeout(Duration::from_secs(2))
}

#[allow(dead_code)]
pub fn structure_definition(url: &str, version: &str) -> Value {
    json!({
        "resourceType": "StructureDefinition",
        "url": url,
        "version": version,
        "name": url.rsplit('/').next().unwrap_or("Profile"),
        "status": "active",
        "kind": "resource",
        "type": "Patient",
        "abstract": false,
        "derivation": "constraint",
        "baseDefinition": "http://hl7.org/fhir/StructureDefinition/Patient"
    })
}

/// Registry double that serves inline profile content and counts every call.
#[allow(dead_code)]
#[derive(Default)]
pub struct MockRegistry {
    hits: Mutex<Vec<ProfileSearchHit>>,
    pub searches: AtomicUsize,
    pub package_calls: AtomicUsize,
    pub fail: AtomicBool,
    pub delay: Mutex<Option<Duration>>,
}

#[allow(dead_code)]
impl MockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_profile(self, url: &str, version: &str) -> Self {
        self.hits.lock().unwrap().push(
            ProfileSearchHit::new(url)
                .with_version(version)
                .with_package("example.fhir.pkg", "1.0.0")
                .with_content(structure_definition(url, version)),
        );
        self
    }

    pub fn failing() -> Self {
        let registry = Self::default();
        registry.fail.store(true, Ordering::SeqCst);
        registry
    }

    pub fn with_delay(self, delay: Duration) -> Self {
        *self.delay.lock().unwrap() = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.searches.load(Ordering::SeqCst) + self.package_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RegistryClient for MockRegistry {
    fn name(&self) -> &str {
        "mock"
    }

    async fn search_profiles(&self, name: &str) -> Result<Vec<ProfileSearchHit>> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(ResolverError::registry("mock registry offline"));
        }
        Ok(self
            .hits
            .lock()
            .unwrap()
            .iter()
            .filter(|hit| hit.url == name)
            .cloned()
            .collect())
    }

    async fn search_packages(&self, _name: &str) -> Result<PackageSearchResult> {
        self.package_calls.fetch_add(1, Ordering::SeqCst);
        Ok(PackageSearchResult::default())
    }

    async fn get_package_details(&self, package_id: &str) -> Result<PackageDetails> {
        self.package_calls.fetch_add(1, Ordering::SeqCst);
        Err(ResolverError::registry(format!("no details for {package_id}")))
    }

    async fn download_package(&self, package_id: &str) -> Result<Vec<u8>> {
        self.package_calls.fetch_add(1, Ordering::SeqCst);
        Err(ResolverError::registry(format!("cannot download {package_id}")))
    }

    async fn get_package_profiles(&self, _package_id: &str) -> Result<Vec<Value>> {
        self.package_calls.fetch_add(1, Ordering::SeqCst);
        Ok(Vec::new())
    }
}

/// Store whose every operation fails.
#[allow(dead_code)]
#[derive(Default)]
pub struct FailingStore {
    pub calls: AtomicUsize,
}

#[allow(dead_code)]
impl FailingStore {
    fn fail<T>(&self) -> Result<T> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(ResolverError::storage("database unavailable"))
    }
}

#[async_trait]
impl ProfileStore for FailingStore {
    async fn get(&self, _url: &str, _version: Option<&str>) -> Result<Option<CachedProfile>> {
        self.fail()
    }

    async fn list_versions(&self, _url: &str) -> Result<Vec<String>> {
        self.fail()
    }

    async fn upsert(&self, _profile: CachedProfile) -> Result<UpsertOutcome> {
        self.fail()
    }

    async fn increment_access(&self, _url: &str, _version: &str) -> Result<()> {
        self.fail()
    }

    async fn clear(&self) -> Result<()> {
        self.fail()
    }

    async fn len(&self) -> Result<usize> {
        self.fail()
    }
}

/// Build an in-memory package archive holding `definitions`.
#[allow(dead_code)]
pub fn package_archive(name: &str, version: &str, definitions: &[Value]) -> Vec<u8> {
    use flate2::Compression;
    use flate2::write::GzEncoder;

    let mut members = vec![(
        "package/package.json".to_string(),
        json!({"name": name, "version": version}),
    )];
    for (i, definition) in definitions.iter().enumerate() {
        members.push((format!("package/StructureDefinition-{i}.json"), definition.clone()));
    }

    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    for (path, value) in &members {
        let bytes = serde_json::to_vec(value).unwrap();
        let mut header = tar::Header::new_gnu();
        header.set_size(bytes.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, path, bytes.as_slice()).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

/// Registry double whose search hits name only a package. Profiles must be
/// fetched by downloading the package archive.
#[allow(dead_code)]
#[derive(Default)]
pub struct PackageRegistry {
    packages: Mutex<Vec<(String, String, Vec<Value>)>>,
    pub downloads: Mutex<Vec<String>>,
}

#[allow(dead_code)]
impl PackageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_package(self, name: &str, version: &str, definitions: Vec<Value>) -> Self {
        self.packages
            .lock()
            .unwrap()
            .push((name.to_string(), version.to_string(), definitions));
        self
    }

    pub fn downloaded(&self) -> Vec<String> {
        self.downloads.lock().unwrap().clone()
    }
}

#[async_trait]
impl RegistryClient for PackageRegistry {
    fn name(&self) -> &str {
        "packages"
    }

    async fn search_profiles(&self, name: &str) -> Result<Vec<ProfileSearchHit>> {
        Ok(self
            .packages
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, _, definitions)| {
                definitions
                    .iter()
                    .any(|definition| definition["url"].as_str() == Some(name))
            })
            .map(|(package, version, _)| ProfileSearchHit::new(name).with_package(package, version))
            .collect())
    }

    async fn search_packages(&self, _name: &str) -> Result<PackageSearchResult> {
        Ok(PackageSearchResult::default())
    }

    async fn get_package_details(&self, package_id: &str) -> Result<PackageDetails> {
        Err(ResolverError::registry(format!("no details for {package_id}")))
    }

    async fn download_package(&self, package_id: &str) -> Result<Vec<u8>> {
        self.downloads.lock().unwrap().push(package_id.to_string());
        let (name, version) = package_id.split_once('#').unwrap_or((package_id, ""));
        let packages = self.packages.lock().unwrap();
        let Some((_, _, definitions)) = packages
            .iter()
            .find(|(n, v, _)| n == name && (version.is_empty() || v == version))
        else {
            return Err(ResolverError::registry(format!("unknown package {package_id}")));
        };
        Ok(package_archive(name, version, definitions))
    }

    async fn get_package_profiles(&self, package_id: &str) -> Result<Vec<Value>> {
        Err(ResolverError::registry(format!("listing unsupported for {package_id}")))
    }
}

/// In-memory store whose access counter takes far longer than any lookup.
#[allow(dead_code)]
pub struct SlowCounterStore {
    pub inner: octofhir_profile_resolver::storage::MemoryProfileStore,
    pub delay: Duration,
}

#[async_trait]
impl ProfileStore for SlowCounterStore {
    async fn get(&self, url: &str, version: Option<&str>) -> Result<Option<CachedProfile>> {
        self.inner.get(url, version).await
    }

    async fn list_versions(&self, url: &str) -> Result<Vec<String>> {
        self.inner.list_versions(url).await
    }

    async fn upsert(&self, profile: CachedProfile) -> Result<UpsertOutcome> {
        self.inner.upsert(profile).await
    }

    async fn increment_access(&self, url: &str, version: &str) -> Result<()> {
        tokio::time::sleep(self.delay).await;
        self.inner.increment_access(url, version).await
    }

    async fn clear(&self) -> Result<()> {
        self.inner.clear().await
    }

    async fn len(&self) -> Result<usize> {
        self.inner.len().await
    }
}
