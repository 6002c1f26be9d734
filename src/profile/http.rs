//! `RegistryClient` over the npm-style FHIR package registry API
//! (packages.simplifier.net, packages.fhir.org).

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::core::HttpRegistryConfig;
use crate::error::{ResolverError, Result};
use crate::profile::package::extract_structure_definitions;
use crate::profile::registry::{
    PackageDetails, PackageRef, PackageSearchResult, PackageSummary, ProfileSearchHit,
    RegistryClient,
};

#[derive(Debug, Clone)]
pub struct HttpRegistryClient {
    name: String,
    config: HttpRegistryConfig,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct CatalogEntry {
    #[serde(rename = "Name", alias = "name")]
    name: String,
    #[serde(rename = "Description", alias = "description", default)]
    description: Option<String>,
    #[serde(rename = "FHIRVersion", alias = "fhirVersion", default)]
    fhir_version: Option<String>,
    #[serde(rename = "Version", alias = "version", default)]
    version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PackageManifest {
    #[serde(rename = "dist-tags", default)]
    dist_tags: BTreeMap<String, String>,
    #[serde(default)]
    versions: BTreeMap<String, ManifestVersion>,
}

#[derive(Debug, Deserialize)]
struct ManifestVersion {
    #[serde(default)]
    dependencies: BTreeMap<String, String>,
}

impl HttpRegistryClient {
    pub fn new(name: impl Into<String>, config: HttpRegistryConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| ResolverError::registry(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            name: name.into(),
            config,
            client,
        })
    }

    pub fn simplifier() -> Result<Self> {
        Self::new("simplifier", HttpRegistryConfig::simplifier())
    }

    pub fn fhir_packages() -> Result<Self> {
        Self::new("packages.fhir.org", HttpRegistryConfig::fhir_packages())
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        tracing::debug!(registry = %self.name, url = %url, "Registry request");
        let response = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| ResolverError::registry(format!("Request to {url} failed: {e}")))?;

        if !response.status().is_success() {
            return Err(ResolverError::registry(format!(
                "{url} returned HTTP {}",
                response.status()
            )));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| ResolverError::registry(format!("Invalid JSON from {url}: {e}")))
    }

    async fn catalog(&self, query: &str) -> Result<Vec<CatalogEntry>> {
        self.get_json(&self.url(&format!("catalog?{query}"))).await
    }

    async fn manifest(&self, name: &str) -> Result<PackageManifest> {
        self.get_json(&self.url(name)).await
    }

    /// Resolve `name` or `name#version` to a concrete version via the manifest.
    async fn concrete_ref(&self, package_id: &str) -> Result<(PackageRef, PackageManifest)> {
        let mut package = PackageRef::parse(package_id);
        let manifest = self.manifest(&package.name).await?;
        if package.version.is_none() {
            let latest = manifest.dist_tags.get("latest").cloned().ok_or_else(|| {
                ResolverError::registry(format!("Package {} has no latest tag", package.name))
            })?;
            package.version = Some(latest);
        }
        Ok((package, manifest))
    }
}

fn query_escape(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

#[async_trait]
impl RegistryClient for HttpRegistryClient {
    fn name(&self) -> &str {
        &self.name
    }

    /// Catalog lookup by canonical. Each hit names a package that ships the profile.
    async fn search_profiles(&self, name: &str) -> Result<Vec<ProfileSearchHit>> {
        let entries = self
            .catalog(&format!("canonical={}", query_escape(name)))
            .await?;

        Ok(entries
            .into_iter()
            .map(|entry| ProfileSearchHit {
                url: name.to_string(),
                name: None,
                version: None,
                package_id: Some(entry.name),
                package_version: entry.version,
                fhir_version: entry.fhir_version,
                content: None,
            })
            .collect())
    }

    async fn search_packages(&self, name: &str) -> Result<PackageSearchResult> {
        let entries = self.catalog(&format!("name={}", query_escape(name))).await?;
        Ok(PackageSearchResult {
            packages: entries
                .into_iter()
                .map(|entry| PackageSummary {
                    name: entry.name,
                    description: entry.description,
                    fhir_version: entry.fhir_version,
                    version: entry.version,
                })
                .collect(),
        })
    }

    async fn get_package_details(&self, package_id: &str) -> Result<PackageDetails> {
        let (package, manifest) = self.concrete_ref(package_id).await?;
        let version = package.version.unwrap_or_default();
        let dependencies = manifest
            .versions
            .get(&version)
            .map(|v| v.dependencies.clone())
            .unwrap_or_default();

        Ok(PackageDetails {
            id: package.name,
            version,
            dependencies,
        })
    }

    async fn download_package(&self, package_id: &str) -> Result<Vec<u8>> {
        let mut package = PackageRef::parse(package_id);
        if package.version.is_none() {
            package = self.concrete_ref(package_id).await?.0;
        }
        let version = package.version.as_deref().unwrap_or_default();
        let url = self.url(&format!("{}/{}", package.name, version));

        tracing::info!(registry = %self.name, package = %package, "Downloading package");
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ResolverError::registry(format!("Download of {package} failed: {e}")))?;

        if !response.status().is_success() {
            return Err(ResolverError::registry(format!(
                "Download of {package} returned HTTP {}",
                response.status()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ResolverError::registry(format!("Failed to read {package}: {e}")))?;
        Ok(bytes.to_vec())
    }

    /// The npm-style API has no per-package resource listing, so this downloads.
    async fn get_package_profiles(&self, package_id: &str) -> Result<Vec<Value>> {
        let archive = self.download_package(package_id).await?;
        extract_structure_definitions(&archive)
    }
}
