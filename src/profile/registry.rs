//! Registry client contract.
//!
//! A registry is any remote catalogue of FHIR packages that can answer
//! profile searches and hand out package archives. Every failure a client
//! reports is treated by the resolver as a miss for that source.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::Result;

/// One profile returned by a registry search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileSearchHit {
    pub url: String,
    pub name: Option<String>,
    pub version: Option<String>,
    pub package_id: Option<String>,
    pub package_version: Option<String>,
    pub fhir_version: Option<String>,
    /// Some registries inline the StructureDefinition with the hit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Value>,
}

impl ProfileSearchHit {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            name: None,
            version: None,
            package_id: None,
            package_version: None,
            fhir_version: None,
            content: None,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_package(mut self, package_id: impl Into<String>, package_version: impl Into<String>) -> Self {
        self.package_id = Some(package_id.into());
        self.package_version = Some(package_version.into());
        self
    }

    pub fn with_content(mut self, content: Value) -> Self {
        self.content = Some(content);
        self
    }

    /// `name#version` when both parts are known.
    pub fn package_ref(&self) -> Option<String> {
        match (&self.package_id, &self.package_version) {
            (Some(id), Some(version)) => Some(format!("{id}#{version}")),
            (Some(id), None) => Some(id.clone()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageSummary {
    pub name: String,
    pub description: Option<String>,
    pub fhir_version: Option<String>,
    pub version: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageSearchResult {
    pub packages: Vec<PackageSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageDetails {
    pub id: String,
    pub version: String,
    /// Direct dependencies, package name to version.
    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,
}

/// A parsed `name#version` package reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackageRef {
    pub name: String,
    pub version: Option<String>,
}

impl PackageRef {
    pub fn parse(input: &str) -> Self {
        let input = input.trim();
        match input.split_once('#') {
            Some((name, version)) if !version.trim().is_empty() => Self {
                name: name.trim().to_string(),
                version: Some(version.trim().to_string()),
            },
            Some((name, _)) => Self {
                name: name.trim().to_string(),
                version: None,
            },
            None => Self {
                name: input.to_string(),
                version: None,
            },
        }
    }

    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: Some(version.into()),
        }
    }
}

impl std::fmt::Display for PackageRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.version {
            Some(version) => write!(f, "{}#{}", self.name, version),
            None => f.write_str(&self.name),
        }
    }
}

/// Remote package registry.
///
/// `package_id` arguments accept `name` or `name#version`.
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// Short label used in logs.
    fn name(&self) -> &str;

    async fn search_profiles(&self, name: &str) -> Result<Vec<ProfileSearchHit>>;

    async fn search_packages(&self, name: &str) -> Result<PackageSearchResult>;

    async fn get_package_details(&self, package_id: &str) -> Result<PackageDetails>;

    /// Raw `.tgz` archive bytes.
    async fn download_package(&self, package_id: &str) -> Result<Vec<u8>>;

    /// StructureDefinitions the registry can list for a package without a download.
    async fn get_package_profiles(&self, package_id: &str) -> Result<Vec<Value>>;
}
