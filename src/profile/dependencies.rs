//! Package dependency closure.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

use crate::error::Result;
use crate::profile::registry::{PackageRef, RegistryClient};
use crate::reference::{ReferenceChain, would_create_circular_reference};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedPackage {
    pub package: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageDependencyReport {
    pub root: String,
    /// Every package reached, `name#version`, in visit order.
    pub resolved: Vec<String>,
    pub downloaded: Vec<String>,
    pub failed: Vec<FailedPackage>,
    /// Dependency paths that loop back onto themselves.
    pub circular: Vec<ReferenceChain>,
    /// Set when `max_packages` stopped the walk early.
    pub truncated: bool,
}

impl PackageDependencyReport {
    pub fn downloaded_count(&self) -> usize {
        self.downloaded.len()
    }

    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }

    pub fn has_cycles(&self) -> bool {
        !self.circular.is_empty()
    }
}

/// Computes the full dependency closure of a package.
#[async_trait]
pub trait DependencyGraphResolver: Send + Sync {
    async fn resolve_dependencies(
        &self,
        package_id: &str,
        version: Option<&str>,
    ) -> Result<PackageDependencyReport>;
}

/// `DependencyGraphResolver` backed by a `RegistryClient`.
pub struct RegistryDependencyResolver {
    registry: Arc<dyn RegistryClient>,
    max_packages: usize,
    download: bool,
}

impl RegistryDependencyResolver {
    pub fn new(registry: Arc<dyn RegistryClient>) -> Self {
        Self {
            registry,
            max_packages: 100,
            download: true,
        }
    }

    pub fn with_max_packages(mut self, max_packages: usize) -> Self {
        self.max_packages = max_packages;
        self
    }

    /// Only read manifests, do not fetch archives.
    pub fn without_downloads(mut self) -> Self {
        self.download = false;
        self
    }
}

impl std::fmt::Debug for RegistryDependencyResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryDependencyResolver")
            .field("registry", &self.registry.name())
            .field("max_packages", &self.max_packages)
            .field("download", &self.download)
            .finish()
    }
}

#[async_trait]
impl DependencyGraphResolver for RegistryDependencyResolver {
    async fn resolve_dependencies(
        &self,
        package_id: &str,
        version: Option<&str>,
    ) -> Result<PackageDependencyReport> {
        let mut root = PackageRef::parse(package_id);
        if let Some(version) = version {
            root.version = Some(version.to_string());
        }

        let mut report = PackageDependencyReport {
            root: root.to_string(),
            ..Default::default()
        };
        let mut visited: HashSet<String> = HashSet::new();
        let mut stack: Vec<(String, ReferenceChain)> = vec![(root.to_string(), Vec::new())];

        while let Some((package, path)) = stack.pop() {
            if would_create_circular_reference(&path, &package) {
                let mut chain = path;
                chain.push(package);
                tracing::warn!(chain = ?chain, "Circular package dependency");
                report.circular.push(chain);
                continue;
            }
            if !visited.insert(package.clone()) {
                continue;
            }
            if report.resolved.len() >= self.max_packages {
                report.truncated = true;
                tracing::warn!(
                    root = %report.root,
                    max_packages = self.max_packages,
                    "Package dependency walk truncated"
                );
                break;
            }

            let details = match self.registry.get_package_details(&package).await {
                Ok(details) => details,
                Err(e) => {
                    tracing::debug!(package = %package, error = %e, "Package details unavailable");
                    report.failed.push(FailedPackage {
                        package,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            let key = PackageRef::new(&details.id, &details.version).to_string();
            if key != package {
                visited.insert(key.clone());
            }

            if self.download {
                match self.registry.download_package(&key).await {
                    Ok(_) => report.downloaded.push(key.clone()),
                    Err(e) => {
                        report.failed.push(FailedPackage {
                            package: key.clone(),
                            reason: e.to_string(),
                        });
                        continue;
                    }
                }
            }
            report.resolved.push(key.clone());

            let mut child_path = path;
            child_path.push(key);
            for (name, version) in details.dependencies.iter().rev() {
                stack.push((PackageRef::new(name, version).to_string(), child_path.clone()));
            }
        }

        tracing::debug!(
            root = %report.root,
            resolved = report.resolved.len(),
            failed = report.failed.len(),
            circular = report.circular.len(),
            "Package dependencies resolved"
        );
        Ok(report)
    }
}
