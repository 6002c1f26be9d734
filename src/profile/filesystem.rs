//! Local StructureDefinition lookup.
//!
//! Roots are walked with an explicit stack. A directory that carries a
//! package `.index.json` is answered from the index; anything else is read
//! file by file.

use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::profile::canonical::normalize_canonical_url;
use crate::profile::metadata::is_structure_definition;
use crate::version::{resolve_version, satisfies_range};

const MAX_SCAN_DEPTH: usize = 6;

#[derive(Debug, Clone)]
pub struct FilesystemHit {
    pub path: PathBuf,
    pub version: Option<String>,
    pub content: Value,
}

#[derive(Debug, Deserialize)]
struct PackageIndex {
    #[serde(default)]
    files: Vec<IndexedFile>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IndexedFile {
    filename: String,
    resource_type: Option<String>,
    url: Option<String>,
    version: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct FilesystemProfileSource {
    roots: Vec<PathBuf>,
}

impl FilesystemProfileSource {
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self { roots }
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Find the best local StructureDefinition for `canonical_url`.
    ///
    /// `version` may be exact, a range, or `None` for the latest stable copy.
    pub async fn find(&self, canonical_url: &str, version: Option<&str>) -> Result<Option<FilesystemHit>> {
        let mut candidates = Vec::new();
        for root in &self.roots {
            if tokio::fs::metadata(root).await.is_err() {
                tracing::trace!(root = %root.display(), "Filesystem root missing");
                continue;
            }
            self.scan_root(root, canonical_url, &mut candidates).await?;
        }

        let candidates: Vec<FilesystemHit> = match version {
            Some(spec) => candidates
                .into_iter()
                .filter(|hit| match hit.version.as_deref() {
                    Some(found) => found == spec || satisfies_range(found, spec),
                    None => false,
                })
                .collect(),
            None => candidates,
        };

        let versions: Vec<String> = candidates.iter().filter_map(|hit| hit.version.clone()).collect();
        if versions.is_empty() {
            return Ok(candidates.into_iter().next());
        }

        let chosen = resolve_version(version, &versions, true).version;
        Ok(candidates
            .into_iter()
            .find(|hit| hit.version.as_deref() == Some(chosen.as_str())))
    }

    async fn scan_root(
        &self,
        root: &Path,
        canonical_url: &str,
        candidates: &mut Vec<FilesystemHit>,
    ) -> Result<()> {
        let mut stack = vec![(root.to_path_buf(), 0usize)];

        while let Some((dir, depth)) = stack.pop() {
            let index_path = dir.join(".index.json");
            if let Some(index) = read_index(&index_path).await {
                for file in index.files {
                    let matches = file.resource_type.as_deref() == Some("StructureDefinition")
                        && file.url.as_deref().map(normalize_canonical_url).as_deref()
                            == Some(canonical_url);
                    if !matches {
                        continue;
                    }
                    let path = dir.join(&file.filename);
                    if let Some(content) = read_definition(&path).await {
                        candidates.push(FilesystemHit {
                            path,
                            version: file.version,
                            content,
                        });
                    }
                }
                // An indexed directory may still hold nested packages.
            }

            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::debug!(dir = %dir.display(), error = %e, "Cannot read directory");
                    continue;
                }
            };
            let indexed = tokio::fs::metadata(&index_path).await.is_ok();

            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let file_type = entry.file_type().await?;

                if file_type.is_dir() {
                    if depth < MAX_SCAN_DEPTH {
                        stack.push((path, depth + 1));
                    }
                    continue;
                }
                if indexed || !is_candidate_file(&path) {
                    continue;
                }

                let Some(content) = read_definition(&path).await else {
                    continue;
                };
                let url = content
                    .get("url")
                    .and_then(Value::as_str)
                    .map(normalize_canonical_url);
                if url.as_deref() == Some(canonical_url) {
                    candidates.push(FilesystemHit {
                        version: content
                            .get("version")
                            .and_then(Value::as_str)
                            .map(str::to_string),
                        path,
                        content,
                    });
                }
            }
        }

        Ok(())
    }
}

fn is_candidate_file(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    name.ends_with(".json") && name != "package.json" && !name.starts_with('.')
}

async fn read_index(path: &Path) -> Option<PackageIndex> {
    let raw = tokio::fs::read_to_string(path).await.ok()?;
    match serde_json::from_str(&raw) {
        Ok(index) => Some(index),
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "Ignoring malformed package index");
            None
        }
    }
}

async fn read_definition(path: &Path) -> Option<Value> {
    let raw = tokio::fs::read_to_string(path).await.ok()?;
    let value: Value = serde_json::from_str(&raw).ok()?;
    is_structure_definition(&value).then_some(value)
}
