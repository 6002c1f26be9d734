//! FHIR package archive handling.
//!
//! Packages are npm-style gzip tarballs with resources under `package/`.

use flate2::read::GzDecoder;
use serde_json::Value;
use std::io::Read;
use tar::Archive;

use crate::error::{ResolverError, Result};
use crate::profile::canonical::normalize_canonical_url;
use crate::profile::metadata::is_structure_definition;

/// Largest single archive member that is decompressed.
pub const MAX_MEMBER_BYTES: u64 = 32 * 1024 * 1024;

/// All StructureDefinitions in a `.tgz` package archive.
///
/// Unparsable JSON members are skipped with a debug log; a corrupt archive
/// is an error.
pub fn extract_structure_definitions(archive_bytes: &[u8]) -> Result<Vec<Value>> {
    extract_structure_definitions_with_limit(archive_bytes, MAX_MEMBER_BYTES)
}

/// Same as [`extract_structure_definitions`], skipping members larger than `member_limit` bytes.
pub fn extract_structure_definitions_with_limit(
    archive_bytes: &[u8],
    member_limit: u64,
) -> Result<Vec<Value>> {
    let mut archive = Archive::new(GzDecoder::new(archive_bytes));
    let entries = archive
        .entries()
        .map_err(|e| ResolverError::package(format!("Failed to read package archive: {e}")))?;

    let mut definitions = Vec::new();
    for entry in entries {
        let mut entry =
            entry.map_err(|e| ResolverError::package(format!("Corrupt archive entry: {e}")))?;

        let path = entry
            .path()
            .map_err(|e| ResolverError::package(format!("Invalid archive path: {e}")))?
            .to_string_lossy()
            .into_owned();
        if !is_resource_member(&path) {
            continue;
        }

        let mut content = String::new();
        if let Err(e) = (&mut entry)
            .take(member_limit.saturating_add(1))
            .read_to_string(&mut content)
        {
            tracing::debug!(path = %path, error = %e, "Skipping unreadable package member");
            continue;
        }
        if content.len() as u64 > member_limit {
            tracing::warn!(path = %path, limit = member_limit, "Skipping oversized package member");
            continue;
        }

        match serde_json::from_str::<Value>(&content) {
            Ok(value) if is_structure_definition(&value) => definitions.push(value),
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(path = %path, error = %e, "Skipping invalid JSON in package");
            }
        }
    }

    tracing::debug!(count = definitions.len(), "Extracted StructureDefinitions from package");
    Ok(definitions)
}

/// The StructureDefinition in `definitions` matching `canonical_url` and, if given, `version`.
pub fn find_profile<'a>(
    definitions: &'a [Value],
    canonical_url: &str,
    version: Option<&str>,
) -> Option<&'a Value> {
    definitions.iter().find(|definition| {
        let url = definition
            .get("url")
            .and_then(Value::as_str)
            .map(normalize_canonical_url);
        if url.as_deref() != Some(canonical_url) {
            return false;
        }
        match version {
            Some(version) => definition.get("version").and_then(Value::as_str) == Some(version),
            None => true,
        }
    })
}

fn is_resource_member(path: &str) -> bool {
    let file_name = path.rsplit('/').next().unwrap_or(path);
    file_name.ends_with(".json")
        && file_name != "package.json"
        && !file_name.starts_with('.')
        && !path.contains("/other/")
        && !path.contains("/example/")
}
