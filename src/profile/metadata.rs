use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ResolverError, Result};
use crate::profile::canonical::normalize_canonical_url;

/// The identifying fields of a StructureDefinition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileMetadata {
    pub url: String,
    pub name: Option<String>,
    pub title: Option<String>,
    pub version: Option<String>,
    pub status: Option<String>,
    pub kind: Option<String>,
    /// The constrained type, e.g. `Patient`.
    #[serde(rename = "type")]
    pub type_name: Option<String>,
    pub base_definition: Option<String>,
    pub derivation: Option<String>,
    pub fhir_version: Option<String>,
    pub publisher: Option<String>,
    pub is_abstract: bool,
}

/// Read the metadata of a StructureDefinition.
///
/// Anything else is rejected. Caching a half-understood payload would poison
/// every later lookup of the same canonical.
pub fn extract_metadata(profile: &Value) -> Result<ProfileMetadata> {
    let Some(object) = profile.as_object() else {
        return Err(ResolverError::invalid_profile("profile content is not a JSON object"));
    };

    match object.get("resourceType").and_then(Value::as_str) {
        Some("StructureDefinition") => {}
        Some(other) => {
            return Err(ResolverError::invalid_profile(format!(
                "expected a StructureDefinition, found {other}"
            )));
        }
        None => {
            return Err(ResolverError::invalid_profile("missing resourceType"));
        }
    }

    let text = |field: &str| object.get(field).and_then(Value::as_str).map(str::to_string);

    let url = text("url")
        .filter(|url| !url.trim().is_empty())
        .ok_or_else(|| ResolverError::invalid_profile("StructureDefinition has no url"))?;

    Ok(ProfileMetadata {
        url,
        name: text("name"),
        title: text("title"),
        version: text("version"),
        status: text("status"),
        kind: text("kind"),
        type_name: text("type"),
        base_definition: text("baseDefinition"),
        derivation: text("derivation"),
        fhir_version: text("fhirVersion"),
        publisher: text("publisher"),
        is_abstract: object
            .get("abstract")
            .and_then(Value::as_bool)
            .unwrap_or(false),
    })
}

pub fn is_structure_definition(value: &Value) -> bool {
    value.get("resourceType").and_then(Value::as_str) == Some("StructureDefinition")
}

/// Canonical URLs a profile depends on.
///
/// Collects `baseDefinition` and every `type.profile` / `type.targetProfile`
/// in snapshot and differential, normalized, deduplicated, in first-seen order.
pub fn extract_profile_dependencies(profile: &Value) -> Vec<String> {
    let own_url = profile
        .get("url")
        .and_then(Value::as_str)
        .map(normalize_canonical_url);

    let mut dependencies: Vec<String> = Vec::new();
    let mut push = |url: &str| {
        let normalized = normalize_canonical_url(url);
        if normalized.is_empty() || Some(&normalized) == own_url.as_ref() {
            return;
        }
        if !dependencies.contains(&normalized) {
            dependencies.push(normalized);
        }
    };

    if let Some(base) = profile.get("baseDefinition").and_then(Value::as_str) {
        push(base);
    }

    for section in ["snapshot", "differential"] {
        let elements = profile
            .get(section)
            .and_then(|s| s.get("element"))
            .and_then(Value::as_array);
        for element in elements.into_iter().flatten() {
            let types = element.get("type").and_then(Value::as_array);
            for element_type in types.into_iter().flatten() {
                for field in ["profile", "targetProfile"] {
                    let urls = element_type.get(field).and_then(Value::as_array);
                    for url in urls.into_iter().flatten().filter_map(Value::as_str) {
                        push(url);
                    }
                }
            }
        }
    }

    dependencies
}
