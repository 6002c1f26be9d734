use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The addressing scheme of a reference string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ReferenceKind {
    /// `#id`, pointing at a resource contained in the referring resource.
    Contained { id: String },
    /// `urn:uuid:<uuid>`, addressing a Bundle entry by its `fullUrl`.
    UrnUuid { uuid: Uuid },
    /// `urn:oid:<oid>`.
    UrnOid { oid: String },
    /// `ResourceType/id` or `ResourceType/id/_history/vid`.
    Relative {
        resource_type: String,
        id: String,
        version: Option<String>,
    },
    /// An absolute URL. Type and id are filled when the URL ends in `ResourceType/id`.
    Absolute {
        url: String,
        resource_type: Option<String>,
        id: Option<String>,
    },
    /// A canonical URL pinned to a version with `|`.
    Canonical { url: String, version: String },
    Invalid,
}

impl ReferenceKind {
    pub fn classify(reference: &str) -> Self {
        let reference = reference.trim();

        if let Some(id) = reference.strip_prefix('#') {
            return ReferenceKind::Contained { id: id.to_string() };
        }

        if let Some(value) = reference.strip_prefix("urn:uuid:") {
            return match Uuid::parse_str(value) {
                Ok(uuid) => ReferenceKind::UrnUuid { uuid },
                Err(_) => ReferenceKind::Invalid,
            };
        }

        if let Some(oid) = reference.strip_prefix("urn:oid:") {
            return if !oid.is_empty() && oid.split('.').all(|arc| arc.parse::<u64>().is_ok()) {
                ReferenceKind::UrnOid { oid: oid.to_string() }
            } else {
                ReferenceKind::Invalid
            };
        }

        if reference.contains("://") {
            if let Some((url, version)) = reference.split_once('|') {
                return ReferenceKind::Canonical {
                    url: url.to_string(),
                    version: version.to_string(),
                };
            }
            let tail = type_and_id(reference.rsplit('/').collect::<Vec<_>>().as_slice());
            return ReferenceKind::Absolute {
                url: reference.to_string(),
                resource_type: tail.as_ref().map(|(t, _)| t.clone()),
                id: tail.map(|(_, id)| id),
            };
        }

        let segments: Vec<&str> = reference.split('/').collect();
        match segments.as_slice() {
            [resource_type, id] if is_resource_type(resource_type) && is_id(id) => {
                ReferenceKind::Relative {
                    resource_type: resource_type.to_string(),
                    id: id.to_string(),
                    version: None,
                }
            }
            [resource_type, id, "_history", version]
                if is_resource_type(resource_type) && is_id(id) && !version.is_empty() =>
            {
                ReferenceKind::Relative {
                    resource_type: resource_type.to_string(),
                    id: id.to_string(),
                    version: Some(version.to_string()),
                }
            }
            _ => ReferenceKind::Invalid,
        }
    }

    /// Absolute, canonical and OID references point outside the current document.
    pub fn is_external(&self) -> bool {
        matches!(
            self,
            ReferenceKind::Absolute { .. } | ReferenceKind::Canonical { .. } | ReferenceKind::UrnOid { .. }
        )
    }

    pub fn is_contained(&self) -> bool {
        matches!(self, ReferenceKind::Contained { .. })
    }

    pub fn resource_type(&self) -> Option<&str> {
        match self {
            ReferenceKind::Relative { resource_type, .. } => Some(resource_type),
            ReferenceKind::Absolute { resource_type, .. } => resource_type.as_deref(),
            _ => None,
        }
    }

    /// `ResourceType/id` for relative references, without any history suffix.
    pub fn relative_key(&self) -> Option<String> {
        match self {
            ReferenceKind::Relative {
                resource_type, id, ..
            } => Some(format!("{resource_type}/{id}")),
            _ => None,
        }
    }
}

/// Identity used to compare a reference against visited nodes.
pub fn reference_key(reference: &str) -> String {
    ReferenceKind::classify(reference)
        .relative_key()
        .unwrap_or_else(|| reference.trim().to_string())
}

// `segments` is reversed: [last, second-to-last, ...].
fn type_and_id(segments: &[&str]) -> Option<(String, String)> {
    match segments {
        [version, "_history", id, resource_type, ..]
            if !version.is_empty() && is_resource_type(resource_type) && is_id(id) =>
        {
            Some((resource_type.to_string(), id.to_string()))
        }
        [id, resource_type, ..] if is_resource_type(resource_type) && is_id(id) => {
            Some((resource_type.to_string(), id.to_string()))
        }
        _ => None,
    }
}

fn is_resource_type(segment: &str) -> bool {
    let mut chars = segment.chars();
    chars.next().is_some_and(|c| c.is_ascii_uppercase()) && chars.all(|c| c.is_ascii_alphanumeric())
}

fn is_id(segment: &str) -> bool {
    !segment.is_empty()
        && segment.len() <= 64
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
}
