//! Resolution of references between the entries of a single Bundle.
//!
//! Nothing here touches storage or the network; every lookup is answered from
//! the Bundle's own entry list.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::reference::extract::extract_references;
use crate::reference::kind::ReferenceKind;
use crate::types::{Bundle, BundleEntry};
use crate::validation::{ValidationIssue, ValidationSeverity};

/// `fullUrl` -> index of the first entry carrying it.
pub type FullUrlIndex = HashMap<String, usize>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BundleResolutionStrategy {
    FullUrl,
    UrnUuid,
    Relative,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnresolvedReason {
    /// `#id` references belong to the contained-resource resolver of the parent resource.
    Contained,
    /// Absolute or canonical URLs cannot be answered from inside the document.
    External,
    NotFound,
    InvalidFormat,
}

impl UnresolvedReason {
    pub fn message(&self) -> &'static str {
        match self {
            UnresolvedReason::Contained => {
                "contained reference, resolve against the parent resource's contained list"
            }
            UnresolvedReason::External => "external, not resolvable within document",
            UnresolvedReason::NotFound => "no matching entry in document",
            UnresolvedReason::InvalidFormat => "reference format not recognized",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BundleResolution<'a> {
    pub reference: String,
    pub entry_index: Option<usize>,
    pub entry: Option<&'a BundleEntry>,
    pub strategy: Option<BundleResolutionStrategy>,
    pub unresolved_reason: Option<UnresolvedReason>,
}

impl<'a> BundleResolution<'a> {
    fn found(
        reference: &str,
        index: usize,
        entry: &'a BundleEntry,
        strategy: BundleResolutionStrategy,
    ) -> Self {
        Self {
            reference: reference.to_string(),
            entry_index: Some(index),
            entry: Some(entry),
            strategy: Some(strategy),
            unresolved_reason: None,
        }
    }

    fn unresolved(reference: &str, reason: UnresolvedReason) -> Self {
        Self {
            reference: reference.to_string(),
            entry_index: None,
            entry: None,
            strategy: None,
            unresolved_reason: Some(reason),
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.entry.is_some()
    }

    pub fn resource(&self) -> Option<&'a serde_json::Value> {
        self.entry.and_then(|e| e.resource.as_ref())
    }
}

pub fn build_full_url_index(bundle: &Bundle) -> FullUrlIndex {
    let mut index = FullUrlIndex::with_capacity(bundle.entry.len());
    for (position, entry) in bundle.entry.iter().enumerate() {
        if let Some(full_url) = &entry.full_url {
            index.entry(full_url.clone()).or_insert(position);
        }
    }
    index
}

/// Resolve `reference` against the Bundle's entries.
pub fn resolve_bundle_reference<'a>(reference: &str, bundle: &'a Bundle) -> BundleResolution<'a> {
    let index = build_full_url_index(bundle);
    resolve_with_index(reference, bundle, &index)
}

/// Same as [`resolve_bundle_reference`] with a precomputed index.
pub fn resolve_with_index<'a>(
    reference: &str,
    bundle: &'a Bundle,
    index: &FullUrlIndex,
) -> BundleResolution<'a> {
    let kind = ReferenceKind::classify(reference);

    if let Some(&position) = index.get(reference) {
        let strategy = match kind {
            ReferenceKind::UrnUuid { .. } => BundleResolutionStrategy::UrnUuid,
            _ => BundleResolutionStrategy::FullUrl,
        };
        return BundleResolution::found(reference, position, &bundle.entry[position], strategy);
    }

    match kind {
        ReferenceKind::UrnUuid { .. } | ReferenceKind::UrnOid { .. } => {
            BundleResolution::unresolved(reference, UnresolvedReason::NotFound)
        }
        ReferenceKind::Relative {
            resource_type, id, ..
        } => {
            let key = format!("{resource_type}/{id}");
            let suffix = format!("/{key}");
            bundle
                .entry
                .iter()
                .enumerate()
                .find(|(_, entry)| {
                    let by_resource = entry.resource_type() == Some(resource_type.as_str())
                        && entry.resource_id() == Some(id.as_str());
                    let by_full_url = entry
                        .full_url
                        .as_deref()
                        .is_some_and(|url| url == key || url.ends_with(&suffix));
                    by_resource || by_full_url
                })
                .map(|(position, entry)| {
                    BundleResolution::found(
                        reference,
                        position,
                        entry,
                        BundleResolutionStrategy::Relative,
                    )
                })
                .unwrap_or_else(|| BundleResolution::unresolved(reference, UnresolvedReason::NotFound))
        }
        ReferenceKind::Contained { .. } => {
            BundleResolution::unresolved(reference, UnresolvedReason::Contained)
        }
        ReferenceKind::Absolute { .. } | ReferenceKind::Canonical { .. } => {
            BundleResolution::unresolved(reference, UnresolvedReason::External)
        }
        ReferenceKind::Invalid => {
            BundleResolution::unresolved(reference, UnresolvedReason::InvalidFormat)
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BundleValidationReport {
    pub valid: bool,
    pub issues: Vec<ValidationIssue>,
    pub references_checked: usize,
    pub references_resolved: usize,
    /// How many references each strategy resolved.
    pub strategies: BTreeMap<String, usize>,
}

impl BundleValidationReport {
    pub fn errors(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues
            .iter()
            .filter(|issue| issue.severity == ValidationSeverity::Error)
    }

    pub fn issues_with_code<'a>(&'a self, code: &'a str) -> impl Iterator<Item = &'a ValidationIssue> {
        self.issues.iter().filter(move |issue| issue.code == code)
    }
}

/// Check the internal consistency of a Bundle.
///
/// Unresolved internal references, duplicate `fullUrl`s and transaction entries
/// without a request are errors. A `fullUrl` that disagrees with its resource is
/// a warning. Contained and external references are informational.
pub fn validate_bundle_references(bundle: &Bundle) -> BundleValidationReport {
    let index = build_full_url_index(bundle);
    let mut report = BundleValidationReport::default();

    for (position, entry) in bundle.entry.iter().enumerate() {
        let Some(resource) = &entry.resource else {
            continue;
        };

        for extracted in extract_references(resource) {
            report.references_checked += 1;
            let resolution = resolve_with_index(&extracted.reference, bundle, &index);

            if let Some(strategy) = resolution.strategy {
                report.references_resolved += 1;
                *report.strategies.entry(strategy_name(strategy)).or_default() += 1;
                continue;
            }

            let reason = resolution.unresolved_reason.unwrap_or(UnresolvedReason::NotFound);
            let issue = match reason {
                UnresolvedReason::Contained => ValidationIssue::information(
                    "contained-reference",
                    format!("Reference '{}': {}", extracted.reference, reason.message()),
                ),
                UnresolvedReason::External => ValidationIssue::information(
                    "external-reference",
                    format!("Reference '{}' is {}", extracted.reference, reason.message()),
                ),
                UnresolvedReason::NotFound | UnresolvedReason::InvalidFormat => {
                    ValidationIssue::error(
                        "unresolved-bundle-reference",
                        format!(
                            "Reference '{}' in entry {} could not be resolved: {}",
                            extracted.reference,
                            position,
                            reason.message()
                        ),
                    )
                }
            };
            report.issues.push(
                issue
                    .with_path(extracted.path)
                    .with_entries([position])
                    .with_reference(extracted.reference),
            );
        }
    }

    report.issues.extend(duplicate_full_url_issues(bundle));
    report.issues.extend(full_url_mismatch_issues(bundle));

    if bundle.bundle_type.is_some_and(|t| t.requires_entry_requests()) {
        report.issues.extend(missing_request_issues(bundle));
    }

    let valid = report.errors().next().is_none();
    report.valid = valid;

    tracing::debug!(
        entries = bundle.entry.len(),
        checked = report.references_checked,
        resolved = report.references_resolved,
        issues = report.issues.len(),
        "Validated bundle references"
    );

    report
}

fn strategy_name(strategy: BundleResolutionStrategy) -> String {
    match strategy {
        BundleResolutionStrategy::FullUrl => "full-url",
        BundleResolutionStrategy::UrnUuid => "urn-uuid",
        BundleResolutionStrategy::Relative => "relative",
    }
    .to_string()
}

fn duplicate_full_url_issues(bundle: &Bundle) -> Vec<ValidationIssue> {
    let mut positions: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (position, entry) in bundle.entry.iter().enumerate() {
        if let Some(full_url) = entry.full_url.as_deref() {
            positions.entry(full_url).or_default().push(position);
        }
    }

    positions
        .into_iter()
        .filter(|(_, indices)| indices.len() > 1)
        .map(|(full_url, indices)| {
            let listed = indices
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            ValidationIssue::error(
                "duplicate-bundle-fullurl",
                format!("fullUrl '{full_url}' is used by entries {listed}"),
            )
            .with_entries(indices)
            .with_reference(full_url)
        })
        .collect()
}

fn full_url_mismatch_issues(bundle: &Bundle) -> Vec<ValidationIssue> {
    bundle
        .entry
        .iter()
        .enumerate()
        .filter_map(|(position, entry)| {
            let full_url = entry.full_url.as_deref()?;
            if full_url.starts_with("urn:uuid:") || full_url.starts_with("urn:oid:") {
                return None;
            }
            let key = entry.resource_key()?;
            if full_url == key || full_url.ends_with(&format!("/{key}")) {
                return None;
            }
            Some(
                ValidationIssue::warning(
                    "fullurl-resource-mismatch",
                    format!("fullUrl '{full_url}' does not end with the entry's resource identity '{key}'"),
                )
                .with_entries([position])
                .with_reference(full_url),
            )
        })
        .collect()
}

fn missing_request_issues(bundle: &Bundle) -> Vec<ValidationIssue> {
    let present = |value: &Option<String>| value.as_deref().is_some_and(|v| !v.trim().is_empty());

    bundle
        .entry
        .iter()
        .enumerate()
        .filter(|(_, entry)| {
            !entry
                .request
                .as_ref()
                .is_some_and(|request| present(&request.method) && present(&request.url))
        })
        .map(|(position, _)| {
            ValidationIssue::error(
                "missing-bundle-request",
                format!("Entry {position} of a transaction or batch bundle needs request.method and request.url"),
            )
            .with_entries([position])
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BundleType;
    use serde_json::json;

    fn collection() -> Bundle {
        Bundle::default()
            .with_type(BundleType::Collection)
            .with_entry(BundleEntry::new(
                Some("http://example.org/fhir/Patient/p1"),
                json!({"resourceType": "Patient", "id": "p1", "managingOrganization": {"reference": "Organization/org1"}}),
            ))
            .with_entry(BundleEntry::new(
                None,
                json!({"resourceType": "Organization", "id": "org1"}),
            ))
    }

    #[test]
    fn test_full_url_strategy() {
        let bundle = collection();
        let resolution = resolve_bundle_reference("http://example.org/fhir/Patient/p1", &bundle);
        assert_eq!(resolution.strategy, Some(BundleResolutionStrategy::FullUrl));
        assert_eq!(resolution.entry_index, Some(0));
    }

    #[test]
    fn test_relative_strategy_by_resource_identity() {
        let bundle = collection();
        let resolution = resolve_bundle_reference("Organization/org1", &bundle);
        assert_eq!(resolution.strategy, Some(BundleResolutionStrategy::Relative));
        assert_eq!(resolution.entry_index, Some(1));
        assert_eq!(
            resolution.resource().and_then(|r| r.get("id")),
            Some(&json!("org1"))
        );
    }

    #[test]
    fn test_relative_strategy_by_full_url_suffix() {
        let bundle = Bundle::default().with_entry(BundleEntry::new(
            Some("http://example.org/fhir/Patient/p9"),
            json!({"resourceType": "Patient"}),
        ));
        let resolution = resolve_bundle_reference("Patient/p9", &bundle);
        assert_eq!(resolution.strategy, Some(BundleResolutionStrategy::Relative));
    }

    #[test]
    fn test_contained_and_external_are_unresolved() {
        let bundle = collection();
        let contained = resolve_bundle_reference("#m1", &bundle);
        assert_eq!(contained.unresolved_reason, Some(UnresolvedReason::Contained));

        let external = resolve_bundle_reference("http://other.org/fhir/Patient/x", &bundle);
        assert_eq!(external.unresolved_reason, Some(UnresolvedReason::External));
        assert_eq!(
            UnresolvedReason::External.message(),
            "external, not resolvable within document"
        );
    }

    #[test]
    fn test_collection_bundle_is_valid() {
        let report = validate_bundle_references(&collection());
        assert!(report.valid, "{:?}", report.issues);
        assert_eq!(report.references_checked, 1);
        assert_eq!(report.strategies.get("relative"), Some(&1));
    }

    #[test]
    fn test_missing_request_in_batch() {
        let bundle = Bundle::default()
            .with_type(BundleType::Batch)
            .with_entry(
                BundleEntry::new(None, json!({"resourceType": "Patient", "id": "a"}))
                    .with_request("PUT", "Patient/a"),
            )
            .with_entry(BundleEntry::new(None, json!({"resourceType": "Patient", "id": "b"})));
        let report = validate_bundle_references(&bundle);
        assert!(!report.valid);
        let issues: Vec<_> = report.issues_with_code("missing-bundle-request").collect();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].entry_indices, vec![1]);
    }

    #[test]
    fn test_full_url_mismatch_is_warning() {
        let bundle = Bundle::default().with_entry(BundleEntry::new(
            Some("http://example.org/fhir/Patient/other"),
            json!({"resourceType": "Patient", "id": "p1"}),
        ));
        let report = validate_bundle_references(&bundle);
        assert!(report.valid);
        let issue = report.issues_with_code("fullurl-resource-mismatch").next().unwrap();
        assert_eq!(issue.severity, ValidationSeverity::Warning);
    }
}
