//! Reference extraction from arbitrary resource bodies.
//!
//! The walk uses an explicit stack so deeply nested or adversarial documents
//! cannot exhaust the call stack. Nodes below `max_depth` are not visited.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DEFAULT_MAX_OBJECT_DEPTH: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedReference {
    /// Dotted element path of the Reference object, e.g. `subject` or `performer[1]`.
    pub path: String,
    pub reference: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceExtraction {
    pub references: Vec<ExtractedReference>,
    /// Set when part of the document lay below the depth limit.
    pub depth_limited: bool,
}

/// All `reference` strings in a resource, in field order, ignoring `contained`.
pub fn extract_references(resource: &Value) -> Vec<ExtractedReference> {
    extract_references_with_limit(resource, DEFAULT_MAX_OBJECT_DEPTH).references
}

pub fn extract_references_with_limit(resource: &Value, max_depth: usize) -> ReferenceExtraction {
    let mut extraction = ReferenceExtraction::default();
    let mut stack: Vec<(String, &Value, usize)> = vec![(String::new(), resource, 0)];

    while let Some((path, node, depth)) = stack.pop() {
        if depth > max_depth {
            extraction.depth_limited = true;
            continue;
        }

        match node {
            Value::Object(map) => {
                if let Some(Value::String(reference)) = map.get("reference") {
                    extraction.references.push(ExtractedReference {
                        path: path.clone(),
                        reference: reference.clone(),
                    });
                }

                // Reverse so that popping yields field order.
                for (key, child) in map.iter().rev() {
                    if key == "contained" && child.is_array() {
                        continue;
                    }
                    if !(child.is_object() || child.is_array()) {
                        continue;
                    }
                    stack.push((join_path(&path, key), child, depth + 1));
                }
            }
            Value::Array(items) => {
                for (index, child) in items.iter().enumerate().rev() {
                    if child.is_object() || child.is_array() {
                        stack.push((format!("{path}[{index}]"), child, depth + 1));
                    }
                }
            }
            _ => {}
        }
    }

    if extraction.depth_limited {
        tracing::warn!(
            max_depth,
            "Reference extraction stopped at object depth limit"
        );
    }

    extraction
}

/// Find a contained resource by `#id` inside its parent resource.
pub fn resolve_contained_reference<'a>(resource: &'a Value, reference: &str) -> Option<&'a Value> {
    let id = reference.strip_prefix('#')?;
    if id.is_empty() {
        // `#` alone points at the container itself.
        return Some(resource);
    }
    resource
        .get("contained")?
        .as_array()?
        .iter()
        .find(|contained| contained.get("id").and_then(Value::as_str) == Some(id))
}

fn join_path(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_string()
    } else {
        format!("{parent}.{key}")
    }
}
