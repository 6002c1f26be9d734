use serde_json::Value;
use sha2::{Digest, Sha256};

/// SHA-256 of the canonical JSON serialization of a profile.
///
/// `serde_json` keeps object keys sorted, so equal documents hash equally.
pub fn content_hash(content: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.to_string().as_bytes());
    format!("{:x}", hasher.finalize())
}

/// First eight characters, for logs.
pub fn short_hash(hash: &str) -> &str {
    &hash[..hash.len().min(8)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_content_hash_is_key_order_independent() {
        let a = json!({"url": "http://example.org/sd", "version": "1.0.0"});
        let b: Value =
            serde_json::from_str(r#"{"version": "1.0.0", "url": "http://example.org/sd"}"#)
                .unwrap();
        assert_eq!(content_hash(&a), content_hash(&b));
        assert_eq!(content_hash(&a).len(), 64);
    }

    #[test]
    fn test_content_hash_changes_with_content() {
        let a = json!({"version": "1.0.0"});
        let b = json!({"version": "1.0.1"});
        assert_ne!(content_hash(&a), content_hash(&b));
        assert_eq!(short_hash(&content_hash(&a)).len(), 8);
    }
}
