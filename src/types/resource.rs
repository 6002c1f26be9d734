use serde_json::Value;

pub fn resource_type(resource: &Value) -> Option<&str> {
    resource.get("resourceType").and_then(Value::as_str)
}

pub fn resource_id(resource: &Value) -> Option<&str> {
    resource.get("id").and_then(Value::as_str)
}

/// `ResourceType/id` identity of a resource body.
pub fn resource_key(resource: &Value) -> Option<String> {
    Some(format!("{}/{}", resource_type(resource)?, resource_id(resource)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_resource_key() {
        let patient = json!({"resourceType": "Patient", "id": "A"});
        assert_eq!(resource_key(&patient).as_deref(), Some("Patient/A"));
        assert_eq!(resource_key(&json!({"resourceType": "Patient"})), None);
    }
}
