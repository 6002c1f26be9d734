use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// The fields of a Bundle that reference resolution reads.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bundle {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub bundle_type: Option<BundleType>,
    #[serde(default)]
    pub entry: Vec<BundleEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BundleType {
    Document,
    Message,
    Transaction,
    TransactionResponse,
    Batch,
    BatchResponse,
    History,
    Searchset,
    Collection,
    SubscriptionNotification,
    #[serde(other)]
    Unknown,
}

impl BundleType {
    /// Transaction and batch bundles must carry a request on every entry.
    pub fn requires_entry_requests(&self) -> bool {
        matches!(self, BundleType::Transaction | BundleType::Batch)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<BundleRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl Bundle {
    pub fn from_value(value: &Value) -> Result<Self> {
        Ok(Bundle::deserialize(value)?)
    }

    pub fn with_type(mut self, bundle_type: BundleType) -> Self {
        self.bundle_type = Some(bundle_type);
        self
    }

    pub fn with_entry(mut self, entry: BundleEntry) -> Self {
        self.entry.push(entry);
        self
    }
}

impl BundleEntry {
    pub fn new(full_url: Option<&str>, resource: Value) -> Self {
        Self {
            full_url: full_url.map(str::to_string),
            resource: Some(resource),
            ..Default::default()
        }
    }

    pub fn with_request(mut self, method: &str, url: &str) -> Self {
        self.request = Some(BundleRequest {
            method: Some(method.to_string()),
            url: Some(url.to_string()),
        });
        self
    }

    pub fn resource_type(&self) -> Option<&str> {
        self.resource
            .as_ref()
            .and_then(|r| r.get("resourceType"))
            .and_then(Value::as_str)
    }

    pub fn resource_id(&self) -> Option<&str> {
        self.resource
            .as_ref()
            .and_then(|r| r.get("id"))
            .and_then(Value::as_str)
    }

    /// `ResourceType/id` of the entry's resource, when both are present.
    pub fn resource_key(&self) -> Option<String> {
        Some(format!("{}/{}", self.resource_type()?, self.resource_id()?))
    }
}
