//! Live handles produced by provisioning.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::ResourceKind;

/// Attributes produced by a provider for one resource.
pub type Attributes = BTreeMap<String, serde_json::Value>;

/// Converged state of a stack, keyed by node id.
pub type StateMap = BTreeMap<String, LiveHandle>;

/// The result of provisioning a resource node.
///
/// A handle carries only the attributes consumers need; it never points back
/// into the graph that declared it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveHandle {
    /// The node id this handle was produced for.
    pub id: String,
    /// The kind of the node.
    pub kind: ResourceKind,
    /// Attributes produced by the provider (address, URL, identity...).
    #[serde(default)]
    pub produced_attributes: Attributes,
    /// Hash of the resolved configuration the resource was converged with.
    pub config_hash: String,
    /// When the resource was last created or updated (ISO 8601).
    pub provisioned_at: String,
}

impl LiveHandle {
    /// Creates a new handle stamped with the current time.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        kind: ResourceKind,
        produced_attributes: Attributes,
        config_hash: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            produced_attributes,
            config_hash: config_hash.into(),
            provisioned_at: crate::utils::iso_timestamp(),
        }
    }

    /// Returns an attribute value.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&serde_json::Value> {
        self.produced_attributes.get(name)
    }

    /// Returns an attribute as a string slice.
    #[must_use]
    pub fn attribute_str(&self, name: &str) -> Option<&str> {
        self.attribute(name).and_then(serde_json::Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_attributes() {
        let mut attrs = Attributes::new();
        attrs.insert("url".to_string(), serde_json::json!("123.dkr.ecr/java"));
        attrs.insert("replicas".to_string(), serde_json::json!(2));
        let handle = LiveHandle::new("java-service-ecr", ResourceKind::Registry, attrs, "abc");

        assert_eq!(handle.attribute_str("url"), Some("123.dkr.ecr/java"));
        assert_eq!(handle.attribute_str("replicas"), None);
        assert!(handle.attribute("missing").is_none());
        assert!(handle.provisioned_at.contains('T'));
    }

    #[test]
    fn test_handle_serialization() {
        let handle = LiveHandle::new("bucket", ResourceKind::Bucket, Attributes::new(), "h1");
        let json = serde_json::to_string(&handle).unwrap();
        let restored: LiveHandle = serde_json::from_str(&json).unwrap();

        assert_eq!(handle, restored);
    }
}
