//! Attribute references between nodes.
//!
//! A configuration value of the form `{"$ref": "<node-id>.<attribute>"}` is
//! replaced, at provisioning time, by the named attribute of the dependency's
//! live handle. References may appear at any depth inside objects and arrays.

use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

use super::{LiveHandle, NodeConfig};

/// The key marking a reference object.
pub const REF_KEY: &str = "$ref";

/// A parsed `node.attribute` reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Reference {
    /// The referenced node id.
    pub node_id: String,
    /// The attribute of that node's live handle.
    pub attribute: String,
}

impl Reference {
    /// Parses a `node.attribute` string.
    ///
    /// Returns `None` if either part is missing.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let (node_id, attribute) = raw.split_once('.')?;
        if node_id.is_empty() || attribute.is_empty() {
            return None;
        }
        Some(Self {
            node_id: node_id.to_string(),
            attribute: attribute.to_string(),
        })
    }

    /// Extracts the raw reference string if `value` is a reference object.
    #[must_use]
    pub fn raw_from_value(value: &Value) -> Option<&str> {
        match value {
            Value::Object(map) if map.len() == 1 => map.get(REF_KEY).and_then(Value::as_str),
            _ => None,
        }
    }

    /// Converts the reference into its configuration value form.
    #[must_use]
    pub fn to_value(&self) -> Value {
        serde_json::json!({ REF_KEY: self.to_string() })
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.node_id, self.attribute)
    }
}

/// Builds a reference value to `attribute` of `node_id`.
#[must_use]
pub fn reference(node_id: &str, attribute: &str) -> Value {
    Reference {
        node_id: node_id.to_string(),
        attribute: attribute.to_string(),
    }
    .to_value()
}

/// Collects every raw reference string in a configuration, in key order.
#[must_use]
pub fn collect_references(config: &NodeConfig) -> Vec<String> {
    fn walk(value: &Value, out: &mut Vec<String>) {
        if let Some(raw) = Reference::raw_from_value(value) {
            out.push(raw.to_string());
            return;
        }
        match value {
            Value::Array(items) => items.iter().for_each(|v| walk(v, out)),
            Value::Object(map) => map.values().for_each(|v| walk(v, out)),
            _ => {}
        }
    }

    let mut out = Vec::new();
    for value in config.values() {
        walk(value, &mut out);
    }
    out
}

/// Resolves every reference in `config` against `handles`.
///
/// # Errors
///
/// Returns the raw reference string of the first reference that is malformed,
/// names a node absent from `handles`, or names a missing attribute.
pub fn resolve_config(
    config: &NodeConfig,
    handles: &BTreeMap<String, LiveHandle>,
) -> Result<NodeConfig, String> {
    fn resolve(value: &Value, handles: &BTreeMap<String, LiveHandle>) -> Result<Value, String> {
        if let Some(raw) = Reference::raw_from_value(value) {
            let parsed = Reference::parse(raw).ok_or_else(|| raw.to_string())?;
            return handles
                .get(&parsed.node_id)
                .and_then(|h| h.attribute(&parsed.attribute))
                .cloned()
                .ok_or_else(|| raw.to_string());
        }
        match value {
            Value::Array(items) => items
                .iter()
                .map(|v| resolve(v, handles))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Value::Object(map) => map
                .iter()
                .map(|(k, v)| resolve(v, handles).map(|r| (k.clone(), r)))
                .collect::<Result<serde_json::Map<_, _>, _>>()
                .map(Value::Object),
            other => Ok(other.clone()),
        }
    }

    config
        .iter()
        .map(|(k, v)| resolve(v, handles).map(|r| (k.clone(), r)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Attributes, ResourceKind};

    fn registry_handle() -> BTreeMap<String, LiveHandle> {
        let mut attrs = Attributes::new();
        attrs.insert("url".to_string(), serde_json::json!("ecr.example/java"));
        let mut handles = BTreeMap::new();
        handles.insert(
            "java-ecr".to_string(),
            LiveHandle::new("java-ecr", ResourceKind::Registry, attrs, "h"),
        );
        handles
    }

    #[test]
    fn test_parse_reference() {
        let r = Reference::parse("codebuild-role.role_identity").unwrap();
        assert_eq!(r.node_id, "codebuild-role");
        assert_eq!(r.attribute, "role_identity");
        assert_eq!(r.to_string(), "codebuild-role.role_identity");

        assert!(Reference::parse("no-dot").is_none());
        assert!(Reference::parse(".attr").is_none());
        assert!(Reference::parse("node.").is_none());
    }

    #[test]
    fn test_collect_nested_references() {
        let mut config = NodeConfig::new();
        config.insert("role".into(), reference("role", "role_identity"));
        config.insert(
            "env".into(),
            serde_json::json!({"ECR_REPO": reference("ecr", "url"), "REGION": "us-west-2"}),
        );
        config.insert("stages".into(), serde_json::json!([reference("stage-a", "declaration")]));

        let refs = collect_references(&config);
        assert_eq!(refs, vec!["ecr.url", "role.role_identity", "stage-a.declaration"]);
    }

    #[test]
    fn test_resolve_config() {
        let mut config = NodeConfig::new();
        config.insert(
            "env".into(),
            serde_json::json!({"ECR_REPO": reference("java-ecr", "url")}),
        );
        config.insert("privileged".into(), serde_json::json!(true));

        let resolved = resolve_config(&config, &registry_handle()).unwrap();
        assert_eq!(
            resolved.get("env"),
            Some(&serde_json::json!({"ECR_REPO": "ecr.example/java"}))
        );
        assert_eq!(resolved.get("privileged"), Some(&serde_json::json!(true)));
    }

    #[test]
    fn test_resolve_missing_attribute() {
        let mut config = NodeConfig::new();
        config.insert("x".into(), reference("java-ecr", "arn"));

        let err = resolve_config(&config, &registry_handle()).unwrap_err();
        assert_eq!(err, "java-ecr.arn");
    }

    #[test]
    fn test_object_with_extra_keys_is_not_a_reference() {
        let value = serde_json::json!({"$ref": "a.b", "other": 1});
        assert!(Reference::raw_from_value(&value).is_none());
    }
}
