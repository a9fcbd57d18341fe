//! Idempotence keys for node configurations.

use sha2::{Digest, Sha256};

use crate::core::NodeConfig;

/// Hex SHA-256 of the canonical JSON form of `config`.
///
/// Object keys serialize in sorted order, so two configs with the same
/// content always hash the same regardless of insertion order.
#[must_use]
pub fn config_hash(config: &NodeConfig) -> String {
    // Maps of JSON values cannot fail to serialize.
    let canonical = serde_json::to_string(config).unwrap_or_default();

    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_hash_is_stable_and_order_independent() {
        let mut a = NodeConfig::new();
        a.insert("name".into(), json!("java-service-dev"));
        a.insert("env".into(), json!({"B": "2", "A": "1"}));

        let mut b = NodeConfig::new();
        b.insert("env".into(), json!({"A": "1", "B": "2"}));
        b.insert("name".into(), json!("java-service-dev"));

        assert_eq!(config_hash(&a), config_hash(&b));
        assert_eq!(config_hash(&a).len(), 64);
    }

    #[test]
    fn test_hash_changes_with_content() {
        let mut a = NodeConfig::new();
        a.insert("privileged".into(), json!(true));
        let mut b = a.clone();
        b.insert("privileged".into(), json!(false));

        assert_ne!(config_hash(&a), config_hash(&b));
    }

    #[test]
    fn test_empty_config_hash() {
        assert_eq!(
            config_hash(&NodeConfig::new()),
            "44136fa355b3678a1146ad16f7e8649e94fb4fc21fe77e8310c060f61caaff8a"
        );
    }
}
