//! The managed Kubernetes cluster.

use crate::config::{StackConfig, StackSettings};
use crate::core::{ResourceKind, ResourceNode};

/// Node id of the cluster.
pub const CLUSTER: &str = "demo-eks-cluster";

/// Declares the cluster with its default node group.
#[must_use]
pub fn cluster(config: &StackConfig, settings: &StackSettings) -> ResourceNode {
    ResourceNode::new(CLUSTER, ResourceKind::Cluster)
        .with_config("name", config.scoped_name("demo-eks"))
        .with_config("instance_type", settings.instance_type.as_str())
        .with_config("desired_capacity", settings.desired_capacity)
        .with_config("min_size", settings.min_size)
        .with_config("max_size", settings.max_size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_cluster_defaults() {
        let node = cluster(&StackConfig::default(), &StackSettings::default());
        assert_eq!(node.config.get("name"), Some(&json!("demo-eks-dev")));
        assert_eq!(node.config.get("instance_type"), Some(&json!("t3.medium")));
        assert_eq!(node.config.get("desired_capacity"), Some(&json!(2)));
        assert!(node.depends_on.is_empty());
    }
}
