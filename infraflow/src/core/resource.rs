//! Resource node definitions.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::OnceLock;

use crate::errors::{ContractErrorInfo, ValidationError};

/// Declared configuration of a node, keyed by setting name.
pub type NodeConfig = BTreeMap<String, serde_json::Value>;

/// The kind of infrastructure a node describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Object storage bucket.
    Bucket,
    /// Container image registry.
    Registry,
    /// Managed source repository.
    SourceRepo,
    /// Identity role.
    Role,
    /// Managed policy attached to a role.
    RolePolicyAttachment,
    /// Managed build project.
    BuildProject,
    /// One stage of a delivery pipeline.
    PipelineStage,
    /// The delivery pipeline resource itself.
    Pipeline,
    /// Managed container cluster.
    Cluster,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Bucket => "bucket",
            Self::Registry => "registry",
            Self::SourceRepo => "source_repo",
            Self::Role => "role",
            Self::RolePolicyAttachment => "role_policy_attachment",
            Self::BuildProject => "build_project",
            Self::PipelineStage => "pipeline_stage",
            Self::Pipeline => "pipeline",
            Self::Cluster => "cluster",
        };
        f.write_str(name)
    }
}

fn node_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        #[allow(clippy::unwrap_used)]
        Regex::new(r"^[a-z0-9][a-z0-9-]*$").unwrap()
    })
}

/// Returns true if `id` is a well-formed node id.
#[must_use]
pub fn is_valid_node_id(id: &str) -> bool {
    node_id_pattern().is_match(id)
}

/// A declared unit of infrastructure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceNode {
    /// Unique node id.
    pub id: String,
    /// What the node provisions.
    pub kind: ResourceKind,
    /// Declared configuration; values may contain attribute references.
    #[serde(default)]
    pub config: NodeConfig,
    /// Ids of nodes that must converge before this one.
    #[serde(default)]
    pub depends_on: BTreeSet<String>,
}

impl ResourceNode {
    /// Creates a node with empty configuration and no dependencies.
    #[must_use]
    pub fn new(id: impl Into<String>, kind: ResourceKind) -> Self {
        Self {
            id: id.into(),
            kind,
            config: NodeConfig::new(),
            depends_on: BTreeSet::new(),
        }
    }

    /// Sets a configuration value.
    #[must_use]
    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    /// Adds a dependency.
    #[must_use]
    pub fn with_dependency(mut self, dep: impl Into<String>) -> Self {
        self.depends_on.insert(dep.into());
        self
    }

    /// Adds several dependencies.
    #[must_use]
    pub fn with_dependencies(mut self, deps: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.depends_on.extend(deps.into_iter().map(Into::into));
        self
    }

    /// Validates the node's own shape.
    ///
    /// # Errors
    ///
    /// Returns an error if the node id or any dependency id is malformed.
    pub fn validate(&self) -> Result<(), ValidationError> {
        for id in std::iter::once(&self.id).chain(self.depends_on.iter()) {
            if !is_valid_node_id(id) {
                return Err(ValidationError::new(format!(
                    "Node '{}' has malformed id '{}'",
                    self.id, id
                ))
                .with_nodes(vec![self.id.clone()])
                .with_error_info(
                    ContractErrorInfo::new("GRAPH-004-INVALID_ID", format!("Invalid node id '{id}'"))
                        .with_fix_hint("Use lowercase letters, digits and dashes."),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_builder() {
        let node = ResourceNode::new("java-build", ResourceKind::BuildProject)
            .with_config("privileged", true)
            .with_dependencies(["codebuild-role", "java-service-ecr"]);

        assert_eq!(node.kind, ResourceKind::BuildProject);
        assert_eq!(node.config.get("privileged"), Some(&serde_json::json!(true)));
        assert_eq!(node.depends_on.len(), 2);
    }

    #[test]
    fn test_node_id_validation() {
        assert!(is_valid_node_id("pipeline-artifacts"));
        assert!(is_valid_node_id("go-build"));
        assert!(!is_valid_node_id(""));
        assert!(!is_valid_node_id("-leading"));
        assert!(!is_valid_node_id("Upper"));
        assert!(!is_valid_node_id("with space"));
    }

    #[test]
    fn test_validate_rejects_bad_dependency_id() {
        let node = ResourceNode::new("bucket", ResourceKind::Bucket).with_dependency("Bad_Id");
        let err = node.validate().unwrap_err();

        assert_eq!(err.error_info.unwrap().code, "GRAPH-004-INVALID_ID");
    }

    #[test]
    fn test_kind_serialize() {
        let json = serde_json::to_string(&ResourceKind::RolePolicyAttachment).unwrap();
        assert_eq!(json, r#""role_policy_attachment""#);
        assert_eq!(ResourceKind::SourceRepo.to_string(), "source_repo");
    }
}
