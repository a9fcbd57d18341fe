//! Shared storage, repositories and the build role.

use crate::config::StackConfig;
use crate::core::{reference, ResourceKind, ResourceNode};

/// Node id of the pipeline artifact bucket.
pub const ARTIFACTS_BUCKET: &str = "pipeline-artifacts";
/// Node id of the role build projects run as.
pub const CODEBUILD_ROLE: &str = "codebuild-role";

/// Managed policies attached to the build role, keyed by attachment node id.
pub const CODEBUILD_POLICIES: [(&str, &str); 3] = [
    ("codebuild-ecr", "arn:aws:iam::aws:policy/AmazonEC2ContainerRegistryPowerUser"),
    ("codebuild-s3", "arn:aws:iam::aws:policy/AmazonS3FullAccess"),
    ("codebuild-codecommit", "arn:aws:iam::aws:policy/AWSCodeCommitPowerUser"),
];

/// A service that gets its own repository, registry, build and pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Service {
    /// Lowercase key used in node ids and names.
    pub key: &'static str,
    /// Human-readable language name.
    pub display: &'static str,
}

/// The services the stack delivers.
pub const SERVICES: [Service; 2] = [
    Service {
        key: "java",
        display: "Java",
    },
    Service {
        key: "go",
        display: "Go",
    },
];

impl Service {
    /// Node id of the service's container registry.
    #[must_use]
    pub fn registry_id(&self) -> String {
        format!("{}-service-ecr", self.key)
    }

    /// Node id of the service's source repository.
    #[must_use]
    pub fn repo_id(&self) -> String {
        format!("{}-service-repo", self.key)
    }

    /// Node id of the service's build project.
    #[must_use]
    pub fn build_id(&self) -> String {
        format!("{}-build", self.key)
    }

    /// Node id of the service's pipeline.
    #[must_use]
    pub fn pipeline_id(&self) -> String {
        format!("{}-pipeline", self.key)
    }
}

/// Policy attachment node for `role` (a role node id).
pub(super) fn policy_attachment(id: &str, role: &str, policy_arn: &str) -> ResourceNode {
    ResourceNode::new(id, ResourceKind::RolePolicyAttachment)
        .with_dependency(role)
        .with_config("role", reference(role, "name"))
        .with_config("policy_arn", policy_arn)
}

/// Declares the artifact bucket, per-service registries and repositories,
/// and the build role with its policy attachments.
#[must_use]
pub fn core_resources(config: &StackConfig) -> Vec<ResourceNode> {
    let mut nodes = vec![ResourceNode::new(ARTIFACTS_BUCKET, ResourceKind::Bucket)
        .with_config("name", config.scoped_name(ARTIFACTS_BUCKET))
        .with_config("acl", "private")];

    for service in SERVICES {
        nodes.push(
            ResourceNode::new(service.registry_id(), ResourceKind::Registry)
                .with_config("name", config.scoped_name(&service.registry_id()))
                .with_config("force_delete", true),
        );
    }

    for service in SERVICES {
        nodes.push(
            ResourceNode::new(service.repo_id(), ResourceKind::SourceRepo)
                .with_config("name", config.scoped_name(&format!("{}-service", service.key)))
                .with_config(
                    "description",
                    format!("{} service source repository for CodePipeline", service.display),
                ),
        );
    }

    nodes.push(
        ResourceNode::new(CODEBUILD_ROLE, ResourceKind::Role)
            .with_config("name", config.scoped_name(CODEBUILD_ROLE))
            .with_config("trust_service", "codebuild.amazonaws.com"),
    );
    nodes.extend(
        CODEBUILD_POLICIES
            .iter()
            .map(|(id, arn)| policy_attachment(id, CODEBUILD_ROLE, arn)),
    );

    nodes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_resource_names_are_stack_scoped() {
        let nodes = core_resources(&StackConfig::new("staging", "eu-west-1"));
        let name_of = |id: &str| {
            nodes
                .iter()
                .find(|n| n.id == id)
                .and_then(|n| n.config.get("name"))
                .and_then(serde_json::Value::as_str)
                .map(str::to_string)
        };

        assert_eq!(name_of("java-service-repo").as_deref(), Some("java-service-staging"));
        assert_eq!(name_of("go-service-repo").as_deref(), Some("go-service-staging"));
        assert_eq!(name_of(ARTIFACTS_BUCKET).as_deref(), Some("pipeline-artifacts-staging"));
    }

    #[test]
    fn test_build_role_gets_three_attachments() {
        let nodes = core_resources(&StackConfig::default());
        let attachments: Vec<_> = nodes
            .iter()
            .filter(|n| n.kind == ResourceKind::RolePolicyAttachment)
            .collect();

        assert_eq!(attachments.len(), 3);
        assert!(attachments.iter().all(|n| n.depends_on.contains(CODEBUILD_ROLE)));
        assert_eq!(nodes.len(), 9);
    }
}
