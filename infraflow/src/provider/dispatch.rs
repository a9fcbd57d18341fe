//! Kind-based dispatch from resource nodes to cloud services.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use super::services::{
    BuildCompute, BuildProjectSpec, ClusterService, ClusterSpec, ContainerRegistry,
    IdentityProvider, ObjectStorage, PipelineService, SourceControl, StageDeclaration,
};
use crate::core::{Attributes, NodeConfig, ResourceKind, ResourceNode};
use crate::errors::ProvisionCause;

/// Converges one resource node against the outside world.
///
/// `config` is the node configuration with every reference already
/// resolved. The returned attributes become the node's live handle.
#[async_trait]
pub trait ResourceProvider: Send + Sync {
    /// Creates or updates the resource described by `node`.
    async fn converge(&self, node: &ResourceNode, config: &NodeConfig)
        -> Result<Attributes, ProvisionCause>;
}

/// The set of cloud services a stack is provisioned against.
#[derive(Clone)]
pub struct CloudProviders {
    storage: Arc<dyn ObjectStorage>,
    registry: Arc<dyn ContainerRegistry>,
    source: Arc<dyn SourceControl>,
    identity: Arc<dyn IdentityProvider>,
    build: Arc<dyn BuildCompute>,
    pipelines: Arc<dyn PipelineService>,
    clusters: Arc<dyn ClusterService>,
}

impl std::fmt::Debug for CloudProviders {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudProviders").finish_non_exhaustive()
    }
}

impl CloudProviders {
    /// Bundles the services.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        storage: Arc<dyn ObjectStorage>,
        registry: Arc<dyn ContainerRegistry>,
        source: Arc<dyn SourceControl>,
        identity: Arc<dyn IdentityProvider>,
        build: Arc<dyn BuildCompute>,
        pipelines: Arc<dyn PipelineService>,
        clusters: Arc<dyn ClusterService>,
    ) -> Self {
        Self {
            storage,
            registry,
            source,
            identity,
            build,
            pipelines,
            clusters,
        }
    }

    async fn bucket(&self, config: &NodeConfig) -> Result<Attributes, ProvisionCause> {
        let name = required_str(config, "name")?;
        let acl = optional_str(config, "acl").unwrap_or("private");
        let info = self.storage.create_or_update_bucket(name, acl).await?;
        Ok(attributes([("address", json!(info.address)), ("name", json!(name))]))
    }

    async fn registry(&self, config: &NodeConfig) -> Result<Attributes, ProvisionCause> {
        let name = required_str(config, "name")?;
        let force_delete = optional_bool(config, "force_delete").unwrap_or(false);
        let info = self.registry.create_or_update_repository(name, force_delete).await?;
        Ok(attributes([("url", json!(info.url)), ("name", json!(name))]))
    }

    async fn source_repo(&self, config: &NodeConfig) -> Result<Attributes, ProvisionCause> {
        let name = required_str(config, "name")?;
        let description = optional_str(config, "description").unwrap_or_default();
        let info = self.source.create_or_update_repository(name, description).await?;
        Ok(attributes([
            ("clone_url", json!(info.clone_url)),
            ("repository_name", json!(info.repository_name)),
        ]))
    }

    async fn role(&self, config: &NodeConfig) -> Result<Attributes, ProvisionCause> {
        let name = required_str(config, "name")?;
        let service = required_str(config, "trust_service")?;
        let info = self
            .identity
            .create_or_update_role(name, &assume_role_policy(service))
            .await?;
        Ok(attributes([
            ("role_identity", json!(info.role_identity)),
            ("name", json!(name)),
        ]))
    }

    async fn attachment(&self, config: &NodeConfig) -> Result<Attributes, ProvisionCause> {
        let role = required_str(config, "role")?;
        let policy = required_str(config, "policy_arn")?;
        self.identity.attach_policy(role, policy).await?;
        Ok(attributes([("role", json!(role)), ("policy_arn", json!(policy))]))
    }

    async fn build_project(&self, config: &NodeConfig) -> Result<Attributes, ProvisionCause> {
        let spec = BuildProjectSpec {
            name: required_str(config, "name")?.to_string(),
            role_identity: required_str(config, "role_identity")?.to_string(),
            image: required_str(config, "image")?.to_string(),
            compute_size: required_str(config, "compute_size")?.to_string(),
            privileged: optional_bool(config, "privileged").unwrap_or(false),
            env_vars: string_map(config, "env_vars")?,
        };
        let info = self.build.create_or_update_project(&spec).await?;
        Ok(attributes([("project_name", json!(info.project_name))]))
    }

    async fn pipeline(&self, config: &NodeConfig) -> Result<Attributes, ProvisionCause> {
        let name = required_str(config, "name")?;
        let role = required_str(config, "role_arn")?;
        let store = required_str(config, "artifact_store")?;
        let stages: Vec<StageDeclaration> = config
            .get("stages")
            .cloned()
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| ProvisionCause::InvalidConfig(format!("stages: {e}")))?
            .ok_or_else(|| missing_key("stages"))?;

        crate::pipeline::validate(&stages)?;

        let info = self
            .pipelines
            .create_or_update_pipeline(name, role, store, &stages)
            .await?;
        Ok(attributes([("pipeline_id", json!(info.pipeline_id))]))
    }

    async fn cluster(&self, config: &NodeConfig) -> Result<Attributes, ProvisionCause> {
        let spec = ClusterSpec {
            name: required_str(config, "name")?.to_string(),
            instance_type: required_str(config, "instance_type")?.to_string(),
            desired_capacity: required_u32(config, "desired_capacity")?,
            min_size: required_u32(config, "min_size")?,
            max_size: required_u32(config, "max_size")?,
        };
        if !(spec.min_size <= spec.desired_capacity && spec.desired_capacity <= spec.max_size) {
            return Err(ProvisionCause::InvalidConfig(format!(
                "scaling must satisfy min <= desired <= max (got {} / {} / {})",
                spec.min_size, spec.desired_capacity, spec.max_size
            )));
        }
        let info = self.clusters.create_or_update_cluster(&spec).await?;
        Ok(attributes([("cluster_name", json!(info.cluster_name))]))
    }
}

#[async_trait]
impl ResourceProvider for CloudProviders {
    async fn converge(
        &self,
        node: &ResourceNode,
        config: &NodeConfig,
    ) -> Result<Attributes, ProvisionCause> {
        debug!(node_id = %node.id, kind = %node.kind, "Dispatching node to provider");

        match node.kind {
            ResourceKind::Bucket => self.bucket(config).await,
            ResourceKind::Registry => self.registry(config).await,
            ResourceKind::SourceRepo => self.source_repo(config).await,
            ResourceKind::Role => self.role(config).await,
            ResourceKind::RolePolicyAttachment => self.attachment(config).await,
            ResourceKind::BuildProject => self.build_project(config).await,
            // Stages live inside the pipeline resource; the handle only
            // carries the resolved declaration for the pipeline to consume.
            ResourceKind::PipelineStage => {
                let declaration = Value::Object(config.clone().into_iter().collect());
                Ok(attributes([("declaration", declaration)]))
            }
            ResourceKind::Pipeline => self.pipeline(config).await,
            ResourceKind::Cluster => self.cluster(config).await,
        }
    }
}

/// Trust policy letting `service` assume the role.
fn assume_role_policy(service: &str) -> Value {
    json!({
        "Version": "2012-10-17",
        "Statement": [{
            "Effect": "Allow",
            "Principal": { "Service": service },
            "Action": "sts:AssumeRole",
        }],
    })
}

fn attributes<const N: usize>(entries: [(&str, Value); N]) -> Attributes {
    entries
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

fn missing_key(key: &str) -> ProvisionCause {
    ProvisionCause::InvalidConfig(format!("missing required key '{key}'"))
}

fn required_str<'a>(config: &'a NodeConfig, key: &str) -> Result<&'a str, ProvisionCause> {
    optional_str(config, key).ok_or_else(|| missing_key(key))
}

fn optional_str<'a>(config: &'a NodeConfig, key: &str) -> Option<&'a str> {
    config.get(key).and_then(Value::as_str)
}

fn optional_bool(config: &NodeConfig, key: &str) -> Option<bool> {
    config.get(key).and_then(Value::as_bool)
}

fn required_u32(config: &NodeConfig, key: &str) -> Result<u32, ProvisionCause> {
    let value = config.get(key).ok_or_else(|| missing_key(key))?;
    value
        .as_u64()
        .and_then(|n| u32::try_from(n).ok())
        .ok_or_else(|| ProvisionCause::InvalidConfig(format!("'{key}' must be a small non-negative integer")))
}

fn string_map(config: &NodeConfig, key: &str) -> Result<BTreeMap<String, String>, ProvisionCause> {
    let Some(value) = config.get(key) else {
        return Ok(BTreeMap::new());
    };
    let Value::Object(map) = value else {
        return Err(ProvisionCause::InvalidConfig(format!("'{key}' must be an object")));
    };
    map.iter()
        .map(|(k, v)| match v {
            Value::String(s) => Ok((k.clone(), s.clone())),
            other => Err(ProvisionCause::InvalidConfig(format!(
                "'{key}.{k}' must be a string, got {other}"
            ))),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ProviderError;
    use crate::provider::services::{
        BucketInfo, ClusterInfo, MockClusterService, MockContainerRegistry, MockObjectStorage,
        MockSourceControl, RegistryInfo,
    };
    use crate::testing::FakeCloud;

    fn providers_with(
        storage: MockObjectStorage,
        registry: MockContainerRegistry,
        clusters: MockClusterService,
    ) -> CloudProviders {
        let fake = Arc::new(FakeCloud::new());
        CloudProviders::new(
            Arc::new(storage),
            Arc::new(registry),
            Arc::new(MockSourceControl::new()),
            fake.clone(),
            fake.clone(),
            fake,
            Arc::new(clusters),
        )
    }

    #[tokio::test]
    async fn test_bucket_defaults_to_private_acl() {
        let mut storage = MockObjectStorage::new();
        storage
            .expect_create_or_update_bucket()
            .withf(|name, acl| name == "pipeline-artifacts-dev" && acl == "private")
            .times(1)
            .returning(|name, _| {
                Ok(BucketInfo {
                    address: name.to_string(),
                })
            });
        let providers =
            providers_with(storage, MockContainerRegistry::new(), MockClusterService::new());

        let node = ResourceNode::new("artifacts", ResourceKind::Bucket)
            .with_config("name", "pipeline-artifacts-dev");
        let attrs = providers.converge(&node, &node.config).await.unwrap();

        assert_eq!(attrs.get("address"), Some(&json!("pipeline-artifacts-dev")));
    }

    #[tokio::test]
    async fn test_registry_passes_force_delete() {
        let mut registry = MockContainerRegistry::new();
        registry
            .expect_create_or_update_repository()
            .withf(|name, force| name == "java-service" && *force)
            .returning(|name, _| {
                Ok(RegistryInfo {
                    url: format!("123.dkr.ecr/{name}"),
                })
            });
        let providers =
            providers_with(MockObjectStorage::new(), registry, MockClusterService::new());

        let node = ResourceNode::new("java-ecr", ResourceKind::Registry)
            .with_config("name", "java-service")
            .with_config("force_delete", true);
        let attrs = providers.converge(&node, &node.config).await.unwrap();

        assert_eq!(attrs.get("url"), Some(&json!("123.dkr.ecr/java-service")));
    }

    #[tokio::test]
    async fn test_provider_failure_is_wrapped() {
        let mut storage = MockObjectStorage::new();
        storage
            .expect_create_or_update_bucket()
            .returning(|_, _| Err(ProviderError::Transient("throttled".into())));
        let providers =
            providers_with(storage, MockContainerRegistry::new(), MockClusterService::new());

        let node = ResourceNode::new("artifacts", ResourceKind::Bucket).with_config("name", "b");
        let cause = providers.converge(&node, &node.config).await.unwrap_err();

        assert!(cause.is_transient());
    }

    #[tokio::test]
    async fn test_missing_key_is_invalid_config() {
        let providers = providers_with(
            MockObjectStorage::new(),
            MockContainerRegistry::new(),
            MockClusterService::new(),
        );
        let node = ResourceNode::new("artifacts", ResourceKind::Bucket);
        let cause = providers.converge(&node, &node.config).await.unwrap_err();

        assert!(matches!(cause, ProvisionCause::InvalidConfig(msg) if msg.contains("name")));
    }

    #[tokio::test]
    async fn test_cluster_rejects_bad_scaling_without_calling_provider() {
        let mut clusters = MockClusterService::new();
        clusters.expect_create_or_update_cluster().never();
        let providers =
            providers_with(MockObjectStorage::new(), MockContainerRegistry::new(), clusters);

        let node = ResourceNode::new("eks", ResourceKind::Cluster)
            .with_config("name", "demo-eks-dev")
            .with_config("instance_type", "t3.medium")
            .with_config("desired_capacity", 5)
            .with_config("min_size", 1)
            .with_config("max_size", 3);
        let cause = providers.converge(&node, &node.config).await.unwrap_err();

        assert!(matches!(cause, ProvisionCause::InvalidConfig(_)));
    }

    #[tokio::test]
    async fn test_cluster_spec_is_forwarded() {
        let mut clusters = MockClusterService::new();
        clusters
            .expect_create_or_update_cluster()
            .withf(|spec| spec.desired_capacity == 2 && spec.instance_type == "t3.medium")
            .returning(|spec| {
                Ok(ClusterInfo {
                    cluster_name: spec.name.clone(),
                })
            });
        let providers =
            providers_with(MockObjectStorage::new(), MockContainerRegistry::new(), clusters);

        let node = ResourceNode::new("eks", ResourceKind::Cluster)
            .with_config("name", "demo-eks-dev")
            .with_config("instance_type", "t3.medium")
            .with_config("desired_capacity", 2)
            .with_config("min_size", 1)
            .with_config("max_size", 3);
        let attrs = providers.converge(&node, &node.config).await.unwrap();

        assert_eq!(attrs.get("cluster_name"), Some(&json!("demo-eks-dev")));
    }

    #[tokio::test]
    async fn test_pipeline_with_broken_artifact_flow_is_rejected() {
        let providers = providers_with(
            MockObjectStorage::new(),
            MockContainerRegistry::new(),
            MockClusterService::new(),
        );
        let stages = json!([
            {"name": "Source", "action": "source", "output_artifacts": ["SourceOutput"]},
            {"name": "Deploy", "action": "deploy", "input_artifacts": ["X"]},
        ]);
        let node = ResourceNode::new("java-pipeline", ResourceKind::Pipeline)
            .with_config("name", "java-pipeline-dev")
            .with_config("role_arn", "arn:role")
            .with_config("artifact_store", "bucket")
            .with_config("stages", stages);

        let cause = providers.converge(&node, &node.config).await.unwrap_err();
        let ProvisionCause::Artifact(err) = cause else {
            panic!("expected artifact error");
        };
        assert_eq!(err.stage_name, "Deploy");
        assert_eq!(err.missing_artifact, "X");
    }

    #[tokio::test]
    async fn test_env_vars_must_be_strings() {
        let providers = providers_with(
            MockObjectStorage::new(),
            MockContainerRegistry::new(),
            MockClusterService::new(),
        );
        let node = ResourceNode::new("java-build", ResourceKind::BuildProject)
            .with_config("name", "java-build")
            .with_config("role_identity", "arn:role")
            .with_config("image", "img")
            .with_config("compute_size", "small")
            .with_config("env_vars", json!({"N": 1}));

        let cause = providers.converge(&node, &node.config).await.unwrap_err();
        assert!(matches!(cause, ProvisionCause::InvalidConfig(_)));
    }
}
