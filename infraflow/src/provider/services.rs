//! Traits for the cloud services infraflow provisions against.
//!
//! Every call is create-or-update: invoking it twice with the same arguments
//! leaves the remote resource unchanged.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::core::StageAction;
use crate::errors::ProviderError;

/// Result of converging a bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketInfo {
    /// The bucket address (its globally unique name).
    pub address: String,
}

/// Result of converging a container registry repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryInfo {
    /// The repository push URL.
    pub url: String,
}

/// Result of converging a source repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRepoInfo {
    /// HTTPS clone URL.
    pub clone_url: String,
    /// Name the repository was registered under.
    pub repository_name: String,
}

/// Result of converging a role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleInfo {
    /// The role identity (ARN).
    pub role_identity: String,
}

/// Result of converging a build project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectInfo {
    /// The project name.
    pub project_name: String,
}

/// Result of converging a pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineInfo {
    /// The pipeline id.
    pub pipeline_id: String,
}

/// Result of converging a cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterInfo {
    /// The cluster name.
    pub cluster_name: String,
}

/// Settings of a managed build project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildProjectSpec {
    /// Project name.
    pub name: String,
    /// Role the build runs as.
    pub role_identity: String,
    /// Build container image.
    pub image: String,
    /// Compute size class.
    pub compute_size: String,
    /// Whether the build container runs privileged (needed for docker builds).
    pub privileged: bool,
    /// Environment variables exposed to the build.
    #[serde(default)]
    pub env_vars: BTreeMap<String, String>,
}

/// Settings of a managed cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterSpec {
    /// Cluster name.
    pub name: String,
    /// Worker instance type.
    pub instance_type: String,
    /// Desired worker count.
    pub desired_capacity: u32,
    /// Minimum worker count.
    pub min_size: u32,
    /// Maximum worker count.
    pub max_size: u32,
}

/// A fully resolved pipeline stage as sent to the pipeline service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageDeclaration {
    /// Stage name.
    pub name: String,
    /// Stage action.
    pub action: StageAction,
    /// Artifacts consumed.
    #[serde(default)]
    pub input_artifacts: Vec<String>,
    /// Artifacts produced.
    #[serde(default)]
    pub output_artifacts: Vec<String>,
    /// Provider-specific action configuration (repository, branch, project).
    #[serde(default)]
    pub configuration: BTreeMap<String, serde_json::Value>,
}

/// Object storage service.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Creates or updates a bucket.
    async fn create_or_update_bucket(&self, name: &str, acl: &str) -> Result<BucketInfo, ProviderError>;
}

/// Container registry service.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ContainerRegistry: Send + Sync {
    /// Creates or updates an image repository.
    async fn create_or_update_repository(
        &self,
        name: &str,
        force_delete: bool,
    ) -> Result<RegistryInfo, ProviderError>;
}

/// Managed source control service.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SourceControl: Send + Sync {
    /// Creates or updates a source repository.
    async fn create_or_update_repository(
        &self,
        name: &str,
        description: &str,
    ) -> Result<SourceRepoInfo, ProviderError>;
}

/// Identity and role service.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Creates or updates a role with the given trust policy.
    async fn create_or_update_role(
        &self,
        name: &str,
        trust_policy: &serde_json::Value,
    ) -> Result<RoleInfo, ProviderError>;

    /// Attaches a managed policy to a role.
    async fn attach_policy(&self, role_identity: &str, policy_ref: &str) -> Result<(), ProviderError>;
}

/// Managed build compute service.
#[async_trait]
pub trait BuildCompute: Send + Sync {
    /// Creates or updates a build project.
    async fn create_or_update_project(&self, spec: &BuildProjectSpec) -> Result<ProjectInfo, ProviderError>;
}

/// Managed delivery pipeline service.
#[async_trait]
pub trait PipelineService: Send + Sync {
    /// Creates or updates a pipeline.
    async fn create_or_update_pipeline(
        &self,
        name: &str,
        role_arn: &str,
        artifact_store: &str,
        stages: &[StageDeclaration],
    ) -> Result<PipelineInfo, ProviderError>;
}

/// Managed cluster service.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ClusterService: Send + Sync {
    /// Creates or updates a cluster with its default node group.
    async fn create_or_update_cluster(&self, spec: &ClusterSpec) -> Result<ClusterInfo, ProviderError>;
}
