//! An in-memory cloud implementing every provider service.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::errors::ProviderError;
use crate::provider::{
    BucketInfo, BuildCompute, BuildProjectSpec, ClusterInfo, ClusterService, ClusterSpec,
    CloudProviders, ContainerRegistry, IdentityProvider, ObjectStorage, PipelineInfo,
    PipelineService, ProjectInfo, RegistryInfo, RoleInfo, SourceControl, SourceRepoInfo,
    StageDeclaration,
};

/// One call made against the fake cloud.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudCall {
    /// Operation name, e.g. `create_or_update_bucket`.
    pub operation: &'static str,
    /// Name of the resource the call targeted.
    pub target: String,
}

/// A pipeline as stored by the fake pipeline service.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredPipeline {
    /// Role the pipeline runs as.
    pub role_arn: String,
    /// Artifact bucket.
    pub artifact_store: String,
    /// Stage declarations.
    pub stages: Vec<StageDeclaration>,
}

/// Recording, fail-on-demand fake of every cloud service.
///
/// Calls are keyed by resource name; an injected failure applies to every
/// operation targeting that name until [`FakeCloud::heal`] is called.
#[derive(Debug)]
pub struct FakeCloud {
    account: String,
    region: String,
    calls: Mutex<Vec<CloudCall>>,
    failures: Mutex<HashMap<String, ProviderError>>,
    policies: Mutex<BTreeMap<String, Vec<String>>>,
    projects: Mutex<BTreeMap<String, BuildProjectSpec>>,
    pipelines: Mutex<BTreeMap<String, StoredPipeline>>,
    clusters: Mutex<BTreeMap<String, ClusterSpec>>,
}

impl Default for FakeCloud {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeCloud {
    /// Creates a fake cloud in `us-west-2`.
    #[must_use]
    pub fn new() -> Self {
        Self::in_region("us-west-2")
    }

    /// Creates a fake cloud in `region`.
    #[must_use]
    pub fn in_region(region: impl Into<String>) -> Self {
        Self {
            account: "123456789012".to_string(),
            region: region.into(),
            calls: Mutex::new(Vec::new()),
            failures: Mutex::new(HashMap::new()),
            policies: Mutex::new(BTreeMap::new()),
            projects: Mutex::new(BTreeMap::new()),
            pipelines: Mutex::new(BTreeMap::new()),
            clusters: Mutex::new(BTreeMap::new()),
        }
    }

    /// Bundles this cloud as the provider set for a provisioner.
    #[must_use]
    pub fn providers(self: &Arc<Self>) -> CloudProviders {
        CloudProviders::new(
            self.clone(),
            self.clone(),
            self.clone(),
            self.clone(),
            self.clone(),
            self.clone(),
            self.clone(),
        )
    }

    /// Makes every operation on `target` fail with `error`.
    pub fn fail_on(&self, target: impl Into<String>, error: ProviderError) {
        self.failures.lock().insert(target.into(), error);
    }

    /// Removes every injected failure.
    pub fn heal(&self) {
        self.failures.lock().clear();
    }

    /// Returns every recorded call.
    #[must_use]
    pub fn calls(&self) -> Vec<CloudCall> {
        self.calls.lock().clone()
    }

    /// Returns the number of recorded calls.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Returns the targets of every call to `operation`.
    #[must_use]
    pub fn targets_of(&self, operation: &str) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.operation == operation)
            .map(|c| c.target.clone())
            .collect()
    }

    /// Clears recorded calls but keeps stored resources.
    pub fn reset_calls(&self) {
        self.calls.lock().clear();
    }

    /// Policies attached to `role_identity`.
    #[must_use]
    pub fn attached_policies(&self, role_identity: &str) -> Vec<String> {
        self.policies.lock().get(role_identity).cloned().unwrap_or_default()
    }

    /// The stored build project named `name`.
    #[must_use]
    pub fn build_project(&self, name: &str) -> Option<BuildProjectSpec> {
        self.projects.lock().get(name).cloned()
    }

    /// The stored pipeline named `name`.
    #[must_use]
    pub fn pipeline(&self, name: &str) -> Option<StoredPipeline> {
        self.pipelines.lock().get(name).cloned()
    }

    /// The stored cluster named `name`.
    #[must_use]
    pub fn cluster(&self, name: &str) -> Option<ClusterSpec> {
        self.clusters.lock().get(name).cloned()
    }

    fn record(&self, operation: &'static str, target: &str) -> Result<(), ProviderError> {
        self.calls.lock().push(CloudCall {
            operation,
            target: target.to_string(),
        });
        match self.failures.lock().get(target) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ObjectStorage for FakeCloud {
    async fn create_or_update_bucket(&self, name: &str, _acl: &str) -> Result<BucketInfo, ProviderError> {
        self.record("create_or_update_bucket", name)?;
        Ok(BucketInfo {
            address: name.to_string(),
        })
    }
}

#[async_trait]
impl ContainerRegistry for FakeCloud {
    async fn create_or_update_repository(
        &self,
        name: &str,
        _force_delete: bool,
    ) -> Result<RegistryInfo, ProviderError> {
        self.record("create_or_update_registry", name)?;
        Ok(RegistryInfo {
            url: format!("{}.dkr.ecr.{}.amazonaws.com/{name}", self.account, self.region),
        })
    }
}

#[async_trait]
impl SourceControl for FakeCloud {
    async fn create_or_update_repository(
        &self,
        name: &str,
        _description: &str,
    ) -> Result<SourceRepoInfo, ProviderError> {
        self.record("create_or_update_source_repo", name)?;
        Ok(SourceRepoInfo {
            clone_url: format!(
                "https://git-codecommit.{}.amazonaws.com/v1/repos/{name}",
                self.region
            ),
            repository_name: name.to_string(),
        })
    }
}

#[async_trait]
impl IdentityProvider for FakeCloud {
    async fn create_or_update_role(
        &self,
        name: &str,
        trust_policy: &serde_json::Value,
    ) -> Result<RoleInfo, ProviderError> {
        self.record("create_or_update_role", name)?;
        if trust_policy.get("Statement").is_none() {
            return Err(ProviderError::Rejected(format!("role '{name}' has no trust statement")));
        }
        Ok(RoleInfo {
            role_identity: format!("arn:aws:iam::{}:role/{name}", self.account),
        })
    }

    async fn attach_policy(&self, role_identity: &str, policy_ref: &str) -> Result<(), ProviderError> {
        self.record("attach_policy", role_identity)?;
        let mut policies = self.policies.lock();
        let attached = policies.entry(role_identity.to_string()).or_default();
        if !attached.iter().any(|p| p == policy_ref) {
            attached.push(policy_ref.to_string());
        }
        Ok(())
    }
}

#[async_trait]
impl BuildCompute for FakeCloud {
    async fn create_or_update_project(&self, spec: &BuildProjectSpec) -> Result<ProjectInfo, ProviderError> {
        self.record("create_or_update_project", &spec.name)?;
        self.projects.lock().insert(spec.name.clone(), spec.clone());
        Ok(ProjectInfo {
            project_name: spec.name.clone(),
        })
    }
}

#[async_trait]
impl PipelineService for FakeCloud {
    async fn create_or_update_pipeline(
        &self,
        name: &str,
        role_arn: &str,
        artifact_store: &str,
        stages: &[StageDeclaration],
    ) -> Result<PipelineInfo, ProviderError> {
        self.record("create_or_update_pipeline", name)?;
        self.pipelines.lock().insert(
            name.to_string(),
            StoredPipeline {
                role_arn: role_arn.to_string(),
                artifact_store: artifact_store.to_string(),
                stages: stages.to_vec(),
            },
        );
        Ok(PipelineInfo {
            pipeline_id: name.to_string(),
        })
    }
}

#[async_trait]
impl ClusterService for FakeCloud {
    async fn create_or_update_cluster(&self, spec: &ClusterSpec) -> Result<ClusterInfo, ProviderError> {
        self.record("create_or_update_cluster", &spec.name)?;
        self.clusters.lock().insert(spec.name.clone(), spec.clone());
        Ok(ClusterInfo {
            cluster_name: spec.name.clone(),
        })
    }
}
