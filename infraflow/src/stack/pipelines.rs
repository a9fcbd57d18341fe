//! Build projects, the pipeline role and the per-service pipelines.

use serde_json::json;
use tracing::warn;

use super::core_resources::{policy_attachment, Service, ARTIFACTS_BUCKET, CODEBUILD_ROLE, SERVICES};
use crate::config::{StackConfig, StackSettings};
use crate::core::{reference, ResourceKind, ResourceNode};
use crate::errors::ArtifactMismatchError;
use crate::pipeline::{Pipeline, PipelineParams, PipelineTemplate};

/// Node id of the deploy project shared by every pipeline.
pub const DEPLOY_BUILD: &str = "deploy-build";
/// Node id of the role pipelines run as.
pub const PIPELINE_ROLE: &str = "codepipeline-role";
/// Node id of the pipeline role's policy attachment.
pub const PIPELINE_POLICY: &str = "pipeline-managed";

const PIPELINE_POLICY_ARN: &str = "arn:aws:iam::aws:policy/AWSCodePipelineFullAccess";

fn build_project(
    id: &str,
    config: &StackConfig,
    settings: &StackSettings,
    privileged: bool,
    env_vars: serde_json::Value,
) -> ResourceNode {
    ResourceNode::new(id, ResourceKind::BuildProject)
        .with_dependency(CODEBUILD_ROLE)
        .with_config("name", config.scoped_name(id))
        .with_config("role_identity", reference(CODEBUILD_ROLE, "role_identity"))
        .with_config("image", settings.build_image.as_str())
        .with_config("compute_size", settings.compute_size.as_str())
        .with_config("privileged", privileged)
        .with_config("env_vars", env_vars)
}

fn service_build(service: Service, config: &StackConfig, settings: &StackSettings) -> ResourceNode {
    let registry = service.registry_id();
    build_project(
        &service.build_id(),
        config,
        settings,
        true,
        json!({
            "ECR_REPO": reference(&registry, "url"),
            "AWS_DEFAULT_REGION": config.region,
        }),
    )
    .with_dependency(registry)
}

fn deploy_build(config: &StackConfig, settings: &StackSettings) -> ResourceNode {
    let cluster_name = settings.deploy_cluster();
    if cluster_name.is_empty() {
        warn!(
            stack = %config.stack,
            "No deploy cluster configured; deploy project gets an empty EKS_CLUSTER_NAME"
        );
    }
    build_project(
        DEPLOY_BUILD,
        config,
        settings,
        false,
        json!({
            "EKS_CLUSTER_NAME": cluster_name,
            "AWS_DEFAULT_REGION": config.region,
        }),
    )
}

/// Instantiates the delivery template for `service`.
///
/// # Errors
///
/// Returns [`ArtifactMismatchError`] if the template's artifact flow is broken.
pub fn service_pipeline(
    service: Service,
    config: &StackConfig,
    settings: &StackSettings,
) -> Result<Pipeline, ArtifactMismatchError> {
    PipelineTemplate::delivery().instantiate(&PipelineParams {
        id: service.pipeline_id(),
        name: config.scoped_name(&service.pipeline_id()),
        source_repo: service.repo_id(),
        build_project: service.build_id(),
        deploy_project: DEPLOY_BUILD.to_string(),
        artifact_store: ARTIFACTS_BUCKET.to_string(),
        role: PIPELINE_ROLE.to_string(),
        branch: settings.branch.clone(),
    })
}

/// Declares build projects, the pipeline role and one pipeline per service.
///
/// # Errors
///
/// Returns [`ArtifactMismatchError`] if a pipeline fails artifact validation.
pub fn pipelines(
    config: &StackConfig,
    settings: &StackSettings,
) -> Result<Vec<ResourceNode>, ArtifactMismatchError> {
    let mut nodes: Vec<ResourceNode> = SERVICES
        .iter()
        .map(|&service| service_build(service, config, settings))
        .collect();
    nodes.push(deploy_build(config, settings));

    nodes.push(
        ResourceNode::new(PIPELINE_ROLE, ResourceKind::Role)
            .with_config("name", config.scoped_name(PIPELINE_ROLE))
            .with_config("trust_service", "codepipeline.amazonaws.com"),
    );
    nodes.push(policy_attachment(PIPELINE_POLICY, PIPELINE_ROLE, PIPELINE_POLICY_ARN));

    for service in SERVICES {
        nodes.extend(service_pipeline(service, config, settings)?.to_nodes());
    }

    Ok(nodes)
}
