//! The parametrized delivery pipeline template.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::stage::stage_slug;
use super::{validate, Pipeline, PipelineStage};
use crate::core::StageAction;
use crate::errors::{ArtifactMismatchError, ContractErrorInfo, InfraflowError, ValidationError};

/// A stage declared once in a template, without a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageTemplate {
    /// Stage name.
    pub name: String,
    /// Stage action.
    pub action: StageAction,
    /// Consumed artifacts.
    pub input_artifacts: Vec<String>,
    /// Produced artifacts.
    pub output_artifacts: Vec<String>,
}

impl StageTemplate {
    fn new(name: &str, action: StageAction, inputs: &[&str], outputs: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            action,
            input_artifacts: inputs.iter().map(ToString::to_string).collect(),
            output_artifacts: outputs.iter().map(ToString::to_string).collect(),
        }
    }
}

/// Node ids and names that bind a template to concrete resources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineParams {
    /// Node id of the pipeline resource.
    pub id: String,
    /// Resource name of the pipeline.
    pub name: String,
    /// Source repository node the Source stage reads.
    pub source_repo: String,
    /// Build project node the Build stage runs.
    pub build_project: String,
    /// Build project node the Deploy stage runs.
    pub deploy_project: String,
    /// Artifact bucket node.
    pub artifact_store: String,
    /// Role node the pipeline assumes.
    pub role: String,
    /// Tracked branch.
    pub branch: String,
}

impl PipelineParams {
    fn project_for(&self, action: StageAction) -> &str {
        match action {
            StageAction::Source => &self.source_repo,
            StageAction::Build => &self.build_project,
            StageAction::Deploy => &self.deploy_project,
        }
    }
}

/// An ordered list of stage templates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineTemplate {
    stages: Vec<StageTemplate>,
}

impl PipelineTemplate {
    /// Creates a template.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the template is empty, two stages
    /// share a name (compared by their node-id form), a name has no letters
    /// or digits, or the actions are not ordered Source, then Build, then
    /// Deploy.
    pub fn new(stages: Vec<StageTemplate>) -> Result<Self, InfraflowError> {
        if stages.is_empty() {
            return Err(ValidationError::new("Pipeline template has no stages").into());
        }
        let mut seen: HashMap<String, &str> = HashMap::with_capacity(stages.len());
        for stage in &stages {
            let slug = stage_slug(&stage.name);
            if slug.is_empty() {
                return Err(ValidationError::new(format!(
                    "Stage name '{}' has no letters or digits",
                    stage.name
                ))
                .into());
            }
            if let Some(first) = seen.insert(slug, &stage.name) {
                return Err(ValidationError::new(format!(
                    "Stage '{}' clashes with stage '{first}'",
                    stage.name
                ))
                .with_error_info(
                    ContractErrorInfo::new("PIPELINE-004-DUPLICATE_STAGE", "Stage names are not unique")
                        .with_context_entry("stage", stage.name.as_str())
                        .with_fix_hint("Give every stage a distinct name."),
                )
                .into());
            }
        }
        if let Some(pair) = stages.windows(2).find(|w| w[0].action > w[1].action) {
            return Err(ValidationError::new(format!(
                "Stage '{}' ({}) cannot follow stage '{}' ({})",
                pair[1].name, pair[1].action, pair[0].name, pair[0].action
            ))
            .with_error_info(
                ContractErrorInfo::new("PIPELINE-003-STAGE_ORDER", "Stages are out of order")
                    .with_fix_hint("Order stages Source, then Build, then Deploy."),
            )
            .into());
        }
        Ok(Self { stages })
    }

    /// The Source → Build → Deploy template shared by every service.
    #[must_use]
    pub fn delivery() -> Self {
        Self {
            stages: vec![
                StageTemplate::new("Source", StageAction::Source, &[], &["SourceOutput"]),
                StageTemplate::new("Build", StageAction::Build, &["SourceOutput"], &["BuildOutput"]),
                StageTemplate::new("Deploy", StageAction::Deploy, &["BuildOutput"], &[]),
            ],
        }
    }

    /// Stage templates in order.
    #[must_use]
    pub fn stages(&self) -> &[StageTemplate] {
        &self.stages
    }

    /// Binds the template to concrete resources and validates the artifact flow.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactMismatchError`] if the artifact flow is malformed.
    pub fn instantiate(&self, params: &PipelineParams) -> Result<Pipeline, ArtifactMismatchError> {
        let stages: Vec<PipelineStage> = self
            .stages
            .iter()
            .map(|t| PipelineStage {
                name: t.name.clone(),
                action: t.action,
                input_artifacts: t.input_artifacts.clone(),
                output_artifacts: t.output_artifacts.clone(),
                project_ref: params.project_for(t.action).to_string(),
            })
            .collect();

        validate(&stages)?;

        Ok(Pipeline::new(
            params.id.clone(),
            params.name.clone(),
            stages,
            params.artifact_store.clone(),
            params.role.clone(),
            params.branch.clone(),
        ))
    }
}
