//! Pipeline and stage values.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::core::{reference, ResourceKind, ResourceNode, StageAction};

/// One stage of a delivery pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineStage {
    /// Stage name.
    pub name: String,
    /// What the stage does.
    pub action: StageAction,
    /// Artifacts consumed, in declaration order.
    pub input_artifacts: Vec<String>,
    /// Artifacts produced, in declaration order.
    pub output_artifacts: Vec<String>,
    /// Node id of the resource the stage acts on (source repo or build project).
    pub project_ref: String,
}

impl PipelineStage {
    /// Creates a stage with no artifacts.
    #[must_use]
    pub fn new(name: impl Into<String>, action: StageAction, project_ref: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            action,
            input_artifacts: Vec::new(),
            output_artifacts: Vec::new(),
            project_ref: project_ref.into(),
        }
    }

    /// Adds an input artifact.
    #[must_use]
    pub fn with_input(mut self, artifact: impl Into<String>) -> Self {
        self.input_artifacts.push(artifact.into());
        self
    }

    /// Adds an output artifact.
    #[must_use]
    pub fn with_output(mut self, artifact: impl Into<String>) -> Self {
        self.output_artifacts.push(artifact.into());
        self
    }

    /// Action configuration handed to the pipeline service.
    fn configuration(&self, branch: &str) -> Value {
        match self.action {
            StageAction::Source => json!({
                "RepositoryName": reference(&self.project_ref, "repository_name"),
                "BranchName": branch,
            }),
            StageAction::Build | StageAction::Deploy => json!({
                "ProjectName": reference(&self.project_ref, "project_name"),
            }),
        }
    }
}

/// Lowercase, dash-separated form of a stage name used in node ids.
///
/// Runs of characters outside `[a-z0-9]` collapse into a single dash.
pub(super) fn stage_slug(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_alphanumeric() {
            slug.push(c);
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

/// A validated delivery pipeline.
///
/// Built by [`super::PipelineTemplate::instantiate`]; there are no setters,
/// so every change goes through a new instantiation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pipeline {
    id: String,
    name: String,
    stages: Vec<PipelineStage>,
    artifact_store: String,
    role_ref: String,
    branch: String,
}

impl Pipeline {
    pub(super) fn new(
        id: String,
        name: String,
        stages: Vec<PipelineStage>,
        artifact_store: String,
        role_ref: String,
        branch: String,
    ) -> Self {
        Self {
            id,
            name,
            stages,
            artifact_store,
            role_ref,
            branch,
        }
    }

    /// Node id of the pipeline resource.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Resource name of the pipeline.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stages in execution order.
    #[must_use]
    pub fn stages(&self) -> &[PipelineStage] {
        &self.stages
    }

    /// Returns a stage by name.
    #[must_use]
    pub fn stage(&self, name: &str) -> Option<&PipelineStage> {
        self.stages.iter().find(|s| s.name == name)
    }

    /// Node id of the artifact bucket.
    #[must_use]
    pub fn artifact_store(&self) -> &str {
        &self.artifact_store
    }

    /// Node id of the role the pipeline runs as.
    #[must_use]
    pub fn role_ref(&self) -> &str {
        &self.role_ref
    }

    /// Branch the source stage tracks.
    #[must_use]
    pub fn branch(&self) -> &str {
        &self.branch
    }

    /// Node id of the stage resource for `stage`, derived from its name.
    #[must_use]
    pub fn stage_node_id(&self, stage: &PipelineStage) -> String {
        format!("{}-{}", self.id, stage_slug(&stage.name))
    }

    /// Expands the pipeline into resource nodes: one per stage, then the
    /// pipeline resource depending on all of them.
    ///
    /// Stage nodes resolve their project references at provisioning time;
    /// the pipeline node resolves the role, bucket and stage declarations.
    #[must_use]
    pub fn to_nodes(&self) -> Vec<ResourceNode> {
        let mut nodes: Vec<ResourceNode> = self
            .stages
            .iter()
            .map(|stage| {
                ResourceNode::new(self.stage_node_id(stage), ResourceKind::PipelineStage)
                    .with_dependency(&stage.project_ref)
                    .with_config("name", stage.name.as_str())
                    .with_config("action", json!(stage.action))
                    .with_config("input_artifacts", json!(stage.input_artifacts))
                    .with_config("output_artifacts", json!(stage.output_artifacts))
                    .with_config("configuration", stage.configuration(&self.branch))
            })
            .collect();

        let stage_ids: Vec<String> = nodes.iter().map(|n| n.id.clone()).collect();
        let declarations: Vec<Value> = stage_ids
            .iter()
            .map(|id| reference(id, "declaration"))
            .collect();

        nodes.push(
            ResourceNode::new(&self.id, ResourceKind::Pipeline)
                .with_dependencies([self.role_ref.as_str(), self.artifact_store.as_str()])
                .with_dependencies(stage_ids)
                .with_config("name", self.name.as_str())
                .with_config("role_arn", reference(&self.role_ref, "role_identity"))
                .with_config("artifact_store", reference(&self.artifact_store, "address"))
                .with_config("stages", Value::Array(declarations)),
        );
        nodes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::collect_references;

    fn sample() -> Pipeline {
        Pipeline::new(
            "java-pipeline".into(),
            "java-pipeline-dev".into(),
            vec![
                PipelineStage::new("Source", StageAction::Source, "java-repo").with_output("SourceOutput"),
                PipelineStage::new("Build", StageAction::Build, "java-build")
                    .with_input("SourceOutput")
                    .with_output("BuildOutput"),
            ],
            "artifacts".into(),
            "pipeline-role".into(),
            "main".into(),
        )
    }

    #[test]
    fn test_stage_lookup() {
        let pipeline = sample();
        assert_eq!(pipeline.stage("Build").map(|s| s.action), Some(StageAction::Build));
        assert!(pipeline.stage("Deploy").is_none());
        assert_eq!(pipeline.stage_node_id(&pipeline.stages()[0]), "java-pipeline-source");
    }

    #[test]
    fn test_stage_slug() {
        assert_eq!(stage_slug("Source"), "source");
        assert_eq!(stage_slug("Integration Test"), "integration-test");
        assert_eq!(stage_slug("  Deploy (prod)!"), "deploy-prod");
        assert_eq!(stage_slug("???"), "");
    }

    #[test]
    fn test_stages_sharing_an_action_get_distinct_node_ids() {
        let pipeline = Pipeline::new(
            "java-pipeline".into(),
            "java-pipeline-dev".into(),
            vec![
                PipelineStage::new("Source", StageAction::Source, "java-repo").with_output("SourceOutput"),
                PipelineStage::new("Build", StageAction::Build, "java-build").with_input("SourceOutput"),
                PipelineStage::new("Unit Test", StageAction::Build, "java-test").with_input("SourceOutput"),
            ],
            "artifacts".into(),
            "pipeline-role".into(),
            "main".into(),
        );
        let ids: Vec<String> = pipeline.to_nodes().into_iter().map(|n| n.id).collect();
        assert_eq!(
            ids,
            vec![
                "java-pipeline-source",
                "java-pipeline-build",
                "java-pipeline-unit-test",
                "java-pipeline",
            ]
        );
        let targets = ["java-repo", "java-build", "java-test", "artifacts"]
            .map(|id| ResourceNode::new(id, ResourceKind::Bucket))
            .into_iter()
            .chain([ResourceNode::new("pipeline-role", ResourceKind::Role)]);
        assert!(crate::graph::build(targets.chain(pipeline.to_nodes())).is_ok());
    }

    #[test]
    fn test_to_nodes_wires_references() {
        let nodes = sample().to_nodes();
        assert_eq!(nodes.len(), 3);

        let source = &nodes[0];
        assert_eq!(source.kind, ResourceKind::PipelineStage);
        assert!(source.depends_on.contains("java-repo"));
        assert_eq!(collect_references(&source.config), vec!["java-repo.repository_name"]);

        let pipeline = &nodes[2];
        assert_eq!(pipeline.kind, ResourceKind::Pipeline);
        for dep in ["pipeline-role", "artifacts", "java-pipeline-source", "java-pipeline-build"] {
            assert!(pipeline.depends_on.contains(dep), "missing dependency {dep}");
        }
        assert_eq!(
            collect_references(&pipeline.config),
            vec![
                "artifacts.address",
                "pipeline-role.role_identity",
                "java-pipeline-source.declaration",
                "java-pipeline-build.declaration",
            ]
        );
    }
}
