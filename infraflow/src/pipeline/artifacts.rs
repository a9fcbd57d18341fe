//! Artifact flow validation.

use std::collections::HashSet;

use super::PipelineStage;
use crate::errors::ArtifactMismatchError;
use crate::provider::StageDeclaration;

/// A stage that consumes and produces named artifacts.
pub trait ArtifactFlow {
    /// Stage name used in error reports.
    fn stage_name(&self) -> &str;
    /// Consumed artifacts, in declaration order.
    fn inputs(&self) -> &[String];
    /// Produced artifacts, in declaration order.
    fn outputs(&self) -> &[String];
}

impl ArtifactFlow for PipelineStage {
    fn stage_name(&self) -> &str {
        &self.name
    }

    fn inputs(&self) -> &[String] {
        &self.input_artifacts
    }

    fn outputs(&self) -> &[String] {
        &self.output_artifacts
    }
}

impl ArtifactFlow for StageDeclaration {
    fn stage_name(&self) -> &str {
        &self.name
    }

    fn inputs(&self) -> &[String] {
        &self.input_artifacts
    }

    fn outputs(&self) -> &[String] {
        &self.output_artifacts
    }
}

/// Checks that every input is produced by a strictly earlier stage and that
/// no artifact has two producers.
///
/// The first mismatch in stage order, then declaration order, is reported.
/// Since nothing precedes the first stage, any input it declares is missing.
///
/// # Errors
///
/// Returns [`ArtifactMismatchError`] naming the stage and artifact.
pub fn validate<T: ArtifactFlow>(stages: &[T]) -> Result<(), ArtifactMismatchError> {
    let mut produced: HashSet<&str> = HashSet::new();

    for stage in stages {
        if let Some(missing) = stage.inputs().iter().find(|a| !produced.contains(a.as_str())) {
            return Err(ArtifactMismatchError::missing(stage.stage_name(), missing.as_str()));
        }
        for artifact in stage.outputs() {
            if !produced.insert(artifact.as_str()) {
                return Err(ArtifactMismatchError::duplicate(stage.stage_name(), artifact.as_str()));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::StageAction;
    use crate::errors::MismatchReason;

    fn delivery() -> Vec<PipelineStage> {
        vec![
            PipelineStage::new("Source", StageAction::Source, "repo").with_output("SourceOutput"),
            PipelineStage::new("Build", StageAction::Build, "build")
                .with_input("SourceOutput")
                .with_output("BuildOutput"),
            PipelineStage::new("Deploy", StageAction::Deploy, "deploy").with_input("BuildOutput"),
        ]
    }

    #[test]
    fn test_delivery_flow_is_valid() {
        assert!(validate(&delivery()).is_ok());
    }

    #[test]
    fn test_missing_input_names_stage_and_artifact() {
        let mut stages = delivery();
        stages[2] = PipelineStage::new("Deploy", StageAction::Deploy, "deploy").with_input("X");

        let err = validate(&stages).unwrap_err();
        assert_eq!(err.stage_name, "Deploy");
        assert_eq!(err.missing_artifact, "X");
        assert_eq!(err.reason, MismatchReason::Missing);
        assert_eq!(err.error_info.code, "PIPELINE-001-ARTIFACT_MISSING");
    }

    #[test]
    fn test_input_from_later_stage_is_missing() {
        let stages = vec![
            PipelineStage::new("Source", StageAction::Source, "repo").with_output("SourceOutput"),
            PipelineStage::new("Build", StageAction::Build, "build").with_input("BuildOutput"),
            PipelineStage::new("Deploy", StageAction::Deploy, "deploy").with_output("BuildOutput"),
        ];
        let err = validate(&stages).unwrap_err();
        assert_eq!(err.stage_name, "Build");
        assert_eq!(err.missing_artifact, "BuildOutput");
    }

    #[test]
    fn test_first_stage_cannot_have_inputs() {
        let stages = vec![PipelineStage::new("Source", StageAction::Source, "repo").with_input("Seed")];
        let err = validate(&stages).unwrap_err();
        assert_eq!(err.stage_name, "Source");
        assert_eq!(err.missing_artifact, "Seed");
    }

    #[test]
    fn test_duplicate_producer() {
        let mut stages = delivery();
        stages[1] = stages[1].clone().with_output("SourceOutput");

        let err = validate(&stages).unwrap_err();
        assert_eq!(err.stage_name, "Build");
        assert_eq!(err.missing_artifact, "SourceOutput");
        assert_eq!(err.reason, MismatchReason::DuplicateProducer);
    }

    #[test]
    fn test_first_mismatch_in_declaration_order() {
        let stages = vec![
            PipelineStage::new("Source", StageAction::Source, "repo").with_output("A"),
            PipelineStage::new("Build", StageAction::Build, "build")
                .with_input("A")
                .with_input("Y")
                .with_input("Z"),
        ];
        assert_eq!(validate(&stages).unwrap_err().missing_artifact, "Y");
    }

    #[test]
    fn test_declarations_validate_too() {
        let declarations: Vec<StageDeclaration> = serde_json::from_value(serde_json::json!([
            {"name": "Source", "action": "source", "output_artifacts": ["SourceOutput"]},
            {"name": "Build", "action": "build", "input_artifacts": ["SourceOutput"]},
        ]))
        .unwrap();
        assert!(validate(&declarations).is_ok());
    }

    #[test]
    fn test_empty_pipeline_is_valid() {
        assert!(validate::<PipelineStage>(&[]).is_ok());
    }
}
