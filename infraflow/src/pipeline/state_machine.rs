//! Stage progression within one pipeline run.
//!
//! Stages move `Pending → Running → {Succeeded, Failed}`. A stage may start
//! only when every stage before it has succeeded; a failed stage blocks the
//! rest of the run for good.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use super::{Pipeline, PipelineStage};
use crate::core::{RunOutcome, StageStatus};
use crate::errors::{InfraflowError, InvalidTransitionError, ValidationError};
use crate::events::{self, EventSink};

/// Returns the earliest pending stage whose predecessors all succeeded.
///
/// Stages without an entry in `statuses` count as pending. Returns `None`
/// when every stage succeeded or when a stage is running or failed.
#[must_use]
pub fn next_actionable<'a>(
    stages: &'a [PipelineStage],
    statuses: &HashMap<String, StageStatus>,
) -> Option<&'a PipelineStage> {
    for stage in stages {
        match statuses.get(&stage.name).copied().unwrap_or_default() {
            StageStatus::Succeeded => continue,
            StageStatus::Pending => return Some(stage),
            StageStatus::Running | StageStatus::Failed => return None,
        }
    }
    None
}

/// Tracks stage statuses for one run of a pipeline.
#[derive(Debug, Clone)]
pub struct PipelineRun {
    pipeline: String,
    stages: Vec<PipelineStage>,
    statuses: HashMap<String, StageStatus>,
}

impl PipelineRun {
    /// Starts tracking a run with every stage pending.
    #[must_use]
    pub fn new(pipeline: &Pipeline) -> Self {
        Self {
            pipeline: pipeline.name().to_string(),
            stages: pipeline.stages().to_vec(),
            statuses: HashMap::new(),
        }
    }

    /// Name of the pipeline being run.
    #[must_use]
    pub fn pipeline(&self) -> &str {
        &self.pipeline
    }

    /// Status of `stage`; unknown or untouched stages are pending.
    #[must_use]
    pub fn status(&self, stage: &str) -> StageStatus {
        self.statuses.get(stage).copied().unwrap_or_default()
    }

    /// The stage that may start next.
    #[must_use]
    pub fn next_actionable(&self) -> Option<&PipelineStage> {
        next_actionable(&self.stages, &self.statuses)
    }

    /// Moves `stage` to running.
    ///
    /// # Errors
    ///
    /// Returns [`InfraflowError::InvalidTransition`] if the stage is not
    /// pending or a predecessor has not succeeded.
    pub fn start(&mut self, stage: &str) -> Result<(), InfraflowError> {
        self.ensure_known(stage)?;
        let actionable = self.next_actionable().is_some_and(|s| s.name == stage);
        if !actionable {
            return Err(self.invalid(stage, StageStatus::Running));
        }
        self.transition(stage, StageStatus::Running)
    }

    /// Starts the next actionable stage, returning its name.
    pub fn start_next(&mut self) -> Option<String> {
        let name = self.next_actionable()?.name.clone();
        self.statuses.insert(name.clone(), StageStatus::Running);
        Some(name)
    }

    /// Moves a running `stage` to succeeded.
    ///
    /// # Errors
    ///
    /// Returns [`InfraflowError::InvalidTransition`] if the stage is not running.
    pub fn succeed(&mut self, stage: &str) -> Result<(), InfraflowError> {
        self.ensure_known(stage)?;
        self.transition(stage, StageStatus::Succeeded)
    }

    /// Moves a running `stage` to failed.
    ///
    /// # Errors
    ///
    /// Returns [`InfraflowError::InvalidTransition`] if the stage is not running.
    pub fn fail(&mut self, stage: &str) -> Result<(), InfraflowError> {
        self.ensure_known(stage)?;
        self.transition(stage, StageStatus::Failed)
    }

    /// Overall outcome of the run.
    #[must_use]
    pub fn outcome(&self) -> RunOutcome {
        if let Some(failed) = self
            .stages
            .iter()
            .find(|s| self.status(&s.name) == StageStatus::Failed)
        {
            return RunOutcome::Failed {
                stage: failed.name.clone(),
            };
        }
        if self
            .stages
            .iter()
            .all(|s| self.status(&s.name) == StageStatus::Succeeded)
        {
            RunOutcome::Succeeded
        } else {
            RunOutcome::InProgress
        }
    }

    /// Returns true once the run succeeded or failed.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.outcome() != RunOutcome::InProgress
    }

    fn ensure_known(&self, stage: &str) -> Result<(), InfraflowError> {
        if self.stages.iter().any(|s| s.name == stage) {
            Ok(())
        } else {
            Err(ValidationError::new(format!(
                "Pipeline '{}' has no stage '{stage}'",
                self.pipeline
            ))
            .into())
        }
    }

    fn transition(&mut self, stage: &str, to: StageStatus) -> Result<(), InfraflowError> {
        let from = self.status(stage);
        if !from.can_transition_to(to) {
            return Err(self.invalid(stage, to));
        }
        self.statuses.insert(stage.to_string(), to);
        Ok(())
    }

    fn invalid(&self, stage: &str, to: StageStatus) -> InfraflowError {
        InvalidTransitionError {
            stage: stage.to_string(),
            from: self.status(stage),
            to,
        }
        .into()
    }
}

/// Executes the work of a single stage.
#[async_trait]
pub trait StageRunner: Send + Sync {
    /// Runs `stage`, returning a failure message on error.
    async fn run_stage(&self, stage: &PipelineStage) -> Result<(), String>;
}

/// Drives `run` until it succeeds or a stage fails.
pub async fn run_to_completion(
    run: &mut PipelineRun,
    runner: &dyn StageRunner,
    sink: Arc<dyn EventSink>,
) -> RunOutcome {
    while let Some(name) = run.start_next() {
        let Some(stage) = run.stages.iter().find(|s| s.name == name).cloned() else {
            break;
        };

        sink.try_emit(
            events::STAGE_STARTED,
            Some(serde_json::json!({ "pipeline": run.pipeline(), "stage": &name })),
        );

        let (status, result) = match runner.run_stage(&stage).await {
            Ok(()) => (StageStatus::Succeeded, None),
            Err(message) => (StageStatus::Failed, Some(message)),
        };
        run.statuses.insert(name.clone(), status);

        match result {
            None => {
                info!(pipeline = %run.pipeline(), stage = %name, "Stage succeeded");
                sink.try_emit(
                    events::STAGE_COMPLETED,
                    Some(serde_json::json!({ "pipeline": run.pipeline(), "stage": &name })),
                );
            }
            Some(message) => {
                warn!(pipeline = %run.pipeline(), stage = %name, error = %message, "Stage failed");
                sink.try_emit(
                    events::STAGE_FAILED,
                    Some(serde_json::json!({
                        "pipeline": run.pipeline(),
                        "stage": &name,
                        "error": message,
                    })),
                );
            }
        }
    }

    run.outcome()
}
