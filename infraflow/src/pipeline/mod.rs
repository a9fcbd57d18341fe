//! Delivery pipeline modelling.
//!
//! This module provides:
//! - Pipeline and stage values
//! - The parametrized Source → Build → Deploy template
//! - Artifact flow validation
//! - The per-run stage state machine

mod artifacts;
mod stage;
mod state_machine;
mod template;

pub use artifacts::{validate, ArtifactFlow};
pub use stage::{Pipeline, PipelineStage};
pub use state_machine::{next_actionable, run_to_completion, PipelineRun, StageRunner};
pub use template::{PipelineParams, PipelineTemplate, StageTemplate};
