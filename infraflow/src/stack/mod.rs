//! Composition of the delivery environment.
//!
//! A [`Stack`] declares every resource of one environment:
//! - shared storage, registries, repositories and the build role
//! - the managed cluster
//! - build projects, the pipeline role and one pipeline per service
//!
//! [`Stack::up`] loads the previous state, converges the graph and persists
//! whatever was converged, including after a failure.

mod cluster;
mod core_resources;
mod outputs;
mod pipelines;

pub use cluster::{cluster, CLUSTER};
pub use core_resources::{core_resources, Service, ARTIFACTS_BUCKET, CODEBUILD_POLICIES, CODEBUILD_ROLE, SERVICES};
pub use outputs::StackOutputs;
pub use pipelines::{pipelines, service_pipeline, DEPLOY_BUILD, PIPELINE_POLICY, PIPELINE_ROLE};

use tracing::{info, warn};

use crate::config::{StackConfig, StackSettings};
use crate::core::ResourceNode;
use crate::errors::InfraflowError;
use crate::graph::{build, ResourceGraph};
use crate::observability::SpanTimer;
use crate::provision::{ApplyReport, Provisioner};
use crate::state::StateStore;

/// Result of bringing a stack up.
#[derive(Debug, Clone)]
pub struct Deployment {
    /// The provisioning report.
    pub report: ApplyReport,
    /// Exported stack outputs.
    pub outputs: StackOutputs,
}

/// One environment of the delivery stack.
#[derive(Debug, Clone, Default)]
pub struct Stack {
    config: StackConfig,
    settings: StackSettings,
}

impl Stack {
    /// Creates a stack.
    #[must_use]
    pub fn new(config: StackConfig, settings: StackSettings) -> Self {
        Self { config, settings }
    }

    /// The stack identity.
    #[must_use]
    pub fn config(&self) -> &StackConfig {
        &self.config
    }

    /// The stack sizing and naming knobs.
    #[must_use]
    pub fn settings(&self) -> &StackSettings {
        &self.settings
    }

    /// Declares every resource node of the stack.
    ///
    /// # Errors
    ///
    /// Returns a validation error for invalid config or settings, or an
    /// artifact mismatch if a pipeline is malformed.
    pub fn declare(&self) -> Result<Vec<ResourceNode>, InfraflowError> {
        self.config.validate()?;
        self.settings.validate()?;

        let mut nodes = core_resources(&self.config);
        nodes.push(cluster(&self.config, &self.settings));
        nodes.extend(pipelines(&self.config, &self.settings)?);
        Ok(nodes)
    }

    /// Declares the stack and builds its graph.
    ///
    /// # Errors
    ///
    /// Returns any declaration or graph construction error.
    pub fn graph(&self) -> Result<ResourceGraph, InfraflowError> {
        build(self.declare()?)
    }

    /// Converges the stack, persisting state under the stack identifier.
    ///
    /// # Errors
    ///
    /// Returns structural errors before any provider call. A provisioning
    /// failure or cancellation is returned after the converged state has
    /// been saved.
    pub async fn up(
        &self,
        provisioner: &Provisioner,
        store: &dyn StateStore,
    ) -> Result<Deployment, InfraflowError> {
        let timer = SpanTimer::start("stack.up");
        let graph = self.graph()?;
        let stack = self.config.stack.as_str();
        let existing = store.load(stack).await?;

        info!(stack = %stack, region = %self.config.region, nodes = graph.len(), "Bringing stack up");

        let report = match provisioner.apply(&graph, existing).await {
            Ok(report) => report,
            Err(InfraflowError::Provision(err)) => {
                warn!(stack = %stack, node = %err.id, error = %err.cause, "Stack provisioning failed");
                store.save(stack, &err.state).await?;
                return Err(InfraflowError::Provision(err));
            }
            Err(other) => return Err(other),
        };

        store.save(stack, &report.state).await?;

        if report.cancelled {
            return Err(InfraflowError::Cancelled(format!(
                "stack '{stack}' stopped after {} of {} nodes",
                report.state.len(),
                graph.len()
            )));
        }

        let outputs = StackOutputs::from_state(&report.state)?;
        info!(
            stack = %stack,
            created = report.created.len(),
            updated = report.updated.len(),
            unchanged = report.unchanged.len(),
            duration_ms = timer.elapsed_ms(),
            "Stack is up"
        );
        Ok(Deployment { report, outputs })
    }
}
