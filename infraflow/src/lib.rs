//! # Infraflow
//!
//! Declarative provisioning of a cloud delivery environment.
//!
//! Infraflow models infrastructure as a graph of resource nodes and
//! converges it through pluggable providers:
//!
//! - **Resource graph**: typed nodes, explicit dependencies, `$ref` wiring
//!   between node attributes and a deterministic topological order
//! - **Provisioning engine**: idempotent, resumable, bounded-concurrency
//!   convergence with cooperative cancellation
//! - **Delivery pipelines**: a Source/Build/Deploy template with artifact
//!   flow validation and a per-stage state machine
//! - **Event-driven observability**: every node and stage transition is
//!   emitted to an event sink
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use infraflow::prelude::*;
//! use std::sync::Arc;
//!
//! let cloud = Arc::new(FakeCloud::new());
//! let provisioner = Provisioner::new(Arc::new(cloud.providers()))
//!     .with_config(EngineConfig::new().with_max_concurrency(4));
//!
//! let stack = Stack::new(StackConfig::from_env(), StackSettings::default());
//! let deployment = stack.up(&provisioner, &InMemoryStateStore::new()).await?;
//! println!("{}", deployment.outputs.eks_cluster_name);
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod config;
pub mod core;
pub mod errors;
pub mod events;
pub mod graph;
pub mod observability;
pub mod pipeline;
pub mod provider;
pub mod provision;
pub mod stack;
pub mod state;
pub mod testing;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancellationToken;
    pub use crate::config::{EngineConfig, StackConfig, StackSettings};
    pub use crate::core::{
        reference, LiveHandle, ResourceKind, ResourceNode, RunOutcome, StageAction, StageStatus,
        StateMap,
    };
    pub use crate::errors::{
        ArtifactMismatchError, ContractErrorInfo, CycleError, DanglingReferenceError,
        InfraflowError, ProviderError, ProvisionError,
    };
    pub use crate::events::{EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::graph::{build, GraphBuilder, ResourceGraph};
    pub use crate::pipeline::{
        next_actionable, validate, Pipeline, PipelineRun, PipelineStage, PipelineTemplate,
    };
    pub use crate::provider::{CloudProviders, ResourceProvider};
    pub use crate::provision::{apply_with_retry, ApplyReport, Provisioner, RetryConfig};
    pub use crate::stack::{Deployment, Stack, StackOutputs};
    pub use crate::state::{FileStateStore, InMemoryStateStore, StateStore};
    pub use crate::testing::FakeCloud;
    pub use crate::utils::{generate_run_id, iso_timestamp, Timestamp};
}
