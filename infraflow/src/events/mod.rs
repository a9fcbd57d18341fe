//! Event sink system for observability.
//!
//! The provisioning engine and pipeline runs report progress through an
//! [`EventSink`]. Event types are dotted names; payloads are JSON objects.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink, RecordedEvent};

/// A node was scheduled for convergence.
pub const RESOURCE_STARTED: &str = "resource.started";
/// A node was created for the first time.
pub const RESOURCE_CREATED: &str = "resource.created";
/// A node's configuration changed and it was updated.
pub const RESOURCE_UPDATED: &str = "resource.updated";
/// A node already matched its declared configuration.
pub const RESOURCE_UNCHANGED: &str = "resource.unchanged";
/// A node failed to converge.
pub const RESOURCE_FAILED: &str = "resource.failed";
/// A provisioning run converged every node.
pub const RUN_COMPLETED: &str = "run.completed";
/// A provisioning run stopped on cancellation.
pub const RUN_CANCELLED: &str = "run.cancelled";
/// A pipeline stage started running.
pub const STAGE_STARTED: &str = "stage.started";
/// A pipeline stage succeeded.
pub const STAGE_COMPLETED: &str = "stage.completed";
/// A pipeline stage failed.
pub const STAGE_FAILED: &str = "stage.failed";
