//! Core domain model types for infraflow.
//!
//! This module contains the fundamental types used throughout the framework:
//! - Resource nodes and their kinds
//! - Live handles produced by provisioning
//! - Attribute references between nodes
//! - Pipeline stage actions and statuses

mod handle;
mod reference;
mod resource;
mod status;

pub use handle::{Attributes, LiveHandle, StateMap};
pub use reference::{collect_references, reference, resolve_config, Reference, REF_KEY};
pub use resource::{is_valid_node_id, NodeConfig, ResourceKind, ResourceNode};
pub use status::{RunOutcome, StageAction, StageStatus};
