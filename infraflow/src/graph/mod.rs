//! Resource dependency graph.
//!
//! This module provides:
//! - A builder that validates declared nodes and references
//! - A deterministic topological ordering of the resulting DAG

mod builder;
mod dag;

pub use builder::{build, GraphBuilder};
pub use dag::ResourceGraph;
