//! External provider interfaces.
//!
//! This module provides:
//! - One async trait per cloud collaborator
//! - [`ResourceProvider`], the single seam the provisioning engine calls
//! - [`CloudProviders`], which dispatches a node to the right collaborator

mod dispatch;
mod services;

pub use dispatch::{CloudProviders, ResourceProvider};
pub use services::{
    BucketInfo, BuildCompute, BuildProjectSpec, ClusterInfo, ClusterService, ClusterSpec,
    ContainerRegistry, IdentityProvider, ObjectStorage, PipelineInfo, PipelineService,
    ProjectInfo, RegistryInfo, RoleInfo, SourceControl, SourceRepoInfo, StageDeclaration,
};
