//! Values exported once the stack has converged.

use serde::{Deserialize, Serialize};

use super::cluster::CLUSTER;
use super::core_resources::SERVICES;
use crate::core::StateMap;
use crate::errors::InfraflowError;

/// Outputs of a converged stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackOutputs {
    /// HTTPS clone URL of the Java service repository.
    pub java_repo_clone_url_http: String,
    /// HTTPS clone URL of the Go service repository.
    pub go_repo_clone_url_http: String,
    /// URL of the Java service image registry.
    pub java_ecr_repo_url: String,
    /// URL of the Go service image registry.
    pub go_ecr_repo_url: String,
    /// Name of the cluster.
    pub eks_cluster_name: String,
}

impl StackOutputs {
    /// Reads the outputs from converged state.
    ///
    /// # Errors
    ///
    /// Returns [`InfraflowError::Internal`] if a handle or attribute is missing.
    pub fn from_state(state: &StateMap) -> Result<Self, InfraflowError> {
        let [java, go] = SERVICES;
        Ok(Self {
            java_repo_clone_url_http: output(state, &java.repo_id(), "clone_url")?,
            go_repo_clone_url_http: output(state, &go.repo_id(), "clone_url")?,
            java_ecr_repo_url: output(state, &java.registry_id(), "url")?,
            go_ecr_repo_url: output(state, &go.registry_id(), "url")?,
            eks_cluster_name: output(state, CLUSTER, "cluster_name")?,
        })
    }
}

fn output(state: &StateMap, id: &str, attribute: &str) -> Result<String, InfraflowError> {
    state
        .get(id)
        .and_then(|handle| handle.attribute_str(attribute))
        .map(ToString::to_string)
        .ok_or_else(|| InfraflowError::Internal(format!("Stack output '{id}.{attribute}' is not available")))
}
