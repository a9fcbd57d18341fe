//! Error types for the infraflow framework.
//!
//! Structural errors (graph construction, artifact flow) are raised before any
//! provider call is made and are never worth retrying. [`ProvisionError`] is the
//! only kind that wraps an external failure and may be retried by the caller.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use crate::core::{StageStatus, StateMap};

/// The main error type for infraflow operations.
#[derive(Debug, Error)]
pub enum InfraflowError {
    /// A node or configuration failed validation.
    #[error("{0}")]
    Validation(#[from] ValidationError),

    /// A dependency referenced a node that was never declared.
    #[error("{0}")]
    DanglingReference(#[from] DanglingReferenceError),

    /// A cycle was detected in the resource graph.
    #[error("{0}")]
    Cycle(#[from] CycleError),

    /// A pipeline's artifact flow is malformed.
    #[error("{0}")]
    ArtifactMismatch(#[from] ArtifactMismatchError),

    /// Converging a node against its provider failed.
    #[error("{0}")]
    Provision(#[from] ProvisionError),

    /// A pipeline stage was moved through an illegal state transition.
    #[error("{0}")]
    InvalidTransition(#[from] InvalidTransitionError),

    /// The run was cancelled.
    #[error("Provisioning cancelled: {0}")]
    Cancelled(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl InfraflowError {
    /// Returns true if re-invoking the failed operation may succeed.
    ///
    /// Only provisioning failures qualify; a malformed declaration fails the
    /// same way every time.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Provision(_))
    }

    /// Returns the diagnostic metadata attached to structural errors.
    #[must_use]
    pub fn error_info(&self) -> Option<&ContractErrorInfo> {
        match self {
            Self::Validation(e) => e.error_info.as_ref(),
            Self::DanglingReference(e) => Some(&e.error_info),
            Self::Cycle(e) => Some(&e.error_info),
            Self::ArtifactMismatch(e) => Some(&e.error_info),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for InfraflowError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Metadata about a structural error for better diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ContractErrorInfo {
    /// Error code (e.g., "GRAPH-001-CYCLE").
    pub code: String,
    /// Short summary of the error.
    pub summary: String,
    /// Hint for fixing the error.
    pub fix_hint: Option<String>,
    /// Additional context key-value pairs.
    #[serde(default)]
    pub context: HashMap<String, String>,
}

impl ContractErrorInfo {
    /// Creates a new contract error info.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
            context: HashMap::new(),
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    /// Adds a single context entry.
    #[must_use]
    pub fn with_context_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("code".to_string(), serde_json::json!(self.code));
        map.insert("summary".to_string(), serde_json::json!(self.summary));

        if let Some(ref hint) = self.fix_hint {
            map.insert("fix_hint".to_string(), serde_json::json!(hint));
        }
        if !self.context.is_empty() {
            map.insert("context".to_string(), serde_json::json!(self.context));
        }

        map
    }
}

/// Error raised when a node or its configuration is invalid.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ValidationError {
    /// The error message.
    pub message: String,
    /// The node ids involved in the error.
    pub nodes: Vec<String>,
    /// Optional contract error info.
    pub error_info: Option<ContractErrorInfo>,
}

impl ValidationError {
    /// Creates a new validation error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            nodes: Vec::new(),
            error_info: None,
        }
    }

    /// Sets the nodes involved.
    #[must_use]
    pub fn with_nodes(mut self, nodes: Vec<String>) -> Self {
        self.nodes = nodes;
        self
    }

    /// Sets the contract error info.
    #[must_use]
    pub fn with_error_info(mut self, info: ContractErrorInfo) -> Self {
        self.error_info = Some(info);
        self
    }
}

/// Error raised when a cycle is detected in the resource graph.
#[derive(Debug, Clone, Error)]
#[error("Cycle detected in resource graph: {}", cycle_path.join(" -> "))]
pub struct CycleError {
    /// The path of node ids forming the cycle; first and last entries match.
    pub cycle_path: Vec<String>,
    /// Contract error info.
    pub error_info: ContractErrorInfo,
}

impl CycleError {
    /// Creates a new cycle error.
    #[must_use]
    pub fn new(cycle_path: Vec<String>) -> Self {
        let info = ContractErrorInfo::new(
            "GRAPH-001-CYCLE",
            format!("Resource graph contains a dependency cycle: {}", cycle_path.join(" -> ")),
        )
        .with_fix_hint("Remove one of the dependencies in the cycle to break it.");

        Self {
            cycle_path,
            error_info: info,
        }
    }
}

/// Error raised when a node depends on an id that was never declared.
#[derive(Debug, Clone, Error)]
#[error("Node '{referencing_id}' depends on unknown node '{missing_id}'")]
pub struct DanglingReferenceError {
    /// The id that could not be resolved.
    pub missing_id: String,
    /// The node that declared the dependency.
    pub referencing_id: String,
    /// Contract error info.
    pub error_info: ContractErrorInfo,
}

impl DanglingReferenceError {
    /// Creates a new dangling reference error.
    #[must_use]
    pub fn new(missing_id: impl Into<String>, referencing_id: impl Into<String>) -> Self {
        let missing_id = missing_id.into();
        let referencing_id = referencing_id.into();
        let info = ContractErrorInfo::new(
            "GRAPH-002-DANGLING",
            format!("Dependency '{missing_id}' not found"),
        )
        .with_fix_hint("Declare the dependency node or fix the typo in its id.")
        .with_context_entry("referencing_id", referencing_id.clone());

        Self {
            missing_id,
            referencing_id,
            error_info: info,
        }
    }
}

/// Why an artifact check failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MismatchReason {
    /// No earlier stage produces the artifact.
    Missing,
    /// More than one stage produces the artifact.
    DuplicateProducer,
}

/// Error raised when a pipeline's artifact flow is malformed.
///
/// For [`MismatchReason::DuplicateProducer`], `missing_artifact` names the
/// artifact that was produced twice.
#[derive(Debug, Clone, Error)]
#[error("Stage '{stage_name}' artifact '{missing_artifact}' is invalid: {reason:?}")]
pub struct ArtifactMismatchError {
    /// The stage where the mismatch was found.
    pub stage_name: String,
    /// The offending artifact name.
    pub missing_artifact: String,
    /// The kind of mismatch.
    pub reason: MismatchReason,
    /// Contract error info.
    pub error_info: ContractErrorInfo,
}

impl ArtifactMismatchError {
    /// Creates an error for an input no earlier stage produces.
    #[must_use]
    pub fn missing(stage_name: impl Into<String>, artifact: impl Into<String>) -> Self {
        let artifact = artifact.into();
        let info = ContractErrorInfo::new(
            "PIPELINE-001-ARTIFACT_MISSING",
            format!("Input artifact '{artifact}' is not produced by an earlier stage"),
        )
        .with_fix_hint("Declare the artifact as an output of a preceding stage.");

        Self {
            stage_name: stage_name.into(),
            missing_artifact: artifact,
            reason: MismatchReason::Missing,
            error_info: info,
        }
    }

    /// Creates an error for an artifact with more than one producer.
    #[must_use]
    pub fn duplicate(stage_name: impl Into<String>, artifact: impl Into<String>) -> Self {
        let artifact = artifact.into();
        let info = ContractErrorInfo::new(
            "PIPELINE-002-ARTIFACT_DUPLICATE",
            format!("Output artifact '{artifact}' has more than one producer"),
        )
        .with_fix_hint("Rename one of the outputs so each artifact has a single producer.");

        Self {
            stage_name: stage_name.into(),
            missing_artifact: artifact,
            reason: MismatchReason::DuplicateProducer,
            error_info: info,
        }
    }
}

/// Errors reported by an external provider.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// A temporary failure; the same call may succeed later.
    #[error("Transient provider failure: {0}")]
    Transient(String),

    /// The provider refused the request.
    #[error("Provider rejected request: {0}")]
    Rejected(String),

    /// A resource the request relies on does not exist.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// The provider does not handle this kind of resource.
    #[error("Unsupported resource: {0}")]
    Unsupported(String),
}

impl ProviderError {
    /// Returns true if the failure is expected to clear on its own.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// The underlying cause of a failed node.
#[derive(Debug, Clone, Error)]
pub enum ProvisionCause {
    /// The provider call failed.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// A `$ref` in the node configuration could not be resolved.
    #[error("Unresolved reference '{reference}'")]
    UnresolvedReference {
        /// The raw reference string.
        reference: String,
    },

    /// The node configuration is missing a key or has the wrong shape.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A pipeline's stage declarations failed artifact validation.
    #[error(transparent)]
    Artifact(#[from] ArtifactMismatchError),

    /// A dependency had no live handle when the node was scheduled.
    #[error("Dependency '{0}' has no live handle")]
    MissingDependency(String),
}

impl ProvisionCause {
    /// Returns true if the cause is a transient provider failure.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Provider(e) if e.is_transient())
    }
}

/// Error raised when a node fails to converge.
///
/// Carries the state as of the failure so the caller can hand it back to
/// the next `apply` and resume from the last converged node.
#[derive(Debug, Clone, Error)]
#[error("Failed to provision '{id}': {cause}")]
pub struct ProvisionError {
    /// The node that failed.
    pub id: String,
    /// Why it failed.
    pub cause: ProvisionCause,
    /// Handles converged before and during the failed run.
    pub state: StateMap,
}

impl ProvisionError {
    /// Creates a new provision error.
    #[must_use]
    pub fn new(id: impl Into<String>, cause: ProvisionCause, state: StateMap) -> Self {
        Self {
            id: id.into(),
            cause,
            state,
        }
    }
}

/// Error raised when a stage is moved through an illegal transition.
#[derive(Debug, Clone, Error)]
#[error("Stage '{stage}' cannot move from {from} to {to}")]
pub struct InvalidTransitionError {
    /// The stage name.
    pub stage: String,
    /// The current status.
    pub from: StageStatus,
    /// The requested status.
    pub to: StageStatus,
}

/// Provides default suggestions for common contract error codes.
pub struct ContractSuggestions;

impl ContractSuggestions {
    /// Gets a suggestion for a given error code.
    #[must_use]
    pub fn get(code: &str) -> Option<&'static str> {
        match code {
            "GRAPH-001-CYCLE" => Some(
                "Check your resource dependencies for circular references. \
                 A resource can only consume attributes of resources declared upstream.",
            ),
            "GRAPH-002-DANGLING" => Some(
                "Ensure every dependency names a node declared in the same graph. \
                 Check for typos in node ids.",
            ),
            "GRAPH-003-DUPLICATE" => Some("Each node id may be declared only once."),
            "GRAPH-004-INVALID_ID" => Some(
                "Node ids use lowercase letters, digits and dashes, starting with a letter or digit.",
            ),
            "GRAPH-005-UNDECLARED_REF" => Some(
                "Add the referenced node to the dependency set of the node using the reference.",
            ),
            "PIPELINE-001-ARTIFACT_MISSING" => Some(
                "Every input artifact must be the output of a stage that runs earlier.",
            ),
            "PIPELINE-002-ARTIFACT_DUPLICATE" => {
                Some("Every artifact name must have exactly one producing stage.")
            }
            "PIPELINE-003-STAGE_ORDER" => Some("Stages run Source, then Build, then Deploy."),
            "PIPELINE-004-DUPLICATE_STAGE" => Some(
                "Stage names identify stage status and stage nodes; give every stage a distinct name.",
            ),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contract_error_info_creation() {
        let info = ContractErrorInfo::new("TEST-001", "Test error")
            .with_fix_hint("Fix this by doing that")
            .with_context_entry("node", "bucket");

        assert_eq!(info.code, "TEST-001");
        assert_eq!(info.fix_hint, Some("Fix this by doing that".to_string()));
        assert_eq!(info.context.get("node"), Some(&"bucket".to_string()));
        assert!(info.to_dict().contains_key("context"));
    }

    #[test]
    fn test_cycle_error() {
        let err = CycleError::new(vec!["a".into(), "b".into(), "a".into()]);

        assert!(err.to_string().contains("a -> b -> a"));
        assert_eq!(err.error_info.code, "GRAPH-001-CYCLE");
    }

    #[test]
    fn test_dangling_reference_error() {
        let err = DanglingReferenceError::new("ghost", "build");

        assert_eq!(err.missing_id, "ghost");
        assert_eq!(err.referencing_id, "build");
        assert!(err.to_string().contains("'ghost'"));
        assert_eq!(err.error_info.code, "GRAPH-002-DANGLING");
    }

    #[test]
    fn test_artifact_mismatch_codes() {
        let missing = ArtifactMismatchError::missing("Deploy", "X");
        let dup = ArtifactMismatchError::duplicate("Build", "SourceOutput");

        assert_eq!(missing.reason, MismatchReason::Missing);
        assert_eq!(missing.error_info.code, "PIPELINE-001-ARTIFACT_MISSING");
        assert_eq!(dup.reason, MismatchReason::DuplicateProducer);
        assert_eq!(dup.missing_artifact, "SourceOutput");
    }

    #[test]
    fn test_only_provision_errors_are_retryable() {
        let provision = InfraflowError::from(ProvisionError::new(
            "bucket",
            ProviderError::Transient("throttled".into()).into(),
            StateMap::new(),
        ));
        let cycle = InfraflowError::from(CycleError::new(vec!["a".into(), "a".into()]));

        assert!(provision.is_retryable());
        assert!(!cycle.is_retryable());
        assert!(cycle.error_info().is_some());
    }

    #[test]
    fn test_provision_cause_transient() {
        let transient = ProvisionCause::from(ProviderError::Transient("503".into()));
        let rejected = ProvisionCause::from(ProviderError::Rejected("quota".into()));
        let config = ProvisionCause::InvalidConfig("missing name".into());

        assert!(transient.is_transient());
        assert!(!rejected.is_transient());
        assert!(!config.is_transient());
    }

    #[test]
    fn test_contract_suggestions() {
        assert!(ContractSuggestions::get("GRAPH-001-CYCLE").is_some());
        assert!(ContractSuggestions::get("PIPELINE-002-ARTIFACT_DUPLICATE").is_some());
        assert!(ContractSuggestions::get("PIPELINE-004-DUPLICATE_STAGE").is_some());
        assert!(ContractSuggestions::get("UNKNOWN").is_none());
    }
}
