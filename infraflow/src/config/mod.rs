//! Configuration for provisioning runs.
//!
//! Configuration is an explicit value threaded into each call rather than
//! ambient global state:
//! - [`StackConfig`]: stack identifier and target region
//! - [`EngineConfig`]: provisioning engine tuning
//! - [`StackSettings`]: sizing and naming knobs of the delivery stack

use serde::{Deserialize, Serialize};
use std::env;

use crate::core::is_valid_node_id;
use crate::errors::ValidationError;

/// Environment variable holding the stack identifier.
pub const STACK_ENV: &str = "INFRAFLOW_STACK";

/// Identity of one provisioned environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackConfig {
    /// Stack/environment identifier (e.g. "dev").
    #[serde(default = "default_stack")]
    pub stack: String,
    /// Target region.
    #[serde(default = "default_region")]
    pub region: String,
}

fn default_stack() -> String {
    "dev".to_string()
}

fn default_region() -> String {
    "us-west-2".to_string()
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            stack: default_stack(),
            region: default_region(),
        }
    }
}

impl StackConfig {
    /// Creates a stack config.
    #[must_use]
    pub fn new(stack: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            stack: stack.into(),
            region: region.into(),
        }
    }

    /// Reads the stack from `INFRAFLOW_STACK` and the region from
    /// `AWS_REGION` or `AWS_DEFAULT_REGION`, falling back to defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let non_empty = |key: &str| env::var(key).ok().filter(|v| !v.trim().is_empty());

        Self {
            stack: non_empty(STACK_ENV).unwrap_or_else(default_stack),
            region: non_empty("AWS_REGION")
                .or_else(|| non_empty("AWS_DEFAULT_REGION"))
                .unwrap_or_else(default_region),
        }
    }

    /// Returns `base` suffixed with the stack name.
    #[must_use]
    pub fn scoped_name(&self, base: &str) -> String {
        format!("{}-{}", base, self.stack)
    }

    /// Validates the config.
    ///
    /// # Errors
    ///
    /// Returns an error if the region is empty or the stack is not a
    /// lowercase identifier (letters, digits and dashes). The stack id is
    /// spliced into resource names and state file names.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.stack.trim().is_empty() {
            return Err(ValidationError::new("Stack name cannot be empty or whitespace-only"));
        }
        if !is_valid_node_id(&self.stack) {
            return Err(ValidationError::new(format!(
                "Stack name '{}' must use lowercase letters, digits and dashes",
                self.stack
            )));
        }
        if self.region.trim().is_empty() {
            return Err(ValidationError::new("Region cannot be empty or whitespace-only"));
        }
        Ok(())
    }
}

/// Tuning for the provisioning engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum number of nodes converged at the same time.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

fn default_max_concurrency() -> usize {
    4
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
        }
    }
}

impl EngineConfig {
    /// Creates the default engine config.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the concurrency limit; values below one are raised to one.
    #[must_use]
    pub fn with_max_concurrency(mut self, limit: usize) -> Self {
        self.max_concurrency = limit.max(1);
        self
    }

    /// Processes one node at a time.
    #[must_use]
    pub fn sequential() -> Self {
        Self::default().with_max_concurrency(1)
    }
}

/// Sizing and naming knobs for the delivery stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackSettings {
    /// Cluster the deploy project targets. Empty is accepted and inert.
    #[serde(default)]
    pub deploy_cluster_name: Option<String>,
    /// Branch the source stages track.
    #[serde(default = "default_branch")]
    pub branch: String,
    /// Build image for every build project.
    #[serde(default = "default_build_image")]
    pub build_image: String,
    /// Compute size for every build project.
    #[serde(default = "default_compute_size")]
    pub compute_size: String,
    /// Cluster node instance type.
    #[serde(default = "default_instance_type")]
    pub instance_type: String,
    /// Desired cluster node count.
    #[serde(default = "default_desired_capacity")]
    pub desired_capacity: u32,
    /// Minimum cluster node count.
    #[serde(default = "default_min_size")]
    pub min_size: u32,
    /// Maximum cluster node count.
    #[serde(default = "default_max_size")]
    pub max_size: u32,
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_build_image() -> String {
    "aws/codebuild/standard:6.0".to_string()
}

fn default_compute_size() -> String {
    "BUILD_GENERAL1_SMALL".to_string()
}

fn default_instance_type() -> String {
    "t3.medium".to_string()
}

fn default_desired_capacity() -> u32 {
    2
}

fn default_min_size() -> u32 {
    1
}

fn default_max_size() -> u32 {
    3
}

impl Default for StackSettings {
    fn default() -> Self {
        Self {
            deploy_cluster_name: None,
            branch: default_branch(),
            build_image: default_build_image(),
            compute_size: default_compute_size(),
            instance_type: default_instance_type(),
            desired_capacity: default_desired_capacity(),
            min_size: default_min_size(),
            max_size: default_max_size(),
        }
    }
}

impl StackSettings {
    /// Sets the deploy target cluster.
    #[must_use]
    pub fn with_deploy_cluster_name(mut self, name: impl Into<String>) -> Self {
        self.deploy_cluster_name = Some(name.into());
        self
    }

    /// Sets the cluster scaling bounds.
    #[must_use]
    pub fn with_scaling(mut self, min_size: u32, desired_capacity: u32, max_size: u32) -> Self {
        self.min_size = min_size;
        self.desired_capacity = desired_capacity;
        self.max_size = max_size;
        self
    }

    /// The deploy target cluster, empty when unset.
    #[must_use]
    pub fn deploy_cluster(&self) -> &str {
        self.deploy_cluster_name.as_deref().unwrap_or_default()
    }

    /// Validates the settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the scaling bounds are inconsistent or the branch is empty.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !(self.min_size <= self.desired_capacity && self.desired_capacity <= self.max_size) {
            return Err(ValidationError::new(format!(
                "Cluster scaling must satisfy min <= desired <= max (got {} / {} / {})",
                self.min_size, self.desired_capacity, self.max_size
            )));
        }
        if self.branch.trim().is_empty() {
            return Err(ValidationError::new("Source branch cannot be empty"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stack_config_defaults() {
        let config = StackConfig::default();
        assert_eq!(config.stack, "dev");
        assert_eq!(config.region, "us-west-2");
        assert_eq!(config.scoped_name("java-service"), "java-service-dev");
    }

    #[test]
    fn test_stack_config_validate() {
        assert!(StackConfig::new("prod", "eu-west-1").validate().is_ok());
        assert!(StackConfig::new("  ", "eu-west-1").validate().is_err());
        assert!(StackConfig::new("prod", "").validate().is_err());
    }

    #[test]
    fn test_stack_config_rejects_path_like_stack_ids() {
        for stack in ["../x", "a/b", "Prod", "dev stack", "-dev"] {
            assert!(StackConfig::new(stack, "us-west-2").validate().is_err(), "{stack}");
        }
        assert!(StackConfig::new("feature-42", "us-west-2").validate().is_ok());
    }

    #[test]
    fn test_stack_config_deserialize_fills_defaults() {
        let config: StackConfig = serde_json::from_str(r#"{"stack": "staging"}"#).unwrap();
        assert_eq!(config.stack, "staging");
        assert_eq!(config.region, "us-west-2");
    }

    #[test]
    fn test_engine_config_clamps_concurrency() {
        assert_eq!(EngineConfig::default().max_concurrency, 4);
        assert_eq!(EngineConfig::new().with_max_concurrency(0).max_concurrency, 1);
        assert_eq!(EngineConfig::sequential().max_concurrency, 1);
    }

    #[test]
    fn test_stack_settings_defaults() {
        let settings = StackSettings::default();
        assert_eq!(settings.branch, "main");
        assert_eq!(settings.build_image, "aws/codebuild/standard:6.0");
        assert_eq!(settings.compute_size, "BUILD_GENERAL1_SMALL");
        assert_eq!(settings.instance_type, "t3.medium");
        assert_eq!((settings.min_size, settings.desired_capacity, settings.max_size), (1, 2, 3));
        assert_eq!(settings.deploy_cluster(), "");
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_stack_settings_rejects_bad_scaling() {
        let settings = StackSettings::default().with_scaling(3, 2, 4);
        assert!(settings.validate().is_err());
    }
}
