//! A generic recording provider for engine tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::cancellation::CancellationToken;
use crate::core::{Attributes, NodeConfig, ResourceNode};
use crate::errors::{ProviderError, ProvisionCause};
use crate::provider::ResourceProvider;

/// A recorded provider call.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    /// Node id.
    pub node_id: String,
    /// Resolved configuration the node was converged with.
    pub config: NodeConfig,
}

#[derive(Debug)]
struct Failure {
    error: ProviderError,
    remaining: Option<usize>,
}

/// A provider that accepts any node kind and records every call.
///
/// Produced attributes are `id`, `url` (`fake://<kind>/<id>`) and `name`
/// (the configured `name`, or the id when absent), so a change of `name`
/// propagates to referencing nodes.
#[derive(Debug, Default)]
pub struct RecordingProvider {
    calls: Mutex<Vec<RecordedCall>>,
    failures: Mutex<HashMap<String, Failure>>,
    cancel_on: Mutex<Option<(String, CancellationToken)>>,
    latency: Option<Duration>,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl RecordingProvider {
    /// Creates a provider that answers immediately.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes each call take `latency`.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Makes every call for `node_id` fail with `error`.
    pub fn fail_on(&self, node_id: impl Into<String>, error: ProviderError) {
        self.failures.lock().insert(
            node_id.into(),
            Failure {
                error,
                remaining: None,
            },
        );
    }

    /// Makes the next `times` calls for `node_id` fail with `error`.
    pub fn fail_times(&self, node_id: impl Into<String>, error: ProviderError, times: usize) {
        self.failures.lock().insert(
            node_id.into(),
            Failure {
                error,
                remaining: Some(times),
            },
        );
    }

    /// Removes every injected failure.
    pub fn heal(&self) {
        self.failures.lock().clear();
    }

    /// Cancels `token` when the call for `node_id` starts.
    pub fn cancel_on(&self, node_id: impl Into<String>, token: CancellationToken) {
        *self.cancel_on.lock() = Some((node_id.into(), token));
    }

    /// Returns every recorded call.
    #[must_use]
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    /// Returns the node ids called, in call order.
    #[must_use]
    pub fn called_ids(&self) -> Vec<String> {
        self.calls.lock().iter().map(|c| c.node_id.clone()).collect()
    }

    /// Returns the number of calls.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Highest number of calls observed in flight at once.
    #[must_use]
    pub fn max_concurrent(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    /// Clears recorded calls.
    pub fn reset(&self) {
        self.calls.lock().clear();
        self.max_active.store(0, Ordering::SeqCst);
    }

    fn take_failure(&self, node_id: &str) -> Option<ProviderError> {
        let mut failures = self.failures.lock();
        let failure = failures.get_mut(node_id)?;
        let error = failure.error.clone();
        match failure.remaining {
            None => Some(error),
            Some(0) => {
                failures.remove(node_id);
                None
            }
            Some(n) => {
                failure.remaining = Some(n - 1);
                Some(error)
            }
        }
    }
}

#[async_trait]
impl ResourceProvider for RecordingProvider {
    async fn converge(
        &self,
        node: &ResourceNode,
        config: &NodeConfig,
    ) -> Result<Attributes, ProvisionCause> {
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);

        self.calls.lock().push(RecordedCall {
            node_id: node.id.clone(),
            config: config.clone(),
        });

        if let Some((id, token)) = self.cancel_on.lock().as_ref() {
            if id == &node.id {
                token.cancel(format!("cancelled while converging '{id}'"));
            }
        }

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        self.active.fetch_sub(1, Ordering::SeqCst);

        if let Some(error) = self.take_failure(&node.id) {
            return Err(error.into());
        }

        let name = config
            .get("name")
            .and_then(serde_json::Value::as_str)
            .unwrap_or(node.id.as_str());

        let mut attrs = Attributes::new();
        attrs.insert("id".into(), json!(node.id));
        attrs.insert("url".into(), json!(format!("fake://{}/{}", node.kind, node.id)));
        attrs.insert("name".into(), json!(name));
        Ok(attrs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ResourceKind;

    #[tokio::test]
    async fn test_records_calls_and_attributes() {
        let provider = RecordingProvider::new();
        let node = ResourceNode::new("artifacts", ResourceKind::Bucket).with_config("name", "b-dev");

        let attrs = provider.converge(&node, &node.config).await.unwrap();

        assert_eq!(provider.called_ids(), vec!["artifacts"]);
        assert_eq!(attrs.get("name"), Some(&json!("b-dev")));
        assert_eq!(attrs.get("url"), Some(&json!("fake://bucket/artifacts")));
        assert_eq!(provider.max_concurrent(), 1);
    }

    #[tokio::test]
    async fn test_fail_times_recovers() {
        let provider = RecordingProvider::new();
        provider.fail_times("a", ProviderError::Transient("throttled".into()), 1);
        let node = ResourceNode::new("a", ResourceKind::Bucket);

        assert!(provider.converge(&node, &node.config).await.is_err());
        assert!(provider.converge(&node, &node.config).await.is_ok());
        assert_eq!(provider.call_count(), 2);
    }
}
