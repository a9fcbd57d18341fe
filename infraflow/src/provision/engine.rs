//! Dependency-ordered provisioning engine.
//!
//! Nodes are converged as soon as every dependency has a live handle, up to
//! the configured concurrency limit. Among ready nodes, the one earliest in
//! the graph's execution order is scheduled first.

use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use super::hashing::config_hash;
use crate::cancellation::CancellationToken;
use crate::config::EngineConfig;
use crate::core::{resolve_config, LiveHandle, ResourceNode, StateMap};
use crate::errors::{InfraflowError, ProvisionCause, ProvisionError};
use crate::events::{self, EventSink, NoOpEventSink};
use crate::graph::ResourceGraph;
use crate::provider::ResourceProvider;
use crate::utils::generate_run_id;

/// What happened to a node during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeAction {
    /// No prior handle existed; the resource was created.
    Created,
    /// The resolved configuration changed; the resource was updated.
    Updated,
    /// The resolved configuration matched the prior handle; nothing was called.
    Unchanged,
}

impl NodeAction {
    fn event_type(self) -> &'static str {
        match self {
            Self::Created => events::RESOURCE_CREATED,
            Self::Updated => events::RESOURCE_UPDATED,
            Self::Unchanged => events::RESOURCE_UNCHANGED,
        }
    }
}

impl fmt::Display for NodeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Updated => write!(f, "updated"),
            Self::Unchanged => write!(f, "unchanged"),
        }
    }
}

/// Result of a provisioning run that did not fail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyReport {
    /// Identifier of the run.
    pub run_id: String,
    /// Every handle known after the run, including carried-over ones.
    pub state: StateMap,
    /// Nodes created during the run, in completion order.
    pub created: Vec<String>,
    /// Nodes updated during the run, in completion order.
    pub updated: Vec<String>,
    /// Nodes left untouched because their configuration matched.
    pub unchanged: Vec<String>,
    /// Whether the run stopped early on cancellation.
    pub cancelled: bool,
    /// Wall-clock duration of the run.
    pub duration_ms: f64,
}

impl ApplyReport {
    /// Number of nodes that caused a provider call.
    #[must_use]
    pub fn changed(&self) -> usize {
        self.created.len() + self.updated.len()
    }

    /// Returns true if the run issued no provider calls.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.changed() == 0
    }

    /// Returns the handle of `id`.
    #[must_use]
    pub fn handle(&self, id: &str) -> Option<&LiveHandle> {
        self.state.get(id)
    }
}

struct Converged {
    handle: LiveHandle,
    action: NodeAction,
    duration_ms: f64,
}

type NodeResult = (String, Result<Converged, ProvisionCause>);

/// Walks a resource graph and converges every node through a provider.
///
/// The provisioner never retries and never rolls back. A failed run returns
/// the state converged so far inside the error; passing it to the next
/// [`Provisioner::apply`] resumes from the last converged node.
pub struct Provisioner {
    provider: Arc<dyn ResourceProvider>,
    config: EngineConfig,
    event_sink: Arc<dyn EventSink>,
    cancellation: Option<CancellationToken>,
}

impl fmt::Debug for Provisioner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provisioner")
            .field("config", &self.config)
            .field("cancellable", &self.cancellation.is_some())
            .finish_non_exhaustive()
    }
}

impl Provisioner {
    /// Creates a provisioner with the default engine config.
    #[must_use]
    pub fn new(provider: Arc<dyn ResourceProvider>) -> Self {
        Self {
            provider,
            config: EngineConfig::default(),
            event_sink: Arc::new(NoOpEventSink),
            cancellation: None,
        }
    }

    /// Sets the engine config.
    #[must_use]
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    /// Sets the cancellation token checked between node completions.
    #[must_use]
    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Returns the engine config.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Converges `graph` starting from `existing`.
    ///
    /// A node is skipped when the hash of its *resolved* configuration, with
    /// every `$ref` replaced by the upstream attribute value, matches its
    /// prior handle. A node whose own config is unchanged is therefore still
    /// updated when an upstream attribute it references changes value; a
    /// dependency that only orders nodes, without a reference, never causes
    /// an update.
    ///
    /// Handles in `existing` for nodes that are not part of the graph are
    /// carried over untouched.
    ///
    /// # Errors
    ///
    /// Returns [`InfraflowError::Provision`] when a node fails. Nodes already
    /// in flight are awaited first, so the error's state includes them.
    pub async fn apply(
        &self,
        graph: &ResourceGraph,
        existing: StateMap,
    ) -> Result<ApplyReport, InfraflowError> {
        let start = Instant::now();
        let run_id = generate_run_id();
        let order = graph.execution_order();
        let limit = self.config.max_concurrency.max(1);

        info!(
            run_id = %run_id,
            nodes = order.len(),
            existing = existing.len(),
            max_concurrency = limit,
            "Starting provisioning run"
        );

        let position: HashMap<&str, usize> = order
            .iter()
            .enumerate()
            .map(|(i, id)| (id.as_str(), i))
            .collect();

        let mut children: Vec<Vec<usize>> = vec![Vec::new(); order.len()];
        let mut in_degree: Vec<usize> = vec![0; order.len()];
        for (i, id) in order.iter().enumerate() {
            let node = graph
                .node(id)
                .ok_or_else(|| InfraflowError::Internal(format!("Node '{id}' missing from graph")))?;
            for dep in &node.depends_on {
                let &parent = position.get(dep.as_str()).ok_or_else(|| {
                    InfraflowError::Internal(format!("Dependency '{dep}' missing from graph"))
                })?;
                children[parent].push(i);
                in_degree[i] += 1;
            }
        }

        let mut ready: BTreeSet<usize> = (0..order.len()).filter(|&i| in_degree[i] == 0).collect();
        let mut in_flight = FuturesUnordered::new();
        let mut state = existing;
        let mut report = ApplyReport {
            run_id: run_id.clone(),
            state: StateMap::new(),
            created: Vec::new(),
            updated: Vec::new(),
            unchanged: Vec::new(),
            cancelled: false,
            duration_ms: 0.0,
        };
        let mut failure: Option<(String, ProvisionCause)> = None;
        let mut internal: Option<String> = None;
        let mut completed = 0usize;

        loop {
            if failure.is_none() && internal.is_none() && !report.cancelled {
                if self.is_cancelled() {
                    report.cancelled = true;
                    warn!(
                        run_id = %run_id,
                        in_flight = in_flight.len(),
                        reason = ?self.cancellation.as_ref().and_then(CancellationToken::reason),
                        "Provisioning cancelled; draining in-flight nodes"
                    );
                } else {
                    while in_flight.len() < limit {
                        let Some(i) = ready.pop_first() else { break };
                        let Some(node) = graph.node(&order[i]) else { continue };
                        in_flight.push(self.spawn_node(node, &state));
                    }
                }
            }

            let Some(joined) = in_flight.next().await else { break };

            match joined {
                Ok((id, Ok(converged))) => {
                    completed += 1;
                    self.record(&run_id, &id, &converged);
                    match converged.action {
                        NodeAction::Created => report.created.push(id.clone()),
                        NodeAction::Updated => report.updated.push(id.clone()),
                        NodeAction::Unchanged => report.unchanged.push(id.clone()),
                    }
                    state.insert(id.clone(), converged.handle);

                    if let Some(&i) = position.get(id.as_str()) {
                        for &child in &children[i] {
                            in_degree[child] -= 1;
                            if in_degree[child] == 0 {
                                ready.insert(child);
                            }
                        }
                    }
                }
                Ok((id, Err(cause))) => {
                    error!(run_id = %run_id, node_id = %id, error = %cause, "Node failed to converge");
                    self.event_sink.try_emit(
                        events::RESOURCE_FAILED,
                        Some(serde_json::json!({
                            "run_id": &run_id,
                            "node_id": &id,
                            "error": cause.to_string(),
                            "transient": cause.is_transient(),
                        })),
                    );
                    // The first failure is reported; later ones are logged.
                    if failure.is_none() {
                        failure = Some((id, cause));
                    }
                }
                Err(join_error) => {
                    error!(run_id = %run_id, error = %join_error, "Node task aborted");
                    internal.get_or_insert_with(|| format!("Node task join error: {join_error}"));
                }
            }
        }

        report.duration_ms = start.elapsed().as_secs_f64() * 1000.0;

        if let Some(message) = internal {
            return Err(InfraflowError::Internal(message));
        }

        if let Some((id, cause)) = failure {
            warn!(
                run_id = %run_id,
                node_id = %id,
                converged = completed,
                duration_ms = report.duration_ms,
                "Provisioning run failed"
            );
            return Err(ProvisionError::new(id, cause, state).into());
        }

        if report.cancelled {
            self.event_sink.try_emit(
                events::RUN_CANCELLED,
                Some(serde_json::json!({
                    "run_id": &run_id,
                    "converged": completed,
                    "remaining": order.len() - completed,
                })),
            );
        } else if completed < order.len() {
            return Err(InfraflowError::Internal(format!(
                "Provisioning stalled after {completed} of {} nodes",
                order.len()
            )));
        } else {
            self.event_sink.try_emit(
                events::RUN_COMPLETED,
                Some(serde_json::json!({
                    "run_id": &run_id,
                    "created": report.created.len(),
                    "updated": report.updated.len(),
                    "unchanged": report.unchanged.len(),
                    "duration_ms": report.duration_ms,
                })),
            );
        }

        info!(
            run_id = %run_id,
            created = report.created.len(),
            updated = report.updated.len(),
            unchanged = report.unchanged.len(),
            cancelled = report.cancelled,
            duration_ms = report.duration_ms,
            "Provisioning run finished"
        );

        report.state = state;
        Ok(report)
    }

    fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
    }

    fn record(&self, run_id: &str, id: &str, converged: &Converged) {
        let handle = &converged.handle;
        match converged.action {
            NodeAction::Unchanged => {
                debug!(node_id = %id, kind = %handle.kind, "Node unchanged");
            }
            action => {
                info!(
                    node_id = %id,
                    kind = %handle.kind,
                    action = %action,
                    duration_ms = converged.duration_ms,
                    "Node converged"
                );
            }
        }
        self.event_sink.try_emit(
            converged.action.event_type(),
            Some(serde_json::json!({
                "run_id": run_id,
                "node_id": id,
                "kind": handle.kind,
                "config_hash": &handle.config_hash,
                "duration_ms": converged.duration_ms,
            })),
        );
    }

    /// Spawns convergence of one node with a snapshot of its inputs.
    fn spawn_node(
        &self,
        node: &ResourceNode,
        state: &StateMap,
    ) -> tokio::task::JoinHandle<NodeResult> {
        let dependencies: StateMap = node
            .depends_on
            .iter()
            .filter_map(|dep| state.get(dep).map(|h| (dep.clone(), h.clone())))
            .collect();
        let prior = state.get(&node.id).cloned();
        let provider = Arc::clone(&self.provider);
        let node = node.clone();

        self.event_sink.try_emit(
            events::RESOURCE_STARTED,
            Some(serde_json::json!({ "node_id": &node.id, "kind": node.kind })),
        );

        tokio::spawn(async move {
            let id = node.id.clone();
            let result = converge_node(provider.as_ref(), &node, &dependencies, prior).await;
            (id, result)
        })
    }
}

async fn converge_node(
    provider: &dyn ResourceProvider,
    node: &ResourceNode,
    dependencies: &StateMap,
    prior: Option<LiveHandle>,
) -> Result<Converged, ProvisionCause> {
    let start = Instant::now();

    if let Some(missing) = node.depends_on.iter().find(|d| !dependencies.contains_key(*d)) {
        return Err(ProvisionCause::MissingDependency(missing.clone()));
    }

    let resolved = resolve_config(&node.config, dependencies)
        .map_err(|reference| ProvisionCause::UnresolvedReference { reference })?;
    let hash = config_hash(&resolved);

    if let Some(handle) = prior.as_ref() {
        if handle.config_hash == hash && handle.kind == node.kind {
            return Ok(Converged {
                handle: handle.clone(),
                action: NodeAction::Unchanged,
                duration_ms: start.elapsed().as_secs_f64() * 1000.0,
            });
        }
    }

    let attributes = provider.converge(node, &resolved).await?;
    let action = if prior.is_some() {
        NodeAction::Updated
    } else {
        NodeAction::Created
    };

    Ok(Converged {
        handle: LiveHandle::new(&node.id, node.kind, attributes, hash),
        action,
        duration_ms: start.elapsed().as_secs_f64() * 1000.0,
    })
}
