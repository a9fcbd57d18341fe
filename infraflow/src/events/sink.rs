//! Event sinks for provisioning and stage events.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn, Level};

use crate::utils::{now_utc, Timestamp};

/// Receives provisioning and stage events.
///
/// Emission must never fail the run: sinks swallow their own errors.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Emits an event asynchronously.
    ///
    /// # Arguments
    ///
    /// * `event_type` - The type of event (e.g., "resource.created")
    /// * `data` - Optional event payload
    async fn emit(&self, event_type: &str, data: Option<Value>);

    /// Emits an event from synchronous code without blocking.
    fn try_emit(&self, event_type: &str, data: Option<Value>);
}

/// Discards every event. The default sink of a provisioner.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

#[async_trait]
impl EventSink for NoOpEventSink {
    async fn emit(&self, _event_type: &str, _data: Option<Value>) {}

    fn try_emit(&self, _event_type: &str, _data: Option<Value>) {}
}

/// Writes events to `tracing`.
///
/// Failure events (`*.failed`) are always logged at `warn`; everything else
/// goes out at the configured level. The payload's `node_id` and `stage`
/// fields are lifted into structured log fields.
#[derive(Debug, Clone)]
pub struct LoggingEventSink {
    level: Level,
}

impl Default for LoggingEventSink {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl LoggingEventSink {
    /// Creates a sink logging non-failure events at `level`.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    /// Creates a debug-level logging sink.
    #[must_use]
    pub fn debug() -> Self {
        Self::new(Level::DEBUG)
    }

    fn log_event(&self, event_type: &str, data: Option<&Value>) {
        let field = |name: &str| {
            data.and_then(|d| d.get(name))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        let node_id = field("node_id");
        let stage = field("stage");

        if event_type.ends_with(".failed") {
            warn!(event_type, node_id = %node_id, stage = %stage, event_data = ?data, "Event");
        } else if self.level == Level::DEBUG {
            debug!(event_type, node_id = %node_id, stage = %stage, event_data = ?data, "Event");
        } else {
            info!(event_type, node_id = %node_id, stage = %stage, "Event");
        }
    }
}

#[async_trait]
impl EventSink for LoggingEventSink {
    async fn emit(&self, event_type: &str, data: Option<Value>) {
        self.log_event(event_type, data.as_ref());
    }

    fn try_emit(&self, event_type: &str, data: Option<Value>) {
        self.log_event(event_type, data.as_ref());
    }
}

/// One event captured by a [`CollectingEventSink`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedEvent {
    /// Event type, e.g. `resource.created`.
    pub event_type: String,
    /// Event payload.
    pub data: Option<Value>,
    /// When the event was received.
    pub received_at: Timestamp,
}

impl RecordedEvent {
    /// Returns a string field of the payload.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&str> {
        self.data.as_ref()?.get(name)?.as_str()
    }
}

/// Keeps every event in memory, in arrival order.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: RwLock<Vec<RecordedEvent>>,
}

impl CollectingEventSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected events.
    #[must_use]
    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.read().clone()
    }

    /// Returns the number of collected events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if no events have been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Drops every collected event.
    pub fn clear(&self) {
        self.events.write().clear();
    }

    /// Returns events whose type starts with `type_prefix`.
    #[must_use]
    pub fn events_of_type(&self, type_prefix: &str) -> Vec<RecordedEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.event_type.starts_with(type_prefix))
            .cloned()
            .collect()
    }

    /// Returns the `node_id` of every event of exactly `event_type`.
    #[must_use]
    pub fn node_ids(&self, event_type: &str) -> Vec<String> {
        self.events
            .read()
            .iter()
            .filter(|e| e.event_type == event_type)
            .filter_map(|e| e.field("node_id").map(ToString::to_string))
            .collect()
    }

    fn push(&self, event_type: &str, data: Option<Value>) {
        self.events.write().push(RecordedEvent {
            event_type: event_type.to_string(),
            data,
            received_at: now_utc(),
        });
    }
}

#[async_trait]
impl EventSink for CollectingEventSink {
    async fn emit(&self, event_type: &str, data: Option<Value>) {
        self.push(event_type, data);
    }

    fn try_emit(&self, event_type: &str, data: Option<Value>) {
        self.push(event_type, data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_noop_sink() {
        let sink = NoOpEventSink;
        sink.emit("run.completed", None).await;
        sink.try_emit("resource.created", Some(json!({"node_id": "bucket"})));
    }

    #[tokio::test]
    async fn test_logging_sink_handles_failures_and_missing_fields() {
        let sink = LoggingEventSink::debug();
        sink.emit("resource.failed", Some(json!({"node_id": "bucket", "error": "denied"})))
            .await;
        sink.try_emit("stage.started", Some(json!({"stage": "Build"})));
        LoggingEventSink::default().try_emit("run.completed", None);
    }

    #[tokio::test]
    async fn test_collecting_sink_filters_and_orders() {
        let sink = CollectingEventSink::new();
        sink.emit("resource.started", Some(json!({"node_id": "a"}))).await;
        sink.emit("resource.created", Some(json!({"node_id": "a"}))).await;
        sink.try_emit("run.completed", None);

        assert_eq!(sink.len(), 3);
        assert_eq!(sink.events_of_type("resource.").len(), 2);
        assert_eq!(sink.node_ids("resource.created"), vec!["a".to_string()]);

        let events = sink.events();
        assert!(events[0].received_at <= events[2].received_at);
        assert_eq!(events[1].field("node_id"), Some("a"));
        assert_eq!(events[2].field("node_id"), None);

        sink.clear();
        assert!(sink.is_empty());
    }
}
