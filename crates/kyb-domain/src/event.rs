//! Event and message envelopes for the internal bus
//!
//! Events are broadcast by type; messages are addressed to one target module
//! and may carry a TTL. Both carry the correlation and trace ids of the
//! request that produced them.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Current time in milliseconds since Unix epoch
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn new_id() -> String {
    uuid::Uuid::now_v7().to_string()
}

/// Event topic
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// A caller asked for a classification
    ClassificationRequested,
    /// A classification finished
    ClassificationCompleted,
    /// A caller asked for a risk assessment
    RiskAssessmentRequested,
    /// A risk assessment finished
    RiskAssessmentCompleted,
    /// A risk assessment reached level high or critical
    HighRiskDetected,
    /// The keyword index was replaced
    IndexReloaded,
    /// A strategy failed and the request degraded
    StrategyDegraded,
    /// Cached entries should be dropped
    CacheInvalidationRequested,
    /// Application-defined topic
    Custom(String),
}

impl EventType {
    /// Get the topic name as a string
    pub fn as_str(&self) -> &str {
        match self {
            EventType::ClassificationRequested => "classification_requested",
            EventType::ClassificationCompleted => "classification_completed",
            EventType::RiskAssessmentRequested => "risk_assessment_requested",
            EventType::RiskAssessmentCompleted => "risk_assessment_completed",
            EventType::HighRiskDetected => "high_risk_detected",
            EventType::IndexReloaded => "index_reloaded",
            EventType::StrategyDegraded => "strategy_degraded",
            EventType::CacheInvalidationRequested => "cache_invalidation_requested",
            EventType::Custom(name) => name.as_str(),
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Dispatch priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Background
    Low,
    /// Default
    #[default]
    Normal,
    /// Elevated
    High,
    /// Alerts
    Critical,
}

/// A broadcast event
///
/// Built once with the `with_*` methods, then shared immutably by the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Unique id (UUIDv7)
    pub id: String,

    /// Topic
    #[serde(rename = "type")]
    pub event_type: EventType,

    /// Module that published the event
    pub source: String,

    /// Module the event is aimed at, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,

    /// Priority
    pub priority: Priority,

    /// Milliseconds since Unix epoch
    pub timestamp: u64,

    /// Payload
    pub data: BTreeMap<String, Value>,

    /// Links every event produced while servicing one external request
    pub correlation_id: String,

    /// Trace id for cross-module tracing
    pub trace_id: String,
}

impl Event {
    /// Create an event with fresh correlation and trace ids
    pub fn new(event_type: EventType, source: impl Into<String>) -> Self {
        let id = new_id();
        Self {
            correlation_id: id.clone(),
            trace_id: id.clone(),
            id,
            event_type,
            source: source.into(),
            target: None,
            priority: Priority::Normal,
            timestamp: now_millis(),
            data: BTreeMap::new(),
        }
    }

    /// Set correlation and trace ids
    pub fn with_correlation(
        mut self,
        correlation_id: impl Into<String>,
        trace_id: impl Into<String>,
    ) -> Self {
        self.correlation_id = correlation_id.into();
        self.trace_id = trace_id.into();
        self
    }

    /// Inherit correlation and trace ids from another event
    pub fn caused_by(self, cause: &Event) -> Self {
        self.with_correlation(cause.correlation_id.clone(), cause.trace_id.clone())
    }

    /// Aim the event at one module
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// Set priority
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Add one payload entry
    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Read a string payload entry
    pub fn data_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(Value::as_str)
    }
}

/// A point-to-point message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Unique id (UUIDv7)
    pub id: String,

    /// Application-defined message type
    #[serde(rename = "type")]
    pub message_type: String,

    /// Sending module
    pub source: String,

    /// Receiving module
    pub target: String,

    /// Priority
    pub priority: Priority,

    /// Milliseconds since Unix epoch
    pub timestamp: u64,

    /// Payload
    pub data: BTreeMap<String, Value>,

    /// Free-form headers
    pub headers: BTreeMap<String, String>,

    /// Links every message produced while servicing one external request
    pub correlation_id: String,

    /// Trace id for cross-module tracing
    pub trace_id: String,

    /// Time to live in milliseconds, counted from `timestamp`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_ms: Option<u64>,
}

impl Message {
    /// Create a message addressed to `target`
    pub fn new(
        message_type: impl Into<String>,
        source: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        let id = new_id();
        Self {
            correlation_id: id.clone(),
            trace_id: id.clone(),
            id,
            message_type: message_type.into(),
            source: source.into(),
            target: target.into(),
            priority: Priority::Normal,
            timestamp: now_millis(),
            data: BTreeMap::new(),
            headers: BTreeMap::new(),
            ttl_ms: None,
        }
    }

    /// Set correlation and trace ids
    pub fn with_correlation(
        mut self,
        correlation_id: impl Into<String>,
        trace_id: impl Into<String>,
    ) -> Self {
        self.correlation_id = correlation_id.into();
        self.trace_id = trace_id.into();
        self
    }

    /// Set a TTL in milliseconds
    pub fn with_ttl_ms(mut self, ttl_ms: u64) -> Self {
        self.ttl_ms = Some(ttl_ms);
        self
    }

    /// Set priority
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Add one payload entry
    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Add one header
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Whether the TTL has elapsed at `now_ms`
    pub fn is_expired_at(&self, now_ms: u64) -> bool {
        match self.ttl_ms {
            Some(ttl) => now_ms >= self.timestamp.saturating_add(ttl),
            None => false,
        }
    }

    /// Whether the TTL has elapsed now
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(now_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_builder() {
        let event = Event::new(EventType::ClassificationCompleted, "classifier")
            .with_correlation("corr-1", "trace-1")
            .with_target("alerts")
            .with_priority(Priority::High)
            .with_data("industry", "Coffee Shop");

        assert_eq!(event.correlation_id, "corr-1");
        assert_eq!(event.trace_id, "trace-1");
        assert_eq!(event.target.as_deref(), Some("alerts"));
        assert_eq!(event.priority, Priority::High);
        assert_eq!(event.data_str("industry"), Some("Coffee Shop"));
    }

    #[test]
    fn test_caused_by_propagates_ids() {
        let cause = Event::new(EventType::ClassificationRequested, "api")
            .with_correlation("corr-9", "trace-9");
        let effect = Event::new(EventType::ClassificationCompleted, "classifier").caused_by(&cause);
        assert_eq!(effect.correlation_id, "corr-9");
        assert_eq!(effect.trace_id, "trace-9");
        assert_ne!(effect.id, cause.id);
    }

    #[test]
    fn test_message_ttl() {
        let mut message = Message::new("ping", "a", "b").with_ttl_ms(100);
        message.timestamp = 1_000;
        assert!(!message.is_expired_at(1_050));
        assert!(message.is_expired_at(1_100));

        let forever = Message::new("ping", "a", "b");
        assert!(!forever.is_expired_at(u64::MAX));
    }

    #[test]
    fn test_event_schema() {
        let event = Event::new(EventType::IndexReloaded, "index");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "index_reloaded");
        assert!(json.get("target").is_none());
        assert!(json["correlation_id"].is_string());
    }
}
