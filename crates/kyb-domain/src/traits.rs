//! Trait definitions for external interactions
//!
//! These traits define the boundaries between the core and its collaborators:
//! the reference-data store, the website content extractor, the external
//! reasoning tier and the persistent event store. The core never writes back
//! through any of them except to dead-letter events.

use crate::event::{Event, EventType};
use crate::industry::{ClassificationCode, Industry, IndustryId};
use crate::keyword::{Keyword, RiskKeyword};
use crate::result::IndustryCandidate;
use thiserror::Error;

/// Errors reported by a reference-data or event store
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    /// Backing store unreachable; retried with backoff
    #[error("Source unavailable: {0}")]
    Unavailable(String),

    /// Store answered with data the core cannot use
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

/// Read-only access to the keyword and industry tables
///
/// Implemented by the storage layer (kyb-store) and by in-memory fixtures.
pub trait KeywordSource: Send + Sync {
    /// List active industries
    fn list_industries(&self) -> Result<Vec<Industry>, SourceError>;

    /// List active keywords for one industry
    fn list_keywords(&self, industry: IndustryId) -> Result<Vec<Keyword>, SourceError>;

    /// List active risk keywords with categories, severities and restriction codes
    fn list_risk_keywords(&self) -> Result<Vec<RiskKeyword>, SourceError>;

    /// List classification codes for one industry
    fn list_codes(&self, industry: IndustryId) -> Result<Vec<ClassificationCode>, SourceError>;
}

/// Errors reported by a non-essential strategy
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StrategyError {
    /// Collaborator could not be reached
    #[error("Strategy unavailable: {0}")]
    Unavailable(String),

    /// Collaborator did not answer in time
    #[error("Strategy timed out after {0} ms")]
    Timeout(u64),

    /// Collaborator answered with something unusable
    #[error("Invalid strategy response: {0}")]
    InvalidResponse(String),
}

/// Website content extraction
///
/// The core only consumes already-extracted text; fetching and HTML parsing are
/// the collaborator's concern. Implementations may block; callers run them on
/// the blocking pool under a timeout.
pub trait ContentProvider: Send + Sync {
    /// Return the visible text of the page at `url`
    fn fetch_text(&self, url: &str) -> Result<String, StrategyError>;
}

/// Input handed to the reasoning tier
#[derive(Debug, Clone, PartialEq)]
pub struct ReasoningInput {
    /// Business name
    pub business_name: String,
    /// Description
    pub description: Option<String>,
    /// Extracted website text, if the content pass ran
    pub website_text: Option<String>,
    /// Keyword candidates so far, best first
    pub candidates: Vec<IndustryCandidate>,
}

/// Answer from the reasoning tier
#[derive(Debug, Clone, PartialEq)]
pub struct ReasoningOutcome {
    /// Chosen industry (must exist in the loaded index)
    pub industry_id: IndustryId,
    /// Confidence in [0, 1]
    pub confidence: f64,
    /// Short rationale, surfaced in the explanation
    pub rationale: String,
}

/// External, slower, higher-accuracy classifier used on escalation
///
/// Treated as an opaque strategy with its own latency and cost profile.
pub trait ReasoningStrategy: Send + Sync {
    /// Strategy name for logs and explanations
    fn name(&self) -> &str;

    /// Classify the business
    fn classify(&self, input: &ReasoningInput) -> Result<ReasoningOutcome, StrategyError>;
}

/// Persistent store for events that exhausted their delivery attempts
pub trait EventStore: Send + Sync {
    /// Record an undeliverable event for replay or audit
    fn record_failed(&self, event: &Event, subscriber: &str, reason: &str)
        -> Result<(), SourceError>;
}

/// Health of a module
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    /// Module is healthy and accepting work
    Healthy,
    /// Module is degraded but functional
    Degraded,
    /// Module is unhealthy
    Unhealthy,
}

impl HealthStatus {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unhealthy => "unhealthy",
        }
    }
}

/// Errors reported by a module
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModuleError {
    /// The event payload was not what the module expected
    #[error("Invalid event payload: {0}")]
    InvalidPayload(String),

    /// The module failed while processing; the bus may retry
    #[error("Processing failed: {0}")]
    Failed(String),

    /// The module is not running
    #[error("Module not running: {0}")]
    NotRunning(String),
}

/// Capability interface for modules hosted by the communication manager
///
/// Kept deliberately small: lifecycle, one processing entry point and a
/// health probe. Follow-up work is expressed by returning an event, which the
/// manager publishes with the same correlation and trace ids.
pub trait Module: Send + Sync {
    /// Unique module name, used as event source and message target
    fn name(&self) -> &str;

    /// Event types this module wants to receive
    fn subscriptions(&self) -> Vec<EventType>;

    /// Start accepting work
    fn start(&self) -> Result<(), ModuleError>;

    /// Stop accepting work
    fn stop(&self) -> Result<(), ModuleError>;

    /// Handle one event, optionally producing a follow-up event
    fn process(&self, event: &Event) -> Result<Option<Event>, ModuleError>;

    /// Current health
    fn health_check(&self) -> HealthStatus;
}
