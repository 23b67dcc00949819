//! Strategy selection
//!
//! The selector decides up front which strategies a request gets, from the
//! shape of the request and the collaborators that are configured, and
//! decides after the cheap passes whether the result needs escalating.

use crate::config::RouterConfig;
use kyb_domain::IndustryCandidate;
use serde::{Deserialize, Serialize};

/// How the content strategy will be handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentRoute {
    /// No website on the request
    Skip,
    /// Fetch through the configured provider
    Fetch,
    /// A website was given but no provider is configured; penalized
    Missing,
}

/// Strategies selected for one request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutePlan {
    /// Keyword pass on name and description (always on)
    pub keyword: bool,
    /// Pattern library (risk screening requested)
    pub pattern: bool,
    /// Website content
    pub content: ContentRoute,
    /// A reasoning strategy is available for escalation
    pub escalation_allowed: bool,
}

/// Why a result should be escalated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationReason {
    /// Nothing matched
    NoMatches,
    /// Best candidate below the escalation threshold
    LowConfidence,
    /// Top two candidates within the ambiguity gap
    Ambiguous,
}

impl EscalationReason {
    /// Get the reason as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            EscalationReason::NoMatches => "no_matches",
            EscalationReason::LowConfidence => "low_confidence",
            EscalationReason::Ambiguous => "ambiguous",
        }
    }
}

/// Picks strategies per request
#[derive(Debug, Clone)]
pub struct ModuleSelector {
    config: RouterConfig,
    has_content_provider: bool,
    has_reasoner: bool,
}

impl ModuleSelector {
    /// Selector over the configured collaborators
    pub fn new(config: RouterConfig, has_content_provider: bool, has_reasoner: bool) -> Self {
        Self {
            config,
            has_content_provider,
            has_reasoner,
        }
    }

    /// Active configuration
    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Plan the strategies for a request
    pub fn plan(&self, website: Option<&str>, screening: bool) -> RoutePlan {
        let content = match (website, self.has_content_provider) {
            (None, _) => ContentRoute::Skip,
            (Some(_), true) => ContentRoute::Fetch,
            (Some(_), false) => ContentRoute::Missing,
        };
        RoutePlan {
            keyword: true,
            pattern: screening,
            content,
            escalation_allowed: self.has_reasoner,
        }
    }

    /// Whether ranked candidates warrant escalation
    ///
    /// `candidates` must be sorted best first.
    pub fn escalation_reason(&self, candidates: &[IndustryCandidate]) -> Option<EscalationReason> {
        let Some(best) = candidates.first() else {
            return Some(EscalationReason::NoMatches);
        };
        if best.confidence < self.config.escalation_threshold {
            return Some(EscalationReason::LowConfidence);
        }
        match candidates.get(1) {
            Some(second) if best.confidence - second.confidence <= self.config.ambiguity_gap => {
                Some(EscalationReason::Ambiguous)
            }
            _ => None,
        }
    }
}
