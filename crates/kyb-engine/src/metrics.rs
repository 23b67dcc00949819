//! Request counters for the engine

use kyb_domain::{ClassificationResult, Method, RiskAssessmentResult, RiskLevel};
use std::collections::BTreeMap;

/// Counters collected while serving requests
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineMetrics {
    /// Classifications served, including cache hits
    pub classifications: u64,

    /// Classifications answered from the result cache
    pub result_cache_hits: u64,

    /// Classifications that ended unclassified
    pub unclassified: u64,

    /// Classifications whose escalation step ran
    pub escalations: u64,

    /// Risk assessments served, including those inside screenings
    pub risk_assessments: u64,

    /// Combined screenings served
    pub screenings: u64,

    /// Results per risk level
    pub risk_levels: BTreeMap<RiskLevel, u64>,

    /// Degraded strategies per method
    pub degraded: BTreeMap<Method, u64>,

    /// Index reloads and weight adjustments
    pub index_swaps: u64,
}

impl EngineMetrics {
    /// Create new empty metrics
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a classification
    pub fn record_classification(&mut self, result: &ClassificationResult, from_cache: bool) {
        self.classifications += 1;
        if from_cache {
            self.result_cache_hits += 1;
            return;
        }
        if result.is_unclassified() {
            self.unclassified += 1;
        }
        if result.trace.contains(&kyb_domain::RouterState::Escalated) {
            self.escalations += 1;
        }
        for d in &result.degraded {
            *self.degraded.entry(d.method).or_insert(0) += 1;
        }
    }

    /// Record a risk assessment
    pub fn record_risk(&mut self, result: &RiskAssessmentResult) {
        self.risk_assessments += 1;
        *self.risk_levels.entry(result.risk_level).or_insert(0) += 1;
        for d in &result.degraded {
            *self.degraded.entry(d.method).or_insert(0) += 1;
        }
    }

    /// Record a screening; its parts are recorded separately
    pub fn record_screening(&mut self) {
        self.screenings += 1;
    }

    /// Record an index swap
    pub fn record_index_swap(&mut self) {
        self.index_swaps += 1;
    }

    /// Assessments at level high or above
    pub fn high_risk(&self) -> u64 {
        self.risk_levels
            .range(RiskLevel::High..)
            .map(|(_, count)| count)
            .sum()
    }

    /// Degraded strategies across all methods
    pub fn total_degraded(&self) -> u64 {
        self.degraded.values().sum()
    }

    /// Share of classifications served from the cache
    pub fn cache_hit_rate(&self) -> f64 {
        if self.classifications == 0 {
            0.0
        } else {
            self.result_cache_hits as f64 / self.classifications as f64
        }
    }

    /// Generate a summary report of metrics
    pub fn summary(&self) -> String {
        let mut lines = vec![
            "Engine Metrics Summary".to_string(),
            "======================".to_string(),
            format!(
                "Classifications: {} ({} cached, {} unclassified, {} escalated)",
                self.classifications, self.result_cache_hits, self.unclassified, self.escalations
            ),
            format!("Risk assessments: {} ({} high or above)", self.risk_assessments, self.high_risk()),
            format!("Screenings: {}", self.screenings),
            format!("Index swaps: {}", self.index_swaps),
        ];

        if !self.risk_levels.is_empty() {
            lines.push(String::new());
            lines.push("Risk levels:".to_string());
            for (level, count) in &self.risk_levels {
                lines.push(format!("  {}: {}", level.as_str(), count));
            }
        }

        if !self.degraded.is_empty() {
            lines.push(String::new());
            lines.push("Degraded strategies:".to_string());
            for (method, count) in &self.degraded {
                lines.push(format!("  {:?}: {}", method, count));
            }
            lines.push(format!("  Total: {}", self.total_degraded()));
        }

        lines.join("\n")
    }
}
