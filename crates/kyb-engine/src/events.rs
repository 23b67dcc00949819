//! Event payloads published by the engine and its modules

use kyb_domain::{
    ClassificationResult, DegradedStrategy, Event, EventType, Priority, RiskAssessmentResult,
    RiskLevel,
};
use kyb_index::KeywordIndex;
use serde::Serialize;
use serde_json::Value;

/// Event source name of the engine facade
pub const ENGINE_SOURCE: &str = "engine";

fn to_value<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

/// A finished classification
pub fn classification_completed(source: &str, business_name: &str, result: &ClassificationResult) -> Event {
    Event::new(EventType::ClassificationCompleted, source)
        .with_data("business_name", business_name)
        .with_data("industry", result.primary_industry.name.as_str())
        .with_data("industry_id", result.primary_industry.industry_id.0)
        .with_data("confidence", result.confidence_score)
        .with_data("degraded", !result.degraded.is_empty())
        .with_data("result", to_value(result))
}

/// A finished risk assessment
///
/// High and critical results are published at raised priority.
pub fn risk_completed(source: &str, business_name: &str, result: &RiskAssessmentResult) -> Event {
    let priority = match result.risk_level {
        RiskLevel::Critical => Priority::Critical,
        RiskLevel::High => Priority::High,
        _ => Priority::Normal,
    };
    Event::new(EventType::RiskAssessmentCompleted, source)
        .with_priority(priority)
        .with_data("business_name", business_name)
        .with_data("risk_level", result.risk_level.as_str())
        .with_data("score", result.overall_score)
        .with_data("result", to_value(result))
}

/// A risk assessment at level high or above
pub fn high_risk_detected(source: &str, business_name: &str, result: &RiskAssessmentResult) -> Event {
    Event::new(EventType::HighRiskDetected, source)
        .with_priority(Priority::High)
        .with_data("business_name", business_name)
        .with_data("risk_level", result.risk_level.as_str())
        .with_data("score", result.overall_score)
        .with_data("recommendation", to_value(&result.recommendation))
        .with_data("restricted_codes", to_value(&result.restricted_codes))
}

/// A strategy that failed while serving a request
pub fn strategy_degraded(source: &str, degraded: &DegradedStrategy) -> Event {
    Event::new(EventType::StrategyDegraded, source)
        .with_priority(Priority::Low)
        .with_data("method", to_value(&degraded.method))
        .with_data("reason", degraded.reason.as_str())
}

/// A newly installed keyword index
pub fn index_reloaded(source: &str, index: &KeywordIndex, previous_fingerprint: &str) -> Event {
    Event::new(EventType::IndexReloaded, source)
        .with_data("version", index.version())
        .with_data("fingerprint", index.fingerprint())
        .with_data("previous_fingerprint", previous_fingerprint)
        .with_data("industries", index.industry_count())
        .with_data("keywords", index.keyword_count())
        .with_data("risk_keywords", index.risk_keyword_count())
}

#[cfg(test)]
mod tests {
    use super::*;
    use kyb_domain::{Method, Recommendation};

    #[test]
    fn test_high_risk_completion_is_prioritized() {
        let mut result = RiskAssessmentResult::minimal();
        assert_eq!(risk_completed("risk", "Acme", &result).priority, Priority::Normal);

        result.risk_level = RiskLevel::Critical;
        result.recommendation = Recommendation::Decline;
        let event = risk_completed("risk", "Acme", &result);
        assert_eq!(event.priority, Priority::Critical);
        assert_eq!(event.data_str("risk_level"), Some("critical"));
        assert!(event.data["result"].is_object());
    }

    #[test]
    fn test_degraded_payload() {
        let degraded = DegradedStrategy {
            method: Method::Escalation,
            reason: "timed out after 20ms".to_string(),
        };
        let event = strategy_degraded(ENGINE_SOURCE, &degraded);
        assert_eq!(event.event_type, EventType::StrategyDegraded);
        assert_eq!(event.data_str("reason"), Some("timed out after 20ms"));
        assert_eq!(event.data_str("method"), Some("escalation"));
    }
}
