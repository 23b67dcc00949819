//! Classifier and risk service hosted on the communication manager
//!
//! Both modules answer request events with completion events. They work from
//! the request payload alone: keyword and pattern passes only, no website
//! fetch and no escalation, since module processing runs on a bus lane and
//! must not block on collaborators.

use crate::classifier::Classifier;
use crate::events;
use crate::index_manager::IndexManager;
use crate::risk::RiskDetectionService;
use crate::strategies::ContentOutcome;
use kyb_domain::traits::{HealthStatus, Module, ModuleError};
use kyb_domain::{ClassificationRequest, CodeType, Event, EventType, RiskRequest};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Bus name of the classifier module
pub const CLASSIFIER_MODULE: &str = "classifier";

/// Bus name of the risk module
pub const RISK_MODULE: &str = "risk_detector";

/// Answers `ClassificationRequested` with `ClassificationCompleted`
///
/// Payload: `business_name` (required), `description`, `website_url`.
pub struct ClassifierModule {
    classifier: Arc<Classifier>,
    index: Arc<IndexManager>,
    running: AtomicBool,
    processed: AtomicU64,
}

impl ClassifierModule {
    /// Module over a shared classifier and index
    pub fn new(classifier: Arc<Classifier>, index: Arc<IndexManager>) -> Self {
        Self {
            classifier,
            index,
            running: AtomicBool::new(false),
            processed: AtomicU64::new(0),
        }
    }

    /// Requests answered so far
    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }
}

impl Module for ClassifierModule {
    fn name(&self) -> &str {
        CLASSIFIER_MODULE
    }

    fn subscriptions(&self) -> Vec<EventType> {
        vec![EventType::ClassificationRequested]
    }

    fn start(&self) -> Result<(), ModuleError> {
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) -> Result<(), ModuleError> {
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn process(&self, event: &Event) -> Result<Option<Event>, ModuleError> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(ModuleError::NotRunning(CLASSIFIER_MODULE.to_string()));
        }
        if event.event_type != EventType::ClassificationRequested {
            return Ok(None);
        }

        let request = classification_request(event)?;
        let index = self.index.current();
        let result = self.classifier.classify_keywords(&request, &index);
        self.processed.fetch_add(1, Ordering::Relaxed);
        debug!(
            correlation_id = %event.correlation_id,
            industry = %result.primary_industry.name,
            "Classification request answered"
        );

        Ok(Some(
            events::classification_completed(CLASSIFIER_MODULE, &request.business_name, &result)
                .caused_by(event),
        ))
    }

    fn health_check(&self) -> HealthStatus {
        module_health(&self.running, &self.index)
    }
}

/// Answers `RiskAssessmentRequested` with `RiskAssessmentCompleted`
///
/// Payload: `business_name` (required), `description`, `website_url` and
/// `industry_codes` as a list of `"TYPE:code"` strings.
pub struct RiskModule {
    service: Arc<RiskDetectionService>,
    index: Arc<IndexManager>,
    running: AtomicBool,
    processed: AtomicU64,
}

impl RiskModule {
    /// Module over a shared risk service and index
    pub fn new(service: Arc<RiskDetectionService>, index: Arc<IndexManager>) -> Self {
        Self {
            service,
            index,
            running: AtomicBool::new(false),
            processed: AtomicU64::new(0),
        }
    }

    /// Requests answered so far
    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }
}

impl Module for RiskModule {
    fn name(&self) -> &str {
        RISK_MODULE
    }

    fn subscriptions(&self) -> Vec<EventType> {
        vec![EventType::RiskAssessmentRequested]
    }

    fn start(&self) -> Result<(), ModuleError> {
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) -> Result<(), ModuleError> {
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn process(&self, event: &Event) -> Result<Option<Event>, ModuleError> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(ModuleError::NotRunning(RISK_MODULE.to_string()));
        }
        if event.event_type != EventType::RiskAssessmentRequested {
            return Ok(None);
        }

        let request = risk_request(event)?;
        let index = self.index.current();
        let result = self.service.assess(&request, &index, &ContentOutcome::Absent);
        self.processed.fetch_add(1, Ordering::Relaxed);
        debug!(
            correlation_id = %event.correlation_id,
            level = result.risk_level.as_str(),
            "Risk request answered"
        );

        Ok(Some(
            events::risk_completed(RISK_MODULE, &request.business_name, &result).caused_by(event),
        ))
    }

    fn health_check(&self) -> HealthStatus {
        module_health(&self.running, &self.index)
    }
}

fn module_health(running: &AtomicBool, index: &IndexManager) -> HealthStatus {
    if !running.load(Ordering::SeqCst) {
        HealthStatus::Unhealthy
    } else if index.current().is_empty() {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    }
}

fn classification_request(event: &Event) -> Result<ClassificationRequest, ModuleError> {
    let business_name = event
        .data_str("business_name")
        .ok_or_else(|| ModuleError::InvalidPayload("missing string `business_name`".to_string()))?;
    let mut request = ClassificationRequest::new(business_name);
    if let Some(description) = event.data_str("description") {
        request = request.with_description(description);
    }
    if let Some(url) = event.data_str("website_url") {
        request = request.with_website(url);
    }
    request
        .validate()
        .map_err(|e| ModuleError::InvalidPayload(e.to_string()))?;
    Ok(request)
}

fn risk_request(event: &Event) -> Result<RiskRequest, ModuleError> {
    let base = classification_request(event)?;
    let mut request = RiskRequest::from(&base);

    let codes = match event.data.get("industry_codes") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items.iter().map(parse_code).collect::<Result<_, _>>()?,
        Some(_) => {
            return Err(ModuleError::InvalidPayload(
                "`industry_codes` must be a list".to_string(),
            ))
        }
    };
    request.industry_codes = codes;
    Ok(request)
}

fn parse_code(value: &Value) -> Result<(CodeType, String), ModuleError> {
    let invalid = || ModuleError::InvalidPayload(format!("bad industry code {}", value));
    let text = value.as_str().ok_or_else(invalid)?;
    let (code_type, code) = text.split_once(':').ok_or_else(invalid)?;
    let code_type = CodeType::parse(code_type.trim()).ok_or_else(invalid)?;
    let code = code.trim();
    if code.is_empty() {
        return Err(invalid());
    }
    Ok((code_type, code.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_classification_payload() {
        let event = Event::new(EventType::ClassificationRequested, "api")
            .with_data("business_name", "Joe's Coffee Shop")
            .with_data("description", "espresso bar");
        let request = classification_request(&event).unwrap();
        assert_eq!(request.business_name, "Joe's Coffee Shop");
        assert_eq!(request.description.as_deref(), Some("espresso bar"));
        assert_eq!(request.website_url, None);

        let missing = Event::new(EventType::ClassificationRequested, "api");
        assert!(matches!(
            classification_request(&missing),
            Err(ModuleError::InvalidPayload(_))
        ));
        let blank = Event::new(EventType::ClassificationRequested, "api").with_data("business_name", "  ");
        assert!(classification_request(&blank).is_err());
    }

    #[test]
    fn test_risk_payload_codes() {
        let event = Event::new(EventType::RiskAssessmentRequested, "api")
            .with_data("business_name", "Lucky Star LLC")
            .with_data("industry_codes", json!(["MCC:7995", "naics : 713210"]));
        let request = risk_request(&event).unwrap();
        assert_eq!(
            request.industry_codes,
            vec![
                (CodeType::Mcc, "7995".to_string()),
                (CodeType::Naics, "713210".to_string())
            ]
        );

        for bad in [json!(["7995"]), json!(["XYZ:1"]), json!(["MCC:"]), json!([42]), json!("MCC:7995")] {
            let event = Event::new(EventType::RiskAssessmentRequested, "api")
                .with_data("business_name", "Lucky Star LLC")
                .with_data("industry_codes", bad);
            assert!(matches!(risk_request(&event), Err(ModuleError::InvalidPayload(_))));
        }
    }
}
