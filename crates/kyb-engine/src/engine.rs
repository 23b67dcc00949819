//! The engine facade
//!
//! Owns every shared component: the index manager, the classifier, the risk
//! service, the disk cache and the communication manager. One engine serves
//! any number of concurrent requests; wrap it in an `Arc` to share it across
//! tasks.

use crate::classifier::Classifier;
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::events::{self, ENGINE_SOURCE};
use crate::index_manager::{IndexManager, IndexOrigin, SNAPSHOT_KEY};
use crate::metrics::EngineMetrics;
use crate::modules::{ClassifierModule, RiskModule};
use crate::risk::RiskDetectionService;
use crate::router::{ContentRoute, ModuleSelector};
use crate::strategies::{self, ContentOutcome};
use kyb_bus::{BusStats, CommunicationManager};
use kyb_cache::{CacheMetrics, DiskCache};
use kyb_domain::traits::{
    ContentProvider, EventStore, HealthStatus, KeywordSource, Module, ReasoningStrategy,
};
use kyb_domain::{
    ClassificationRequest, ClassificationResult, DegradedStrategy, Event, MatchTarget,
    RiskAssessmentResult, RiskLevel, RiskRequest,
};
use kyb_index::normalize::normalize;
use kyb_index::{InMemorySource, KeywordIndex, Matcher, PatternDetector};
use kyb_scoring::Scorer;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Semaphore;
use tracing::{debug, info, info_span, warn, Instrument, Span};
use uuid::Uuid;

/// Key prefix of cached classification results
pub const RESULT_PREFIX: &str = "classification/";

/// Classification and risk assessment of one business
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreeningResult {
    /// Correlation id of every event published for this screening
    pub correlation_id: String,

    /// Industry classification
    pub classification: ClassificationResult,

    /// Risk assessment, including the codes generated by the classification
    pub risk: RiskAssessmentResult,
}

/// The index in use
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexInfo {
    /// Monotonic version
    pub version: u64,
    /// SHA-256 over the snapshot
    pub fingerprint: String,
    /// Where it came from
    pub origin: IndexOrigin,
    /// Active industries
    pub industries: usize,
    /// Active industry keywords
    pub keywords: usize,
    /// Active risk keywords
    pub risk_keywords: usize,
}

impl IndexInfo {
    fn of(index: &KeywordIndex, origin: IndexOrigin) -> Self {
        Self {
            version: index.version(),
            fingerprint: index.fingerprint().to_string(),
            origin,
            industries: index.industry_count(),
            keywords: index.keyword_count(),
            risk_keywords: index.risk_keyword_count(),
        }
    }
}

/// Health report
#[derive(Debug, Clone, PartialEq)]
pub struct EngineHealth {
    /// Worst status across the engine and its modules
    pub status: HealthStatus,
    /// Status per hosted module
    pub modules: BTreeMap<String, HealthStatus>,
    /// Index in use
    pub index: IndexInfo,
    /// Disk cache counters, when a cache is configured
    pub cache: Option<CacheMetrics>,
    /// Bus counters
    pub bus: BusStats,
    /// Request counters
    pub metrics: EngineMetrics,
}

/// Assembles an [`Engine`]
///
/// Only the configuration is required. Without a source the built-in
/// reference data set is used; without a content provider or reasoning
/// strategy those strategies are skipped or reported as missing.
pub struct EngineBuilder {
    config: EngineConfig,
    source: Option<Arc<dyn KeywordSource>>,
    content: Option<Arc<dyn ContentProvider>>,
    reasoner: Option<Arc<dyn ReasoningStrategy>>,
    event_store: Option<Arc<dyn EventStore>>,
}

impl EngineBuilder {
    /// Builder over `config`
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            source: None,
            content: None,
            reasoner: None,
            event_store: None,
        }
    }

    /// Keyword source backing the index
    pub fn source(mut self, source: Arc<dyn KeywordSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Website text provider
    pub fn content_provider(mut self, provider: Arc<dyn ContentProvider>) -> Self {
        self.content = Some(provider);
        self
    }

    /// Escalation strategy for weak or ambiguous classifications
    pub fn reasoner(mut self, reasoner: Arc<dyn ReasoningStrategy>) -> Self {
        self.reasoner = Some(reasoner);
        self
    }

    /// Dead-letter store for undeliverable events
    pub fn event_store(mut self, store: Arc<dyn EventStore>) -> Self {
        self.event_store = Some(store);
        self
    }

    /// Validate, load and start everything
    ///
    /// Must run inside a tokio runtime. Fails on invalid configuration, on
    /// an empty index (unless allowed) and when no index can be loaded from
    /// the source or the cache. Pattern detectors that fail to compile are
    /// logged and left out.
    pub async fn build(self) -> Result<Engine> {
        self.config.validate()?;
        let config = Arc::new(self.config);

        let scorer = Arc::new(Scorer::new(config.scoring.clone())?);
        let (detector, pattern_errors) = PatternDetector::builtin(&config.matcher);
        for error in &pattern_errors {
            warn!(error = %error, "Pattern detector disabled");
        }

        let io = Arc::new(Semaphore::new(config.max_concurrent_io));
        let cache = match &config.cache {
            Some(cache_config) => Some(Arc::new(
                DiskCache::open_with_semaphore(cache_config.clone().with_pinned(SNAPSHOT_KEY), Arc::clone(&io))
                    .await?,
            )),
            None => None,
        };

        let source = self
            .source
            .unwrap_or_else(|| Arc::new(InMemorySource::reference()) as Arc<dyn KeywordSource>);
        let index = Arc::new(
            IndexManager::load(source, config.index.clone(), cache.clone(), Arc::clone(&io)).await?,
        );

        let has_reasoner = self.reasoner.is_some();
        let selector = ModuleSelector::new(config.router.clone(), self.content.is_some(), has_reasoner);
        let classifier = Arc::new(Classifier::new(
            Matcher::new(config.matcher.clone()),
            Arc::clone(&scorer),
            selector,
            self.reasoner,
            Arc::clone(&io),
        ));
        let risk = Arc::new(RiskDetectionService::new(
            Matcher::new(config.matcher.clone()),
            detector,
            scorer,
        ));

        let bus = CommunicationManager::new(config.bus.clone(), self.event_store)?;
        bus.register_module(Arc::new(ClassifierModule::new(
            Arc::clone(&classifier),
            Arc::clone(&index),
        )))?;
        bus.register_module(Arc::new(RiskModule::new(Arc::clone(&risk), Arc::clone(&index))))?;
        if let Some(cache) = &cache {
            bus.register_module(Arc::clone(cache) as Arc<dyn Module>)?;
        }

        info!(
            patterns = risk.detector().len(),
            pattern_errors = pattern_errors.len(),
            cache = cache.is_some(),
            content_provider = self.content.is_some(),
            reasoner = has_reasoner,
            "Engine started"
        );

        Ok(Engine {
            config,
            index,
            classifier,
            risk,
            content: self.content,
            cache,
            bus,
            io,
            metrics: Mutex::new(EngineMetrics::new()),
            shut_down: AtomicBool::new(false),
        })
    }
}

/// Business classification and risk screening
///
/// # Examples
///
/// ```no_run
/// use kyb_domain::ClassificationRequest;
/// use kyb_engine::{Engine, EngineConfig};
///
/// # async fn example() -> kyb_engine::Result<()> {
/// let engine = Engine::builder(EngineConfig::default()).build().await?;
/// let request = ClassificationRequest::new("Joe's Coffee Shop")
///     .with_description("neighborhood cafe serving espresso and pastries");
///
/// let screening = engine.screen(&request).await?;
/// println!(
///     "{} ({:.2}), risk {}",
///     screening.classification.primary_industry.name,
///     screening.classification.confidence_score,
///     screening.risk.risk_level
/// );
/// engine.shutdown().await?;
/// # Ok(())
/// # }
/// ```
pub struct Engine {
    config: Arc<EngineConfig>,
    index: Arc<IndexManager>,
    classifier: Arc<Classifier>,
    risk: Arc<RiskDetectionService>,
    content: Option<Arc<dyn ContentProvider>>,
    cache: Option<Arc<DiskCache>>,
    bus: CommunicationManager,
    io: Arc<Semaphore>,
    metrics: Mutex<EngineMetrics>,
    shut_down: AtomicBool,
}

impl Engine {
    /// Start assembling an engine
    pub fn builder(config: EngineConfig) -> EngineBuilder {
        EngineBuilder::new(config)
    }

    /// Active configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The communication manager, for subscribing to engine events
    pub fn bus(&self) -> &CommunicationManager {
        &self.bus
    }

    /// The index in use right now
    pub fn index(&self) -> Arc<KeywordIndex> {
        self.index.current()
    }

    /// Copy of the request counters
    pub fn metrics(&self) -> EngineMetrics {
        self.lock_metrics().clone()
    }

    /// Classify a business
    ///
    /// Only malformed input is an error; every strategy failure degrades the
    /// result instead.
    pub async fn classify(&self, request: &ClassificationRequest) -> Result<ClassificationResult> {
        self.ensure_running()?;
        request.validate()?;
        let correlation_id = new_correlation_id();
        let span = info_span!("classify", correlation_id = %correlation_id);
        self.classify_traced(request, &correlation_id).instrument(span).await
    }

    /// Screen a business for risk
    pub async fn assess_risk(&self, request: &RiskRequest) -> Result<RiskAssessmentResult> {
        self.ensure_running()?;
        request.validate()?;
        let correlation_id = new_correlation_id();
        let span = info_span!("assess_risk", correlation_id = %correlation_id);
        self.assess_traced(request, &correlation_id).instrument(span).await
    }

    /// Classify and screen in one pass
    ///
    /// The website is fetched once and shared. Classification and the risk
    /// text scan run concurrently; the codes generated by the classification
    /// are then checked against the restriction lists.
    pub async fn screen(&self, request: &ClassificationRequest) -> Result<ScreeningResult> {
        self.ensure_running()?;
        request.validate()?;
        let correlation_id = new_correlation_id();
        let span = info_span!("screen", correlation_id = %correlation_id);
        self.screen_traced(request, correlation_id).instrument(span).await
    }

    /// Reload the index from the source
    ///
    /// Results cached against the previous index are dropped when its
    /// contents changed. On failure the previous index stays in use.
    pub async fn refresh_index(&self) -> Result<IndexInfo> {
        self.ensure_running()?;
        let previous = self.index.current();
        let index = self.index.refresh().await?;
        self.index_swapped(&previous, &index).await;
        Ok(IndexInfo::of(&index, self.index.origin()))
    }

    /// Move one keyword's weight by `delta`, clamped to [0, 1]
    pub async fn adjust_keyword_weight(&self, target: &MatchTarget, delta: f64) -> Result<IndexInfo> {
        self.ensure_running()?;
        let previous = self.index.current();
        let index = self.index.adjust_weight(target, delta)?;
        self.index_swapped(&previous, &index).await;
        Ok(IndexInfo::of(&index, IndexOrigin::Adjusted))
    }

    /// Health of the engine and its modules
    pub fn health(&self) -> EngineHealth {
        let index = self.index.current();
        let modules = self.bus.health();
        let status = if self.shut_down.load(Ordering::SeqCst) {
            HealthStatus::Unhealthy
        } else {
            match self.bus.overall_health() {
                HealthStatus::Healthy if self.index.origin() == IndexOrigin::Cache => HealthStatus::Degraded,
                other => other,
            }
        };
        EngineHealth {
            status,
            modules,
            index: IndexInfo::of(&index, self.index.origin()),
            cache: self.cache.as_ref().map(|c| c.metrics()),
            bus: self.bus.stats(),
            metrics: self.metrics(),
        }
    }

    /// Stop the bus and persist the cache
    ///
    /// Returns `true` when in-flight events drained within the grace period.
    /// Later calls return `Ok(true)` without doing anything.
    pub async fn shutdown(&self) -> Result<bool> {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return Ok(true);
        }
        let drained = self.bus.shutdown().await;
        if let Some(cache) = &self.cache {
            cache.close().await?;
        }
        info!(drained, "Engine stopped");
        debug!("{}", self.metrics().summary());
        Ok(drained)
    }

    async fn classify_traced(
        &self,
        request: &ClassificationRequest,
        correlation_id: &str,
    ) -> Result<ClassificationResult> {
        let index = self.index.current();
        let key = result_key(index.fingerprint(), request);

        if let Some(result) = self.cached_result(&key).await {
            debug!(key = %key, "Classification served from cache");
            self.lock_metrics().record_classification(&result, true);
            let event = events::classification_completed(ENGINE_SOURCE, &request.business_name, &result)
                .with_data("cached", true);
            self.publish(event, correlation_id).await;
            return Ok(result);
        }

        let plan = self.classifier.selector().plan(request.website(), false);
        let content = self.fetch_content(plan.content, request.website()).await;
        let result = self.classifier.classify(request, &index, plan, &content).await;

        self.store_result(&key, &result).await;
        self.finish_classification(request, &result, correlation_id).await;
        Ok(result)
    }

    async fn assess_traced(&self, request: &RiskRequest, correlation_id: &str) -> Result<RiskAssessmentResult> {
        let index = self.index.current();
        let website = request
            .website_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty());
        let plan = self.classifier.selector().plan(website, true);
        let content = self.fetch_content(plan.content, website).await;
        let result = self.risk.assess(request, &index, &content);
        self.finish_risk(&request.business_name, &result, correlation_id).await;
        Ok(result)
    }

    async fn screen_traced(&self, request: &ClassificationRequest, correlation_id: String) -> Result<ScreeningResult> {
        let index = self.index.current();
        let plan = self.classifier.selector().plan(request.website(), true);
        let content = Arc::new(self.fetch_content(plan.content, request.website()).await);

        // fan out: classification on a task, the risk scan on the blocking pool
        let classify_task = {
            let classifier = Arc::clone(&self.classifier);
            let index = Arc::clone(&index);
            let content = Arc::clone(&content);
            let request = request.clone();
            tokio::spawn(
                async move { classifier.classify(&request, &index, plan, &content).await }
                    .instrument(Span::current()),
            )
        };
        let scan_task = {
            let risk = Arc::clone(&self.risk);
            let index = Arc::clone(&index);
            let content = Arc::clone(&content);
            let risk_request = RiskRequest::from(request);
            let span = Span::current();
            tokio::task::spawn_blocking(move || {
                let _entered = span.enter();
                risk.scan(&risk_request, &index, &content)
            })
        };

        let (classification, scan) = tokio::join!(classify_task, scan_task);
        let classification = classification.map_err(|e| EngineError::Worker(format!("classification: {}", e)))?;
        let scan = scan.map_err(|e| EngineError::Worker(format!("risk scan: {}", e)))?;
        let risk = self
            .risk
            .finish(scan, &classification.codes.pairs(), &index);

        self.lock_metrics().record_screening();
        self.finish_classification(request, &classification, &correlation_id)
            .await;
        self.finish_risk(&request.business_name, &risk, &correlation_id)
            .await;

        Ok(ScreeningResult {
            correlation_id,
            classification,
            risk,
        })
    }

    async fn fetch_content(&self, route: ContentRoute, url: Option<&str>) -> ContentOutcome {
        match route {
            ContentRoute::Skip => ContentOutcome::Absent,
            ContentRoute::Missing => ContentOutcome::Degraded("no content provider configured".to_string()),
            ContentRoute::Fetch => {
                strategies::fetch_content(
                    self.content.as_ref(),
                    url,
                    &self.io,
                    self.config.router.content_timeout(),
                )
                .await
            }
        }
    }

    async fn finish_classification(
        &self,
        request: &ClassificationRequest,
        result: &ClassificationResult,
        correlation_id: &str,
    ) {
        self.lock_metrics().record_classification(result, false);
        info!(
            industry = %result.primary_industry.name,
            confidence = result.confidence_score,
            degraded = result.degraded.len(),
            "Classification completed"
        );
        self.publish_degraded(&result.degraded, correlation_id).await;
        let event = events::classification_completed(ENGINE_SOURCE, &request.business_name, result);
        self.publish(event, correlation_id).await;
    }

    async fn finish_risk(&self, business_name: &str, result: &RiskAssessmentResult, correlation_id: &str) {
        self.lock_metrics().record_risk(result);
        info!(
            level = result.risk_level.as_str(),
            score = result.overall_score,
            restricted = result.restricted_codes.len(),
            "Risk assessment completed"
        );
        self.publish_degraded(&result.degraded, correlation_id).await;
        self.publish(events::risk_completed(ENGINE_SOURCE, business_name, result), correlation_id)
            .await;
        if result.risk_level >= RiskLevel::High {
            warn!(level = result.risk_level.as_str(), "High risk detected");
            self.publish(events::high_risk_detected(ENGINE_SOURCE, business_name, result), correlation_id)
                .await;
        }
    }

    async fn publish_degraded(&self, degraded: &[DegradedStrategy], correlation_id: &str) {
        for d in degraded {
            self.publish(events::strategy_degraded(ENGINE_SOURCE, d), correlation_id)
                .await;
        }
    }

    async fn publish(&self, event: Event, correlation_id: &str) {
        let event = event.with_correlation(correlation_id, correlation_id);
        let event_type = event.event_type.clone();
        if let Err(e) = self.bus.publish(event).await {
            warn!(event_type = %event_type, error = %e, "Failed to publish event");
        }
    }

    async fn index_swapped(&self, previous: &KeywordIndex, index: &KeywordIndex) {
        self.lock_metrics().record_index_swap();
        if previous.fingerprint() != index.fingerprint() {
            if let Some(cache) = &self.cache {
                let removed = cache.invalidate_prefix(&format!("{}{}/", RESULT_PREFIX, previous.fingerprint()));
                debug!(removed, "Dropped results cached against the previous index");
            }
        }
        self.publish(
            events::index_reloaded(ENGINE_SOURCE, index, previous.fingerprint()),
            &new_correlation_id(),
        )
        .await;
    }

    async fn cached_result(&self, key: &str) -> Option<ClassificationResult> {
        if !self.config.router.cache_results {
            return None;
        }
        let cache = self.cache.as_ref()?;
        match cache.get_json::<ClassificationResult>(key).await {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, "Cached classification unreadable");
                None
            }
        }
    }

    async fn store_result(&self, key: &str, result: &ClassificationResult) {
        if !self.config.router.cache_results || !result.degraded.is_empty() {
            return;
        }
        let Some(cache) = &self.cache else {
            return;
        };
        let bytes = match serde_json::to_vec(result) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "Failed to encode classification");
                return;
            }
        };
        let ttl = self
            .config
            .router
            .result_ttl()
            .or_else(|| cache.config().default_ttl());
        if let Err(e) = cache.put_with_ttl(key, &bytes, ttl).await {
            warn!(error = %e, "Failed to cache classification");
        }
    }

    fn ensure_running(&self) -> Result<()> {
        if self.shut_down.load(Ordering::SeqCst) {
            Err(EngineError::ShutDown)
        } else {
            Ok(())
        }
    }

    fn lock_metrics(&self) -> MutexGuard<'_, EngineMetrics> {
        self.metrics.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn new_correlation_id() -> String {
    Uuid::now_v7().to_string()
}

/// Cache key of a classification: index fingerprint plus a digest of the
/// normalized request
fn result_key(fingerprint: &str, request: &ClassificationRequest) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize(&request.business_name).as_bytes());
    hasher.update([0u8]);
    if let Some(description) = &request.description {
        hasher.update(normalize(description).as_bytes());
    }
    hasher.update([0u8]);
    if let Some(url) = request.website() {
        hasher.update(url.trim().to_ascii_lowercase().as_bytes());
    }
    format!("{}{}/{}", RESULT_PREFIX, fingerprint, hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_key_normalizes_request() {
        let a = ClassificationRequest::new("Joe's Coffee Shop").with_description("Espresso  BAR");
        let b = ClassificationRequest::new("  joe's coffee shop ").with_description("espresso bar");
        let c = ClassificationRequest::new("Joe's Coffee Shop");

        assert_eq!(result_key("abc", &a), result_key("abc", &b));
        assert_ne!(result_key("abc", &a), result_key("abc", &c));
        assert_ne!(result_key("abc", &a), result_key("def", &a));
        assert!(result_key("abc", &a).starts_with("classification/abc/"));
    }

    #[test]
    fn test_description_and_name_do_not_collide() {
        let a = ClassificationRequest::new("coffee").with_description("shop");
        let b = ClassificationRequest::new("coffee shop");
        assert_ne!(result_key("abc", &a), result_key("abc", &b));
    }
}
