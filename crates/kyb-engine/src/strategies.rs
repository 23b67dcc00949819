//! Running collaborator strategies, and deterministic stand-ins for them
//!
//! Content providers and reasoning strategies may block. They run on the
//! blocking pool, under the engine's I/O semaphore and a per-call timeout,
//! and every failure comes back as a [`StrategyError`].

use kyb_domain::traits::{
    ContentProvider, ReasoningInput, ReasoningOutcome, ReasoningStrategy, StrategyError,
};
use kyb_domain::IndustryId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::Semaphore;

/// Website text as seen by the classifier and the risk service
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentOutcome {
    /// No website on the request
    Absent,
    /// Extracted text
    Text(String),
    /// A website was given but no text could be obtained
    Degraded(String),
}

impl ContentOutcome {
    /// Extracted text, if any
    pub fn text(&self) -> Option<&str> {
        match self {
            ContentOutcome::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Failure reason, if degraded
    pub fn degraded_reason(&self) -> Option<&str> {
        match self {
            ContentOutcome::Degraded(reason) => Some(reason),
            _ => None,
        }
    }
}

/// Run a blocking collaborator call with an I/O permit and a deadline
///
/// The permit travels with the blocking task, so a call that outlives its
/// deadline still counts against the I/O bound until it returns.
pub(crate) async fn run_blocking<T, F>(
    io: &Arc<Semaphore>,
    timeout: Duration,
    call: F,
) -> Result<T, StrategyError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, StrategyError> + Send + 'static,
{
    let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
    let deadline = tokio::time::Instant::now() + timeout;

    let permit = tokio::time::timeout_at(deadline, Arc::clone(io).acquire_owned())
        .await
        .map_err(|_| StrategyError::Timeout(timeout_ms))?
        .map_err(|_| StrategyError::Unavailable("I/O pool closed".to_string()))?;

    let task = tokio::task::spawn_blocking(move || {
        let _permit = permit;
        call()
    });

    match tokio::time::timeout_at(deadline, task).await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => Err(StrategyError::Unavailable(format!("strategy task failed: {}", e))),
        Err(_) => Err(StrategyError::Timeout(timeout_ms)),
    }
}

/// Fetch website text for `url`, never failing
pub(crate) async fn fetch_content(
    provider: Option<&Arc<dyn ContentProvider>>,
    url: Option<&str>,
    io: &Arc<Semaphore>,
    timeout: Duration,
) -> ContentOutcome {
    let Some(url) = url else {
        return ContentOutcome::Absent;
    };
    let Some(provider) = provider else {
        return ContentOutcome::Degraded("no content provider configured".to_string());
    };

    let provider = Arc::clone(provider);
    let url = url.to_string();
    match run_blocking(io, timeout, move || provider.fetch_text(&url)).await {
        Ok(text) if text.trim().is_empty() => {
            ContentOutcome::Degraded("website returned no text".to_string())
        }
        Ok(text) => ContentOutcome::Text(text),
        Err(e) => ContentOutcome::Degraded(e.to_string()),
    }
}

/// Content provider serving fixed pages
///
/// Unknown URLs answer `Unavailable`. An optional delay simulates a slow
/// site.
///
/// # Examples
///
/// ```
/// use kyb_domain::traits::ContentProvider;
/// use kyb_engine::StaticContentProvider;
///
/// let provider = StaticContentProvider::new()
///     .with_page("https://joes.test", "Fresh espresso every morning");
/// assert_eq!(provider.fetch_text("https://joes.test").unwrap(), "Fresh espresso every morning");
/// assert!(provider.fetch_text("https://other.test").is_err());
/// ```
#[derive(Debug, Clone, Default)]
pub struct StaticContentProvider {
    pages: HashMap<String, String>,
    delay: Option<Duration>,
    calls: Arc<AtomicUsize>,
}

impl StaticContentProvider {
    /// Provider with no pages
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `text` for `url`
    pub fn with_page(mut self, url: impl Into<String>, text: impl Into<String>) -> Self {
        self.pages.insert(url.into(), text.into());
        self
    }

    /// Sleep before every answer
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of fetches so far
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ContentProvider for StaticContentProvider {
    fn fetch_text(&self, url: &str) -> Result<String, StrategyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        self.pages
            .get(url)
            .cloned()
            .ok_or_else(|| StrategyError::Unavailable(format!("no page for {}", url)))
    }
}

/// Reasoning strategy with scripted answers
///
/// Answers by business name first, then falls back to the default answer,
/// then to `Unavailable`.
#[derive(Debug, Clone, Default)]
pub struct MockReasoner {
    default: Option<ReasoningOutcome>,
    answers: Arc<Mutex<HashMap<String, ReasoningOutcome>>>,
    delay: Option<Duration>,
    calls: Arc<AtomicUsize>,
}

impl MockReasoner {
    /// Reasoner that always picks `industry_id`
    pub fn new(industry_id: u32, confidence: f64, rationale: impl Into<String>) -> Self {
        Self {
            default: Some(ReasoningOutcome {
                industry_id: IndustryId(industry_id),
                confidence,
                rationale: rationale.into(),
            }),
            ..Self::default()
        }
    }

    /// Reasoner that is never reachable
    pub fn unavailable() -> Self {
        Self::default()
    }

    /// Answer for one business name
    pub fn add_answer(&self, business_name: impl Into<String>, industry_id: u32, confidence: f64) {
        self.answers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                business_name.into(),
                ReasoningOutcome {
                    industry_id: IndustryId(industry_id),
                    confidence,
                    rationale: "scripted answer".to_string(),
                },
            );
    }

    /// Sleep before every answer
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of calls so far
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ReasoningStrategy for MockReasoner {
    fn name(&self) -> &str {
        "mock_reasoner"
    }

    fn classify(&self, input: &ReasoningInput) -> Result<ReasoningOutcome, StrategyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        let scripted = self
            .answers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&input.business_name)
            .cloned();
        scripted
            .or_else(|| self.default.clone())
            .ok_or_else(|| StrategyError::Unavailable("reasoner offline".to_string()))
    }
}
