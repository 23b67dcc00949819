//! Engine configuration
//!
//! One immutable struct, loaded once at startup and shared by `Arc`. Every
//! section falls back to its defaults when omitted.
//!
//! ```toml
//! max_concurrent_io = 5
//!
//! [router]
//! escalation_threshold = 0.6
//! ambiguity_gap = 0.05
//!
//! [index]
//! max_attempts = 3
//!
//! [cache]
//! dir = "/var/cache/kyb"
//! policy = "lfu"
//!
//! [bus]
//! workers = 8
//! backpressure = "block"
//! ```

use crate::error::{EngineError, Result};
use kyb_bus::BusConfig;
use kyb_cache::CacheConfig;
use kyb_index::MatcherConfig;
use kyb_scoring::ScoringConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Strategy selection and escalation settings
///
/// # Examples
///
/// ```
/// use kyb_engine::RouterConfig;
///
/// let config = RouterConfig::default();
/// assert_eq!(config.escalation_threshold, 0.6);
/// assert_eq!(config.ambiguity_gap, 0.05);
/// assert_eq!(config.escalation_weight, 0.9);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Escalate when the best candidate is below this confidence
    /// Default: 0.6
    pub escalation_threshold: f64,

    /// Escalate when the top two candidates are within this gap
    /// Default: 0.05
    pub ambiguity_gap: f64,

    /// Weight of the reasoning confidence when merging an escalation
    /// Default: 0.9
    pub escalation_weight: f64,

    /// Confidence penalty per missing or failed strategy
    /// Default: 0.05
    pub degradation_penalty: f64,

    /// Budget for one website content fetch
    /// Default: 5000 ms
    pub content_timeout_ms: u64,

    /// Budget for one escalation call
    /// Default: 10000 ms
    pub escalation_timeout_ms: u64,

    /// Cache classification results in the disk cache
    /// Default: true
    pub cache_results: bool,

    /// TTL of cached results in seconds; `None` uses the cache default
    pub result_ttl_secs: Option<u64>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            escalation_threshold: 0.6,
            ambiguity_gap: 0.05,
            escalation_weight: 0.9,
            degradation_penalty: 0.05,
            content_timeout_ms: 5_000,
            escalation_timeout_ms: 10_000,
            cache_results: true,
            result_ttl_secs: None,
        }
    }
}

impl RouterConfig {
    /// Escalate less often and give collaborators less time
    pub fn fast() -> Self {
        Self {
            escalation_threshold: 0.4,
            ambiguity_gap: 0.02,
            content_timeout_ms: 1_500,
            escalation_timeout_ms: 3_000,
            ..Self::default()
        }
    }

    /// Escalate more readily and wait longer for answers
    pub fn thorough() -> Self {
        Self {
            escalation_threshold: 0.75,
            ambiguity_gap: 0.1,
            content_timeout_ms: 15_000,
            escalation_timeout_ms: 30_000,
            ..Self::default()
        }
    }

    /// Content fetch budget as a Duration
    pub fn content_timeout(&self) -> Duration {
        Duration::from_millis(self.content_timeout_ms)
    }

    /// Escalation budget as a Duration
    pub fn escalation_timeout(&self) -> Duration {
        Duration::from_millis(self.escalation_timeout_ms)
    }

    /// Result TTL as a Duration
    pub fn result_ttl(&self) -> Option<Duration> {
        self.result_ttl_secs.map(Duration::from_secs)
    }

    /// Validate ranges
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("escalation_threshold", self.escalation_threshold),
            ("ambiguity_gap", self.ambiguity_gap),
            ("escalation_weight", self.escalation_weight),
            ("degradation_penalty", self.degradation_penalty),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(EngineError::ConfigInvalid(format!(
                    "router.{} must be in [0, 1], got {}",
                    name, value
                )));
            }
        }
        if self.content_timeout_ms == 0 || self.escalation_timeout_ms == 0 {
            return Err(EngineError::ConfigInvalid(
                "router timeouts must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Index loading and retry settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexLoadConfig {
    /// Attempts against the source before falling back to the cache
    /// Default: 3
    pub max_attempts: u32,

    /// Delay before the second attempt; doubles per attempt
    /// Default: 100 ms
    pub initial_backoff_ms: u64,

    /// Upper bound on the retry delay
    /// Default: 2000 ms
    pub max_backoff_ms: u64,

    /// Keep a copy of the last good snapshot in the disk cache
    /// Default: true
    pub cache_snapshot: bool,

    /// Accept an index with no industry keywords at startup
    /// Default: false
    pub allow_empty: bool,
}

impl Default for IndexLoadConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 100,
            max_backoff_ms: 2_000,
            cache_snapshot: true,
            allow_empty: false,
        }
    }
}

impl IndexLoadConfig {
    /// Delay after failed attempt `attempt` (1-based)
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(20);
        Duration::from_millis(
            self.initial_backoff_ms
                .saturating_mul(factor)
                .min(self.max_backoff_ms),
        )
    }

    /// Validate attempt count and delays
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(EngineError::ConfigInvalid(
                "index.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.initial_backoff_ms > self.max_backoff_ms {
            return Err(EngineError::ConfigInvalid(format!(
                "index.initial_backoff_ms ({}) exceeds max_backoff_ms ({})",
                self.initial_backoff_ms, self.max_backoff_ms
            )));
        }
        Ok(())
    }
}

/// Complete engine configuration
///
/// # Examples
///
/// ```
/// use kyb_engine::EngineConfig;
///
/// let config = EngineConfig::from_toml(r#"
///     max_concurrent_io = 3
///
///     [router]
///     escalation_threshold = 0.5
/// "#).unwrap();
///
/// assert_eq!(config.max_concurrent_io, 3);
/// assert_eq!(config.router.escalation_threshold, 0.5);
/// assert_eq!(config.router.ambiguity_gap, 0.05);
/// assert!(config.cache.is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Matcher and pattern library
    pub matcher: MatcherConfig,

    /// Confidence and risk aggregation
    pub scoring: ScoringConfig,

    /// Strategy selection and escalation
    pub router: RouterConfig,

    /// Index loading
    pub index: IndexLoadConfig,

    /// Disk cache; no cache when absent
    pub cache: Option<CacheConfig>,

    /// Event and message buses
    pub bus: BusConfig,

    /// Concurrent disk and network operations across the engine
    /// Default: 5
    pub max_concurrent_io: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            matcher: MatcherConfig::default(),
            scoring: ScoringConfig::default(),
            router: RouterConfig::default(),
            index: IndexLoadConfig::default(),
            cache: None,
            bus: BusConfig::default(),
            max_concurrent_io: 5,
        }
    }
}

impl EngineConfig {
    /// Defaults with a disk cache rooted at `dir`
    pub fn with_cache_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            cache: Some(CacheConfig::new(dir)),
            ..Self::default()
        }
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: EngineConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate every section
    pub fn validate(&self) -> Result<()> {
        self.matcher
            .validate()
            .map_err(|e| EngineError::ConfigInvalid(format!("matcher: {}", e)))?;
        self.scoring.validate()?;
        self.router.validate()?;
        self.index.validate()?;
        if let Some(cache) = &self.cache {
            cache
                .validate()
                .map_err(|e| EngineError::ConfigInvalid(format!("cache: {}", e)))?;
        }
        self.bus
            .validate()
            .map_err(|e| EngineError::ConfigInvalid(format!("bus: {}", e)))?;
        if self.max_concurrent_io == 0 {
            return Err(EngineError::ConfigInvalid(
                "max_concurrent_io must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
