//! Configuration for the disk cache

use crate::error::CacheError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Which entry to evict when a cap is exceeded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictionPolicy {
    /// Least recently used
    #[default]
    Lru,
    /// Least frequently used; ties go to the least recently used
    Lfu,
}

/// Configuration for [`DiskCache`](crate::DiskCache)
///
/// # Examples
///
/// ```
/// use kyb_cache::{CacheConfig, EvictionPolicy};
///
/// let config = CacheConfig::default();
/// assert_eq!(config.policy, EvictionPolicy::Lru);
/// assert_eq!(config.max_entries, 10_000);
///
/// let small = CacheConfig::small("/tmp/kyb-cache");
/// assert!(small.max_bytes < config.max_bytes);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Directory holding entry files and the index snapshot
    pub dir: PathBuf,

    /// Maximum number of live entries
    /// Default: 10,000
    pub max_entries: usize,

    /// Maximum total size of entry files in bytes
    /// Default: 256 MiB
    pub max_bytes: u64,

    /// Eviction policy
    /// Default: LRU
    pub policy: EvictionPolicy,

    /// TTL applied by `put` when none is given, in seconds; `None` keeps
    /// entries until evicted
    /// Default: 1 hour
    pub default_ttl_secs: Option<u64>,

    /// Concurrent file operations when the cache owns its semaphore
    /// Default: 5
    pub max_concurrent_io: usize,

    /// Key prefixes exempt from eviction; pinned entries still count toward
    /// the caps and still honour their TTL
    /// Default: none
    pub pinned_prefixes: Vec<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(".kyb-cache"),
            max_entries: 10_000,
            max_bytes: 256 * 1024 * 1024,
            policy: EvictionPolicy::Lru,
            default_ttl_secs: Some(3600),
            max_concurrent_io: 5,
            pinned_prefixes: Vec::new(),
        }
    }
}

impl CacheConfig {
    /// Default configuration rooted at `dir`
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            ..Self::default()
        }
    }

    /// Small caps, for tests and embedded use
    pub fn small(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            max_entries: 64,
            max_bytes: 1024 * 1024,
            ..Self::default()
        }
    }

    /// Set the eviction policy
    pub fn with_policy(mut self, policy: EvictionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Set both caps
    pub fn with_caps(mut self, max_entries: usize, max_bytes: u64) -> Self {
        self.max_entries = max_entries;
        self.max_bytes = max_bytes;
        self
    }

    /// Exempt keys starting with `prefix` from eviction
    pub fn with_pinned(mut self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        if !self.pinned_prefixes.contains(&prefix) {
            self.pinned_prefixes.push(prefix);
        }
        self
    }

    /// True when `key` is exempt from eviction
    pub fn is_pinned(&self, key: &str) -> bool {
        self.pinned_prefixes.iter().any(|p| key.starts_with(p.as_str()))
    }

    /// Default TTL as a Duration
    pub fn default_ttl(&self) -> Option<Duration> {
        self.default_ttl_secs.map(Duration::from_secs)
    }

    /// Validate caps
    pub fn validate(&self) -> Result<(), CacheError> {
        if self.max_entries == 0 {
            return Err(CacheError::InvalidConfig("max_entries must be at least 1".to_string()));
        }
        if self.max_bytes == 0 {
            return Err(CacheError::InvalidConfig("max_bytes must be at least 1".to_string()));
        }
        if self.max_concurrent_io == 0 {
            return Err(CacheError::InvalidConfig(
                "max_concurrent_io must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CacheConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.default_ttl(), Some(Duration::from_secs(3600)));
        assert_eq!(config.max_concurrent_io, 5);
    }

    #[test]
    fn test_builders() {
        let config = CacheConfig::new("/var/cache/kyb")
            .with_policy(EvictionPolicy::Lfu)
            .with_caps(3, 1000);
        assert_eq!(config.policy, EvictionPolicy::Lfu);
        assert_eq!(config.max_entries, 3);
        assert_eq!(config.max_bytes, 1000);
    }

    #[test]
    fn test_pinned_prefixes() {
        let config = CacheConfig::default().with_pinned("index/").with_pinned("index/");
        assert_eq!(config.pinned_prefixes, vec!["index/".to_string()]);
        assert!(config.is_pinned("index/snapshot"));
        assert!(!config.is_pinned("classification/abc"));
    }

    #[test]
    fn test_zero_caps_rejected() {
        assert!(CacheConfig::default().with_caps(0, 10).validate().is_err());
        assert!(CacheConfig::default().with_caps(10, 0).validate().is_err());
    }

    #[test]
    fn test_policy_serde() {
        let policy: EvictionPolicy = serde_json::from_str("\"lfu\"").unwrap();
        assert_eq!(policy, EvictionPolicy::Lfu);
    }
}
