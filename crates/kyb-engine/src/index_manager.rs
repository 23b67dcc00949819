//! Loading, caching and refreshing the keyword index
//!
//! Readers take an `Arc<KeywordIndex>` and keep it for the whole request;
//! refreshes build a new index and swap the pointer, so no index is ever
//! mutated in place.

use crate::config::IndexLoadConfig;
use crate::error::{EngineError, Result};
use kyb_cache::DiskCache;
use kyb_domain::traits::KeywordSource;
use kyb_domain::MatchTarget;
use kyb_index::{IndexError, IndexSnapshot, KeywordIndex};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// Disk cache key of the last good snapshot
pub const SNAPSHOT_KEY: &str = "index/snapshot";

/// Where the current index came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOrigin {
    /// Read from the keyword source
    Source,
    /// Source unreachable; restored from the disk cache
    Cache,
    /// Derived from the previous index by a weight adjustment
    Adjusted,
}

/// Owns the current index
pub struct IndexManager {
    source: Arc<dyn KeywordSource>,
    config: IndexLoadConfig,
    cache: Option<Arc<DiskCache>>,
    io: Arc<Semaphore>,
    current: RwLock<(Arc<KeywordIndex>, IndexOrigin)>,
    next_version: AtomicU64,
}

impl IndexManager {
    /// Load the first index
    ///
    /// Retries the source with backoff, then falls back to the cached
    /// snapshot. Fails with `SourceUnavailable` when neither works.
    pub async fn load(
        source: Arc<dyn KeywordSource>,
        config: IndexLoadConfig,
        cache: Option<Arc<DiskCache>>,
        io: Arc<Semaphore>,
    ) -> Result<Self> {
        let manager = Self {
            source,
            config,
            cache,
            io,
            current: RwLock::new((Arc::new(KeywordIndex::empty()), IndexOrigin::Source)),
            next_version: AtomicU64::new(1),
        };
        let (index, origin) = match manager.load_from_source().await {
            Ok(snapshot) => {
                manager.store_snapshot(&snapshot).await;
                (manager.build(snapshot), IndexOrigin::Source)
            }
            Err(source_error) => match manager.cached_snapshot().await {
                Some(snapshot) => {
                    warn!(error = %source_error, "Source unavailable, using cached index snapshot");
                    (manager.build(snapshot), IndexOrigin::Cache)
                }
                None => return Err(source_error.into()),
            },
        };
        manager.check_usable(&index)?;
        manager.swap(index, origin, None)?;
        Ok(manager)
    }

    /// The index in use right now
    pub fn current(&self) -> Arc<KeywordIndex> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner).0)
    }

    /// Where the index in use came from
    pub fn origin(&self) -> IndexOrigin {
        self.current.read().unwrap_or_else(PoisonError::into_inner).1
    }

    /// Reload from the source and swap the index in
    ///
    /// Only the source is consulted; the cached snapshot is a startup
    /// fallback. On failure the previous index stays in place, and so does
    /// an index that changed while the source was being read (`Superseded`).
    pub async fn refresh(&self) -> Result<Arc<KeywordIndex>> {
        let base = self.current().version();
        let snapshot = self.load_from_source().await?;
        let index = self.build(snapshot.clone());
        self.check_usable(&index)?;
        let installed = self.swap(index, IndexOrigin::Source, Some(base))?;
        self.store_snapshot(&snapshot).await;
        Ok(installed)
    }

    /// Move one keyword's weight and swap in the resulting index
    pub fn adjust_weight(&self, target: &MatchTarget, delta: f64) -> Result<Arc<KeywordIndex>> {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let adjusted = current.0.adjust_weight(target, delta)?;
        self.next_version.fetch_max(adjusted.version() + 1, Ordering::SeqCst);
        let adjusted = Arc::new(adjusted);
        *current = (Arc::clone(&adjusted), IndexOrigin::Adjusted);
        info!(keyword = %target, delta, version = adjusted.version(), "Keyword weight adjusted");
        Ok(adjusted)
    }

    fn build(&self, snapshot: IndexSnapshot) -> KeywordIndex {
        KeywordIndex::build(snapshot, self.next_version.fetch_add(1, Ordering::SeqCst))
    }

    fn check_usable(&self, index: &KeywordIndex) -> Result<()> {
        if index.keyword_count() == 0 && !self.config.allow_empty {
            return Err(EngineError::ConfigInvalid(
                "keyword index has no industry keywords".to_string(),
            ));
        }
        Ok(())
    }

    /// Install `index`; with `expected`, only over the index of that version
    fn swap(&self, index: KeywordIndex, origin: IndexOrigin, expected: Option<u64>) -> Result<Arc<KeywordIndex>> {
        let index = Arc::new(index);
        {
            let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
            if let Some(expected) = expected {
                let now = current.0.version();
                if now != expected || index.version() <= now {
                    warn!(
                        expected,
                        current = now,
                        loaded = index.version(),
                        "Index changed during refresh, keeping the newer one"
                    );
                    return Err(EngineError::Superseded(now));
                }
            }
            *current = (Arc::clone(&index), origin);
        }
        for error in index.compile_errors() {
            warn!(error = %error, "Skipped uncompilable keyword pattern");
        }
        info!(
            version = index.version(),
            fingerprint = %index.fingerprint(),
            industries = index.industry_count(),
            keywords = index.keyword_count(),
            risk_keywords = index.risk_keyword_count(),
            origin = ?origin,
            "Keyword index installed"
        );
        Ok(index)
    }

    async fn load_from_source(&self) -> std::result::Result<IndexSnapshot, IndexError> {
        let mut attempt = 1;
        loop {
            let result = self.load_once().await;
            match result {
                Ok(snapshot) => return Ok(snapshot),
                Err(IndexError::SourceUnavailable(msg)) if attempt < self.config.max_attempts => {
                    let delay = self.config.backoff_for(attempt);
                    warn!(attempt, delay_ms = delay.as_millis() as u64, error = %msg, "Index load failed, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn load_once(&self) -> std::result::Result<IndexSnapshot, IndexError> {
        let _permit = Arc::clone(&self.io)
            .acquire_owned()
            .await
            .map_err(|_| IndexError::SourceUnavailable("I/O pool closed".to_string()))?;
        let source = Arc::clone(&self.source);
        tokio::task::spawn_blocking(move || IndexSnapshot::load(source.as_ref()))
            .await
            .map_err(|e| IndexError::SourceUnavailable(format!("load task failed: {}", e)))?
    }

    async fn store_snapshot(&self, snapshot: &IndexSnapshot) {
        if !self.config.cache_snapshot {
            return;
        }
        let Some(cache) = &self.cache else {
            return;
        };
        let bytes = match serde_json::to_vec(snapshot) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "Failed to encode index snapshot");
                return;
            }
        };
        match cache.put_with_ttl(SNAPSHOT_KEY, &bytes, None).await {
            Ok(()) => debug!(bytes = bytes.len(), "Index snapshot cached"),
            Err(e) => warn!(error = %e, "Failed to cache index snapshot"),
        }
    }

    async fn cached_snapshot(&self) -> Option<IndexSnapshot> {
        let cache = self.cache.as_ref()?;
        match cache.get_json::<IndexSnapshot>(SNAPSHOT_KEY).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "Cached index snapshot unreadable");
                None
            }
        }
    }
}
