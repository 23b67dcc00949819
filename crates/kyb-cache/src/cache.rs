//! Bounded on-disk cache with LRU/LFU eviction
//!
//! One file per entry, named by the SHA-256 of the key. The in-memory index
//! sits behind a single `RwLock` that is only ever held for bookkeeping; file
//! I/O happens outside it, bounded by a semaphore.

use crate::config::{CacheConfig, EvictionPolicy};
use crate::entry::{decode, encode, encoded_len, file_name_for, CacheEntry, ENTRY_EXTENSION};
use crate::error::{CacheError, Result};
use crate::metrics::CacheMetrics;
use kyb_domain::event::now_millis;
use lru::LruCache;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// Name of the persisted index snapshot
pub const INDEX_FILE: &str = "index.json";

const INDEX_FORMAT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct PersistedIndex {
    version: u32,
    entries: Vec<CacheEntry>,
}

/// In-memory index: entries, access order, byte total
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    order: LruCache<String, ()>,
    total_bytes: u64,
}

impl CacheState {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
            order: LruCache::unbounded(),
            total_bytes: 0,
        }
    }

    fn insert(&mut self, entry: CacheEntry) {
        self.total_bytes += entry.size;
        self.order.put(entry.key.clone(), ());
        if let Some(old) = self.entries.insert(entry.key.clone(), entry) {
            self.total_bytes = self.total_bytes.saturating_sub(old.size);
        }
    }

    fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        self.order.pop(key);
        self.total_bytes = self.total_bytes.saturating_sub(entry.size);
        Some(entry)
    }

    fn over_caps(&self, config: &CacheConfig) -> bool {
        self.entries.len() > config.max_entries || self.total_bytes > config.max_bytes
    }

    /// Next entry to evict, skipping keys for which `spared` holds
    fn pick_victim(&self, policy: EvictionPolicy, spared: impl Fn(&str) -> bool) -> Option<String> {
        match policy {
            EvictionPolicy::Lru => self
                .order
                .iter()
                .rev()
                .map(|(key, _)| key)
                .find(|key| !spared(key))
                .cloned(),
            EvictionPolicy::Lfu => self
                .entries
                .values()
                .filter(|e| !spared(&e.key))
                .min_by(|a, b| {
                    (a.access_count, a.last_accessed, &a.key)
                        .cmp(&(b.access_count, b.last_accessed, &b.key))
                })
                .map(|e| e.key.clone()),
        }
    }

    /// Evict until both caps hold; returns the removed entries
    ///
    /// `protect` and pinned keys are never evicted, so the caps can stay
    /// exceeded when only those are left.
    fn enforce_caps(&mut self, config: &CacheConfig, protect: &str) -> Vec<CacheEntry> {
        let mut victims = Vec::new();
        while self.over_caps(config) {
            let Some(victim) = self.pick_victim(config.policy, |key| key == protect || config.is_pinned(key)) else {
                break;
            };
            if let Some(entry) = self.remove(&victim) {
                victims.push(entry);
            }
        }
        victims
    }
}

fn read_lock(state: &RwLock<CacheState>) -> RwLockReadGuard<'_, CacheState> {
    state.read().unwrap_or_else(PoisonError::into_inner)
}

fn write_lock(state: &RwLock<CacheState>) -> RwLockWriteGuard<'_, CacheState> {
    state.write().unwrap_or_else(PoisonError::into_inner)
}

/// Delete entry files whose keys are no longer indexed
async fn delete_unindexed(
    state: &RwLock<CacheState>,
    dir: &Path,
    io: &Semaphore,
    files: Vec<(String, String)>,
) {
    for (key, file_name) in files {
        if read_lock(state).entries.contains_key(&key) {
            continue;
        }
        let Ok(_permit) = io.acquire().await else {
            return;
        };
        match tokio::fs::remove_file(dir.join(&file_name)).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(file = %file_name, error = %e, "Failed to delete cache file"),
        }
    }
}

enum Lookup {
    Missing,
    Expired(CacheEntry),
    Live { file_name: String, checksum: String },
}

/// Bounded, checksummed on-disk cache
///
/// # Examples
///
/// ```no_run
/// use kyb_cache::{CacheConfig, DiskCache};
///
/// # async fn run() -> Result<(), kyb_cache::CacheError> {
/// let cache = DiskCache::open(CacheConfig::small("/tmp/kyb-cache")).await?;
/// cache.put("greeting", b"hello").await?;
/// assert_eq!(cache.get("greeting").await?, Some(b"hello".to_vec()));
/// cache.close().await?;
/// # Ok(())
/// # }
/// ```
pub struct DiskCache {
    config: CacheConfig,
    state: Arc<RwLock<CacheState>>,
    metrics: Mutex<CacheMetrics>,
    io: Arc<Semaphore>,
    closed: AtomicBool,
    pub(crate) accepting_events: AtomicBool,
}

impl std::fmt::Debug for DiskCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiskCache")
            .field("dir", &self.config.dir)
            .field("entries", &self.len())
            .field("bytes", &self.total_bytes())
            .finish()
    }
}

impl DiskCache {
    /// Open (or create) a cache with its own I/O semaphore
    pub async fn open(config: CacheConfig) -> Result<Self> {
        let io = Arc::new(Semaphore::new(config.max_concurrent_io.max(1)));
        Self::open_with_semaphore(config, io).await
    }

    /// Open (or create) a cache sharing an I/O semaphore with other components
    ///
    /// The index is restored from `index.json` when present; entry files the
    /// snapshot does not know about are adopted by reading their headers.
    /// Corrupt and leftover temporary files are removed.
    pub async fn open_with_semaphore(config: CacheConfig, io: Arc<Semaphore>) -> Result<Self> {
        config.validate()?;
        let dir = config.dir.clone();
        tokio::fs::create_dir_all(&dir).await?;

        let mut on_disk = HashSet::new();
        let mut read_dir = tokio::fs::read_dir(&dir).await?;
        while let Some(item) = read_dir.next_entry().await? {
            let name = item.file_name().to_string_lossy().into_owned();
            if name.ends_with(".tmp") {
                let _ = tokio::fs::remove_file(item.path()).await;
            } else if Path::new(&name).extension().and_then(|e| e.to_str()) == Some(ENTRY_EXTENSION) {
                on_disk.insert(name);
            }
        }

        let mut entries = Vec::new();
        let mut from_snapshot = 0usize;
        if let Some(snapshot) = load_snapshot(&dir).await {
            for mut entry in snapshot {
                if entry.file_name != file_name_for(&entry.key) || !on_disk.remove(&entry.file_name) {
                    continue;
                }
                match tokio::fs::metadata(dir.join(&entry.file_name)).await {
                    Ok(meta) => {
                        entry.size = meta.len();
                        entries.push(entry);
                        from_snapshot += 1;
                    }
                    Err(_) => continue,
                }
            }
        }

        let mut remaining: Vec<String> = on_disk.into_iter().collect();
        remaining.sort();
        let mut rescanned = 0usize;
        let mut corrupt = 0u64;
        for name in remaining {
            let path = dir.join(&name);
            let bytes = match tokio::fs::read(&path).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(file = %name, error = %e, "Skipping unreadable cache file");
                    continue;
                }
            };
            match decode(&bytes) {
                Ok(decoded) if file_name_for(&decoded.key) == name => {
                    entries.push(CacheEntry {
                        key: decoded.key,
                        file_name: name,
                        size: bytes.len() as u64,
                        created_at: decoded.created_at,
                        last_accessed: decoded.created_at,
                        access_count: 0,
                        ttl_ms: decoded.ttl_ms,
                        checksum: decoded.checksum,
                    });
                    rescanned += 1;
                }
                _ => {
                    corrupt += 1;
                    let _ = tokio::fs::remove_file(&path).await;
                }
            }
        }

        // oldest access first so the LRU order is restored
        entries.sort_by(|a, b| (a.last_accessed, &a.key).cmp(&(b.last_accessed, &b.key)));

        let now = now_millis();
        let mut state = CacheState::new();
        let mut stale = Vec::new();
        for entry in entries {
            if entry.is_expired_at(now) {
                stale.push(entry);
            } else {
                state.insert(entry);
            }
        }
        let expired = stale.len();
        stale.extend(state.enforce_caps(&config, ""));
        for entry in &stale {
            let _ = tokio::fs::remove_file(dir.join(&entry.file_name)).await;
        }

        info!(
            dir = %dir.display(),
            entries = state.entries.len(),
            bytes = state.total_bytes,
            from_snapshot,
            rescanned,
            corrupt,
            expired,
            "Opened disk cache"
        );

        let metrics = CacheMetrics {
            corruptions: corrupt,
            ..CacheMetrics::default()
        };

        Ok(Self {
            config,
            state: Arc::new(RwLock::new(state)),
            metrics: Mutex::new(metrics),
            io,
            closed: AtomicBool::new(false),
            accepting_events: AtomicBool::new(true),
        })
    }

    /// Active configuration
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Cache directory
    pub fn dir(&self) -> &Path {
        &self.config.dir
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        read_lock(&self.state).entries.len()
    }

    /// True when the cache holds no entries
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total size of live entry files
    pub fn total_bytes(&self) -> u64 {
        read_lock(&self.state).total_bytes
    }

    /// Whether `key` is indexed (its TTL is not checked)
    pub fn contains_key(&self, key: &str) -> bool {
        read_lock(&self.state).entries.contains_key(key)
    }

    /// Index record for `key`
    pub fn entry(&self, key: &str) -> Option<CacheEntry> {
        read_lock(&self.state).entries.get(key).cloned()
    }

    /// Snapshot of the metrics
    pub fn metrics(&self) -> CacheMetrics {
        self.metrics.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Whether `close` has been called
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn with_metrics(&self, f: impl FnOnce(&mut CacheMetrics)) {
        f(&mut self.metrics.lock().unwrap_or_else(PoisonError::into_inner));
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(CacheError::Closed)
        } else {
            Ok(())
        }
    }

    /// Read a value
    ///
    /// Expired entries, missing files and checksum failures are purged and
    /// reported as `None`.
    pub async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.ensure_open()?;
        let now = now_millis();

        let lookup = {
            let mut state = write_lock(&self.state);
            match state.entries.get(key) {
                None => Lookup::Missing,
                Some(entry) if entry.is_expired_at(now) => match state.remove(key) {
                    Some(entry) => Lookup::Expired(entry),
                    None => Lookup::Missing,
                },
                Some(entry) => Lookup::Live {
                    file_name: entry.file_name.clone(),
                    checksum: entry.checksum.clone(),
                },
            }
        };

        let (file_name, checksum) = match lookup {
            Lookup::Missing => {
                self.with_metrics(CacheMetrics::record_miss);
                return Ok(None);
            }
            Lookup::Expired(entry) => {
                self.with_metrics(CacheMetrics::record_expiration);
                debug!(key, "Cache entry expired");
                self.delete_files(vec![(entry.key, entry.file_name)]).await;
                return Ok(None);
            }
            Lookup::Live {
                file_name,
                checksum,
            } => (file_name, checksum),
        };

        let bytes = {
            let _permit = self.io.acquire().await.map_err(|_| CacheError::Closed)?;
            match tokio::fs::read(self.dir().join(&file_name)).await {
                Ok(bytes) => Some(bytes),
                Err(e) if e.kind() == ErrorKind::NotFound => None,
                Err(e) => return Err(e.into()),
            }
        };

        let decoded = bytes
            .as_deref()
            .and_then(|b| decode(b).ok())
            .filter(|d| d.key == key);

        let Some(decoded) = decoded else {
            warn!(key, file = %file_name, "Cache entry missing or corrupt, purging");
            let purged = {
                let mut state = write_lock(&self.state);
                match state.entries.get(key) {
                    Some(entry) if entry.checksum == checksum => state.remove(key),
                    _ => None,
                }
            };
            self.with_metrics(CacheMetrics::record_corruption);
            if let Some(entry) = purged {
                self.delete_files(vec![(entry.key, entry.file_name)]).await;
            }
            return Ok(None);
        };

        // a concurrent put may have replaced the file; the file is authoritative
        if decoded.checksum != checksum {
            let refreshed = CacheEntry {
                key: key.to_string(),
                file_name: file_name.clone(),
                size: bytes.as_ref().map_or(0, |b| b.len() as u64),
                created_at: decoded.created_at,
                last_accessed: now,
                access_count: 0,
                ttl_ms: decoded.ttl_ms,
                checksum: decoded.checksum.clone(),
            };
            if refreshed.is_expired_at(now) {
                self.with_metrics(CacheMetrics::record_miss);
                return Ok(None);
            }
            let mut state = write_lock(&self.state);
            if state.entries.get(key).map(|e| &e.checksum) == Some(&checksum) {
                state.insert(refreshed);
            }
        }

        {
            let mut state = write_lock(&self.state);
            if let Some(entry) = state.entries.get_mut(key) {
                entry.last_accessed = now;
                entry.access_count += 1;
            }
            state.order.promote(key);
        }
        self.with_metrics(CacheMetrics::record_hit);
        Ok(Some(decoded.payload))
    }

    /// Store a value with the default TTL
    pub async fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        self.put_with_ttl(key, value, self.config.default_ttl()).await
    }

    /// Store a value with an explicit TTL (`None` = no expiry)
    ///
    /// When a cap is exceeded, entries are evicted per policy until both caps
    /// hold again; the entry just written is never chosen.
    pub async fn put_with_ttl(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<()> {
        self.ensure_open()?;

        let size = encoded_len(key, value.len());
        if size > self.config.max_bytes {
            return Err(CacheError::EntryTooLarge {
                size,
                max: self.config.max_bytes,
            });
        }

        let now = now_millis();
        let ttl_ms = ttl
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .filter(|ms| *ms > 0);
        let encoded = encode(key, now, ttl_ms, value);
        let file_name = file_name_for(key);

        self.write_atomic(&file_name, &encoded.bytes).await?;

        let victims = {
            let mut state = write_lock(&self.state);
            state.insert(CacheEntry {
                key: key.to_string(),
                file_name,
                size,
                created_at: now,
                last_accessed: now,
                access_count: 0,
                ttl_ms,
                checksum: encoded.checksum,
            });
            state.enforce_caps(&self.config, key)
        };

        self.with_metrics(|m| {
            m.record_put(size);
            m.record_evictions(victims.len());
        });

        if !victims.is_empty() {
            debug!(
                key,
                evicted = victims.len(),
                policy = ?self.config.policy,
                "Evicted cache entries"
            );
            self.delete_files(victims.into_iter().map(|e| (e.key, e.file_name)).collect())
                .await;
        }
        Ok(())
    }

    /// Read and deserialize a JSON value
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Serialize and store a JSON value with the default TTL
    pub async fn put_json<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec(value)?;
        self.put(key, &bytes).await
    }

    /// Remove an entry and its file
    pub async fn remove(&self, key: &str) -> Result<bool> {
        self.ensure_open()?;
        let removed = write_lock(&self.state).remove(key);
        match removed {
            Some(entry) => {
                self.delete_files(vec![(entry.key, entry.file_name)]).await;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Drop entries matching `predicate` from the index; files are deleted in
    /// the background
    pub fn invalidate_where(&self, predicate: impl Fn(&str) -> bool) -> usize {
        let removed: Vec<(String, String)> = {
            let mut state = write_lock(&self.state);
            let keys: Vec<String> = state
                .entries
                .keys()
                .filter(|k| predicate(k))
                .cloned()
                .collect();
            keys.iter()
                .filter_map(|k| state.remove(k))
                .map(|e| (e.key, e.file_name))
                .collect()
        };
        let count = removed.len();
        if count > 0 {
            self.spawn_delete(removed);
        }
        count
    }

    /// Drop one key
    pub fn invalidate(&self, key: &str) -> bool {
        self.invalidate_where(|k| k == key) > 0
    }

    /// Drop every key starting with `prefix`
    pub fn invalidate_prefix(&self, prefix: &str) -> usize {
        self.invalidate_where(|k| k.starts_with(prefix))
    }

    /// Drop everything
    pub fn invalidate_all(&self) -> usize {
        self.invalidate_where(|_| true)
    }

    /// Persist the index snapshot
    pub async fn flush(&self) -> Result<()> {
        let entries = {
            let state = read_lock(&self.state);
            let mut entries: Vec<CacheEntry> = state.entries.values().cloned().collect();
            entries.sort_by(|a, b| a.key.cmp(&b.key));
            entries
        };
        let count = entries.len();
        let bytes = serde_json::to_vec(&PersistedIndex {
            version: INDEX_FORMAT_VERSION,
            entries,
        })?;
        self.write_atomic(INDEX_FILE, &bytes).await?;
        debug!(entries = count, "Flushed cache index");
        Ok(())
    }

    /// Persist the index and refuse further reads and writes
    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.accepting_events.store(false, Ordering::SeqCst);
        self.flush().await?;
        info!(dir = %self.dir().display(), "Closed disk cache");
        Ok(())
    }

    async fn write_atomic(&self, file_name: &str, bytes: &[u8]) -> Result<()> {
        let _permit = self.io.acquire().await.map_err(|_| CacheError::Closed)?;
        let target = self.dir().join(file_name);
        let tmp = self
            .dir()
            .join(format!("{}.{}.tmp", file_name, uuid::Uuid::new_v4().simple()));
        tokio::fs::write(&tmp, bytes).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &target).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn delete_files(&self, files: Vec<(String, String)>) {
        delete_unindexed(&self.state, self.dir(), &self.io, files).await;
    }

    fn spawn_delete(&self, files: Vec<(String, String)>) {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let state = Arc::clone(&self.state);
                let io = Arc::clone(&self.io);
                let dir: PathBuf = self.dir().to_path_buf();
                handle.spawn(async move {
                    delete_unindexed(&state, &dir, &io, files).await;
                });
            }
            Err(_) => {
                for (key, file_name) in files {
                    if read_lock(&self.state).entries.contains_key(&key) {
                        continue;
                    }
                    let _ = std::fs::remove_file(self.dir().join(file_name));
                }
            }
        }
    }
}

async fn load_snapshot(dir: &Path) -> Option<Vec<CacheEntry>> {
    let bytes = match tokio::fs::read(dir.join(INDEX_FILE)).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return None,
        Err(e) => {
            warn!(error = %e, "Cache index unreadable, rescanning directory");
            return None;
        }
    };
    match serde_json::from_slice::<PersistedIndex>(&bytes) {
        Ok(index) if index.version == INDEX_FORMAT_VERSION => Some(index.entries),
        Ok(index) => {
            warn!(version = index.version, "Unknown cache index version, rescanning directory");
            None
        }
        Err(e) => {
            warn!(error = %e, "Cache index corrupt, rescanning directory");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(key: &str, size: u64, last_accessed: u64, access_count: u64) -> CacheEntry {
        CacheEntry {
            key: key.to_string(),
            file_name: file_name_for(key),
            size,
            created_at: 0,
            last_accessed,
            access_count,
            ttl_ms: None,
            checksum: String::new(),
        }
    }

    #[test]
    fn test_state_accounting() {
        let mut state = CacheState::new();
        state.insert(entry("a", 10, 1, 0));
        state.insert(entry("b", 20, 2, 0));
        assert_eq!(state.total_bytes, 30);

        state.insert(entry("a", 5, 3, 0));
        assert_eq!(state.total_bytes, 25);
        assert_eq!(state.entries.len(), 2);

        state.remove("b");
        assert_eq!(state.total_bytes, 5);
        assert!(state.remove("missing").is_none());
    }

    #[test]
    fn test_lru_victim_skips_protected() {
        let mut state = CacheState::new();
        state.insert(entry("a", 1, 1, 0));
        state.insert(entry("b", 1, 2, 0));
        assert_eq!(state.pick_victim(EvictionPolicy::Lru, |k| k == "b"), Some("a".to_string()));
        assert_eq!(state.pick_victim(EvictionPolicy::Lru, |k| k == "a"), Some("b".to_string()));

        state.order.promote("a");
        assert_eq!(state.pick_victim(EvictionPolicy::Lru, |_| false), Some("b".to_string()));
    }

    #[test]
    fn test_lfu_victim_ties_by_recency() {
        let mut state = CacheState::new();
        state.insert(entry("hot", 1, 1, 9));
        state.insert(entry("cold-old", 1, 2, 1));
        state.insert(entry("cold-new", 1, 3, 1));
        assert_eq!(state.pick_victim(EvictionPolicy::Lfu, |_| false), Some("cold-old".to_string()));
        assert_eq!(
            state.pick_victim(EvictionPolicy::Lfu, |k| k == "cold-old"),
            Some("cold-new".to_string())
        );
    }

    #[test]
    fn test_enforce_caps_loops() {
        let config = CacheConfig::new("unused").with_caps(10, 25);
        let mut state = CacheState::new();
        for (i, key) in ["a", "b", "c"].iter().enumerate() {
            state.insert(entry(key, 10, i as u64, 0));
        }
        let victims = state.enforce_caps(&config, "c");
        assert_eq!(victims.len(), 1);
        assert_eq!(victims[0].key, "a");
        assert_eq!(state.total_bytes, 20);
    }

    #[test]
    fn test_enforce_caps_spares_pinned() {
        let config = CacheConfig::new("unused")
            .with_caps(2, 1_000)
            .with_pinned("index/");
        let mut state = CacheState::new();
        state.insert(entry("index/snapshot", 10, 0, 0));
        for (i, key) in ["r1", "r2", "r3"].iter().enumerate() {
            state.insert(entry(key, 10, i as u64 + 1, 0));
        }
        let victims = state.enforce_caps(&config, "r3");
        let keys: Vec<&str> = victims.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, vec!["r1", "r2"]);
        assert!(state.entries.contains_key("index/snapshot"));

        // only pinned and protected keys left: the cap stays exceeded
        state.insert(entry("index/other", 10, 9, 0));
        assert!(state.enforce_caps(&config, "r3").is_empty());
        assert_eq!(state.entries.len(), 3);
    }
}
