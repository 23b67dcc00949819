//! KYB Disk Cache
//!
//! Bounded on-disk cache for classification and risk results.
//!
//! # Overview
//!
//! Every entry lives in its own file named after the SHA-256 of its key. The
//! file starts with a checksum of its body, so a torn write or a flipped bit is
//! detected on read; the entry is then purged and reported as a miss.
//!
//! | Concern | Behaviour |
//! |---------|-----------|
//! | Caps | `max_entries` and `max_bytes`, both enforced after every write |
//! | Eviction | LRU (default) or LFU, ties broken by recency |
//! | Expiry | Per-entry TTL, checked on read |
//! | Restart | `index.json` snapshot, plus a rescan of unindexed files |
//! | I/O | Bounded by a semaphore that may be shared with other components |
//!
//! # Example
//!
//! ```no_run
//! use kyb_cache::{CacheConfig, DiskCache, EvictionPolicy};
//!
//! # async fn run() -> Result<(), kyb_cache::CacheError> {
//! let config = CacheConfig::new("/var/cache/kyb").with_policy(EvictionPolicy::Lfu);
//! let cache = DiskCache::open(config).await?;
//!
//! cache.put_json("classify:abc", &vec!["Coffee Shop"]).await?;
//! let hit: Option<Vec<String>> = cache.get_json("classify:abc").await?;
//! assert!(hit.is_some());
//!
//! cache.close().await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod cache;
mod config;
mod entry;
mod error;
mod metrics;
mod module;

pub use cache::{DiskCache, INDEX_FILE};
pub use config::{CacheConfig, EvictionPolicy};
pub use entry::{file_name_for, CacheEntry};
pub use error::{CacheError, Result};
pub use metrics::CacheMetrics;
pub use module::MODULE_NAME;
