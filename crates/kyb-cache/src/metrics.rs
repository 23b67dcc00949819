//! Metrics collection for cache operations

/// Counters for cache operations
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheMetrics {
    /// Reads that returned a value
    pub hits: u64,
    /// Reads that returned nothing (includes expirations and corruptions)
    pub misses: u64,
    /// Entries dropped because their TTL elapsed
    pub expirations: u64,
    /// Entries evicted to honour a cap
    pub evictions: u64,
    /// Entries dropped because the file was missing or failed its checksum
    pub corruptions: u64,
    /// Successful writes
    pub puts: u64,
    /// Bytes written to entry files
    pub bytes_written: u64,
}

impl CacheMetrics {
    /// Create new empty metrics
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a hit
    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    /// Record a miss
    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    /// Record an expired entry (also a miss)
    pub fn record_expiration(&mut self) {
        self.expirations += 1;
        self.misses += 1;
    }

    /// Record a corrupt entry (also a miss)
    pub fn record_corruption(&mut self) {
        self.corruptions += 1;
        self.misses += 1;
    }

    /// Record evictions
    pub fn record_evictions(&mut self, count: usize) {
        self.evictions += count as u64;
    }

    /// Record a write
    pub fn record_put(&mut self, bytes: u64) {
        self.puts += 1;
        self.bytes_written += bytes;
    }

    /// Fraction of reads that hit
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Reset all metrics
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Generate a summary report of metrics
    pub fn summary(&self) -> String {
        [
            "Cache Metrics Summary".to_string(),
            "=====================".to_string(),
            format!("Hits: {}", self.hits),
            format!("Misses: {}", self.misses),
            format!("Hit rate: {:.1}%", self.hit_rate() * 100.0),
            format!("Expirations: {}", self.expirations),
            format!("Evictions: {}", self.evictions),
            format!("Corruptions: {}", self.corruptions),
            format!("Writes: {} ({} bytes)", self.puts, self.bytes_written),
        ]
        .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = CacheMetrics::new();
        assert_eq!(metrics.hits, 0);
        assert_eq!(metrics.hit_rate(), 0.0);
    }

    #[test]
    fn test_expiration_and_corruption_count_as_misses() {
        let mut metrics = CacheMetrics::new();
        metrics.record_expiration();
        metrics.record_corruption();
        metrics.record_miss();
        assert_eq!(metrics.misses, 3);
        assert_eq!(metrics.expirations, 1);
        assert_eq!(metrics.corruptions, 1);
    }

    #[test]
    fn test_hit_rate() {
        let mut metrics = CacheMetrics::new();
        metrics.record_hit();
        metrics.record_hit();
        metrics.record_hit();
        metrics.record_miss();
        assert!((metrics.hit_rate() - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_reset() {
        let mut metrics = CacheMetrics::new();
        metrics.record_put(100);
        metrics.record_evictions(2);
        metrics.reset();
        assert_eq!(metrics, CacheMetrics::default());
    }

    #[test]
    fn test_summary() {
        let mut metrics = CacheMetrics::new();
        metrics.record_hit();
        metrics.record_put(42);
        let summary = metrics.summary();
        assert!(summary.contains("Hits: 1"));
        assert!(summary.contains("Writes: 1 (42 bytes)"));
        assert!(summary.contains("Hit rate: 100.0%"));
    }
}
