//! Configuration for the event and message buses

use crate::error::BusError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What a full queue does to the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backpressure {
    /// Wait for space
    #[default]
    Block,
    /// Fail fast with [`BusError::QueueFull`] and count the drop
    Drop,
}

/// Configuration for [`CommunicationManager`](crate::CommunicationManager)
///
/// # Examples
///
/// ```
/// use kyb_bus::{Backpressure, BusConfig};
///
/// let config = BusConfig::default();
/// assert_eq!(config.workers, 8);
/// assert_eq!(config.backpressure, Backpressure::Block);
///
/// let fast = BusConfig::low_latency();
/// assert_eq!(fast.backpressure, Backpressure::Drop);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Number of dispatch lanes, one worker task each
    /// Default: 8
    pub workers: usize,

    /// Total event queue capacity, split evenly across lanes
    /// Default: 1024
    pub queue_capacity: usize,

    /// Event publish policy when a lane is full
    /// Default: block
    pub backpressure: Backpressure,

    /// Delivery attempts per subscriber before dead-lettering
    /// Default: 3
    pub max_attempts: u32,

    /// Backoff before the first retry
    /// Default: 50ms
    pub initial_backoff_ms: u64,

    /// Backoff ceiling
    /// Default: 2s
    pub max_backoff_ms: u64,

    /// Capacity of each message mailbox
    /// Default: 256
    pub mailbox_capacity: usize,

    /// Message send policy when a mailbox is full
    /// Default: block
    pub message_backpressure: Backpressure,

    /// How long shutdown waits for lanes to drain
    /// Default: 5s
    pub shutdown_grace_ms: u64,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            workers: 8,
            queue_capacity: 1024,
            backpressure: Backpressure::Block,
            max_attempts: 3,
            initial_backoff_ms: 50,
            max_backoff_ms: 2_000,
            mailbox_capacity: 256,
            message_backpressure: Backpressure::Block,
            shutdown_grace_ms: 5_000,
        }
    }
}

impl BusConfig {
    /// Fail fast: drop on full queues, retry once, short grace
    pub fn low_latency() -> Self {
        Self {
            workers: 16,
            backpressure: Backpressure::Drop,
            message_backpressure: Backpressure::Drop,
            max_attempts: 2,
            initial_backoff_ms: 10,
            max_backoff_ms: 100,
            shutdown_grace_ms: 1_000,
            ..Self::default()
        }
    }

    /// Never drop, retry harder, long grace
    pub fn durable() -> Self {
        Self {
            queue_capacity: 8192,
            max_attempts: 5,
            initial_backoff_ms: 100,
            max_backoff_ms: 10_000,
            shutdown_grace_ms: 30_000,
            ..Self::default()
        }
    }

    /// Capacity of one lane
    pub fn lane_capacity(&self) -> usize {
        (self.queue_capacity / self.workers.max(1)).max(1)
    }

    /// Backoff before retry number `attempt` (1-based):
    /// `initial × 2^(attempt-1)`, capped
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32);
        let ms = self
            .initial_backoff_ms
            .saturating_mul(1u64 << exponent)
            .min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }

    /// Shutdown grace period
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    /// Validate settings
    pub fn validate(&self) -> Result<(), BusError> {
        if self.workers == 0 {
            return Err(BusError::InvalidConfig("workers must be at least 1".to_string()));
        }
        if self.queue_capacity == 0 || self.mailbox_capacity == 0 {
            return Err(BusError::InvalidConfig("queue capacities must be at least 1".to_string()));
        }
        if self.max_attempts == 0 {
            return Err(BusError::InvalidConfig("max_attempts must be at least 1".to_string()));
        }
        if self.initial_backoff_ms > self.max_backoff_ms {
            return Err(BusError::InvalidConfig(
                "initial_backoff_ms must not exceed max_backoff_ms".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_validate() {
        assert!(BusConfig::default().validate().is_ok());
        assert!(BusConfig::low_latency().validate().is_ok());
        assert!(BusConfig::durable().validate().is_ok());
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let config = BusConfig::default();
        assert_eq!(config.backoff_for(1), Duration::from_millis(50));
        assert_eq!(config.backoff_for(2), Duration::from_millis(100));
        assert_eq!(config.backoff_for(3), Duration::from_millis(200));
        assert_eq!(config.backoff_for(20), Duration::from_millis(2_000));
        assert_eq!(config.backoff_for(u32::MAX), Duration::from_millis(2_000));
    }

    #[test]
    fn test_lane_capacity_never_zero() {
        let config = BusConfig {
            workers: 64,
            queue_capacity: 8,
            ..BusConfig::default()
        };
        assert_eq!(config.lane_capacity(), 1);
    }

    #[test]
    fn test_invalid_config() {
        let config = BusConfig {
            workers: 0,
            ..BusConfig::default()
        };
        assert!(config.validate().is_err());

        let config = BusConfig {
            initial_backoff_ms: 10_000,
            max_backoff_ms: 10,
            ..BusConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_section() {
        let config: BusConfig = toml::from_str(
            r#"
            workers = 4
            backpressure = "drop"
            "#,
        )
        .unwrap();
        assert_eq!(config.workers, 4);
        assert_eq!(config.backpressure, Backpressure::Drop);
        assert_eq!(config.max_attempts, 3);
    }
}
