//! Bus integration: invalidation requests

use crate::cache::DiskCache;
use kyb_domain::traits::{HealthStatus, Module, ModuleError};
use kyb_domain::{Event, EventType};
use std::sync::atomic::Ordering;
use tracing::info;

/// Module name used on the bus
pub const MODULE_NAME: &str = "disk_cache";

impl Module for DiskCache {
    fn name(&self) -> &str {
        MODULE_NAME
    }

    fn subscriptions(&self) -> Vec<EventType> {
        vec![EventType::CacheInvalidationRequested]
    }

    fn start(&self) -> Result<(), ModuleError> {
        if self.is_closed() {
            return Err(ModuleError::NotRunning(MODULE_NAME.to_string()));
        }
        self.accepting_events.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) -> Result<(), ModuleError> {
        self.accepting_events.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// `key` drops one entry, `prefix` drops a key range, no payload drops
    /// everything
    fn process(&self, event: &Event) -> Result<Option<Event>, ModuleError> {
        if !self.accepting_events.load(Ordering::SeqCst) {
            return Err(ModuleError::NotRunning(MODULE_NAME.to_string()));
        }
        if event.event_type != EventType::CacheInvalidationRequested {
            return Ok(None);
        }

        let removed = if let Some(key) = event.data_str("key") {
            usize::from(self.invalidate(key))
        } else if let Some(prefix) = event.data_str("prefix") {
            self.invalidate_prefix(prefix)
        } else if event.data.is_empty() {
            self.invalidate_all()
        } else {
            return Err(ModuleError::InvalidPayload(
                "expected a string `key` or `prefix`".to_string(),
            ));
        };

        info!(
            removed,
            correlation_id = %event.correlation_id,
            "Cache invalidated"
        );
        Ok(None)
    }

    fn health_check(&self) -> HealthStatus {
        if self.is_closed() {
            HealthStatus::Unhealthy
        } else if self.accepting_events.load(Ordering::SeqCst) {
            HealthStatus::Healthy
        } else {
            HealthStatus::Degraded
        }
    }
}
