//! Bus counters

use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters shared by the event bus, the message bus and their workers
#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    pub(crate) events_published: AtomicU64,
    pub(crate) events_without_subscribers: AtomicU64,
    pub(crate) events_dropped: AtomicU64,
    pub(crate) deliveries: AtomicU64,
    pub(crate) delivery_retries: AtomicU64,
    pub(crate) dead_lettered: AtomicU64,
    pub(crate) follow_ups: AtomicU64,
    pub(crate) messages_sent: AtomicU64,
    pub(crate) messages_delivered: AtomicU64,
    pub(crate) messages_expired: AtomicU64,
    pub(crate) messages_dropped: AtomicU64,
}

impl StatsCounters {
    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> BusStats {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        BusStats {
            events_published: load(&self.events_published),
            events_without_subscribers: load(&self.events_without_subscribers),
            events_dropped: load(&self.events_dropped),
            deliveries: load(&self.deliveries),
            delivery_retries: load(&self.delivery_retries),
            dead_lettered: load(&self.dead_lettered),
            follow_ups: load(&self.follow_ups),
            messages_sent: load(&self.messages_sent),
            messages_delivered: load(&self.messages_delivered),
            messages_expired: load(&self.messages_expired),
            messages_dropped: load(&self.messages_dropped),
        }
    }
}

/// Point-in-time copy of the bus counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BusStats {
    /// Events accepted by `publish`
    pub events_published: u64,
    /// Accepted events no subscriber wanted
    pub events_without_subscribers: u64,
    /// Events refused because a lane was full or the bus was stopping
    pub events_dropped: u64,
    /// Successful handler invocations
    pub deliveries: u64,
    /// Redelivery attempts after a retryable failure
    pub delivery_retries: u64,
    /// Deliveries abandoned after the last attempt
    pub dead_lettered: u64,
    /// Follow-up events published on behalf of modules
    pub follow_ups: u64,
    /// Messages queued
    pub messages_sent: u64,
    /// Messages handed to a receiver
    pub messages_delivered: u64,
    /// Messages discarded because their TTL elapsed
    pub messages_expired: u64,
    /// Messages refused because a mailbox was full
    pub messages_dropped: u64,
}

impl BusStats {
    /// Generate a summary report
    pub fn summary(&self) -> String {
        [
            "Bus Stats Summary".to_string(),
            "=================".to_string(),
            format!(
                "Events: {} published, {} without subscribers, {} dropped",
                self.events_published, self.events_without_subscribers, self.events_dropped
            ),
            format!(
                "Deliveries: {} ok, {} retries, {} dead-lettered",
                self.deliveries, self.delivery_retries, self.dead_lettered
            ),
            format!("Follow-ups: {}", self.follow_ups),
            format!(
                "Messages: {} sent, {} delivered, {} expired, {} dropped",
                self.messages_sent, self.messages_delivered, self.messages_expired, self.messages_dropped
            ),
        ]
        .join("\n")
    }
}
