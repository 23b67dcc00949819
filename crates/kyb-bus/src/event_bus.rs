//! Publish/subscribe event bus
//!
//! Events are hashed onto one of N dispatch lanes by correlation id. Each lane
//! is a bounded queue drained by one worker task, so every subscriber sees the
//! events of one correlation id in publish order.

use crate::config::{Backpressure, BusConfig};
use crate::error::{BusError, HandlerError};
use crate::handler::{EventFilter, EventHandler, Subscription, SubscriptionId};
use crate::stats::{BusStats, StatsCounters};
use kyb_domain::traits::EventStore;
use kyb_domain::{Event, EventType};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// One event plus the subscribers snapshotted when it was published
struct Dispatch {
    event: Arc<Event>,
    subscribers: Vec<Arc<Subscription>>,
}

struct BusInner {
    config: BusConfig,
    subscriptions: RwLock<HashMap<EventType, Vec<Arc<Subscription>>>>,
    lanes: RwLock<Vec<mpsc::Sender<Dispatch>>>,
    accepting: AtomicBool,
    next_id: AtomicU64,
    stats: Arc<StatsCounters>,
    event_store: Option<Arc<dyn EventStore>>,
}

impl BusInner {
    fn lane_for(&self, correlation_id: &str, lanes: usize) -> usize {
        let mut hasher = DefaultHasher::new();
        correlation_id.hash(&mut hasher);
        (hasher.finish() % lanes as u64) as usize
    }

    fn snapshot_subscribers(&self, event: &Event) -> Vec<Arc<Subscription>> {
        let subscriptions = self
            .subscriptions
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        subscriptions
            .get(&event.event_type)
            .map(|subs| subs.iter().filter(|s| s.wants(event)).cloned().collect())
            .unwrap_or_default()
    }

    /// Route an event to its lane; `block` selects the full-queue behaviour
    async fn enqueue(&self, event: Event, block: bool) -> Result<usize, BusError> {
        if !self.accepting.load(Ordering::SeqCst) {
            StatsCounters::incr(&self.stats.events_dropped);
            return Err(BusError::ShuttingDown);
        }

        let subscribers = self.snapshot_subscribers(&event);
        if subscribers.is_empty() {
            StatsCounters::incr(&self.stats.events_published);
            StatsCounters::incr(&self.stats.events_without_subscribers);
            debug!(event_type = %event.event_type, "Event has no subscribers");
            return Ok(0);
        }

        let sender = {
            let lanes = self.lanes.read().unwrap_or_else(PoisonError::into_inner);
            if lanes.is_empty() {
                None
            } else {
                Some(lanes[self.lane_for(&event.correlation_id, lanes.len())].clone())
            }
        };
        let Some(sender) = sender else {
            StatsCounters::incr(&self.stats.events_dropped);
            return Err(BusError::ShuttingDown);
        };

        let count = subscribers.len();
        let event_type = event.event_type.clone();
        let dispatch = Dispatch {
            event: Arc::new(event),
            subscribers,
        };

        let sent = if block {
            sender.send(dispatch).await.map_err(|_| BusError::ShuttingDown)
        } else {
            sender.try_send(dispatch).map_err(|e| match e {
                TrySendError::Full(_) => BusError::QueueFull(event_type.to_string()),
                TrySendError::Closed(_) => BusError::ShuttingDown,
            })
        };

        match sent {
            Ok(()) => {
                StatsCounters::incr(&self.stats.events_published);
                Ok(count)
            }
            Err(e) => {
                StatsCounters::incr(&self.stats.events_dropped);
                Err(e)
            }
        }
    }

    fn dead_letter(&self, subscription: &Subscription, event: &Event, reason: &str) {
        StatsCounters::incr(&self.stats.dead_lettered);
        warn!(
            subscriber = %subscription.subscriber,
            event_type = %event.event_type,
            correlation_id = %event.correlation_id,
            reason,
            "Event dead-lettered"
        );
        if let Some(store) = &self.event_store {
            if let Err(e) = store.record_failed(event, &subscription.subscriber, reason) {
                error!(error = %e, event_id = %event.id, "Failed to record dead-lettered event");
            }
        }
    }

    async fn deliver(&self, subscription: &Subscription, event: &Event) {
        let mut attempt = 1;
        loop {
            let outcome = catch_unwind(AssertUnwindSafe(|| subscription.handler.handle(event)))
                .unwrap_or_else(|_| Err(HandlerError::Fatal("handler panicked".to_string())));

            match outcome {
                Ok(follow_up) => {
                    StatsCounters::incr(&self.stats.deliveries);
                    if let Some(follow_up) = follow_up {
                        self.publish_follow_up(follow_up.caused_by(event)).await;
                    }
                    return;
                }
                Err(e) if e.is_retryable() && attempt < self.config.max_attempts => {
                    StatsCounters::incr(&self.stats.delivery_retries);
                    let backoff = self.config.backoff_for(attempt);
                    debug!(
                        subscriber = %subscription.subscriber,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Retrying delivery"
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => {
                    self.dead_letter(subscription, event, &e.to_string());
                    return;
                }
            }
        }
    }

    /// Follow-ups never block the lane that produced them
    async fn publish_follow_up(&self, event: Event) {
        let event_type = event.event_type.clone();
        match self.enqueue(event, false).await {
            Ok(_) => StatsCounters::incr(&self.stats.follow_ups),
            Err(e) => warn!(event_type = %event_type, error = %e, "Follow-up event dropped"),
        }
    }
}

async fn run_lane(lane: usize, mut rx: mpsc::Receiver<Dispatch>, inner: Arc<BusInner>) {
    while let Some(dispatch) = rx.recv().await {
        for subscription in &dispatch.subscribers {
            inner.deliver(subscription, &dispatch.event).await;
        }
    }
    debug!(lane, "Event lane drained");
}

/// Publish/subscribe event bus
pub struct EventBus {
    inner: Arc<BusInner>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl EventBus {
    /// Start the bus and its lane workers on the current runtime
    pub fn new(config: BusConfig, event_store: Option<Arc<dyn EventStore>>) -> Result<Self, BusError> {
        Self::with_stats(config, event_store, Arc::new(StatsCounters::default()))
    }

    pub(crate) fn with_stats(
        config: BusConfig,
        event_store: Option<Arc<dyn EventStore>>,
        stats: Arc<StatsCounters>,
    ) -> Result<Self, BusError> {
        config.validate()?;

        let mut senders = Vec::with_capacity(config.workers);
        let mut receivers = Vec::with_capacity(config.workers);
        for _ in 0..config.workers {
            let (tx, rx) = mpsc::channel(config.lane_capacity());
            senders.push(tx);
            receivers.push(rx);
        }

        let inner = Arc::new(BusInner {
            config,
            subscriptions: RwLock::new(HashMap::new()),
            lanes: RwLock::new(senders),
            accepting: AtomicBool::new(true),
            next_id: AtomicU64::new(1),
            stats,
            event_store,
        });

        let workers = receivers
            .into_iter()
            .enumerate()
            .map(|(lane, rx)| tokio::spawn(run_lane(lane, rx, Arc::clone(&inner))))
            .collect();

        info!(
            lanes = inner.config.workers,
            lane_capacity = inner.config.lane_capacity(),
            backpressure = ?inner.config.backpressure,
            "Event bus started"
        );

        Ok(Self {
            inner,
            workers: Mutex::new(workers),
        })
    }

    /// Active configuration
    pub fn config(&self) -> &BusConfig {
        &self.inner.config
    }

    /// Subscribe a handler to one event type
    ///
    /// Only events published after this call are delivered.
    pub fn subscribe(
        &self,
        subscriber: impl Into<String>,
        event_type: EventType,
        handler: Arc<dyn EventHandler>,
    ) -> SubscriptionId {
        self.add_subscription(subscriber.into(), event_type, None, handler)
    }

    /// Subscribe with a content predicate
    pub fn subscribe_filtered<F>(
        &self,
        subscriber: impl Into<String>,
        event_type: EventType,
        filter: F,
        handler: Arc<dyn EventHandler>,
    ) -> SubscriptionId
    where
        F: Fn(&Event) -> bool + Send + Sync + 'static,
    {
        let filter: EventFilter = Arc::new(filter);
        self.add_subscription(subscriber.into(), event_type, Some(filter), handler)
    }

    fn add_subscription(
        &self,
        subscriber: String,
        event_type: EventType,
        filter: Option<EventFilter>,
        handler: Arc<dyn EventHandler>,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        debug!(subscriber = %subscriber, event_type = %event_type, id = id.0, "Subscribed");
        let subscription = Arc::new(Subscription {
            id,
            subscriber,
            event_type: event_type.clone(),
            filter,
            handler,
        });
        self.inner
            .subscriptions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(event_type)
            .or_default()
            .push(subscription);
        id
    }

    /// Remove a subscription; events already queued are still delivered
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscriptions = self
            .inner
            .subscriptions
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let mut removed = false;
        for subs in subscriptions.values_mut() {
            let before = subs.len();
            subs.retain(|s| s.id != id);
            removed |= subs.len() != before;
        }
        subscriptions.retain(|_, subs| !subs.is_empty());
        removed
    }

    /// Number of subscriptions for an event type
    pub fn subscriber_count(&self, event_type: &EventType) -> usize {
        self.inner
            .subscriptions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(event_type)
            .map_or(0, Vec::len)
    }

    /// Publish an event; returns the number of subscribers it was queued for
    ///
    /// A full lane blocks or fails per the configured backpressure policy.
    pub async fn publish(&self, event: Event) -> Result<usize, BusError> {
        let block = self.inner.config.backpressure == Backpressure::Block;
        self.inner.enqueue(event, block).await
    }

    /// Whether the bus accepts new events
    pub fn is_accepting(&self) -> bool {
        self.inner.accepting.load(Ordering::SeqCst)
    }

    /// Counter snapshot
    pub fn stats(&self) -> BusStats {
        self.inner.stats.snapshot()
    }

    /// Stop accepting, drain the lanes until the grace deadline, then abort
    ///
    /// Returns `true` when every lane drained in time.
    pub async fn shutdown(&self) -> bool {
        if !self.inner.accepting.swap(false, Ordering::SeqCst) {
            return true;
        }
        self.inner
            .lanes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();

        let mut workers =
            std::mem::take(&mut *self.workers.lock().unwrap_or_else(PoisonError::into_inner));
        let deadline = tokio::time::Instant::now() + self.inner.config.shutdown_grace();
        let mut drained = true;
        for worker in workers.iter_mut() {
            if tokio::time::timeout_at(deadline, &mut *worker).await.is_err() {
                drained = false;
                break;
            }
        }
        if !drained {
            for worker in &workers {
                worker.abort();
            }
            warn!("Event bus shutdown grace elapsed, aborted remaining lanes");
        }

        info!(drained, "Event bus stopped\n{}", self.stats().summary());
        drained
    }
}

impl Drop for EventBus {
    fn drop(&mut self) {
        for worker in self.workers.get_mut().unwrap_or_else(PoisonError::into_inner).iter() {
            worker.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::FnHandler;

    #[tokio::test]
    async fn test_lane_choice_is_stable() {
        let bus = EventBus::new(BusConfig::default(), None).unwrap();
        let a = bus.inner.lane_for("corr-1", 8);
        assert_eq!(a, bus.inner.lane_for("corr-1", 8));
        assert!(a < 8);
    }

    #[tokio::test]
    async fn test_unsubscribe() {
        let bus = EventBus::new(BusConfig::default(), None).unwrap();
        let id = bus.subscribe(
            "audit",
            EventType::IndexReloaded,
            Arc::new(FnHandler::new(|_: &Event| Ok(None))),
        );
        assert_eq!(bus.subscriber_count(&EventType::IndexReloaded), 1);
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        assert_eq!(bus.subscriber_count(&EventType::IndexReloaded), 0);
    }

    #[tokio::test]
    async fn test_publish_without_subscribers() {
        let bus = EventBus::new(BusConfig::default(), None).unwrap();
        let queued = bus
            .publish(Event::new(EventType::IndexReloaded, "index"))
            .await
            .unwrap();
        assert_eq!(queued, 0);
        assert_eq!(bus.stats().events_without_subscribers, 1);
    }

    #[tokio::test]
    async fn test_publish_after_shutdown_rejected() {
        let bus = EventBus::new(BusConfig::default(), None).unwrap();
        assert!(bus.shutdown().await);
        let err = bus
            .publish(Event::new(EventType::IndexReloaded, "index"))
            .await
            .unwrap_err();
        assert_eq!(err, BusError::ShuttingDown);
    }
}
