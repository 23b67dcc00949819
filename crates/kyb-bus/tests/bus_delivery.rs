//! Delivery semantics of the event and message buses

use kyb_bus::{
    Backpressure, BusConfig, BusError, CommunicationManager, EventBus, FnHandler, HandlerError,
    MessageBus, SendOutcome,
};
use kyb_domain::traits::{EventStore, HealthStatus, Module, ModuleError, SourceError};
use kyb_domain::{Event, EventType, Message};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock, Weak};
use std::time::Duration;

fn fast_config() -> BusConfig {
    BusConfig {
        workers: 4,
        initial_backoff_ms: 1,
        max_backoff_ms: 5,
        shutdown_grace_ms: 2_000,
        ..BusConfig::default()
    }
}

async fn wait_until(check: impl Fn() -> bool) {
    for _ in 0..400 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}

#[derive(Default)]
struct RecordingStore {
    failed: Mutex<Vec<(String, String, String)>>,
}

impl EventStore for RecordingStore {
    fn record_failed(&self, event: &Event, subscriber: &str, reason: &str) -> Result<(), SourceError> {
        self.failed.lock().unwrap().push((
            event.id.clone(),
            subscriber.to_string(),
            reason.to_string(),
        ));
        Ok(())
    }
}

#[tokio::test]
async fn test_per_correlation_order_preserved() {
    let bus = EventBus::new(fast_config(), None).unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    bus.subscribe(
        "audit",
        EventType::ClassificationCompleted,
        Arc::new(FnHandler::new(move |event: &Event| {
            sink.lock().unwrap().push(event.data["seq"].as_u64().unwrap());
            Ok(None)
        })),
    );

    for seq in 0..100u64 {
        let event = Event::new(EventType::ClassificationCompleted, "classifier")
            .with_correlation("request-1", "trace-1")
            .with_data("seq", seq);
        bus.publish(event).await.unwrap();
    }

    wait_until(|| seen.lock().unwrap().len() == 100).await;
    let seen = seen.lock().unwrap().clone();
    assert_eq!(seen, (0..100).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_no_retroactive_delivery() {
    let bus = EventBus::new(fast_config(), None).unwrap();
    bus.publish(Event::new(EventType::IndexReloaded, "index").with_data("n", 1))
        .await
        .unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    bus.subscribe(
        "late",
        EventType::IndexReloaded,
        Arc::new(FnHandler::new(move |event: &Event| {
            sink.lock().unwrap().push(event.data["n"].as_u64().unwrap());
            Ok(None)
        })),
    );
    bus.publish(Event::new(EventType::IndexReloaded, "index").with_data("n", 2))
        .await
        .unwrap();

    wait_until(|| !seen.lock().unwrap().is_empty()).await;
    bus.shutdown().await;
    assert_eq!(*seen.lock().unwrap(), vec![2]);
}

#[tokio::test]
async fn test_retry_then_success() {
    let bus = EventBus::new(fast_config(), None).unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    bus.subscribe(
        "flaky",
        EventType::RiskAssessmentCompleted,
        Arc::new(FnHandler::new(move |_: &Event| {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(HandlerError::Retryable("not yet".to_string()))
            } else {
                Ok(None)
            }
        })),
    );

    bus.publish(Event::new(EventType::RiskAssessmentCompleted, "risk"))
        .await
        .unwrap();
    wait_until(|| bus.stats().deliveries == 1).await;

    let stats = bus.stats();
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(stats.delivery_retries, 2);
    assert_eq!(stats.dead_lettered, 0);
}

#[tokio::test]
async fn test_exhausted_retries_dead_letter_to_store() {
    let store = Arc::new(RecordingStore::default());
    let bus = EventBus::new(fast_config(), Some(store.clone() as Arc<dyn EventStore>)).unwrap();
    bus.subscribe(
        "broken",
        EventType::RiskAssessmentCompleted,
        Arc::new(FnHandler::new(|_: &Event| {
            Err(HandlerError::Retryable("downstream unavailable".to_string()))
        })),
    );

    let event = Event::new(EventType::RiskAssessmentCompleted, "risk");
    let event_id = event.id.clone();
    bus.publish(event).await.unwrap();
    wait_until(|| bus.stats().dead_lettered == 1).await;

    let failed = store.failed.lock().unwrap().clone();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].0, event_id);
    assert_eq!(failed[0].1, "broken");
    assert!(failed[0].2.contains("downstream unavailable"));
    assert_eq!(bus.stats().delivery_retries, 2);
}

#[tokio::test]
async fn test_fatal_failure_skips_retries() {
    let bus = EventBus::new(fast_config(), None).unwrap();
    bus.subscribe(
        "strict",
        EventType::RiskAssessmentCompleted,
        Arc::new(FnHandler::new(|_: &Event| {
            Err(HandlerError::Fatal("bad payload".to_string()))
        })),
    );
    bus.publish(Event::new(EventType::RiskAssessmentCompleted, "risk"))
        .await
        .unwrap();
    wait_until(|| bus.stats().dead_lettered == 1).await;
    assert_eq!(bus.stats().delivery_retries, 0);
}

#[tokio::test]
async fn test_panicking_handler_does_not_kill_lane() {
    let bus = EventBus::new(BusConfig { workers: 1, ..fast_config() }, None).unwrap();
    let ok = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&ok);
    bus.subscribe(
        "fragile",
        EventType::Custom("job".to_string()),
        Arc::new(FnHandler::new(move |event: &Event| {
            if event.data_str("boom").is_some() {
                panic!("boom");
            }
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(None)
        })),
    );

    bus.publish(Event::new(EventType::Custom("job".to_string()), "t").with_data("boom", "yes"))
        .await
        .unwrap();
    bus.publish(Event::new(EventType::Custom("job".to_string()), "t"))
        .await
        .unwrap();
    wait_until(|| ok.load(Ordering::SeqCst) == 1).await;
    assert_eq!(bus.stats().dead_lettered, 1);
}

#[tokio::test]
async fn test_content_filter() {
    let bus = EventBus::new(fast_config(), None).unwrap();
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&seen);
    bus.subscribe_filtered(
        "alerts",
        EventType::RiskAssessmentCompleted,
        |event: &Event| event.data_str("risk_level") == Some("critical"),
        Arc::new(FnHandler::new(move |_: &Event| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(None)
        })),
    );

    for level in ["minimal", "critical", "low"] {
        bus.publish(Event::new(EventType::RiskAssessmentCompleted, "risk").with_data("risk_level", level))
            .await
            .unwrap();
    }
    bus.shutdown().await;
    assert_eq!(seen.load(Ordering::SeqCst), 1);
    assert_eq!(bus.stats().events_without_subscribers, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_drop_backpressure_fails_fast() {
    let config = BusConfig {
        workers: 1,
        queue_capacity: 1,
        backpressure: Backpressure::Drop,
        ..fast_config()
    };
    let bus = EventBus::new(config, None).unwrap();
    bus.subscribe(
        "slow",
        EventType::Custom("work".to_string()),
        Arc::new(FnHandler::new(|_: &Event| {
            std::thread::sleep(Duration::from_millis(50));
            Ok(None)
        })),
    );

    let mut rejected = 0u64;
    for _ in 0..10 {
        match bus.publish(Event::new(EventType::Custom("work".to_string()), "t")).await {
            Ok(_) => {}
            Err(BusError::QueueFull(_)) => rejected += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert!(rejected > 0);
    assert_eq!(bus.stats().events_dropped, rejected);
}

#[tokio::test]
async fn test_shutdown_drains_in_flight() {
    let bus = EventBus::new(fast_config(), None).unwrap();
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&seen);
    bus.subscribe(
        "audit",
        EventType::ClassificationCompleted,
        Arc::new(FnHandler::new(move |_: &Event| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(None)
        })),
    );
    for _ in 0..50 {
        bus.publish(Event::new(EventType::ClassificationCompleted, "c"))
            .await
            .unwrap();
    }

    assert!(bus.shutdown().await);
    assert_eq!(seen.load(Ordering::SeqCst), 50);
    assert!(matches!(
        bus.publish(Event::new(EventType::ClassificationCompleted, "c")).await,
        Err(BusError::ShuttingDown)
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_shutdown_aborts_after_grace() {
    let config = BusConfig {
        workers: 1,
        shutdown_grace_ms: 20,
        ..fast_config()
    };
    let bus = EventBus::new(config, None).unwrap();
    bus.subscribe(
        "slow",
        EventType::Custom("work".to_string()),
        Arc::new(FnHandler::new(|_: &Event| {
            std::thread::sleep(Duration::from_millis(100));
            Ok(None)
        })),
    );
    for _ in 0..5 {
        bus.publish(Event::new(EventType::Custom("work".to_string()), "t"))
            .await
            .unwrap();
    }
    assert!(!bus.shutdown().await);
}

#[tokio::test]
async fn test_expired_messages_never_delivered() {
    let bus = MessageBus::new(fast_config()).unwrap();
    let mut mailbox = bus.register("cache").unwrap();

    let mut stale = Message::new("invalidate", "engine", "cache").with_ttl_ms(10);
    stale.timestamp -= 1_000;
    assert_eq!(bus.send(stale).await.unwrap(), SendOutcome::Expired);

    let short = Message::new("invalidate", "engine", "cache").with_ttl_ms(20);
    assert_eq!(bus.send(short).await.unwrap(), SendOutcome::Queued);
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert!(mailbox.try_recv().is_none());

    let live = Message::new("invalidate", "engine", "cache").with_data("key", "k");
    bus.send(live).await.unwrap();
    let received = mailbox.recv().await.unwrap();
    assert_eq!(received.data.get("key").and_then(|v| v.as_str()), Some("k"));

    let stats = bus.stats();
    assert_eq!(stats.messages_expired, 2);
    assert_eq!(stats.messages_delivered, 1);
}

/// Module that acknowledges classification events
struct AckModule {
    running: AtomicBool,
    handled: AtomicUsize,
}

impl AckModule {
    fn new() -> Self {
        Self {
            running: AtomicBool::new(false),
            handled: AtomicUsize::new(0),
        }
    }
}

impl Module for AckModule {
    fn name(&self) -> &str {
        "ack"
    }

    fn subscriptions(&self) -> Vec<EventType> {
        vec![EventType::ClassificationCompleted]
    }

    fn start(&self) -> Result<(), ModuleError> {
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) -> Result<(), ModuleError> {
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn process(&self, _event: &Event) -> Result<Option<Event>, ModuleError> {
        self.handled.fetch_add(1, Ordering::SeqCst);
        Ok(Some(Event::new(EventType::Custom("acknowledged".to_string()), "ack")))
    }

    fn health_check(&self) -> HealthStatus {
        if self.running.load(Ordering::SeqCst) {
            HealthStatus::Healthy
        } else {
            HealthStatus::Unhealthy
        }
    }
}

#[tokio::test]
async fn test_module_follow_ups_keep_correlation() {
    let manager = CommunicationManager::new(fast_config(), None).unwrap();
    let module = Arc::new(AckModule::new());
    manager.register_module(module.clone()).unwrap();
    assert!(matches!(
        manager.register_module(Arc::new(AckModule::new())),
        Err(BusError::Duplicate(_))
    ));

    let acks = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&acks);
    manager.events().subscribe(
        "observer",
        EventType::Custom("acknowledged".to_string()),
        Arc::new(FnHandler::new(move |event: &Event| {
            sink.lock()
                .unwrap()
                .push((event.correlation_id.clone(), event.trace_id.clone()));
            Ok(None)
        })),
    );

    manager
        .publish(
            Event::new(EventType::ClassificationCompleted, "classifier")
                .with_correlation("corr-42", "trace-42"),
        )
        .await
        .unwrap();

    wait_until(|| !acks.lock().unwrap().is_empty() && manager.stats().follow_ups == 1).await;
    assert_eq!(
        acks.lock().unwrap()[0],
        ("corr-42".to_string(), "trace-42".to_string())
    );
    assert_eq!(module.handled.load(Ordering::SeqCst), 1);
    assert_eq!(manager.stats().follow_ups, 1);
    assert_eq!(manager.health().get("ack"), Some(&HealthStatus::Healthy));
    assert_eq!(manager.overall_health(), HealthStatus::Healthy);

    manager.shutdown().await;
    assert_eq!(module.health_check(), HealthStatus::Unhealthy);
    assert_eq!(manager.overall_health(), HealthStatus::Unhealthy);
}

#[tokio::test]
async fn test_targeted_event_skips_other_modules() {
    let manager = CommunicationManager::new(fast_config(), None).unwrap();
    let module = Arc::new(AckModule::new());
    manager.register_module(module.clone()).unwrap();

    manager
        .publish(Event::new(EventType::ClassificationCompleted, "c").with_target("someone_else"))
        .await
        .unwrap();
    manager
        .publish(Event::new(EventType::ClassificationCompleted, "c").with_target("ack"))
        .await
        .unwrap();

    wait_until(|| module.handled.load(Ordering::SeqCst) == 1).await;
    manager.shutdown().await;
    assert_eq!(module.handled.load(Ordering::SeqCst), 1);

    assert!(manager.unregister_module("ack"));
    assert!(!manager.unregister_module("ack"));
}

/// Module that reads the registry from its own lifecycle hooks
#[derive(Default)]
struct RegistryReader {
    manager: OnceLock<Weak<CommunicationManager>>,
    seen_at_start: Mutex<Vec<String>>,
}

impl RegistryReader {
    fn manager(&self) -> Option<Arc<CommunicationManager>> {
        self.manager.get().and_then(Weak::upgrade)
    }
}

impl Module for RegistryReader {
    fn name(&self) -> &str {
        "registry_reader"
    }

    fn subscriptions(&self) -> Vec<EventType> {
        Vec::new()
    }

    fn start(&self) -> Result<(), ModuleError> {
        if let Some(manager) = self.manager() {
            *self.seen_at_start.lock().unwrap() = manager.module_names();
        }
        Ok(())
    }

    fn stop(&self) -> Result<(), ModuleError> {
        Ok(())
    }

    fn process(&self, _event: &Event) -> Result<Option<Event>, ModuleError> {
        Ok(None)
    }

    fn health_check(&self) -> HealthStatus {
        match self.manager() {
            Some(manager) if manager.module_names().iter().any(|n| n == "registry_reader") => {
                HealthStatus::Healthy
            }
            _ => HealthStatus::Degraded,
        }
    }
}

#[tokio::test]
async fn test_modules_may_call_back_into_manager() {
    let manager = Arc::new(CommunicationManager::new(fast_config(), None).unwrap());
    manager.register_module(Arc::new(AckModule::new())).unwrap();

    let reader = Arc::new(RegistryReader::default());
    assert!(reader.manager.set(Arc::downgrade(&manager)).is_ok());
    manager.register_module(reader.clone()).unwrap();

    assert_eq!(*reader.seen_at_start.lock().unwrap(), vec!["ack".to_string()]);
    let health = manager.health();
    assert_eq!(health.get("registry_reader"), Some(&HealthStatus::Healthy));
    assert_eq!(manager.overall_health(), HealthStatus::Healthy);

    assert!(matches!(
        manager.register_module(Arc::new(RegistryReader::default())),
        Err(BusError::Duplicate(_))
    ));
    manager.shutdown().await;
}
