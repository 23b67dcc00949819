//! Engine behaviour over the disk cache and the SQLite keyword store

use kyb_bus::{BusConfig, FnHandler, HandlerError};
use kyb_cache::CacheConfig;
use kyb_domain::traits::{EventStore, KeywordSource};
use kyb_domain::{ClassificationRequest, Event, EventType, IndustryId, MatchTarget};
use kyb_engine::{Engine, EngineConfig, EngineError, IndexLoadConfig, IndexOrigin};
use kyb_index::InMemorySource;
use kyb_store::SqliteStore;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn config(cache_dir: Option<&TempDir>) -> EngineConfig {
    EngineConfig {
        cache: cache_dir.map(|dir| CacheConfig::small(dir.path())),
        bus: BusConfig {
            workers: 2,
            max_attempts: 1,
            initial_backoff_ms: 1,
            max_backoff_ms: 5,
            shutdown_grace_ms: 2_000,
            ..BusConfig::default()
        },
        index: IndexLoadConfig {
            initial_backoff_ms: 1,
            max_backoff_ms: 4,
            ..IndexLoadConfig::default()
        },
        ..EngineConfig::default()
    }
}

fn coffee() -> ClassificationRequest {
    ClassificationRequest::new("Joe's Coffee Shop")
        .with_description("neighborhood cafe serving espresso and pastries")
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

#[tokio::test]
async fn test_results_are_cached() {
    let dir = TempDir::new().unwrap();
    let engine = Engine::builder(config(Some(&dir))).build().await.unwrap();

    let first = engine.classify(&coffee()).await.unwrap();
    let second = engine.classify(&coffee()).await.unwrap();
    assert_eq!(first, second);

    let metrics = engine.metrics();
    assert_eq!(metrics.classifications, 2);
    assert_eq!(metrics.result_cache_hits, 1);

    let health = engine.health();
    assert_eq!(health.modules.len(), 3);
    assert!(health.cache.unwrap().hits >= 1);
    engine.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_degraded_results_are_not_cached() {
    let dir = TempDir::new().unwrap();
    let engine = Engine::builder(config(Some(&dir))).build().await.unwrap();

    let request = coffee().with_website("https://joes.test");
    let first = engine.classify(&request).await.unwrap();
    assert!(!first.degraded.is_empty());
    engine.classify(&request).await.unwrap();

    assert_eq!(engine.metrics().result_cache_hits, 0);
}

#[tokio::test]
async fn test_cached_snapshot_survives_source_outage() {
    let dir = TempDir::new().unwrap();
    let source = InMemorySource::reference();

    let first = Engine::builder(config(Some(&dir)))
        .source(Arc::new(source.clone()))
        .build()
        .await
        .unwrap();
    let fingerprint = first.index().fingerprint().to_string();
    first.shutdown().await.unwrap();

    source.set_available(false);
    let second = Engine::builder(config(Some(&dir)))
        .source(Arc::new(source))
        .build()
        .await
        .unwrap();

    let health = second.health();
    assert_eq!(health.index.origin, IndexOrigin::Cache);
    assert_eq!(health.index.fingerprint, fingerprint);
    let result = second.classify(&coffee()).await.unwrap();
    assert_eq!(result.primary_industry.name, "Coffee Shop");
}

#[tokio::test]
async fn test_snapshot_outlives_result_traffic() {
    let dir = TempDir::new().unwrap();
    let source = InMemorySource::reference();
    let mut small = config(Some(&dir));
    small.cache = Some(CacheConfig::small(dir.path()).with_caps(4, 1024 * 1024));

    let first = Engine::builder(small.clone())
        .source(Arc::new(source.clone()))
        .build()
        .await
        .unwrap();
    for i in 0..6 {
        let request = ClassificationRequest::new(format!("Joe's Coffee Shop {}", i))
            .with_description("neighborhood cafe serving espresso");
        let result = first.classify(&request).await.unwrap();
        assert!(result.degraded.is_empty());
    }
    assert!(first.health().cache.unwrap().evictions >= 3);
    first.shutdown().await.unwrap();

    source.set_available(false);
    let second = Engine::builder(small)
        .source(Arc::new(source))
        .build()
        .await
        .unwrap();
    assert_eq!(second.health().index.origin, IndexOrigin::Cache);
    let result = second.classify(&coffee()).await.unwrap();
    assert_eq!(result.primary_industry.name, "Coffee Shop");
}

#[tokio::test]
async fn test_refresh_during_outage_keeps_adjusted_index() {
    let dir = TempDir::new().unwrap();
    let source = InMemorySource::reference();
    let engine = Engine::builder(config(Some(&dir)))
        .source(Arc::new(source.clone()))
        .build()
        .await
        .unwrap();
    let target = MatchTarget::Keyword(engine.index().snapshot().keywords[0].id);
    let adjusted = engine.adjust_keyword_weight(&target, -0.3).await.unwrap();

    source.set_available(false);
    let result = engine.refresh_index().await;
    assert!(matches!(result, Err(EngineError::SourceUnavailable(_))));

    let health = engine.health();
    assert_eq!(health.index.version, adjusted.version);
    assert_eq!(health.index.fingerprint, adjusted.fingerprint);
    assert_eq!(health.index.origin, IndexOrigin::Adjusted);
}

#[tokio::test]
async fn test_store_backed_engine_follows_refresh() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    store.seed_reference().unwrap();

    let engine = Engine::builder(config(Some(&dir)))
        .source(Arc::clone(&store) as Arc<dyn KeywordSource>)
        .build()
        .await
        .unwrap();
    let before = engine.classify(&coffee()).await.unwrap();
    assert_eq!(before.primary_industry.name, "Coffee Shop");
    let old_fingerprint = engine.index().fingerprint().to_string();

    assert!(store.set_industry_active(IndustryId(1), false).unwrap());
    let info = engine.refresh_index().await.unwrap();
    assert_ne!(info.fingerprint, old_fingerprint);
    assert_eq!(info.origin, IndexOrigin::Source);

    let after = engine.classify(&coffee()).await.unwrap();
    assert_ne!(after.primary_industry.industry_id, IndustryId(1));
    assert_eq!(engine.metrics().result_cache_hits, 0);
    assert_eq!(engine.metrics().index_swaps, 1);
}

#[tokio::test]
async fn test_failed_deliveries_are_dead_lettered() {
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    store.seed_reference().unwrap();

    let engine = Engine::builder(config(None))
        .source(Arc::clone(&store) as Arc<dyn KeywordSource>)
        .event_store(Arc::clone(&store) as Arc<dyn EventStore>)
        .build()
        .await
        .unwrap();
    engine.bus().events().subscribe(
        "broken_webhook",
        EventType::ClassificationCompleted,
        Arc::new(FnHandler::new(|_: &Event| {
            Err(HandlerError::Fatal("endpoint gone".to_string()))
        })),
    );

    engine.classify(&coffee()).await.unwrap();

    wait_until(|| !store.failed_events().unwrap().is_empty()).await;
    let failed = store.failed_events().unwrap();
    assert_eq!(failed[0].subscriber, "broken_webhook");
    assert_eq!(failed[0].event.event_type, EventType::ClassificationCompleted);
    assert!(failed[0].reason.contains("endpoint gone"));
}
