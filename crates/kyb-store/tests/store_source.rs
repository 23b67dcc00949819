//! Integration tests for the SQLite keyword source

use kyb_domain::traits::{EventStore, KeywordSource};
use kyb_domain::{
    ClassificationCode, CodeType, Event, EventType, Industry, IndustryId, Keyword, RiskCategory, RiskKeyword,
    RiskSeverity,
};
use kyb_index::reference::reference_snapshot;
use kyb_index::IndexSnapshot;
use kyb_store::SqliteStore;
use tempfile::TempDir;

fn seeded() -> SqliteStore {
    let store = SqliteStore::in_memory().unwrap();
    store.seed_reference().unwrap();
    store
}

#[test]
fn test_seed_reference_counts() {
    let store = SqliteStore::in_memory().unwrap();
    assert!(store.is_empty().unwrap());

    let summary = store.seed_reference().unwrap();
    let reference = reference_snapshot();
    assert_eq!(summary.industries, reference.industries.len());
    assert_eq!(summary.keywords, reference.keywords.len());
    assert_eq!(summary.risk_keywords, reference.risk_keywords.len());
    assert_eq!(summary.codes, reference.codes.len());
    assert!(!store.is_empty().unwrap());
}

#[test]
fn test_loaded_snapshot_matches_reference() {
    let store = seeded();
    let loaded = IndexSnapshot::load(&store).unwrap();
    let reference = reference_snapshot();

    assert_eq!(loaded, reference);
    assert_eq!(loaded.fingerprint(), reference.fingerprint());
}

#[test]
fn test_seed_is_idempotent() {
    let store = seeded();
    store.seed_reference().unwrap();
    let loaded = IndexSnapshot::load(&store).unwrap();
    assert_eq!(loaded.fingerprint(), reference_snapshot().fingerprint());
}

#[test]
fn test_list_codes_for_industry() {
    let store = seeded();
    let codes = store.list_codes(IndustryId(1)).unwrap();
    assert_eq!(codes.len(), 3);
    assert!(codes
        .iter()
        .any(|c| c.code_type == CodeType::Naics && c.code == "722515"));
    assert!(codes.iter().all(|c| c.industry_id == IndustryId(1)));
}

#[test]
fn test_deactivated_rows_are_hidden() {
    let store = seeded();
    let coffee_keywords = store.list_keywords(IndustryId(1)).unwrap();
    let first = coffee_keywords[0].id;

    assert!(store.set_keyword_active(first, false).unwrap());
    let remaining = store.list_keywords(IndustryId(1)).unwrap();
    assert_eq!(remaining.len(), coffee_keywords.len() - 1);
    assert!(remaining.iter().all(|k| k.id != first));

    assert!(store.set_industry_active(IndustryId(1), false).unwrap());
    let loaded = IndexSnapshot::load(&store).unwrap();
    assert!(loaded.industries.iter().all(|i| i.id != IndustryId(1)));
    assert!(loaded.keywords.iter().all(|k| k.industry_id != IndustryId(1)));
    assert!(loaded.codes.iter().all(|c| c.industry_id != IndustryId(1)));

    assert!(!store.set_industry_active(IndustryId(9999), false).unwrap());
}

#[test]
fn test_upsert_updates_in_place() {
    let store = SqliteStore::in_memory().unwrap();
    store.upsert_industry(&Industry::new(42, "Bike Shop", "Retail")).unwrap();
    store
        .upsert_keyword(&Keyword::new(500, 42, "bicycle", 0.7).with_synonyms(["bike"]))
        .unwrap();
    store
        .upsert_code(&ClassificationCode::new(42, CodeType::Mcc, "5940", "Bicycle Shops"))
        .unwrap();

    store.upsert_industry(&Industry::new(42, "Bicycle Shop", "Retail")).unwrap();
    store
        .upsert_keyword(&Keyword::new(500, 42, "bicycle", 0.9).with_synonyms(["bike", "cycles"]))
        .unwrap();
    store
        .upsert_code(&ClassificationCode::new(42, CodeType::Mcc, "5940", "Bicycle Shops - Sales and Service"))
        .unwrap();

    let industries = store.list_industries().unwrap();
    assert_eq!(industries.len(), 1);
    assert_eq!(industries[0].name, "Bicycle Shop");

    let keywords = store.list_keywords(IndustryId(42)).unwrap();
    assert_eq!(keywords.len(), 1);
    assert_eq!(keywords[0].base_weight, 0.9);
    assert_eq!(keywords[0].synonyms, vec!["bike".to_string(), "cycles".to_string()]);

    let codes = store.list_codes(IndustryId(42)).unwrap();
    assert_eq!(codes.len(), 1);
    assert_eq!(codes[0].description, "Bicycle Shops - Sales and Service");
}

#[test]
fn test_risk_keyword_lists_roundtrip() {
    let store = SqliteStore::in_memory().unwrap();
    let keyword = RiskKeyword::new(7, "online casino", RiskCategory::HighRisk, RiskSeverity::High)
        .with_synonyms(["internet casino"])
        .with_pattern(r"\bcasinos?\b")
        .restricting(CodeType::Mcc, "7995");
    store.upsert_risk_keyword(&keyword).unwrap();

    let listed = store.list_risk_keywords().unwrap();
    assert_eq!(listed, vec![keyword]);
    assert_eq!(listed[0].restricted_codes(CodeType::Mcc), ["7995".to_string()]);
}

#[test]
fn test_record_failed_events() {
    let store = SqliteStore::in_memory().unwrap();
    let event = Event::new(EventType::HighRiskDetected, "risk").with_data("business", "Acme Holdings");

    store.record_failed(&event, "audit", "handler panicked").unwrap();
    store.record_failed(&event, "webhook", "timed out").unwrap();

    let failed = store.failed_events().unwrap();
    assert_eq!(failed.len(), 2);
    assert_eq!(failed[0].subscriber, "audit");
    assert_eq!(failed[0].reason, "handler panicked");
    assert_eq!(failed[0].event.id, event.id);
    assert_eq!(failed[0].event.event_type, EventType::HighRiskDetected);
    assert_eq!(failed[1].subscriber, "webhook");
    assert!(failed[0].recorded_at > 0);
}

#[test]
fn test_file_store_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("kyb.db");
    {
        let store = SqliteStore::new(&path).unwrap();
        store.seed_reference().unwrap();
    }

    let reopened = SqliteStore::new(&path).unwrap();
    assert!(!reopened.is_empty().unwrap());
    let loaded = IndexSnapshot::load(&reopened).unwrap();
    assert_eq!(loaded.fingerprint(), reference_snapshot().fingerprint());
}
