//! SQLite-backed keyword source and event store

use crate::error::StoreError;
use kyb_domain::event::now_millis;
use kyb_domain::traits::{EventStore, KeywordSource, SourceError};
use kyb_domain::{
    ClassificationCode, CodeType, Event, Industry, IndustryId, Keyword, KeywordId, RiskCategory,
    RiskKeyword, RiskSeverity,
};
use kyb_index::IndexSnapshot;
use rusqlite::types::Type;
use rusqlite::{params, Connection, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

/// An event that exhausted its delivery attempts
#[derive(Debug, Clone, PartialEq)]
pub struct FailedEvent {
    /// Row id
    pub id: i64,
    /// The event as published
    pub event: Event,
    /// Subscriber that could not handle it
    pub subscriber: String,
    /// Last failure reason
    pub reason: String,
    /// When it was recorded, ms since epoch
    pub recorded_at: u64,
}

/// Row counts written by a seed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedSummary {
    /// Industries written
    pub industries: usize,
    /// Industry keywords written
    pub keywords: usize,
    /// Risk keywords written
    pub risk_keywords: usize,
    /// Classification codes written
    pub codes: usize,
}

impl SeedSummary {
    /// Total rows written
    pub fn total(&self) -> usize {
        self.industries + self.keywords + self.risk_keywords + self.codes
    }
}

/// SQLite implementation of the reference-data source and the dead-letter store
///
/// The connection sits behind a mutex, so one store can be shared across
/// threads; SQLite serializes writers anyway.
///
/// # Examples
///
/// ```no_run
/// use kyb_domain::traits::KeywordSource;
/// use kyb_store::SqliteStore;
///
/// let store = SqliteStore::new("kyb.db").unwrap();
/// store.seed_reference().unwrap();
/// assert!(!store.list_industries().unwrap().is_empty());
/// ```
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Open (or create) a database at `path`
    ///
    /// Use `:memory:` for an in-memory database (useful for testing).
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// Open a private in-memory database
    pub fn in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(include_str!("schema.sql"))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether no industry rows exist (active or not)
    pub fn is_empty(&self) -> Result<bool, StoreError> {
        let count: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM industries", [], |row| row.get(0))?;
        Ok(count == 0)
    }

    /// Upsert every row of a snapshot in one transaction
    pub fn seed(&self, snapshot: &IndexSnapshot) -> Result<SeedSummary, StoreError> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let mut summary = SeedSummary::default();

        for industry in &snapshot.industries {
            upsert_industry(&tx, industry)?;
            summary.industries += 1;
        }
        for keyword in &snapshot.keywords {
            upsert_keyword(&tx, keyword)?;
            summary.keywords += 1;
        }
        for risk in &snapshot.risk_keywords {
            upsert_risk_keyword(&tx, risk)?;
            summary.risk_keywords += 1;
        }
        for code in &snapshot.codes {
            upsert_code(&tx, code)?;
            summary.codes += 1;
        }

        tx.commit()?;
        info!(
            industries = summary.industries,
            keywords = summary.keywords,
            risk_keywords = summary.risk_keywords,
            codes = summary.codes,
            "Seeded reference data"
        );
        Ok(summary)
    }

    /// Seed the built-in reference data set
    pub fn seed_reference(&self) -> Result<SeedSummary, StoreError> {
        self.seed(&kyb_index::reference::reference_snapshot())
    }

    /// Insert or replace one industry
    pub fn upsert_industry(&self, industry: &Industry) -> Result<(), StoreError> {
        upsert_industry(&self.conn(), industry)
    }

    /// Insert or replace one industry keyword
    pub fn upsert_keyword(&self, keyword: &Keyword) -> Result<(), StoreError> {
        upsert_keyword(&self.conn(), keyword)
    }

    /// Insert or replace one risk keyword
    pub fn upsert_risk_keyword(&self, keyword: &RiskKeyword) -> Result<(), StoreError> {
        upsert_risk_keyword(&self.conn(), keyword)
    }

    /// Insert or replace one classification code
    pub fn upsert_code(&self, code: &ClassificationCode) -> Result<(), StoreError> {
        upsert_code(&self.conn(), code)
    }

    /// Activate or deactivate an industry; returns whether the row exists
    pub fn set_industry_active(&self, id: IndustryId, active: bool) -> Result<bool, StoreError> {
        let changed = self.conn().execute(
            "UPDATE industries SET active = ?1 WHERE id = ?2",
            params![active, id.0],
        )?;
        Ok(changed > 0)
    }

    /// Activate or deactivate an industry keyword; returns whether the row exists
    pub fn set_keyword_active(&self, id: KeywordId, active: bool) -> Result<bool, StoreError> {
        let changed = self.conn().execute(
            "UPDATE keywords SET active = ?1 WHERE id = ?2",
            params![active, id.0],
        )?;
        Ok(changed > 0)
    }

    /// Dead-lettered events, oldest first
    pub fn failed_events(&self) -> Result<Vec<FailedEvent>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, event_json, subscriber, reason, recorded_at
             FROM failed_events ORDER BY id",
        )?;
        let events = stmt
            .query_map([], |row| {
                let raw: String = row.get(1)?;
                let event: Event = serde_json::from_str(&raw)
                    .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e)))?;
                Ok(FailedEvent {
                    id: row.get(0)?,
                    event,
                    subscriber: row.get(2)?,
                    reason: row.get(3)?,
                    recorded_at: row.get::<_, i64>(4)? as u64,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(events)
    }

    fn record_failed_event(&self, event: &Event, subscriber: &str, reason: &str) -> Result<(), StoreError> {
        let json = serde_json::to_string(event)?;
        self.conn().execute(
            "INSERT INTO failed_events (event_id, event_type, subscriber, reason, event_json, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                &event.id,
                event.event_type.as_str(),
                subscriber,
                reason,
                json,
                now_millis() as i64,
            ],
        )?;
        debug!(event_id = %event.id, subscriber, "Recorded failed event");
        Ok(())
    }

    fn query_industries(&self) -> Result<Vec<Industry>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, name, category, confidence_threshold, active
             FROM industries WHERE active = 1 ORDER BY id",
        )?;
        let industries = stmt
            .query_map([], |row| {
                Ok(Industry {
                    id: IndustryId(row.get(0)?),
                    name: row.get(1)?,
                    category: row.get(2)?,
                    confidence_threshold: row.get(3)?,
                    active: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(industries)
    }

    fn query_keywords(&self, industry: IndustryId) -> Result<Vec<Keyword>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, industry_id, text, base_weight, active, synonyms, pattern, pattern_multiplier
             FROM keywords WHERE industry_id = ?1 AND active = 1 ORDER BY id",
        )?;
        let keywords = stmt
            .query_map(params![industry.0], |row| {
                Ok(Keyword {
                    id: KeywordId(row.get(0)?),
                    industry_id: IndustryId(row.get(1)?),
                    text: row.get(2)?,
                    base_weight: row.get(3)?,
                    active: row.get(4)?,
                    synonyms: json_list(row, 5)?,
                    pattern: row.get(6)?,
                    pattern_multiplier: row.get(7)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(keywords)
    }

    fn query_risk_keywords(&self) -> Result<Vec<RiskKeyword>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, text, base_weight, synonyms, patterns, category, severity,
                    mcc_codes, naics_codes, sic_codes, active
             FROM risk_keywords WHERE active = 1 ORDER BY id",
        )?;
        let keywords = stmt
            .query_map([], |row| {
                let category: String = row.get(5)?;
                let severity: String = row.get(6)?;
                Ok(RiskKeyword {
                    id: KeywordId(row.get(0)?),
                    text: row.get(1)?,
                    base_weight: row.get(2)?,
                    synonyms: json_list(row, 3)?,
                    patterns: json_list(row, 4)?,
                    category: RiskCategory::parse(&category)
                        .ok_or_else(|| invalid(5, format!("unknown risk category: {}", category)))?,
                    severity: RiskSeverity::parse(&severity)
                        .ok_or_else(|| invalid(6, format!("unknown risk severity: {}", severity)))?,
                    mcc_codes: json_list(row, 7)?,
                    naics_codes: json_list(row, 8)?,
                    sic_codes: json_list(row, 9)?,
                    active: row.get(10)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(keywords)
    }

    fn query_codes(&self, industry: IndustryId) -> Result<Vec<ClassificationCode>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT industry_id, code_type, code, description
             FROM classification_codes WHERE industry_id = ?1 ORDER BY code_type, code",
        )?;
        let codes = stmt
            .query_map(params![industry.0], |row| {
                let code_type: String = row.get(1)?;
                Ok(ClassificationCode {
                    industry_id: IndustryId(row.get(0)?),
                    code_type: CodeType::parse(&code_type)
                        .ok_or_else(|| invalid(1, format!("unknown code type: {}", code_type)))?,
                    code: row.get(2)?,
                    description: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(codes)
    }
}

impl KeywordSource for SqliteStore {
    fn list_industries(&self) -> Result<Vec<Industry>, SourceError> {
        Ok(self.query_industries()?)
    }

    fn list_keywords(&self, industry: IndustryId) -> Result<Vec<Keyword>, SourceError> {
        Ok(self.query_keywords(industry)?)
    }

    fn list_risk_keywords(&self) -> Result<Vec<RiskKeyword>, SourceError> {
        Ok(self.query_risk_keywords()?)
    }

    fn list_codes(&self, industry: IndustryId) -> Result<Vec<ClassificationCode>, SourceError> {
        Ok(self.query_codes(industry)?)
    }
}

impl EventStore for SqliteStore {
    fn record_failed(&self, event: &Event, subscriber: &str, reason: &str) -> Result<(), SourceError> {
        Ok(self.record_failed_event(event, subscriber, reason)?)
    }
}

fn invalid(column: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(StoreError::InvalidData(message)))
}

fn json_list(row: &Row<'_>, column: usize) -> rusqlite::Result<Vec<String>> {
    let raw: String = row.get(column)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(e)))
}

fn upsert_industry(conn: &Connection, industry: &Industry) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO industries (id, name, category, confidence_threshold, active)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(id) DO UPDATE SET
         name = excluded.name, category = excluded.category,
         confidence_threshold = excluded.confidence_threshold, active = excluded.active",
        params![
            industry.id.0,
            &industry.name,
            &industry.category,
            industry.confidence_threshold,
            industry.active,
        ],
    )?;
    Ok(())
}

fn upsert_keyword(conn: &Connection, keyword: &Keyword) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO keywords (id, industry_id, text, base_weight, active, synonyms, pattern, pattern_multiplier)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(id) DO UPDATE SET
         industry_id = excluded.industry_id, text = excluded.text,
         base_weight = excluded.base_weight, active = excluded.active,
         synonyms = excluded.synonyms, pattern = excluded.pattern,
         pattern_multiplier = excluded.pattern_multiplier",
        params![
            keyword.id.0,
            keyword.industry_id.0,
            &keyword.text,
            keyword.base_weight,
            keyword.active,
            serde_json::to_string(&keyword.synonyms)?,
            &keyword.pattern,
            keyword.pattern_multiplier,
        ],
    )?;
    Ok(())
}

fn upsert_risk_keyword(conn: &Connection, keyword: &RiskKeyword) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO risk_keywords (id, text, base_weight, synonyms, patterns, category, severity,
                                    mcc_codes, naics_codes, sic_codes, active)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
         ON CONFLICT(id) DO UPDATE SET
         text = excluded.text, base_weight = excluded.base_weight,
         synonyms = excluded.synonyms, patterns = excluded.patterns,
         category = excluded.category, severity = excluded.severity,
         mcc_codes = excluded.mcc_codes, naics_codes = excluded.naics_codes,
         sic_codes = excluded.sic_codes, active = excluded.active",
        params![
            keyword.id.0,
            &keyword.text,
            keyword.base_weight,
            serde_json::to_string(&keyword.synonyms)?,
            serde_json::to_string(&keyword.patterns)?,
            keyword.category.as_str(),
            keyword.severity.as_str(),
            serde_json::to_string(&keyword.mcc_codes)?,
            serde_json::to_string(&keyword.naics_codes)?,
            serde_json::to_string(&keyword.sic_codes)?,
            keyword.active,
        ],
    )?;
    Ok(())
}

fn upsert_code(conn: &Connection, code: &ClassificationCode) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO classification_codes (industry_id, code_type, code, description)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(industry_id, code_type, code) DO UPDATE SET description = excluded.description",
        params![
            code.industry_id.0,
            code.code_type.as_str(),
            &code.code,
            &code.description,
        ],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_initialization() {
        let store = SqliteStore::in_memory().unwrap();
        assert!(store.is_empty().unwrap());
        assert!(store.list_industries().unwrap().is_empty());
    }

    #[test]
    fn test_schema_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kyb.db");
        SqliteStore::new(&path).unwrap().seed_reference().unwrap();
        let reopened = SqliteStore::new(&path).unwrap();
        assert!(!reopened.is_empty().unwrap());
    }

    #[test]
    fn test_unknown_category_is_invalid_data() {
        let store = SqliteStore::in_memory().unwrap();
        store
            .conn()
            .execute(
                "INSERT INTO risk_keywords (id, text, category, severity) VALUES (1, 'x', 'bogus', 'low')",
                [],
            )
            .unwrap();
        let err = store.list_risk_keywords().unwrap_err();
        assert!(matches!(err, SourceError::InvalidData(_)));
    }
}
