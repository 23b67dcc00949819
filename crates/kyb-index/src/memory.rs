//! In-memory keyword source

use crate::index::IndexSnapshot;
use crate::reference::reference_snapshot;
use kyb_domain::traits::{KeywordSource, SourceError};
use kyb_domain::{ClassificationCode, Industry, IndustryId, Keyword, RiskKeyword};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// A [`KeywordSource`] backed by a snapshot held in memory
///
/// Availability can be toggled to exercise retry and fallback paths. Clones
/// share the availability flag and the call counter.
///
/// # Examples
///
/// ```
/// use kyb_domain::traits::KeywordSource;
/// use kyb_index::InMemorySource;
///
/// let source = InMemorySource::reference();
/// assert!(!source.list_industries().unwrap().is_empty());
///
/// source.set_available(false);
/// assert!(source.list_industries().is_err());
/// ```
#[derive(Debug, Clone)]
pub struct InMemorySource {
    snapshot: Arc<IndexSnapshot>,
    available: Arc<AtomicBool>,
    calls: Arc<AtomicUsize>,
}

impl InMemorySource {
    /// Serve `snapshot`
    pub fn new(snapshot: IndexSnapshot) -> Self {
        Self {
            snapshot: Arc::new(snapshot),
            available: Arc::new(AtomicBool::new(true)),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Serve the built-in reference data
    pub fn reference() -> Self {
        Self::new(reference_snapshot())
    }

    /// Make every call fail with `Unavailable` (or succeed again)
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of `list_industries` calls, i.e. load attempts
    pub fn load_attempts(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), SourceError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(SourceError::Unavailable("in-memory source switched off".to_string()))
        }
    }
}

impl KeywordSource for InMemorySource {
    fn list_industries(&self) -> Result<Vec<Industry>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        Ok(self
            .snapshot
            .industries
            .iter()
            .filter(|i| i.active)
            .cloned()
            .collect())
    }

    fn list_keywords(&self, industry: IndustryId) -> Result<Vec<Keyword>, SourceError> {
        self.check()?;
        Ok(self
            .snapshot
            .keywords
            .iter()
            .filter(|k| k.active && k.industry_id == industry)
            .cloned()
            .collect())
    }

    fn list_risk_keywords(&self) -> Result<Vec<RiskKeyword>, SourceError> {
        self.check()?;
        Ok(self
            .snapshot
            .risk_keywords
            .iter()
            .filter(|k| k.active)
            .cloned()
            .collect())
    }

    fn list_codes(&self, industry: IndustryId) -> Result<Vec<ClassificationCode>, SourceError> {
        self.check()?;
        Ok(self
            .snapshot
            .codes
            .iter()
            .filter(|c| c.industry_id == industry)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_roundtrip_matches_reference() {
        let source = InMemorySource::reference();
        let loaded = IndexSnapshot::load(&source).unwrap();
        assert_eq!(loaded, reference_snapshot());
        assert_eq!(loaded.fingerprint(), reference_snapshot().fingerprint());
        assert_eq!(source.load_attempts(), 1);
    }

    #[test]
    fn test_unavailable() {
        let source = InMemorySource::reference();
        let clone = source.clone();
        clone.set_available(false);
        let err = IndexSnapshot::load(&source).unwrap_err();
        assert!(matches!(err, crate::IndexError::SourceUnavailable(_)));
        assert_eq!(source.load_attempts(), 1);
    }

    #[test]
    fn test_empty_source_is_empty_snapshot() {
        let source = InMemorySource::new(IndexSnapshot::default());
        let loaded = IndexSnapshot::load(&source).unwrap();
        assert!(loaded.is_empty());
    }
}
