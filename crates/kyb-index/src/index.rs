//! Keyword index: raw snapshot plus compiled, read-only lookup structures
//!
//! A `KeywordIndex` is never mutated after build. Weight adjustments and
//! reloads produce a new index which callers swap in behind an `Arc`.

use crate::error::IndexError;
use crate::normalize::normalize;
use kyb_domain::confidence::clamp_unit;
use kyb_domain::traits::KeywordSource;
use kyb_domain::{
    ClassificationCode, CodeType, Industry, IndustryId, Keyword, KeywordId, MatchOwner,
    MatchTarget, RiskKeyword,
};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

/// Upper bound on compiled program size for a single keyword pattern
const PATTERN_SIZE_LIMIT: usize = 1 << 20;

/// Raw reference data as read from a [`KeywordSource`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexSnapshot {
    /// Industries
    pub industries: Vec<Industry>,
    /// Industry keywords
    pub keywords: Vec<Keyword>,
    /// Risk keywords
    pub risk_keywords: Vec<RiskKeyword>,
    /// Classification codes
    pub codes: Vec<ClassificationCode>,
}

impl IndexSnapshot {
    /// Read every active row from the source
    ///
    /// An empty source yields an empty snapshot, not an error.
    pub fn load(source: &dyn KeywordSource) -> Result<Self, IndexError> {
        let industries: Vec<Industry> = source
            .list_industries()?
            .into_iter()
            .filter(|i| i.active)
            .collect();

        let mut keywords = Vec::new();
        let mut codes = Vec::new();
        for industry in &industries {
            keywords.extend(source.list_keywords(industry.id)?);
            codes.extend(source.list_codes(industry.id)?);
        }

        let risk_keywords = source.list_risk_keywords()?;

        let mut snapshot = Self {
            industries,
            keywords,
            risk_keywords,
            codes,
        };
        snapshot.canonicalize();
        Ok(snapshot)
    }

    /// Drop inactive and orphaned rows, clamp weights, sort by id
    pub fn canonicalize(&mut self) {
        self.industries.retain(|i| i.active);
        self.industries.sort_by_key(|i| i.id);
        self.industries.dedup_by_key(|i| i.id);

        let live: Vec<IndustryId> = self.industries.iter().map(|i| i.id).collect();

        self.keywords
            .retain(|k| k.active && live.binary_search(&k.industry_id).is_ok());
        for kw in &mut self.keywords {
            kw.base_weight = clamp_unit(kw.base_weight);
        }
        self.keywords.sort_by_key(|k| k.id);

        self.risk_keywords.retain(|k| k.active);
        for kw in &mut self.risk_keywords {
            kw.base_weight = clamp_unit(kw.base_weight);
        }
        self.risk_keywords.sort_by_key(|k| k.id);

        self.codes
            .retain(|c| live.binary_search(&c.industry_id).is_ok());
        self.codes.sort_by(|a, b| {
            (a.industry_id, a.code_type, &a.code).cmp(&(b.industry_id, b.code_type, &b.code))
        });
        self.codes.dedup();
    }

    /// SHA-256 over the serialized snapshot, hex encoded
    pub fn fingerprint(&self) -> String {
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        hex::encode(Sha256::digest(&bytes))
    }

    /// True when there is nothing to match against
    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty() && self.risk_keywords.is_empty()
    }
}

#[derive(Debug, Clone)]
pub(crate) struct CompiledPattern {
    pub(crate) regex: Regex,
    pub(crate) multiplier: Option<f64>,
}

/// One matchable term: an industry keyword or a risk keyword
#[derive(Debug, Clone)]
pub(crate) struct CompiledTerm {
    pub(crate) target: MatchTarget,
    pub(crate) owner: MatchOwner,
    pub(crate) text: String,
    pub(crate) weight: f64,
    pub(crate) synonyms: Vec<String>,
    pub(crate) patterns: Vec<CompiledPattern>,
}

fn compile_pattern(
    name: &str,
    pattern: &str,
    errors: &mut Vec<IndexError>,
) -> Option<Regex> {
    match RegexBuilder::new(pattern)
        .case_insensitive(true)
        .size_limit(PATTERN_SIZE_LIMIT)
        .build()
    {
        Ok(regex) => Some(regex),
        Err(e) => {
            warn!(keyword = name, error = %e, "Skipping keyword pattern that failed to compile");
            errors.push(IndexError::PatternCompile {
                name: name.to_string(),
                message: e.to_string(),
            });
            None
        }
    }
}

fn normalized_synonyms(text: &str, synonyms: &[String]) -> Vec<String> {
    let mut out: Vec<String> = synonyms
        .iter()
        .map(|s| normalize(s))
        .filter(|s| !s.is_empty() && s != text)
        .collect();
    out.sort();
    out.dedup();
    out
}

/// Compiled, read-only keyword index
///
/// Cheap to share behind an `Arc`; every lookup takes `&self`.
#[derive(Debug, Clone)]
pub struct KeywordIndex {
    version: u64,
    fingerprint: String,
    snapshot: IndexSnapshot,
    industries: BTreeMap<IndustryId, Industry>,
    industry_terms: Vec<CompiledTerm>,
    risk_terms: Vec<CompiledTerm>,
    risk_keywords: BTreeMap<KeywordId, RiskKeyword>,
    codes: BTreeMap<IndustryId, Vec<ClassificationCode>>,
    restrictions: HashMap<(CodeType, String), Vec<KeywordId>>,
    compile_errors: Vec<IndexError>,
}

impl KeywordIndex {
    /// An index with no data
    pub fn empty() -> Self {
        Self::build(IndexSnapshot::default(), 0)
    }

    /// Compile a snapshot into an index
    ///
    /// Keywords whose pattern fails to compile keep their exact and synonym
    /// forms; the failure is logged and reported in [`compile_errors`].
    ///
    /// [`compile_errors`]: KeywordIndex::compile_errors
    pub fn build(mut snapshot: IndexSnapshot, version: u64) -> Self {
        snapshot.canonicalize();
        let fingerprint = snapshot.fingerprint();
        let mut compile_errors = Vec::new();

        let industries: BTreeMap<IndustryId, Industry> = snapshot
            .industries
            .iter()
            .map(|i| (i.id, i.clone()))
            .collect();

        let mut industry_terms = Vec::with_capacity(snapshot.keywords.len());
        for kw in &snapshot.keywords {
            let text = normalize(&kw.text);
            if text.is_empty() {
                warn!(keyword_id = %kw.id, "Skipping keyword with empty normalized text");
                continue;
            }
            let label = format!("keyword:{}", kw.id);
            let patterns = kw
                .pattern
                .as_deref()
                .and_then(|p| compile_pattern(&label, p, &mut compile_errors))
                .map(|regex| CompiledPattern {
                    regex,
                    multiplier: kw.pattern_multiplier.map(clamp_unit),
                })
                .into_iter()
                .collect();

            industry_terms.push(CompiledTerm {
                target: MatchTarget::Keyword(kw.id),
                owner: MatchOwner::Industry {
                    industry_id: kw.industry_id,
                },
                synonyms: normalized_synonyms(&text, &kw.synonyms),
                text,
                weight: kw.base_weight,
                patterns,
            });
        }

        let mut risk_terms = Vec::with_capacity(snapshot.risk_keywords.len());
        let mut restrictions: HashMap<(CodeType, String), Vec<KeywordId>> = HashMap::new();
        for kw in &snapshot.risk_keywords {
            for code_type in [CodeType::Mcc, CodeType::Naics, CodeType::Sic] {
                for code in kw.restricted_codes(code_type) {
                    restrictions
                        .entry((code_type, code.trim().to_string()))
                        .or_default()
                        .push(kw.id);
                }
            }

            let text = normalize(&kw.text);
            if text.is_empty() {
                continue;
            }
            let label = format!("risk_keyword:{}", kw.id);
            let patterns = kw
                .patterns
                .iter()
                .filter_map(|p| compile_pattern(&label, p, &mut compile_errors))
                .map(|regex| CompiledPattern {
                    regex,
                    multiplier: None,
                })
                .collect();

            risk_terms.push(CompiledTerm {
                target: MatchTarget::RiskKeyword(kw.id),
                owner: MatchOwner::Risk {
                    category: kw.category,
                    severity: kw.severity,
                },
                synonyms: normalized_synonyms(&text, &kw.synonyms),
                text,
                weight: kw.base_weight,
                patterns,
            });
        }

        let mut codes: BTreeMap<IndustryId, Vec<ClassificationCode>> = BTreeMap::new();
        for code in &snapshot.codes {
            codes.entry(code.industry_id).or_default().push(code.clone());
        }

        let risk_keywords = snapshot
            .risk_keywords
            .iter()
            .map(|k| (k.id, k.clone()))
            .collect();

        debug!(
            version,
            industries = industries.len(),
            keywords = industry_terms.len(),
            risk_keywords = risk_terms.len(),
            compile_errors = compile_errors.len(),
            "Built keyword index"
        );

        Self {
            version,
            fingerprint,
            snapshot,
            industries,
            industry_terms,
            risk_terms,
            risk_keywords,
            codes,
            restrictions,
            compile_errors,
        }
    }

    /// Produce a new index with one keyword's weight moved by `delta`
    ///
    /// The result is clamped to [0, 1] and carries `version + 1`. `self` is
    /// left untouched so in-flight readers keep a consistent view.
    pub fn adjust_weight(&self, target: &MatchTarget, delta: f64) -> Result<Self, IndexError> {
        let mut snapshot = self.snapshot.clone();
        let weight = match target {
            MatchTarget::Keyword(id) => snapshot
                .keywords
                .iter_mut()
                .find(|k| k.id == *id)
                .map(|k| &mut k.base_weight),
            MatchTarget::RiskKeyword(id) => snapshot
                .risk_keywords
                .iter_mut()
                .find(|k| k.id == *id)
                .map(|k| &mut k.base_weight),
            MatchTarget::Pattern(_) | MatchTarget::Code(_) => None,
        };

        let weight = weight
            .ok_or_else(|| IndexError::InvalidData(format!("no adjustable weight for {}", target)))?;
        *weight = clamp_unit(*weight + delta);

        Ok(Self::build(snapshot, self.version + 1))
    }

    /// Monotonic version assigned by the loader
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Content fingerprint of the underlying snapshot
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// The canonical snapshot this index was built from
    pub fn snapshot(&self) -> &IndexSnapshot {
        &self.snapshot
    }

    /// Patterns that failed to compile during build
    pub fn compile_errors(&self) -> &[IndexError] {
        &self.compile_errors
    }

    /// Look up an industry
    pub fn industry(&self, id: IndustryId) -> Option<&Industry> {
        self.industries.get(&id)
    }

    /// All industries, ordered by id
    pub fn industries(&self) -> impl Iterator<Item = &Industry> {
        self.industries.values()
    }

    /// Classification codes of an industry, ordered by type then code
    pub fn codes_for(&self, id: IndustryId) -> &[ClassificationCode] {
        self.codes.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Look up a risk keyword
    pub fn risk_keyword(&self, id: KeywordId) -> Option<&RiskKeyword> {
        self.risk_keywords.get(&id)
    }

    /// Risk keywords whose restriction list contains `code`
    pub fn restricted_by(&self, code_type: CodeType, code: &str) -> Vec<&RiskKeyword> {
        self.restrictions
            .get(&(code_type, code.trim().to_string()))
            .map(|ids| ids.iter().filter_map(|id| self.risk_keywords.get(id)).collect())
            .unwrap_or_default()
    }

    /// Number of industries
    pub fn industry_count(&self) -> usize {
        self.industries.len()
    }

    /// Number of matchable industry keywords
    pub fn keyword_count(&self) -> usize {
        self.industry_terms.len()
    }

    /// Number of matchable risk keywords
    pub fn risk_keyword_count(&self) -> usize {
        self.risk_terms.len()
    }

    /// True when there is nothing to match against
    pub fn is_empty(&self) -> bool {
        self.industry_terms.is_empty() && self.risk_terms.is_empty()
    }

    pub(crate) fn industry_terms(&self) -> &[CompiledTerm] {
        &self.industry_terms
    }

    pub(crate) fn risk_terms(&self) -> &[CompiledTerm] {
        &self.risk_terms
    }
}

impl Default for KeywordIndex {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kyb_domain::{RiskCategory, RiskSeverity};

    fn snapshot() -> IndexSnapshot {
        let mut closed = Industry::new(3, "Closed", "Misc");
        closed.active = false;
        IndexSnapshot {
            industries: vec![
                Industry::new(2, "Bakery", "Food & Beverage"),
                Industry::new(1, "Coffee Shop", "Food & Beverage"),
                closed,
            ],
            keywords: vec![
                Keyword::new(10, 1, "Coffee", 0.9).with_synonyms(["Java", "coffee"]),
                Keyword::new(11, 2, "bakery", 0.95),
                Keyword::new(12, 3, "closed", 0.5),
                Keyword::new(13, 1, "roaster", 0.8).with_pattern("roast(", None),
            ],
            risk_keywords: vec![RiskKeyword::new(
                1,
                "gambling",
                RiskCategory::Prohibited,
                RiskSeverity::High,
            )
            .restricting(CodeType::Mcc, "7995")],
            codes: vec![
                ClassificationCode::new(1, CodeType::Mcc, "5814", "Fast Food Restaurants"),
                ClassificationCode::new(1, CodeType::Naics, "722515", "Snack Bars"),
                ClassificationCode::new(3, CodeType::Mcc, "0000", "Closed"),
            ],
        }
    }

    #[test]
    fn test_build_drops_inactive() {
        let index = KeywordIndex::build(snapshot(), 1);
        assert_eq!(index.industry_count(), 2);
        assert_eq!(index.keyword_count(), 3);
        assert!(index.industry(IndustryId(3)).is_none());
        assert!(index.codes_for(IndustryId(3)).is_empty());
    }

    #[test]
    fn test_bad_pattern_reported_not_fatal() {
        let index = KeywordIndex::build(snapshot(), 1);
        assert_eq!(index.compile_errors().len(), 1);
        assert!(matches!(
            &index.compile_errors()[0],
            IndexError::PatternCompile { name, .. } if name == "keyword:13"
        ));
        // the keyword itself stays matchable
        assert!(index
            .industry_terms()
            .iter()
            .any(|t| t.target == MatchTarget::Keyword(KeywordId(13))));
    }

    #[test]
    fn test_synonyms_normalized_and_deduped() {
        let index = KeywordIndex::build(snapshot(), 1);
        let coffee = index
            .industry_terms()
            .iter()
            .find(|t| t.target == MatchTarget::Keyword(KeywordId(10)))
            .unwrap();
        assert_eq!(coffee.text, "coffee");
        assert_eq!(coffee.synonyms, vec!["java".to_string()]);
    }

    #[test]
    fn test_codes_and_restrictions() {
        let index = KeywordIndex::build(snapshot(), 1);
        let codes = index.codes_for(IndustryId(1));
        assert_eq!(codes.len(), 2);
        assert_eq!(codes[0].code_type, CodeType::Naics);

        let restricted = index.restricted_by(CodeType::Mcc, "7995");
        assert_eq!(restricted.len(), 1);
        assert_eq!(restricted[0].text, "gambling");
        assert!(index.restricted_by(CodeType::Naics, "7995").is_empty());
    }

    #[test]
    fn test_fingerprint_stable_across_ordering() {
        let a = KeywordIndex::build(snapshot(), 1);
        let mut reordered = snapshot();
        reordered.keywords.reverse();
        reordered.industries.reverse();
        let b = KeywordIndex::build(reordered, 2);
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().len(), 64);
    }

    #[test]
    fn test_adjust_weight_copy_on_write() {
        let index = KeywordIndex::build(snapshot(), 4);
        let adjusted = index
            .adjust_weight(&MatchTarget::Keyword(KeywordId(10)), 0.5)
            .unwrap();

        assert_eq!(adjusted.version(), 5);
        assert_ne!(adjusted.fingerprint(), index.fingerprint());

        let weight = |idx: &KeywordIndex| {
            idx.snapshot()
                .keywords
                .iter()
                .find(|k| k.id == KeywordId(10))
                .map(|k| k.base_weight)
        };
        assert_eq!(weight(&index), Some(0.9));
        assert_eq!(weight(&adjusted), Some(1.0));

        let lowered = adjusted
            .adjust_weight(&MatchTarget::Keyword(KeywordId(10)), -5.0)
            .unwrap();
        assert_eq!(weight(&lowered), Some(0.0));
    }

    #[test]
    fn test_adjust_unknown_keyword() {
        let index = KeywordIndex::build(snapshot(), 1);
        let err = index
            .adjust_weight(&MatchTarget::Keyword(KeywordId(999)), 0.1)
            .unwrap_err();
        assert!(matches!(err, IndexError::InvalidData(_)));
    }

    #[test]
    fn test_empty_index() {
        let index = KeywordIndex::empty();
        assert!(index.is_empty());
        assert_eq!(index.industry_count(), 0);
    }
}
