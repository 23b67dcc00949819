//! Exact, synonym and pattern matching of free text against the index

use crate::config::MatcherConfig;
use crate::index::{CompiledTerm, KeywordIndex};
use crate::normalize::{context_window, find_term, normalize_capped};
use kyb_domain::confidence::clamp_unit;
use kyb_domain::{MatchKind, MatchResult, MatchSource};
use std::cmp::Ordering;
use std::collections::HashMap;

/// Shared matching primitive for classification and risk detection
///
/// Pure over the index: no I/O, no interior state. One instance is shared by
/// every request.
///
/// # Examples
///
/// ```
/// use kyb_domain::{Industry, Keyword, MatchSource};
/// use kyb_index::{IndexSnapshot, KeywordIndex, Matcher, MatcherConfig};
///
/// let snapshot = IndexSnapshot {
///     industries: vec![Industry::new(1, "Coffee Shop", "Food & Beverage")],
///     keywords: vec![Keyword::new(1, 1, "espresso", 0.9)],
///     ..Default::default()
/// };
/// let index = KeywordIndex::build(snapshot, 1);
/// let matcher = Matcher::new(MatcherConfig::default());
///
/// let matches = matcher.match_industries("Fresh ESPRESSO daily", &index, MatchSource::Description);
/// assert_eq!(matches.len(), 1);
/// assert_eq!(matches[0].matched_text, "espresso");
/// ```
#[derive(Debug, Clone, Default)]
pub struct Matcher {
    config: MatcherConfig,
}

impl Matcher {
    /// Create a matcher
    pub fn new(config: MatcherConfig) -> Self {
        Self { config }
    }

    /// Active configuration
    pub fn config(&self) -> &MatcherConfig {
        &self.config
    }

    /// Match text against industry keywords
    pub fn match_industries(
        &self,
        text: &str,
        index: &KeywordIndex,
        source: MatchSource,
    ) -> Vec<MatchResult> {
        self.run(text, index.industry_terms(), source)
    }

    /// Match text against risk keywords
    pub fn match_risk(
        &self,
        text: &str,
        index: &KeywordIndex,
        source: MatchSource,
    ) -> Vec<MatchResult> {
        self.run(text, index.risk_terms(), source)
    }

    fn run(&self, text: &str, terms: &[CompiledTerm], source: MatchSource) -> Vec<MatchResult> {
        let normalized = normalize_capped(text, self.config.max_input_chars);
        if normalized.is_empty() || terms.is_empty() {
            return Vec::new();
        }

        let mut matches = Vec::new();
        for term in terms {
            for (start, end) in find_term(&normalized, &term.text) {
                matches.push(self.build(&normalized, term, MatchKind::Exact, start, end, source, term.weight));
            }

            let synonym_conf = term.weight * self.config.synonym_discount;
            for synonym in &term.synonyms {
                for (start, end) in find_term(&normalized, synonym) {
                    matches.push(self.build(&normalized, term, MatchKind::Synonym, start, end, source, synonym_conf));
                }
            }

            for pattern in &term.patterns {
                let multiplier = pattern
                    .multiplier
                    .unwrap_or(self.config.default_pattern_multiplier);
                for found in pattern.regex.find_iter(&normalized) {
                    if found.start() == found.end() {
                        continue;
                    }
                    matches.push(self.build(
                        &normalized,
                        term,
                        MatchKind::Pattern,
                        found.start(),
                        found.end(),
                        source,
                        term.weight * multiplier,
                    ));
                }
            }
        }

        dedup_and_sort(matches)
    }

    #[allow(clippy::too_many_arguments)]
    fn build(
        &self,
        normalized: &str,
        term: &CompiledTerm,
        kind: MatchKind,
        start: usize,
        end: usize,
        source: MatchSource,
        confidence: f64,
    ) -> MatchResult {
        MatchResult {
            target: term.target.clone(),
            kind,
            owner: term.owner,
            matched_text: normalized[start..end].to_string(),
            start,
            end,
            source,
            confidence: clamp_unit(confidence),
            context: context_window(normalized, start, end, self.config.context_chars),
        }
    }
}

/// Order matches by confidence descending, with a total tie-break
pub fn compare_matches(a: &MatchResult, b: &MatchResult) -> Ordering {
    b.confidence
        .partial_cmp(&a.confidence)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.source.cmp(&b.source))
        .then_with(|| a.start.cmp(&b.start))
        .then_with(|| a.target.cmp(&b.target))
        .then_with(|| a.kind.cmp(&b.kind))
}

/// Keep the highest-confidence match per (target, source, span), sorted
pub fn dedup_and_sort(matches: Vec<MatchResult>) -> Vec<MatchResult> {
    let mut best: HashMap<_, MatchResult> = HashMap::with_capacity(matches.len());
    for m in matches {
        let key = m.dedup_key();
        match best.get(&key) {
            Some(existing) if compare_matches(existing, &m) != Ordering::Greater => {}
            _ => {
                best.insert(key, m);
            }
        }
    }

    let mut out: Vec<MatchResult> = best.into_values().collect();
    out.sort_by(compare_matches);
    out
}
