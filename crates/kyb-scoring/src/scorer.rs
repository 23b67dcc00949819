//! Classification confidence and risk score aggregation

use crate::config::ScoringConfig;
use crate::error::ScoringError;
use kyb_domain::confidence::{clamp_between, clamp_unit};
use kyb_domain::{
    CategoryScore, IndustryCandidate, IndustryId, MatchResult, MatchTarget, RiskCategory,
    RiskEvidence, RiskLevel,
};
use kyb_index::{compare_matches, KeywordIndex};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Aggregated risk for one request
#[derive(Debug, Clone, PartialEq)]
pub struct RiskScore {
    /// Overall score in [0, 1]
    pub overall: f64,
    /// Level from the configured thresholds
    pub level: RiskLevel,
    /// Per-category shares, summing to `overall`
    pub categories: Vec<CategoryScore>,
    /// Deduplicated matches with their raw contributions
    pub evidence: Vec<RiskEvidence>,
    /// Whether the co-occurrence bonus applied
    pub amplified: bool,
}

impl RiskScore {
    /// Score of a request with no evidence
    pub fn minimal() -> Self {
        Self {
            overall: 0.0,
            level: RiskLevel::Minimal,
            categories: Vec::new(),
            evidence: Vec::new(),
            amplified: false,
        }
    }
}

/// Ranking order for industry candidates
///
/// Confidence first, then (a) strongest single match, (b) more distinct
/// keywords, (c) name.
pub fn compare_candidates(a: &IndustryCandidate, b: &IndustryCandidate) -> Ordering {
    b.confidence
        .partial_cmp(&a.confidence)
        .unwrap_or(Ordering::Equal)
        .then_with(|| b.top_match.partial_cmp(&a.top_match).unwrap_or(Ordering::Equal))
        .then_with(|| b.distinct_keywords.cmp(&a.distinct_keywords))
        .then_with(|| a.name.cmp(&b.name))
        .then_with(|| a.industry_id.cmp(&b.industry_id))
}

/// Aggregates matches into confidences and risk scores
///
/// Holds a validated [`ScoringConfig`]; never fails per request.
///
/// # Examples
///
/// ```
/// use kyb_scoring::{Scorer, ScoringConfig};
/// use kyb_domain::RiskLevel;
///
/// let scorer = Scorer::new(ScoringConfig::default()).unwrap();
/// let score = scorer.score_risk(&[]);
/// assert_eq!(score.overall, 0.0);
/// assert_eq!(score.level, RiskLevel::Minimal);
/// ```
#[derive(Debug, Clone)]
pub struct Scorer {
    config: ScoringConfig,
}

impl Scorer {
    /// Validate `config` and build a scorer
    pub fn new(config: ScoringConfig) -> Result<Self, ScoringError> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Active configuration
    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Rank industries by the matches attributed to them
    ///
    /// Per industry, each distinct keyword contributes its best
    /// source-weighted confidence once; the industry confidence is the mean of
    /// those contributions, bounded by the configured floor and ceiling.
    /// Matches for industries missing from `index` are ignored. Returns an
    /// empty list when nothing matched; the caller substitutes the sentinel.
    pub fn rank_industries(
        &self,
        matches: &[MatchResult],
        index: &KeywordIndex,
    ) -> Vec<IndustryCandidate> {
        let mut per_industry: BTreeMap<IndustryId, BTreeMap<&MatchTarget, f64>> = BTreeMap::new();

        for m in matches {
            let Some(industry_id) = m.industry_id() else {
                continue;
            };
            let weighted = clamp_unit(m.confidence * self.config.source_weights.weight(m.source));
            let best = per_industry
                .entry(industry_id)
                .or_default()
                .entry(&m.target)
                .or_insert(0.0);
            if weighted > *best {
                *best = weighted;
            }
        }

        let mut candidates: Vec<IndustryCandidate> = per_industry
            .into_iter()
            .filter_map(|(industry_id, keywords)| {
                let Some(industry) = index.industry(industry_id) else {
                    debug!(industry_id = %industry_id, "Ignoring matches for unknown industry");
                    return None;
                };
                let distinct = keywords.len();
                let sum: f64 = keywords.values().sum();
                let top = keywords.values().copied().fold(0.0, f64::max);
                let confidence = clamp_between(
                    sum / distinct as f64,
                    self.config.classification_floor,
                    self.config.classification_ceiling,
                );
                Some(IndustryCandidate {
                    industry_id,
                    name: industry.name.clone(),
                    category: industry.category.clone(),
                    confidence,
                    distinct_keywords: distinct,
                    top_match: top,
                })
            })
            .collect();

        candidates.sort_by(compare_candidates);
        candidates
    }

    /// Aggregate risk evidence
    ///
    /// Each distinct keyword or pattern counts once, at its best confidence,
    /// contributing `severity_weight × category_weight × confidence`. When
    /// enough matches from enough distinct categories co-occur the sum is
    /// amplified by a bounded bonus. The result is clamped to [0, 1] and the
    /// category breakdown rescaled so it sums to the overall score.
    pub fn score_risk(&self, matches: &[MatchResult]) -> RiskScore {
        let mut ordered: Vec<&MatchResult> = matches.iter().filter(|m| m.risk().is_some()).collect();
        ordered.sort_by(|a, b| compare_matches(a, b));

        let mut seen = BTreeSet::new();
        let mut evidence = Vec::new();
        for m in ordered {
            if !seen.insert(&m.target) {
                continue;
            }
            let Some((category, severity)) = m.risk() else {
                continue;
            };
            let contribution = self.config.severity_weight(severity)
                * self.config.category_weight(category)
                * clamp_unit(m.confidence);
            evidence.push(RiskEvidence {
                matched: m.clone(),
                contribution,
            });
        }

        if evidence.is_empty() {
            return RiskScore::minimal();
        }

        let mut raw_by_category: BTreeMap<RiskCategory, (f64, usize)> = BTreeMap::new();
        for e in &evidence {
            if let Some((category, _)) = e.matched.risk() {
                let slot = raw_by_category.entry(category).or_insert((0.0, 0));
                slot.0 += e.contribution;
                slot.1 += 1;
            }
        }
        let raw: f64 = evidence.iter().map(|e| e.contribution).sum();

        let amp = &self.config.amplification;
        let amplified = evidence.len() >= amp.min_matches && raw_by_category.len() >= amp.min_categories;
        let boosted = if amplified {
            raw + (raw * amp.bonus).min(amp.max_bonus)
        } else {
            raw
        };

        let overall = clamp_unit(boosted);
        let categories = rescale(&raw_by_category, raw, overall);

        RiskScore {
            overall,
            level: self.config.thresholds.level(overall),
            categories,
            evidence,
            amplified,
        }
    }

    /// Raise a score so its level is at least `level`
    ///
    /// Used for restricted industry codes. The category breakdown is rescaled
    /// to keep summing to the new overall score.
    pub fn raise_to(&self, mut score: RiskScore, level: RiskLevel) -> RiskScore {
        if score.level >= level {
            return score;
        }
        let floor = self.config.thresholds.floor_of(level);
        let overall = clamp_unit(score.overall.max(floor));

        let raw: BTreeMap<RiskCategory, (f64, usize)> = score
            .categories
            .iter()
            .map(|c| (c.category, (c.score, c.matches)))
            .collect();
        let raw_total: f64 = raw.values().map(|(s, _)| s).sum();

        score.categories = if raw_total > 0.0 {
            rescale(&raw, raw_total, overall)
        } else {
            // nothing to scale; attribute the floor to the evidence categories
            let counts = evidence_counts(&score.evidence);
            let total = counts.values().sum::<usize>().max(1) as f64;
            let shares = counts
                .iter()
                .map(|(category, n)| (*category, (*n as f64 / total, *n)))
                .collect();
            rescale(&shares, 1.0, overall)
        };
        score.overall = overall;
        score.level = self.config.thresholds.level(overall);
        score
    }
}

fn evidence_counts(evidence: &[RiskEvidence]) -> BTreeMap<RiskCategory, usize> {
    let mut counts = BTreeMap::new();
    for e in evidence {
        if let Some((category, _)) = e.matched.risk() {
            *counts.entry(category).or_insert(0) += 1;
        }
    }
    counts
}

fn rescale(
    raw_by_category: &BTreeMap<RiskCategory, (f64, usize)>,
    raw_total: f64,
    overall: f64,
) -> Vec<CategoryScore> {
    if raw_total <= 0.0 {
        return raw_by_category
            .iter()
            .map(|(category, (_, n))| CategoryScore {
                category: *category,
                score: 0.0,
                matches: *n,
            })
            .collect();
    }

    let mut out: Vec<CategoryScore> = raw_by_category
        .iter()
        .map(|(category, (raw, n))| CategoryScore {
            category: *category,
            score: raw / raw_total * overall,
            matches: *n,
        })
        .collect();
    out.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.category.cmp(&b.category))
    });
    out
}
