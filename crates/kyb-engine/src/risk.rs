//! Risk detection
//!
//! Scans every text source for risk keywords and pattern-library hits,
//! checks supplied or generated industry codes against the restriction
//! lists, and scores the evidence. A restricted code forces the level to at
//! least `high` whatever the text says.

use crate::strategies::ContentOutcome;
use kyb_domain::confidence::clamp_unit;
use kyb_domain::{
    CodeType, DegradedStrategy, MatchKind, MatchOwner, MatchResult, MatchSource, MatchTarget,
    Method, RiskAssessmentResult, RiskCategory, RiskLevel, RiskRequest, RiskSeverity,
};
use kyb_index::{dedup_and_sort, KeywordIndex, Matcher, PatternDetector};
use kyb_scoring::Scorer;
use std::sync::Arc;
use tracing::{debug, warn};

/// Text evidence gathered for one request, before codes are checked
#[derive(Debug, Clone, Default)]
pub struct RiskScan {
    /// Keyword and pattern hits, deduplicated and sorted
    pub matches: Vec<MatchResult>,
    /// Strategies that failed
    pub degraded: Vec<DegradedStrategy>,
}

/// Screens businesses for prohibited, illegal or high-risk activity
pub struct RiskDetectionService {
    matcher: Matcher,
    detector: PatternDetector,
    scorer: Arc<Scorer>,
}

impl RiskDetectionService {
    /// Create a service
    pub fn new(matcher: Matcher, detector: PatternDetector, scorer: Arc<Scorer>) -> Self {
        Self {
            matcher,
            detector,
            scorer,
        }
    }

    /// Active pattern detectors
    pub fn detector(&self) -> &PatternDetector {
        &self.detector
    }

    /// Assess a request end to end
    pub fn assess(
        &self,
        request: &RiskRequest,
        index: &KeywordIndex,
        content: &ContentOutcome,
    ) -> RiskAssessmentResult {
        let scan = self.scan(request, index, content);
        self.finish(scan, &request.industry_codes, index)
    }

    /// Match every text source of the request
    ///
    /// Risk keywords are matched per source; the pattern library sees all
    /// sources at once so composite signatures can span fields.
    pub fn scan(&self, request: &RiskRequest, index: &KeywordIndex, content: &ContentOutcome) -> RiskScan {
        let mut sources = vec![(request.business_name.as_str(), MatchSource::BusinessName)];
        if let Some(description) = &request.description {
            sources.push((description.as_str(), MatchSource::Description));
        }

        let mut degraded = Vec::new();
        match content {
            ContentOutcome::Absent => {}
            ContentOutcome::Text(text) => sources.push((text.as_str(), MatchSource::WebsiteContent)),
            ContentOutcome::Degraded(reason) => {
                warn!(reason = %reason, "Risk scan without website content");
                degraded.push(DegradedStrategy {
                    method: Method::Content,
                    reason: reason.clone(),
                });
            }
        }

        let mut matches: Vec<MatchResult> = sources
            .iter()
            .flat_map(|(text, source)| self.matcher.match_risk(text, index, *source))
            .collect();
        matches.extend(self.detector.detect_all(&sources));

        RiskScan {
            matches: dedup_and_sort(matches),
            degraded,
        }
    }

    /// Check `codes` against the restriction lists and score everything
    pub fn finish(
        &self,
        scan: RiskScan,
        codes: &[(CodeType, String)],
        index: &KeywordIndex,
    ) -> RiskAssessmentResult {
        let RiskScan {
            mut matches,
            degraded,
        } = scan;

        let mut restricted_codes = Vec::new();
        for (code_type, code) in codes {
            let code = code.trim();
            let found = self.restricted_matches(*code_type, code, index);
            if found.is_empty() {
                continue;
            }
            let label = format!("{}:{}", code_type, code);
            if !restricted_codes.contains(&label) {
                restricted_codes.push(label);
            }
            matches.extend(found);
        }

        let mut score = self.scorer.score_risk(&matches);
        if !restricted_codes.is_empty() {
            debug!(codes = ?restricted_codes, "Restricted codes present");
            score = self.scorer.raise_to(score, RiskLevel::High);
        }

        debug!(
            score = score.overall,
            level = score.level.as_str(),
            evidence = score.evidence.len(),
            "Risk assessed"
        );

        RiskAssessmentResult {
            overall_score: score.overall,
            risk_level: score.level,
            categories: score.categories,
            evidence: score.evidence,
            recommendation: score.level.recommendation(),
            restricted_codes,
            amplified: score.amplified,
            degraded,
        }
    }

    /// Evidence for one code, empty when it is not restricted
    fn restricted_matches(&self, code_type: CodeType, code: &str, index: &KeywordIndex) -> Vec<MatchResult> {
        let target = MatchTarget::Code(format!("{}:{}", code_type, code));
        let by_keyword: Vec<MatchResult> = index
            .restricted_by(code_type, code)
            .into_iter()
            .map(|keyword| {
                code_match(
                    target.clone(),
                    code,
                    keyword.category,
                    keyword.severity,
                    clamp_unit(keyword.base_weight),
                    format!("{} {} restricted by '{}'", code_type, code, keyword.text),
                )
            })
            .collect();
        if !by_keyword.is_empty() {
            return by_keyword;
        }

        if self.scorer.config().is_restricted(code_type, code) {
            return vec![code_match(
                target,
                code,
                RiskCategory::HighRisk,
                RiskSeverity::High,
                1.0,
                format!("{} {} on the restricted code list", code_type, code),
            )];
        }
        Vec::new()
    }
}

fn code_match(
    target: MatchTarget,
    code: &str,
    category: RiskCategory,
    severity: RiskSeverity,
    confidence: f64,
    context: String,
) -> MatchResult {
    MatchResult {
        target,
        kind: MatchKind::RestrictedCode,
        owner: MatchOwner::Risk { category, severity },
        matched_text: code.to_string(),
        start: 0,
        end: code.len(),
        source: MatchSource::IndustryCode,
        confidence,
        context,
    }
}
