//! Property tests: scores stay in [0, 1] for any evidence

use kyb_domain::{
    Industry, IndustryId, KeywordId, MatchKind, MatchOwner, MatchResult, MatchSource, MatchTarget,
    RiskCategory, RiskSeverity,
};
use kyb_index::{IndexSnapshot, KeywordIndex};
use kyb_scoring::{Scorer, ScoringConfig};
use proptest::prelude::*;

fn source_strategy() -> impl Strategy<Value = MatchSource> {
    prop_oneof![
        Just(MatchSource::BusinessName),
        Just(MatchSource::Description),
        Just(MatchSource::WebsiteContent),
        Just(MatchSource::IndustryCode),
    ]
}

fn category_strategy() -> impl Strategy<Value = RiskCategory> {
    (0..RiskCategory::ALL.len()).prop_map(|i| RiskCategory::ALL[i])
}

fn severity_strategy() -> impl Strategy<Value = RiskSeverity> {
    (0..RiskSeverity::ALL.len()).prop_map(|i| RiskSeverity::ALL[i])
}

fn industry_match() -> impl Strategy<Value = MatchResult> {
    (1u32..40, 1u32..6, source_strategy(), -0.5f64..1.5).prop_map(|(kw, industry, source, confidence)| {
        MatchResult {
            target: MatchTarget::Keyword(KeywordId(kw)),
            kind: MatchKind::Exact,
            owner: MatchOwner::Industry {
                industry_id: IndustryId(industry),
            },
            matched_text: String::new(),
            start: 0,
            end: 0,
            source,
            confidence,
            context: String::new(),
        }
    })
}

fn risk_match() -> impl Strategy<Value = MatchResult> {
    (1u32..60, category_strategy(), severity_strategy(), source_strategy(), -0.5f64..1.5).prop_map(
        |(id, category, severity, source, confidence)| MatchResult {
            target: MatchTarget::RiskKeyword(KeywordId(id)),
            kind: MatchKind::Exact,
            owner: MatchOwner::Risk { category, severity },
            matched_text: String::new(),
            start: 0,
            end: 0,
            source,
            confidence,
            context: String::new(),
        },
    )
}

fn index() -> KeywordIndex {
    KeywordIndex::build(
        IndexSnapshot {
            industries: (1..6).map(|i| Industry::new(i, format!("Industry {}", i), "Test")).collect(),
            ..Default::default()
        },
        1,
    )
}

proptest! {
    #[test]
    fn classification_confidence_bounded(matches in prop::collection::vec(industry_match(), 0..80)) {
        let scorer = Scorer::new(ScoringConfig::default()).unwrap();
        for candidate in scorer.rank_industries(&matches, &index()) {
            prop_assert!(candidate.confidence >= 0.1 && candidate.confidence <= 1.0);
            prop_assert!(candidate.top_match >= 0.0 && candidate.top_match <= 1.0);
        }
    }

    #[test]
    fn ranking_is_deterministic(matches in prop::collection::vec(industry_match(), 0..40)) {
        let scorer = Scorer::new(ScoringConfig::default()).unwrap();
        let mut reversed = matches.clone();
        reversed.reverse();
        prop_assert_eq!(
            scorer.rank_industries(&matches, &index()),
            scorer.rank_industries(&reversed, &index())
        );
    }

    #[test]
    fn risk_score_bounded(matches in prop::collection::vec(risk_match(), 0..80)) {
        let scorer = Scorer::new(ScoringConfig::default()).unwrap();
        let score = scorer.score_risk(&matches);
        prop_assert!(score.overall >= 0.0 && score.overall <= 1.0);
        let sum: f64 = score.categories.iter().map(|c| c.score).sum();
        prop_assert!((sum - score.overall).abs() < 1e-9);
    }

    #[test]
    fn all_max_weight_collisions_stay_bounded(n in 1usize..200) {
        let scorer = Scorer::new(ScoringConfig::default()).unwrap();
        let matches: Vec<MatchResult> = (0..n)
            .map(|i| MatchResult {
                target: MatchTarget::RiskKeyword(KeywordId(i as u32)),
                kind: MatchKind::Exact,
                owner: MatchOwner::Risk {
                    category: RiskCategory::ALL[i % 7],
                    severity: RiskSeverity::Critical,
                },
                matched_text: String::new(),
                start: 0,
                end: 0,
                source: MatchSource::BusinessName,
                confidence: 1.0,
                context: String::new(),
            })
            .collect();
        let score = scorer.score_risk(&matches);
        prop_assert!(score.overall <= 1.0);
    }
}
