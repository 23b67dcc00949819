//! Industry classification
//!
//! Runs the routing state machine for one request:
//!
//! ```text
//! Received → KeywordPass → [PatternPass] → [ContentPass] → [Escalated] → Resolved
//! ```
//!
//! Keyword and content matches are ranked by the scorer. When the best
//! candidate is weak or ambiguous the request is escalated to the reasoning
//! strategy, whose answer overrides the keyword ranking. Every failure on the
//! way degrades the result instead of failing it.

use crate::router::{EscalationReason, ModuleSelector, RoutePlan};
use crate::strategies::{run_blocking, ContentOutcome};
use kyb_domain::confidence::clamp_unit;
use kyb_domain::result::ESCALATION_UNAVAILABLE;
use kyb_domain::traits::{ReasoningInput, ReasoningOutcome, ReasoningStrategy};
use kyb_domain::{
    ClassificationRequest, ClassificationResult, DegradedStrategy, ExplanationEntry, GeneratedCodes,
    IndustryCandidate, IndustryId, MatchResult, MatchSource, Method, MethodBreakdown, MethodStatus,
    RouterState,
};
use kyb_index::{KeywordIndex, Matcher};
use kyb_scoring::Scorer;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

/// Candidates handed to the reasoning strategy
const REASONING_CANDIDATES: usize = 5;

/// Evidence gathered by the cheap passes
#[derive(Debug)]
struct Draft {
    matches: Vec<MatchResult>,
    candidates: Vec<IndustryCandidate>,
    trace: Vec<RouterState>,
    degraded: Vec<DegradedStrategy>,
    content: MethodStatus,
}

/// What the escalation step produced
#[derive(Debug)]
enum Escalation {
    NotNeeded,
    Unavailable(EscalationReason),
    Failed(String),
    Answered(String, ReasoningOutcome),
}

/// Classifies businesses into industries
pub struct Classifier {
    matcher: Matcher,
    scorer: Arc<Scorer>,
    selector: ModuleSelector,
    reasoner: Option<Arc<dyn ReasoningStrategy>>,
    io: Arc<Semaphore>,
}

impl Classifier {
    /// Create a classifier
    pub fn new(
        matcher: Matcher,
        scorer: Arc<Scorer>,
        selector: ModuleSelector,
        reasoner: Option<Arc<dyn ReasoningStrategy>>,
        io: Arc<Semaphore>,
    ) -> Self {
        Self {
            matcher,
            scorer,
            selector,
            reasoner,
            io,
        }
    }

    /// Strategy selector
    pub fn selector(&self) -> &ModuleSelector {
        &self.selector
    }

    /// Classify with every strategy in `plan`
    ///
    /// `content` is the already-fetched website text.
    pub async fn classify(
        &self,
        request: &ClassificationRequest,
        index: &KeywordIndex,
        plan: RoutePlan,
        content: &ContentOutcome,
    ) -> ClassificationResult {
        let mut draft = self.gather(request, index, plan, content);

        let escalation = match self.selector.escalation_reason(&draft.candidates) {
            None => Escalation::NotNeeded,
            Some(reason) => match &self.reasoner {
                Some(reasoner) if plan.escalation_allowed => {
                    draft.trace.push(RouterState::Escalated);
                    self.escalate(reasoner, request, index, content, &draft.candidates, reason)
                        .await
                }
                _ => Escalation::Unavailable(reason),
            },
        };

        self.resolve(draft, escalation, index)
    }

    /// Classify from name and description alone, without collaborators
    pub fn classify_keywords(&self, request: &ClassificationRequest, index: &KeywordIndex) -> ClassificationResult {
        let plan = RoutePlan {
            escalation_allowed: false,
            ..self.selector.plan(None, false)
        };
        let draft = self.gather(request, index, plan, &ContentOutcome::Absent);
        let escalation = match self.selector.escalation_reason(&draft.candidates) {
            None => Escalation::NotNeeded,
            Some(reason) => Escalation::Unavailable(reason),
        };
        self.resolve(draft, escalation, index)
    }

    fn gather(
        &self,
        request: &ClassificationRequest,
        index: &KeywordIndex,
        plan: RoutePlan,
        content: &ContentOutcome,
    ) -> Draft {
        let mut trace = vec![RouterState::Received];
        let mut degraded = Vec::new();

        let mut matches = self
            .matcher
            .match_industries(&request.business_name, index, MatchSource::BusinessName);
        if let Some(description) = &request.description {
            matches.extend(
                self.matcher
                    .match_industries(description, index, MatchSource::Description),
            );
        }
        trace.push(RouterState::KeywordPass);

        if plan.pattern {
            trace.push(RouterState::PatternPass);
        }

        let content_status = match content {
            ContentOutcome::Absent => MethodStatus::Skipped,
            ContentOutcome::Text(text) => {
                matches.extend(
                    self.matcher
                        .match_industries(text, index, MatchSource::WebsiteContent),
                );
                trace.push(RouterState::ContentPass);
                MethodStatus::Used
            }
            ContentOutcome::Degraded(reason) => {
                warn!(reason = %reason, "Content strategy degraded");
                degraded.push(DegradedStrategy {
                    method: Method::Content,
                    reason: reason.clone(),
                });
                MethodStatus::Degraded
            }
        };

        matches.sort_by(kyb_index::compare_matches);
        let candidates = self.scorer.rank_industries(&matches, index);
        debug!(
            matches = matches.len(),
            candidates = candidates.len(),
            best = candidates.first().map(|c| c.confidence).unwrap_or(0.0),
            "Keyword passes complete"
        );

        Draft {
            matches,
            candidates,
            trace,
            degraded,
            content: content_status,
        }
    }

    async fn escalate(
        &self,
        reasoner: &Arc<dyn ReasoningStrategy>,
        request: &ClassificationRequest,
        index: &KeywordIndex,
        content: &ContentOutcome,
        candidates: &[IndustryCandidate],
        reason: EscalationReason,
    ) -> Escalation {
        let input = ReasoningInput {
            business_name: request.business_name.clone(),
            description: request.description.clone(),
            website_text: content.text().map(str::to_string),
            candidates: candidates.iter().take(REASONING_CANDIDATES).cloned().collect(),
        };
        let name = reasoner.name().to_string();
        debug!(strategy = %name, reason = reason.as_str(), "Escalating classification");

        let strategy = Arc::clone(reasoner);
        let timeout = self.selector.config().escalation_timeout();
        match run_blocking(&self.io, timeout, move || strategy.classify(&input)).await {
            Ok(outcome) if index.industry(outcome.industry_id).is_none() => {
                warn!(strategy = %name, industry_id = %outcome.industry_id, "Escalation chose an unknown industry");
                Escalation::Failed(format!("{} chose unknown industry {}", name, outcome.industry_id))
            }
            Ok(outcome) => Escalation::Answered(name, outcome),
            Err(e) => {
                warn!(strategy = %name, error = %e, "Escalation failed");
                Escalation::Failed(e.to_string())
            }
        }
    }

    fn resolve(&self, draft: Draft, escalation: Escalation, index: &KeywordIndex) -> ClassificationResult {
        let config = self.selector.config();
        let Draft {
            matches,
            mut candidates,
            mut trace,
            mut degraded,
            content,
        } = draft;
        let mut flags = Vec::new();
        let mut reasoning_entry = None;
        let mut escalation_status = MethodStatus::Skipped;
        let mut escalation_confidence = None;

        match escalation {
            Escalation::NotNeeded => {}
            Escalation::Unavailable(reason) => {
                debug!(reason = reason.as_str(), "Escalation wanted but no strategy available");
                flags.push(ESCALATION_UNAVAILABLE.to_string());
            }
            Escalation::Failed(reason) => {
                degraded.push(DegradedStrategy {
                    method: Method::Escalation,
                    reason,
                });
                flags.push(ESCALATION_UNAVAILABLE.to_string());
                escalation_status = MethodStatus::Degraded;
            }
            Escalation::Answered(strategy, outcome) => {
                let reasoned = clamp_unit(outcome.confidence);
                let position = candidates
                    .iter()
                    .position(|c| c.industry_id == outcome.industry_id);
                let keyword_confidence = position.map(|i| candidates[i].confidence).unwrap_or(0.0);
                let mut primary = match position {
                    Some(i) => candidates.remove(i),
                    None => new_candidate(index, outcome.industry_id),
                };
                primary.confidence = clamp_unit(
                    config.escalation_weight * reasoned + (1.0 - config.escalation_weight) * keyword_confidence,
                );

                reasoning_entry = Some(ExplanationEntry {
                    method: Method::Escalation,
                    industry: primary.name.clone(),
                    evidence: outcome.rationale,
                    source: None,
                    confidence: reasoned,
                    context: strategy,
                });
                candidates.insert(0, primary);
                escalation_status = MethodStatus::Used;
                escalation_confidence = Some(reasoned);
            }
        }

        let penalty = config.degradation_penalty * degraded.len() as f64;
        let primary = match candidates.first_mut() {
            Some(best) => {
                best.confidence = clamp_unit(best.confidence - penalty);
                best.clone()
            }
            None => {
                let floor = self.scorer.config().classification_floor.min(0.1);
                let sentinel = IndustryCandidate::unclassified(clamp_unit(floor - penalty));
                candidates.push(sentinel.clone());
                sentinel
            }
        };

        let codes = if primary.is_unclassified() {
            GeneratedCodes::default()
        } else {
            GeneratedCodes::from_codes(index.codes_for(primary.industry_id).iter().cloned())
        };

        let ranked: BTreeSet<IndustryId> = candidates.iter().map(|c| c.industry_id).collect();
        let mut explanation: Vec<ExplanationEntry> = matches
            .iter()
            .filter_map(|m| {
                let industry_id = m.industry_id().filter(|id| ranked.contains(id))?;
                let industry = index.industry(industry_id)?;
                Some(ExplanationEntry::from_match(method_of(m), &industry.name, m))
            })
            .collect();
        explanation.extend(reasoning_entry);

        let best_for_primary = |wanted: Method| {
            matches
                .iter()
                .filter(|m| m.industry_id() == Some(primary.industry_id) && method_of(m) == wanted)
                .map(|m| m.confidence)
                .fold(None, |best: Option<f64>, c| Some(best.map_or(c, |b| b.max(c))))
        };
        let methods = vec![
            MethodBreakdown {
                method: Method::Keyword,
                status: MethodStatus::Used,
                confidence: best_for_primary(Method::Keyword),
            },
            MethodBreakdown {
                method: Method::Content,
                status: content,
                confidence: if content == MethodStatus::Used {
                    best_for_primary(Method::Content)
                } else {
                    None
                },
            },
            MethodBreakdown {
                method: Method::Escalation,
                status: escalation_status,
                confidence: escalation_confidence,
            },
        ];

        trace.push(RouterState::Resolved);
        debug!(
            industry = %primary.name,
            confidence = primary.confidence,
            degraded = degraded.len(),
            "Classification resolved"
        );

        ClassificationResult {
            confidence_score: primary.confidence,
            primary_industry: primary,
            candidates,
            codes,
            methods,
            explanation,
            degraded,
            flags,
            trace,
        }
    }
}

fn method_of(m: &MatchResult) -> Method {
    match m.source {
        MatchSource::WebsiteContent => Method::Content,
        _ => Method::Keyword,
    }
}

fn new_candidate(index: &KeywordIndex, industry_id: IndustryId) -> IndustryCandidate {
    match index.industry(industry_id) {
        Some(industry) => IndustryCandidate {
            industry_id,
            name: industry.name.clone(),
            category: industry.category.clone(),
            confidence: 0.0,
            distinct_keywords: 0,
            top_match: 0.0,
        },
        None => IndustryCandidate::unclassified(0.0),
    }
}
