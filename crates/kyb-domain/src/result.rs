//! Classification and risk assessment results

use crate::industry::{ClassificationCode, CodeType, IndustryId};
use crate::keyword::RiskCategory;
use crate::matching::{MatchResult, MatchSource};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Name of the sentinel industry returned when nothing matched
pub const UNCLASSIFIED_NAME: &str = "Unclassified";

/// Explanation flag set when escalation was wanted but did not answer
pub const ESCALATION_UNAVAILABLE: &str = "low confidence, escalation unavailable";

/// One ranked industry candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndustryCandidate {
    /// Industry id (`0` for the unclassified sentinel)
    pub industry_id: IndustryId,

    /// Industry name
    pub name: String,

    /// Industry category
    pub category: String,

    /// Confidence in [0, 1]
    pub confidence: f64,

    /// Number of distinct keywords that matched
    pub distinct_keywords: usize,

    /// Highest single match confidence
    pub top_match: f64,
}

impl IndustryCandidate {
    /// The "unclassified" sentinel
    pub fn unclassified(confidence: f64) -> Self {
        Self {
            industry_id: IndustryId::UNCLASSIFIED,
            name: UNCLASSIFIED_NAME.to_string(),
            category: UNCLASSIFIED_NAME.to_string(),
            confidence,
            distinct_keywords: 0,
            top_match: 0.0,
        }
    }

    /// Whether this is the sentinel
    pub fn is_unclassified(&self) -> bool {
        self.industry_id.is_unclassified()
    }
}

/// Codes generated from the winning industry, grouped by family
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeneratedCodes {
    /// Merchant category codes
    pub mcc: Vec<ClassificationCode>,
    /// NAICS codes
    pub naics: Vec<ClassificationCode>,
    /// SIC codes
    pub sic: Vec<ClassificationCode>,
}

impl GeneratedCodes {
    /// Group a flat list of codes by family
    pub fn from_codes(codes: impl IntoIterator<Item = ClassificationCode>) -> Self {
        let mut generated = Self::default();
        for code in codes {
            match code.code_type {
                CodeType::Mcc => generated.mcc.push(code),
                CodeType::Naics => generated.naics.push(code),
                CodeType::Sic => generated.sic.push(code),
            }
        }
        generated
    }

    /// All codes as `(family, code)` pairs
    pub fn pairs(&self) -> Vec<(CodeType, String)> {
        self.mcc
            .iter()
            .chain(&self.naics)
            .chain(&self.sic)
            .map(|c| (c.code_type, c.code.clone()))
            .collect()
    }

    /// Whether no code was generated
    pub fn is_empty(&self) -> bool {
        self.mcc.is_empty() && self.naics.is_empty() && self.sic.is_empty()
    }
}

/// A detection strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    /// Keyword matching on name and description
    Keyword,
    /// Pattern library (risk signatures)
    Pattern,
    /// Keyword matching on extracted website content
    Content,
    /// External reasoning strategy
    Escalation,
}

impl Method {
    /// Get the method name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Keyword => "keyword",
            Method::Pattern => "pattern",
            Method::Content => "content",
            Method::Escalation => "escalation",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a strategy contributed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MethodStatus {
    /// Ran and contributed to aggregation
    Used,
    /// Not selected for this request
    Skipped,
    /// Selected but failed; excluded and penalized
    Degraded,
}

/// Per-strategy confidence breakdown
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodBreakdown {
    /// Strategy
    pub method: Method,
    /// Outcome
    pub status: MethodStatus,
    /// Best confidence this strategy produced for the primary industry
    pub confidence: Option<f64>,
}

/// A strategy that was wanted but failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DegradedStrategy {
    /// Strategy
    pub method: Method,
    /// Why it failed
    pub reason: String,
}

/// One line of the explanation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplanationEntry {
    /// Strategy that produced the evidence
    pub method: Method,
    /// Industry the evidence supports
    pub industry: String,
    /// Matched text or reasoning rationale
    pub evidence: String,
    /// Where the evidence came from (absent for reasoning output)
    pub source: Option<MatchSource>,
    /// Confidence of this piece of evidence
    pub confidence: f64,
    /// Surrounding text
    pub context: String,
}

impl ExplanationEntry {
    /// Build an entry from a keyword match
    pub fn from_match(method: Method, industry: &str, m: &MatchResult) -> Self {
        Self {
            method,
            industry: industry.to_string(),
            evidence: m.matched_text.clone(),
            source: Some(m.source),
            confidence: m.confidence,
            context: m.context.clone(),
        }
    }
}

/// States of the routing state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouterState {
    /// Request accepted
    Received,
    /// Matcher ran on name and description
    KeywordPass,
    /// Pattern library ran
    PatternPass,
    /// Website content was matched
    ContentPass,
    /// Handed off to the external reasoning strategy
    Escalated,
    /// Terminal
    Resolved,
}

impl RouterState {
    /// Get the state name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            RouterState::Received => "received",
            RouterState::KeywordPass => "keyword_pass",
            RouterState::PatternPass => "pattern_pass",
            RouterState::ContentPass => "content_pass",
            RouterState::Escalated => "escalated",
            RouterState::Resolved => "resolved",
        }
    }
}

/// Result of classifying one business
///
/// Always carries at least one candidate: when nothing matched, the candidate
/// list holds the unclassified sentinel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    /// Winning industry
    pub primary_industry: IndustryCandidate,

    /// Ranked candidates, best first
    pub candidates: Vec<IndustryCandidate>,

    /// Final confidence in [0, 1]
    pub confidence_score: f64,

    /// Codes generated from the winning industry
    pub codes: GeneratedCodes,

    /// Per-strategy breakdown
    pub methods: Vec<MethodBreakdown>,

    /// Contributing evidence
    pub explanation: Vec<ExplanationEntry>,

    /// Strategies that failed for this request
    pub degraded: Vec<DegradedStrategy>,

    /// Free-form flags (e.g. [`ESCALATION_UNAVAILABLE`])
    pub flags: Vec<String>,

    /// States visited by the router
    pub trace: Vec<RouterState>,
}

impl ClassificationResult {
    /// Whether the result is the unclassified sentinel
    pub fn is_unclassified(&self) -> bool {
        self.primary_industry.is_unclassified()
    }
}

/// Overall risk level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    /// Below the low threshold
    Minimal,
    /// Low
    Low,
    /// Medium
    Medium,
    /// High
    High,
    /// Critical
    Critical,
}

impl RiskLevel {
    /// Get the level name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Minimal => "minimal",
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        }
    }

    /// Fixed mapping from level to recommendation
    pub fn recommendation(&self) -> Recommendation {
        match self {
            RiskLevel::Minimal | RiskLevel::Low => Recommendation::Approve,
            RiskLevel::Medium | RiskLevel::High => Recommendation::ManualReview,
            RiskLevel::Critical => Recommendation::Decline,
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Recommended action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    /// Onboard
    Approve,
    /// Route to an analyst
    ManualReview,
    /// Refuse
    Decline,
}

/// Score contributed by one risk category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryScore {
    /// Category
    pub category: RiskCategory,
    /// Share of the overall score; shares sum to the overall score
    pub score: f64,
    /// Number of matches in this category
    pub matches: usize,
}

/// A match together with what it contributed to the overall score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskEvidence {
    /// The match
    #[serde(flatten)]
    pub matched: MatchResult,
    /// Raw contribution before amplification and clamping
    pub contribution: f64,
}

/// Result of screening one business
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessmentResult {
    /// Overall score in [0, 1]
    pub overall_score: f64,

    /// Level derived from configured thresholds
    pub risk_level: RiskLevel,

    /// Per-category breakdown
    pub categories: Vec<CategoryScore>,

    /// Matched keywords and patterns
    pub evidence: Vec<RiskEvidence>,

    /// Recommended action
    pub recommendation: Recommendation,

    /// Codes found on a restriction list
    pub restricted_codes: Vec<String>,

    /// Whether the co-occurrence amplification fired
    pub amplified: bool,

    /// Strategies that failed for this request
    pub degraded: Vec<DegradedStrategy>,
}

impl RiskAssessmentResult {
    /// Result for a business with no risk evidence at all
    pub fn minimal() -> Self {
        Self {
            overall_score: 0.0,
            risk_level: RiskLevel::Minimal,
            categories: Vec::new(),
            evidence: Vec::new(),
            recommendation: Recommendation::Approve,
            restricted_codes: Vec::new(),
            amplified: false,
            degraded: Vec::new(),
        }
    }
}
