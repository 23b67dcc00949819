//! Match evidence produced per request

use crate::industry::IndustryId;
use crate::keyword::{KeywordId, RiskCategory, RiskSeverity};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which part of the request a match came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchSource {
    /// The business name
    BusinessName,
    /// The free-text description
    Description,
    /// Text extracted from the business website
    WebsiteContent,
    /// An industry code supplied or generated for the business
    IndustryCode,
}

impl MatchSource {
    /// Get the source name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchSource::BusinessName => "business_name",
            MatchSource::Description => "description",
            MatchSource::WebsiteContent => "website_content",
            MatchSource::IndustryCode => "industry_code",
        }
    }
}

impl fmt::Display for MatchSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a match was found, in increasing confidence discount
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    /// Keyword text contained in the input
    Exact,
    /// A synonym contained in the input
    Synonym,
    /// A compiled regex or phrase rule fired
    Pattern,
    /// A restricted industry code was present
    RestrictedCode,
}

/// What matched
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum MatchTarget {
    /// An industry keyword
    Keyword(KeywordId),
    /// A risk keyword
    RiskKeyword(KeywordId),
    /// A named detector from the pattern library
    Pattern(String),
    /// A restricted code
    Code(String),
}

impl fmt::Display for MatchTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchTarget::Keyword(id) => write!(f, "keyword:{}", id),
            MatchTarget::RiskKeyword(id) => write!(f, "risk_keyword:{}", id),
            MatchTarget::Pattern(name) => write!(f, "pattern:{}", name),
            MatchTarget::Code(code) => write!(f, "code:{}", code),
        }
    }
}

/// What a match counts towards
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MatchOwner {
    /// Evidence for an industry
    Industry {
        /// The industry
        industry_id: IndustryId,
    },
    /// Evidence for a risk category
    Risk {
        /// Category
        category: RiskCategory,
        /// Severity
        severity: RiskSeverity,
    },
}

/// One piece of evidence found in request text
///
/// Ephemeral: produced per request and never persisted by the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    /// What matched
    pub target: MatchTarget,

    /// How it matched
    pub kind: MatchKind,

    /// What the match counts towards
    pub owner: MatchOwner,

    /// The matched text as it appears in the normalized input
    pub matched_text: String,

    /// Byte offset of the match start in the normalized input
    pub start: usize,

    /// Byte offset of the match end in the normalized input
    pub end: usize,

    /// Which part of the request the match came from
    pub source: MatchSource,

    /// Confidence in [0, 1]
    pub confidence: f64,

    /// Surrounding text for explainability
    pub context: String,
}

impl MatchResult {
    /// Industry this match supports, if any
    pub fn industry_id(&self) -> Option<IndustryId> {
        match self.owner {
            MatchOwner::Industry { industry_id } => Some(industry_id),
            MatchOwner::Risk { .. } => None,
        }
    }

    /// Risk category and severity, if this is risk evidence
    pub fn risk(&self) -> Option<(RiskCategory, RiskSeverity)> {
        match self.owner {
            MatchOwner::Risk { category, severity } => Some((category, severity)),
            MatchOwner::Industry { .. } => None,
        }
    }

    /// Deduplication key: same target at the same span
    pub fn dedup_key(&self) -> (MatchTarget, MatchSource, usize, usize) {
        (self.target.clone(), self.source, self.start, self.end)
    }
}
