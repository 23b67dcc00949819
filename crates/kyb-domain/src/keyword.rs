//! Weighted keywords for industries and risk categories

use crate::confidence::clamp_unit;
use crate::industry::{CodeType, IndustryId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a keyword row
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeywordId(pub u32);

impl fmt::Display for KeywordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A keyword pointing at exactly one industry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keyword {
    /// Unique identifier
    pub id: KeywordId,

    /// Owning industry
    pub industry_id: IndustryId,

    /// Keyword text (matched case-insensitively)
    pub text: String,

    /// Base weight in [0, 1]; the confidence of an exact match
    pub base_weight: f64,

    /// Inactive keywords are ignored when the index is built
    #[serde(default = "default_active")]
    pub active: bool,

    /// Alternative spellings and near-synonyms
    #[serde(default)]
    pub synonyms: Vec<String>,

    /// Optional regular expression evaluated against normalized text
    #[serde(default)]
    pub pattern: Option<String>,

    /// Confidence multiplier applied to pattern matches (default 0.75)
    #[serde(default)]
    pub pattern_multiplier: Option<f64>,
}

fn default_active() -> bool {
    true
}

impl Keyword {
    /// Create an active keyword without synonyms or pattern
    pub fn new(id: u32, industry_id: u32, text: impl Into<String>, base_weight: f64) -> Self {
        Self {
            id: KeywordId(id),
            industry_id: IndustryId(industry_id),
            text: text.into(),
            base_weight: clamp_unit(base_weight),
            active: true,
            synonyms: Vec::new(),
            pattern: None,
            pattern_multiplier: None,
        }
    }

    /// Attach synonyms
    pub fn with_synonyms<I, S>(mut self, synonyms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.synonyms = synonyms.into_iter().map(Into::into).collect();
        self
    }

    /// Attach a regex pattern
    pub fn with_pattern(mut self, pattern: impl Into<String>, multiplier: Option<f64>) -> Self {
        self.pattern = Some(pattern.into());
        self.pattern_multiplier = multiplier;
        self
    }
}

/// What kind of risk a keyword signals
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskCategory {
    /// Activity that is against the law outright
    Illegal,
    /// Activity the platform refuses to serve
    Prohibited,
    /// Legal but elevated-risk activity
    HighRisk,
    /// Trade-based money laundering
    Tbml,
    /// Sanctioned jurisdictions, parties or evasion
    Sanctions,
    /// Fraud schemes
    Fraud,
    /// Indicators that warrant a closer look
    Suspicious,
}

impl RiskCategory {
    /// All categories, in declaration order
    pub const ALL: [RiskCategory; 7] = [
        RiskCategory::Illegal,
        RiskCategory::Prohibited,
        RiskCategory::HighRisk,
        RiskCategory::Tbml,
        RiskCategory::Sanctions,
        RiskCategory::Fraud,
        RiskCategory::Suspicious,
    ];

    /// Get the category name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskCategory::Illegal => "illegal",
            RiskCategory::Prohibited => "prohibited",
            RiskCategory::HighRisk => "high_risk",
            RiskCategory::Tbml => "tbml",
            RiskCategory::Sanctions => "sanctions",
            RiskCategory::Fraud => "fraud",
            RiskCategory::Suspicious => "suspicious",
        }
    }

    /// Parse a category from a string
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
    }
}

impl fmt::Display for RiskCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How bad a risk signal is
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskSeverity {
    /// Lowest severity
    Low,
    /// Medium severity
    Medium,
    /// High severity
    High,
    /// Highest severity
    Critical,
}

impl RiskSeverity {
    /// All severities, lowest first
    pub const ALL: [RiskSeverity; 4] = [
        RiskSeverity::Low,
        RiskSeverity::Medium,
        RiskSeverity::High,
        RiskSeverity::Critical,
    ];

    /// Get the severity name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskSeverity::Low => "low",
            RiskSeverity::Medium => "medium",
            RiskSeverity::High => "high",
            RiskSeverity::Critical => "critical",
        }
    }

    /// Parse a severity from a string
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|sev| sev.as_str().eq_ignore_ascii_case(s.trim()))
    }
}

impl fmt::Display for RiskSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A keyword pointing at a risk category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskKeyword {
    /// Unique identifier
    pub id: KeywordId,

    /// Keyword text
    pub text: String,

    /// Base weight in [0, 1]
    #[serde(default = "default_risk_weight")]
    pub base_weight: f64,

    /// Alternative spellings
    #[serde(default)]
    pub synonyms: Vec<String>,

    /// Regular expressions evaluated against normalized text
    #[serde(default)]
    pub patterns: Vec<String>,

    /// What kind of risk
    pub category: RiskCategory,

    /// How severe
    pub severity: RiskSeverity,

    /// Merchant category codes this keyword restricts
    #[serde(default)]
    pub mcc_codes: Vec<String>,

    /// NAICS codes this keyword restricts
    #[serde(default)]
    pub naics_codes: Vec<String>,

    /// SIC codes this keyword restricts
    #[serde(default)]
    pub sic_codes: Vec<String>,

    /// Inactive keywords are ignored when the index is built
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_risk_weight() -> f64 {
    1.0
}

impl RiskKeyword {
    /// Create an active risk keyword with full weight
    pub fn new(
        id: u32,
        text: impl Into<String>,
        category: RiskCategory,
        severity: RiskSeverity,
    ) -> Self {
        Self {
            id: KeywordId(id),
            text: text.into(),
            base_weight: 1.0,
            synonyms: Vec::new(),
            patterns: Vec::new(),
            category,
            severity,
            mcc_codes: Vec::new(),
            naics_codes: Vec::new(),
            sic_codes: Vec::new(),
            active: true,
        }
    }

    /// Set the base weight (clamped)
    pub fn with_weight(mut self, weight: f64) -> Self {
        self.base_weight = clamp_unit(weight);
        self
    }

    /// Attach synonyms
    pub fn with_synonyms<I, S>(mut self, synonyms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.synonyms = synonyms.into_iter().map(Into::into).collect();
        self
    }

    /// Attach a regex pattern
    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.patterns.push(pattern.into());
        self
    }

    /// Restrict a code of the given family
    pub fn restricting(mut self, code_type: CodeType, code: impl Into<String>) -> Self {
        let code = code.into();
        match code_type {
            CodeType::Mcc => self.mcc_codes.push(code),
            CodeType::Naics => self.naics_codes.push(code),
            CodeType::Sic => self.sic_codes.push(code),
        }
        self
    }

    /// Restricted codes of one family
    pub fn restricted_codes(&self, code_type: CodeType) -> &[String] {
        match code_type {
            CodeType::Mcc => &self.mcc_codes,
            CodeType::Naics => &self.naics_codes,
            CodeType::Sic => &self.sic_codes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_weight_clamped() {
        let kw = Keyword::new(1, 1, "coffee", 1.4);
        assert_eq!(kw.base_weight, 1.0);
        let kw = Keyword::new(2, 1, "coffee", -0.4);
        assert_eq!(kw.base_weight, 0.0);
    }

    #[test]
    fn test_category_parse() {
        assert_eq!(RiskCategory::parse("high_risk"), Some(RiskCategory::HighRisk));
        assert_eq!(RiskCategory::parse("TBML"), Some(RiskCategory::Tbml));
        assert_eq!(RiskCategory::parse("unknown"), None);
    }

    #[test]
    fn test_severity_ordering() {
        assert!(RiskSeverity::Critical > RiskSeverity::High);
        assert!(RiskSeverity::High > RiskSeverity::Medium);
        assert!(RiskSeverity::Medium > RiskSeverity::Low);
    }

    #[test]
    fn test_restricting() {
        let kw = RiskKeyword::new(1, "casino", RiskCategory::Prohibited, RiskSeverity::High)
            .restricting(CodeType::Mcc, "7995")
            .restricting(CodeType::Naics, "713210");
        assert_eq!(kw.restricted_codes(CodeType::Mcc), &["7995".to_string()]);
        assert_eq!(kw.restricted_codes(CodeType::Naics), &["713210".to_string()]);
        assert!(kw.restricted_codes(CodeType::Sic).is_empty());
    }
}
