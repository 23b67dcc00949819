//! Weight tables and thresholds for scoring

use crate::error::ScoringError;
use kyb_domain::{CodeType, MatchSource, RiskCategory, RiskLevel, RiskSeverity};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-source weighting of classification matches
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceWeights {
    /// Matches in the business name
    pub business_name: f64,
    /// Matches in the description
    pub description: f64,
    /// Matches in extracted website text
    pub website_content: f64,
    /// Matches derived from supplied industry codes
    pub industry_code: f64,
}

impl Default for SourceWeights {
    fn default() -> Self {
        Self {
            business_name: 1.0,
            description: 0.9,
            website_content: 0.7,
            industry_code: 1.0,
        }
    }
}

impl SourceWeights {
    /// Weight for one source
    pub fn weight(&self, source: MatchSource) -> f64 {
        match source {
            MatchSource::BusinessName => self.business_name,
            MatchSource::Description => self.description,
            MatchSource::WebsiteContent => self.website_content,
            MatchSource::IndustryCode => self.industry_code,
        }
    }
}

/// Lower bounds of each risk level above minimal
///
/// Scores below `low` are minimal, scores at or above `critical` are critical.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskThresholds {
    /// Start of `low`
    pub low: f64,
    /// Start of `medium`
    pub medium: f64,
    /// Start of `high`
    pub high: f64,
    /// Start of `critical`
    pub critical: f64,
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self {
            low: 0.25,
            medium: 0.5,
            high: 0.75,
            critical: 0.9,
        }
    }
}

impl RiskThresholds {
    /// Level for a score
    pub fn level(&self, score: f64) -> RiskLevel {
        if score >= self.critical {
            RiskLevel::Critical
        } else if score >= self.high {
            RiskLevel::High
        } else if score >= self.medium {
            RiskLevel::Medium
        } else if score >= self.low {
            RiskLevel::Low
        } else {
            RiskLevel::Minimal
        }
    }

    /// Smallest score that maps to `level`
    pub fn floor_of(&self, level: RiskLevel) -> f64 {
        match level {
            RiskLevel::Minimal => 0.0,
            RiskLevel::Low => self.low,
            RiskLevel::Medium => self.medium,
            RiskLevel::High => self.high,
            RiskLevel::Critical => self.critical,
        }
    }
}

/// Co-occurrence amplification of the risk score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Amplification {
    /// Distinct matches required
    pub min_matches: usize,
    /// Distinct categories required among them
    pub min_categories: usize,
    /// Relative bonus applied to the raw score
    pub bonus: f64,
    /// Absolute cap on the bonus
    pub max_bonus: f64,
}

impl Default for Amplification {
    fn default() -> Self {
        Self {
            min_matches: 3,
            min_categories: 3,
            bonus: 0.10,
            max_bonus: 0.10,
        }
    }
}

/// A deployment-level restricted industry code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestrictedCode {
    /// Code family
    pub code_type: CodeType,
    /// Code value
    pub code: String,
}

/// Configuration for classification and risk scoring
///
/// Weights are data, not code: every deployment may tune them, and
/// [`ScoringConfig::validate`] rejects incomplete tables at startup.
///
/// # Examples
///
/// ```
/// use kyb_domain::{RiskCategory, RiskSeverity};
/// use kyb_scoring::ScoringConfig;
///
/// let config = ScoringConfig::default();
/// assert_eq!(config.severity_weights[&RiskSeverity::Critical], 1.0);
/// assert_eq!(config.category_weights[&RiskCategory::Illegal], 1.0);
/// assert!(config.validate().is_ok());
///
/// let strict = ScoringConfig::conservative();
/// assert!(strict.thresholds.high < config.thresholds.high);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Source weighting for classification
    pub source_weights: SourceWeights,

    /// Lowest confidence a matched industry can receive
    /// Default: 0.1
    pub classification_floor: f64,

    /// Highest confidence a matched industry can receive
    /// Default: 1.0
    pub classification_ceiling: f64,

    /// Weight per severity; all four severities are required
    pub severity_weights: BTreeMap<RiskSeverity, f64>,

    /// Weight per category; all seven categories are required
    pub category_weights: BTreeMap<RiskCategory, f64>,

    /// Level thresholds
    pub thresholds: RiskThresholds,

    /// Co-occurrence amplification
    pub amplification: Amplification,

    /// Codes restricted by this deployment in addition to keyword lists
    pub restricted_codes: Vec<RestrictedCode>,
}

fn default_severity_weights() -> BTreeMap<RiskSeverity, f64> {
    BTreeMap::from([
        (RiskSeverity::Critical, 1.0),
        (RiskSeverity::High, 0.75),
        (RiskSeverity::Medium, 0.5),
        (RiskSeverity::Low, 0.25),
    ])
}

fn default_category_weights() -> BTreeMap<RiskCategory, f64> {
    BTreeMap::from([
        (RiskCategory::Illegal, 1.0),
        (RiskCategory::Sanctions, 1.0),
        (RiskCategory::Prohibited, 0.9),
        (RiskCategory::Tbml, 0.85),
        (RiskCategory::Fraud, 0.85),
        (RiskCategory::HighRisk, 0.7),
        (RiskCategory::Suspicious, 0.6),
    ])
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            source_weights: SourceWeights::default(),
            classification_floor: 0.1,
            classification_ceiling: 1.0,
            severity_weights: default_severity_weights(),
            category_weights: default_category_weights(),
            thresholds: RiskThresholds::default(),
            amplification: Amplification::default(),
            restricted_codes: Vec::new(),
        }
    }
}

impl ScoringConfig {
    /// Lower thresholds and heavier suspicious-activity weighting
    ///
    /// Suitable for regulated onboarding flows where false negatives cost more
    /// than analyst time.
    pub fn conservative() -> Self {
        let mut config = Self::default();
        config.thresholds = RiskThresholds {
            low: 0.15,
            medium: 0.35,
            high: 0.6,
            critical: 0.8,
        };
        config.category_weights.insert(RiskCategory::Suspicious, 0.8);
        config.category_weights.insert(RiskCategory::HighRisk, 0.8);
        config
    }

    /// Higher thresholds, for low-risk merchant segments
    pub fn permissive() -> Self {
        let mut config = Self::default();
        config.thresholds = RiskThresholds {
            low: 0.3,
            medium: 0.6,
            high: 0.8,
            critical: 0.95,
        };
        config
    }

    /// Add a deployment-level restricted code
    pub fn with_restricted_code(mut self, code_type: CodeType, code: impl Into<String>) -> Self {
        self.restricted_codes.push(RestrictedCode {
            code_type,
            code: code.into(),
        });
        self
    }

    /// Whether the deployment restricts `code`
    pub fn is_restricted(&self, code_type: CodeType, code: &str) -> bool {
        self.restricted_codes
            .iter()
            .any(|r| r.code_type == code_type && r.code == code.trim())
    }

    /// Severity weight (0 if absent, which `validate` rules out)
    pub fn severity_weight(&self, severity: RiskSeverity) -> f64 {
        self.severity_weights.get(&severity).copied().unwrap_or(0.0)
    }

    /// Category weight (0 if absent, which `validate` rules out)
    pub fn category_weight(&self, category: RiskCategory) -> f64 {
        self.category_weights.get(&category).copied().unwrap_or(0.0)
    }

    /// Check weight tables and thresholds
    pub fn validate(&self) -> Result<(), ScoringError> {
        let invalid = |msg: String| Err(ScoringError::ConfigInvalid(msg));
        let in_unit = |v: f64| (0.0..=1.0).contains(&v);

        for severity in RiskSeverity::ALL {
            match self.severity_weights.get(&severity) {
                None => return invalid(format!("missing severity weight for '{}'", severity)),
                Some(w) if !in_unit(*w) => {
                    return invalid(format!("severity weight for '{}' must be in [0, 1], got {}", severity, w))
                }
                _ => {}
            }
        }

        for category in RiskCategory::ALL {
            match self.category_weights.get(&category) {
                None => return invalid(format!("missing category weight for '{}'", category)),
                Some(w) if !in_unit(*w) => {
                    return invalid(format!("category weight for '{}' must be in [0, 1], got {}", category, w))
                }
                _ => {}
            }
        }

        let sw = &self.source_weights;
        for (name, w) in [
            ("business_name", sw.business_name),
            ("description", sw.description),
            ("website_content", sw.website_content),
            ("industry_code", sw.industry_code),
        ] {
            if !in_unit(w) {
                return invalid(format!("source weight for '{}' must be in [0, 1], got {}", name, w));
            }
        }

        if !in_unit(self.classification_floor)
            || !in_unit(self.classification_ceiling)
            || self.classification_floor > self.classification_ceiling
        {
            return invalid(format!(
                "classification bounds must satisfy 0 <= floor <= ceiling <= 1, got [{}, {}]",
                self.classification_floor, self.classification_ceiling
            ));
        }

        let t = &self.thresholds;
        let ordered = 0.0 < t.low && t.low < t.medium && t.medium < t.high && t.high < t.critical;
        if !ordered || t.critical > 1.0 {
            return invalid(format!(
                "thresholds must be strictly increasing within (0, 1], got {} / {} / {} / {}",
                t.low, t.medium, t.high, t.critical
            ));
        }

        let a = &self.amplification;
        if !in_unit(a.bonus) || !in_unit(a.max_bonus) {
            return invalid("amplification bonus and max_bonus must be in [0, 1]".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ScoringConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.severity_weight(RiskSeverity::High), 0.75);
        assert_eq!(config.severity_weight(RiskSeverity::Medium), 0.5);
        assert_eq!(config.severity_weight(RiskSeverity::Low), 0.25);
        assert_eq!(config.source_weights.weight(MatchSource::WebsiteContent), 0.7);
    }

    #[test]
    fn test_presets_valid() {
        assert!(ScoringConfig::conservative().validate().is_ok());
        assert!(ScoringConfig::permissive().validate().is_ok());
    }

    #[test]
    fn test_missing_severity_rejected() {
        let mut config = ScoringConfig::default();
        config.severity_weights.remove(&RiskSeverity::Low);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("low"));
    }

    #[test]
    fn test_missing_category_rejected() {
        let mut config = ScoringConfig::default();
        config.category_weights.remove(&RiskCategory::Tbml);
        assert!(matches!(config.validate(), Err(ScoringError::ConfigInvalid(_))));
    }

    #[test]
    fn test_out_of_range_weight_rejected() {
        let mut config = ScoringConfig::default();
        config.category_weights.insert(RiskCategory::Fraud, 1.5);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unordered_thresholds_rejected() {
        let mut config = ScoringConfig::default();
        config.thresholds.medium = 0.8;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_levels() {
        let t = RiskThresholds::default();
        assert_eq!(t.level(0.0), RiskLevel::Minimal);
        assert_eq!(t.level(0.24), RiskLevel::Minimal);
        assert_eq!(t.level(0.25), RiskLevel::Low);
        assert_eq!(t.level(0.5), RiskLevel::Medium);
        assert_eq!(t.level(0.75), RiskLevel::High);
        assert_eq!(t.level(0.89), RiskLevel::High);
        assert_eq!(t.level(0.9), RiskLevel::Critical);
        assert_eq!(t.level(t.floor_of(RiskLevel::High)), RiskLevel::High);
    }

    #[test]
    fn test_restricted_codes() {
        let config = ScoringConfig::default().with_restricted_code(CodeType::Mcc, "7995");
        assert!(config.is_restricted(CodeType::Mcc, " 7995 "));
        assert!(!config.is_restricted(CodeType::Naics, "7995"));
    }

    #[test]
    fn test_from_toml() {
        let toml_str = r#"
            classification_floor = 0.05

            [severity_weights]
            critical = 1.0
            high = 0.8
            medium = 0.5
            low = 0.2

            [thresholds]
            high = 0.7

            [[restricted_codes]]
            code_type = "MCC"
            code = "7995"
        "#;
        let config: ScoringConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.classification_floor, 0.05);
        assert_eq!(config.severity_weight(RiskSeverity::High), 0.8);
        assert_eq!(config.thresholds.high, 0.7);
        assert_eq!(config.thresholds.critical, 0.9);
        assert_eq!(config.category_weight(RiskCategory::Illegal), 1.0);
        assert!(config.is_restricted(CodeType::Mcc, "7995"));
        assert!(config.validate().is_ok());
    }
}
