//! Industry reference data and standardized classification codes

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of an industry row
///
/// `IndustryId(0)` is reserved for the "unclassified" sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IndustryId(pub u32);

impl IndustryId {
    /// Sentinel id used when nothing matched
    pub const UNCLASSIFIED: IndustryId = IndustryId(0);

    /// Whether this is the unclassified sentinel
    pub fn is_unclassified(&self) -> bool {
        *self == Self::UNCLASSIFIED
    }
}

impl fmt::Display for IndustryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An industry as maintained by the administrative data pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Industry {
    /// Unique identifier
    pub id: IndustryId,

    /// Display name (e.g. "Coffee Shop")
    pub name: String,

    /// Broad grouping (e.g. "Food & Beverage")
    pub category: String,

    /// Minimum confidence at which this industry may be reported as primary
    pub confidence_threshold: f64,

    /// Inactive industries are ignored when the index is built
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl Industry {
    /// Create an active industry
    pub fn new(id: u32, name: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            id: IndustryId(id),
            name: name.into(),
            category: category.into(),
            confidence_threshold: 0.3,
            active: true,
        }
    }
}

/// Standardized code families
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CodeType {
    /// North American Industry Classification System
    Naics,
    /// Standard Industrial Classification
    Sic,
    /// Merchant Category Code
    Mcc,
}

impl CodeType {
    /// Get the code family name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            CodeType::Naics => "NAICS",
            CodeType::Sic => "SIC",
            CodeType::Mcc => "MCC",
        }
    }

    /// Parse a code family (case-insensitive)
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "NAICS" => Some(CodeType::Naics),
            "SIC" => Some(CodeType::Sic),
            "MCC" => Some(CodeType::Mcc),
            _ => None,
        }
    }
}

impl fmt::Display for CodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A code attached to an industry
///
/// Codes are only ever generated from the winning industry, never copied from
/// caller input.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClassificationCode {
    /// Owning industry
    pub industry_id: IndustryId,

    /// Code family
    pub code_type: CodeType,

    /// The code itself (e.g. "5814")
    pub code: String,

    /// Human readable description
    pub description: String,
}

impl ClassificationCode {
    /// Create a new code row
    pub fn new(
        industry_id: u32,
        code_type: CodeType,
        code: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            industry_id: IndustryId(industry_id),
            code_type,
            code: code.into(),
            description: description.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_type_parse() {
        assert_eq!(CodeType::parse("mcc"), Some(CodeType::Mcc));
        assert_eq!(CodeType::parse("NAICS"), Some(CodeType::Naics));
        assert_eq!(CodeType::parse("Sic"), Some(CodeType::Sic));
        assert_eq!(CodeType::parse("isic"), None);
    }

    #[test]
    fn test_unclassified_sentinel() {
        assert!(IndustryId::UNCLASSIFIED.is_unclassified());
        assert!(!IndustryId(7).is_unclassified());
    }

    #[test]
    fn test_code_type_serializes_uppercase() {
        let json = serde_json::to_string(&CodeType::Mcc).unwrap();
        assert_eq!(json, "\"MCC\"");
    }
}
