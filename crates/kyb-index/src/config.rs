//! Configuration for matching and pattern detection

use serde::{Deserialize, Serialize};

/// Configuration for the matcher and the pattern library
///
/// # Examples
///
/// ```
/// use kyb_index::MatcherConfig;
///
/// let config = MatcherConfig::default();
/// assert_eq!(config.context_chars, 40);
/// assert_eq!(config.synonym_discount, 0.85);
///
/// let strict = MatcherConfig::strict();
/// assert!(strict.max_input_chars < config.max_input_chars);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    /// Characters of context captured either side of a match
    /// Default: 40
    pub context_chars: usize,

    /// Input is truncated to this many characters before matching
    /// Default: 20,000
    pub max_input_chars: usize,

    /// Confidence multiplier for synonym matches
    /// Default: 0.85
    pub synonym_discount: f64,

    /// Confidence multiplier for pattern matches without their own multiplier
    /// Default: 0.75
    pub default_pattern_multiplier: f64,

    /// Names of built-in detectors to skip
    pub disabled_patterns: Vec<String>,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            context_chars: 40,
            max_input_chars: 20_000,
            synonym_discount: 0.85,
            default_pattern_multiplier: 0.75,
            disabled_patterns: Vec::new(),
        }
    }
}

impl MatcherConfig {
    /// Tighter input cap and narrower context, for high-volume screening
    pub fn strict() -> Self {
        Self {
            context_chars: 24,
            max_input_chars: 5_000,
            ..Self::default()
        }
    }

    /// Validate multipliers and caps
    pub fn validate(&self) -> Result<(), String> {
        if self.max_input_chars == 0 {
            return Err("max_input_chars must be greater than zero".to_string());
        }
        for (name, value) in [
            ("synonym_discount", self.synonym_discount),
            ("default_pattern_multiplier", self.default_pattern_multiplier),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(format!("{} must be in [0, 1], got {}", name, value));
            }
        }
        Ok(())
    }

    /// Whether a built-in detector is enabled
    pub fn pattern_enabled(&self, name: &str) -> bool {
        !self.disabled_patterns.iter().any(|d| d == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        assert!(MatcherConfig::default().validate().is_ok());
        assert!(MatcherConfig::strict().validate().is_ok());
    }

    #[test]
    fn test_invalid_discount() {
        let config = MatcherConfig {
            synonym_discount: 1.5,
            ..MatcherConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_disabled_patterns() {
        let config = MatcherConfig {
            disabled_patterns: vec!["ponzi_scheme".to_string()],
            ..MatcherConfig::default()
        };
        assert!(!config.pattern_enabled("ponzi_scheme"));
        assert!(config.pattern_enabled("shell_company"));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: MatcherConfig = serde_json::from_str(r#"{"context_chars": 10}"#).unwrap();
        assert_eq!(config.context_chars, 10);
        assert_eq!(config.max_input_chars, 20_000);
    }
}
