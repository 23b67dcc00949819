//! Composite risk-pattern detectors
//!
//! Detectors express signatures that single keywords cannot: several weak
//! signals co-occurring, tokens in a given order, or a compiled phrase. They
//! run on normalized, length-capped text and never fail per request; rule
//! compilation problems surface once, at construction.

use crate::config::MatcherConfig;
use crate::error::IndexError;
use crate::matcher::dedup_and_sort;
use crate::normalize::{context_window, find_term, normalize, normalize_capped, words};
use kyb_domain::confidence::clamp_unit;
use kyb_domain::{
    MatchKind, MatchOwner, MatchResult, MatchSource, MatchTarget, RiskCategory, RiskSeverity,
};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, warn};

/// Confidence for a compiled phrase match
pub const EXACT_SPECIFICITY: f64 = 1.0;

/// Confidence for an ordered-token match
pub const PARTIAL_SPECIFICITY: f64 = 0.85;

/// Minimum confidence for a co-occurrence match
pub const FUZZY_FLOOR: f64 = 0.6;

const RULE_SIZE_LIMIT: usize = 1 << 20;

/// How a detector recognises its signature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleKind {
    /// A regular expression over normalized text
    Regex {
        /// Pattern source
        pattern: String,
    },
    /// Single-word tokens appearing in order, each within `window` words of
    /// the previous one
    Ordered {
        /// Tokens in required order
        tokens: Vec<String>,
        /// Maximum word distance between consecutive tokens
        window: usize,
    },
    /// At least `min_signals` of the listed phrases present anywhere
    CoOccurrence {
        /// Candidate signals
        signals: Vec<String>,
        /// Signals required to fire
        min_signals: usize,
    },
}

/// A named detector definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternRule {
    /// Detector name, reported as the match target
    pub name: String,
    /// Risk category of the signature
    pub category: RiskCategory,
    /// Base severity
    pub severity: RiskSeverity,
    /// Recognition rule
    pub kind: RuleKind,
    /// Multiplier applied to the specificity-derived confidence
    #[serde(default = "default_weight")]
    pub weight: f64,
}

fn default_weight() -> f64 {
    1.0
}

impl PatternRule {
    /// Regex detector
    pub fn regex(
        name: impl Into<String>,
        category: RiskCategory,
        severity: RiskSeverity,
        pattern: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            category,
            severity,
            kind: RuleKind::Regex {
                pattern: pattern.into(),
            },
            weight: 1.0,
        }
    }

    /// Ordered-token detector
    pub fn ordered(
        name: impl Into<String>,
        category: RiskCategory,
        severity: RiskSeverity,
        tokens: &[&str],
        window: usize,
    ) -> Self {
        Self {
            name: name.into(),
            category,
            severity,
            kind: RuleKind::Ordered {
                tokens: tokens.iter().map(|t| t.to_string()).collect(),
                window,
            },
            weight: 1.0,
        }
    }

    /// Co-occurrence detector
    pub fn co_occurrence(
        name: impl Into<String>,
        category: RiskCategory,
        severity: RiskSeverity,
        signals: &[&str],
        min_signals: usize,
    ) -> Self {
        Self {
            name: name.into(),
            category,
            severity,
            kind: RuleKind::CoOccurrence {
                signals: signals.iter().map(|s| s.to_string()).collect(),
                min_signals,
            },
            weight: 1.0,
        }
    }
}

#[derive(Debug, Clone)]
enum Compiled {
    Regex(Regex),
    Ordered { tokens: Vec<String>, window: usize },
    CoOccurrence { signals: Vec<String>, min_signals: usize },
}

#[derive(Debug, Clone)]
struct CompiledRule {
    name: String,
    category: RiskCategory,
    severity: RiskSeverity,
    weight: f64,
    compiled: Compiled,
}

fn compile(rule: &PatternRule) -> Result<CompiledRule, IndexError> {
    let fail = |message: String| IndexError::PatternCompile {
        name: rule.name.clone(),
        message,
    };

    let compiled = match &rule.kind {
        RuleKind::Regex { pattern } => RegexBuilder::new(pattern)
            .case_insensitive(true)
            .size_limit(RULE_SIZE_LIMIT)
            .build()
            .map(Compiled::Regex)
            .map_err(|e| fail(e.to_string()))?,
        RuleKind::Ordered { tokens, window } => {
            let tokens: Vec<String> = tokens.iter().map(|t| normalize(t)).collect();
            if tokens.is_empty() || tokens.iter().any(|t| t.is_empty() || t.contains(' ')) {
                return Err(fail("ordered tokens must be non-empty single words".to_string()));
            }
            if *window == 0 {
                return Err(fail("ordered window must be at least 1".to_string()));
            }
            Compiled::Ordered {
                tokens,
                window: *window,
            }
        }
        RuleKind::CoOccurrence {
            signals,
            min_signals,
        } => {
            let mut seen = HashSet::new();
            let signals: Vec<String> = signals
                .iter()
                .map(|s| normalize(s))
                .filter(|s| !s.is_empty() && seen.insert(s.clone()))
                .collect();
            if *min_signals == 0 || *min_signals > signals.len() {
                return Err(fail(format!(
                    "min_signals {} out of range for {} signals",
                    min_signals,
                    signals.len()
                )));
            }
            Compiled::CoOccurrence {
                signals,
                min_signals: *min_signals,
            }
        }
    };

    Ok(CompiledRule {
        name: rule.name.clone(),
        category: rule.category,
        severity: rule.severity,
        weight: clamp_unit(rule.weight),
        compiled,
    })
}

/// Library of compiled risk-pattern detectors
#[derive(Debug, Clone)]
pub struct PatternDetector {
    rules: Vec<CompiledRule>,
    context_chars: usize,
    max_input_chars: usize,
}

impl PatternDetector {
    /// Compile `rules`, skipping disabled ones
    ///
    /// Rules that fail to compile are left out and returned alongside the
    /// detector; every other rule stays active.
    pub fn new(rules: Vec<PatternRule>, config: &MatcherConfig) -> (Self, Vec<IndexError>) {
        let mut compiled = Vec::with_capacity(rules.len());
        let mut errors = Vec::new();

        for rule in &rules {
            if !config.pattern_enabled(&rule.name) {
                debug!(pattern = %rule.name, "Pattern detector disabled by configuration");
                continue;
            }
            match compile(rule) {
                Ok(c) => compiled.push(c),
                Err(e) => {
                    warn!(pattern = %rule.name, error = %e, "Pattern detector failed to compile");
                    errors.push(e);
                }
            }
        }

        let detector = Self {
            rules: compiled,
            context_chars: config.context_chars,
            max_input_chars: config.max_input_chars,
        };
        (detector, errors)
    }

    /// The built-in detector library
    pub fn builtin(config: &MatcherConfig) -> (Self, Vec<IndexError>) {
        Self::new(builtin_rules(), config)
    }

    /// Names of active detectors
    pub fn rule_names(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.name.as_str()).collect()
    }

    /// Number of active detectors
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// True when no detector is active
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Run every active detector against `text`
    pub fn detect(&self, text: &str, source: MatchSource) -> Vec<MatchResult> {
        self.detect_all(&[(text, source)])
    }

    /// Run every active detector over several text sources together
    ///
    /// Regex rules report per source. Ordered and co-occurrence rules see the
    /// sources as one text, so a signature split across the business name,
    /// the description and the website still fires. Their span, context and
    /// source are those of the earliest source holding a signal.
    pub fn detect_all(&self, sources: &[(&str, MatchSource)]) -> Vec<MatchResult> {
        let parts: Vec<(String, MatchSource)> = sources
            .iter()
            .map(|(text, source)| (normalize_capped(text, self.max_input_chars), *source))
            .filter(|(text, _)| !text.is_empty())
            .collect();
        if parts.is_empty() {
            return Vec::new();
        }

        let mut joined = String::new();
        let mut offsets = Vec::with_capacity(parts.len());
        for (text, _) in &parts {
            if !joined.is_empty() {
                joined.push(' ');
            }
            offsets.push(joined.len());
            joined.push_str(text);
        }

        let mut out = Vec::new();
        for rule in &self.rules {
            match &rule.compiled {
                Compiled::Regex(regex) => {
                    for (text, source) in &parts {
                        for found in regex.find_iter(text) {
                            if found.start() < found.end() {
                                out.push(self.result(rule, text, found.start(), found.end(), EXACT_SPECIFICITY, *source, None));
                            }
                        }
                    }
                }
                Compiled::Ordered { tokens, window } => {
                    if let Some((start, end)) = find_ordered(&joined, tokens, *window) {
                        let idx = offsets.iter().rposition(|&o| o <= start).unwrap_or(0);
                        let (text, source) = &parts[idx];
                        let local_start = start - offsets[idx];
                        let local_end = (end - offsets[idx]).min(text.len());
                        let label = joined[start..end].to_string();
                        out.push(self.result(rule, text, local_start, local_end, PARTIAL_SPECIFICITY, *source, Some(label)));
                    }
                }
                Compiled::CoOccurrence {
                    signals,
                    min_signals,
                } => {
                    let mut found = Vec::new();
                    for signal in signals {
                        let hit = parts.iter().enumerate().find_map(|(idx, (text, _))| {
                            find_term(text, signal).first().map(|&(start, end)| (idx, start, end))
                        });
                        if let Some((idx, start, end)) = hit {
                            found.push((idx, start, end, signal.as_str()));
                        }
                    }
                    if found.len() >= *min_signals {
                        let first = found.iter().map(|f| f.0).min().unwrap_or(0);
                        let (text, source) = &parts[first];
                        let local = found.iter().filter(|f| f.0 == first);
                        let start = local.clone().map(|f| f.1).min().unwrap_or(0);
                        let end = local.map(|f| f.2).max().unwrap_or(start);
                        let fraction = found.len() as f64 / signals.len() as f64;
                        let confidence = FUZZY_FLOOR + (1.0 - FUZZY_FLOOR) * fraction;
                        let label = found.iter().map(|f| f.3).collect::<Vec<_>>().join(" + ");
                        out.push(self.result(rule, text, start, end, confidence, *source, Some(label)));
                    }
                }
            }
        }

        dedup_and_sort(out)
    }

    #[allow(clippy::too_many_arguments)]
    fn result(
        &self,
        rule: &CompiledRule,
        normalized: &str,
        start: usize,
        end: usize,
        specificity: f64,
        source: MatchSource,
        label: Option<String>,
    ) -> MatchResult {
        MatchResult {
            target: MatchTarget::Pattern(rule.name.clone()),
            kind: MatchKind::Pattern,
            owner: MatchOwner::Risk {
                category: rule.category,
                severity: rule.severity,
            },
            matched_text: label.unwrap_or_else(|| normalized[start..end].to_string()),
            start,
            end,
            source,
            confidence: clamp_unit(specificity * rule.weight),
            context: context_window(normalized, start, end, self.context_chars),
        }
    }
}

/// First span where `tokens` occur in order with gaps of at most `window` words
fn find_ordered(text: &str, tokens: &[String], window: usize) -> Option<(usize, usize)> {
    let words = words(text);
    let first = tokens.first()?;

    for (i, (start, _, word)) in words.iter().enumerate() {
        if word != first {
            continue;
        }
        let mut pos = i;
        let mut end = words[i].1;
        let mut complete = true;
        for token in &tokens[1..] {
            let limit = (pos + window).min(words.len() - 1);
            match (pos + 1..=limit).find(|&j| words[j].2 == token) {
                Some(j) => {
                    pos = j;
                    end = words[j].1;
                }
                None => {
                    complete = false;
                    break;
                }
            }
        }
        if complete {
            return Some((*start, end));
        }
    }
    None
}

/// Built-in detector definitions
pub fn builtin_rules() -> Vec<PatternRule> {
    use RiskCategory::*;
    use RiskSeverity::*;

    vec![
        PatternRule::co_occurrence(
            "money_laundering",
            Suspicious,
            Critical,
            &[
                "cash intensive",
                "no invoices",
                "no receipts",
                "offshore",
                "structuring",
                "layering",
                "third party payments",
                "untraceable",
                "wire transfers",
            ],
            3,
        ),
        PatternRule::co_occurrence(
            "shell_company",
            Fraud,
            High,
            &[
                "shell",
                "nominee",
                "offshore",
                "no physical operations",
                "no physical presence",
                "no employees",
                "bearer shares",
                "registered agent",
                "anonymous",
                "mailbox",
                "virtual office",
                "holding company",
            ],
            3,
        ),
        PatternRule::regex(
            "sanctions_evasion",
            Sanctions,
            Critical,
            r"\b(evad\w*|circumvent\w*|bypass\w*|avoid\w*)\s+(\w+\s+){0,3}(sanctions?|embargo\w*|ofac)\b",
        ),
        PatternRule::co_occurrence(
            "human_trafficking",
            Illegal,
            Critical,
            &[
                "debt bondage",
                "passports confiscated",
                "passports held",
                "no questions asked",
                "young women",
                "escort",
                "live in",
                "visa sponsorship",
                "recruitment fee",
            ],
            3,
        ),
        PatternRule::regex(
            "cybercrime",
            Illegal,
            Critical,
            r"\b(ransomware|botnets?|carding|card dumps|credit card dumps|ddos for hire|booter|stresser|stolen credentials|malware as a service|fullz)\b",
        ),
        PatternRule::regex(
            "tbml_invoice_manipulation",
            Tbml,
            High,
            r"\b((over|under)\s?invoic\w*|phantom\s+shipments?|misrepresent\w*\s+(\w+\s+){0,2}(goods|shipments?|quantit\w*))\b",
        ),
        PatternRule::ordered("ponzi_scheme", Fraud, High, &["guaranteed", "returns"], 4),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector() -> PatternDetector {
        let (detector, errors) = PatternDetector::builtin(&MatcherConfig::default());
        assert!(errors.is_empty(), "builtin rules must compile: {:?}", errors);
        detector
    }

    fn names(matches: &[MatchResult]) -> Vec<String> {
        matches
            .iter()
            .filter_map(|m| match &m.target {
                MatchTarget::Pattern(name) => Some(name.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_builtin_library_compiles() {
        let detector = detector();
        assert_eq!(detector.len(), 7);
        assert!(detector.rule_names().contains(&"shell_company"));
    }

    #[test]
    fn test_shell_company_fires() {
        let text = "Anonymous Shell Holdings offshore nominee company, no physical operations, cash-only";
        let matches = detector().detect(text, MatchSource::Description);
        let shell = matches
            .iter()
            .find(|m| m.target == MatchTarget::Pattern("shell_company".into()))
            .expect("shell_company should fire");
        assert_eq!(shell.risk(), Some((RiskCategory::Fraud, RiskSeverity::High)));
        assert!(shell.confidence >= FUZZY_FLOOR && shell.confidence <= 1.0);
        assert!(shell.matched_text.contains("nominee"));
    }

    #[test]
    fn test_co_occurrence_below_minimum() {
        let matches = detector().detect("offshore wind consultancy", MatchSource::Description);
        assert!(!names(&matches).contains(&"shell_company".to_string()));
        assert!(!names(&matches).contains(&"money_laundering".to_string()));
    }

    #[test]
    fn test_regex_detector_exact_specificity() {
        let matches = detector().detect(
            "We help clients avoid US sanctions on shipments",
            MatchSource::Description,
        );
        let hit = matches
            .iter()
            .find(|m| m.target == MatchTarget::Pattern("sanctions_evasion".into()))
            .unwrap();
        assert_eq!(hit.confidence, EXACT_SPECIFICITY);
    }

    #[test]
    fn test_ordered_detector() {
        let d = detector();
        let hit = d.detect("Guaranteed 20% monthly returns!", MatchSource::Description);
        assert!(names(&hit).contains(&"ponzi_scheme".to_string()));
        assert_eq!(hit[0].confidence, PARTIAL_SPECIFICITY);

        // wrong order
        let miss = d.detect("returns are never guaranteed", MatchSource::Description);
        assert!(!names(&miss).contains(&"ponzi_scheme".to_string()));

        // too far apart
        let far = d.detect(
            "guaranteed service with one two three four five returns",
            MatchSource::Description,
        );
        assert!(!names(&far).contains(&"ponzi_scheme".to_string()));
    }

    #[test]
    fn test_invalid_rule_reported_others_continue() {
        let rules = vec![
            PatternRule::regex("broken", RiskCategory::Fraud, RiskSeverity::Low, "(unclosed"),
            PatternRule::co_occurrence("empty", RiskCategory::Fraud, RiskSeverity::Low, &[], 1),
            PatternRule::regex("ok", RiskCategory::Fraud, RiskSeverity::Low, r"\bscam\b"),
        ];
        let (detector, errors) = PatternDetector::new(rules, &MatcherConfig::default());
        assert_eq!(errors.len(), 2);
        assert_eq!(detector.rule_names(), vec!["ok"]);
        assert_eq!(detector.detect("a scam", MatchSource::Description).len(), 1);
    }

    #[test]
    fn test_signals_split_across_sources_combine() {
        let d = detector();
        let split = d.detect_all(&[
            ("Shell Nominee Trading", MatchSource::BusinessName),
            ("registered offshore", MatchSource::Description),
        ]);
        let shell = split
            .iter()
            .find(|m| m.target == MatchTarget::Pattern("shell_company".into()))
            .expect("signals from both fields should combine");
        assert_eq!(shell.source, MatchSource::BusinessName);
        assert_eq!(&"shell nominee trading"[shell.start..shell.end], "shell nominee");
        assert!(shell.matched_text.contains("offshore"));

        let together = d.detect("Shell Nominee Trading registered offshore", MatchSource::BusinessName);
        let joined = together
            .iter()
            .find(|m| m.target == MatchTarget::Pattern("shell_company".into()))
            .unwrap();
        assert_eq!(joined.confidence, shell.confidence);
    }

    #[test]
    fn test_ordered_tokens_span_sources() {
        let hits = detector().detect_all(&[
            ("Guaranteed Growth Partners", MatchSource::BusinessName),
            ("monthly returns for members", MatchSource::Description),
        ]);
        let ponzi = hits
            .iter()
            .find(|m| m.target == MatchTarget::Pattern("ponzi_scheme".into()))
            .unwrap();
        assert_eq!(ponzi.source, MatchSource::BusinessName);
        assert_eq!(ponzi.start, 0);
        assert!(ponzi.matched_text.ends_with("returns"));
    }

    #[test]
    fn test_repeated_signals_count_once() {
        let rules = vec![PatternRule::co_occurrence(
            "padded",
            RiskCategory::Fraud,
            RiskSeverity::Low,
            &["offshore", "Offshore", "nominee", "offshore"],
            3,
        )];
        let (detector, errors) = PatternDetector::new(rules, &MatcherConfig::default());
        assert!(detector.is_empty());
        assert_eq!(errors.len(), 1);

        let rules = vec![PatternRule::co_occurrence(
            "padded",
            RiskCategory::Fraud,
            RiskSeverity::Low,
            &["offshore", "nominee", "offshore", "shell"],
            2,
        )];
        let (detector, _) = PatternDetector::new(rules, &MatcherConfig::default());
        let hit = detector.detect("offshore nominee", MatchSource::Description);
        // two of three distinct signals
        let expected = FUZZY_FLOOR + (1.0 - FUZZY_FLOOR) * (2.0 / 3.0);
        assert!((hit[0].confidence - expected).abs() < 1e-9);
    }

    #[test]
    fn test_disabled_patterns() {
        let config = MatcherConfig {
            disabled_patterns: vec!["ponzi_scheme".to_string()],
            ..MatcherConfig::default()
        };
        let (detector, _) = PatternDetector::builtin(&config);
        assert_eq!(detector.len(), 6);
        assert!(detector
            .detect("guaranteed returns", MatchSource::Description)
            .is_empty());
    }

    #[test]
    fn test_garbled_input_never_fails() {
        let d = detector();
        assert!(d.detect("", MatchSource::Description).is_empty());
        assert!(d.detect("\u{0}\u{1}((((**", MatchSource::Description).is_empty());
        let long = "avoid ".repeat(50_000);
        let _ = d.detect(&long, MatchSource::WebsiteContent);
    }
}
