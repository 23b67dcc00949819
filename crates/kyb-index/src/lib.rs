//! KYB Keyword Index
//!
//! Weighted keyword lookup shared by industry classification and risk
//! screening.
//!
//! # Overview
//!
//! - **IndexSnapshot**: raw industries, keywords, risk keywords and codes as
//!   read from a [`KeywordSource`](kyb_domain::traits::KeywordSource)
//! - **KeywordIndex**: the compiled, immutable form of a snapshot, versioned
//!   and fingerprinted
//! - **Matcher**: exact, synonym and pattern matching with context snippets
//! - **PatternDetector**: composite risk signatures (shell companies, money
//!   laundering, sanctions evasion and the like)
//!
//! # Matching order
//!
//! | Kind | Confidence |
//! |------|------------|
//! | Exact keyword | `base_weight` |
//! | Synonym | `base_weight × 0.85` |
//! | Pattern | `base_weight × multiplier` (default 0.75) |
//!
//! Matches are deduplicated per keyword and span, keeping the strongest
//! variant, then sorted by confidence.
//!
//! # Usage
//!
//! ```
//! use kyb_domain::MatchSource;
//! use kyb_index::{InMemorySource, IndexSnapshot, KeywordIndex, Matcher, MatcherConfig, PatternDetector};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let source = InMemorySource::reference();
//! let index = KeywordIndex::build(IndexSnapshot::load(&source)?, 1);
//!
//! let config = MatcherConfig::default();
//! let matcher = Matcher::new(config.clone());
//! let matches = matcher.match_industries("Joe's Coffee Shop", &index, MatchSource::BusinessName);
//! assert!(!matches.is_empty());
//!
//! let (detector, errors) = PatternDetector::builtin(&config);
//! assert!(errors.is_empty());
//! let hits = detector.detect("offshore nominee company, no physical operations", MatchSource::Description);
//! assert!(!hits.is_empty());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

mod config;
mod error;
mod index;
mod matcher;
mod memory;
pub mod normalize;
mod pattern;
pub mod reference;

pub use config::MatcherConfig;
pub use error::IndexError;
pub use index::{IndexSnapshot, KeywordIndex};
pub use matcher::{compare_matches, dedup_and_sort, Matcher};
pub use memory::InMemorySource;
pub use pattern::{
    builtin_rules, PatternDetector, PatternRule, RuleKind, EXACT_SPECIFICITY, FUZZY_FLOOR,
    PARTIAL_SPECIFICITY,
};
