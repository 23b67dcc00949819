//! KYB Scoring
//!
//! Turns match evidence into classification confidences and risk scores.
//!
//! # Classification confidence
//!
//! Matches are grouped by industry. Each distinct keyword counts once at its
//! best source-weighted confidence, and the industry confidence is the mean of
//! those values, bounded to `[classification_floor, classification_ceiling]`.
//! Ties are broken by strongest single match, then number of distinct
//! keywords, then industry name.
//!
//! # Risk score
//!
//! ```text
//! score = Σ severity_weight[severity] × category_weight[category] × confidence
//! ```
//!
//! amplified by a bounded bonus when at least three matches from three
//! distinct categories co-occur, then clamped to [0, 1]. Levels come from
//! configurable thresholds:
//!
//! | Score | Level |
//! |-------|-------|
//! | < 0.25 | minimal |
//! | < 0.5 | low |
//! | < 0.75 | medium |
//! | < 0.9 | high |
//! | otherwise | critical |
//!
//! # Configuration
//!
//! ```toml
//! classification_floor = 0.1
//!
//! [severity_weights]
//! critical = 1.0
//! high = 0.75
//! medium = 0.5
//! low = 0.25
//!
//! [thresholds]
//! low = 0.25
//! medium = 0.5
//! high = 0.75
//! critical = 0.9
//! ```

#![warn(missing_docs)]

mod config;
mod error;
mod scorer;

pub use config::{Amplification, RestrictedCode, RiskThresholds, ScoringConfig, SourceWeights};
pub use error::ScoringError;
pub use scorer::{compare_candidates, RiskScore, Scorer};
