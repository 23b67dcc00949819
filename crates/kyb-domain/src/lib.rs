//! KYB Domain Layer
//!
//! Core data model for business classification and risk screening. Every other
//! crate in the workspace depends on these types and on the collaborator traits
//! declared in [`traits`].
//!
//! ## Key Concepts
//!
//! - **Industry**: reference data row with NAICS/SIC/MCC codes attached
//! - **Keyword / RiskKeyword**: weighted terms that point at an industry or at a
//!   risk category and severity
//! - **MatchResult**: one piece of evidence found in request text
//! - **ClassificationResult / RiskAssessmentResult**: what callers get back
//! - **Event / Message**: the envelope used by the internal bus
//!
//! ## Architecture
//!
//! This crate holds no behaviour beyond value-level helpers. Matching, scoring,
//! caching and messaging live in their own crates and talk to the outside world
//! through the traits defined here.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod confidence;
pub mod event;
pub mod industry;
pub mod keyword;
pub mod matching;
pub mod request;
pub mod result;
pub mod traits;

// Re-exports for convenience
pub use confidence::clamp_unit;
pub use event::{Event, EventType, Message, Priority};
pub use industry::{ClassificationCode, CodeType, Industry, IndustryId};
pub use keyword::{Keyword, KeywordId, RiskCategory, RiskKeyword, RiskSeverity};
pub use matching::{MatchKind, MatchOwner, MatchResult, MatchSource, MatchTarget};
pub use request::{ClassificationRequest, RequestError, RiskRequest};
pub use result::{
    CategoryScore, ClassificationResult, DegradedStrategy, ExplanationEntry, GeneratedCodes,
    IndustryCandidate, Method, MethodBreakdown, MethodStatus, Recommendation,
    RiskAssessmentResult, RiskEvidence, RiskLevel, RouterState,
};
