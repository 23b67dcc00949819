//! KYB Engine
//!
//! Classifies a business into NAICS, SIC and MCC codes and screens it for
//! prohibited, illegal or high-risk activity, producing confidence-scored,
//! explainable results.
//!
//! # Architecture
//!
//! | Component | Role |
//! |-----------|------|
//! | [`Engine`] | Facade: builds everything, serves requests, publishes events |
//! | [`IndexManager`] | Loads the keyword index with retry and cache fallback, swaps it on refresh |
//! | [`ModuleSelector`] | Picks strategies per request and decides on escalation |
//! | [`Classifier`] | Keyword, content and escalation passes, merged into one result |
//! | [`RiskDetectionService`] | Risk keywords, pattern library and restricted codes |
//! | [`ClassifierModule`], [`RiskModule`] | The same services hosted on the bus |
//!
//! Matching lives in `kyb-index`, scoring in `kyb-scoring`, the event and
//! message buses in `kyb-bus` and the disk cache in `kyb-cache`.
//!
//! # Failure model
//!
//! Only malformed input and startup problems are errors. A failing content
//! provider or reasoning strategy degrades the result: it is recorded in
//! `degraded`, costs a fixed confidence penalty and is announced with a
//! `StrategyDegraded` event.
//!
//! # Example
//!
//! ```no_run
//! use kyb_domain::{ClassificationRequest, CodeType, RiskRequest};
//! use kyb_engine::{Engine, EngineConfig};
//!
//! # async fn example() -> kyb_engine::Result<()> {
//! kyb_engine::telemetry::init_tracing("info");
//! let engine = Engine::builder(EngineConfig::default()).build().await?;
//!
//! let result = engine
//!     .classify(&ClassificationRequest::new("Joe's Coffee Shop"))
//!     .await?;
//! println!("{}", result.primary_industry.name);
//!
//! let risk = engine
//!     .assess_risk(&RiskRequest::new("Lucky Star LLC").with_code(CodeType::Mcc, "7995"))
//!     .await?;
//! println!("{:?}", risk.recommendation);
//!
//! engine.shutdown().await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod classifier;
mod config;
mod engine;
mod error;
pub mod events;
mod index_manager;
mod metrics;
mod modules;
mod risk;
mod router;
mod strategies;
pub mod telemetry;

pub use classifier::Classifier;
pub use config::{EngineConfig, IndexLoadConfig, RouterConfig};
pub use engine::{Engine, EngineBuilder, EngineHealth, IndexInfo, ScreeningResult, RESULT_PREFIX};
pub use error::{EngineError, Result};
pub use index_manager::{IndexManager, IndexOrigin, SNAPSHOT_KEY};
pub use metrics::EngineMetrics;
pub use modules::{ClassifierModule, RiskModule, CLASSIFIER_MODULE, RISK_MODULE};
pub use risk::{RiskDetectionService, RiskScan};
pub use router::{ContentRoute, EscalationReason, ModuleSelector, RoutePlan};
pub use strategies::{ContentOutcome, MockReasoner, StaticContentProvider};
