//! KYB Storage Layer
//!
//! SQLite implementation of the reference-data contract the classification
//! core reads from, plus a table for events the bus could not deliver.
//!
//! # Architecture
//!
//! - `industries`, `keywords`, `risk_keywords`, `classification_codes`: the
//!   administrative tables, read through [`KeywordSource`](kyb_domain::traits::KeywordSource).
//!   The core never writes back; the `upsert_*` and `seed*` methods exist for
//!   the admin pipeline and for tests.
//! - `failed_events`: dead letters, written through
//!   [`EventStore`](kyb_domain::traits::EventStore).
//!
//! # Examples
//!
//! ```no_run
//! use kyb_index::IndexSnapshot;
//! use kyb_store::SqliteStore;
//!
//! let store = SqliteStore::new(":memory:").unwrap();
//! store.seed_reference().unwrap();
//! let snapshot = IndexSnapshot::load(&store).unwrap();
//! assert!(!snapshot.industries.is_empty());
//! ```

#![warn(missing_docs)]

mod error;
mod store;

pub use error::StoreError;
pub use store::{FailedEvent, SeedSummary, SqliteStore};
