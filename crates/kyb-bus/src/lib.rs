//! KYB Communication Manager
//!
//! Internal event and message buses that let the classifier, the risk service,
//! the cache and any other hosted module run concurrently without direct
//! coupling.
//!
//! # Overview
//!
//! | Bus | Addressing | Queueing | Failure handling |
//! |-----|------------|----------|------------------|
//! | [`EventBus`] | by event type, optional content filter | N bounded lanes, hashed by correlation id | retry with exponential backoff, then dead-letter to an [`EventStore`](kyb_domain::traits::EventStore) |
//! | [`MessageBus`] | one named target | one bounded mailbox per target | TTL checked at send and receive; expired messages counted |
//!
//! Full queues block or fail per [`Backpressure`]. Subscribers only see
//! events published after they subscribed, and see events sharing a
//! correlation id in publish order.
//!
//! [`CommunicationManager`] wraps both buses and hosts
//! [`Module`](kyb_domain::traits::Module)s: each module is subscribed to the
//! event types it declares, and any follow-up event it returns is published
//! with the same correlation and trace ids.
//!
//! Shutdown is cooperative: stop accepting, drain the lanes until the grace
//! deadline, then abort what is left.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod config;
mod error;
mod event_bus;
mod handler;
mod manager;
mod message_bus;
mod stats;

pub use config::{Backpressure, BusConfig};
pub use error::{BusError, HandlerError};
pub use event_bus::EventBus;
pub use handler::{EventFilter, EventHandler, FnHandler, SubscriptionId};
pub use manager::CommunicationManager;
pub use message_bus::{Mailbox, MessageBus, SendOutcome};
pub use stats::BusStats;
