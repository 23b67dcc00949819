//! Point-to-point message bus
//!
//! Each target owns one bounded mailbox. TTLs are checked when a message is
//! sent and again when it is received; expired messages are counted and never
//! handed to a receiver.

use crate::config::{Backpressure, BusConfig};
use crate::error::BusError;
use crate::stats::{BusStats, StatsCounters};
use kyb_domain::Message;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::debug;

/// What happened to a sent message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Queued in the target's mailbox
    Queued,
    /// TTL had already elapsed; discarded
    Expired,
}

/// Receiving end of one target's mailbox
#[derive(Debug)]
pub struct Mailbox {
    target: String,
    rx: mpsc::Receiver<Message>,
    stats: Arc<StatsCounters>,
}

impl Mailbox {
    /// Target name this mailbox receives for
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Wait for the next live message; `None` once the bus has closed
    pub async fn recv(&mut self) -> Option<Message> {
        loop {
            let message = self.rx.recv().await?;
            if let Some(message) = self.accept(message) {
                return Some(message);
            }
        }
    }

    /// Next live message if one is already queued
    pub fn try_recv(&mut self) -> Option<Message> {
        while let Ok(message) = self.rx.try_recv() {
            if let Some(message) = self.accept(message) {
                return Some(message);
            }
        }
        None
    }

    fn accept(&self, message: Message) -> Option<Message> {
        if message.is_expired() {
            StatsCounters::incr(&self.stats.messages_expired);
            debug!(mailbox = %self.target, message_id = %message.id, "Discarded expired message");
            None
        } else {
            StatsCounters::incr(&self.stats.messages_delivered);
            Some(message)
        }
    }
}

/// Point-to-point message bus
pub struct MessageBus {
    config: BusConfig,
    mailboxes: RwLock<HashMap<String, mpsc::Sender<Message>>>,
    accepting: AtomicBool,
    stats: Arc<StatsCounters>,
}

impl MessageBus {
    /// Create an empty message bus
    pub fn new(config: BusConfig) -> Result<Self, BusError> {
        Self::with_stats(config, Arc::new(StatsCounters::default()))
    }

    pub(crate) fn with_stats(config: BusConfig, stats: Arc<StatsCounters>) -> Result<Self, BusError> {
        config.validate()?;
        Ok(Self {
            config,
            mailboxes: RwLock::new(HashMap::new()),
            accepting: AtomicBool::new(true),
            stats,
        })
    }

    /// Open a mailbox for `target`
    ///
    /// A target whose previous mailbox was dropped may register again.
    pub fn register(&self, target: impl Into<String>) -> Result<Mailbox, BusError> {
        let target = target.into();
        let mut mailboxes = self.mailboxes.write().unwrap_or_else(PoisonError::into_inner);
        if mailboxes.get(&target).is_some_and(|tx| !tx.is_closed()) {
            return Err(BusError::Duplicate(target));
        }
        let (tx, rx) = mpsc::channel(self.config.mailbox_capacity);
        mailboxes.insert(target.clone(), tx);
        debug!(mailbox = %target, "Mailbox registered");
        Ok(Mailbox {
            target,
            rx,
            stats: Arc::clone(&self.stats),
        })
    }

    /// Close a target's mailbox; queued messages can still be received
    pub fn unregister(&self, target: &str) -> bool {
        self.mailboxes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(target)
            .is_some()
    }

    /// Registered targets, sorted
    pub fn targets(&self) -> Vec<String> {
        let mut targets: Vec<String> = self
            .mailboxes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        targets.sort();
        targets
    }

    /// Send a message to its target
    pub async fn send(&self, message: Message) -> Result<SendOutcome, BusError> {
        if !self.accepting.load(Ordering::SeqCst) {
            return Err(BusError::ShuttingDown);
        }
        if message.is_expired() {
            StatsCounters::incr(&self.stats.messages_expired);
            debug!(mailbox = %message.target, message_id = %message.id, "Message expired before send");
            return Ok(SendOutcome::Expired);
        }

        let target = message.target.clone();
        let sender = self
            .mailboxes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&target)
            .cloned();
        let Some(sender) = sender else {
            return Err(BusError::UnknownTarget(target));
        };

        let sent = match self.config.message_backpressure {
            Backpressure::Block => sender
                .send(message)
                .await
                .map_err(|_| BusError::UnknownTarget(target.clone())),
            Backpressure::Drop => sender.try_send(message).map_err(|e| match e {
                TrySendError::Full(_) => {
                    StatsCounters::incr(&self.stats.messages_dropped);
                    BusError::QueueFull(target.clone())
                }
                TrySendError::Closed(_) => BusError::UnknownTarget(target.clone()),
            }),
        };

        if let Err(BusError::UnknownTarget(_)) = &sent {
            // receiver dropped
            self.unregister(&target);
        }
        sent?;
        StatsCounters::incr(&self.stats.messages_sent);
        Ok(SendOutcome::Queued)
    }

    /// Stop accepting messages and close every mailbox
    pub fn close(&self) {
        self.accepting.store(false, Ordering::SeqCst);
        self.mailboxes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Counter snapshot
    pub fn stats(&self) -> BusStats {
        self.stats.snapshot()
    }
}
