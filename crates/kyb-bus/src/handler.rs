//! Event handler capability and subscriptions

use crate::error::HandlerError;
use kyb_domain::traits::Module;
use kyb_domain::{Event, EventType};
use std::fmt;
use std::sync::Arc;

/// Receives events from the bus
///
/// Handlers run on a dispatch lane; a slow handler delays later events that
/// share its lane, so long work should be handed off.
pub trait EventHandler: Send + Sync {
    /// Handle one event, optionally producing a follow-up event
    fn handle(&self, event: &Event) -> Result<Option<Event>, HandlerError>;
}

/// Adapts a closure into an [`EventHandler`]
pub struct FnHandler<F>(F);

impl<F> FnHandler<F>
where
    F: Fn(&Event) -> Result<Option<Event>, HandlerError> + Send + Sync,
{
    /// Wrap a closure
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> EventHandler for FnHandler<F>
where
    F: Fn(&Event) -> Result<Option<Event>, HandlerError> + Send + Sync,
{
    fn handle(&self, event: &Event) -> Result<Option<Event>, HandlerError> {
        (self.0)(event)
    }
}

/// Adapts a hosted [`Module`] into an [`EventHandler`]
pub(crate) struct ModuleHandler {
    pub(crate) module: Arc<dyn Module>,
}

impl EventHandler for ModuleHandler {
    fn handle(&self, event: &Event) -> Result<Option<Event>, HandlerError> {
        self.module.process(event).map_err(HandlerError::from)
    }
}

/// Content predicate evaluated at publish time
pub type EventFilter = Arc<dyn Fn(&Event) -> bool + Send + Sync>;

/// Handle returned by `subscribe`, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

/// One registered subscriber
pub(crate) struct Subscription {
    pub(crate) id: SubscriptionId,
    pub(crate) subscriber: String,
    pub(crate) event_type: EventType,
    pub(crate) filter: Option<EventFilter>,
    pub(crate) handler: Arc<dyn EventHandler>,
}

impl Subscription {
    /// Whether this subscriber should see `event`
    ///
    /// Targeted events only reach the subscriber they name.
    pub(crate) fn wants(&self, event: &Event) -> bool {
        if let Some(target) = &event.target {
            if target != &self.subscriber {
                return false;
            }
        }
        self.filter.as_ref().is_none_or(|filter| filter(event))
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("subscriber", &self.subscriber)
            .field("event_type", &self.event_type)
            .field("filtered", &self.filter.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subscription(subscriber: &str, filter: Option<EventFilter>) -> Subscription {
        Subscription {
            id: SubscriptionId(1),
            subscriber: subscriber.to_string(),
            event_type: EventType::ClassificationCompleted,
            filter,
            handler: Arc::new(FnHandler::new(|_: &Event| Ok(None))),
        }
    }

    #[test]
    fn test_targeted_events_reach_only_their_target() {
        let event = Event::new(EventType::ClassificationCompleted, "classifier").with_target("alerts");
        assert!(subscription("alerts", None).wants(&event));
        assert!(!subscription("audit", None).wants(&event));
    }

    #[test]
    fn test_filter_applies() {
        let only_high: EventFilter = Arc::new(|e: &Event| e.data_str("level") == Some("high"));
        let sub = subscription("alerts", Some(only_high));

        let high = Event::new(EventType::ClassificationCompleted, "risk").with_data("level", "high");
        let low = Event::new(EventType::ClassificationCompleted, "risk").with_data("level", "low");
        assert!(sub.wants(&high));
        assert!(!sub.wants(&low));
    }
}
