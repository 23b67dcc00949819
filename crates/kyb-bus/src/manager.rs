//! Communication manager: both buses plus the module registry

use crate::config::BusConfig;
use crate::error::BusError;
use crate::event_bus::EventBus;
use crate::handler::{EventHandler, ModuleHandler, SubscriptionId};
use crate::message_bus::{Mailbox, MessageBus, SendOutcome};
use crate::stats::{BusStats, StatsCounters};
use kyb_domain::traits::{EventStore, HealthStatus, Module};
use kyb_domain::{Event, Message};
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};
use tracing::{info, warn};

struct RegisteredModule {
    module: Arc<dyn Module>,
    subscriptions: Vec<SubscriptionId>,
}

/// Hosts modules and routes events and messages between them
///
/// # Examples
///
/// ```no_run
/// use kyb_bus::{BusConfig, CommunicationManager, FnHandler};
/// use kyb_domain::{Event, EventType};
/// use std::sync::Arc;
///
/// # async fn run() -> Result<(), kyb_bus::BusError> {
/// let manager = CommunicationManager::new(BusConfig::default(), None)?;
/// manager.events().subscribe(
///     "audit",
///     EventType::HighRiskDetected,
///     Arc::new(FnHandler::new(|event: &Event| {
///         println!("high risk: {:?}", event.data);
///         Ok(None)
///     })),
/// );
/// manager.publish(Event::new(EventType::HighRiskDetected, "risk")).await?;
/// manager.shutdown().await;
/// # Ok(())
/// # }
/// ```
pub struct CommunicationManager {
    events: EventBus,
    messages: MessageBus,
    modules: RwLock<BTreeMap<String, RegisteredModule>>,
    stats: Arc<StatsCounters>,
}

impl CommunicationManager {
    /// Start both buses on the current runtime
    pub fn new(config: BusConfig, event_store: Option<Arc<dyn EventStore>>) -> Result<Self, BusError> {
        let stats = Arc::new(StatsCounters::default());
        let events = EventBus::with_stats(config.clone(), event_store, Arc::clone(&stats))?;
        let messages = MessageBus::with_stats(config, Arc::clone(&stats))?;
        Ok(Self {
            events,
            messages,
            modules: RwLock::new(BTreeMap::new()),
            stats,
        })
    }

    /// The event bus
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// The message bus
    pub fn messages(&self) -> &MessageBus {
        &self.messages
    }

    /// Publish an event
    pub async fn publish(&self, event: Event) -> Result<usize, BusError> {
        self.events.publish(event).await
    }

    /// Send a message
    pub async fn send(&self, message: Message) -> Result<SendOutcome, BusError> {
        self.messages.send(message).await
    }

    /// Open a mailbox
    pub fn mailbox(&self, target: impl Into<String>) -> Result<Mailbox, BusError> {
        self.messages.register(target)
    }

    /// Start a module and subscribe it to the event types it declares
    ///
    /// The module is started before the registry lock is taken, so `start`
    /// may call back into the manager.
    pub fn register_module(&self, module: Arc<dyn Module>) -> Result<(), BusError> {
        let name = module.name().to_string();
        if self.read_modules().contains_key(&name) {
            return Err(BusError::Duplicate(name));
        }

        module.start()?;

        let mut modules = self.modules.write().unwrap_or_else(PoisonError::into_inner);
        if modules.contains_key(&name) {
            drop(modules);
            // lost a race with a concurrent registration of the same name
            if let Err(e) = module.stop() {
                warn!(module = %name, error = %e, "Module failed to stop");
            }
            return Err(BusError::Duplicate(name));
        }

        let handler: Arc<dyn EventHandler> = Arc::new(ModuleHandler {
            module: Arc::clone(&module),
        });
        let subscriptions: Vec<SubscriptionId> = module
            .subscriptions()
            .into_iter()
            .map(|event_type| self.events.subscribe(name.clone(), event_type, Arc::clone(&handler)))
            .collect();

        info!(module = %name, subscriptions = subscriptions.len(), "Module registered");
        modules.insert(
            name,
            RegisteredModule {
                module,
                subscriptions,
            },
        );
        Ok(())
    }

    /// Unsubscribe and stop a module
    pub fn unregister_module(&self, name: &str) -> bool {
        let removed = self
            .modules
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name);
        let Some(registered) = removed else {
            return false;
        };
        for id in registered.subscriptions {
            self.events.unsubscribe(id);
        }
        if let Err(e) = registered.module.stop() {
            warn!(module = %name, error = %e, "Module failed to stop");
        }
        true
    }

    /// Registered module names, sorted
    pub fn module_names(&self) -> Vec<String> {
        self.read_modules().keys().cloned().collect()
    }

    /// Health of every registered module
    ///
    /// Probes run on a snapshot of the registry, outside its lock.
    pub fn health(&self) -> BTreeMap<String, HealthStatus> {
        self.registered()
            .into_iter()
            .map(|(name, module)| {
                let status = module.health_check();
                (name, status)
            })
            .collect()
    }

    /// Worst status across modules, or unhealthy once the bus stopped
    pub fn overall_health(&self) -> HealthStatus {
        if !self.events.is_accepting() {
            return HealthStatus::Unhealthy;
        }
        self.health()
            .values()
            .fold(HealthStatus::Healthy, |worst, status| match (worst, *status) {
                (HealthStatus::Unhealthy, _) | (_, HealthStatus::Unhealthy) => HealthStatus::Unhealthy,
                (HealthStatus::Degraded, _) | (_, HealthStatus::Degraded) => HealthStatus::Degraded,
                _ => HealthStatus::Healthy,
            })
    }

    /// Counters from both buses
    pub fn stats(&self) -> BusStats {
        self.stats.snapshot()
    }

    /// Stop accepting work, drain in-flight dispatches, stop every module
    ///
    /// Returns `true` when the event lanes drained within the grace period.
    pub async fn shutdown(&self) -> bool {
        self.messages.close();
        let drained = self.events.shutdown().await;

        for (name, module) in self.registered() {
            if let Err(e) = module.stop() {
                warn!(module = %name, error = %e, "Module failed to stop");
            }
        }
        info!(drained, "Communication manager stopped");
        drained
    }

    fn read_modules(&self) -> RwLockReadGuard<'_, BTreeMap<String, RegisteredModule>> {
        self.modules.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of the registered modules
    fn registered(&self) -> Vec<(String, Arc<dyn Module>)> {
        self.read_modules()
            .iter()
            .map(|(name, registered)| (name.clone(), Arc::clone(&registered.module)))
            .collect()
    }
}
