//! Lifecycle notifications
//!
//! The controller publishes swarm and agent state changes on a broadcast
//! channel. The store subscriber persists them; anything else (a CLI progress
//! printer, a test) can subscribe too.

use super::agent::AgentStatusReport;
use super::types::Swarm;
use crate::events::SwarmEvent;
use crate::storage::SharedStore;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Default broadcast channel capacity
pub const DEFAULT_LIFECYCLE_CAPACITY: usize = 1000;

/// Swarm and agent state changes
#[derive(Debug, Clone)]
pub enum LifecycleEvent {
    SwarmCreated(Swarm),
    SwarmUpdated(Swarm),
    AgentSpawned(AgentStatusReport),
    AgentUpdated(AgentStatusReport),
    /// A bid or offer was placed, countered, won or lost
    Trade(SwarmEvent),
    ControllerStopped,
}

impl LifecycleEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::SwarmCreated(_) => "swarm_created",
            Self::SwarmUpdated(_) => "swarm_updated",
            Self::AgentSpawned(_) => "agent_spawned",
            Self::AgentUpdated(_) => "agent_updated",
            Self::Trade(_) => "trade",
            Self::ControllerStopped => "controller_stopped",
        }
    }
}

/// Broadcast sender wrapper
#[derive(Debug, Clone)]
pub struct LifecycleBus {
    tx: broadcast::Sender<LifecycleEvent>,
    capacity: usize,
}

impl LifecycleBus {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.tx.subscribe()
    }

    /// Publish an event, logging if the channel is close to full
    pub fn publish(&self, event: LifecycleEvent) {
        let name = event.name();
        match self.tx.send(event) {
            Ok(_) => {
                let len = self.tx.len();
                if len > self.capacity * 80 / 100 {
                    tracing::warn!(
                        current = len,
                        capacity = self.capacity,
                        threshold_pct = 80,
                        "Lifecycle channel nearing capacity"
                    );
                }
            }
            Err(_) => {
                tracing::debug!(event = name, "Lifecycle event sent but no receivers subscribed");
            }
        }
    }
}

impl Default for LifecycleBus {
    fn default() -> Self {
        Self::new(DEFAULT_LIFECYCLE_CAPACITY)
    }
}

/// Persist lifecycle events until the controller stops or the bus closes
pub fn spawn_store_subscriber(
    mut rx: broadcast::Receiver<LifecycleEvent>,
    store: SharedStore,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let event = match rx.recv().await {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Store subscriber lagged, lifecycle updates dropped");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };

            let result = match &event {
                LifecycleEvent::SwarmCreated(swarm) => store.create_swarm(swarm),
                LifecycleEvent::SwarmUpdated(swarm) => store.update_swarm_state(swarm),
                LifecycleEvent::AgentSpawned(agent) | LifecycleEvent::AgentUpdated(agent) => {
                    store.create_agent(agent)
                }
                // Already persisted by the event log
                LifecycleEvent::Trade(_) => Ok(()),
                LifecycleEvent::ControllerStopped => break,
            };
            if let Err(e) = result {
                tracing::warn!(error = %e, event = event.name(), "Failed to persist lifecycle event");
            }
        }
        tracing::debug!("Store subscriber stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::SwarmId;
    use crate::storage::{test_support, MemoryStore, SwarmStore};
    use crate::swarm::SwarmStatus;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_store_subscriber_persists_until_stopped() {
        let bus = LifecycleBus::new(16);
        let store = Arc::new(MemoryStore::new());
        let handle = spawn_store_subscriber(bus.subscribe(), store.clone());

        let mut swarm = test_support::swarm("s-1");
        bus.publish(LifecycleEvent::SwarmCreated(swarm.clone()));
        swarm.status = SwarmStatus::Running;
        bus.publish(LifecycleEvent::SwarmUpdated(swarm));
        bus.publish(LifecycleEvent::ControllerStopped);
        handle.await.unwrap();

        let stored = store.load_swarm(&SwarmId::new("s-1")).unwrap().unwrap();
        assert_eq!(stored.status, SwarmStatus::Running);
    }

    #[test]
    fn test_publish_without_subscribers_is_harmless() {
        let bus = LifecycleBus::default();
        bus.publish(LifecycleEvent::ControllerStopped);
    }
}
