//! Storage layer
//!
//! Everything durable goes through the [`SwarmStore`] trait: swarm rows,
//! agent rows, the event log and reconnaissance observations. Two adapters
//! ship with the crate:
//!
//! - [`SqliteStore`]: rusqlite with WAL, the default for the CLI
//! - [`MemoryStore`]: in-process, for tests and throwaway runs
//!
//! Events and observations can also be exported to JSON Lines for offline
//! analysis.
//!
//! Stores are synchronous. The event log calls them from its own writer
//! thread and the lifecycle subscriber calls them from a tokio task, so a slow
//! disk never stalls a bidding cycle.

mod jsonl;
mod memory;
mod sqlite;

pub use jsonl::{
    export_events, export_trail, parse_trail, read_events, read_trail, Trail, TrailRecord,
    TrailWriter,
};
pub use memory::MemoryStore;
pub use sqlite::{SqliteStore, StoreConfig};

use crate::events::{EventFilter, Observation, ObservationFilter, SwarmEvent};
use crate::ids::SwarmId;
use crate::swarm::{AgentStatusReport, Swarm};
use crate::Result;
use std::sync::Arc;

/// Persistence collaborator for swarms, agents, events and observations
pub trait SwarmStore: Send + Sync {
    /// Insert a new swarm row
    fn create_swarm(&self, swarm: &Swarm) -> Result<()>;

    /// Overwrite status, counters and timestamps of a swarm (inserting it if missing)
    fn update_swarm_state(&self, swarm: &Swarm) -> Result<()>;

    /// Insert or refresh an agent row
    fn create_agent(&self, agent: &AgentStatusReport) -> Result<()>;

    fn record_event(&self, event: &SwarmEvent) -> Result<()>;

    /// Matching events ordered by (timestamp, seq); `limit` keeps the most recent
    fn query_events(&self, filter: &EventFilter) -> Result<Vec<SwarmEvent>>;

    fn record_observation(&self, observation: &Observation) -> Result<()>;

    /// Matching observations oldest first; `limit` keeps the most recent
    fn query_observations(&self, filter: &ObservationFilter) -> Result<Vec<Observation>>;

    fn load_swarm(&self, id: &SwarmId) -> Result<Option<Swarm>>;

    /// Every stored swarm, oldest first
    fn list_swarms(&self) -> Result<Vec<Swarm>>;

    fn list_agents(&self, swarm_id: &SwarmId) -> Result<Vec<AgentStatusReport>>;
}

/// Shared store handle
pub type SharedStore = Arc<dyn SwarmStore>;

/// Sort events into log order
pub(crate) fn sort_events(events: &mut [SwarmEvent]) {
    events.sort_by(|a, b| (a.timestamp, a.seq).cmp(&(b.timestamp, b.seq)));
}

/// Drop all but the last `limit` items
pub(crate) fn keep_latest<T>(mut items: Vec<T>, limit: Option<usize>) -> Vec<T> {
    if let Some(limit) = limit {
        if items.len() > limit {
            items.drain(..items.len() - limit);
        }
    }
    items
}
