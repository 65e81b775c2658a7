//! In-process store

use super::{keep_latest, sort_events, SwarmStore};
use crate::events::{EventFilter, Observation, ObservationFilter, SwarmEvent};
use crate::ids::{AgentId, SwarmId};
use crate::swarm::{AgentStatusReport, Swarm};
use crate::{BidSwarmError, Result};
use parking_lot::Mutex;
use std::collections::BTreeMap;

#[derive(Default)]
struct MemoryState {
    swarms: BTreeMap<SwarmId, Swarm>,
    agents: BTreeMap<AgentId, AgentStatusReport>,
    events: Vec<SwarmEvent>,
    observations: Vec<Observation>,
}

/// Store that keeps everything in memory
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored events
    pub fn event_count(&self) -> usize {
        self.state.lock().events.len()
    }
}

impl SwarmStore for MemoryStore {
    fn create_swarm(&self, swarm: &Swarm) -> Result<()> {
        let mut state = self.state.lock();
        if state.swarms.contains_key(&swarm.id) {
            return Err(BidSwarmError::Persistence(format!(
                "swarm {} already exists",
                swarm.id
            )));
        }
        state.swarms.insert(swarm.id.clone(), swarm.clone());
        Ok(())
    }

    fn update_swarm_state(&self, swarm: &Swarm) -> Result<()> {
        self.state
            .lock()
            .swarms
            .insert(swarm.id.clone(), swarm.clone());
        Ok(())
    }

    fn create_agent(&self, agent: &AgentStatusReport) -> Result<()> {
        self.state
            .lock()
            .agents
            .insert(agent.id.clone(), agent.clone());
        Ok(())
    }

    fn record_event(&self, event: &SwarmEvent) -> Result<()> {
        self.state.lock().events.push(event.clone());
        Ok(())
    }

    fn query_events(&self, filter: &EventFilter) -> Result<Vec<SwarmEvent>> {
        let mut events: Vec<SwarmEvent> = self
            .state
            .lock()
            .events
            .iter()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();
        sort_events(&mut events);
        Ok(keep_latest(events, filter.limit))
    }

    fn record_observation(&self, observation: &Observation) -> Result<()> {
        self.state.lock().observations.push(observation.clone());
        Ok(())
    }

    fn query_observations(&self, filter: &ObservationFilter) -> Result<Vec<Observation>> {
        let mut observations: Vec<Observation> = self
            .state
            .lock()
            .observations
            .iter()
            .filter(|o| filter.matches(o))
            .cloned()
            .collect();
        observations.sort_by_key(|o| o.timestamp);
        Ok(keep_latest(observations, filter.limit))
    }

    fn load_swarm(&self, id: &SwarmId) -> Result<Option<Swarm>> {
        Ok(self.state.lock().swarms.get(id).cloned())
    }

    fn list_swarms(&self) -> Result<Vec<Swarm>> {
        let mut swarms: Vec<Swarm> = self.state.lock().swarms.values().cloned().collect();
        swarms.sort_by_key(|s| s.created_at);
        Ok(swarms)
    }

    fn list_agents(&self, swarm_id: &SwarmId) -> Result<Vec<AgentStatusReport>> {
        Ok(self
            .state
            .lock()
            .agents
            .values()
            .filter(|a| &a.swarm_id == swarm_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::events::{EventType, ObservationKind};
    use crate::swarm::SwarmStatus;

    #[test]
    fn test_swarm_rows() {
        let store = MemoryStore::new();
        let mut s = swarm("s-1");
        store.create_swarm(&s).unwrap();
        assert!(store.create_swarm(&s).is_err());

        s.status = SwarmStatus::Running;
        store.update_swarm_state(&s).unwrap();
        assert_eq!(
            store.load_swarm(&s.id).unwrap().unwrap().status,
            SwarmStatus::Running
        );
        assert_eq!(store.list_swarms().unwrap().len(), 1);
    }

    #[test]
    fn test_events_sorted_and_limited() {
        let store = MemoryStore::new();
        store.record_event(&event(3, EventType::BidLost, "a", 5)).unwrap();
        store.record_event(&event(1, EventType::BidPlaced, "a", 1)).unwrap();
        store.record_event(&event(2, EventType::BidPlaced, "b", 1)).unwrap();

        let all = store.query_events(&EventFilter::default()).unwrap();
        assert_eq!(all.iter().map(|e| e.seq).collect::<Vec<_>>(), vec![1, 2, 3]);

        let latest = store
            .query_events(&EventFilter::default().with_limit(1))
            .unwrap();
        assert_eq!(latest[0].seq, 3);
        assert_eq!(store.event_count(), 3);
    }

    #[test]
    fn test_observation_filter() {
        let store = MemoryStore::new();
        store
            .record_observation(&observation("o-1", ObservationKind::Passed, 1))
            .unwrap();
        store
            .record_observation(&observation("o-2", ObservationKind::OpportunityIdentified, 2))
            .unwrap();

        let found = store
            .query_observations(
                &ObservationFilter::default().with_kind(ObservationKind::OpportunityIdentified),
            )
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "o-2");
    }
}
