//! Append-only event and observation log
//!
//! Appends land in memory synchronously and are handed to a background
//! writer thread that persists them through a [`SwarmStore`]. Callers never
//! wait on the store; persistence failures are logged and dropped.

use super::types::{
    EventFilter, EventType, Observation, ObservationFilter, SwarmEvent,
};
use crate::clock::SharedClock;
use crate::ids::{AgentId, ListingId, SwarmId};
use crate::storage::{keep_latest, sort_events, SharedStore};
use crate::Result;
use parking_lot::RwLock;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{mpsc, oneshot};

enum WriteOp {
    Event(SwarmEvent),
    Observation(Observation),
    Flush(oneshot::Sender<()>),
}

/// Events in append order, plus positions per listing
#[derive(Default)]
struct EventIndex {
    all: Vec<SwarmEvent>,
    by_listing: HashMap<ListingId, Vec<usize>>,
}

impl EventIndex {
    fn push(&mut self, event: SwarmEvent) {
        if let Some(listing_id) = &event.listing_id {
            self.by_listing
                .entry(listing_id.clone())
                .or_default()
                .push(self.all.len());
        }
        self.all.push(event);
    }

    /// Candidates for `filter`; a listing filter only visits that listing's events
    fn candidates<'a>(&'a self, filter: &EventFilter) -> Box<dyn Iterator<Item = &'a SwarmEvent> + 'a> {
        match &filter.listing_id {
            Some(listing_id) => {
                let positions = self.by_listing.get(listing_id).map(Vec::as_slice).unwrap_or(&[]);
                Box::new(positions.iter().map(move |&i| &self.all[i]))
            }
            None => Box::new(self.all.iter()),
        }
    }
}

/// Shared event log
pub struct EventLog {
    clock: SharedClock,
    events: RwLock<EventIndex>,
    observations: RwLock<Vec<Observation>>,
    next_seq: AtomicU64,
    writer: Option<mpsc::UnboundedSender<WriteOp>>,
}

impl EventLog {
    /// In-memory log with no persistence
    pub fn new(clock: SharedClock) -> Self {
        Self {
            clock,
            events: RwLock::new(EventIndex::default()),
            observations: RwLock::new(Vec::new()),
            next_seq: AtomicU64::new(1),
            writer: None,
        }
    }

    /// Log that also persists every append through `store`
    ///
    /// Spawns the writer thread; it exits once the log is dropped.
    pub fn with_store(clock: SharedClock, store: SharedStore) -> Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        std::thread::Builder::new()
            .name("bidswarm-event-writer".to_string())
            .spawn(move || run_writer(rx, store))?;

        Ok(Self {
            writer: Some(tx),
            ..Self::new(clock)
        })
    }

    /// Append an event and return it with its sequence number and timestamp
    pub fn record_event(
        &self,
        event_type: EventType,
        swarm_id: &SwarmId,
        agent_id: Option<&AgentId>,
        listing_id: Option<&ListingId>,
        payload: Value,
    ) -> SwarmEvent {
        let event = SwarmEvent {
            seq: self.next_seq.fetch_add(1, Ordering::SeqCst),
            event_type,
            swarm_id: swarm_id.clone(),
            agent_id: agent_id.cloned(),
            listing_id: listing_id.cloned(),
            timestamp: self.clock.now(),
            payload,
        };

        tracing::trace!(
            seq = event.seq,
            event_type = %event.event_type,
            swarm_id = %event.swarm_id,
            "Event recorded"
        );

        self.events.write().push(event.clone());
        self.send(WriteOp::Event(event.clone()));
        event
    }

    /// Matching events ordered by (timestamp, seq); `limit` keeps the most recent
    pub fn query_events(&self, filter: &EventFilter) -> Vec<SwarmEvent> {
        let mut matching: Vec<SwarmEvent> = self
            .events
            .read()
            .candidates(filter)
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();
        sort_events(&mut matching);
        keep_latest(matching, filter.limit)
    }

    /// Append an observation and its `OBSERVATION_RECORDED` event
    pub fn record_observation(&self, observation: Observation) -> SwarmEvent {
        self.observations.write().push(observation.clone());
        self.send(WriteOp::Observation(observation.clone()));

        let mut payload = json!({
            "observation_id": observation.id,
            "kind": observation.kind,
            "action": observation.action,
            "strategy": observation.strategy,
            "confidence": observation.confidence,
        });
        if let Some(amount) = observation.amount {
            payload["amount"] = json!(amount.cents());
        }

        self.record_event(
            EventType::ObservationRecorded,
            &observation.swarm_id,
            Some(&observation.agent_id),
            Some(&observation.listing.id),
            payload,
        )
    }

    /// Matching observations oldest first; `limit` keeps the most recent
    pub fn query_observations(&self, filter: &ObservationFilter) -> Vec<Observation> {
        let mut matching: Vec<Observation> = self
            .observations
            .read()
            .iter()
            .filter(|o| filter.matches(o))
            .cloned()
            .collect();
        matching.sort_by_key(|o| o.timestamp);
        keep_latest(matching, filter.limit)
    }

    /// Number of events appended so far
    pub fn len(&self) -> usize {
        self.events.read().all.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wait until everything appended so far has reached the store
    pub async fn flush(&self) {
        let Some(writer) = &self.writer else {
            return;
        };
        let (tx, rx) = oneshot::channel();
        if writer.send(WriteOp::Flush(tx)).is_err() {
            tracing::warn!("Event writer is gone, nothing to flush");
            return;
        }
        let _ = rx.await;
    }

    fn send(&self, op: WriteOp) {
        if let Some(writer) = &self.writer {
            if writer.send(op).is_err() {
                tracing::warn!("Event writer is gone, append kept in memory only");
            }
        }
    }
}

impl std::fmt::Debug for EventLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLog")
            .field("events", &self.len())
            .field("persistent", &self.writer.is_some())
            .finish()
    }
}

fn run_writer(mut rx: mpsc::UnboundedReceiver<WriteOp>, store: SharedStore) {
    tracing::debug!("Event writer started");
    while let Some(op) = rx.blocking_recv() {
        match op {
            WriteOp::Event(event) => {
                if let Err(e) = store.record_event(&event) {
                    tracing::warn!(
                        error = %e,
                        seq = event.seq,
                        event_type = %event.event_type,
                        "Failed to persist event"
                    );
                }
            }
            WriteOp::Observation(observation) => {
                if let Err(e) = store.record_observation(&observation) {
                    tracing::warn!(
                        error = %e,
                        observation_id = %observation.id,
                        "Failed to persist observation"
                    );
                }
            }
            WriteOp::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    tracing::debug!("Event writer stopped");
}
