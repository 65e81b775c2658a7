//! Per-swarm agent tick schedule
//!
//! A min-heap of (fire time, insertion order, agent). Each agent appears at
//! most once; rescheduling replaces the pending entry.

use crate::ids::AgentId;
use chrono::{DateTime, Utc};
use std::cmp::Reverse;
use std::collections::BinaryHeap;

#[derive(Debug, Default)]
pub struct TickScheduler {
    heap: BinaryHeap<Reverse<(DateTime<Utc>, u64, AgentId)>>,
    next_order: u64,
}

impl TickScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `agent_id` to fire at `at`, replacing any pending tick
    pub fn schedule(&mut self, agent_id: AgentId, at: DateTime<Utc>) {
        self.heap.retain(|Reverse((_, _, id))| *id != agent_id);
        self.next_order += 1;
        self.heap.push(Reverse((at, self.next_order, agent_id)));
    }

    /// Remove and return every agent due at or before `now`, earliest first
    pub fn pop_due(&mut self, now: DateTime<Utc>) -> Vec<AgentId> {
        let mut due = Vec::new();
        while let Some(Reverse((at, _, _))) = self.heap.peek() {
            if *at > now {
                break;
            }
            if let Some(Reverse((_, _, agent_id))) = self.heap.pop() {
                due.push(agent_id);
            }
        }
        due
    }

    /// Earliest pending fire time
    pub fn next_fire(&self) -> Option<DateTime<Utc>> {
        self.heap.peek().map(|Reverse((at, _, _))| *at)
    }

    pub fn clear(&mut self) {
        self.heap.clear();
    }
}
