//! Everything a strategy sees when deciding about one listing

use super::StrategyKind;
use crate::events::{EventType, SwarmEvent};
use crate::ids::AgentId;
use crate::marketplace::Listing;
use crate::money::Money;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// Agent configuration relevant to a decision
#[derive(Debug, Clone, PartialEq)]
pub struct AgentProfile {
    pub agent_id: AgentId,
    pub strategy: StrategyKind,
    /// Per-item cap from the swarm budget
    pub max_per_item: Money,
    /// Upper price bound from the target criteria
    pub target_max_price: Option<Money>,
}

/// Decision input for one listing
#[derive(Debug, Clone)]
pub struct BiddingContext {
    pub listing: Listing,
    pub agent: AgentProfile,
    pub remaining_budget: Money,
    /// This agent's bid and offer events, oldest first; shared across the
    /// listings of one cycle
    pub agent_history: Arc<[SwarmEvent]>,
    /// Every bid and offer event of the swarm on this listing, oldest first
    pub listing_history: Vec<SwarmEvent>,
    pub now: DateTime<Utc>,
}

impl BiddingContext {
    /// Most the agent may commit to this listing
    pub fn ceiling(&self) -> Money {
        let cap = self.remaining_budget.min(self.agent.max_per_item);
        match self.agent.target_max_price {
            Some(max) => cap.min(max),
            None => cap,
        }
    }

    pub fn time_remaining(&self) -> Option<Duration> {
        self.listing.time_remaining(self.now)
    }

    /// Another agent of the swarm with an unresolved bid or offer on this listing
    pub fn engaged_teammate(&self) -> Option<AgentId> {
        let mut engaged: HashSet<&AgentId> = HashSet::new();
        for event in &self.listing_history {
            let Some(agent) = event.agent_id.as_ref() else {
                continue;
            };
            if event.event_type.is_engagement() {
                engaged.insert(agent);
            } else if event.event_type.is_disengagement() {
                engaged.remove(agent);
            }
        }
        engaged
            .into_iter()
            .filter(|agent| **agent != self.agent.agent_id)
            .min()
            .cloned()
    }

    /// How many times this agent has lost on this listing
    pub fn losses_on_listing(&self) -> usize {
        self.agent_history
            .iter()
            .filter(|e| {
                e.event_type == EventType::BidLost && e.listing_id.as_ref() == Some(&self.listing.id)
            })
            .count()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::ids::{ListingId, SwarmId};
    use chrono::TimeZone;

    pub fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, 1, 12, 0, 0).unwrap()
    }

    pub fn context(listing: Listing, strategy: StrategyKind, budget: f64) -> BiddingContext {
        BiddingContext {
            listing,
            agent: AgentProfile {
                agent_id: AgentId::new("s-agent-1"),
                strategy,
                max_per_item: Money::from_dollars(1_000.0),
                target_max_price: None,
            },
            remaining_budget: Money::from_dollars(budget),
            agent_history: Arc::from(Vec::new()),
            listing_history: Vec::new(),
            now: now(),
        }
    }

    pub fn listing_event(event_type: EventType, agent: &str, listing: &str) -> SwarmEvent {
        SwarmEvent {
            seq: 0,
            event_type,
            swarm_id: SwarmId::new("s"),
            agent_id: Some(AgentId::new(agent)),
            listing_id: Some(ListingId::new(listing)),
            timestamp: now(),
            payload: serde_json::json!({}),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn test_ceiling_is_tightest_bound() {
        let listing = Listing::new("l-1", "x", Money::from_dollars(10.0));
        let mut ctx = context(listing, StrategyKind::Sniper, 95.0);
        assert_eq!(ctx.ceiling(), Money::from_dollars(95.0));

        ctx.agent.max_per_item = Money::from_dollars(60.0);
        assert_eq!(ctx.ceiling(), Money::from_dollars(60.0));

        ctx.agent.target_max_price = Some(Money::from_dollars(40.0));
        assert_eq!(ctx.ceiling(), Money::from_dollars(40.0));
    }

    #[test]
    fn test_engaged_teammate_tracks_resolution() {
        let listing = Listing::new("l-1", "x", Money::from_dollars(10.0));
        let mut ctx = context(listing, StrategyKind::Sniper, 95.0);

        ctx.listing_history = vec![listing_event(EventType::BidPlaced, "s-agent-2", "l-1")];
        assert_eq!(ctx.engaged_teammate(), Some(AgentId::new("s-agent-2")));

        ctx.listing_history
            .push(listing_event(EventType::BidLost, "s-agent-2", "l-1"));
        assert_eq!(ctx.engaged_teammate(), None);

        // The agent's own engagement does not count
        ctx.listing_history = vec![listing_event(EventType::OfferSubmitted, "s-agent-1", "l-1")];
        assert_eq!(ctx.engaged_teammate(), None);
    }
}
