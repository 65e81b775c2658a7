//! Agent representation and lifecycle states
//!
//! An agent is one strategy-bound bidder inside a swarm. It lives only as
//! long as its swarm runs; its history survives in the event log.

use super::types::{TargetCriteria, TimeWindow};
use crate::budget::BudgetAllocation;
use crate::ids::{AgentId, ListingId, SwarmId};
use crate::money::Money;
use crate::strategy::{Strategy, StrategyKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Agent status indicator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    /// Cycling normally
    Active,

    /// Out of available budget, waiting for reservations to settle
    Idle,

    /// Swarm is paused
    Paused,

    /// Swarm was terminated
    Terminated,
}

impl AgentStatus {
    /// Check if the agent still takes part in cycles
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Active | Self::Idle)
    }
}

/// Whether funds are held by a bid or an offer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngagementKind {
    Bid,
    Offer,
}

/// An accepted bid or pending offer holding a reservation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveBid {
    pub kind: EngagementKind,
    pub listing_id: ListingId,
    /// Marketplace bid id or offer id
    pub reference: String,
    /// Amount reserved in the ledger for this engagement
    pub amount: Money,
    pub placed_at: DateTime<Utc>,
}

/// One bidder in a swarm
#[derive(Debug, Clone)]
pub struct Agent {
    pub id: AgentId,
    pub swarm_id: SwarmId,
    pub strategy: Strategy,
    pub allocated: Money,
    pub criteria: TargetCriteria,
    pub window: TimeWindow,
    pub status: AgentStatus,
    pub active_bids: Vec<ActiveBid>,
    pub active_offers: Vec<ActiveBid>,
    pub wins: u32,
    pub losses: u32,
    pub total_spent: Money,
    pub cycles_run: u64,
    pub last_cycle_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Agent {
    pub fn new(
        id: AgentId,
        swarm_id: SwarmId,
        strategy: Strategy,
        allocated: Money,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            swarm_id,
            strategy,
            allocated,
            criteria: TargetCriteria::default(),
            window: TimeWindow::new(created_at, created_at),
            status: AgentStatus::Active,
            active_bids: Vec::new(),
            active_offers: Vec::new(),
            wins: 0,
            losses: 0,
            total_spent: Money::ZERO,
            cycles_run: 0,
            last_cycle_at: None,
            created_at,
        }
    }

    pub fn with_criteria(mut self, criteria: TargetCriteria) -> Self {
        self.criteria = criteria;
        self
    }

    pub fn with_window(mut self, window: TimeWindow) -> Self {
        self.window = window;
        self
    }

    pub fn strategy_kind(&self) -> StrategyKind {
        self.strategy.kind()
    }

    /// Whether the agent already holds a bid or offer on `listing_id`
    pub fn is_engaged_on(&self, listing_id: &ListingId) -> bool {
        self.active_bids
            .iter()
            .chain(self.active_offers.iter())
            .any(|b| &b.listing_id == listing_id)
    }

    pub fn track(&mut self, engagement: ActiveBid) {
        match engagement.kind {
            EngagementKind::Bid => self.active_bids.push(engagement),
            EngagementKind::Offer => self.active_offers.push(engagement),
        }
    }

    /// Stop tracking an engagement by its marketplace reference
    pub fn untrack(&mut self, reference: &str) -> Option<ActiveBid> {
        for list in [&mut self.active_bids, &mut self.active_offers] {
            if let Some(index) = list.iter().position(|b| b.reference == reference) {
                return Some(list.remove(index));
            }
        }
        None
    }

    /// Every outstanding engagement, bids first
    pub fn engagements(&self) -> Vec<ActiveBid> {
        self.active_bids
            .iter()
            .chain(self.active_offers.iter())
            .cloned()
            .collect()
    }

    pub fn record_win(&mut self, paid: Money) {
        self.wins += 1;
        self.total_spent += paid;
    }

    pub fn record_loss(&mut self) {
        self.losses += 1;
    }

    /// Snapshot combined with the agent's ledger entry
    pub fn report(&self, allocation: Option<BudgetAllocation>) -> AgentStatusReport {
        AgentStatusReport {
            id: self.id.clone(),
            swarm_id: self.swarm_id.clone(),
            strategy: self.strategy_kind(),
            status: self.status,
            allocation,
            active_bids: self.active_bids.clone(),
            active_offers: self.active_offers.clone(),
            wins: self.wins,
            losses: self.losses,
            total_spent: self.total_spent,
            cycles_run: self.cycles_run,
            last_cycle_at: self.last_cycle_at,
        }
    }
}

/// Serializable view of an agent for status queries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentStatusReport {
    pub id: AgentId,
    pub swarm_id: SwarmId,
    pub strategy: StrategyKind,
    pub status: AgentStatus,
    pub allocation: Option<BudgetAllocation>,
    pub active_bids: Vec<ActiveBid>,
    pub active_offers: Vec<ActiveBid>,
    pub wins: u32,
    pub losses: u32,
    pub total_spent: Money,
    pub cycles_run: u64,
    pub last_cycle_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::StrategyTuning;
    use chrono::TimeZone;

    fn agent() -> Agent {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        Agent::new(
            AgentId::new("abc-agent-1"),
            SwarmId::new("abc"),
            Strategy::new(StrategyKind::Sniper, &StrategyTuning::default()),
            Money::from_dollars(95.0),
            now,
        )
    }

    fn engagement(kind: EngagementKind, listing: &str, reference: &str) -> ActiveBid {
        ActiveBid {
            kind,
            listing_id: ListingId::new(listing),
            reference: reference.into(),
            amount: Money::from_dollars(10.0),
            placed_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_track_and_untrack() {
        let mut agent = agent();
        agent.track(engagement(EngagementKind::Bid, "l-1", "bid-1"));
        agent.track(engagement(EngagementKind::Offer, "l-2", "offer-2"));

        assert!(agent.is_engaged_on(&ListingId::new("l-1")));
        assert!(agent.is_engaged_on(&ListingId::new("l-2")));
        assert_eq!(agent.engagements().len(), 2);

        let removed = agent.untrack("offer-2").unwrap();
        assert_eq!(removed.kind, EngagementKind::Offer);
        assert!(!agent.is_engaged_on(&ListingId::new("l-2")));
        assert!(agent.untrack("offer-2").is_none());
    }

    #[test]
    fn test_report_counts() {
        let mut agent = agent();
        agent.record_win(Money::from_dollars(40.0));
        agent.record_loss();

        let report = agent.report(None);
        assert_eq!(report.strategy, StrategyKind::Sniper);
        assert_eq!(report.wins, 1);
        assert_eq!(report.losses, 1);
        assert_eq!(report.total_spent, Money::from_dollars(40.0));
        assert!(AgentStatus::Idle.is_live());
        assert!(!AgentStatus::Paused.is_live());
    }
}
