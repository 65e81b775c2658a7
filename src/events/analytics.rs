//! Read-only analytics over the event log
//!
//! Nothing here mutates the log. Everything is derived from events (and, for
//! reconnaissance swarms, observations) so the same numbers come out of a
//! live controller and of a database left behind by an earlier run.

use super::types::{EventType, Observation, ObservationKind, SwarmEvent};
use crate::ids::{AgentId, ListingId, SwarmId};
use crate::money::Money;
use crate::strategy::{ConcentrationRisk, StrategyKind};
use crate::swarm::Swarm;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

/// Anomaly detection thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    /// Bids by different agents on one listing this close together are synchronized
    pub sync_window_secs: u64,
    /// Strictly increasing bids by one agent on one listing before it counts as escalation
    pub escalation_min_bids: usize,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            sync_window_secs: 60,
            escalation_min_bids: 3,
        }
    }
}

/// Outcome totals for one strategy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyPerformance {
    pub strategy: StrategyKind,
    pub bids_placed: u64,
    pub offers_made: u64,
    pub wins: u64,
    pub losses: u64,
    /// wins / (wins + losses), 0 when nothing has settled
    pub win_rate: f64,
    pub total_spent: Money,
}

impl StrategyPerformance {
    fn new(strategy: StrategyKind) -> Self {
        Self {
            strategy,
            bids_placed: 0,
            offers_made: 0,
            wins: 0,
            losses: 0,
            win_rate: 0.0,
            total_spent: Money::ZERO,
        }
    }

    pub fn settled(&self) -> u64 {
        self.wins + self.losses
    }

    /// Average paid per win
    pub fn cost_per_win(&self) -> Option<Money> {
        (self.wins > 0).then(|| Money::from_cents(self.total_spent.cents() / self.wins))
    }
}

/// Strategies ranked by win rate, then wins
pub fn rank_strategies(events: &[SwarmEvent]) -> Vec<StrategyPerformance> {
    let mut by_kind: BTreeMap<StrategyKind, StrategyPerformance> = BTreeMap::new();

    for event in events {
        let Some(kind) = event.strategy() else {
            continue;
        };
        let entry = by_kind
            .entry(kind)
            .or_insert_with(|| StrategyPerformance::new(kind));
        match event.event_type {
            EventType::BidPlaced => entry.bids_placed += 1,
            EventType::OfferSubmitted => entry.offers_made += 1,
            EventType::BidWon | EventType::OfferAccepted => entry.wins += 1,
            EventType::BidLost | EventType::OfferDeclined => entry.losses += 1,
            EventType::PurchaseCompleted => {
                entry.total_spent += event.amount().unwrap_or(Money::ZERO)
            }
            _ => {}
        }
    }

    let mut ranked: Vec<StrategyPerformance> = by_kind
        .into_values()
        .map(|mut p| {
            if p.settled() > 0 {
                p.win_rate = p.wins as f64 / p.settled() as f64;
            }
            p
        })
        .collect();
    ranked.sort_by(|a, b| {
        b.win_rate
            .partial_cmp(&a.win_rate)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(b.wins.cmp(&a.wins))
            .then(a.strategy.cmp(&b.strategy))
    });
    ranked
}

/// Spend against acquisitions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostEfficiency {
    pub items_acquired: u64,
    pub total_spent: Money,
    pub avg_cost_per_item: Option<Money>,
    /// Share of the allocatable pool actually spent
    pub budget_utilization: f64,
}

impl CostEfficiency {
    pub fn compute(events: &[SwarmEvent], allocatable: Money) -> Self {
        let purchases: Vec<Money> = events
            .iter()
            .filter(|e| e.event_type == EventType::PurchaseCompleted)
            .map(|e| e.amount().unwrap_or(Money::ZERO))
            .collect();
        let items_acquired = purchases.len() as u64;
        let total_spent: Money = purchases.into_iter().sum();

        Self {
            items_acquired,
            total_spent,
            avg_cost_per_item: (items_acquired > 0)
                .then(|| Money::from_cents(total_spent.cents() / items_acquired)),
            budget_utilization: if allocatable.is_zero() {
                0.0
            } else {
                total_spent.as_dollars() / allocatable.as_dollars()
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnomalyKind {
    /// Several agents bid on the same listing within a short window
    SynchronizedBids,
    /// One agent keeps raising its own bid on a listing
    BidEscalation,
}

/// A pattern that looks like agents gaming the marketplace or each other
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    pub kind: AnomalyKind,
    pub listing_id: ListingId,
    pub agents: Vec<AgentId>,
    pub bid_count: usize,
    pub first_at: DateTime<Utc>,
    pub last_at: DateTime<Utc>,
    pub description: String,
}

fn bids_by_listing(events: &[SwarmEvent]) -> BTreeMap<&ListingId, Vec<&SwarmEvent>> {
    let mut grouped: BTreeMap<&ListingId, Vec<&SwarmEvent>> = BTreeMap::new();
    for event in events {
        if event.event_type != EventType::BidPlaced {
            continue;
        }
        if let (Some(listing), Some(_)) = (&event.listing_id, &event.agent_id) {
            grouped.entry(listing).or_default().push(event);
        }
    }
    for bids in grouped.values_mut() {
        bids.sort_by(|a, b| (a.timestamp, a.seq).cmp(&(b.timestamp, b.seq)));
    }
    grouped
}

/// Bursts of bids on one listing from at least two agents inside `window`
pub fn detect_synchronized_bids(events: &[SwarmEvent], window: Duration) -> Vec<Anomaly> {
    let window = chrono::Duration::from_std(window).unwrap_or(chrono::Duration::zero());
    let mut anomalies = Vec::new();

    for (listing, bids) in bids_by_listing(events) {
        let mut start = 0;
        while start < bids.len() {
            let opened = bids[start].timestamp;
            let mut end = start;
            while end + 1 < bids.len() && bids[end + 1].timestamp - opened <= window {
                end += 1;
            }

            let burst = &bids[start..=end];
            let agents: BTreeSet<AgentId> =
                burst.iter().filter_map(|e| e.agent_id.clone()).collect();
            if agents.len() >= 2 {
                anomalies.push(Anomaly {
                    kind: AnomalyKind::SynchronizedBids,
                    listing_id: listing.clone(),
                    description: format!(
                        "{} agents placed {} bids on {} within {}s",
                        agents.len(),
                        burst.len(),
                        listing,
                        window.num_seconds()
                    ),
                    agents: agents.into_iter().collect(),
                    bid_count: burst.len(),
                    first_at: opened,
                    last_at: burst[burst.len() - 1].timestamp,
                });
            }
            start = end + 1;
        }
    }
    anomalies
}

/// Runs of strictly increasing bids by one agent on one listing
pub fn detect_bid_escalation(events: &[SwarmEvent], min_bids: usize) -> Vec<Anomaly> {
    let mut anomalies = Vec::new();

    for (listing, bids) in bids_by_listing(events) {
        let mut by_agent: BTreeMap<&AgentId, Vec<&SwarmEvent>> = BTreeMap::new();
        for bid in bids {
            if let Some(agent) = &bid.agent_id {
                by_agent.entry(agent).or_default().push(bid);
            }
        }

        for (agent, bids) in by_agent {
            let mut best: &[&SwarmEvent] = &[];
            let mut run_start = 0;
            for i in 1..=bids.len() {
                let rising = i < bids.len()
                    && bids[i].amount().unwrap_or(Money::ZERO)
                        > bids[i - 1].amount().unwrap_or(Money::ZERO);
                if !rising {
                    if i - run_start > best.len() {
                        best = &bids[run_start..i];
                    }
                    run_start = i;
                }
            }

            if best.len() >= min_bids.max(2) {
                let first = best[0].amount().unwrap_or(Money::ZERO);
                let last = best[best.len() - 1].amount().unwrap_or(Money::ZERO);
                anomalies.push(Anomaly {
                    kind: AnomalyKind::BidEscalation,
                    listing_id: listing.clone(),
                    agents: vec![agent.clone()],
                    bid_count: best.len(),
                    first_at: best[0].timestamp,
                    last_at: best[best.len() - 1].timestamp,
                    description: format!(
                        "{} raised its bid on {} {} times ({} -> {})",
                        agent,
                        listing,
                        best.len(),
                        first,
                        last
                    ),
                });
            }
        }
    }
    anomalies
}

/// Summary of reconnaissance observations
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObservationSummary {
    pub total: usize,
    pub by_kind: BTreeMap<ObservationKind, usize>,
    pub by_strategy: BTreeMap<StrategyKind, usize>,
    /// Total amount the swarm would have committed
    pub opportunity_value: Money,
}

impl ObservationSummary {
    pub fn compute(observations: &[Observation]) -> Self {
        let mut summary = Self {
            total: observations.len(),
            ..Default::default()
        };
        for observation in observations {
            *summary.by_kind.entry(observation.kind).or_insert(0) += 1;
            *summary.by_strategy.entry(observation.strategy).or_insert(0) += 1;
            if observation.kind == ObservationKind::OpportunityIdentified {
                summary.opportunity_value += observation.amount.unwrap_or(Money::ZERO);
            }
        }
        summary
    }
}

/// Everything `insights` reports for one swarm
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwarmInsights {
    pub swarm_id: SwarmId,
    pub strategy_rankings: Vec<StrategyPerformance>,
    pub cost_efficiency: CostEfficiency,
    pub concentration: ConcentrationRisk,
    pub anomalies: Vec<Anomaly>,
    pub event_counts: BTreeMap<EventType, usize>,
    pub observations: ObservationSummary,
}

impl SwarmInsights {
    /// `events` and `observations` should already be scoped to `swarm`
    pub fn compute(
        swarm: &Swarm,
        events: &[SwarmEvent],
        observations: &[Observation],
        config: &AnalyticsConfig,
    ) -> Self {
        let mut event_counts = BTreeMap::new();
        for event in events {
            *event_counts.entry(event.event_type).or_insert(0) += 1;
        }

        let mut anomalies =
            detect_synchronized_bids(events, Duration::from_secs(config.sync_window_secs));
        anomalies.extend(detect_bid_escalation(events, config.escalation_min_bids));
        anomalies.sort_by_key(|a| a.first_at);

        Self {
            swarm_id: swarm.id.clone(),
            strategy_rankings: rank_strategies(events),
            cost_efficiency: CostEfficiency::compute(events, swarm.budget.allocatable()),
            concentration: ConcentrationRisk::from_distribution(&swarm.distribution),
            anomalies,
            event_counts,
            observations: ObservationSummary::compute(observations),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::test_support::{at, swarm};
    use serde_json::json;

    fn ev(
        seq: u64,
        event_type: EventType,
        agent: &str,
        listing: &str,
        minute: u32,
        cents: u64,
        strategy: &str,
    ) -> SwarmEvent {
        SwarmEvent {
            seq,
            event_type,
            swarm_id: SwarmId::new("s-1"),
            agent_id: Some(AgentId::new(agent)),
            listing_id: Some(ListingId::new(listing)),
            timestamp: at(minute),
            payload: json!({"amount": cents, "strategy": strategy}),
        }
    }

    #[test]
    fn test_rankings() {
        let events = vec![
            ev(1, EventType::BidPlaced, "a1", "l-1", 0, 1000, "sniper"),
            ev(2, EventType::BidWon, "a1", "l-1", 5, 1000, "sniper"),
            ev(3, EventType::PurchaseCompleted, "a1", "l-1", 5, 1000, "sniper"),
            ev(4, EventType::OfferSubmitted, "a2", "l-2", 1, 800, "negotiator"),
            ev(5, EventType::OfferDeclined, "a2", "l-2", 2, 800, "negotiator"),
            ev(6, EventType::OfferSubmitted, "a2", "l-3", 3, 900, "negotiator"),
            ev(7, EventType::OfferAccepted, "a2", "l-3", 4, 900, "negotiator"),
        ];

        let ranked = rank_strategies(&events);
        assert_eq!(ranked[0].strategy, StrategyKind::Sniper);
        assert_eq!(ranked[0].win_rate, 1.0);
        assert_eq!(ranked[0].cost_per_win(), Some(Money::from_cents(1000)));
        assert_eq!(ranked[1].strategy, StrategyKind::Negotiator);
        assert_eq!(ranked[1].win_rate, 0.5);
        assert_eq!(ranked[1].offers_made, 2);
    }

    #[test]
    fn test_cost_efficiency() {
        let events = vec![
            ev(1, EventType::PurchaseCompleted, "a1", "l-1", 0, 4000, "sniper"),
            ev(2, EventType::PurchaseCompleted, "a2", "l-2", 1, 2000, "hybrid"),
        ];
        let cost = CostEfficiency::compute(&events, Money::from_dollars(120.0));
        assert_eq!(cost.items_acquired, 2);
        assert_eq!(cost.avg_cost_per_item, Some(Money::from_dollars(30.0)));
        assert!((cost.budget_utilization - 0.5).abs() < 1e-9);

        let none = CostEfficiency::compute(&[], Money::ZERO);
        assert_eq!(none.avg_cost_per_item, None);
        assert_eq!(none.budget_utilization, 0.0);
    }

    #[test]
    fn test_synchronized_bids() {
        let events = vec![
            ev(1, EventType::BidPlaced, "a1", "l-1", 10, 1000, "sniper"),
            ev(2, EventType::BidPlaced, "a2", "l-1", 10, 1100, "hybrid"),
            // Same agent twice is not synchronization
            ev(3, EventType::BidPlaced, "a1", "l-2", 10, 1000, "sniper"),
            ev(4, EventType::BidPlaced, "a1", "l-2", 10, 1200, "sniper"),
            // Too far apart
            ev(5, EventType::BidPlaced, "a3", "l-3", 10, 1000, "sniper"),
            ev(6, EventType::BidPlaced, "a4", "l-3", 20, 1000, "sniper"),
        ];

        let anomalies = detect_synchronized_bids(&events, Duration::from_secs(60));
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].listing_id, ListingId::new("l-1"));
        assert_eq!(
            anomalies[0].agents,
            vec![AgentId::new("a1"), AgentId::new("a2")]
        );
    }

    #[test]
    fn test_bid_escalation() {
        let events = vec![
            ev(1, EventType::BidPlaced, "a1", "l-1", 1, 1000, "early_aggressive"),
            ev(2, EventType::BidPlaced, "a1", "l-1", 2, 1500, "early_aggressive"),
            ev(3, EventType::BidPlaced, "a1", "l-1", 3, 2200, "early_aggressive"),
            ev(4, EventType::BidPlaced, "a2", "l-1", 4, 900, "sniper"),
            ev(5, EventType::BidPlaced, "a2", "l-1", 5, 900, "sniper"),
            ev(6, EventType::BidPlaced, "a2", "l-1", 6, 950, "sniper"),
        ];

        let anomalies = detect_bid_escalation(&events, 3);
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].agents, vec![AgentId::new("a1")]);
        assert_eq!(anomalies[0].bid_count, 3);
        assert!(anomalies[0].description.contains("$10.00 -> $22.00"));
    }

    #[test]
    fn test_insights_roll_up() {
        let s = swarm("s-1");
        let events = vec![
            ev(1, EventType::BidPlaced, "a1", "l-1", 0, 1000, "sniper"),
            ev(2, EventType::BidPlaced, "a2", "l-1", 0, 1100, "sniper"),
            ev(3, EventType::BidWon, "a2", "l-1", 9, 1100, "sniper"),
            ev(4, EventType::PurchaseCompleted, "a2", "l-1", 9, 1100, "sniper"),
        ];
        let insights = SwarmInsights::compute(&s, &events, &[], &AnalyticsConfig::default());

        assert_eq!(insights.event_counts[&EventType::BidPlaced], 2);
        assert_eq!(insights.anomalies.len(), 1);
        assert_eq!(insights.cost_efficiency.items_acquired, 1);
        // Single-strategy swarm is fully concentrated
        assert_eq!(insights.concentration.hhi, 1.0);
        assert_eq!(insights.observations.total, 0);
    }
}
