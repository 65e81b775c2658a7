//! Event and observation records

use crate::ids::{AgentId, ListingId, SwarmId};
use crate::marketplace::Listing;
use crate::money::Money;
use crate::strategy::{BidAction, CompetitionLevel, MarketCondition, StrategyKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Everything the swarm can record about itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    SwarmCreated,
    SwarmStarted,
    SwarmPaused,
    SwarmResumed,
    SwarmTerminated,
    AgentSpawned,
    AgentTerminated,
    SearchCompleted,
    BidPlaced,
    BidWon,
    BidLost,
    OfferSubmitted,
    OfferCountered,
    OfferAccepted,
    OfferDeclined,
    ItemWatched,
    ObservationRecorded,
    BudgetDenied,
    PurchaseCompleted,
    CheckoutCompleted,
    Error,
}

impl EventType {
    pub const ALL: [EventType; 21] = [
        EventType::SwarmCreated,
        EventType::SwarmStarted,
        EventType::SwarmPaused,
        EventType::SwarmResumed,
        EventType::SwarmTerminated,
        EventType::AgentSpawned,
        EventType::AgentTerminated,
        EventType::SearchCompleted,
        EventType::BidPlaced,
        EventType::BidWon,
        EventType::BidLost,
        EventType::OfferSubmitted,
        EventType::OfferCountered,
        EventType::OfferAccepted,
        EventType::OfferDeclined,
        EventType::ItemWatched,
        EventType::ObservationRecorded,
        EventType::BudgetDenied,
        EventType::PurchaseCompleted,
        EventType::CheckoutCompleted,
        EventType::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SwarmCreated => "SWARM_CREATED",
            Self::SwarmStarted => "SWARM_STARTED",
            Self::SwarmPaused => "SWARM_PAUSED",
            Self::SwarmResumed => "SWARM_RESUMED",
            Self::SwarmTerminated => "SWARM_TERMINATED",
            Self::AgentSpawned => "AGENT_SPAWNED",
            Self::AgentTerminated => "AGENT_TERMINATED",
            Self::SearchCompleted => "SEARCH_COMPLETED",
            Self::BidPlaced => "BID_PLACED",
            Self::BidWon => "BID_WON",
            Self::BidLost => "BID_LOST",
            Self::OfferSubmitted => "OFFER_SUBMITTED",
            Self::OfferCountered => "OFFER_COUNTERED",
            Self::OfferAccepted => "OFFER_ACCEPTED",
            Self::OfferDeclined => "OFFER_DECLINED",
            Self::ItemWatched => "ITEM_WATCHED",
            Self::ObservationRecorded => "OBSERVATION_RECORDED",
            Self::BudgetDenied => "BUDGET_DENIED",
            Self::PurchaseCompleted => "PURCHASE_COMPLETED",
            Self::CheckoutCompleted => "CHECKOUT_COMPLETED",
            Self::Error => "ERROR",
        }
    }

    /// Parse the SCREAMING_SNAKE_CASE name (case-insensitive)
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str().eq_ignore_ascii_case(name))
    }

    /// An agent has put money on the line for a listing
    pub fn is_engagement(&self) -> bool {
        matches!(self, Self::BidPlaced | Self::OfferSubmitted | Self::OfferCountered)
    }

    /// The agent's engagement with a listing ended without a purchase
    pub fn is_disengagement(&self) -> bool {
        matches!(self, Self::BidLost | Self::OfferDeclined)
    }

    /// Bid and offer outcomes announced on the lifecycle bus
    pub fn is_trade(&self) -> bool {
        self.is_engagement()
            || self.is_disengagement()
            || matches!(self, Self::BidWon | Self::OfferAccepted)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One append-only log entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwarmEvent {
    /// Global append order, assigned by the log
    pub seq: u64,
    pub event_type: EventType,
    pub swarm_id: SwarmId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<AgentId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listing_id: Option<ListingId>,

    pub timestamp: DateTime<Utc>,

    #[serde(default)]
    pub payload: serde_json::Value,
}

impl SwarmEvent {
    /// `payload.amount` in cents, when present
    pub fn amount(&self) -> Option<Money> {
        self.payload
            .get("amount")
            .and_then(|v| v.as_u64())
            .map(Money::from_cents)
    }

    /// `payload.strategy`, when present
    pub fn strategy(&self) -> Option<StrategyKind> {
        self.payload
            .get("strategy")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn payload_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(|v| v.as_str())
    }
}

/// Query over the event log; empty fields match everything
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventFilter {
    pub swarm_id: Option<SwarmId>,
    pub agent_id: Option<AgentId>,
    pub listing_id: Option<ListingId>,
    #[serde(default)]
    pub event_types: Vec<EventType>,
    pub since: Option<DateTime<Utc>>,
    /// Keep only the most recent `limit` matches
    pub limit: Option<usize>,
}

impl EventFilter {
    pub fn for_swarm(swarm_id: &SwarmId) -> Self {
        Self {
            swarm_id: Some(swarm_id.clone()),
            ..Default::default()
        }
    }

    pub fn with_agent(mut self, agent_id: &AgentId) -> Self {
        self.agent_id = Some(agent_id.clone());
        self
    }

    pub fn with_listing(mut self, listing_id: &ListingId) -> Self {
        self.listing_id = Some(listing_id.clone());
        self
    }

    pub fn with_type(mut self, event_type: EventType) -> Self {
        self.event_types.push(event_type);
        self
    }

    /// Restrict to bid and offer events (see [`EventType::is_trade`])
    pub fn trades_only(mut self) -> Self {
        self.event_types = EventType::ALL
            .iter()
            .copied()
            .filter(EventType::is_trade)
            .collect();
        self
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, event: &SwarmEvent) -> bool {
        self.swarm_id.as_ref().map_or(true, |s| *s == event.swarm_id)
            && self
                .agent_id
                .as_ref()
                .map_or(true, |a| event.agent_id.as_ref() == Some(a))
            && self
                .listing_id
                .as_ref()
                .map_or(true, |l| event.listing_id.as_ref() == Some(l))
            && (self.event_types.is_empty() || self.event_types.contains(&event.event_type))
            && self.since.map_or(true, |since| event.timestamp >= since)
    }
}

/// Which way a reconnaissance observation went
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ObservationKind {
    /// The agent would have bid or offered
    OpportunityIdentified,
    /// The agent would have watched
    WatchCandidate,
    /// The agent would have skipped
    Passed,
}

impl ObservationKind {
    pub fn for_action(action: BidAction) -> Self {
        match action {
            BidAction::Bid | BidAction::Offer => Self::OpportunityIdentified,
            BidAction::Watch => Self::WatchCandidate,
            BidAction::Skip => Self::Passed,
        }
    }
}

/// A would-be decision recorded in reconnaissance mode; never mutated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub id: String,
    pub swarm_id: SwarmId,
    pub agent_id: AgentId,
    pub strategy: StrategyKind,
    pub kind: ObservationKind,
    pub action: BidAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<Money>,
    pub market_condition: MarketCondition,
    pub competition: CompetitionLevel,
    pub confidence: f64,
    pub reasoning: String,
    pub listing: Listing,
    pub timestamp: DateTime<Utc>,
}

/// Query over observations
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObservationFilter {
    pub swarm_id: Option<SwarmId>,
    pub agent_id: Option<AgentId>,
    pub kind: Option<ObservationKind>,
    pub limit: Option<usize>,
}

impl ObservationFilter {
    pub fn for_swarm(swarm_id: &SwarmId) -> Self {
        Self {
            swarm_id: Some(swarm_id.clone()),
            ..Default::default()
        }
    }

    pub fn with_kind(mut self, kind: ObservationKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn matches(&self, observation: &Observation) -> bool {
        self.swarm_id
            .as_ref()
            .map_or(true, |s| *s == observation.swarm_id)
            && self
                .agent_id
                .as_ref()
                .map_or(true, |a| *a == observation.agent_id)
            && self.kind.map_or(true, |k| k == observation.kind)
    }
}
