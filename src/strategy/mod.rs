//! Bidding strategy engine
//!
//! A closed set of decision policies behind one `evaluate` call:
//!
//! - **Sniper**: watches an auction, bids the minimum valid increment near close
//! - **EarlyAggressive**: bids a large share of remaining budget right away
//! - **Negotiator**: opens best offers at a discount, concedes on counters
//! - **Hybrid**: picks one of the above per listing from competition and time left
//! - **Passive**: acts only on clear bargains against a fair-value estimate
//!
//! Every strategy first skips listings a teammate is already engaged on and
//! listings priced above the agent's ceiling.

mod context;
mod decision;
mod early_aggressive;
mod hybrid;
mod market;
mod negotiator;
mod passive;
mod sniper;

pub use context::{AgentProfile, BiddingContext};
pub use decision::{BidAction, BiddingDecision, CounterResponse};
pub use early_aggressive::EarlyAggressiveStrategy;
pub use hybrid::HybridStrategy;
pub use market::{
    fair_value, min_bid_increment, min_valid_bid, CompetitionLevel, ConcentrationLevel,
    ConcentrationRisk, MarketCondition,
};
pub use negotiator::NegotiatorStrategy;
pub use passive::PassiveStrategy;
pub use sniper::SniperStrategy;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Every strategy an agent can be assigned
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Sniper,
    EarlyAggressive,
    Negotiator,
    Hybrid,
    Passive,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 5] = [
        StrategyKind::Sniper,
        StrategyKind::EarlyAggressive,
        StrategyKind::Negotiator,
        StrategyKind::Hybrid,
        StrategyKind::Passive,
    ];

    /// Round-robin order for balanced distributions
    pub const BALANCED_ORDER: [StrategyKind; 5] = [
        StrategyKind::Hybrid,
        StrategyKind::Sniper,
        StrategyKind::EarlyAggressive,
        StrategyKind::Negotiator,
        StrategyKind::Passive,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sniper => "sniper",
            Self::EarlyAggressive => "early_aggressive",
            Self::Negotiator => "negotiator",
            Self::Hybrid => "hybrid",
            Self::Passive => "passive",
        }
    }

    /// Weight used by WEIGHTED allocation when a request carries none
    pub fn default_weight(&self) -> f64 {
        match self {
            Self::EarlyAggressive => 1.5,
            Self::Sniper => 1.2,
            Self::Hybrid | Self::Negotiator => 1.0,
            Self::Passive => 0.6,
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = crate::BidSwarmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        Self::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == normalized)
            .ok_or_else(|| {
                crate::BidSwarmError::Configuration(vec![format!("unknown strategy '{}'", s)])
            })
    }
}

/// Tunables for every strategy, loaded from config
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StrategyTuning {
    #[serde(default)]
    pub sniper: SniperStrategy,
    #[serde(default)]
    pub early_aggressive: EarlyAggressiveStrategy,
    #[serde(default)]
    pub negotiator: NegotiatorStrategy,
    #[serde(default)]
    pub hybrid: HybridStrategy,
    #[serde(default)]
    pub passive: PassiveStrategy,
}

/// A configured strategy instance
#[derive(Debug, Clone, PartialEq)]
pub enum Strategy {
    Sniper(SniperStrategy),
    EarlyAggressive(EarlyAggressiveStrategy),
    Negotiator {
        negotiator: NegotiatorStrategy,
        fallback: SniperStrategy,
    },
    Hybrid {
        hybrid: HybridStrategy,
        sniper: SniperStrategy,
        aggressive: EarlyAggressiveStrategy,
        negotiator: NegotiatorStrategy,
    },
    Passive(PassiveStrategy),
}

impl Strategy {
    pub fn new(kind: StrategyKind, tuning: &StrategyTuning) -> Self {
        match kind {
            StrategyKind::Sniper => Self::Sniper(tuning.sniper.clone()),
            StrategyKind::EarlyAggressive => {
                Self::EarlyAggressive(tuning.early_aggressive.clone())
            }
            StrategyKind::Negotiator => Self::Negotiator {
                negotiator: tuning.negotiator.clone(),
                fallback: tuning.sniper.clone(),
            },
            StrategyKind::Hybrid => Self::Hybrid {
                hybrid: tuning.hybrid.clone(),
                sniper: tuning.sniper.clone(),
                aggressive: tuning.early_aggressive.clone(),
                negotiator: tuning.negotiator.clone(),
            },
            StrategyKind::Passive => Self::Passive(tuning.passive.clone()),
        }
    }

    pub fn kind(&self) -> StrategyKind {
        match self {
            Self::Sniper(_) => StrategyKind::Sniper,
            Self::EarlyAggressive(_) => StrategyKind::EarlyAggressive,
            Self::Negotiator { .. } => StrategyKind::Negotiator,
            Self::Hybrid { .. } => StrategyKind::Hybrid,
            Self::Passive(_) => StrategyKind::Passive,
        }
    }

    /// Decide what to do with `ctx.listing`
    pub fn evaluate(&self, ctx: &BiddingContext) -> BiddingDecision {
        let decision = match self.guard(ctx) {
            Some(skip) => skip,
            None => match self {
                Self::Sniper(s) => s.evaluate(ctx),
                Self::EarlyAggressive(s) => s.evaluate(ctx),
                Self::Negotiator {
                    negotiator,
                    fallback,
                } => negotiator.evaluate(ctx, fallback),
                Self::Hybrid {
                    hybrid,
                    sniper,
                    aggressive,
                    negotiator,
                } => hybrid.evaluate(ctx, sniper, aggressive, negotiator),
                Self::Passive(s) => s.evaluate(ctx),
            },
        };

        debug!(
            agent_id = %ctx.agent.agent_id,
            listing_id = %ctx.listing.id,
            strategy = %self.kind(),
            action = %decision.action,
            confidence = decision.confidence,
            "Strategy decision"
        );
        crate::metrics::record_decision(self.kind().as_str(), decision.action.as_str());
        decision
    }

    /// Checks shared by every strategy
    fn guard(&self, ctx: &BiddingContext) -> Option<BiddingDecision> {
        if ctx.listing.has_ended(ctx.now) {
            return Some(BiddingDecision::skip("listing has ended"));
        }
        if let Some(teammate) = ctx.engaged_teammate() {
            return Some(BiddingDecision::skip(format!(
                "teammate {} is already engaged on this listing",
                teammate
            )));
        }
        let ceiling = ctx.ceiling();
        if ctx.listing.current_price > ceiling {
            return Some(BiddingDecision::skip(format!(
                "price {} over ceiling {}",
                ctx.listing.current_price, ceiling
            )));
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::context::test_support::*;
    use super::*;
    use crate::events::EventType;
    use crate::marketplace::Listing;
    use crate::money::Money;

    #[test]
    fn test_kind_round_trip() {
        let tuning = StrategyTuning::default();
        for kind in StrategyKind::ALL {
            assert_eq!(Strategy::new(kind, &tuning).kind(), kind);
            assert_eq!(kind.as_str().parse::<StrategyKind>().unwrap(), kind);
        }
        assert_eq!(
            "Early-Aggressive".parse::<StrategyKind>().unwrap(),
            StrategyKind::EarlyAggressive
        );
        assert!("kamikaze".parse::<StrategyKind>().is_err());
    }

    #[test]
    fn test_every_strategy_defers_to_engaged_teammate() {
        let listing = Listing::new("l-1", "Chair", Money::from_dollars(20.0))
            .with_offers()
            .with_auction(now() + chrono::Duration::seconds(30));
        let tuning = StrategyTuning::default();

        for kind in StrategyKind::ALL {
            let mut ctx = context(listing.clone(), kind, 95.0);
            ctx.listing_history = vec![listing_event(EventType::BidPlaced, "s-agent-9", "l-1")];
            let decision = Strategy::new(kind, &tuning).evaluate(&ctx);
            assert_eq!(decision.action, BidAction::Skip, "{}", kind);
            assert!(decision.reasoning.contains("teammate"));
        }
    }

    #[test]
    fn test_every_strategy_skips_over_ceiling() {
        let listing = Listing::new("l-1", "Sofa", Money::from_dollars(150.0))
            .with_offers()
            .with_auction(now() + chrono::Duration::seconds(30));
        let tuning = StrategyTuning::default();

        for kind in StrategyKind::ALL {
            let ctx = context(listing.clone(), kind, 95.0);
            assert_eq!(
                Strategy::new(kind, &tuning).evaluate(&ctx).action,
                BidAction::Skip,
                "{}",
                kind
            );
        }
    }

    #[test]
    fn test_tuning_from_partial_yaml() {
        let tuning: StrategyTuning =
            serde_yaml::from_str("sniper:\n  snipe_seconds: 5\n  snipe_lead_seconds: 60\n")
                .unwrap();
        assert_eq!(tuning.sniper.snipe_seconds, 5);
        assert_eq!(tuning.passive, PassiveStrategy::default());
    }
}
