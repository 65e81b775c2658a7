//! Picks a concrete strategy per listing from competition and time left

use super::early_aggressive::EarlyAggressiveStrategy;
use super::market::CompetitionLevel;
use super::negotiator::NegotiatorStrategy;
use super::sniper::SniperStrategy;
use super::{BiddingContext, BiddingDecision, StrategyKind};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HybridStrategy {
    /// Below this much time left, contested auctions are sniped
    pub little_time_seconds: u64,
    /// Above this much time left, quiet auctions are bid on early
    pub plenty_time_seconds: u64,
}

impl Default for HybridStrategy {
    fn default() -> Self {
        Self {
            little_time_seconds: 3_600,
            plenty_time_seconds: 86_400,
        }
    }
}

impl HybridStrategy {
    /// Which strategy fits this listing
    pub fn choose(&self, ctx: &BiddingContext) -> StrategyKind {
        let listing = &ctx.listing;
        let competition = CompetitionLevel::assess(listing);
        let remaining = ctx.time_remaining().unwrap_or(Duration::MAX);
        let little_time = remaining <= Duration::from_secs(self.little_time_seconds);
        let plenty_time = remaining >= Duration::from_secs(self.plenty_time_seconds);

        if !listing.is_auction {
            StrategyKind::Negotiator
        } else if competition == CompetitionLevel::High && little_time {
            StrategyKind::Sniper
        } else if competition == CompetitionLevel::Low && listing.accepts_offers {
            StrategyKind::Negotiator
        } else if competition == CompetitionLevel::Low && plenty_time {
            StrategyKind::EarlyAggressive
        } else {
            StrategyKind::Sniper
        }
    }

    pub fn evaluate(
        &self,
        ctx: &BiddingContext,
        sniper: &SniperStrategy,
        aggressive: &EarlyAggressiveStrategy,
        negotiator: &NegotiatorStrategy,
    ) -> BiddingDecision {
        let chosen = self.choose(ctx);
        let decision = match chosen {
            StrategyKind::Sniper => sniper.evaluate(ctx),
            StrategyKind::EarlyAggressive => aggressive.evaluate(ctx),
            _ => negotiator.evaluate(ctx, sniper),
        };
        decision.prefixed(&format!("hybrid->{}", chosen.as_str()))
    }
}
