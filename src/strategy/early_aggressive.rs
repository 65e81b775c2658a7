//! Large immediate bids meant to discourage competitors

use super::market::{min_valid_bid, MarketCondition};
use super::{BiddingContext, BiddingDecision};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EarlyAggressiveStrategy {
    /// Fraction of the remaining budget to open with
    pub budget_fraction: f64,
}

impl Default for EarlyAggressiveStrategy {
    fn default() -> Self {
        Self {
            budget_fraction: 0.4,
        }
    }
}

impl EarlyAggressiveStrategy {
    pub fn evaluate(&self, ctx: &BiddingContext) -> BiddingDecision {
        let listing = &ctx.listing;
        let ceiling = ctx.ceiling();

        if !listing.is_auction {
            // Fixed price: pay asking through an offer when the seller takes them
            let asking = listing.asking_price();
            return if listing.accepts_offers && asking <= ceiling {
                BiddingDecision::offer(asking, 0.8, format!("offering full asking {}", asking))
            } else {
                BiddingDecision::skip("fixed-price listing without an affordable offer path")
            };
        }

        let min_bid = min_valid_bid(listing);
        if min_bid > ceiling {
            return BiddingDecision::skip(format!(
                "minimum valid bid {} exceeds ceiling {}",
                min_bid, ceiling
            ));
        }

        let aggressive = ctx.remaining_budget.scale(self.budget_fraction);
        let amount = min_bid.max(aggressive).min(ceiling);
        let confidence = match MarketCondition::for_listing(listing) {
            MarketCondition::Underpriced => 0.8,
            MarketCondition::Fair => 0.7,
            MarketCondition::Overpriced => 0.5,
        };

        BiddingDecision::bid(
            amount,
            confidence,
            format!(
                "opening strong at {} ({}% of remaining budget)",
                amount,
                (self.budget_fraction * 100.0).round()
            ),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marketplace::Listing;
    use crate::money::Money;
    use crate::strategy::context::test_support::*;
    use crate::strategy::{BidAction, StrategyKind};

    fn auction(price: f64) -> Listing {
        Listing::new("l-1", "Guitar", Money::from_dollars(price))
            .with_auction(now() + chrono::Duration::days(3))
            .with_activity(1, 2)
    }

    #[test]
    fn test_bids_fraction_of_remaining() {
        let ctx = context(auction(10.0), StrategyKind::EarlyAggressive, 95.0);
        let decision = EarlyAggressiveStrategy::default().evaluate(&ctx);
        assert_eq!(decision.action, BidAction::Bid);
        assert_eq!(decision.amount, Some(Money::from_dollars(38.0)));
        assert_eq!(decision.delay, None);
    }

    #[test]
    fn test_never_below_min_valid_bid() {
        let ctx = context(auction(60.0), StrategyKind::EarlyAggressive, 95.0);
        let decision = EarlyAggressiveStrategy::default().evaluate(&ctx);
        assert_eq!(decision.amount, Some(Money::from_dollars(61.0)));
    }

    #[test]
    fn test_capped_by_ceiling() {
        let mut ctx = context(auction(10.0), StrategyKind::EarlyAggressive, 95.0);
        ctx.agent.max_per_item = Money::from_dollars(20.0);
        let decision = EarlyAggressiveStrategy::default().evaluate(&ctx);
        assert_eq!(decision.amount, Some(Money::from_dollars(20.0)));
    }

    #[test]
    fn test_fixed_price_offers_asking() {
        let listing = Listing::new("l-2", "Amp", Money::from_dollars(40.0)).with_offers();
        let ctx = context(listing, StrategyKind::EarlyAggressive, 95.0);
        let decision = EarlyAggressiveStrategy::default().evaluate(&ctx);
        assert_eq!(decision.action, BidAction::Offer);
        assert_eq!(decision.amount, Some(Money::from_dollars(40.0)));
    }
}
