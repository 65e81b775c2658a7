//! Late bidding on auctions

use super::market::{min_valid_bid, CompetitionLevel};
use super::{BiddingContext, BiddingDecision};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Watches an auction until its final stretch, then bids the minimum valid amount
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SniperStrategy {
    /// Bid this long before the listing closes
    pub snipe_seconds: u64,
    /// Only act once this little time is left; watch before that
    pub snipe_lead_seconds: u64,
}

impl Default for SniperStrategy {
    fn default() -> Self {
        Self {
            snipe_seconds: 10,
            snipe_lead_seconds: 120,
        }
    }
}

impl SniperStrategy {
    pub fn evaluate(&self, ctx: &BiddingContext) -> BiddingDecision {
        let listing = &ctx.listing;
        if !listing.is_auction {
            return BiddingDecision::skip("not an auction");
        }
        let Some(remaining) = ctx.time_remaining() else {
            return BiddingDecision::skip("auction has no end time");
        };
        if remaining.is_zero() {
            return BiddingDecision::skip("auction already closed");
        }

        let lead = Duration::from_secs(self.snipe_lead_seconds);
        if remaining > lead {
            return BiddingDecision::watch(
                0.5,
                format!(
                    "{}s left, waiting for the last {}s",
                    remaining.as_secs(),
                    self.snipe_lead_seconds
                ),
            );
        }

        let amount = min_valid_bid(listing);
        let ceiling = ctx.ceiling();
        if amount > ceiling {
            return BiddingDecision::skip(format!(
                "minimum valid bid {} exceeds ceiling {}",
                amount, ceiling
            ));
        }

        let confidence = match CompetitionLevel::assess(listing) {
            CompetitionLevel::Low => 0.85,
            CompetitionLevel::Medium => 0.75,
            CompetitionLevel::High => 0.6,
        };
        let delay = remaining.saturating_sub(Duration::from_secs(self.snipe_seconds));

        BiddingDecision::bid(
            amount,
            confidence,
            format!("sniping at {} with {}s left", amount, remaining.as_secs()),
        )
        .with_delay(delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marketplace::Listing;
    use crate::money::Money;
    use crate::strategy::context::test_support::*;
    use crate::strategy::{BidAction, StrategyKind};

    fn auction(secs_left: i64, price: f64, bids: u32) -> Listing {
        Listing::new("l-1", "Watch", Money::from_dollars(price))
            .with_auction(now() + chrono::Duration::seconds(secs_left))
            .with_activity(bids, 0)
    }

    #[test]
    fn test_watches_until_lead() {
        let ctx = context(auction(3_600, 50.0, 1), StrategyKind::Sniper, 95.0);
        let decision = SniperStrategy::default().evaluate(&ctx);
        assert_eq!(decision.action, BidAction::Watch);
    }

    #[test]
    fn test_bids_min_increment_near_close() {
        let ctx = context(auction(60, 50.0, 2), StrategyKind::Sniper, 95.0);
        let decision = SniperStrategy::default().evaluate(&ctx);

        assert_eq!(decision.action, BidAction::Bid);
        assert_eq!(decision.amount, Some(Money::from_dollars(51.0)));
        assert_eq!(decision.delay, Some(Duration::from_secs(50)));
    }

    #[test]
    fn test_skips_over_ceiling() {
        let ctx = context(auction(60, 150.0, 2), StrategyKind::Sniper, 95.0);
        let decision = SniperStrategy::default().evaluate(&ctx);
        assert_eq!(decision.action, BidAction::Skip);
    }

    #[test]
    fn test_skips_fixed_price() {
        let listing = Listing::new("l-1", "Watch", Money::from_dollars(20.0));
        let ctx = context(listing, StrategyKind::Sniper, 95.0);
        assert_eq!(
            SniperStrategy::default().evaluate(&ctx).action,
            BidAction::Skip
        );
    }
}
