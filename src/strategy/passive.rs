//! Only acts on clear bargains

use super::market::{fair_value, min_valid_bid};
use super::{BiddingContext, BiddingDecision};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PassiveStrategy {
    /// Act only when price ≤ fair value × (1 − threshold)
    pub threshold: f64,
}

impl Default for PassiveStrategy {
    fn default() -> Self {
        Self { threshold: 0.2 }
    }
}

impl PassiveStrategy {
    pub fn evaluate(&self, ctx: &BiddingContext) -> BiddingDecision {
        let listing = &ctx.listing;
        let fair = fair_value(listing);
        let trigger = fair.scale(1.0 - self.threshold);

        if listing.current_price > trigger {
            return BiddingDecision::skip(format!(
                "price {} above bargain threshold {} (fair value {})",
                listing.current_price, trigger, fair
            ));
        }

        let discount = 1.0 - listing.current_price.as_dollars() / fair.as_dollars().max(0.01);
        let confidence = 0.6 + discount.min(0.4);

        if listing.is_auction {
            let amount = min_valid_bid(listing);
            if amount <= ctx.ceiling() && amount <= trigger {
                return BiddingDecision::bid(
                    amount,
                    confidence,
                    format!("bargain: {} against fair value {}", amount, fair),
                );
            }
        } else if listing.accepts_offers && listing.current_price <= ctx.ceiling() {
            return BiddingDecision::offer(
                listing.current_price,
                confidence,
                format!("bargain: offering asking {} against fair value {}", listing.current_price, fair),
            );
        }

        BiddingDecision::skip("bargain but no affordable way to buy it")
    }
}
