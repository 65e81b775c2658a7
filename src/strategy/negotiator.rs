//! Best-offer negotiation with a concession schedule

use super::market::MarketCondition;
use super::sniper::SniperStrategy;
use super::{BiddingContext, BiddingDecision, CounterResponse};
use crate::money::Money;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NegotiatorStrategy {
    /// Opening offer is `asking × (1 − opening_discount)`
    pub opening_discount: f64,
    /// Share of the gap to the seller's counter conceded per round
    pub concession_rate: f64,
    /// Counter rounds before the negotiator takes or leaves the last counter
    pub max_rounds: u32,
    /// Accept outright when the counter is within this fraction of our last offer
    pub accept_within: f64,
    /// Never open below this fraction of asking
    pub floor_ratio: f64,
}

impl Default for NegotiatorStrategy {
    fn default() -> Self {
        Self {
            opening_discount: 0.2,
            concession_rate: 0.5,
            max_rounds: 3,
            accept_within: 0.05,
            floor_ratio: 0.5,
        }
    }
}

impl NegotiatorStrategy {
    pub fn evaluate(&self, ctx: &BiddingContext, sniper: &SniperStrategy) -> BiddingDecision {
        let listing = &ctx.listing;

        if !listing.accepts_offers {
            if listing.is_auction {
                return sniper
                    .evaluate(ctx)
                    .scaled(0.8)
                    .prefixed("no offers accepted, sniping instead");
            }
            return BiddingDecision::skip("listing does not accept offers");
        }

        let asking = listing.asking_price();
        let opening = asking.scale(1.0 - self.opening_discount);
        let amount = opening.min(ctx.ceiling());
        if amount < asking.scale(self.floor_ratio) || amount.is_zero() {
            return BiddingDecision::skip(format!(
                "ceiling {} is too far below asking {}",
                ctx.ceiling(),
                asking
            ));
        }

        let confidence = match MarketCondition::for_listing(listing) {
            MarketCondition::Underpriced => 0.8,
            MarketCondition::Fair => 0.65,
            MarketCondition::Overpriced => 0.5,
        };
        BiddingDecision::offer(
            amount,
            confidence,
            format!("opening offer {} against asking {}", amount, asking),
        )
    }

    /// Answer a seller counter
    ///
    /// `round` starts at 1 for the first counter. Never goes above `ceiling`.
    pub fn respond_to_counter(
        &self,
        last_offer: Money,
        counter: Money,
        round: u32,
        ceiling: Money,
    ) -> CounterResponse {
        if counter <= last_offer {
            return CounterResponse::Accept;
        }

        let close_enough =
            counter.saturating_sub(last_offer) <= counter.scale(self.accept_within);
        if counter <= ceiling && (close_enough || round >= self.max_rounds) {
            return CounterResponse::Accept;
        }
        if round >= self.max_rounds {
            return CounterResponse::Decline;
        }

        let gap = counter - last_offer;
        let next = (last_offer + gap.scale(self.concession_rate)).min(ceiling);
        if next <= last_offer {
            CounterResponse::Decline
        } else {
            CounterResponse::Counter(next)
        }
    }
}
