//! Marketplace boundary types

use crate::ids::ListingId;
use crate::money::Money;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One purchasable item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub id: ListingId,
    pub title: String,
    pub current_price: Money,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buy_it_now_price: Option<Money>,

    #[serde(default)]
    pub is_auction: bool,

    #[serde(default)]
    pub accepts_offers: bool,

    #[serde(default)]
    pub bid_count: u32,

    #[serde(default)]
    pub watcher_count: u32,

    #[serde(default = "default_condition")]
    pub condition: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,

    /// Winning bid id or accepted offer id, once the listing is decided
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winning_reference: Option<String>,
}

fn default_condition() -> String {
    "used".to_string()
}

impl Listing {
    /// Create a fixed-price listing
    pub fn new(id: impl Into<ListingId>, title: impl Into<String>, price: Money) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            current_price: price,
            buy_it_now_price: None,
            is_auction: false,
            accepts_offers: false,
            bid_count: 0,
            watcher_count: 0,
            condition: default_condition(),
            end_time: None,
            winning_reference: None,
        }
    }

    /// Make this an auction ending at `end_time`
    pub fn with_auction(mut self, end_time: DateTime<Utc>) -> Self {
        self.is_auction = true;
        self.end_time = Some(end_time);
        self
    }

    pub fn with_offers(mut self) -> Self {
        self.accepts_offers = true;
        self
    }

    pub fn with_buy_it_now(mut self, price: Money) -> Self {
        self.buy_it_now_price = Some(price);
        self
    }

    pub fn with_activity(mut self, bid_count: u32, watcher_count: u32) -> Self {
        self.bid_count = bid_count;
        self.watcher_count = watcher_count;
        self
    }

    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = condition.into();
        self
    }

    pub fn with_end_time(mut self, end_time: DateTime<Utc>) -> Self {
        self.end_time = Some(end_time);
        self
    }

    /// Price a buyer is asked to pay (buy-it-now if present)
    pub fn asking_price(&self) -> Money {
        self.buy_it_now_price.unwrap_or(self.current_price)
    }

    /// Whether the listing has closed at `now`
    pub fn has_ended(&self, now: DateTime<Utc>) -> bool {
        self.winning_reference.is_some() || self.end_time.is_some_and(|end| end <= now)
    }

    /// Time left until close, if the listing has an end time
    pub fn time_remaining(&self, now: DateTime<Utc>) -> Option<std::time::Duration> {
        self.end_time
            .map(|end| crate::clock::duration_between(now, end))
    }
}

/// Search request scoped to an agent's ceiling
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub terms: Vec<String>,
    pub min_price: Option<Money>,
    pub max_price: Option<Money>,
    pub conditions: Vec<String>,
    pub limit: usize,
}

impl SearchQuery {
    /// Whether `listing` satisfies the query (ignores `limit`)
    pub fn matches(&self, listing: &Listing) -> bool {
        let title = listing.title.to_lowercase();
        let terms_ok = self.terms.is_empty()
            || self
                .terms
                .iter()
                .any(|term| title.contains(&term.to_lowercase()));
        let min_ok = self.min_price.map_or(true, |min| listing.current_price >= min);
        let max_ok = self.max_price.map_or(true, |max| listing.current_price <= max);
        let condition_ok = self.conditions.is_empty()
            || self
                .conditions
                .iter()
                .any(|c| c.eq_ignore_ascii_case(&listing.condition));

        terms_ok && min_ok && max_ok && condition_ok
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BidStatus {
    /// Agent is the current high bidder
    HighBidder,
    /// Bid was accepted but is already below the leading bid
    Outbid,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BidResult {
    pub bid_id: String,
    pub status: BidStatus,
    pub amount: Money,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfferStatus {
    /// Seller has not answered yet
    Pending,
    Accepted,
    Declined,
    /// Seller answered with a different price
    Countered,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfferResult {
    pub offer_id: String,
    pub status: OfferStatus,
    pub amount: Money,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub counter_amount: Option<Money>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub listing_id: ListingId,
    pub amount: Money,
    /// Bid or offer reference that won the item
    pub reference: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub session_id: String,
    pub listing_id: ListingId,
    pub total: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: String,
    pub session_id: String,
    pub total: Money,
    pub status: String,
}
