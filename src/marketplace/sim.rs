//! In-memory marketplace for dry runs and tests

use super::{
    BidResult, BidStatus, CheckoutRequest, CheckoutSession, Listing, Marketplace, OfferResult,
    OfferStatus, Order, SearchQuery,
};
use crate::clock::SharedClock;
use crate::ids::ListingId;
use crate::money::Money;
use crate::{BidSwarmError, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use tracing::debug;

/// Marketplace operation, used for call counting and failure injection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketOp {
    Search,
    GetItem,
    PlaceBid,
    SubmitOffer,
    RespondToCounter,
    InitiateCheckout,
    PlaceOrder,
}

/// How the simulated seller answers offers, relative to the asking price
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OfferPolicy {
    /// Offers at or above this fraction are accepted
    pub accept_ratio: f64,
    /// Offers at or above this fraction get a counter halfway to asking
    pub counter_ratio: f64,
    /// Leave every offer pending instead of answering
    pub defer: bool,
}

impl Default for OfferPolicy {
    fn default() -> Self {
        Self {
            accept_ratio: 0.9,
            counter_ratio: 0.7,
            defer: false,
        }
    }
}

#[derive(Debug)]
struct SimOffer {
    listing_id: ListingId,
    counter: Option<Money>,
}

#[derive(Debug, Default)]
struct SimState {
    listings: BTreeMap<ListingId, Listing>,
    high_bids: HashMap<ListingId, String>,
    offers: HashMap<String, SimOffer>,
    sessions: HashMap<String, CheckoutSession>,
    orders: Vec<Order>,
    failures: HashMap<MarketOp, VecDeque<u16>>,
    calls: HashMap<MarketOp, usize>,
    next_id: u64,
}

impl SimState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}-{}", prefix, self.next_id)
    }

    /// Count the call and pop an injected failure, if any
    fn enter(&mut self, op: MarketOp) -> Result<()> {
        *self.calls.entry(op).or_default() += 1;
        match self.failures.get_mut(&op).and_then(|q| q.pop_front()) {
            Some(status) => Err(BidSwarmError::api(
                status,
                format!("simulated failure for {:?}", op),
            )),
            None => Ok(()),
        }
    }

    fn listing_mut(&mut self, id: &ListingId) -> Result<&mut Listing> {
        self.listings
            .get_mut(id)
            .ok_or_else(|| BidSwarmError::api(404, format!("listing {} not found", id)))
    }
}

/// Simulated marketplace with scriptable failures and seller behavior
#[derive(Debug)]
pub struct SimulatedMarketplace {
    clock: SharedClock,
    policy: Mutex<OfferPolicy>,
    state: Mutex<SimState>,
}

impl SimulatedMarketplace {
    pub fn new(clock: SharedClock) -> Self {
        Self {
            clock,
            policy: Mutex::new(OfferPolicy::default()),
            state: Mutex::new(SimState::default()),
        }
    }

    /// Create a marketplace preloaded with listings
    pub fn with_listings(clock: SharedClock, listings: Vec<Listing>) -> Self {
        let market = Self::new(clock);
        for listing in listings {
            market.add_listing(listing);
        }
        market
    }

    pub fn add_listing(&self, listing: Listing) {
        self.state.lock().listings.insert(listing.id.clone(), listing);
    }

    pub fn set_offer_policy(&self, policy: OfferPolicy) {
        *self.policy.lock() = policy;
    }

    /// Make the next `times` calls of `op` fail with `status`
    pub fn fail_next(&self, op: MarketOp, status: u16, times: usize) {
        let mut state = self.state.lock();
        let queue = state.failures.entry(op).or_default();
        queue.extend(std::iter::repeat(status).take(times));
    }

    /// Number of calls made to `op`, including failed ones
    pub fn calls(&self, op: MarketOp) -> usize {
        self.state.lock().calls.get(&op).copied().unwrap_or(0)
    }

    /// Snapshot of a listing without counting a call
    pub fn listing(&self, id: &ListingId) -> Option<Listing> {
        self.state.lock().listings.get(id).cloned()
    }

    /// Place a competing bid from outside the swarm
    pub fn outbid(&self, id: &ListingId, amount: Money) -> Result<()> {
        let mut state = self.state.lock();
        let bid_id = state.next_id("external");
        let listing = state.listing_mut(id)?;
        listing.current_price = amount;
        listing.bid_count += 1;
        state.high_bids.insert(id.clone(), bid_id);
        Ok(())
    }

    /// Decide a listing now: the high bid (if any) wins
    pub fn close_listing(&self, id: &ListingId) -> Result<()> {
        let mut state = self.state.lock();
        let winner = state.high_bids.get(id).cloned();
        let now = self.clock.now();
        let listing = state.listing_mut(id)?;
        listing.end_time = Some(now);
        if listing.winning_reference.is_none() {
            listing.winning_reference = winner;
        }
        Ok(())
    }

    pub fn orders(&self) -> Vec<Order> {
        self.state.lock().orders.clone()
    }

    fn answer_offer(&self, state: &mut SimState, offer_id: String, listing_id: &ListingId, amount: Money) -> Result<OfferResult> {
        let policy = *self.policy.lock();
        let asking = state.listing_mut(listing_id)?.asking_price();
        let ratio = if asking.is_zero() {
            1.0
        } else {
            amount.as_dollars() / asking.as_dollars()
        };

        let (status, counter) = if policy.defer {
            (OfferStatus::Pending, None)
        } else if ratio >= policy.accept_ratio {
            (OfferStatus::Accepted, None)
        } else if ratio >= policy.counter_ratio {
            let midpoint = Money::from_cents((amount.cents() + asking.cents()) / 2);
            (OfferStatus::Countered, Some(midpoint))
        } else {
            (OfferStatus::Declined, None)
        };

        if status == OfferStatus::Accepted {
            state.listing_mut(listing_id)?.winning_reference = Some(offer_id.clone());
        }
        state.offers.insert(
            offer_id.clone(),
            SimOffer {
                listing_id: listing_id.clone(),
                counter,
            },
        );

        debug!(offer_id = %offer_id, listing_id = %listing_id, amount = %amount, status = ?status, "Seller answered offer");
        Ok(OfferResult {
            offer_id,
            status,
            amount,
            counter_amount: counter,
        })
    }
}

#[async_trait]
impl Marketplace for SimulatedMarketplace {
    async fn search(&self, query: &SearchQuery) -> Result<Vec<Listing>> {
        let now = self.clock.now();
        let mut state = self.state.lock();
        state.enter(MarketOp::Search)?;

        let mut results: Vec<Listing> = state
            .listings
            .values()
            .filter(|l| !l.has_ended(now) && query.matches(l))
            .cloned()
            .collect();
        if query.limit > 0 {
            results.truncate(query.limit);
        }
        Ok(results)
    }

    async fn get_item(&self, id: &ListingId) -> Result<Option<Listing>> {
        let now = self.clock.now();
        let mut state = self.state.lock();
        state.enter(MarketOp::GetItem)?;

        let winner = state.high_bids.get(id).cloned();
        let Some(listing) = state.listings.get_mut(id) else {
            return Ok(None);
        };
        // Auctions are decided lazily once their end time passes
        if listing.is_auction && listing.winning_reference.is_none() && listing.has_ended(now) {
            listing.winning_reference = winner;
        }
        Ok(Some(listing.clone()))
    }

    async fn place_bid(&self, id: &ListingId, amount: Money) -> Result<BidResult> {
        let now = self.clock.now();
        let mut state = self.state.lock();
        state.enter(MarketOp::PlaceBid)?;

        let bid_id = state.next_id("bid");
        let listing = state.listing_mut(id)?;
        if !listing.is_auction {
            return Err(BidSwarmError::api(400, format!("listing {} is not an auction", id)));
        }
        if listing.has_ended(now) {
            return Err(BidSwarmError::api(409, format!("listing {} has ended", id)));
        }

        let beats_current = if listing.bid_count == 0 {
            amount >= listing.current_price
        } else {
            amount > listing.current_price
        };
        if !beats_current {
            return Ok(BidResult {
                bid_id,
                status: BidStatus::Rejected,
                amount,
            });
        }

        listing.current_price = amount;
        listing.bid_count += 1;
        state.high_bids.insert(id.clone(), bid_id.clone());
        Ok(BidResult {
            bid_id,
            status: BidStatus::HighBidder,
            amount,
        })
    }

    async fn submit_offer(&self, id: &ListingId, amount: Money) -> Result<OfferResult> {
        let now = self.clock.now();
        let mut state = self.state.lock();
        state.enter(MarketOp::SubmitOffer)?;

        let listing = state.listing_mut(id)?;
        if !listing.accepts_offers {
            return Err(BidSwarmError::api(400, format!("listing {} does not accept offers", id)));
        }
        if listing.has_ended(now) {
            return Err(BidSwarmError::api(409, format!("listing {} has ended", id)));
        }

        let offer_id = state.next_id("offer");
        self.answer_offer(&mut state, offer_id, id, amount)
    }

    async fn respond_to_counter_offer(
        &self,
        offer_id: &str,
        accept: bool,
        amount: Option<Money>,
    ) -> Result<OfferResult> {
        let mut state = self.state.lock();
        state.enter(MarketOp::RespondToCounter)?;

        let (listing_id, counter) = match state.offers.get(offer_id) {
            Some(offer) => (offer.listing_id.clone(), offer.counter),
            None => return Err(BidSwarmError::api(404, format!("offer {} not found", offer_id))),
        };

        match (accept, counter, amount) {
            (true, Some(counter), _) => {
                state.listing_mut(&listing_id)?.winning_reference = Some(offer_id.to_string());
                Ok(OfferResult {
                    offer_id: offer_id.to_string(),
                    status: OfferStatus::Accepted,
                    amount: counter,
                    counter_amount: None,
                })
            }
            (true, None, _) => Err(BidSwarmError::api(
                409,
                format!("offer {} has no counter to accept", offer_id),
            )),
            (false, _, Some(amount)) => {
                self.answer_offer(&mut state, offer_id.to_string(), &listing_id, amount)
            }
            (false, _, None) => {
                state.offers.remove(offer_id);
                Ok(OfferResult {
                    offer_id: offer_id.to_string(),
                    status: OfferStatus::Declined,
                    amount: Money::ZERO,
                    counter_amount: None,
                })
            }
        }
    }

    async fn initiate_checkout(&self, request: &CheckoutRequest) -> Result<CheckoutSession> {
        let mut state = self.state.lock();
        state.enter(MarketOp::InitiateCheckout)?;

        let listing = state.listing_mut(&request.listing_id)?;
        if listing.winning_reference.as_deref() != Some(request.reference.as_str()) {
            return Err(BidSwarmError::api(
                409,
                format!("{} did not win listing {}", request.reference, request.listing_id),
            ));
        }

        let session = CheckoutSession {
            session_id: state.next_id("session"),
            listing_id: request.listing_id.clone(),
            total: request.amount,
        };
        state
            .sessions
            .insert(session.session_id.clone(), session.clone());
        Ok(session)
    }

    async fn place_order(&self, session_id: &str) -> Result<Order> {
        let mut state = self.state.lock();
        state.enter(MarketOp::PlaceOrder)?;

        let session = state
            .sessions
            .remove(session_id)
            .ok_or_else(|| BidSwarmError::api(404, format!("session {} not found", session_id)))?;
        let order = Order {
            order_id: state.next_id("order"),
            session_id: session.session_id,
            total: session.total,
            status: "confirmed".to_string(),
        };
        state.orders.push(order.clone());
        Ok(order)
    }
}
