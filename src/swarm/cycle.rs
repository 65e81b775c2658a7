//! One agent cycle
//!
//! settle outstanding engagements → search → evaluate each listing → act
//! (combat) or observe (reconnaissance).
//!
//! Every reservation taken here ends the cycle either bound to an engagement
//! the agent tracks, settled as a purchase, or released. Waits (rate limiter,
//! strategy delay) are cancelled when the swarm's epoch moves on; a
//! marketplace call already in flight always completes and its outcome is
//! recorded.

use super::agent::{ActiveBid, Agent, AgentStatus, EngagementKind};
use super::bus::LifecycleEvent;
use super::controller::{Shared, SwarmRuntime};
use super::types::SwarmMode;
use crate::clock::add_duration;
use crate::events::{EventFilter, EventType, Observation, ObservationKind, SwarmEvent};
use crate::ids::{AgentId, ListingId};
use crate::marketplace::{
    BidStatus, CheckoutRequest, Listing, OfferResult, OfferStatus, Order, SearchQuery,
};
use crate::metrics;
use crate::money::Money;
use crate::ratelimit::ApiCategory;
use crate::strategy::{
    AgentProfile, BidAction, BiddingContext, BiddingDecision, CompetitionLevel, CounterResponse,
    MarketCondition, Strategy, StrategyKind,
};
use crate::{BidSwarmError, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// How a cycle ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum CycleOutcome {
    Completed,
    /// No available budget
    Idle,
    /// Window has not opened yet
    NotStarted,
    /// Swarm paused or terminated mid-cycle
    Cancelled,
    Failed,
}

impl CycleOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Idle => "idle",
            Self::NotStarted => "not_started",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        }
    }
}

/// Resolve once `stop` no longer carries `epoch`
async fn epoch_changed(stop: &mut watch::Receiver<u64>, epoch: u64) {
    loop {
        if *stop.borrow_and_update() != epoch {
            return;
        }
        if stop.changed().await.is_err() {
            // Sender gone with the swarm: nothing will ever cancel us
            std::future::pending::<()>().await;
        }
    }
}

/// Run `fut` unless the epoch moves on first
pub(super) async fn cancellable<T>(
    stop: &mut watch::Receiver<u64>,
    epoch: u64,
    fut: impl Future<Output = T>,
) -> Option<T> {
    tokio::select! {
        biased;
        _ = epoch_changed(stop, epoch) => None,
        out = fut => Some(out),
    }
}

/// Run one cycle for `agent_id`, record its outcome and schedule the next one
///
/// Never returns an error: failures become `ERROR` events.
pub(super) async fn run_agent_cycle(
    shared: &Shared,
    runtime: &SwarmRuntime,
    agent_id: &AgentId,
    epoch: u64,
) {
    let Some(agent) = runtime.agent(agent_id) else {
        return;
    };

    let mut cycle = AgentCycle::new(shared, runtime, agent.clone(), epoch);
    let outcome = match cycle.run().await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!(
                swarm_id = %runtime.id,
                agent_id = %agent_id,
                error = %e,
                "Agent cycle failed"
            );
            cycle.emit(
                EventType::Error,
                None,
                json!({ "operation": "cycle", "kind": e.kind(), "error": e.to_string() }),
            );
            CycleOutcome::Failed
        }
    };
    metrics::record_cycle(outcome.as_str());

    let now = shared.clock.now();
    let report = {
        let mut agent = agent.lock();
        agent.cycles_run += 1;
        agent.last_cycle_at = Some(now);
        runtime.report(&agent)
    };
    shared.bus.publish(LifecycleEvent::AgentUpdated(report));

    if runtime.is_current(epoch) && runtime.agent(agent_id).is_some() {
        runtime
            .scheduler
            .lock()
            .schedule(agent_id.clone(), add_duration(now, runtime.cycle_interval));
    }
    debug!(agent_id = %agent_id, outcome = outcome.as_str(), "Cycle finished");
}

struct AgentCycle<'a> {
    shared: &'a Shared,
    runtime: &'a SwarmRuntime,
    agent: Arc<Mutex<Agent>>,
    agent_id: AgentId,
    strategy: Strategy,
    kind: StrategyKind,
    stop: watch::Receiver<u64>,
    epoch: u64,
}

impl<'a> AgentCycle<'a> {
    fn new(
        shared: &'a Shared,
        runtime: &'a SwarmRuntime,
        agent: Arc<Mutex<Agent>>,
        epoch: u64,
    ) -> Self {
        let (agent_id, strategy) = {
            let agent = agent.lock();
            (agent.id.clone(), agent.strategy.clone())
        };
        Self {
            shared,
            runtime,
            agent,
            agent_id,
            kind: strategy.kind(),
            strategy,
            stop: runtime.epoch.subscribe(),
            epoch,
        }
    }

    fn now(&self) -> DateTime<Utc> {
        self.shared.clock.now()
    }

    fn stopped(&self) -> bool {
        *self.stop.borrow() != self.epoch
    }

    fn available(&self) -> Money {
        self.runtime.available(&self.agent_id)
    }

    fn set_status(&self, status: AgentStatus) {
        let mut agent = self.agent.lock();
        if agent.status.is_live() {
            agent.status = status;
        }
    }

    /// Append an agent event tagged with its strategy
    fn emit(&self, event_type: EventType, listing_id: Option<&ListingId>, mut payload: Value) -> SwarmEvent {
        if let Value::Object(map) = &mut payload {
            map.insert("strategy".to_string(), json!(self.kind));
        }
        let event = self.shared.log.record_event(
            event_type,
            &self.runtime.id,
            Some(&self.agent_id),
            listing_id,
            payload,
        );
        if event_type.is_trade() {
            self.shared.bus.publish(LifecycleEvent::Trade(event.clone()));
        }
        event
    }

    async fn run(&mut self) -> Result<CycleOutcome> {
        let now = self.now();
        if !self.runtime.window.has_started(now) {
            return Ok(CycleOutcome::NotStarted);
        }

        if !self.settle().await? {
            return Ok(CycleOutcome::Cancelled);
        }

        let available = self.available();
        if available.is_zero() {
            self.set_status(AgentStatus::Idle);
            debug!(agent_id = %self.agent_id, "No available budget, agent idle");
            return Ok(CycleOutcome::Idle);
        }
        self.set_status(AgentStatus::Active);

        let Some(listings) = self.search(available).await? else {
            return Ok(CycleOutcome::Cancelled);
        };

        let agent_history: Arc<[SwarmEvent]> = self
            .shared
            .log
            .query_events(
                &EventFilter::for_swarm(&self.runtime.id)
                    .with_agent(&self.agent_id)
                    .trades_only(),
            )
            .into();

        for listing in listings {
            if self.stopped() {
                return Ok(CycleOutcome::Cancelled);
            }
            if self.agent.lock().is_engaged_on(&listing.id) {
                continue;
            }

            let ctx = self.context(listing, &agent_history);
            let decision = self.strategy.evaluate(&ctx);

            if self.runtime.mode == SwarmMode::Reconnaissance {
                self.observe(&ctx, &decision);
                continue;
            }
            if !self.act(&ctx, &decision).await {
                return Ok(CycleOutcome::Cancelled);
            }
        }

        Ok(CycleOutcome::Completed)
    }

    fn context(&self, listing: Listing, agent_history: &Arc<[SwarmEvent]>) -> BiddingContext {
        let listing_history = self.shared.log.query_events(
            &EventFilter::for_swarm(&self.runtime.id)
                .with_listing(&listing.id)
                .trades_only(),
        );
        BiddingContext {
            agent: AgentProfile {
                agent_id: self.agent_id.clone(),
                strategy: self.kind,
                max_per_item: self.runtime.per_item_cap,
                target_max_price: self.runtime.criteria.max_price,
            },
            remaining_budget: self.available(),
            agent_history: Arc::clone(agent_history),
            listing_history,
            now: self.now(),
            listing,
        }
    }

    /// Wait for a rate-limiter token; `Ok(false)` when cancelled
    async fn gate(&mut self, category: ApiCategory) -> Result<bool> {
        let shared = self.shared;
        let wait = shared
            .limiter
            .acquire_with_wait(category, shared.config.max_rate_limit_wait());
        match cancellable(&mut self.stop, self.epoch, wait).await {
            None => Ok(false),
            Some(result) => result.map(|_| true),
        }
    }

    /// Feed an API outcome back into backoff and metrics
    fn observe_api<T>(&self, category: ApiCategory, result: &Result<T>) {
        match result {
            Ok(_) => self.shared.limiter.record_success(category),
            Err(e) => {
                if let Some(status) = e.status_code() {
                    self.shared.limiter.record_failure(category, status);
                    metrics::record_api_error(category, status);
                }
            }
        }
    }

    fn action_failed(&self, operation: &str, listing_id: &ListingId, err: &BidSwarmError) {
        warn!(
            agent_id = %self.agent_id,
            listing_id = %listing_id,
            operation,
            error = %err,
            "Marketplace action failed"
        );
        self.emit(
            EventType::Error,
            Some(listing_id),
            json!({
                "operation": operation,
                "kind": err.kind(),
                "status": err.status_code(),
                "error": err.to_string(),
            }),
        );
    }

    /// Resolve tracked bids and offers against the listing's current state
    ///
    /// `Ok(false)` when cancelled.
    async fn settle(&mut self) -> Result<bool> {
        let engagements = self.agent.lock().engagements();
        for engagement in engagements {
            if !self.gate(ApiCategory::Item).await? {
                return Ok(false);
            }
            let result = self.shared.marketplace.get_item(&engagement.listing_id).await;
            self.observe_api(ApiCategory::Item, &result);
            let now = self.now();

            match result? {
                None => self.lose(&engagement, "listing removed"),
                Some(listing)
                    if listing.winning_reference.as_deref() == Some(engagement.reference.as_str()) =>
                {
                    let paid = match engagement.kind {
                        EngagementKind::Bid => listing.current_price.min(engagement.amount),
                        EngagementKind::Offer => engagement.amount,
                    };
                    self.win(&engagement, paid).await;
                }
                Some(listing) if listing.has_ended(now) => self.lose(&engagement, "listing ended"),
                Some(listing)
                    if engagement.kind == EngagementKind::Bid
                        && listing.current_price > engagement.amount =>
                {
                    self.lose(&engagement, "outbid")
                }
                Some(_) => {}
            }
        }
        Ok(true)
    }

    /// `None` when cancelled
    async fn search(&mut self, available: Money) -> Result<Option<Vec<Listing>>> {
        let criteria = &self.runtime.criteria;
        let mut ceiling = available.min(self.runtime.per_item_cap);
        if let Some(max) = criteria.max_price {
            ceiling = ceiling.min(max);
        }
        let query = SearchQuery {
            terms: criteria.search_terms.clone(),
            min_price: criteria.min_price,
            max_price: Some(ceiling),
            conditions: criteria.conditions.clone(),
            limit: self.shared.config.search_limit,
        };

        if !self.gate(ApiCategory::Search).await? {
            return Ok(None);
        }
        let result = self.shared.marketplace.search(&query).await;
        self.observe_api(ApiCategory::Search, &result);
        let listings = result?;

        self.emit(
            EventType::SearchCompleted,
            None,
            json!({
                "results": listings.len(),
                "max_price": ceiling.cents(),
                "terms": query.terms,
            }),
        );
        Ok(Some(listings))
    }

    fn observe(&self, ctx: &BiddingContext, decision: &BiddingDecision) {
        let observation = Observation {
            id: uuid::Uuid::new_v4().to_string(),
            swarm_id: self.runtime.id.clone(),
            agent_id: self.agent_id.clone(),
            strategy: self.kind,
            kind: ObservationKind::for_action(decision.action),
            action: decision.action,
            amount: decision.amount,
            market_condition: MarketCondition::for_listing(&ctx.listing),
            competition: CompetitionLevel::assess(&ctx.listing),
            confidence: decision.confidence,
            reasoning: decision.reasoning.clone(),
            listing: ctx.listing.clone(),
            timestamp: self.now(),
        };
        self.shared.log.record_observation(observation);
    }

    /// Execute a combat decision; `false` when cancelled
    async fn act(&mut self, ctx: &BiddingContext, decision: &BiddingDecision) -> bool {
        let listing_id = &ctx.listing.id;
        match decision.action {
            BidAction::Skip => true,
            BidAction::Watch => {
                self.watch(listing_id, decision);
                true
            }
            BidAction::Bid | BidAction::Offer => {
                let Some(amount) = decision.amount.filter(|a| !a.is_zero()) else {
                    return true;
                };
                if !self.reserve(listing_id, amount, decision.action) {
                    return true;
                }

                if let Some(delay) = decision.delay {
                    let sleep = self.shared.clock.sleep(delay);
                    if cancellable(&mut self.stop, self.epoch, sleep).await.is_none() {
                        self.runtime.budget.release_funds(&self.agent_id, amount);
                        return false;
                    }
                }

                let (category, operation) = match decision.action {
                    BidAction::Bid => (ApiCategory::Bid, "place_bid"),
                    _ => (ApiCategory::Offer, "submit_offer"),
                };
                match self.gate(category).await {
                    Ok(true) => {}
                    Ok(false) => {
                        self.runtime.budget.release_funds(&self.agent_id, amount);
                        return false;
                    }
                    Err(e) => {
                        self.runtime.budget.release_funds(&self.agent_id, amount);
                        self.action_failed(operation, listing_id, &e);
                        return true;
                    }
                }

                if decision.action == BidAction::Bid {
                    self.place_bid(ctx, amount, decision).await;
                } else {
                    self.submit_offer(ctx, amount, decision).await;
                }
                true
            }
        }
    }

    fn watch(&self, listing_id: &ListingId, decision: &BiddingDecision) {
        let already_watched = !self
            .shared
            .log
            .query_events(
                &EventFilter::for_swarm(&self.runtime.id)
                    .with_agent(&self.agent_id)
                    .with_listing(listing_id)
                    .with_type(EventType::ItemWatched)
                    .with_limit(1),
            )
            .is_empty();
        if already_watched {
            return;
        }
        self.emit(
            EventType::ItemWatched,
            Some(listing_id),
            json!({ "confidence": decision.confidence, "reasoning": decision.reasoning }),
        );
    }

    /// Affordability check plus reservation; records `BUDGET_DENIED` on failure
    fn reserve(&self, listing_id: &ListingId, amount: Money, action: BidAction) -> bool {
        let cap = self.runtime.per_item_cap;
        let denial = if amount > cap {
            metrics::record_reservation_denied();
            Some(format!("amount {} over per-item cap {}", amount, cap))
        } else {
            self.runtime
                .budget
                .try_reserve(&self.agent_id, amount)
                .err()
                .map(|e| e.to_string())
        };

        let Some(reason) = denial else {
            return true;
        };
        warn!(
            agent_id = %self.agent_id,
            listing_id = %listing_id,
            amount = %amount,
            reason = %reason,
            "Budget denied"
        );
        self.emit(
            EventType::BudgetDenied,
            Some(listing_id),
            json!({
                "amount": amount.cents(),
                "action": action,
                "available": self.available().cents(),
                "reason": reason,
            }),
        );
        false
    }

    async fn place_bid(&self, ctx: &BiddingContext, amount: Money, decision: &BiddingDecision) {
        let listing_id = &ctx.listing.id;
        let result = self.shared.marketplace.place_bid(listing_id, amount).await;
        self.observe_api(ApiCategory::Bid, &result);
        let result = match result {
            Ok(result) => result,
            Err(e) => {
                self.runtime.budget.release_funds(&self.agent_id, amount);
                self.action_failed("place_bid", listing_id, &e);
                return;
            }
        };

        if result.status == BidStatus::Rejected {
            self.runtime.budget.release_funds(&self.agent_id, amount);
            self.emit(
                EventType::Error,
                Some(listing_id),
                json!({
                    "operation": "place_bid",
                    "kind": "rejected",
                    "amount": amount.cents(),
                    "error": format!("bid {} rejected", result.bid_id),
                }),
            );
            return;
        }

        let now = self.now();
        self.runtime.record_activity(now, |c| c.bids_placed += 1);
        self.emit(
            EventType::BidPlaced,
            Some(listing_id),
            json!({
                "amount": amount.cents(),
                "bid_id": result.bid_id,
                "status": result.status,
                "confidence": decision.confidence,
                "reasoning": decision.reasoning,
            }),
        );
        info!(agent_id = %self.agent_id, listing_id = %listing_id, amount = %amount, "Bid placed");

        let engagement = ActiveBid {
            kind: EngagementKind::Bid,
            listing_id: listing_id.clone(),
            reference: result.bid_id,
            amount,
            placed_at: now,
        };
        if result.status == BidStatus::HighBidder {
            self.agent.lock().track(engagement);
        } else {
            self.lose(&engagement, "outbid");
        }
    }

    async fn submit_offer(&self, ctx: &BiddingContext, amount: Money, decision: &BiddingDecision) {
        let listing_id = &ctx.listing.id;
        let result = self.shared.marketplace.submit_offer(listing_id, amount).await;
        self.observe_api(ApiCategory::Offer, &result);
        let result = match result {
            Ok(result) => result,
            Err(e) => {
                self.runtime.budget.release_funds(&self.agent_id, amount);
                self.action_failed("submit_offer", listing_id, &e);
                return;
            }
        };

        let now = self.now();
        self.runtime.record_activity(now, |c| c.offers_made += 1);
        self.emit(
            EventType::OfferSubmitted,
            Some(listing_id),
            json!({
                "amount": amount.cents(),
                "offer_id": result.offer_id,
                "confidence": decision.confidence,
                "reasoning": decision.reasoning,
            }),
        );

        let engagement = ActiveBid {
            kind: EngagementKind::Offer,
            listing_id: listing_id.clone(),
            reference: result.offer_id.clone(),
            amount,
            placed_at: now,
        };
        self.resolve_offer(engagement, result, ctx.ceiling()).await;
    }

    /// Follow a seller answer through counters until it settles
    async fn resolve_offer(&self, mut engagement: ActiveBid, mut result: OfferResult, ceiling: Money) {
        let negotiator = &self.shared.config.strategy.negotiator;
        let mut round = 0;

        loop {
            match result.status {
                OfferStatus::Accepted => {
                    let paid = result.amount.min(engagement.amount);
                    self.win(&engagement, paid).await;
                    return;
                }
                OfferStatus::Pending => {
                    self.agent.lock().track(engagement);
                    return;
                }
                OfferStatus::Declined => {
                    self.lose(&engagement, "declined");
                    return;
                }
                OfferStatus::Countered => {}
            }

            round += 1;
            let Some(counter) = result.counter_amount else {
                self.lose(&engagement, "counter without amount");
                return;
            };
            self.emit(
                EventType::OfferCountered,
                Some(&engagement.listing_id),
                json!({
                    "amount": counter.cents(),
                    "offer_id": engagement.reference,
                    "last_offer": engagement.amount.cents(),
                    "round": round,
                }),
            );

            let (accept, next) =
                match negotiator.respond_to_counter(engagement.amount, counter, round, ceiling) {
                    CounterResponse::Accept => (true, counter),
                    CounterResponse::Counter(next) => (false, next),
                    CounterResponse::Decline => {
                        self.decline_counter(&engagement).await;
                        return;
                    }
                };
            debug!(
                agent_id = %self.agent_id,
                offer_id = %engagement.reference,
                round,
                accept,
                amount = %next,
                "Answering counter-offer"
            );

            if next != engagement.amount {
                if let Err(e) =
                    self.runtime
                        .budget
                        .adjust_reservation(&self.agent_id, engagement.amount, next)
                {
                    self.emit(
                        EventType::BudgetDenied,
                        Some(&engagement.listing_id),
                        json!({ "amount": next.cents(), "action": "offer", "reason": e.to_string() }),
                    );
                    self.decline_counter(&engagement).await;
                    return;
                }
                engagement.amount = next;
            }

            let response = match self.respond(&engagement, accept, (!accept).then_some(next)).await {
                Ok(response) => response,
                Err(e) => {
                    self.runtime.budget.release_funds(&self.agent_id, engagement.amount);
                    self.action_failed("respond_to_counter_offer", &engagement.listing_id, &e);
                    return;
                }
            };
            engagement.reference = response.offer_id.clone();
            result = response;
        }
    }

    /// Answer a counter; uncancellable once a negotiation is under way
    async fn respond(
        &self,
        engagement: &ActiveBid,
        accept: bool,
        amount: Option<Money>,
    ) -> Result<OfferResult> {
        self.shared
            .limiter
            .acquire_with_wait(ApiCategory::Offer, self.shared.config.max_rate_limit_wait())
            .await?;
        let result = self
            .shared
            .marketplace
            .respond_to_counter_offer(&engagement.reference, accept, amount)
            .await;
        self.observe_api(ApiCategory::Offer, &result);
        result
    }

    /// Walk away from a negotiation and release its reservation
    async fn decline_counter(&self, engagement: &ActiveBid) {
        if let Err(e) = self.respond(engagement, false, None).await {
            debug!(offer_id = %engagement.reference, error = %e, "Failed to decline counter-offer");
        }
        self.lose(engagement, "declined counter");
    }

    /// Release an engagement's reservation and record the loss
    fn lose(&self, engagement: &ActiveBid, reason: &str) {
        let released = self
            .runtime
            .budget
            .release_funds(&self.agent_id, engagement.amount);
        {
            let mut agent = self.agent.lock();
            agent.untrack(&engagement.reference);
            agent.record_loss();
        }

        let event_type = match engagement.kind {
            EngagementKind::Bid => EventType::BidLost,
            EngagementKind::Offer => EventType::OfferDeclined,
        };
        self.emit(
            event_type,
            Some(&engagement.listing_id),
            json!({
                "amount": engagement.amount.cents(),
                "reference": engagement.reference,
                "reason": reason,
                "released": released,
            }),
        );
        debug!(agent_id = %self.agent_id, listing_id = %engagement.listing_id, reason, "Engagement lost");
    }

    /// Commit the purchase exactly once, then check out
    async fn win(&self, engagement: &ActiveBid, paid: Money) {
        if !self
            .runtime
            .budget
            .settle_purchase(&self.agent_id, engagement.amount, paid)
        {
            self.agent.lock().untrack(&engagement.reference);
            warn!(
                agent_id = %self.agent_id,
                reference = %engagement.reference,
                "Won an engagement whose reservation is no longer held"
            );
            return;
        }
        {
            let mut agent = self.agent.lock();
            agent.untrack(&engagement.reference);
            agent.record_win(paid);
        }

        let now = self.now();
        let counters = self.runtime.record_activity(now, |c| {
            c.items_acquired += 1;
            c.total_spent += paid;
            match engagement.kind {
                EngagementKind::Bid => c.auctions_won += 1,
                EngagementKind::Offer => c.offers_accepted += 1,
            }
        });
        metrics::set_swarm_spent(self.runtime.id.as_str(), counters.total_spent.as_dollars());

        let won = match engagement.kind {
            EngagementKind::Bid => EventType::BidWon,
            EngagementKind::Offer => EventType::OfferAccepted,
        };
        let payload = json!({
            "amount": paid.cents(),
            "reserved": engagement.amount.cents(),
            "reference": engagement.reference,
        });
        self.emit(won, Some(&engagement.listing_id), payload.clone());
        self.emit(EventType::PurchaseCompleted, Some(&engagement.listing_id), payload);
        info!(
            agent_id = %self.agent_id,
            listing_id = %engagement.listing_id,
            paid = %paid,
            "Purchase completed"
        );

        match self.checkout(engagement, paid).await {
            Ok(order) => {
                self.emit(
                    EventType::CheckoutCompleted,
                    Some(&engagement.listing_id),
                    json!({
                        "amount": order.total.cents(),
                        "order_id": order.order_id,
                        "session_id": order.session_id,
                        "reference": engagement.reference,
                    }),
                );
            }
            Err(e) => self.action_failed("checkout", &engagement.listing_id, &e),
        }
    }

    async fn checkout(&self, engagement: &ActiveBid, amount: Money) -> Result<Order> {
        let max_wait = self.shared.config.max_rate_limit_wait();
        let marketplace = &self.shared.marketplace;

        self.shared
            .limiter
            .acquire_with_wait(ApiCategory::Checkout, max_wait)
            .await?;
        let session = marketplace
            .initiate_checkout(&CheckoutRequest {
                listing_id: engagement.listing_id.clone(),
                amount,
                reference: engagement.reference.clone(),
            })
            .await;
        self.observe_api(ApiCategory::Checkout, &session);
        let session = session?;

        self.shared
            .limiter
            .acquire_with_wait(ApiCategory::Order, max_wait)
            .await?;
        let order = marketplace.place_order(&session.session_id).await;
        self.observe_api(ApiCategory::Order, &order);
        order
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cancellable_completes_in_same_epoch() {
        let (tx, mut rx) = watch::channel(3u64);
        let out = cancellable(&mut rx, 3, async { 42 }).await;
        assert_eq!(out, Some(42));
        drop(tx);
    }

    #[tokio::test]
    async fn test_cancellable_stops_when_epoch_moves() {
        let (tx, mut rx) = watch::channel(1u64);
        let bump = tokio::spawn(async move {
            tokio::task::yield_now().await;
            tx.send_modify(|epoch| *epoch += 1);
            tx
        });

        let out = cancellable(&mut rx, 1, std::future::pending::<()>()).await;
        assert_eq!(out, None);
        bump.await.unwrap();
    }

    #[tokio::test]
    async fn test_cancellable_with_stale_epoch_returns_immediately() {
        let (_tx, mut rx) = watch::channel(5u64);
        let out = cancellable(&mut rx, 4, async { "late" }).await;
        assert_eq!(out, None);
    }
}
