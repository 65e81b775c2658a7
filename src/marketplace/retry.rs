//! Client-side retries for marketplace calls
//!
//! The controller never retries on its own; transient failures are the
//! client layer's business. [`RetryingMarketplace`] wraps any marketplace and
//! retries calls whose error says it is worth it:
//!
//! - reads (`search`, `get_item`) retry on 429 and 5xx
//! - writes (bids, offers, checkout, orders) retry only on 429, where the
//!   marketplace refused the request before acting on it; a 5xx on a write
//!   may have gone through, so it is surfaced to the cycle instead
//!
//! Delays come from the same [`BackoffConfig`] schedule the rate limiter uses
//! and are slept through the injected clock.

use super::{
    BidResult, CheckoutRequest, CheckoutSession, Listing, Marketplace, OfferResult, Order,
    SearchQuery, SharedMarketplace,
};
use crate::clock::{Clock, SharedClock};
use crate::ids::ListingId;
use crate::money::Money;
use crate::ratelimit::{ApiCategory, BackoffConfig};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// How an error wants to be treated by the retry loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Transient failure, use the backoff schedule
    Retry,
    /// The server named how long to wait
    RetryAfter(Duration),
    /// Permanent failure
    NoRetry,
}

/// Errors that can classify themselves for the retry loop
pub trait RetryableError {
    fn retry_decision(&self) -> RetryDecision;

    /// HTTP-like status, when the error came from the marketplace
    fn status(&self) -> Option<u16>;
}

/// Whether repeating a call can change marketplace state twice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Read,
    Write,
}

impl CallKind {
    fn allows(&self, decision: RetryDecision, status: Option<u16>) -> bool {
        match (self, decision) {
            (_, RetryDecision::NoRetry) => false,
            (CallKind::Read, _) => true,
            (CallKind::Write, _) => status == Some(429),
        }
    }
}

/// Retry policy for marketplace calls
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Extra attempts after the first; 0 disables retries
    pub max_retries: u32,

    /// Delay schedule between attempts
    pub backoff: BackoffConfig,

    /// Longest `Retry-After` hint honored
    pub max_retry_after_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: BackoffConfig::default(),
            max_retry_after_secs: 120,
        }
    }
}

impl RetryConfig {
    /// No retries at all
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    /// Delay before retry number `retry` (1-based)
    pub fn delay_for(&self, retry: u32, decision: RetryDecision) -> Duration {
        match decision {
            RetryDecision::RetryAfter(hint) => {
                hint.min(Duration::from_secs(self.max_retry_after_secs))
            }
            _ => self.backoff.backoff_for(retry),
        }
    }
}

/// Run `call` until it succeeds, fails permanently, or runs out of retries
///
/// Returns the last error when every attempt failed.
pub async fn with_retry<F, Fut, T, E>(
    config: &RetryConfig,
    clock: &dyn Clock,
    category: ApiCategory,
    kind: CallKind,
    mut call: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: RetryableError + std::fmt::Display,
{
    let mut retries = 0;
    loop {
        let err = match call().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        let decision = err.retry_decision();
        if !kind.allows(decision, err.status()) {
            debug!(category = %category, ?kind, error = %err, "Marketplace call not retried");
            return Err(err);
        }
        if retries >= config.max_retries {
            warn!(
                category = %category,
                attempts = retries + 1,
                error = %err,
                "Marketplace call still failing, giving up"
            );
            return Err(err);
        }

        retries += 1;
        let delay = config.delay_for(retries, decision);
        warn!(
            category = %category,
            retry = retries,
            max_retries = config.max_retries,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "Retrying marketplace call"
        );
        clock.sleep(delay).await;
    }
}

/// Marketplace decorator applying [`RetryConfig`] to every call
pub struct RetryingMarketplace {
    inner: SharedMarketplace,
    config: RetryConfig,
    clock: SharedClock,
}

impl std::fmt::Debug for RetryingMarketplace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryingMarketplace")
            .field("config", &self.config)
            .finish()
    }
}

impl RetryingMarketplace {
    pub fn new(inner: SharedMarketplace, config: RetryConfig, clock: SharedClock) -> Self {
        Self {
            inner,
            config,
            clock,
        }
    }

    async fn call<T, F, Fut>(&self, category: ApiCategory, kind: CallKind, call: F) -> crate::Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = crate::Result<T>>,
    {
        with_retry(&self.config, self.clock.as_ref(), category, kind, call).await
    }
}

#[async_trait]
impl Marketplace for RetryingMarketplace {
    async fn search(&self, query: &SearchQuery) -> crate::Result<Vec<Listing>> {
        self.call(ApiCategory::Search, CallKind::Read, || self.inner.search(query))
            .await
    }

    async fn get_item(&self, id: &ListingId) -> crate::Result<Option<Listing>> {
        self.call(ApiCategory::Item, CallKind::Read, || self.inner.get_item(id))
            .await
    }

    async fn place_bid(&self, id: &ListingId, amount: Money) -> crate::Result<BidResult> {
        self.call(ApiCategory::Bid, CallKind::Write, || {
            self.inner.place_bid(id, amount)
        })
        .await
    }

    async fn submit_offer(&self, id: &ListingId, amount: Money) -> crate::Result<OfferResult> {
        self.call(ApiCategory::Offer, CallKind::Write, || {
            self.inner.submit_offer(id, amount)
        })
        .await
    }

    async fn respond_to_counter_offer(
        &self,
        offer_id: &str,
        accept: bool,
        amount: Option<Money>,
    ) -> crate::Result<OfferResult> {
        self.call(ApiCategory::Offer, CallKind::Write, || {
            self.inner.respond_to_counter_offer(offer_id, accept, amount)
        })
        .await
    }

    async fn initiate_checkout(&self, request: &CheckoutRequest) -> crate::Result<CheckoutSession> {
        self.call(ApiCategory::Checkout, CallKind::Write, || {
            self.inner.initiate_checkout(request)
        })
        .await
    }

    async fn place_order(&self, session_id: &str) -> crate::Result<Order> {
        self.call(ApiCategory::Order, CallKind::Write, || {
            self.inner.place_order(session_id)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::marketplace::{MarketOp, SimulatedMarketplace};
    use crate::BidSwarmError;
    use chrono::{TimeZone, Utc};
    use std::sync::Arc;

    fn t0() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 1, 9, 0, 0).unwrap()
    }

    fn fixed_backoff() -> RetryConfig {
        RetryConfig::default().with_backoff(BackoffConfig {
            base_ms: 1_000,
            max_ms: 8_000,
            jitter: 0.0,
        })
    }

    fn setup() -> (ManualClock, Arc<SimulatedMarketplace>, RetryingMarketplace) {
        let clock = ManualClock::new(t0());
        let shared: SharedClock = Arc::new(clock.clone());
        let sim = Arc::new(SimulatedMarketplace::new(shared.clone()));
        let market = RetryingMarketplace::new(sim.clone(), fixed_backoff(), shared);
        (clock, sim, market)
    }

    #[test]
    fn test_delays_follow_backoff_and_cap_retry_after() {
        let config = fixed_backoff();
        assert_eq!(config.delay_for(1, RetryDecision::Retry), Duration::from_secs(1));
        assert_eq!(config.delay_for(3, RetryDecision::Retry), Duration::from_secs(4));
        assert_eq!(config.delay_for(6, RetryDecision::Retry), Duration::from_secs(8));
        assert_eq!(
            config.delay_for(1, RetryDecision::RetryAfter(Duration::from_secs(600))),
            Duration::from_secs(120)
        );
    }

    #[tokio::test]
    async fn test_search_recovers_from_throttle_and_outage() {
        let (clock, sim, market) = setup();
        sim.fail_next(MarketOp::Search, 429, 1);
        sim.fail_next(MarketOp::Search, 502, 1);

        let listings = market.search(&SearchQuery::default()).await.unwrap();

        assert!(listings.is_empty());
        assert_eq!(sim.calls(MarketOp::Search), 3);
        // 1s then 2s of virtual backoff
        assert_eq!(clock.now(), t0() + chrono::Duration::seconds(3));
    }

    #[tokio::test]
    async fn test_bid_is_not_repeated_after_server_error() {
        let (_, sim, market) = setup();
        sim.fail_next(MarketOp::PlaceBid, 500, 1);

        let result = market
            .place_bid(&ListingId::new("lamp-1"), Money::from_dollars(10.0))
            .await;

        assert!(matches!(result, Err(BidSwarmError::ExternalApi { status: 500, .. })));
        assert_eq!(sim.calls(MarketOp::PlaceBid), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let (_, sim, market) = setup();
        sim.fail_next(MarketOp::GetItem, 503, 10);

        let result = market.get_item(&ListingId::new("lamp-1")).await;

        assert!(result.is_err());
        assert_eq!(sim.calls(MarketOp::GetItem), 4);
    }

    #[tokio::test]
    async fn test_client_errors_fail_fast() {
        let (_, sim, market) = setup();
        sim.fail_next(MarketOp::Search, 400, 1);

        assert!(market.search(&SearchQuery::default()).await.is_err());
        assert_eq!(sim.calls(MarketOp::Search), 1);
    }
}
