//! Marketplace collaborator boundary
//!
//! The orchestration core only talks to the marketplace through the
//! [`Marketplace`] trait. Errors come back as
//! [`BidSwarmError::ExternalApi`](crate::BidSwarmError::ExternalApi) carrying an
//! HTTP-like status; 429 and 5xx are retryable by the client layer
//! ([`RetryingMarketplace`], which only repeats writes on 429), everything
//! else is terminal.
//!
//! [`SimulatedMarketplace`] is an in-memory implementation used by the CLI dry
//! run and by tests.

pub mod retry;
mod sim;
mod types;

pub use retry::{CallKind, RetryConfig, RetryDecision, RetryableError, RetryingMarketplace};
pub use sim::{MarketOp, OfferPolicy, SimulatedMarketplace};
pub use types::{
    BidResult, BidStatus, CheckoutRequest, CheckoutSession, Listing, OfferResult, OfferStatus,
    Order, SearchQuery,
};

use crate::ids::ListingId;
use crate::money::Money;
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Operations the swarm needs from an external marketplace
#[async_trait]
pub trait Marketplace: Send + Sync {
    /// Listings matching the query, at most `query.limit` when non-zero
    async fn search(&self, query: &SearchQuery) -> Result<Vec<Listing>>;

    /// Current snapshot of a listing, `None` when it no longer exists
    async fn get_item(&self, id: &ListingId) -> Result<Option<Listing>>;

    async fn place_bid(&self, id: &ListingId, amount: Money) -> Result<BidResult>;

    async fn submit_offer(&self, id: &ListingId, amount: Money) -> Result<OfferResult>;

    /// Answer a seller counter: accept it, or decline with an optional new amount
    async fn respond_to_counter_offer(
        &self,
        offer_id: &str,
        accept: bool,
        amount: Option<Money>,
    ) -> Result<OfferResult>;

    async fn initiate_checkout(&self, request: &CheckoutRequest) -> Result<CheckoutSession>;

    async fn place_order(&self, session_id: &str) -> Result<Order>;
}

/// Shared marketplace handle
pub type SharedMarketplace = Arc<dyn Marketplace>;
