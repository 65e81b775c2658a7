//! Marketplace API quota gating
//!
//! One [`RateLimiter`] is shared by every agent of every swarm hosted by a
//! controller. Each API category has a per-minute and a per-day window and an
//! exponential backoff that trips on 429/5xx responses.
//!
//! # Example
//!
//! ```ignore
//! use bidswarm::ratelimit::{ApiCategory, RateLimiter, RateLimitConfig};
//!
//! let limiter = RateLimiter::new(RateLimitConfig::default(), clock);
//! limiter.acquire_with_wait(ApiCategory::Search, Duration::from_secs(5)).await?;
//! let listings = marketplace.search(&query).await;
//! match listings {
//!     Ok(_) => limiter.record_success(ApiCategory::Search),
//!     Err(e) => limiter.record_failure(ApiCategory::Search, e.status_code().unwrap_or(0)),
//! }
//! ```

mod limiter;

pub use limiter::{
    ApiCategory, BackoffConfig, Quota, RateLimitConfig, RateLimiter, RateLimiterState,
};
