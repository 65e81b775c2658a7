//! Sliding window rate limiter with per-category backoff

use crate::clock::{add_duration, duration_between, SharedClock};
use crate::{BidSwarmError, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::time::Duration;
use tracing::{debug, trace, warn};

const MINUTE: Duration = Duration::from_secs(60);
const DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Marketplace API category, each with its own quota
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiCategory {
    Search,
    Item,
    Bid,
    Offer,
    Checkout,
    Order,
}

impl ApiCategory {
    pub const ALL: [ApiCategory; 6] = [
        ApiCategory::Search,
        ApiCategory::Item,
        ApiCategory::Bid,
        ApiCategory::Offer,
        ApiCategory::Checkout,
        ApiCategory::Order,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Search => "search",
            Self::Item => "item",
            Self::Bid => "bid",
            Self::Offer => "offer",
            Self::Checkout => "checkout",
            Self::Order => "order",
        }
    }
}

impl fmt::Display for ApiCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Admission quota for one category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quota {
    pub per_minute: u32,
    pub per_day: u32,
}

impl Quota {
    pub const fn new(per_minute: u32, per_day: u32) -> Self {
        Self {
            per_minute,
            per_day,
        }
    }
}

/// Backoff applied after retryable failures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// Base backoff in milliseconds
    #[serde(default = "default_base_ms")]
    pub base_ms: u64,

    /// Upper bound in milliseconds
    #[serde(default = "default_max_ms")]
    pub max_ms: u64,

    /// Symmetric jitter ratio (0.1 = ±10%)
    #[serde(default = "default_jitter")]
    pub jitter: f64,
}

fn default_base_ms() -> u64 {
    1_000
}

fn default_max_ms() -> u64 {
    300_000
}

fn default_jitter() -> f64 {
    0.1
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_ms: default_base_ms(),
            max_ms: default_max_ms(),
            jitter: default_jitter(),
        }
    }
}

impl BackoffConfig {
    /// Backoff for the n-th consecutive failure (n >= 1): `min(max, base * 2^(n-1))` ± jitter
    pub fn backoff_for(&self, consecutive_failures: u32) -> Duration {
        let exponent = consecutive_failures.saturating_sub(1).min(32) as i32;
        let raw = self.base_ms as f64 * 2f64.powi(exponent);
        let capped = raw.min(self.max_ms as f64);

        let jittered = if self.jitter > 0.0 {
            let factor = rand::thread_rng().gen_range(-self.jitter..=self.jitter);
            capped * (1.0 + factor)
        } else {
            capped
        };

        Duration::from_millis(jittered.max(1.0).round() as u64)
    }
}

/// Rate limiter configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Per-category quotas; categories not listed use `default_quota`
    #[serde(default = "default_quotas")]
    pub quotas: HashMap<ApiCategory, Quota>,

    #[serde(default = "default_quota")]
    pub default_quota: Quota,

    #[serde(default)]
    pub backoff: BackoffConfig,
}

fn default_quota() -> Quota {
    Quota::new(30, 5_000)
}

fn default_quotas() -> HashMap<ApiCategory, Quota> {
    HashMap::from([
        (ApiCategory::Search, Quota::new(30, 5_000)),
        (ApiCategory::Item, Quota::new(60, 5_000)),
        (ApiCategory::Bid, Quota::new(10, 1_000)),
        (ApiCategory::Offer, Quota::new(10, 500)),
        (ApiCategory::Checkout, Quota::new(5, 200)),
        (ApiCategory::Order, Quota::new(5, 200)),
    ])
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            quotas: default_quotas(),
            default_quota: default_quota(),
            backoff: BackoffConfig::default(),
        }
    }
}

impl RateLimitConfig {
    /// Same quota for every category
    pub fn uniform(quota: Quota) -> Self {
        Self {
            quotas: ApiCategory::ALL.iter().map(|c| (*c, quota)).collect(),
            default_quota: quota,
            backoff: BackoffConfig::default(),
        }
    }

    /// Override one category's quota
    pub fn with_quota(mut self, category: ApiCategory, quota: Quota) -> Self {
        self.quotas.insert(category, quota);
        self
    }

    /// Set the backoff policy
    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn quota(&self, category: ApiCategory) -> Quota {
        self.quotas
            .get(&category)
            .copied()
            .unwrap_or(self.default_quota)
    }
}

/// Point-in-time view of one category's limiter state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateLimiterState {
    pub category: ApiCategory,
    /// Tokens left in the rolling minute
    pub minute_tokens: u32,
    /// Oldest admission still inside the minute window
    pub minute_window_start: Option<DateTime<Utc>>,
    /// Tokens left in the rolling day
    pub day_tokens: u32,
    /// Oldest admission still inside the day window
    pub day_window_start: Option<DateTime<Utc>>,
    pub backoff_until: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
}

/// Admission history for one category
#[derive(Debug, Default)]
struct CategoryState {
    minute: VecDeque<DateTime<Utc>>,
    day: VecDeque<DateTime<Utc>>,
    backoff_until: Option<DateTime<Utc>>,
    consecutive_failures: u32,
}

impl CategoryState {
    /// Drop admissions that left their windows
    fn prune(&mut self, now: DateTime<Utc>) {
        while let Some(front) = self.minute.front() {
            if duration_between(*front, now) >= MINUTE {
                self.minute.pop_front();
            } else {
                break;
            }
        }
        while let Some(front) = self.day.front() {
            if duration_between(*front, now) >= DAY {
                self.day.pop_front();
            } else {
                break;
            }
        }
        if matches!(self.backoff_until, Some(until) if until <= now) {
            self.backoff_until = None;
        }
    }

    /// Time until this category admits a request (zero if it can now)
    fn required_wait(&self, quota: Quota, now: DateTime<Utc>) -> Duration {
        let mut wait = Duration::ZERO;

        if let Some(until) = self.backoff_until {
            wait = wait.max(duration_between(now, until));
        }
        if self.minute.len() as u32 >= quota.per_minute {
            let oldest = self.minute.front().copied().unwrap_or(now);
            wait = wait.max(MINUTE.saturating_sub(duration_between(oldest, now)));
        }
        if self.day.len() as u32 >= quota.per_day {
            let oldest = self.day.front().copied().unwrap_or(now);
            wait = wait.max(DAY.saturating_sub(duration_between(oldest, now)));
        }

        // A full window with an empty log (zero quota) never opens
        if quota.per_minute == 0 || quota.per_day == 0 {
            wait = wait.max(DAY);
        }

        wait
    }
}

/// Shared rate limiter keyed by API category
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    clock: SharedClock,
    states: Mutex<HashMap<ApiCategory, CategoryState>>,
}

impl RateLimiter {
    /// Create a new rate limiter
    pub fn new(config: RateLimitConfig, clock: SharedClock) -> Self {
        Self {
            config,
            clock,
            states: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Check admission without consuming a token
    pub fn can_proceed(&self, category: ApiCategory) -> bool {
        let now = self.clock.now();
        let quota = self.config.quota(category);
        let mut states = self.states.lock();
        let state = states.entry(category).or_default();
        state.prune(now);
        state.required_wait(quota, now).is_zero()
    }

    /// Consume a token if admitted now; otherwise report the wait
    ///
    /// # Returns
    /// `Duration::ZERO` when the request was admitted (a token is consumed),
    /// or the time until the category would admit (nothing is consumed)
    pub fn acquire(&self, category: ApiCategory) -> Duration {
        let now = self.clock.now();
        let quota = self.config.quota(category);
        let mut states = self.states.lock();
        let state = states.entry(category).or_default();
        state.prune(now);

        let wait = state.required_wait(quota, now);
        if wait.is_zero() {
            state.minute.push_back(now);
            state.day.push_back(now);
            trace!(
                category = %category,
                minute_used = state.minute.len(),
                day_used = state.day.len(),
                "Request admitted"
            );
        } else {
            trace!(category = %category, wait_ms = wait.as_millis() as u64, "Request must wait");
        }
        wait
    }

    /// Suspend until admitted, or fail when the required wait exceeds `max_wait`
    ///
    /// # Returns
    /// Total time spent waiting
    pub async fn acquire_with_wait(
        &self,
        category: ApiCategory,
        max_wait: Duration,
    ) -> Result<Duration> {
        let mut waited = Duration::ZERO;

        loop {
            let wait = self.acquire(category);
            if wait.is_zero() {
                if !waited.is_zero() {
                    crate::metrics::record_rate_limit_wait(category, waited.as_secs_f64());
                }
                return Ok(waited);
            }

            let tolerance = max_wait.saturating_sub(waited);
            if wait > tolerance {
                debug!(
                    category = %category,
                    wait_ms = wait.as_millis() as u64,
                    tolerance_ms = tolerance.as_millis() as u64,
                    "Rate limit wait exceeds tolerance"
                );
                return Err(BidSwarmError::RateLimited { category, wait });
            }

            self.clock.sleep(wait).await;
            waited += wait;
        }
    }

    /// Reset failure tracking and clear any backoff
    pub fn record_success(&self, category: ApiCategory) {
        let mut states = self.states.lock();
        let state = states.entry(category).or_default();
        state.consecutive_failures = 0;
        state.backoff_until = None;
    }

    /// Register a failed call; 429 and 5xx trip the backoff, other statuses do not
    pub fn record_failure(&self, category: ApiCategory, status: u16) {
        if !(status == 429 || (500..=599).contains(&status)) {
            debug!(category = %category, status, "Client error does not trigger backoff");
            return;
        }

        let now = self.clock.now();
        let mut states = self.states.lock();
        let state = states.entry(category).or_default();
        state.consecutive_failures += 1;

        let backoff = self.config.backoff.backoff_for(state.consecutive_failures);
        state.backoff_until = Some(add_duration(now, backoff));

        warn!(
            category = %category,
            status,
            consecutive_failures = state.consecutive_failures,
            backoff_ms = backoff.as_millis() as u64,
            "Marketplace backoff engaged"
        );
    }

    /// Snapshot of a category's windows and backoff
    pub fn state(&self, category: ApiCategory) -> RateLimiterState {
        let now = self.clock.now();
        let quota = self.config.quota(category);
        let mut states = self.states.lock();
        let state = states.entry(category).or_default();
        state.prune(now);

        RateLimiterState {
            category,
            minute_tokens: quota.per_minute.saturating_sub(state.minute.len() as u32),
            minute_window_start: state.minute.front().copied(),
            day_tokens: quota.per_day.saturating_sub(state.day.len() as u32),
            day_window_start: state.day.front().copied(),
            backoff_until: state.backoff_until,
            consecutive_failures: state.consecutive_failures,
        }
    }
}
