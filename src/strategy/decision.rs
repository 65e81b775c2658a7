//! Strategy output

use crate::money::Money;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// What the agent should do with a listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BidAction {
    Bid,
    Offer,
    Watch,
    Skip,
}

impl BidAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bid => "bid",
            Self::Offer => "offer",
            Self::Watch => "watch",
            Self::Skip => "skip",
        }
    }

    /// BID and OFFER commit funds, WATCH and SKIP do not
    pub fn commits_funds(&self) -> bool {
        matches!(self, Self::Bid | Self::Offer)
    }
}

impl fmt::Display for BidAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A strategy's verdict on one listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BiddingDecision {
    pub action: BidAction,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<Money>,

    /// Always within [0, 1]
    pub confidence: f64,

    pub reasoning: String,

    /// Wait this long before acting
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay: Option<Duration>,
}

impl BiddingDecision {
    fn new(action: BidAction, amount: Option<Money>, confidence: f64, reasoning: String) -> Self {
        Self {
            action,
            amount,
            confidence: clamp_confidence(confidence),
            reasoning,
            delay: None,
        }
    }

    pub fn bid(amount: Money, confidence: f64, reasoning: impl Into<String>) -> Self {
        Self::new(BidAction::Bid, Some(amount), confidence, reasoning.into())
    }

    pub fn offer(amount: Money, confidence: f64, reasoning: impl Into<String>) -> Self {
        Self::new(BidAction::Offer, Some(amount), confidence, reasoning.into())
    }

    pub fn watch(confidence: f64, reasoning: impl Into<String>) -> Self {
        Self::new(BidAction::Watch, None, confidence, reasoning.into())
    }

    pub fn skip(reasoning: impl Into<String>) -> Self {
        Self::new(BidAction::Skip, None, 1.0, reasoning.into())
    }

    /// Delay acting; zero delays are dropped
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = (!delay.is_zero()).then_some(delay);
        self
    }

    /// Prefix the reasoning, used when one strategy delegates to another
    pub fn prefixed(mut self, prefix: &str) -> Self {
        self.reasoning = format!("{}: {}", prefix, self.reasoning);
        self
    }

    /// Scale confidence, keeping it in range
    pub fn scaled(mut self, factor: f64) -> Self {
        self.confidence = clamp_confidence(self.confidence * factor);
        self
    }
}

fn clamp_confidence(confidence: f64) -> f64 {
    if confidence.is_nan() {
        0.0
    } else {
        confidence.clamp(0.0, 1.0)
    }
}

/// Negotiator's answer to a seller counter-offer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "response", content = "amount")]
pub enum CounterResponse {
    Accept,
    Counter(Money),
    Decline,
}
