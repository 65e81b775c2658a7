//! Error types for bidswarm
//!
//! Defines one error enum covering every failure mode of the orchestration core.
//! Uses thiserror for ergonomic error handling.

use crate::ratelimit::ApiCategory;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for bidswarm operations
pub type Result<T> = std::result::Result<T, BidSwarmError>;

/// Comprehensive error type for bidswarm operations
#[derive(Error, Debug)]
pub enum BidSwarmError {
    /// Invalid swarm or controller parameters (every violation is listed)
    #[error("Configuration error: {}", .0.join("; "))]
    Configuration(Vec<String>),

    /// The swarm's time window has already closed
    #[error("Swarm window expired at {0}")]
    WindowExpired(chrono::DateTime<chrono::Utc>),

    /// A reservation was denied; nothing was changed
    #[error("Insufficient budget for agent {agent_id}: requested {requested}, available {available}")]
    InsufficientBudget {
        agent_id: String,
        requested: String,
        available: String,
    },

    /// Quota wait exceeds what the caller is willing to tolerate
    #[error("Rate limited on {category}: required wait {wait:?} exceeds tolerance")]
    RateLimited { category: ApiCategory, wait: Duration },

    /// Marketplace call failed with an HTTP-like status
    #[error("Marketplace API error ({status}): {message}")]
    ExternalApi { status: u16, message: String },

    /// Persistence failures (logged, never abort the decision loop)
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Swarm id unknown to this controller
    #[error("Swarm not found: {0}")]
    SwarmNotFound(String),

    /// Agent id unknown within the swarm
    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    /// Lifecycle transition not allowed from the current state
    #[error("Invalid transition for swarm {swarm_id}: {from} -> {to}")]
    InvalidTransition {
        swarm_id: String,
        from: String,
        to: String,
    },

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// SQLite database errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Other errors
    #[error("{0}")]
    Other(String),
}

impl BidSwarmError {
    /// Build an external API error from a status code and message
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::ExternalApi {
            status,
            message: message.into(),
        }
    }

    /// HTTP-like status carried by the error, if any
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::ExternalApi { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether the client layer may retry this error (429 and 5xx)
    pub fn is_retryable(&self) -> bool {
        matches!(self.status_code(), Some(429) | Some(500..=599))
    }

    /// Short machine-friendly label used in events and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::WindowExpired(_) => "window_expired",
            Self::InsufficientBudget { .. } => "insufficient_budget",
            Self::RateLimited { .. } => "rate_limited",
            Self::ExternalApi { .. } => "external_api",
            Self::Persistence(_) => "persistence",
            Self::SwarmNotFound(_) => "swarm_not_found",
            Self::AgentNotFound(_) => "agent_not_found",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::Io(_) => "io",
            Self::Json(_) => "json",
            Self::Yaml(_) => "yaml",
            Self::Database(_) => "database",
            Self::Other(_) => "other",
        }
    }
}

impl crate::marketplace::retry::RetryableError for BidSwarmError {
    fn retry_decision(&self) -> crate::marketplace::retry::RetryDecision {
        use crate::marketplace::retry::RetryDecision;

        match self {
            BidSwarmError::ExternalApi { status: 429, message } => {
                match extract_retry_after(message) {
                    Some(secs) => RetryDecision::RetryAfter(Duration::from_secs(secs)),
                    None => RetryDecision::Retry,
                }
            }
            BidSwarmError::ExternalApi { status, .. } if (500..=599).contains(status) => {
                RetryDecision::Retry
            }
            _ => RetryDecision::NoRetry,
        }
    }

    fn status(&self) -> Option<u16> {
        self.status_code()
    }
}

/// Extract retry-after seconds from an error message
fn extract_retry_after(msg: &str) -> Option<u64> {
    // Look for patterns like "retry after 60 seconds" or "retry after 60"
    let msg_lower = msg.to_lowercase();
    let pos = msg_lower.find("retry after")?;
    let num_str: String = msg_lower[pos + 11..]
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    num_str.parse().ok()
}
