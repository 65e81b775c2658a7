//! Structured logging to stderr, filtered by RUST_LOG
//!
//! Swarm code logs with fields rather than formatted strings
//! (`swarm_id`, `agent_id`, `listing_id`, `category`), so a single swarm can
//! be followed with `grep swarm_id=...` in compact output.

use serde::{Deserialize, Serialize};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Output layout of log lines
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One line per event
    #[default]
    Compact,
    /// Multi-line, fields on their own lines
    Pretty,
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,

    /// Tag lines with the tokio worker thread; useful when agents of one
    /// swarm interleave
    #[serde(default)]
    pub thread_ids: bool,
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            thread_ids: false,
        }
    }
}

impl LoggingConfig {
    /// Filter from RUST_LOG, falling back to `level`
    ///
    /// # Example RUST_LOG values
    /// - `RUST_LOG=info` - lifecycle transitions and settlements
    /// - `RUST_LOG=bidswarm=debug` - every strategy decision
    /// - `RUST_LOG=bidswarm::ratelimit=trace` - every admission check
    pub fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.level))
    }
}

/// Install the global subscriber
///
/// # Errors
/// Returns an error if a subscriber is already installed
pub fn init_from(config: &LoggingConfig) -> crate::Result<()> {
    let registry = tracing_subscriber::registry().with(config.env_filter());
    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(config.thread_ids);

    let installed = match config.format {
        LogFormat::Compact => registry.with(layer.compact()).try_init(),
        LogFormat::Pretty => registry.with(layer.pretty()).try_init(),
    };
    installed
        .map_err(|e| crate::BidSwarmError::Other(format!("Failed to initialize tracing: {}", e)))
}

/// Install with defaults ("warn", compact)
pub fn init() -> crate::Result<()> {
    init_from(&LoggingConfig::default())
}

/// For tests; ignores an already installed subscriber
pub fn init_test() {
    let _ = init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_test_is_idempotent() {
        init_test();
        init_test();
        tracing::info!(swarm_id = "s-1", agent_id = "a-1", "structured logging works");
    }

    #[test]
    fn test_config_parses_format() {
        let config: LoggingConfig =
            serde_yaml::from_str("level: debug\nformat: pretty\n").unwrap();
        assert_eq!(config.level, "debug");
        assert_eq!(config.format, LogFormat::Pretty);
        assert!(!config.thread_ids);

        let defaults: LoggingConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(defaults, LoggingConfig::default());
    }
}
