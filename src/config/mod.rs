//! Configuration system
//!
//! Loads ~/.config/bidswarm/config.yaml with support for:
//! - Controller tunables (cycle interval, agent limits, driver)
//! - Strategy tuning for every bidding strategy
//! - Per-category marketplace quotas and backoff
//! - Client retry policy
//! - Storage and logging settings
//!
//! Swarm definitions are separate YAML files deserialized into
//! [`SwarmOptions`](crate::swarm::SwarmOptions) and checked with
//! [`validation::validate_swarm_options`].

mod bidswarm_config;
pub mod validation;

pub use crate::logging::{LogFormat, LoggingConfig};
pub use bidswarm_config::{BidSwarmConfig, StorageConfig};
pub use validation::{
    validate_config, validate_config_result, validate_swarm_options, ValidationError,
};
