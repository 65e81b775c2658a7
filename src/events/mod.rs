//! Event and observation log
//!
//! The log is the only source of swarm history. Strategies read it for
//! context (who is already engaged on a listing, what this agent did last),
//! the controller writes every lifecycle step and marketplace action to it,
//! and analytics derive rankings and anomaly reports from it.

pub mod analytics;
mod log;
mod types;

pub use analytics::{
    AnalyticsConfig, Anomaly, AnomalyKind, CostEfficiency, ObservationSummary,
    StrategyPerformance, SwarmInsights,
};
pub use log::EventLog;
pub use types::{
    EventFilter, EventType, Observation, ObservationFilter, ObservationKind, SwarmEvent,
};
