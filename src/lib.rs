//! BidSwarm - Budgeted agent swarms for marketplace bidding
//!
//! A swarm is a team of autonomous agents competing for purchases on an
//! external marketplace under one fixed budget. Each agent runs a bidding
//! strategy on a periodic cycle; the swarm shares a budget ledger that never
//! lets agents overspend, and a rate limiter that keeps the whole team inside
//! the marketplace's API quotas.
//!
//! # Architecture
//!
//! - **swarm**: Lifecycle controller, agents, per-swarm scheduler, lifecycle bus
//! - **budget**: Allocation and reservation ledger
//! - **strategy**: Sniper, early-aggressive, negotiator, hybrid and passive decisions
//! - **ratelimit**: Per-category sliding-window quotas with backoff
//! - **events**: Append-only event/observation log and post-run analytics
//! - **marketplace**: Marketplace trait, simulated marketplace, retry decorator
//! - **storage**: Persistence (SQLite, in-memory, JSONL export)
//! - **config**: YAML configuration and validation
//! - **command_surface**: JSON commands over a controller

// Core modules
pub mod clock;
pub mod config;
pub mod error;
pub mod ids;
pub mod money;

// Components
pub mod budget;
pub mod command_surface;
pub mod events;
pub mod marketplace;
pub mod ratelimit;
pub mod storage;
pub mod strategy;
pub mod swarm;

// Infrastructure
pub mod logging;
pub mod metrics;

// Re-exports
pub use error::{BidSwarmError, Result};
