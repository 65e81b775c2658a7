//! Swarm lifecycle and agent orchestration
//!
//! A swarm is one budgeted campaign: a set of agents, each bound to a
//! bidding strategy and a share of the budget, cycling against the
//! marketplace until the swarm is terminated or its time window closes.
//!
//! # Overview
//!
//! - **Lifecycle**: CREATED → RUNNING ⇄ PAUSED → TERMINATED (terminal from
//!   any live state)
//! - **Scheduling**: one tick heap per swarm; a driver task dispatches due
//!   agents as independent tokio tasks, never two cycles of the same agent
//! - **Cycles**: settle → search → decide → act (combat) or observe
//!   (reconnaissance)
//! - **Notifications**: typed [`LifecycleEvent`]s on a broadcast bus
//!
//! # Example
//!
//! ```ignore
//! use bidswarm::swarm::{ControllerConfig, SwarmController, SwarmOptions, SwarmBudget};
//!
//! let controller = SwarmController::new(ControllerConfig::default(), marketplace, clock);
//!
//! let options = SwarmOptions::new("vintage lamps", SwarmBudget::new(Money::from_dollars(500.0)))
//!     .with_agent_count(5)
//!     .with_duration_minutes(120);
//! let swarm_id = controller.create_swarm(options)?;
//! controller.start_swarm(&swarm_id)?;
//!
//! let status = controller.get_status(&swarm_id)?;
//! println!("{} spent", status.swarm.counters.total_spent);
//!
//! controller.terminate_swarm(&swarm_id, "done")?;
//! ```

mod agent;
mod bus;
mod controller;
mod cycle;
mod scheduler;
mod types;

pub use agent::{ActiveBid, Agent, AgentStatus, AgentStatusReport, EngagementKind};
pub use bus::{spawn_store_subscriber, LifecycleBus, LifecycleEvent, DEFAULT_LIFECYCLE_CAPACITY};
pub use controller::{
    ControllerBuilder, ControllerConfig, SwarmController, SwarmStatusReport,
    DEFAULT_CYCLE_INTERVAL_SECS, WINDOW_EXPIRED_REASON,
};
pub use scheduler::TickScheduler;
pub use types::{
    balanced_distribution, Swarm, SwarmBudget, SwarmCounters, SwarmMode, SwarmOptions,
    SwarmStatus, TargetCriteria, TimeWindow,
};
