//! Swarm budget ledger
//!
//! Splits a swarm's reserve-adjusted budget across its agents and tracks,
//! per agent, how much is available, provisionally reserved against in-flight
//! bids/offers, and spent.
//!
//! # Invariants
//!
//! - For every agent: `allocated == reserved + spent + available`
//! - Sum of `allocated` never exceeds `total × (1 − reserve%)`
//! - Each reservation is committed or released exactly once
//!
//! Each agent's ledger sits behind its own lock, so two cycles of the same
//! agent serialize on it while different agents proceed in parallel.

mod allocator;

pub use allocator::{
    AllocationMethod, AllocationRequest, BudgetAllocation, BudgetAllocator, BudgetStatus,
};
