//! Budget allocator with reserve/commit/release semantics

use crate::ids::AgentId;
use crate::money::Money;
use crate::strategy::StrategyKind;
use crate::swarm::SwarmBudget;
use crate::{BidSwarmError, Result};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// How the allocatable pool is split across agents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationMethod {
    /// Same share for every agent
    #[default]
    Equal,

    /// Share proportional to the request weight (or the strategy's default weight)
    Weighted,
}

/// One agent's claim on the pool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationRequest {
    pub agent_id: AgentId,
    pub strategy: StrategyKind,
    /// Explicit weight for WEIGHTED allocation
    pub weight: Option<f64>,
}

impl AllocationRequest {
    pub fn new(agent_id: AgentId, strategy: StrategyKind) -> Self {
        Self {
            agent_id,
            strategy,
            weight: None,
        }
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = Some(weight);
        self
    }
}

/// Per-agent ledger view
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetAllocation {
    pub agent_id: AgentId,
    pub allocated: Money,
    pub reserved: Money,
    pub spent: Money,
    pub available: Money,
}

impl BudgetAllocation {
    fn new(agent_id: AgentId, allocated: Money) -> Self {
        Self {
            agent_id,
            allocated,
            reserved: Money::ZERO,
            spent: Money::ZERO,
            available: allocated,
        }
    }

    /// `allocated == reserved + spent + available`
    pub fn is_balanced(&self) -> bool {
        self.reserved + self.spent + self.available == self.allocated
    }
}

/// Swarm-level ledger summary
#[derive(Debug, Clone, Serialize)]
pub struct BudgetStatus {
    pub total: Money,
    pub reserve: Money,
    pub allocatable: Money,
    pub allocated: Money,
    pub reserved: Money,
    pub spent: Money,
    pub available: Money,
    pub agents: Vec<BudgetAllocation>,
}

impl BudgetStatus {
    /// Fraction of the allocatable pool already spent
    pub fn utilization(&self) -> f64 {
        if self.allocatable.is_zero() {
            0.0
        } else {
            self.spent.as_dollars() / self.allocatable.as_dollars()
        }
    }
}

/// Ledger entry plus outstanding reservations
#[derive(Debug)]
struct Ledger {
    allocation: BudgetAllocation,
    reservations: Vec<Money>,
}

impl Ledger {
    fn take_reservation(&mut self, amount: Money) -> bool {
        match self.reservations.iter().position(|r| *r == amount) {
            Some(index) => {
                self.reservations.swap_remove(index);
                true
            }
            None => false,
        }
    }
}

/// Budget allocator for one swarm
#[derive(Debug)]
pub struct BudgetAllocator {
    budget: SwarmBudget,
    ledgers: RwLock<HashMap<AgentId, Arc<Mutex<Ledger>>>>,
}

impl BudgetAllocator {
    /// Create an allocator with no agents yet
    pub fn new(budget: SwarmBudget) -> Self {
        Self {
            budget,
            ledgers: RwLock::new(HashMap::new()),
        }
    }

    /// Pool left after holding back the reserve
    pub fn allocatable(&self) -> Money {
        self.budget.allocatable()
    }

    /// Split the allocatable pool across the requested agents
    ///
    /// Replaces any previous allocations. Cents that do not divide evenly go
    /// to the agents with the largest remainders, so the pool is used exactly.
    pub fn initialize_allocations(
        &self,
        requests: &[AllocationRequest],
        method: AllocationMethod,
    ) -> Result<Vec<BudgetAllocation>> {
        if requests.is_empty() {
            return Err(BidSwarmError::Configuration(vec![
                "allocations: at least one agent is required".to_string(),
            ]));
        }

        let weights: Vec<f64> = match method {
            AllocationMethod::Equal => vec![1.0; requests.len()],
            AllocationMethod::Weighted => requests
                .iter()
                .map(|r| r.weight.unwrap_or_else(|| r.strategy.default_weight()))
                .collect(),
        };

        if let Some(bad) = weights.iter().find(|w| !w.is_finite() || **w <= 0.0) {
            return Err(BidSwarmError::Configuration(vec![format!(
                "allocations: weight must be positive, got {}",
                bad
            )]));
        }

        let shares = split_cents(self.allocatable().cents(), &weights);

        let allocations: Vec<BudgetAllocation> = requests
            .iter()
            .zip(shares)
            .map(|(r, cents)| BudgetAllocation::new(r.agent_id.clone(), Money::from_cents(cents)))
            .collect();

        let mut ledgers = self.ledgers.write();
        ledgers.clear();
        for allocation in &allocations {
            ledgers.insert(
                allocation.agent_id.clone(),
                Arc::new(Mutex::new(Ledger {
                    allocation: allocation.clone(),
                    reservations: Vec::new(),
                })),
            );
        }

        info!(
            agents = allocations.len(),
            method = ?method,
            pool = %self.allocatable(),
            "Initialized budget allocations"
        );

        Ok(allocations)
    }

    fn ledger(&self, agent_id: &AgentId) -> Result<Arc<Mutex<Ledger>>> {
        self.ledgers
            .read()
            .get(agent_id)
            .cloned()
            .ok_or_else(|| BidSwarmError::AgentNotFound(agent_id.to_string()))
    }

    /// Whether the agent has at least `amount` available
    pub fn can_afford(&self, agent_id: &AgentId, amount: Money) -> bool {
        match self.ledger(agent_id) {
            Ok(ledger) => ledger.lock().allocation.available >= amount,
            Err(_) => false,
        }
    }

    /// Move `amount` from available to reserved
    ///
    /// # Errors
    /// `InsufficientBudget` (no side effect) when available is short,
    /// `AgentNotFound` for unknown agents
    pub fn try_reserve(&self, agent_id: &AgentId, amount: Money) -> Result<()> {
        let ledger = self.ledger(agent_id)?;
        let mut ledger = ledger.lock();

        let available = ledger.allocation.available;
        match available.checked_sub(amount) {
            Some(rest) if !amount.is_zero() => {
                ledger.allocation.available = rest;
                ledger.allocation.reserved += amount;
                ledger.reservations.push(amount);
                debug!(agent_id = %agent_id, amount = %amount, available = %rest, "Reserved funds");
                Ok(())
            }
            _ => {
                crate::metrics::record_reservation_denied();
                Err(BidSwarmError::InsufficientBudget {
                    agent_id: agent_id.to_string(),
                    requested: amount.to_string(),
                    available: available.to_string(),
                })
            }
        }
    }

    /// Reserve funds, reporting only whether it succeeded
    pub fn reserve_funds(&self, agent_id: &AgentId, amount: Money) -> bool {
        self.try_reserve(agent_id, amount).is_ok()
    }

    /// Return a reservation of exactly `amount` to available
    ///
    /// # Returns
    /// false when no matching reservation is outstanding (nothing changes)
    pub fn release_funds(&self, agent_id: &AgentId, amount: Money) -> bool {
        let Ok(ledger) = self.ledger(agent_id) else {
            return false;
        };
        let mut ledger = ledger.lock();

        if !ledger.take_reservation(amount) {
            warn!(agent_id = %agent_id, amount = %amount, "No matching reservation to release");
            return false;
        }
        ledger.allocation.reserved -= amount;
        ledger.allocation.available += amount;
        debug!(agent_id = %agent_id, amount = %amount, "Released reservation");
        true
    }

    /// Resize an outstanding reservation from `current` to `target`
    ///
    /// Growing draws the difference from available; shrinking returns it.
    /// Either way the hold on `current` is never dropped in between.
    ///
    /// # Errors
    /// `InsufficientBudget` (no side effect) when the growth is not covered,
    /// `Other` when no reservation of `current` is outstanding
    pub fn adjust_reservation(&self, agent_id: &AgentId, current: Money, target: Money) -> Result<()> {
        let ledger = self.ledger(agent_id)?;
        let mut ledger = ledger.lock();

        let Some(index) = ledger.reservations.iter().position(|r| *r == current) else {
            return Err(BidSwarmError::Other(format!(
                "no reservation of {} outstanding for {}",
                current, agent_id
            )));
        };
        if target.is_zero() {
            return Err(BidSwarmError::Other("cannot resize a reservation to zero".into()));
        }

        if target > current {
            let extra = target - current;
            let available = ledger.allocation.available;
            let Some(rest) = available.checked_sub(extra) else {
                crate::metrics::record_reservation_denied();
                return Err(BidSwarmError::InsufficientBudget {
                    agent_id: agent_id.to_string(),
                    requested: extra.to_string(),
                    available: available.to_string(),
                });
            };
            ledger.allocation.available = rest;
            ledger.allocation.reserved += extra;
        } else {
            let freed = current - target;
            ledger.allocation.reserved -= freed;
            ledger.allocation.available += freed;
        }
        ledger.reservations[index] = target;
        debug!(agent_id = %agent_id, from = %current, to = %target, "Adjusted reservation");
        Ok(())
    }

    /// Resolve a reservation of `amount`: spent on success, released otherwise
    ///
    /// A second call for the same reservation finds nothing outstanding and
    /// returns false without touching the ledger.
    pub fn record_purchase(&self, agent_id: &AgentId, amount: Money, success: bool) -> bool {
        if success {
            self.settle_purchase(agent_id, amount, amount)
        } else {
            self.release_funds(agent_id, amount)
        }
    }

    /// Commit a reservation of `reserved` at final price `paid` (≤ reserved)
    ///
    /// The difference goes back to available in the same critical section.
    pub fn settle_purchase(&self, agent_id: &AgentId, reserved: Money, paid: Money) -> bool {
        let Ok(ledger) = self.ledger(agent_id) else {
            return false;
        };
        let mut ledger = ledger.lock();

        if !ledger.take_reservation(reserved) {
            warn!(
                agent_id = %agent_id,
                amount = %reserved,
                "Purchase already recorded or never reserved"
            );
            return false;
        }

        let paid = paid.min(reserved);
        ledger.allocation.reserved -= reserved;
        ledger.allocation.spent += paid;
        ledger.allocation.available += reserved - paid;
        info!(agent_id = %agent_id, paid = %paid, "Recorded purchase");
        true
    }

    /// Release every outstanding reservation of an agent
    pub fn release_all(&self, agent_id: &AgentId) -> Money {
        let Ok(ledger) = self.ledger(agent_id) else {
            return Money::ZERO;
        };
        let mut ledger = ledger.lock();

        let released: Money = ledger.reservations.drain(..).sum();
        ledger.allocation.reserved -= released;
        ledger.allocation.available += released;
        released
    }

    /// Best-effort move of available funds between two agents
    ///
    /// Moves `min(amount, from.available)`; outstanding reservations are never
    /// touched. Both ledgers are locked in id order.
    pub fn reallocate(&self, from: &AgentId, to: &AgentId, amount: Money) -> Result<Money> {
        if from == to {
            return Ok(Money::ZERO);
        }
        let source = self.ledger(from)?;
        let target = self.ledger(to)?;

        let (mut source_guard, mut target_guard) = if from < to {
            let s = source.lock();
            let t = target.lock();
            (s, t)
        } else {
            let t = target.lock();
            let s = source.lock();
            (s, t)
        };

        let moved = amount.min(source_guard.allocation.available);
        source_guard.allocation.available -= moved;
        source_guard.allocation.allocated -= moved;
        target_guard.allocation.available += moved;
        target_guard.allocation.allocated += moved;

        info!(from = %from, to = %to, moved = %moved, "Reallocated budget");
        Ok(moved)
    }

    /// Snapshot of one agent's ledger
    pub fn get_allocation(&self, agent_id: &AgentId) -> Option<BudgetAllocation> {
        self.ledger(agent_id)
            .ok()
            .map(|ledger| ledger.lock().allocation.clone())
    }

    /// Swarm-wide totals and per-agent ledgers (sorted by agent id)
    pub fn get_swarm_status(&self) -> BudgetStatus {
        let mut agents: Vec<BudgetAllocation> = self
            .ledgers
            .read()
            .values()
            .map(|ledger| ledger.lock().allocation.clone())
            .collect();
        agents.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));

        BudgetStatus {
            total: self.budget.total,
            reserve: self.budget.reserve_amount(),
            allocatable: self.allocatable(),
            allocated: agents.iter().map(|a| a.allocated).sum(),
            reserved: agents.iter().map(|a| a.reserved).sum(),
            spent: agents.iter().map(|a| a.spent).sum(),
            available: agents.iter().map(|a| a.available).sum(),
            agents,
        }
    }
}

/// Split `pool` cents proportionally to `weights` using largest remainders
fn split_cents(pool: u64, weights: &[f64]) -> Vec<u64> {
    let total: f64 = weights.iter().sum();
    let exact: Vec<f64> = weights.iter().map(|w| pool as f64 * w / total).collect();
    let mut shares: Vec<u64> = exact.iter().map(|e| e.floor() as u64).collect();

    // Float error can push the floors past the pool; trim from the largest share
    while shares.iter().sum::<u64>() > pool {
        if let Some(max) = shares.iter_mut().max() {
            *max -= 1;
        }
    }

    let mut order: Vec<usize> = (0..weights.len()).collect();
    order.sort_by(|a, b| {
        let ra = exact[*a] - exact[*a].floor();
        let rb = exact[*b] - exact[*b].floor();
        rb.partial_cmp(&ra)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.cmp(b))
    });

    let mut leftover = pool - shares.iter().sum::<u64>();
    for index in order.iter().cycle() {
        if leftover == 0 {
            break;
        }
        shares[*index] += 1;
        leftover -= 1;
    }

    shares
}
