//! Swarm controller
//!
//! Hosts any number of swarms. Each swarm owns its budget ledger, agents and
//! tick scheduler; all of them share the controller's rate limiter, event log
//! and lifecycle bus.
//!
//! Lifecycle operations are synchronous and serialize on the swarm's state
//! lock. Running swarms are driven by one tokio task each (see
//! [`ControllerConfig::spawn_driver`]); tests turn the driver off and call
//! [`SwarmController::run_due`] against a manual clock instead.

use super::agent::{Agent, AgentStatus, AgentStatusReport};
use super::bus::{LifecycleBus, LifecycleEvent, DEFAULT_LIFECYCLE_CAPACITY};
use super::cycle::{self, cancellable};
use super::scheduler::TickScheduler;
use super::types::{
    Swarm, SwarmCounters, SwarmMode, SwarmOptions, SwarmStatus, TargetCriteria, TimeWindow,
};
use crate::budget::{AllocationRequest, BudgetAllocator, BudgetStatus};
use crate::clock::{add_duration, duration_between, SharedClock};
use crate::config::validation::validate_swarm_options;
use crate::events::{
    AnalyticsConfig, EventFilter, EventLog, EventType, Observation, ObservationFilter, SwarmEvent,
    SwarmInsights,
};
use crate::ids::{AgentId, SwarmId};
use crate::marketplace::SharedMarketplace;
use crate::metrics;
use crate::money::Money;
use crate::ratelimit::{RateLimitConfig, RateLimiter};
use crate::strategy::{ConcentrationLevel, ConcentrationRisk, Strategy, StrategyTuning};
use crate::{BidSwarmError, Result};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Default seconds between two cycles of the same agent
pub const DEFAULT_CYCLE_INTERVAL_SECS: u64 = 30;

/// Controller tunables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Seconds between two cycles of the same agent
    pub cycle_interval_secs: u64,

    /// Upper bound on agents per swarm
    pub max_agents_per_swarm: usize,

    /// Run a driver task per started swarm
    pub spawn_driver: bool,

    /// Longest the driver sleeps between schedule checks, in milliseconds
    pub driver_tick_ms: u64,

    /// Longest a cycle waits on the rate limiter before giving up
    pub max_rate_limit_wait_secs: u64,

    /// Listings requested per search
    pub search_limit: usize,

    /// Lifecycle bus capacity
    pub lifecycle_capacity: usize,

    pub strategy: StrategyTuning,

    pub analytics: AnalyticsConfig,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            cycle_interval_secs: DEFAULT_CYCLE_INTERVAL_SECS,
            max_agents_per_swarm: 50,
            spawn_driver: true,
            driver_tick_ms: 1000,
            max_rate_limit_wait_secs: 30,
            search_limit: 25,
            lifecycle_capacity: DEFAULT_LIFECYCLE_CAPACITY,
            strategy: StrategyTuning::default(),
            analytics: AnalyticsConfig::default(),
        }
    }
}

impl ControllerConfig {
    pub fn with_cycle_interval_secs(mut self, secs: u64) -> Self {
        self.cycle_interval_secs = secs;
        self
    }

    pub fn with_max_agents(mut self, max: usize) -> Self {
        self.max_agents_per_swarm = max;
        self
    }

    /// Disable the driver task (drive swarms with `run_due`)
    pub fn without_driver(mut self) -> Self {
        self.spawn_driver = false;
        self
    }

    pub fn with_strategy(mut self, strategy: StrategyTuning) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn cycle_interval(&self) -> Duration {
        Duration::from_secs(self.cycle_interval_secs)
    }

    pub fn driver_tick(&self) -> Duration {
        Duration::from_millis(self.driver_tick_ms.max(1))
    }

    pub fn max_rate_limit_wait(&self) -> Duration {
        Duration::from_secs(self.max_rate_limit_wait_secs)
    }
}

/// State shared by every swarm of one controller
pub(super) struct Shared {
    pub config: ControllerConfig,
    pub clock: SharedClock,
    pub marketplace: SharedMarketplace,
    pub limiter: Arc<RateLimiter>,
    pub log: Arc<EventLog>,
    pub bus: LifecycleBus,
    swarms: RwLock<HashMap<SwarmId, Arc<SwarmRuntime>>>,
}

/// One hosted swarm
pub(super) struct SwarmRuntime {
    pub id: SwarmId,
    pub mode: SwarmMode,
    pub window: TimeWindow,
    pub criteria: TargetCriteria,
    pub per_item_cap: Money,
    pub cycle_interval: Duration,
    pub budget: BudgetAllocator,
    pub swarm: Mutex<Swarm>,
    pub agents: RwLock<BTreeMap<AgentId, Arc<Mutex<Agent>>>>,
    pub scheduler: Mutex<TickScheduler>,
    /// Bumped on every start, pause and terminate; cycles and drivers from an
    /// older epoch stop at their next suspension point
    pub epoch: watch::Sender<u64>,
    plan: Vec<AllocationRequest>,
    in_flight: Mutex<HashSet<AgentId>>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl SwarmRuntime {
    pub fn epoch(&self) -> u64 {
        *self.epoch.borrow()
    }

    fn bump_epoch(&self) -> u64 {
        self.epoch.send_modify(|epoch| *epoch += 1);
        self.epoch()
    }

    /// Put back an agent whose previous cycle is still running, one interval on
    ///
    /// The running cycle may belong to an older epoch (paused and resumed
    /// since), in which case it will not reschedule itself.
    fn defer(&self, agent_id: &AgentId, now: DateTime<Utc>) {
        debug!(agent_id = %agent_id, "Cycle still in flight, deferring tick");
        self.scheduler
            .lock()
            .schedule(agent_id.clone(), add_duration(now, self.cycle_interval));
    }

    pub fn status(&self) -> SwarmStatus {
        self.swarm.lock().status
    }

    /// Whether cycles started in `epoch` may still schedule follow-ups
    pub fn is_current(&self, epoch: u64) -> bool {
        self.epoch() == epoch && self.status() == SwarmStatus::Running
    }

    pub fn agent(&self, agent_id: &AgentId) -> Option<Arc<Mutex<Agent>>> {
        self.agents.read().get(agent_id).cloned()
    }

    pub fn report(&self, agent: &Agent) -> AgentStatusReport {
        agent.report(self.budget.get_allocation(&agent.id))
    }

    pub fn available(&self, agent_id: &AgentId) -> Money {
        self.budget
            .get_allocation(agent_id)
            .map(|a| a.available)
            .unwrap_or(Money::ZERO)
    }

    /// Apply `update` to the counters and stamp activity; returns the new counters
    pub fn record_activity(
        &self,
        now: DateTime<Utc>,
        update: impl FnOnce(&mut SwarmCounters),
    ) -> SwarmCounters {
        let mut swarm = self.swarm.lock();
        update(&mut swarm.counters);
        swarm.last_activity = Some(now);
        swarm.counters.clone()
    }
}

/// Marks an agent as mid-cycle for as long as it lives
pub(super) struct InFlightGuard {
    runtime: Arc<SwarmRuntime>,
    agent_id: AgentId,
}

impl InFlightGuard {
    fn claim(runtime: &Arc<SwarmRuntime>, agent_id: &AgentId) -> Option<Self> {
        if !runtime.in_flight.lock().insert(agent_id.clone()) {
            return None;
        }
        Some(Self {
            runtime: runtime.clone(),
            agent_id: agent_id.clone(),
        })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.runtime.in_flight.lock().remove(&self.agent_id);
    }
}

/// Swarm status snapshot returned by `get_status`
#[derive(Debug, Clone, Serialize)]
pub struct SwarmStatusReport {
    pub swarm: Swarm,
    pub budget: BudgetStatus,
    pub concentration: ConcentrationRisk,
    pub agents: Vec<AgentStatusReport>,
    pub next_cycle_at: Option<DateTime<Utc>>,
}

/// Builder for [`SwarmController`]
pub struct ControllerBuilder {
    config: ControllerConfig,
    marketplace: SharedMarketplace,
    clock: SharedClock,
    limiter: Option<Arc<RateLimiter>>,
    log: Option<Arc<EventLog>>,
}

impl ControllerBuilder {
    pub fn with_rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    pub fn with_rate_limits(mut self, config: RateLimitConfig) -> Self {
        self.limiter = Some(Arc::new(RateLimiter::new(config, self.clock.clone())));
        self
    }

    pub fn with_event_log(mut self, log: Arc<EventLog>) -> Self {
        self.log = Some(log);
        self
    }

    pub fn build(self) -> SwarmController {
        let clock = self.clock;
        let limiter = self
            .limiter
            .unwrap_or_else(|| Arc::new(RateLimiter::new(RateLimitConfig::default(), clock.clone())));
        let log = self
            .log
            .unwrap_or_else(|| Arc::new(EventLog::new(clock.clone())));
        let bus = LifecycleBus::new(self.config.lifecycle_capacity);

        SwarmController {
            shared: Arc::new(Shared {
                config: self.config,
                clock,
                marketplace: self.marketplace,
                limiter,
                log,
                bus,
                swarms: RwLock::new(HashMap::new()),
            }),
        }
    }
}

/// Owner of every swarm hosted by a process
#[derive(Clone)]
pub struct SwarmController {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for SwarmController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SwarmController")
            .field("swarms", &self.shared.swarms.read().len())
            .field("config", &self.shared.config)
            .finish()
    }
}

impl SwarmController {
    pub fn builder(
        config: ControllerConfig,
        marketplace: SharedMarketplace,
        clock: SharedClock,
    ) -> ControllerBuilder {
        ControllerBuilder {
            config,
            marketplace,
            clock,
            limiter: None,
            log: None,
        }
    }

    /// Controller with default rate limits and an in-memory event log
    pub fn new(config: ControllerConfig, marketplace: SharedMarketplace, clock: SharedClock) -> Self {
        Self::builder(config, marketplace, clock).build()
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.shared.config
    }

    pub fn event_log(&self) -> &Arc<EventLog> {
        &self.shared.log
    }

    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.shared.limiter
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.shared.bus.subscribe()
    }

    fn runtime(&self, id: &SwarmId) -> Result<Arc<SwarmRuntime>> {
        self.shared
            .swarms
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| BidSwarmError::SwarmNotFound(id.to_string()))
    }

    fn record(&self, event_type: EventType, swarm_id: &SwarmId, payload: serde_json::Value) {
        self.shared
            .log
            .record_event(event_type, swarm_id, None, None, payload);
    }

    /// Validate options, split the budget and register a new swarm
    ///
    /// Agents are not spawned until the swarm is started.
    ///
    /// # Errors
    /// `Configuration` listing every violated constraint
    pub fn create_swarm(&self, options: SwarmOptions) -> Result<SwarmId> {
        let now = self.shared.clock.now();
        let errors = validate_swarm_options(&options, now, self.shared.config.max_agents_per_swarm);
        if !errors.is_empty() {
            return Err(BidSwarmError::Configuration(
                errors.iter().map(ToString::to_string).collect(),
            ));
        }
        let window = options.resolve_window(now).ok_or_else(|| {
            BidSwarmError::Configuration(vec!["window: a window or duration is required".into()])
        })?;
        let distribution = options.resolve_distribution();

        let id = SwarmId::generate();
        let mut plan = Vec::new();
        for (kind, count) in &distribution {
            for _ in 0..*count {
                let agent_id = AgentId::for_swarm(&id, plan.len() + 1);
                let mut request = AllocationRequest::new(agent_id, *kind);
                if let Some(weight) = options.strategy_weights.get(kind) {
                    request = request.with_weight(*weight);
                }
                plan.push(request);
            }
        }

        let budget = BudgetAllocator::new(options.budget.clone());
        budget.initialize_allocations(&plan, options.allocation_method)?;

        let concentration = ConcentrationRisk::from_distribution(&distribution);
        if concentration.level == ConcentrationLevel::High {
            warn!(
                hhi = concentration.hhi,
                dominant = ?concentration.dominant,
                "Strategy distribution is highly concentrated"
            );
        }

        let swarm = Swarm {
            id: id.clone(),
            name: options.name.clone(),
            mode: options.mode,
            budget: options.budget.clone(),
            criteria: options.criteria.clone(),
            window,
            distribution: distribution.clone(),
            allocation_method: options.allocation_method,
            status: SwarmStatus::Created,
            counters: SwarmCounters::default(),
            created_at: now,
            started_at: None,
            last_activity: None,
            termination_reason: None,
        };

        let (epoch, _) = watch::channel(0);
        let runtime = Arc::new(SwarmRuntime {
            id: id.clone(),
            mode: options.mode,
            window,
            criteria: options.criteria.clone(),
            per_item_cap: options.budget.per_item_cap(),
            cycle_interval: options
                .cycle_interval_secs
                .map(Duration::from_secs)
                .unwrap_or_else(|| self.shared.config.cycle_interval()),
            budget,
            swarm: Mutex::new(swarm.clone()),
            agents: RwLock::new(BTreeMap::new()),
            scheduler: Mutex::new(TickScheduler::new()),
            epoch,
            plan,
            in_flight: Mutex::new(HashSet::new()),
            driver: Mutex::new(None),
        });

        self.record(
            EventType::SwarmCreated,
            &id,
            json!({
                "name": swarm.name,
                "mode": swarm.mode,
                "budget": swarm.budget.total.cents(),
                "allocatable": swarm.budget.allocatable().cents(),
                "agents": runtime.plan.len(),
                "distribution": distribution,
                "allocation_method": swarm.allocation_method,
                "concentration": concentration.level,
                "hhi": concentration.hhi,
            }),
        );
        info!(
            swarm_id = %id,
            name = %swarm.name,
            mode = %swarm.mode,
            agents = runtime.plan.len(),
            budget = %swarm.budget.total,
            "Created swarm"
        );

        self.shared.swarms.write().insert(id.clone(), runtime);
        self.shared.bus.publish(LifecycleEvent::SwarmCreated(swarm));
        Ok(id)
    }

    /// Start a created swarm or resume a paused one
    ///
    /// Must be called from within a tokio runtime when the driver is enabled.
    ///
    /// # Errors
    /// `WindowExpired` past the window end, `InvalidTransition` once terminated
    pub fn start_swarm(&self, id: &SwarmId) -> Result<()> {
        let runtime = self.runtime(id)?;
        let now = self.shared.clock.now();
        let mut swarm = runtime.swarm.lock();

        let resuming = match swarm.status {
            SwarmStatus::Running => return Ok(()),
            SwarmStatus::Terminated => {
                return Err(invalid_transition(id, swarm.status, SwarmStatus::Running))
            }
            SwarmStatus::Created => false,
            SwarmStatus::Paused => true,
        };
        if runtime.window.has_expired(now) {
            return Err(BidSwarmError::WindowExpired(runtime.window.end));
        }

        if resuming {
            for agent in runtime.agents.read().values() {
                let report = {
                    let mut agent = agent.lock();
                    if agent.status == AgentStatus::Paused {
                        agent.status = AgentStatus::Active;
                    }
                    runtime.report(&agent)
                };
                self.shared.bus.publish(LifecycleEvent::AgentUpdated(report));
            }
            self.record(EventType::SwarmResumed, id, json!({}));
        } else {
            self.spawn_agents(&runtime, &swarm, now);
            self.record(
                EventType::SwarmStarted,
                id,
                json!({ "agents": runtime.plan.len(), "window_end": runtime.window.end }),
            );
        }

        swarm.status = SwarmStatus::Running;
        swarm.started_at.get_or_insert(now);
        let epoch = runtime.bump_epoch();

        let agent_ids: Vec<AgentId> = runtime.agents.read().keys().cloned().collect();
        {
            let mut scheduler = runtime.scheduler.lock();
            scheduler.clear();
            for agent_id in &agent_ids {
                scheduler.schedule(agent_id.clone(), now);
            }
        }
        metrics::set_active_agents(id.as_str(), agent_ids.len());
        info!(swarm_id = %id, agents = agent_ids.len(), resumed = resuming, "Swarm running");
        self.shared.bus.publish(LifecycleEvent::SwarmUpdated(swarm.clone()));
        drop(swarm);

        if self.shared.config.spawn_driver {
            let controller = self.clone();
            let driven = runtime.clone();
            let handle = tokio::spawn(async move { controller.drive(driven, epoch).await });
            *runtime.driver.lock() = Some(handle);
        }
        Ok(())
    }

    fn spawn_agents(&self, runtime: &SwarmRuntime, swarm: &Swarm, now: DateTime<Utc>) {
        let mut agents = runtime.agents.write();
        for request in &runtime.plan {
            let allocated = runtime
                .budget
                .get_allocation(&request.agent_id)
                .map(|a| a.allocated)
                .unwrap_or(Money::ZERO);
            let agent = Agent::new(
                request.agent_id.clone(),
                swarm.id.clone(),
                Strategy::new(request.strategy, &self.shared.config.strategy),
                allocated,
                now,
            )
            .with_criteria(swarm.criteria.clone())
            .with_window(swarm.window);

            self.shared.log.record_event(
                EventType::AgentSpawned,
                &swarm.id,
                Some(&agent.id),
                None,
                json!({ "strategy": request.strategy, "allocated": allocated.cents() }),
            );
            debug!(agent_id = %agent.id, strategy = %request.strategy, allocated = %allocated, "Spawned agent");
            self.shared
                .bus
                .publish(LifecycleEvent::AgentSpawned(runtime.report(&agent)));
            agents.insert(agent.id.clone(), Arc::new(Mutex::new(agent)));
        }
    }

    /// Stop dispatching cycles; in-flight waits are cancelled
    pub fn pause_swarm(&self, id: &SwarmId) -> Result<()> {
        let runtime = self.runtime(id)?;
        let mut swarm = runtime.swarm.lock();
        match swarm.status {
            SwarmStatus::Paused => return Ok(()),
            SwarmStatus::Running => {}
            other => return Err(invalid_transition(id, other, SwarmStatus::Paused)),
        }

        runtime.bump_epoch();
        runtime.scheduler.lock().clear();
        for agent in runtime.agents.read().values() {
            let report = {
                let mut agent = agent.lock();
                if agent.status.is_live() {
                    agent.status = AgentStatus::Paused;
                }
                runtime.report(&agent)
            };
            self.shared.bus.publish(LifecycleEvent::AgentUpdated(report));
        }

        swarm.status = SwarmStatus::Paused;
        self.record(EventType::SwarmPaused, id, json!({}));
        metrics::set_active_agents(id.as_str(), 0);
        info!(swarm_id = %id, "Swarm paused");
        self.shared.bus.publish(LifecycleEvent::SwarmUpdated(swarm.clone()));
        Ok(())
    }

    /// Terminate a swarm: release every reservation and clear its agents
    ///
    /// # Errors
    /// `InvalidTransition` when the swarm is already terminated
    pub fn terminate_swarm(&self, id: &SwarmId, reason: &str) -> Result<()> {
        let runtime = self.runtime(id)?;
        let now = self.shared.clock.now();
        let mut swarm = runtime.swarm.lock();
        if swarm.status.is_terminal() {
            return Err(invalid_transition(id, swarm.status, SwarmStatus::Terminated));
        }

        runtime.bump_epoch();
        runtime.scheduler.lock().clear();

        let agents = std::mem::take(&mut *runtime.agents.write());
        for (agent_id, agent) in agents {
            let released = runtime.budget.release_all(&agent_id);
            let report = {
                let mut agent = agent.lock();
                agent.status = AgentStatus::Terminated;
                agent.active_bids.clear();
                agent.active_offers.clear();
                runtime.report(&agent)
            };
            self.shared.log.record_event(
                EventType::AgentTerminated,
                id,
                Some(&agent_id),
                None,
                json!({
                    "strategy": report.strategy,
                    "released": released.cents(),
                    "reason": reason,
                }),
            );
            self.shared.bus.publish(LifecycleEvent::AgentUpdated(report));
        }

        swarm.status = SwarmStatus::Terminated;
        swarm.termination_reason = Some(reason.to_string());
        swarm.last_activity = Some(now);
        self.record(
            EventType::SwarmTerminated,
            id,
            json!({
                "reason": reason,
                "total_spent": swarm.counters.total_spent.cents(),
                "items_acquired": swarm.counters.items_acquired,
            }),
        );
        metrics::set_active_agents(id.as_str(), 0);
        metrics::set_swarm_spent(id.as_str(), swarm.counters.total_spent.as_dollars());
        info!(swarm_id = %id, reason, spent = %swarm.counters.total_spent, "Swarm terminated");
        self.shared.bus.publish(LifecycleEvent::SwarmUpdated(swarm.clone()));
        Ok(())
    }

    pub fn get_status(&self, id: &SwarmId) -> Result<SwarmStatusReport> {
        let runtime = self.runtime(id)?;
        let swarm = runtime.swarm.lock().clone();
        let agents = runtime
            .agents
            .read()
            .values()
            .map(|agent| runtime.report(&agent.lock()))
            .collect();

        let next_cycle_at = runtime.scheduler.lock().next_fire();

        Ok(SwarmStatusReport {
            concentration: ConcentrationRisk::from_distribution(&swarm.distribution),
            budget: runtime.budget.get_swarm_status(),
            next_cycle_at,
            agents,
            swarm,
        })
    }

    pub fn get_agent_status(&self, swarm_id: &SwarmId, agent_id: &AgentId) -> Result<AgentStatusReport> {
        let runtime = self.runtime(swarm_id)?;
        let agent = runtime
            .agent(agent_id)
            .ok_or_else(|| BidSwarmError::AgentNotFound(agent_id.to_string()))?;
        let report = runtime.report(&agent.lock());
        Ok(report)
    }

    /// Every hosted swarm, oldest first
    pub fn list_swarms(&self) -> Vec<Swarm> {
        let mut swarms: Vec<Swarm> = self
            .shared
            .swarms
            .read()
            .values()
            .map(|runtime| runtime.swarm.lock().clone())
            .collect();
        swarms.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        swarms
    }

    pub fn query_events(&self, filter: &EventFilter) -> Vec<SwarmEvent> {
        self.shared.log.query_events(filter)
    }

    pub fn query_observations(&self, filter: &ObservationFilter) -> Vec<Observation> {
        self.shared.log.query_observations(filter)
    }

    /// Rankings, cost efficiency, concentration and anomalies for one swarm
    pub fn insights(&self, id: &SwarmId) -> Result<SwarmInsights> {
        let runtime = self.runtime(id)?;
        let swarm = runtime.swarm.lock().clone();
        let events = self.shared.log.query_events(&EventFilter::for_swarm(id));
        let observations = self
            .shared
            .log
            .query_observations(&ObservationFilter::for_swarm(id));
        Ok(SwarmInsights::compute(
            &swarm,
            &events,
            &observations,
            &self.shared.config.analytics,
        ))
    }

    /// Run every cycle due now, one after another, and reschedule them
    ///
    /// Terminates the swarm instead when its window has passed. Returns the
    /// number of cycles run.
    pub async fn run_due(&self, id: &SwarmId) -> Result<usize> {
        let runtime = self.runtime(id)?;
        if runtime.status() != SwarmStatus::Running {
            return Ok(0);
        }
        let now = self.shared.clock.now();
        if runtime.window.has_expired(now) {
            self.terminate_swarm(id, WINDOW_EXPIRED_REASON)?;
            return Ok(0);
        }

        let epoch = runtime.epoch();
        let due = runtime.scheduler.lock().pop_due(now);
        let mut ran = 0;
        for agent_id in due {
            let Some(_guard) = InFlightGuard::claim(&runtime, &agent_id) else {
                runtime.defer(&agent_id, now);
                continue;
            };
            cycle::run_agent_cycle(&self.shared, &runtime, &agent_id, epoch).await;
            ran += 1;
        }
        Ok(ran)
    }

    /// Terminate every live swarm, wait for their drivers and stop lifecycle subscribers
    pub async fn shutdown(&self) {
        let ids: Vec<SwarmId> = self.shared.swarms.read().keys().cloned().collect();
        for id in &ids {
            let live = self
                .runtime(id)
                .map(|runtime| !runtime.status().is_terminal())
                .unwrap_or(false);
            if live {
                if let Err(e) = self.terminate_swarm(id, "controller shutdown") {
                    warn!(swarm_id = %id, error = %e, "Failed to terminate swarm on shutdown");
                }
            }
        }

        let drivers: Vec<JoinHandle<()>> = ids
            .iter()
            .filter_map(|id| self.runtime(id).ok())
            .filter_map(|runtime| {
                let handle = runtime.driver.lock().take();
                handle
            })
            .collect();
        for result in join_all(drivers).await {
            if let Err(e) = result {
                warn!(error = %e, "Swarm driver panicked");
            }
        }
        self.shared.bus.publish(LifecycleEvent::ControllerStopped);
        self.shared.log.flush().await;
        info!("Controller stopped");
    }

    async fn drive(self, runtime: Arc<SwarmRuntime>, epoch: u64) {
        let mut stop = runtime.epoch.subscribe();
        let tick = self.shared.config.driver_tick();
        debug!(swarm_id = %runtime.id, epoch, "Driver started");

        loop {
            if runtime.epoch() != epoch {
                break;
            }
            let now = self.shared.clock.now();
            if runtime.window.has_expired(now) {
                if let Err(e) = self.terminate_swarm(&runtime.id, WINDOW_EXPIRED_REASON) {
                    debug!(swarm_id = %runtime.id, error = %e, "Window expired after termination");
                }
                break;
            }

            let due = runtime.scheduler.lock().pop_due(now);
            for agent_id in due {
                let Some(guard) = InFlightGuard::claim(&runtime, &agent_id) else {
                    runtime.defer(&agent_id, now);
                    continue;
                };
                let shared = self.shared.clone();
                let runtime = runtime.clone();
                tokio::spawn(async move {
                    let _guard = guard;
                    cycle::run_agent_cycle(&shared, &runtime, &agent_id, epoch).await;
                });
            }

            let wait = runtime
                .scheduler
                .lock()
                .next_fire()
                .map(|at| duration_between(now, at).min(tick))
                .unwrap_or(tick)
                .max(Duration::from_millis(1));
            if cancellable(&mut stop, epoch, self.shared.clock.sleep(wait))
                .await
                .is_none()
            {
                break;
            }
        }
        debug!(swarm_id = %runtime.id, epoch, "Driver stopped");
    }
}

/// Termination reason recorded when the window end passes
pub const WINDOW_EXPIRED_REASON: &str = "time window expired";

fn invalid_transition(id: &SwarmId, from: SwarmStatus, to: SwarmStatus) -> BidSwarmError {
    BidSwarmError::InvalidTransition {
        swarm_id: id.to_string(),
        from: from.to_string(),
        to: to.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{ManualClock, SystemClock};
    use crate::events::ObservationKind;
    use crate::ids::ListingId;
    use crate::marketplace::{
        BidResult, CheckoutRequest, CheckoutSession, Listing, MarketOp, Marketplace, OfferResult,
        Order, SearchQuery, SimulatedMarketplace,
    };
    use crate::ratelimit::Quota;
    use crate::strategy::{BidAction, StrategyKind};
    use crate::swarm::{SwarmBudget, TargetCriteria};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::Notify;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 1, 9, 0, 0).unwrap()
    }

    /// Simulated marketplace whose searches can be held until released
    struct HeldSearches {
        inner: SimulatedMarketplace,
        hold: AtomicBool,
        entered: Notify,
        release: Notify,
    }

    impl HeldSearches {
        fn new(inner: SimulatedMarketplace) -> Self {
            Self {
                inner,
                hold: AtomicBool::new(true),
                entered: Notify::new(),
                release: Notify::new(),
            }
        }
    }

    #[async_trait]
    impl Marketplace for HeldSearches {
        async fn search(&self, query: &SearchQuery) -> Result<Vec<Listing>> {
            if self.hold.load(Ordering::SeqCst) {
                self.entered.notify_one();
                self.release.notified().await;
            }
            self.inner.search(query).await
        }

        async fn get_item(&self, id: &ListingId) -> Result<Option<Listing>> {
            self.inner.get_item(id).await
        }

        async fn place_bid(&self, id: &ListingId, amount: Money) -> Result<BidResult> {
            self.inner.place_bid(id, amount).await
        }

        async fn submit_offer(&self, id: &ListingId, amount: Money) -> Result<OfferResult> {
            self.inner.submit_offer(id, amount).await
        }

        async fn respond_to_counter_offer(
            &self,
            offer_id: &str,
            accept: bool,
            amount: Option<Money>,
        ) -> Result<OfferResult> {
            self.inner.respond_to_counter_offer(offer_id, accept, amount).await
        }

        async fn initiate_checkout(&self, request: &CheckoutRequest) -> Result<CheckoutSession> {
            self.inner.initiate_checkout(request).await
        }

        async fn place_order(&self, session_id: &str) -> Result<Order> {
            self.inner.place_order(session_id).await
        }
    }

    struct Harness {
        clock: ManualClock,
        market: Arc<SimulatedMarketplace>,
        controller: SwarmController,
    }

    fn harness() -> Harness {
        let clock = ManualClock::new(t0());
        let market = Arc::new(SimulatedMarketplace::new(Arc::new(clock.clone())));
        let controller = SwarmController::new(
            ControllerConfig::default().without_driver(),
            market.clone(),
            Arc::new(clock.clone()),
        );
        Harness {
            clock,
            market,
            controller,
        }
    }

    /// One agent of `kind` holding the whole budget
    fn single(kind: StrategyKind, dollars: f64) -> SwarmOptions {
        SwarmOptions::new(
            "lamps",
            SwarmBudget::new(Money::from_dollars(dollars)).with_reserve_percent(0.0),
        )
        .with_criteria(TargetCriteria::new(["lamp"]))
        .with_distribution(BTreeMap::from([(kind, 1)]))
        .with_duration_minutes(60)
    }

    fn count(controller: &SwarmController, id: &SwarmId, event_type: EventType) -> usize {
        controller
            .query_events(&EventFilter::for_swarm(id).with_type(event_type))
            .len()
    }

    fn available(controller: &SwarmController, id: &SwarmId) -> Money {
        let agent_id = AgentId::for_swarm(id, 1);
        controller
            .get_agent_status(id, &agent_id)
            .unwrap()
            .allocation
            .unwrap()
            .available
    }

    #[tokio::test]
    async fn test_start_splits_budget_across_agents() {
        let h = harness();
        let options = SwarmOptions::new(
            "lamps",
            SwarmBudget::new(Money::from_dollars(500.0)).with_reserve_percent(5.0),
        )
        .with_agent_count(5)
        .with_duration_minutes(120);
        let id = h.controller.create_swarm(options).unwrap();

        let status = h.controller.get_status(&id).unwrap();
        assert_eq!(status.swarm.status, SwarmStatus::Created);
        assert!(status.agents.is_empty());

        h.controller.start_swarm(&id).unwrap();
        let status = h.controller.get_status(&id).unwrap();
        assert_eq!(status.swarm.status, SwarmStatus::Running);
        assert_eq!(status.agents.len(), 5);
        for agent in &status.agents {
            assert_eq!(agent.allocation.as_ref().unwrap().allocated, Money::from_dollars(95.0));
        }
        assert_eq!(status.budget.allocated, Money::from_dollars(475.0));
        assert_eq!(status.next_cycle_at, Some(t0()));
        assert_eq!(count(&h.controller, &id, EventType::AgentSpawned), 5);
    }

    #[tokio::test]
    async fn test_lifecycle_transitions() {
        let h = harness();
        let id = h
            .controller
            .create_swarm(single(StrategyKind::Passive, 100.0))
            .unwrap();

        assert!(matches!(
            h.controller.pause_swarm(&id),
            Err(BidSwarmError::InvalidTransition { .. })
        ));

        h.controller.start_swarm(&id).unwrap();
        // Starting twice is a no-op
        h.controller.start_swarm(&id).unwrap();
        assert_eq!(count(&h.controller, &id, EventType::SwarmStarted), 1);

        h.controller.pause_swarm(&id).unwrap();
        assert_eq!(h.controller.run_due(&id).await.unwrap(), 0);
        let status = h.controller.get_status(&id).unwrap();
        assert_eq!(status.swarm.status, SwarmStatus::Paused);
        assert_eq!(status.agents[0].status, AgentStatus::Paused);
        assert!(status.next_cycle_at.is_none());

        h.controller.start_swarm(&id).unwrap();
        assert_eq!(count(&h.controller, &id, EventType::SwarmResumed), 1);
        assert_eq!(h.controller.run_due(&id).await.unwrap(), 1);

        h.controller.terminate_swarm(&id, "done").unwrap();
        let status = h.controller.get_status(&id).unwrap();
        assert_eq!(status.swarm.status, SwarmStatus::Terminated);
        assert_eq!(status.swarm.termination_reason.as_deref(), Some("done"));
        assert!(status.agents.is_empty());
        assert_eq!(count(&h.controller, &id, EventType::AgentTerminated), 1);

        assert!(matches!(
            h.controller.terminate_swarm(&id, "again"),
            Err(BidSwarmError::InvalidTransition { .. })
        ));
        assert!(matches!(
            h.controller.start_swarm(&id),
            Err(BidSwarmError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_rejects_invalid_options_and_unknown_swarms() {
        let h = harness();
        let options = single(StrategyKind::Sniper, 0.0);
        assert!(matches!(
            h.controller.create_swarm(options),
            Err(BidSwarmError::Configuration(_))
        ));
        assert!(h.controller.list_swarms().is_empty());

        let missing = SwarmId::new("missing");
        assert!(matches!(
            h.controller.get_status(&missing),
            Err(BidSwarmError::SwarmNotFound(_))
        ));
        assert!(matches!(
            h.controller.start_swarm(&missing),
            Err(BidSwarmError::SwarmNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_window_expiry() {
        let h = harness();
        let late = h
            .controller
            .create_swarm(single(StrategyKind::Sniper, 100.0).with_duration_minutes(1))
            .unwrap();
        let running = h
            .controller
            .create_swarm(single(StrategyKind::Sniper, 100.0).with_duration_minutes(1))
            .unwrap();
        h.controller.start_swarm(&running).unwrap();

        h.clock.advance(Duration::from_secs(120));
        assert!(matches!(
            h.controller.start_swarm(&late),
            Err(BidSwarmError::WindowExpired(_))
        ));

        assert_eq!(h.controller.run_due(&running).await.unwrap(), 0);
        let swarm = h.controller.get_status(&running).unwrap().swarm;
        assert_eq!(swarm.status, SwarmStatus::Terminated);
        assert_eq!(swarm.termination_reason.as_deref(), Some(WINDOW_EXPIRED_REASON));
    }

    #[tokio::test]
    async fn test_reconnaissance_records_observations_only() {
        let h = harness();
        h.market
            .add_listing(Listing::new("lamp-1", "Floor lamp", Money::from_dollars(60.0)).with_offers());
        let options = single(StrategyKind::Negotiator, 100.0).with_mode(SwarmMode::Reconnaissance);
        let id = h.controller.create_swarm(options).unwrap();
        h.controller.start_swarm(&id).unwrap();

        assert_eq!(h.controller.run_due(&id).await.unwrap(), 1);

        let observations = h
            .controller
            .query_observations(&ObservationFilter::for_swarm(&id));
        assert_eq!(observations.len(), 1);
        assert_eq!(observations[0].kind, ObservationKind::OpportunityIdentified);
        assert_eq!(observations[0].action, BidAction::Offer);
        assert_eq!(observations[0].amount, Some(Money::from_dollars(48.0)));

        assert_eq!(h.market.calls(MarketOp::SubmitOffer), 0);
        assert_eq!(count(&h.controller, &id, EventType::OfferSubmitted), 0);
        assert_eq!(available(&h.controller, &id), Money::from_dollars(100.0));
    }

    #[tokio::test]
    async fn test_failed_bid_releases_reservation() {
        let h = harness();
        h.market.add_listing(
            Listing::new("lamp-1", "Brass lamp", Money::from_dollars(20.0))
                .with_auction(t0() + chrono::Duration::hours(1)),
        );
        h.market.fail_next(MarketOp::PlaceBid, 500, 1);
        let id = h
            .controller
            .create_swarm(single(StrategyKind::EarlyAggressive, 100.0))
            .unwrap();
        h.controller.start_swarm(&id).unwrap();

        h.controller.run_due(&id).await.unwrap();

        assert_eq!(h.market.calls(MarketOp::PlaceBid), 1);
        assert_eq!(count(&h.controller, &id, EventType::BidPlaced), 0);
        let errors = h
            .controller
            .query_events(&EventFilter::for_swarm(&id).with_type(EventType::Error));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].payload_str("operation"), Some("place_bid"));
        assert_eq!(available(&h.controller, &id), Money::from_dollars(100.0));
        assert_eq!(h.controller.get_status(&id).unwrap().budget.reserved, Money::ZERO);
    }

    #[tokio::test]
    async fn test_auction_win_settles_and_checks_out() {
        let h = harness();
        let listing_id = ListingId::new("lamp-1");
        h.market.add_listing(
            Listing::new("lamp-1", "Brass lamp", Money::from_dollars(20.0))
                .with_auction(t0() + chrono::Duration::hours(1)),
        );
        let id = h
            .controller
            .create_swarm(single(StrategyKind::EarlyAggressive, 100.0))
            .unwrap();
        h.controller.start_swarm(&id).unwrap();

        h.controller.run_due(&id).await.unwrap();
        let agent = h
            .controller
            .get_agent_status(&id, &AgentId::for_swarm(&id, 1))
            .unwrap();
        assert_eq!(agent.active_bids.len(), 1);
        assert_eq!(agent.active_bids[0].amount, Money::from_dollars(40.0));
        assert_eq!(agent.allocation.unwrap().reserved, Money::from_dollars(40.0));

        h.market.close_listing(&listing_id).unwrap();
        h.clock.advance(Duration::from_secs(DEFAULT_CYCLE_INTERVAL_SECS));
        assert_eq!(h.controller.run_due(&id).await.unwrap(), 1);

        let status = h.controller.get_status(&id).unwrap();
        assert_eq!(status.swarm.counters.auctions_won, 1);
        assert_eq!(status.swarm.counters.items_acquired, 1);
        assert_eq!(status.swarm.counters.total_spent, Money::from_dollars(40.0));
        assert_eq!(status.budget.spent, Money::from_dollars(40.0));
        assert_eq!(status.budget.reserved, Money::ZERO);
        assert!(status.agents[0].active_bids.is_empty());

        assert_eq!(count(&h.controller, &id, EventType::BidWon), 1);
        assert_eq!(count(&h.controller, &id, EventType::PurchaseCompleted), 1);
        assert_eq!(count(&h.controller, &id, EventType::CheckoutCompleted), 1);
        assert_eq!(h.market.orders().len(), 1);
        assert_eq!(h.market.orders()[0].total, Money::from_dollars(40.0));
    }

    #[tokio::test]
    async fn test_negotiation_accepts_final_counter() {
        let h = harness();
        h.market
            .add_listing(Listing::new("lamp-1", "Desk lamp", Money::from_dollars(100.0)).with_offers());
        let id = h
            .controller
            .create_swarm(single(StrategyKind::Negotiator, 100.0))
            .unwrap();
        h.controller.start_swarm(&id).unwrap();

        h.controller.run_due(&id).await.unwrap();

        // 80 → counter 90, 85 → counter 92.50, 88.75 → counter 94.37 accepted on the last round
        let paid = Money::from_cents(9437);
        assert_eq!(count(&h.controller, &id, EventType::OfferSubmitted), 1);
        assert_eq!(count(&h.controller, &id, EventType::OfferCountered), 3);
        assert_eq!(h.market.calls(MarketOp::RespondToCounter), 3);

        let accepted = h
            .controller
            .query_events(&EventFilter::for_swarm(&id).with_type(EventType::OfferAccepted));
        assert_eq!(accepted.len(), 1);
        assert_eq!(accepted[0].amount(), Some(paid));

        let status = h.controller.get_status(&id).unwrap();
        assert_eq!(status.swarm.counters.offers_accepted, 1);
        assert_eq!(status.budget.spent, paid);
        assert_eq!(status.budget.reserved, Money::ZERO);
        assert_eq!(available(&h.controller, &id), Money::from_cents(563));
        assert_eq!(h.market.orders().len(), 1);
    }

    #[tokio::test]
    async fn test_pause_cancels_pending_snipe() {
        let h = harness();
        h.market.add_listing(
            Listing::new("lamp-1", "Brass lamp", Money::from_dollars(20.0))
                .with_auction(t0() + chrono::Duration::seconds(100)),
        );
        let id = h
            .controller
            .create_swarm(single(StrategyKind::Sniper, 100.0))
            .unwrap();
        h.controller.start_swarm(&id).unwrap();

        let cycle = tokio::spawn({
            let controller = h.controller.clone();
            let id = id.clone();
            async move { controller.run_due(&id).await }
        });
        // Let the cycle reach the sniper's delay, then pause under it
        tokio::task::yield_now().await;
        h.controller.pause_swarm(&id).unwrap();
        cycle.await.unwrap().unwrap();

        assert_eq!(h.market.calls(MarketOp::PlaceBid), 0);
        assert_eq!(count(&h.controller, &id, EventType::BidPlaced), 0);
        assert_eq!(available(&h.controller, &id), Money::from_dollars(100.0));
        assert!(h.controller.get_status(&id).unwrap().next_cycle_at.is_none());
    }

    #[tokio::test]
    async fn test_lifecycle_events_reach_subscribers() {
        let h = harness();
        let mut rx = h.controller.subscribe();
        let id = h
            .controller
            .create_swarm(single(StrategyKind::Passive, 50.0))
            .unwrap();
        h.controller.start_swarm(&id).unwrap();

        let names: Vec<&str> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|event| event.name())
            .collect();
        assert_eq!(names, vec!["swarm_created", "agent_spawned", "swarm_updated"]);
    }

    #[tokio::test]
    async fn test_trades_are_published() {
        let h = harness();
        h.market.add_listing(
            Listing::new("lamp-1", "Brass lamp", Money::from_dollars(20.0))
                .with_auction(t0() + chrono::Duration::hours(1)),
        );
        let id = h
            .controller
            .create_swarm(single(StrategyKind::EarlyAggressive, 100.0))
            .unwrap();
        h.controller.start_swarm(&id).unwrap();
        let mut rx = h.controller.subscribe();

        h.controller.run_due(&id).await.unwrap();

        let trades: Vec<EventType> = std::iter::from_fn(|| rx.try_recv().ok())
            .filter_map(|event| match event {
                LifecycleEvent::Trade(event) => Some(event.event_type),
                _ => None,
            })
            .collect();
        assert_eq!(trades, vec![EventType::BidPlaced]);
    }

    #[tokio::test]
    async fn test_resume_under_running_cycle_keeps_agent_scheduled() {
        let clock = ManualClock::new(t0());
        let market = Arc::new(HeldSearches::new(SimulatedMarketplace::new(Arc::new(
            clock.clone(),
        ))));
        let controller = SwarmController::new(
            ControllerConfig::default().without_driver(),
            market.clone(),
            Arc::new(clock.clone()),
        );
        let id = controller
            .create_swarm(single(StrategyKind::Passive, 100.0))
            .unwrap();
        controller.start_swarm(&id).unwrap();

        let held = tokio::spawn({
            let controller = controller.clone();
            let id = id.clone();
            async move { controller.run_due(&id).await }
        });
        market.entered.notified().await;

        // Pause and resume while the first cycle is stuck in its search
        controller.pause_swarm(&id).unwrap();
        controller.start_swarm(&id).unwrap();
        assert_eq!(controller.get_status(&id).unwrap().next_cycle_at, Some(t0()));

        assert_eq!(controller.run_due(&id).await.unwrap(), 0);
        let retry_at = t0() + chrono::Duration::seconds(DEFAULT_CYCLE_INTERVAL_SECS as i64);
        assert_eq!(controller.get_status(&id).unwrap().next_cycle_at, Some(retry_at));

        market.hold.store(false, Ordering::SeqCst);
        market.release.notify_one();
        assert_eq!(held.await.unwrap().unwrap(), 1);
        assert_eq!(controller.get_status(&id).unwrap().next_cycle_at, Some(retry_at));

        clock.advance(Duration::from_secs(DEFAULT_CYCLE_INTERVAL_SECS));
        assert_eq!(controller.run_due(&id).await.unwrap(), 1);
        let agent = controller
            .get_agent_status(&id, &AgentId::for_swarm(&id, 1))
            .unwrap();
        assert_eq!(agent.cycles_run, 2);
        assert!(controller.get_status(&id).unwrap().next_cycle_at.is_some());
    }

    /// Poll `check` every few milliseconds of real time until it holds
    async fn wait_until(what: &str, mut check: impl FnMut() -> bool) {
        for _ in 0..500 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("timed out waiting for {}", what);
    }

    fn assert_ledger_consistent(controller: &SwarmController, id: &SwarmId) {
        let budget = controller.get_status(id).unwrap().budget;
        let mut allocated = Money::ZERO;
        for allocation in &budget.agents {
            assert!(allocation.is_balanced(), "unbalanced ledger: {:?}", allocation);
            allocated += allocation.allocated;
        }
        assert!(allocated <= budget.allocatable);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_driver_runs_competing_agents_and_honors_pause() {
        let clock: SharedClock = Arc::new(SystemClock);
        let market = Arc::new(SimulatedMarketplace::new(clock.clone()));
        let closes = clock.now() + chrono::Duration::hours(1);
        for n in 1..=6 {
            market.add_listing(
                Listing::new(format!("lamp-{}", n), "Brass lamp", Money::from_dollars(10.0))
                    .with_auction(closes),
            );
        }
        let generous = RateLimitConfig {
            quotas: HashMap::new(),
            default_quota: Quota::new(10_000, 1_000_000),
            ..RateLimitConfig::default()
        };
        let mut config = ControllerConfig::default().with_cycle_interval_secs(1);
        config.driver_tick_ms = 20;
        let controller = SwarmController::builder(config, market.clone(), clock.clone())
            .with_rate_limits(generous)
            .build();

        let options = SwarmOptions::new(
            "lamps",
            SwarmBudget::new(Money::from_dollars(300.0)).with_reserve_percent(0.0),
        )
        .with_criteria(TargetCriteria::new(["lamp"]))
        .with_distribution(BTreeMap::from([
            (StrategyKind::EarlyAggressive, 2),
            (StrategyKind::Hybrid, 1),
        ]))
        .with_duration_minutes(60);
        let id = controller.create_swarm(options).unwrap();
        controller.start_swarm(&id).unwrap();

        wait_until("the first bids", || {
            count(&controller, &id, EventType::BidPlaced) >= 2
        })
        .await;
        assert_ledger_consistent(&controller, &id);

        controller.pause_swarm(&id).unwrap();
        let runtime = controller.runtime(&id).unwrap();
        wait_until("in-flight cycles to drain", || runtime.in_flight.lock().is_empty()).await;

        // A cycle already past its last checkpoint may still land one bid
        let events = controller.query_events(&EventFilter::for_swarm(&id));
        let paused_seq = events
            .iter()
            .find(|e| e.event_type == EventType::SwarmPaused)
            .map(|e| e.seq)
            .unwrap();
        let mut late_bidders: Vec<&AgentId> = events
            .iter()
            .filter(|e| e.seq > paused_seq && e.event_type == EventType::BidPlaced)
            .filter_map(|e| e.agent_id.as_ref())
            .collect();
        let late = late_bidders.len();
        late_bidders.sort();
        late_bidders.dedup();
        assert_eq!(late, late_bidders.len(), "an agent kept bidding after the pause");

        let bids = count(&controller, &id, EventType::BidPlaced);
        let cycles: u64 = controller
            .get_status(&id)
            .unwrap()
            .agents
            .iter()
            .map(|a| a.cycles_run)
            .sum();
        tokio::time::sleep(Duration::from_millis(1_500)).await;
        let status = controller.get_status(&id).unwrap();
        assert_eq!(count(&controller, &id, EventType::BidPlaced), bids);
        assert_eq!(status.agents.iter().map(|a| a.cycles_run).sum::<u64>(), cycles);
        assert!(status.next_cycle_at.is_none());
        assert_ledger_consistent(&controller, &id);

        controller.start_swarm(&id).unwrap();
        wait_until("cycles after resume", || {
            controller
                .get_status(&id)
                .unwrap()
                .agents
                .iter()
                .map(|a| a.cycles_run)
                .sum::<u64>()
                > cycles
        })
        .await;

        controller.terminate_swarm(&id, "test over").unwrap();
        controller.shutdown().await;
        wait_until("in-flight cycles to drain", || runtime.in_flight.lock().is_empty()).await;

        assert_ledger_consistent(&controller, &id);
        let status = controller.get_status(&id).unwrap();
        assert_eq!(status.swarm.status, SwarmStatus::Terminated);
        assert_eq!(status.budget.reserved, Money::ZERO);
        assert_eq!(
            status.budget.spent + status.budget.available,
            Money::from_dollars(300.0)
        );
    }
}
