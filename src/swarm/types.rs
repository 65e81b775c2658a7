//! Swarm definition and lifecycle state

use crate::budget::AllocationMethod;
use crate::ids::SwarmId;
use crate::money::{self, Money};
use crate::strategy::StrategyKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Whether agents act or only observe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwarmMode {
    /// Execute bids and offers against the marketplace
    #[default]
    Combat,

    /// Record what would have been done, never act
    Reconnaissance,
}

impl fmt::Display for SwarmMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Combat => write!(f, "COMBAT"),
            Self::Reconnaissance => write!(f, "RECONNAISSANCE"),
        }
    }
}

/// Swarm lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwarmStatus {
    Created,
    Running,
    Paused,
    Terminated,
}

impl SwarmStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Terminated => "terminated",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminated)
    }

    /// CREATED → RUNNING ⇄ PAUSED, and TERMINATED from any non-terminal state
    pub fn can_transition_to(&self, next: SwarmStatus) -> bool {
        matches!(
            (self, next),
            (Self::Created, Self::Running)
                | (Self::Running, Self::Paused)
                | (Self::Paused, Self::Running)
                | (Self::Created, Self::Terminated)
                | (Self::Running, Self::Terminated)
                | (Self::Paused, Self::Terminated)
        )
    }
}

impl fmt::Display for SwarmStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

fn default_currency() -> String {
    "USD".to_string()
}

fn default_reserve_percent() -> f64 {
    5.0
}

/// Total swarm budget and its limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwarmBudget {
    #[serde(with = "money::dollars")]
    pub total: Money,

    #[serde(default = "default_currency")]
    pub currency: String,

    /// Share of `total` held back from allocation, in percent
    #[serde(default = "default_reserve_percent")]
    pub reserve_percent: f64,

    /// Most any agent may commit to a single item
    #[serde(default, with = "money::option_dollars", skip_serializing_if = "Option::is_none")]
    pub max_per_item: Option<Money>,
}

impl SwarmBudget {
    pub fn new(total: Money) -> Self {
        Self {
            total,
            currency: default_currency(),
            reserve_percent: default_reserve_percent(),
            max_per_item: None,
        }
    }

    pub fn with_reserve_percent(mut self, percent: f64) -> Self {
        self.reserve_percent = percent;
        self
    }

    pub fn with_max_per_item(mut self, cap: Money) -> Self {
        self.max_per_item = Some(cap);
        self
    }

    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = currency.into();
        self
    }

    /// Amount held back, rounded up to the cent
    pub fn reserve_amount(&self) -> Money {
        let exact = self.total.cents() as f64 * self.reserve_percent.clamp(0.0, 100.0) / 100.0;
        let cents = (exact - 1e-6).ceil().max(0.0) as u64;
        Money::from_cents(cents.min(self.total.cents()))
    }

    /// Pool split across agents: `total × (1 − reserve%)`
    pub fn allocatable(&self) -> Money {
        self.total - self.reserve_amount()
    }

    /// Effective per-item cap (the whole budget when unset)
    pub fn per_item_cap(&self) -> Money {
        self.max_per_item.unwrap_or(self.total)
    }
}

/// What the swarm is looking for
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TargetCriteria {
    #[serde(default)]
    pub search_terms: Vec<String>,

    #[serde(default, with = "money::option_dollars", skip_serializing_if = "Option::is_none")]
    pub min_price: Option<Money>,

    #[serde(default, with = "money::option_dollars", skip_serializing_if = "Option::is_none")]
    pub max_price: Option<Money>,

    #[serde(default)]
    pub conditions: Vec<String>,
}

impl TargetCriteria {
    pub fn new<S: Into<String>>(terms: impl IntoIterator<Item = S>) -> Self {
        Self {
            search_terms: terms.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn with_price_range(mut self, min: Option<Money>, max: Option<Money>) -> Self {
        self.min_price = min;
        self.max_price = max;
        self
    }

    pub fn with_conditions<S: Into<String>>(mut self, conditions: impl IntoIterator<Item = S>) -> Self {
        self.conditions = conditions.into_iter().map(Into::into).collect();
        self
    }
}

/// When the swarm may act
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Window opening at `start` and lasting `duration`
    pub fn starting_at(start: DateTime<Utc>, duration: std::time::Duration) -> Self {
        Self {
            start,
            end: crate::clock::add_duration(start, duration),
        }
    }

    pub fn has_started(&self, now: DateTime<Utc>) -> bool {
        now >= self.start
    }

    pub fn has_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.end
    }
}

/// Aggregate activity counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SwarmCounters {
    pub bids_placed: u64,
    pub offers_made: u64,
    pub auctions_won: u64,
    pub offers_accepted: u64,
    pub items_acquired: u64,
    #[serde(with = "money::dollars")]
    pub total_spent: Money,
}

/// Parameters for `create_swarm`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwarmOptions {
    pub name: String,

    #[serde(default)]
    pub mode: SwarmMode,

    pub budget: SwarmBudget,

    #[serde(default)]
    pub criteria: TargetCriteria,

    /// Absolute window; takes precedence over `duration_minutes`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window: Option<TimeWindow>,

    /// Window opening at creation time and lasting this long
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<u64>,

    /// Explicit strategy → agent count map
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy_distribution: Option<BTreeMap<StrategyKind, usize>>,

    /// Agent count for a balanced distribution when no explicit map is given
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_count: Option<usize>,

    #[serde(default)]
    pub allocation_method: AllocationMethod,

    /// Per-strategy weight overrides for WEIGHTED allocation
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub strategy_weights: BTreeMap<StrategyKind, f64>,

    /// Overrides the controller's cycle interval
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cycle_interval_secs: Option<u64>,
}

impl SwarmOptions {
    pub fn new(name: impl Into<String>, budget: SwarmBudget) -> Self {
        Self {
            name: name.into(),
            mode: SwarmMode::Combat,
            budget,
            criteria: TargetCriteria::default(),
            window: None,
            duration_minutes: None,
            strategy_distribution: None,
            agent_count: None,
            allocation_method: AllocationMethod::Equal,
            strategy_weights: BTreeMap::new(),
            cycle_interval_secs: None,
        }
    }

    pub fn with_mode(mut self, mode: SwarmMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_criteria(mut self, criteria: TargetCriteria) -> Self {
        self.criteria = criteria;
        self
    }

    pub fn with_window(mut self, window: TimeWindow) -> Self {
        self.window = Some(window);
        self
    }

    pub fn with_duration_minutes(mut self, minutes: u64) -> Self {
        self.duration_minutes = Some(minutes);
        self
    }

    pub fn with_distribution(mut self, distribution: BTreeMap<StrategyKind, usize>) -> Self {
        self.strategy_distribution = Some(distribution);
        self
    }

    pub fn with_agent_count(mut self, count: usize) -> Self {
        self.agent_count = Some(count);
        self
    }

    pub fn with_allocation_method(mut self, method: AllocationMethod) -> Self {
        self.allocation_method = method;
        self
    }

    pub fn with_strategy_weight(mut self, kind: StrategyKind, weight: f64) -> Self {
        self.strategy_weights.insert(kind, weight);
        self
    }

    pub fn with_cycle_interval_secs(mut self, secs: u64) -> Self {
        self.cycle_interval_secs = Some(secs);
        self
    }

    /// Window to use when the swarm is created at `now`
    pub fn resolve_window(&self, now: DateTime<Utc>) -> Option<TimeWindow> {
        self.window.or_else(|| {
            self.duration_minutes
                .map(|m| TimeWindow::starting_at(now, std::time::Duration::from_secs(m * 60)))
        })
    }

    /// Strategy → agent count, explicit or balanced round-robin
    pub fn resolve_distribution(&self) -> BTreeMap<StrategyKind, usize> {
        if let Some(explicit) = &self.strategy_distribution {
            return explicit
                .iter()
                .filter(|(_, count)| **count > 0)
                .map(|(k, c)| (*k, *c))
                .collect();
        }
        balanced_distribution(self.agent_count.unwrap_or(0))
    }
}

/// Round-robin over HYBRID, SNIPER, EARLY_AGGRESSIVE, NEGOTIATOR, PASSIVE
pub fn balanced_distribution(agent_count: usize) -> BTreeMap<StrategyKind, usize> {
    let mut distribution = BTreeMap::new();
    for kind in StrategyKind::BALANCED_ORDER.iter().cycle().take(agent_count) {
        *distribution.entry(*kind).or_insert(0) += 1;
    }
    distribution
}

/// One budgeted campaign
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Swarm {
    pub id: SwarmId,
    pub name: String,
    pub mode: SwarmMode,
    pub budget: SwarmBudget,
    pub criteria: TargetCriteria,
    pub window: TimeWindow,
    pub distribution: BTreeMap<StrategyKind, usize>,
    pub allocation_method: AllocationMethod,
    pub status: SwarmStatus,
    pub counters: SwarmCounters,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_activity: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub termination_reason: Option<String>,
}

impl Swarm {
    pub fn agent_count(&self) -> usize {
        self.distribution.values().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_status_transitions() {
        use SwarmStatus::*;
        assert!(Created.can_transition_to(Running));
        assert!(Running.can_transition_to(Paused));
        assert!(Paused.can_transition_to(Running));
        assert!(Created.can_transition_to(Terminated));
        assert!(Paused.can_transition_to(Terminated));
        assert!(!Created.can_transition_to(Paused));
        assert!(!Terminated.can_transition_to(Running));
        assert!(!Terminated.can_transition_to(Terminated));
    }

    #[test]
    fn test_budget_reserve() {
        let budget = SwarmBudget::new(Money::from_dollars(500.0));
        assert_eq!(budget.reserve_amount(), Money::from_dollars(25.0));
        assert_eq!(budget.allocatable(), Money::from_dollars(475.0));

        // Rounded up so the allocatable pool never exceeds the exact bound
        let odd = SwarmBudget::new(Money::from_cents(1001)).with_reserve_percent(5.0);
        assert_eq!(odd.reserve_amount(), Money::from_cents(51));
        assert_eq!(odd.allocatable(), Money::from_cents(950));
    }

    #[test]
    fn test_balanced_distribution() {
        let d = balanced_distribution(7);
        assert_eq!(d[&StrategyKind::Hybrid], 2);
        assert_eq!(d[&StrategyKind::Sniper], 2);
        assert_eq!(d[&StrategyKind::EarlyAggressive], 1);
        assert_eq!(d[&StrategyKind::Negotiator], 1);
        assert_eq!(d[&StrategyKind::Passive], 1);
        assert!(balanced_distribution(0).is_empty());
    }

    #[test]
    fn test_options_from_yaml() {
        let yaml = r#"
name: cameras
mode: reconnaissance
budget:
  total: 500
  reserve_percent: 5
  max_per_item: 120
criteria:
  search_terms: [leica, hasselblad]
  max_price: 150
duration_minutes: 90
strategy_distribution:
  sniper: 2
  negotiator: 1
"#;
        let options: SwarmOptions = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(options.mode, SwarmMode::Reconnaissance);
        assert_eq!(options.budget.total, Money::from_dollars(500.0));
        assert_eq!(options.budget.max_per_item, Some(Money::from_dollars(120.0)));
        assert_eq!(options.resolve_distribution().values().sum::<usize>(), 3);

        let now = Utc.with_ymd_and_hms(2026, 6, 1, 8, 0, 0).unwrap();
        let window = options.resolve_window(now).unwrap();
        assert_eq!(window.end, now + chrono::Duration::minutes(90));
    }
}
