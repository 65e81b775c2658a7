//! Configuration validation
//!
//! Collects every violation instead of stopping at the first one:
//! - Controller tunables are positive
//! - Quotas, backoff and retries are coherent
//! - Strategy ratios lie in their ranges
//! - Swarm options describe a budget, window and team that can actually run

use super::bidswarm_config::BidSwarmConfig;
use crate::ratelimit::{ApiCategory, BackoffConfig};
use crate::swarm::SwarmOptions;
use crate::BidSwarmError;
use chrono::{DateTime, Utc};

/// Validation error details
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validation result
pub type ValidationResult = std::result::Result<(), Vec<ValidationError>>;

fn into_result(errors: Vec<ValidationError>) -> ValidationResult {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_ratio(errors: &mut Vec<ValidationError>, field: &str, value: f64, min: f64, max: f64) {
    if !value.is_finite() || value < min || value > max {
        errors.push(ValidationError::new(
            field,
            format!("Must be between {} and {}, got {}", min, max, value),
        ));
    }
}

/// Validate a BidSwarm configuration
pub fn validate_config(config: &BidSwarmConfig) -> ValidationResult {
    let mut errors = Vec::new();
    let controller = &config.controller;

    if controller.cycle_interval_secs == 0 {
        errors.push(ValidationError::new(
            "controller.cycle_interval_secs",
            "Cycle interval must be greater than 0",
        ));
    }
    if controller.max_agents_per_swarm == 0 {
        errors.push(ValidationError::new(
            "controller.max_agents_per_swarm",
            "At least one agent per swarm must be allowed",
        ));
    }
    if controller.search_limit == 0 {
        errors.push(ValidationError::new(
            "controller.search_limit",
            "Search limit must be greater than 0",
        ));
    }
    if controller.lifecycle_capacity == 0 {
        errors.push(ValidationError::new(
            "controller.lifecycle_capacity",
            "Lifecycle channel capacity must be greater than 0",
        ));
    }

    // Strategy tunables
    let strategy = &controller.strategy;
    check_ratio(
        &mut errors,
        "controller.strategy.early_aggressive.budget_fraction",
        strategy.early_aggressive.budget_fraction,
        0.0,
        1.0,
    );
    check_ratio(
        &mut errors,
        "controller.strategy.negotiator.opening_discount",
        strategy.negotiator.opening_discount,
        0.0,
        0.99,
    );
    check_ratio(
        &mut errors,
        "controller.strategy.negotiator.concession_rate",
        strategy.negotiator.concession_rate,
        0.01,
        1.0,
    );
    check_ratio(
        &mut errors,
        "controller.strategy.negotiator.floor_ratio",
        strategy.negotiator.floor_ratio,
        0.0,
        1.0,
    );
    check_ratio(
        &mut errors,
        "controller.strategy.passive.threshold",
        strategy.passive.threshold,
        0.0,
        0.99,
    );
    if strategy.negotiator.max_rounds == 0 {
        errors.push(ValidationError::new(
            "controller.strategy.negotiator.max_rounds",
            "At least one counter round is required",
        ));
    }
    if strategy.sniper.snipe_seconds > strategy.sniper.snipe_lead_seconds {
        errors.push(ValidationError::new(
            "controller.strategy.sniper.snipe_seconds",
            format!(
                "Snipe time {}s must not exceed the lead time {}s",
                strategy.sniper.snipe_seconds, strategy.sniper.snipe_lead_seconds
            ),
        ));
    }
    if strategy.hybrid.little_time_seconds > strategy.hybrid.plenty_time_seconds {
        errors.push(ValidationError::new(
            "controller.strategy.hybrid.little_time_seconds",
            "Must not exceed plenty_time_seconds",
        ));
    }

    // Quotas
    for category in ApiCategory::ALL {
        let quota = config.rate_limits.quota(category);
        let field = format!("rate_limits.quotas.{}", category.as_str());
        if quota.per_minute == 0 || quota.per_day == 0 {
            errors.push(ValidationError::new(
                &field,
                "Quotas must allow at least one call per minute and per day",
            ));
        } else if quota.per_day < quota.per_minute {
            errors.push(ValidationError::new(
                &field,
                format!(
                    "Daily quota {} is below the per-minute quota {}",
                    quota.per_day, quota.per_minute
                ),
            ));
        }
    }

    check_backoff(&mut errors, "rate_limits.backoff", &config.rate_limits.backoff);

    // Retries
    if config.retry.max_retries > 10 {
        errors.push(ValidationError::new(
            "retry.max_retries",
            "At most 10 retries per call",
        ));
    }
    check_backoff(&mut errors, "retry.backoff", &config.retry.backoff);

    // Logging
    let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
    if !valid_levels.contains(&config.logging.level.to_lowercase().as_str()) {
        errors.push(ValidationError::new(
            "logging.level",
            format!(
                "Invalid level '{}'. Must be one of: {}",
                config.logging.level,
                valid_levels.join(", ")
            ),
        ));
    }

    into_result(errors)
}

fn check_backoff(errors: &mut Vec<ValidationError>, prefix: &str, backoff: &BackoffConfig) {
    if backoff.base_ms == 0 {
        errors.push(ValidationError::new(
            format!("{}.base_ms", prefix),
            "Base backoff must be greater than 0",
        ));
    }
    if backoff.max_ms < backoff.base_ms {
        errors.push(ValidationError::new(
            format!("{}.max_ms", prefix),
            "Maximum backoff must not be below the base backoff",
        ));
    }
    check_ratio(errors, &format!("{}.jitter", prefix), backoff.jitter, 0.0, 0.99);
}

/// Validate a configuration and convert failures to a crate error
pub fn validate_config_result(config: &BidSwarmConfig) -> crate::Result<()> {
    validate_config(config).map_err(|errors| {
        BidSwarmError::Configuration(errors.iter().map(ToString::to_string).collect())
    })
}

/// Every reason `options` cannot become a swarm created at `now`
pub fn validate_swarm_options(
    options: &SwarmOptions,
    now: DateTime<Utc>,
    max_agents: usize,
) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if options.name.trim().is_empty() {
        errors.push(ValidationError::new("name", "Swarm name cannot be empty"));
    }

    // Budget
    let budget = &options.budget;
    if budget.total.is_zero() {
        errors.push(ValidationError::new(
            "budget.total",
            "Budget must be greater than 0",
        ));
    }
    if !budget.reserve_percent.is_finite()
        || budget.reserve_percent < 0.0
        || budget.reserve_percent >= 100.0
    {
        errors.push(ValidationError::new(
            "budget.reserve_percent",
            format!(
                "Reserve must be at least 0 and below 100, got {}",
                budget.reserve_percent
            ),
        ));
    }
    if budget.currency.trim().is_empty() {
        errors.push(ValidationError::new("budget.currency", "Currency cannot be empty"));
    }
    if let Some(cap) = budget.max_per_item {
        if cap.is_zero() {
            errors.push(ValidationError::new(
                "budget.max_per_item",
                "Per-item cap must be greater than 0",
            ));
        } else if cap > budget.total {
            errors.push(ValidationError::new(
                "budget.max_per_item",
                format!("Per-item cap {} exceeds the budget {}", cap, budget.total),
            ));
        }
    }

    // Time window
    match (options.window, options.duration_minutes) {
        (Some(window), _) => {
            if window.start >= window.end {
                errors.push(ValidationError::new(
                    "window",
                    "Window start must be before its end",
                ));
            } else if window.end <= now {
                errors.push(ValidationError::new(
                    "window",
                    format!("Window already ended at {}", window.end),
                ));
            }
        }
        (None, Some(0)) => {
            errors.push(ValidationError::new(
                "duration_minutes",
                "Duration must be greater than 0",
            ));
        }
        (None, Some(_)) => {}
        (None, None) => {
            errors.push(ValidationError::new(
                "window",
                "A window or duration_minutes is required",
            ));
        }
    }

    // Team
    let agents: usize = options.resolve_distribution().values().sum();
    if agents == 0 {
        errors.push(ValidationError::new(
            "strategy_distribution",
            "At least one agent is required (set agent_count or strategy_distribution)",
        ));
    } else if agents > max_agents {
        errors.push(ValidationError::new(
            "strategy_distribution",
            format!("{} agents requested, at most {} allowed", agents, max_agents),
        ));
    } else if (budget.allocatable().cents() as usize) < agents {
        errors.push(ValidationError::new(
            "budget.total",
            format!(
                "Allocatable budget {} cannot fund {} agents",
                budget.allocatable(),
                agents
            ),
        ));
    }
    for (kind, weight) in &options.strategy_weights {
        if !weight.is_finite() || *weight <= 0.0 {
            errors.push(ValidationError::new(
                format!("strategy_weights.{}", kind.as_str()),
                format!("Weight must be positive, got {}", weight),
            ));
        }
    }

    // Criteria
    let criteria = &options.criteria;
    if let (Some(min), Some(max)) = (criteria.min_price, criteria.max_price) {
        if min > max {
            errors.push(ValidationError::new(
                "criteria.min_price",
                format!("Minimum price {} exceeds maximum price {}", min, max),
            ));
        }
    }
    if criteria.max_price.is_some_and(|max| max.is_zero()) {
        errors.push(ValidationError::new(
            "criteria.max_price",
            "Maximum price must be greater than 0",
        ));
    }

    if options.cycle_interval_secs == Some(0) {
        errors.push(ValidationError::new(
            "cycle_interval_secs",
            "Cycle interval must be greater than 0",
        ));
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::Money;
    use crate::ratelimit::{Quota, RateLimitConfig};
    use crate::strategy::StrategyKind;
    use crate::swarm::{SwarmBudget, TargetCriteria, TimeWindow};
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 1, 9, 0, 0).unwrap()
    }

    fn options() -> SwarmOptions {
        SwarmOptions::new("lamps", SwarmBudget::new(Money::from_dollars(500.0)))
            .with_agent_count(5)
            .with_duration_minutes(60)
    }

    fn fields(errors: &[ValidationError]) -> Vec<&str> {
        errors.iter().map(|e| e.field.as_str()).collect()
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&BidSwarmConfig::default()).is_ok());
    }

    #[test]
    fn test_config_errors_are_collected() {
        let mut config = BidSwarmConfig::default()
            .with_rate_limits(RateLimitConfig::default().with_quota(ApiCategory::Bid, Quota::new(10, 5)))
            .with_log_level("loud");
        config.controller.cycle_interval_secs = 0;
        config.controller.strategy.negotiator.concession_rate = 1.5;
        config.retry.backoff.max_ms = 1;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            fields(&errors),
            vec![
                "controller.cycle_interval_secs",
                "controller.strategy.negotiator.concession_rate",
                "rate_limits.quotas.bid",
                "retry.backoff.max_ms",
                "logging.level",
            ]
        );

        let err = validate_config_result(&config).unwrap_err();
        assert!(err.to_string().contains("logging.level"));
    }

    #[test]
    fn test_valid_options() {
        assert!(validate_swarm_options(&options(), now(), 50).is_empty());
    }

    #[test]
    fn test_options_report_every_violation() {
        let mut bad = SwarmOptions::new("", SwarmBudget::new(Money::ZERO).with_reserve_percent(120.0))
            .with_criteria(
                TargetCriteria::new(["lamp"])
                    .with_price_range(Some(Money::from_dollars(50.0)), Some(Money::from_dollars(10.0))),
            )
            .with_strategy_weight(StrategyKind::Sniper, 0.0);
        bad.cycle_interval_secs = Some(0);

        let errors = validate_swarm_options(&bad, now(), 50);
        assert_eq!(
            fields(&errors),
            vec![
                "name",
                "budget.total",
                "budget.reserve_percent",
                "window",
                "strategy_distribution",
                "strategy_weights.sniper",
                "criteria.min_price",
                "cycle_interval_secs",
            ]
        );
    }

    #[test]
    fn test_window_checks() {
        let expired = options().with_window(TimeWindow::new(
            now() - Duration::hours(2),
            now() - Duration::hours(1),
        ));
        assert_eq!(fields(&validate_swarm_options(&expired, now(), 50)), vec!["window"]);

        let inverted = options().with_window(TimeWindow::new(now() + Duration::hours(1), now()));
        assert_eq!(fields(&validate_swarm_options(&inverted, now(), 50)), vec!["window"]);

        let zero = SwarmOptions::new("lamps", SwarmBudget::new(Money::from_dollars(10.0)))
            .with_agent_count(1)
            .with_duration_minutes(0);
        assert_eq!(fields(&validate_swarm_options(&zero, now(), 50)), vec!["duration_minutes"]);
    }

    #[test]
    fn test_agent_limits() {
        let crowded = options().with_agent_count(60);
        assert_eq!(
            fields(&validate_swarm_options(&crowded, now(), 50)),
            vec!["strategy_distribution"]
        );

        let starved = SwarmOptions::new("lamps", SwarmBudget::new(Money::from_cents(3)).with_reserve_percent(0.0))
            .with_agent_count(5)
            .with_duration_minutes(60);
        assert_eq!(fields(&validate_swarm_options(&starved, now(), 50)), vec!["budget.total"]);
    }
}
