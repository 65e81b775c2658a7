//! Prometheus metrics for the swarm controller
//!
//! Counters and gauges for cycles, strategy decisions, budget denials and
//! marketplace quota pressure. Exposed through `bidswarm metrics`.

use crate::ratelimit::ApiCategory;
use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_gauge_vec, register_histogram_vec, Counter,
    CounterVec, Encoder, GaugeVec, HistogramVec, TextEncoder,
};

lazy_static! {
    /// Counter: agent cycles by outcome
    pub static ref CYCLES: CounterVec = register_counter_vec!(
        "bidswarm_cycles_total",
        "Agent cycles by outcome",
        &["outcome"]
    )
    .expect("Failed to create cycles metric");

    /// Counter: strategy decisions by strategy and action
    pub static ref DECISIONS: CounterVec = register_counter_vec!(
        "bidswarm_decisions_total",
        "Strategy decisions by strategy and action",
        &["strategy", "action"]
    )
    .expect("Failed to create decisions metric");

    /// Counter: reservations denied for insufficient budget
    pub static ref RESERVATIONS_DENIED: Counter = register_counter!(
        "bidswarm_reservations_denied_total",
        "Reservations denied for insufficient budget"
    )
    .expect("Failed to create reservations_denied metric");

    /// Histogram: time spent waiting on the rate limiter (seconds)
    pub static ref RATE_LIMIT_WAIT: HistogramVec = register_histogram_vec!(
        "bidswarm_rate_limit_wait_seconds",
        "Time spent waiting for a rate limiter token",
        &["category"],
        vec![0.1, 0.5, 1.0, 5.0, 15.0, 30.0, 60.0, 300.0]
    )
    .expect("Failed to create rate_limit_wait metric");

    /// Counter: marketplace API errors by category and status
    pub static ref API_ERRORS: CounterVec = register_counter_vec!(
        "bidswarm_api_errors_total",
        "Marketplace API errors by category and status",
        &["category", "status"]
    )
    .expect("Failed to create api_errors metric");

    /// Gauge: active agents per swarm
    pub static ref ACTIVE_AGENTS: GaugeVec = register_gauge_vec!(
        "bidswarm_active_agents",
        "Number of active agents per swarm",
        &["swarm_id"]
    )
    .expect("Failed to create active_agents metric");

    /// Gauge: dollars spent per swarm
    pub static ref SWARM_SPENT: GaugeVec = register_gauge_vec!(
        "bidswarm_swarm_spent_dollars",
        "Dollars spent per swarm",
        &["swarm_id"]
    )
    .expect("Failed to create swarm_spent metric");
}

/// Record a finished agent cycle ("ok", "error", "skipped")
pub fn record_cycle(outcome: &str) {
    CYCLES.with_label_values(&[outcome]).inc();
}

/// Record one strategy decision
pub fn record_decision(strategy: &str, action: &str) {
    DECISIONS.with_label_values(&[strategy, action]).inc();
}

pub fn record_reservation_denied() {
    RESERVATIONS_DENIED.inc();
}

/// Record a completed wait on the rate limiter
pub fn record_rate_limit_wait(category: ApiCategory, wait_secs: f64) {
    RATE_LIMIT_WAIT
        .with_label_values(&[category.as_str()])
        .observe(wait_secs);
}

/// Increment the API error counter
pub fn record_api_error(category: ApiCategory, status: u16) {
    API_ERRORS
        .with_label_values(&[category.as_str(), &status.to_string()])
        .inc();
}

pub fn set_active_agents(swarm_id: &str, count: usize) {
    ACTIVE_AGENTS
        .with_label_values(&[swarm_id])
        .set(count as f64);
}

pub fn set_swarm_spent(swarm_id: &str, dollars: f64) {
    SWARM_SPENT.with_label_values(&[swarm_id]).set(dollars);
}

/// Encode all metrics as Prometheus text format
pub fn encode_metrics() -> crate::Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| crate::BidSwarmError::Other(format!("Failed to encode metrics: {}", e)))?;
    String::from_utf8(buffer)
        .map_err(|e| crate::BidSwarmError::Other(format!("Metrics are not UTF-8: {}", e)))
}
