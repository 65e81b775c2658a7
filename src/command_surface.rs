//! JSON command surface over a [`SwarmController`]
//!
//! Every command takes a JSON parameter object, validates it into a typed
//! request and answers with a [`CommandResponse`]. Errors never escape as
//! `Err`: they come back as `success: false` with a message, so a tool host
//! can forward responses verbatim.

use crate::events::{EventFilter, EventType};
use crate::ids::{AgentId, ListingId, SwarmId};
use crate::swarm::{SwarmController, SwarmOptions};
use crate::{BidSwarmError, Result};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

// ============================================================================
// Request/Response types
// ============================================================================

/// Uniform command response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandResponse {
    pub success: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl CommandResponse {
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            error: None,
            data: Some(data),
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            data: None,
        }
    }

    fn from_result<T: Serialize>(result: Result<T>) -> Self {
        match result.and_then(|value| serde_json::to_value(value).map_err(BidSwarmError::from)) {
            Ok(data) => Self::ok(data),
            Err(e) => Self::failure(e.to_string()),
        }
    }
}

/// Parameters naming one swarm
#[derive(Debug, Clone, Deserialize)]
pub struct SwarmRequest {
    pub swarm_id: String,
}

/// Parameters for `terminate`
#[derive(Debug, Clone, Deserialize)]
pub struct TerminateRequest {
    pub swarm_id: String,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Parameters for `agent_status`
#[derive(Debug, Clone, Deserialize)]
pub struct AgentRequest {
    pub swarm_id: String,
    pub agent_id: String,
}

/// Parameters for `events`
#[derive(Debug, Clone, Deserialize)]
pub struct EventsRequest {
    pub swarm_id: String,
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub listing_id: Option<String>,
    /// Event type names, e.g. `BID_PLACED`
    #[serde(default)]
    pub event_types: Vec<String>,
    #[serde(default)]
    pub since: Option<DateTime<Utc>>,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl EventsRequest {
    fn filter(&self) -> Result<EventFilter> {
        let mut filter = EventFilter::for_swarm(&SwarmId::new(self.swarm_id.as_str()));
        if let Some(agent_id) = &self.agent_id {
            filter = filter.with_agent(&AgentId::new(agent_id.as_str()));
        }
        if let Some(listing_id) = &self.listing_id {
            filter = filter.with_listing(&ListingId::new(listing_id.as_str()));
        }
        let mut unknown = Vec::new();
        for name in &self.event_types {
            match EventType::parse(name) {
                Some(event_type) => filter = filter.with_type(event_type),
                None => unknown.push(format!("event_types: unknown event type '{}'", name)),
            }
        }
        if !unknown.is_empty() {
            return Err(BidSwarmError::Configuration(unknown));
        }
        if let Some(since) = self.since {
            filter = filter.since(since);
        }
        if let Some(limit) = self.limit {
            filter = filter.with_limit(limit);
        }
        Ok(filter)
    }
}

/// Command names accepted by [`CommandSurface::execute`]
pub const COMMANDS: [&str; 8] = [
    "create",
    "start",
    "pause",
    "terminate",
    "status",
    "agent_status",
    "insights",
    "events",
];

fn parse<T: DeserializeOwned>(params: Value) -> Result<T> {
    serde_json::from_value(params)
        .map_err(|e| BidSwarmError::Configuration(vec![format!("params: {}", e)]))
}

// ============================================================================
// Surface
// ============================================================================

/// Command adapter owned by a tool host
#[derive(Debug, Clone)]
pub struct CommandSurface {
    controller: SwarmController,
}

impl CommandSurface {
    pub fn new(controller: SwarmController) -> Self {
        Self { controller }
    }

    pub fn controller(&self) -> &SwarmController {
        &self.controller
    }

    /// Dispatch a command by name
    pub fn execute(&self, command: &str, params: Value) -> CommandResponse {
        debug!(command, "Executing command");
        let response = match command {
            "create" => self.create(params),
            "start" => self.start(params),
            "pause" => self.pause(params),
            "terminate" => self.terminate(params),
            "status" => self.status(params),
            "agent_status" => self.agent_status(params),
            "insights" => self.insights(params),
            "events" => self.events(params),
            other => CommandResponse::failure(format!(
                "unknown command '{}', expected one of: {}",
                other,
                COMMANDS.join(", ")
            )),
        };
        if let Some(error) = &response.error {
            warn!(command, error = %error, "Command failed");
        }
        response
    }

    /// `params`: a swarm definition ([`SwarmOptions`])
    pub fn create(&self, params: Value) -> CommandResponse {
        CommandResponse::from_result(parse::<SwarmOptions>(params).and_then(|options| {
            let swarm_id = self.controller.create_swarm(options)?;
            Ok(json!({ "swarm_id": swarm_id }))
        }))
    }

    pub fn start(&self, params: Value) -> CommandResponse {
        CommandResponse::from_result(parse::<SwarmRequest>(params).and_then(|request| {
            let id = SwarmId::new(request.swarm_id);
            self.controller.start_swarm(&id)?;
            Ok(json!({ "swarm_id": id, "status": "running" }))
        }))
    }

    pub fn pause(&self, params: Value) -> CommandResponse {
        CommandResponse::from_result(parse::<SwarmRequest>(params).and_then(|request| {
            let id = SwarmId::new(request.swarm_id);
            self.controller.pause_swarm(&id)?;
            Ok(json!({ "swarm_id": id, "status": "paused" }))
        }))
    }

    pub fn terminate(&self, params: Value) -> CommandResponse {
        CommandResponse::from_result(parse::<TerminateRequest>(params).and_then(|request| {
            let id = SwarmId::new(request.swarm_id);
            let reason = request.reason.unwrap_or_else(|| "terminated by command".to_string());
            self.controller.terminate_swarm(&id, &reason)?;
            Ok(json!({ "swarm_id": id, "status": "terminated", "reason": reason }))
        }))
    }

    pub fn status(&self, params: Value) -> CommandResponse {
        CommandResponse::from_result(
            parse::<SwarmRequest>(params)
                .and_then(|request| self.controller.get_status(&SwarmId::new(request.swarm_id))),
        )
    }

    pub fn agent_status(&self, params: Value) -> CommandResponse {
        CommandResponse::from_result(parse::<AgentRequest>(params).and_then(|request| {
            self.controller.get_agent_status(
                &SwarmId::new(request.swarm_id),
                &AgentId::new(request.agent_id),
            )
        }))
    }

    pub fn insights(&self, params: Value) -> CommandResponse {
        CommandResponse::from_result(
            parse::<SwarmRequest>(params)
                .and_then(|request| self.controller.insights(&SwarmId::new(request.swarm_id))),
        )
    }

    pub fn events(&self, params: Value) -> CommandResponse {
        CommandResponse::from_result(parse::<EventsRequest>(params).and_then(|request| {
            let filter = request.filter()?;
            let events = self.controller.query_events(&filter);
            Ok(json!({ "count": events.len(), "events": events }))
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::marketplace::SimulatedMarketplace;
    use crate::swarm::ControllerConfig;
    use chrono::TimeZone;
    use std::sync::Arc;

    fn surface() -> CommandSurface {
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 5, 1, 9, 0, 0).unwrap()));
        let market = Arc::new(SimulatedMarketplace::new(clock.clone()));
        CommandSurface::new(SwarmController::new(
            ControllerConfig::default().without_driver(),
            market,
            clock,
        ))
    }

    fn create(surface: &CommandSurface) -> String {
        let response = surface.execute(
            "create",
            json!({
                "name": "lamps",
                "budget": { "total": 500.0, "reserve_percent": 5.0 },
                "criteria": { "search_terms": ["lamp"] },
                "agent_count": 5,
                "duration_minutes": 120
            }),
        );
        assert!(response.success, "{:?}", response.error);
        response.data.unwrap()["swarm_id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_lifecycle_commands() {
        let surface = surface();
        let swarm_id = create(&surface);

        assert!(surface.execute("start", json!({ "swarm_id": swarm_id })).success);
        let status = surface.execute("status", json!({ "swarm_id": swarm_id }));
        assert!(status.success);
        let data = status.data.unwrap();
        assert_eq!(data["swarm"]["status"], "running");
        assert_eq!(data["agents"].as_array().unwrap().len(), 5);

        let agent_id = data["agents"][0]["id"].as_str().unwrap().to_string();
        let agent = surface.execute(
            "agent_status",
            json!({ "swarm_id": swarm_id, "agent_id": agent_id }),
        );
        assert!(agent.success);

        assert!(surface.execute("pause", json!({ "swarm_id": swarm_id })).success);
        let terminated = surface.execute(
            "terminate",
            json!({ "swarm_id": swarm_id, "reason": "budget review" }),
        );
        assert!(terminated.success);
        assert_eq!(terminated.data.unwrap()["reason"], "budget review");

        let events = surface.execute(
            "events",
            json!({ "swarm_id": swarm_id, "event_types": ["SWARM_PAUSED", "SWARM_TERMINATED"] }),
        );
        assert_eq!(events.data.unwrap()["count"], 2);

        assert!(surface.execute("insights", json!({ "swarm_id": swarm_id })).success);
    }

    #[test]
    fn test_failures_are_responses() {
        let surface = surface();

        let unknown = surface.execute("launch", json!({}));
        assert!(!unknown.success);
        assert!(unknown.error.unwrap().contains("unknown command"));

        let missing = surface.execute("status", json!({ "swarm_id": "nope" }));
        assert!(!missing.success);
        assert!(missing.error.unwrap().contains("nope"));

        let malformed = surface.execute("start", json!({ "id": 3 }));
        assert!(!malformed.success);
        assert!(malformed.error.unwrap().contains("params"));

        let invalid = surface.execute(
            "create",
            json!({ "name": "", "budget": { "total": 0.0 }, "duration_minutes": 10 }),
        );
        assert!(!invalid.success);
        let error = invalid.error.unwrap();
        assert!(error.contains("name"));
        assert!(error.contains("budget.total"));
    }

    #[test]
    fn test_events_rejects_unknown_types() {
        let surface = surface();
        let response = surface.execute(
            "events",
            json!({ "swarm_id": "s-1", "event_types": ["BID_PLACED", "BID_SNIPED"] }),
        );
        assert!(!response.success);
        assert!(response.error.unwrap().contains("BID_SNIPED"));
    }

    #[test]
    fn test_response_serialization_omits_empty_fields() {
        let value = serde_json::to_value(CommandResponse::failure("boom")).unwrap();
        assert_eq!(value, json!({ "success": false, "error": "boom" }));
    }
}
