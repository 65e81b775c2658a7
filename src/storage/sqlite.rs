//! SQLite store

use super::SwarmStore;
use crate::events::{EventFilter, EventType, Observation, ObservationFilter, SwarmEvent};
use crate::ids::{AgentId, ListingId, SwarmId};
use crate::swarm::{AgentStatusReport, Swarm};
use crate::{BidSwarmError, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::types::ToSql;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};

/// Store configuration
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Path to SQLite database file
    pub path: PathBuf,

    /// Enable WAL mode for better concurrency
    pub wal_mode: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        // Always use ~/.config for consistency across platforms (macOS, Linux)
        let mut path = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push(".config");
        path.push("bidswarm");
        path.push("bidswarm.db");

        Self {
            path,
            wal_mode: true,
        }
    }
}

impl StoreConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }
}

/// Swarm store backed by a single SQLite connection
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

/// Fixed-width RFC 3339 so text ordering matches time ordering
fn ts(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| BidSwarmError::Persistence(format!("bad timestamp '{}': {}", raw, e)))
}

struct EventRow {
    seq: i64,
    event_type: String,
    swarm_id: String,
    agent_id: Option<String>,
    listing_id: Option<String>,
    timestamp: String,
    payload: String,
}

impl EventRow {
    fn into_event(self) -> Result<SwarmEvent> {
        let event_type = EventType::parse(&self.event_type).ok_or_else(|| {
            BidSwarmError::Persistence(format!("unknown event type '{}'", self.event_type))
        })?;
        Ok(SwarmEvent {
            seq: self.seq.max(0) as u64,
            event_type,
            swarm_id: SwarmId::new(self.swarm_id),
            agent_id: self.agent_id.map(AgentId::new),
            listing_id: self.listing_id.map(ListingId::new),
            timestamp: parse_ts(&self.timestamp)?,
            payload: serde_json::from_str(&self.payload)?,
        })
    }
}

/// `WHERE` clause builder with positional parameters
#[derive(Default)]
struct Conditions {
    clauses: Vec<String>,
    params: Vec<Box<dyn ToSql>>,
}

impl Conditions {
    fn push(&mut self, column: &str, value: impl ToSql + 'static) {
        self.compare(column, "=", value);
    }

    fn compare(&mut self, column: &str, op: &str, value: impl ToSql + 'static) {
        self.params.push(Box::new(value));
        self.clauses
            .push(format!("{} {} ?{}", column, op, self.params.len()));
    }

    fn push_in(&mut self, column: &str, values: Vec<String>) {
        if values.is_empty() {
            return;
        }
        let mut placeholders = Vec::with_capacity(values.len());
        for value in values {
            self.params.push(Box::new(value));
            placeholders.push(format!("?{}", self.params.len()));
        }
        self.clauses
            .push(format!("{} IN ({})", column, placeholders.join(", ")));
    }

    fn limit(&mut self, limit: Option<usize>) -> String {
        match limit {
            Some(limit) => {
                self.params.push(Box::new(limit as i64));
                format!(" LIMIT ?{}", self.params.len())
            }
            None => String::new(),
        }
    }

    fn where_sql(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.clauses.join(" AND "))
        }
    }
}

impl SqliteStore {
    /// Open or create a store database
    pub fn open(config: &StoreConfig) -> Result<Self> {
        if let Some(parent) = config.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        tracing::info!(path = %config.path.display(), "Opening swarm database");

        let conn = Connection::open(&config.path)?;
        if config.wal_mode {
            conn.pragma_update(None, "journal_mode", "WAL")?;
        }
        Self::with_connection(conn)
    }

    /// Open a database file with default settings
    pub fn open_path(path: impl AsRef<Path>) -> Result<Self> {
        Self::open(&StoreConfig::new(path.as_ref()))
    }

    /// Create a store with an in-memory database
    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS swarms (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                mode TEXT NOT NULL,
                status TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                data TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS agents (
                id TEXT PRIMARY KEY,
                swarm_id TEXT NOT NULL,
                strategy TEXT NOT NULL,
                status TEXT NOT NULL,
                data TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                seq INTEGER NOT NULL,
                event_type TEXT NOT NULL,
                swarm_id TEXT NOT NULL,
                agent_id TEXT,
                listing_id TEXT,
                timestamp TEXT NOT NULL,
                payload TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS observations (
                id TEXT PRIMARY KEY,
                swarm_id TEXT NOT NULL,
                agent_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                data TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_agents_swarm ON agents(swarm_id);
            CREATE INDEX IF NOT EXISTS idx_events_swarm ON events(swarm_id, timestamp);
            CREATE INDEX IF NOT EXISTS idx_events_agent ON events(agent_id);
            CREATE INDEX IF NOT EXISTS idx_events_listing ON events(listing_id);
            CREATE INDEX IF NOT EXISTS idx_observations_swarm ON observations(swarm_id, timestamp);
            "#,
        )?;
        Ok(())
    }

    fn swarm_updated_at(swarm: &Swarm) -> DateTime<Utc> {
        swarm
            .last_activity
            .or(swarm.started_at)
            .unwrap_or(swarm.created_at)
    }
}

impl SwarmStore for SqliteStore {
    fn create_swarm(&self, swarm: &Swarm) -> Result<()> {
        let data = serde_json::to_string(swarm)?;
        self.conn.lock().execute(
            "INSERT INTO swarms (id, name, mode, status, created_at, updated_at, data)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                swarm.id.as_str(),
                swarm.name,
                swarm.mode.to_string(),
                swarm.status.as_str(),
                ts(&swarm.created_at),
                ts(&Self::swarm_updated_at(swarm)),
                data,
            ],
        )?;
        tracing::debug!(swarm_id = %swarm.id, "Stored swarm");
        Ok(())
    }

    fn update_swarm_state(&self, swarm: &Swarm) -> Result<()> {
        let data = serde_json::to_string(swarm)?;
        self.conn.lock().execute(
            "INSERT INTO swarms (id, name, mode, status, created_at, updated_at, data)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(id) DO UPDATE SET
                status = excluded.status,
                updated_at = excluded.updated_at,
                data = excluded.data",
            params![
                swarm.id.as_str(),
                swarm.name,
                swarm.mode.to_string(),
                swarm.status.as_str(),
                ts(&swarm.created_at),
                ts(&Self::swarm_updated_at(swarm)),
                data,
            ],
        )?;
        Ok(())
    }

    fn create_agent(&self, agent: &AgentStatusReport) -> Result<()> {
        let data = serde_json::to_string(agent)?;
        let status = serde_json::to_value(agent.status)?;
        self.conn.lock().execute(
            "INSERT INTO agents (id, swarm_id, strategy, status, data)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET status = excluded.status, data = excluded.data",
            params![
                agent.id.as_str(),
                agent.swarm_id.as_str(),
                agent.strategy.as_str(),
                status.as_str().unwrap_or_default(),
                data,
            ],
        )?;
        Ok(())
    }

    fn record_event(&self, event: &SwarmEvent) -> Result<()> {
        let payload = serde_json::to_string(&event.payload)?;
        self.conn.lock().execute(
            "INSERT INTO events (seq, event_type, swarm_id, agent_id, listing_id, timestamp, payload)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                event.seq as i64,
                event.event_type.as_str(),
                event.swarm_id.as_str(),
                event.agent_id.as_ref().map(|a| a.as_str()),
                event.listing_id.as_ref().map(|l| l.as_str()),
                ts(&event.timestamp),
                payload,
            ],
        )?;
        Ok(())
    }

    fn query_events(&self, filter: &EventFilter) -> Result<Vec<SwarmEvent>> {
        let mut conditions = Conditions::default();
        if let Some(swarm_id) = &filter.swarm_id {
            conditions.push("swarm_id", swarm_id.as_str().to_string());
        }
        if let Some(agent_id) = &filter.agent_id {
            conditions.push("agent_id", agent_id.as_str().to_string());
        }
        if let Some(listing_id) = &filter.listing_id {
            conditions.push("listing_id", listing_id.as_str().to_string());
        }
        conditions.push_in(
            "event_type",
            filter
                .event_types
                .iter()
                .map(|t| t.as_str().to_string())
                .collect(),
        );
        if let Some(since) = &filter.since {
            conditions.compare("timestamp", ">=", ts(since));
        }

        // Newest first so LIMIT keeps the most recent, then flip back
        let limit = conditions.limit(filter.limit);
        let sql = format!(
            "SELECT seq, event_type, swarm_id, agent_id, listing_id, timestamp, payload
             FROM events{} ORDER BY timestamp DESC, seq DESC, id DESC{}",
            conditions.where_sql(),
            limit
        );

        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(
                rusqlite::params_from_iter(conditions.params.iter()),
                |row| {
                    Ok(EventRow {
                        seq: row.get(0)?,
                        event_type: row.get(1)?,
                        swarm_id: row.get(2)?,
                        agent_id: row.get(3)?,
                        listing_id: row.get(4)?,
                        timestamp: row.get(5)?,
                        payload: row.get(6)?,
                    })
                },
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut events = rows
            .into_iter()
            .map(EventRow::into_event)
            .collect::<Result<Vec<_>>>()?;
        events.reverse();
        Ok(events)
    }

    fn record_observation(&self, observation: &Observation) -> Result<()> {
        let data = serde_json::to_string(observation)?;
        let kind = serde_json::to_value(observation.kind)?;
        self.conn.lock().execute(
            "INSERT INTO observations (id, swarm_id, agent_id, kind, timestamp, data)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                observation.id,
                observation.swarm_id.as_str(),
                observation.agent_id.as_str(),
                kind.as_str().unwrap_or_default(),
                ts(&observation.timestamp),
                data,
            ],
        )?;
        Ok(())
    }

    fn query_observations(&self, filter: &ObservationFilter) -> Result<Vec<Observation>> {
        let mut conditions = Conditions::default();
        if let Some(swarm_id) = &filter.swarm_id {
            conditions.push("swarm_id", swarm_id.as_str().to_string());
        }
        if let Some(agent_id) = &filter.agent_id {
            conditions.push("agent_id", agent_id.as_str().to_string());
        }
        if let Some(kind) = filter.kind {
            let kind = serde_json::to_value(kind)?;
            conditions.push("kind", kind.as_str().unwrap_or_default().to_string());
        }
        let limit = conditions.limit(filter.limit);
        let sql = format!(
            "SELECT data FROM observations{} ORDER BY timestamp DESC, rowid DESC{}",
            conditions.where_sql(),
            limit
        );

        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(
                rusqlite::params_from_iter(conditions.params.iter()),
                |row| row.get::<_, String>(0),
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut observations = rows
            .iter()
            .map(|data| serde_json::from_str::<Observation>(data).map_err(BidSwarmError::from))
            .collect::<Result<Vec<_>>>()?;
        observations.reverse();
        Ok(observations)
    }

    fn load_swarm(&self, id: &SwarmId) -> Result<Option<Swarm>> {
        let data: Option<String> = self
            .conn
            .lock()
            .query_row(
                "SELECT data FROM swarms WHERE id = ?1",
                [id.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        data.map(|d| serde_json::from_str::<Swarm>(&d).map_err(BidSwarmError::from))
            .transpose()
    }

    fn list_swarms(&self) -> Result<Vec<Swarm>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT data FROM swarms ORDER BY created_at, id")?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        rows.iter()
            .map(|d| serde_json::from_str::<Swarm>(d).map_err(BidSwarmError::from))
            .collect()
    }

    fn list_agents(&self, swarm_id: &SwarmId) -> Result<Vec<AgentStatusReport>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT data FROM agents WHERE swarm_id = ?1 ORDER BY id")?;
        let rows = stmt
            .query_map([swarm_id.as_str()], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        rows.iter()
            .map(|d| serde_json::from_str::<AgentStatusReport>(d).map_err(BidSwarmError::from))
            .collect()
    }
}
