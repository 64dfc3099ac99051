/// Event model: immutable telemetry facts
///
/// Events are append-only. `timestamp` is whatever the client reported (or the
/// server time if it reported nothing); `received_at` is always the server clock.
///
/// # Schema
///
/// ```sql
/// CREATE TYPE event_type AS ENUM ('session_start', 'session_end', 'install', 'uninstall', 'custom');
///
/// CREATE TABLE events (
///     id UUID PRIMARY KEY,
///     project_id UUID NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
///     device_id UUID NOT NULL REFERENCES devices(id) ON DELETE CASCADE,
///     event_type event_type NOT NULL,
///     event_name VARCHAR(255) NOT NULL,
///     parameters JSONB NOT NULL DEFAULT '{}'::jsonb,
///     timestamp TIMESTAMPTZ NOT NULL,
///     received_at TIMESTAMPTZ NOT NULL,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     deleted_at TIMESTAMPTZ
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::PgExecutor;
use std::str::FromStr;
use uuid::Uuid;

use super::UnknownVariant;

/// Kind of telemetry event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "event_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    SessionStart,
    SessionEnd,
    Install,
    Uninstall,
    Custom,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::SessionStart => "session_start",
            EventType::SessionEnd => "session_end",
            EventType::Install => "install",
            EventType::Uninstall => "uninstall",
            EventType::Custom => "custom",
        }
    }

}

impl FromStr for EventType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "session_start" => Ok(EventType::SessionStart),
            "session_end" => Ok(EventType::SessionEnd),
            "install" => Ok(EventType::Install),
            "uninstall" => Ok(EventType::Uninstall),
            "custom" => Ok(EventType::Custom),
            other => Err(UnknownVariant::new("event type", other)),
        }
    }
}

/// A stored event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Event {
    pub id: Uuid,

    pub project_id: Uuid,

    /// Internal device ID (not the client identifier)
    pub device_id: Uuid,

    pub event_type: EventType,

    pub event_name: String,

    /// Arbitrary client payload, a JSON object
    pub parameters: JsonValue,

    /// Client-reported occurrence time
    pub timestamp: DateTime<Utc>,

    /// Server time at persistence
    pub received_at: DateTime<Utc>,

    pub created_at: DateTime<Utc>,

    #[serde(skip_serializing, default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

/// An event ready to be persisted
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub id: Uuid,
    pub project_id: Uuid,
    pub device_id: Uuid,
    pub event_type: EventType,
    pub event_name: String,
    pub parameters: JsonValue,
    pub timestamp: DateTime<Utc>,
    pub received_at: DateTime<Utc>,
}

pub(crate) const EVENT_COLUMNS: &str = "id, project_id, device_id, event_type, event_name, \
     parameters, timestamp, received_at, created_at, deleted_at";

impl Event {
    /// Appends an event
    pub async fn insert<'e>(
        executor: impl PgExecutor<'e>,
        event: &NewEvent,
    ) -> Result<Self, sqlx::Error> {
        let query = format!(
            "INSERT INTO events (id, project_id, device_id, event_type, event_name,
                                 parameters, timestamp, received_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             RETURNING {}",
            EVENT_COLUMNS
        );

        sqlx::query_as::<_, Event>(&query)
            .bind(event.id)
            .bind(event.project_id)
            .bind(event.device_id)
            .bind(event.event_type)
            .bind(&event.event_name)
            .bind(&event.parameters)
            .bind(event.timestamp)
            .bind(event.received_at)
            .fetch_one(executor)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_parse() {
        assert_eq!("session_start".parse::<EventType>(), Ok(EventType::SessionStart));
        assert_eq!("session_end".parse::<EventType>(), Ok(EventType::SessionEnd));
        assert_eq!("install".parse::<EventType>(), Ok(EventType::Install));
        assert_eq!("uninstall".parse::<EventType>(), Ok(EventType::Uninstall));
        assert_eq!("custom".parse::<EventType>(), Ok(EventType::Custom));
        assert!("Custom".parse::<EventType>().is_err());

        let err = "level_up".parse::<EventType>().unwrap_err();
        assert_eq!(err.to_string(), "unknown event type 'level_up'");
    }

    #[test]
    fn test_event_type_serde_matches_as_str() {
        for ty in [
            EventType::SessionStart,
            EventType::SessionEnd,
            EventType::Install,
            EventType::Uninstall,
            EventType::Custom,
        ] {
            let json = serde_json::to_string(&ty).unwrap();
            assert_eq!(json, format!("\"{}\"", ty.as_str()));
        }
    }
}
