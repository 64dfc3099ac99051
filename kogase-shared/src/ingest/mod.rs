/// Telemetry ingestion pipeline
///
/// Turns SDK payloads into stored devices and events.
///
/// # Single events
///
/// [`IngestPipeline::ingest`] validates the payload, then opens a transaction in
/// which it resolves the device (see [`registry`]) and appends the event. A
/// payload that fails validation never reaches the store.
///
/// # Batches
///
/// [`IngestPipeline::ingest_batch`] validates *every* payload first; one bad
/// entry rejects the batch. The valid batch is then written in a single
/// transaction, events in payload order, with device resolution memoised per
/// identifier so N events from one device cause one device upsert. If any write
/// fails the transaction is rolled back and nothing from the batch is visible.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use kogase_shared::ingest::{store::PgIngestStore, EventPayload, IngestPipeline};
/// # use sqlx::PgPool;
/// # use uuid::Uuid;
///
/// # async fn example(pool: PgPool, project_id: Uuid) -> Result<(), Box<dyn std::error::Error>> {
/// let pipeline = IngestPipeline::new(Arc::new(PgIngestStore::new(pool)));
///
/// let payload: EventPayload = serde_json::from_value(serde_json::json!({
///     "device_id": "d1",
///     "event_type": "custom",
///     "event_name": "level_up",
///     "platform": "iOS",
///     "os_version": "17",
///     "app_version": "1.0"
/// }))?;
///
/// let event = pipeline.ingest(project_id, payload, "203.0.113.9").await?;
/// println!("recorded {}", event.id);
/// # Ok(())
/// # }
/// ```

pub mod registry;
pub mod store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::net::IpAddr;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::event::{Event, EventType, NewEvent};
use registry::{BatchDeviceCache, DeviceReport};
use store::{IngestStore, IngestTx, StoreError};

/// An event as sent by an SDK client
///
/// Every field is optional at the serde level so that a missing field is reported
/// as a validation error naming the field, rather than as a parse failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventPayload {
    pub device_id: Option<String>,
    pub event_type: Option<String>,
    pub event_name: Option<String>,
    pub parameters: Option<Map<String, JsonValue>>,
    pub timestamp: Option<DateTime<Utc>>,
    pub platform: Option<String>,
    pub os_version: Option<String>,
    pub app_version: Option<String>,
}

/// Body of `POST /sdk/events`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchPayload {
    #[serde(default)]
    pub events: Vec<EventPayload>,
}

/// Body of `POST /sdk/installation`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstallationPayload {
    pub device_id: Option<String>,
    pub platform: Option<String>,
    pub app_version: Option<String>,
    pub os_version: Option<String>,
    pub properties: Option<Map<String, JsonValue>>,
}

/// Event name recorded for installation reports
pub const INSTALLATION_EVENT_NAME: &str = "installation";

impl From<InstallationPayload> for EventPayload {
    fn from(install: InstallationPayload) -> Self {
        EventPayload {
            device_id: install.device_id,
            event_type: Some(EventType::Install.as_str().to_string()),
            event_name: Some(INSTALLATION_EVENT_NAME.to_string()),
            parameters: install.properties,
            timestamp: None,
            platform: install.platform,
            os_version: install.os_version,
            app_version: install.app_version,
        }
    }
}

/// A payload that passed validation
#[derive(Debug, Clone, PartialEq)]
pub struct ValidEvent {
    pub device_id: String,
    pub event_type: EventType,
    pub event_name: String,
    pub parameters: Map<String, JsonValue>,
    pub timestamp: Option<DateTime<Utc>>,
    pub platform: String,
    pub os_version: String,
    pub app_version: String,
}

/// Error type for ingestion
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("{} is required", field_path(.index, .field))]
    MissingField {
        /// Position in a batch, `None` for single events
        index: Option<usize>,
        field: &'static str,
    },

    #[error("{} has unknown value '{value}'", field_path(.index, "event_type"))]
    InvalidEventType { index: Option<usize>, value: String },

    #[error("{} must be at most {max} characters", field_path(.index, .field))]
    TooLong {
        index: Option<usize>,
        field: &'static str,
        max: usize,
    },

    #[error("events must contain at least one event")]
    EmptyBatch,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl IngestError {
    /// Dotted path of the offending field, e.g. `events[2].device_id`
    pub fn field(&self) -> Option<String> {
        match self {
            IngestError::MissingField { index, field } => Some(field_path(index, field)),
            IngestError::InvalidEventType { index, .. } => Some(field_path(index, "event_type")),
            IngestError::TooLong { index, field, .. } => Some(field_path(index, field)),
            IngestError::EmptyBatch => Some("events".to_string()),
            IngestError::Store(_) => None,
        }
    }

    fn at(self, index: usize) -> Self {
        match self {
            IngestError::MissingField { field, .. } => IngestError::MissingField {
                index: Some(index),
                field,
            },
            IngestError::InvalidEventType { value, .. } => IngestError::InvalidEventType {
                index: Some(index),
                value,
            },
            IngestError::TooLong { field, max, .. } => IngestError::TooLong {
                index: Some(index),
                field,
                max,
            },
            other => other,
        }
    }
}

fn field_path(index: &Option<usize>, field: &str) -> String {
    match index {
        Some(i) => format!("events[{}].{}", i, field),
        None => field.to_string(),
    }
}

/// Column widths of `devices.device_id` and `events.event_name`
pub const MAX_NAME_LENGTH: usize = 255;

/// Column width of `devices.platform`, `os_version` and `app_version`
pub const MAX_VERSION_LENGTH: usize = 64;

fn required(value: Option<String>, field: &'static str, max: usize) -> Result<String, IngestError> {
    match value {
        Some(v) if v.trim().is_empty() => Err(IngestError::MissingField { index: None, field }),
        Some(v) if v.chars().count() > max => Err(IngestError::TooLong {
            index: None,
            field,
            max,
        }),
        Some(v) => Ok(v),
        None => Err(IngestError::MissingField { index: None, field }),
    }
}

/// Normalises the caller address for storage; anything that is not an IP
/// address is stored as unknown
fn stored_ip(client_ip: &str) -> String {
    client_ip
        .trim()
        .parse::<IpAddr>()
        .map(|ip| ip.to_string())
        .unwrap_or_default()
}

impl EventPayload {
    /// Checks required fields and parses the event type
    ///
    /// When `fixed_type` is set (convenience endpoints), the payload's own
    /// `event_type` is ignored and a missing `event_name` defaults to the type's
    /// name.
    pub fn validate(self, fixed_type: Option<EventType>) -> Result<ValidEvent, IngestError> {
        let device_id = required(self.device_id, "device_id", MAX_NAME_LENGTH)?;

        let event_type = match fixed_type {
            Some(ty) => ty,
            None => {
                let raw = required(self.event_type, "event_type", MAX_NAME_LENGTH)?;
                match raw.parse::<EventType>() {
                    Ok(ty) => ty,
                    Err(_) => {
                        return Err(IngestError::InvalidEventType {
                            index: None,
                            value: raw,
                        })
                    }
                }
            }
        };

        let event_name = match (fixed_type, self.event_name) {
            (Some(ty), name) if name.as_deref().map_or(true, |n| n.trim().is_empty()) => {
                ty.as_str().to_string()
            }
            (_, name) => required(name, "event_name", MAX_NAME_LENGTH)?,
        };

        Ok(ValidEvent {
            device_id,
            event_type,
            event_name,
            parameters: self.parameters.unwrap_or_default(),
            timestamp: self.timestamp,
            platform: required(self.platform, "platform", MAX_VERSION_LENGTH)?,
            os_version: required(self.os_version, "os_version", MAX_VERSION_LENGTH)?,
            app_version: required(self.app_version, "app_version", MAX_VERSION_LENGTH)?,
        })
    }
}

/// Validates a whole batch, reporting the first bad entry by index
pub fn validate_batch(payloads: Vec<EventPayload>) -> Result<Vec<ValidEvent>, IngestError> {
    if payloads.is_empty() {
        return Err(IngestError::EmptyBatch);
    }

    payloads
        .into_iter()
        .enumerate()
        .map(|(i, payload)| payload.validate(None).map_err(|e| e.at(i)))
        .collect()
}

/// Writes validated events through an [`IngestStore`]
#[derive(Clone)]
pub struct IngestPipeline {
    store: Arc<dyn IngestStore>,
}

impl IngestPipeline {
    pub fn new(store: Arc<dyn IngestStore>) -> Self {
        Self { store }
    }

    /// Records one event
    pub async fn ingest(
        &self,
        project_id: Uuid,
        payload: EventPayload,
        client_ip: &str,
    ) -> Result<Event, IngestError> {
        let event = payload.validate(None)?;
        self.record_one(project_id, event, client_ip).await
    }

    /// Records one event with its type fixed by the caller
    pub async fn ingest_as(
        &self,
        project_id: Uuid,
        event_type: EventType,
        payload: EventPayload,
        client_ip: &str,
    ) -> Result<Event, IngestError> {
        let event = payload.validate(Some(event_type))?;
        self.record_one(project_id, event, client_ip).await
    }

    /// Records a batch atomically, returning the number of events stored
    pub async fn ingest_batch(
        &self,
        project_id: Uuid,
        payloads: Vec<EventPayload>,
        client_ip: &str,
    ) -> Result<usize, IngestError> {
        let events = validate_batch(payloads)?;
        let now = Utc::now();

        let mut tx = self.store.begin().await?;
        let mut cache = BatchDeviceCache::new();

        let mut written = 0;
        for event in &events {
            match record(tx.as_mut(), &mut cache, project_id, event, client_ip, now).await {
                Ok(_) => written += 1,
                Err(e) => {
                    tracing::warn!(
                        project_id = %project_id,
                        failed_at = written,
                        batch_size = events.len(),
                        error = %e,
                        "Batch ingestion failed, rolling back"
                    );
                    abort(tx).await;
                    return Err(e.into());
                }
            }
        }

        tx.commit().await?;

        tracing::info!(
            project_id = %project_id,
            events = written,
            devices = cache.len(),
            "Recorded event batch"
        );
        Ok(written)
    }

    async fn record_one(
        &self,
        project_id: Uuid,
        event: ValidEvent,
        client_ip: &str,
    ) -> Result<Event, IngestError> {
        let now = Utc::now();
        let mut tx = self.store.begin().await?;
        let mut cache = BatchDeviceCache::new();

        match record(tx.as_mut(), &mut cache, project_id, &event, client_ip, now).await {
            Ok(stored) => {
                tx.commit().await?;
                tracing::debug!(
                    project_id = %project_id,
                    event_id = %stored.id,
                    event_type = stored.event_type.as_str(),
                    "Recorded event"
                );
                Ok(stored)
            }
            Err(e) => {
                abort(tx).await;
                Err(e.into())
            }
        }
    }
}

async fn record(
    tx: &mut dyn IngestTx,
    cache: &mut BatchDeviceCache,
    project_id: Uuid,
    event: &ValidEvent,
    client_ip: &str,
    now: DateTime<Utc>,
) -> Result<Event, StoreError> {
    let ip_address = stored_ip(client_ip);
    let report = DeviceReport {
        project_id,
        device_id: &event.device_id,
        platform: &event.platform,
        os_version: &event.os_version,
        app_version: &event.app_version,
        ip_address: &ip_address,
    };
    let device = cache.resolve(tx, &report, now).await?;

    tx.insert_event(&NewEvent {
        id: Uuid::new_v4(),
        project_id,
        device_id: device.id,
        event_type: event.event_type,
        event_name: event.event_name.clone(),
        parameters: JsonValue::Object(event.parameters.clone()),
        timestamp: event.timestamp.unwrap_or(now),
        received_at: now,
    })
    .await
}

async fn abort(tx: Box<dyn IngestTx>) {
    if let Err(e) = tx.rollback().await {
        tracing::error!(error = %e, "Rollback failed");
    }
}
