/// Device model: one client installation within a project
///
/// Devices are keyed by the client-supplied `device_id`, which is unique only
/// inside a project. The partial unique index below is what keeps concurrent
/// first sightings of the same device from creating two rows; see
/// [`crate::ingest::registry`] for how ingestion uses it.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE devices (
///     id UUID PRIMARY KEY,
///     project_id UUID NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
///     device_id VARCHAR(255) NOT NULL,
///     platform VARCHAR(64) NOT NULL,
///     os_version VARCHAR(64) NOT NULL,
///     app_version VARCHAR(64) NOT NULL,
///     first_seen TIMESTAMPTZ NOT NULL,
///     last_seen TIMESTAMPTZ NOT NULL,
///     ip_address VARCHAR(64) NOT NULL DEFAULT '',
///     country VARCHAR(64) NOT NULL DEFAULT '',
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     deleted_at TIMESTAMPTZ
/// );
/// CREATE UNIQUE INDEX devices_project_device_key
///     ON devices (project_id, device_id) WHERE deleted_at IS NULL;
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgExecutor;
use uuid::Uuid;

/// A stored device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Device {
    pub id: Uuid,

    pub project_id: Uuid,

    /// Client-generated identifier
    pub device_id: String,

    pub platform: String,

    pub os_version: String,

    pub app_version: String,

    /// Set on creation, never updated
    pub first_seen: DateTime<Utc>,

    /// Latest ingestion touching this device
    pub last_seen: DateTime<Utc>,

    pub ip_address: String,

    /// Reserved for geolocation, currently always empty
    pub country: String,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    #[serde(skip_serializing, default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

/// A device seen for the first time
#[derive(Debug, Clone)]
pub struct NewDevice {
    pub id: Uuid,
    pub project_id: Uuid,
    pub device_id: String,
    pub platform: String,
    pub os_version: String,
    pub app_version: String,
    pub ip_address: String,
    /// Becomes both `first_seen` and `last_seen`
    pub seen_at: DateTime<Utc>,
}

/// Liveness fields refreshed on every sighting of a known device
#[derive(Debug, Clone)]
pub struct DeviceTouch {
    pub os_version: String,
    pub app_version: String,
    pub ip_address: String,
    pub seen_at: DateTime<Utc>,
}

pub(crate) const DEVICE_COLUMNS: &str = "id, project_id, device_id, platform, os_version, app_version, \
     first_seen, last_seen, ip_address, country, created_at, updated_at, deleted_at";

impl Device {
    /// Finds the live device with this client identifier in a project
    pub async fn find_live<'e>(
        executor: impl PgExecutor<'e>,
        project_id: Uuid,
        device_id: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query = format!(
            "SELECT {} FROM devices
             WHERE project_id = $1 AND device_id = $2 AND deleted_at IS NULL",
            DEVICE_COLUMNS
        );

        sqlx::query_as::<_, Device>(&query)
            .bind(project_id)
            .bind(device_id)
            .fetch_optional(executor)
            .await
    }

    /// Inserts a device unless a live one with the same identifier exists
    ///
    /// Returns `None` when the uniqueness constraint already holds a row. The
    /// statement does not fail in that case, so an enclosing transaction stays
    /// usable and the caller can re-read the winner.
    pub async fn insert_if_absent<'e>(
        executor: impl PgExecutor<'e>,
        device: &NewDevice,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query = format!(
            "INSERT INTO devices (id, project_id, device_id, platform, os_version, app_version,
                                  first_seen, last_seen, ip_address, country)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $7, $8, '')
             ON CONFLICT (project_id, device_id) WHERE deleted_at IS NULL DO NOTHING
             RETURNING {}",
            DEVICE_COLUMNS
        );

        sqlx::query_as::<_, Device>(&query)
            .bind(device.id)
            .bind(device.project_id)
            .bind(&device.device_id)
            .bind(&device.platform)
            .bind(&device.os_version)
            .bind(&device.app_version)
            .bind(device.seen_at)
            .bind(&device.ip_address)
            .fetch_optional(executor)
            .await
    }

    /// Refreshes the liveness fields of a known device
    ///
    /// `last_seen` only moves forward.
    pub async fn touch<'e>(
        executor: impl PgExecutor<'e>,
        id: Uuid,
        touch: &DeviceTouch,
    ) -> Result<Self, sqlx::Error> {
        let query = format!(
            "UPDATE devices
             SET last_seen = GREATEST(last_seen, $2),
                 os_version = $3,
                 app_version = $4,
                 ip_address = $5,
                 updated_at = NOW()
             WHERE id = $1
             RETURNING {}",
            DEVICE_COLUMNS
        );

        sqlx::query_as::<_, Device>(&query)
            .bind(id)
            .bind(touch.seen_at)
            .bind(&touch.os_version)
            .bind(&touch.app_version)
            .bind(&touch.ip_address)
            .fetch_one(executor)
            .await
    }
}
