/// Analytics queries over events, devices and metrics
///
/// Every query is scoped to one project that the caller has already been
/// authorized for (see [`crate::auth::authorization::authorize`]). Filters are
/// optional and combine with AND; soft-deleted rows never appear.
///
/// SQL is assembled with [`sqlx::QueryBuilder`] so that every filter value is a
/// bind parameter.

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::models::{
    device::{Device, DEVICE_COLUMNS},
    event::{Event, EventType, EVENT_COLUMNS},
    metric::{Metric, MetricType, PeriodType, METRIC_COLUMNS},
};

pub const DEFAULT_LIMIT: i64 = 100;
pub const MAX_LIMIT: i64 = 1000;

/// Normalized limit/offset pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub limit: i64,
    pub offset: i64,
}

impl Pagination {
    /// Missing or non-positive limits fall back to [`DEFAULT_LIMIT`], large ones
    /// are clamped to [`MAX_LIMIT`]; negative offsets become 0
    pub fn new(limit: Option<i64>, offset: Option<i64>) -> Self {
        let limit = match limit {
            Some(l) if l > MAX_LIMIT => MAX_LIMIT,
            Some(l) if l > 0 => l,
            _ => DEFAULT_LIMIT,
        };
        let offset = offset.filter(|o| *o > 0).unwrap_or(0);

        Self { limit, offset }
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self::new(None, None)
    }
}

/// Filters for [`query_events`]
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub event_type: Option<EventType>,
    pub event_name: Option<String>,
    /// Client device identifier
    pub device_id: Option<String>,
    pub platform: Option<String>,
    /// Inclusive lower bound on the client timestamp
    pub start_date: Option<DateTime<Utc>>,
    /// Inclusive upper bound on the client timestamp
    pub end_date: Option<DateTime<Utc>>,
    pub pagination: Pagination,
}

/// Filters for [`query_devices`]
#[derive(Debug, Clone, Default)]
pub struct DeviceFilter {
    pub platform: Option<String>,
    /// `first_seen >= start_date`
    pub start_date: Option<DateTime<Utc>>,
    /// `last_seen <= end_date`
    pub end_date: Option<DateTime<Utc>>,
    pub pagination: Pagination,
}

/// Filters for [`query_metrics`]
#[derive(Debug, Clone, Default)]
pub struct MetricFilter {
    pub metric_type: Option<MetricType>,
    pub period: Option<PeriodType>,
    /// Inclusive bounds on `period_start`
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

/// A page of events, newest first by server receive time
pub async fn query_events(
    pool: &PgPool,
    project_id: Uuid,
    filter: &EventFilter,
) -> Result<Vec<Event>, sqlx::Error> {
    // An identifier that names no device matches nothing
    let device = match &filter.device_id {
        Some(client_id) => match Device::find_live(pool, project_id, client_id).await? {
            Some(device) => Some(device.id),
            None => {
                tracing::debug!(project_id = %project_id, device_id = %client_id, "Device filter matched no device");
                return Ok(Vec::new());
            }
        },
        None => None,
    };

    let mut qb: QueryBuilder<Postgres> =
        QueryBuilder::new(format!("SELECT {} FROM events WHERE project_id = ", EVENT_COLUMNS));
    qb.push_bind(project_id);
    qb.push(" AND deleted_at IS NULL");

    if let Some(event_type) = filter.event_type {
        qb.push(" AND event_type = ").push_bind(event_type);
    }
    if let Some(name) = &filter.event_name {
        qb.push(" AND event_name = ").push_bind(name.clone());
    }
    if let Some(device_id) = device {
        qb.push(" AND device_id = ").push_bind(device_id);
    }
    if let Some(platform) = &filter.platform {
        qb.push(" AND device_id IN (SELECT id FROM devices WHERE project_id = ")
            .push_bind(project_id)
            .push(" AND platform = ")
            .push_bind(platform.clone())
            .push(" AND deleted_at IS NULL)");
    }
    if let Some(start) = filter.start_date {
        qb.push(" AND timestamp >= ").push_bind(start);
    }
    if let Some(end) = filter.end_date {
        qb.push(" AND timestamp <= ").push_bind(end);
    }

    qb.push(" ORDER BY received_at DESC, id DESC");
    push_pagination(&mut qb, filter.pagination);

    qb.build_query_as::<Event>().fetch_all(pool).await
}

/// A page of devices, most recently seen first
pub async fn query_devices(
    pool: &PgPool,
    project_id: Uuid,
    filter: &DeviceFilter,
) -> Result<Vec<Device>, sqlx::Error> {
    let mut qb: QueryBuilder<Postgres> =
        QueryBuilder::new(format!("SELECT {} FROM devices WHERE project_id = ", DEVICE_COLUMNS));
    qb.push_bind(project_id);
    qb.push(" AND deleted_at IS NULL");

    if let Some(platform) = &filter.platform {
        qb.push(" AND platform = ").push_bind(platform.clone());
    }
    if let Some(start) = filter.start_date {
        qb.push(" AND first_seen >= ").push_bind(start);
    }
    if let Some(end) = filter.end_date {
        qb.push(" AND last_seen <= ").push_bind(end);
    }

    qb.push(" ORDER BY last_seen DESC, id DESC");
    push_pagination(&mut qb, filter.pagination);

    qb.build_query_as::<Device>().fetch_all(pool).await
}

/// Metrics in chronological order of their period
pub async fn query_metrics(
    pool: &PgPool,
    project_id: Uuid,
    filter: &MetricFilter,
) -> Result<Vec<Metric>, sqlx::Error> {
    let mut qb: QueryBuilder<Postgres> =
        QueryBuilder::new(format!("SELECT {} FROM metrics WHERE project_id = ", METRIC_COLUMNS));
    qb.push_bind(project_id);
    qb.push(" AND deleted_at IS NULL");

    if let Some(metric_type) = filter.metric_type {
        qb.push(" AND metric_type = ").push_bind(metric_type);
    }
    if let Some(period) = filter.period {
        qb.push(" AND period = ").push_bind(period);
    }
    if let Some(start) = filter.start_date {
        qb.push(" AND period_start >= ").push_bind(start);
    }
    if let Some(end) = filter.end_date {
        qb.push(" AND period_start <= ").push_bind(end);
    }

    qb.push(" ORDER BY period_start ASC");

    qb.build_query_as::<Metric>().fetch_all(pool).await
}

fn push_pagination(qb: &mut QueryBuilder<'_, Postgres>, page: Pagination) {
    qb.push(" LIMIT ").push_bind(page.limit);
    qb.push(" OFFSET ").push_bind(page.offset);
}
