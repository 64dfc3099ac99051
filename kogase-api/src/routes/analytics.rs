/// Analytics endpoints
///
/// - `GET /api/v1/dashboard/analytics/events`
/// - `GET /api/v1/dashboard/analytics/devices`
/// - `GET /api/v1/dashboard/analytics/metrics`
///
/// Reachable with either credential. An API key is scoped to its own project;
/// a user names the project with `?project_id=` and needs `View` on it.
///
/// Dates accept RFC 3339 (`2025-03-26T10:00:00Z`) or a plain day
/// (`2025-03-26`); a day used as an upper bound covers the whole day.
/// `limit` and `offset` that do not parse fall back to their defaults.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    extract::{ApiQuery, CurrentPrincipal},
};
use axum::{extract::State, Json};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use kogase_shared::{
    analytics::{
        query_devices, query_events, query_metrics, DeviceFilter, EventFilter, MetricFilter,
        Pagination,
    },
    auth::{
        authorization::{authorize, DenyReason, Permission},
        middleware::Principal,
    },
    models::{
        device::Device,
        event::{Event, EventType},
        metric::Metric,
    },
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Default, Deserialize)]
pub struct EventsQuery {
    pub project_id: Option<String>,
    pub event_type: Option<String>,
    pub event_name: Option<String>,
    pub device_id: Option<String>,
    pub platform: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub limit: Option<String>,
    pub offset: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DevicesQuery {
    pub project_id: Option<String>,
    pub platform: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub limit: Option<String>,
    pub offset: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct MetricsQuery {
    pub project_id: Option<String>,
    pub metric_type: Option<String>,
    pub period: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

pub async fn get_events(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    ApiQuery(query): ApiQuery<EventsQuery>,
) -> ApiResult<Json<Vec<Event>>> {
    let project_id = resolve_project(&state, &principal, query.project_id.as_deref()).await?;

    let event_type = match non_empty(query.event_type) {
        Some(raw) => Some(
            raw.parse::<EventType>()
                .map_err(|e| ApiError::invalid("event_type", e.to_string()))?,
        ),
        None => None,
    };

    let filter = EventFilter {
        event_type,
        event_name: non_empty(query.event_name),
        device_id: non_empty(query.device_id),
        platform: non_empty(query.platform),
        start_date: parse_bound(query.start_date.as_deref(), "start_date", Bound::Start)?,
        end_date: parse_bound(query.end_date.as_deref(), "end_date", Bound::End)?,
        pagination: pagination(query.limit.as_deref(), query.offset.as_deref()),
    };

    let events = query_events(&state.db, project_id, &filter).await?;
    Ok(Json(events))
}

pub async fn get_devices(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    ApiQuery(query): ApiQuery<DevicesQuery>,
) -> ApiResult<Json<Vec<Device>>> {
    let project_id = resolve_project(&state, &principal, query.project_id.as_deref()).await?;

    let filter = DeviceFilter {
        platform: non_empty(query.platform),
        start_date: parse_bound(query.start_date.as_deref(), "start_date", Bound::Start)?,
        end_date: parse_bound(query.end_date.as_deref(), "end_date", Bound::End)?,
        pagination: pagination(query.limit.as_deref(), query.offset.as_deref()),
    };

    let devices = query_devices(&state.db, project_id, &filter).await?;
    Ok(Json(devices))
}

pub async fn get_metrics(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    ApiQuery(query): ApiQuery<MetricsQuery>,
) -> ApiResult<Json<Vec<Metric>>> {
    let project_id = resolve_project(&state, &principal, query.project_id.as_deref()).await?;

    let filter = MetricFilter {
        metric_type: parse_enum(query.metric_type, "metric_type")?,
        period: parse_enum(query.period, "period")?,
        start_date: parse_bound(query.start_date.as_deref(), "start_date", Bound::Start)?,
        end_date: parse_bound(query.end_date.as_deref(), "end_date", Bound::End)?,
    };

    let metrics = query_metrics(&state.db, project_id, &filter).await?;
    Ok(Json(metrics))
}

/// Picks the project a request is about and checks the caller may read it
async fn resolve_project(
    state: &AppState,
    principal: &Principal,
    requested: Option<&str>,
) -> ApiResult<Uuid> {
    let requested = match requested.map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => Some(
            Uuid::parse_str(raw)
                .map_err(|_| ApiError::invalid("project_id", "project_id must be a UUID"))?,
        ),
        None => None,
    };

    let target = match (principal, requested) {
        (Principal::Project { project_id }, Some(id)) if id != *project_id => {
            return Err(ApiError::Forbidden(
                DenyReason::ForeignProject.message().to_string(),
            ));
        }
        (Principal::Project { project_id }, _) => *project_id,
        (Principal::User(_), Some(id)) => id,
        (Principal::User(_), None) => {
            return Err(ApiError::invalid("project_id", "project_id is required"));
        }
    };

    let project = authorize(&state.db, principal, target, Permission::View).await?;
    Ok(project.id)
}

#[derive(Debug, Clone, Copy)]
enum Bound {
    Start,
    End,
}

fn parse_bound(
    raw: Option<&str>,
    field: &str,
    bound: Bound,
) -> ApiResult<Option<DateTime<Utc>>> {
    let raw = match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => raw,
        None => return Ok(None),
    };

    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(Some(ts.with_timezone(&Utc)));
    }

    let day = NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| {
        ApiError::invalid(field, format!("{} must be RFC 3339 or YYYY-MM-DD", field))
    })?;

    let time = match bound {
        Bound::Start => NaiveTime::MIN,
        Bound::End => NaiveTime::from_hms_micro_opt(23, 59, 59, 999_999).unwrap_or(NaiveTime::MIN),
    };

    Ok(Some(day.and_time(time).and_utc()))
}

fn pagination(limit: Option<&str>, offset: Option<&str>) -> Pagination {
    Pagination::new(
        limit.and_then(|l| l.trim().parse().ok()),
        offset.and_then(|o| o.trim().parse().ok()),
    )
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Parses a snake_case enum value through its serde representation
fn parse_enum<T: DeserializeOwned>(raw: Option<String>, field: &str) -> ApiResult<Option<T>> {
    match non_empty(raw) {
        Some(value) => serde_json::from_value(serde_json::Value::String(value.clone()))
            .map(Some)
            .map_err(|_| ApiError::invalid(field, format!("Unknown {} '{}'", field, value))),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kogase_shared::models::metric::{MetricType, PeriodType};

    #[test]
    fn test_parse_bound_formats() {
        let start = parse_bound(Some("2025-03-26"), "start_date", Bound::Start)
            .unwrap()
            .unwrap();
        assert_eq!(start.to_rfc3339(), "2025-03-26T00:00:00+00:00");

        let end = parse_bound(Some("2025-03-26"), "end_date", Bound::End)
            .unwrap()
            .unwrap();
        assert_eq!(end.format("%H:%M:%S").to_string(), "23:59:59");

        let exact = parse_bound(Some("2025-03-26T10:00:00Z"), "start_date", Bound::Start)
            .unwrap()
            .unwrap();
        assert_eq!(exact.format("%H:%M").to_string(), "10:00");

        assert!(parse_bound(None, "start_date", Bound::Start).unwrap().is_none());
        assert!(parse_bound(Some("yesterday"), "start_date", Bound::Start).is_err());
    }

    #[test]
    fn test_lenient_pagination() {
        assert_eq!(pagination(Some("abc"), Some("-5")), Pagination::new(None, None));
        assert_eq!(pagination(Some("5000"), None).limit, 1000);
        assert_eq!(pagination(Some("20"), Some("40")).offset, 40);
    }

    #[test]
    fn test_parse_enum_values() {
        let metric: Option<MetricType> = parse_enum(Some("new_users".to_string()), "metric_type").unwrap();
        assert_eq!(metric, Some(MetricType::NewUsers));

        let period: Option<PeriodType> = parse_enum(Some("daily".to_string()), "period").unwrap();
        assert_eq!(period, Some(PeriodType::Daily));

        assert!(parse_enum::<PeriodType>(Some("fortnightly".to_string()), "period").is_err());
        assert!(parse_enum::<PeriodType>(Some(String::new()), "period").unwrap().is_none());
    }
}
