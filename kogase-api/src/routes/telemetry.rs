/// SDK ingestion endpoints
///
/// All routes sit behind the API key layer; the project comes from the key,
/// never from the body.
///
/// - `POST /api/v1/sdk/event` - one event
/// - `POST /api/v1/sdk/events` - `{"events": [...]}`, all or nothing
/// - `POST /api/v1/sdk/session/start`, `/session/end`, `/install` - one event of
///   a fixed type
/// - `POST /api/v1/sdk/installation` - install report, recorded as an `install`
///   event named `installation`

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    extract::{ApiJson, ClientIp, CurrentPrincipal},
};
use axum::{extract::State, http::StatusCode, Json};
use kogase_shared::{
    auth::middleware::Principal,
    ingest::{BatchPayload, EventPayload, InstallationPayload},
    models::event::EventType,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize)]
pub struct EventRecordedResponse {
    pub message: String,
    pub event_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EventsRecordedResponse {
    pub message: String,
    pub count: usize,
}

type Recorded = ApiResult<(StatusCode, Json<EventRecordedResponse>)>;

fn project_of(principal: &Principal) -> Result<Uuid, ApiError> {
    principal
        .project_id()
        .ok_or_else(|| ApiError::Unauthorized("A project API key is required".to_string()))
}

fn recorded(event_id: Uuid) -> (StatusCode, Json<EventRecordedResponse>) {
    (
        StatusCode::CREATED,
        Json(EventRecordedResponse {
            message: "Event recorded".to_string(),
            event_id,
        }),
    )
}

pub async fn record_event(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    ClientIp(ip): ClientIp,
    ApiJson(payload): ApiJson<EventPayload>,
) -> Recorded {
    let project_id = project_of(&principal)?;
    let event = state.ingest.ingest(project_id, payload, &ip).await?;
    Ok(recorded(event.id))
}

pub async fn record_events(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    ClientIp(ip): ClientIp,
    ApiJson(batch): ApiJson<BatchPayload>,
) -> ApiResult<(StatusCode, Json<EventsRecordedResponse>)> {
    let project_id = project_of(&principal)?;
    let count = state.ingest.ingest_batch(project_id, batch.events, &ip).await?;

    Ok((
        StatusCode::CREATED,
        Json(EventsRecordedResponse {
            message: "Events recorded".to_string(),
            count,
        }),
    ))
}

async fn record_fixed(
    state: &AppState,
    principal: &Principal,
    event_type: EventType,
    payload: EventPayload,
    ip: &str,
) -> Recorded {
    let project_id = project_of(principal)?;
    let event = state
        .ingest
        .ingest_as(project_id, event_type, payload, ip)
        .await?;
    Ok(recorded(event.id))
}

pub async fn start_session(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    ClientIp(ip): ClientIp,
    ApiJson(payload): ApiJson<EventPayload>,
) -> Recorded {
    record_fixed(&state, &principal, EventType::SessionStart, payload, &ip).await
}

pub async fn end_session(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    ClientIp(ip): ClientIp,
    ApiJson(payload): ApiJson<EventPayload>,
) -> Recorded {
    record_fixed(&state, &principal, EventType::SessionEnd, payload, &ip).await
}

pub async fn record_install(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    ClientIp(ip): ClientIp,
    ApiJson(payload): ApiJson<EventPayload>,
) -> Recorded {
    record_fixed(&state, &principal, EventType::Install, payload, &ip).await
}

pub async fn record_installation(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    ClientIp(ip): ClientIp,
    ApiJson(install): ApiJson<InstallationPayload>,
) -> Recorded {
    let project_id = project_of(&principal)?;
    let event = state
        .ingest
        .ingest(project_id, EventPayload::from(install), &ip)
        .await?;
    Ok(recorded(event.id))
}
