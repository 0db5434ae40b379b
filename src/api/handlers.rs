//! Request handlers.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use super::error::{ApiError, ApiResult};
use crate::detection::DetectionConfig;
use crate::models::{EventDetails, EventType, IntegrityEvent, SessionIdentity};
use crate::perception::{FaceCandidate, RawFaceObservation, RawObjectObservation};
use crate::report::{self, ReportFormat};
use crate::AppState;

/// JSON body whose rejection is still reported in the error envelope.
type JsonBody = Result<Json<Value>, JsonRejection>;

fn parse_body<T: serde::de::DeserializeOwned>(body: JsonBody) -> ApiResult<T> {
    let Json(body) = body?;
    serde_json::from_value(body).map_err(|err| ApiError::bad_request(format!("invalid request body: {err}")))
}

pub async fn health() -> Json<Value> {
    Json(json!({ "ok": true }))
}

/// Event submitted by an outside producer. Accepts the legacy `interviewId` and
/// `candidateName` field names.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewEvent {
    #[serde(alias = "interviewId")]
    session_id: String,
    #[serde(default, alias = "candidateName")]
    subject_label: String,
    event_type: EventType,
    details: EventDetails,
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
}

pub async fn post_event(State(state): State<AppState>, body: JsonBody) -> ApiResult<Json<Value>> {
    let new_event: NewEvent = parse_body(body)?;
    let event = IntegrityEvent {
        session_id: new_event.session_id,
        subject_label: new_event.subject_label,
        event_type: new_event.event_type,
        details: new_event.details,
        timestamp: new_event.timestamp.unwrap_or_else(Utc::now),
    };
    event
        .validate()
        .map_err(|err| ApiError::bad_request(err.to_string()))?;

    state.store.append(&event).await?;
    Ok(Json(json!({ "success": true, "log": event })))
}

pub async fn get_logs(State(state): State<AppState>, Path(session_id): Path<String>) -> ApiResult<Json<Value>> {
    let logs = state.store.list(&session_id).await?;
    Ok(Json(json!({ "success": true, "logs": logs })))
}

#[derive(Debug, Deserialize)]
pub struct ReportQuery {
    format: Option<String>,
}

pub async fn download_report(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Query(query): Query<ReportQuery>,
) -> ApiResult<Response> {
    let format = match query.format.as_deref() {
        Some(raw) => raw
            .parse::<ReportFormat>()
            .map_err(|err| ApiError::bad_request(err.to_string()))?,
        None => ReportFormat::default(),
    };

    let events = state.store.list(&session_id).await?;
    if events.is_empty() {
        return Err(ApiError::not_found(format!("No events found for {session_id}")));
    }

    let report = report::render(format, &session_id, &events)?;
    let disposition = format!("attachment; filename=\"{}\"", report.filename.replace('"', ""));

    Ok((
        [
            (header::CONTENT_TYPE, report.format.content_type().to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        report.body,
    )
        .into_response())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartSession {
    #[serde(default, alias = "interviewId")]
    session_id: Option<String>,
    #[serde(default, alias = "candidateName")]
    subject_label: String,
    /// Partial detection config layered on the current defaults
    #[serde(default)]
    config: Value,
}

pub async fn start_session(
    State(state): State<AppState>,
    body: JsonBody,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let request: StartSession = parse_body(body)?;

    let session_id = match request.session_id.map(|id| id.trim().to_string()) {
        Some(id) if !id.is_empty() => id,
        Some(_) => return Err(ApiError::bad_request("sessionId must not be blank")),
        None => format!("session-{}", Uuid::new_v4()),
    };

    let config = state.settings.session_config(&request.config)?;
    let session = state
        .registry
        .start_fed_session(
            SessionIdentity {
                session_id,
                subject_label: request.subject_label,
            },
            config.clone(),
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "session": session, "config": config })),
    ))
}

pub async fn list_sessions(State(state): State<AppState>) -> Json<Value> {
    let active = state.registry.active_sessions().await;
    Json(json!({ "success": true, "sessions": active }))
}

pub async fn stop_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let session = state.registry.stop_session(&session_id).await?;
    Ok(Json(json!({ "success": true, "session": session })))
}

/// Face model output for the latest frame, with that frame's size.
#[derive(Debug, Deserialize)]
struct PostedFaces {
    width: u32,
    height: u32,
    #[serde(default)]
    faces: Vec<FaceCandidate>,
}

pub async fn post_faces(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    body: JsonBody,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let posted: PostedFaces = parse_body(body)?;
    state
        .registry
        .post_faces(
            &session_id,
            posted.width,
            posted.height,
            RawFaceObservation { faces: posted.faces },
        )
        .await?;
    Ok((StatusCode::ACCEPTED, Json(json!({ "success": true }))))
}

pub async fn post_objects(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    body: JsonBody,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let observation: RawObjectObservation = parse_body(body)?;
    state.registry.post_objects(&session_id, observation).await?;
    Ok((StatusCode::ACCEPTED, Json(json!({ "success": true }))))
}

pub async fn get_alerts(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let alerts = state.registry.alerts(&session_id).await?;
    Ok(Json(json!({ "success": true, "sessionId": session_id, "alerts": alerts })))
}

pub async fn get_metrics(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let metrics = state.registry.metrics(&session_id).await?;
    Ok(Json(serde_json::to_value(metrics).map_err(anyhow::Error::new)?))
}

pub async fn get_detection_settings(State(state): State<AppState>) -> Json<DetectionConfig> {
    Json(state.settings.detection())
}

/// Patch the detection defaults used by new sessions. Running sessions keep their config.
pub async fn put_detection_settings(
    State(state): State<AppState>,
    body: JsonBody,
) -> ApiResult<Json<DetectionConfig>> {
    let Json(body) = body?;
    let config = state.settings.detection().with_overrides(&body)?.validated()?;
    let stored = state.settings.update_detection(config).await?;
    Ok(Json(stored))
}
