//! API integration tests.

use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use proctorwatch::api::create_router;
use proctorwatch::settings::Settings;
use proctorwatch::AppState;

async fn create_test_app() -> (Router, AppState, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let settings = Settings {
        database_path: dir.path().join("api.db"),
        ..Default::default()
    };
    let state = AppState::new(settings, dir.path().join("settings.json"))
        .await
        .unwrap();
    (create_router(state.clone()), state, dir)
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Vec<u8>) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, bytes.to_vec())
}

async fn send_json(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let (status, bytes) = send(app, method, uri, body).await;
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

fn no_face_event(session_id: &str, timestamp: &str) -> Value {
    json!({
        "sessionId": session_id,
        "subjectLabel": "Ada",
        "eventType": "no_face",
        "details": { "duration_seconds": 10 },
        "timestamp": timestamp,
    })
}

#[tokio::test]
async fn test_health_endpoint() {
    let (app, _state, _dir) = create_test_app().await;

    let (status, body) = send_json(&app, Method::GET, "/", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "ok": true }));
}

#[tokio::test]
async fn test_posted_events_are_listed_in_time_order() {
    let (app, _state, _dir) = create_test_app().await;

    let later = no_face_event("s-1", "2024-05-01T10:00:05Z");
    let (status, body) = send_json(&app, Method::POST, "/logs/event", Some(later)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["log"]["eventType"], json!("no_face"));

    // Legacy field names are accepted.
    let earlier = json!({
        "interviewId": "s-1",
        "candidateName": "Ada",
        "eventType": "object_detected",
        "details": { "object": "book", "confidence": 0.7 },
        "timestamp": "2024-05-01T10:00:01Z",
    });
    let (status, _) = send_json(&app, Method::POST, "/logs/event", Some(earlier)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send_json(&app, Method::GET, "/logs/s-1", None).await;
    assert_eq!(status, StatusCode::OK);
    let logs = body["logs"].as_array().unwrap();
    assert_eq!(logs.len(), 2);
    assert_eq!(logs[0]["eventType"], json!("object_detected"));
    assert_eq!(logs[1]["eventType"], json!("no_face"));

    let (status, body) = send_json(&app, Method::GET, "/logs/nobody", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["logs"], json!([]));
}

#[tokio::test]
async fn test_malformed_events_are_rejected() {
    let (app, _state, _dir) = create_test_app().await;

    let mismatched = json!({
        "sessionId": "s-1",
        "eventType": "multiple_faces",
        "details": { "duration_seconds": 3 },
    });
    let (status, body) = send_json(&app, Method::POST, "/logs/event", Some(mismatched)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], json!(false));

    let unknown_type = json!({
        "sessionId": "s-1",
        "eventType": "tab_switch",
        "details": { "count": 1 },
    });
    let (status, _) = send_json(&app, Method::POST, "/logs/event", Some(unknown_type)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_csv_report_download() {
    let (app, _state, _dir) = create_test_app().await;
    send_json(
        &app,
        Method::POST,
        "/logs/event",
        Some(no_face_event("s-csv", "2024-05-01T10:00:00Z")),
    )
    .await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/reports/download/s-csv")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/csv; charset=utf-8"
    );
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"s-csv-report.csv\""
    );

    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = String::from_utf8(bytes.to_vec()).unwrap();
    assert_eq!(
        body,
        "timestamp,eventType,subjectLabel,details\n\
         \"2024-05-01T10:00:00.000Z\",\"no_face\",\"Ada\",\"{\"\"duration_seconds\"\":10}\""
    );
}

#[tokio::test]
async fn test_text_report_and_report_errors() {
    let (app, _state, _dir) = create_test_app().await;

    let (status, body) = send_json(&app, Method::GET, "/reports/download/ghost", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(
        body,
        json!({ "success": false, "message": "No events found for ghost" })
    );

    send_json(
        &app,
        Method::POST,
        "/logs/event",
        Some(no_face_event("s-txt", "2024-05-01T10:00:00Z")),
    )
    .await;

    let (status, bytes) = send(&app, Method::GET, "/reports/download/s-txt?format=txt", None).await;
    assert_eq!(status, StatusCode::OK);
    let text = String::from_utf8(bytes).unwrap();
    assert!(text.starts_with("Integrity Report\nSession ID: s-txt\n"));
    assert!(text.contains("Page 1 of 1"));

    let (status, body) = send_json(&app, Method::GET, "/reports/download/s-txt?format=docx", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], json!(false));
}

#[tokio::test]
async fn test_pdf_report_download() {
    let (app, _state, _dir) = create_test_app().await;
    send_json(
        &app,
        Method::POST,
        "/logs/event",
        Some(no_face_event("s-pdf", "2024-05-01T10:00:00Z")),
    )
    .await;

    let request = || {
        Request::builder()
            .uri("/reports/download/s-pdf?format=pdf")
            .body(Body::empty())
            .unwrap()
    };

    let response = app.clone().oneshot(request()).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "application/pdf");
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"s-pdf-report.pdf\""
    );
    let first = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert!(first.starts_with(b"%PDF-"));

    let response = app.clone().oneshot(request()).await.unwrap();
    let second = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_unreadable_bodies_use_the_error_envelope() {
    let (app, _state, _dir) = create_test_app().await;

    let not_json = Request::builder()
        .method(Method::POST)
        .uri("/logs/event")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.clone().oneshot(not_json).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["success"], json!(false));
    assert!(body["message"].is_string());

    let no_content_type = Request::builder()
        .method(Method::POST)
        .uri("/sessions")
        .body(Body::from("{}"))
        .unwrap();
    let response = app.clone().oneshot(no_content_type).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["success"], json!(false));
}

#[tokio::test]
async fn test_session_lifecycle() {
    let (app, state, _dir) = create_test_app().await;

    let start = json!({
        "sessionId": "live-1",
        "subjectLabel": "Ada",
        "config": { "tickPeriodMs": 20, "objectTickPeriodMs": 20 },
    });
    let (status, body) = send_json(&app, Method::POST, "/sessions", Some(start.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["session"]["id"], json!("live-1"));
    assert_eq!(body["session"]["status"], json!("running"));
    assert_eq!(body["config"]["tickPeriodMs"], json!(20));

    let (status, body) = send_json(&app, Method::POST, "/sessions", Some(start)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["success"], json!(false));

    let (status, body) = send_json(&app, Method::GET, "/sessions", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sessions"][0]["sessionId"], json!("live-1"));

    let objects = json!({ "objects": [{ "class": "book", "score": 0.91 }] });
    let (status, _) = send_json(&app, Method::POST, "/sessions/live-1/objects", Some(objects)).await;
    assert_eq!(status, StatusCode::ACCEPTED);

    tokio::time::sleep(Duration::from_millis(200)).await;

    let (status, body) = send_json(&app, Method::GET, "/sessions/live-1/alerts", None).await;
    assert_eq!(status, StatusCode::OK);
    let alerts = body["alerts"].as_array().unwrap();
    assert!(alerts
        .iter()
        .any(|alert| alert["message"].as_str().unwrap_or_default().contains("book")));

    let (status, body) = send_json(&app, Method::GET, "/sessions/live-1/metrics", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sessionId"], json!("live-1"));
    assert!(body["metrics"]["counters"].is_object());

    let (status, body) = send_json(&app, Method::DELETE, "/sessions/live-1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["session"]["status"], json!("completed"));

    let events = state.store.list("live-1").await.unwrap();
    assert!(events
        .iter()
        .any(|event| event.event_type == proctorwatch::models::EventType::ObjectDetected));

    let (status, _) = send_json(&app, Method::DELETE, "/sessions/live-1", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send_json(&app, Method::GET, "/sessions/live-1/alerts", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_session_start_validation() {
    let (app, state, _dir) = create_test_app().await;

    let bad_config = json!({ "sessionId": "bad", "config": { "multiFaceConfirmFrames": 0 } });
    let (status, body) = send_json(&app, Method::POST, "/sessions", Some(bad_config)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], json!(false));

    let blank = json!({ "sessionId": "   " });
    let (status, _) = send_json(&app, Method::POST, "/sessions", Some(blank)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send_json(&app, Method::POST, "/sessions", Some(json!({}))).await;
    assert_eq!(status, StatusCode::CREATED);
    let generated = body["session"]["id"].as_str().unwrap().to_string();
    assert!(generated.starts_with("session-"));

    state.registry.stop_all().await;
}

#[tokio::test]
async fn test_detection_settings_round_trip() {
    let (app, state, dir) = create_test_app().await;

    let (status, body) = send_json(&app, Method::GET, "/settings/detection", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["noFaceThresholdSecs"], json!(10.0));

    let patch = json!({ "lookAwayThresholdSecs": 3.5 });
    let (status, body) = send_json(&app, Method::PUT, "/settings/detection", Some(patch)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["lookAwayThresholdSecs"], json!(3.5));
    assert_eq!(body["noFaceThresholdSecs"], json!(10.0));
    assert_eq!(state.settings.detection().look_away_threshold_secs, 3.5);

    let saved = Settings::load(&dir.path().join("settings.json")).unwrap();
    assert_eq!(saved.detection.look_away_threshold_secs, 3.5);

    let invalid = json!({ "gazeOffsetFraction": 2.0 });
    let (status, _) = send_json(&app, Method::PUT, "/settings/detection", Some(invalid)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(state.settings.detection().gaze_offset_fraction, 0.45);
}

#[tokio::test]
async fn test_faces_for_unknown_session() {
    let (app, _state, _dir) = create_test_app().await;

    let faces = json!({ "width": 640, "height": 480, "faces": [] });
    let (status, body) = send_json(&app, Method::POST, "/sessions/ghost/faces", Some(faces)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], json!(false));
}
