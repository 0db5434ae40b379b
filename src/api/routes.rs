//! API routes.

use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::CorsLayer;

use super::handlers::{
    download_report, get_alerts, get_detection_settings, get_logs, get_metrics, health,
    list_sessions, post_event, post_faces, post_objects, put_detection_settings, start_session,
    stop_session,
};
use crate::AppState;

/// Create the HTTP router.
pub fn create_router(state: AppState) -> Router {
    let log_routes = Router::new()
        .route("/logs/event", post(post_event))
        .route("/logs/:session_id", get(get_logs))
        .route("/reports/download/:session_id", get(download_report));

    let session_routes = Router::new()
        .route("/sessions", get(list_sessions).post(start_session))
        .route("/sessions/:session_id", delete(stop_session))
        .route("/sessions/:session_id/faces", post(post_faces))
        .route("/sessions/:session_id/objects", post(post_objects))
        .route("/sessions/:session_id/alerts", get(get_alerts))
        .route("/sessions/:session_id/metrics", get(get_metrics));

    let settings_routes = Router::new().route(
        "/settings/detection",
        get(get_detection_settings).put(put_detection_settings),
    );

    Router::new()
        .route("/", get(health))
        .merge(log_routes)
        .merge(session_routes)
        .merge(settings_routes)
        .layer(CorsLayer::permissive())
        .with_state(state)
}
