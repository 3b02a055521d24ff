//! HTTP route handlers.
//!
//! All handlers are thin - they delegate to services for business logic.

use axum::{
    extract::{Path, State},
    http::{header, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::api::response::{api_error, api_status, api_success};
use crate::api::ws::ws_handler;
use crate::api::AppState;
use crate::error::{WatchPartyError, WatchPartyResult};
use crate::protocol::Snapshot;
use crate::protocol_constants::{MAX_ROOM_ID_LEN, SERVICE_ID};

// ─────────────────────────────────────────────────────────────────────────────
// Router
// ─────────────────────────────────────────────────────────────────────────────

/// Creates the Axum router with all routes.
///
/// The WebSocket endpoint is mounted at both `/` and `/ws`; browser
/// activities connect to the bare origin.
pub fn create_router(state: AppState) -> Router {
    // Activities are served from a different origin than the sync server.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/health", get(health_check))
        .route("/api/party/{instance_id}", get(party_exists))
        .route("/api/party/{instance_id}/state", get(party_state))
        .route("/ws", get(ws_handler))
        .route("/", get(ws_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// Liveness probe with live room and connection counts.
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    api_success(json!({
        "status": "ok",
        "service": SERVICE_ID,
        "rooms": state.party.room_count(),
        "connections": state.ws_manager.connection_count(),
    }))
}

/// Whether a party with this code currently has anyone in it.
async fn party_exists(
    State(state): State<AppState>,
    Path(instance_id): Path<String>,
) -> Response {
    if instance_id.len() > MAX_ROOM_ID_LEN {
        return api_error(
            StatusCode::BAD_REQUEST,
            "invalid_request",
            format!("instanceId longer than {} bytes", MAX_ROOM_ID_LEN),
        )
        .into_response();
    }

    if state.party.room_exists(&instance_id) {
        api_success(json!({ "exists": true })).into_response()
    } else {
        log::debug!("[HTTP] Party lookup miss: {}", instance_id);
        api_status(StatusCode::NOT_FOUND, json!({ "exists": false })).into_response()
    }
}

/// Current drift-adjusted snapshot of a party.
async fn party_state(
    State(state): State<AppState>,
    Path(instance_id): Path<String>,
) -> WatchPartyResult<axum::Json<Snapshot>> {
    if instance_id.len() > MAX_ROOM_ID_LEN {
        return Err(WatchPartyError::InvalidRequest(format!(
            "instanceId longer than {} bytes",
            MAX_ROOM_ID_LEN
        )));
    }
    state.party.snapshot(&instance_id).map(axum::Json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bootstrap::bootstrap_services;
    use crate::state::Config;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    fn app() -> (Router, AppState) {
        let services = bootstrap_services(Config::default()).unwrap();
        let state = services.app_state();
        (create_router(state.clone()), state)
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn health_reports_counts() {
        let (app, _) = app();
        let (status, body) = get_json(app, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["service"], SERVICE_ID);
        assert_eq!(body["rooms"], 0);
        assert_eq!(body["connections"], 0);
    }

    #[tokio::test]
    async fn unknown_party_is_404_with_exists_false() {
        let (app, _) = app();
        let (status, body) = get_json(app, "/api/party/NOPE").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({ "exists": false }));
    }

    #[tokio::test]
    async fn occupied_party_exists_and_exposes_state() {
        let (app, state) = app();
        let admission = crate::protocol::JoinParams {
            instance_id: Some("ABCD".into()),
            user_id: Some("a".into()),
            ..Default::default()
        }
        .admit()
        .unwrap();
        let (_session, _rx) = state.party.join(admission, "ws-test");

        let (status, body) = get_json(app.clone(), "/api/party/ABCD").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "exists": true }));

        let (status, body) = get_json(app, "/api/party/ABCD/state").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["hostId"], "a");
        assert_eq!(body["participants"][0]["username"], "Guest");
    }

    #[tokio::test]
    async fn missing_party_state_is_room_not_found() {
        let (app, _) = app();
        let (status, body) = get_json(app, "/api/party/NOPE/state").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "room_not_found");
    }
}
