//! Router setup with routes and middleware.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::error::ApiError;
use crate::state::AppState;
use crate::ws;

/// Create the axum Router with all routes and middleware.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/ws/session", get(ws::session_upgrade))
        .route("/ws/status", get(ws_status))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// `GET /ws/status` - snapshot of all sessions' counters.
async fn ws_status(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let status = state.manager.status();
    let value = serde_json::to_value(status).map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Json(value))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use murmur_agent::ScriptedBackend;
    use murmur_core::config::MurmurConfig;
    use murmur_session::SessionManager;
    use murmur_transcribe::DegradedProvider;

    use super::*;

    fn test_state() -> AppState {
        AppState::new(
            MurmurConfig::default(),
            Arc::new(SessionManager::new()),
            Arc::new(DegradedProvider::new(Duration::from_secs(3))),
            Arc::new(ScriptedBackend::silent()),
            None,
        )
    }

    #[tokio::test]
    async fn test_status_route_returns_empty_table() {
        let router = create_router(test_state());
        let response = router
            .oneshot(
                Request::builder()
                    .uri("/ws/status")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024)
            .await
            .unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["active_sessions"], 0);
        assert!(value["sessions"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ws_route_requires_upgrade() {
        let router = create_router(test_state());
        let response = router
            .oneshot(
                Request::builder()
                    .uri("/ws/session")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        // A plain GET without the upgrade handshake is rejected.
        assert_ne!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let router = create_router(test_state());
        let response = router
            .oneshot(
                Request::builder()
                    .uri("/nope")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
