//! HTTP API endpoints.
//!
//! Small helpers for the landing page: create a session with a generated
//! code and check whether a code is live before opening the socket.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::sync::Arc;

use crate::state::AppState;
use crate::types::{GamePhase, SessionId};

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub sessions: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionCreatedResponse {
    pub id: SessionId,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionInfoResponse {
    pub id: SessionId,
    pub exists: bool,
    pub phase: GamePhase,
    /// Connected participants only
    pub participants: usize,
}

/// GET /api/health
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        sessions: state.sessions.len(),
    })
}

/// Create a session under a fresh short code.
///
/// POST /api/sessions
pub async fn create_session(State(state): State<Arc<AppState>>) -> Response {
    let id = state.create_generated_session();
    (StatusCode::CREATED, Json(SessionCreatedResponse { id })).into_response()
}

/// GET /api/sessions/{id}
pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<SessionId>,
) -> Response {
    let (Some(phase), Some(participants)) =
        (state.game_phase(&id).await, state.participants(&id).await)
    else {
        return (StatusCode::NOT_FOUND, "Session not found").into_response();
    };

    Json(SessionInfoResponse {
        id,
        exists: true,
        phase,
        participants: participants.iter().filter(|p| p.is_connected).count(),
    })
    .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_unknown_session_is_404() {
        let state = Arc::new(AppState::new());
        let response = get_session(State(state), Path("nope".to_string())).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_create_then_get_session() {
        let state = Arc::new(AppState::new());

        let response = create_session(State(state.clone())).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(state.sessions.len(), 1);

        state.join_session("Alice", "ABC123", "c1").await.unwrap();
        let response = get_session(State(state.clone()), Path("ABC123".to_string())).await;
        assert_eq!(response.status(), StatusCode::OK);

        let Json(health) = health(State(state)).await;
        assert_eq!(health.sessions, 2);
    }
}
