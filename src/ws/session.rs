//! Session and roster handlers
//!
//! Create, join, leave, end and rename. Everything the other participants
//! need to see is pushed by the coordinator through the router.

use super::handlers::report;
use crate::protocol::ServerMessage;
use crate::state::AppState;
use std::sync::Arc;

pub fn handle_create_session(state: &Arc<AppState>, session_id: String) -> Option<ServerMessage> {
    let success = report("CreateSession", state.create_session(&session_id)).unwrap_or(false);
    Some(ServerMessage::SessionCreated {
        session_id,
        success,
    })
}

pub async fn handle_join(
    state: &Arc<AppState>,
    connection_id: &str,
    user_name: String,
    session_id: String,
) -> Option<ServerMessage> {
    tracing::debug!(
        "Join request: {} -> {} on {}",
        user_name,
        session_id,
        connection_id
    );
    report(
        "JoinSession",
        state
            .join_session(&user_name, &session_id, connection_id)
            .await,
    );
    None
}

pub async fn handle_leave(
    state: &Arc<AppState>,
    connection_id: &str,
    session_id: String,
) -> Option<ServerMessage> {
    report(
        "LeaveSession",
        state.leave_session(&session_id, connection_id).await,
    );
    None
}

pub async fn handle_end_session(
    state: &Arc<AppState>,
    connection_id: &str,
    session_id: String,
    user_name: String,
) -> Option<ServerMessage> {
    if let Some(reason) = report(
        "EndSessionForAll",
        state
            .end_session(&session_id, &user_name, connection_id)
            .await,
    ) {
        tracing::info!("Session {} successfully ended: {}", session_id, reason);
    }
    None
}

pub async fn handle_rename(
    state: &Arc<AppState>,
    session_id: String,
    old_name: String,
    new_name: String,
) -> Option<ServerMessage> {
    report(
        "UpdateParticipantName",
        state
            .rename_participant(&session_id, &old_name, &new_name)
            .await,
    );
    None
}
