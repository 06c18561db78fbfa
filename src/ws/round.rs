//! Round handlers: start, vote, reveal, new round

use super::handlers::report;
use crate::protocol::ServerMessage;
use crate::state::AppState;
use crate::types::GamePhase;
use std::sync::Arc;

pub async fn handle_start_game(state: &Arc<AppState>, session_id: String) -> Option<ServerMessage> {
    report("StartEstimationGame", state.start_game(&session_id).await);
    None
}

pub async fn handle_submit_vote(
    state: &Arc<AppState>,
    session_id: String,
    user_name: String,
    value: String,
) -> Option<ServerMessage> {
    report(
        "SubmitVote",
        state.submit_vote(&session_id, &user_name, &value).await,
    );
    None
}

pub async fn handle_show_results(
    state: &Arc<AppState>,
    session_id: String,
) -> Option<ServerMessage> {
    report("ShowResults", state.show_results(&session_id).await);
    None
}

pub async fn handle_start_new_estimation(
    state: &Arc<AppState>,
    session_id: String,
) -> Option<ServerMessage> {
    report(
        "StartNewEstimation",
        state.start_new_estimation(&session_id).await,
    );
    None
}

pub async fn handle_get_game_state(
    state: &Arc<AppState>,
    session_id: String,
) -> Option<ServerMessage> {
    // Blank until a round has started, or when the session is unknown
    let phase = match state.game_phase(&session_id).await {
        Some(GamePhase::Idle) | None => String::new(),
        Some(phase) => phase.as_str().to_string(),
    };

    Some(ServerMessage::CurrentGameState {
        session_id,
        state: phase,
    })
}
