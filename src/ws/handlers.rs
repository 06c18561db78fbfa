//! WebSocket message dispatch
//!
//! This is the operation boundary: coordinator errors are logged here and
//! never sent back to the client. Only queries produce a direct reply.

use crate::error::CoordinatorResult;
use crate::protocol::{ClientMessage, ServerMessage};
use crate::state::AppState;
use std::sync::Arc;

use super::{round, session};

/// Log a failed operation and swallow it. Not-found is routine (late or
/// duplicate messages), anything else is worth a warning.
pub(super) fn report<T>(operation: &str, result: CoordinatorResult<T>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) if e.is_not_found() => {
            tracing::debug!("{} ignored: {}", operation, e);
            None
        }
        Err(e) => {
            tracing::warn!("{} rejected: {}", operation, e);
            None
        }
    }
}

/// Handle a client message on behalf of `connection_id`, returning an optional direct reply
pub async fn handle_message(
    msg: ClientMessage,
    connection_id: &str,
    state: &Arc<AppState>,
) -> Option<ServerMessage> {
    match msg {
        // Session lifecycle
        ClientMessage::CreateSession { session_id } => {
            session::handle_create_session(state, session_id)
        }

        ClientMessage::JoinSession {
            user_name,
            session_id,
        } => session::handle_join(state, connection_id, user_name, session_id).await,

        ClientMessage::LeaveSession { session_id } => {
            session::handle_leave(state, connection_id, session_id).await
        }

        ClientMessage::EndSessionForAll {
            session_id,
            user_name,
        } => session::handle_end_session(state, connection_id, session_id, user_name).await,

        ClientMessage::UpdateParticipantName {
            session_id,
            old_name,
            new_name,
        } => session::handle_rename(state, session_id, old_name, new_name).await,

        // Rounds
        ClientMessage::StartEstimationGame { session_id } => {
            round::handle_start_game(state, session_id).await
        }

        ClientMessage::SubmitVote {
            session_id,
            user_name,
            value,
        } => round::handle_submit_vote(state, session_id, user_name, value).await,

        ClientMessage::ShowResults { session_id } => {
            round::handle_show_results(state, session_id).await
        }

        ClientMessage::StartNewEstimation { session_id } => {
            round::handle_start_new_estimation(state, session_id).await
        }

        // Queries
        ClientMessage::SessionExists { session_id } => {
            let exists = state.session_exists(&session_id);
            Some(ServerMessage::SessionExistsResult { session_id, exists })
        }

        ClientMessage::GetCurrentGameState { session_id } => {
            round::handle_get_game_state(state, session_id).await
        }

        ClientMessage::GetCurrentVotes { session_id } => {
            let votes = state.current_votes(&session_id).await;
            Some(ServerMessage::CurrentVotes { session_id, votes })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoordinatorError;

    #[test]
    fn test_report_swallows_errors() {
        assert_eq!(report("op", Ok::<_, CoordinatorError>(3)), Some(3));
        assert_eq!(
            report::<()>("op", Err(CoordinatorError::SessionNotFound("x".into()))),
            None
        );
        assert_eq!(report::<()>("op", Err(CoordinatorError::InvalidSessionId)), None);
    }

    #[tokio::test]
    async fn test_create_session_reply() {
        let state = Arc::new(AppState::new());

        let result = handle_message(
            ClientMessage::CreateSession {
                session_id: "ABC123".to_string(),
            },
            "c1",
            &state,
        )
        .await;
        assert_eq!(
            result,
            Some(ServerMessage::SessionCreated {
                session_id: "ABC123".to_string(),
                success: true,
            })
        );

        let result = handle_message(
            ClientMessage::CreateSession {
                session_id: String::new(),
            },
            "c1",
            &state,
        )
        .await;
        assert_eq!(
            result,
            Some(ServerMessage::SessionCreated {
                session_id: String::new(),
                success: false,
            })
        );
    }

    #[tokio::test]
    async fn test_session_exists_query() {
        let state = Arc::new(AppState::new());
        state.create_session("ABC123").unwrap();

        let result = handle_message(
            ClientMessage::SessionExists {
                session_id: "ABC123".to_string(),
            },
            "c1",
            &state,
        )
        .await;
        assert!(matches!(
            result,
            Some(ServerMessage::SessionExistsResult { exists: true, .. })
        ));

        let result = handle_message(
            ClientMessage::SessionExists {
                session_id: "ZZZ999".to_string(),
            },
            "c1",
            &state,
        )
        .await;
        assert!(matches!(
            result,
            Some(ServerMessage::SessionExistsResult { exists: false, .. })
        ));
    }

    #[tokio::test]
    async fn test_game_state_blank_until_first_round() {
        let state = Arc::new(AppState::new());
        state.create_session("S").unwrap();

        let query = || {
            handle_message(
                ClientMessage::GetCurrentGameState {
                    session_id: "S".to_string(),
                },
                "c1",
                &state,
            )
        };

        match query().await {
            Some(ServerMessage::CurrentGameState { state, .. }) => assert_eq!(state, ""),
            other => panic!("Expected CurrentGameState, got {:?}", other),
        }

        state.start_game("S").await.unwrap();
        match query().await {
            Some(ServerMessage::CurrentGameState { state, .. }) => assert_eq!(state, "SELECTING"),
            other => panic!("Expected CurrentGameState, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_game_state_blank_for_unknown_session() {
        let state = Arc::new(AppState::new());

        let result = handle_message(
            ClientMessage::GetCurrentGameState {
                session_id: "nope".to_string(),
            },
            "c1",
            &state,
        )
        .await;

        match result {
            Some(ServerMessage::CurrentGameState { state, .. }) => assert_eq!(state, ""),
            other => panic!("Expected CurrentGameState, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_operations_on_unknown_session_are_silent() {
        let state = Arc::new(AppState::new());

        for msg in [
            ClientMessage::LeaveSession {
                session_id: "nope".to_string(),
            },
            ClientMessage::StartEstimationGame {
                session_id: "nope".to_string(),
            },
            ClientMessage::SubmitVote {
                session_id: "nope".to_string(),
                user_name: "Alice".to_string(),
                value: "5".to_string(),
            },
            ClientMessage::ShowResults {
                session_id: "nope".to_string(),
            },
            ClientMessage::EndSessionForAll {
                session_id: "nope".to_string(),
                user_name: "Alice".to_string(),
            },
        ] {
            assert!(handle_message(msg, "c1", &state).await.is_none());
        }
        assert!(state.sessions.is_empty());
    }
}
