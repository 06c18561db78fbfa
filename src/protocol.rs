use crate::types::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Client actions. The `t` tag carries the operation name verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum ClientMessage {
    CreateSession {
        session_id: SessionId,
    },
    JoinSession {
        user_name: String,
        session_id: SessionId,
    },
    LeaveSession {
        session_id: SessionId,
    },
    EndSessionForAll {
        session_id: SessionId,
        /// Name shown in the end notice; falls back to the caller's participant name
        #[serde(default)]
        user_name: String,
    },
    UpdateParticipantName {
        session_id: SessionId,
        old_name: String,
        new_name: String,
    },
    StartEstimationGame {
        session_id: SessionId,
    },
    SubmitVote {
        session_id: SessionId,
        user_name: String,
        value: String,
    },
    ShowResults {
        session_id: SessionId,
    },
    StartNewEstimation {
        session_id: SessionId,
    },
    SessionExists {
        session_id: SessionId,
    },
    GetCurrentGameState {
        session_id: SessionId,
    },
    GetCurrentVotes {
        session_id: SessionId,
    },
}

/// Server events. Event names are the wire contract clients match on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "t")]
pub enum ServerMessage {
    /// Sent once when the socket is accepted
    Welcome {
        protocol: String,
        connection_id: ConnectionId,
        server_now: String,
    },
    ParticipantJoined {
        participant: Participant,
    },
    ParticipantUpdated {
        participant: Participant,
    },
    ParticipantReconnected {
        participant: Participant,
    },
    ParticipantDisconnected {
        participant: Participant,
    },
    ParticipantLeft {
        participant: Participant,
    },
    /// Full roster, in join order
    SessionParticipants {
        participants: Vec<Participant>,
    },
    GameStarted,
    VoteSubmitted {
        name: String,
        value: String,
    },
    ShowResults,
    StartNewEstimation,
    SessionEnded {
        reason: String,
    },

    // Replies to the caller only
    SessionCreated {
        session_id: SessionId,
        success: bool,
    },
    SessionExistsResult {
        session_id: SessionId,
        exists: bool,
    },
    /// `state` is the phase label, or "" when the session is unknown
    CurrentGameState {
        session_id: SessionId,
        state: String,
    },
    CurrentVotes {
        session_id: SessionId,
        votes: BTreeMap<String, String>,
    },
    Error {
        code: String,
        msg: String,
    },
}

impl ServerMessage {
    /// Event name as it appears in the `t` tag (for logging)
    pub fn name(&self) -> &'static str {
        match self {
            ServerMessage::Welcome { .. } => "Welcome",
            ServerMessage::ParticipantJoined { .. } => "ParticipantJoined",
            ServerMessage::ParticipantUpdated { .. } => "ParticipantUpdated",
            ServerMessage::ParticipantReconnected { .. } => "ParticipantReconnected",
            ServerMessage::ParticipantDisconnected { .. } => "ParticipantDisconnected",
            ServerMessage::ParticipantLeft { .. } => "ParticipantLeft",
            ServerMessage::SessionParticipants { .. } => "SessionParticipants",
            ServerMessage::GameStarted => "GameStarted",
            ServerMessage::VoteSubmitted { .. } => "VoteSubmitted",
            ServerMessage::ShowResults => "ShowResults",
            ServerMessage::StartNewEstimation => "StartNewEstimation",
            ServerMessage::SessionEnded { .. } => "SessionEnded",
            ServerMessage::SessionCreated { .. } => "SessionCreated",
            ServerMessage::SessionExistsResult { .. } => "SessionExistsResult",
            ServerMessage::CurrentGameState { .. } => "CurrentGameState",
            ServerMessage::CurrentVotes { .. } => "CurrentVotes",
            ServerMessage::Error { .. } => "Error",
        }
    }
}
