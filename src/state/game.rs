use super::{AppState, Session};
use crate::broadcast::Target;
use crate::error::{CoordinatorError, CoordinatorResult};
use crate::protocol::ServerMessage;
use crate::types::*;
use std::collections::BTreeMap;

impl Session {
    /// Clear has-voted flags and the ledger, enter SELECTING.
    /// Returns the participants whose flag was reset.
    pub fn begin_round(&mut self) -> Vec<Participant> {
        for participant in &mut self.participants {
            participant.has_voted = false;
        }
        self.phase = GamePhase::Selecting;
        self.votes.clear();
        self.participants.clone()
    }

    /// Record a vote. No phase guard: late votes are accepted.
    pub fn record_vote(&mut self, user_name: &str, value: &str) -> Option<Participant> {
        let index = self
            .participants
            .iter()
            .position(|p| p.name == user_name)
            .or_else(|| {
                self.participants
                    .iter()
                    .position(|p| p.name_matches(user_name))
            })?;

        let participant = &mut self.participants[index];
        participant.has_voted = true;
        let participant = participant.clone();

        self.votes
            .insert(participant.name.clone(), value.to_string());
        Some(participant)
    }

    /// Enter SHOWING_RESULTS, returning the votes to replay
    pub fn reveal(&mut self) -> Vec<(String, String)> {
        self.phase = GamePhase::ShowingResults;
        self.visible_votes().into_iter().collect()
    }

    /// Ledger entries that belong to a current participant.
    /// Entries left behind by removed participants are never handed out.
    pub fn visible_votes(&self) -> BTreeMap<String, String> {
        self.votes
            .iter()
            .filter(|(name, _)| self.participants.iter().any(|p| &p.name == *name))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }

    /// What a client joining mid-round needs to catch up
    pub fn late_join_replay(&self) -> Vec<ServerMessage> {
        match self.phase {
            GamePhase::Idle => Vec::new(),
            GamePhase::Selecting => vec![ServerMessage::GameStarted],
            GamePhase::ShowingResults => self
                .visible_votes()
                .into_iter()
                .map(|(name, value)| ServerMessage::VoteSubmitted { name, value })
                .chain(std::iter::once(ServerMessage::ShowResults))
                .collect(),
        }
    }
}

impl AppState {
    /// Start the estimation game (first round)
    pub async fn start_game(&self, session_id: &str) -> CoordinatorResult<()> {
        self.reset_round(session_id, ServerMessage::GameStarted)
            .await?;
        tracing::info!("Estimation game started in session {}", session_id);
        Ok(())
    }

    /// Start another round: same state change as `start_game`, different signal
    pub async fn start_new_estimation(&self, session_id: &str) -> CoordinatorResult<()> {
        self.reset_round(session_id, ServerMessage::StartNewEstimation)
            .await?;
        tracing::info!("New estimation started in session {}", session_id);
        Ok(())
    }

    async fn reset_round(&self, session_id: &str, signal: ServerMessage) -> CoordinatorResult<()> {
        let mut session = self.lock_session(session_id).await?;

        for participant in session.begin_round() {
            self.router.send(
                Target::Group(session_id),
                ServerMessage::ParticipantUpdated { participant },
            );
        }
        self.router.send(Target::Group(session_id), signal);
        Ok(())
    }

    pub async fn submit_vote(
        &self,
        session_id: &str,
        user_name: &str,
        value: &str,
    ) -> CoordinatorResult<Participant> {
        let mut session = self.lock_session(session_id).await?;

        let participant = session
            .record_vote(user_name, value)
            .ok_or_else(|| CoordinatorError::ParticipantNotFound(user_name.to_string()))?;

        if session.phase != GamePhase::Selecting {
            tracing::debug!(
                "Vote from {} accepted outside SELECTING ({:?}) in {}",
                participant.name,
                session.phase,
                session_id
            );
        }
        tracing::info!(
            "User {} voted {} in session {}",
            participant.name,
            value,
            session_id
        );

        self.router.send(
            Target::Group(session_id),
            ServerMessage::VoteSubmitted {
                name: participant.name.clone(),
                value: value.to_string(),
            },
        );
        self.router.send(
            Target::Group(session_id),
            ServerMessage::ParticipantUpdated {
                participant: participant.clone(),
            },
        );

        Ok(participant)
    }

    /// Reveal: replay every vote so all clients converge, then show results
    pub async fn show_results(&self, session_id: &str) -> CoordinatorResult<usize> {
        let mut session = self.lock_session(session_id).await?;

        let votes = session.reveal();
        tracing::info!(
            "Showing results for session {}, votes count: {}",
            session_id,
            votes.len()
        );

        let count = votes.len();
        for (name, value) in votes {
            self.router.send(
                Target::Group(session_id),
                ServerMessage::VoteSubmitted { name, value },
            );
        }
        self.router
            .send(Target::Group(session_id), ServerMessage::ShowResults);

        Ok(count)
    }

    /// Current phase, or None for an unknown session
    pub async fn game_phase(&self, session_id: &str) -> Option<GamePhase> {
        let session = self.lock_session(session_id).await.ok()?;
        Some(session.phase)
    }

    /// Current round's votes, empty for an unknown session
    pub async fn current_votes(&self, session_id: &str) -> BTreeMap<String, String> {
        match self.lock_session(session_id).await {
            Ok(session) => session.visible_votes(),
            Err(_) => BTreeMap::new(),
        }
    }

    /// Roster snapshot, None for an unknown session
    pub async fn participants(&self, session_id: &str) -> Option<Vec<Participant>> {
        let session = self.lock_session(session_id).await.ok()?;
        Some(session.participants.clone())
    }
}
