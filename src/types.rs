use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque ID types for readability
pub type SessionId = String;
pub type ConnectionId = String;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GamePhase {
    #[default]
    Idle,
    Selecting,
    ShowingResults,
}

impl GamePhase {
    /// Wire label, as sent in `CurrentGameState`
    pub fn as_str(&self) -> &'static str {
        match self {
            GamePhase::Idle => "IDLE",
            GamePhase::Selecting => "SELECTING",
            GamePhase::ShowingResults => "SHOWING_RESULTS",
        }
    }
}

/// One user's identity within a session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Participant {
    /// Current transport connection (None while disconnected)
    pub connection_id: Option<ConnectionId>,
    pub name: String,
    pub session_id: SessionId,
    pub is_connected: bool,
    pub disconnected_at: Option<DateTime<Utc>>,
    pub has_voted: bool,
    pub joined_at: DateTime<Utc>,
}

impl Participant {
    pub fn new(name: String, session_id: SessionId, connection_id: ConnectionId) -> Self {
        Self {
            connection_id: Some(connection_id),
            name,
            session_id,
            is_connected: true,
            disconnected_at: None,
            has_voted: false,
            joined_at: Utc::now(),
        }
    }

    /// Case-insensitive display name comparison
    pub fn name_matches(&self, name: &str) -> bool {
        self.name
            .chars()
            .flat_map(char::to_lowercase)
            .eq(name.chars().flat_map(char::to_lowercase))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_matches_ignores_case() {
        let p = Participant::new("Ärger Bob".into(), "s1".into(), "c1".into());
        assert!(p.name_matches("ärger bob"));
        assert!(p.name_matches("ÄRGER BOB"));
        assert!(!p.name_matches("Ärger Bo"));
        assert!(!p.name_matches("Ärger Bobby"));
    }
}
