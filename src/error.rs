use crate::types::SessionId;

/// Result type for coordinator operations
pub type CoordinatorResult<T> = Result<T, CoordinatorError>;

/// Reasons a coordinator operation did not apply.
///
/// None of these reach the client: the dispatch layer logs them and drops the request.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CoordinatorError {
    #[error("Session id must not be empty")]
    InvalidSessionId,

    #[error("Session not found: {0}")]
    SessionNotFound(SessionId),

    #[error("Participant not found: {0}")]
    ParticipantNotFound(String),

    #[error("Display name already taken: {0}")]
    NameTaken(String),

    #[error("Display name must not be empty")]
    InvalidName,
}

impl CoordinatorError {
    /// Not-found conditions are expected from late or racy client messages
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            CoordinatorError::SessionNotFound(_) | CoordinatorError::ParticipantNotFound(_)
        )
    }
}
