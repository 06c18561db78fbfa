mod cleanup;
mod game;
mod participant;
mod session;

pub use cleanup::CleanupScheduler;
pub use participant::{JoinKind, JoinOutcome};
pub use session::{generate_session_code, Session, SessionStore};

use crate::broadcast::BroadcastRouter;
use crate::config::Config;
use crate::error::{CoordinatorError, CoordinatorResult};
use std::sync::Arc;
use tokio::sync::OwnedMutexGuard;

/// Shared application state: the session coordinator.
///
/// Each session sits behind its own mutex; operations on one session are
/// serialized while different sessions never wait on each other.
#[derive(Clone)]
pub struct AppState {
    pub sessions: SessionStore,
    /// Outbound delivery to connected sockets
    pub router: BroadcastRouter,
    pub config: Arc<Config>,
    cleanup: CleanupScheduler,
}

impl AppState {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        Self {
            sessions: SessionStore::new(),
            router: BroadcastRouter::new(),
            config: Arc::new(config),
            cleanup: CleanupScheduler::new(),
        }
    }

    /// Lock a live session. Sessions closed while we waited count as missing.
    async fn lock_session(&self, session_id: &str) -> CoordinatorResult<OwnedMutexGuard<Session>> {
        let handle = self
            .sessions
            .get(session_id)
            .ok_or_else(|| CoordinatorError::SessionNotFound(session_id.to_string()))?;

        let session = handle.lock_owned().await;
        if session.is_closed() {
            return Err(CoordinatorError::SessionNotFound(session_id.to_string()));
        }
        Ok(session)
    }

    /// Whether an empty-session cleanup is pending for this id
    pub fn cleanup_pending(&self, session_id: &str) -> bool {
        self.cleanup.is_scheduled(session_id)
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
