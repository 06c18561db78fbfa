use super::AppState;
use crate::broadcast::Target;
use crate::error::{CoordinatorError, CoordinatorResult};
use crate::protocol::ServerMessage;
use crate::types::*;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rand::Rng;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Safe character set for session codes (excludes 0/O, 1/I/L to avoid confusion)
const CODE_CHARS: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";
const CODE_LENGTH: usize = 6;

/// Generate a random short session code
pub fn generate_session_code() -> String {
    let mut rng = rand::rng();
    (0..CODE_LENGTH)
        .map(|_| CODE_CHARS[rng.random_range(0..CODE_CHARS.len())] as char)
        .collect()
}

/// One voting room. Only ever touched through its mutex.
#[derive(Debug)]
pub struct Session {
    pub id: SessionId,
    /// Roster in join order
    pub participants: Vec<Participant>,
    pub phase: GamePhase,
    /// Display name -> vote value for the current round
    pub votes: BTreeMap<String, String>,
    /// Set under the lock right before the session leaves the store
    closed: bool,
}

impl Session {
    pub fn new(id: SessionId) -> Self {
        Self {
            id,
            participants: Vec::new(),
            phase: GamePhase::Idle,
            votes: BTreeMap::new(),
            closed: false,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }
}

pub type SessionHandle = Arc<Mutex<Session>>;

/// Session id -> session. Individual map operations are atomic; anything that
/// reads and then writes goes through the session's own lock.
#[derive(Clone, Default)]
pub struct SessionStore {
    sessions: Arc<DashMap<SessionId, SessionHandle>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, session_id: &str) -> Option<SessionHandle> {
        self.sessions.get(session_id).map(|entry| entry.value().clone())
    }

    /// Fetch the session handle, inserting an empty session if absent.
    /// The flag is true when this call created it.
    pub fn get_or_create(&self, session_id: &str) -> (SessionHandle, bool) {
        match self.sessions.entry(session_id.to_string()) {
            Entry::Occupied(entry) => (entry.get().clone(), false),
            Entry::Vacant(entry) => {
                let handle = Arc::new(Mutex::new(Session::new(session_id.to_string())));
                entry.insert(handle.clone());
                (handle, true)
            }
        }
    }

    /// Insert a fresh session only if the id is unused
    fn try_create(&self, session_id: &str) -> bool {
        self.get_or_create(session_id).1
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.sessions.contains_key(session_id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Mark the locked session closed and drop it from the store.
    ///
    /// Removal only happens if the store still maps the id to this very
    /// session, so a successor created under the same id is left alone.
    pub fn close(&self, session: &mut OwnedMutexGuard<Session>) -> bool {
        session.closed = true;
        let handle = OwnedMutexGuard::mutex(session);
        self.sessions
            .remove_if(&session.id, |_, current| Arc::ptr_eq(current, handle))
            .is_some()
    }

    /// Lock the session if it is live and has no participants right now
    pub async fn lock_if_empty(&self, session_id: &str) -> Option<OwnedMutexGuard<Session>> {
        let handle = self.get(session_id)?;
        let session = handle.lock_owned().await;
        (!session.is_closed() && session.is_empty()).then_some(session)
    }
}

impl AppState {
    /// Create an empty session if absent. Returns whether it exists afterwards.
    pub fn create_session(&self, session_id: &str) -> CoordinatorResult<bool> {
        if session_id.trim().is_empty() {
            tracing::error!("Cannot create session: empty session id");
            return Err(CoordinatorError::InvalidSessionId);
        }

        if self.sessions.try_create(session_id) {
            tracing::info!("Created new session {}", session_id);
            // Nobody has joined yet; give it the same grace as an emptied session
            self.schedule_empty_cleanup(session_id);
        } else {
            tracing::info!("Session already exists with id {}", session_id);
        }
        Ok(true)
    }

    /// Create a session under a freshly generated code
    pub fn create_generated_session(&self) -> SessionId {
        loop {
            let code = generate_session_code();
            if self.sessions.try_create(&code) {
                tracing::info!("Created new session {} with generated code", code);
                self.schedule_empty_cleanup(&code);
                break code;
            }
            // Collision - try again
        }
    }

    pub fn session_exists(&self, session_id: &str) -> bool {
        !session_id.is_empty() && self.sessions.contains(session_id)
    }

    /// End the session for everyone. The caller must be one of its participants.
    /// Returns the reason sent to clients.
    pub async fn end_session(
        &self,
        session_id: &str,
        user_name: &str,
        connection_id: &str,
    ) -> CoordinatorResult<String> {
        let mut session = self.lock_session(session_id).await?;

        let caller = session
            .participants
            .iter()
            .find(|p| p.connection_id.as_deref() == Some(connection_id))
            .ok_or_else(|| CoordinatorError::ParticipantNotFound(connection_id.to_string()))?;

        let display_name = if user_name.trim().is_empty() {
            caller.name.clone()
        } else {
            user_name.to_string()
        };
        let reason = format!("Session ended by {}", display_name);

        tracing::info!(
            "Session {} being ended by {}, removing {} participants",
            session_id,
            display_name,
            session.participants.len()
        );

        self.router.send(
            Target::Group(session_id),
            ServerMessage::SessionEnded {
                reason: reason.clone(),
            },
        );
        let members = self.router.remove_group(session_id);
        tracing::debug!("Unsubscribed {} connections from {}", members.len(), session_id);

        self.sessions.close(&mut session);
        self.cleanup.cancel(session_id);

        Ok(reason)
    }

    /// Schedule deletion of an empty session after the grace period.
    /// The emptiness check happens when the timer fires.
    pub(crate) fn schedule_empty_cleanup(&self, session_id: &str) {
        let store = self.sessions.clone();
        let router = self.router.clone();
        let id = session_id.to_string();
        let grace = self.config.session_grace;

        tracing::debug!("Session {} is empty, cleanup in {:?}", session_id, grace);

        self.cleanup.schedule(session_id, grace, async move {
            let Some(mut session) = store.lock_if_empty(&id).await else {
                tracing::debug!("Session {} no longer empty, skipping cleanup", id);
                return;
            };
            // Dissolve the group before the id is released to a successor
            router.remove_group(&id);
            store.close(&mut session);
            tracing::info!("Empty session {} removed after timeout", id);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_generate_session_code() {
        let code = generate_session_code();
        assert_eq!(code.len(), CODE_LENGTH);
        assert!(code.bytes().all(|c| CODE_CHARS.contains(&c)));
    }

    #[tokio::test]
    async fn test_create_session_rejects_empty_id() {
        let state = AppState::new();
        assert_eq!(
            state.create_session(""),
            Err(CoordinatorError::InvalidSessionId)
        );
        assert_eq!(
            state.create_session("   "),
            Err(CoordinatorError::InvalidSessionId)
        );
        assert!(!state.session_exists(""));
    }

    #[tokio::test]
    async fn test_create_session_is_idempotent() {
        let state = AppState::new();
        assert_eq!(state.create_session("ABC123"), Ok(true));

        {
            let handle = state.sessions.get("ABC123").unwrap();
            let mut session = handle.lock().await;
            session.phase = GamePhase::Selecting;
            session
                .participants
                .push(Participant::new("Alice".into(), "ABC123".into(), "c1".into()));
        }

        assert_eq!(state.create_session("ABC123"), Ok(true));

        let handle = state.sessions.get("ABC123").unwrap();
        let session = handle.lock().await;
        assert_eq!(session.phase, GamePhase::Selecting);
        assert_eq!(session.participants.len(), 1);
        assert_eq!(state.sessions.len(), 1);
    }

    #[tokio::test]
    async fn test_close_only_removes_same_handle() {
        let store = SessionStore::new();
        let (old, _) = store.get_or_create("s1");
        let mut old_guard = old.lock_owned().await;

        // Simulate a successor taking the id before the old session closes
        store.sessions.remove("s1");
        let (successor, created) = store.get_or_create("s1");
        assert!(created);

        assert!(!store.close(&mut old_guard));
        assert!(old_guard.is_closed());
        assert!(Arc::ptr_eq(&store.get("s1").unwrap(), &successor));
    }

    #[tokio::test]
    async fn test_lock_if_empty_rechecks() {
        let store = SessionStore::new();
        let (handle, _) = store.get_or_create("s1");
        handle
            .lock()
            .await
            .participants
            .push(Participant::new("Alice".into(), "s1".into(), "c1".into()));

        assert!(store.lock_if_empty("s1").await.is_none());

        handle.lock().await.participants.clear();
        let mut session = store.lock_if_empty("s1").await.unwrap();
        assert!(store.close(&mut session));
        drop(session);

        assert!(!store.contains("s1"));
        assert!(store.lock_if_empty("s1").await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_join_racing_cleanup_keeps_group_membership() {
        let state = AppState::new();
        state.create_session("S").unwrap();

        // Hold the lock while the grace timer fires, so cleanup is parked on it
        let handle = state.sessions.get("S").unwrap();
        let guard = handle.lock_owned().await;
        tokio::time::sleep(Duration::from_secs(61)).await;
        tokio::task::yield_now().await;

        let joiner = {
            let state = state.clone();
            tokio::spawn(async move {
                let rx = state.router.register("c1");
                state.join_session("Alice", "S", "c1").await.unwrap();
                rx
            })
        };
        tokio::task::yield_now().await;
        drop(guard);
        let _rx = joiner.await.unwrap();

        assert!(state.session_exists("S"));
        assert_eq!(state.router.group_members("S"), vec!["c1".to_string()]);
        assert_eq!(state.handle_disconnect("c1").await, vec!["S".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_created_session_expires_if_nobody_joins() {
        let state = AppState::new();
        state.create_session("ABC123").unwrap();
        assert!(state.cleanup_pending("ABC123"));

        tokio::time::sleep(Duration::from_secs(61)).await;
        tokio::task::yield_now().await;

        assert!(!state.session_exists("ABC123"));
    }

    #[tokio::test]
    async fn test_generated_sessions_are_distinct() {
        let state = AppState::new();
        let a = state.create_generated_session();
        let b = state.create_generated_session();
        assert_ne!(a, b);
        assert!(state.session_exists(&a));
        assert!(state.session_exists(&b));
    }
}
