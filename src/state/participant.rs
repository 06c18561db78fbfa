use super::{AppState, Session};
use crate::broadcast::Target;
use crate::error::{CoordinatorError, CoordinatorResult};
use crate::protocol::ServerMessage;
use crate::types::*;
use chrono::{DateTime, Utc};

/// How a join request was resolved against the existing roster
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    /// New participant record
    Joined,
    /// Took over a disconnected participant's record
    Reconnected,
    /// Same connection joined again (possibly with a new name)
    Updated,
}

#[derive(Debug, Clone)]
pub struct JoinOutcome {
    pub kind: JoinKind,
    pub participant: Participant,
}

impl Session {
    pub fn find_by_connection(&self, connection_id: &str) -> Option<&Participant> {
        self.participants
            .iter()
            .find(|p| p.connection_id.as_deref() == Some(connection_id))
    }

    pub fn find_by_name(&self, name: &str) -> Option<&Participant> {
        self.participants.iter().find(|p| p.name_matches(name))
    }

    /// Attach a connection to the roster.
    ///
    /// Lookup order: same connection id, then a *disconnected* participant
    /// with the same name (case-insensitive). Connected participants are never
    /// taken over by name.
    pub fn resolve_join(&mut self, user_name: &str, connection_id: &str) -> JoinOutcome {
        let existing = self
            .participants
            .iter()
            .position(|p| p.connection_id.as_deref() == Some(connection_id))
            .or_else(|| {
                self.participants
                    .iter()
                    .position(|p| !p.is_connected && p.name_matches(user_name))
            });

        let Some(index) = existing else {
            if self
                .participants
                .iter()
                .any(|p| p.is_connected && p.name_matches(user_name))
            {
                tracing::warn!(
                    "Name {} is already in use by a connected participant in {}",
                    user_name,
                    self.id
                );
            }

            let participant = Participant::new(
                user_name.to_string(),
                self.id.clone(),
                connection_id.to_string(),
            );
            self.participants.push(participant.clone());
            return JoinOutcome {
                kind: JoinKind::Joined,
                participant,
            };
        };

        // Another participant already answers to this name: keep the stored one
        let name_taken = self
            .participants
            .iter()
            .enumerate()
            .any(|(i, p)| i != index && p.name_matches(user_name));
        if name_taken {
            tracing::warn!(
                "{} is taken in {}, keeping name {}",
                user_name,
                self.id,
                self.participants[index].name
            );
        }

        let participant = &mut self.participants[index];
        let kind = if participant.is_connected {
            JoinKind::Updated
        } else {
            JoinKind::Reconnected
        };
        let previous_name = if name_taken {
            participant.name.clone()
        } else {
            std::mem::replace(&mut participant.name, user_name.to_string())
        };
        participant.connection_id = Some(connection_id.to_string());
        participant.is_connected = true;
        participant.disconnected_at = None;
        let participant = participant.clone();

        self.migrate_vote(&previous_name, &participant.name);

        JoinOutcome { kind, participant }
    }

    /// Remove the participant on this connection
    pub fn remove_by_connection(&mut self, connection_id: &str) -> Option<Participant> {
        let index = self
            .participants
            .iter()
            .position(|p| p.connection_id.as_deref() == Some(connection_id))?;
        Some(self.participants.remove(index))
    }

    /// Soft-disconnect: keep the record (name, vote) for a later reconnect
    pub fn mark_disconnected(&mut self, connection_id: &str) -> Option<Participant> {
        let participant = self
            .participants
            .iter_mut()
            .find(|p| p.connection_id.as_deref() == Some(connection_id))?;

        participant.is_connected = false;
        participant.connection_id = None;
        participant.disconnected_at = Some(Utc::now());
        Some(participant.clone())
    }

    /// Rename a participant, carrying its vote over to the new name
    pub fn rename(&mut self, old_name: &str, new_name: &str) -> CoordinatorResult<Participant> {
        if new_name.trim().is_empty() {
            return Err(CoordinatorError::InvalidName);
        }

        let index = self
            .participants
            .iter()
            .position(|p| p.name_matches(old_name))
            .ok_or_else(|| CoordinatorError::ParticipantNotFound(old_name.to_string()))?;

        let taken = self
            .participants
            .iter()
            .enumerate()
            .any(|(i, p)| i != index && p.name_matches(new_name));
        if taken {
            return Err(CoordinatorError::NameTaken(new_name.to_string()));
        }

        let previous_name =
            std::mem::replace(&mut self.participants[index].name, new_name.to_string());
        self.migrate_vote(&previous_name, new_name);

        Ok(self.participants[index].clone())
    }

    /// Move a ledger entry to a new key, keeping its value.
    /// A key already voted under by someone else is never overwritten.
    fn migrate_vote(&mut self, from: &str, to: &str) {
        if from == to {
            return;
        }
        let holders = self.participants.iter().filter(|p| p.name == to).count();
        if holders > 1 && self.votes.contains_key(to) {
            tracing::warn!("Vote under {} belongs to another participant in {}", to, self.id);
            return;
        }
        if let Some(value) = self.votes.remove(from) {
            self.votes.insert(to.to_string(), value);
        }
    }
}

impl AppState {
    /// Join (or rejoin) a session, creating it if needed
    pub async fn join_session(
        &self,
        user_name: &str,
        session_id: &str,
        connection_id: &str,
    ) -> CoordinatorResult<JoinOutcome> {
        if session_id.trim().is_empty() {
            return Err(CoordinatorError::InvalidSessionId);
        }
        if user_name.trim().is_empty() {
            return Err(CoordinatorError::InvalidName);
        }

        // A closed session has already left the store, so the retry creates a fresh one
        let mut session = loop {
            let (handle, created) = self.sessions.get_or_create(session_id);
            if created {
                tracing::info!("Session {} created by join", session_id);
            }
            let session = handle.lock_owned().await;
            if !session.is_closed() {
                break session;
            }
        };
        self.cleanup.cancel(session_id);

        let outcome = session.resolve_join(user_name, connection_id);
        self.router.add_to_group(session_id, connection_id);

        let participant = outcome.participant.clone();
        let event = match outcome.kind {
            JoinKind::Joined => {
                tracing::info!("{} joined session {}", user_name, session_id);
                ServerMessage::ParticipantJoined { participant }
            }
            JoinKind::Reconnected => {
                tracing::info!("{} reconnected to session {}", user_name, session_id);
                ServerMessage::ParticipantReconnected { participant }
            }
            JoinKind::Updated => {
                tracing::info!("{} rejoined session {} on the same connection", user_name, session_id);
                ServerMessage::ParticipantUpdated { participant }
            }
        };
        self.router.send(
            Target::Others {
                session_id,
                except: connection_id,
            },
            event,
        );

        let caller = Target::Connection(connection_id);
        self.router.send(
            caller,
            ServerMessage::SessionParticipants {
                participants: session.participants.clone(),
            },
        );
        for msg in session.late_join_replay() {
            self.router.send(caller, msg);
        }

        Ok(outcome)
    }

    /// Explicit leave: the participant is removed right away
    pub async fn leave_session(
        &self,
        session_id: &str,
        connection_id: &str,
    ) -> CoordinatorResult<Participant> {
        let mut session = self.lock_session(session_id).await?;

        let removed = session.remove_by_connection(connection_id);
        if let Some(ref participant) = removed {
            tracing::info!(
                "Participant {} explicitly left session {}",
                participant.name,
                session_id
            );
            self.router.send(
                Target::Others {
                    session_id,
                    except: connection_id,
                },
                ServerMessage::ParticipantLeft {
                    participant: participant.clone(),
                },
            );
        }
        self.router.remove_from_group(session_id, connection_id);

        if session.is_empty() {
            self.schedule_empty_cleanup(session_id);
        }

        removed.ok_or_else(|| CoordinatorError::ParticipantNotFound(connection_id.to_string()))
    }

    /// Transport drop: soft-disconnect the connection in every session it was in.
    /// Returns the sessions that had a participant on this connection.
    pub async fn handle_disconnect(&self, connection_id: &str) -> Vec<SessionId> {
        let mut affected = Vec::new();

        for session_id in self.router.unregister(connection_id) {
            let Ok(mut session) = self.lock_session(&session_id).await else {
                continue;
            };
            let Some(participant) = session.mark_disconnected(connection_id) else {
                continue;
            };

            tracing::info!(
                "{} disconnected from session {}",
                participant.name,
                session_id
            );

            if let (Some(timeout), Some(at)) =
                (self.config.disconnect_timeout, participant.disconnected_at)
            {
                self.schedule_reap(&session_id, &participant.name, at, timeout);
            }

            self.router.send(
                Target::Group(&session_id),
                ServerMessage::ParticipantDisconnected { participant },
            );
            affected.push(session_id);
        }

        affected
    }

    /// Rename a participant. Everyone, including the renaming client, gets the result.
    pub async fn rename_participant(
        &self,
        session_id: &str,
        old_name: &str,
        new_name: &str,
    ) -> CoordinatorResult<Participant> {
        let mut session = self.lock_session(session_id).await?;
        let participant = session.rename(old_name, new_name)?;

        tracing::info!(
            "User name changed from {} to {} in session {}",
            old_name,
            new_name,
            session_id
        );

        self.router.send(
            Target::Group(session_id),
            ServerMessage::ParticipantUpdated {
                participant: participant.clone(),
            },
        );
        self.router.send(
            Target::Group(session_id),
            ServerMessage::SessionParticipants {
                participants: session.participants.clone(),
            },
        );

        Ok(participant)
    }

    fn schedule_reap(
        &self,
        session_id: &str,
        name: &str,
        disconnected_at: DateTime<Utc>,
        timeout: std::time::Duration,
    ) {
        let state = self.clone();
        let session_id = session_id.to_string();
        let name = name.to_string();

        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            state
                .reap_participant(&session_id, &name, disconnected_at)
                .await;
        });
    }

    /// Hard-remove a participant that is still disconnected since `disconnected_at`
    async fn reap_participant(&self, session_id: &str, name: &str, disconnected_at: DateTime<Utc>) {
        let Ok(mut session) = self.lock_session(session_id).await else {
            return;
        };

        let Some(index) = session.participants.iter().position(|p| {
            !p.is_connected && p.disconnected_at == Some(disconnected_at) && p.name_matches(name)
        }) else {
            tracing::debug!("{} came back to {} or is gone, not reaping", name, session_id);
            return;
        };

        let participant = session.participants.remove(index);
        tracing::info!(
            "Removed {} from session {} after disconnect timeout",
            participant.name,
            session_id
        );
        self.router.send(
            Target::Group(session_id),
            ServerMessage::ParticipantLeft { participant },
        );

        if session.is_empty() {
            self.schedule_empty_cleanup(session_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_with(names: &[(&str, &str)]) -> Session {
        let mut session = Session::new("s1".to_string());
        for (name, conn) in names {
            session.resolve_join(name, conn);
        }
        session
    }

    #[test]
    fn test_resolve_join_new_participants_keep_order() {
        let session = session_with(&[("Alice", "c1"), ("Bob", "c2")]);
        let names: Vec<_> = session.participants.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Alice", "Bob"]);
    }

    #[test]
    fn test_resolve_join_same_connection_updates() {
        let mut session = session_with(&[("Alice", "c1")]);
        let outcome = session.resolve_join("Alicia", "c1");

        assert_eq!(outcome.kind, JoinKind::Updated);
        assert_eq!(session.participants.len(), 1);
        assert_eq!(session.participants[0].name, "Alicia");
    }

    #[test]
    fn test_resolve_join_reconnects_disconnected_by_name() {
        let mut session = session_with(&[("Alice", "c1")]);
        session.participants[0].has_voted = true;
        session.votes.insert("Alice".into(), "8".into());
        session.mark_disconnected("c1");

        let outcome = session.resolve_join("alice", "c9");

        assert_eq!(outcome.kind, JoinKind::Reconnected);
        assert_eq!(session.participants.len(), 1);
        let p = &session.participants[0];
        assert!(p.is_connected);
        assert!(p.has_voted);
        assert!(p.disconnected_at.is_none());
        assert_eq!(p.connection_id.as_deref(), Some("c9"));
        assert_eq!(session.votes.get("alice"), Some(&"8".to_string()));
        assert!(!session.votes.contains_key("Alice"));
    }

    #[test]
    fn test_resolve_join_never_hijacks_connected_name() {
        let mut session = session_with(&[("Alice", "c1")]);
        let outcome = session.resolve_join("Alice", "c2");

        assert_eq!(outcome.kind, JoinKind::Joined);
        assert_eq!(session.participants.len(), 2);
        assert_eq!(session.participants[0].connection_id.as_deref(), Some("c1"));
    }

    #[test]
    fn test_rejoin_under_taken_name_keeps_both_votes() {
        let mut session = session_with(&[("Alice", "c1"), ("Bob", "c2")]);
        session.votes.insert("Alice".into(), "3".into());
        session.votes.insert("Bob".into(), "5".into());

        let outcome = session.resolve_join("Bob", "c1");

        assert_eq!(outcome.kind, JoinKind::Updated);
        assert_eq!(outcome.participant.name, "Alice");
        let names: Vec<_> = session.participants.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Alice", "Bob"]);
        assert_eq!(session.votes.get("Alice"), Some(&"3".to_string()));
        assert_eq!(session.votes.get("Bob"), Some(&"5".to_string()));
    }

    #[test]
    fn test_reconnect_does_not_take_over_live_duplicate_vote() {
        // A second "alice" is admitted while Alice is live, then Alice drops
        let mut session = session_with(&[("Alice", "c1"), ("alice", "c2")]);
        session.votes.insert("Alice".into(), "8".into());
        session.votes.insert("alice".into(), "2".into());
        session.mark_disconnected("c1");

        let outcome = session.resolve_join("alice", "c3");

        assert_eq!(outcome.kind, JoinKind::Reconnected);
        assert_eq!(outcome.participant.name, "Alice");
        assert_eq!(session.votes.get("Alice"), Some(&"8".to_string()));
        assert_eq!(session.votes.get("alice"), Some(&"2".to_string()));
    }

    #[test]
    fn test_rename_migrates_vote() {
        let mut session = session_with(&[("Alice", "c1"), ("Bob", "c2")]);
        session.votes.insert("Alice".into(), "5".into());

        let renamed = session.rename("ALICE", "Alicia").unwrap();

        assert_eq!(renamed.name, "Alicia");
        assert_eq!(session.votes.len(), 1);
        assert_eq!(session.votes.get("Alicia"), Some(&"5".to_string()));
    }

    #[test]
    fn test_rename_refuses_taken_name() {
        let mut session = session_with(&[("Alice", "c1"), ("Bob", "c2")]);

        assert_eq!(
            session.rename("Alice", "bob"),
            Err(CoordinatorError::NameTaken("bob".to_string()))
        );
        assert_eq!(
            session.rename("Carol", "Dave"),
            Err(CoordinatorError::ParticipantNotFound("Carol".to_string()))
        );
        assert_eq!(session.rename("Alice", " "), Err(CoordinatorError::InvalidName));

        // Changing only the case of one's own name is fine
        assert!(session.rename("Alice", "ALICE").is_ok());
    }

    #[test]
    fn test_mark_disconnected_keeps_record() {
        let mut session = session_with(&[("Alice", "c1")]);
        let participant = session.mark_disconnected("c1").unwrap();

        assert!(!participant.is_connected);
        assert!(participant.connection_id.is_none());
        assert!(participant.disconnected_at.is_some());
        assert_eq!(session.participants.len(), 1);
        assert!(session.mark_disconnected("c1").is_none());
    }
}
