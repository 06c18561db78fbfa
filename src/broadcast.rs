//! Event delivery to connected clients
//!
//! Every WebSocket registers an outbound channel here under its connection id.
//! Sessions are groups of connection ids. The router knows nothing about
//! participants or phases; group membership is changed only by the join,
//! leave, end and disconnect paths of the coordinator.

use crate::protocol::ServerMessage;
use crate::types::{ConnectionId, SessionId};
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Who receives an event
#[derive(Debug, Clone, Copy)]
pub enum Target<'a> {
    /// A single connection
    Connection(&'a str),
    /// Every connection in the session except `except`
    Others { session_id: &'a str, except: &'a str },
    /// Every connection in the session
    Group(&'a str),
}

#[derive(Clone, Default)]
pub struct BroadcastRouter {
    connections: Arc<DashMap<ConnectionId, UnboundedSender<ServerMessage>>>,
    groups: Arc<DashMap<SessionId, HashSet<ConnectionId>>>,
}

impl BroadcastRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection and return the receiving half of its outbound channel
    pub fn register(&self, connection_id: &str) -> UnboundedReceiver<ServerMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        if self
            .connections
            .insert(connection_id.to_string(), tx)
            .is_some()
        {
            tracing::warn!("Connection {} registered twice, replacing", connection_id);
        }
        rx
    }

    /// Drop a connection and remove it from every group.
    /// Returns the sessions it was a member of.
    pub fn unregister(&self, connection_id: &str) -> Vec<SessionId> {
        self.connections.remove(connection_id);

        let mut left = Vec::new();
        for mut group in self.groups.iter_mut() {
            if group.value_mut().remove(connection_id) {
                left.push(group.key().clone());
            }
        }
        self.groups.retain(|_, members| !members.is_empty());
        left
    }

    pub fn add_to_group(&self, session_id: &str, connection_id: &str) {
        self.groups
            .entry(session_id.to_string())
            .or_default()
            .insert(connection_id.to_string());
    }

    pub fn remove_from_group(&self, session_id: &str, connection_id: &str) {
        let now_empty = match self.groups.get_mut(session_id) {
            Some(mut members) => {
                members.remove(connection_id);
                members.is_empty()
            }
            None => false,
        };
        if now_empty {
            self.groups.remove_if(session_id, |_, members| members.is_empty());
        }
    }

    /// Dissolve a group, returning its former members
    pub fn remove_group(&self, session_id: &str) -> Vec<ConnectionId> {
        self.groups
            .remove(session_id)
            .map(|(_, members)| members.into_iter().collect())
            .unwrap_or_default()
    }

    pub fn group_members(&self, session_id: &str) -> Vec<ConnectionId> {
        self.groups
            .get(session_id)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn is_registered(&self, connection_id: &str) -> bool {
        self.connections.contains_key(connection_id)
    }

    /// Fire-and-forget delivery. Failures are logged, never returned.
    pub fn send(&self, target: Target<'_>, msg: ServerMessage) {
        match target {
            Target::Connection(connection_id) => self.deliver(connection_id, msg),
            Target::Others { session_id, except } => {
                for member in self.group_members(session_id) {
                    if member != except {
                        self.deliver(&member, msg.clone());
                    }
                }
            }
            Target::Group(session_id) => {
                for member in self.group_members(session_id) {
                    self.deliver(&member, msg.clone());
                }
            }
        }
    }

    fn deliver(&self, connection_id: &str, msg: ServerMessage) {
        let Some(tx) = self.connections.get(connection_id) else {
            tracing::debug!(
                "Dropping {} for unknown connection {}",
                msg.name(),
                connection_id
            );
            return;
        };

        let name = msg.name();
        if tx.send(msg).is_err() {
            tracing::warn!("Failed to deliver {} to {}: receiver gone", name, connection_id);
        }
    }
}
