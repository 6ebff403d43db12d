//! Connection registry: which user is reachable on which connection.
//!
//! Two tables, each a `DashMap` so mutations are serialized per key:
//! - `connections`: every attached transport session and the user it
//!   identified as (if any)
//! - `users`: user id -> the connection that most recently identified as
//!   that user (last device wins)
//!
//! Removal is compare-and-remove on the connection id, so tearing down a
//! stale connection never evicts a newer mapping for the same user.

use dashmap::DashMap;
use std::sync::Arc;

use super::{ConnectionHandle, ConnectionId, UserId};

#[derive(Debug, Clone)]
struct ConnectionEntry {
    handle: ConnectionHandle,
    user_id: Option<UserId>,
}

/// Result of a successful `identify`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentifyOutcome {
    /// Connection that previously held the mapping for this user, if it was
    /// a different one (device switch).
    pub replaced: Option<ConnectionId>,
    /// User this connection was identified as before and who lost their
    /// mapping because of the re-identify.
    pub went_offline: Option<UserId>,
}

#[derive(Debug, Clone, Default)]
pub struct ConnectionRegistry {
    users: Arc<DashMap<UserId, ConnectionHandle>>,
    connections: Arc<DashMap<ConnectionId, ConnectionEntry>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a freshly established, not yet identified connection.
    pub fn attach(&self, handle: ConnectionHandle) {
        let id = handle.id;
        self.connections.insert(
            id,
            ConnectionEntry {
                handle,
                user_id: None,
            },
        );
        tracing::debug!(connection_id = %id, "Connection attached");
    }

    /// Map `user_id` to `connection`, overwriting any previous mapping.
    ///
    /// Returns `None` if the connection is not attached (already torn down);
    /// in that case nothing is registered.
    pub fn identify(&self, connection: ConnectionId, user_id: &str) -> Option<IdentifyOutcome> {
        let (handle, previous_user) = {
            let mut entry = self.connections.get_mut(&connection)?;
            let previous = entry.user_id.replace(user_id.to_string());
            (entry.handle.clone(), previous)
        };

        let went_offline = previous_user
            .filter(|prev| prev != user_id)
            .and_then(|prev| {
                self.users
                    .remove_if(&prev, |_, current| current.id == connection)
                    .map(|(user, _)| user)
            });

        let replaced = self
            .users
            .insert(user_id.to_string(), handle)
            .map(|old| old.id)
            .filter(|old| *old != connection);

        tracing::debug!(
            connection_id = %connection,
            user_id = %user_id,
            replaced = ?replaced,
            "Connection identified"
        );

        Some(IdentifyOutcome {
            replaced,
            went_offline,
        })
    }

    /// Current connection for `user_id`, if the user is reachable.
    pub fn resolve(&self, user_id: &str) -> Option<ConnectionHandle> {
        self.users.get(user_id).map(|entry| entry.value().clone())
    }

    pub fn is_online(&self, user_id: &str) -> bool {
        self.users.contains_key(user_id)
    }

    /// User the connection identified as, whether or not it still holds the
    /// user's mapping.
    pub fn user_of(&self, connection: ConnectionId) -> Option<UserId> {
        self.connections
            .get(&connection)
            .and_then(|entry| entry.user_id.clone())
    }

    /// Drop the connection. Returns the user that went offline because of
    /// it, which only happens when this connection still held the mapping.
    pub fn remove(&self, connection: ConnectionId) -> Option<UserId> {
        let (_, entry) = self.connections.remove(&connection)?;
        let user_id = entry.user_id?;

        let went_offline = self
            .users
            .remove_if(&user_id, |_, current| current.id == connection)
            .map(|(user, _)| user);

        tracing::debug!(
            connection_id = %connection,
            user_id = %user_id,
            offline = went_offline.is_some(),
            "Connection removed"
        );

        went_offline
    }

    /// Number of reachable users.
    pub fn online_count(&self) -> usize {
        self.users.len()
    }

    /// Number of attached connections, identified or not.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}
