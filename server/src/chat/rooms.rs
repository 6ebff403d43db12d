//! Conversation rooms: broadcast groups of connections.
//!
//! `members` is keyed by room so joins and broadcasts on unrelated rooms do
//! not contend; `joined` is the reverse index used on teardown.

use dashmap::DashMap;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::ws::broadcast::send_to_many;
use crate::ws::protocol::ServerEvent;
use crate::ws::{ConnectionHandle, ConnectionId, ConnectionSender};

pub type RoomId = String;

#[derive(Debug, Clone, Default)]
pub struct Rooms {
    members: Arc<DashMap<RoomId, HashMap<ConnectionId, ConnectionSender>>>,
    joined: Arc<DashMap<ConnectionId, HashSet<RoomId>>>,
}

impl Rooms {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the connection to the room. Returns false if it was already a member.
    pub fn join(&self, handle: &ConnectionHandle, room_id: &str) -> bool {
        let inserted = self
            .members
            .entry(room_id.to_string())
            .or_default()
            .insert(handle.id, handle.sender.clone())
            .is_none();

        self.joined
            .entry(handle.id)
            .or_default()
            .insert(room_id.to_string());

        if inserted {
            tracing::debug!(
                connection_id = %handle.id,
                room_id = %room_id,
                "Joined room"
            );
        }
        inserted
    }

    /// Remove the connection from the room. Returns false if it was not a member.
    pub fn leave(&self, connection: ConnectionId, room_id: &str) -> bool {
        let removed = self.remove_member(connection, room_id);

        if let Some(mut rooms) = self.joined.get_mut(&connection) {
            rooms.remove(room_id);
            if rooms.is_empty() {
                drop(rooms);
                self.joined.remove_if(&connection, |_, rooms| rooms.is_empty());
            }
        }

        if removed {
            tracing::debug!(connection_id = %connection, room_id = %room_id, "Left room");
        }
        removed
    }

    /// Remove the connection from every room it joined. Returns those rooms.
    pub fn leave_all(&self, connection: ConnectionId) -> Vec<RoomId> {
        let Some((_, rooms)) = self.joined.remove(&connection) else {
            return Vec::new();
        };

        rooms
            .into_iter()
            .filter(|room_id| self.remove_member(connection, room_id))
            .collect()
    }

    /// Deliver `event` to every member, the sender's own connections included.
    /// An empty or unknown room is a no-op. Returns the number of deliveries.
    pub fn broadcast(&self, room_id: &str, event: &ServerEvent) -> usize {
        // Snapshot senders so the shard lock is not held while encoding
        let senders: Vec<ConnectionSender> = match self.members.get(room_id) {
            Some(members) => members.values().cloned().collect(),
            None => return 0,
        };

        let delivered = send_to_many(senders.iter(), event);
        tracing::debug!(
            room_id = %room_id,
            members = senders.len(),
            delivered,
            "Room broadcast"
        );
        delivered
    }

    pub fn members(&self, room_id: &str) -> Vec<ConnectionId> {
        self.members
            .get(room_id)
            .map(|members| members.keys().copied().collect())
            .unwrap_or_default()
    }

    pub fn rooms_of(&self, connection: ConnectionId) -> HashSet<RoomId> {
        self.joined
            .get(&connection)
            .map(|rooms| rooms.clone())
            .unwrap_or_default()
    }

    fn remove_member(&self, connection: ConnectionId, room_id: &str) -> bool {
        let Some(mut members) = self.members.get_mut(room_id) else {
            return false;
        };
        let removed = members.remove(&connection).is_some();
        if members.is_empty() {
            drop(members);
            self.members.remove_if(room_id, |_, members| members.is_empty());
        }
        removed
    }
}
