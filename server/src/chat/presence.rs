//! Presence broadcast to a user's social graph.
//!
//! On identify the newly online user and each of their reachable friends
//! learn about each other; on teardown only the friends are told. The friend
//! lookup is best-effort: a store failure is logged and the broadcast skipped.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;

use crate::directory::SocialGraph;
use crate::state::AppState;
use crate::ws::broadcast::send_event;
use crate::ws::protocol::ServerEvent;
use crate::ws::{ConnectionHandle, ConnectionRegistry, UserId};

#[derive(Clone)]
pub struct PresenceBroadcaster {
    registry: ConnectionRegistry,
    graph: Arc<dyn SocialGraph>,
}

impl PresenceBroadcaster {
    pub fn new(registry: ConnectionRegistry, graph: Arc<dyn SocialGraph>) -> Self {
        Self { registry, graph }
    }

    /// Tell reachable friends `user_id` is online, and tell `own` which of
    /// its friends already are. Returns the number of online friends found.
    pub async fn announce_online(&self, user_id: &str, own: &ConnectionHandle) -> usize {
        let Some(friends) = self.friends_of(user_id).await else {
            return 0;
        };

        let online = ServerEvent::UserOnline {
            user_id: user_id.to_string(),
        };
        let mut found = 0;

        for friend_id in friends {
            let Some(friend) = self.registry.resolve(&friend_id) else {
                continue;
            };
            found += 1;
            send_event(&friend, &online);
            send_event(own, &ServerEvent::UserOnline { user_id: friend_id });
        }

        tracing::debug!(user_id = %user_id, online_friends = found, "Online presence broadcast");
        found
    }

    /// Tell reachable friends `user_id` went offline. Returns how many were told.
    pub async fn announce_offline(&self, user_id: &str) -> usize {
        let Some(friends) = self.friends_of(user_id).await else {
            return 0;
        };

        let offline = ServerEvent::UserOffline {
            user_id: user_id.to_string(),
        };
        let told = friends
            .iter()
            .filter_map(|friend_id| self.registry.resolve(friend_id))
            .filter(|friend| send_event(friend, &offline))
            .count();

        tracing::debug!(user_id = %user_id, notified = told, "Offline presence broadcast");
        told
    }

    async fn friends_of(&self, user_id: &str) -> Option<HashSet<UserId>> {
        match self.graph.friend_ids(user_id).await {
            Ok(mut friends) => {
                friends.remove(user_id);
                Some(friends)
            }
            Err(e) => {
                tracing::warn!(
                    user_id = %user_id,
                    error = %e,
                    "Friend lookup failed, skipping presence broadcast"
                );
                None
            }
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceResponse {
    pub user_id: String,
    pub online: bool,
}

/// GET /api/presence/{user_id}: whether the user currently holds a live connection.
pub async fn get_presence(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Json<PresenceResponse> {
    let online = state.registry.is_online(&user_id);
    Json(PresenceResponse { user_id, online })
}
