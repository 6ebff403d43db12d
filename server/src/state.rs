use std::sync::Arc;
use std::time::Duration;

use crate::chat::{PresenceBroadcaster, Rooms};
use crate::directory::{CallLog, Directory, SocialGraph, SqliteStore};
use crate::push::{FallbackBridge, PushSender};
use crate::voice::SignalingRelay;
use crate::ws::ConnectionRegistry;

/// External collaborators the relay consumes.
#[derive(Clone)]
pub struct Collaborators {
    pub social_graph: Arc<dyn SocialGraph>,
    pub directory: Arc<dyn Directory>,
    pub call_log: Arc<dyn CallLog>,
    pub push: Arc<dyn PushSender>,
}

impl Collaborators {
    /// Every storage-backed collaborator served by one SQLite store.
    pub fn from_store(store: SqliteStore, push: Arc<dyn PushSender>) -> Self {
        let store = Arc::new(store);
        Self {
            social_graph: store.clone(),
            directory: store.clone(),
            call_log: store,
            push,
        }
    }
}

/// Ping/pong timing for each WebSocket actor.
#[derive(Debug, Clone, Copy)]
pub struct KeepAlive {
    pub ping_interval: Duration,
    pub pong_timeout: Duration,
}

impl Default for KeepAlive {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(30),
            pong_timeout: Duration::from_secs(10),
        }
    }
}

/// Shared application state passed to all handlers via axum State extractor.
/// The registry is created once here and injected into every component.
#[derive(Clone)]
pub struct AppState {
    /// Live connections and the user each is reachable as
    pub registry: ConnectionRegistry,
    /// Conversation broadcast groups
    pub rooms: Rooms,
    pub presence: PresenceBroadcaster,
    pub signaling: SignalingRelay,
    pub fallback: FallbackBridge,
    pub directory: Arc<dyn Directory>,
    pub call_log: Arc<dyn CallLog>,
    pub push: Arc<dyn PushSender>,
    pub keepalive: KeepAlive,
}

impl AppState {
    pub fn new(collaborators: Collaborators, keepalive: KeepAlive, preview_max_chars: usize) -> Self {
        let registry = ConnectionRegistry::new();

        Self {
            rooms: Rooms::new(),
            presence: PresenceBroadcaster::new(registry.clone(), collaborators.social_graph),
            signaling: SignalingRelay::new(registry.clone()),
            fallback: FallbackBridge::new(
                registry.clone(),
                collaborators.directory.clone(),
                collaborators.push.clone(),
                preview_max_chars,
            ),
            directory: collaborators.directory,
            call_log: collaborators.call_log,
            push: collaborators.push,
            keepalive,
            registry,
        }
    }
}
