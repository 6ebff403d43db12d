//! Test doubles shared by unit tests.

use async_trait::async_trait;
use axum::extract::ws::Message;
use chrono::Utc;
use uuid::Uuid;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::{self, UnboundedReceiver};

use crate::db::models::{CallRecord, CallUpdate, MessageType, Participant};
use crate::directory::{CallLog, Directory, SocialGraph};
use crate::error::{PushError, StoreError};
use crate::push::{PushNotification, PushSender};
use crate::state::{AppState, Collaborators, KeepAlive};
use crate::ws::protocol::{ChatMessage, SenderProfile, ServerEvent};
use crate::ws::ConnectionHandle;

pub fn channel_handle() -> (ConnectionHandle, UnboundedReceiver<Message>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ConnectionHandle::new(tx), rx)
}

/// Every event queued on the channel so far.
pub fn drain_events(rx: &mut UnboundedReceiver<Message>) -> Vec<ServerEvent> {
    let mut events = Vec::new();
    while let Ok(msg) = rx.try_recv() {
        match msg {
            Message::Text(text) => {
                events.push(serde_json::from_str(text.as_str()).expect("valid server event"))
            }
            other => panic!("unexpected frame {other:?}"),
        }
    }
    events
}

pub fn chat_message(conversation_id: &str, sender_id: &str, content: &str) -> ChatMessage {
    ChatMessage {
        id: "m1".into(),
        conversation_id: conversation_id.into(),
        sender_id: sender_id.into(),
        content: content.into(),
        message_type: MessageType::Text,
        created_at: Utc::now(),
        sender: SenderProfile {
            id: sender_id.into(),
            display_name: None,
            avatar: None,
        },
    }
}

/// Social graph built from (user, friend) edges; lookup is bidirectional.
pub struct StaticGraph {
    edges: Vec<(String, String)>,
}

impl StaticGraph {
    pub fn new(edges: &[(&str, &str)]) -> Self {
        Self {
            edges: edges
                .iter()
                .map(|(a, b)| (a.to_string(), b.to_string()))
                .collect(),
        }
    }
}

#[async_trait]
impl SocialGraph for StaticGraph {
    async fn friend_ids(&self, user_id: &str) -> Result<HashSet<String>, StoreError> {
        Ok(self
            .edges
            .iter()
            .filter_map(|(a, b)| match (a == user_id, b == user_id) {
                (true, _) => Some(b.clone()),
                (_, true) => Some(a.clone()),
                _ => None,
            })
            .collect())
    }
}

pub struct FailingGraph;

#[async_trait]
impl SocialGraph for FailingGraph {
    async fn friend_ids(&self, _user_id: &str) -> Result<HashSet<String>, StoreError> {
        Err(StoreError::LockPoisoned)
    }
}

/// Directory holding a single conversation.
pub struct StaticDirectory {
    conversations: HashMap<String, Vec<Participant>>,
}

impl StaticDirectory {
    pub fn new(conversation_id: &str, participants: Vec<Participant>) -> Self {
        Self {
            conversations: HashMap::from([(conversation_id.to_string(), participants)]),
        }
    }
}

#[async_trait]
impl Directory for StaticDirectory {
    async fn participants(&self, conversation_id: &str) -> Result<Vec<Participant>, StoreError> {
        Ok(self
            .conversations
            .get(conversation_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn push_token(&self, user_id: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .conversations
            .values()
            .flatten()
            .find(|p| p.user_id == user_id)
            .and_then(|p| p.push_token.clone()))
    }
}

/// Records every push attempt; optionally fails each one.
#[derive(Default)]
pub struct RecordingPush {
    sent: Mutex<Vec<(String, PushNotification)>>,
    fail: bool,
}

impl RecordingPush {
    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn recorded(&self) -> Vec<(String, PushNotification)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl PushSender for RecordingPush {
    async fn send_push(
        &self,
        device_token: &str,
        notification: &PushNotification,
    ) -> Result<(), PushError> {
        self.sent
            .lock()
            .unwrap()
            .push((device_token.to_string(), notification.clone()));
        if self.fail {
            Err(PushError::Rejected(503))
        } else {
            Ok(())
        }
    }
}

/// Call log that accepts everything and remembers nothing.
pub struct NoopCallLog;

#[async_trait]
impl CallLog for NoopCallLog {
    async fn persist_call_record(&self, _record: &CallRecord) -> Result<(), StoreError> {
        Ok(())
    }

    async fn update_call_record(
        &self,
        _id: Uuid,
        _update: &CallUpdate,
    ) -> Result<Option<CallRecord>, StoreError> {
        Ok(None)
    }
}

/// App state wired to in-memory doubles.
pub fn test_state(graph: StaticGraph) -> AppState {
    AppState::new(
        Collaborators {
            social_graph: Arc::new(graph),
            directory: Arc::new(StaticDirectory::new("none", Vec::new())),
            call_log: Arc::new(NoopCallLog),
            push: Arc::new(RecordingPush::default()),
        },
        KeepAlive::default(),
        50,
    )
}
