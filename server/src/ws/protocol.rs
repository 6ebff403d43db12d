//! Wire protocol: JSON text frames of the form `{"event": "...", "data": {...}}`.
//!
//! Inbound frames decode into the closed `ClientEvent` enum and are dispatched
//! with an exhaustive match; outbound frames are `ServerEvent`s.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::db::models::{CallKind, MessageType};
use crate::state::AppState;
use crate::ws::broadcast::send_event;
use crate::ws::ConnectionHandle;

/// Events a client may send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    Identify(IdentifyRequest),
    JoinRoom(RoomRequest),
    LeaveRoom(RoomRequest),
    /// Missing or null `data` decodes to `None` so the relay can still
    /// answer with a `call-error`.
    CallInitiate(Option<CallInitiateRequest>),
    CallAnswer(CallAnswerRequest),
    IceCandidate(IceCandidateRequest),
    CallReject(TargetRequest),
    CallEnd(TargetRequest),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentifyRequest {
    #[serde(default, deserialize_with = "optional_id")]
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomRequest {
    #[serde(default, deserialize_with = "optional_id")]
    pub room_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallInitiateRequest {
    #[serde(default, deserialize_with = "optional_id")]
    pub target: Option<String>,
    #[serde(default)]
    pub offer: Value,
    #[serde(default)]
    pub caller_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_kind")]
    pub kind: Option<CallKind>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallAnswerRequest {
    #[serde(default, deserialize_with = "optional_id")]
    pub target: Option<String>,
    #[serde(default)]
    pub answer: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidateRequest {
    #[serde(default, deserialize_with = "optional_id")]
    pub target: Option<String>,
    #[serde(default)]
    pub candidate: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetRequest {
    #[serde(default, deserialize_with = "optional_id")]
    pub target: Option<String>,
}

/// Events the server pushes to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    #[serde(rename_all = "camelCase")]
    UserOnline { user_id: String },
    #[serde(rename_all = "camelCase")]
    UserOffline { user_id: String },
    #[serde(rename_all = "camelCase")]
    CallIncoming {
        offer: Value,
        from: String,
        caller_name: String,
        kind: CallKind,
    },
    CallError { message: String },
    CallAnswered { answer: Value, from: String },
    IceCandidate { candidate: Value, from: String },
    CallRejected { from: String },
    CallEnded { from: String },
    NewMessage(ChatMessage),
    Error { code: u16, message: String },
}

/// Chat message as broadcast to a conversation room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub content: String,
    #[serde(rename = "type", default)]
    pub message_type: MessageType,
    pub created_at: DateTime<Utc>,
    pub sender: SenderProfile,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SenderProfile {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
}

/// Ids arrive as strings or numbers depending on the client; an empty
/// string counts as absent.
fn optional_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) if !s.is_empty() => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// Unrecognised call kinds are treated as absent instead of failing the frame.
fn lenient_kind<'de, D>(deserializer: D) -> Result<Option<CallKind>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => CallKind::parse(&s),
        _ => None,
    })
}

/// Handle one inbound text frame: decode and dispatch.
pub async fn handle_text_message(text: &str, handle: &ConnectionHandle, state: &AppState) {
    let event = match serde_json::from_str::<ClientEvent>(text) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!(
                connection_id = %handle.id,
                error = %e,
                "Failed to decode client event"
            );
            send_error(handle, 400, "Invalid event");
            return;
        }
    };

    dispatch_event(event, handle, state).await;
}

/// Route a decoded event to the component that owns it.
pub async fn dispatch_event(event: ClientEvent, handle: &ConnectionHandle, state: &AppState) {
    match event {
        ClientEvent::Identify(req) => {
            let Some(user_id) = req.user_id else {
                send_error(handle, 400, "userId required");
                return;
            };
            handle_identify(&user_id, handle, state).await;
        }
        ClientEvent::JoinRoom(req) => match req.room_id {
            Some(room_id) => {
                state.rooms.join(handle, &room_id);
            }
            None => send_error(handle, 400, "roomId required"),
        },
        ClientEvent::LeaveRoom(req) => match req.room_id {
            Some(room_id) => {
                state.rooms.leave(handle.id, &room_id);
            }
            None => send_error(handle, 400, "roomId required"),
        },
        ClientEvent::CallInitiate(req) => {
            state
                .signaling
                .call_initiate(handle, req.unwrap_or_default());
        }
        ClientEvent::CallAnswer(req) => {
            state.signaling.call_answer(handle, req);
        }
        ClientEvent::IceCandidate(req) => {
            state.signaling.ice_candidate(handle, req);
        }
        ClientEvent::CallReject(req) => {
            state.signaling.call_reject(handle, req);
        }
        ClientEvent::CallEnd(req) => {
            state.signaling.call_end(handle, req);
        }
    }
}

async fn handle_identify(user_id: &str, handle: &ConnectionHandle, state: &AppState) {
    let Some(outcome) = state.registry.identify(handle.id, user_id) else {
        tracing::warn!(
            connection_id = %handle.id,
            user_id = %user_id,
            "Identify on a connection that is no longer attached"
        );
        return;
    };

    tracing::info!(
        connection_id = %handle.id,
        user_id = %user_id,
        "User identified"
    );

    if let Some(previous) = outcome.went_offline {
        state.presence.announce_offline(&previous).await;
    }
    state.presence.announce_online(user_id, handle).await;
}

/// Send an `error` event to one connection.
pub fn send_error(handle: &ConnectionHandle, code: u16, message: &str) {
    send_event(
        handle,
        &ServerEvent::Error {
            code,
            message: message.to_string(),
        },
    );
}
