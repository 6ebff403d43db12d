//! Chat delivery hook for the chat backend.
//!
//! After the backend commits a message it posts it here; the relay fans it out
//! to the conversation room and pushes to participants with no live
//! connection. The response never waits on push delivery.

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};

use crate::state::AppState;
use crate::ws::protocol::{ChatMessage, ServerEvent};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliverRequest {
    #[serde(flatten)]
    pub message: ChatMessage,
    /// Sender's short user code, used in the push title.
    #[serde(default)]
    pub sender_code: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliverResponse {
    pub conversation_id: String,
    pub delivered: usize,
}

/// POST /api/messages/deliver
pub async fn deliver_message(
    State(state): State<AppState>,
    Json(body): Json<DeliverRequest>,
) -> Result<(StatusCode, Json<DeliverResponse>), StatusCode> {
    let message = body.message;
    if message.id.is_empty()
        || message.conversation_id.is_empty()
        || message.sender_id.is_empty()
        || message.content.is_empty()
    {
        return Err(StatusCode::BAD_REQUEST);
    }

    let delivered = deliver(&state, message.clone());
    state.fallback.spawn(message.clone(), body.sender_code);

    Ok((
        StatusCode::ACCEPTED,
        Json(DeliverResponse {
            conversation_id: message.conversation_id,
            delivered,
        }),
    ))
}

/// Broadcast `new-message` to the conversation room. Returns the number of
/// connections reached.
pub fn deliver(state: &AppState, message: ChatMessage) -> usize {
    let conversation_id = message.conversation_id.clone();
    let delivered = state
        .rooms
        .broadcast(&conversation_id, &ServerEvent::NewMessage(message));

    tracing::info!(
        conversation_id = %conversation_id,
        delivered,
        "Broadcast new_message to room"
    );
    delivered
}
