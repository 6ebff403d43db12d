use axum::extract::ws::Message;

use super::protocol::ServerEvent;
use super::{ConnectionHandle, ConnectionSender};

/// Encode a server event as a JSON text frame.
pub fn encode_event(event: &ServerEvent) -> Option<Message> {
    match serde_json::to_string(event) {
        Ok(json) => Some(Message::Text(json.into())),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode server event");
            None
        }
    }
}

/// Send an event to one connection. Returns false if the connection is gone;
/// delivery to a torn-down connection is not an error.
pub fn send_event(handle: &ConnectionHandle, event: &ServerEvent) -> bool {
    match encode_event(event) {
        Some(msg) => send_frame(&handle.sender, msg),
        None => false,
    }
}

/// Push an already encoded frame to a connection's writer.
pub fn send_frame(sender: &ConnectionSender, msg: Message) -> bool {
    sender.send(msg).is_ok()
}

/// Encode once and send to every sender. Returns how many accepted the frame.
pub fn send_to_many<'a, I>(senders: I, event: &ServerEvent) -> usize
where
    I: IntoIterator<Item = &'a ConnectionSender>,
{
    let Some(msg) = encode_event(event) else {
        return 0;
    };

    senders
        .into_iter()
        .filter(|sender| send_frame(sender, msg.clone()))
        .count()
}
