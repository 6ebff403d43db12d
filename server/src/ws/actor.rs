use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, timeout};

use crate::state::AppState;
use crate::ws::protocol;
use crate::ws::ConnectionHandle;

/// Run the actor-per-connection pattern for a WebSocket.
///
/// Splits the WebSocket into reader and writer halves:
/// - Writer task: owns the sink, forwards frames from an mpsc channel
/// - Reader loop: decodes client events and dispatches them one at a time,
///   so events from one connection are handled in arrival order
///
/// The connection is attached to the registry immediately but only becomes
/// reachable once the client sends `identify`.
pub async fn run_connection(socket: WebSocket, state: AppState, peer: SocketAddr) {
    let (ws_sender, mut ws_receiver) = socket.split();
    let (tx, rx) = mpsc::unbounded_channel::<Message>();

    let handle = ConnectionHandle::new(tx.clone());
    state.registry.attach(handle.clone());

    tracing::info!(
        connection_id = %handle.id,
        peer = %peer,
        "WebSocket actor started"
    );

    let writer_handle = tokio::spawn(writer_task(ws_sender, rx));

    // Track pong reception
    let (pong_tx, mut pong_rx) = mpsc::unbounded_channel::<()>();
    // Fired (or dropped) by the ping task once the peer stops answering
    let (expired_tx, mut expired_rx) = oneshot::channel::<()>();

    let ping_tx = tx.clone();
    let keepalive = state.keepalive;
    let ping_handle = tokio::spawn(async move {
        let mut ping_timer = interval(keepalive.ping_interval);
        // Skip the first immediate tick
        ping_timer.tick().await;

        loop {
            ping_timer.tick().await;

            if ping_tx.send(Message::Ping(vec![1, 2, 3, 4].into())).is_err() {
                // Writer task has died, connection is gone
                break;
            }

            match timeout(keepalive.pong_timeout, pong_rx.recv()).await {
                Ok(Some(())) => {}
                _ => {
                    tracing::warn!("Pong timeout, closing connection");
                    let _ = ping_tx.send(Message::Close(Some(CloseFrame {
                        code: 1001,
                        reason: "Pong timeout".into(),
                    })));
                    let _ = expired_tx.send(());
                    break;
                }
            }
        }
    });

    loop {
        let next = tokio::select! {
            next = ws_receiver.next() => next,
            _ = &mut expired_rx => {
                tracing::info!(connection_id = %handle.id, "Keepalive expired, dropping connection");
                break;
            }
        };

        match next {
            Some(Ok(msg)) => match msg {
                Message::Text(text) => {
                    protocol::handle_text_message(text.as_str(), &handle, &state).await;
                }
                Message::Binary(data) => {
                    tracing::debug!(
                        connection_id = %handle.id,
                        bytes = data.len(),
                        "Ignoring binary frame (protocol is JSON text)"
                    );
                    protocol::send_error(&handle, 400, "Binary frames are not supported");
                }
                Message::Pong(_) => {
                    let _ = pong_tx.send(());
                }
                Message::Ping(data) => {
                    let _ = tx.send(Message::Pong(data));
                }
                Message::Close(frame) => {
                    tracing::info!(
                        connection_id = %handle.id,
                        reason = ?frame,
                        "Client initiated close"
                    );
                    break;
                }
            },
            Some(Err(e)) => {
                tracing::warn!(
                    connection_id = %handle.id,
                    error = %e,
                    "WebSocket receive error"
                );
                break;
            }
            None => {
                tracing::info!(connection_id = %handle.id, "WebSocket stream ended");
                break;
            }
        }
    }

    // Stop delivering to this connection before tearing down its state
    writer_handle.abort();
    ping_handle.abort();

    teardown(&state, &handle).await;

    tracing::info!(connection_id = %handle.id, "WebSocket actor stopped");
}

/// Remove a connection from the registry and every room, then tell the
/// user's friends if this was the connection they were reachable on.
pub async fn teardown(state: &AppState, handle: &ConnectionHandle) {
    let went_offline = state.registry.remove(handle.id);
    let rooms = state.rooms.leave_all(handle.id);

    tracing::debug!(
        connection_id = %handle.id,
        rooms = rooms.len(),
        "Connection state cleared"
    );

    if let Some(user_id) = went_offline {
        tracing::info!(user_id = %user_id, "User went offline");
        state.presence.announce_offline(&user_id).await;
    }
}

/// Writer task: receives frames from the mpsc channel and forwards them to the WebSocket sink.
async fn writer_task(
    mut ws_sender: futures_util::stream::SplitSink<WebSocket, Message>,
    mut rx: mpsc::UnboundedReceiver<Message>,
) {
    while let Some(msg) = rx.recv().await {
        if ws_sender.send(msg).await.is_err() {
            break;
        }
    }
}
