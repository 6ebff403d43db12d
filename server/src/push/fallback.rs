//! Delivery fallback: push a notification to conversation participants who
//! have no live connection when a chat message is delivered.
//!
//! Fire-and-forget. Failures are logged and never reach the sender.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::{PushNotification, PushSender};
use crate::db::models::MessageType;
use crate::directory::Directory;
use crate::ws::protocol::ChatMessage;
use crate::ws::ConnectionRegistry;

pub const IMAGE_PREVIEW: &str = "📷 Sent an image";
pub const FILE_PREVIEW: &str = "📎 Sent a file";
pub const DEFAULT_PREVIEW_MAX_CHARS: usize = 50;

#[derive(Clone)]
pub struct FallbackBridge {
    registry: ConnectionRegistry,
    directory: Arc<dyn Directory>,
    push: Arc<dyn PushSender>,
    preview_max_chars: usize,
}

impl FallbackBridge {
    pub fn new(
        registry: ConnectionRegistry,
        directory: Arc<dyn Directory>,
        push: Arc<dyn PushSender>,
        preview_max_chars: usize,
    ) -> Self {
        Self {
            registry,
            directory,
            push,
            preview_max_chars,
        }
    }

    /// Run `notify_unreachable` in the background.
    pub fn spawn(&self, message: ChatMessage, sender_code: Option<String>) {
        let bridge = self.clone();
        tokio::spawn(async move {
            bridge
                .notify_unreachable(&message, sender_code.as_deref())
                .await;
        });
    }

    /// Push to every participant other than the sender that the registry
    /// cannot resolve and that has a push token. Returns the number of
    /// notifications the push collaborator accepted.
    pub async fn notify_unreachable(&self, message: &ChatMessage, sender_code: Option<&str>) -> usize {
        let participants = match self.directory.participants(&message.conversation_id).await {
            Ok(participants) => participants,
            Err(e) => {
                tracing::warn!(
                    conversation_id = %message.conversation_id,
                    error = %e,
                    "Participant lookup failed, skipping push fallback"
                );
                return 0;
            }
        };

        let notification = PushNotification {
            title: format!("New message from {}", sender_code.unwrap_or("Friend")),
            body: preview(message.message_type, &message.content, self.preview_max_chars),
            data: BTreeMap::from([
                ("conversationId".to_string(), message.conversation_id.clone()),
                ("type".to_string(), "CHAT".to_string()),
            ]),
        };

        let mut sent = 0;
        for participant in participants {
            if participant.user_id == message.sender_id
                || self.registry.is_online(&participant.user_id)
            {
                continue;
            }
            let Some(token) = participant.push_token.filter(|t| !t.is_empty()) else {
                tracing::debug!(
                    user_id = %participant.user_id,
                    "Recipient offline without push token, skipping"
                );
                continue;
            };

            match self.push.send_push(&token, &notification).await {
                Ok(()) => sent += 1,
                Err(e) => tracing::warn!(
                    user_id = %participant.user_id,
                    conversation_id = %message.conversation_id,
                    error = %e,
                    "Failed to send push notification"
                ),
            }
        }
        sent
    }
}

/// Notification body for a message: fixed placeholders for attachments,
/// text truncated to `max_chars` with a trailing ellipsis.
pub fn preview(message_type: MessageType, content: &str, max_chars: usize) -> String {
    match message_type {
        MessageType::Image => IMAGE_PREVIEW.to_string(),
        MessageType::File => FILE_PREVIEW.to_string(),
        MessageType::Text if content.chars().count() > max_chars => {
            let head: String = content.chars().take(max_chars).collect();
            format!("{head}...")
        }
        MessageType::Text => content.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::Participant;
    use crate::test_support::{channel_handle, chat_message, RecordingPush, StaticDirectory};

    #[test]
    fn preview_rules() {
        assert_eq!(preview(MessageType::Image, "https://x/y.png", 50), IMAGE_PREVIEW);
        assert_eq!(preview(MessageType::File, "https://x/y.pdf", 50), FILE_PREVIEW);
        assert_eq!(preview(MessageType::Text, "short", 50), "short");

        let exact = "a".repeat(50);
        assert_eq!(preview(MessageType::Text, &exact, 50), exact);

        let long = "é".repeat(60);
        let expected = format!("{}...", "é".repeat(50));
        assert_eq!(preview(MessageType::Text, &long, 50), expected);
    }

    fn bridge_with(
        registry: &ConnectionRegistry,
        participants: Vec<Participant>,
        push: Arc<RecordingPush>,
    ) -> FallbackBridge {
        FallbackBridge::new(
            registry.clone(),
            Arc::new(StaticDirectory::new("c1", participants)),
            push,
            DEFAULT_PREVIEW_MAX_CHARS,
        )
    }

    #[tokio::test]
    async fn pushes_only_to_unreachable_recipients_with_tokens() {
        let registry = ConnectionRegistry::new();
        let (online, _rx) = channel_handle();
        registry.attach(online.clone());
        registry.identify(online.id, "u2");

        let push = Arc::new(RecordingPush::default());
        let bridge = bridge_with(
            &registry,
            vec![
                Participant { user_id: "u1".into(), push_token: Some("tok-1".into()) },
                Participant { user_id: "u2".into(), push_token: Some("tok-2".into()) },
                Participant { user_id: "u3".into(), push_token: Some("tok-3".into()) },
                Participant { user_id: "u4".into(), push_token: None },
            ],
            push.clone(),
        );

        let message = chat_message("c1", "u1", "hello there");
        let sent = bridge.notify_unreachable(&message, Some("AAA111")).await;

        assert_eq!(sent, 1);
        let recorded = push.recorded();
        assert_eq!(recorded.len(), 1);
        let (token, notification) = &recorded[0];
        assert_eq!(token, "tok-3");
        assert_eq!(notification.title, "New message from AAA111");
        assert_eq!(notification.body, "hello there");
        assert_eq!(notification.data["conversationId"], "c1");
        assert_eq!(notification.data["type"], "CHAT");
    }

    #[tokio::test]
    async fn push_failure_is_swallowed() {
        let registry = ConnectionRegistry::new();
        let push = Arc::new(RecordingPush::failing());
        let bridge = bridge_with(
            &registry,
            vec![Participant { user_id: "u2".into(), push_token: Some("tok-2".into()) }],
            push.clone(),
        );

        let sent = bridge
            .notify_unreachable(&chat_message("c1", "u1", "hi"), None)
            .await;
        assert_eq!(sent, 0);
        assert_eq!(push.recorded().len(), 1);
        assert_eq!(push.recorded()[0].1.title, "New message from Friend");
    }

    #[tokio::test]
    async fn unknown_conversation_sends_nothing() {
        let registry = ConnectionRegistry::new();
        let push = Arc::new(RecordingPush::default());
        let bridge = bridge_with(&registry, Vec::new(), push.clone());

        let sent = bridge
            .notify_unreachable(&chat_message("other", "u1", "hi"), None)
            .await;
        assert_eq!(sent, 0);
        assert!(push.recorded().is_empty());
    }
}
