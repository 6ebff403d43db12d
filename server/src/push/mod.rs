//! Out-of-band push notification senders.

pub mod fallback;

use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::error::PushError;

pub use fallback::FallbackBridge;

/// Notification handed to the push collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PushNotification {
    pub title: String,
    pub body: String,
    pub data: BTreeMap<String, String>,
}

#[async_trait]
pub trait PushSender: Send + Sync {
    async fn send_push(
        &self,
        device_token: &str,
        notification: &PushNotification,
    ) -> Result<(), PushError>;
}

/// Placeholder sender used when no gateway is configured: logs what would
/// have been sent.
#[derive(Debug, Clone, Default)]
pub struct LogPushSender;

#[async_trait]
impl PushSender for LogPushSender {
    async fn send_push(
        &self,
        device_token: &str,
        notification: &PushNotification,
    ) -> Result<(), PushError> {
        if device_token.is_empty() {
            return Err(PushError::MissingToken);
        }
        tracing::info!(
            title = %notification.title,
            data = ?notification.data,
            "Push gateway disabled, notification not sent"
        );
        Ok(())
    }
}

#[derive(Serialize)]
struct GatewayRequest<'a> {
    token: &'a str,
    notification: GatewayNotification<'a>,
    data: &'a BTreeMap<String, String>,
}

#[derive(Serialize)]
struct GatewayNotification<'a> {
    title: &'a str,
    body: &'a str,
}

/// Posts notifications as JSON to an HTTP push gateway.
#[derive(Debug, Clone)]
pub struct HttpPushSender {
    client: reqwest::Client,
    gateway_url: String,
}

impl HttpPushSender {
    pub fn new(gateway_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            gateway_url: gateway_url.into(),
        }
    }
}

#[async_trait]
impl PushSender for HttpPushSender {
    async fn send_push(
        &self,
        device_token: &str,
        notification: &PushNotification,
    ) -> Result<(), PushError> {
        if device_token.is_empty() {
            return Err(PushError::MissingToken);
        }

        let body = GatewayRequest {
            token: device_token,
            notification: GatewayNotification {
                title: &notification.title,
                body: &notification.body,
            },
            data: &notification.data,
        };

        let resp = self
            .client
            .post(&self.gateway_url)
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(PushError::Rejected(resp.status().as_u16()));
        }

        tracing::debug!(title = %notification.title, "Push notification accepted by gateway");
        Ok(())
    }
}
