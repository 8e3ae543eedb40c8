use std::sync::Arc;

use async_trait::async_trait;
use parley_types::api::NotificationPayload;
use parley_types::models::{MediaType, Message};
use serde::Serialize;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::identity::IdentityProvider;

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("Recipient is not connected")]
    Offline,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Sink rejected delivery with status {0}")]
    Rejected(u16),
}

/// Accepts best-effort "new message" deliveries.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, target_user_id: Uuid, payload: NotificationPayload) -> Result<(), DeliveryError>;
}

/// Fire-and-forget front of a [`NotificationSink`]. Delivery runs on a spawned
/// task; failures are logged and dropped, never retried.
#[derive(Clone)]
pub struct NotificationDispatcher {
    sink: Arc<dyn NotificationSink>,
    identity: Arc<dyn IdentityProvider>,
    preview_chars: usize,
}

impl NotificationDispatcher {
    pub fn new(sink: Arc<dyn NotificationSink>, identity: Arc<dyn IdentityProvider>, preview_chars: usize) -> Self {
        Self {
            sink,
            identity,
            preview_chars,
        }
    }

    pub fn notify(
        &self,
        target_user_id: Uuid,
        conversation_id: Uuid,
        sender_display_name: String,
        preview: String,
    ) -> JoinHandle<()> {
        let sink = self.sink.clone();
        let payload = NotificationPayload {
            conversation_id,
            message_id: None,
            sender_display_name,
            preview,
        };
        tokio::spawn(async move { deliver_logged(sink.as_ref(), target_user_id, payload).await })
    }

    /// Notify every recipient of a freshly sent message. The sender's display
    /// name is resolved on the spawned task, so the caller never waits on it.
    pub fn notify_new_message(&self, message: &Message, recipients: Vec<Uuid>) -> JoinHandle<()> {
        let sink = self.sink.clone();
        let identity = self.identity.clone();
        let sender_id = message.sender_id;
        let conversation_id = message.conversation_id;
        let message_id = message.id;
        let preview = preview(message, self.preview_chars);

        tokio::spawn(async move {
            let sender_display_name = match identity.profile(sender_id).await {
                Ok(profile) if !profile.display_name.is_empty() => profile.display_name,
                Ok(profile) => profile.username,
                Err(e) => {
                    debug!("No profile for sender {}: {}", sender_id, e);
                    "Someone".to_string()
                }
            };

            for target in recipients {
                let payload = NotificationPayload {
                    conversation_id,
                    message_id: Some(message_id),
                    sender_display_name: sender_display_name.clone(),
                    preview: preview.clone(),
                };
                deliver_logged(sink.as_ref(), target, payload).await;
            }
        })
    }
}

async fn deliver_logged(sink: &dyn NotificationSink, target: Uuid, payload: NotificationPayload) {
    let conversation_id = payload.conversation_id;
    if let Err(e) = sink.deliver(target, payload).await {
        warn!(
            "Notification to {} for conversation {} dropped: {}",
            target, conversation_id, e
        );
    }
}

/// Short text shown in a notification: the content cut to `max_chars`
/// characters, or a media label for media-only messages.
pub fn preview(message: &Message, max_chars: usize) -> String {
    let content = message.content.trim();
    if content.is_empty() {
        return match message.media_type {
            MediaType::Video => "[video]",
            MediaType::Gif => "[gif]",
            MediaType::Image | MediaType::None => "[image]",
        }
        .to_string();
    }

    if content.chars().count() <= max_chars {
        return content.to_string();
    }
    let mut cut: String = content.chars().take(max_chars.saturating_sub(1)).collect();
    cut.push('…');
    cut
}

/// Sink that only logs. Used when no delivery transport is configured.
#[derive(Debug, Default)]
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn deliver(&self, target_user_id: Uuid, payload: NotificationPayload) -> Result<(), DeliveryError> {
        info!(
            "Notify {}: {} in {}: {}",
            target_user_id, payload.sender_display_name, payload.conversation_id, payload.preview
        );
        Ok(())
    }
}

/// POSTs each notification as JSON to a configured webhook.
pub struct WebhookSink {
    client: reqwest::Client,
    url: String,
}

#[derive(Serialize)]
struct WebhookBody<'a> {
    target_user_id: Uuid,
    #[serde(flatten)]
    payload: &'a NotificationPayload,
}

impl WebhookSink {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl NotificationSink for WebhookSink {
    async fn deliver(&self, target_user_id: Uuid, payload: NotificationPayload) -> Result<(), DeliveryError> {
        let response = self
            .client
            .post(&self.url)
            .json(&WebhookBody {
                target_user_id,
                payload: &payload,
            })
            .send()
            .await
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(DeliveryError::Rejected(response.status().as_u16()));
        }
        Ok(())
    }
}
