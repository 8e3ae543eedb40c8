use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{RwLock, mpsc};
use uuid::Uuid;

use parley_core::{DeliveryError, NotificationSink};
use parley_types::api::NotificationPayload;
use parley_types::events::GatewayEvent;

/// Tracks connected gateway clients and sends targeted events to them.
/// A user may hold several connections (one per device).
#[derive(Clone, Default)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

#[derive(Default)]
struct DispatcherInner {
    /// user_id -> (conn_id -> sender)
    user_channels: RwLock<HashMap<Uuid, HashMap<Uuid, mpsc::UnboundedSender<GatewayEvent>>>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection's outbound channel. Returns its conn_id.
    pub async fn register_connection(&self, user_id: Uuid, tx: mpsc::UnboundedSender<GatewayEvent>) -> Uuid {
        let conn_id = Uuid::new_v4();
        self.inner
            .user_channels
            .write()
            .await
            .entry(user_id)
            .or_default()
            .insert(conn_id, tx);
        conn_id
    }

    /// Unregister one connection; other connections of the user stay.
    pub async fn unregister_connection(&self, user_id: Uuid, conn_id: Uuid) {
        let mut channels = self.inner.user_channels.write().await;
        if let Some(conns) = channels.get_mut(&user_id) {
            conns.remove(&conn_id);
            if conns.is_empty() {
                channels.remove(&user_id);
            }
        }
    }

    /// Send a targeted event to every connection of a user.
    /// Returns how many connections accepted it.
    pub async fn send_to_user(&self, user_id: Uuid, event: GatewayEvent) -> usize {
        let channels = self.inner.user_channels.read().await;
        let Some(conns) = channels.get(&user_id) else {
            return 0;
        };
        conns
            .values()
            .filter(|tx| tx.send(event.clone()).is_ok())
            .count()
    }

    pub async fn is_online(&self, user_id: Uuid) -> bool {
        self.inner.user_channels.read().await.contains_key(&user_id)
    }

    pub async fn online_count(&self) -> usize {
        self.inner.user_channels.read().await.len()
    }
}

/// In-process notification delivery: pushes a `Notification` event to the
/// target's open connections.
#[async_trait]
impl NotificationSink for Dispatcher {
    async fn deliver(&self, target_user_id: Uuid, payload: NotificationPayload) -> Result<(), DeliveryError> {
        if self.send_to_user(target_user_id, GatewayEvent::Notification(payload)).await == 0 {
            return Err(DeliveryError::Offline);
        }
        Ok(())
    }
}
