use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::NotificationPayload;

/// Events sent over the WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Server confirms successful authentication
    Ready { user_id: Uuid, username: String },

    /// A message was inserted in a subscribed conversation. Clients re-pull
    /// the message list on receipt.
    MessageCreate {
        conversation_id: Uuid,
        message_id: Uuid,
        sender_id: Uuid,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Targeted "new message" alert for a conversation the user may not have open
    Notification(NotificationPayload),

    /// Acknowledges the current set of live subscriptions
    Subscribed { conversation_ids: Vec<Uuid> },

    /// A command was rejected
    Error { message: String },
}

impl GatewayEvent {
    /// Returns the conversation_id if this event is scoped to a conversation.
    pub fn conversation_id(&self) -> Option<Uuid> {
        match self {
            Self::MessageCreate { conversation_id, .. } => Some(*conversation_id),
            Self::Notification(payload) => Some(payload.conversation_id),
            _ => None,
        }
    }
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Authenticate the WebSocket connection
    Identify { token: String },

    /// Start receiving live message inserts for these conversations.
    /// Conversations the user is not a participant of are skipped.
    Subscribe { conversation_ids: Vec<Uuid> },

    /// Stop receiving live message inserts for these conversations.
    Unsubscribe { conversation_ids: Vec<Uuid> },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_use_adjacent_tagging() {
        let id = Uuid::new_v4();
        let json = serde_json::to_value(GatewayEvent::Subscribed { conversation_ids: vec![id] }).unwrap();
        assert_eq!(json["type"], "Subscribed");
        assert_eq!(json["data"]["conversation_ids"][0], id.to_string());
    }

    #[test]
    fn subscribe_command_parses() {
        let id = Uuid::new_v4();
        let raw = format!(r#"{{"type":"Subscribe","data":{{"conversation_ids":["{}"]}}}}"#, id);
        match serde_json::from_str::<GatewayCommand>(&raw).unwrap() {
            GatewayCommand::Subscribe { conversation_ids } => assert_eq!(conversation_ids, vec![id]),
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn notification_is_conversation_scoped() {
        let cid = Uuid::new_v4();
        let event = GatewayEvent::Notification(NotificationPayload {
            conversation_id: cid,
            message_id: None,
            sender_display_name: "Alice".into(),
            preview: "hi".into(),
        });
        assert_eq!(event.conversation_id(), Some(cid));
        assert_eq!(GatewayEvent::Error { message: "x".into() }.conversation_id(), None);
    }
}
