use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Notification;

/// Events pushed server -> client over the gateway socket.
///
/// Serialized as `{"type": "...", "data": {...}}` so clients can switch
/// on the tag without knowing every variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum GatewayEvent {
    /// The connection is authenticated and registered for delivery.
    Ready { user_id: Uuid, username: String },

    /// A message was appended to a conversation the recipient is in.
    NewMessage {
        conversation_id: Uuid,
        sender: Uuid,
        sender_username: String,
        content: String,
        sent_at: DateTime<Utc>,
    },

    /// A durable notification was just created for the recipient.
    NewNotification { notification: Notification },

    /// Another participant is typing. Ephemeral, never stored.
    Typing {
        conversation_id: Uuid,
        sender: Uuid,
        sender_username: String,
    },
}

/// Commands sent client -> server over the gateway socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum GatewayCommand {
    /// The client is typing in a conversation.
    Typing { conversation_id: Uuid },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn events_use_tagged_envelopes() {
        let event = GatewayEvent::Typing {
            conversation_id: Uuid::nil(),
            sender: Uuid::nil(),
            sender_username: "ada".into(),
        };

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "typing");
        assert_eq!(value["data"]["sender_username"], "ada");
    }

    #[test]
    fn ready_event_tag_is_snake_case() {
        let event = GatewayEvent::Ready {
            user_id: Uuid::nil(),
            username: "ada".into(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "ready");
    }

    #[test]
    fn typing_command_parses_from_client_json() {
        let conversation_id = Uuid::new_v4();
        let raw = json!({
            "type": "typing",
            "data": { "conversation_id": conversation_id }
        })
        .to_string();

        let cmd: GatewayCommand = serde_json::from_str(&raw).unwrap();
        let GatewayCommand::Typing { conversation_id: parsed } = cmd;
        assert_eq!(parsed, conversation_id);
    }
}
