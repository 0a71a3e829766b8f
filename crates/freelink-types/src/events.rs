use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::{MessageResponse, NotificationResponse};

/// Transient typing signal. Never persisted; relayed as-is to the receiver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingIndicator {
    pub sender_id: Uuid,
    pub sender_username: String,
    pub receiver_id: Uuid,
    pub receiver_username: String,
    pub typing: bool,
}

/// Events sent over the WebSocket gateway to a user's personal queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Server confirms the handshake token was accepted
    Ready { user_id: Uuid, username: String },

    /// A message addressed to this user was stored
    MessageCreate(MessageResponse),

    /// A notification for this user was stored
    NotificationCreate(NotificationResponse),

    /// The other party started or stopped typing
    Typing(TypingIndicator),
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    Typing(TypingIndicator),
}
