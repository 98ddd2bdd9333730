//! The wire message shape (§4.7): `{messageId, type, interactionClass,
//! tenantId, senderId, recipientId?, roomId?, payload, timestamp}`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sync_core::{InteractionClass, TenantId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    // Client -> server
    Message,
    JoinRoom,
    LeaveRoom,
    PresenceUpdate,
    Ping,
    // Server -> client
    Connected,
    MessageAck,
    RoomJoined,
    RoomLeft,
    Pong,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEnvelope {
    pub message_id: String,
    pub message_type: MessageType,
    pub interaction_class: InteractionClass,
    pub tenant_id: TenantId,
    pub sender_id: UserId,
    pub recipient_id: Option<UserId>,
    pub room_id: Option<String>,
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl MessageEnvelope {
    pub fn new_message(
        tenant_id: TenantId,
        sender_id: UserId,
        interaction_class: InteractionClass,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            message_id: uuid::Uuid::new_v4().to_string(),
            message_type: MessageType::Message,
            interaction_class,
            tenant_id,
            sender_id,
            recipient_id: None,
            room_id: None,
            payload,
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Online,
    Away,
    Offline,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceEntry {
    pub user_id: UserId,
    pub status: PresenceStatus,
    pub last_active: DateTime<Utc>,
}
