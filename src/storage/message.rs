//! Chat message model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Prefix of client-side identifiers given to messages the server has not confirmed yet
pub const TEMP_ID_PREFIX: &str = "temp-";

/// Kind of message content
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// Plain text
    #[default]
    Text,
}

/// A chat message, either confirmed by the server or optimistic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Message ID (server-assigned, or `temp-` prefixed while optimistic)
    pub id: String,
    /// Chat this message belongs to
    pub chat_id: String,
    /// Author user ID
    pub sender_id: String,
    /// Text content
    pub content: String,
    /// Content kind
    #[serde(default)]
    pub message_type: MessageKind,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// When the recipient read the message
    #[serde(default)]
    pub read_at: Option<DateTime<Utc>>,
}

impl Message {
    /// Create a locally-authored message with a fresh temporary ID
    pub fn new_optimistic(chat_id: &str, sender_id: &str, content: &str) -> Self {
        Self {
            id: format!("{}{}", TEMP_ID_PREFIX, Uuid::new_v4()),
            chat_id: chat_id.to_string(),
            sender_id: sender_id.to_string(),
            content: content.to_string(),
            message_type: MessageKind::Text,
            created_at: Utc::now(),
            read_at: None,
        }
    }

    /// Whether this message still carries a client-side temporary ID
    pub fn is_temporary(&self) -> bool {
        self.id.starts_with(TEMP_ID_PREFIX)
    }

    /// Whether the recipient has read this message
    pub fn is_read(&self) -> bool {
        self.read_at.is_some()
    }

    /// Stamp the read time; earlier stamps are kept
    pub fn mark_read(&mut self, at: DateTime<Utc>) -> bool {
        if self.read_at.is_some() {
            return false;
        }
        self.read_at = Some(at);
        true
    }
}
