//! Chat (conversation) metadata as served by the REST API

use crate::storage::message::Message;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which side of the marketplace a participant is on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantRole {
    /// Posted the task
    Client,
    /// Student applying to or working on the task
    Helper,
}

/// One of the two people in a chat
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    /// User ID
    pub id: String,
    /// Display name
    #[serde(default)]
    pub name: Option<String>,
    /// Marketplace role
    pub role: ParticipantRole,
}

/// Entry of the conversation list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatSummary {
    /// Chat ID
    pub id: String,
    /// Client user ID
    pub client_id: String,
    /// Helper user ID
    pub helper_id: String,
    /// Task the chat was opened for
    #[serde(default)]
    pub task_id: Option<String>,
    /// Most recent message, if any
    #[serde(default)]
    pub last_message: Option<Message>,
    /// Messages the caller has not read yet
    #[serde(default)]
    pub unread_count: u32,
    /// Last activity
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Full metadata of an open chat
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatDetail {
    /// Chat ID
    pub id: String,
    /// Task poster
    pub client: Participant,
    /// Student helper
    pub helper: Participant,
    /// Task the chat was opened for
    #[serde(default)]
    pub task_id: Option<String>,
    /// Creation timestamp
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl ChatDetail {
    /// IDs of the client and the helper, in that order
    pub fn participant_ids(&self) -> (&str, &str) {
        (&self.client.id, &self.helper.id)
    }

    /// Whether `user_id` takes part in this chat
    pub fn includes(&self, user_id: &str) -> bool {
        self.client.id == user_id || self.helper.id == user_id
    }

    /// The other participant, seen from `user_id`
    pub fn counterpart(&self, user_id: &str) -> Option<&Participant> {
        if self.client.id == user_id {
            Some(&self.helper)
        } else if self.helper.id == user_id {
            Some(&self.client)
        } else {
            None
        }
    }
}
