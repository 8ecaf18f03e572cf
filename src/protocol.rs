//! Wire protocol
//!
//! JSON shapes exchanged with the marketplace backend:
//! - push frames carried over the chat WebSocket, tagged by `type`
//! - request bodies of the REST chat endpoints

use crate::storage::{Message, MessageKind};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Event carried by a push frame, in either direction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    /// A new chat message
    Message {
        /// Chat the message belongs to
        chat_id: String,
        /// The full message record
        message: Message,
    },
    /// Messages were read by a participant
    ReadReceipt {
        /// Chat the messages belong to
        chat_id: String,
        /// IDs of the messages that were read
        message_ids: Vec<String>,
        /// User who read them
        read_by: String,
    },
}

impl ChatEvent {
    /// Chat this event refers to
    pub fn chat_id(&self) -> &str {
        match self {
            ChatEvent::Message { chat_id, .. } | ChatEvent::ReadReceipt { chat_id, .. } => chat_id,
        }
    }

    /// Wire tag of this event
    pub fn kind(&self) -> &'static str {
        match self {
            ChatEvent::Message { .. } => "message",
            ChatEvent::ReadReceipt { .. } => "read_receipt",
        }
    }
}

/// A decoded inbound frame
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    /// One of the recognized events
    Event(ChatEvent),
    /// Well-formed frame with a tag this client does not handle
    Unknown {
        /// The unrecognized `type` value
        kind: String,
    },
}

/// Decode a text frame received from the push channel
///
/// Frames with an unrecognized `type` decode to [`InboundFrame::Unknown`];
/// frames that are not JSON objects, lack a `type` or carry a broken body
/// for a known type are errors.
pub fn decode_frame(text: &str) -> Result<InboundFrame> {
    let value: Value = serde_json::from_str(text)?;

    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::Protocol("frame has no string `type` tag".to_string()))?
        .to_string();

    match kind.as_str() {
        "message" | "read_receipt" => Ok(InboundFrame::Event(serde_json::from_value(value)?)),
        _ => Ok(InboundFrame::Unknown { kind }),
    }
}

/// Encode an event as a text frame
pub fn encode_event(event: &ChatEvent) -> Result<String> {
    Ok(serde_json::to_string(event)?)
}

/// Body of `POST /chat/chats/{id}/messages`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendMessageRequest {
    /// Text content
    pub content: String,
    /// Content kind
    pub message_type: MessageKind,
}

impl SendMessageRequest {
    /// Plain text message
    pub fn text(content: &str) -> Self {
        Self {
            content: content.to_string(),
            message_type: MessageKind::Text,
        }
    }
}

/// Body of `POST /chat/chats/{id}/read`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkReadRequest {
    /// Messages to mark as read
    pub message_ids: Vec<String>,
}
