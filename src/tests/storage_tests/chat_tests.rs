// Chat Tests - Testing Message and ChatDetail models

use crate::storage::{ChatSummary, Message, MessageKind, TEMP_ID_PREFIX};
use crate::tests::helpers::{at, chat_detail, message};

#[test]
fn test_optimistic_message_has_temporary_id() {
    let msg = Message::new_optimistic("chat-1", "alice", "hello");

    assert!(msg.id.starts_with(TEMP_ID_PREFIX));
    assert!(msg.is_temporary());
    assert_eq!(msg.chat_id, "chat-1");
    assert_eq!(msg.sender_id, "alice");
    assert_eq!(msg.content, "hello");
    assert_eq!(msg.message_type, MessageKind::Text);
    assert!(!msg.is_read());
}

#[test]
fn test_optimistic_ids_are_unique() {
    let first = Message::new_optimistic("chat-1", "alice", "one");
    let second = Message::new_optimistic("chat-1", "alice", "one");
    assert_ne!(first.id, second.id);
}

#[test]
fn test_server_message_is_not_temporary() {
    let msg = message("m-123", "chat-1", "alice", "hi", 10);
    assert!(!msg.is_temporary());
}

#[test]
fn test_mark_read_keeps_first_stamp() {
    let mut msg = message("m-1", "chat-1", "alice", "hi", 10);

    assert!(msg.mark_read(at(20)));
    assert!(msg.is_read());

    // A later receipt does not move the timestamp
    assert!(!msg.mark_read(at(30)));
    assert_eq!(msg.read_at, Some(at(20)));
}

#[test]
fn test_message_deserializes_with_defaults() {
    let json = r#"{
        "id": "m-9",
        "chat_id": "chat-1",
        "sender_id": "bob",
        "content": "Can you start tomorrow?",
        "created_at": "2024-03-01T12:00:00Z"
    }"#;

    let msg: Message = serde_json::from_str(json).expect("Failed to deserialize message");
    assert_eq!(msg.message_type, MessageKind::Text);
    assert_eq!(msg.read_at, None);
}

#[test]
fn test_message_kind_serializes_lowercase() {
    let json = serde_json::to_string(&MessageKind::Text).expect("Failed to serialize");
    assert_eq!(json, "\"text\"");
}

#[test]
fn test_chat_detail_participants() {
    let chat = chat_detail("chat-1", "client-7", "helper-3");

    assert_eq!(chat.participant_ids(), ("client-7", "helper-3"));
    assert!(chat.includes("client-7"));
    assert!(chat.includes("helper-3"));
    assert!(!chat.includes("someone-else"));

    assert_eq!(chat.counterpart("client-7").map(|p| p.id.as_str()), Some("helper-3"));
    assert_eq!(chat.counterpart("helper-3").map(|p| p.id.as_str()), Some("client-7"));
    assert!(chat.counterpart("someone-else").is_none());
}

#[test]
fn test_chat_summary_optional_fields() {
    let json = r#"{"id": "chat-2", "client_id": "c", "helper_id": "h"}"#;

    let summary: ChatSummary = serde_json::from_str(json).expect("Failed to deserialize summary");
    assert_eq!(summary.unread_count, 0);
    assert!(summary.last_message.is_none());
    assert!(summary.task_id.is_none());
}
