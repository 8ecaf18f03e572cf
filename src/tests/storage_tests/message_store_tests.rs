// Message Store Tests - ordering, optimistic sends and deduplication

use crate::storage::{Message, MessageStore};
use crate::tests::helpers::{at, message};
use proptest::prelude::*;
use std::collections::HashSet;

fn ids(store: &MessageStore) -> Vec<String> {
    store.iter().map(|m| m.id.clone()).collect()
}

fn store_with_history() -> MessageStore {
    let mut store = MessageStore::new("chat-x");
    store.load_history(vec![
        message("m-1", "chat-x", "client", "Is the task still open?", 1),
        message("m-2", "chat-x", "helper", "Yes, it is", 2),
        message("m-3", "chat-x", "client", "Great", 3),
    ]);
    store
}

#[test]
fn test_new_store_is_empty() {
    let store = MessageStore::new("chat-x");
    assert!(store.is_empty());
    assert_eq!(store.len(), 0);
    assert_eq!(store.chat_id(), "chat-x");
}

#[test]
fn test_load_history_keeps_page_order() {
    let store = store_with_history();
    assert_eq!(ids(&store), vec!["m-1", "m-2", "m-3"]);
    assert_eq!(store.position("m-2"), Some(1));
}

#[test]
fn test_load_history_replaces_previous_sequence() {
    let mut store = store_with_history();
    store.load_history(vec![message("m-9", "chat-x", "client", "fresh", 9)]);

    assert_eq!(ids(&store), vec!["m-9"]);
    assert!(!store.contains("m-1"));
}

#[test]
fn test_load_history_drops_duplicates_in_page() {
    let mut store = MessageStore::new("chat-x");
    store.load_history(vec![
        message("m-1", "chat-x", "client", "first", 1),
        message("m-1", "chat-x", "client", "first again", 1),
        message("m-2", "chat-x", "helper", "second", 2),
    ]);

    assert_eq!(ids(&store), vec!["m-1", "m-2"]);
    assert_eq!(store.get("m-1").map(|m| m.content.as_str()), Some("first"));
}

#[test]
fn test_append_optimistic_goes_to_tail() {
    let mut store = store_with_history();
    let temp_id = store.append_optimistic("client", "hello");

    assert_eq!(store.len(), 4);
    assert_eq!(store.position(&temp_id), Some(3));
    let entry = store.get(&temp_id).expect("optimistic entry present");
    assert!(entry.is_temporary());
    assert_eq!(entry.content, "hello");
    assert_eq!(entry.sender_id, "client");
    assert_eq!(entry.chat_id, "chat-x");
}

#[test]
fn test_confirm_sent_preserves_position() {
    let mut store = store_with_history();
    let temp_id = store.append_optimistic("client", "hello");
    let before = store.position(&temp_id);

    // Another message pushed in after the optimistic one
    store.merge_incoming(message("m-4", "chat-x", "helper", "hi!", 5));

    let confirmed = message("m-123", "chat-x", "client", "hello", 4);
    assert!(store.confirm_sent(&temp_id, confirmed));

    assert_eq!(store.position("m-123"), before);
    assert!(!store.contains(&temp_id));
    assert_eq!(ids(&store), vec!["m-1", "m-2", "m-3", "m-123", "m-4"]);
}

#[test]
fn test_confirm_sent_unknown_temp_id() {
    let mut store = store_with_history();
    let confirmed = message("m-123", "chat-x", "client", "hello", 4);

    assert!(!store.confirm_sent("temp-missing", confirmed));
    assert_eq!(store.len(), 3);
}

#[test]
fn test_confirm_after_push_already_merged() {
    let mut store = store_with_history();
    let temp_id = store.append_optimistic("client", "hello");

    // Push beats the REST confirmation
    store.merge_incoming(message("m-123", "chat-x", "client", "hello", 4));
    assert!(store.confirm_sent(&temp_id, message("m-123", "chat-x", "client", "hello", 4)));

    assert_eq!(ids(&store), vec!["m-1", "m-2", "m-3", "m-123"]);
    assert_eq!(store.position("m-123"), Some(3));
}

#[test]
fn test_rollback_restores_sequence_and_returns_content() {
    let mut store = store_with_history();
    let before: Vec<Message> = store.messages().to_vec();

    let temp_id = store.append_optimistic("client", "will fail");
    let restored = store.rollback(&temp_id);

    assert_eq!(restored.as_deref(), Some("will fail"));
    assert_eq!(store.messages(), before.as_slice());
    assert!(!store.contains(&temp_id));
}

#[test]
fn test_rollback_middle_entry_reindexes_tail() {
    let mut store = store_with_history();
    let first = store.append_optimistic("client", "one");
    let second = store.append_optimistic("client", "two");

    assert_eq!(store.rollback(&first).as_deref(), Some("one"));
    assert_eq!(store.position(&second), Some(3));
    assert_eq!(store.get(&second).map(|m| m.content.as_str()), Some("two"));
}

#[test]
fn test_rollback_unknown_id() {
    let mut store = store_with_history();
    assert_eq!(store.rollback("temp-nope"), None);
    assert_eq!(store.len(), 3);
}

#[test]
fn test_merge_incoming_discards_duplicates() {
    let mut store = store_with_history();

    assert!(store.merge_incoming(message("m-4", "chat-x", "helper", "new", 4)));
    assert!(!store.merge_incoming(message("m-4", "chat-x", "helper", "new", 4)));
    assert!(!store.merge_incoming(message("m-2", "chat-x", "helper", "Yes, it is", 2)));

    assert_eq!(ids(&store), vec!["m-1", "m-2", "m-3", "m-4"]);
}

#[test]
fn test_hello_scenario_send_confirm_and_duplicate_push() {
    let mut store = MessageStore::new("chat-x");

    let temp_id = store.append_optimistic("client", "hello");
    assert_eq!(store.len(), 1);
    assert_eq!(store.messages()[0].content, "hello");
    assert!(store.messages()[0].is_temporary());

    store.confirm_sent(&temp_id, message("m-123", "chat-x", "client", "hello", 1));
    assert_eq!(store.len(), 1);
    assert_eq!(store.messages()[0].id, "m-123");
    assert_eq!(store.messages()[0].content, "hello");

    // The same message arrives over the push channel afterwards
    store.merge_incoming(message("m-123", "chat-x", "client", "hello", 1));
    assert_eq!(store.len(), 1);
    assert_eq!(store.iter().filter(|m| m.id == "m-123").count(), 1);
}

#[test]
fn test_prepend_history_puts_older_page_in_front() {
    let mut store = store_with_history();
    let added = store.prepend_history(vec![
        message("m-0", "chat-x", "helper", "older", 0),
        message("m-1", "chat-x", "client", "Is the task still open?", 1),
    ]);

    assert_eq!(added, 1);
    assert_eq!(ids(&store), vec!["m-0", "m-1", "m-2", "m-3"]);
    assert_eq!(store.position("m-3"), Some(3));
}

#[test]
fn test_apply_read_receipt() {
    let mut store = store_with_history();

    let updated = store.apply_read_receipt(&["m-1".to_string(), "m-3".to_string(), "m-zzz".to_string()], at(50));
    assert_eq!(updated, 2);
    assert_eq!(store.get("m-1").and_then(|m| m.read_at), Some(at(50)));
    assert!(store.get("m-2").map(|m| !m.is_read()).unwrap_or(false));

    // Receipts are idempotent
    assert_eq!(store.apply_read_receipt(&["m-1".to_string()], at(60)), 0);
}

#[test]
fn test_unread_from_others_skips_own_and_optimistic() {
    let mut store = store_with_history();
    store.append_optimistic("helper", "pending");

    assert_eq!(store.unread_from_others("helper"), vec!["m-1", "m-3"]);
    assert_eq!(store.unread_from_others("client"), vec!["m-2"]);
}

#[test]
fn test_confirmed_len_ignores_optimistic() {
    let mut store = store_with_history();
    store.append_optimistic("client", "pending");
    assert_eq!(store.len(), 4);
    assert_eq!(store.confirmed_len(), 3);
}

fn op_strategy() -> impl Strategy<Value = (u8, u8)> {
    // (operation, message number)
    (0u8..4, 0u8..12)
}

proptest! {
    #[test]
    fn prop_ids_stay_unique(ops in prop::collection::vec(op_strategy(), 0..80)) {
        let mut store = MessageStore::new("chat-p");
        let mut pending: Vec<String> = Vec::new();

        for (op, n) in ops {
            let id = format!("m-{}", n);
            match op {
                0 => {
                    store.merge_incoming(message(&id, "chat-p", "helper", "push", n as i64));
                }
                1 => pending.push(store.append_optimistic("client", "draft")),
                2 => {
                    if let Some(temp_id) = pending.pop() {
                        store.confirm_sent(&temp_id, message(&id, "chat-p", "client", "draft", n as i64));
                    }
                }
                _ => {
                    if let Some(temp_id) = pending.pop() {
                        store.rollback(&temp_id);
                    }
                }
            }

            let mut seen = HashSet::new();
            for (position, msg) in store.iter().enumerate() {
                prop_assert!(seen.insert(msg.id.clone()), "duplicate id {}", msg.id);
                prop_assert_eq!(store.position(&msg.id), Some(position));
            }
        }
    }

    #[test]
    fn prop_repeated_push_is_idempotent(n in 0u8..50, repeats in 1usize..10) {
        let mut store = MessageStore::new("chat-p");
        for _ in 0..repeats {
            store.merge_incoming(message(&format!("m-{}", n), "chat-p", "helper", "push", 1));
        }
        prop_assert_eq!(store.len(), 1);
    }
}
