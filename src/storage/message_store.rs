//! Ordered, duplicate-free message sequence for the open chat
//!
//! The store merges three sources into one view:
//! - history pages fetched over REST
//! - optimistic inserts made when the local user sends
//! - messages pushed over the WebSocket channel
//!
//! Messages are kept in display order (oldest first) alongside an index from
//! message ID to position, so replacing or looking up an entry by ID never
//! scans the sequence.

use crate::storage::message::Message;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::debug;

/// Message sequence of a single chat
#[derive(Debug, Clone)]
pub struct MessageStore {
    chat_id: String,
    messages: Vec<Message>,
    index: HashMap<String, usize>,
}

impl MessageStore {
    /// Create an empty store for a chat
    pub fn new(chat_id: &str) -> Self {
        Self {
            chat_id: chat_id.to_string(),
            messages: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Chat this store belongs to
    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }

    /// Replace the whole sequence with a history page (oldest first)
    ///
    /// Repeated IDs within the page keep their first occurrence.
    pub fn load_history(&mut self, page: Vec<Message>) {
        self.messages.clear();
        self.index.clear();

        for message in page {
            if self.index.contains_key(&message.id) {
                debug!("Skipping duplicate {} in history page", message.id);
                continue;
            }
            self.index.insert(message.id.clone(), self.messages.len());
            self.messages.push(message);
        }
    }

    /// Put an older history page in front of the current sequence
    ///
    /// Returns how many messages were added.
    pub fn prepend_history(&mut self, page: Vec<Message>) -> usize {
        let mut older = Vec::with_capacity(page.len());
        for message in page {
            if self.index.contains_key(&message.id) || older.iter().any(|m: &Message| m.id == message.id) {
                continue;
            }
            older.push(message);
        }

        let added = older.len();
        if added > 0 {
            older.append(&mut self.messages);
            self.messages = older;
            self.reindex_from(0);
        }
        added
    }

    /// Append a locally-authored message before the server has seen it
    ///
    /// Returns the temporary ID to confirm or roll back later.
    pub fn append_optimistic(&mut self, sender_id: &str, content: &str) -> String {
        let message = Message::new_optimistic(&self.chat_id, sender_id, content);
        let temp_id = message.id.clone();

        self.index.insert(temp_id.clone(), self.messages.len());
        self.messages.push(message);
        temp_id
    }

    /// Swap an optimistic entry for the server-confirmed record, in place
    ///
    /// If the confirmed ID already arrived over the push channel, the
    /// optimistic entry is dropped instead so the ID stays unique.
    /// Returns `false` when `temp_id` is unknown.
    pub fn confirm_sent(&mut self, temp_id: &str, confirmed: Message) -> bool {
        let Some(position) = self.index.remove(temp_id) else {
            debug!("No optimistic entry {} to confirm", temp_id);
            return false;
        };

        if self.index.contains_key(&confirmed.id) {
            debug!("{} already merged from push, dropping {}", confirmed.id, temp_id);
            self.messages.remove(position);
            self.reindex_from(position);
            return true;
        }

        self.index.insert(confirmed.id.clone(), position);
        self.messages[position] = confirmed;
        true
    }

    /// Remove an optimistic entry after a failed send
    ///
    /// Returns the original content so it can go back into the composer.
    pub fn rollback(&mut self, temp_id: &str) -> Option<String> {
        let position = self.index.remove(temp_id)?;
        let message = self.messages.remove(position);
        self.reindex_from(position);
        Some(message.content)
    }

    /// Append a message pushed by the server unless its ID is already present
    pub fn merge_incoming(&mut self, message: Message) -> bool {
        if self.index.contains_key(&message.id) {
            debug!("Ignoring duplicate push for {}", message.id);
            return false;
        }

        self.index.insert(message.id.clone(), self.messages.len());
        self.messages.push(message);
        true
    }

    /// Stamp `read_at` on the listed messages that are still unread
    ///
    /// Returns how many messages changed.
    pub fn apply_read_receipt(&mut self, message_ids: &[String], at: DateTime<Utc>) -> usize {
        let mut updated = 0;
        for id in message_ids {
            if let Some(&position) = self.index.get(id) {
                if self.messages[position].mark_read(at) {
                    updated += 1;
                }
            }
        }
        updated
    }

    /// IDs of confirmed messages from anyone but `user_id` that are still unread
    pub fn unread_from_others(&self, user_id: &str) -> Vec<String> {
        self.messages
            .iter()
            .filter(|m| m.sender_id != user_id && !m.is_read() && !m.is_temporary())
            .map(|m| m.id.clone())
            .collect()
    }

    /// Number of server-confirmed messages (history paging offset)
    pub fn confirmed_len(&self) -> usize {
        self.messages.iter().filter(|m| !m.is_temporary()).count()
    }

    /// Look up a message by ID
    pub fn get(&self, id: &str) -> Option<&Message> {
        self.index.get(id).map(|&position| &self.messages[position])
    }

    /// Whether a message with this ID is present
    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Display position of a message
    pub fn position(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    /// Messages in display order
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Iterate messages in display order
    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter()
    }

    /// Number of messages
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    fn reindex_from(&mut self, start: usize) {
        for (position, message) in self.messages.iter().enumerate().skip(start) {
            self.index.insert(message.id.clone(), position);
        }
    }
}
