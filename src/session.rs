//! Conversation session binder
//!
//! A [`ChatSession`] owns everything tied to the currently open chat: the
//! message store, the chat metadata and at most one push channel. Switching
//! chats always closes the previous channel before the next one is opened,
//! and every network result is checked against the selection it was issued
//! for, so a late answer never lands in the wrong conversation.
//!
//! Network failures never escape as errors; they become a [`SessionPhase`],
//! an outcome value or a [`Notice`] for the UI layer.

use crate::api::ChatApi;
use crate::protocol::{ChatEvent, SendMessageRequest};
use crate::storage::{ChatDetail, ChatSummary, Message, MessageStore};
use crate::transport::{ConnectionStatus, PushChannel, PushConnector};
use crate::Result;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Session binder settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    /// Messages fetched per history page
    pub history_page_size: u32,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            history_page_size: 50,
        }
    }
}

/// Live update state of a ready chat
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiveStatus {
    /// Push channel handshake in progress
    Connecting,
    /// Pushes are flowing
    Open,
    /// Connection dropped; reconnect attempt scheduled
    Reconnecting {
        /// Attempt number, starting at 1
        attempt: u32,
    },
    /// No live updates; history and REST send still work
    Unavailable,
}

/// Where the session is in its lifecycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionPhase {
    /// No chat selected
    Unselected,
    /// Previous push channel being torn down
    Closing,
    /// History being fetched
    Loading {
        /// Chat being loaded
        chat_id: String,
    },
    /// History loaded; usable
    Ready {
        /// Open chat
        chat_id: String,
        /// Push channel health
        live: LiveStatus,
    },
    /// History could not be fetched
    Failed {
        /// Chat that failed to load
        chat_id: String,
        /// What went wrong
        reason: String,
    },
}

/// Non-fatal, user-visible notices
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// Push channel unavailable; the chat still works over REST
    LiveUpdatesUnavailable {
        /// Affected chat
        chat_id: String,
    },
    /// A send failed and was rolled back
    SendFailed {
        /// Affected chat
        chat_id: String,
        /// Content given back to the composer
        content: String,
        /// What went wrong
        reason: String,
    },
    /// History could not be fetched
    HistoryUnavailable {
        /// Affected chat
        chat_id: String,
        /// What went wrong
        reason: String,
    },
}

/// Result of [`ChatSession::select`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectOutcome {
    /// History loaded; `live` tells whether the push channel opened
    Ready {
        /// Push channel opened
        live: bool,
    },
    /// Another selection (or close) happened before this one finished
    Superseded,
    /// History fetch failed
    HistoryUnavailable(String),
}

/// Result of [`ChatSession::send`]
#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    /// Server confirmed the message
    Sent(Message),
    /// Send failed; `content` goes back into the composer
    Failed {
        /// Original text
        content: String,
        /// What went wrong
        reason: String,
    },
    /// Blank content, nothing sent
    Ignored,
    /// No chat ready to send to
    NotReady,
}

/// Input forwarded from push channel handlers to the pump task
enum SessionInput {
    Event(ChatEvent),
    Status(ConnectionStatus),
}

/// State guarded by the session mutex
struct SessionState<Ch> {
    /// Identifies the current selection; bumped by every select and close
    generation: u64,
    phase: SessionPhase,
    active: Option<String>,
    chat: Option<ChatDetail>,
    store: Option<MessageStore>,
    channel: Option<Arc<Ch>>,
    pump: Option<JoinHandle<()>>,
    notices: Vec<Notice>,
}

impl<Ch> SessionState<Ch> {
    fn is_current(&self, generation: u64) -> bool {
        self.generation == generation
    }

    fn set_live(&mut self, status: LiveStatus) {
        if let SessionPhase::Ready { live, .. } = &mut self.phase {
            *live = status;
        }
    }

    /// Apply pushed input, provided it belongs to the current selection
    fn apply(&mut self, generation: u64, input: SessionInput) {
        if !self.is_current(generation) {
            debug!("Dropping push input from a previous selection");
            return;
        }

        match input {
            SessionInput::Event(event) => self.apply_event(event),
            SessionInput::Status(status) => self.apply_status(status),
        }
    }

    fn apply_event(&mut self, event: ChatEvent) {
        let Some(store) = self.store.as_mut() else {
            return;
        };
        if event.chat_id() != store.chat_id() {
            debug!("Ignoring {} for inactive chat {}", event.kind(), event.chat_id());
            return;
        }

        match event {
            ChatEvent::Message { message, .. } => {
                if message.chat_id != store.chat_id() {
                    warn!("Pushed message {} names chat {}, ignoring", message.id, message.chat_id);
                    return;
                }
                store.merge_incoming(message);
            }
            ChatEvent::ReadReceipt {
                message_ids, read_by, ..
            } => {
                let updated = store.apply_read_receipt(&message_ids, Utc::now());
                debug!("{} read {} messages", read_by, updated);
            }
        }
    }

    fn apply_status(&mut self, status: ConnectionStatus) {
        match status {
            ConnectionStatus::Open => self.set_live(LiveStatus::Open),
            ConnectionStatus::Reconnecting { attempt, .. } => {
                self.set_live(LiveStatus::Reconnecting { attempt })
            }
            ConnectionStatus::Unavailable { .. } => {
                self.set_live(LiveStatus::Unavailable);
                if let Some(chat_id) = self.active.clone() {
                    self.notices.push(Notice::LiveUpdatesUnavailable { chat_id });
                }
            }
        }
    }
}

/// Binds the open chat to its history, store and push channel
pub struct ChatSession<A, C>
where
    A: ChatApi,
    C: PushConnector,
{
    api: A,
    connector: C,
    local_user_id: String,
    settings: SessionSettings,
    state: Arc<Mutex<SessionState<C::Channel>>>,
}

impl<A, C> ChatSession<A, C>
where
    A: ChatApi,
    C: PushConnector,
{
    /// Create a session for the signed-in user; no chat is selected yet
    pub fn new(api: A, connector: C, local_user_id: &str, settings: SessionSettings) -> Self {
        Self {
            api,
            connector,
            local_user_id: local_user_id.to_string(),
            settings,
            state: Arc::new(Mutex::new(SessionState {
                generation: 0,
                phase: SessionPhase::Unselected,
                active: None,
                chat: None,
                store: None,
                channel: None,
                pump: None,
                notices: Vec::new(),
            })),
        }
    }

    /// Signed-in user
    pub fn local_user_id(&self) -> &str {
        &self.local_user_id
    }

    /// Conversation list of the signed-in user
    pub async fn list_chats(&self) -> Result<Vec<ChatSummary>> {
        self.api.list_chats().await
    }

    /// Open a chat
    ///
    /// Closes the previous push channel, loads metadata and the first history
    /// page, then binds and connects a new push channel. A failed connect
    /// leaves the chat usable without live updates.
    pub async fn select(&self, chat_id: &str) -> SelectOutcome {
        let generation = self.teardown(Some(chat_id)).await;
        info!("Loading chat {}", chat_id);

        let fetched = tokio::try_join!(
            self.api.get_chat(chat_id),
            self.api
                .get_messages(chat_id, self.settings.history_page_size, 0),
        );

        let channel = {
            let mut state = self.state.lock().await;
            if !state.is_current(generation) {
                debug!("Discarding history of {}, selection moved on", chat_id);
                return SelectOutcome::Superseded;
            }

            let (detail, history) = match fetched {
                Ok(fetched) => fetched,
                Err(e) => {
                    warn!("Failed to load chat {}: {}", chat_id, e);
                    let reason = e.to_string();
                    state.phase = SessionPhase::Failed {
                        chat_id: chat_id.to_string(),
                        reason: reason.clone(),
                    };
                    state.notices.push(Notice::HistoryUnavailable {
                        chat_id: chat_id.to_string(),
                        reason: reason.clone(),
                    });
                    return SelectOutcome::HistoryUnavailable(reason);
                }
            };

            if let Some(store) = state.store.as_mut() {
                store.load_history(history);
            }
            state.chat = Some(detail);
            state.phase = SessionPhase::Ready {
                chat_id: chat_id.to_string(),
                live: LiveStatus::Connecting,
            };

            let channel = match self.connector.open(chat_id) {
                Ok(channel) => Arc::new(channel),
                Err(e) => {
                    warn!("Cannot build push channel for {}: {}", chat_id, e);
                    state.set_live(LiveStatus::Unavailable);
                    state.notices.push(Notice::LiveUpdatesUnavailable {
                        chat_id: chat_id.to_string(),
                    });
                    return SelectOutcome::Ready { live: false };
                }
            };

            let (tx, rx) = mpsc::unbounded_channel();
            let events = tx.clone();
            channel
                .on_message(Arc::new(move |event: ChatEvent| {
                    let _ = events.send(SessionInput::Event(event));
                }))
                .await;
            channel
                .on_status(Arc::new(move |status: ConnectionStatus| {
                    let _ = tx.send(SessionInput::Status(status));
                }))
                .await;

            state.pump = Some(spawn_pump(self.state.clone(), generation, rx));
            state.channel = Some(channel.clone());
            channel
        };

        let connected = channel.connect().await;

        let mut state = self.state.lock().await;
        if !state.is_current(generation) {
            return SelectOutcome::Superseded;
        }

        match connected {
            Ok(()) => {
                state.set_live(LiveStatus::Open);
                info!("Chat {} ready with live updates", chat_id);
                SelectOutcome::Ready { live: true }
            }
            Err(e) => {
                warn!("Live updates unavailable for {}: {}", chat_id, e);
                state.set_live(LiveStatus::Unavailable);
                state.notices.push(Notice::LiveUpdatesUnavailable {
                    chat_id: chat_id.to_string(),
                });
                SelectOutcome::Ready { live: false }
            }
        }
    }

    /// Send a message with an optimistic insert
    ///
    /// The message shows up immediately under a temporary ID, is replaced by
    /// the confirmed record on success and removed again on failure.
    pub async fn send(&self, content: &str) -> SendOutcome {
        if content.trim().is_empty() {
            return SendOutcome::Ignored;
        }

        let (generation, chat_id, temp_id) = {
            let mut state = self.state.lock().await;
            if !matches!(state.phase, SessionPhase::Ready { .. }) {
                return SendOutcome::NotReady;
            }
            let generation = state.generation;
            let Some(store) = state.store.as_mut() else {
                return SendOutcome::NotReady;
            };
            let temp_id = store.append_optimistic(&self.local_user_id, content);
            (generation, store.chat_id().to_string(), temp_id)
        };

        let result = self
            .api
            .send_message(&chat_id, &SendMessageRequest::text(content))
            .await;

        let mut state = self.state.lock().await;
        if !state.is_current(generation) {
            debug!("Send to {} completed after chat switch", chat_id);
            return match result {
                Ok(message) => SendOutcome::Sent(message),
                Err(e) => SendOutcome::Failed {
                    content: content.to_string(),
                    reason: e.to_string(),
                },
            };
        }

        match result {
            Ok(message) => {
                if let Some(store) = state.store.as_mut() {
                    store.confirm_sent(&temp_id, message.clone());
                }
                let channel = state.channel.clone();
                drop(state);

                if let Some(channel) = channel {
                    let announced = channel
                        .send(&ChatEvent::Message {
                            chat_id: chat_id.clone(),
                            message: message.clone(),
                        })
                        .await;
                    if !announced {
                        debug!("Message {} not announced over push channel", message.id);
                    }
                }
                SendOutcome::Sent(message)
            }
            Err(e) => {
                warn!("Send to {} failed, rolling back: {}", chat_id, e);
                let restored = state
                    .store
                    .as_mut()
                    .and_then(|store| store.rollback(&temp_id))
                    .unwrap_or_else(|| content.to_string());
                let reason = e.to_string();
                state.notices.push(Notice::SendFailed {
                    chat_id,
                    content: restored.clone(),
                    reason: reason.clone(),
                });
                SendOutcome::Failed {
                    content: restored,
                    reason,
                }
            }
        }
    }

    /// Mark everything the counterpart sent as read
    ///
    /// Returns how many messages were marked; failures are logged and count as zero.
    pub async fn mark_read(&self) -> usize {
        let (generation, chat_id, message_ids) = {
            let state = self.state.lock().await;
            let Some(store) = state.store.as_ref() else {
                return 0;
            };
            (
                state.generation,
                store.chat_id().to_string(),
                store.unread_from_others(&self.local_user_id),
            )
        };

        if message_ids.is_empty() {
            return 0;
        }

        if let Err(e) = self.api.mark_read(&chat_id, &message_ids).await {
            warn!("Failed to mark messages read in {}: {}", chat_id, e);
            return 0;
        }

        let mut state = self.state.lock().await;
        if !state.is_current(generation) {
            return 0;
        }
        let marked = state
            .store
            .as_mut()
            .map(|store| store.apply_read_receipt(&message_ids, Utc::now()))
            .unwrap_or(0);
        let channel = state.channel.clone();
        drop(state);

        if let Some(channel) = channel {
            channel
                .send(&ChatEvent::ReadReceipt {
                    chat_id,
                    message_ids,
                    read_by: self.local_user_id.clone(),
                })
                .await;
        }
        marked
    }

    /// Page in older history in front of what is loaded
    ///
    /// Returns how many messages were added.
    pub async fn load_older(&self) -> usize {
        let (generation, chat_id, offset) = {
            let state = self.state.lock().await;
            if !matches!(state.phase, SessionPhase::Ready { .. }) {
                return 0;
            }
            let Some(store) = state.store.as_ref() else {
                return 0;
            };
            (
                state.generation,
                store.chat_id().to_string(),
                store.confirmed_len() as u32,
            )
        };

        let page = match self
            .api
            .get_messages(&chat_id, self.settings.history_page_size, offset)
            .await
        {
            Ok(page) => page,
            Err(e) => {
                warn!("Failed to load older messages of {}: {}", chat_id, e);
                return 0;
            }
        };

        let mut state = self.state.lock().await;
        if !state.is_current(generation) {
            debug!("Discarding older page of {}, selection moved on", chat_id);
            return 0;
        }
        state
            .store
            .as_mut()
            .map(|store| store.prepend_history(page))
            .unwrap_or(0)
    }

    /// Close the open chat and its push channel
    pub async fn close(&self) {
        self.teardown(None).await;
    }

    /// Current lifecycle phase
    pub async fn phase(&self) -> SessionPhase {
        self.state.lock().await.phase.clone()
    }

    /// Selected chat ID
    pub async fn active_chat(&self) -> Option<String> {
        self.state.lock().await.active.clone()
    }

    /// Metadata of the open chat
    pub async fn chat(&self) -> Option<ChatDetail> {
        self.state.lock().await.chat.clone()
    }

    /// Snapshot of the open chat's messages in display order
    pub async fn messages(&self) -> Vec<Message> {
        let state = self.state.lock().await;
        state
            .store
            .as_ref()
            .map(|store| store.messages().to_vec())
            .unwrap_or_default()
    }

    /// Drain pending notices
    pub async fn take_notices(&self) -> Vec<Notice> {
        std::mem::take(&mut self.state.lock().await.notices)
    }

    /// Route an event into the current selection, as the push channel would
    ///
    /// Events for any other chat are ignored.
    pub async fn handle_event(&self, event: ChatEvent) {
        let mut state = self.state.lock().await;
        let generation = state.generation;
        state.apply(generation, SessionInput::Event(event));
    }

    /// Start a new selection: close the old channel, then reset state
    ///
    /// Returns the generation of the new selection.
    async fn teardown(&self, next: Option<&str>) -> u64 {
        let mut state = self.state.lock().await;
        state.generation += 1;

        if let Some(channel) = state.channel.take() {
            state.phase = SessionPhase::Closing;
            channel.disconnect().await;
        }
        if let Some(pump) = state.pump.take() {
            pump.abort();
        }

        state.chat = None;
        match next {
            Some(chat_id) => {
                state.active = Some(chat_id.to_string());
                state.store = Some(MessageStore::new(chat_id));
                state.phase = SessionPhase::Loading {
                    chat_id: chat_id.to_string(),
                };
            }
            None => {
                state.active = None;
                state.store = None;
                state.phase = SessionPhase::Unselected;
            }
        }

        state.generation
    }
}

impl<A, C> Drop for ChatSession<A, C>
where
    A: ChatApi,
    C: PushConnector,
{
    fn drop(&mut self) {
        // Stop the pump; dropping the channel stops its connection
        if let Ok(mut state) = self.state.try_lock() {
            if let Some(pump) = state.pump.take() {
                pump.abort();
            }
            state.channel = None;
        }
    }
}

/// Apply forwarded push input to the session state, in arrival order
fn spawn_pump<Ch>(
    state: Arc<Mutex<SessionState<Ch>>>,
    generation: u64,
    mut inputs: mpsc::UnboundedReceiver<SessionInput>,
) -> JoinHandle<()>
where
    Ch: Send + Sync + 'static,
{
    tokio::spawn(async move {
        while let Some(input) = inputs.recv().await {
            let mut state = state.lock().await;
            if !state.is_current(generation) {
                break;
            }
            state.apply(generation, input);
        }
    })
}
