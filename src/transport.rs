//! Push channel transport
//!
//! This module handles the live WebSocket connection of an open chat:
//! - one persistent connection per chat, bound to `/chat/ws/{chat_id}`
//! - inbound frame decoding and dispatch to a registered handler
//! - best-effort outbound notifications (messages, read receipts)
//! - automatic reconnection with bounded exponential backoff
//!
//! The REST API stays the authoritative path for sending; this channel only
//! delivers pushes and signals.

use crate::protocol::{self, ChatEvent, InboundFrame};
use crate::reconnect::ReconnectPolicy;
use crate::{Error, Result};
use futures::{SinkExt, StreamExt};
use reqwest::Url;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// How long `disconnect` waits for the close frame to flush before aborting the driver
const CLOSE_GRACE: Duration = Duration::from_millis(250);

/// Connection state of a push channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Handshake (or reconnect) in progress
    Connecting,
    /// Frames flow in both directions
    Open,
    /// Not connected
    Closed,
}

/// Connection status changes reported to the status handler
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// Connection (re)established
    Open,
    /// Unexpected close; another attempt is scheduled
    Reconnecting {
        /// Attempt number, starting at 1
        attempt: u32,
        /// Wait before the attempt
        delay: Duration,
    },
    /// Reconnect attempts exhausted; live updates are unavailable
    Unavailable {
        /// Attempts that were made
        attempts: u32,
    },
}

/// Callback type for inbound chat events
pub type MessageHandler = Arc<dyn Fn(ChatEvent) + Send + Sync>;

/// Callback type for connection status changes
pub type StatusHandler = Arc<dyn Fn(ConnectionStatus) + Send + Sync>;

/// Build the push endpoint of a chat from the REST base address
///
/// `http` becomes `ws` and `https` becomes `wss`; the path gets
/// `/chat/ws/{chat_id}` appended and the token, if any, travels as the
/// `token` query parameter.
pub fn push_url(api_base: &Url, chat_id: &str, token: Option<&str>) -> Result<Url> {
    let mut url = api_base.clone();

    let scheme = match api_base.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(Error::InvalidUrl(format!(
                "Unsupported scheme {} in {}",
                other, api_base
            )));
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| Error::InvalidUrl(format!("Cannot switch {} to {}", api_base, scheme)))?;

    url.path_segments_mut()
        .map_err(|_| Error::InvalidUrl(format!("{} cannot be a base", api_base)))?
        .pop_if_empty()
        .extend(["chat", "ws", chat_id]);

    url.set_query(None);
    url.set_fragment(None);
    if let Some(token) = token {
        url.query_pairs_mut().append_pair("token", token);
    }

    Ok(url)
}

/// Mutable connection state shared with the driver task
struct SocketInner {
    /// Current state
    state: ConnectionState,
    /// Reconnect attempts since the last successful open
    attempts: u32,
    /// Bumped by every deliberate disconnect; drivers of older epochs stand down
    epoch: u64,
    /// Queue feeding the connection's write half
    outbound: Option<mpsc::UnboundedSender<WsMessage>>,
    /// Background task that owns the connection
    driver: Option<JoinHandle<()>>,
}

/// Everything the driver task needs, cloned out of the socket
#[derive(Clone)]
struct DriverContext {
    url: Url,
    policy: ReconnectPolicy,
    inner: Arc<Mutex<SocketInner>>,
    message_handler: Arc<Mutex<Option<MessageHandler>>>,
    status_handler: Arc<Mutex<Option<StatusHandler>>>,
}

/// Reconnecting WebSocket client bound to one chat
pub struct ChatSocket {
    /// Chat this socket is bound to
    chat_id: String,
    url: Url,
    policy: ReconnectPolicy,
    inner: Arc<Mutex<SocketInner>>,
    message_handler: Arc<Mutex<Option<MessageHandler>>>,
    status_handler: Arc<Mutex<Option<StatusHandler>>>,
}

impl ChatSocket {
    /// Create a socket for a chat; nothing is opened until [`connect`](Self::connect)
    pub fn new(chat_id: &str, url: Url, policy: ReconnectPolicy) -> Self {
        Self {
            chat_id: chat_id.to_string(),
            url,
            policy,
            inner: Arc::new(Mutex::new(SocketInner {
                state: ConnectionState::Closed,
                attempts: 0,
                epoch: 0,
                outbound: None,
                driver: None,
            })),
            message_handler: Arc::new(Mutex::new(None)),
            status_handler: Arc::new(Mutex::new(None)),
        }
    }

    /// Chat this socket is bound to
    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }

    /// Push endpoint
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Current connection state
    pub async fn state(&self) -> ConnectionState {
        self.inner.lock().await.state
    }

    /// Reconnect attempts since the last successful open
    pub async fn reconnect_attempts(&self) -> u32 {
        self.inner.lock().await.attempts
    }

    /// Set the inbound event handler, replacing any previous one
    pub async fn on_message<F>(&self, handler: F)
    where
        F: Fn(ChatEvent) + Send + Sync + 'static,
    {
        let mut guard = self.message_handler.lock().await;
        *guard = Some(Arc::new(handler));
    }

    /// Set the connection status handler, replacing any previous one
    pub async fn on_status<F>(&self, handler: F)
    where
        F: Fn(ConnectionStatus) + Send + Sync + 'static,
    {
        let mut guard = self.status_handler.lock().await;
        *guard = Some(Arc::new(handler));
    }

    /// Open the connection
    ///
    /// Resolves once the handshake completes. A failed open is returned to
    /// the caller and does not start the reconnect loop.
    pub async fn connect(&self) -> Result<()> {
        let epoch = {
            let mut inner = self.inner.lock().await;
            if inner.state == ConnectionState::Open {
                debug!("Push channel for {} already open", self.chat_id);
                return Ok(());
            }
            inner.state = ConnectionState::Connecting;
            inner.epoch
        };

        info!("Opening push channel for chat {}", self.chat_id);

        let stream = match connect_async(self.url.as_str()).await {
            Ok((stream, _response)) => stream,
            Err(e) => {
                let mut inner = self.inner.lock().await;
                if inner.epoch == epoch {
                    inner.state = ConnectionState::Closed;
                }
                error!("Failed to open push channel for {}: {}", self.chat_id, e);
                return Err(Error::Transport(format!("Failed to open push channel: {}", e)));
            }
        };

        let context = self.context();
        {
            let mut inner = self.inner.lock().await;
            if inner.epoch != epoch {
                debug!("Push channel for {} disconnected while opening", self.chat_id);
                return Err(Error::Disconnected);
            }

            let (tx, rx) = mpsc::unbounded_channel();
            inner.attempts = 0;
            inner.state = ConnectionState::Open;
            inner.outbound = Some(tx);
            if let Some(stale) = inner.driver.take() {
                stale.abort();
            }
            inner.driver = Some(tokio::spawn(run_driver(context.clone(), stream, rx, epoch)));
        }

        info!("Push channel for chat {} open", self.chat_id);
        context.notify_status(ConnectionStatus::Open).await;
        Ok(())
    }

    /// Queue an event for the server
    ///
    /// Only works while the connection is open; otherwise the event is
    /// dropped and `false` is returned. Nothing is retried.
    pub async fn send(&self, event: &ChatEvent) -> bool {
        let inner = self.inner.lock().await;

        let tx = match (&inner.state, &inner.outbound) {
            (ConnectionState::Open, Some(tx)) => tx,
            _ => {
                debug!(
                    "Push channel for {} not open, dropping outbound {}",
                    self.chat_id,
                    event.kind()
                );
                return false;
            }
        };

        match protocol::encode_event(event) {
            Ok(text) => tx.send(WsMessage::Text(text)).is_ok(),
            Err(e) => {
                warn!("Failed to encode outbound {}: {}", event.kind(), e);
                false
            }
        }
    }

    /// Close the connection deliberately
    ///
    /// Never triggers a reconnect. Safe to call when already closed.
    pub async fn disconnect(&self) {
        let (outbound, driver) = {
            let mut inner = self.inner.lock().await;
            inner.epoch += 1;
            inner.state = ConnectionState::Closed;
            inner.attempts = 0;
            (inner.outbound.take(), inner.driver.take())
        };

        if let Some(tx) = outbound {
            let _ = tx.send(WsMessage::Close(None));
        }

        if let Some(mut driver) = driver {
            if tokio::time::timeout(CLOSE_GRACE, &mut driver).await.is_err() {
                debug!("Push driver for {} did not stop in time, aborting", self.chat_id);
                driver.abort();
            }
        }

        info!("Push channel for chat {} closed", self.chat_id);
    }

    fn context(&self) -> DriverContext {
        DriverContext {
            url: self.url.clone(),
            policy: self.policy,
            inner: self.inner.clone(),
            message_handler: self.message_handler.clone(),
            status_handler: self.status_handler.clone(),
        }
    }
}

impl Drop for ChatSocket {
    fn drop(&mut self) {
        // Cancel the driver on drop
        if let Some(task) = self.inner.try_lock().ok().and_then(|mut guard| guard.driver.take()) {
            task.abort();
        }
    }
}

impl DriverContext {
    /// Decode a text frame and hand recognized events to the message handler
    async fn dispatch(&self, text: &str) {
        match protocol::decode_frame(text) {
            Ok(InboundFrame::Event(event)) => {
                let handler = self.message_handler.lock().await.clone();
                match handler {
                    Some(handler) => handler(event),
                    None => warn!("No message handler set, {} event dropped", event.kind()),
                }
            }
            Ok(InboundFrame::Unknown { kind }) => {
                debug!("Ignoring push frame of unknown type {}", kind);
            }
            Err(e) => {
                warn!("Dropping malformed push frame: {}", e);
            }
        }
    }

    async fn notify_status(&self, status: ConnectionStatus) {
        let handler = self.status_handler.lock().await.clone();
        if let Some(handler) = handler {
            handler(status);
        }
    }

    /// Whether a deliberate disconnect happened since `epoch` started
    async fn superseded(&self, epoch: u64) -> bool {
        self.inner.lock().await.epoch != epoch
    }

    /// Schedule reconnect attempts until one succeeds or the policy runs out
    async fn reconnect(&self, epoch: u64) -> Option<(WsStream, mpsc::UnboundedReceiver<WsMessage>)> {
        loop {
            let attempt = {
                let mut inner = self.inner.lock().await;
                if inner.epoch != epoch {
                    return None;
                }
                let attempt = inner.attempts;
                match self.policy.delay_for(attempt) {
                    Some(delay) => {
                        inner.attempts = attempt + 1;
                        inner.state = ConnectionState::Connecting;
                        Some((attempt + 1, delay))
                    }
                    None => {
                        inner.state = ConnectionState::Closed;
                        None
                    }
                }
            };

            let Some((attempt, delay)) = attempt else {
                error!(
                    "Giving up on {} after {} reconnect attempts, live updates unavailable",
                    self.url, self.policy.max_attempts
                );
                self.notify_status(ConnectionStatus::Unavailable {
                    attempts: self.policy.max_attempts,
                })
                .await;
                return None;
            };

            warn!("Reconnecting to {} in {:?} (attempt {})", self.url, delay, attempt);
            self.notify_status(ConnectionStatus::Reconnecting { attempt, delay }).await;
            tokio::time::sleep(delay).await;

            if self.superseded(epoch).await {
                return None;
            }

            match connect_async(self.url.as_str()).await {
                Ok((stream, _response)) => {
                    let (tx, rx) = mpsc::unbounded_channel();
                    {
                        let mut inner = self.inner.lock().await;
                        if inner.epoch != epoch {
                            return None;
                        }
                        inner.attempts = 0;
                        inner.state = ConnectionState::Open;
                        inner.outbound = Some(tx);
                    }
                    info!("Reconnected to {} on attempt {}", self.url, attempt);
                    self.notify_status(ConnectionStatus::Open).await;
                    return Some((stream, rx));
                }
                Err(e) => {
                    warn!("Reconnect attempt {} to {} failed: {}", attempt, self.url, e);
                }
            }
        }
    }
}

/// Own one connection (and its successors) until a deliberate disconnect or give-up
async fn run_driver(
    context: DriverContext,
    mut stream: WsStream,
    mut outbound: mpsc::UnboundedReceiver<WsMessage>,
    epoch: u64,
) {
    loop {
        let reason = pump_frames(&context, stream, &mut outbound).await;

        {
            let mut inner = context.inner.lock().await;
            if inner.epoch != epoch {
                debug!("Push channel {} closed deliberately", context.url);
                return;
            }
            inner.state = ConnectionState::Closed;
            inner.outbound = None;
        }

        warn!("Push channel {} closed unexpectedly: {}", context.url, reason);

        match context.reconnect(epoch).await {
            Some((next_stream, next_outbound)) => {
                stream = next_stream;
                outbound = next_outbound;
            }
            None => return,
        }
    }
}

/// Move frames until the connection ends; returns why it ended
async fn pump_frames(
    context: &DriverContext,
    stream: WsStream,
    outbound: &mut mpsc::UnboundedReceiver<WsMessage>,
) -> String {
    let (mut sink, mut source) = stream.split();

    loop {
        tokio::select! {
            frame = source.next() => match frame {
                Some(Ok(WsMessage::Text(text))) => context.dispatch(&text).await,
                Some(Ok(WsMessage::Binary(data))) => match String::from_utf8(data) {
                    Ok(text) => context.dispatch(&text).await,
                    Err(_) => warn!("Dropping non UTF-8 binary push frame"),
                },
                Some(Ok(WsMessage::Close(frame))) => {
                    return match frame {
                        Some(frame) => format!("server closed ({}: {})", frame.code, frame.reason),
                        None => "server closed".to_string(),
                    };
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return format!("read error: {}", e),
                None => return "stream ended".to_string(),
            },
            message = outbound.recv() => match message {
                Some(WsMessage::Close(frame)) => {
                    let _ = sink.send(WsMessage::Close(frame)).await;
                    let _ = sink.close().await;
                    return "closed locally".to_string();
                }
                Some(message) => {
                    if let Err(e) = sink.send(message).await {
                        return format!("write error: {}", e);
                    }
                }
                None => {
                    let _ = sink.close().await;
                    return "outbound queue closed".to_string();
                }
            },
        }
    }
}

/// Factory for the push channel of a chat
///
/// The session binder builds one channel per selected chat through this
/// seam, which lets tests substitute in-memory channels.
pub trait PushConnector: Send + Sync {
    /// Channel type produced
    type Channel: PushChannel;

    /// Build (but do not connect) the channel for a chat
    fn open(&self, chat_id: &str) -> Result<Self::Channel>;
}

/// Operations the session binder needs from a push channel
pub trait PushChannel: Send + Sync + 'static {
    /// Set the inbound event handler
    fn on_message(&self, handler: MessageHandler) -> impl Future<Output = ()> + Send;

    /// Set the connection status handler
    fn on_status(&self, handler: StatusHandler) -> impl Future<Output = ()> + Send;

    /// Open the connection
    fn connect(&self) -> impl Future<Output = Result<()>> + Send;

    /// Best-effort outbound event
    fn send(&self, event: &ChatEvent) -> impl Future<Output = bool> + Send;

    /// Deliberate close
    fn disconnect(&self) -> impl Future<Output = ()> + Send;
}

impl PushChannel for ChatSocket {
    async fn on_message(&self, handler: MessageHandler) {
        *self.message_handler.lock().await = Some(handler);
    }

    async fn on_status(&self, handler: StatusHandler) {
        *self.status_handler.lock().await = Some(handler);
    }

    async fn connect(&self) -> Result<()> {
        ChatSocket::connect(self).await
    }

    async fn send(&self, event: &ChatEvent) -> bool {
        ChatSocket::send(self, event).await
    }

    async fn disconnect(&self) {
        ChatSocket::disconnect(self).await
    }
}

/// Builds [`ChatSocket`]s against the marketplace push endpoint
#[derive(Debug, Clone)]
pub struct SocketConnector {
    api_base: Url,
    token: Option<String>,
    policy: ReconnectPolicy,
}

impl SocketConnector {
    /// Create a connector from the REST base address
    pub fn new(api_base: Url, token: Option<String>, policy: ReconnectPolicy) -> Self {
        Self {
            api_base,
            token,
            policy,
        }
    }
}

impl PushConnector for SocketConnector {
    type Channel = ChatSocket;

    fn open(&self, chat_id: &str) -> Result<ChatSocket> {
        let url = push_url(&self.api_base, chat_id, self.token.as_deref())?;
        Ok(ChatSocket::new(chat_id, url, self.policy))
    }
}
