//! Taskchat - real-time chat core for the task marketplace
//!
//! This library provides the client-side chat machinery shared by every
//! marketplace front end: a reconnecting WebSocket push channel, an ordered
//! and deduplicated message store with optimistic sends, a typed REST client
//! and a session binder that ties them to the currently open conversation.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod api;
pub mod protocol;
pub mod reconnect;
pub mod session;
pub mod storage;
pub mod transport;

/// Result type alias for Taskchat operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for Taskchat operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Push channel (WebSocket) error
    #[error("Transport error: {0}")]
    Transport(String),

    /// The push channel was deliberately closed while an operation was pending
    #[error("Push channel disconnected")]
    Disconnected,

    /// REST API answered with a non-success status
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Response body, as returned by the server
        message: String,
    },

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// A base address or endpoint could not be turned into a usable URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Push frame did not follow the wire protocol
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Settings storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// General I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON serialization error: {0}")]
    JsonSerialization(#[from] serde_json::Error),
}

/// Initialize the Taskchat library with logging
///
/// Safe to call more than once; only the first call installs a subscriber.
pub fn init() {
    let _ = tracing_subscriber::fmt().try_init();
}
