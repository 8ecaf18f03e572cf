//! Client-side chat state
//!
//! The module is organized into submodules:
//! - `message` - Chat message model and temporary IDs
//! - `chat` - Conversation metadata served by the REST API
//! - `message_store` - Ordered, deduplicated message sequence of the open chat
//! - `settings` - Client configuration

// Submodules
pub mod chat;
pub mod message;
pub mod message_store;
pub mod settings;

// Re-export commonly used types
pub use chat::{ChatDetail, ChatSummary, Participant, ParticipantRole};
pub use message::{Message, MessageKind, TEMP_ID_PREFIX};
pub use message_store::MessageStore;
pub use settings::ClientSettings;
