//! REST API client
//!
//! This module wraps the marketplace chat endpoints:
//! - conversation list and chat metadata
//! - paginated message history
//! - message send (the authoritative send path)
//! - mark-read acknowledgements
//!
//! The [`ChatApi`] trait is the seam the session binder depends on, so it can
//! run against [`ApiClient`] in production and in-memory fakes in tests.

use crate::protocol::{MarkReadRequest, SendMessageRequest};
use crate::storage::{ChatDetail, ChatSummary, ClientSettings, Message};
use crate::{Error, Result};
use reqwest::{RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Chat operations of the marketplace REST API
pub trait ChatApi: Send + Sync {
    /// Conversations of the authenticated user
    fn list_chats(&self) -> impl Future<Output = Result<Vec<ChatSummary>>> + Send;

    /// Metadata (participants) of one chat
    fn get_chat(&self, chat_id: &str) -> impl Future<Output = Result<ChatDetail>> + Send;

    /// One page of history, oldest first
    fn get_messages(
        &self,
        chat_id: &str,
        limit: u32,
        offset: u32,
    ) -> impl Future<Output = Result<Vec<Message>>> + Send;

    /// Send a message; the server answers with the confirmed record
    fn send_message(
        &self,
        chat_id: &str,
        request: &SendMessageRequest,
    ) -> impl Future<Output = Result<Message>> + Send;

    /// Mark messages as read
    fn mark_read(&self, chat_id: &str, message_ids: &[String]) -> impl Future<Output = Result<()>> + Send;
}

/// HTTP implementation of [`ChatApi`]
#[derive(Debug, Clone)]
pub struct ApiClient {
    /// Underlying HTTP client
    client: reqwest::Client,
    /// REST base address, e.g. `https://example.com/api`
    base_url: Url,
    /// Bearer token sent with every request
    token: Option<String>,
}

impl ApiClient {
    /// Create a client for a base address with a 30 second request timeout
    pub fn new(base_url: Url) -> Result<Self> {
        Self::with_timeout(base_url, Duration::from_secs(30))
    }

    /// Create a client with an explicit request timeout
    pub fn with_timeout(base_url: Url, timeout: Duration) -> Result<Self> {
        if base_url.cannot_be_a_base() {
            return Err(Error::InvalidUrl(format!("{} cannot be a base", base_url)));
        }

        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url,
            token: None,
        })
    }

    /// Create a client from settings
    pub fn from_settings(settings: &ClientSettings) -> Result<Self> {
        Self::with_timeout(settings.api_base()?, settings.request_timeout())
    }

    /// Attach a bearer token
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// REST base address
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Bearer token, if any
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Build `{base}/{segments...}`, escaping each segment
    pub(crate) fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| Error::InvalidUrl(format!("{} cannot be a base", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn fetch<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T> {
        let response = self.authorized(builder).send().await?;
        let response = expect_success(response).await?;
        Ok(response.json::<T>().await?)
    }
}

/// Turn a non-2xx response into [`Error::Api`]
async fn expect_success(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let url = response.url().clone();
    let message = response.text().await.unwrap_or_default();
    warn!("Request to {} failed with status {}: {}", url, status, message);

    Err(Error::Api {
        status: status.as_u16(),
        message,
    })
}

impl ChatApi for ApiClient {
    async fn list_chats(&self) -> Result<Vec<ChatSummary>> {
        let url = self.endpoint(&["chat", "chats"])?;
        debug!("Fetching chat list from {}", url);
        self.fetch(self.client.get(url)).await
    }

    async fn get_chat(&self, chat_id: &str) -> Result<ChatDetail> {
        let url = self.endpoint(&["chat", "chats", chat_id])?;
        debug!("Fetching chat {}", chat_id);
        self.fetch(self.client.get(url)).await
    }

    async fn get_messages(&self, chat_id: &str, limit: u32, offset: u32) -> Result<Vec<Message>> {
        let url = self.endpoint(&["chat", "chats", chat_id, "messages"])?;
        debug!("Fetching history of {} (limit {}, offset {})", chat_id, limit, offset);
        let builder = self
            .client
            .get(url)
            .query(&[("limit", limit), ("offset", offset)]);
        self.fetch(builder).await
    }

    async fn send_message(&self, chat_id: &str, request: &SendMessageRequest) -> Result<Message> {
        let url = self.endpoint(&["chat", "chats", chat_id, "messages"])?;
        info!("Sending {:?} message to chat {}", request.message_type, chat_id);
        let message: Message = self.fetch(self.client.post(url).json(request)).await?;
        info!("Message {} confirmed in chat {}", message.id, chat_id);
        Ok(message)
    }

    async fn mark_read(&self, chat_id: &str, message_ids: &[String]) -> Result<()> {
        let url = self.endpoint(&["chat", "chats", chat_id, "read"])?;
        debug!("Marking {} messages read in chat {}", message_ids.len(), chat_id);
        let body = MarkReadRequest {
            message_ids: message_ids.to_vec(),
        };
        let response = self.authorized(self.client.post(url).json(&body)).send().await?;
        expect_success(response).await?;
        Ok(())
    }
}
