//! Client settings and configuration

use crate::reconnect::ReconnectPolicy;
use crate::session::SessionSettings;
use crate::{Error, Result};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Chat client settings
///
/// Settings are stored in JSON format and can be loaded/saved from disk.
///
/// # Example
/// ```rust,no_run
/// use taskchat::storage::ClientSettings;
///
/// // Load settings (returns default if file doesn't exist)
/// let mut settings = ClientSettings::load("taskchat.json").expect("Failed to load");
///
/// settings.history_page_size = 100;
/// settings.save("taskchat.json").expect("Failed to save");
///
/// let policy = settings.reconnect_policy();
/// println!("First reconnect after {:?}", policy.delay_for(0));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    /// Base address of the marketplace REST API
    pub api_base_url: String,
    /// Messages fetched per history page
    pub history_page_size: u32,
    /// Base delay for reconnect backoff in milliseconds
    pub reconnect_base_delay_ms: u64,
    /// Maximum reconnect attempts after an unexpected close
    pub max_reconnect_attempts: u32,
    /// Timeout for REST requests in seconds
    pub request_timeout_secs: u64,
}

impl ClientSettings {
    /// Load settings from a JSON file
    ///
    /// # Arguments
    /// * `path` - Path to the settings file
    ///
    /// # Returns
    /// The loaded settings, or default settings if file doesn't exist
    pub fn load<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Ok(Self::default());
        }

        let data = std::fs::read_to_string(path)
            .map_err(|e| Error::Storage(format!("Failed to read settings: {}", e)))?;

        // Handle empty file (return defaults)
        if data.trim().is_empty() {
            return Ok(Self::default());
        }

        serde_json::from_str(&data)
            .map_err(|e| Error::Storage(format!("Failed to parse settings: {}", e)))
    }

    /// Save settings to a JSON file, creating parent directories as needed
    pub fn save<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Storage(format!("Failed to create settings directory: {}", e)))?;
        }

        let json = serde_json::to_string_pretty(self)
            .map_err(|e| Error::Storage(format!("Failed to serialize settings: {}", e)))?;

        std::fs::write(path, json)
            .map_err(|e| Error::Storage(format!("Failed to write settings: {}", e)))?;

        Ok(())
    }

    /// Parsed REST base address
    pub fn api_base(&self) -> Result<Url> {
        Url::parse(&self.api_base_url)
            .map_err(|e| Error::InvalidUrl(format!("{}: {}", self.api_base_url, e)))
    }

    /// Backoff policy for the push channel
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy::new(
            Duration::from_millis(self.reconnect_base_delay_ms),
            self.max_reconnect_attempts,
        )
    }

    /// Timeout applied to every REST request
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Settings for the session binder
    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            history_page_size: self.history_page_size,
        }
    }
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8000/api".to_string(),
            history_page_size: 50,
            reconnect_base_delay_ms: 1000,
            max_reconnect_attempts: 5,
            request_timeout_secs: 30,
        }
    }
}
