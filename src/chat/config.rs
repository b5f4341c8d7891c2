//! Configuration for the chat client.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use super::error::{ChatError, ChatResult};

/// Default system prompt sent with every chat request.
pub const DEFAULT_SYSTEM_PROMPT: &str = "你是一个智能助手";

/// Path of the streaming chat endpoint on the backend.
pub const SOCKET_PATH: &str = "/service/chat/ws/chat";

/// Environment variable overriding the backend base URL.
const BASE_URL_ENV: &str = "PLAYER_CHAT_BASE_URL";
/// Environment variable overriding the completion grace period (milliseconds).
const GRACE_ENV: &str = "PLAYER_CHAT_GRACE_MS";
/// Environment variable overriding the settings database path.
const SETTINGS_ENV: &str = "PLAYER_CHAT_SETTINGS";

/// Configuration for a chat client.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Backend base URL (`http://host:port`).
    pub base_url: String,
    /// System prompt attached to each request.
    pub system_prompt: String,
    /// How long to keep the socket open after the completion marker.
    #[serde(with = "duration_ms")]
    pub completion_grace: Duration,
    /// REST request timeout.
    #[serde(with = "duration_ms")]
    pub request_timeout: Duration,
    /// REST connection timeout.
    #[serde(with = "duration_ms")]
    pub connect_timeout: Duration,
    /// Number of entries per chat history page.
    pub history_page_size: u32,
    /// Location of the settings database.
    pub settings_path: PathBuf,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080".to_string(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            completion_grace: Duration::from_millis(300),
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            history_page_size: 20,
            settings_path: PathBuf::from("player_chat.sqlite3"),
        }
    }
}

impl ChatConfig {
    /// Create a new config with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a config from defaults overridden by `PLAYER_CHAT_*` variables.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = std::env::var(BASE_URL_ENV) {
            config.base_url = url;
        }
        if let Some(ms) = std::env::var(GRACE_ENV)
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
        {
            config.completion_grace = Duration::from_millis(ms);
        }
        if let Ok(path) = std::env::var(SETTINGS_ENV) {
            config.settings_path = PathBuf::from(path);
        }
        config
    }

    /// Set the backend base URL.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the system prompt.
    #[must_use]
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Set the completion grace period.
    #[must_use]
    pub const fn with_completion_grace(mut self, grace: Duration) -> Self {
        self.completion_grace = grace;
        self
    }

    /// Set the chat history page size.
    #[must_use]
    pub const fn with_history_page_size(mut self, size: u32) -> Self {
        self.history_page_size = size;
        self
    }

    /// Set the settings database path.
    #[must_use]
    pub fn with_settings_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.settings_path = path.into();
        self
    }

    /// Validate configuration invariants.
    ///
    /// # Errors
    /// Returns an error if the base URL is unusable or the page size is zero.
    pub fn validate(&self) -> ChatResult<()> {
        let url = Url::parse(&self.base_url)?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ChatError::InvalidConfig(format!(
                "base_url must be http or https, got {}",
                url.scheme()
            )));
        }
        if url.host_str().is_none() {
            return Err(ChatError::InvalidConfig(
                "base_url must contain a host".to_string(),
            ));
        }
        if self.history_page_size == 0 {
            return Err(ChatError::InvalidConfig(
                "history_page_size must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Parsed REST base URL.
    ///
    /// # Errors
    /// Returns an error if `base_url` does not parse.
    pub fn api_url(&self, path: &str) -> ChatResult<Url> {
        Ok(Url::parse(&self.base_url)?.join(path)?)
    }

    /// Streaming endpoint URL carrying the auth token as a query parameter.
    ///
    /// # Errors
    /// Returns an error if `base_url` does not parse.
    pub fn socket_url(&self, token: &str) -> ChatResult<Url> {
        let mut url = Url::parse(&self.base_url)?.join(SOCKET_PATH)?;
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        url.set_scheme(scheme).map_err(|()| {
            ChatError::InvalidConfig(format!("cannot derive socket url from {}", self.base_url))
        })?;
        url.query_pairs_mut().clear().append_pair("token", token);
        Ok(url)
    }
}

/// Serde module for millisecond Duration serialization.
mod duration_ms {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        u64::try_from(duration.as_millis())
            .unwrap_or(u64::MAX)
            .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }
}
