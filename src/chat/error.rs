//! Error types for the chat client.

use thiserror::Error;

/// Errors that can occur while driving a chat session.
///
/// Transport failures on the streaming socket are not represented here: they
/// surface as `ConnectionEvent::Closed` and are folded into session state.
#[derive(Debug, Error)]
pub enum ChatError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    HttpRequest(#[from] reqwest::Error),

    /// The backend answered with a non-success envelope.
    #[error("API error ({status}): {message}")]
    Api {
        /// Status field reported by the backend (or the HTTP status code).
        status: String,
        /// Message reported by the backend.
        message: String,
    },

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// JSON parsing error.
    #[error("JSON parsing error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// Settings storage error.
    #[error("settings storage error: {0}")]
    Storage(#[from] tokio_rusqlite::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    InvalidConfig(String),

    /// The submitted prompt was empty or whitespace.
    #[error("prompt is empty")]
    EmptyPrompt,

    /// A message is already streaming for this session.
    #[error("a message is already being sent")]
    SendInFlight,

    /// No auth token is cached.
    #[error("not authenticated: no token available")]
    NotAuthenticated,

    /// No chat model has been selected.
    #[error("no chat model selected")]
    NoModelSelected,

    /// The requested tenant is not in the tenant list.
    #[error("unknown tenant: {0}")]
    UnknownTenant(String),

    /// The requested model is not in the model list.
    #[error("unknown model: {0}")]
    UnknownModel(String),
}

impl ChatError {
    /// Whether the error comes from a failed precondition of the caller rather
    /// than from I/O.
    #[must_use]
    pub const fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::EmptyPrompt
                | Self::SendInFlight
                | Self::NotAuthenticated
                | Self::NoModelSelected
                | Self::UnknownTenant(_)
                | Self::UnknownModel(_)
        )
    }
}

/// Convenience result alias for chat operations.
pub type ChatResult<T> = Result<T, ChatError>;
