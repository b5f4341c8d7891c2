//! Transcript and wire types for chat sessions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Display and request language of a session.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// Simplified Chinese (default).
    #[default]
    Zh,
    /// English.
    En,
}

impl Language {
    /// Stable string form used on the wire and in settings.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Zh => "zh",
            Self::En => "en",
        }
    }

    /// The other supported language.
    #[must_use]
    pub const fn toggled(self) -> Self {
        match self {
            Self::Zh => Self::En,
            Self::En => Self::Zh,
        }
    }

    /// Greeting shown at the start of a fresh chat.
    #[must_use]
    pub const fn greeting(self) -> &'static str {
        match self {
            Self::Zh => "你好！我是你的智能助手，有什么可以帮你的吗？",
            Self::En => "Hello! I'm your AI assistant. How can I help you today?",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "zh" => Ok(Self::Zh),
            "en" => Ok(Self::En),
            _ => Err(value.to_string()),
        }
    }
}

/// Lifecycle of an assistant turn.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnStatus {
    /// Placeholder or partially streamed answer.
    Streaming,
    /// The completion marker was observed, or the turn was not streamed.
    Complete,
    /// The connection ended before the completion marker.
    Interrupted,
}

/// A message sent by the user.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct UserTurn {
    /// Submitted text.
    pub content: String,
    /// Creation instant.
    pub timestamp: DateTime<Utc>,
}

/// A message produced by the assistant.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct AssistantTurn {
    /// Reasoning text, present only when non-blank.
    pub think_content: Option<String>,
    /// User-visible answer.
    pub response_content: String,
    /// Creation instant.
    pub timestamp: DateTime<Utc>,
    /// Streaming status.
    pub status: TurnStatus,
}

impl AssistantTurn {
    /// Empty placeholder awaiting streamed content.
    #[must_use]
    pub fn placeholder() -> Self {
        Self {
            think_content: None,
            response_content: String::new(),
            timestamp: Utc::now(),
            status: TurnStatus::Streaming,
        }
    }

    /// Finished turn with fixed content (greetings, history).
    #[must_use]
    pub fn complete(think_content: Option<String>, response_content: impl Into<String>) -> Self {
        Self {
            think_content: think_content.filter(|think| !think.trim().is_empty()),
            response_content: response_content.into(),
            timestamp: Utc::now(),
            status: TurnStatus::Complete,
        }
    }

    /// Whether the turn is still receiving content.
    #[must_use]
    pub fn is_streaming(&self) -> bool {
        self.status == TurnStatus::Streaming
    }
}

/// One unit of the transcript.
///
/// Only assistant turns can carry reasoning text.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "side", rename_all = "snake_case")]
pub enum ConversationTurn {
    /// A user message.
    User(UserTurn),
    /// An assistant message.
    Assistant(AssistantTurn),
}

impl ConversationTurn {
    /// Build a user turn stamped now.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::User(UserTurn {
            content: content.into(),
            timestamp: Utc::now(),
        })
    }

    /// Build the greeting turn for a language.
    #[must_use]
    pub fn greeting(language: Language) -> Self {
        Self::Assistant(AssistantTurn::complete(None, language.greeting()))
    }

    /// User-visible text of the turn.
    #[must_use]
    pub fn response_content(&self) -> &str {
        match self {
            Self::User(turn) => &turn.content,
            Self::Assistant(turn) => &turn.response_content,
        }
    }

    /// Reasoning text of the turn, if any.
    #[must_use]
    pub fn think_content(&self) -> Option<&str> {
        match self {
            Self::User(_) => None,
            Self::Assistant(turn) => turn.think_content.as_deref(),
        }
    }

    /// Creation instant of the turn.
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::User(turn) => turn.timestamp,
            Self::Assistant(turn) => turn.timestamp,
        }
    }

    /// Borrow the assistant payload.
    #[must_use]
    pub const fn as_assistant(&self) -> Option<&AssistantTurn> {
        match self {
            Self::Assistant(turn) => Some(turn),
            Self::User(_) => None,
        }
    }
}

/// JSON frame sent on the socket after it connects.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    /// Selected model id.
    pub model_id: String,
    /// Auth token.
    pub token: String,
    /// Conversation id.
    pub chat_id: String,
    /// Tenant the conversation belongs to.
    pub tenant_id: String,
    /// Documents to ground the answer on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc_ids: Option<Vec<String>>,
    /// User prompt.
    pub prompt: String,
    /// System prompt.
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    /// Whether the backend should stream reasoning.
    #[serde(default)]
    pub show_think: bool,
    /// Answer language.
    #[serde(default)]
    pub language: Language,
}

fn default_system_prompt() -> String {
    super::config::DEFAULT_SYSTEM_PROMPT.to_string()
}

/// Client-generated conversation id: a v4 UUID without dashes.
#[must_use]
pub fn new_chat_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}
