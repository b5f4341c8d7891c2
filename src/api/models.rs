//! Data returned by the backend REST endpoints.

use serde::{Deserialize, Serialize};

use crate::chat::error::{ChatError, ChatResult};
use crate::chat::protocol::decode_frame;

/// Status value of a successful envelope.
pub const STATUS_SUCCESS: &str = "SUCCESS";

/// Id of the synthetic tenant used when the user belongs to none.
pub const PERSONAL_SPACE_ID: &str = "personal_space";

/// Envelope wrapping every REST payload.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    /// Payload.
    pub data: Option<T>,
    /// Refreshed token, when the backend issues one.
    #[serde(default)]
    pub token: Option<String>,
    /// `SUCCESS` or a failure code.
    pub status: String,
    /// Human readable message.
    #[serde(default, rename = "msg")]
    pub message: Option<String>,
    /// Total count for paged endpoints.
    #[serde(default)]
    pub total: Option<i64>,
}

impl<T> ApiResponse<T> {
    /// Successful envelope around `data`.
    #[must_use]
    pub fn success(data: T) -> Self {
        Self {
            data: Some(data),
            token: None,
            status: STATUS_SUCCESS.to_string(),
            message: None,
            total: None,
        }
    }

    /// Failed envelope without payload.
    #[must_use]
    pub fn failure(status: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            data: None,
            token: None,
            status: status.into(),
            message: Some(message.into()),
            total: None,
        }
    }

    /// Whether the backend reported success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == STATUS_SUCCESS
    }

    /// Extract the payload, or an API error carrying `context` when the
    /// backend sent no message.
    ///
    /// # Errors
    /// Returns [`ChatError::Api`] when the status is not `SUCCESS`.
    pub fn into_result(self, context: &str) -> ChatResult<Option<T>> {
        if self.is_success() {
            Ok(self.data)
        } else {
            Err(ChatError::Api {
                status: self.status,
                message: self.message.unwrap_or_else(|| context.to_string()),
            })
        }
    }
}

/// A chat model offered by the backend.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatModel {
    /// Model id sent with chat requests.
    pub id: String,
    /// Display name.
    pub model_name: String,
    /// Last update time as reported by the backend.
    #[serde(default)]
    pub update_time: String,
    /// Creation time as reported by the backend.
    #[serde(default)]
    pub create_time: String,
}

/// Whether a tenant is usable.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "StatusRepr", into = "String")]
pub enum TenantStatus {
    /// Disabled tenant.
    Disabled,
    /// Enabled tenant.
    #[default]
    Enabled,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StatusRepr {
    Text(String),
    Number(i64),
}

impl TryFrom<StatusRepr> for TenantStatus {
    type Error = String;

    fn try_from(value: StatusRepr) -> Result<Self, Self::Error> {
        match value {
            StatusRepr::Text(text) if text == "0" => Ok(Self::Disabled),
            StatusRepr::Text(text) if text == "1" => Ok(Self::Enabled),
            StatusRepr::Number(0) => Ok(Self::Disabled),
            StatusRepr::Number(1) => Ok(Self::Enabled),
            StatusRepr::Text(text) => Err(format!("invalid tenant status: {text}")),
            StatusRepr::Number(n) => Err(format!("invalid tenant status: {n}")),
        }
    }
}

impl From<TenantStatus> for String {
    fn from(value: TenantStatus) -> Self {
        match value {
            TenantStatus::Disabled => "0".to_string(),
            TenantStatus::Enabled => "1".to_string(),
        }
    }
}

/// Routing namespace the user operates within.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Tenant {
    /// Tenant id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Unique code.
    pub code: String,
    /// Optional description.
    #[serde(default)]
    pub description: Option<String>,
    /// Status.
    #[serde(default)]
    pub status: TenantStatus,
    /// Creation time.
    #[serde(default)]
    pub create_date: Option<String>,
    /// Update time.
    #[serde(default)]
    pub update_date: Option<String>,
    /// Creator id.
    #[serde(default)]
    pub created_by: String,
    /// Last updater id.
    #[serde(default)]
    pub updated_by: Option<String>,
}

impl Tenant {
    /// The personal space, used when the user has not joined any tenant.
    #[must_use]
    pub fn personal_space() -> Self {
        Self {
            id: PERSONAL_SPACE_ID.to_string(),
            name: "私人空间".to_string(),
            code: "personal".to_string(),
            description: Some("个人聊天空间，不归属于任何租户".to_string()),
            status: TenantStatus::Enabled,
            create_date: None,
            update_date: None,
            created_by: String::new(),
            updated_by: None,
        }
    }

    /// Whether this is the personal space.
    #[must_use]
    pub fn is_personal_space(&self) -> bool {
        self.id == PERSONAL_SPACE_ID
    }
}

/// One stored exchange of a past conversation.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatHistory {
    /// Row id.
    pub id: i64,
    /// Model that answered.
    #[serde(default)]
    pub model_name: String,
    /// Owner.
    #[serde(default)]
    pub user_id: String,
    /// Attached files, as stored by the backend.
    #[serde(default)]
    pub files: Option<String>,
    /// Conversation id.
    pub chat_id: String,
    /// User prompt.
    pub prompt: String,
    /// System prompt used.
    #[serde(default, rename = "SystemPrompt")]
    pub system_prompt: String,
    /// Full raw answer.
    #[serde(default)]
    pub content: String,
    /// Creation time.
    #[serde(default)]
    pub create_time: String,
    /// Reasoning part of the answer.
    #[serde(default)]
    pub think_content: Option<String>,
    /// User-visible part of the answer.
    #[serde(default)]
    pub response_content: Option<String>,
}

impl ChatHistory {
    /// Think text and answer text to display.
    ///
    /// Prefers the split fields; otherwise the raw `content` is decoded so
    /// embedded think markup never shows up in the answer.
    #[must_use]
    pub fn answer(&self) -> (Option<String>, String) {
        let stored_think = self
            .think_content
            .clone()
            .filter(|text| !text.trim().is_empty());
        if let Some(response) = self.response_content.as_deref().filter(|t| !t.is_empty()) {
            return (stored_think, response.to_string());
        }
        let decoded = decode_frame(&self.content);
        let think = stored_think.or_else(|| {
            decoded
                .think_segment
                .filter(|text| !text.trim().is_empty())
        });
        (think, decoded.response_segment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_failure_maps_to_api_error() {
        let json = r#"{"data":null,"status":"FAIL","msg":"token invalid"}"#;
        let envelope: Option<ApiResponse<Vec<ChatModel>>> = serde_json::from_str(json).ok();
        let result = envelope.map(|e| e.into_result("获取模型列表失败"));
        assert!(matches!(
            result,
            Some(Err(ChatError::Api { ref message, .. })) if message == "token invalid"
        ));
    }

    #[test]
    fn test_model_list_decodes() {
        let json = r#"{"data":[{"id":"1","modelName":"qwen","updateTime":"","createTime":""}],"status":"SUCCESS"}"#;
        let envelope: Option<ApiResponse<Vec<ChatModel>>> = serde_json::from_str(json).ok();
        let models = envelope
            .and_then(|e| e.into_result("x").ok())
            .flatten()
            .unwrap_or_default();
        assert_eq!(models.len(), 1);
        assert_eq!(models[0].model_name, "qwen");
    }

    #[test]
    fn test_tenant_status_accepts_text_and_numbers() {
        let text: Option<Tenant> = serde_json::from_str(
            r#"{"id":"t1","name":"Team","code":"team","status":"0","created_by":"u"}"#,
        )
        .ok();
        assert_eq!(text.map(|t| t.status), Some(TenantStatus::Disabled));

        let number: Option<Tenant> =
            serde_json::from_str(r#"{"id":"t1","name":"Team","code":"team","status":1}"#).ok();
        assert_eq!(number.map(|t| t.status), Some(TenantStatus::Enabled));

        let bad: Result<Tenant, _> =
            serde_json::from_str(r#"{"id":"t1","name":"Team","code":"team","status":"7"}"#);
        assert!(bad.is_err());
    }

    #[test]
    fn test_personal_space_round_trips_through_json() {
        let tenant = Tenant::personal_space();
        let json = serde_json::to_string(&tenant).unwrap_or_default();
        assert!(json.contains(r#""status":"1""#));
        let back: Option<Tenant> = serde_json::from_str(&json).ok();
        assert_eq!(back, Some(tenant));
    }

    #[test]
    fn test_history_answer_fallback() {
        let json = r#"{"id":1,"chatId":"c","prompt":"p","SystemPrompt":"s","content":"raw","createTime":"2024-01-01"}"#;
        let history: Option<ChatHistory> = serde_json::from_str(json).ok();
        assert_eq!(
            history.as_ref().map(ChatHistory::answer),
            Some((None, "raw".to_string()))
        );
        assert_eq!(history.map(|h| h.system_prompt), Some("s".to_string()));
    }

    #[test]
    fn test_history_fallback_strips_think_markup() {
        let json = r#"{"id":2,"chatId":"c","prompt":"p","content":"<think>why</think>because","createTime":""}"#;
        let history: Option<ChatHistory> = serde_json::from_str(json).ok();
        assert_eq!(
            history.as_ref().map(ChatHistory::answer),
            Some((Some("why".to_string()), "because".to_string()))
        );
    }

    #[test]
    fn test_history_prefers_split_fields() {
        let json = r#"{"id":3,"chatId":"c","prompt":"p","content":"<think>x</think>y","thinkContent":"x","responseContent":"y","createTime":""}"#;
        let history: Option<ChatHistory> = serde_json::from_str(json).ok();
        assert_eq!(
            history.as_ref().map(ChatHistory::answer),
            Some((Some("x".to_string()), "y".to_string()))
        );
    }
}
