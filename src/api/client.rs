//! REST client for the read-only endpoints the chat session depends on.

use std::future::Future;
use std::pin::Pin;

use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::chat::config::ChatConfig;
use crate::chat::error::{ChatError, ChatResult};
use crate::settings::SettingsCache;

use super::models::{ApiResponse, ChatHistory, ChatModel, Tenant};

/// Model list endpoint.
pub const MODEL_LIST_PATH: &str = "/service/chat/getModelList";
/// Tenant list endpoint.
pub const TENANT_LIST_PATH: &str = "/service/tenant/getUserTenantList";
/// Chat history endpoint.
pub const CHAT_HISTORY_PATH: &str = "/service/chat/getChatHistory";

/// Boxed future type for API operations.
pub type ApiFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Backend operations used by the chat coordinator.
pub trait ChatApi: Send + Sync {
    /// Models the user can chat with.
    ///
    /// # Errors
    /// Returns an error if the request fails or the backend rejects it.
    fn model_list(&self) -> ApiFuture<'_, ChatResult<Vec<ChatModel>>>;

    /// Tenants the user has joined.
    ///
    /// # Errors
    /// Returns an error if the request fails or the backend rejects it.
    fn tenant_list(&self) -> ApiFuture<'_, ChatResult<Vec<Tenant>>>;

    /// One page (1-based) of past exchanges in a tenant.
    ///
    /// # Errors
    /// Returns an error if the request fails or the backend rejects it.
    fn chat_history(
        &self,
        tenant_id: String,
        page_size: u32,
        page_num: u32,
    ) -> ApiFuture<'_, ChatResult<Vec<ChatHistory>>>;
}

/// `reqwest` implementation of [`ChatApi`].
///
/// Every request carries `Authorization: Bearer <token>` with the token read
/// from the settings cache at request time.
pub struct HttpChatApi {
    client: Client,
    config: ChatConfig,
    settings: SettingsCache,
}

impl HttpChatApi {
    /// Build a client for the backend in `config`.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &ChatConfig, settings: SettingsCache) -> ChatResult<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            client,
            config: config.clone(),
            settings,
        })
    }

    async fn get<T: DeserializeOwned + Send>(
        &self,
        path: &str,
        query: &[(&str, String)],
        context: &str,
    ) -> ChatResult<Option<T>> {
        let url = self.config.api_url(path)?;
        let mut request = self.client.get(url).query(query);
        if let Some(token) = self.settings.token().await? {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        debug!(path, %status, "REST response");
        if !status.is_success() {
            return Err(ChatError::Api {
                status: status.as_u16().to_string(),
                message: format!("网络请求失败: {}", status.as_u16()),
            });
        }

        let envelope: ApiResponse<T> = response.json().await?;
        envelope.into_result(context)
    }
}

impl ChatApi for HttpChatApi {
    fn model_list(&self) -> ApiFuture<'_, ChatResult<Vec<ChatModel>>> {
        Box::pin(async move {
            let models = self.get(MODEL_LIST_PATH, &[], "获取模型列表失败").await?;
            Ok(models.unwrap_or_default())
        })
    }

    fn tenant_list(&self) -> ApiFuture<'_, ChatResult<Vec<Tenant>>> {
        Box::pin(async move {
            let tenants = self.get(TENANT_LIST_PATH, &[], "获取租户列表失败").await?;
            Ok(tenants.unwrap_or_default())
        })
    }

    fn chat_history(
        &self,
        tenant_id: String,
        page_size: u32,
        page_num: u32,
    ) -> ApiFuture<'_, ChatResult<Vec<ChatHistory>>> {
        Box::pin(async move {
            let query = [
                ("tenantId", tenant_id),
                ("pageSize", page_size.to_string()),
                ("pageNum", page_num.to_string()),
            ];
            let history = self
                .get(CHAT_HISTORY_PATH, &query, "获取会话记录失败")
                .await?;
            Ok(history.unwrap_or_default())
        })
    }
}
