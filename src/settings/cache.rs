//! Typed view over the settings store.

use std::sync::Arc;

use tracing::warn;

use crate::api::models::Tenant;
use crate::chat::error::ChatResult;
use crate::chat::types::Language;

use super::keys;
use super::store::SettingsStore;

/// Settings relevant to a chat session, read in one pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CachedContext {
    /// Auth token.
    pub token: Option<String>,
    /// Active tenant id.
    pub tenant_id: Option<String>,
    /// Active tenant snapshot.
    pub current_tenant: Option<Tenant>,
    /// Active conversation id.
    pub chat_id: Option<String>,
    /// Think mode flag.
    pub think_mode: bool,
    /// Session language.
    pub language: Language,
}

impl CachedContext {
    /// Token, ignoring blank values.
    #[must_use]
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref().filter(|t| !t.trim().is_empty())
    }
}

/// Typed accessors for the persisted client settings.
#[derive(Clone)]
pub struct SettingsCache {
    store: Arc<dyn SettingsStore>,
}

impl SettingsCache {
    /// Wrap a store.
    #[must_use]
    pub fn new(store: Arc<dyn SettingsStore>) -> Self {
        Self { store }
    }

    /// Cached auth token.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    pub async fn token(&self) -> ChatResult<Option<String>> {
        self.store.load(keys::TOKEN).await
    }

    /// Persist the auth token.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    pub async fn save_token(&self, token: &str) -> ChatResult<()> {
        self.store.save(keys::TOKEN, token.to_string()).await
    }

    /// Forget the auth token.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    pub async fn clear_token(&self) -> ChatResult<()> {
        self.store.remove(keys::TOKEN).await
    }

    /// Cached tenant id.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    pub async fn tenant_id(&self) -> ChatResult<Option<String>> {
        self.store.load(keys::TENANT_ID).await
    }

    /// Persist the tenant id.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    pub async fn save_tenant_id(&self, tenant_id: &str) -> ChatResult<()> {
        self.store.save(keys::TENANT_ID, tenant_id.to_string()).await
    }

    /// Cached tenant snapshot; an unreadable snapshot counts as missing.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    pub async fn current_tenant(&self) -> ChatResult<Option<Tenant>> {
        let Some(json) = self.store.load(keys::CURRENT_TENANT).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&json) {
            Ok(tenant) => Ok(Some(tenant)),
            Err(err) => {
                warn!(?err, "Ignoring unreadable cached tenant");
                Ok(None)
            }
        }
    }

    /// Persist the tenant snapshot.
    ///
    /// # Errors
    /// Returns an error if serialization or storage access fails.
    pub async fn save_current_tenant(&self, tenant: &Tenant) -> ChatResult<()> {
        let json = serde_json::to_string(tenant)?;
        self.store.save(keys::CURRENT_TENANT, json).await
    }

    /// Cached conversation id.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    pub async fn chat_id(&self) -> ChatResult<Option<String>> {
        self.store.load(keys::CHAT_ID).await
    }

    /// Persist the conversation id.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    pub async fn save_chat_id(&self, chat_id: &str) -> ChatResult<()> {
        self.store.save(keys::CHAT_ID, chat_id.to_string()).await
    }

    /// Cached think mode flag, `false` when unset.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    pub async fn think_mode(&self) -> ChatResult<bool> {
        let value = self.store.load(keys::THINK_MODE).await?;
        Ok(value.is_some_and(|v| v == "true"))
    }

    /// Persist the think mode flag.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    pub async fn save_think_mode(&self, enabled: bool) -> ChatResult<()> {
        self.store.save(keys::THINK_MODE, enabled.to_string()).await
    }

    /// Cached language, `zh` when unset or unknown.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    pub async fn language(&self) -> ChatResult<Language> {
        let value = self.store.load(keys::LANGUAGE).await?;
        Ok(value.and_then(|v| v.parse().ok()).unwrap_or_default())
    }

    /// Persist the language.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    pub async fn save_language(&self, language: Language) -> ChatResult<()> {
        self.store
            .save(keys::LANGUAGE, language.as_str().to_string())
            .await
    }

    /// Read every session-relevant setting.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    pub async fn load_context(&self) -> ChatResult<CachedContext> {
        Ok(CachedContext {
            token: self.token().await?,
            tenant_id: self.tenant_id().await?,
            current_tenant: self.current_tenant().await?,
            chat_id: self.chat_id().await?,
            think_mode: self.think_mode().await?,
            language: self.language().await?,
        })
    }

    /// Remove every setting (logout).
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    pub async fn clear_all(&self) -> ChatResult<()> {
        self.store.clear().await
    }
}
