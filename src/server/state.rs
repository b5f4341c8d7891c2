//! Shared state of the development backend.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;

use crate::api::models::{ChatHistory, ChatModel, Tenant, TenantStatus};
use crate::chat::types::ChatRequest;

/// Default server port.
pub const DEFAULT_PORT: u16 = 8080;

/// Environment variable overriding the server port.
const PORT_ENV: &str = "PLAYER_CHAT_PORT";

/// Behaviour of the mock streaming backend.
#[derive(Clone, Debug)]
pub struct MockServerConfig {
    /// Listening port.
    pub port: u16,
    /// Pause between streamed chunks.
    pub chunk_delay: Duration,
    /// Characters per response chunk.
    pub chunk_chars: usize,
    /// Drop the socket after this many response chunks, without a
    /// completion marker.
    pub interrupt_after: Option<usize>,
}

impl Default for MockServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            chunk_delay: Duration::from_millis(40),
            chunk_chars: 4,
            interrupt_after: None,
        }
    }
}

impl MockServerConfig {
    /// Defaults with the port taken from `PLAYER_CHAT_PORT` when set.
    #[must_use]
    pub fn from_env() -> Self {
        let port = std::env::var(PORT_ENV)
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(DEFAULT_PORT);
        Self {
            port,
            ..Self::default()
        }
    }

    /// Set the pause between chunks.
    #[must_use]
    pub const fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = delay;
        self
    }

    /// Set the chunk size in characters.
    #[must_use]
    pub const fn with_chunk_chars(mut self, chars: usize) -> Self {
        self.chunk_chars = chars;
        self
    }

    /// Drop the socket mid-answer after `chunks` response chunks.
    #[must_use]
    pub const fn with_interrupt_after(mut self, chunks: usize) -> Self {
        self.interrupt_after = Some(chunks);
        self
    }
}

/// State shared by all handlers.
pub struct MockState {
    /// Streaming behaviour.
    pub config: MockServerConfig,
    active_sockets: AtomicUsize,
    total_sockets: AtomicUsize,
    next_history_id: AtomicI64,
    requests: Mutex<Vec<ChatRequest>>,
    history: Mutex<Vec<(String, ChatHistory)>>,
}

impl MockState {
    /// Create state for a server with `config`.
    #[must_use]
    pub fn new(config: MockServerConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            active_sockets: AtomicUsize::new(0),
            total_sockets: AtomicUsize::new(0),
            next_history_id: AtomicI64::new(1),
            requests: Mutex::new(Vec::new()),
            history: Mutex::new(Vec::new()),
        })
    }

    /// Models served by the model list endpoint.
    #[must_use]
    pub fn models() -> Vec<ChatModel> {
        let now = Utc::now().format("%Y-%m-%d %H:%M:%S").to_string();
        [("qwen3-8b", "Qwen3 8B"), ("deepseek-r1", "DeepSeek R1")]
            .into_iter()
            .map(|(id, name)| ChatModel {
                id: id.to_string(),
                model_name: name.to_string(),
                update_time: now.clone(),
                create_time: now.clone(),
            })
            .collect()
    }

    /// Tenants served by the tenant list endpoint.
    #[must_use]
    pub fn tenants() -> Vec<Tenant> {
        vec![Tenant {
            id: "demo".to_string(),
            name: "演示租户".to_string(),
            code: "demo".to_string(),
            description: None,
            status: TenantStatus::Enabled,
            create_date: None,
            update_date: None,
            created_by: "system".to_string(),
            updated_by: None,
        }]
    }

    /// Sockets currently open.
    #[must_use]
    pub fn active_sockets(&self) -> usize {
        self.active_sockets.load(Ordering::SeqCst)
    }

    /// Sockets accepted since start.
    #[must_use]
    pub fn total_sockets(&self) -> usize {
        self.total_sockets.load(Ordering::SeqCst)
    }

    pub(crate) fn socket_opened(&self) {
        self.active_sockets.fetch_add(1, Ordering::SeqCst);
        self.total_sockets.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn socket_closed(&self) {
        self.active_sockets.fetch_sub(1, Ordering::SeqCst);
    }

    /// Every chat request received, oldest first.
    pub async fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().await.clone()
    }

    pub(crate) async fn record_request(&self, request: ChatRequest) {
        self.requests.lock().await.push(request);
    }

    /// Store a finished exchange so it shows up in the history endpoint.
    pub(crate) async fn record_exchange(
        &self,
        request: &ChatRequest,
        think: Option<String>,
        answer: &str,
    ) {
        let content = think.as_ref().map_or_else(
            || answer.to_string(),
            |think| format!("<think>{think}</think>{answer}"),
        );
        let entry = ChatHistory {
            id: self.next_history_id.fetch_add(1, Ordering::SeqCst),
            model_name: request.model_id.clone(),
            user_id: "mock-user".to_string(),
            files: request.doc_ids.as_ref().map(|ids| ids.join(",")),
            chat_id: request.chat_id.clone(),
            prompt: request.prompt.clone(),
            system_prompt: request.system_prompt.clone(),
            content,
            create_time: Utc::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            think_content: think,
            response_content: Some(answer.to_string()),
        };
        self.history
            .lock()
            .await
            .push((request.tenant_id.clone(), entry));
    }

    /// One page (1-based) of stored exchanges in `tenant_id`, newest first.
    pub async fn history_page(
        &self,
        tenant_id: &str,
        page_size: usize,
        page_num: usize,
    ) -> (Vec<ChatHistory>, usize) {
        let history = self.history.lock().await;
        let matching: Vec<&ChatHistory> = history
            .iter()
            .rev()
            .filter(|(tenant, _)| tenant == tenant_id)
            .map(|(_, entry)| entry)
            .collect();
        let total = matching.len();
        let page = matching
            .into_iter()
            .skip(page_size.saturating_mul(page_num.saturating_sub(1)))
            .take(page_size)
            .cloned()
            .collect();
        drop(history);
        (page, total)
    }
}
