//! Session coordinator: the state machine behind one chat screen.
//!
//! The coordinator exclusively owns the transcript, the routing context
//! (tenant, model, chat id) and the [`ConnectionManager`]. All mutation
//! happens through `&mut self`, so socket events are applied strictly in
//! arrival order on the caller's task. Presentation layers observe state
//! through [`SessionCoordinator::subscribe`].
//!
//! Phases:
//! `Idle` → `AwaitingConnection` → `Streaming` → `Finishing` → `Idle`.
//! `NewChat`, tenant and model switches return to `Idle` from any phase.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::api::models::{ChatHistory, ChatModel, Tenant};
use crate::api::ChatApi;
use crate::settings::SettingsCache;

use super::accumulator::{StreamAccumulator, extend_turn};
use super::config::ChatConfig;
use super::connection::{CloseReason, ConnectionEvent, ConnectionManager, ConnectionState};
use super::error::{ChatError, ChatResult};
use super::protocol::decode_frame;
use super::types::{
    AssistantTurn, ChatRequest, ConversationTurn, Language, TurnStatus, new_chat_id,
};

/// Logical phase of the session, independent of the socket state.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum SessionPhase {
    /// Nothing in flight.
    #[default]
    Idle,
    /// A message was submitted and the socket is connecting.
    AwaitingConnection,
    /// The request was sent and frames are being folded.
    Streaming,
    /// The completion marker arrived; the socket closes after the grace period.
    Finishing,
}

/// What applying one input did to the session.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SessionEvent {
    /// The socket connected and the request was sent.
    Connected,
    /// The tail assistant turn changed.
    TurnUpdated,
    /// The completion marker was folded into the tail turn.
    Completed,
    /// The grace period ended and the socket was closed.
    GraceElapsed,
    /// The socket ended cleanly while nothing was streaming.
    Closed,
    /// The socket ended before the completion marker.
    Interrupted(CloseReason),
    /// The input belonged to a replaced socket or arrived out of phase.
    Ignored,
}

/// Read-only view of the session for presentation layers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionSnapshot {
    /// Ordered transcript.
    pub transcript: Vec<ConversationTurn>,
    /// Logical phase.
    pub phase: SessionPhase,
    /// Socket state.
    pub connection_state: ConnectionState,
    /// Whether a submitted message is still streaming.
    pub sending_in_flight: bool,
    /// Active conversation id (empty until the first message).
    pub chat_id: String,
    /// Active tenant.
    pub tenant: Tenant,
    /// Selected model.
    pub model: Option<ChatModel>,
    /// Think mode flag.
    pub think_mode: bool,
    /// Session language.
    pub language: Language,
}

enum Incoming {
    Connection(ConnectionEvent),
    GraceElapsed,
}

/// Coordinates transcript, routing context and the streaming socket.
///
/// Dropping the coordinator drops its [`ConnectionManager`], which closes any
/// open socket.
pub struct SessionCoordinator {
    config: ChatConfig,
    settings: SettingsCache,
    api: Arc<dyn ChatApi>,
    connection: ConnectionManager,
    token: Option<String>,
    chat_id: String,
    transcript: Vec<ConversationTurn>,
    tenant: Tenant,
    tenants: Vec<Tenant>,
    models: Vec<ChatModel>,
    model: Option<ChatModel>,
    think_mode: bool,
    language: Language,
    doc_ids: Vec<String>,
    phase: SessionPhase,
    grace_deadline: Option<Instant>,
    pending_request: Option<ChatRequest>,
    accumulator: StreamAccumulator,
    sending_in_flight: bool,
    snapshot: watch::Sender<SessionSnapshot>,
}

impl SessionCoordinator {
    /// Create a coordinator with default context. Call
    /// [`initialize`](Self::initialize) before use.
    #[must_use]
    pub fn new(config: ChatConfig, settings: SettingsCache, api: Arc<dyn ChatApi>) -> Self {
        let tenant = Tenant::personal_space();
        let (snapshot, _) = watch::channel(SessionSnapshot {
            transcript: Vec::new(),
            phase: SessionPhase::Idle,
            connection_state: ConnectionState::Disconnected,
            sending_in_flight: false,
            chat_id: String::new(),
            tenant: tenant.clone(),
            model: None,
            think_mode: false,
            language: Language::default(),
        });
        Self {
            connection: ConnectionManager::new(&config),
            config,
            settings,
            api,
            token: None,
            chat_id: String::new(),
            transcript: Vec::new(),
            tenants: vec![tenant.clone()],
            tenant,
            models: Vec::new(),
            model: None,
            think_mode: false,
            language: Language::default(),
            doc_ids: Vec::new(),
            phase: SessionPhase::Idle,
            grace_deadline: None,
            pending_request: None,
            accumulator: StreamAccumulator::new(),
            sending_in_flight: false,
            snapshot,
        }
    }

    /// Load cached context and fetch models and tenants.
    ///
    /// REST failures degrade to an empty model list and the personal space.
    ///
    /// # Errors
    /// Returns an error if the settings cannot be read.
    pub async fn initialize(&mut self) -> ChatResult<()> {
        let context = self.settings.load_context().await?;
        self.token = context.token().map(str::to_string);
        self.chat_id = context
            .chat_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_default();
        self.think_mode = context.think_mode;
        self.language = context.language;

        match self.api.model_list().await {
            Ok(models) => self.models = models,
            Err(err) => {
                warn!(%err, "Failed to fetch model list");
                self.models = Vec::new();
            }
        }
        self.model = self.models.first().cloned();

        let mut tenants = vec![Tenant::personal_space()];
        match self.api.tenant_list().await {
            Ok(fetched) => tenants.extend(fetched.into_iter().filter(|t| !t.is_personal_space())),
            Err(err) => warn!(%err, "Failed to fetch tenant list, using personal space"),
        }
        self.tenants = tenants;

        self.tenant = match (context.current_tenant, context.tenant_id) {
            (Some(tenant), _) => tenant,
            (None, Some(id)) => self.find_tenant(&id).unwrap_or_else(Tenant::personal_space),
            (None, None) => Tenant::personal_space(),
        };

        if self.transcript.is_empty() {
            self.transcript.push(ConversationTurn::greeting(self.language));
        }

        info!(
            tenant_id = %self.tenant.id,
            models = self.models.len(),
            tenants = self.tenants.len(),
            resumed_chat = !self.chat_id.is_empty(),
            "Chat session initialized"
        );
        self.publish();
        Ok(())
    }

    /// Submit a user message and open a fresh socket for it.
    ///
    /// # Errors
    /// Rejects blank text, a second message while one is in flight, a
    /// missing token or model, and an unusable socket URL.
    pub async fn submit(&mut self, text: &str) -> ChatResult<()> {
        let prompt = text.trim();
        if prompt.is_empty() {
            return Err(ChatError::EmptyPrompt);
        }
        if self.sending_in_flight {
            return Err(ChatError::SendInFlight);
        }
        let Some(token) = self.token.clone() else {
            return Err(ChatError::NotAuthenticated);
        };
        let Some(model_id) = self.model.as_ref().map(|m| m.id.clone()) else {
            return Err(ChatError::NoModelSelected);
        };

        self.transcript.push(ConversationTurn::user(prompt));
        self.sending_in_flight = true;

        if self.chat_id.is_empty() {
            self.chat_id = new_chat_id();
            self.persist_chat_id().await;
        }

        if let Err(err) = self.connection.open(&token, &self.chat_id) {
            self.transcript.pop();
            self.sending_in_flight = false;
            self.publish();
            return Err(err);
        }

        self.transcript
            .push(ConversationTurn::Assistant(AssistantTurn::placeholder()));
        self.accumulator.reset();
        // Frozen here; later token or toggle changes apply to the next message.
        self.pending_request = Some(self.build_request(prompt, token, model_id));
        self.grace_deadline = None;
        self.phase = SessionPhase::AwaitingConnection;

        info!(chat_id = %self.chat_id, tenant_id = %self.tenant.id, "Message submitted");
        self.publish();
        Ok(())
    }

    /// Wait for the next socket event or grace deadline and apply it.
    ///
    /// Pending forever while no socket is open and no grace period runs.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        let incoming = match self.grace_deadline {
            Some(deadline) => tokio::select! {
                event = self.connection.recv() => event.map(Incoming::Connection),
                () = tokio::time::sleep_until(deadline) => Some(Incoming::GraceElapsed),
            },
            None => self.connection.recv().await.map(Incoming::Connection),
        };

        match incoming? {
            Incoming::Connection(event) => Some(self.handle_event(event)),
            Incoming::GraceElapsed => Some(self.finish_grace()),
        }
    }

    /// Apply events until the session is back to `Idle`.
    pub async fn run_until_idle(&mut self) {
        while self.phase != SessionPhase::Idle {
            if self.next_event().await.is_none() {
                break;
            }
        }
    }

    /// Apply one socket event.
    pub fn handle_event(&mut self, event: ConnectionEvent) -> SessionEvent {
        if !self.connection.observe(&event) {
            return SessionEvent::Ignored;
        }
        let outcome = match event {
            ConnectionEvent::Connected { .. } => self.on_connected(),
            ConnectionEvent::Frame { text, .. } => self.on_frame(&text),
            ConnectionEvent::Closed { reason, .. } => self.on_closed(reason),
        };
        self.publish();
        outcome
    }

    fn on_connected(&mut self) -> SessionEvent {
        if self.phase != SessionPhase::AwaitingConnection {
            return SessionEvent::Ignored;
        }
        let Some(request) = self.pending_request.take() else {
            warn!("Connected without a pending request");
            self.connection.close();
            self.mark_tail_interrupted();
            self.reset_stream();
            return SessionEvent::Interrupted(CloseReason::Local);
        };
        self.phase = SessionPhase::Streaming;
        self.connection.send(&request);
        SessionEvent::Connected
    }

    fn on_frame(&mut self, text: &str) -> SessionEvent {
        let delta = decode_frame(text);
        match self.phase {
            SessionPhase::Streaming => {
                self.accumulator.push(&delta);
                let status = if delta.is_completed {
                    TurnStatus::Complete
                } else {
                    TurnStatus::Streaming
                };
                self.replace_tail(status);

                if !delta.is_completed {
                    return SessionEvent::TurnUpdated;
                }
                info!(
                    chat_id = %self.chat_id,
                    frames = self.accumulator.frames(),
                    "Response completed"
                );
                self.accumulator.reset();
                self.pending_request = None;
                self.sending_in_flight = false;
                self.phase = SessionPhase::Finishing;
                self.grace_deadline = Some(Instant::now() + self.config.completion_grace);
                SessionEvent::Completed
            }
            SessionPhase::Finishing => {
                debug!("Folding frame received during grace period");
                if let Some(ConversationTurn::Assistant(turn)) = self.transcript.last_mut() {
                    extend_turn(turn, &delta);
                }
                SessionEvent::TurnUpdated
            }
            SessionPhase::Idle | SessionPhase::AwaitingConnection => SessionEvent::Ignored,
        }
    }

    fn on_closed(&mut self, reason: CloseReason) -> SessionEvent {
        match self.phase {
            SessionPhase::AwaitingConnection | SessionPhase::Streaming => {
                if reason.is_local() {
                    debug!(chat_id = %self.chat_id, "Chat socket closed locally before completion");
                } else {
                    warn!(chat_id = %self.chat_id, ?reason, "Chat socket ended before completion");
                }
                self.mark_tail_interrupted();
                self.reset_stream();
                SessionEvent::Interrupted(reason)
            }
            SessionPhase::Finishing | SessionPhase::Idle => {
                self.reset_stream();
                SessionEvent::Closed
            }
        }
    }

    fn finish_grace(&mut self) -> SessionEvent {
        self.connection.close();
        self.reset_stream();
        self.publish();
        SessionEvent::GraceElapsed
    }

    /// Start a new conversation: fresh chat id, greeting only, socket closed.
    pub async fn new_chat(&mut self) {
        self.connection.close();
        self.reset_stream();
        self.transcript.clear();
        self.chat_id = new_chat_id();
        self.persist_chat_id().await;
        self.transcript.push(ConversationTurn::greeting(self.language));
        info!(chat_id = %self.chat_id, "Started new chat");
        self.publish();
    }

    /// Make `tenant_id` current and start a new conversation in it.
    ///
    /// # Errors
    /// Returns [`ChatError::UnknownTenant`] if the id is not in the tenant list.
    pub async fn switch_tenant(&mut self, tenant_id: &str) -> ChatResult<()> {
        let tenant = self
            .find_tenant(tenant_id)
            .ok_or_else(|| ChatError::UnknownTenant(tenant_id.to_string()))?;

        if let Err(err) = self.settings.save_tenant_id(&tenant.id).await {
            warn!(%err, "Failed to persist tenant id");
        }
        if let Err(err) = self.settings.save_current_tenant(&tenant).await {
            warn!(%err, "Failed to persist current tenant");
        }
        info!(tenant_id = %tenant.id, "Switched tenant");
        self.tenant = tenant;
        self.new_chat().await;
        Ok(())
    }

    /// Select a model and start a new conversation with it.
    ///
    /// # Errors
    /// Returns [`ChatError::UnknownModel`] if the id is not in the model list.
    pub async fn select_model(&mut self, model_id: &str) -> ChatResult<()> {
        let model = self
            .models
            .iter()
            .find(|m| m.id == model_id)
            .cloned()
            .ok_or_else(|| ChatError::UnknownModel(model_id.to_string()))?;
        info!(model_id = %model.id, "Selected model");
        self.model = Some(model);
        self.new_chat().await;
        Ok(())
    }

    /// Flip think mode and persist it. Returns the new value.
    pub async fn toggle_think_mode(&mut self) -> bool {
        self.think_mode = !self.think_mode;
        if let Err(err) = self.settings.save_think_mode(self.think_mode).await {
            warn!(%err, "Failed to persist think mode");
        }
        self.publish();
        self.think_mode
    }

    /// Flip the session language and persist it. Returns the new value.
    ///
    /// Existing turns are left as they are.
    pub async fn toggle_language(&mut self) -> Language {
        self.language = self.language.toggled();
        if let Err(err) = self.settings.save_language(self.language).await {
            warn!(%err, "Failed to persist language");
        }
        self.publish();
        self.language
    }

    /// Replace the auth token and persist it. A blank token is forgotten.
    ///
    /// A message already submitted keeps the token it was sent with.
    pub async fn set_token(&mut self, token: &str) {
        let token = token.trim();
        self.token = (!token.is_empty()).then(|| token.to_string());
        let saved = if token.is_empty() {
            self.settings.clear_token().await
        } else {
            self.settings.save_token(token).await
        };
        if let Err(err) = saved {
            warn!(%err, "Failed to persist token");
        }
    }

    /// Forget the token and every cached setting, then start over in the
    /// personal space with default toggles.
    pub async fn logout(&mut self) {
        self.connection.close();
        self.reset_stream();
        if let Err(err) = self.settings.clear_all().await {
            warn!(%err, "Failed to clear settings");
        }
        self.token = None;
        self.tenant = Tenant::personal_space();
        self.tenants = vec![self.tenant.clone()];
        self.think_mode = false;
        self.language = Language::default();
        self.doc_ids.clear();
        info!("Logged out");
        self.new_chat().await;
    }

    /// Documents attached to subsequent requests.
    pub fn set_document_ids(&mut self, doc_ids: Vec<String>) {
        self.doc_ids = doc_ids;
    }

    /// Fetch one page (1-based) of past exchanges in the current tenant.
    ///
    /// # Errors
    /// Returns an error if the history request fails.
    pub async fn load_history_page(&self, page_num: u32) -> ChatResult<Vec<ChatHistory>> {
        self.api
            .chat_history(
                self.tenant.id.clone(),
                self.config.history_page_size,
                page_num.max(1),
            )
            .await
    }

    /// Continue a past conversation from one of its stored exchanges.
    pub async fn resume_history(&mut self, entry: &ChatHistory) {
        self.connection.close();
        self.reset_stream();
        self.chat_id.clone_from(&entry.chat_id);
        self.persist_chat_id().await;
        let (think, answer) = entry.answer();
        self.transcript = vec![
            ConversationTurn::user(entry.prompt.clone()),
            ConversationTurn::Assistant(AssistantTurn::complete(think, answer)),
        ];
        info!(chat_id = %self.chat_id, "Resumed chat from history");
        self.publish();
    }

    /// Receiver of session snapshots, updated after every change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot.subscribe()
    }

    /// Current transcript.
    #[must_use]
    pub fn transcript(&self) -> &[ConversationTurn] {
        &self.transcript
    }

    /// Current phase.
    #[must_use]
    pub const fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Whether a submitted message is still streaming.
    #[must_use]
    pub const fn is_sending(&self) -> bool {
        self.sending_in_flight
    }

    /// State of the streaming socket.
    #[must_use]
    pub const fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// The connection manager owned by this session.
    #[must_use]
    pub const fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    /// Active conversation id.
    #[must_use]
    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }

    /// Active tenant.
    #[must_use]
    pub const fn tenant(&self) -> &Tenant {
        &self.tenant
    }

    /// Tenants available for switching, personal space first.
    #[must_use]
    pub fn tenants(&self) -> &[Tenant] {
        &self.tenants
    }

    /// Models available for selection.
    #[must_use]
    pub fn models(&self) -> &[ChatModel] {
        &self.models
    }

    /// Selected model.
    #[must_use]
    pub const fn selected_model(&self) -> Option<&ChatModel> {
        self.model.as_ref()
    }

    /// Think mode flag.
    #[must_use]
    pub const fn think_mode(&self) -> bool {
        self.think_mode
    }

    /// Session language.
    #[must_use]
    pub const fn language(&self) -> Language {
        self.language
    }

    fn find_tenant(&self, tenant_id: &str) -> Option<Tenant> {
        self.tenants.iter().find(|t| t.id == tenant_id).cloned()
    }

    fn build_request(&self, prompt: &str, token: String, model_id: String) -> ChatRequest {
        ChatRequest {
            model_id,
            token,
            chat_id: self.chat_id.clone(),
            tenant_id: self.tenant.id.clone(),
            doc_ids: (!self.doc_ids.is_empty()).then(|| self.doc_ids.clone()),
            prompt: prompt.to_string(),
            system_prompt: self.config.system_prompt.clone(),
            show_think: self.think_mode,
            language: self.language,
        }
    }

    fn mark_tail_interrupted(&mut self) {
        match self.transcript.last_mut() {
            Some(ConversationTurn::Assistant(turn)) if turn.is_streaming() => {
                turn.status = TurnStatus::Interrupted;
            }
            _ => {}
        }
    }

    fn replace_tail(&mut self, status: TurnStatus) {
        match self.transcript.last_mut() {
            Some(ConversationTurn::Assistant(turn)) => {
                *turn = self.accumulator.render(turn, status);
            }
            _ => {
                let rendered = self.accumulator.render(&AssistantTurn::placeholder(), status);
                self.transcript.push(ConversationTurn::Assistant(rendered));
            }
        }
    }

    fn reset_stream(&mut self) {
        self.accumulator.reset();
        self.pending_request = None;
        self.sending_in_flight = false;
        self.grace_deadline = None;
        self.phase = SessionPhase::Idle;
    }

    async fn persist_chat_id(&self) {
        if let Err(err) = self.settings.save_chat_id(&self.chat_id).await {
            warn!(%err, "Failed to persist chat id");
        }
    }

    fn publish(&self) {
        self.snapshot.send_replace(SessionSnapshot {
            transcript: self.transcript.clone(),
            phase: self.phase,
            connection_state: self.connection.state(),
            sending_in_flight: self.sending_in_flight,
            chat_id: self.chat_id.clone(),
            tenant: self.tenant.clone(),
            model: self.model.clone(),
            think_mode: self.think_mode,
            language: self.language,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiFuture;
    use crate::chat::connection::ConnectionId;
    use crate::settings::MemorySettingsStore;

    struct StaticApi {
        fail: bool,
    }

    impl ChatApi for StaticApi {
        fn model_list(&self) -> ApiFuture<'_, ChatResult<Vec<ChatModel>>> {
            Box::pin(async move {
                if self.fail {
                    return Err(ChatError::InvalidConfig("offline".to_string()));
                }
                Ok(vec![
                    ChatModel {
                        id: "m1".to_string(),
                        model_name: "First".to_string(),
                        update_time: String::new(),
                        create_time: String::new(),
                    },
                    ChatModel {
                        id: "m2".to_string(),
                        model_name: "Second".to_string(),
                        update_time: String::new(),
                        create_time: String::new(),
                    },
                ])
            })
        }

        fn tenant_list(&self) -> ApiFuture<'_, ChatResult<Vec<Tenant>>> {
            Box::pin(async move {
                if self.fail {
                    return Err(ChatError::InvalidConfig("offline".to_string()));
                }
                let mut team = Tenant::personal_space();
                team.id = "team".to_string();
                team.name = "Team".to_string();
                team.code = "team".to_string();
                Ok(vec![team])
            })
        }

        fn chat_history(
            &self,
            tenant_id: String,
            _page_size: u32,
            page_num: u32,
        ) -> ApiFuture<'_, ChatResult<Vec<ChatHistory>>> {
            Box::pin(async move {
                Ok(vec![ChatHistory {
                    id: i64::from(page_num),
                    model_name: "First".to_string(),
                    user_id: "u".to_string(),
                    files: None,
                    chat_id: format!("{tenant_id}-old"),
                    prompt: "old question".to_string(),
                    system_prompt: String::new(),
                    content: "<think>r</think>old answer".to_string(),
                    create_time: String::new(),
                    think_content: Some("r".to_string()),
                    response_content: Some("old answer".to_string()),
                }])
            })
        }
    }

    async fn coordinator_with(fail: bool) -> (SessionCoordinator, SettingsCache) {
        let settings = SettingsCache::new(Arc::new(MemorySettingsStore::new()));
        let _ = settings.save_token("tok").await;
        let config = ChatConfig::new().with_base_url("http://127.0.0.1:1");
        let mut coordinator =
            SessionCoordinator::new(config, settings.clone(), Arc::new(StaticApi { fail }));
        let _ = coordinator.initialize().await;
        (coordinator, settings)
    }

    fn current_id(coordinator: &SessionCoordinator) -> ConnectionId {
        coordinator
            .connection()
            .current_id()
            .unwrap_or(ConnectionId(0))
    }

    fn frame(id: ConnectionId, text: &str) -> ConnectionEvent {
        ConnectionEvent::Frame {
            id,
            text: text.to_string(),
        }
    }

    #[tokio::test]
    async fn test_initialize_selects_defaults() {
        let (coordinator, _) = coordinator_with(false).await;
        assert_eq!(coordinator.selected_model().map(|m| m.id.as_str()), Some("m1"));
        assert_eq!(coordinator.tenants().len(), 2);
        assert!(coordinator.tenant().is_personal_space());
        assert_eq!(coordinator.transcript().len(), 1);
        assert_eq!(
            coordinator.transcript()[0].response_content(),
            Language::Zh.greeting()
        );
    }

    #[tokio::test]
    async fn test_initialize_degrades_when_rest_fails() {
        let (coordinator, _) = coordinator_with(true).await;
        assert!(coordinator.selected_model().is_none());
        assert_eq!(coordinator.tenants(), &[Tenant::personal_space()]);
    }

    #[tokio::test]
    async fn test_submit_rejections() {
        let (mut coordinator, _) = coordinator_with(false).await;
        assert!(matches!(coordinator.submit("   ").await, Err(ChatError::EmptyPrompt)));

        coordinator.set_token("").await;
        assert!(matches!(coordinator.submit("hi").await, Err(ChatError::NotAuthenticated)));

        let (mut offline, _) = coordinator_with(true).await;
        assert!(matches!(offline.submit("hi").await, Err(ChatError::NoModelSelected)));
        assert_eq!(offline.transcript().len(), 1);
    }

    #[tokio::test]
    async fn test_frames_fold_into_tail_turn() {
        let (mut coordinator, settings) = coordinator_with(false).await;
        assert!(coordinator.submit("question").await.is_ok());
        assert!(coordinator.is_sending());
        assert_eq!(coordinator.phase(), SessionPhase::AwaitingConnection);
        assert!(!coordinator.chat_id().is_empty());
        assert_eq!(
            settings.chat_id().await.ok().flatten().as_deref(),
            Some(coordinator.chat_id())
        );
        assert_eq!(coordinator.transcript().len(), 3);

        let id = current_id(&coordinator);
        assert_eq!(
            coordinator.handle_event(ConnectionEvent::Connected { id }),
            SessionEvent::Connected
        );
        assert_eq!(coordinator.phase(), SessionPhase::Streaming);

        assert_eq!(
            coordinator.handle_event(frame(id, "<think>foo</think>bar")),
            SessionEvent::TurnUpdated
        );
        assert_eq!(
            coordinator.handle_event(frame(id, "baz[done]")),
            SessionEvent::Completed
        );

        let tail = coordinator.transcript().last().and_then(ConversationTurn::as_assistant);
        assert_eq!(tail.and_then(|t| t.think_content.as_deref()), Some("foo"));
        assert_eq!(tail.map(|t| t.response_content.as_str()), Some("barbaz"));
        assert_eq!(tail.map(|t| t.status), Some(TurnStatus::Complete));
        assert!(!coordinator.is_sending());
        assert_eq!(coordinator.phase(), SessionPhase::Finishing);

        assert_eq!(coordinator.handle_event(frame(id, "!")), SessionEvent::TurnUpdated);
        assert_eq!(
            coordinator.transcript().last().map(ConversationTurn::response_content),
            Some("barbaz!")
        );

        assert_eq!(coordinator.finish_grace(), SessionEvent::GraceElapsed);
        assert_eq!(coordinator.phase(), SessionPhase::Idle);
        assert!(!coordinator.connection().is_open());
    }

    #[tokio::test]
    async fn test_second_submit_while_sending_is_rejected() {
        let (mut coordinator, _) = coordinator_with(false).await;
        assert!(coordinator.submit("one").await.is_ok());
        let first = coordinator.connection().current_id();
        assert!(matches!(coordinator.submit("two").await, Err(ChatError::SendInFlight)));
        assert_eq!(coordinator.connection().current_id(), first);
        assert_eq!(coordinator.connection().opened_count(), 1);
    }

    #[tokio::test]
    async fn test_submit_during_grace_replaces_socket() {
        let (mut coordinator, _) = coordinator_with(false).await;
        assert!(coordinator.submit("one").await.is_ok());
        let first = current_id(&coordinator);
        coordinator.handle_event(ConnectionEvent::Connected { id: first });
        coordinator.handle_event(frame(first, "a[completed]"));
        assert_eq!(coordinator.phase(), SessionPhase::Finishing);

        assert!(coordinator.submit("two").await.is_ok());
        let second = current_id(&coordinator);
        assert_ne!(first, second);
        assert_eq!(coordinator.connection().opened_count(), 2);
        assert_eq!(coordinator.handle_event(frame(first, "late")), SessionEvent::Ignored);
    }

    #[tokio::test]
    async fn test_abnormal_close_interrupts_turn() {
        let (mut coordinator, _) = coordinator_with(false).await;
        assert!(coordinator.submit("question").await.is_ok());
        let id = current_id(&coordinator);
        coordinator.handle_event(ConnectionEvent::Connected { id });
        coordinator.handle_event(frame(id, "partial"));

        let outcome = coordinator.handle_event(ConnectionEvent::Closed {
            id,
            reason: CloseReason::Failed("reset".to_string()),
        });
        assert!(matches!(outcome, SessionEvent::Interrupted(CloseReason::Failed(_))));

        let tail = coordinator.transcript().last().and_then(ConversationTurn::as_assistant);
        assert_eq!(tail.map(|t| t.status), Some(TurnStatus::Interrupted));
        assert_eq!(tail.map(|t| t.response_content.as_str()), Some("partial"));
        assert!(!coordinator.is_sending());
        assert_eq!(coordinator.phase(), SessionPhase::Idle);
        assert_eq!(coordinator.connection_state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_new_chat_resets_identity() {
        let (mut coordinator, settings) = coordinator_with(false).await;
        assert!(coordinator.submit("question").await.is_ok());
        let id = current_id(&coordinator);
        let before = coordinator.chat_id().to_string();

        coordinator.new_chat().await;
        assert_ne!(coordinator.chat_id(), before);
        assert_eq!(coordinator.transcript().len(), 1);
        assert!(!coordinator.connection().is_open());
        assert!(!coordinator.is_sending());
        assert_eq!(
            settings.chat_id().await.ok().flatten().as_deref(),
            Some(coordinator.chat_id())
        );
        assert_eq!(coordinator.handle_event(frame(id, "stale")), SessionEvent::Ignored);
        assert_eq!(coordinator.transcript().len(), 1);
    }

    #[tokio::test]
    async fn test_switch_tenant_during_stream() {
        let (mut coordinator, settings) = coordinator_with(false).await;
        assert!(coordinator.submit("question").await.is_ok());
        let id = current_id(&coordinator);
        coordinator.handle_event(ConnectionEvent::Connected { id });
        coordinator.handle_event(frame(id, "partial"));
        assert_eq!(coordinator.phase(), SessionPhase::Streaming);

        assert!(coordinator.switch_tenant("team").await.is_ok());
        assert_eq!(coordinator.tenant().id, "team");
        assert!(!coordinator.connection().is_open());
        assert_eq!(coordinator.phase(), SessionPhase::Idle);
        assert_eq!(coordinator.transcript().len(), 1);
        assert_eq!(settings.tenant_id().await.ok().flatten().as_deref(), Some("team"));
        assert_eq!(
            settings.current_tenant().await.ok().flatten().map(|t| t.id),
            Some("team".to_string())
        );

        assert!(matches!(
            coordinator.switch_tenant("nope").await,
            Err(ChatError::UnknownTenant(_))
        ));
    }

    #[tokio::test]
    async fn test_greeting_language_is_chosen_at_new_chat() {
        let (mut coordinator, settings) = coordinator_with(false).await;
        assert_eq!(coordinator.toggle_language().await, Language::En);
        assert_eq!(settings.language().await.ok(), Some(Language::En));
        assert_eq!(
            coordinator.transcript()[0].response_content(),
            Language::Zh.greeting()
        );

        coordinator.new_chat().await;
        assert_eq!(
            coordinator.transcript()[0].response_content(),
            Language::En.greeting()
        );
    }

    #[tokio::test]
    async fn test_think_mode_toggle_persists() {
        let (mut coordinator, settings) = coordinator_with(false).await;
        assert!(coordinator.toggle_think_mode().await);
        assert_eq!(settings.think_mode().await.ok(), Some(true));
        assert_eq!(coordinator.connection_state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_select_model_starts_new_chat() {
        let (mut coordinator, _) = coordinator_with(false).await;
        coordinator.new_chat().await;
        let before = coordinator.chat_id().to_string();
        assert!(coordinator.select_model("m2").await.is_ok());
        assert_eq!(coordinator.selected_model().map(|m| m.id.as_str()), Some("m2"));
        assert_ne!(coordinator.chat_id(), before);
        assert!(matches!(
            coordinator.select_model("zzz").await,
            Err(ChatError::UnknownModel(_))
        ));
    }

    #[tokio::test]
    async fn test_resume_history() {
        let (mut coordinator, settings) = coordinator_with(false).await;
        let page = coordinator.load_history_page(0).await.unwrap_or_default();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].id, 1);

        coordinator.resume_history(&page[0]).await;
        assert_eq!(coordinator.chat_id(), "personal_space-old");
        assert_eq!(
            settings.chat_id().await.ok().flatten().as_deref(),
            Some("personal_space-old")
        );
        let turns = coordinator.transcript();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].response_content(), "old question");
        assert_eq!(turns[1].think_content(), Some("r"));
        assert_eq!(turns[1].response_content(), "old answer");
    }

    #[tokio::test]
    async fn test_snapshot_tracks_state() {
        let (mut coordinator, _) = coordinator_with(false).await;
        let receiver = coordinator.subscribe();
        assert!(coordinator.submit("question").await.is_ok());
        let snapshot = receiver.borrow().clone();
        assert!(snapshot.sending_in_flight);
        assert_eq!(snapshot.phase, SessionPhase::AwaitingConnection);
        assert_eq!(snapshot.connection_state, ConnectionState::Connecting);
        assert_eq!(snapshot.transcript.len(), 3);
    }

    #[tokio::test]
    async fn test_request_carries_session_context() {
        let (mut coordinator, _) = coordinator_with(false).await;
        coordinator.toggle_think_mode().await;
        coordinator.set_document_ids(vec!["d1".to_string()]);
        assert!(coordinator.submit("  question  ").await.is_ok());

        let request = coordinator.pending_request.clone();
        assert_eq!(request.as_ref().map(|r| r.prompt.as_str()), Some("question"));
        assert_eq!(request.as_ref().map(|r| r.model_id.as_str()), Some("m1"));
        assert_eq!(request.as_ref().map(|r| r.tenant_id.as_str()), Some("personal_space"));
        assert_eq!(request.as_ref().map(|r| r.show_think), Some(true));
        assert_eq!(
            request.and_then(|r| r.doc_ids),
            Some(vec!["d1".to_string()])
        );
    }

    #[tokio::test]
    async fn test_token_cleared_before_connect_keeps_submitted_request() {
        let (mut coordinator, settings) = coordinator_with(false).await;
        assert!(coordinator.submit("hello").await.is_ok());
        coordinator.set_token("").await;
        assert!(settings.token().await.ok().flatten().is_none());

        let id = current_id(&coordinator);
        assert_eq!(
            coordinator.pending_request.as_ref().map(|r| r.token.as_str()),
            Some("tok")
        );
        assert_eq!(
            coordinator.handle_event(ConnectionEvent::Connected { id }),
            SessionEvent::Connected
        );
        assert!(coordinator.pending_request.is_none());
        assert_eq!(coordinator.phase(), SessionPhase::Streaming);

        assert_eq!(
            coordinator.handle_event(frame(id, "hi[completed]")),
            SessionEvent::Completed
        );
        assert!(!coordinator.is_sending());
        assert!(matches!(
            coordinator.submit("again").await,
            Err(ChatError::NotAuthenticated)
        ));
    }

    #[tokio::test]
    async fn test_connected_without_request_interrupts_turn() {
        let (mut coordinator, _) = coordinator_with(false).await;
        assert!(coordinator.submit("hello").await.is_ok());
        coordinator.pending_request = None;

        let id = current_id(&coordinator);
        assert_eq!(
            coordinator.handle_event(ConnectionEvent::Connected { id }),
            SessionEvent::Interrupted(CloseReason::Local)
        );
        let tail = coordinator.transcript().last().and_then(ConversationTurn::as_assistant);
        assert_eq!(tail.map(|t| t.status), Some(TurnStatus::Interrupted));
        assert!(!coordinator.is_sending());
        assert_eq!(coordinator.phase(), SessionPhase::Idle);
        assert!(!coordinator.connection().is_open());
        assert!(coordinator.submit("again").await.is_ok());
    }

    #[tokio::test]
    async fn test_logout_forgets_settings() {
        let (mut coordinator, settings) = coordinator_with(false).await;
        assert!(coordinator.switch_tenant("team").await.is_ok());
        coordinator.toggle_language().await;
        assert!(coordinator.submit("question").await.is_ok());

        coordinator.logout().await;
        assert!(settings.token().await.ok().flatten().is_none());
        assert!(settings.tenant_id().await.ok().flatten().is_none());
        assert_eq!(settings.language().await.ok(), Some(Language::Zh));
        assert!(coordinator.tenant().is_personal_space());
        assert_eq!(coordinator.tenants().len(), 1);
        assert!(!coordinator.connection().is_open());
        assert_eq!(coordinator.transcript().len(), 1);
        assert_eq!(
            coordinator.transcript()[0].response_content(),
            Language::Zh.greeting()
        );
        assert!(matches!(
            coordinator.submit("hi").await,
            Err(ChatError::NotAuthenticated)
        ));
    }

    #[tokio::test]
    async fn test_resume_history_splits_raw_content() {
        let (mut coordinator, _) = coordinator_with(false).await;
        let entry = ChatHistory {
            id: 7,
            model_name: "First".to_string(),
            user_id: "u".to_string(),
            files: None,
            chat_id: "raw-chat".to_string(),
            prompt: "q".to_string(),
            system_prompt: String::new(),
            content: "<think>r</think>raw".to_string(),
            create_time: String::new(),
            think_content: None,
            response_content: None,
        };

        coordinator.resume_history(&entry).await;
        let turns = coordinator.transcript();
        assert_eq!(turns[1].think_content(), Some("r"));
        assert_eq!(turns[1].response_content(), "raw");
    }
}
