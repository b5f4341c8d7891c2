//! HTTP and WebSocket handlers of the development backend.

use std::sync::Arc;

use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::api::client::{CHAT_HISTORY_PATH, MODEL_LIST_PATH, TENANT_LIST_PATH};
use crate::api::models::ApiResponse;
use crate::chat::config::SOCKET_PATH;
use crate::chat::protocol::{THINK_END, THINK_START};
use crate::chat::types::{ChatRequest, Language};

use super::state::MockState;

/// Frame that ends every streamed answer.
pub const COMPLETION_FRAME: &str = "[completed]";

/// Create the backend router with all routes.
pub fn create_router(state: Arc<MockState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route(MODEL_LIST_PATH, get(model_list))
        .route(TENANT_LIST_PATH, get(tenant_list))
        .route(CHAT_HISTORY_PATH, get(chat_history))
        .route(SOCKET_PATH, get(chat_socket))
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "player-chat-mock",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .is_some_and(|token| !token.trim().is_empty())
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(ApiResponse::<()>::failure("UNAUTHORIZED", "token missing")),
    )
        .into_response()
}

async fn model_list(headers: HeaderMap) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    Json(ApiResponse::success(MockState::models())).into_response()
}

async fn tenant_list(headers: HeaderMap) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    Json(ApiResponse::success(MockState::tenants())).into_response()
}

/// Query of the history endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryParams {
    /// Tenant to list.
    pub tenant_id: String,
    /// Entries per page.
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// 1-based page number.
    #[serde(default = "default_page_num")]
    pub page_num: usize,
}

const fn default_page_size() -> usize {
    20
}

const fn default_page_num() -> usize {
    1
}

async fn chat_history(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Query(params): Query<HistoryParams>,
) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    let (page, total) = state
        .history_page(&params.tenant_id, params.page_size, params.page_num)
        .await;
    let mut envelope = ApiResponse::success(page);
    envelope.total = i64::try_from(total).ok();
    Json(envelope).into_response()
}

/// Query of the chat socket endpoint.
#[derive(Debug, Deserialize)]
pub struct SocketParams {
    /// Auth token.
    pub token: Option<String>,
}

async fn chat_socket(
    State(state): State<Arc<MockState>>,
    Query(params): Query<SocketParams>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    if params.token.as_deref().is_none_or(|t| t.trim().is_empty()) {
        return (StatusCode::UNAUTHORIZED, "token missing").into_response();
    }
    match ws {
        Ok(ws) => ws.on_upgrade(move |socket| handle_socket(socket, state)),
        Err(rejection) => rejection.into_response(),
    }
}

async fn handle_socket(mut socket: WebSocket, state: Arc<MockState>) {
    state.socket_opened();
    info!(active = state.active_sockets(), "Chat socket accepted");

    while let Some(Ok(message)) = socket.recv().await {
        match message {
            Message::Text(text) => match serde_json::from_str::<ChatRequest>(text.as_str()) {
                Ok(request) => {
                    if stream_answer(&mut socket, &state, request).await.is_err() {
                        break;
                    }
                }
                Err(err) => warn!(%err, "Ignoring malformed chat request"),
            },
            Message::Close(_) => break,
            _ => {}
        }
    }

    state.socket_closed();
    info!(active = state.active_sockets(), "Chat socket finished");
}

/// Reasoning text streamed for `prompt` when think mode is on.
#[must_use]
pub fn think_text(prompt: &str, language: Language) -> String {
    match language {
        Language::Zh => format!("用户问的是：{prompt}"),
        Language::En => format!("The user asked: {prompt}"),
    }
}

/// Answer text streamed for `prompt`.
#[must_use]
pub fn answer_text(prompt: &str, language: Language) -> String {
    match language {
        Language::Zh => format!("收到你的问题：{prompt}"),
        Language::En => format!("You asked: {prompt}"),
    }
}

/// Stream one answer; `Err` means the socket must be dropped.
async fn stream_answer(
    socket: &mut WebSocket,
    state: &MockState,
    request: ChatRequest,
) -> Result<(), axum::Error> {
    debug!(chat_id = %request.chat_id, tenant_id = %request.tenant_id, "Chat request received");
    state.record_request(request.clone()).await;

    let think = request
        .show_think
        .then(|| think_text(&request.prompt, request.language));
    let answer = answer_text(&request.prompt, request.language);

    if let Some(think) = &think {
        socket
            .send(Message::Text(format!("{THINK_START}{think}{THINK_END}").into()))
            .await?;
    }

    let chars: Vec<char> = answer.chars().collect();
    for (index, chunk) in chars.chunks(state.config.chunk_chars.max(1)).enumerate() {
        if state.config.interrupt_after.is_some_and(|limit| index >= limit) {
            warn!(chat_id = %request.chat_id, "Dropping socket mid-answer");
            return Err(axum::Error::new("interrupted"));
        }
        tokio::time::sleep(state.config.chunk_delay).await;
        let text: String = chunk.iter().collect();
        socket.send(Message::Text(text.into())).await?;
    }

    socket.send(Message::Text(COMPLETION_FRAME.into())).await?;
    state.record_exchange(&request, think, &answer).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;

    use super::*;
    use crate::api::models::{ChatHistory, ChatModel, Tenant};
    use crate::server::state::MockServerConfig;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use tower::ServiceExt;

    fn router() -> Router {
        create_router(MockState::new(MockServerConfig::default()))
    }

    fn get_request(uri: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Body::empty()).unwrap_or_default()
    }

    async fn body_json<T: serde::de::DeserializeOwned>(
        response: Result<Response, Infallible>,
    ) -> Option<T> {
        let body = response.ok()?.into_body();
        let bytes = to_bytes(body, usize::MAX).await.ok()?;
        serde_json::from_slice(&bytes).ok()
    }

    #[tokio::test]
    async fn test_health() {
        let response = router().oneshot(get_request("/health", None)).await;
        assert_eq!(response.map(|r| r.status()).ok(), Some(StatusCode::OK));
    }

    #[tokio::test]
    async fn test_model_list_requires_token() {
        let response = router().oneshot(get_request(MODEL_LIST_PATH, None)).await;
        assert_eq!(response.map(|r| r.status()).ok(), Some(StatusCode::UNAUTHORIZED));
    }

    #[tokio::test]
    async fn test_model_and_tenant_lists() {
        let response = router().oneshot(get_request(MODEL_LIST_PATH, Some("t"))).await;
        let models: Option<ApiResponse<Vec<ChatModel>>> = body_json(response).await;
        assert_eq!(models.and_then(|m| m.data).map(|d| d.len()), Some(2));

        let listed = router().oneshot(get_request(TENANT_LIST_PATH, Some("t"))).await;
        let tenants: Option<ApiResponse<Vec<Tenant>>> = body_json(listed).await;
        let ids: Vec<String> = tenants
            .and_then(|t| t.data)
            .unwrap_or_default()
            .into_iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(ids, vec!["demo".to_string()]);
    }

    #[tokio::test]
    async fn test_history_pages_by_tenant() {
        let state = MockState::new(MockServerConfig::default());
        for (prompt, tenant) in [("a", "demo"), ("b", "demo"), ("x", "other"), ("c", "demo")] {
            let request = ChatRequest {
                model_id: "m".to_string(),
                token: "t".to_string(),
                chat_id: "c1".to_string(),
                tenant_id: tenant.to_string(),
                doc_ids: None,
                prompt: prompt.to_string(),
                system_prompt: String::new(),
                show_think: false,
                language: Language::En,
            };
            state.record_exchange(&request, None, prompt).await;
        }

        let uri = format!("{CHAT_HISTORY_PATH}?tenantId=demo&pageSize=2&pageNum=2");
        let response = create_router(state).oneshot(get_request(&uri, Some("t"))).await;
        let page: Option<ApiResponse<Vec<ChatHistory>>> = body_json(response).await;
        assert_eq!(page.as_ref().and_then(|p| p.total), Some(3));
        let prompts: Vec<String> = page
            .and_then(|p| p.data)
            .unwrap_or_default()
            .into_iter()
            .map(|h| h.prompt)
            .collect();
        assert_eq!(prompts, vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn test_socket_without_token_is_rejected() {
        let response = router().oneshot(get_request(SOCKET_PATH, None)).await;
        assert_eq!(response.map(|r| r.status()).ok(), Some(StatusCode::UNAUTHORIZED));
    }

    #[test]
    fn test_answer_text_follows_language() {
        assert_eq!(answer_text("hi", Language::En), "You asked: hi");
        assert!(think_text("hi", Language::Zh).contains("hi"));
    }
}
