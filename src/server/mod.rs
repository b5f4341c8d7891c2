//! Development backend emulating the chat service.
//!
//! Provides:
//! - the model list, tenant list and chat history REST endpoints
//! - the streaming chat socket, answering each request in chunks followed by
//!   the completion marker

pub mod routes;
pub mod state;

pub use routes::create_router;
pub use state::{DEFAULT_PORT, MockServerConfig, MockState};

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Error returned by the server entry points.
pub type ServerError = Box<dyn std::error::Error + Send + Sync>;

fn app(state: Arc<MockState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    create_router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Start the backend on `state.config.port`.
///
/// # Errors
/// Returns an error if the server fails to start.
pub async fn run_server(state: Arc<MockState>) -> Result<(), ServerError> {
    run_server_with_shutdown(state, std::future::pending()).await
}

/// Start the backend with graceful shutdown support.
///
/// The server stops accepting new connections when `shutdown_signal` completes.
///
/// # Errors
/// Returns an error if the server fails to start.
pub async fn run_server_with_shutdown<F>(
    state: Arc<MockState>,
    shutdown_signal: F,
) -> Result<(), ServerError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = SocketAddr::from(([0, 0, 0, 0], state.config.port));
    tracing::info!("Player chat mock backend listening on http://{}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    Ok(())
}

/// Serve on an already bound listener until the task is dropped.
///
/// # Errors
/// Returns an error if accepting connections fails.
pub async fn serve(listener: TcpListener, state: Arc<MockState>) -> Result<(), ServerError> {
    axum::serve(listener, app(state)).await?;
    Ok(())
}
