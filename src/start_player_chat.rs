//! Startup helpers for the player chat binaries.

use std::process::ExitCode;
use std::sync::Arc;

use crate::api::HttpChatApi;
use crate::chat::config::ChatConfig;
use crate::chat::coordinator::SessionCoordinator;
use crate::chat::error::ChatResult;
use crate::server::{self, MockServerConfig, MockState};
use crate::settings::{SettingsCache, SqliteSettingsStore};

/// Install the global `tracing` subscriber (`RUST_LOG` plus `INFO`).
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// Run the mock backend (used by the `player-chat-mock-server` binary).
///
/// # Returns
/// `ExitCode::SUCCESS` on graceful shutdown, `1` on failure.
#[must_use]
pub fn run_mock_server() -> ExitCode {
    init_tracing();
    tracing::info!("Starting player chat mock backend v{}", env!("CARGO_PKG_VERSION"));

    let config = MockServerConfig::from_env();
    let state = MockState::new(config);

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("Failed to create runtime: {e}");
            return ExitCode::from(1);
        }
    };

    if let Err(e) = rt.block_on(server::run_server(state)) {
        tracing::error!("Server error: {e}");
        return ExitCode::from(1);
    }

    ExitCode::SUCCESS
}

/// Build and initialize a session from environment config.
///
/// Settings live in the `SQLite` file named by the config.
///
/// # Errors
/// Returns an error if the config is invalid or the settings cannot be opened.
pub async fn connect_session(config: ChatConfig) -> ChatResult<SessionCoordinator> {
    config.validate()?;
    tracing::info!(
        base_url = %config.base_url,
        settings = %config.settings_path.display(),
        "Opening chat session"
    );

    let store = SqliteSettingsStore::open(&config.settings_path).await?;
    let settings = SettingsCache::new(Arc::new(store));
    let api = HttpChatApi::new(&config, settings.clone())?;

    let mut session = SessionCoordinator::new(config, settings, Arc::new(api));
    session.initialize().await?;
    Ok(session)
}
