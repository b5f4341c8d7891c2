//! Mock chat backend for local development.
//! Run with: cargo run --bin player-chat-mock-server

use std::process::ExitCode;

use player_chat::start_player_chat;

fn main() -> ExitCode {
    start_player_chat::run_mock_server()
}
