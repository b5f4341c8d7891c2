//! Interactive terminal client for the player chat backend.
//!
//! Type a message to send it; lines starting with `/` are commands (`/help`).

use std::process::ExitCode;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};

use player_chat::api::ChatHistory;
use player_chat::chat::{
    AssistantTurn, ChatConfig, ConversationTurn, SessionCoordinator, SessionEvent,
};
use player_chat::start_player_chat;

const HELP: &str = "\
  /new              start a new conversation
  /think            toggle reasoning output
  /lang             toggle zh/en
  /models           list models        /model <id>   select a model
  /tenants          list tenants       /tenant <id>  switch tenant
  /history [page]   list past messages /resume <n>   continue entry n of the last page
  /docs a,b         attach document ids
  /token <token>    set the auth token
  /logout           forget the token and cached settings
  /quit             leave";

/// Prints the tail assistant turn incrementally.
#[derive(Default)]
struct Renderer {
    printed: usize,
    think_shown: bool,
}

impl Renderer {
    fn reset(&mut self) {
        self.printed = 0;
        self.think_shown = false;
    }

    /// Text to print for `event`, advancing the cursor over `turn`.
    fn advance(&mut self, turn: &AssistantTurn, event: &SessionEvent) -> String {
        let mut out = String::new();
        match event {
            SessionEvent::TurnUpdated | SessionEvent::Completed => {
                if !self.think_shown {
                    if let Some(think) = &turn.think_content {
                        out.push_str(&format!("  [think] {think}\n"));
                        self.think_shown = true;
                    }
                }
                let text: String = turn.response_content.chars().skip(self.printed).collect();
                self.printed += text.chars().count();
                out.push_str(&text);
                if *event == SessionEvent::Completed {
                    out.push('\n');
                }
            }
            SessionEvent::Interrupted(reason) => {
                out.push_str(&format!("\n  [interrupted: {reason:?}]\n"));
                self.reset();
            }
            // Grace-period frames extend the same turn, so the cursor
            // survives until the socket is gone or a new request starts.
            SessionEvent::Connected | SessionEvent::GraceElapsed | SessionEvent::Closed => {
                self.reset();
            }
            SessionEvent::Ignored => {}
        }
        out
    }

    fn render(&mut self, session: &SessionCoordinator, event: &SessionEvent) {
        let Some(turn) = session.transcript().last().and_then(ConversationTurn::as_assistant)
        else {
            return;
        };
        let out = self.advance(turn, event);
        if !out.is_empty() {
            print!("{out}");
            flush();
        }
    }
}

fn flush() {
    use std::io::Write;
    let _ = std::io::stdout().flush();
}

fn print_transcript(session: &SessionCoordinator) {
    for turn in session.transcript() {
        match turn {
            ConversationTurn::User(user) => println!("> {}", user.content),
            ConversationTurn::Assistant(assistant) => {
                if let Some(think) = &assistant.think_content {
                    println!("  [think] {think}");
                }
                println!("{}", assistant.response_content);
            }
        }
    }
}

/// Apply one command line. Returns `false` to quit.
async fn handle_command(
    session: &mut SessionCoordinator,
    line: &str,
    history: &mut Vec<ChatHistory>,
) -> Result<bool> {
    let (command, argument) = line.split_once(' ').unwrap_or((line, ""));
    let argument = argument.trim();
    match command {
        "/quit" | "/exit" => return Ok(false),
        "/help" => println!("{HELP}"),
        "/new" => {
            session.new_chat().await;
            print_transcript(session);
        }
        "/think" => println!("  think mode: {}", session.toggle_think_mode().await),
        "/lang" => println!("  language: {}", session.toggle_language().await),
        "/models" => {
            let selected = session.selected_model().map(|m| m.id.clone());
            for model in session.models() {
                let mark = if Some(&model.id) == selected.as_ref() { "*" } else { " " };
                println!("  {mark} {} ({})", model.id, model.model_name);
            }
        }
        "/model" => {
            session.select_model(argument).await?;
            print_transcript(session);
        }
        "/tenants" => {
            let current = session.tenant().id.clone();
            for tenant in session.tenants() {
                let mark = if tenant.id == current { "*" } else { " " };
                println!("  {mark} {} ({})", tenant.id, tenant.name);
            }
        }
        "/tenant" => {
            session.switch_tenant(argument).await?;
            print_transcript(session);
        }
        "/history" => {
            let page = argument.parse().unwrap_or(1);
            *history = session.load_history_page(page).await?;
            for (index, entry) in history.iter().enumerate() {
                println!("  {index}: [{}] {}", entry.create_time, entry.prompt);
            }
        }
        "/resume" => {
            let entry = argument.parse::<usize>().ok().and_then(|i| history.get(i));
            match entry {
                Some(entry) => {
                    session.resume_history(entry).await;
                    print_transcript(session);
                }
                None => println!("  no such history entry, run /history first"),
            }
        }
        "/docs" => {
            let ids = argument
                .split(',')
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(str::to_string)
                .collect();
            session.set_document_ids(ids);
        }
        "/token" => session.set_token(argument).await,
        "/logout" => {
            session.logout().await;
            history.clear();
            print_transcript(session);
        }
        other => println!("  unknown command {other}, try /help"),
    }
    Ok(true)
}

async fn run_cli(config: ChatConfig) -> Result<()> {
    let mut session = start_player_chat::connect_session(config).await?;
    let mut renderer = Renderer::default();
    let mut history = Vec::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    print_transcript(&session);

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if line.starts_with('/') {
                    match handle_command(&mut session, line, &mut history).await {
                        Ok(true) => {}
                        Ok(false) => break,
                        Err(err) => println!("  error: {err}"),
                    }
                } else if let Err(err) = session.submit(line).await {
                    println!("  error: {err}");
                }
            }
            Some(event) = session.next_event() => renderer.render(&session, &event),
        }
    }

    Ok(())
}

fn main() -> ExitCode {
    start_player_chat::init_tracing();

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create runtime: {e}");
            return ExitCode::from(1);
        }
    };

    match rt.block_on(run_cli(ChatConfig::from_env())) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("player-chat: {e}");
            ExitCode::from(1)
        }
    }
}
