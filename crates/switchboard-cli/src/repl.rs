//! Interactive REPL.
//!
//! Uses `rustyline` for readline-style editing with persistent history. The
//! conversation is kept in memory and sent in full on every turn.

use anyhow::Result;
use rustyline::config::Configurer;
use rustyline::history::DefaultHistory;
use rustyline::{DefaultEditor, Editor};
use tracing::debug;

use switchboard_core::types::Message;
use switchboard_providers::{ChatOptions, Router};

use crate::helpers;

/// Exit commands (case-insensitive match).
const EXIT_COMMANDS: &[&str] = &["exit", "quit", "/exit", "/quit", ":q"];

/// Clears the conversation but keeps the system prompt.
const RESET_COMMAND: &str = "/reset";

/// Run the interactive REPL loop.
pub async fn run(router: &Router, system: Option<&str>, options: ChatOptions) -> Result<()> {
    helpers::print_banner();

    let mut editor = create_editor()?;
    let mut conversation = Conversation::new(system);

    loop {
        let input = match editor.readline("You: ") {
            Ok(line) => line,
            Err(rustyline::error::ReadlineError::Interrupted) => break,
            Err(rustyline::error::ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("Input error: {e}");
                break;
            }
        };

        let trimmed = input.trim();
        if trimmed.is_empty() {
            continue;
        }

        if is_exit_command(trimmed) {
            println!("\nGoodbye!");
            break;
        }

        let _ = editor.add_history_entry(&input);

        if trimmed.eq_ignore_ascii_case(RESET_COMMAND) {
            conversation.reset();
            println!("{}", helpers::dim("conversation cleared"));
            continue;
        }

        debug!(turns = conversation.turns(), input = trimmed, "sending turn");
        helpers::print_thinking();

        let messages = conversation.with_user(trimmed);
        match router.chat(messages, options.clone()).await {
            Ok(response) => {
                helpers::clear_thinking();
                conversation.commit(trimmed, &response.content);
                helpers::print_response(&response);
            }
            Err(e) => {
                // The turn is not recorded; a queued request is replayed on its own.
                helpers::clear_thinking();
                helpers::print_router_error(&e);
            }
        }
    }

    save_history(&mut editor);

    Ok(())
}

// ─────────────────────────────────────────────
// Conversation buffer
// ─────────────────────────────────────────────

#[derive(Debug, Default)]
struct Conversation {
    system: Option<String>,
    history: Vec<Message>,
}

impl Conversation {
    fn new(system: Option<&str>) -> Self {
        Self {
            system: system.map(String::from),
            history: Vec::new(),
        }
    }

    /// Full message list for the next request, ending with `input`.
    fn with_user(&self, input: &str) -> Vec<Message> {
        let mut messages = Vec::with_capacity(self.history.len() + 2);
        if let Some(ref system) = self.system {
            messages.push(Message::system(system.as_str()));
        }
        messages.extend(self.history.iter().cloned());
        messages.push(Message::user(input));
        messages
    }

    fn commit(&mut self, input: &str, reply: &str) {
        self.history.push(Message::user(input));
        self.history.push(Message::assistant(reply));
    }

    fn reset(&mut self) {
        self.history.clear();
    }

    fn turns(&self) -> usize {
        self.history.len() / 2
    }
}

// ─────────────────────────────────────────────
// Editor + history
// ─────────────────────────────────────────────

/// Create a rustyline editor with history.
fn create_editor() -> Result<Editor<(), DefaultHistory>> {
    let mut editor = DefaultEditor::new()?;
    editor.set_max_history_size(1000)?;

    let history_path = history_path();
    if history_path.exists() {
        let _ = editor.load_history(&history_path);
        debug!("loaded REPL history from {}", history_path.display());
    }

    Ok(editor)
}

fn save_history(editor: &mut Editor<(), DefaultHistory>) {
    let path = history_path();
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    if let Err(e) = editor.save_history(&path) {
        debug!("failed to save history: {e}");
    }
}

/// `~/.switchboard/history/cli_history`
fn history_path() -> std::path::PathBuf {
    switchboard_core::utils::get_data_path()
        .join("history")
        .join("cli_history")
}

fn is_exit_command(input: &str) -> bool {
    let lower = input.to_lowercase();
    EXIT_COMMANDS.contains(&lower.as_str())
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
