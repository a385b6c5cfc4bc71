//! Interactive REPL.
//!
//! Uses `rustyline` for readline-style editing with persistent history.

use std::path::Path;

use anyhow::Result;
use rustyline::config::Configurer;
use rustyline::error::ReadlineError;
use rustyline::history::{DefaultHistory, History};
use rustyline::{DefaultEditor, Editor};
use tracing::debug;

use toolwire_agent::{AgentError, LoopControl, ResponseLoop};
use toolwire_client::Session;
use toolwire_core::utils::get_history_path;

use crate::helpers::{self, StreamPrinter};

/// Run the interactive REPL loop until the user leaves or the backend dies.
pub async fn run(agent: &ResponseLoop, session: &Session) -> Result<()> {
    helpers::print_banner(
        session.server_info(),
        session.capabilities().len(),
        agent.model(),
    );

    let mut editor = create_editor()?;
    let mut printer = StreamPrinter::new();

    loop {
        let input = match editor.readline("You: ") {
            Ok(line) => line,
            // Ctrl-C / Ctrl-D: exit cleanly
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => {
                helpers::print_error(&format!("input error: {e}"));
                break;
            }
        };

        remember(editor.history_mut(), &input);

        debug!(input = input.trim(), "processing input");
        printer.thinking();
        let control = agent.handle_input(&input, &mut printer).await;

        match control {
            Ok(LoopControl::Reprompt) => printer.clear_thinking(),
            Ok(LoopControl::Exit) => {
                printer.clear_thinking();
                println!("\nGoodbye! 👋");
                break;
            }
            Ok(LoopControl::Answered(_)) => printer.finish(),
            Err(e) => {
                printer.finish();
                helpers::print_error(&e.to_string());
                if backend_lost(&e, session) {
                    helpers::print_notice("The tool backend is gone; ending the session.");
                    break;
                }
            }
        }
    }

    save_history(&mut editor);
    Ok(())
}

/// A closed transport cannot serve another turn.
fn backend_lost(error: &AgentError, session: &Session) -> bool {
    matches!(error, AgentError::Transport(_)) && session.transport().is_closed()
}

/// Create a rustyline editor with history.
fn create_editor() -> Result<Editor<(), DefaultHistory>> {
    let mut editor = DefaultEditor::new()?;
    editor.set_max_history_size(1000)?;

    let history_path = get_history_path();
    if history_path.exists() {
        load_history(editor.history_mut(), &history_path);
    }

    Ok(editor)
}

fn load_history(history: &mut DefaultHistory, path: &Path) -> bool {
    match history.load(path) {
        Ok(()) => {
            debug!("loaded REPL history from {}", path.display());
            true
        }
        Err(e) => {
            debug!("failed to load history from {}: {e}", path.display());
            false
        }
    }
}

/// Record a non-blank input line.
fn remember(history: &mut DefaultHistory, input: &str) {
    if input.trim().is_empty() {
        return;
    }
    if let Err(e) = history.add(input) {
        debug!("failed to record history entry: {e}");
    }
}

fn save_history(editor: &mut Editor<(), DefaultHistory>) {
    let path = get_history_path();
    if let Some(parent) = path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            debug!("failed to create {}: {e}", parent.display());
        }
    }
    if let Err(e) = editor.save_history(&path) {
        debug!("failed to save history: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_input_is_not_remembered() {
        let mut history = DefaultHistory::new();
        remember(&mut history, "");
        remember(&mut history, "   ");
        assert_eq!(history.len(), 0);

        remember(&mut history, "how many stars does tokio have?");
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn history_survives_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cli_history");

        let mut history = DefaultHistory::new();
        remember(&mut history, "summarize octocat");
        history.save(&path).unwrap();

        let mut restored = DefaultHistory::new();
        assert!(load_history(&mut restored, &path));
        assert_eq!(restored.len(), 1);
    }

    #[test]
    fn unreadable_history_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let mut history = DefaultHistory::new();
        assert!(!load_history(&mut history, dir.path()));
        assert!(!load_history(&mut history, &dir.path().join("missing")));
    }
}
