//! Toolwire CLI: entry point.
//!
//! # Commands
//!
//! - `toolwire chat [-m MESSAGE]`: chat with the model and the tool backend
//!   (single-shot or REPL)
//! - `toolwire tools`: list the capabilities the backend exposes
//! - `toolwire init`: write a default config file

mod helpers;
mod init;
mod repl;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use toolwire_agent::{AgentError, LoopControl, ResponseLoop};
use toolwire_client::Session;
use toolwire_core::config::{load_config, Config};
use toolwire_providers::create_provider;

// ─────────────────────────────────────────────
// CLI definition
// ─────────────────────────────────────────────

/// 🔧 Toolwire: chat with an LLM that calls tools over stdio
#[derive(Parser)]
#[command(name = "toolwire", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with the assistant (single-shot or interactive REPL)
    Chat {
        /// Single message (non-interactive). Omit for REPL mode.
        #[arg(short, long)]
        message: Option<String>,

        /// Enable debug logging
        #[arg(long, default_value_t = false)]
        logs: bool,

        /// Config file (defaults to ~/.toolwire/config.json)
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Start the tool backend and list its capabilities
    Tools {
        /// Enable debug logging
        #[arg(long, default_value_t = false)]
        logs: bool,

        /// Config file (defaults to ~/.toolwire/config.json)
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Write a default configuration file
    Init {
        /// Config file (defaults to ~/.toolwire/config.json)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long, default_value_t = false)]
        force: bool,
    },
}

// ─────────────────────────────────────────────
// Entrypoint
// ─────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Chat {
            message,
            logs,
            config,
        } => {
            init_logging(logs);
            run_chat(message, config.as_deref()).await
        }
        Commands::Tools { logs, config } => {
            init_logging(logs);
            run_tools(config.as_deref()).await
        }
        Commands::Init { config, force } => init::run(config.as_deref(), force),
    }
}

// ─────────────────────────────────────────────
// Chat command
// ─────────────────────────────────────────────

async fn run_chat(message: Option<String>, config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path);
    let session = connect(&config).await?;

    let outcome = match build_response_loop(&config, &session) {
        Ok(agent) => match message {
            Some(msg) => run_single(&agent, &msg).await,
            None => repl::run(&agent, &session).await,
        },
        Err(e) => Err(e),
    };

    session.shutdown().await;
    outcome
}

/// Answer one message and return.
async fn run_single(agent: &ResponseLoop, message: &str) -> Result<()> {
    info!("processing single message");
    let mut printer = helpers::StreamPrinter::new();
    printer.thinking();
    let control = agent.handle_input(message, &mut printer).await;
    printer.finish();

    match control.map_err(describe_turn_error)? {
        LoopControl::Answered(_) => {}
        LoopControl::Reprompt => helpers::print_notice("Nothing to send."),
        LoopControl::Exit => {}
    }
    Ok(())
}

/// Spawn the backend and complete the handshake.
async fn connect(config: &Config) -> Result<Session> {
    Session::connect(&config.server).await.with_context(|| {
        format!(
            "failed to start tool backend '{}' ({})",
            config.server.name, config.server.command
        )
    })
}

/// Build a `ResponseLoop` from the loaded configuration and a live session.
fn build_response_loop(config: &Config, session: &Session) -> Result<ResponseLoop> {
    let provider = create_provider(&config.agent.model, &config.providers.to_map())
        .map_err(|e| anyhow::anyhow!(e))?;

    Ok(ResponseLoop::new(
        Arc::new(provider),
        session.bridge(),
        &config.agent,
    ))
}

fn describe_turn_error(e: AgentError) -> anyhow::Error {
    match e {
        AgentError::Transport(t) => anyhow::Error::new(t).context("tool backend failed"),
        other => anyhow::Error::new(other),
    }
}

// ─────────────────────────────────────────────
// Tools command
// ─────────────────────────────────────────────

async fn run_tools(config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path);
    let session = connect(&config).await?;

    helpers::print_server(session.server_info(), session.capabilities().len());
    for descriptor in session.capabilities().descriptors() {
        helpers::print_capability(descriptor);
    }

    session.shutdown().await;
    Ok(())
}

/// Initialize tracing on stderr; stdout is reserved for the conversation.
fn init_logging(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) if verbose => EnvFilter::new("toolwire=debug,info"),
        Err(_) => EnvFilter::new("warn"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_chat_with_message() {
        let cli = Cli::try_parse_from(["toolwire", "chat", "-m", "hello", "--logs"]).unwrap();
        match cli.command {
            Commands::Chat {
                message,
                logs,
                config,
            } => {
                assert_eq!(message.as_deref(), Some("hello"));
                assert!(logs);
                assert!(config.is_none());
            }
            _ => panic!("expected chat command"),
        }
    }

    #[test]
    fn parse_tools_with_config() {
        let cli = Cli::try_parse_from(["toolwire", "tools", "--config", "/tmp/tw.json"]).unwrap();
        match cli.command {
            Commands::Tools { config, .. } => {
                assert_eq!(config, Some(PathBuf::from("/tmp/tw.json")));
            }
            _ => panic!("expected tools command"),
        }
    }

    #[test]
    fn describe_transport_error() {
        let err = describe_turn_error(AgentError::Transport(
            toolwire_client::TransportError::Closed,
        ));
        assert!(err.to_string().contains("tool backend failed"));
    }
}
