//! `toolwire-github`: serves the GitHub tools on stdin/stdout.
//!
//! stdout carries protocol frames only; every log line goes to stderr.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use toolwire_core::config::load_config;
use toolwire_server::{github_tools, GitHubService, ToolRegistry, ToolServer};

/// Name reported in the `initialize` reply.
const SERVER_NAME: &str = "toolwire-github";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    // Optional config path as the sole argument.
    let config_path = std::env::args_os().nth(1).map(PathBuf::from);
    let config = load_config(config_path.as_deref());

    let service = Arc::new(GitHubService::new(&config.github));
    let mut registry = ToolRegistry::new();
    for tool in github_tools(service) {
        registry.register(tool);
    }

    info!(
        api_base = %config.github.api_base,
        authenticated = !config.github.token.is_empty(),
        "starting GitHub tool backend"
    );

    ToolServer::new(SERVER_NAME, registry)
        .serve(tokio::io::stdin(), tokio::io::stdout())
        .await
}

fn init_logging() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("toolwire=info,warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_ansi(false)
        .compact()
        .init();
}
