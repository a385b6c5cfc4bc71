//! Config loader: reads `~/.toolwire/config.json` and merges env vars.
//!
//! # Loading precedence
//! 1. Defaults (from `Config::default()`)
//! 2. JSON file at `~/.toolwire/config.json`
//! 3. Conventional credential variables (`ANTHROPIC_API_KEY`, `GITHUB_PAT`, …),
//!    only filling values that are still empty
//! 4. Environment variables `TOOLWIRE_<SECTION>__<FIELD>` (override everything)

use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::schema::{Config, ProviderConfig};

/// Default config file path.
pub fn get_config_path() -> PathBuf {
    crate::utils::get_data_path().join("config.json")
}

/// Load configuration from `path` (or the default path) + env vars.
///
/// Falls back to `Config::default()` if the file doesn't exist or can't be parsed.
pub fn load_config(path: Option<&Path>) -> Config {
    let config_path = path.map(PathBuf::from).unwrap_or_else(get_config_path);
    let config = load_config_from_path(&config_path);
    apply_env_overrides(apply_credential_env(config))
}

/// Load config from a specific file path, without env processing.
fn load_config_from_path(path: &Path) -> Config {
    if !path.exists() {
        info!("No config file found at {}, using defaults", path.display());
        return Config::default();
    }

    debug!("Loading config from {}", path.display());

    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to read config file {}: {}", path.display(), e);
            return Config::default();
        }
    };

    match serde_json::from_str(&content) {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to parse config {}: {}", path.display(), e);
            Config::default()
        }
    }
}

/// Save configuration to disk (pretty-printed JSON with camelCase keys).
pub fn save_config(config: &Config, path: Option<&Path>) -> std::io::Result<()> {
    let config_path = path.map(PathBuf::from).unwrap_or_else(get_config_path);

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_string_pretty(config).map_err(std::io::Error::other)?;

    std::fs::write(&config_path, json)?;
    debug!("Config saved to {}", config_path.display());
    Ok(())
}

/// Fill empty credentials from the variables other tools already use.
fn apply_credential_env(mut config: Config) -> Config {
    fill_key(&mut config.providers.anthropic, "ANTHROPIC_API_KEY");
    fill_key(&mut config.providers.openai, "OPENAI_API_KEY");
    fill_key(&mut config.providers.openrouter, "OPENROUTER_API_KEY");
    fill_key(&mut config.providers.deepseek, "DEEPSEEK_API_KEY");
    fill_key(&mut config.providers.groq, "GROQ_API_KEY");
    fill_key(&mut config.providers.vllm, "HOSTED_VLLM_API_KEY");

    if config.github.token.is_empty() {
        if let Ok(token) = std::env::var("GITHUB_PAT") {
            config.github.token = token;
        }
    }

    config
}

fn fill_key(provider: &mut ProviderConfig, var: &str) {
    if provider.api_key.is_empty() {
        if let Ok(val) = std::env::var(var) {
            provider.api_key = val;
        }
    }
}

/// Apply environment variable overrides on top of a loaded config.
///
/// Env var format: `TOOLWIRE_<SECTION>__<FIELD>` (double underscore as delimiter).
///
/// Supported overrides:
/// - `TOOLWIRE_AGENT__MODEL`, `__MAX_TOKENS`, `__TEMPERATURE`,
///   `__MAX_TOOL_ITERATIONS`, `__HISTORY_LIMIT`
/// - `TOOLWIRE_PROVIDERS__<NAME>__API_KEY` / `__API_BASE`
/// - `TOOLWIRE_SERVER__COMMAND`, `__ARGS` (whitespace separated),
///   `__REQUEST_TIMEOUT_SECS`
/// - `TOOLWIRE_GITHUB__API_BASE`, `__TOKEN`
fn apply_env_overrides(mut config: Config) -> Config {
    if let Ok(val) = std::env::var("TOOLWIRE_AGENT__MODEL") {
        config.agent.model = val;
    }
    if let Some(n) = env_parse("TOOLWIRE_AGENT__MAX_TOKENS") {
        config.agent.max_tokens = n;
    }
    if let Some(t) = env_parse("TOOLWIRE_AGENT__TEMPERATURE") {
        config.agent.temperature = t;
    }
    if let Some(n) = env_parse("TOOLWIRE_AGENT__MAX_TOOL_ITERATIONS") {
        config.agent.max_tool_iterations = n;
    }
    if let Some(n) = env_parse("TOOLWIRE_AGENT__HISTORY_LIMIT") {
        config.agent.history_limit = n;
    }

    apply_provider_env(&mut config.providers.anthropic, "ANTHROPIC");
    apply_provider_env(&mut config.providers.openai, "OPENAI");
    apply_provider_env(&mut config.providers.openrouter, "OPENROUTER");
    apply_provider_env(&mut config.providers.deepseek, "DEEPSEEK");
    apply_provider_env(&mut config.providers.groq, "GROQ");
    apply_provider_env(&mut config.providers.vllm, "VLLM");

    if let Ok(val) = std::env::var("TOOLWIRE_SERVER__COMMAND") {
        config.server.command = val;
    }
    if let Ok(val) = std::env::var("TOOLWIRE_SERVER__ARGS") {
        config.server.args = val.split_whitespace().map(String::from).collect();
    }
    if let Some(n) = env_parse("TOOLWIRE_SERVER__REQUEST_TIMEOUT_SECS") {
        config.server.request_timeout_secs = n;
    }

    if let Ok(val) = std::env::var("TOOLWIRE_GITHUB__API_BASE") {
        config.github.api_base = val;
    }
    if let Ok(val) = std::env::var("TOOLWIRE_GITHUB__TOKEN") {
        config.github.token = val;
    }

    config
}

fn env_parse<T: std::str::FromStr>(var: &str) -> Option<T> {
    let val = std::env::var(var).ok()?;
    match val.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(var = var, value = %val, "ignoring unparsable env override");
            None
        }
    }
}

/// Apply env var overrides for a single provider.
fn apply_provider_env(provider: &mut ProviderConfig, name: &str) {
    if let Ok(val) = std::env::var(format!("TOOLWIRE_PROVIDERS__{name}__API_KEY")) {
        provider.api_key = val;
    }
    if let Ok(val) = std::env::var(format!("TOOLWIRE_PROVIDERS__{name}__API_BASE")) {
        provider.api_base = Some(val);
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
