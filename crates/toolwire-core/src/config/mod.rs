//! Configuration system: schema, loading, and env var overrides.
//!
//! # Usage
//! ```no_run
//! use toolwire_core::config;
//!
//! let cfg = config::load_config(None);
//! println!("Backend: {} {:?}", cfg.server.command, cfg.server.args);
//! ```

pub mod loader;
pub mod schema;

pub use loader::{get_config_path, load_config, save_config};
pub use schema::{AgentConfig, Config, GitHubConfig, ProviderConfig, ServerConfig};
