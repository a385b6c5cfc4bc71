//! Toolwire GitHub backend: a stdio JSON-RPC server exposing GitHub
//! repository statistics as tools.
//!
//! - [`github`]: REST client for the GitHub API
//! - [`tools`]: the `Tool` trait, registry and the GitHub tools
//! - [`server`]: line-delimited JSON-RPC loop over any reader/writer pair

pub mod github;
pub mod server;
pub mod tools;

pub use github::{GitHubService, Repository};
pub use server::ToolServer;
pub use tools::{github_tools, Tool, ToolRegistry};
