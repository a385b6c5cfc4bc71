//! Tools served by the backend.

pub mod base;
pub mod github;
pub mod registry;

pub use base::Tool;
pub use github::github_tools;
pub use registry::ToolRegistry;
