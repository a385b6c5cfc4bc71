//! Toolwire Core: types shared by every other crate.
//!
//! - [`types`]: chat messages and tool definitions (OpenAI format)
//! - [`protocol`]: JSON-RPC frames exchanged with the tool backend
//! - [`capability`]: tool descriptors and invocation results
//! - [`config`]: configuration schema and loader

pub mod capability;
pub mod config;
pub mod protocol;
pub mod types;
pub mod utils;

pub use capability::{CapabilityDescriptor, ContentBlock, InvocationResult};
pub use protocol::{Frame, FrameKind, RequestId, RpcError};
