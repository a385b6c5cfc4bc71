//! Toolwire Client: talks to a tool backend over its stdio.
//!
//! - [`transport`]: framed, correlated JSON-RPC channel to a subordinate process
//! - [`registry`]: capabilities discovered via `tools/list`
//! - [`bridge`]: invocation of discovered capabilities
//! - [`session`]: handshake + discovery, owning the backend for its lifetime

pub mod bridge;
pub mod error;
pub mod registry;
pub mod session;
pub mod transport;

#[cfg(test)]
pub(crate) mod test_support;

pub use bridge::{Invocation, InvocationBridge};
pub use error::{BridgeError, DiscoveryError, SessionError, TransportError};
pub use registry::CapabilityRegistry;
pub use session::{ServerInfo, Session};
pub use transport::Transport;
