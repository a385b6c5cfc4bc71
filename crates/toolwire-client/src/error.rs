//! Error types for the client side of the tool protocol.

use std::time::Duration;

use thiserror::Error;
use toolwire_core::RpcError;

/// Failures of the framed message channel itself.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The backend executable could not be started.
    #[error("failed to launch tool backend '{command}': {source}")]
    ProcessLaunch {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The backend exited or its streams were closed before replying.
    #[error("connection to tool backend closed")]
    Closed,

    /// No reply arrived within the per-request bound.
    #[error("request '{method}' timed out after {after:?}")]
    Timeout { method: String, after: Duration },

    /// The backend answered with a JSON-RPC error object.
    #[error("backend returned an error: {0}")]
    Remote(RpcError),

    #[error("I/O error on tool backend stream: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode frame: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Failures of the `tools/list` discovery handshake.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("discovery request failed: {0}")]
    Transport(#[from] TransportError),

    #[error("malformed discovery reply: {0}")]
    Malformed(String),

    #[error("backend reported capability '{0}' more than once")]
    DuplicateName(String),
}

/// Failures of a single capability invocation that are not in-band tool
/// errors.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("unknown capability '{0}'")]
    UnknownCapability(String),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Failures while establishing a session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("initialize handshake failed: {0}")]
    Handshake(String),

    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
}
