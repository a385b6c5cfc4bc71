//! Session: one connected backend: transport, handshake and the
//! capability snapshot taken at startup.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, info, warn};

use toolwire_core::config::ServerConfig;
use toolwire_core::protocol::{methods, PROTOCOL_VERSION};

use crate::bridge::InvocationBridge;
use crate::error::{SessionError, TransportError};
use crate::registry::CapabilityRegistry;
use crate::transport::Transport;

/// What the backend said about itself during `initialize`.
#[derive(Clone, Debug, Default)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
    pub protocol_version: String,
}

/// A live connection to one tool backend.
pub struct Session {
    transport: Arc<Transport>,
    capabilities: Arc<CapabilityRegistry>,
    server_info: ServerInfo,
}

impl Session {
    /// Spawn the backend, run the handshake and discover its capabilities.
    pub async fn connect(config: &ServerConfig) -> Result<Self, SessionError> {
        let transport = Transport::spawn(config)?;
        let session = Self::from_transport(transport).await;
        if let Err(ref e) = session {
            warn!(server = %config.name, error = %e, "session setup failed");
        }
        session
    }

    /// Handshake and discovery over an already-open transport. The transport
    /// is closed again if either step fails.
    pub async fn from_transport(transport: Transport) -> Result<Self, SessionError> {
        let transport = Arc::new(transport);

        let setup = async {
            let server_info = handshake(&transport).await?;
            let capabilities = CapabilityRegistry::discover(&transport).await?;
            Ok::<_, SessionError>((server_info, capabilities))
        }
        .await;

        match setup {
            Ok((server_info, capabilities)) => Ok(Session {
                transport,
                capabilities: Arc::new(capabilities),
                server_info,
            }),
            Err(e) => {
                transport.close().await;
                Err(e)
            }
        }
    }

    /// A bridge bound to this session's transport and capability snapshot.
    pub fn bridge(&self) -> InvocationBridge {
        InvocationBridge::new(self.transport.clone(), self.capabilities.clone())
    }

    pub fn capabilities(&self) -> &CapabilityRegistry {
        &self.capabilities
    }

    pub fn server_info(&self) -> &ServerInfo {
        &self.server_info
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    /// Close the transport and stop the backend. Idempotent.
    pub async fn shutdown(&self) {
        info!(server = self.transport.name(), "shutting down session");
        self.transport.close().await;
    }
}

async fn handshake(transport: &Transport) -> Result<ServerInfo, SessionError> {
    let params = json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {},
        "clientInfo": {
            "name": "toolwire",
            "version": env!("CARGO_PKG_VERSION"),
        }
    });

    let reply = match transport.request(methods::INITIALIZE, Some(params)).await {
        Ok(reply) => reply,
        Err(TransportError::Remote(rpc)) => return Err(SessionError::Handshake(rpc.to_string())),
        Err(e) => return Err(e.into()),
    };

    let info = parse_server_info(&reply)?;
    if info.protocol_version != PROTOCOL_VERSION {
        warn!(
            server = transport.name(),
            theirs = %info.protocol_version,
            ours = PROTOCOL_VERSION,
            "protocol version mismatch, continuing"
        );
    }
    info!(
        server = transport.name(),
        name = %info.name,
        version = %info.version,
        "backend initialized"
    );

    transport.notify(methods::INITIALIZED, None).await?;
    debug!(server = transport.name(), "handshake complete");
    Ok(info)
}

fn parse_server_info(reply: &Value) -> Result<ServerInfo, SessionError> {
    if !reply.is_object() {
        return Err(SessionError::Handshake(format!(
            "initialize result should be an object, got {reply}"
        )));
    }

    let text = |v: &Value| v.as_str().unwrap_or_default().to_string();
    Ok(ServerInfo {
        name: text(&reply["serverInfo"]["name"]),
        version: text(&reply["serverInfo"]["version"]),
        protocol_version: text(&reply["protocolVersion"]),
    })
}
