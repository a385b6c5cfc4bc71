//! Invocation bridge: turns an invocation directive into a `tools/call`
//! round trip and normalises what comes back.

use std::sync::Arc;

use futures_util::future::join_all;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use toolwire_core::protocol::methods;
use toolwire_core::InvocationResult;

use crate::error::{BridgeError, TransportError};
use crate::registry::CapabilityRegistry;
use crate::transport::Transport;

/// One capability call requested by the model.
#[derive(Clone, Debug, PartialEq)]
pub struct Invocation {
    pub name: String,
    pub arguments: Map<String, Value>,
}

impl Invocation {
    pub fn new(name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Invocation {
            name: name.into(),
            arguments,
        }
    }
}

/// Routes invocations to the backend that advertised them.
#[derive(Clone, Debug)]
pub struct InvocationBridge {
    transport: Arc<Transport>,
    capabilities: Arc<CapabilityRegistry>,
}

impl InvocationBridge {
    pub fn new(transport: Arc<Transport>, capabilities: Arc<CapabilityRegistry>) -> Self {
        InvocationBridge {
            transport,
            capabilities,
        }
    }

    pub fn capabilities(&self) -> &CapabilityRegistry {
        &self.capabilities
    }

    /// Invoke one capability.
    ///
    /// Tool-level failures come back as `Ok` results with `is_error` set;
    /// only an unknown name or a broken connection is an `Err`.
    pub async fn invoke(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> Result<InvocationResult, BridgeError> {
        let Some(descriptor) = self.capabilities.get(name) else {
            warn!(tool = name, "invocation of unknown capability");
            return Err(BridgeError::UnknownCapability(name.to_string()));
        };

        if let Err(reason) = descriptor.check_arguments(&arguments) {
            debug!(tool = name, reason = %reason, "rejecting invocation arguments");
            return Ok(InvocationResult::failure(format!(
                "Invalid arguments for {name}: {reason}"
            )));
        }

        debug!(tool = name, "invoking capability");
        let params = json!({ "name": name, "arguments": arguments });

        match self.transport.request(methods::TOOLS_CALL, Some(params)).await {
            Ok(result) => Ok(parse_result(name, result)),
            Err(TransportError::Remote(rpc)) => {
                warn!(tool = name, error = %rpc, "capability call rejected by backend");
                Ok(InvocationResult::failure(rpc.message))
            }
            Err(e) => Err(BridgeError::Transport(e)),
        }
    }

    /// Invoke several capabilities concurrently; results keep call order.
    pub async fn invoke_all(
        &self,
        calls: &[Invocation],
    ) -> Vec<Result<InvocationResult, BridgeError>> {
        join_all(
            calls
                .iter()
                .map(|call| self.invoke(&call.name, call.arguments.clone())),
        )
        .await
    }
}

fn parse_result(name: &str, result: Value) -> InvocationResult {
    match serde_json::from_value::<InvocationResult>(result) {
        Ok(parsed) => {
            if parsed.is_error {
                debug!(tool = name, "capability reported an error");
            }
            parsed
        }
        Err(e) => {
            warn!(tool = name, error = %e, "unreadable capability result");
            InvocationResult::failure(format!("Unreadable result from {name}: {e}"))
        }
    }
}
