//! Capability registry: the tools a backend advertised at discovery time.

use std::collections::HashMap;

use serde_json::Value;
use tracing::{debug, info};

use toolwire_core::protocol::methods;
use toolwire_core::types::ToolDefinition;
use toolwire_core::CapabilityDescriptor;

use crate::error::DiscoveryError;
use crate::transport::Transport;

/// Descriptors in the order the backend reported them, indexed by name.
#[derive(Debug, Default, Clone)]
pub struct CapabilityRegistry {
    descriptors: Vec<CapabilityDescriptor>,
    index: HashMap<String, usize>,
}

impl CapabilityRegistry {
    /// Ask the backend for its tool list and build the registry.
    ///
    /// An absent or empty `tools` array yields an empty registry.
    pub async fn discover(transport: &Transport) -> Result<Self, DiscoveryError> {
        let reply = transport.request(methods::TOOLS_LIST, None).await?;
        let registry = Self::from_list_result(&reply)?;
        info!(
            server = transport.name(),
            count = registry.len(),
            tools = ?registry.names(),
            "capabilities discovered"
        );
        Ok(registry)
    }

    /// Parse a `tools/list` result object.
    pub fn from_list_result(result: &Value) -> Result<Self, DiscoveryError> {
        let Some(result) = result.as_object() else {
            return Err(DiscoveryError::Malformed(format!(
                "tools/list result should be an object, got {result}"
            )));
        };
        let tools = match result.get("tools") {
            None | Some(Value::Null) => return Ok(Self::default()),
            Some(Value::Array(tools)) => tools,
            Some(other) => {
                return Err(DiscoveryError::Malformed(format!(
                    "'tools' should be an array, got {other}"
                )))
            }
        };

        let mut descriptors = Vec::with_capacity(tools.len());
        for (i, raw) in tools.iter().enumerate() {
            let descriptor: CapabilityDescriptor = serde_json::from_value(raw.clone())
                .map_err(|e| DiscoveryError::Malformed(format!("tool #{i}: {e}")))?;
            debug!(name = %descriptor.name, "capability");
            descriptors.push(descriptor);
        }

        Self::from_descriptors(descriptors)
    }

    /// Build from descriptors, rejecting duplicate names.
    pub fn from_descriptors(descriptors: Vec<CapabilityDescriptor>) -> Result<Self, DiscoveryError> {
        let mut index = HashMap::with_capacity(descriptors.len());
        for (i, descriptor) in descriptors.iter().enumerate() {
            if index.insert(descriptor.name.clone(), i).is_some() {
                return Err(DiscoveryError::DuplicateName(descriptor.name.clone()));
            }
        }
        Ok(CapabilityRegistry { descriptors, index })
    }

    pub fn get(&self, name: &str) -> Option<&CapabilityDescriptor> {
        self.index.get(name).map(|&i| &self.descriptors[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Names in discovery order.
    pub fn names(&self) -> Vec<&str> {
        self.descriptors.iter().map(|d| d.name.as_str()).collect()
    }

    pub fn descriptors(&self) -> &[CapabilityDescriptor] {
        &self.descriptors
    }

    /// LLM-facing tool definitions, in discovery order.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.descriptors.iter().map(|d| d.to_definition()).collect()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}
