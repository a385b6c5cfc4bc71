//! Tool registry: the backend's dispatch table for `tools/call`.
//!
//! Tools are listed in registration order, which is the order clients see
//! in `tools/list`.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{info, warn};

use toolwire_core::{CapabilityDescriptor, InvocationResult, RpcError};

use super::base::Tool;

// ─────────────────────────────────────────────
// Registry
// ─────────────────────────────────────────────

/// Stores tools by name and dispatches calls.
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Register a tool. A tool with the same name replaces the earlier one
    /// in place.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        info!(tool = tool.name(), "registered tool");
        match self.index.get(tool.name()) {
            Some(&pos) => self.tools[pos] = tool,
            None => {
                self.index.insert(tool.name().to_string(), self.tools.len());
                self.tools.push(tool);
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.index.get(name).map(|&pos| &self.tools[pos])
    }

    pub fn has(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Descriptors for `tools/list`, in registration order.
    pub fn list(&self) -> Vec<CapabilityDescriptor> {
        self.tools.iter().map(|t| t.descriptor()).collect()
    }

    /// Run a tool.
    ///
    /// An unknown name is a protocol error (`-32602`); a failing tool is an
    /// `isError` result the client hands back to the model.
    pub async fn call(
        &self,
        name: &str,
        params: Map<String, Value>,
    ) -> Result<InvocationResult, RpcError> {
        let Some(tool) = self.get(name) else {
            warn!(tool = name, "tool not found");
            return Err(RpcError::invalid_params(format!("Unknown tool: {name}")));
        };

        match tool.execute(params).await {
            Ok(text) => Ok(InvocationResult::text(text)),
            Err(e) => {
                warn!(tool = name, error = %e, "tool execution failed");
                Ok(InvocationResult::failure(format!("Error executing {name}: {e}")))
            }
        }
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use toolwire_core::protocol::codes;

    use crate::tools::base::require_string;

    /// Minimal test tool.
    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echoes back the input"
        }
        fn parameters(&self) -> Value {
            json!({
                "type": "object",
                "properties": {
                    "text": { "type": "string", "description": "Text to echo" }
                },
                "required": ["text"]
            })
        }
        async fn execute(&self, params: Map<String, Value>) -> anyhow::Result<String> {
            let text = require_string(&params, "text")?;
            Ok(format!("Echo: {text}"))
        }
    }

    /// Tool that always fails.
    struct FailTool;

    #[async_trait]
    impl Tool for FailTool {
        fn name(&self) -> &str {
            "fail"
        }
        fn description(&self) -> &str {
            "Always fails"
        }
        fn parameters(&self) -> Value {
            json!({"type": "object", "properties": {}, "required": []})
        }
        async fn execute(&self, _params: Map<String, Value>) -> anyhow::Result<String> {
            anyhow::bail!("intentional failure")
        }
    }

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_register_and_lookup() {
        let mut reg = ToolRegistry::new();
        reg.register(Arc::new(EchoTool));
        assert!(reg.has("echo"));
        assert!(!reg.has("nope"));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_list_keeps_registration_order() {
        let mut reg = ToolRegistry::new();
        reg.register(Arc::new(FailTool));
        reg.register(Arc::new(EchoTool));
        let names: Vec<String> = reg.list().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["fail", "echo"]);
    }

    #[test]
    fn test_reregister_replaces_in_place() {
        let mut reg = ToolRegistry::new();
        reg.register(Arc::new(EchoTool));
        reg.register(Arc::new(FailTool));
        reg.register(Arc::new(EchoTool));
        assert_eq!(reg.len(), 2);
        assert_eq!(reg.list()[0].name, "echo");
    }

    #[test]
    fn test_descriptor_carries_schema() {
        let mut reg = ToolRegistry::new();
        reg.register(Arc::new(EchoTool));
        let desc = &reg.list()[0];
        assert_eq!(desc.description, "Echoes back the input");
        assert_eq!(desc.required_parameters(), vec!["text"]);
    }

    #[tokio::test]
    async fn test_call_success() {
        let mut reg = ToolRegistry::new();
        reg.register(Arc::new(EchoTool));
        let result = reg.call("echo", args(json!({ "text": "hi" }))).await.unwrap();
        assert!(!result.is_error);
        assert_eq!(result.to_text(), "Echo: hi");
    }

    #[tokio::test]
    async fn test_call_unknown_tool() {
        let reg = ToolRegistry::new();
        let err = reg.call("nope", Map::new()).await.unwrap_err();
        assert_eq!(err.code, codes::INVALID_PARAMS);
        assert!(err.message.contains("nope"));
    }

    #[tokio::test]
    async fn test_call_failure_is_in_band() {
        let mut reg = ToolRegistry::new();
        reg.register(Arc::new(FailTool));
        let result = reg.call("fail", Map::new()).await.unwrap();
        assert!(result.is_error);
        assert_eq!(
            result.to_text(),
            "Error: Error executing fail: intentional failure"
        );
    }

    #[tokio::test]
    async fn test_call_missing_param_is_in_band() {
        let mut reg = ToolRegistry::new();
        reg.register(Arc::new(EchoTool));
        let result = reg.call("echo", Map::new()).await.unwrap();
        assert!(result.is_error);
        assert!(result.to_text().contains("Missing required parameter: text"));
    }
}
