//! Tool trait: the interface every backend tool implements.

use async_trait::async_trait;
use serde_json::{Map, Value};

use toolwire_core::CapabilityDescriptor;

// ─────────────────────────────────────────────
// Tool trait
// ─────────────────────────────────────────────

/// A capability served over `tools/list` and `tools/call`.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name clients use to call this tool.
    fn name(&self) -> &str;

    /// Human-readable description shown to the model.
    fn description(&self) -> &str;

    /// JSON Schema of the arguments object.
    fn parameters(&self) -> Value;

    /// Run the tool. An `Err` is reported to the caller as an error result,
    /// never as a protocol fault.
    async fn execute(&self, params: Map<String, Value>) -> anyhow::Result<String>;

    /// The descriptor advertised in `tools/list`.
    fn descriptor(&self) -> CapabilityDescriptor {
        CapabilityDescriptor::new(self.name(), self.description(), self.parameters())
    }
}

// ─────────────────────────────────────────────
// Param helpers
// ─────────────────────────────────────────────

/// Extract a required non-blank `String` param.
pub fn require_string(params: &Map<String, Value>, key: &str) -> anyhow::Result<String> {
    params
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .ok_or_else(|| anyhow::anyhow!("Missing required parameter: {key}"))
}
