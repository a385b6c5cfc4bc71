//! Capabilities: tool descriptors reported by a backend and the results of
//! invoking them.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::types::ToolDefinition;

// ─────────────────────────────────────────────
// Descriptor
// ─────────────────────────────────────────────

/// A tool as described by the backend in its `tools/list` reply.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// JSON Schema of the arguments object.
    #[serde(default = "empty_object_schema")]
    pub input_schema: Value,
}

fn empty_object_schema() -> Value {
    json!({ "type": "object", "properties": {} })
}

impl CapabilityDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>, input_schema: Value) -> Self {
        CapabilityDescriptor {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }

    /// The LLM-facing definition of this capability.
    pub fn to_definition(&self) -> ToolDefinition {
        ToolDefinition::new(&self.name, &self.description, self.input_schema.clone())
    }

    /// Names listed under `required` in the schema.
    pub fn required_parameters(&self) -> Vec<&str> {
        self.input_schema
            .get("required")
            .and_then(Value::as_array)
            .map(|req| req.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }

    /// Check an argument object against the declared schema: required
    /// parameters must be present and non-null, and declared primitive types
    /// must match. Unknown extra arguments are passed through.
    pub fn check_arguments(&self, args: &Map<String, Value>) -> Result<(), String> {
        for name in self.required_parameters() {
            match args.get(name) {
                None | Some(Value::Null) => {
                    return Err(format!("missing required parameter '{name}'"));
                }
                Some(_) => {}
            }
        }

        let Some(properties) = self.input_schema.get("properties").and_then(Value::as_object) else {
            return Ok(());
        };

        for (name, value) in args {
            let Some(expected) = properties
                .get(name)
                .and_then(|p| p.get("type"))
                .and_then(Value::as_str)
            else {
                continue;
            };
            if !matches_type(value, expected) {
                return Err(format!("parameter '{name}' should be of type {expected}"));
            }
        }

        Ok(())
    }
}

fn matches_type(value: &Value, expected: &str) -> bool {
    match expected {
        "string" => value.is_string(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        "null" => value.is_null(),
        _ => true,
    }
}

// ─────────────────────────────────────────────
// Invocation result
// ─────────────────────────────────────────────

/// One part of an invocation result.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },

    #[serde(rename = "image")]
    Image {
        data: String,
        #[serde(rename = "mimeType")]
        mime_type: String,
    },

    /// Any content kind this client does not render.
    #[serde(other)]
    Unsupported,
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        ContentBlock::Text { text: text.into() }
    }
}

/// Outcome of a capability call: ordered content parts, flagged as an error
/// when the backend reported a failure.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationResult {
    #[serde(default)]
    pub content: Vec<ContentBlock>,
    #[serde(default)]
    pub is_error: bool,
}

impl InvocationResult {
    /// A successful result with a single text part.
    pub fn text(text: impl Into<String>) -> Self {
        InvocationResult {
            content: vec![ContentBlock::text(text)],
            is_error: false,
        }
    }

    /// A failure handed back to the model as data.
    pub fn failure(message: impl Into<String>) -> Self {
        InvocationResult {
            content: vec![ContentBlock::text(message)],
            is_error: true,
        }
    }

    /// Textual rendering for the model: text parts joined by newlines,
    /// non-text parts summarised.
    pub fn to_text(&self) -> String {
        let parts: Vec<String> = self
            .content
            .iter()
            .map(|block| match block {
                ContentBlock::Text { text } => text.clone(),
                ContentBlock::Image { mime_type, .. } => format!("[image: {mime_type}]"),
                ContentBlock::Unsupported => "[unsupported content]".to_string(),
            })
            .collect();

        let body = parts.join("\n");
        if self.is_error {
            format!("Error: {body}")
        } else {
            body
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo_stars() -> CapabilityDescriptor {
        CapabilityDescriptor::new(
            "get_repository_stars",
            "Get information about a specific GitHub repository.",
            json!({
                "type": "object",
                "properties": {
                    "owner": { "type": "string" },
                    "repositoryName": { "type": "string" }
                },
                "required": ["owner", "repositoryName"]
            }),
        )
    }

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_descriptor_deserialization_defaults() {
        let desc: CapabilityDescriptor =
            serde_json::from_value(json!({ "name": "ping_backend" })).unwrap();
        assert_eq!(desc.description, "");
        assert_eq!(desc.input_schema["type"], "object");
        assert!(desc.required_parameters().is_empty());
    }

    #[test]
    fn test_to_definition() {
        let def = repo_stars().to_definition();
        assert_eq!(def.function.name, "get_repository_stars");
        assert_eq!(def.function.parameters["required"][1], "repositoryName");
    }

    #[test]
    fn test_check_arguments_ok() {
        let desc = repo_stars();
        assert!(desc
            .check_arguments(&args(json!({ "owner": "tokio-rs", "repositoryName": "tokio" })))
            .is_ok());
    }

    #[test]
    fn test_check_arguments_missing() {
        let err = repo_stars()
            .check_arguments(&args(json!({ "owner": "tokio-rs" })))
            .unwrap_err();
        assert!(err.contains("repositoryName"));
    }

    #[test]
    fn test_check_arguments_wrong_type() {
        let err = repo_stars()
            .check_arguments(&args(json!({ "owner": 42, "repositoryName": "tokio" })))
            .unwrap_err();
        assert!(err.contains("owner"));
        assert!(err.contains("string"));
    }

    #[test]
    fn test_result_parsing_with_unknown_block() {
        let result: InvocationResult = serde_json::from_value(json!({
            "content": [
                { "type": "text", "text": "Stars: 42" },
                { "type": "resource", "resource": { "uri": "file:///x" } }
            ]
        }))
        .unwrap();

        assert!(!result.is_error);
        assert_eq!(result.content.len(), 2);
        assert_eq!(result.content[1], ContentBlock::Unsupported);
        assert_eq!(result.to_text(), "Stars: 42\n[unsupported content]");
    }

    #[test]
    fn test_failure_rendering() {
        let result = InvocationResult::failure("upstream unavailable");
        assert!(result.is_error);
        assert_eq!(result.to_text(), "Error: upstream unavailable");

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["isError"], true);
    }
}
