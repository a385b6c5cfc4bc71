//! Context builder: constructs the system prompt and conversation messages.

use chrono::Utc;
use toolwire_core::types::{Message, ToolCall};
use toolwire_core::CapabilityDescriptor;

// ─────────────────────────────────────────────
// Context builder
// ─────────────────────────────────────────────

/// Builds system prompts and message lists for the response loop.
#[derive(Clone, Debug, Default)]
pub struct ContextBuilder {
    /// Replaces the built-in identity block when set.
    system_prompt: Option<String>,
    /// `(name, description)` of every discovered capability.
    capabilities: Vec<(String, String)>,
}

impl ContextBuilder {
    pub fn new(system_prompt: Option<String>) -> Self {
        Self {
            system_prompt,
            capabilities: Vec::new(),
        }
    }

    /// List these capabilities in the system prompt (builder pattern).
    pub fn with_capabilities(mut self, descriptors: &[CapabilityDescriptor]) -> Self {
        self.capabilities = descriptors
            .iter()
            .map(|d| (d.name.clone(), d.description.clone()))
            .collect();
        self
    }

    // ────────────── System prompt ──────────────

    /// Build the full system prompt.
    pub fn build_system_prompt(&self) -> String {
        let mut parts = vec![self
            .system_prompt
            .clone()
            .unwrap_or_else(build_identity)];

        if !self.capabilities.is_empty() {
            let listing: Vec<String> = self
                .capabilities
                .iter()
                .map(|(name, description)| {
                    if description.is_empty() {
                        format!("- `{name}`")
                    } else {
                        format!("- `{name}`: {description}")
                    }
                })
                .collect();
            parts.push(format!("## Tools\n\n{}", listing.join("\n")));
        }

        parts.join("\n\n")
    }

    // ────────────── Message building ──────────────

    /// Build the full message list for a turn.
    ///
    /// 1. System prompt
    /// 2. History of completed turns
    /// 3. Current user message
    pub fn build_messages(&self, history: &[Message], user_text: &str) -> Vec<Message> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(Message::system(self.build_system_prompt()));
        messages.extend_from_slice(history);
        messages.push(Message::user(user_text));
        messages
    }

    /// Add a tool result to the message list (convenience wrapper).
    pub fn add_tool_result(messages: &mut Vec<Message>, tool_call_id: &str, result: &str) {
        messages.push(Message::tool_result(tool_call_id, result));
    }

    /// Add an assistant message (with optional tool calls) to the message list.
    pub fn add_assistant_message(
        messages: &mut Vec<Message>,
        content: Option<String>,
        tool_calls: Vec<ToolCall>,
    ) {
        if tool_calls.is_empty() {
            if let Some(text) = content {
                messages.push(Message::assistant(text));
            }
        } else {
            messages.push(Message::assistant_tool_calls(content, tool_calls));
        }
    }
}

/// Core identity block.
fn build_identity() -> String {
    let today = Utc::now().format("%Y-%m-%d");
    format!(
        "# Identity\n\n\
         You are a helpful assistant with access to tools provided by a connected server.\n\n\
         - **Date**: {today}\n\n\
         Use the tools when a question needs live data; never invent figures \
         a tool could provide. If a tool reports an error, say so plainly. \
         Be concise."
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_prompt_has_identity() {
        let prompt = ContextBuilder::default().build_system_prompt();
        assert!(prompt.contains("# Identity"));
        assert!(!prompt.contains("## Tools"));
    }

    #[test]
    fn test_custom_prompt_replaces_identity() {
        let ctx = ContextBuilder::new(Some("You answer in haiku.".into()));
        let prompt = ctx.build_system_prompt();
        assert!(prompt.starts_with("You answer in haiku."));
        assert!(!prompt.contains("# Identity"));
    }

    #[test]
    fn test_capabilities_are_listed() {
        let ctx = ContextBuilder::default().with_capabilities(&[
            CapabilityDescriptor::new("get_repository_stars", "Repository details", json!({})),
            CapabilityDescriptor::new("ping", "", json!({})),
        ]);
        let prompt = ctx.build_system_prompt();
        assert!(prompt.contains("- `get_repository_stars`: Repository details"));
        assert!(prompt.contains("- `ping`"));
    }

    #[test]
    fn test_build_messages_order() {
        let ctx = ContextBuilder::default();
        let history = vec![
            Message::user("previous question"),
            Message::assistant("previous answer"),
        ];
        let msgs = ctx.build_messages(&history, "new question");
        // system + 2 history + 1 user = 4
        assert_eq!(msgs.len(), 4);
        assert!(matches!(msgs[0], Message::System { .. }));
        assert_eq!(msgs[3], Message::user("new question"));
    }

    #[test]
    fn test_add_assistant_message_text() {
        let mut msgs = Vec::new();
        ContextBuilder::add_assistant_message(&mut msgs, Some("hello".into()), vec![]);
        assert_eq!(msgs, vec![Message::assistant("hello")]);

        ContextBuilder::add_assistant_message(&mut msgs, None, vec![]);
        assert_eq!(msgs.len(), 1);
    }

    #[test]
    fn test_add_assistant_message_tool_calls_keeps_text() {
        let mut msgs = Vec::new();
        let tc = ToolCall::new("id1", "get_user_repositories", r#"{"username":"octocat"}"#);
        ContextBuilder::add_assistant_message(&mut msgs, Some("Let me check.".into()), vec![tc]);

        match &msgs[0] {
            Message::Assistant { content, tool_calls } => {
                assert_eq!(content.as_deref(), Some("Let me check."));
                assert_eq!(tool_calls.as_ref().unwrap().len(), 1);
            }
            other => panic!("expected assistant message, got {other:?}"),
        }
    }

    #[test]
    fn test_add_tool_result() {
        let mut msgs = vec![Message::user("test")];
        ContextBuilder::add_tool_result(&mut msgs, "call_1", "result data");
        assert_eq!(msgs[1], Message::tool_result("call_1", "result data"));
    }
}
